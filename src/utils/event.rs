use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Map with auto-incrementing ids, used to hold listeners that can later be
/// removed by the id returned from [`Registry::push`].
#[derive(Debug)]
pub struct Registry<T> {
    items: BTreeMap<u64, T>,
    last_id: u64,
}

impl<T> Default for Registry<T> {
    fn default() -> Self {
        Self {
            items: BTreeMap::new(),
            last_id: 0,
        }
    }
}

impl<T> Registry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value and return its id.
    pub fn push(&mut self, value: T) -> u64 {
        let id = self.last_id;
        self.items.insert(id, value);
        self.last_id += 1;
        id
    }

    pub fn remove(&mut self, id: u64) -> Option<T> {
        self.items.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.items.values()
    }
}

type Listener<A> = Arc<dyn Fn(&A) + Send + Sync>;

/// A multi-listener event. Listeners are invoked in registration order.
pub struct Event<A> {
    handlers: Arc<Mutex<Registry<Listener<A>>>>,
}

impl<A> Clone for Event<A> {
    fn clone(&self) -> Self {
        Self {
            handlers: Arc::clone(&self.handlers),
        }
    }
}

impl<A> Default for Event<A> {
    fn default() -> Self {
        Self {
            handlers: Arc::new(Mutex::new(Registry::new())),
        }
    }
}

impl<A: 'static> Event<A> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. The returned controller pauses or removes it.
    pub fn add<F>(&self, action: F) -> EventController
    where
        F: Fn(&A) + Send + Sync + 'static,
    {
        let paused = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&paused);
        let id = self.handlers.lock().push(Arc::new(move |arg: &A| {
            if !flag.load(Ordering::Relaxed) {
                action(arg);
            }
        }));
        let handlers = Arc::downgrade(&self.handlers);
        EventController::new(vec![paused], move || {
            if let Some(h) = handlers.upgrade() {
                h.lock().remove(id);
            }
        })
    }

    /// Register a listener that removes itself after the first trigger.
    pub fn add_once<F>(&self, action: F) -> EventController
    where
        F: FnOnce(&A) + Send + 'static,
    {
        let slot: Arc<Mutex<Option<(F, Option<EventController>)>>> =
            Arc::new(Mutex::new(Some((action, None))));
        let inner = Arc::clone(&slot);
        let ctrl = self.add(move |arg| {
            let taken = inner.lock().take();
            if let Some((action, ctrl)) = taken {
                if let Some(ctrl) = ctrl {
                    ctrl.cancel();
                }
                action(arg);
            }
        });
        if let Some((_, c)) = slot.lock().as_mut() {
            *c = Some(ctrl.clone());
        }
        ctrl
    }

    /// Invoke every active listener with `arg`.
    ///
    /// Listeners are snapshotted first, so a listener may add or cancel
    /// listeners without deadlocking.
    pub fn trigger(&self, arg: &A) {
        let listeners: Vec<Listener<A>> = self.handlers.lock().values().cloned().collect();
        for listener in listeners {
            listener(arg);
        }
    }

    pub fn num_listeners(&self) -> usize {
        self.handlers.lock().len()
    }

    pub fn clear(&self) {
        self.handlers.lock().clear();
    }
}

/// Handle returned when registering a listener.
#[derive(Clone)]
pub struct EventController {
    paused: Vec<Arc<AtomicBool>>,
    cancel: Arc<dyn Fn() + Send + Sync>,
}

impl EventController {
    pub fn new<F>(paused: Vec<Arc<AtomicBool>>, cancel: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            paused,
            cancel: Arc::new(cancel),
        }
    }

    /// Combine several controllers so they pause and cancel together.
    pub fn join(controllers: Vec<EventController>) -> Self {
        let paused = controllers
            .iter()
            .flat_map(|c| c.paused.iter().cloned())
            .collect();
        EventController::new(paused, move || {
            for c in &controllers {
                c.cancel();
            }
        })
    }

    pub fn is_paused(&self) -> bool {
        self.paused
            .first()
            .is_some_and(|p| p.load(Ordering::Relaxed))
    }

    pub fn set_paused(&self, paused: bool) {
        for p in &self.paused {
            p.store(paused, Ordering::Relaxed);
        }
    }

    pub fn pause(&self) {
        self.set_paused(true);
    }

    pub fn resume(&self) {
        self.set_paused(false);
    }

    pub fn cancel(&self) {
        (self.cancel)();
    }
}

impl std::fmt::Debug for EventController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventController")
            .field("paused", &self.is_paused())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_registry_ids_are_not_reused() {
        let mut r = Registry::new();
        let a = r.push("a");
        let b = r.push("b");
        assert_eq!(r.remove(a), Some("a"));
        let c = r.push("c");
        assert_ne!(b, c);
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn test_event_pause_and_cancel() {
        let ev: Event<usize> = Event::new();
        let total = Arc::new(AtomicUsize::new(0));
        let t = Arc::clone(&total);
        let ctrl = ev.add(move |n| {
            t.fetch_add(*n, Ordering::SeqCst);
        });
        ev.trigger(&2);
        ctrl.pause();
        ev.trigger(&5);
        ctrl.resume();
        ev.trigger(&3);
        assert_eq!(total.load(Ordering::SeqCst), 5);
        ctrl.cancel();
        assert_eq!(ev.num_listeners(), 0);
        ev.trigger(&100);
        assert_eq!(total.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_event_add_once() {
        let ev: Event<()> = Event::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        ev.add_once(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        ev.trigger(&());
        ev.trigger(&());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(ev.num_listeners(), 0);
    }

    #[test]
    fn test_controller_join() {
        let ev: Event<()> = Event::new();
        let a = ev.add(|_| {});
        let b = ev.add(|_| {});
        let both = EventController::join(vec![a.clone(), b.clone()]);
        both.pause();
        assert!(a.is_paused() && b.is_paused());
        both.cancel();
        assert_eq!(ev.num_listeners(), 0);
    }
}

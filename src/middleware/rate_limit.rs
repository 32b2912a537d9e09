use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::Middleware;
use crate::dispatcher::Next;
use crate::error::Error;
use crate::server::Ctx;

type LimitHandler = Arc<dyn Fn(&mut Ctx) -> Result<(), Error> + Send + Sync>;

/// Limits each client IP to `limit` requests per `window`.
///
/// Every request bumps its IP's counter and schedules a decrement `window`
/// later on a coroutine. A request that pushes the counter over `limit` gets
/// status 429 and is handed to the limit handler instead of the rest of the
/// chain. Requests without a client IP (loopback) are never limited.
#[derive(Clone)]
pub struct RateLimiter {
    window: Duration,
    limit: u32,
    counters: Arc<DashMap<String, u32>>,
    on_limit: LimitHandler,
}

impl RateLimiter {
    #[must_use]
    pub fn new(window: Duration, limit: u32) -> Self {
        Self {
            window,
            limit,
            counters: Arc::new(DashMap::new()),
            on_limit: Arc::new(|ctx| {
                ctx.res.send_text("429 too many requests", ());
                Ok(())
            }),
        }
    }

    /// Replace the response sent to limited clients. The status is already
    /// 429 when `handler` runs.
    #[must_use]
    pub fn on_limit(
        mut self,
        handler: impl Fn(&mut Ctx) -> Result<(), Error> + Send + Sync + 'static,
    ) -> Self {
        self.on_limit = Arc::new(handler);
        self
    }

    /// Requests counted for `ip` within the current window.
    #[must_use]
    pub fn count(&self, ip: &str) -> u32 {
        self.counters.get(ip).map_or(0, |n| *n)
    }

    fn schedule_decrement(&self, ip: String) {
        let counters = Arc::clone(&self.counters);
        let window = self.window;
        may::go!(move || {
            may::coroutine::sleep(window);
            if let Some(mut n) = counters.get_mut(&ip) {
                *n = n.saturating_sub(1);
            }
            counters.remove_if(&ip, |_, n| *n == 0);
        });
    }
}

impl Middleware for RateLimiter {
    fn handle(&self, ctx: &mut Ctx, next: Next<'_>) -> Result<(), Error> {
        let Some(ip) = ctx.req.ip() else {
            return next.run(ctx);
        };
        let count = {
            let mut n = self.counters.entry(ip.clone()).or_insert(0);
            *n += 1;
            *n
        };
        self.schedule_decrement(ip.clone());
        if count > self.limit {
            debug!(ip = %ip, count, limit = self.limit, "Rate limit exceeded");
            ctx.res.status = 429;
            return (self.on_limit)(ctx);
        }
        next.run(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::from_fn;
    use crate::server::{Request, Server, ServerOpts};
    use http::Method;
    use std::net::IpAddr;

    fn server(limiter: RateLimiter) -> Server {
        let mut server = Server::new(ServerOpts::default());
        server.use_middleware(limiter);
        server.use_middleware(from_fn(|ctx, _next| {
            ctx.res.send_text("ok", ());
            Ok(())
        }));
        server
    }

    fn from(ip: &str) -> Request {
        Request::builder(Method::GET, "/")
            .peer(ip.parse::<IpAddr>().unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn test_limits_per_ip() {
        let limiter = RateLimiter::new(Duration::from_secs(3600), 2);
        let server = server(limiter.clone());
        assert_eq!(server.handle(from("10.0.0.1")).status, 200);
        assert_eq!(server.handle(from("10.0.0.1")).status, 200);
        let res = server.handle(from("10.0.0.1"));
        assert_eq!(res.status, 429);
        assert_eq!(res.text(), Some("429 too many requests"));
        assert_eq!(server.handle(from("10.0.0.2")).status, 200);
        assert_eq!(limiter.count("10.0.0.1"), 3);
    }

    #[test]
    fn test_loopback_is_not_limited() {
        let server = server(RateLimiter::new(Duration::from_secs(3600), 0));
        assert_eq!(server.handle(from("127.0.0.1")).status, 200);
        assert_eq!(server.handle(from("::1")).status, 200);
    }

    #[test]
    fn test_custom_limit_handler() {
        let limiter = RateLimiter::new(Duration::from_secs(3600), 0).on_limit(|ctx| {
            ctx.res.send_json(&serde_json::json!({ "error": "slow down" }), ())
        });
        let res = server(limiter).handle(from("10.0.0.3"));
        assert_eq!(res.status, 429);
        assert_eq!(res.text(), Some(r#"{"error":"slow down"}"#));
    }

    #[test]
    fn test_counter_expires_after_window() {
        let limiter = RateLimiter::new(Duration::from_millis(50), 1);
        let server = server(limiter.clone());
        assert_eq!(server.handle(from("10.0.0.4")).status, 200);
        assert_eq!(limiter.count("10.0.0.4"), 1);
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while limiter.count("10.0.0.4") > 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(limiter.count("10.0.0.4"), 0);
        assert_eq!(server.handle(from("10.0.0.4")).status, 200);
    }
}

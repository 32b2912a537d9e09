use http::Method;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use super::matcher::PathPattern;
use crate::dispatcher::{Middleware, Next};
use crate::error::Error;
use crate::server::Ctx;

/// Method a route accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMethod {
    /// Matches every method (`*`).
    Any,
    Exact(Method),
}

impl RouteMethod {
    fn accepts(&self, canonical: &Method, original: &Method) -> bool {
        match self {
            RouteMethod::Any => true,
            RouteMethod::Exact(m) => m == canonical || m == original,
        }
    }
}

impl From<Method> for RouteMethod {
    fn from(m: Method) -> Self {
        RouteMethod::Exact(m)
    }
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteMethod::Any => f.write_str("*"),
            RouteMethod::Exact(m) => write!(f, "{m}"),
        }
    }
}

#[derive(Clone)]
struct RouteDef {
    method: RouteMethod,
    path: String,
    handler: Arc<dyn Middleware>,
}

/// An ordered collection of routes.
///
/// Routes are matched in registration order and the first match wins.
/// A router becomes a middleware through [`Router::mount`].
#[derive(Clone, Default)]
pub struct Router {
    routes: Vec<RouteDef>,
}

impl Router {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a route.
    ///
    /// # Arguments
    ///
    /// * `method` - Accepted method, or [`RouteMethod::Any`]
    /// * `path` - Route pattern with `:name` placeholders
    /// * `handler` - Middleware invoked on a match; its `next` continues
    ///   after the mounted router
    pub fn add(
        &mut self,
        method: impl Into<RouteMethod>,
        path: &str,
        handler: impl Middleware + 'static,
    ) -> &mut Self {
        self.routes.push(RouteDef {
            method: method.into(),
            path: path.to_string(),
            handler: Arc::new(handler),
        });
        self
    }

    pub fn get<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(&mut Ctx, Next<'_>) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.add(Method::GET, path, handler)
    }

    pub fn post<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(&mut Ctx, Next<'_>) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.add(Method::POST, path, handler)
    }

    pub fn put<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(&mut Ctx, Next<'_>) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.add(Method::PUT, path, handler)
    }

    pub fn delete<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(&mut Ctx, Next<'_>) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.add(Method::DELETE, path, handler)
    }

    /// Register a route accepting every method.
    pub fn any<F>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(&mut Ctx, Next<'_>) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.add(RouteMethod::Any, path, handler)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Compile every route under `prefix` into a single middleware.
    ///
    /// Routes added to this router afterwards are not seen by the returned
    /// middleware.
    #[must_use]
    pub fn mount(&self, prefix: &str) -> Mounted {
        let prefix = prefix.trim_end_matches('/');
        let routes = self
            .routes
            .iter()
            .map(|r| MountedRoute {
                method: r.method.clone(),
                pattern: PathPattern::new(&format!("{prefix}{}", r.path)),
                handler: Arc::clone(&r.handler),
            })
            .collect();
        Mounted { routes }
    }
}

struct MountedRoute {
    method: RouteMethod,
    pattern: PathPattern,
    handler: Arc<dyn Middleware>,
}

/// A router mounted at a prefix, usable as middleware.
pub struct Mounted {
    routes: Vec<MountedRoute>,
}

impl Mounted {
    /// Route patterns in match order, with the prefix applied.
    pub fn patterns(&self) -> impl Iterator<Item = (&RouteMethod, &str)> {
        self.routes.iter().map(|r| (&r.method, r.pattern.as_str()))
    }
}

impl Middleware for Mounted {
    fn handle(&self, ctx: &mut Ctx, next: Next<'_>) -> Result<(), Error> {
        let original = ctx.req.method().clone();
        let canonical = if original == Method::HEAD {
            Method::GET
        } else {
            original.clone()
        };
        let path = ctx.req.decoded_path();
        for route in &self.routes {
            if !route.method.accepts(&canonical, &original) {
                continue;
            }
            if let Some(params) = route.pattern.matches(&path) {
                debug!(
                    method = %route.method,
                    pattern = %route.pattern.as_str(),
                    "Route matched"
                );
                ctx.req.params = params;
                return route.handler.handle(ctx, next);
            }
        }
        next.run(ctx)
    }
}

/// A single route as middleware, without a [`Router`].
pub fn route(
    method: impl Into<RouteMethod>,
    path: &str,
    handler: impl Middleware + 'static,
) -> Mounted {
    let mut router = Router::new();
    router.add(method, path, handler);
    router.mount("")
}

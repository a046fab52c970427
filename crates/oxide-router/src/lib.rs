//! # oxide-router
//!
//! The request-dispatch kernel of a web framework.
//!
//! This crate provides:
//! - Route patterns with regex-constrained placeholders and trailing
//!   optional groups
//! - A route table compiled into a static map plus chunked group regexes
//! - Route loading per request category, memoized through a route cache
//! - Global and route-scoped middleware with auth injection
//! - The per-request state machine with error rendering and the
//!   not-installed detour
//!
//! ## Quick Start
//!
//! ```
//! use oxide_router::{AppState, Application, Container, FnHandler, Method, Request, Router};
//!
//! let container = Container::new().handler("Blog", || {
//!     FnHandler::new(|_action, req, res, _validator| {
//!         let slug = req.params.get("slug").unwrap_or_default().to_string();
//!         Ok(Some(res.body(slug)))
//!     })
//! });
//!
//! let mut app = Application::new(Router::new(""), container);
//! app.add_route(Method::Get, "/blog/{slug:[a-z-]+}", "Blog:show").unwrap();
//!
//! let res = futures::executor::block_on(
//!     app.handle(Request::get("/blog/hello-world"), AppState::new(true)),
//! )
//! .unwrap();
//! assert_eq!(res.body_string().as_deref(), Some("hello-world"));
//! ```
//!
//! ## Route patterns
//!
//! ```text
//! /users/{id:\d+}          placeholder with a regex constraint
//! /users/{id}              placeholder matching one path segment
//! /admin[/{language}/]     trailing optional group
//! ```
//!
//! ## Middleware
//!
//! Middleware receive the request and response and either continue with a
//! new pair or short-circuit with a final response. Route middleware are
//! referenced by key and built by the [`Container`]; the `auth` key is
//! built by the configured [`AuthFactory`].

pub mod app;
pub mod cache;
pub mod category;
pub mod config;
pub mod container;
pub mod emitter;
pub mod error;
pub mod error_handler;
pub mod generator;
pub mod handler;
pub mod loader;
pub mod middleware;
pub mod options;
pub mod pattern;
pub mod request;
pub mod response;
pub mod router;
pub mod system;
pub mod validator;

pub use app::{AppState, Application};
pub use cache::{CachedRoutes, MemoryCache, RouteCache};
pub use category::{classify, CategoryOptions, RouteCategory};
pub use config::AppConfig;
pub use container::Container;
pub use emitter::ResponseEmitter;
pub use error::{AppError, AppResult, Result, RouterError};
pub use error_handler::{DefaultRenderer, ErrorHandler, ErrorRenderer, RenderFormat};
pub use generator::{Route, RouteGenerator};
pub use handler::{FnHandler, Handler, NotFoundHandler, Validatable};
pub use loader::{MemoryRouteLoader, RouteDescriptor, RouteKind, RouteLoader};
pub use middleware::{
    AuthFactory, AuthMiddleware, BodyParsingMiddleware, ClientIpMiddleware, Middleware,
    Interrupted, MiddlewareRef, Outcome, Pipeline, ProviderAuthFactory, SessionProvider, TokenProvider,
    UserProvider,
};
pub use options::RouteOptions;
pub use pattern::RoutePattern;
pub use request::{Method, PathParams, Request};
pub use response::Response;
pub use router::{Dispatch, RouteMatch, Router};
pub use system::{SystemRoute, SystemRoutes};
pub use validator::{ValidationErrors, Validator};

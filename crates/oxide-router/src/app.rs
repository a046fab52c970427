//! Request orchestration.
//!
//! [`Application::handle`] drives one request through global middleware,
//! route loading, dispatch, route middleware and the handler. Any failure
//! on the way is handed to the [`ErrorHandler`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::container::Container;
use crate::error::{AppError, AppResult};
use crate::error_handler::{ErrorHandler, ErrorRenderer};
use crate::generator::Route;
use crate::handler::PAGE_NOT_FOUND_HANDLER;
use crate::middleware::{panic_error, Interrupted, MiddlewareRef, Outcome, Pipeline};
use crate::options::RouteOptions;
use crate::request::{Method, PathParams, Request};
use crate::response::Response;
use crate::router::{Dispatch, Router};

/// Request attribute holding the matched route's options.
pub const ROUTE_ATTRIBUTE: &str = "route";

/// Request attribute holding the request path.
pub const CURRENT_PATH_ATTRIBUTE: &str = "current_path";

/// Install state of the surrounding application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppState {
    /// Whether first-time setup has completed.
    pub installed: bool,
}

impl AppState {
    /// Creates the state.
    pub fn new(installed: bool) -> Self {
        Self { installed }
    }
}

/// The route chosen for a request, with what the handler needs.
#[derive(Debug, Clone)]
struct ResolvedRoute {
    route: Route,
    params: PathParams,
    options: RouteOptions,
}

/// A failure together with the request and response it happened on.
struct Failure {
    error: AppError,
    req: Request,
    res: Response,
    route: Option<ResolvedRoute>,
}

impl Failure {
    fn new(error: AppError, req: Request, res: Response) -> Self {
        Self {
            error,
            req,
            res,
            route: None,
        }
    }

    fn on_route(mut self, route: &ResolvedRoute) -> Self {
        self.route = Some(route.clone());
        self
    }
}

impl From<Interrupted> for Failure {
    fn from(interrupted: Interrupted) -> Self {
        Self::new(interrupted.error, interrupted.req, interrupted.res)
    }
}

/// The request dispatcher.
pub struct Application {
    router: Router,
    container: Container,
    error_handler: ErrorHandler,
    middlewares: Vec<MiddlewareRef>,
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("router", &self.router)
            .field("container", &self.container)
            .field("middlewares", &self.middlewares.len())
            .finish()
    }
}

impl Application {
    /// Creates an application around a configured router.
    ///
    /// The router is used as a template: every request works on a copy that
    /// holds the code-defined routes plus the routes loaded for the
    /// request's category.
    pub fn new(router: Router, container: Container) -> Self {
        let error_handler =
            ErrorHandler::new(router.base_path(), router.category_options().clone());
        Self {
            router,
            container,
            error_handler,
            middlewares: Vec::new(),
        }
    }

    /// Replaces the error renderer.
    #[must_use]
    pub fn error_renderer(mut self, renderer: Arc<dyn ErrorRenderer>) -> Self {
        self.error_handler = self.error_handler.renderer(renderer);
        self
    }

    /// Returns the router template.
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Returns the router template for direct registration.
    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    /// Returns the error handler.
    pub fn error_handler(&self) -> &ErrorHandler {
        &self.error_handler
    }

    /// Adds a code-defined route.
    pub fn add_route(&mut self, method: Method, pattern: &str, handler: &str) -> AppResult<()> {
        self.router
            .add_route(method, pattern, handler, RouteOptions::default(), None)?;
        Ok(())
    }

    /// Adds a global middleware.
    pub fn add_middleware(&mut self, middleware: impl Into<MiddlewareRef>) {
        self.middlewares.push(middleware.into());
    }

    /// Adds a middleware to a route.
    ///
    /// Middlewares added here run after the route's loaded middlewares,
    /// so a loaded `auth` middleware always runs first.
    pub fn add_route_middleware(
        &mut self,
        method: Method,
        handler: &str,
        middleware: impl Into<MiddlewareRef>,
    ) {
        self.router.add_route_middleware(method, handler, middleware);
    }

    /// Handles one request.
    ///
    /// Failures are rendered by the error handler; only a failure of the
    /// error handler itself is returned as `Err`.
    pub async fn handle(&self, req: Request, state: AppState) -> AppResult<Response> {
        match self.process(req, state).await {
            Ok(res) => Ok(res),
            Err(failure) => self.recover(failure, state).await,
        }
    }

    async fn process(&self, req: Request, state: AppState) -> Result<Response, Failure> {
        let res = Response::ok();

        let global = self
            .run_chain(&self.middlewares, &RouteOptions::default(), req, res)
            .await?;
        let (req, res) = match global {
            Outcome::Continue(req, res) => (req, res),
            Outcome::ShortCircuit(res) => return Ok(res),
        };

        let method = req.method;
        let mut router = self.router.clone();
        // HEAD is answered by GET routes when it has none of its own.
        let load_methods: &[Method] = if method == Method::Head {
            &[Method::Head, Method::Get]
        } else {
            std::slice::from_ref(&method)
        };
        for &load in load_methods {
            match router.load_routes(load, &req.path).await {
                Ok(category) => debug!(method = %load, path = %req.path, %category, "routes loaded"),
                Err(e) => return Err(Failure::new(e.into(), req, res)),
            }
        }
        let dispatch = match router.dispatch(method, &req.path) {
            Ok(dispatch) => dispatch,
            Err(e) => return Err(Failure::new(e.into(), req, res)),
        };

        let (resolved, table_method, res) = match dispatch {
            Dispatch::Found(found) => {
                let options = router
                    .route_options(found.method, &found.route)
                    .cloned()
                    .unwrap_or_default();
                let resolved = ResolvedRoute {
                    route: found.route,
                    params: found.params,
                    options,
                };
                (resolved, found.method, res)
            }
            outcome => {
                debug!(%method, path = %req.path, ?outcome, "no route matched");
                if self.error_handler.requires_install_redirect(&req, state) {
                    return Ok(self.error_handler.handle_route_error(&req, res, state));
                }
                let res = match outcome {
                    Dispatch::MethodNotAllowed(allowed) => {
                        let allow: Vec<&str> = allowed.iter().map(Method::as_str).collect();
                        res.header("Allow", allow.join(", "))
                    }
                    _ => res,
                };
                let resolved = ResolvedRoute {
                    route: Route {
                        handler: PAGE_NOT_FOUND_HANDLER.to_string(),
                        route_id: None,
                        pattern: String::new(),
                    },
                    params: PathParams::new(),
                    options: RouteOptions::default(),
                };
                (resolved, method, res)
            }
        };

        let refs = router
            .route_middlewares(table_method, &resolved.route.handler)
            .to_vec();
        let chain = self
            .run_chain(&refs, &resolved.options, req, res)
            .await
            .map_err(|f| f.on_route(&resolved))?;
        let (req, res) = match chain {
            Outcome::Continue(req, res) => (req, res),
            Outcome::ShortCircuit(res) => return Ok(res),
        };

        let retry_req = req.clone();
        let retry_res = res.clone();
        self.invoke(&resolved, req, res)
            .await
            .map_err(|e| Failure::new(e, retry_req, retry_res).on_route(&resolved))
    }

    /// Resolves a middleware chain and runs it.
    ///
    /// Every reference is resolved before the first middleware runs.
    async fn run_chain(
        &self,
        refs: &[MiddlewareRef],
        options: &RouteOptions,
        req: Request,
        res: Response,
    ) -> Result<Outcome, Failure> {
        let resolved: AppResult<Pipeline> = refs
            .iter()
            .map(|reference| self.container.resolve_middleware(reference, options))
            .collect();
        let pipeline = match resolved {
            Ok(pipeline) => pipeline,
            Err(e) => return Err(Failure::new(e, req, res)),
        };
        pipeline.run(req, res).await.map_err(Failure::from)
    }

    /// Resolves and runs the route's handler.
    async fn invoke(&self, route: &ResolvedRoute, req: Request, res: Response) -> AppResult<Response> {
        let (mut handler, action) = self.container.resolve_handler(&route.route.handler)?;
        let validator = crate::validator::Validator::new(
            request_data(&route.params, req.parsed_body.as_ref()),
            handler.data_valid_callback(),
            handler.validation_error_callback(),
        );

        let options = serde_json::to_value(&route.options)
            .map_err(|e| AppError::application(e.to_string()))?;
        let path = req.path.clone();
        let req = req
            .with_params(route.params.clone())
            .with_attribute(ROUTE_ATTRIBUTE, options)
            .with_attribute(CURRENT_PATH_ATTRIBUTE, path);

        debug!(handler = %route.route.handler, action = %action, "invoking handler");
        handler.set_http_response(res.clone());
        let returned = AssertUnwindSafe(handler.handle(&action, req, res.clone(), validator))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(panic_error(payload)))?;

        Ok(match returned {
            Some(response) => response,
            None => handler.http_response().unwrap_or(res),
        })
    }

    async fn recover(&self, failure: Failure, state: AppState) -> AppResult<Response> {
        let Failure {
            error,
            req,
            res,
            route,
        } = failure;
        let rendered = self.error_handler.render_exception(&error, &req, res, state)?;

        match route {
            Some(route) if self.error_handler.is_install_page(&req) => {
                warn!(path = %req.path, error = %error, "retrying install page handler");
                match self.invoke(&route, req.clone(), rendered.clone()).await {
                    Ok(res) => Ok(res),
                    Err(e) => self.error_handler.render_exception(&e, &req, rendered, state),
                }
            }
            _ => Ok(rendered),
        }
    }
}

/// Merges route placeholders with the parsed body; body keys win.
fn request_data(params: &PathParams, body: Option<&Value>) -> Map<String, Value> {
    let mut data: Map<String, Value> = params
        .iter()
        .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
        .collect();
    if let Some(Value::Object(fields)) = body {
        for (k, v) in fields {
            data.insert(k.clone(), v.clone());
        }
    }
    data
}

//! Route handlers.
//!
//! Handlers are resolved per request from a `Class:method` reference: the
//! class part selects a registered factory, the method part is passed to
//! [`Handler::handle`] as the action.

use futures::future::BoxFuture;
use serde_json::json;

use crate::error::AppResult;
use crate::error_handler::render_html_page;
use crate::request::Request;
use crate::response::Response;
use crate::validator::{DataValidCallback, ValidationErrorCallback, Validator};

/// Handler reference used when no route matched.
pub const PAGE_NOT_FOUND_HANDLER: &str = "core.error:page_not_found";

/// Callbacks a handler supplies to the request validator.
pub trait Validatable {
    /// Called with the data when validation succeeds.
    fn data_valid_callback(&self) -> Option<DataValidCallback>;

    /// Called with the errors when validation fails.
    fn validation_error_callback(&self) -> Option<ValidationErrorCallback>;
}

/// A request handler instance.
pub trait Handler: Validatable + Send {
    /// Injects the in-flight response before the handler runs.
    fn set_http_response(&mut self, response: Response);

    /// Takes the response the handler stored on itself.
    fn http_response(&mut self) -> Option<Response>;

    /// Runs an action.
    ///
    /// Returning `None` makes the application fall back to the stored
    /// response.
    fn handle<'a>(
        &'a mut self,
        action: &'a str,
        req: Request,
        res: Response,
        validator: Validator,
    ) -> BoxFuture<'a, AppResult<Option<Response>>>;
}

type HandlerFn = dyn Fn(&str, Request, Response, Validator) -> AppResult<Option<Response>> + Send + Sync;

/// Handler backed by a synchronous closure.
pub struct FnHandler {
    f: Box<HandlerFn>,
    response: Option<Response>,
}

impl FnHandler {
    /// Wraps a closure.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str, Request, Response, Validator) -> AppResult<Option<Response>>
            + Send
            + Sync
            + 'static,
    {
        Self {
            f: Box::new(f),
            response: None,
        }
    }
}

impl Validatable for FnHandler {
    fn data_valid_callback(&self) -> Option<DataValidCallback> {
        None
    }

    fn validation_error_callback(&self) -> Option<ValidationErrorCallback> {
        None
    }
}

impl Handler for FnHandler {
    fn set_http_response(&mut self, response: Response) {
        self.response = Some(response);
    }

    fn http_response(&mut self) -> Option<Response> {
        self.response.take()
    }

    fn handle<'a>(
        &'a mut self,
        action: &'a str,
        req: Request,
        res: Response,
        validator: Validator,
    ) -> BoxFuture<'a, AppResult<Option<Response>>> {
        Box::pin(async move { (self.f)(action, req, res, validator) })
    }
}

/// Renders the 404 page for unmatched requests.
#[derive(Debug, Default)]
pub struct NotFoundHandler {
    response: Option<Response>,
}

impl NotFoundHandler {
    /// Creates the handler.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Validatable for NotFoundHandler {
    fn data_valid_callback(&self) -> Option<DataValidCallback> {
        None
    }

    fn validation_error_callback(&self) -> Option<ValidationErrorCallback> {
        None
    }
}

impl Handler for NotFoundHandler {
    fn set_http_response(&mut self, response: Response) {
        self.response = Some(response);
    }

    fn http_response(&mut self) -> Option<Response> {
        self.response.take()
    }

    fn handle<'a>(
        &'a mut self,
        _action: &'a str,
        req: Request,
        res: Response,
        _validator: Validator,
    ) -> BoxFuture<'a, AppResult<Option<Response>>> {
        Box::pin(async move {
            let res = if req.is_json() {
                let body = json!({
                    "status": "error",
                    "code": 404,
                    "errors": ["Page not found"],
                });
                res.header("Content-Type", "application/json")
                    .body(body.to_string())
            } else {
                res.header("Content-Type", "text/html; charset=utf-8")
                    .body(render_html_page("Page not found", "The requested page does not exist."))
            };
            Ok(Some(res.status(404)))
        })
    }
}

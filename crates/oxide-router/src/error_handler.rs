//! Conversion of pipeline failures into responses.

use std::sync::Arc;

use ironhtml::typed::Document;
use ironhtml_elements::{Body, Div, Head, Html, Meta, Title, H1, P};
use serde_json::json;
use tracing::{error, info};

use crate::app::AppState;
use crate::category::{route_path, CategoryOptions};
use crate::error::{AppError, AppResult};
use crate::request::Request;
use crate::response::Response;

/// Body flavor of a rendered error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderFormat {
    /// `text/html`.
    Html,
    /// `application/json`.
    Json,
}

impl RenderFormat {
    /// Picks JSON for JSON requests and HTML otherwise.
    pub fn negotiate(req: &Request) -> Self {
        if req.is_json() {
            Self::Json
        } else {
            Self::Html
        }
    }

    /// Returns the response content type.
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Html => "text/html; charset=utf-8",
            Self::Json => "application/json",
        }
    }
}

/// Produces the body of an error response.
pub trait ErrorRenderer: Send + Sync {
    /// Renders the error in the given flavor.
    fn render(&self, error: &AppError, format: RenderFormat) -> AppResult<String>;
}

/// Renders errors as a JSON document or a minimal HTML page.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultRenderer;

impl ErrorRenderer for DefaultRenderer {
    fn render(&self, error: &AppError, format: RenderFormat) -> AppResult<String> {
        let message = error.to_string();
        match format {
            RenderFormat::Json => {
                let body = json!({
                    "status": "error",
                    "code": 400,
                    "errors": [message],
                });
                serde_json::to_string(&body).map_err(|e| AppError::application(e.to_string()))
            }
            RenderFormat::Html => Ok(render_html_page("Application error", &message)),
        }
    }
}

/// Renders a standalone HTML page with a heading and one paragraph.
pub fn render_html_page(title: &str, message: &str) -> String {
    Document::new()
        .doctype()
        .root::<Html, _>(|html| {
            html.attr("lang", "en")
                .child::<Head, _>(|head| {
                    head.child::<Meta, _>(|m| m.attr("charset", "UTF-8"))
                        .child::<Title, _>(|t| t.text(title))
                })
                .child::<Body, _>(|body| {
                    body.child::<Div, _>(|div| {
                        div.class("error-page")
                            .child::<H1, _>(|h| h.text(title))
                            .child::<P, _>(|p| p.text(message))
                    })
                })
        })
        .build()
}

/// Converts failures and unmatched routes into responses.
///
/// Until setup is complete every failure outside the install flow becomes a
/// redirect to the install page.
#[derive(Clone)]
pub struct ErrorHandler {
    renderer: Arc<dyn ErrorRenderer>,
    categories: CategoryOptions,
    base_path: String,
}

impl std::fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHandler")
            .field("install_url", &self.install_url())
            .finish()
    }
}

impl ErrorHandler {
    /// Creates a handler using the default renderer.
    pub fn new(base_path: impl Into<String>, categories: CategoryOptions) -> Self {
        let base_path: String = base_path.into();
        Self {
            renderer: Arc::new(DefaultRenderer),
            categories,
            base_path: base_path.trim_end_matches('/').to_string(),
        }
    }

    /// Replaces the renderer.
    #[must_use]
    pub fn renderer(mut self, renderer: Arc<dyn ErrorRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Returns the absolute install page path.
    pub fn install_url(&self) -> String {
        format!("{}{}", self.base_path, self.categories.install_page)
    }

    pub(crate) fn is_install_page(&self, req: &Request) -> bool {
        self.categories
            .is_install_page(route_path(&self.base_path, &req.path))
    }

    fn is_install_api(&self, req: &Request) -> bool {
        self.categories
            .is_install_api(route_path(&self.base_path, &req.path))
    }

    /// Renders a failure.
    ///
    /// Before setup: install API requests keep the response, the install
    /// page keeps it too, anything else is redirected to the install page.
    /// After setup: the body is rendered in the negotiated flavor and the
    /// status is always 400. A renderer failure is returned as an error.
    pub fn render_exception(
        &self,
        err: &AppError,
        req: &Request,
        res: Response,
        state: AppState,
    ) -> AppResult<Response> {
        if !state.installed {
            if self.is_install_api(req) || self.is_install_page(req) {
                return Ok(res);
            }
            info!(path = %req.path, error = %err, "not installed, redirecting to install page");
            return Ok(self.redirect_to_install_page());
        }

        error!(method = %req.method, path = %req.path, error = %err, "request failed");

        let base = match err {
            AppError::AccessDenied {
                response: Some(response),
                ..
            } => (**response).clone(),
            _ => res,
        };
        let format = RenderFormat::negotiate(req);
        let body = self.renderer.render(err, format)?;

        Ok(base
            .header("Content-Type", format.content_type())
            .body(body)
            .status(400))
    }

    /// Handles a dispatch that matched no route.
    ///
    /// Before setup, requests outside the install flow are redirected to the
    /// install page; otherwise the response passes through unchanged.
    pub fn handle_route_error(&self, req: &Request, res: Response, state: AppState) -> Response {
        if self.requires_install_redirect(req, state) {
            info!(path = %req.path, "no route before install, redirecting to install page");
            self.redirect_to_install_page()
        } else {
            res
        }
    }

    /// Returns whether an unmatched request must go to the install page.
    pub fn requires_install_redirect(&self, req: &Request, state: AppState) -> bool {
        !state.installed && !self.is_install_page(req) && !self.is_install_api(req)
    }

    /// Builds the install page redirect.
    pub fn redirect_to_install_page(&self) -> Response {
        Response::new(307)
            .header("Cache-Control", "no-cache, must-revalidate")
            .header("Content-Length", "0")
            .header("Expires", "Sat, 26 Jul 1997 05:00:00 GMT")
            .header("Location", self.install_url())
    }
}

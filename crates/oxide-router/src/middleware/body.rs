//! Request body parsing middleware.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use super::{Middleware, Outcome};
use crate::error::{AppError, AppResult};
use crate::request::Request;
use crate::response::Response;

/// Decodes a raw body. `Value::Null` means "nothing parsed".
pub type BodyParser = Arc<dyn Fn(&[u8]) -> AppResult<Value> + Send + Sync>;

/// Parses the request body according to its media type.
///
/// Parsers are registered per media type without parameters. A media type
/// with a structured suffix (`application/vnd.api+json`) falls back to the
/// parser of `application/<suffix>`.
#[derive(Clone)]
pub struct BodyParsingMiddleware {
    parsers: HashMap<String, BodyParser>,
}

impl Default for BodyParsingMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl BodyParsingMiddleware {
    /// Creates the middleware with the JSON and form parsers registered.
    pub fn new() -> Self {
        Self::empty()
            .parser("application/json", |input| {
                Ok(match serde_json::from_slice::<Value>(input) {
                    Ok(value @ (Value::Object(_) | Value::Array(_))) => value,
                    _ => Value::Null,
                })
            })
            .parser("application/x-www-form-urlencoded", |input| {
                let text = String::from_utf8_lossy(input);
                let data = Request::parse_query_string(&text)
                    .into_iter()
                    .map(|(k, v)| (k, Value::String(v)))
                    .collect();
                Ok(Value::Object(data))
            })
    }

    /// Creates the middleware without any parsers.
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Registers a parser for a media type.
    #[must_use]
    pub fn parser<F>(mut self, media_type: &str, parser: F) -> Self
    where
        F: Fn(&[u8]) -> AppResult<Value> + Send + Sync + 'static,
    {
        self.parsers
            .insert(media_type.to_ascii_lowercase(), Arc::new(parser));
        self
    }

    /// Returns whether a parser exists for the media type.
    pub fn has_parser(&self, media_type: &str) -> bool {
        self.parsers.contains_key(media_type)
    }

    fn parse(&self, req: &Request) -> AppResult<Option<Value>> {
        let Some(media_type) = media_type(req) else {
            return Ok(None);
        };

        let parser = self.parsers.get(&media_type).or_else(|| {
            let suffix = media_type.rsplit_once('+')?.1;
            self.parsers.get(&format!("application/{suffix}"))
        });
        let Some(parser) = parser else {
            return Ok(None);
        };

        match parser(&req.body)? {
            Value::Null => Ok(None),
            value @ (Value::Object(_) | Value::Array(_)) => Ok(Some(value)),
            _ => Err(AppError::BodyParse(
                "media type parser must return an array, an object, or nothing".to_string(),
            )),
        }
    }
}

/// Returns the lower-cased media type without parameters.
fn media_type(req: &Request) -> Option<String> {
    let content_type = req.get_header("Content-Type")?;
    let media_type = content_type.split(';').next()?.trim();
    if media_type.is_empty() {
        None
    } else {
        Some(media_type.to_ascii_lowercase())
    }
}

fn is_empty_body(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::Object(map)) => map.is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(_) => false,
    }
}

impl Middleware for BodyParsingMiddleware {
    fn process(&self, req: Request, res: Response) -> BoxFuture<'_, AppResult<Outcome>> {
        Box::pin(async move {
            let req = if is_empty_body(req.parsed_body.as_ref()) {
                let parsed = self.parse(&req)?;
                req.with_parsed_body(parsed)
            } else {
                req
            };

            let res = if res.has_header("Content-Length") {
                res
            } else {
                let len = res.body.len().to_string();
                res.header("Content-Length", len)
            };

            Ok(Outcome::Continue(req, res))
        })
    }
}

//! Client address middleware.

use std::net::IpAddr;

use futures::future::BoxFuture;
use serde_json::Value;

use super::{Middleware, Outcome};
use crate::error::AppResult;
use crate::request::Request;
use crate::response::Response;

/// Request attribute holding the detected client address.
pub const CLIENT_IP_ATTRIBUTE: &str = "client_ip";

/// Headers checked for the client address, in priority order.
const IP_HEADERS: [&str; 6] = [
    "Client-Ip",
    "X-Forwarded-For",
    "X-Forwarded",
    "X-Cluster-Client-Ip",
    "Forwarded-For",
    "Forwarded",
];

/// Stores the client address in the `client_ip` request attribute.
///
/// Proxy headers win over the transport's peer address. When nothing yields
/// a valid address the attribute is `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientIpMiddleware;

impl ClientIpMiddleware {
    /// Detects the client address of a request.
    pub fn client_ip(req: &Request) -> Option<IpAddr> {
        IP_HEADERS
            .iter()
            .filter_map(|name| req.get_header(name))
            .find_map(first_valid_ip)
            .or(req.remote_addr)
    }
}

/// Returns the first parseable address in a comma-separated header value.
///
/// Accepts `for=` pairs as used by the `Forwarded` header.
fn first_valid_ip(value: &str) -> Option<IpAddr> {
    value.split([',', ';']).find_map(|part| {
        let part = part.trim();
        let part = part
            .strip_prefix("for=")
            .or_else(|| part.strip_prefix("For="))
            .unwrap_or(part)
            .trim_matches('"');
        part.parse().ok()
    })
}

impl Middleware for ClientIpMiddleware {
    fn process(&self, req: Request, res: Response) -> BoxFuture<'_, AppResult<Outcome>> {
        Box::pin(async move {
            let ip = Self::client_ip(&req).map_or(Value::Null, |ip| Value::String(ip.to_string()));
            Ok(Outcome::Continue(
                req.with_attribute(CLIENT_IP_ATTRIBUTE, ip),
                res,
            ))
        })
    }
}

//! Cross-Origin Resource Sharing headers.
//!
//! CORS is applied in two passes around routing:
//!
//! 1. **Pre-routing**: `Access-Control-Allow-Origin` and
//!    `Access-Control-Allow-Credentials`, so they are present even when
//!    routing fails.
//! 2. **Post-routing**: once the verbs of the matched pattern are known,
//!    `Allow`, `Access-Control-Allow-Methods`, `Access-Control-Allow-Headers`,
//!    `Access-Control-Expose-Headers` and `Access-Control-Max-Age`.
//!
//! A request is treated as cross-origin when it carries an `Origin` header and
//! the configured origin policy is enabled. `Allow` is advertised for every
//! request regardless.

use tracing::debug;

use crate::config::{AllowOrigin, CorsConfig};
use crate::http::{Request, Response};

/// CORS policy bound to a configuration.
///
/// # Examples
///
/// ```
/// use rttp_dispatch::config::{AllowOrigin, CorsConfig};
/// use rttp_dispatch::http::{Method, Request, Response};
/// use rttp_dispatch::security::Cors;
///
/// let config = CorsConfig { origin: AllowOrigin::Flag(true), ..CorsConfig::default() };
/// let request = Request::new(Method::Get, "/").with_header("Origin", "https://a.test");
/// let mut response = Response::new();
///
/// let cors = Cors::new(&config);
/// cors.pre_routing(&request, &mut response);
/// assert_eq!(response.header("access-control-allow-origin"), Some("https://a.test"));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Cors<'c> {
    config: &'c CorsConfig,
}

impl<'c> Cors<'c> {
    pub fn new(config: &'c CorsConfig) -> Self {
        Self { config }
    }

    /// Returns `true` when `request` is cross-origin under this policy.
    pub fn applies(&self, request: &Request) -> bool {
        request.origin().is_some() && self.config.origin.is_enabled()
    }

    /// Origin and credentials headers, set before routing.
    pub fn pre_routing(&self, request: &Request, response: &mut Response) {
        if !self.applies(request) {
            return;
        }
        let Some(origin) = request.origin() else {
            return;
        };

        let allow = match &self.config.origin {
            AllowOrigin::Flag(_) => {
                response.add_header("Vary", "Origin", false);
                origin
            }
            AllowOrigin::Exact(exact) => exact.as_str(),
        };
        debug!(origin, allow, "cross-origin request");

        response.add_header("Access-Control-Allow-Origin", allow, true);
        response.add_header(
            "Access-Control-Allow-Credentials",
            if self.config.credentials { "true" } else { "false" },
            true,
        );
    }

    /// Method and capability headers, set once the allowed `verbs` are known.
    ///
    /// Headers already present on the response are left alone, except
    /// `Access-Control-Expose-Headers` and `Access-Control-Max-Age`.
    pub fn post_routing(&self, request: &Request, response: &mut Response, verbs: &[String]) {
        let cors = self.applies(request);
        let allowed = verbs.join(",");

        if cors {
            if let Some(expose) = self.config.expose.as_deref().filter(|e| !e.is_empty()) {
                response.add_header("Access-Control-Expose-Headers", expose, true);
            }
        }

        if response.header("allow").is_none() {
            response.add_header("Allow", allowed.as_str(), true);
        }

        if !cors {
            return;
        }

        if response.header("access-control-allow-methods").is_none() {
            response.add_header("Access-Control-Allow-Methods", format!("OPTIONS,{allowed}"), true);
        }

        if let Some(headers) = self.config.headers.as_deref().filter(|h| !h.is_empty()) {
            if response.header("access-control-allow-headers").is_none() {
                response.add_header("Access-Control-Allow-Headers", headers, true);
            }
        }

        if self.config.ttl > 0 {
            response.add_header("Access-Control-Max-Age", self.config.ttl.to_string(), true);
        }
    }
}

//! Pipeline-wide fault type.
//!
//! Every dispatch stage returns `Result<_, Fault>`. The kernel's `run`
//! boundary turns any fault into the error stage, so handlers can use `?`
//! freely without ever taking the kernel down.

use std::error::Error as StdError;
use std::fmt;

use serde_json::Value;
use thiserror::Error;

use crate::context::Params;
use crate::http::{CookieError, Headers, StatusError, status_text};
use crate::router::RouteError;

/// Boxed error type accepted from handler code.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// A domain error carrying an explicit HTTP status.
///
/// # Examples
///
/// ```
/// use rttp_dispatch::HttpError;
///
/// let err = HttpError::new(403).message("members only");
/// assert_eq!(err.to_string(), "members only");
/// assert_eq!(HttpError::new(404).to_string(), "404 Not Found");
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpError {
    pub code: u16,
    pub message: Option<String>,
    pub headers: Headers,
    pub payload: Option<Value>,
}

impl HttpError {
    pub fn new(code: u16) -> Self {
        Self {
            code,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => f.write_str(message),
            None => write!(f, "{} {}", self.code, status_text(self.code)),
        }
    }
}

impl StdError for HttpError {}

/// Where a [`Redirection`] points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectTarget {
    /// A literal URL or path.
    Url(String),
    /// A named route, resolved through the alias table.
    Route { alias: String, args: Params },
    /// The previous URL, or `fallback` when none is known.
    Back { fallback: Option<String> },
}

/// A redirect requested from inside a handler.
///
/// # Examples
///
/// ```
/// use rttp_dispatch::{Fault, Redirection};
///
/// fn handler() -> Result<(), Fault> {
///     Err(Redirection::url("/login").into())
/// }
/// assert!(matches!(handler(), Err(Fault::Redirect(_))));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirection {
    pub target: RedirectTarget,
    pub permanent: bool,
    pub code: Option<u16>,
}

impl Redirection {
    pub fn url(url: impl Into<String>) -> Self {
        Self::with_target(RedirectTarget::Url(url.into()))
    }

    pub fn route(alias: impl Into<String>, args: Params) -> Self {
        Self::with_target(RedirectTarget::Route {
            alias: alias.into(),
            args,
        })
    }

    pub fn back(fallback: Option<String>) -> Self {
        Self::with_target(RedirectTarget::Back { fallback })
    }

    fn with_target(target: RedirectTarget) -> Self {
        Self {
            target,
            permanent: false,
            code: None,
        }
    }

    #[must_use]
    pub fn permanent(mut self, permanent: bool) -> Self {
        self.permanent = permanent;
        self
    }

    #[must_use]
    pub fn code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }
}

impl fmt::Display for Redirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            RedirectTarget::Url(url) => write!(f, "redirecting to: \"{url}\""),
            RedirectTarget::Route { alias, .. } => write!(f, "redirecting to route: {alias}"),
            RedirectTarget::Back { .. } => f.write_str("redirecting back"),
        }
    }
}

/// Any failure raised while dispatching a request.
#[derive(Debug, Error)]
pub enum Fault {
    /// Route table misconfiguration. Fatal at the call site.
    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Cookie(#[from] CookieError),

    #[error(transparent)]
    Status(#[from] StatusError),

    /// Domain error with an explicit status code.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// Not an error: unwinds to the pipeline, which performs the redirect.
    #[error("{0}")]
    Redirect(Redirection),

    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else a handler reports.
    #[error("{message}")]
    Handler {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
}

impl Fault {
    /// Shorthand for an [`HttpError`] without message.
    pub fn http(code: u16) -> Self {
        Self::Http(HttpError::new(code))
    }

    pub fn not_found() -> Self {
        Self::http(404)
    }

    /// A handler failure carrying only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Handler {
            message: message.into(),
            source: None,
        }
    }

    /// Wraps an arbitrary error as a handler failure.
    pub fn wrap<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Handler {
            message: error.to_string(),
            source: Some(Box::new(error)),
        }
    }

    /// The status code this fault renders with.
    pub fn code(&self) -> u16 {
        match self {
            Self::Http(err) => err.code,
            _ => 500,
        }
    }

    /// The message to render, if the fault carries one of its own.
    pub fn message(&self) -> Option<String> {
        match self {
            Self::Http(err) => err.message.clone(),
            other => Some(other.to_string()).filter(|m| !m.is_empty()),
        }
    }

    /// The fault followed by its chain of sources, one per line.
    pub fn trace(&self) -> Vec<String> {
        let mut lines = vec![format!("#0 {self}")];
        let mut source = self.source();
        while let Some(err) = source {
            lines.push(format!("#{} {err}", lines.len()));
            source = err.source();
        }
        lines
    }
}

impl From<Redirection> for Fault {
    fn from(redirection: Redirection) -> Self {
        Self::Redirect(redirection)
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn http_faults_keep_their_code() {
        assert_eq!(Fault::not_found().code(), 404);
        assert_eq!(Fault::not_found().message(), None);
        assert_eq!(Fault::msg("boom").code(), 500);
        assert_eq!(Fault::msg("boom").message().as_deref(), Some("boom"));
    }

    #[test]
    fn route_errors_render_their_message() {
        let fault: Fault = RouteError::NoRoutes.into();
        assert_eq!(fault.to_string(), "No route defined");
        assert_eq!(fault.code(), 500);
    }

    #[test]
    fn trace_walks_the_source_chain() {
        let fault = Fault::wrap(io::Error::other("disk gone"));
        let trace = fault.trace();
        assert_eq!(trace[0], "#0 disk gone");
        assert_eq!(trace[1], "#1 disk gone");
        assert_eq!(trace.len(), 2);
    }
}

//! The events emitted by the dispatch pipeline.

use serde_json::Value;

use super::Event;
use crate::error::Fault;
use crate::handler::Reply;
use crate::http::{Body, Headers, status_text};
use crate::router::RouteMatch;

/// Response data a listener may supply or adjust.
#[derive(Debug, Default, Clone)]
pub struct Outcome {
    pub output: Option<Body>,
    pub code: Option<u16>,
    pub headers: Headers,
    pub mime: Option<String>,
    /// Throttle rate in kilobits per second.
    pub rate: Option<u32>,
}

impl Outcome {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_output(mut self, output: impl Into<Body>) -> Self {
        self.output = Some(output.into());
        self
    }

    #[must_use]
    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.add(name, value, false);
        self
    }

    #[must_use]
    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    #[must_use]
    pub fn with_rate(mut self, kbps: u32) -> Self {
        self.rate = Some(kbps);
        self
    }
}

macro_rules! lifecycle_event {
    ($ty:ident, $name:literal) => {
        impl Event for $ty {
            const NAME: &'static str = $name;

            fn is_propagation_stopped(&self) -> bool {
                self.stopped
            }

            fn stop_propagation(&mut self) {
                self.stopped = true;
            }
        }
    };
}

/// Emitted before routing. Setting output intercepts the request.
#[derive(Debug)]
pub struct RequestEvent {
    pub verb: String,
    pub path: String,
    pub outcome: Outcome,
    stopped: bool,
}

impl RequestEvent {
    pub fn new(verb: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            path: path.into(),
            outcome: Outcome::default(),
            stopped: false,
        }
    }

    /// Answers the request directly and stops propagation.
    pub fn set_output(&mut self, output: impl Into<Body>) {
        self.outcome.output = Some(output.into());
        self.stopped = true;
    }
}

lifecycle_event!(RequestEvent, "request");

/// Emitted once a route matched. Listeners may rewrite the match or answer
/// directly.
#[derive(Debug)]
pub struct RouteMatchedEvent {
    pub route: RouteMatch,
    pub outcome: Outcome,
    stopped: bool,
}

impl RouteMatchedEvent {
    pub fn new(route: RouteMatch) -> Self {
        Self {
            route,
            outcome: Outcome::default(),
            stopped: false,
        }
    }

    pub fn set_output(&mut self, output: impl Into<Body>) {
        self.outcome.output = Some(output.into());
        self.stopped = true;
    }
}

lifecycle_event!(RouteMatchedEvent, "route.matched");

/// Emitted with the handler's result and captured output, before sending.
#[derive(Debug)]
pub struct ResponseEvent {
    pub reply: Reply,
    pub outcome: Outcome,
    stopped: bool,
}

impl ResponseEvent {
    pub fn new(reply: Reply, outcome: Outcome) -> Self {
        Self {
            reply,
            outcome,
            stopped: false,
        }
    }

    pub fn set_output(&mut self, output: impl Into<Body>) {
        self.outcome.output = Some(output.into());
        self.stopped = true;
    }
}

lifecycle_event!(ResponseEvent, "response");

/// Emitted once per error, to the first listener only.
#[derive(Debug)]
pub struct ErrorEvent {
    pub code: u16,
    pub message: Option<String>,
    pub headers: Headers,
    pub payload: Option<Value>,
    pub verb: String,
    pub path: String,
    /// Listener-supplied replacement for the rendered error.
    pub outcome: Outcome,
    fault: Option<Fault>,
    stopped: bool,
}

impl ErrorEvent {
    pub fn new(code: u16, verb: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            code,
            message: None,
            headers: Headers::new(),
            payload: None,
            verb: verb.into(),
            path: path.into(),
            outcome: Outcome::default(),
            fault: None,
            stopped: false,
        }
    }

    /// Builds the event from a fault, taking over its code, message,
    /// headers and payload.
    pub fn from_fault(fault: Fault, verb: impl Into<String>, path: impl Into<String>) -> Self {
        let mut event = Self::new(fault.code(), verb, path);
        event.message = fault.message();
        if let Fault::Http(http) = &fault {
            event.headers = http.headers.clone();
            event.payload = http.payload.clone();
        }
        event.fault = Some(fault);
        event
    }

    pub fn text(&self) -> &'static str {
        status_text(self.code)
    }

    pub fn fault(&self) -> Option<&Fault> {
        self.fault.as_ref()
    }

    /// The originating fault and its sources; empty for explicit errors.
    pub fn trace(&self) -> Vec<String> {
        self.fault.as_ref().map(Fault::trace).unwrap_or_default()
    }

    /// Replaces the rendered error body and stops propagation.
    pub fn set_output(&mut self, output: impl Into<Body>) {
        self.outcome.output = Some(output.into());
        self.stopped = true;
    }
}

lifecycle_event!(ErrorEvent, "error");

/// Emitted before a redirect. Stopping propagation suppresses `Location`.
#[derive(Debug)]
pub struct RedirectEvent {
    pub code: u16,
    pub url: String,
    pub permanent: bool,
    pub outcome: Outcome,
    stopped: bool,
}

impl RedirectEvent {
    pub fn new(code: u16, url: impl Into<String>, permanent: bool) -> Self {
        Self {
            code,
            url: url.into(),
            permanent,
            outcome: Outcome::default(),
            stopped: false,
        }
    }

    pub fn set_output(&mut self, output: impl Into<Body>) {
        self.outcome.output = Some(output.into());
        self.stopped = true;
    }
}

lifecycle_event!(RedirectEvent, "redirect");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HttpError;

    #[test]
    fn error_event_takes_over_http_fault_details() {
        let fault: Fault = HttpError::new(403)
            .message("members only")
            .header("WWW-Authenticate", "Basic")
            .into();
        let event = ErrorEvent::from_fault(fault, "GET", "/club");
        assert_eq!(event.code, 403);
        assert_eq!(event.text(), "Forbidden");
        assert_eq!(event.message.as_deref(), Some("members only"));
        assert_eq!(event.headers.get("www-authenticate"), Some("Basic"));
        assert_eq!(event.trace().len(), 1);
    }

    #[test]
    fn set_output_stops_propagation() {
        let mut event = RequestEvent::new("GET", "/");
        assert!(!event.is_propagation_stopped());
        event.set_output("busy");
        assert!(event.is_propagation_stopped());
    }
}

//! The dispatch pipeline: request, match, invoke, respond, and the error path.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::json;
use tracing::{debug, warn};

use super::Kernel;
use crate::config::ErrorFormat;
use crate::context::{HandlerContext, Params};
use crate::error::Fault;
use crate::events::{Dispatch, ErrorEvent, Event, Outcome, RequestEvent, ResponseEvent, RouteMatchedEvent};
use crate::handler::{Handler, Reply};
use crate::http::Body;
use crate::logging::level_for;
use crate::router::{Lookup, RouteError};
use crate::security::Cors;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(code|text|message|trace)\}").expect("placeholder pattern is valid"));

impl Kernel<'_> {
    /// Runs the pipeline once. Every fault raised on the way is rendered
    /// through [`Kernel::error`].
    ///
    /// # Errors
    ///
    /// Only what rendering the error itself fails with, usually
    /// [`Fault::Io`].
    pub fn run(&mut self) -> Result<(), Fault> {
        match self.dispatch() {
            Ok(()) => Ok(()),
            Err(fault) => self.error(fault),
        }
    }

    fn dispatch(&mut self) -> Result<(), Fault> {
        let app = self.app;

        let mut event = RequestEvent::new(self.verb(), self.path.clone());
        app.events.dispatch(&mut event, Dispatch::All)?;
        if self.is_sent() {
            return Ok(());
        }
        if event.is_propagation_stopped() {
            debug!("request intercepted");
            return self.respond(Reply::Empty, event.outcome);
        }

        let cors = Cors::new(&app.config.cors);
        cors.pre_routing(&self.request, &mut self.response);

        if app.router.is_empty() {
            return Err(RouteError::NoRoutes.into());
        }

        let options = self.is_verb(&["OPTIONS"]);
        let lookup = app.router.lookup(&self.path, self.verb());
        match &lookup {
            Lookup::NotFound => return Err(Fault::not_found()),
            Lookup::MethodMismatch { pattern, .. } if !options => {
                debug!(%pattern, verb = self.verb(), "verb not registered on pattern");
                return Err(Fault::not_found());
            }
            _ => {}
        }
        let allowed = lookup.allowed().to_vec();

        let mut reply = Reply::Empty;
        let mut output = String::new();
        let mut kbps = 0;

        if let Lookup::Found(found) = lookup {
            if !self.request.is_preflight() {
                self.matched = Some(found.clone());

                let mut event = RouteMatchedEvent::new(found);
                app.events.dispatch(&mut event, Dispatch::All)?;
                if self.is_sent() {
                    return Ok(());
                }
                if event.is_propagation_stopped() {
                    debug!("route match intercepted");
                    return self.respond(Reply::Empty, event.outcome);
                }

                let route = event.route;
                let Some(handler) = app.resolve(&route.handler) else {
                    let name = route.handler.name().unwrap_or_default().to_owned();
                    return Err(RouteError::HandlerNotFound(name).into());
                };
                kbps = route.kbps();
                let args = route.args.clone();
                self.matched = Some(route);

                (reply, output) = self.invoke(&handler, args)?;
            }
        }

        if options {
            reply = Reply::Empty;
            output.clear();
        }

        cors.post_routing(&self.request, &mut self.response, &allowed);

        let mut outcome = Outcome::new().with_rate(kbps);
        if !output.is_empty() {
            outcome.output = Some(Body::from(output));
        }
        self.respond(reply, outcome)
    }

    // Calls the handler inside a capture scope.
    fn invoke(&mut self, handler: &Handler, args: Params) -> Result<(Reply, String), Fault> {
        let mut ctx = HandlerContext::new(self, args);
        let reply = handler(&mut ctx)?;
        Ok((reply, ctx.into_output()))
    }

    /// Emits the response event, then runs a deferred reply or sends.
    ///
    /// Output already on the outcome (captured text or listener output) wins
    /// over the reply's body.
    pub(super) fn respond(&mut self, reply: Reply, outcome: Outcome) -> Result<(), Fault> {
        let app = self.app;
        let mut event = ResponseEvent::new(reply, outcome);
        app.events.dispatch(&mut event, Dispatch::All)?;

        let mut outcome = event.outcome;
        match event.reply {
            Reply::Deferred(deferred) => deferred(self),
            Reply::Body(body) => {
                if outcome.output.is_none() {
                    outcome.output = Some(body);
                }
                self.send(outcome)
            }
            Reply::Empty => self.send(outcome),
        }
    }

    /// Renders `fault` as an error response. A [`Fault::Redirect`] performs
    /// the redirect instead, and a redirect that fails is rendered in turn.
    ///
    /// The error event reaches the first listener only. When that listener
    /// fails, its fault replaces the original one. A response listener that
    /// fails while the error goes out is not consulted again: the newer fault
    /// is rendered and sent directly.
    ///
    /// # Errors
    ///
    /// Failures while sending the rendered error.
    pub fn error(&mut self, fault: Fault) -> Result<(), Fault> {
        if let Fault::Redirect(redirection) = fault {
            return match self.follow(redirection) {
                Err(newer) if self.can_recover(&newer) => {
                    warn!(error = %newer, "redirect failed");
                    self.response.remove_header("Location");
                    let event = ErrorEvent::from_fault(newer, self.verb(), self.path.clone());
                    self.raise(event)
                }
                done => done,
            };
        }
        let event = ErrorEvent::from_fault(fault, self.verb(), self.path.clone());
        self.raise(event)
    }

    /// Renders an explicit error with `code` and an optional message.
    pub fn abort(&mut self, code: u16, message: Option<&str>) -> Result<(), Fault> {
        let mut event = ErrorEvent::new(code, self.verb(), self.path.clone());
        event.message = message.map(str::to_owned);
        self.raise(event)
    }

    fn raise(&mut self, mut event: ErrorEvent) -> Result<(), Fault> {
        let app = self.app;
        if let Err(newer) = app.events.dispatch(&mut event, Dispatch::FirstOnly) {
            warn!(error = %newer, "error listener failed");
            event = ErrorEvent::from_fault(newer, self.verb(), self.path.clone());
        }

        let outcome = self.settle(&mut event);
        match self.respond(Reply::Empty, outcome) {
            Err(newer) if self.can_recover(&newer) => {
                warn!(error = %newer, "response listener failed while rendering an error");
                let mut event = ErrorEvent::from_fault(newer, self.verb(), self.path.clone());
                let outcome = self.settle(&mut event);
                self.send(outcome)
            }
            done => done,
        }
    }

    // Nothing went out yet and the transport is still usable.
    fn can_recover(&self, fault: &Fault) -> bool {
        !self.is_sent() && !matches!(fault, Fault::Io(_))
    }

    // Fills in the default message, logs once and builds what gets sent.
    fn settle(&self, event: &mut ErrorEvent) -> Outcome {
        if event.message.is_none() {
            event.message = Some(format!(
                "[{} - {}] {} {}",
                event.code,
                event.text(),
                event.verb,
                event.path
            ));
        }
        let message = event.message.clone().unwrap_or_default();
        self.app.logger.log(level_for(event.code), &message, &event.trace());

        let mut outcome = std::mem::take(&mut event.outcome);
        outcome.code = Some(event.code);
        let mut headers = event.headers.clone();
        headers.extend(&outcome.headers);
        outcome.headers = headers;
        if outcome.output.is_none() {
            let (body, mime) = self.error_body(event);
            outcome.output = Some(body);
            if let Some(mime) = mime {
                outcome.mime.get_or_insert_with(|| mime.to_owned());
            }
        }
        outcome
    }

    // JSON for clients that ask for it, else the configured template.
    fn error_body(&self, event: &ErrorEvent) -> (Body, Option<&'static str>) {
        let config = self.config();
        let trace = if config.debug { event.trace() } else { Vec::new() };

        if self.request.wants_json() {
            let mut data = json!({
                "code": event.code,
                "text": event.text(),
                "data": event.payload,
                "message": event.message,
            });
            if config.debug {
                data["trace"] = json!(trace);
            }
            return (Body::Json(data), None);
        }

        let message = event.message.as_deref().unwrap_or_default();
        let code = event.code.to_string();
        let (template, message, trace, mime) = match config.error_format {
            ErrorFormat::Html => {
                let trace = if config.debug {
                    format!("<pre>{}</pre>", escape_html(&trace.join("\n")))
                } else {
                    String::new()
                };
                (&config.error_templates.html, escape_html(message), trace, "text/html")
            }
            ErrorFormat::Text => (&config.error_templates.text, message.to_owned(), trace.join("\n"), "text/plain"),
        };

        let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| match &caps[1] {
            "code" => code.clone(),
            "text" => event.text().to_owned(),
            "message" => message.clone(),
            _ => trace.clone(),
        });
        (Body::Text(rendered.into_owned()), Some(mime))
    }
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            c => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use std::fmt::Write as _;

    use serde_json::Value;

    use super::*;
    use crate::config::KernelConfig;
    use crate::http::{Method, Request};
    use crate::kernel::App;
    use crate::transport::BufferTransport;

    fn greet(ctx: &mut HandlerContext<'_, '_>) -> Result<Reply, Fault> {
        let name = ctx.require("name")?.to_owned();
        Ok(Reply::from(format!("hi {name}")))
    }

    #[test]
    fn escape_html_covers_markup() {
        assert_eq!(escape_html(r#"<a href="x">&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#039;&lt;/a&gt;");
    }

    #[test]
    fn handler_reply_is_sent() {
        let mut app = App::default();
        app.route_fn("GET /hi/@name", greet).unwrap();
        let mut transport = BufferTransport::new();
        app.handle(Request::new(Method::Get, "/hi/ana"), &mut transport).unwrap();

        assert_eq!(transport.code(), Some(200));
        assert_eq!(transport.body_str(), "hi ana");
        assert_eq!(transport.header("content-type"), Some("text/html;charset=UTF-8"));
    }

    #[test]
    fn captured_output_wins_over_reply() {
        let mut app = App::default();
        app.route_fn("GET /", |ctx| {
            write!(ctx, "captured").map_err(Fault::wrap)?;
            Ok(Reply::from("returned"))
        })
        .unwrap();
        let mut transport = BufferTransport::new();
        app.handle(Request::new(Method::Get, "/"), &mut transport).unwrap();
        assert_eq!(transport.body_str(), "captured");
    }

    #[test]
    fn unknown_path_renders_404_template() {
        let mut app = App::default();
        app.route("GET /", "home").unwrap();
        let mut transport = BufferTransport::new();
        app.handle(Request::new(Method::Get, "/eat"), &mut transport).unwrap();

        assert_eq!(transport.code(), Some(404));
        let body = transport.body_str();
        assert!(body.contains("<h1>404 - Not Found</h1>"));
        assert!(body.contains("[404 - Not Found] GET /eat"));
    }

    #[test]
    fn text_format_uses_plain_template() {
        let mut config = KernelConfig::default();
        config.error_format = ErrorFormat::Text;
        config.debug = true;
        let mut app = App::new(config);
        app.route_fn("GET /", |_ctx| Err(Fault::msg("<boom>"))).unwrap();
        let mut transport = BufferTransport::new();
        app.handle(Request::new(Method::Get, "/"), &mut transport).unwrap();

        assert_eq!(transport.code(), Some(500));
        assert_eq!(transport.header("content-type"), Some("text/plain;charset=UTF-8"));
        assert_eq!(transport.body_str(), "500 - Internal Server Error\n<boom>\n#0 <boom>\n");
    }

    #[test]
    fn json_clients_get_structured_errors() {
        let mut app = App::default();
        app.route("GET /", "home").unwrap();
        let mut transport = BufferTransport::new();
        let request = Request::new(Method::Get, "/missing").with_header("Accept", "application/json");
        app.handle(request, &mut transport).unwrap();

        let body: Value = serde_json::from_slice(transport.body()).unwrap();
        assert_eq!(body["code"], 404);
        assert_eq!(body["text"], "Not Found");
        assert_eq!(body["data"], Value::Null);
        assert!(body.get("trace").is_none());
    }

    #[test]
    fn empty_router_is_a_server_error() {
        let app = App::default();
        let mut transport = BufferTransport::new();
        app.handle(Request::new(Method::Get, "/"), &mut transport).unwrap();
        assert_eq!(transport.code(), Some(500));
        assert!(transport.body_str().contains("No route defined"));
    }

    #[test]
    fn abort_renders_explicit_errors() {
        let app = App::default();
        let mut transport = BufferTransport::new();
        let mut kernel = app.kernel(Request::new(Method::Get, "/"), &mut transport);
        kernel.abort(503, Some("maintenance")).unwrap();
        drop(kernel);
        assert_eq!(transport.code(), Some(503));
        assert!(transport.body_str().contains("<p>maintenance</p>"));
    }
}

//! The application and its per-request kernel.
//!
//! An [`App`] owns everything that outlives a request: configuration, the
//! route table, event listeners and named handlers. For each request it
//! creates a [`Kernel`], which owns the request, the response state and the
//! transport, and drives the dispatch pipeline exactly once.
//!
//! # Examples
//!
//! ```
//! use rttp_dispatch::http::{Method, Request};
//! use rttp_dispatch::kernel::App;
//! use rttp_dispatch::transport::BufferTransport;
//! use rttp_dispatch::{Params, Reply};
//!
//! let mut app = App::default();
//! app.route_fn("GET @hello /hello/@name", |ctx| {
//!     let name = ctx.require("name")?.to_owned();
//!     Ok(Reply::from(format!("Hello, {name}!")))
//! })
//! .unwrap();
//!
//! let mut transport = BufferTransport::new();
//! app.handle(Request::new(Method::Get, "/hello/world"), &mut transport).unwrap();
//!
//! assert_eq!(transport.code(), Some(200));
//! assert_eq!(transport.body_str(), "Hello, world!");
//! assert_eq!(app.router().alias("hello", Params::from([("name", "you")])).unwrap(), "/hello/you");
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use crate::config::KernelConfig;
use crate::context::HandlerContext;
use crate::error::{Fault, Redirection};
use crate::events::{Event, EventBus, ListenerId};
use crate::handler::{Handler, HandlerRef, HandlerRegistry, HandlerResolver, Reply};
use crate::http::{Cookie, CookieJar, Request, Response};
use crate::logging::{Logger, TracingLogger};
use crate::router::{RouteError, RouteMatch, Router};
use crate::session::SessionStore;
use crate::transport::Transport;

mod navigation;
mod output;
mod pipeline;

pub use output::{Disposition, FileOptions, mime_for_extension};

/// Long-lived application state shared by every request.
pub struct App {
    config: KernelConfig,
    router: Router,
    events: EventBus,
    handlers: HandlerRegistry,
    resolver: Option<Arc<dyn HandlerResolver>>,
    logger: Arc<dyn Logger>,
}

impl Default for App {
    fn default() -> Self {
        Self::new(KernelConfig::default())
    }
}

impl App {
    pub fn new(config: KernelConfig) -> Self {
        Self {
            config,
            router: Router::new(),
            events: EventBus::new(),
            handlers: HandlerRegistry::new(),
            resolver: None,
            logger: Arc::new(TracingLogger),
        }
    }

    /// Replaces the logger that receives one record per rendered error.
    #[must_use]
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Sets the resolver consulted for handler names the registry lacks.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn HandlerResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut KernelConfig {
        &mut self.config
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    pub fn logger(&self) -> &dyn Logger {
        self.logger.as_ref()
    }

    /// Registers a route whose handler is a name or a prepared [`Handler`].
    ///
    /// # Errors
    ///
    /// Any [`RouteError`] raised by [`Router::add`].
    pub fn route(&mut self, definition: &str, handler: impl Into<HandlerRef>) -> Result<&mut Self, RouteError> {
        self.router.add(definition, handler)?;
        Ok(self)
    }

    /// Registers a route handled by a closure.
    pub fn route_fn<F>(&mut self, definition: &str, f: F) -> Result<&mut Self, RouteError>
    where
        F: Fn(&mut HandlerContext<'_, '_>) -> Result<Reply, Fault> + Send + Sync + 'static,
    {
        self.route(definition, HandlerRef::func(f))
    }

    /// Registers several routes, stopping at the first invalid one.
    pub fn route_all<I, D, H>(&mut self, routes: I) -> Result<&mut Self, RouteError>
    where
        I: IntoIterator<Item = (D, H)>,
        D: AsRef<str>,
        H: Into<HandlerRef>,
    {
        for (definition, handler) in routes {
            self.router.add(definition.as_ref(), handler)?;
        }
        Ok(self)
    }

    /// Registers a route that redirects to `url`.
    pub fn reroute(&mut self, definition: &str, url: impl Into<String>, permanent: bool) -> Result<&mut Self, RouteError> {
        let url = url.into();
        self.route_fn(definition, move |_ctx| {
            Err(Redirection::url(url.clone()).permanent(permanent).into())
        })
    }

    /// Registers a handler under `name` for routes that refer to it by name.
    pub fn register<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&mut HandlerContext<'_, '_>) -> Result<Reply, Fault> + Send + Sync + 'static,
    {
        self.handlers.register(name, f);
        self
    }

    /// Adds a listener for `E`. Higher `priority` runs first.
    pub fn listen<E, F>(&mut self, priority: i32, f: F) -> ListenerId
    where
        E: Event,
        F: Fn(&mut E) -> Result<(), Fault> + Send + Sync + 'static,
    {
        self.events.listen(priority, f)
    }

    /// Removes every listener of the event called `name`.
    pub fn unlisten(&mut self, name: &str) -> bool {
        self.events.unlisten(name)
    }

    /// Turns a handler reference into something invocable.
    pub fn resolve(&self, handler: &HandlerRef) -> Option<Handler> {
        match handler {
            HandlerRef::Func(f) => Some(Arc::clone(f)),
            HandlerRef::Name(name) => self
                .handlers
                .resolve(name)
                .or_else(|| self.resolver.as_ref().and_then(|r| r.resolve(name))),
        }
    }

    /// Creates the kernel for one request.
    pub fn kernel<'a>(&'a self, request: Request, transport: &'a mut dyn Transport) -> Kernel<'a> {
        Kernel::new(self, request, transport)
    }

    /// Dispatches `request` and returns the final response state.
    ///
    /// # Errors
    ///
    /// Only transport failures while rendering an error; every other fault is
    /// rendered to the client.
    pub fn handle(&self, request: Request, transport: &mut dyn Transport) -> Result<Response, Fault> {
        let mut kernel = self.kernel(request, transport);
        kernel.run()?;
        Ok(kernel.into_response())
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("config", &self.config)
            .field("router", &self.router)
            .field("events", &self.events)
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

/// Per-request dispatch state.
pub struct Kernel<'a> {
    app: &'a App,
    request: Request,
    response: Response,
    transport: &'a mut dyn Transport,
    session: Option<&'a dyn SessionStore>,
    matched: Option<RouteMatch>,
    /// Cookies as seen by this request, updated by `set_cookie`.
    cookies: HashMap<String, String>,
    path: String,
    previous_url: Option<String>,
    back_url: Option<String>,
}

impl<'a> Kernel<'a> {
    fn new(app: &'a App, request: Request, transport: &'a mut dyn Transport) -> Self {
        let path = navigation::derive_path(request.path(), &app.config.base_path, app.config.entry.as_deref());
        let cookies = request.cookies().clone();
        debug!(verb = request.verb(), %path, "kernel created");
        Self {
            app,
            request,
            response: Response::new(),
            transport,
            session: None,
            matched: None,
            cookies,
            path,
            previous_url: None,
            back_url: None,
        }
    }

    /// Attaches the session store for this request.
    #[must_use]
    pub fn with_session(mut self, session: &'a dyn SessionStore) -> Self {
        self.session = Some(session);
        self
    }

    pub fn app(&self) -> &'a App {
        self.app
    }

    pub fn config(&self) -> &'a KernelConfig {
        &self.app.config
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    pub fn into_response(self) -> Response {
        self.response
    }

    /// The route being served, once matched.
    pub fn matched(&self) -> Option<&RouteMatch> {
        self.matched.as_ref()
    }

    /// The effective verb.
    pub fn verb(&self) -> &str {
        self.request.verb()
    }

    pub fn is_verb(&self, verbs: &[&str]) -> bool {
        let verb = self.request.verb();
        verbs.iter().any(|v| v.eq_ignore_ascii_case(verb))
    }

    pub fn is_sent(&self) -> bool {
        self.response.is_sent()
    }

    /// Sets the status code, validated unless `strict_status` is off.
    pub fn status(&mut self, code: u16) -> Result<(), Fault> {
        self.response.status(code, self.app.config.strict_status)?;
        Ok(())
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>, replace: bool) {
        self.response.add_header(name, value, replace);
    }

    /// Cookie defaults for this request. Unset path, domain and secure flag
    /// come from the base path, host and scheme.
    pub fn cookie_jar(&self) -> CookieJar {
        let defaults = &self.app.config.cookie;
        CookieJar {
            expires: defaults.expires,
            path: defaults
                .path
                .clone()
                .or_else(|| Some(self.app.config.base_path.clone())),
            domain: defaults
                .domain
                .clone()
                .or_else(|| Some(self.request.host().to_owned())),
            secure: defaults.secure.unwrap_or_else(|| self.request.is_secure()),
            http_only: defaults.http_only,
            raw: defaults.raw,
            same_site: defaults.same_site.clone(),
        }
    }

    /// A cookie as this request sees it, including ones set during it.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Emits `Set-Cookie` and updates the local cookie view.
    ///
    /// # Errors
    ///
    /// [`Fault::Cookie`] for an invalid `SameSite` combination.
    pub fn set_cookie(&mut self, cookie: Cookie) -> Result<(), Fault> {
        let header = cookie.render(&self.cookie_jar(), Utc::now())?;
        match cookie.value() {
            Some(value) => {
                self.cookies.insert(cookie.name().to_owned(), value.to_owned());
            }
            None => {
                self.cookies.remove(cookie.name());
            }
        }
        self.response.add_header("Set-Cookie", header, false);
        Ok(())
    }

    /// Expires cookie `name` on the client.
    pub fn remove_cookie(&mut self, name: &str) -> Result<(), Fault> {
        self.set_cookie(Cookie::removal(name))
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self, key: &str) -> Option<Value> {
        self.session.and_then(|store| store.get(key))
    }

    /// Stores `value`; without a session store this is a no-op.
    pub fn set_session(&mut self, key: &str, value: Value) {
        match self.session {
            Some(store) => store.set(key, value),
            None => debug!(key, "no session store attached, value dropped"),
        }
    }

    /// Reads and removes `key`.
    pub fn flash_session(&mut self, key: &str) -> Option<Value> {
        self.session.and_then(|store| store.remove(key))
    }

    pub fn remove_session(&mut self, key: &str) {
        if let Some(store) = self.session {
            store.remove(key);
        }
    }
}

impl std::fmt::Debug for Kernel<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("path", &self.path)
            .field("request", &self.request)
            .field("response", &self.response)
            .field("matched", &self.matched)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::http::{Method, SameSite};
    use crate::session::MemorySession;
    use crate::transport::BufferTransport;

    #[test]
    fn cookie_jar_derives_from_request() {
        let app = App::new(KernelConfig::default().with_base_path("/shop"));
        let mut transport = BufferTransport::new();
        let request = Request::new(Method::Get, "/shop/").with_header("Host", "example.test:8080");
        let kernel = app.kernel(request, &mut transport);

        let jar = kernel.cookie_jar();
        assert_eq!(jar.path.as_deref(), Some("/shop"));
        assert_eq!(jar.domain.as_deref(), Some("example.test"));
        assert!(!jar.secure);
        assert!(jar.http_only);
    }

    #[test]
    fn set_and_remove_cookie_update_local_view() {
        let app = App::default();
        let mut transport = BufferTransport::new();
        let request = Request::new(Method::Get, "/").with_header("Cookie", "seen=1");
        let mut kernel = app.kernel(request, &mut transport);

        assert_eq!(kernel.cookie("seen"), Some("1"));
        kernel.set_cookie(Cookie::new("theme", "dark")).unwrap();
        assert_eq!(kernel.cookie("theme"), Some("dark"));
        kernel.remove_cookie("seen").unwrap();
        assert_eq!(kernel.cookie("seen"), None);

        let set: Vec<_> = kernel.response().headers().get_all("set-cookie").collect();
        assert_eq!(set.len(), 2);
        assert!(set[0].starts_with("theme=dark; Domain=localhost; HttpOnly; SameSite=Lax"));
        assert!(set[1].starts_with("seen=deleted; Expires="));
    }

    #[test]
    fn same_site_none_needs_secure() {
        let app = App::default();
        let mut transport = BufferTransport::new();
        let mut kernel = app.kernel(Request::new(Method::Get, "/"), &mut transport);

        let insecure = Cookie::new("a", "1").same_site(SameSite::None.as_str());
        assert!(matches!(kernel.set_cookie(insecure), Err(Fault::Cookie(_))));

        let secure = Cookie::new("a", "1").same_site("none").secure(true);
        kernel.set_cookie(secure).unwrap();
        assert!(
            kernel
                .response()
                .header("set-cookie")
                .unwrap()
                .ends_with("; Secure; HttpOnly; SameSite=None")
        );
    }

    #[test]
    fn session_helpers_use_the_injected_store() {
        let app = App::default();
        let store = MemorySession::new();
        let mut transport = BufferTransport::new();
        let mut kernel = app
            .kernel(Request::new(Method::Get, "/"), &mut transport)
            .with_session(&store);

        kernel.set_session("notice", json!("saved"));
        assert_eq!(kernel.session("notice"), Some(json!("saved")));
        assert_eq!(kernel.flash_session("notice"), Some(json!("saved")));
        assert_eq!(kernel.session("notice"), None);
        kernel.set_session("user", json!(7));
        kernel.remove_session("user");
        assert!(store.is_empty());
    }

    #[test]
    fn names_resolve_through_registry_then_resolver() {
        fn external(_ctx: &mut HandlerContext<'_, '_>) -> Result<Reply, Fault> {
            Ok(Reply::from("ext"))
        }

        struct Fallback;
        impl HandlerResolver for Fallback {
            fn resolve(&self, name: &str) -> Option<Handler> {
                (name == "external").then(|| Arc::new(external) as Handler)
            }
        }

        let mut app = App::default().with_resolver(Arc::new(Fallback));
        app.register("local", |_ctx| Ok(Reply::Empty));
        assert!(app.resolve(&HandlerRef::from("local")).is_some());
        assert!(app.resolve(&HandlerRef::from("external")).is_some());
        assert!(app.resolve(&HandlerRef::from("missing")).is_none());
    }
}

//! Paths, URLs, redirects and previous-URL tracking.

use percent_encoding::percent_decode_str;
use tracing::debug;

use super::Kernel;
use crate::config::NavigationMode;
use crate::context::Params;
use crate::error::{Fault, RedirectTarget, Redirection};
use crate::events::{Dispatch, Event, Outcome, RedirectEvent};
use crate::handler::Reply;
use crate::http::Cookie;
use crate::router::RouteError;

/// The routed path: `raw` percent-decoded, with `base_path/entry` (or just
/// `base_path`) stripped and a leading slash enforced.
pub(super) fn derive_path(raw: &str, base_path: &str, entry: Option<&str>) -> String {
    let decoded = percent_decode_str(raw).decode_utf8_lossy();
    let with_entry = entry.map(|entry| format!("{base_path}/{entry}"));

    let rest = with_entry
        .as_deref()
        .and_then(|prefix| strip_segment_prefix(&decoded, prefix))
        .or_else(|| strip_segment_prefix(&decoded, base_path))
        .unwrap_or(&decoded);

    format!("/{}", rest.trim_start_matches('/'))
}

// Strips `prefix` only at a segment boundary, so `/app` never eats `/apple`.
fn strip_segment_prefix<'p>(path: &'p str, prefix: &str) -> Option<&'p str> {
    if prefix.is_empty() {
        return None;
    }
    let rest = path.strip_prefix(prefix)?;
    (rest.is_empty() || rest.starts_with('/')).then_some(rest)
}

impl Kernel<'_> {
    /// The routed path.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn base_path(&self) -> &str {
        &self.app.config.base_path
    }

    /// `scheme://host[:port]` plus the base path. Default ports are omitted.
    pub fn base_url(&self) -> String {
        let port = match self.request.port() {
            0 | 80 | 443 => String::new(),
            port => format!(":{port}"),
        };
        format!(
            "{}://{}{}{}",
            self.request.scheme(),
            self.request.host(),
            port,
            self.base_path()
        )
    }

    /// The path for route `name`; see [`Router::alias`](crate::router::Router::alias).
    pub fn alias(&self, name: &str, args: Params) -> Result<String, RouteError> {
        self.app.router.alias(name, args)
    }

    /// Joins the base, the front-controller entry (when `entry` is set) and
    /// the alias path.
    pub fn create_url(&self, path: &str, args: Params, absolute: bool, entry: bool) -> Result<String, RouteError> {
        let mut url = if absolute {
            self.base_url()
        } else {
            self.base_path().to_owned()
        };
        if let Some(front) = self.app.config.entry.as_deref().filter(|_| entry) {
            url.push('/');
            url.push_str(front);
        }
        url.push_str(&self.alias(path, args)?);
        Ok(url)
    }

    /// URL of a route or path, through the front controller.
    pub fn url(&self, path: &str, args: Params, absolute: bool) -> Result<String, RouteError> {
        self.create_url(path, args, absolute, true)
    }

    /// URL of a route or path, bypassing the front controller (assets).
    pub fn baseurl(&self, path: &str, args: Params, absolute: bool) -> Result<String, RouteError> {
        self.create_url(path, args, absolute, false)
    }

    /// The current request's URL, query included.
    pub fn uri(&self, absolute: bool) -> String {
        let query: Params = self
            .request
            .query()
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        self.url(&self.path, query, absolute)
            .unwrap_or_else(|_| self.path.clone())
    }

    /// The URL the client came from, per the navigation mode.
    pub fn previous_url(&mut self) -> Option<String> {
        if self.previous_url.is_none() {
            self.previous_url = self.resolve_previous_url();
        }
        self.previous_url.clone()
    }

    pub fn set_previous_url(&mut self, url: impl Into<String>) {
        self.previous_url = Some(url.into());
    }

    /// The URL remembered for the next request; the current URI by default.
    pub fn back_url(&self) -> String {
        self.back_url.clone().unwrap_or_else(|| self.uri(true))
    }

    pub fn set_back_url(&mut self, url: impl Into<String>) {
        self.back_url = Some(url.into());
    }

    fn resolve_previous_url(&self) -> Option<String> {
        let navigation = &self.app.config.navigation;
        let key = navigation.key.as_str();
        let found = match navigation.mode {
            NavigationMode::Header => self.request.header(key).map(str::to_owned),
            NavigationMode::Cookie => self.request.cookie(key).map(str::to_owned),
            NavigationMode::Session => self
                .session(key)
                .and_then(|value| value.as_str().map(str::to_owned)),
            NavigationMode::Query => self.request.query_param(key).map(str::to_owned),
            NavigationMode::None => None,
        };
        found.filter(|url| !url.is_empty())
    }

    /// Stores the back URL where the next request will look for it.
    pub(super) fn remember_back_url(&mut self) -> Result<(), Fault> {
        let app = self.app;
        let key = app.config.navigation.key.clone();
        match app.config.navigation.mode {
            NavigationMode::Cookie => {
                let url = self.back_url();
                self.set_cookie(Cookie::new(key, url))?;
            }
            NavigationMode::Session => {
                let url = self.back_url();
                self.set_session(&key, url.into());
            }
            NavigationMode::Header | NavigationMode::Query | NavigationMode::None => {}
        }
        Ok(())
    }

    /// Redirects to `url`. The code defaults to `301` when `permanent`, else
    /// `302`.
    ///
    /// Listeners of [`RedirectEvent`] may rewrite the URL; stopping
    /// propagation suppresses the `Location` header.
    pub fn redirect(&mut self, url: &str, permanent: bool, code: Option<u16>) -> Result<(), Fault> {
        let code = code.unwrap_or(if permanent { 301 } else { 302 });
        let mut event = RedirectEvent::new(code, url, permanent);
        self.app.events.dispatch(&mut event, Dispatch::All)?;

        if self.is_sent() {
            return Ok(());
        }
        if !event.is_propagation_stopped() {
            self.add_header("Location", event.url.as_str(), true);
        }
        debug!(url = %event.url, code = event.code, "redirecting");

        let mut outcome: Outcome = event.outcome;
        outcome.code.get_or_insert(event.code);
        self.respond(Reply::Empty, outcome)
    }

    /// Redirects to route `alias`, as an absolute URL.
    pub fn redirect_to(
        &mut self,
        alias: &str,
        args: Params,
        permanent: bool,
        code: Option<u16>,
    ) -> Result<(), Fault> {
        let url = self.url(alias, args, true)?;
        self.redirect(&url, permanent, code)
    }

    /// Redirects with `303` to the previous URL, else `fallback`, else home.
    pub fn redirect_back(&mut self, fallback: Option<&str>) -> Result<(), Fault> {
        let target = match self.previous_url() {
            Some(url) => url,
            None => match fallback {
                Some(url) => url.to_owned(),
                None => self.url("/", Params::new(), false)?,
            },
        };
        self.redirect(&target, false, Some(303))
    }

    /// Performs a redirect raised from a handler.
    pub(super) fn follow(&mut self, redirection: Redirection) -> Result<(), Fault> {
        let Redirection {
            target,
            permanent,
            code,
        } = redirection;
        match target {
            RedirectTarget::Url(url) => self.redirect(&url, permanent, code),
            RedirectTarget::Route { alias, args } => self.redirect_to(&alias, args, permanent, code),
            RedirectTarget::Back { fallback } => self.redirect_back(fallback.as_deref()),
        }
    }
}

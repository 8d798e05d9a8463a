//! The request-scoped context: HTTP/1.1 parsing with [`httparse`] plus the
//! negotiated fields the dispatch pipeline reads.
//!
//! Several derived fields (effective verb, form fields, cookies, JSON body)
//! are computed on first access and cached for the lifetime of the request.

use std::cell::OnceCell;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::LazyLock;

use bytes::Bytes;
use regex::{Regex, RegexBuilder};
use thiserror::Error;
use url::form_urlencoded;

use super::{Headers, Method};

static JSON_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"\bjson\b")
        .case_insensitive(true)
        .build()
        .expect("json token pattern is valid")
});

/// Why a buffer could not be turned into a [`Request`].
#[derive(Debug, Error)]
pub enum RequestError {
    /// The header block has not been fully received yet.
    #[error("incomplete request head")]
    Incomplete,

    #[error("malformed request: {0}")]
    Parse(#[from] httparse::Error),

    #[error("request line has no {0}")]
    MissingField(&'static str),

    #[error("body larger than {limit} bytes")]
    BodyTooLarge { limit: usize },
}

/// A single inbound request.
///
/// Built either from raw bytes with [`Request::parse`] or programmatically
/// with [`Request::new`] and the `with_*` builders.
///
/// # Examples
///
/// ```
/// use rttp_dispatch::http::Request;
///
/// let raw = b"GET /hello?name=world HTTP/1.1\r\nHost: localhost:8080\r\n\r\n";
/// let (request, _offset) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.verb(), "GET");
/// assert_eq!(request.path(), "/hello");
/// assert_eq!(request.query_param("name"), Some("world"));
/// assert_eq!(request.host(), "localhost");
/// assert_eq!(request.port(), 8080);
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    /// Minor version of HTTP/1.x.
    version: u8,
    headers: Headers,
    query: Option<String>,
    query_params: Vec<(String, String)>,
    body: Bytes,
    secure: bool,

    verb: OnceCell<String>,
    form: OnceCell<Vec<(String, String)>>,
    cookies: OnceCell<HashMap<String, String>>,
    json: OnceCell<Option<serde_json::Value>>,
}

const HEADER_SLOTS: usize = 64;

impl Request {
    /// Creates a request for `uri` (path plus optional `?query`).
    pub fn new(method: Method, uri: &str) -> Self {
        let (path, query) = split_uri(uri);
        Self::from_parts(method, path, query, 1, Headers::new(), Bytes::new())
    }

    fn from_parts(
        method: Method,
        path: String,
        query: Option<String>,
        version: u8,
        headers: Headers,
        body: Bytes,
    ) -> Self {
        let query_params = query.as_deref().map(parse_pairs).unwrap_or_default();
        Self {
            method,
            path,
            version,
            headers,
            query,
            query_params,
            body,
            secure: false,
            verb: OnceCell::new(),
            form: OnceCell::new(),
            cookies: OnceCell::new(),
            json: OnceCell::new(),
        }
    }

    /// Reads a request head out of `buf`.
    ///
    /// Returns the request together with the offset where its head ends;
    /// any bytes after that offset are attached as the body. Header values
    /// that are not UTF-8 are skipped.
    ///
    /// # Errors
    ///
    /// [`RequestError::Incomplete`] until the blank line ending the head has
    /// arrived, otherwise a parse or missing-field error.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut slots = [httparse::EMPTY_HEADER; HEADER_SLOTS];
        let mut head = httparse::Request::new(&mut slots);
        let httparse::Status::Complete(end) = head.parse(buf)? else {
            return Err(RequestError::Incomplete);
        };

        let method = required(head.method, "method")?;
        let target = required(head.path, "path")?;
        let version = required(head.version, "version")?;

        let headers: Headers = head
            .headers
            .iter()
            .filter_map(|h| Some((h.name, std::str::from_utf8(h.value).ok()?)))
            .collect();

        let (path, query) = split_uri(target);
        let method = Method::from_str(method).unwrap_or_else(|never| match never {});
        let body = Bytes::copy_from_slice(&buf[end..]);
        Ok((Self::from_parts(method, path, query, version, headers, body), end))
    }

    /// Appends a request header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Marks the request as received over TLS.
    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Replaces the body, e.g. once the server has read `Content-Length` bytes.
    pub fn set_body(&mut self, body: Bytes) {
        self.body = body;
        self.form = OnceCell::new();
        self.json = OnceCell::new();
    }

    /// Method as written on the request line, before any override.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The effective, upper-cased verb.
    ///
    /// `X-HTTP-Method-Override` wins over a `_method` form field, which wins
    /// over the request-line method.
    pub fn verb(&self) -> &str {
        self.verb.get_or_init(|| {
            self.headers
                .get("x-http-method-override")
                .or_else(|| self.form_param("_method"))
                .map_or_else(|| self.method.as_str().to_owned(), str::to_ascii_uppercase)
        })
    }

    /// Path part of the request target, still percent-encoded.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    /// `HTTP/1.0` or `HTTP/1.1`.
    pub fn protocol(&self) -> &'static str {
        if self.version == 0 { "HTTP/1.0" } else { "HTTP/1.1" }
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Query string as received, minus the `?`.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// First decoded value of a query parameter.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        lookup(&self.query_params, key)
    }

    /// All decoded query parameters in order of appearance.
    pub fn query(&self) -> &[(String, String)] {
        &self.query_params
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Fields of an `application/x-www-form-urlencoded` body.
    pub fn form(&self) -> &[(String, String)] {
        self.form.get_or_init(|| {
            if self.is_content_type("application/x-www-form-urlencoded") {
                parse_pairs_bytes(&self.body)
            } else {
                Vec::new()
            }
        })
    }

    pub fn form_param(&self, key: &str) -> Option<&str> {
        lookup(self.form(), key)
    }

    /// The body decoded as JSON, when the request declares a JSON content type.
    pub fn json(&self) -> Option<&serde_json::Value> {
        self.json
            .get_or_init(|| {
                self.is_json()
                    .then(|| serde_json::from_slice(&self.body).ok())
                    .flatten()
            })
            .as_ref()
    }

    /// Cookies sent through the `Cookie` header, percent-decoded.
    pub fn cookies(&self) -> &HashMap<String, String> {
        self.cookies.get_or_init(|| {
            self.headers
                .get_all("cookie")
                .flat_map(|line| line.split(';'))
                .filter_map(|pair| {
                    let (name, value) = pair.split_once('=')?;
                    let value = percent_encoding::percent_decode_str(value.trim())
                        .decode_utf8_lossy()
                        .into_owned();
                    Some((name.trim().to_owned(), value))
                })
                .filter(|(name, _)| !name.is_empty())
                .collect()
        })
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies().get(name).map(String::as_str)
    }

    /// The media type of the body without parameters, lower-cased.
    pub fn content_type(&self) -> Option<String> {
        let value = self.headers.get("content-type")?;
        let mime = value.split(';').next().unwrap_or(value).trim();
        Some(mime.to_ascii_lowercase())
    }

    pub fn is_content_type(&self, mime: &str) -> bool {
        self.content_type().is_some_and(|ct| ct.eq_ignore_ascii_case(mime))
    }

    pub fn is_json(&self) -> bool {
        self.content_type().is_some_and(|ct| JSON_TOKEN.is_match(&ct))
    }

    pub fn is_multipart(&self) -> bool {
        self.content_type()
            .is_some_and(|ct| ct.starts_with("multipart/"))
    }

    /// Returns `true` when `Accept` mentions `mime` as a whole word.
    ///
    /// A missing `Accept` header is treated as `*/*`.
    pub fn accept(&self, mime: &str) -> bool {
        let accept = self.headers.get("accept").unwrap_or("*/*");
        let pattern = format!(r"(?i)\b{}\b", regex::escape(mime));
        Regex::new(&pattern).is_ok_and(|re| re.is_match(accept))
    }

    pub fn wants_json(&self) -> bool {
        self.headers
            .get("accept")
            .is_some_and(|accept| JSON_TOKEN.is_match(accept))
    }

    /// The `Accept` entry with the highest quality, or `*/*`.
    pub fn accept_best(&self) -> String {
        let Some(accept) = self.headers.get("accept") else {
            return "*/*".to_owned();
        };

        let mut ranked: Vec<(f32, &str)> = accept
            .split(',')
            .filter_map(|entry| {
                let mut parts = entry.split(';').map(str::trim);
                let mime = parts.next().filter(|m| !m.is_empty())?;
                let quality = parts
                    .filter_map(|p| p.strip_prefix("q="))
                    .find_map(|q| q.parse::<f32>().ok())
                    .unwrap_or(1.0);
                Some((quality, mime))
            })
            .collect();
        // Stable: equal qualities keep header order.
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

        ranked
            .first()
            .map_or_else(|| "*/*".to_owned(), |(_, mime)| (*mime).to_owned())
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn scheme(&self) -> &'static str {
        if self.secure { "https" } else { "http" }
    }

    /// `Host` without its port; `localhost` when absent.
    pub fn host(&self) -> &str {
        let host = self.headers.get("host").unwrap_or("localhost");
        host.split(':').next().unwrap_or(host)
    }

    /// Port from the `Host` header, else the scheme default.
    pub fn port(&self) -> u16 {
        self.headers
            .get("host")
            .and_then(|h| h.split_once(':'))
            .and_then(|(_, port)| port.parse().ok())
            .unwrap_or(if self.secure { 443 } else { 80 })
    }

    pub fn origin(&self) -> Option<&str> {
        self.headers.get("origin")
    }

    /// A CORS preflight carries `Access-Control-Request-Method`.
    pub fn is_preflight(&self) -> bool {
        self.headers.contains("access-control-request-method")
    }

    /// Whether the client expects the connection to stay open.
    ///
    /// An explicit `Connection` header decides; without one, HTTP/1.1 stays
    /// open and HTTP/1.0 closes.
    pub fn is_keep_alive(&self) -> bool {
        self.headers
            .get("connection")
            .map_or(self.version >= 1, |value| value.eq_ignore_ascii_case("keep-alive"))
    }

    /// Declared `Content-Length`, if it parses.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length").and_then(|n| n.trim().parse().ok())
    }
}

fn required<T>(field: Option<T>, name: &'static str) -> Result<T, RequestError> {
    field.ok_or(RequestError::MissingField(name))
}

fn split_uri(uri: &str) -> (String, Option<String>) {
    match uri.split_once('?') {
        Some((path, query)) => (path.to_owned(), Some(query.to_owned())),
        None => (uri.to_owned(), None),
    }
}

fn parse_pairs(query: &str) -> Vec<(String, String)> {
    parse_pairs_bytes(query.as_bytes())
}

fn parse_pairs_bytes(input: &[u8]) -> Vec<(String, String)> {
    form_urlencoded::parse(input).into_owned().collect()
}

fn lookup<'a>(pairs: &'a [(String, String)], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn head_and_trailing_body_are_split() {
        let raw = b"POST /orders?draft=1 HTTP/1.1\r\nHost: shop.test\r\nContent-Length: 2\r\n\r\n{}";
        let (req, end) = Request::parse(raw).unwrap();
        assert_eq!(req.method(), &Method::Post);
        assert_eq!(req.path(), "/orders");
        assert_eq!(req.query_param("draft"), Some("1"));
        assert_eq!(req.header("HOST"), Some("shop.test"));
        assert_eq!(req.content_length(), Some(2));
        assert_eq!(end, raw.len() - 2);
        assert_eq!(&req.body()[..], b"{}");
    }

    #[test]
    fn query_is_decoded() {
        let raw = b"GET /search?q=rust+lang&tag=a%2Fb HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.query_string(), Some("q=rust+lang&tag=a%2Fb"));
        assert_eq!(req.query_param("q"), Some("rust lang"));
        assert_eq!(req.query_param("tag"), Some("a/b"));
    }

    #[test]
    fn partial_head_asks_for_more() {
        let err = Request::parse(b"GET /orders HTTP/1.1\r\nHo").unwrap_err();
        assert!(matches!(err, RequestError::Incomplete));
    }

    #[test]
    fn connection_header_overrides_version_default() {
        let (req, _) = Request::parse(b"GET / HTTP/1.0\r\n\r\n").unwrap();
        assert!(!req.is_keep_alive());
        assert_eq!(req.protocol(), "HTTP/1.0");
        let (req, _) = Request::parse(b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n").unwrap();
        assert!(!req.is_keep_alive());
        assert_eq!(req.version(), 1);
    }

    #[test]
    fn verb_override_header_then_form_field() {
        let req = Request::new(Method::Post, "/")
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_body("_method=put");
        assert_eq!(req.verb(), "PUT");

        let req = Request::new(Method::Post, "/")
            .with_header("X-HTTP-Method-Override", "delete")
            .with_header("Content-Type", "application/x-www-form-urlencoded")
            .with_body("_method=put");
        assert_eq!(req.verb(), "DELETE");
    }

    #[test]
    fn cookies_are_split_and_decoded() {
        let req = Request::new(Method::Get, "/").with_header("Cookie", "a=1; b=hello%20world");
        assert_eq!(req.cookie("a"), Some("1"));
        assert_eq!(req.cookie("b"), Some("hello world"));
        assert_eq!(req.cookie("c"), None);
    }

    #[test]
    fn negotiation_helpers() {
        let req = Request::new(Method::Get, "/")
            .with_header("Accept", "text/html;q=0.5, application/json");
        assert!(req.wants_json());
        assert!(req.accept("html"));
        assert!(!req.accept("xml"));
        assert_eq!(req.accept_best(), "application/json");

        let bare = Request::new(Method::Get, "/");
        assert!(!bare.wants_json());
        assert_eq!(bare.accept_best(), "*/*");
    }

    #[test]
    fn json_body_is_parsed_once_declared() {
        let req = Request::new(Method::Post, "/")
            .with_header("Content-Type", "application/json; charset=utf-8")
            .with_body(r#"{"id":7}"#);
        assert!(req.is_json());
        assert_eq!(req.json().and_then(|v| v["id"].as_i64()), Some(7));
    }

    #[test]
    fn host_port_and_scheme() {
        let req = Request::new(Method::Get, "/").secure(true);
        assert_eq!(req.host(), "localhost");
        assert_eq!(req.port(), 443);
        assert_eq!(req.scheme(), "https");
    }

    #[test]
    fn preflight_detection() {
        let req = Request::new(Method::Options, "/")
            .with_header("Origin", "https://a.test")
            .with_header("Access-Control-Request-Method", "POST");
        assert!(req.is_preflight());
        assert_eq!(req.origin(), Some("https://a.test"));
    }
}

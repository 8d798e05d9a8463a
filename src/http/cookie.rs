//! `Set-Cookie` composition.
//!
//! A [`Cookie`] only carries what the caller set explicitly; every attribute it
//! leaves unset falls back to the request-scoped [`CookieJar`] defaults.
//! Attributes are emitted in a fixed order:
//! `name=value; Expires=…; Max-Age=…; Domain=…; Path=…; Secure; HttpOnly; SameSite=…`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use thiserror::Error;

use super::date::http_date;

/// Value written in place of a deleted cookie.
pub const DELETED_VALUE: &str = "deleted";

/// Max-age applied to deleted cookies: thirty days in the past.
pub const DELETED_MAX_AGE: i64 = -2_592_000;

/// Invalid cookie attribute combinations. Always a programming error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CookieError {
    #[error("invalid samesite value: {0}")]
    InvalidSameSite(String),

    #[error("samesite none requires a secure context")]
    SameSiteNoneInsecure,
}

/// The `SameSite` cookie attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Lax,
    Strict,
    None,
}

impl SameSite {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lax => "Lax",
            Self::Strict => "Strict",
            Self::None => "None",
        }
    }
}

impl FromStr for SameSite {
    type Err = CookieError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lax" => Ok(Self::Lax),
            "strict" => Ok(Self::Strict),
            "none" => Ok(Self::None),
            _ => Err(CookieError::InvalidSameSite(s.to_owned())),
        }
    }
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cookie lifetime, either relative to now or an absolute instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Expiry {
    /// Seconds from now; negative values lie in the past.
    In(i64),
    /// A fixed instant.
    At(DateTime<Utc>),
}

impl Expiry {
    /// Resolves to the `Expires` date and the matching `Max-Age` in seconds.
    pub fn stamp(self, now: DateTime<Utc>) -> (String, i64) {
        let (at, max_age) = match self {
            Self::In(seconds) => (now + Duration::seconds(seconds), seconds),
            Self::At(at) => (at, (at - now).num_seconds()),
        };
        (http_date(at), max_age)
    }
}

/// Request-scoped cookie defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CookieJar {
    pub expires: Option<Expiry>,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub secure: bool,
    pub http_only: bool,
    /// Emit values verbatim instead of percent-encoding them.
    pub raw: bool,
    pub same_site: Option<String>,
}

impl Default for CookieJar {
    fn default() -> Self {
        Self {
            expires: None,
            path: None,
            domain: None,
            secure: false,
            http_only: true,
            raw: false,
            same_site: Some("Lax".to_owned()),
        }
    }
}

/// A cookie to be emitted through `Set-Cookie`.
///
/// # Examples
///
/// ```
/// use rttp_dispatch::http::{Cookie, CookieJar};
///
/// let jar = CookieJar { same_site: None, ..CookieJar::default() };
/// let header = Cookie::new("theme", "dark")
///     .path("/")
///     .render(&jar, chrono::Utc::now())
///     .unwrap();
/// assert_eq!(header, "theme=dark; Path=/; HttpOnly");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cookie {
    name: String,
    value: Option<String>,
    expires: Option<Expiry>,
    path: Option<String>,
    domain: Option<String>,
    secure: Option<bool>,
    http_only: Option<bool>,
    same_site: Option<String>,
    raw: Option<bool>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            ..Self::default()
        }
    }

    /// A deletion cookie: sentinel value and an expiry in the past.
    pub fn removal(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn expires(mut self, expires: Expiry) -> Self {
        self.expires = Some(expires);
        self
    }

    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    #[must_use]
    pub fn secure(mut self, secure: bool) -> Self {
        self.secure = Some(secure);
        self
    }

    #[must_use]
    pub fn http_only(mut self, http_only: bool) -> Self {
        self.http_only = Some(http_only);
        self
    }

    /// Sets `SameSite`; validated against `lax|strict|none` when rendered.
    #[must_use]
    pub fn same_site(mut self, same_site: impl Into<String>) -> Self {
        self.same_site = Some(same_site.into());
        self
    }

    #[must_use]
    pub fn raw(mut self, raw: bool) -> Self {
        self.raw = Some(raw);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The value to store, or `None` for a deletion.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref().filter(|v| !v.is_empty())
    }

    /// Composes the `Set-Cookie` header value against `jar` defaults.
    ///
    /// # Errors
    ///
    /// - [`CookieError::InvalidSameSite`]: `SameSite` is not `lax`, `strict` or `none`.
    /// - [`CookieError::SameSiteNoneInsecure`]: `SameSite=None` without `Secure`.
    pub fn render(&self, jar: &CookieJar, now: DateTime<Utc>) -> Result<String, CookieError> {
        let mut cookie = format!("{}=", self.name);

        let expires = match self.value() {
            Some(value) => {
                if self.raw.unwrap_or(jar.raw) {
                    cookie.push_str(value);
                } else {
                    cookie.extend(utf8_percent_encode(value, NON_ALPHANUMERIC));
                }
                self.expires.or(jar.expires)
            }
            None => {
                cookie.push_str(DELETED_VALUE);
                Some(Expiry::In(DELETED_MAX_AGE))
            }
        };

        if let Some(expires) = expires {
            let (date, max_age) = expires.stamp(now);
            cookie.push_str(&format!("; Expires={date}; Max-Age={max_age}"));
        }

        if let Some(domain) = non_empty(self.domain.as_deref().or(jar.domain.as_deref())) {
            cookie.push_str("; Domain=");
            cookie.push_str(domain);
        }

        if let Some(path) = non_empty(self.path.as_deref().or(jar.path.as_deref())) {
            cookie.push_str("; Path=");
            cookie.push_str(path);
        }

        let secure = self.secure.unwrap_or(jar.secure);
        if secure {
            cookie.push_str("; Secure");
        }

        if self.http_only.unwrap_or(jar.http_only) {
            cookie.push_str("; HttpOnly");
        }

        if let Some(same_site) = non_empty(self.same_site.as_deref().or(jar.same_site.as_deref())) {
            let same_site: SameSite = same_site.parse()?;
            if same_site == SameSite::None && !secure {
                return Err(CookieError::SameSiteNoneInsecure);
            }
            cookie.push_str("; SameSite=");
            cookie.push_str(same_site.as_str());
        }

        Ok(cookie)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn jar() -> CookieJar {
        CookieJar {
            domain: Some("example.com".into()),
            path: Some("/app".into()),
            ..CookieJar::default()
        }
    }

    #[test]
    fn attributes_in_order() {
        let header = Cookie::new("sid", "abc")
            .expires(Expiry::In(60))
            .render(&jar(), now())
            .unwrap();
        assert_eq!(
            header,
            "sid=abc; Expires=Mon, 01 Jan 2024 00:01:00 GMT; Max-Age=60; \
             Domain=example.com; Path=/app; HttpOnly; SameSite=Lax"
        );
    }

    #[test]
    fn absolute_expiry_computes_max_age() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let header = Cookie::new("a", "b").expires(Expiry::At(at)).render(&jar(), now()).unwrap();
        assert!(header.contains("Expires=Tue, 02 Jan 2024 00:00:00 GMT; Max-Age=86400"));
    }

    #[test]
    fn same_site_none_requires_secure() {
        let insecure = Cookie::new("a", "b").same_site("None").render(&jar(), now());
        assert_eq!(insecure, Err(CookieError::SameSiteNoneInsecure));

        let secure = Cookie::new("a", "b")
            .same_site("none")
            .secure(true)
            .render(&jar(), now())
            .unwrap();
        assert!(secure.ends_with("; Secure; HttpOnly; SameSite=None"), "{secure}");
    }

    #[test]
    fn unknown_same_site_is_rejected() {
        let err = Cookie::new("a", "b").same_site("loose").render(&jar(), now());
        assert_eq!(err, Err(CookieError::InvalidSameSite("loose".into())));
    }

    #[test]
    fn removal_writes_sentinel_in_the_past() {
        let header = Cookie::removal("sid").render(&jar(), now()).unwrap();
        assert!(header.starts_with("sid=deleted; Expires=Sat, 02 Dec 2023 00:00:00 GMT; Max-Age=-2592000"));
    }

    #[test]
    fn values_are_encoded_unless_raw() {
        let encoded = Cookie::new("q", "a b;c").render(&CookieJar::default(), now()).unwrap();
        assert!(encoded.starts_with("q=a%20b%3Bc;"));
        let raw = Cookie::new("q", "a+b").raw(true).render(&CookieJar::default(), now()).unwrap();
        assert!(raw.starts_with("q=a+b;"));
    }
}

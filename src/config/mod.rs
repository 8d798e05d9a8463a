//! Kernel configuration.
//!
//! Every section is optional in TOML; missing keys take the defaults below.
//!
//! ```toml
//! debug = false
//! charset = "UTF-8"
//! base_path = "/app"
//! entry = "index"
//! error_format = "html"
//!
//! [cors]
//! origin = true            # false | true (mirror Origin) | "https://exact.origin"
//! headers = "Content-Type"
//! credentials = true
//! expose = "X-Total"
//! ttl = 600
//!
//! [cookie]
//! same_site = "Lax"
//! http_only = true
//!
//! [navigation]
//! mode = "cookie"
//! key = "referer"
//!
//! [mime_types]
//! md = "text/markdown"
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::http::{CookieJar, Expiry, SameSite};

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// How error pages are rendered for clients that do not negotiate JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorFormat {
    #[default]
    Html,
    Text,
}

/// Error page templates. `{code}`, `{text}`, `{message}` and `{trace}` are
/// substituted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ErrorTemplates {
    pub html: String,
    pub text: String,
}

impl Default for ErrorTemplates {
    fn default() -> Self {
        Self {
            html: concat!(
                "<!doctype html>\n",
                "<html lang=\"en\">\n",
                "  <head>\n",
                "    <meta charset=\"utf-8\">\n",
                "    <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n",
                "    <title>{code} - {text}</title>\n",
                "  </head>\n",
                "  <body>\n",
                "    <div>\n",
                "      <h1>{code} - {text}</h1>\n",
                "      <p>{message}</p>\n",
                "      {trace}\n",
                "    </div>\n",
                "  </body>\n",
                "</html>",
            )
            .to_owned(),
            text: "{code} - {text}\n{message}\n{trace}\n".to_owned(),
        }
    }
}

/// `Access-Control-Allow-Origin` policy: disabled, mirror the request's
/// `Origin`, or a fixed origin.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AllowOrigin {
    Flag(bool),
    Exact(String),
}

impl Default for AllowOrigin {
    fn default() -> Self {
        Self::Flag(false)
    }
}

impl AllowOrigin {
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Flag(enabled) => *enabled,
            Self::Exact(origin) => !origin.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    pub origin: AllowOrigin,
    /// Value for `Access-Control-Allow-Headers`.
    pub headers: Option<String>,
    pub credentials: bool,
    /// Value for `Access-Control-Expose-Headers`.
    pub expose: Option<String>,
    /// `Access-Control-Max-Age` in seconds; `0` omits the header.
    pub ttl: u64,
}

/// Cookie jar defaults. Unset `path`, `domain` and `secure` are derived from
/// the request (base path, host, scheme).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CookieDefaults {
    pub expires: Option<Expiry>,
    pub path: Option<String>,
    pub domain: Option<String>,
    pub secure: Option<bool>,
    pub http_only: bool,
    pub raw: bool,
    pub same_site: Option<String>,
}

impl Default for CookieDefaults {
    fn default() -> Self {
        let jar = CookieJar::default();
        Self {
            expires: None,
            path: None,
            domain: None,
            secure: None,
            http_only: jar.http_only,
            raw: jar.raw,
            same_site: jar.same_site,
        }
    }
}

/// Where the previous URL is read from and stored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationMode {
    /// Read from a request header; nothing is stored.
    #[default]
    Header,
    Cookie,
    Session,
    /// Read from a query parameter; nothing is stored.
    Query,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    pub mode: NavigationMode,
    pub key: String,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            mode: NavigationMode::Header,
            key: "referer".to_owned(),
        }
    }
}

/// Top-level kernel configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Include fault traces in error output.
    pub debug: bool,
    pub charset: String,
    /// Reject status codes outside the status table.
    pub strict_status: bool,
    /// Send headers only, never a body.
    pub quiet: bool,
    pub base_path: String,
    /// Front-controller name placed between base path and route path.
    pub entry: Option<String>,
    pub error_format: ErrorFormat,
    pub error_templates: ErrorTemplates,
    pub cors: CorsConfig,
    pub cookie: CookieDefaults,
    /// File extension → MIME type, consulted before the built-in table.
    pub mime_types: HashMap<String, String>,
    pub navigation: NavigationConfig,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            debug: false,
            charset: "UTF-8".to_owned(),
            strict_status: true,
            quiet: false,
            base_path: String::new(),
            entry: None,
            error_format: ErrorFormat::default(),
            error_templates: ErrorTemplates::default(),
            cors: CorsConfig::default(),
            cookie: CookieDefaults::default(),
            mime_types: HashMap::new(),
            navigation: NavigationConfig::default(),
        }
    }
}

impl KernelConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: KernelConfig = toml::from_str(content)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Checks values serde cannot: the cookie `same_site` spelling and a
    /// non-empty navigation key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(same_site) = self.cookie.same_site.as_deref().filter(|s| !s.is_empty()) {
            same_site
                .parse::<SameSite>()
                .map_err(|err| ConfigError::Invalid(format!("cookie.same_site: {err}")))?;
        }
        if self.navigation.mode != NavigationMode::None && self.navigation.key.is_empty() {
            return Err(ConfigError::Invalid("navigation.key must not be empty".to_owned()));
        }
        Ok(())
    }

    // `base_path` always starts with `/` unless empty, and never ends with one.
    fn normalize(&mut self) {
        let trimmed = self.base_path.trim_end_matches('/');
        self.base_path = match trimmed {
            "" => String::new(),
            path if path.starts_with('/') => path.to_owned(),
            path => format!("/{path}"),
        };
        if let Some(entry) = &self.entry {
            let entry = entry.trim_matches('/');
            self.entry = (!entry.is_empty()).then(|| entry.to_owned());
        }
    }

    /// Sets `base_path`, normalizing slashes.
    #[must_use]
    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.base_path = base_path.into();
        self.normalize();
        self
    }

    /// Sets the front-controller entry name.
    #[must_use]
    pub fn with_entry(mut self, entry: impl Into<String>) -> Self {
        self.entry = Some(entry.into());
        self.normalize();
        self
    }
}

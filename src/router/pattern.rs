//! Path pattern compilation.
//!
//! Placeholders become named capture groups:
//!
//! | Placeholder     | Expression                     |
//! |-----------------|--------------------------------|
//! | `/@id`          | `/(?P<id>[\w-]+)`              |
//! | `/@id:[0-9]+`   | `/(?P<id>[0-9]+)`              |
//! | `/@rest*`       | `/(?P<rest>.*)`                |
//! | `/@id?`         | `(?:/(?P<id>[\w-]+))?`         |
//!
//! Literal text is escaped, and the expression is anchored at both ends with
//! an optional trailing slash.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::RouteError;
use crate::context::Params;

/// `/?@name` followed by `:constraint` or `*`, then an optional `?`.
pub(crate) static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/?@(\w+)(?::([^/?]+)|(\*))?(\?)?").expect("placeholder pattern is valid")
});

const SEGMENT_CLASS: &str = r"[\w-]+";

/// One placeholder of a path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamToken {
    pub name: String,
    pub constraint: Option<String>,
    pub catch_all: bool,
    pub optional: bool,
}

impl ParamToken {
    pub(crate) fn from_captures(caps: &Captures<'_>) -> Self {
        Self {
            name: caps[1].to_owned(),
            constraint: caps.get(2).map(|m| m.as_str().to_owned()),
            catch_all: caps.get(3).is_some(),
            optional: caps.get(4).is_some(),
        }
    }

    fn class(&self) -> &str {
        match (&self.constraint, self.catch_all) {
            (Some(constraint), _) => constraint,
            (None, true) => ".*",
            (None, false) => SEGMENT_CLASS,
        }
    }
}

/// A compiled path pattern.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    source: String,
    tokens: Vec<ParamToken>,
    regex: Regex,
}

impl RoutePattern {
    /// Compiles `source` into an anchored expression.
    ///
    /// # Errors
    ///
    /// [`RouteError::InvalidPattern`] when a constraint is not a valid regex
    /// or a placeholder name repeats.
    ///
    /// # Examples
    ///
    /// ```
    /// use rttp_dispatch::router::RoutePattern;
    ///
    /// let pattern = RoutePattern::compile("/item/@id:[0-9]+").unwrap();
    /// assert_eq!(pattern.as_regex(), r"^/item/(?P<id>[0-9]+)/?$");
    /// assert_eq!(pattern.captures("/item/7").unwrap().get("id"), Some("7"));
    /// assert!(pattern.captures("/item/x").is_none());
    /// ```
    pub fn compile(source: &str) -> Result<Self, RouteError> {
        let mut expr = String::from("^");
        let mut tokens = Vec::new();
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(source) {
            let Some(whole) = caps.get(0) else { continue };
            expr.push_str(&regex::escape(&source[last..whole.start()]));

            let token = ParamToken::from_captures(&caps);
            let slash = if whole.as_str().starts_with('/') { "/" } else { "" };
            let group = format!("(?P<{}>{})", token.name, token.class());
            if token.optional {
                expr.push_str(&format!("(?:{slash}{group})?"));
            } else {
                expr.push_str(slash);
                expr.push_str(&group);
            }

            tokens.push(token);
            last = whole.end();
        }

        let tail = regex::escape(&source[last..]);
        expr.push_str(tail.strip_suffix('/').unwrap_or(&tail));
        expr.push_str("/?$");

        let regex = Regex::new(&expr).map_err(|err| RouteError::InvalidPattern {
            pattern: source.to_owned(),
            reason: err.to_string(),
        })?;

        Ok(Self {
            source: source.to_owned(),
            tokens,
            regex,
        })
    }

    /// The pattern as written in the route definition.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn tokens(&self) -> &[ParamToken] {
        &self.tokens
    }

    /// The generated expression.
    pub fn as_regex(&self) -> &str {
        self.regex.as_str()
    }

    /// Matches `path`, returning non-empty named captures.
    pub fn captures(&self, path: &str) -> Option<Params> {
        let caps = self.regex.captures(path)?;
        Some(
            self.regex
                .capture_names()
                .flatten()
                .filter_map(|name| {
                    caps.name(name)
                        .filter(|m| !m.as_str().is_empty())
                        .map(|m| (name, m.as_str()))
                })
                .collect(),
        )
    }
}

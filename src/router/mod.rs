//! Route table and matcher.
//!
//! Routes are registered from definition strings (see [`RouteDefinition`]):
//!
//! | Definition                        | Matches          | Args            |
//! |-----------------------------------|------------------|-----------------|
//! | `GET /users`                      | `/users`         | *(none)*        |
//! | `GET @user /users/@id`            | `/users/42`      | `id → "42"`     |
//! | `GET /files/@path*`               | `/files/a/b.txt` | `path → "a/b.txt"` |
//! | `GET\|HEAD /page/@n:[0-9]+? [kbps=64]` | `/page`, `/page/2` | `n → "2"` |
//!
//! Matching tries an exact lookup of the path first, then every pattern in
//! registration order. The **first** pattern that matches structurally wins,
//! and only then is the verb looked up. A structural match without the verb is
//! reported as [`Lookup::MethodMismatch`], distinct from [`Lookup::NotFound`].
//! An earlier broad pattern therefore masks a later, more specific one even
//! when only the later one registers the verb.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;
use tracing::debug;

use crate::context::Params;
use crate::handler::HandlerRef;

mod alias;
mod definition;
mod pattern;

pub use definition::RouteDefinition;
pub use pattern::{ParamToken, RoutePattern};

/// Route table configuration errors. Always fatal at the call site.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("Invalid route: \"{0}\"")]
    InvalidRoute(String),

    #[error("Route not exists: {0}")]
    RouteNotExists(String),

    #[error("No path defined in route: \"{0}\"")]
    NoPath(String),

    #[error("Invalid route pattern \"{pattern}\": {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Route param required: {param}@{alias}")]
    ParamRequired { param: String, alias: String },

    #[error("No route defined")]
    NoRoutes,

    #[error("Handler not found: \"{0}\"")]
    HandlerNotFound(String),
}

/// What one verb of a pattern dispatches to.
#[derive(Debug, Clone)]
pub struct RouteTarget {
    pub handler: HandlerRef,
    pub alias: Option<String>,
    pub tags: Vec<String>,
    pub attributes: BTreeMap<String, Vec<String>>,
}

// A compiled pattern plus its per-verb targets, in registration order.
#[derive(Debug)]
struct PatternEntry {
    pattern: RoutePattern,
    targets: Vec<(String, RouteTarget)>,
}

impl PatternEntry {
    fn target(&self, verb: &str) -> Option<&RouteTarget> {
        self.targets
            .iter()
            .find(|(v, _)| v.eq_ignore_ascii_case(verb))
            .map(|(_, t)| t)
    }

    fn verbs(&self) -> Vec<String> {
        self.targets.iter().map(|(v, _)| v.clone()).collect()
    }
}

/// A successful match, produced per request. Listeners of the route-matched
/// event may rewrite any field.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub handler: HandlerRef,
    pub args: Params,
    pub alias: Option<String>,
    pub tags: Vec<String>,
    pub attributes: BTreeMap<String, Vec<String>>,
    /// The pattern source that matched.
    pub pattern: String,
    /// Every verb registered on the pattern, in registration order.
    pub allowed: Vec<String>,
}

impl RouteMatch {
    /// First value of an attribute.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Throttle rate from the `kbps` attribute; `0` when absent or invalid.
    pub fn kbps(&self) -> u32 {
        self.attribute("kbps")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }
}

/// The outcome of [`Router::lookup`].
#[derive(Debug, Clone)]
pub enum Lookup {
    Found(RouteMatch),
    /// A pattern matched but has no handler for the verb.
    MethodMismatch { pattern: String, allowed: Vec<String> },
    NotFound,
}

impl Lookup {
    /// Verbs registered on the structurally matched pattern, if any.
    pub fn allowed(&self) -> &[String] {
        match self {
            Self::Found(found) => &found.allowed,
            Self::MethodMismatch { allowed, .. } => allowed,
            Self::NotFound => &[],
        }
    }
}

/// The route table.
///
/// # Examples
///
/// ```
/// use rttp_dispatch::router::{Lookup, Router};
///
/// let mut router = Router::new();
/// router.add("GET @view /item/@id", "items.show").unwrap();
///
/// let Lookup::Found(found) = router.lookup("/item/7", "get") else { panic!() };
/// assert_eq!(found.args.get("id"), Some("7"));
/// assert!(matches!(router.lookup("/item/7", "POST"), Lookup::MethodMismatch { .. }));
/// assert!(matches!(router.lookup("/nope", "GET"), Lookup::NotFound));
/// ```
#[derive(Debug, Default)]
pub struct Router {
    entries: Vec<PatternEntry>,
    index: HashMap<String, usize>,
    aliases: HashMap<String, String>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a route definition.
    ///
    /// Without a path, the alias must already exist and its pattern is reused.
    /// Registering a verb again on the same pattern replaces its target but
    /// keeps the pattern's position in matching order.
    ///
    /// # Errors
    ///
    /// - [`RouteError::InvalidRoute`]: the definition does not parse.
    /// - [`RouteError::RouteNotExists`]: no path and the alias is unknown.
    /// - [`RouteError::NoPath`]: neither path nor alias.
    /// - [`RouteError::InvalidPattern`]: the path does not compile.
    pub fn add(&mut self, definition: &str, handler: impl Into<HandlerRef>) -> Result<(), RouteError> {
        let def: RouteDefinition = definition.parse()?;

        let path = match (&def.path, &def.alias) {
            (Some(path), _) => path.clone(),
            (None, Some(alias)) => self
                .aliases
                .get(alias)
                .cloned()
                .ok_or_else(|| RouteError::RouteNotExists(alias.clone()))?,
            (None, None) => return Err(RouteError::NoPath(definition.to_owned())),
        };

        let slot = match self.index.get(&path) {
            Some(&slot) => slot,
            None => {
                let pattern = RoutePattern::compile(&path)?;
                self.entries.push(PatternEntry {
                    pattern,
                    targets: Vec::new(),
                });
                self.index.insert(path.clone(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };

        if let Some(alias) = &def.alias {
            self.aliases.insert(alias.clone(), path.clone());
        }

        let target = RouteTarget {
            handler: handler.into(),
            alias: def.alias,
            tags: def.tags,
            attributes: def.attributes,
        };

        let targets = &mut self.entries[slot].targets;
        for verb in def.verbs {
            match targets.iter_mut().find(|(v, _)| *v == verb) {
                Some((_, existing)) => *existing = target.clone(),
                None => targets.push((verb, target.clone())),
            }
        }

        debug!(definition, pattern = %path, "route registered");
        Ok(())
    }

    /// Finds the route for `path` and `verb`.
    pub fn lookup(&self, path: &str, verb: &str) -> Lookup {
        let found = match self.index.get(path) {
            Some(&slot) => Some((&self.entries[slot], Params::new())),
            None => self
                .entries
                .iter()
                .find_map(|entry| entry.pattern.captures(path).map(|args| (entry, args))),
        };

        let Some((entry, args)) = found else {
            debug!(path, verb, "no route matched");
            return Lookup::NotFound;
        };

        let pattern = entry.pattern.source().to_owned();
        match entry.target(verb) {
            Some(target) => {
                debug!(path, verb, %pattern, "route matched");
                Lookup::Found(RouteMatch {
                    handler: target.handler.clone(),
                    args,
                    alias: target.alias.clone(),
                    tags: target.tags.clone(),
                    attributes: target.attributes.clone(),
                    pattern,
                    allowed: entry.verbs(),
                })
            }
            None => {
                debug!(path, verb, %pattern, "route matched without verb");
                Lookup::MethodMismatch {
                    pattern,
                    allowed: entry.verbs(),
                }
            }
        }
    }

    /// Number of distinct patterns.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The pattern bound to `alias`.
    pub fn alias_pattern(&self, alias: &str) -> Option<&str> {
        self.aliases.get(alias).map(String::as_str)
    }

    pub fn has_alias(&self, alias: &str) -> bool {
        self.aliases.contains_key(alias)
    }
}

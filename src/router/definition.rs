//! Route definition strings.
//!
//! ```text
//! GET|POST @alias /path/@param[:regex|*][?] [tag,key=value]
//! ```
//!
//! A trailing `[...]` holding only words, commas and `=` is the tag block;
//! any other bracket belongs to the path.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;

use super::RouteError;

static DEFINITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([\w|]+)(?:\s*@([^\s/\[]+))?(?:\s*(/\S*?))?(?:\s*\[([\w|,=\s]*)\])?\s*$")
        .expect("route definition pattern is valid")
});

/// A parsed, not yet compiled, route definition.
///
/// # Examples
///
/// ```
/// use rttp_dispatch::router::RouteDefinition;
///
/// let def: RouteDefinition = "get|post @view /item/@id [auth,role=admin,role=staff]".parse().unwrap();
/// assert_eq!(def.verbs, vec!["GET", "POST"]);
/// assert_eq!(def.alias.as_deref(), Some("view"));
/// assert_eq!(def.path.as_deref(), Some("/item/@id"));
/// assert_eq!(def.tags, vec!["auth"]);
/// assert_eq!(def.attributes["role"], vec!["admin", "staff"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteDefinition {
    pub verbs: Vec<String>,
    pub alias: Option<String>,
    pub path: Option<String>,
    pub tags: Vec<String>,
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl FromStr for RouteDefinition {
    type Err = RouteError;

    fn from_str(definition: &str) -> Result<Self, Self::Err> {
        let caps = DEFINITION
            .captures(definition)
            .ok_or_else(|| RouteError::InvalidRoute(definition.to_owned()))?;

        let verbs: Vec<String> = caps[1]
            .split('|')
            .filter(|v| !v.is_empty())
            .map(str::to_ascii_uppercase)
            .collect();
        if verbs.is_empty() {
            return Err(RouteError::InvalidRoute(definition.to_owned()));
        }

        let mut tags = Vec::new();
        let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for token in caps
            .get(4)
            .map_or("", |m| m.as_str())
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            match token.split_once('=') {
                Some((key, value)) if !value.trim().is_empty() => attributes
                    .entry(key.trim().to_owned())
                    .or_default()
                    .push(value.trim().to_owned()),
                Some((key, _)) => tags.push(key.trim().to_owned()),
                None => tags.push(token.to_owned()),
            }
        }

        Ok(Self {
            verbs,
            alias: caps.get(2).map(|m| m.as_str().to_owned()),
            path: caps.get(3).map(|m| m.as_str().to_owned()),
            tags,
            attributes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(def: &str) -> Result<RouteDefinition, RouteError> {
        def.parse()
    }

    #[test]
    fn verb_and_path_only() {
        let def = parse("GET /").unwrap();
        assert_eq!(def.verbs, vec!["GET"]);
        assert_eq!(def.alias, None);
        assert_eq!(def.path.as_deref(), Some("/"));
        assert!(def.tags.is_empty());
    }

    #[test]
    fn alias_without_path() {
        let def = parse("POST @home").unwrap();
        assert_eq!(def.alias.as_deref(), Some("home"));
        assert_eq!(def.path, None);
    }

    #[test]
    fn alias_followed_directly_by_path() {
        let def = parse("GET @view/item/@id").unwrap();
        assert_eq!(def.alias.as_deref(), Some("view"));
        assert_eq!(def.path.as_deref(), Some("/item/@id"));
    }

    #[test]
    fn tags_keep_order_and_duplicates() {
        let def = parse("GET /a [b,a,b,kbps=64]").unwrap();
        assert_eq!(def.tags, vec!["b", "a", "b"]);
        assert_eq!(def.attributes["kbps"], vec!["64"]);
    }

    #[test]
    fn bracket_classes_stay_in_the_path() {
        let def = parse("GET /item/@id:[0-9]+").unwrap();
        assert_eq!(def.path.as_deref(), Some("/item/@id:[0-9]+"));
        assert!(def.tags.is_empty());

        let def = parse("GET|HEAD @page /page/@n:[0-9]+? [kbps=64]").unwrap();
        assert_eq!(def.path.as_deref(), Some("/page/@n:[0-9]+?"));
        assert_eq!(def.attributes["kbps"], vec!["64"]);

        let def = parse("GET /a/@x:[a-z]+[ajax]").unwrap();
        assert_eq!(def.path.as_deref(), Some("/a/@x:[a-z]+"));
        assert_eq!(def.tags, vec!["ajax"]);

        let def = parse("GET /code/@c:[A-Z]").unwrap();
        assert_eq!(def.path.as_deref(), Some("/code/@c:[A-Z]"));
    }

    #[test]
    fn garbage_is_invalid() {
        assert_eq!(parse("@").unwrap_err().to_string(), "Invalid route: \"@\"");
        assert!(parse("").is_err());
        assert!(parse("GET /a b").is_err());
    }
}

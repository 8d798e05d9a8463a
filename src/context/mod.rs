//! Per-request handler context.
//!
//! - [`Params`]: the ordered name → value map used for route arguments and
//!   alias substitution.
//! - [`HandlerContext`]: what a handler receives. It exposes the bound route
//!   arguments, the kernel, and an explicit output sink; anything written to
//!   the sink becomes the response body.

use std::fmt;

use crate::error::Fault;
use crate::http::Request;
use crate::kernel::Kernel;
use crate::router::RouteMatch;

/// Ordered string map. Insertion order is kept; inserting an existing key
/// replaces its value in place.
///
/// # Examples
///
/// ```
/// use rttp_dispatch::Params;
///
/// let mut params = Params::from([("id", "7"), ("q", "rust")]);
/// params.insert("id", "8");
/// assert_eq!(params.get("id"), Some("8"));
/// assert_eq!(params.keys().collect::<Vec<_>>(), vec!["id", "q"]);
/// ```
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Params {
    entries: Vec<(String, String)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = Params::new();
        for (key, value) in iter {
            params.insert(key, value);
        }
        params
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for Params {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl IntoIterator for Params {
    type Item = (String, String);
    type IntoIter = std::vec::IntoIter<(String, String)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// The context a handler runs in.
///
/// Text written through [`fmt::Write`] (e.g. with `write!`) is captured and
/// takes precedence over the handler's return value when non-empty.
pub struct HandlerContext<'k, 'a> {
    kernel: &'k mut Kernel<'a>,
    args: Params,
    output: String,
}

impl<'k, 'a> HandlerContext<'k, 'a> {
    pub(crate) fn new(kernel: &'k mut Kernel<'a>, args: Params) -> Self {
        Self {
            kernel,
            args,
            output: String::new(),
        }
    }

    /// A bound route argument.
    pub fn arg(&self, name: &str) -> Option<&str> {
        self.args.get(name)
    }

    /// A required route argument; a missing one is a `404`.
    pub fn require(&self, name: &str) -> Result<&str, Fault> {
        self.arg(name).ok_or_else(Fault::not_found)
    }

    pub fn args(&self) -> &Params {
        &self.args
    }

    pub fn request(&self) -> &Request {
        self.kernel.request()
    }

    /// The matched route, including tags and attributes.
    pub fn route(&self) -> Option<&RouteMatch> {
        self.kernel.matched()
    }

    pub fn kernel(&mut self) -> &mut Kernel<'a> {
        self.kernel
    }

    /// Everything written so far.
    pub fn output(&self) -> &str {
        &self.output
    }

    pub(crate) fn into_output(self) -> String {
        self.output
    }
}

impl fmt::Write for HandlerContext<'_, '_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.output.push_str(s);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_in_place() {
        let mut p = Params::new();
        p.insert("a", "1");
        p.insert("b", "2");
        p.insert("a", "3");
        assert_eq!(p.iter().collect::<Vec<_>>(), vec![("a", "3"), ("b", "2")]);
    }

    #[test]
    fn remove_returns_value() {
        let mut p = Params::from([("id", "7")]);
        assert_eq!(p.remove("id").as_deref(), Some("7"));
        assert_eq!(p.remove("id"), None);
        assert!(p.is_empty());
    }
}

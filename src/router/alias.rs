//! Reverse routing: alias + arguments → path.

use url::form_urlencoded;

use super::pattern::{PLACEHOLDER, ParamToken};
use super::{RouteError, Router};
use crate::context::Params;

impl Router {
    /// Builds the path for `name`, substituting placeholders from `args`.
    ///
    /// An unknown alias is treated as a literal path. Optional placeholders
    /// without a value drop their whole segment. Arguments not consumed by a
    /// placeholder are appended as a query string.
    ///
    /// # Errors
    ///
    /// [`RouteError::ParamRequired`] when a required placeholder has no value.
    ///
    /// # Examples
    ///
    /// ```
    /// use rttp_dispatch::{Params, router::Router};
    ///
    /// let mut router = Router::new();
    /// router.add("GET @view /item/@id", "items.show").unwrap();
    ///
    /// let path = router.alias("view", Params::from([("id", "7"), ("tab", "specs")])).unwrap();
    /// assert_eq!(path, "/item/7?tab=specs");
    /// assert_eq!(router.alias("about", Params::new()).unwrap(), "/about");
    /// ```
    pub fn alias(&self, name: &str, mut args: Params) -> Result<String, RouteError> {
        let pattern = match self.aliases.get(name) {
            Some(pattern) => pattern.clone(),
            None => format!("/{}", name.trim_start_matches('/')),
        };

        let mut path = String::with_capacity(pattern.len());
        let mut last = 0;
        for caps in PLACEHOLDER.captures_iter(&pattern) {
            let Some(whole) = caps.get(0) else { continue };
            path.push_str(&pattern[last..whole.start()]);
            last = whole.end();

            let token = ParamToken::from_captures(&caps);
            match args.remove(&token.name).filter(|v| !v.is_empty()) {
                Some(value) => {
                    path.push('/');
                    path.push_str(&value);
                }
                None if token.optional => {}
                None => {
                    return Err(RouteError::ParamRequired {
                        param: token.name,
                        alias: name.to_owned(),
                    });
                }
            }
        }
        path.push_str(&pattern[last..]);

        if path.is_empty() {
            path.push('/');
        }

        if !args.is_empty() {
            let query = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(args.iter())
                .finish();
            path.push('?');
            path.push_str(&query);
        }

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::Lookup;

    fn router() -> Router {
        let mut r = Router::new();
        r.add("GET @home /", "home").unwrap();
        r.add("GET @view /item/@id", "view").unwrap();
        r.add("GET @optional /optional/@id?", "optional").unwrap();
        r.add("GET @files /files/@path*", "files").unwrap();
        r
    }

    #[test]
    fn leftover_args_become_query() {
        let r = router();
        assert_eq!(r.alias("home", Params::from([("q", "foo")])).unwrap(), "/?q=foo");
        assert_eq!(
            r.alias("home", Params::from([("q", "a b"), ("x", "&")])).unwrap(),
            "/?q=a+b&x=%26"
        );
    }

    #[test]
    fn missing_required_param_names_param_and_alias() {
        let err = router().alias("view", Params::new()).unwrap_err();
        assert_eq!(
            err,
            RouteError::ParamRequired {
                param: "id".into(),
                alias: "view".into()
            }
        );
        assert_eq!(err.to_string(), "Route param required: id@view");
    }

    #[test]
    fn optional_param_drops_segment() {
        let r = router();
        assert_eq!(r.alias("optional", Params::new()).unwrap(), "/optional");
        assert_eq!(r.alias("optional", Params::from([("id", "2")])).unwrap(), "/optional/2");
    }

    #[test]
    fn catch_all_keeps_slashes() {
        let r = router();
        assert_eq!(
            r.alias("files", Params::from([("path", "a/b.txt")])).unwrap(),
            "/files/a/b.txt"
        );
    }

    #[test]
    fn unknown_alias_is_a_literal_path() {
        assert_eq!(router().alias("/contact", Params::new()).unwrap(), "/contact");
    }

    #[test]
    fn generated_path_matches_back() {
        let r = router();
        let path = r.alias("view", Params::from([("id", "7")])).unwrap();
        match r.lookup(&path, "GET") {
            Lookup::Found(m) => assert_eq!(m.args.get("id"), Some("7")),
            other => panic!("unexpected {other:?}"),
        }
    }
}

//! Per-request response state.
//!
//! A [`Response`] accumulates status, headers, output and pacing until the
//! kernel hands it to a transport exactly once. After [`Response::mark_sent`]
//! the state is frozen: every mutator becomes a no-op.

use bytes::Bytes;

use super::{Headers, StatusCode, StatusError, status_text};

/// A value a handler hands back to be sent.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Markup or plain text, sent as `text/html` unless a MIME type was declared.
    Text(String),
    /// Serialized with `serde_json` and sent as `application/json`.
    Json(serde_json::Value),
    /// Raw bytes, sent as-is.
    Bytes(Bytes),
}

impl Body {
    /// Serializes the body and reports the MIME type it implies, if any.
    pub fn into_parts(self) -> Result<(Bytes, Option<&'static str>), serde_json::Error> {
        Ok(match self {
            Self::Text(text) => (Bytes::from(text), Some("text/html")),
            Self::Json(value) => (Bytes::from(serde_json::to_vec(&value)?), Some("application/json")),
            Self::Bytes(bytes) => (bytes, None),
        })
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

/// Mutable response state for one request.
///
/// # Examples
///
/// ```
/// use rttp_dispatch::http::Response;
///
/// let mut response = Response::new();
/// response.status(201, true).unwrap();
/// response.add_header("X-Id", "7", true);
/// assert_eq!(response.code(), 201);
/// assert_eq!(response.text(), "Created");
///
/// assert!(response.status(299, true).is_err());
/// response.status(299, false).unwrap();
/// assert_eq!(response.code(), 299);
/// assert_eq!(response.text(), "");
/// ```
#[derive(Debug, Default, Clone)]
pub struct Response {
    code: Option<u16>,
    text: String,
    headers: Headers,
    output: Option<Bytes>,
    mime: Option<String>,
    rate: u32,
    sent: bool,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the status code and its reason phrase.
    ///
    /// With `strict`, codes outside the status table are rejected; otherwise
    /// they are accepted with an empty reason phrase.
    pub fn status(&mut self, code: u16, strict: bool) -> Result<(), StatusError> {
        let known = StatusCode::from_u16(code);
        if strict && known.is_none() {
            return Err(StatusError(code));
        }
        if !self.sent {
            self.code = Some(code);
            self.text = status_text(code).to_owned();
        }
        Ok(())
    }

    /// The status code, `200` until one is set.
    pub fn code(&self) -> u16 {
        self.code.unwrap_or(200)
    }

    pub fn has_status(&self) -> bool {
        self.code.is_some()
    }

    /// The reason phrase for the current code.
    pub fn text(&self) -> &str {
        if self.code.is_none() {
            return status_text(200);
        }
        &self.text
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Adds a header, replacing prior values for `name` when `replace` is set.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>, replace: bool) {
        if !self.sent {
            self.headers.add(name, value, replace);
        }
    }

    pub fn remove_header(&mut self, name: &str) -> bool {
        !self.sent && self.headers.remove(name)
    }

    pub fn output(&self) -> Option<&Bytes> {
        self.output.as_ref()
    }

    pub fn set_output(&mut self, output: Bytes) {
        if !self.sent {
            self.output = Some(output);
        }
    }

    pub fn mime(&self) -> Option<&str> {
        self.mime.as_deref()
    }

    pub fn set_mime(&mut self, mime: impl Into<String>) {
        if !self.sent {
            self.mime = Some(mime.into());
        }
    }

    /// Throttle rate in kilobits per second; `0` streams unpaced.
    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn set_rate(&mut self, kbps: u32) {
        if !self.sent {
            self.rate = kbps;
        }
    }

    pub fn is_sent(&self) -> bool {
        self.sent
    }

    /// Freezes the state. Returns `false` if it was already frozen.
    pub fn mark_sent(&mut self) -> bool {
        !std::mem::replace(&mut self.sent, true)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn defaults_to_200_ok() {
        let r = Response::new();
        assert_eq!(r.code(), 200);
        assert_eq!(r.text(), "OK");
        assert!(!r.has_status());
    }

    #[test]
    fn strict_status_rejects_unknown_codes() {
        let mut r = Response::new();
        assert_eq!(r.status(999, true), Err(StatusError(999)));
        assert_eq!(r.code(), 200);
    }

    #[test]
    fn frozen_after_sent() {
        let mut r = Response::new();
        r.status(404, true).unwrap();
        r.set_output(Bytes::from_static(b"first"));
        assert!(r.mark_sent());
        assert!(!r.mark_sent());

        r.status(500, true).unwrap();
        r.set_output(Bytes::from_static(b"second"));
        r.add_header("X-Late", "1", true);
        assert_eq!(r.code(), 404);
        assert_eq!(r.output().map(|b| &b[..]), Some(&b"first"[..]));
        assert!(r.headers().is_empty());
    }

    #[test]
    fn body_parts_carry_implied_mime() {
        let (bytes, mime) = Body::from("<p>hi</p>").into_parts().unwrap();
        assert_eq!(&bytes[..], b"<p>hi</p>");
        assert_eq!(mime, Some("text/html"));

        let (bytes, mime) = Body::from(json!({"ok": true})).into_parts().unwrap();
        assert_eq!(&bytes[..], br#"{"ok":true}"#);
        assert_eq!(mime, Some("application/json"));

        let (_, mime) = Body::from(vec![1u8, 2]).into_parts().unwrap();
        assert_eq!(mime, None);
    }
}

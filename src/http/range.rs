//! `Range: bytes=…` parsing for partial-content responses.
//!
//! Only single ranges are served. Accepted forms are `bytes=a-b`, `bytes=a-`
//! and `bytes=-n`; anything else is reported as unsatisfiable so the caller
//! can answer `416` with `Content-Range: bytes */<size>`.

use std::sync::LazyLock;

use regex::Regex;

static RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*bytes\s*=\s*(?:(\d+)-(\d*)|-(\d+))\s*$").expect("range pattern is valid")
});

/// The outcome of evaluating a `Range` header against a resource of known size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// No usable range: serve the whole resource with `200`.
    Full,
    /// Serve `length` bytes starting at `offset` with `206`.
    Partial {
        /// First byte served.
        offset: u64,
        /// Number of bytes served.
        length: u64,
        /// Size of the complete resource.
        size: u64,
    },
    /// Malformed or out-of-bounds range: answer `416`.
    Unsatisfiable {
        /// Size of the complete resource.
        size: u64,
    },
}

impl ByteRange {
    /// Evaluates an optional `Range` header value against `size` bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use rttp_dispatch::http::ByteRange;
    ///
    /// let range = ByteRange::parse(Some("bytes=1-3"), 6);
    /// assert_eq!(range, ByteRange::Partial { offset: 1, length: 3, size: 6 });
    /// assert_eq!(range.content_range().as_deref(), Some("bytes 1-3/6"));
    /// assert_eq!(ByteRange::parse(Some("bytes=1"), 6), ByteRange::Unsatisfiable { size: 6 });
    /// ```
    pub fn parse(header: Option<&str>, size: u64) -> Self {
        let Some(header) = header.filter(|h| !h.trim().is_empty()) else {
            return Self::Full;
        };
        let Some(caps) = RANGE.captures(header) else {
            return Self::Unsatisfiable { size };
        };

        let number = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u64>().ok());

        let (start, end) = if let Some(suffix) = number(3) {
            if suffix == 0 || size == 0 {
                return Self::Unsatisfiable { size };
            }
            (size.saturating_sub(suffix), size - 1)
        } else {
            let Some(start) = number(1) else {
                return Self::Unsatisfiable { size };
            };
            let last = size.saturating_sub(1);
            let end = number(2).map_or(last, |e| e.min(last));
            (start, end)
        };

        if start >= size || start > end {
            return Self::Unsatisfiable { size };
        }

        Self::Partial {
            offset: start,
            length: end - start + 1,
            size,
        }
    }

    /// The `Content-Range` header value matching this outcome, if any.
    pub fn content_range(&self) -> Option<String> {
        match *self {
            Self::Full => None,
            Self::Partial {
                offset,
                length,
                size,
            } => Some(format!("bytes {}-{}/{}", offset, offset + length - 1, size)),
            Self::Unsatisfiable { size } => Some(format!("bytes */{size}")),
        }
    }
}

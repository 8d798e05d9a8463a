//! HTTP/1.1 protocol types.
//!
//! Wire-level vocabulary shared by the kernel and the transports: methods,
//! the status table, headers, the request context and per-request
//! [`Response`] state. Cookies, byte ranges and HTTP dates live in submodules.

use std::fmt;

use thiserror::Error;

pub mod cookie;
pub mod date;
pub mod headers;
pub mod range;
pub mod request;
pub mod response;

pub use cookie::{Cookie, CookieError, CookieJar, Expiry, SameSite};
pub use headers::Headers;
pub use range::ByteRange;
pub use request::Request;
pub use response::{Body, Response};

/// Raised when a status code outside the known table is set in strict mode.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported HTTP code: {0}")]
pub struct StatusError(pub u16);

macro_rules! status_codes {
    ($( $variant:ident = $code:literal => $reason:literal, )+) => {
        /// An HTTP response status code from the IANA registry (100–511).
        ///
        /// ```
        /// use rttp_dispatch::http::StatusCode;
        ///
        /// assert_eq!(StatusCode::SeeOther.as_u16(), 303);
        /// assert_eq!(StatusCode::SeeOther.canonical_reason(), "See Other");
        /// assert_eq!(StatusCode::from_u16(416), Some(StatusCode::RangeNotSatisfiable));
        /// assert_eq!(StatusCode::from_u16(999), None);
        /// ```
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u16)]
        pub enum StatusCode {
            $( $variant = $code, )+
        }

        impl StatusCode {
            /// Looks up a numeric code in the status table.
            pub fn from_u16(code: u16) -> Option<Self> {
                match code {
                    $( $code => Some(Self::$variant), )+
                    _ => None,
                }
            }

            /// Reason phrase sent on the status line.
            pub fn canonical_reason(self) -> &'static str {
                match self {
                    $( Self::$variant => $reason, )+
                }
            }
        }
    };
}

status_codes! {
    Continue = 100 => "Continue",
    SwitchingProtocols = 101 => "Switching Protocols",
    Processing = 102 => "Processing",
    EarlyHints = 103 => "Early Hints",

    Ok = 200 => "OK",
    Created = 201 => "Created",
    Accepted = 202 => "Accepted",
    NonAuthoritativeInformation = 203 => "Non-Authoritative Information",
    NoContent = 204 => "No Content",
    ResetContent = 205 => "Reset Content",
    PartialContent = 206 => "Partial Content",
    MultiStatus = 207 => "Multi-Status",
    AlreadyReported = 208 => "Already Reported",
    ImUsed = 226 => "IM Used",

    MultipleChoices = 300 => "Multiple Choices",
    MovedPermanently = 301 => "Moved Permanently",
    Found = 302 => "Found",
    SeeOther = 303 => "See Other",
    NotModified = 304 => "Not Modified",
    UseProxy = 305 => "Use Proxy",
    TemporaryRedirect = 307 => "Temporary Redirect",
    PermanentRedirect = 308 => "Permanent Redirect",

    BadRequest = 400 => "Bad Request",
    Unauthorized = 401 => "Unauthorized",
    PaymentRequired = 402 => "Payment Required",
    Forbidden = 403 => "Forbidden",
    NotFound = 404 => "Not Found",
    MethodNotAllowed = 405 => "Method Not Allowed",
    NotAcceptable = 406 => "Not Acceptable",
    ProxyAuthenticationRequired = 407 => "Proxy Authentication Required",
    RequestTimeout = 408 => "Request Timeout",
    Conflict = 409 => "Conflict",
    Gone = 410 => "Gone",
    LengthRequired = 411 => "Length Required",
    PreconditionFailed = 412 => "Precondition Failed",
    PayloadTooLarge = 413 => "Payload Too Large",
    UriTooLong = 414 => "URI Too Long",
    UnsupportedMediaType = 415 => "Unsupported Media Type",
    RangeNotSatisfiable = 416 => "Range Not Satisfiable",
    ExpectationFailed = 417 => "Expectation Failed",
    ImATeapot = 418 => "I'm a teapot",
    MisdirectedRequest = 421 => "Misdirected Request",
    UnprocessableEntity = 422 => "Unprocessable Entity",
    Locked = 423 => "Locked",
    FailedDependency = 424 => "Failed Dependency",
    TooEarly = 425 => "Too Early",
    UpgradeRequired = 426 => "Upgrade Required",
    PreconditionRequired = 428 => "Precondition Required",
    TooManyRequests = 429 => "Too Many Requests",
    RequestHeaderFieldsTooLarge = 431 => "Request Header Fields Too Large",
    UnavailableForLegalReasons = 451 => "Unavailable For Legal Reasons",

    InternalServerError = 500 => "Internal Server Error",
    NotImplemented = 501 => "Not Implemented",
    BadGateway = 502 => "Bad Gateway",
    ServiceUnavailable = 503 => "Service Unavailable",
    GatewayTimeout = 504 => "Gateway Timeout",
    HttpVersionNotSupported = 505 => "HTTP Version Not Supported",
    VariantAlsoNegotiates = 506 => "Variant Also Negotiates",
    InsufficientStorage = 507 => "Insufficient Storage",
    LoopDetected = 508 => "Loop Detected",
    NotExtended = 510 => "Not Extended",
    NetworkAuthenticationRequired = 511 => "Network Authentication Required",
}

impl StatusCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// Whether a response with `code` may carry a body, and so a `Content-Length`.
///
/// Informational responses, `204` and `304` never do.
pub fn permits_body(code: u16) -> bool {
    !(100..200).contains(&code) && code != 204 && code != 304
}

/// Returns the reason phrase for `code`, or `""` when the code is not in the table.
pub fn status_text(code: u16) -> &'static str {
    StatusCode::from_u16(code).map_or("", StatusCode::canonical_reason)
}

macro_rules! methods {
    ($( $variant:ident => $token:literal, )+) => {
        /// A request-line method.
        ///
        /// Registered verbs get their own variant; anything else is kept
        /// upper-cased in [`Method::Custom`] so routes can still name it.
        ///
        /// # Examples
        ///
        /// ```
        /// use rttp_dispatch::http::Method;
        ///
        /// let method: Method = "patch".parse().unwrap();
        /// assert_eq!(method, Method::Patch);
        /// assert_eq!(method.to_string(), "PATCH");
        /// assert_eq!("m-search".parse::<Method>().unwrap().as_str(), "M-SEARCH");
        /// ```
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub enum Method {
            $( $variant, )+
            Custom(String),
        }

        impl Method {
            pub fn as_str(&self) -> &str {
                match self {
                    $( Self::$variant => $token, )+
                    Self::Custom(token) => token.as_str(),
                }
            }

            fn from_token(token: String) -> Self {
                match token.as_str() {
                    $( $token => Self::$variant, )+
                    _ => Self::Custom(token),
                }
            }
        }
    };
}

methods! {
    Get => "GET",
    Head => "HEAD",
    Post => "POST",
    Put => "PUT",
    Patch => "PATCH",
    Delete => "DELETE",
    Options => "OPTIONS",
    Connect => "CONNECT",
    Trace => "TRACE",
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Parsing never fails: unknown tokens become [`Method::Custom`].
impl std::str::FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_token(s.trim().to_ascii_uppercase()))
    }
}

impl AsRef<str> for Method {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

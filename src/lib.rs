//! # rttp-dispatch
//!
//! A request-dispatch kernel: a compact route DSL compiled to ordered
//! patterns, an event-driven request lifecycle, and an output transport with
//! byte ranges, cookies, CORS and bandwidth throttling.
//!
//! ## Quick Start
//!
//! ```rust
//! use rttp_dispatch::transport::BufferTransport;
//! use rttp_dispatch::{App, Method, Params, Reply, Request};
//!
//! let mut app = App::default();
//! app.route_fn("GET @item /item/@id", |ctx| {
//!     let id = ctx.require("id")?.to_owned();
//!     Ok(Reply::from(format!("item {id}")))
//! })
//! .unwrap();
//!
//! let mut transport = BufferTransport::new();
//! app.handle(Request::new(Method::Get, "/item/7"), &mut transport).unwrap();
//! assert_eq!(transport.body_str(), "item 7");
//!
//! let mut transport = BufferTransport::new();
//! app.handle(Request::new(Method::Get, "/nowhere"), &mut transport).unwrap();
//! assert_eq!(transport.code(), Some(404));
//!
//! assert_eq!(app.router().alias("item", Params::from([("id", "9")])).unwrap(), "/item/9");
//! ```
//!
//! To serve over TCP, hand the app to a [`Server`].

pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod handler;
pub mod http;
pub mod kernel;
pub mod logging;
pub mod router;
pub mod security;
pub mod server;
pub mod session;
pub mod transport;

pub use config::KernelConfig;
pub use context::{HandlerContext, Params};
pub use error::{Fault, HttpError, RedirectTarget, Redirection};
pub use events::{Dispatch, Event, EventBus, Outcome};
pub use handler::{HandlerRef, Reply};
pub use http::{Body, Headers, Method, Request, Response, StatusCode};
pub use kernel::{App, Kernel};
pub use router::Router;
pub use server::{Server, ServerError};

//! Security-related response policies.
//!
//! Currently implemented:
//!
//! - [`Cors`]: `Access-Control-*` header injection around routing.

pub mod cors;

pub use cors::Cors;

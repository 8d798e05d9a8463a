//! Logger boundary.
//!
//! The kernel reports each rendered error exactly once through a [`Logger`].
//! [`TracingLogger`] forwards to `tracing`, so the host's subscriber decides
//! where the records go.

use tracing::Level;

/// Receives `(level, message, context)` records.
pub trait Logger: Send + Sync {
    fn log(&self, level: Level, message: &str, context: &[String]);
}

/// Forwards records as `tracing` events under the `rttp_dispatch` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, message: &str, context: &[String]) {
        let context = context.join("\n");
        match level {
            Level::ERROR => tracing::error!(target: "rttp_dispatch", context = %context, "{message}"),
            Level::WARN => tracing::warn!(target: "rttp_dispatch", context = %context, "{message}"),
            Level::INFO => tracing::info!(target: "rttp_dispatch", context = %context, "{message}"),
            Level::DEBUG => tracing::debug!(target: "rttp_dispatch", context = %context, "{message}"),
            _ => tracing::trace!(target: "rttp_dispatch", context = %context, "{message}"),
        }
    }
}

/// Level for an error with status `code`.
pub fn level_for(code: u16) -> Level {
    if code >= 500 { Level::ERROR } else { Level::INFO }
}

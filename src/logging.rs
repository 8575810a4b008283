//! Logging collaborator contract.
//!
//! The flow reports progress through a caller-supplied [`FlowLogger`] rather
//! than logging directly, because the host application may surface these
//! lines in a task UI and may use a log call to signal cooperative
//! cancellation. A logger that returns [`Cancelled`] aborts the flow: that
//! signal always propagates to the caller unmodified, bypassing the normal
//! failure-result conversion.

use thiserror::Error;

/// Cooperative cancellation signal raised through the logging collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("login flow cancelled")]
pub struct Cancelled;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

pub trait FlowLogger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str) -> Result<(), Cancelled>;
}

/// Logger that forwards to `tracing`.
#[derive(Debug, Clone, Default)]
pub struct TracingLogger;

impl FlowLogger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str) -> Result<(), Cancelled> {
        match level {
            LogLevel::Info => tracing::info!("{message}"),
            LogLevel::Warning => tracing::warn!("{message}"),
            LogLevel::Error => tracing::error!("{message}"),
        }
        Ok(())
    }
}

/// Logger that discards everything.
#[derive(Debug, Clone, Default)]
pub struct NullLogger;

impl FlowLogger for NullLogger {
    fn log(&self, _level: LogLevel, _message: &str) -> Result<(), Cancelled> {
        Ok(())
    }
}

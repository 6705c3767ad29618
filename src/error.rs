//! Custom error types for the application.
//!
//! This module defines the primary error type, `GloveError`, for the entire
//! pipeline. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the different failure classes the system
//! distinguishes:
//!
//! - **`Config` / `Configuration`**: parse errors from `figment` and semantic
//!   errors caught by validation (e.g. a zero window size). Both are fatal at
//!   startup; the pipeline never runs with a configuration that would
//!   silently mis-filter.
//! - **`MalformedFrame`**: bad JSON or wrong sensor arity on an inbound
//!   message. Recovered locally: the client gets an error envelope and the
//!   connection stays open.
//! - **`Classifier`**: a scoring failure. Caught at the worker boundary,
//!   converted to an error envelope; the worker loop continues.
//! - **`ChannelClosed`**: an envelope addressed to a connection that has
//!   already gone away. Logged and discarded, isolated to that connection.
//! - **`Io` / `Csv`**: file and transport errors from the batch path,
//!   propagated to the CLI with `?`.
//!
//! Degenerate statistics (zero standard deviation, frames too short to
//! analyze) are *not* errors anywhere in the pipeline; the filters fall back
//! to documented no-ops instead.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, GloveError>;

/// The application error type.
#[derive(Error, Debug)]
pub enum GloveError {
    /// Configuration file could not be loaded or parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// Configuration parsed but failed semantic validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Inbound message was not a valid sensor frame.
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    /// The classifier failed to score a feature vector.
    #[error("Classifier error: {0}")]
    Classifier(String),

    /// The connection an envelope was addressed to has disconnected.
    #[error("Response channel closed")]
    ChannelClosed,

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV parse or write error on the batch path.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl GloveError {
    /// Whether this error is recoverable within a single connection, as
    /// opposed to fatal for the process.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GloveError::MalformedFrame(_) | GloveError::Classifier(_) | GloveError::ChannelClosed
        )
    }
}

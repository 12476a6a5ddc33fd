//! Error handling for p4_case_fix

use owo_colors::OwoColorize;
use thiserror::Error;

/// Result type alias for p4_case_fix operations
pub type Result<T> = core::result::Result<T, Error>;

/// Simple error enum that wraps common error types
///
/// Per-item rename failures are *not* represented here; they are recorded as
/// [`crate::strategy::MoveOutcome`]s inside a batch and never escape it.
#[derive(Debug, Error)]
pub enum Error {
        /// File system or process spawning failed
        #[error("I/O error: {0}")]
        Io(#[from] std::io::Error),

        /// Directory walking failed
        #[error("Directory walking error: {0}")]
        WalkDir(#[from] walkdir::Error),

        /// Identity cache could not be (de)serialized
        #[error("Identity cache error: {0}")]
        Json(#[from] serde_json::Error),

        /// A listing query (e.g. `opened`) exited non-zero
        #[error("Query failed: {}", diagnostic.red())]
        Query { diagnostic: String },

        /// Connectivity test failed and no login was possible
        #[error("Not connected: {}", diagnostic.red())]
        NotConnected { diagnostic: String },

        /// Login with the supplied password was rejected
        #[error("Login failed: {}", diagnostic.red())]
        Login { diagnostic: String },

        /// Changelist submission failed
        #[error("Submit failed: {}", diagnostic.red())]
        Submit { diagnostic: String },

        /// Changelist argument was neither `default` nor a positive number
        #[error("Invalid changelist '{}': expected `default` or a positive number", given.yellow())]
        InvalidChangelist { given: String },

        /// Operator override not of the form `INDEX=//depot/path`
        #[error("Invalid target override '{}': expected `INDEX=//depot/path`", given.yellow())]
        InvalidOverride { given: String },

        /// Index refers past the end of the listing
        #[error("Index {index} is out of range (listing has {len} entries)")]
        IndexOutOfRange { index: usize, len: usize },

        /// Batch worker thread ended without a final summary
        #[error("Batch worker stopped unexpectedly")]
        Worker,

        /// No home directory for the identity cache
        #[error("Cannot determine home directory")]
        NoHomeDir,
}

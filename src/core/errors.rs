/*!
 * Error Types
 * Centralized error handling with thiserror and miette support
 */

use miette::Diagnostic;
use thiserror::Error;
use tracing::error;

// Re-export GuestMemoryError from memory module
pub use crate::memory::GuestMemoryError;

// Re-export call-level errors from syscalls module
pub use crate::syscalls::types::{CallError, FileFault, TableError};

/// Contract violations that terminate the host
///
/// A correct guest never triggers one of these. They are raised through
/// [`fatal`], never returned to the guest.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum BridgeFault {
    #[error("Callback signal received but no pending callback is registered")]
    #[diagnostic(
        code(bridge::no_pending_callback),
        help("Register a pending callback before the guest issues a zero-address hypercall.")
    )]
    NoPendingCallback,

    #[error("File fault: {0}")]
    #[diagnostic(transparent)]
    File(#[from] FileFault),
}

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum ConfigError {
    #[error("Invalid configuration document: {0}")]
    #[diagnostic(
        code(config::parse_failed),
        help("The configuration must be a JSON object matching BridgeConfig.")
    )]
    Parse(String),

    #[error("fd table size {requested} is outside 1..={max}")]
    #[diagnostic(code(config::fd_table_size))]
    FdTableSize { requested: usize, max: usize },

    #[error("File slot {index} is outside the file table (size {max})")]
    #[diagnostic(code(config::file_index))]
    FileIndex { index: u64, max: usize },

    #[error("File slot {0} is configured more than once")]
    #[diagnostic(
        code(config::duplicate_file_slot),
        help("Each file slot can be opened exactly once.")
    )]
    DuplicateFileSlot(u64),

    #[error("Invalid value for {key}: {value}")]
    #[diagnostic(code(config::invalid_env))]
    InvalidEnv { key: String, value: String },
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        ConfigError::Parse(err.to_string())
    }
}

/// Abort on a guest/host contract violation
///
/// Logs the fault and panics. Release builds use `panic = "abort"`, so this
/// terminates the host process.
#[cold]
#[track_caller]
pub fn fatal(fault: impl Into<BridgeFault>) -> ! {
    let fault = fault.into();
    error!(error = %fault, "Fatal guest services fault");
    panic!("guest services fault: {}", fault)
}

/*!
 * Call Error Types
 * Error types for the two handler families and the descriptor tables
 */

use crate::core::types::{FileIndex, GuestFd};
use crate::memory::GuestMemoryError;
use miette::Diagnostic;
use nix::errno::Errno;
use thiserror::Error;

/// Descriptor table errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableError {
    /// Every slot is in use
    #[error("No free descriptor slot")]
    Exhausted,

    /// Negative, out of range, or not open
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(GuestFd),

    /// The host close failed; the slot has been freed regardless
    #[error("Closing descriptor {fd} failed: {errno}")]
    CloseFailed { fd: GuestFd, errno: Errno },
}

/// Recoverable failure of a guest-exposed call
///
/// Reported to the guest as `retval = -1` plus a translated error number.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallError {
    /// Descriptor failed validation; the host OS was not consulted and
    /// Last-Error is left alone
    #[error("Rejected descriptor {0}")]
    BadDescriptor(GuestFd),

    /// Host syscall failure or a ceiling violation
    #[error("Host error: {0}")]
    Host(#[from] Errno),
}

impl CallError {
    /// Error number to publish as Last-Error, if any
    #[inline]
    #[must_use]
    pub const fn errno(&self) -> Option<Errno> {
        match self {
            Self::BadDescriptor(_) => None,
            Self::Host(errno) => Some(*errno),
        }
    }
}

impl From<TableError> for CallError {
    fn from(err: TableError) -> Self {
        match err {
            TableError::Exhausted => Self::Host(Errno::ENOMEM),
            TableError::InvalidDescriptor(fd) => Self::BadDescriptor(fd),
            TableError::CloseFailed { errno, .. } => Self::Host(errno),
        }
    }
}

impl From<GuestMemoryError> for CallError {
    fn from(err: GuestMemoryError) -> Self {
        Self::Host(err.into())
    }
}

/// Result of a recoverable call
pub type CallResult<T = i64> = Result<T, CallError>;

/// File-table contract violations
///
/// The file family treats every anomaly as fatal; these never reach the guest.
#[derive(Error, Debug, Clone, PartialEq, Eq, Diagnostic)]
pub enum FileFault {
    #[error("File slot {index} is outside the file table (size {max})")]
    #[diagnostic(code(file::index_out_of_range))]
    IndexOutOfRange { index: FileIndex, max: usize },

    #[error("File slot {0} is already open")]
    #[diagnostic(
        code(file::already_open),
        help("File slots are opened once, from host configuration.")
    )]
    AlreadyOpen(FileIndex),

    #[error("File slot {0} is not open")]
    #[diagnostic(
        code(file::not_open),
        help("Configure a host file for this slot before the guest uses it.")
    )]
    NotOpen(FileIndex),

    #[error("Opening {path} failed: {reason}")]
    #[diagnostic(code(file::open_failed))]
    OpenFailed { path: String, reason: String },

    #[error("Transaction of {length} bytes exceeds the {max} byte ceiling")]
    #[diagnostic(code(file::transaction_too_large))]
    TransactionTooLarge { length: u64, max: usize },

    #[error("Seek to offset {requested} landed at {actual}")]
    #[diagnostic(code(file::seek_mismatch))]
    SeekMismatch { requested: u64, actual: u64 },

    #[error("Short transfer on file slot {index}: {requested} bytes requested")]
    #[diagnostic(code(file::short_transfer))]
    ShortTransfer { index: FileIndex, requested: u64 },

    #[error("I/O error on file slot {index}: {reason}")]
    #[diagnostic(code(file::io))]
    Io { index: FileIndex, reason: String },

    #[error("Guest memory fault: {0}")]
    #[diagnostic(code(file::guest_memory))]
    GuestMemory(#[from] GuestMemoryError),
}

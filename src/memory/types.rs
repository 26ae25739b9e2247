/*!
 * Guest Memory Types
 */

use crate::core::types::GuestAddr;
use nix::errno::Errno;
use thiserror::Error;

/// Guest memory operation result
pub type GuestMemoryResult<T> = Result<T, GuestMemoryError>;

/// Guest memory access errors
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuestMemoryError {
    #[error("Guest access out of bounds: 0x{addr:x}+{len}")]
    OutOfBounds { addr: GuestAddr, len: usize },

    #[error("Guest address 0x{0:x} is not mapped")]
    Unmapped(GuestAddr),
}

/// A bad guest pointer is reported to the guest as EFAULT
impl From<GuestMemoryError> for Errno {
    fn from(_: GuestMemoryError) -> Self {
        Errno::EFAULT
    }
}

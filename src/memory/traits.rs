/*!
 * Guest Memory Traits
 * The accessor the bridge uses to move bytes across the guest boundary
 */

use super::types::*;
use crate::core::types::GuestAddr;

/// Transfers bytes between guest addresses and host buffers
///
/// Implementations must move exactly the requested number of bytes or fail.
/// The bridge never dereferences a guest address itself.
pub trait GuestMemory: Send + Sync {
    /// Fill `buf` from guest memory starting at `addr`
    fn read(&self, addr: GuestAddr, buf: &mut [u8]) -> GuestMemoryResult<()>;

    /// Copy `data` into guest memory starting at `addr`
    fn write(&self, addr: GuestAddr, data: &[u8]) -> GuestMemoryResult<()>;

    /// Read a little-endian u32 (guest `socklen_t`)
    fn read_u32(&self, addr: GuestAddr) -> GuestMemoryResult<u32> {
        let mut raw = [0u8; 4];
        self.read(addr, &mut raw)?;
        Ok(u32::from_le_bytes(raw))
    }

    /// Write a little-endian u32 (guest `socklen_t`)
    fn write_u32(&self, addr: GuestAddr, value: u32) -> GuestMemoryResult<()> {
        self.write(addr, &value.to_le_bytes())
    }
}

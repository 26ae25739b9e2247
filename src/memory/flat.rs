/*!
 * Flat Guest Memory
 * A contiguous guest RAM window backed by a host buffer
 */

use super::traits::GuestMemory;
use super::types::*;
use crate::core::types::GuestAddr;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Guest RAM mapped at `base..base + len`
///
/// Used by embedders that keep guest memory in a single host allocation,
/// and by the test suite.
pub struct FlatGuestMemory {
    base: GuestAddr,
    bytes: RwLock<Vec<u8>>,
    reads: AtomicU64,
    writes: AtomicU64,
}

/// Access counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessStats {
    pub reads: u64,
    pub writes: u64,
}

impl FlatGuestMemory {
    /// Zero-filled window of `len` bytes starting at guest address `base`
    pub fn new(base: GuestAddr, len: usize) -> Self {
        Self {
            base,
            bytes: RwLock::new(vec![0; len]),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    pub fn base(&self) -> GuestAddr {
        self.base
    }

    pub fn len(&self) -> usize {
        self.bytes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill a region with `byte` without counting it as a guest access
    pub fn fill(&self, addr: GuestAddr, len: usize, byte: u8) -> GuestMemoryResult<()> {
        let range = self.range(addr, len)?;
        self.bytes.write()[range].fill(byte);
        Ok(())
    }

    /// Copy a region out without counting it as a guest access
    pub fn snapshot(&self, addr: GuestAddr, len: usize) -> GuestMemoryResult<Vec<u8>> {
        let range = self.range(addr, len)?;
        Ok(self.bytes.read()[range].to_vec())
    }

    pub fn stats(&self) -> AccessStats {
        AccessStats {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }

    fn range(&self, addr: GuestAddr, len: usize) -> GuestMemoryResult<std::ops::Range<usize>> {
        let size = self.bytes.read().len() as u64;
        let offset = addr
            .checked_sub(self.base)
            .filter(|offset| *offset <= size)
            .ok_or(GuestMemoryError::Unmapped(addr))?;
        let end = offset
            .checked_add(len as u64)
            .filter(|end| *end <= size)
            .ok_or(GuestMemoryError::OutOfBounds { addr, len })?;
        Ok(offset as usize..end as usize)
    }
}

impl GuestMemory for FlatGuestMemory {
    fn read(&self, addr: GuestAddr, buf: &mut [u8]) -> GuestMemoryResult<()> {
        let range = self.range(addr, buf.len())?;
        buf.copy_from_slice(&self.bytes.read()[range]);
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write(&self, addr: GuestAddr, data: &[u8]) -> GuestMemoryResult<()> {
        let range = self.range(addr, data.len())?;
        self.bytes.write()[range].copy_from_slice(data);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

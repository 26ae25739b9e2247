/*!
 * Descriptor Table
 * Small-integer handles the guest uses to name host resources
 */

use crate::core::limits::MAX_FD_COUNT;
use crate::core::types::GuestFd;

use log::{debug, trace, warn};
use nix::errno::Errno;
use std::os::fd::{IntoRawFd, OwnedFd};

use super::types::TableError;

/// A host resource owned by a descriptor table
pub trait HostHandle {
    /// Release the resource, reporting the host's close status
    fn close(self) -> Result<(), Errno>;
}

impl HostHandle for OwnedFd {
    fn close(self) -> Result<(), Errno> {
        nix::unistd::close(self.into_raw_fd())
    }
}

#[derive(Debug)]
enum Slot<R> {
    Free,
    /// Allocated, host resource not created yet
    Reserved,
    Open(R),
}

impl<R> Slot<R> {
    fn is_free(&self) -> bool {
        matches!(self, Slot::Free)
    }
}

/// Fixed-capacity table of host handles
///
/// An index is in use iff its slot is not free. Allocation takes the lowest
/// free index. The table is the only owner of the handles it holds.
#[derive(Debug)]
pub struct DescriptorTable<R> {
    slots: Vec<Slot<R>>,
}

impl<R: HostHandle> DescriptorTable<R> {
    /// Table with the full [`MAX_FD_COUNT`] capacity
    pub fn new() -> Self {
        Self::with_capacity(MAX_FD_COUNT)
    }

    /// Table with `capacity` slots, clamped to `1..=MAX_FD_COUNT`
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_FD_COUNT);
        Self {
            slots: (0..capacity).map(|_| Slot::Free).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots not free
    pub fn in_use(&self) -> usize {
        self.slots.iter().filter(|slot| !slot.is_free()).count()
    }

    pub fn is_in_use(&self, fd: GuestFd) -> bool {
        self.index(fd)
            .map(|i| !self.slots[i].is_free())
            .unwrap_or(false)
    }

    /// Reserve the lowest free slot
    pub fn allocate(&mut self) -> Result<GuestFd, TableError> {
        match self.slots.iter().position(Slot::is_free) {
            Some(index) => {
                self.slots[index] = Slot::Reserved;
                trace!("Reserved descriptor slot {}", index);
                Ok(index as GuestFd)
            }
            None => {
                debug!("Descriptor table exhausted ({} slots)", self.slots.len());
                Err(TableError::Exhausted)
            }
        }
    }

    /// Put an open handle into a slot returned by [`allocate`](Self::allocate)
    ///
    /// On error the handle is dropped, which closes it.
    pub fn install(&mut self, fd: GuestFd, handle: R) -> Result<(), TableError> {
        let index = self
            .index(fd)
            .filter(|i| matches!(self.slots[*i], Slot::Reserved))
            .ok_or(TableError::InvalidDescriptor(fd))?;

        self.slots[index] = Slot::Open(handle);
        trace!("Installed handle in descriptor slot {}", fd);
        Ok(())
    }

    /// Return a reserved slot to the free pool after a failed creation
    pub fn release(&mut self, fd: GuestFd) {
        if let Some(index) = self
            .index(fd)
            .filter(|i| matches!(self.slots[*i], Slot::Reserved))
        {
            self.slots[index] = Slot::Free;
            trace!("Released descriptor slot {}", fd);
        }
    }

    /// Look up an open handle
    ///
    /// Negative, out-of-range and not-open indices are one rejection class.
    pub fn get(&self, fd: GuestFd) -> Result<&R, TableError> {
        match self.index(fd).map(|i| &self.slots[i]) {
            Some(Slot::Open(handle)) => Ok(handle),
            _ => Err(TableError::InvalidDescriptor(fd)),
        }
    }

    /// Close the handle in `fd` and free the slot
    ///
    /// The slot is freed even when the host close fails: the host has
    /// released the descriptor either way, so keeping the slot would only
    /// leak it.
    pub fn close(&mut self, fd: GuestFd) -> Result<(), TableError> {
        let index = self
            .index(fd)
            .filter(|i| matches!(self.slots[*i], Slot::Open(_)))
            .ok_or(TableError::InvalidDescriptor(fd))?;

        let Slot::Open(handle) = std::mem::replace(&mut self.slots[index], Slot::Free) else {
            unreachable!("slot {index} checked open above");
        };

        handle.close().map_err(|errno| {
            warn!("Closing descriptor {} failed: {}", fd, errno);
            TableError::CloseFailed { fd, errno }
        })
    }

    /// Close every open handle and free every slot
    ///
    /// Returns the number of handles closed.
    pub fn close_all(&mut self) -> usize {
        let mut closed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Slot::Open(handle) = std::mem::replace(slot, Slot::Free) {
                if let Err(errno) = handle.close() {
                    warn!("Closing descriptor {} failed: {}", index, errno);
                }
                closed += 1;
            }
        }
        closed
    }

    fn index(&self, fd: GuestFd) -> Option<usize> {
        usize::try_from(fd).ok().filter(|i| *i < self.slots.len())
    }
}

impl<R: HostHandle> Default for DescriptorTable<R> {
    fn default() -> Self {
        Self::new()
    }
}

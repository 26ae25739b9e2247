/*!
 * Host File Calls
 * Guest access to host files opened from configuration
 *
 * The file table is indexed by guest-chosen slot numbers. Unlike the socket
 * family, every anomaly here is a contract breach and terminates the host.
 */

use crate::core::errors::fatal;
use crate::core::limits::{MAX_FILE_FDS, MAX_FILE_TRANSACTION_LEN};
use crate::core::types::{FileIndex, GuestAddr, RetVal};
use crate::memory::GuestMemory;

use log::{debug, info, trace};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use super::executor::BridgeState;
use super::types::FileFault;

/// Host files the guest can address by slot
#[derive(Debug)]
pub struct FileTable {
    slots: [Option<File>; MAX_FILE_FDS],
}

impl FileTable {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    /// Open `path` read-write into slot `index`
    ///
    /// Each slot can be opened once.
    pub fn open(&mut self, index: FileIndex, path: impl AsRef<Path>) -> Result<(), FileFault> {
        let path = path.as_ref();
        let slot = self.slot(index)?;
        if slot.is_some() {
            return Err(FileFault::AlreadyOpen(index));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| FileFault::OpenFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        *slot = Some(file);
        info!("Opened host file {} in slot {}", path.display(), index);
        Ok(())
    }

    pub fn is_open(&self, index: FileIndex) -> bool {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.slots.get(i))
            .map_or(false, Option::is_some)
    }

    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Copy `length` guest bytes at `buffer` into the file at `offset`
    pub fn write(
        &mut self,
        mem: &dyn GuestMemory,
        index: FileIndex,
        buffer: GuestAddr,
        length: u64,
        offset: u64,
    ) -> Result<(), FileFault> {
        let len = check_transaction(length)?;
        let file = self.open_file(index)?;
        seek_exact(file, offset, index)?;

        let mut staging = [0u8; MAX_FILE_TRANSACTION_LEN];
        mem.read(buffer, &mut staging[..len])?;
        file.write_all(&staging[..len])
            .map_err(|e| transfer_fault(e, index, length))?;

        trace!("Wrote {} bytes to file slot {} at offset {}", len, index, offset);
        Ok(())
    }

    /// Copy `length` file bytes at `offset` into guest memory at `buffer`
    pub fn read(
        &mut self,
        mem: &dyn GuestMemory,
        index: FileIndex,
        buffer: GuestAddr,
        length: u64,
        offset: u64,
    ) -> Result<(), FileFault> {
        let len = check_transaction(length)?;
        let file = self.open_file(index)?;
        seek_exact(file, offset, index)?;

        let mut staging = [0u8; MAX_FILE_TRANSACTION_LEN];
        file.read_exact(&mut staging[..len])
            .map_err(|e| transfer_fault(e, index, length))?;
        mem.write(buffer, &staging[..len])?;

        trace!("Read {} bytes from file slot {} at offset {}", len, index, offset);
        Ok(())
    }

    /// Current length of the file in slot `index`
    pub fn size(&mut self, index: FileIndex) -> Result<u64, FileFault> {
        let file = self.open_file(index)?;
        file.metadata().map(|meta| meta.len()).map_err(|e| FileFault::Io {
            index,
            reason: e.to_string(),
        })
    }

    fn slot(&mut self, index: FileIndex) -> Result<&mut Option<File>, FileFault> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.slots.get_mut(i))
            .ok_or(FileFault::IndexOutOfRange {
                index,
                max: MAX_FILE_FDS,
            })
    }

    fn open_file(&mut self, index: FileIndex) -> Result<&mut File, FileFault> {
        self.slot(index)?
            .as_mut()
            .ok_or(FileFault::NotOpen(index))
    }
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}

fn check_transaction(length: u64) -> Result<usize, FileFault> {
    usize::try_from(length)
        .ok()
        .filter(|len| *len <= MAX_FILE_TRANSACTION_LEN)
        .ok_or(FileFault::TransactionTooLarge {
            length,
            max: MAX_FILE_TRANSACTION_LEN,
        })
}

fn seek_exact(file: &mut File, offset: u64, index: FileIndex) -> Result<(), FileFault> {
    let actual = file.seek(SeekFrom::Start(offset)).map_err(|e| FileFault::Io {
        index,
        reason: e.to_string(),
    })?;
    if actual != offset {
        return Err(FileFault::SeekMismatch {
            requested: offset,
            actual,
        });
    }
    Ok(())
}

fn transfer_fault(err: io::Error, index: FileIndex, requested: u64) -> FileFault {
    match err.kind() {
        io::ErrorKind::UnexpectedEof | io::ErrorKind::WriteZero => {
            FileFault::ShortTransfer { index, requested }
        }
        _ => FileFault::Io {
            index,
            reason: err.to_string(),
        },
    }
}

impl BridgeState {
    pub(super) fn write_file(
        &mut self,
        mem: &dyn GuestMemory,
        buffer: GuestAddr,
        length: u64,
        offset: u64,
        index: FileIndex,
    ) -> RetVal {
        if let Err(fault) = self.files.write(mem, index, buffer, length, offset) {
            fatal(fault);
        }
        debug!("Guest wrote {} bytes to file slot {}", length, index);
        0
    }

    pub(super) fn read_file(
        &mut self,
        mem: &dyn GuestMemory,
        buffer: GuestAddr,
        length: u64,
        offset: u64,
        index: FileIndex,
    ) -> RetVal {
        if let Err(fault) = self.files.read(mem, index, buffer, length, offset) {
            fatal(fault);
        }
        debug!("Guest read {} bytes from file slot {}", length, index);
        0
    }

    pub(super) fn size_file(&mut self, index: FileIndex) -> RetVal {
        match self.files.size(index) {
            Ok(size) => size as RetVal,
            Err(fault) => fatal(fault),
        }
    }
}

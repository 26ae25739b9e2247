/*!
 * Hypercall Executor
 * Decodes the guest's call record and routes it to a handler
 *
 * One call is outstanding at a time: the call record lives at a single guest
 * address and the bridge state sits behind one lock. Host callbacks are held
 * in their own registry and run without the state lock.
 */

use crate::abi::to_guest_errno;
use crate::core::errors::{fatal, ConfigError};
use crate::core::limits::{CALLBACK_SIGNAL_ADDR, CALL_RECORD_SIZE};
use crate::core::types::{CallbackId, FileIndex, GuestAddr, RetVal, RETVAL_FAILURE};
use crate::memory::GuestMemory;
use crate::monitoring::HypercallSpan;

use nix::errno::Errno;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::os::fd::OwnedFd;
use std::path::Path;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use tracing::{error, info, warn};

use super::callbacks::CallbackRegistry;
use super::config::BridgeConfig;
use super::file::FileTable;
use super::table::DescriptorTable;
use super::types::{CallRecord, CallResponse, CallResult, Hypercall};

/// Descriptor and file tables, serialized behind the bridge lock
#[derive(Debug)]
pub(super) struct BridgeState {
    pub(super) fds: DescriptorTable<OwnedFd>,
    pub(super) files: FileTable,
}

impl BridgeState {
    fn new(fd_capacity: usize) -> Self {
        Self {
            fds: DescriptorTable::with_capacity(fd_capacity),
            files: FileTable::new(),
        }
    }

    fn dispatch(&mut self, mem: &dyn GuestMemory, call: Hypercall) -> CallResult {
        match call {
            Hypercall::Close { fd } => self.close_fd(fd),
            Hypercall::Fcntl { fd, cmd, flags } => self.fcntl(fd, cmd, flags),
            Hypercall::Socket {
                domain,
                socket_type,
                protocol,
            } => self.socket(domain, socket_type, protocol),
            Hypercall::Accept {
                fd,
                addr,
                addrlen_ptr,
            } => self.accept(mem, fd, addr, addrlen_ptr),
            Hypercall::Bind { fd, addr, addrlen } => self.bind(mem, fd, addr, addrlen),
            Hypercall::Connect { fd, addr, addrlen } => self.connect(mem, fd, addr, addrlen),
            Hypercall::Listen { fd, backlog } => self.listen(fd, backlog),
            Hypercall::Recv {
                fd,
                buffer,
                length,
                flags,
            } => self.recv(mem, fd, buffer, length, flags),
            Hypercall::Send {
                fd,
                buffer,
                length,
                flags,
            } => self.send(mem, fd, buffer, length, flags),
            Hypercall::WriteFile {
                buffer,
                length,
                offset,
                index,
            } => Ok(self.write_file(mem, buffer, length, offset, index)),
            Hypercall::ReadFile {
                buffer,
                length,
                offset,
                index,
            } => Ok(self.read_file(mem, buffer, length, offset, index)),
            Hypercall::SizeFile { index } => Ok(self.size_file(index)),
            // Callbacks are routed by the bridge, outside the state lock
            Hypercall::CallCallback { id, .. } => {
                warn!(id, "Callback invocation reached the table dispatcher");
                Err(Errno::EINVAL.into())
            }
        }
    }
}

/// Snapshot of bridge occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeStats {
    pub open_descriptors: usize,
    pub fd_capacity: usize,
    pub open_files: usize,
    pub registered_callbacks: usize,
    pub calls_handled: u64,
}

/// Services guest hypercalls against host sockets and files
#[derive(Debug)]
pub struct HypercallBridge {
    state: Mutex<BridgeState>,
    callbacks: CallbackRegistry,
    last_error: AtomicI64,
    calls: AtomicU64,
}

impl HypercallBridge {
    /// Bridge with a full-size descriptor table and no files
    pub fn new() -> Self {
        Self::with_fd_capacity(BridgeConfig::new().fd_table_size)
    }

    /// Descriptor table of `capacity` slots, clamped to the table ceiling
    pub fn with_fd_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(BridgeState::new(capacity)),
            callbacks: CallbackRegistry::new(),
            last_error: AtomicI64::new(0),
            calls: AtomicU64::new(0),
        }
    }

    /// Build from configuration, opening every configured file slot
    ///
    /// A file that cannot be opened is fatal.
    pub fn with_config(config: &BridgeConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let bridge = Self::with_fd_capacity(config.fd_table_size);
        for slot in &config.files {
            bridge.open_file(slot.index, &slot.path);
        }

        info!(
            fd_table_size = config.fd_table_size,
            files = config.files.len(),
            "Hypercall bridge configured"
        );
        Ok(bridge)
    }

    /// Open a host file into slot `index`
    ///
    /// A bad index, an occupied slot or an open failure is fatal.
    pub fn open_file(&self, index: FileIndex, path: impl AsRef<Path>) {
        if let Err(fault) = self.state.lock().files.open(index, path) {
            fatal(fault);
        }
    }

    /// Arm the callback fired by a hypercall at the reserved zero address
    pub fn register_pending_callback(&self, callback: impl FnOnce() + Send + 'static) {
        self.callbacks.set_pending(callback);
    }

    /// Register a callback the guest can invoke by `id`
    pub fn register_callback(
        &self,
        id: CallbackId,
        callback: impl FnMut(u64) -> RetVal + Send + 'static,
    ) -> bool {
        self.callbacks.register(id, callback)
    }

    pub fn unregister_callback(&self, id: CallbackId) -> bool {
        self.callbacks.unregister(id)
    }

    /// Service the hypercall whose record is at guest address `addr`
    ///
    /// A zero address runs the pending callback instead. A record with an
    /// unknown call number is left untouched.
    pub fn handle_hypercall(&self, mem: &dyn GuestMemory, addr: GuestAddr) {
        if addr == CALLBACK_SIGNAL_ADDR {
            self.callbacks.run_pending();
            return;
        }

        let mut raw = [0u8; CALL_RECORD_SIZE];
        if let Err(err) = mem.read(addr, &mut raw) {
            error!(addr, error = %err, "Failed to read call record");
            return;
        }

        let mut record = CallRecord::decode(&raw);
        let Some(call) = record.call() else {
            warn!(addr, call_number = record.call_number, "Unknown hypercall number ignored");
            return;
        };

        let response = self.execute(mem, call);
        record.retval = response.retval;
        record.error = response.error;

        if let Err(err) = mem.write(addr, &record.encode()) {
            error!(addr, error = %err, "Failed to write call response");
        }
    }

    /// Run one decoded call and produce its response
    ///
    /// Last-Error is cleared first; a failing call publishes its translated
    /// error number unless the descriptor was rejected before reaching the
    /// host.
    pub fn execute(&self, mem: &dyn GuestMemory, call: Hypercall) -> CallResponse {
        let seq = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        let span = HypercallSpan::new(call.number().name(), seq);
        let _guard = span.enter();

        self.last_error.store(0, Ordering::Relaxed);

        let result = match call {
            Hypercall::CallCallback { id, arg } => self.callbacks.invoke(id, arg),
            _ => self.state.lock().dispatch(mem, call),
        };

        let response = match result {
            Ok(retval) => CallResponse { retval, error: 0 },
            Err(err) => {
                info!(call = ?call, error = %err, "Hypercall failed");
                CallResponse {
                    retval: RETVAL_FAILURE,
                    error: err.errno().map_or(0, to_guest_errno),
                }
            }
        };

        // Published after the handler so a nested call from a callback
        // cannot leak its error into this response
        self.last_error.store(response.error, Ordering::Relaxed);
        span.record_response(response.retval, response.error);
        response
    }

    /// Guest error number published by the most recent call
    pub fn last_error(&self) -> i64 {
        self.last_error.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> BridgeStats {
        let state = self.state.lock();
        BridgeStats {
            open_descriptors: state.fds.in_use(),
            fd_capacity: state.fds.capacity(),
            open_files: state.files.open_count(),
            registered_callbacks: self.callbacks.len(),
            calls_handled: self.calls.load(Ordering::Relaxed),
        }
    }

    /// Close every guest descriptor, e.g. on guest reboot
    ///
    /// File slots stay open; they belong to the host configuration.
    pub fn reset(&self) -> usize {
        let closed = self.state.lock().fds.close_all();
        self.last_error.store(0, Ordering::Relaxed);
        info!(closed, "Guest descriptors reset");
        closed
    }
}

impl Default for HypercallBridge {
    fn default() -> Self {
        Self::new()
    }
}

/*!
 * Host Callbacks
 * Host functions the guest can trigger
 *
 * Two kinds: a single pending callback fired by a hypercall at the reserved
 * zero address, and id-keyed callbacks invoked through `CALL_CALLBACK`.
 */

use crate::core::errors::{fatal, BridgeFault};
use crate::core::types::{CallbackId, RetVal};

use ahash::RandomState;
use nix::errno::Errno;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::types::CallResult;

/// Fired once by the zero-address signal
pub type PendingCallback = Box<dyn FnOnce() + Send>;

/// Invoked with the guest's argument; its return value becomes `retval`
pub type HostCallback = Box<dyn FnMut(u64) -> RetVal + Send>;

type SharedCallback = Arc<Mutex<HostCallback>>;

/// Callbacks run with no registry lock held, so they may call back into the
/// bridge. Each registered callback has its own lock.
#[derive(Default)]
pub struct CallbackRegistry {
    pending: Mutex<Option<PendingCallback>>,
    registered: Mutex<HashMap<CallbackId, SharedCallback, RandomState>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the pending callback, replacing any callback not yet fired
    pub fn set_pending(&self, callback: impl FnOnce() + Send + 'static) {
        if self.pending.lock().replace(Box::new(callback)).is_some() {
            debug!("Replaced unfired pending callback");
        }
    }

    pub fn clear_pending(&self) -> bool {
        self.pending.lock().take().is_some()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Fire and disarm the pending callback
    ///
    /// A signal with nothing armed is a contract breach.
    pub fn run_pending(&self) {
        // Take first so the callback may re-arm itself
        let callback = self.pending.lock().take();
        match callback {
            Some(callback) => {
                info!("Running pending host callback");
                callback();
            }
            None => fatal(BridgeFault::NoPendingCallback),
        }
    }

    /// Register `callback` under `id`, returning whether an earlier one was replaced
    pub fn register(&self, id: CallbackId, callback: impl FnMut(u64) -> RetVal + Send + 'static) -> bool {
        let callback: HostCallback = Box::new(callback);
        let replaced = self
            .registered
            .lock()
            .insert(id, Arc::new(Mutex::new(callback)))
            .is_some();
        info!(id, replaced, "Registered host callback");
        replaced
    }

    pub fn unregister(&self, id: CallbackId) -> bool {
        self.registered.lock().remove(&id).is_some()
    }

    /// Invoke callback `id`
    ///
    /// An unknown id is `EINVAL`. A callback that is already running, e.g.
    /// one that invokes itself, is `EBUSY`.
    pub fn invoke(&self, id: CallbackId, arg: u64) -> CallResult {
        let shared = self.registered.lock().get(&id).cloned().ok_or_else(|| {
            debug!(id, "Guest invoked unknown host callback");
            Errno::EINVAL
        })?;

        let mut callback = shared.try_lock().ok_or_else(|| {
            debug!(id, "Host callback is already running");
            Errno::EBUSY
        })?;
        Ok((*callback)(arg))
    }

    pub fn len(&self) -> usize {
        self.registered.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("pending", &self.has_pending())
            .field("registered", &self.len())
            .finish()
    }
}

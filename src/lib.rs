/*!
 * Guest Services Library
 * Hypercall bridge between an emulated guest kernel and the host OS
 *
 * The guest writes a call record into its own memory and traps; the embedder
 * calls [`HypercallBridge::handle_hypercall`] with the record's address and a
 * [`GuestMemory`] accessor. Sockets and host files are serviced on the
 * guest's behalf and the response is written back into the record.
 */

pub mod abi;
pub mod core;
pub mod memory;
pub mod monitoring;
pub mod syscalls;

// Re-exports
pub use crate::core::errors::{fatal, BridgeFault, ConfigError};
pub use crate::core::limits;
pub use crate::core::types::*;
pub use memory::{FlatGuestMemory, GuestMemory, GuestMemoryError};
pub use monitoring::init_tracing;
pub use syscalls::{
    BridgeConfig, BridgeStats, CallError, CallNumber, CallRecord, CallResponse, FileFault,
    Hypercall, HypercallBridge,
};

/*!
 * Syscalls Module
 * Host-side services behind the guest hypercall interface
 */

mod callbacks;
mod config;
mod executor;
mod fd;
mod file;
mod network;
mod table;
pub mod types;

// Re-export public API
pub use callbacks::{CallbackRegistry, HostCallback, PendingCallback};
pub use config::{BridgeConfig, FileSlotConfig, ENV_FD_TABLE_SIZE, ENV_FILE_PREFIX, ENV_LOG_FILE};
pub use executor::{BridgeStats, HypercallBridge};
pub use file::FileTable;
pub use table::{DescriptorTable, HostHandle};
pub use types::{
    CallError, CallNumber, CallRecord, CallResponse, CallResult, FileFault, Hypercall, TableError,
};

/*!
 * Bridge Limits and Constants
 *
 * Every ceiling the guest can run into lives here. They are enforced before
 * any host syscall is attempted and are part of the guest/host contract.
 *
 * - Security-critical constants are marked with [SECURITY]
 * - Values shared with the guest-side headers are marked with [ABI]
 */

// =============================================================================
// DESCRIPTOR TABLES
// =============================================================================

/// Maximum number of slots in the generic fd table (sockets, fcntl targets)
/// [ABI]
pub const MAX_FD_COUNT: usize = 256;

/// Number of slots in the file-handle table
/// [ABI] Slot indices are chosen by the guest, not allocated by the host
pub const MAX_FILE_FDS: usize = 8;

/// File slot reserved for the guest log file
pub const LOG_FILE_INDEX: u64 = 2;

// =============================================================================
// TRANSFER CEILINGS
// =============================================================================

/// Largest single send/recv transfer (4KB)
/// [SECURITY] Bounds the host staging buffer for guest-directed copies
pub const MAX_BUF_SIZE: usize = 4096;

/// Largest single file read/write transaction (8KB)
/// [SECURITY] A larger request is a contract breach and aborts the host
pub const MAX_FILE_TRANSACTION_LEN: usize = 0x2000;

/// Largest socket address structure the guest may hand over
/// [SECURITY] Prevents guest-controlled over-reads of guest memory
pub const MAX_SOCKADDR_SIZE: usize = 16;

// =============================================================================
// CALL RECORD
// =============================================================================

/// Size of the per-call argument union (largest member: file read/write)
/// [ABI]
pub const CALL_ARGS_SIZE: usize = 32;

/// Total size of the packed call record
/// [ABI] call_number (4) + args (32) + retval (8) + error (8)
pub const CALL_RECORD_SIZE: usize = 4 + CALL_ARGS_SIZE + 8 + 8;

/// Hypercall address that signals "run the pending host callback"
pub const CALLBACK_SIGNAL_ADDR: u64 = 0;

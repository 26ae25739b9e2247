/*!
 * Core Types
 * Common types used across the bridge
 */

/// Address in the guest's address space, opaque to the bridge
pub type GuestAddr = u64;

/// Guest-visible index into the generic fd table
pub type GuestFd = i32;

/// Guest-chosen index into the file-handle table
pub type FileIndex = u64;

/// Identifier of a registered host callback
pub type CallbackId = u64;

/// Signed result written into the response `retval` field
pub type RetVal = i64;

/// Conventional failure value for `retval`
pub const RETVAL_FAILURE: RetVal = -1;

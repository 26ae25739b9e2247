/*!
 * Call Types Module
 * Call record, errors and responses
 */

mod call;
mod errors;
mod results;

// Re-export all public types
pub use call::{CallNumber, CallRecord, Hypercall, FCNTL_GETFL, FCNTL_SETFL};
pub use errors::{CallError, CallResult, FileFault, TableError};
pub use results::CallResponse;

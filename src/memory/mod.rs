/*!
 * Memory Module
 * Guest memory access for the bridge
 */

pub mod flat;
pub mod traits;
pub mod types;

// Re-export for convenience
pub use flat::{AccessStats, FlatGuestMemory};
pub use traits::*;
pub use types::*;

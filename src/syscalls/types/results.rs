/*!
 * Call Response Types
 */

use crate::abi::GuestErrno;
use crate::core::types::{RetVal, RETVAL_FAILURE};
use serde::{Deserialize, Serialize};

/// Response half of the call record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CallResponse {
    /// Handler result; -1 on failure by convention
    pub retval: RetVal,
    /// Last-Error at the end of the call; only meaningful on failure
    pub error: GuestErrno,
}

impl CallResponse {
    #[inline]
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        self.retval == RETVAL_FAILURE
    }
}

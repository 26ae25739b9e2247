/*!
 * Guest ABI Module
 * Translation between the guest kernel's ABI and the host's
 *
 * The guest kernel is BSD-derived when the `darwin-guest` feature is on:
 * its socket addresses carry a `sin_len` prefix and several errno and flag
 * values are numbered differently from a Linux host.
 */

pub mod errno;
pub mod flags;
pub mod sockaddr;

pub use errno::{to_guest_errno, GuestErrno};
pub use flags::{msg_flags_from_guest, open_flags_from_guest, open_flags_to_guest};
pub use sockaddr::{from_guest_layout, to_guest_layout, GuestSockaddrIn, SOCKADDR_IN_LEN};

/// Whether host and guest numbering differ for this build
pub const fn translation_active() -> bool {
    cfg!(all(feature = "darwin-guest", not(target_vendor = "apple")))
}

/*!
 * Flag Translation
 * fcntl open-file flags and send/recv message flags
 */

use nix::fcntl::OFlag;
use nix::sys::socket::MsgFlags;

#[cfg(all(feature = "darwin-guest", not(target_vendor = "apple")))]
mod table {
    use super::*;

    /// Access-mode bits (O_RDONLY / O_WRONLY / O_RDWR) are numbered alike everywhere
    pub(super) const ACCESS_MODE_MASK: i32 = 0x3;

    /// (guest bit, host flag) pairs for F_GETFL / F_SETFL
    pub(super) const OPEN: &[(i32, OFlag)] = &[
        (0x0004, OFlag::O_NONBLOCK),
        (0x0008, OFlag::O_APPEND),
    ];

    /// (guest bit, host flag) pairs for send / recv
    pub(super) const MSG: &[(i32, MsgFlags)] = &[
        (0x0001, MsgFlags::MSG_OOB),
        (0x0002, MsgFlags::MSG_PEEK),
        (0x0040, MsgFlags::MSG_WAITALL),
        (0x0080, MsgFlags::MSG_DONTWAIT),
    ];
}

/// Guest F_SETFL argument -> host open flags
pub fn open_flags_from_guest(flags: i32) -> OFlag {
    #[cfg(all(feature = "darwin-guest", not(target_vendor = "apple")))]
    {
        table::OPEN
            .iter()
            .filter(|(guest, _)| flags & guest != 0)
            .fold(OFlag::from_bits_truncate(flags & table::ACCESS_MODE_MASK), |acc, (_, host)| acc | *host)
    }
    #[cfg(not(all(feature = "darwin-guest", not(target_vendor = "apple"))))]
    {
        OFlag::from_bits_truncate(flags)
    }
}

/// Host F_GETFL result -> guest open flags
pub fn open_flags_to_guest(flags: OFlag) -> i32 {
    #[cfg(all(feature = "darwin-guest", not(target_vendor = "apple")))]
    {
        table::OPEN
            .iter()
            .filter(|(_, host)| flags.contains(*host))
            .fold(flags.bits() & table::ACCESS_MODE_MASK, |acc, (guest, _)| acc | guest)
    }
    #[cfg(not(all(feature = "darwin-guest", not(target_vendor = "apple"))))]
    {
        flags.bits()
    }
}

/// Guest send/recv flags -> host message flags
///
/// Bits the host does not know are dropped.
pub fn msg_flags_from_guest(flags: i32) -> MsgFlags {
    #[cfg(all(feature = "darwin-guest", not(target_vendor = "apple")))]
    {
        table::MSG
            .iter()
            .filter(|(guest, _)| flags & guest != 0)
            .fold(MsgFlags::empty(), |acc, (_, host)| acc | *host)
    }
    #[cfg(not(all(feature = "darwin-guest", not(target_vendor = "apple"))))]
    {
        MsgFlags::from_bits_truncate(flags)
    }
}

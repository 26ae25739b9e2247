/*!
 * Error Number Translation
 * Host errno -> guest errno
 */

use nix::errno::Errno;

/// Error number in the guest's numbering, as stored in the call record
pub type GuestErrno = i64;

/// Host errno values whose guest encoding differs
///
/// Guest values are the XNU `errno.h` numbers.
#[cfg(all(feature = "darwin-guest", not(target_vendor = "apple")))]
const HOST_TO_GUEST: &[(Errno, GuestErrno)] = &[
    (Errno::EAGAIN, 35),
    (Errno::EDEADLK, 11),
    (Errno::EINPROGRESS, 36),
    (Errno::EALREADY, 37),
    (Errno::ENOTSOCK, 38),
    (Errno::EDESTADDRREQ, 39),
    (Errno::EMSGSIZE, 40),
    (Errno::EPROTOTYPE, 41),
    (Errno::ENOPROTOOPT, 42),
    (Errno::EPROTONOSUPPORT, 43),
    (Errno::ESOCKTNOSUPPORT, 44),
    (Errno::EPFNOSUPPORT, 46),
    (Errno::EAFNOSUPPORT, 47),
    (Errno::EADDRINUSE, 48),
    (Errno::EADDRNOTAVAIL, 49),
    (Errno::ENETDOWN, 50),
    (Errno::ENETUNREACH, 51),
    (Errno::ENETRESET, 52),
    (Errno::ECONNABORTED, 53),
    (Errno::ECONNRESET, 54),
    (Errno::ENOBUFS, 55),
    (Errno::EISCONN, 56),
    (Errno::ENOTCONN, 57),
    (Errno::ESHUTDOWN, 58),
    (Errno::ETOOMANYREFS, 59),
    (Errno::ETIMEDOUT, 60),
    (Errno::ECONNREFUSED, 61),
    (Errno::EHOSTDOWN, 64),
    (Errno::EHOSTUNREACH, 65),
    (Errno::ENOSYS, 78),
    (Errno::EOPNOTSUPP, 102),
];

#[cfg(not(all(feature = "darwin-guest", not(target_vendor = "apple"))))]
const HOST_TO_GUEST: &[(Errno, GuestErrno)] = &[];

/// Translate a host error number into the guest's numbering
///
/// Identity unless the value appears in the override table.
pub fn to_guest_errno(host: Errno) -> GuestErrno {
    HOST_TO_GUEST
        .iter()
        .find(|(from, _)| *from == host)
        .map(|(_, to)| *to)
        .unwrap_or(host as i32 as GuestErrno)
}

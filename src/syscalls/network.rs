/*!
 * Network Calls
 * Socket operations on behalf of the guest
 *
 * Every handler validates the descriptor before anything else; an invalid
 * descriptor never reaches the host OS. Guest buffers are staged through
 * bounded host buffers, the guest never hands the host a raw pointer.
 */

use crate::abi::{from_guest_layout, msg_flags_from_guest, to_guest_layout, GuestSockaddrIn, SOCKADDR_IN_LEN};
use crate::core::limits::{MAX_BUF_SIZE, MAX_SOCKADDR_SIZE};
use crate::core::types::{GuestAddr, GuestFd, RetVal};
use crate::memory::GuestMemory;

use nix::errno::Errno;
use nix::libc;
use nix::sys::socket::{self, Backlog, MsgFlags, SockaddrIn};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use tracing::{debug, info, warn};

use super::executor::BridgeState;
use super::types::{CallError, CallResult};

/// Flags added to every host send
#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: MsgFlags = MsgFlags::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: MsgFlags = MsgFlags::empty();

impl BridgeState {
    pub(super) fn socket(&mut self, domain: i32, socket_type: i32, protocol: i32) -> CallResult {
        let fd = self.fds.allocate()?;

        // SAFETY: socket(2) only takes integers
        let created = Errno::result(unsafe { libc::socket(domain, socket_type, protocol) });
        match created {
            Ok(raw) => {
                // SAFETY: `raw` was just returned by socket(2) and has no other owner
                let handle = unsafe { OwnedFd::from_raw_fd(raw) };
                self.fds.install(fd, handle)?;
                info!(fd, domain, socket_type, protocol, "Guest socket created");
                Ok(RetVal::from(fd))
            }
            Err(errno) => {
                self.fds.release(fd);
                debug!(domain, socket_type, protocol, %errno, "Host socket creation failed");
                Err(errno.into())
            }
        }
    }

    pub(super) fn bind(
        &mut self,
        mem: &dyn GuestMemory,
        fd: GuestFd,
        addr: GuestAddr,
        addrlen: u32,
    ) -> CallResult {
        let sock = self.fds.get(fd)?.as_raw_fd();
        let host_addr = read_sockaddr(mem, addr, addrlen)?;

        socket::bind(sock, &SockaddrIn::from(host_addr))?;
        mem.write(addr, &to_guest_layout(&host_addr))?;

        info!(fd, address = %host_addr, "Guest socket bound");
        Ok(0)
    }

    pub(super) fn connect(
        &mut self,
        mem: &dyn GuestMemory,
        fd: GuestFd,
        addr: GuestAddr,
        addrlen: u32,
    ) -> CallResult {
        let sock = self.fds.get(fd)?.as_raw_fd();
        let host_addr = read_sockaddr(mem, addr, addrlen)?;

        socket::connect(sock, &SockaddrIn::from(host_addr))?;
        mem.write(addr, &to_guest_layout(&host_addr))?;

        info!(fd, address = %host_addr, "Guest socket connected");
        Ok(0)
    }

    pub(super) fn listen(&mut self, fd: GuestFd, backlog: i32) -> CallResult {
        let sock = self.fds.get(fd)?;
        let backlog = Backlog::new(backlog).unwrap_or(Backlog::MAXCONN);

        socket::listen(sock, backlog)?;

        info!(fd, "Guest socket listening");
        Ok(0)
    }

    /// Accept a pending connection into a new slot
    ///
    /// A zero `addr` or `addrlen_ptr` skips that write-back. Guest memory is
    /// only written once the connection is fully set up.
    pub(super) fn accept(
        &mut self,
        mem: &dyn GuestMemory,
        fd: GuestFd,
        addr: GuestAddr,
        addrlen_ptr: GuestAddr,
    ) -> CallResult {
        let listener = self.fds.get(fd)?.as_raw_fd();
        let new_fd = self.fds.allocate()?;

        let accepted = accept_nonblocking(listener)
            .map_err(CallError::from)
            .and_then(|(conn, peer)| {
                write_peer(mem, addr, addrlen_ptr, &peer)?;
                Ok((conn, peer))
            });

        match accepted {
            Ok((conn, peer)) => {
                self.fds.install(new_fd, conn)?;
                info!(fd, new_fd, peer = %peer, "Guest accepted connection");
                Ok(RetVal::from(new_fd))
            }
            Err(err) => {
                // A connection that was accepted is dropped (closed) here
                self.fds.release(new_fd);
                debug!(fd, error = %err, "Accept failed");
                Err(err)
            }
        }
    }

    /// Receive into guest memory
    ///
    /// Exactly the bytes the host produced are copied out; a short read is
    /// not an error.
    pub(super) fn recv(
        &mut self,
        mem: &dyn GuestMemory,
        fd: GuestFd,
        buffer: GuestAddr,
        length: u64,
        flags: i32,
    ) -> CallResult {
        let sock = self.fds.get(fd)?.as_raw_fd();
        let length = check_transfer(length)?;

        let mut staging = [0u8; MAX_BUF_SIZE];
        let received = socket::recv(sock, &mut staging[..length], msg_flags_from_guest(flags))?;
        if received > 0 {
            mem.write(buffer, &staging[..received])?;
        }

        debug!(fd, requested = length, received, "Guest recv");
        Ok(received as RetVal)
    }

    pub(super) fn send(
        &mut self,
        mem: &dyn GuestMemory,
        fd: GuestFd,
        buffer: GuestAddr,
        length: u64,
        flags: i32,
    ) -> CallResult {
        let sock = self.fds.get(fd)?.as_raw_fd();
        let length = check_transfer(length)?;

        let mut staging = [0u8; MAX_BUF_SIZE];
        mem.read(buffer, &mut staging[..length])?;
        let sent = socket::send(sock, &staging[..length], msg_flags_from_guest(flags) | SEND_FLAGS)?;

        debug!(fd, requested = length, sent, "Guest send");
        Ok(sent as RetVal)
    }
}

/// Enforce the send/recv ceiling
fn check_transfer(length: u64) -> Result<usize, CallError> {
    usize::try_from(length)
        .ok()
        .filter(|len| *len <= MAX_BUF_SIZE)
        .ok_or_else(|| {
            warn!(length, max = MAX_BUF_SIZE, "Guest transfer exceeds ceiling");
            CallError::Host(Errno::ENOMEM)
        })
}

/// Read and decode a guest `sockaddr_in`
///
/// The guest's length is checked before guest memory is read: above the
/// ceiling is ENOMEM, shorter than a `sockaddr_in` is EINVAL as from bind(2).
fn read_sockaddr(mem: &dyn GuestMemory, addr: GuestAddr, addrlen: u32) -> Result<SocketAddrV4, CallError> {
    let addrlen = addrlen as usize;
    if addrlen > MAX_SOCKADDR_SIZE {
        warn!(addrlen, max = MAX_SOCKADDR_SIZE, "Guest address length exceeds ceiling");
        return Err(Errno::ENOMEM.into());
    }
    if addrlen < SOCKADDR_IN_LEN {
        debug!(addrlen, "Guest address shorter than sockaddr_in");
        return Err(Errno::EINVAL.into());
    }

    let mut raw: GuestSockaddrIn = [0; SOCKADDR_IN_LEN];
    mem.read(addr, &mut raw)?;
    Ok(from_guest_layout(&raw)?)
}

fn write_peer(
    mem: &dyn GuestMemory,
    addr: GuestAddr,
    addrlen_ptr: GuestAddr,
    peer: &SocketAddrV4,
) -> Result<(), CallError> {
    if addr != 0 {
        mem.write(addr, &to_guest_layout(peer))?;
    }
    if addrlen_ptr != 0 {
        mem.write_u32(addrlen_ptr, SOCKADDR_IN_LEN as u32)?;
    }
    Ok(())
}

/// Peer address filled in by accept(2)
fn peer_from_raw(raw: &libc::sockaddr_in) -> nix::Result<SocketAddrV4> {
    if i32::from(raw.sin_family) != libc::AF_INET {
        return Err(Errno::EAFNOSUPPORT);
    }
    Ok(SocketAddrV4::new(
        Ipv4Addr::from(u32::from_be(raw.sin_addr.s_addr)),
        u16::from_be(raw.sin_port),
    ))
}

/// Accept a connection as a non-blocking socket, with its peer address
#[cfg(any(target_os = "linux", target_os = "android"))]
fn accept_nonblocking(listener: RawFd) -> nix::Result<(OwnedFd, SocketAddrV4)> {
    // SAFETY: sockaddr_in is plain data; all-zero is a valid value
    let mut peer: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;

    // SAFETY: `peer` and `len` outlive the call and `len` holds the buffer size
    let raw = Errno::result(unsafe {
        libc::accept4(
            listener,
            (&mut peer as *mut libc::sockaddr_in).cast(),
            &mut len,
            libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
        )
    })?;
    // SAFETY: `raw` was just returned by accept4(2) and has no other owner
    let conn = unsafe { OwnedFd::from_raw_fd(raw) };
    Ok((conn, peer_from_raw(&peer)?))
}

/// Accept a connection as a non-blocking socket, with its peer address
#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn accept_nonblocking(listener: RawFd) -> nix::Result<(OwnedFd, SocketAddrV4)> {
    use nix::fcntl::{fcntl, FcntlArg, OFlag};

    // SAFETY: sockaddr_in is plain data; all-zero is a valid value
    let mut peer: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;

    // SAFETY: `peer` and `len` outlive the call and `len` holds the buffer size
    let raw = Errno::result(unsafe {
        libc::accept(listener, (&mut peer as *mut libc::sockaddr_in).cast(), &mut len)
    })?;
    // SAFETY: `raw` was just returned by accept(2) and has no other owner
    let conn = unsafe { OwnedFd::from_raw_fd(raw) };
    fcntl(conn.as_raw_fd(), FcntlArg::F_SETFL(OFlag::O_NONBLOCK))?;
    Ok((conn, peer_from_raw(&peer)?))
}

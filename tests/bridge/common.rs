/*!
 * Shared helpers for the bridge tests
 */

#![allow(dead_code)]

use guest_services::abi::to_guest_errno;
use guest_services::limits::CALL_RECORD_SIZE;
use guest_services::{CallRecord, FlatGuestMemory, GuestMemory, Hypercall, HypercallBridge};
use nix::errno::Errno;
use std::net::{SocketAddr, SocketAddrV4, TcpListener};

/// Guest RAM window used by every test
pub const GUEST_BASE: u64 = 0x1000;
pub const GUEST_SIZE: usize = 0x8000;

pub fn guest_memory() -> FlatGuestMemory {
    FlatGuestMemory::new(GUEST_BASE, GUEST_SIZE)
}

/// Guest-visible value of a host errno
pub fn guest_errno(errno: Errno) -> i64 {
    to_guest_errno(errno)
}

/// A loopback address with a port nobody is listening on
pub fn free_loopback_addr() -> SocketAddrV4 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    match listener.local_addr().unwrap() {
        SocketAddr::V4(addr) => addr,
        SocketAddr::V6(_) => panic!("loopback bound to IPv6"),
    }
}

/// Write a request record at `addr`, trap, and read the record back
pub fn call_via_record(
    bridge: &HypercallBridge,
    mem: &FlatGuestMemory,
    addr: u64,
    call: Hypercall,
) -> CallRecord {
    mem.write(addr, &CallRecord::request(&call).encode()).unwrap();
    bridge.handle_hypercall(mem, addr);
    read_record(mem, addr)
}

pub fn read_record(mem: &FlatGuestMemory, addr: u64) -> CallRecord {
    let raw: [u8; CALL_RECORD_SIZE] = mem
        .snapshot(addr, CALL_RECORD_SIZE)
        .unwrap()
        .try_into()
        .unwrap();
    CallRecord::decode(&raw)
}

pub fn tcp_socket() -> Hypercall {
    Hypercall::Socket {
        domain: nix::libc::AF_INET,
        socket_type: nix::libc::SOCK_STREAM,
        protocol: 0,
    }
}

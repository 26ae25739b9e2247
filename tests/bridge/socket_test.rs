/*!
 * Socket Handler Tests
 * Real loopback sockets driven through the bridge
 */

use super::common::*;
use guest_services::abi::{from_guest_layout, open_flags_to_guest, to_guest_layout, SOCKADDR_IN_LEN};
use guest_services::limits::MAX_BUF_SIZE;
use guest_services::syscalls::types::{FCNTL_GETFL, FCNTL_SETFL};
use guest_services::{CallResponse, FlatGuestMemory, GuestMemory, Hypercall, HypercallBridge};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use pretty_assertions::assert_eq;
use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};

const ADDR_SLOT: u64 = GUEST_BASE;
const PEER_SLOT: u64 = GUEST_BASE + 0x100;
const PEER_LEN_SLOT: u64 = GUEST_BASE + 0x120;
const DATA_SLOT: u64 = GUEST_BASE + 0x1000;

fn place_addr(mem: &FlatGuestMemory, addr: SocketAddrV4) {
    mem.write(ADDR_SLOT, &to_guest_layout(&addr)).unwrap();
}

fn open_socket(bridge: &HypercallBridge, mem: &FlatGuestMemory) -> i32 {
    let response = bridge.execute(mem, tcp_socket());
    assert!(!response.is_failure(), "socket failed: {:?}", response);
    response.retval as i32
}

/// Bridge socket connected to a std listener; returns (guest fd, host peer)
fn connected_pair(bridge: &HypercallBridge, mem: &FlatGuestMemory) -> (i32, std::net::TcpStream) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let target = match listener.local_addr().unwrap() {
        std::net::SocketAddr::V4(addr) => addr,
        std::net::SocketAddr::V6(_) => unreachable!(),
    };

    let fd = open_socket(bridge, mem);
    place_addr(mem, target);
    let response = bridge.execute(
        mem,
        Hypercall::Connect {
            fd,
            addr: ADDR_SLOT,
            addrlen: SOCKADDR_IN_LEN as u32,
        },
    );
    assert_eq!(response, CallResponse { retval: 0, error: 0 });

    let (peer, _) = listener.accept().unwrap();
    (fd, peer)
}

/// recv on a non-blocking socket, retrying while it would block
fn recv_retry(bridge: &HypercallBridge, mem: &FlatGuestMemory, fd: i32, length: u64) -> CallResponse {
    let would_block = guest_errno(Errno::EAGAIN);
    for _ in 0..200 {
        let response = bridge.execute(
            mem,
            Hypercall::Recv {
                fd,
                buffer: DATA_SLOT,
                length,
                flags: 0,
            },
        );
        if response.retval != -1 || response.error != would_block {
            return response;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    panic!("recv on descriptor {} never became ready", fd);
}

#[test]
fn test_loopback_round_trip() {
    let bridge = HypercallBridge::new();
    let mem = guest_memory();
    let addr = free_loopback_addr();

    let listener = open_socket(&bridge, &mem);
    place_addr(&mem, addr);
    let bind = bridge.execute(
        &mem,
        Hypercall::Bind {
            fd: listener,
            addr: ADDR_SLOT,
            addrlen: SOCKADDR_IN_LEN as u32,
        },
    );
    assert_eq!(bind, CallResponse { retval: 0, error: 0 });
    assert_eq!(
        mem.snapshot(ADDR_SLOT, SOCKADDR_IN_LEN).unwrap(),
        to_guest_layout(&addr).to_vec()
    );

    let listen = bridge.execute(&mem, Hypercall::Listen { fd: listener, backlog: 8 });
    assert_eq!(listen.retval, 0);

    let client = open_socket(&bridge, &mem);
    let connect = bridge.execute(
        &mem,
        Hypercall::Connect {
            fd: client,
            addr: ADDR_SLOT,
            addrlen: SOCKADDR_IN_LEN as u32,
        },
    );
    assert_eq!(connect.retval, 0);

    let accepted = bridge.execute(
        &mem,
        Hypercall::Accept {
            fd: listener,
            addr: PEER_SLOT,
            addrlen_ptr: PEER_LEN_SLOT,
        },
    );
    assert_eq!(accepted.retval, 2);
    assert_eq!(mem.read_u32(PEER_LEN_SLOT).unwrap(), SOCKADDR_IN_LEN as u32);
    let raw: [u8; SOCKADDR_IN_LEN] = mem
        .snapshot(PEER_SLOT, SOCKADDR_IN_LEN)
        .unwrap()
        .try_into()
        .unwrap();
    assert_eq!(*from_guest_layout(&raw).unwrap().ip(), Ipv4Addr::LOCALHOST);

    mem.write(DATA_SLOT, b"ping").unwrap();
    let sent = bridge.execute(
        &mem,
        Hypercall::Send {
            fd: client,
            buffer: DATA_SLOT,
            length: 4,
            flags: 0,
        },
    );
    assert_eq!(sent.retval, 4);

    mem.fill(DATA_SLOT, 4, 0).unwrap();
    let received = recv_retry(&bridge, &mem, 2, 64);
    assert_eq!(received.retval, 4);
    assert_eq!(mem.snapshot(DATA_SLOT, 4).unwrap(), b"ping".to_vec());

    for fd in [client, 2, listener] {
        assert_eq!(bridge.execute(&mem, Hypercall::Close { fd }).retval, 0);
    }
    assert_eq!(bridge.stats().open_descriptors, 0);
}

#[test]
fn test_accepted_socket_is_nonblocking() {
    let bridge = HypercallBridge::new();
    let mem = guest_memory();
    let addr = free_loopback_addr();

    let listener = open_socket(&bridge, &mem);
    place_addr(&mem, addr);
    bridge.execute(
        &mem,
        Hypercall::Bind {
            fd: listener,
            addr: ADDR_SLOT,
            addrlen: SOCKADDR_IN_LEN as u32,
        },
    );
    bridge.execute(&mem, Hypercall::Listen { fd: listener, backlog: 1 });
    let _client = std::net::TcpStream::connect(addr).unwrap();

    let accepted = bridge.execute(
        &mem,
        Hypercall::Accept {
            fd: listener,
            addr: 0,
            addrlen_ptr: 0,
        },
    );
    assert!(!accepted.is_failure());

    // Nothing was sent, so a read must not block
    let recv = bridge.execute(
        &mem,
        Hypercall::Recv {
            fd: accepted.retval as i32,
            buffer: DATA_SLOT,
            length: 16,
            flags: 0,
        },
    );
    assert_eq!(recv, CallResponse { retval: -1, error: guest_errno(Errno::EAGAIN) });
}

#[test]
fn test_accept_with_null_pointers_writes_nothing() {
    let bridge = HypercallBridge::new();
    let mem = guest_memory();
    let addr = free_loopback_addr();

    let listener = open_socket(&bridge, &mem);
    place_addr(&mem, addr);
    bridge.execute(
        &mem,
        Hypercall::Bind {
            fd: listener,
            addr: ADDR_SLOT,
            addrlen: SOCKADDR_IN_LEN as u32,
        },
    );
    bridge.execute(&mem, Hypercall::Listen { fd: listener, backlog: 1 });
    let _client = std::net::TcpStream::connect(addr).unwrap();

    let writes_before = mem.stats().writes;
    let accepted = bridge.execute(
        &mem,
        Hypercall::Accept {
            fd: listener,
            addr: 0,
            addrlen_ptr: 0,
        },
    );
    assert_eq!(accepted.retval, 1);
    assert_eq!(mem.stats().writes, writes_before);
}

#[test]
fn test_accept_fault_releases_slot() {
    let bridge = HypercallBridge::new();
    let mem = guest_memory();
    let addr = free_loopback_addr();

    let listener = open_socket(&bridge, &mem);
    place_addr(&mem, addr);
    bridge.execute(
        &mem,
        Hypercall::Bind {
            fd: listener,
            addr: ADDR_SLOT,
            addrlen: SOCKADDR_IN_LEN as u32,
        },
    );
    bridge.execute(&mem, Hypercall::Listen { fd: listener, backlog: 1 });
    let mut client = std::net::TcpStream::connect(addr).unwrap();

    let accepted = bridge.execute(
        &mem,
        Hypercall::Accept {
            fd: listener,
            addr: 0x10,
            addrlen_ptr: PEER_LEN_SLOT,
        },
    );
    assert_eq!(accepted, CallResponse { retval: -1, error: guest_errno(Errno::EFAULT) });
    assert_eq!(bridge.stats().open_descriptors, 1);

    // The host side of the dropped connection was closed
    client
        .set_read_timeout(Some(std::time::Duration::from_secs(5)))
        .unwrap();
    let mut buf = [0u8; 1];
    assert_eq!(client.read(&mut buf).unwrap_or(0), 0);
}

#[test]
fn test_recv_writes_only_what_arrived() {
    let bridge = HypercallBridge::new();
    let mem = guest_memory();
    let (fd, mut peer) = connected_pair(&bridge, &mem);

    peer.write_all(b"0123456789").unwrap();
    mem.fill(DATA_SLOT, 16, 0xAA).unwrap();

    let response = bridge.execute(
        &mem,
        Hypercall::Recv {
            fd,
            buffer: DATA_SLOT,
            length: 3,
            flags: 0,
        },
    );
    assert_eq!(response.retval, 3);

    let guest = mem.snapshot(DATA_SLOT, 16).unwrap();
    assert_eq!(&guest[..3], b"012");
    assert!(guest[3..].iter().all(|b| *b == 0xAA));
}

#[test]
fn test_recv_of_closed_peer_is_zero() {
    let bridge = HypercallBridge::new();
    let mem = guest_memory();
    let (fd, peer) = connected_pair(&bridge, &mem);
    drop(peer);

    let writes_before = mem.stats().writes;
    let response = bridge.execute(
        &mem,
        Hypercall::Recv {
            fd,
            buffer: DATA_SLOT,
            length: 8,
            flags: 0,
        },
    );
    assert_eq!(response, CallResponse { retval: 0, error: 0 });
    assert_eq!(mem.stats().writes, writes_before);
}

#[test]
fn test_send_reaches_peer() {
    let bridge = HypercallBridge::new();
    let mem = guest_memory();
    let (fd, mut peer) = connected_pair(&bridge, &mem);

    mem.write(DATA_SLOT, b"hello host").unwrap();
    let response = bridge.execute(
        &mem,
        Hypercall::Send {
            fd,
            buffer: DATA_SLOT,
            length: 10,
            flags: 0,
        },
    );
    assert_eq!(response.retval, 10);

    let mut buf = [0u8; 10];
    peer.read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"hello host");
}

#[test]
fn test_oversize_transfers_touch_nothing() {
    let bridge = HypercallBridge::new();
    let mem = guest_memory();
    let fd = open_socket(&bridge, &mem);
    let stats_before = mem.stats();

    for call in [
        Hypercall::Send {
            fd,
            buffer: DATA_SLOT,
            length: MAX_BUF_SIZE as u64 + 1,
            flags: 0,
        },
        Hypercall::Recv {
            fd,
            buffer: DATA_SLOT,
            length: MAX_BUF_SIZE as u64 + 1,
            flags: 0,
        },
    ] {
        let response = bridge.execute(&mem, call);
        assert_eq!(response, CallResponse { retval: -1, error: guest_errno(Errno::ENOMEM) });
    }

    assert_eq!(mem.stats(), stats_before);
    assert_eq!(bridge.stats().open_descriptors, 1);
}

#[test]
fn test_oversize_address_is_rejected() {
    let bridge = HypercallBridge::new();
    let mem = guest_memory();
    let fd = open_socket(&bridge, &mem);
    place_addr(&mem, free_loopback_addr());
    let reads_before = mem.stats().reads;

    let response = bridge.execute(
        &mem,
        Hypercall::Bind {
            fd,
            addr: ADDR_SLOT,
            addrlen: SOCKADDR_IN_LEN as u32 + 1,
        },
    );
    assert_eq!(response, CallResponse { retval: -1, error: guest_errno(Errno::ENOMEM) });
    assert_eq!(mem.stats().reads, reads_before);
}

#[test]
fn test_short_address_is_rejected() {
    let bridge = HypercallBridge::new();
    let mem = guest_memory();
    let fd = open_socket(&bridge, &mem);
    place_addr(&mem, free_loopback_addr());
    let reads_before = mem.stats().reads;

    for addrlen in [0, 8] {
        for call in [
            Hypercall::Bind {
                fd,
                addr: ADDR_SLOT,
                addrlen,
            },
            Hypercall::Connect {
                fd,
                addr: ADDR_SLOT,
                addrlen,
            },
        ] {
            let response = bridge.execute(&mem, call);
            assert_eq!(
                response,
                CallResponse { retval: -1, error: guest_errno(Errno::EINVAL) },
                "{:?}",
                call
            );
        }
    }
    assert_eq!(mem.stats().reads, reads_before);
}

#[test]
fn test_non_inet_address_is_rejected() {
    let bridge = HypercallBridge::new();
    let mem = guest_memory();
    let fd = open_socket(&bridge, &mem);
    mem.write(ADDR_SLOT, &[0x10, 0x1e, 0, 80, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]).unwrap();

    let response = bridge.execute(
        &mem,
        Hypercall::Connect {
            fd,
            addr: ADDR_SLOT,
            addrlen: SOCKADDR_IN_LEN as u32,
        },
    );
    assert_eq!(
        response,
        CallResponse { retval: -1, error: guest_errno(Errno::EAFNOSUPPORT) }
    );
}

#[test]
fn test_exhausted_table() {
    let bridge = HypercallBridge::with_fd_capacity(1);
    let mem = guest_memory();

    assert_eq!(open_socket(&bridge, &mem), 0);
    let response = bridge.execute(&mem, tcp_socket());
    assert_eq!(response, CallResponse { retval: -1, error: guest_errno(Errno::ENOMEM) });
    assert_eq!(bridge.stats().open_descriptors, 1);
}

#[test]
fn test_failed_socket_creation_releases_slot() {
    let bridge = HypercallBridge::with_fd_capacity(1);
    let mem = guest_memory();

    let response = bridge.execute(
        &mem,
        Hypercall::Socket {
            domain: -1,
            socket_type: nix::libc::SOCK_STREAM,
            protocol: 0,
        },
    );
    assert!(response.is_failure());
    assert_ne!(response.error, 0);
    assert_eq!(open_socket(&bridge, &mem), 0);
}

#[test]
fn test_double_close() {
    let bridge = HypercallBridge::new();
    let mem = guest_memory();
    let fd = open_socket(&bridge, &mem);

    assert_eq!(bridge.execute(&mem, Hypercall::Close { fd }), CallResponse { retval: 0, error: 0 });
    assert_eq!(bridge.execute(&mem, Hypercall::Close { fd }), CallResponse { retval: -1, error: 0 });

    // The freed slot is handed out again
    assert_eq!(open_socket(&bridge, &mem), fd);
}

#[test]
fn test_invalid_descriptors_never_reach_host() {
    let bridge = HypercallBridge::with_fd_capacity(4);
    let mem = guest_memory();

    for fd in [-1, 3, 4, i32::MAX] {
        let response = bridge.execute(&mem, Hypercall::Listen { fd, backlog: 1 });
        assert_eq!(response, CallResponse { retval: -1, error: 0 });
    }
}

#[test]
fn test_fcntl_nonblocking_flag() {
    let bridge = HypercallBridge::new();
    let mem = guest_memory();
    let fd = open_socket(&bridge, &mem);
    let guest_nonblock = open_flags_to_guest(OFlag::O_NONBLOCK) as i32;

    let before = bridge.execute(&mem, Hypercall::Fcntl { fd, cmd: FCNTL_GETFL, flags: 0 });
    assert_eq!(before.retval & guest_nonblock as i64, 0);

    let set = bridge.execute(
        &mem,
        Hypercall::Fcntl {
            fd,
            cmd: FCNTL_SETFL,
            flags: before.retval as i32 | guest_nonblock,
        },
    );
    assert_eq!(set.retval, 0);

    let after = bridge.execute(&mem, Hypercall::Fcntl { fd, cmd: FCNTL_GETFL, flags: 0 });
    assert_ne!(after.retval & guest_nonblock as i64, 0);

    let unsupported = bridge.execute(&mem, Hypercall::Fcntl { fd, cmd: 99, flags: 0 });
    assert_eq!(
        unsupported,
        CallResponse { retval: -1, error: guest_errno(Errno::EINVAL) }
    );
}

#[test]
fn test_connect_refused() {
    let bridge = HypercallBridge::new();
    let mem = guest_memory();
    let fd = open_socket(&bridge, &mem);
    place_addr(&mem, free_loopback_addr());

    let response = bridge.execute(
        &mem,
        Hypercall::Connect {
            fd,
            addr: ADDR_SLOT,
            addrlen: SOCKADDR_IN_LEN as u32,
        },
    );
    assert_eq!(
        response,
        CallResponse { retval: -1, error: guest_errno(Errno::ECONNREFUSED) }
    );
}

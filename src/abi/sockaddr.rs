/*!
 * Socket Address Codec
 * Guest `struct sockaddr_in` bytes <-> host-neutral `SocketAddrV4`
 *
 * The host-side structure is built by nix from the decoded address, so only
 * the guest layout needs describing here.
 */

use bytes::{Buf, BufMut};
use nix::errno::Errno;
use std::net::{Ipv4Addr, SocketAddrV4};

/// Size of the guest's `struct sockaddr_in`
pub const SOCKADDR_IN_LEN: usize = 16;

/// Raw guest `struct sockaddr_in`
pub type GuestSockaddrIn = [u8; SOCKADDR_IN_LEN];

/// AF_INET is 2 on every supported guest and host
const AF_INET: u8 = 2;

/// Decode a guest `sockaddr_in`
///
/// BSD layout: `sin_len: u8`, `sin_family: u8`, `sin_port: u16` (network
/// order), `sin_addr: [u8; 4]`, `sin_zero: [u8; 8]`. `sin_len` is not
/// trusted; the caller has already bounded the length.
#[cfg(feature = "darwin-guest")]
pub fn from_guest_layout(raw: &GuestSockaddrIn) -> Result<SocketAddrV4, Errno> {
    let mut buf = &raw[..];
    let _sin_len = buf.get_u8();
    if buf.get_u8() != AF_INET {
        return Err(Errno::EAFNOSUPPORT);
    }
    Ok(decode_port_and_addr(&mut buf))
}

/// Encode a guest `sockaddr_in` (BSD layout, `sin_len` set, `sin_zero` cleared)
#[cfg(feature = "darwin-guest")]
pub fn to_guest_layout(addr: &SocketAddrV4) -> GuestSockaddrIn {
    let mut raw = [0u8; SOCKADDR_IN_LEN];
    let mut buf = &mut raw[..];
    buf.put_u8(SOCKADDR_IN_LEN as u8);
    buf.put_u8(AF_INET);
    encode_port_and_addr(&mut buf, addr);
    raw
}

/// Decode a guest `sockaddr_in`
///
/// Linux layout: `sin_family: u16` (little-endian guest), `sin_port: u16`
/// (network order), `sin_addr: [u8; 4]`, `sin_zero: [u8; 8]`.
#[cfg(not(feature = "darwin-guest"))]
pub fn from_guest_layout(raw: &GuestSockaddrIn) -> Result<SocketAddrV4, Errno> {
    let mut buf = &raw[..];
    if buf.get_u16_le() != u16::from(AF_INET) {
        return Err(Errno::EAFNOSUPPORT);
    }
    Ok(decode_port_and_addr(&mut buf))
}

/// Encode a guest `sockaddr_in` (Linux layout, `sin_zero` cleared)
#[cfg(not(feature = "darwin-guest"))]
pub fn to_guest_layout(addr: &SocketAddrV4) -> GuestSockaddrIn {
    let mut raw = [0u8; SOCKADDR_IN_LEN];
    let mut buf = &mut raw[..];
    buf.put_u16_le(u16::from(AF_INET));
    encode_port_and_addr(&mut buf, addr);
    raw
}

fn decode_port_and_addr(buf: &mut &[u8]) -> SocketAddrV4 {
    let port = buf.get_u16();
    let ip = Ipv4Addr::from(buf.get_u32());
    SocketAddrV4::new(ip, port)
}

fn encode_port_and_addr(buf: &mut &mut [u8], addr: &SocketAddrV4) {
    buf.put_u16(addr.port());
    buf.put_slice(&addr.ip().octets());
}

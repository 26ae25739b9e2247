/*!
 * Call Record
 * The packed request/response record shared with the guest
 *
 * Layout (little-endian, packed):
 *
 * | offset | size | field         |
 * |--------|------|---------------|
 * | 0      | 4    | `call_number` |
 * | 4      | 32   | `args` union  |
 * | 36     | 8    | `retval`      |
 * | 44     | 8    | `error`       |
 */

use crate::core::limits::{CALL_ARGS_SIZE, CALL_RECORD_SIZE};
use crate::core::types::{CallbackId, FileIndex, GuestAddr, GuestFd};
use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

/// fcntl sub-command: read the open-file flags
pub const FCNTL_GETFL: i32 = 3;

/// fcntl sub-command: replace the open-file flags
pub const FCNTL_SETFL: i32 = 4;

/// Call-number tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum CallNumber {
    // File descriptors
    Close = 0x100,
    Fcntl = 0x101,

    // Sockets
    Socket = 0x110,
    Accept = 0x111,
    Bind = 0x112,
    Connect = 0x113,
    Listen = 0x114,
    Recv = 0x115,
    Send = 0x116,

    // Host files
    WriteFile = 0x117,
    ReadFile = 0x118,
    SizeFile = 0x119,

    // Host callbacks
    CallCallback = 0x120,
}

impl CallNumber {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Close => "close",
            Self::Fcntl => "fcntl",
            Self::Socket => "socket",
            Self::Accept => "accept",
            Self::Bind => "bind",
            Self::Connect => "connect",
            Self::Listen => "listen",
            Self::Recv => "recv",
            Self::Send => "send",
            Self::WriteFile => "write_file",
            Self::ReadFile => "read_file",
            Self::SizeFile => "size_file",
            Self::CallCallback => "call_callback",
        }
    }
}

impl TryFrom<u32> for CallNumber {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Ok(match value {
            0x100 => Self::Close,
            0x101 => Self::Fcntl,
            0x110 => Self::Socket,
            0x111 => Self::Accept,
            0x112 => Self::Bind,
            0x113 => Self::Connect,
            0x114 => Self::Listen,
            0x115 => Self::Recv,
            0x116 => Self::Send,
            0x117 => Self::WriteFile,
            0x118 => Self::ReadFile,
            0x119 => Self::SizeFile,
            0x120 => Self::CallCallback,
            other => return Err(other),
        })
    }
}

/// A decoded request: the call number together with its argument payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "call")]
pub enum Hypercall {
    Close {
        fd: GuestFd,
    },
    Fcntl {
        fd: GuestFd,
        cmd: i32,
        flags: i32,
    },
    Socket {
        domain: i32,
        socket_type: i32,
        protocol: i32,
    },
    Accept {
        fd: GuestFd,
        addr: GuestAddr,
        addrlen_ptr: GuestAddr,
    },
    Bind {
        fd: GuestFd,
        addr: GuestAddr,
        addrlen: u32,
    },
    Connect {
        fd: GuestFd,
        addr: GuestAddr,
        addrlen: u32,
    },
    Listen {
        fd: GuestFd,
        backlog: i32,
    },
    Recv {
        fd: GuestFd,
        buffer: GuestAddr,
        length: u64,
        flags: i32,
    },
    Send {
        fd: GuestFd,
        buffer: GuestAddr,
        length: u64,
        flags: i32,
    },
    WriteFile {
        buffer: GuestAddr,
        length: u64,
        offset: u64,
        index: FileIndex,
    },
    ReadFile {
        buffer: GuestAddr,
        length: u64,
        offset: u64,
        index: FileIndex,
    },
    SizeFile {
        index: FileIndex,
    },
    CallCallback {
        id: CallbackId,
        arg: u64,
    },
}

impl Hypercall {
    pub const fn number(&self) -> CallNumber {
        match self {
            Self::Close { .. } => CallNumber::Close,
            Self::Fcntl { .. } => CallNumber::Fcntl,
            Self::Socket { .. } => CallNumber::Socket,
            Self::Accept { .. } => CallNumber::Accept,
            Self::Bind { .. } => CallNumber::Bind,
            Self::Connect { .. } => CallNumber::Connect,
            Self::Listen { .. } => CallNumber::Listen,
            Self::Recv { .. } => CallNumber::Recv,
            Self::Send { .. } => CallNumber::Send,
            Self::WriteFile { .. } => CallNumber::WriteFile,
            Self::ReadFile { .. } => CallNumber::ReadFile,
            Self::SizeFile { .. } => CallNumber::SizeFile,
            Self::CallCallback { .. } => CallNumber::CallCallback,
        }
    }

    /// Decode the union member selected by `number`
    ///
    /// Only the bytes of that member are read.
    pub fn decode(number: CallNumber, args: &[u8; CALL_ARGS_SIZE]) -> Self {
        let mut buf = &args[..];
        match number {
            CallNumber::Close => Self::Close { fd: buf.get_i32_le() },
            CallNumber::Fcntl => Self::Fcntl {
                fd: buf.get_i32_le(),
                cmd: buf.get_i32_le(),
                flags: buf.get_i32_le(),
            },
            CallNumber::Socket => Self::Socket {
                domain: buf.get_i32_le(),
                socket_type: buf.get_i32_le(),
                protocol: buf.get_i32_le(),
            },
            CallNumber::Accept => Self::Accept {
                fd: buf.get_i32_le(),
                addr: buf.get_u64_le(),
                addrlen_ptr: buf.get_u64_le(),
            },
            CallNumber::Bind => Self::Bind {
                fd: buf.get_i32_le(),
                addr: buf.get_u64_le(),
                addrlen: buf.get_u32_le(),
            },
            CallNumber::Connect => Self::Connect {
                fd: buf.get_i32_le(),
                addr: buf.get_u64_le(),
                addrlen: buf.get_u32_le(),
            },
            CallNumber::Listen => Self::Listen {
                fd: buf.get_i32_le(),
                backlog: buf.get_i32_le(),
            },
            CallNumber::Recv => Self::Recv {
                fd: buf.get_i32_le(),
                buffer: buf.get_u64_le(),
                length: buf.get_u64_le(),
                flags: buf.get_i32_le(),
            },
            CallNumber::Send => Self::Send {
                fd: buf.get_i32_le(),
                buffer: buf.get_u64_le(),
                length: buf.get_u64_le(),
                flags: buf.get_i32_le(),
            },
            CallNumber::WriteFile => Self::WriteFile {
                buffer: buf.get_u64_le(),
                length: buf.get_u64_le(),
                offset: buf.get_u64_le(),
                index: buf.get_u64_le(),
            },
            CallNumber::ReadFile => Self::ReadFile {
                buffer: buf.get_u64_le(),
                length: buf.get_u64_le(),
                offset: buf.get_u64_le(),
                index: buf.get_u64_le(),
            },
            CallNumber::SizeFile => Self::SizeFile {
                index: buf.get_u64_le(),
            },
            CallNumber::CallCallback => Self::CallCallback {
                id: buf.get_u64_le(),
                arg: buf.get_u64_le(),
            },
        }
    }

    /// Encode the argument payload; unused trailing bytes are zero
    pub fn encode_args(&self) -> [u8; CALL_ARGS_SIZE] {
        let mut args = [0u8; CALL_ARGS_SIZE];
        let mut buf = &mut args[..];
        match *self {
            Self::Close { fd } => buf.put_i32_le(fd),
            Self::Fcntl { fd, cmd, flags } => {
                buf.put_i32_le(fd);
                buf.put_i32_le(cmd);
                buf.put_i32_le(flags);
            }
            Self::Socket {
                domain,
                socket_type,
                protocol,
            } => {
                buf.put_i32_le(domain);
                buf.put_i32_le(socket_type);
                buf.put_i32_le(protocol);
            }
            Self::Accept {
                fd,
                addr,
                addrlen_ptr,
            } => {
                buf.put_i32_le(fd);
                buf.put_u64_le(addr);
                buf.put_u64_le(addrlen_ptr);
            }
            Self::Bind { fd, addr, addrlen } | Self::Connect { fd, addr, addrlen } => {
                buf.put_i32_le(fd);
                buf.put_u64_le(addr);
                buf.put_u32_le(addrlen);
            }
            Self::Listen { fd, backlog } => {
                buf.put_i32_le(fd);
                buf.put_i32_le(backlog);
            }
            Self::Recv {
                fd,
                buffer,
                length,
                flags,
            }
            | Self::Send {
                fd,
                buffer,
                length,
                flags,
            } => {
                buf.put_i32_le(fd);
                buf.put_u64_le(buffer);
                buf.put_u64_le(length);
                buf.put_i32_le(flags);
            }
            Self::WriteFile {
                buffer,
                length,
                offset,
                index,
            }
            | Self::ReadFile {
                buffer,
                length,
                offset,
                index,
            } => {
                buf.put_u64_le(buffer);
                buf.put_u64_le(length);
                buf.put_u64_le(offset);
                buf.put_u64_le(index);
            }
            Self::SizeFile { index } => buf.put_u64_le(index),
            Self::CallCallback { id, arg } => {
                buf.put_u64_le(id);
                buf.put_u64_le(arg);
            }
        }
        args
    }
}

/// The raw call record as it sits in guest memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallRecord {
    pub call_number: u32,
    pub args: [u8; CALL_ARGS_SIZE],
    pub retval: i64,
    pub error: i64,
}

impl CallRecord {
    /// Build a request record with zeroed response fields
    pub fn request(call: &Hypercall) -> Self {
        Self {
            call_number: call.number() as u32,
            args: call.encode_args(),
            retval: 0,
            error: 0,
        }
    }

    pub fn decode(raw: &[u8; CALL_RECORD_SIZE]) -> Self {
        let mut buf = &raw[..];
        let call_number = buf.get_u32_le();
        let mut args = [0u8; CALL_ARGS_SIZE];
        buf.copy_to_slice(&mut args);
        Self {
            call_number,
            args,
            retval: buf.get_i64_le(),
            error: buf.get_i64_le(),
        }
    }

    pub fn encode(&self) -> [u8; CALL_RECORD_SIZE] {
        let mut raw = [0u8; CALL_RECORD_SIZE];
        let mut buf = &mut raw[..];
        buf.put_u32_le(self.call_number);
        buf.put_slice(&self.args);
        buf.put_i64_le(self.retval);
        buf.put_i64_le(self.error);
        raw
    }

    /// The request carried by this record, or `None` for an unknown call number
    pub fn call(&self) -> Option<Hypercall> {
        CallNumber::try_from(self.call_number)
            .ok()
            .map(|number| Hypercall::decode(number, &self.args))
    }
}

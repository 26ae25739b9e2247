/*!
 * File Descriptor Calls
 * close and fcntl on the generic fd table
 */

use crate::abi::{open_flags_from_guest, open_flags_to_guest};
use crate::core::types::{GuestFd, RetVal};

use log::{debug, info};
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use std::os::fd::AsRawFd;

use super::executor::BridgeState;
use super::types::{CallResult, FCNTL_GETFL, FCNTL_SETFL};

impl BridgeState {
    pub(super) fn close_fd(&mut self, fd: GuestFd) -> CallResult {
        self.fds.close(fd)?;
        info!("Guest closed descriptor {}", fd);
        Ok(0)
    }

    pub(super) fn fcntl(&mut self, fd: GuestFd, cmd: i32, flags: i32) -> CallResult {
        let raw = self.fds.get(fd)?.as_raw_fd();

        match cmd {
            FCNTL_GETFL => {
                let host = OFlag::from_bits_truncate(fcntl(raw, FcntlArg::F_GETFL)?);
                let guest = open_flags_to_guest(host);
                debug!("F_GETFL on descriptor {}: host {:?} -> guest 0x{:x}", fd, host, guest);
                Ok(RetVal::from(guest))
            }
            FCNTL_SETFL => {
                let host = open_flags_from_guest(flags);
                let result = fcntl(raw, FcntlArg::F_SETFL(host))?;
                debug!("F_SETFL on descriptor {}: guest 0x{:x} -> host {:?}", fd, flags, host);
                Ok(RetVal::from(result))
            }
            other => {
                debug!("Unsupported fcntl command {} on descriptor {}", other, fd);
                Err(Errno::EINVAL.into())
            }
        }
    }
}

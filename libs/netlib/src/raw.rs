// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Raw socket implementation

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};
use std::io;
use std::mem::size_of;
use std::net::Ipv4Addr;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::time::Duration;

pub struct RawSocket {
    fd: OwnedFd,
}

impl RawSocket {
    /// Non-blocking `AF_INET` raw socket. Needs CAP_NET_RAW.
    pub fn new(protocol: i32) -> io::Result<Self> {
        let fd = unsafe {
            libc::socket(
                libc::AF_INET,
                libc::SOCK_RAW | libc::SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
                protocol,
            )
        };

        if fd < 0 {
            return Err(io::Error::last_os_error());
        }

        // SAFETY: fd was just returned by socket(2) and is owned by nobody else
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        Ok(Self { fd })
    }

    /// Wrap an already open datagram socket, for tests without CAP_NET_RAW.
    #[cfg(test)]
    pub(crate) fn from_fd(fd: OwnedFd) -> Self {
        Self { fd }
    }

    pub fn send_to(&self, buf: &[u8], dest: Ipv4Addr) -> io::Result<usize> {
        let sockaddr = libc::sockaddr_in {
            sin_family: libc::AF_INET as libc::sa_family_t,
            sin_port: 0,
            sin_addr: libc::in_addr {
                s_addr: u32::from_ne_bytes(dest.octets()),
            },
            sin_zero: [0; 8],
        };

        let sent = unsafe {
            libc::sendto(
                self.fd.as_raw_fd(),
                buf.as_ptr() as *const libc::c_void,
                buf.len(),
                0,
                &sockaddr as *const _ as *const libc::sockaddr,
                size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };

        if sent < 0 {
            return Err(io::Error::last_os_error());
        }

        Ok(sent as usize)
    }

    /// Next queued datagram, or `None` when nothing is waiting.
    pub fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, Ipv4Addr)>> {
        let mut sockaddr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
        let mut addr_len = size_of::<libc::sockaddr_in>() as libc::socklen_t;

        let recv_len = unsafe {
            libc::recvfrom(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
                libc::MSG_DONTWAIT,
                &mut sockaddr as *mut _ as *mut libc::sockaddr,
                &mut addr_len,
            )
        };

        if recv_len < 0 {
            let err = io::Error::last_os_error();
            return match err.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted => Ok(None),
                _ => Err(err),
            };
        }

        let from = Ipv4Addr::from(sockaddr.sin_addr.s_addr.to_ne_bytes());
        Ok(Some((recv_len as usize, from)))
    }

    /// Wait until a datagram can be read. `None` waits forever.
    pub fn wait_readable(&self, timeout: Option<Duration>) -> io::Result<bool> {
        let timeout_ms = match timeout {
            Some(duration) => duration.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
            None => -1,
        };

        let mut fds = [PollFd::new(&self.fd, PollFlags::POLLIN)];
        match poll(&mut fds, timeout_ms) {
            Ok(ready) => Ok(ready > 0),
            Err(Errno::EINTR) => Ok(false),
            Err(errno) => Err(io::Error::from(errno)),
        }
    }
}

impl AsFd for RawSocket {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

pub struct IcmpSocket {
    raw: RawSocket,
}

impl IcmpSocket {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            raw: RawSocket::new(libc::IPPROTO_ICMP)?,
        })
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: RawSocket) -> Self {
        Self { raw }
    }

    /// Sends an ICMP message; the kernel prepends the IPv4 header.
    pub fn send_to(&self, buf: &[u8], dest: Ipv4Addr) -> io::Result<usize> {
        self.raw.send_to(buf, dest)
    }

    /// Received datagrams start with the IPv4 header.
    pub fn try_recv_from(&self, buf: &mut [u8]) -> io::Result<Option<(usize, Ipv4Addr)>> {
        self.raw.try_recv_from(buf)
    }

    pub fn wait_readable(&self, timeout: Option<Duration>) -> io::Result<bool> {
        self.raw.wait_readable(timeout)
    }
}

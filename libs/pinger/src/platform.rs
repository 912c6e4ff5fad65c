// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Collaborators the engine runs on top of
//!
//! The engine owns no sockets, threads or clocks. Everything it needs
//! from the surrounding network stack goes through [`Platform`], and the
//! stack feeds events back through `Pinger::deliver_packet` and
//! `Pinger::deliver_timer`.

use crate::checksum::internet_checksum;
use crate::error::StackError;
use std::fmt;
use std::net::Ipv4Addr;

/// Link-layer (Ethernet) address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0; 6]
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Handle of a raw protocol interception point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Registration(u32);

impl Registration {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn id(&self) -> u32 {
        self.0
    }
}

/// The two one-shot timers every engine owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerSlot {
    /// Per-request reply window
    Timeout,
    /// Zero-delay timer used to run the receive callback outside the
    /// packet delivery path
    Dispatch,
}

/// What the engine did with a delivered packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvVerdict {
    /// The packet was ours; the stack must not hand it to anyone else.
    Consumed,
    /// Not ours. The buffer is returned untouched.
    PassThrough,
}

/// Owned packet memory with an adjustable start-of-payload offset.
///
/// Received packets start at the IPv4 header; protocol handlers move the
/// offset forward to reach their own header and back to undo it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PacketBuffer {
    data: Vec<u8>,
    offset: usize,
}

impl PacketBuffer {
    /// Zero-filled buffer of `len` bytes
    pub fn new(len: usize) -> Self {
        Self {
            data: vec![0; len],
            offset: 0,
        }
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data, offset: 0 }
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[self.offset..]
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.offset..]
    }

    /// Bytes from the current offset to the end
    pub fn len(&self) -> usize {
        self.data.len() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Hide `n` leading bytes. Fails without moving if fewer remain.
    pub fn advance(&mut self, n: usize) -> bool {
        if n > self.len() {
            return false;
        }
        self.offset += n;
        true
    }

    /// Reveal `n` previously hidden bytes.
    pub fn retreat(&mut self, n: usize) -> bool {
        if n > self.offset {
            return false;
        }
        self.offset -= n;
        true
    }
}

/// Services the hosting network stack provides to a ping engine.
///
/// All methods are called from the stack's own event context: either
/// from the start/stop calls of the application or from inside
/// `deliver_packet` / `deliver_timer`. Implementations never need to be
/// reentrant across threads.
pub trait Platform {
    /// Monotonic millisecond counter. Wraps; callers use wrapping math.
    fn now_ms(&self) -> u32;

    /// Hostname to IPv4 address.
    fn resolve(&mut self, host: &str) -> Option<Ipv4Addr>;

    /// Start intercepting packets of `protocol` for this engine.
    fn bind(&mut self, protocol: u8) -> Result<Registration, StackError>;

    fn unbind(&mut self, registration: Registration);

    /// Packet memory for an outbound message of `len` bytes.
    fn alloc(&mut self, len: usize) -> Option<PacketBuffer>;

    /// Hand a fully built message to the IP layer.
    fn send(
        &mut self,
        registration: Registration,
        packet: PacketBuffer,
        dest: Ipv4Addr,
    ) -> Result<(), StackError>;

    /// (Re)arm a one-shot timer; any pending expiry of `slot` is replaced.
    fn arm(&mut self, slot: TimerSlot, delay_ms: u32);

    fn disarm(&mut self, slot: TimerSlot);

    /// Link-layer address of a neighbour, if the stack knows it.
    fn lookup_mac(&mut self, _addr: Ipv4Addr) -> Option<MacAddress> {
        None
    }

    /// Internet checksum. Override when the hardware computes it.
    fn checksum(&self, data: &[u8]) -> u16 {
        internet_checksum(data)
    }
}

// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Single-threaded host event loop for ping engines
//!
//! `HostStack` plays the role of a small embedded network stack on top
//! of a Linux raw ICMP socket. Engines get a [`HostPlatform`] handle,
//! and every call to [`HostStack::turn`] fires due timers and then
//! offers received ICMP packets to the registered engines.

use crate::arp;
use crate::raw::IcmpSocket;
use crate::resolve::resolve_ipv4;
use crate::timers::TimerTable;
use log::{debug, trace, warn};
use pinger::{
    MacAddress, PacketBuffer, Pinger, Platform, RecvVerdict, Registration, StackError, TimerSlot,
    IPPROTO_ICMP,
};
use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;
use std::time::{Duration, Instant};

pub use crate::timers::EndpointId;

/// Largest IPv4 datagram
const RECV_BUFFER_SIZE: usize = 65535;

/// Upper bound on one socket wait, so callers get control back regularly
const MAX_WAIT: Duration = Duration::from_millis(100);

/// Largest ICMP message that fits behind a 20 byte IPv4 header
const MAX_MESSAGE_SIZE: usize = 65535 - 20;

struct StackState {
    origin: Instant,
    socket: Option<IcmpSocket>,
    timers: TimerTable,
    registrations: Vec<(Registration, EndpointId)>,
    next_registration: u32,
    next_endpoint: EndpointId,
}

impl StackState {
    fn elapsed_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn open_socket(&mut self) -> Result<(), StackError> {
        if self.socket.is_none() {
            let socket = IcmpSocket::new()?;
            debug!("opened raw icmp socket");
            self.socket = Some(socket);
        }
        Ok(())
    }
}

/// Owner of the raw socket, the clock and the timer table.
pub struct HostStack {
    state: Rc<RefCell<StackState>>,
}

impl HostStack {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(StackState {
                origin: Instant::now(),
                socket: None,
                timers: TimerTable::new(),
                registrations: Vec::new(),
                next_registration: 1,
                next_endpoint: 1,
            })),
        }
    }

    /// Platform handle for one more engine.
    pub fn platform(&self) -> HostPlatform {
        let mut state = self.state.borrow_mut();
        let endpoint = state.next_endpoint;
        state.next_endpoint += 1;

        HostPlatform {
            state: Rc::clone(&self.state),
            endpoint,
        }
    }

    /// One event loop iteration: run due timers, then wait (at most until
    /// the next deadline) for ICMP traffic and hand it out.
    pub fn turn(&self, pingers: &mut [&mut Pinger<HostPlatform>]) -> Result<(), StackError> {
        self.fire_due_timers(pingers);

        let wait = {
            let state = self.state.borrow();
            let now = state.elapsed_ms();
            state
                .timers
                .next_deadline()
                .map(|deadline| Duration::from_millis(deadline.saturating_sub(now)))
                .unwrap_or(MAX_WAIT)
                .min(MAX_WAIT)
        };

        let readable = {
            let state = self.state.borrow();
            match &state.socket {
                Some(socket) => socket.wait_readable(Some(wait))?,
                None => false,
            }
        };

        if !readable {
            if self.state.borrow().socket.is_none() && !wait.is_zero() {
                std::thread::sleep(wait);
            }
            return Ok(());
        }

        self.drain_socket(pingers)
    }

    /// Turn until no engine is busy and no timer is armed.
    pub fn run_until_idle(&self, pingers: &mut [&mut Pinger<HostPlatform>]) -> Result<(), StackError> {
        while pingers.iter().any(|pinger| pinger.is_busy()) || !self.state.borrow().timers.is_empty() {
            self.turn(pingers)?;
        }
        Ok(())
    }

    fn fire_due_timers(&self, pingers: &mut [&mut Pinger<HostPlatform>]) {
        loop {
            let due = {
                let mut state = self.state.borrow_mut();
                let now = state.elapsed_ms();
                state.timers.pop_due(now)
            };

            let (endpoint, slot) = match due {
                Some(due) => due,
                None => break,
            };

            match find_pinger(pingers, endpoint) {
                Some(pinger) => pinger.deliver_timer(slot),
                None => trace!("timer {:?} for unknown endpoint {}", slot, endpoint),
            }
        }
    }

    fn drain_socket(&self, pingers: &mut [&mut Pinger<HostPlatform>]) -> Result<(), StackError> {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];

        loop {
            let received = {
                let state = self.state.borrow();
                match &state.socket {
                    Some(socket) => socket.try_recv_from(&mut buf)?,
                    None => None,
                }
            };

            let (len, from) = match received {
                Some(received) => received,
                None => return Ok(()),
            };

            self.deliver(pingers, PacketBuffer::from_vec(buf[..len].to_vec()), from);
        }
    }

    /// Offer a packet to each registered engine in registration order
    /// until one of them consumes it.
    fn deliver(&self, pingers: &mut [&mut Pinger<HostPlatform>], mut packet: PacketBuffer, from: Ipv4Addr) {
        let endpoints: Vec<EndpointId> = self
            .state
            .borrow()
            .registrations
            .iter()
            .map(|(_, endpoint)| *endpoint)
            .collect();

        for endpoint in endpoints {
            if let Some(pinger) = find_pinger(pingers, endpoint) {
                if pinger.deliver_packet(&mut packet, from) == RecvVerdict::Consumed {
                    return;
                }
            }
        }

        trace!("unclaimed icmp packet from {} ({} bytes)", from, packet.len());
    }
}

impl Default for HostStack {
    fn default() -> Self {
        Self::new()
    }
}

fn find_pinger<'a>(
    pingers: &'a mut [&mut Pinger<HostPlatform>],
    endpoint: EndpointId,
) -> Option<&'a mut Pinger<HostPlatform>> {
    pingers
        .iter_mut()
        .find(|pinger| pinger.platform().endpoint() == endpoint)
        .map(|pinger| &mut **pinger)
}

/// Per-engine view of a [`HostStack`].
#[derive(Clone)]
pub struct HostPlatform {
    state: Rc<RefCell<StackState>>,
    endpoint: EndpointId,
}

impl HostPlatform {
    pub fn endpoint(&self) -> EndpointId {
        self.endpoint
    }
}

impl Platform for HostPlatform {
    fn now_ms(&self) -> u32 {
        self.state.borrow().elapsed_ms() as u32
    }

    fn resolve(&mut self, host: &str) -> Option<Ipv4Addr> {
        resolve_ipv4(host)
    }

    fn bind(&mut self, protocol: u8) -> Result<Registration, StackError> {
        if protocol != IPPROTO_ICMP {
            return Err(StackError::Unsupported("only ICMP can be intercepted"));
        }

        let mut state = self.state.borrow_mut();
        state.open_socket()?;

        let registration = Registration::new(state.next_registration);
        state.next_registration += 1;
        state.registrations.push((registration, self.endpoint));

        debug!("endpoint {} registered for icmp as {}", self.endpoint, registration.id());
        Ok(registration)
    }

    fn unbind(&mut self, registration: Registration) {
        let mut state = self.state.borrow_mut();
        state.registrations.retain(|(handle, _)| *handle != registration);

        if state.registrations.is_empty() && state.socket.take().is_some() {
            debug!("closed raw icmp socket");
        }
    }

    fn alloc(&mut self, len: usize) -> Option<PacketBuffer> {
        if len > MAX_MESSAGE_SIZE {
            return None;
        }
        Some(PacketBuffer::new(len))
    }

    fn send(
        &mut self,
        registration: Registration,
        packet: PacketBuffer,
        dest: Ipv4Addr,
    ) -> Result<(), StackError> {
        let state = self.state.borrow();

        if !state.registrations.iter().any(|(handle, _)| *handle == registration) {
            return Err(StackError::Unsupported("send on a released registration"));
        }

        let socket = state
            .socket
            .as_ref()
            .ok_or(StackError::Unsupported("raw socket is closed"))?;

        let sent = socket.send_to(packet.payload(), dest)?;
        if sent != packet.len() {
            warn!("short send to {}: {} of {} bytes", dest, sent, packet.len());
        }
        Ok(())
    }

    fn arm(&mut self, slot: TimerSlot, delay_ms: u32) {
        let mut state = self.state.borrow_mut();
        let deadline = state.elapsed_ms() + delay_ms as u64;
        state.timers.arm(self.endpoint, slot, deadline);
    }

    fn disarm(&mut self, slot: TimerSlot) {
        self.state.borrow_mut().timers.disarm(self.endpoint, slot);
    }

    fn lookup_mac(&mut self, addr: Ipv4Addr) -> Option<MacAddress> {
        arp::lookup(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::RawSocket;
    use pinger::checksum::internet_checksum;
    use pinger::codec::build_echo_request;
    use pinger::ICMP_ECHO_REPLY;
    use std::net::UdpSocket;
    use std::os::fd::OwnedFd;

    const TARGET: Ipv4Addr = Ipv4Addr::new(127, 0, 0, 1);

    /// Stack whose socket is a plain UDP socket, so engines can register
    /// without CAP_NET_RAW. Sends to it fail, which engines treat as lost
    /// requests.
    fn unprivileged_stack() -> HostStack {
        let udp = UdpSocket::bind("127.0.0.1:0").unwrap();
        let socket = IcmpSocket::from_raw(RawSocket::from_fd(OwnedFd::from(udp)));

        let stack = HostStack::new();
        stack.state.borrow_mut().socket = Some(socket);
        stack
    }

    /// IPv4 datagram carrying an echo reply to `id`/`seq`.
    fn echo_reply(id: u16, seq: u16) -> PacketBuffer {
        let mut message = build_echo_request(id, seq, 32);
        message[0] = ICMP_ECHO_REPLY;
        message[2..4].copy_from_slice(&[0, 0]);
        let cksum = internet_checksum(&message);
        message[2..4].copy_from_slice(&cksum.to_be_bytes());

        let mut datagram = vec![0u8; 20];
        datagram[0] = 0x45;
        datagram[8] = 64;
        datagram[9] = IPPROTO_ICMP;
        datagram[12..16].copy_from_slice(&TARGET.octets());
        datagram.extend_from_slice(&message);
        PacketBuffer::from_vec(datagram)
    }

    #[test]
    fn test_endpoints_are_distinct() {
        let stack = HostStack::new();
        let first = stack.platform();
        let second = stack.platform();
        assert_ne!(first.endpoint(), second.endpoint());
    }

    #[test]
    fn test_timers_are_per_endpoint() {
        let stack = HostStack::new();
        let mut first = stack.platform();
        let mut second = stack.platform();

        first.arm(TimerSlot::Timeout, 0);
        second.arm(TimerSlot::Timeout, 10_000);
        second.disarm(TimerSlot::Timeout);

        let state = stack.state.borrow();
        assert!(state.timers.is_armed(first.endpoint(), TimerSlot::Timeout));
        assert!(!state.timers.is_armed(second.endpoint(), TimerSlot::Timeout));
    }

    #[test]
    fn test_bind_rejects_other_protocols() {
        let mut platform = HostStack::new().platform();
        assert!(matches!(platform.bind(17), Err(StackError::Unsupported(_))));
    }

    #[test]
    fn test_alloc_limits() {
        let mut platform = HostStack::new().platform();
        assert_eq!(platform.alloc(40).map(|packet| packet.len()), Some(40));
        assert!(platform.alloc(MAX_MESSAGE_SIZE + 1).is_none());
    }

    #[test]
    fn test_deferred_dispatch_fires_on_turn() {
        let stack = HostStack::new();
        let mut pinger = Pinger::new(stack.platform());

        // Nothing is running, so a stray dispatch timer is simply consumed.
        pinger.platform_mut().arm(TimerSlot::Dispatch, 0);
        stack.turn(&mut [&mut pinger]).unwrap();
        assert!(stack.state.borrow().timers.is_empty());
    }

    #[test]
    fn test_run_until_idle_waits_for_timers() {
        let stack = HostStack::new();
        let mut pinger = Pinger::new(stack.platform());
        assert!(!pinger.is_busy());

        let started = Instant::now();
        pinger.platform_mut().arm(TimerSlot::Dispatch, 30);
        stack.run_until_idle(&mut [&mut pinger]).unwrap();

        assert!(stack.state.borrow().timers.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_packets_go_to_first_consumer_in_registration_order() {
        let stack = unprivileged_stack();
        let mut first = Pinger::new(stack.platform());
        let mut second = Pinger::new(stack.platform());
        let mut other = Pinger::new(stack.platform());
        first.set_packet_id(0x3333);
        second.set_packet_id(0x3333);
        other.set_packet_id(0x4444);

        second.ping(TARGET, 1, 60_000).unwrap();
        first.ping(TARGET, 1, 60_000).unwrap();
        other.ping(TARGET, 1, 60_000).unwrap();

        // `second` registered first, so it sees the shared reply first.
        let mut pingers = [&mut first, &mut second, &mut other];
        stack.deliver(&mut pingers, echo_reply(0x3333, 1), TARGET);
        assert!(!pingers[0].response().received_response);
        assert!(pingers[1].response().received_response);

        // A duplicate passes `second` and lands on the next registration.
        stack.deliver(&mut pingers, echo_reply(0x3333, 1), TARGET);
        assert!(pingers[0].response().received_response);

        stack.deliver(&mut pingers, echo_reply(0x5555, 1), TARGET);
        assert!(!pingers[2].response().received_response);

        stack.deliver(&mut pingers, echo_reply(0x4444, 1), TARGET);
        assert!(pingers[2].response().received_response);
    }
}

// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! In-memory platform for driving the engine by hand

#![allow(dead_code)]

use pinger::checksum::internet_checksum;
use pinger::{
    MacAddress, PacketBuffer, Platform, Registration, StackError, TimerSlot, ICMP_ECHO_REPLY,
    IPPROTO_ICMP,
};
use std::cell::RefCell;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::rc::Rc;

pub const TARGET: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 20);

#[derive(Debug, Default)]
pub struct MockState {
    pub now: u32,
    pub sent: Vec<(Registration, Vec<u8>, Ipv4Addr)>,
    pub armed: HashMap<TimerSlot, u32>,
    pub bound: Vec<Registration>,
    pub unbound: Vec<Registration>,
    pub fail_bind: bool,
    pub fail_alloc: bool,
    pub hosts: HashMap<String, Ipv4Addr>,
    pub arp: HashMap<Ipv4Addr, MacAddress>,
}

#[derive(Debug, Clone, Default)]
pub struct MockPlatform(pub Rc<RefCell<MockState>>);

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u32) {
        let mut state = self.0.borrow_mut();
        state.now = state.now.wrapping_add(ms);
    }

    pub fn sent_count(&self) -> usize {
        self.0.borrow().sent.len()
    }

    pub fn last_request(&self) -> Vec<u8> {
        self.0.borrow().sent.last().map(|(_, bytes, _)| bytes.clone()).unwrap()
    }

    pub fn sequence_of(request: &[u8]) -> u16 {
        u16::from_be_bytes([request[6], request[7]])
    }

    pub fn armed(&self, slot: TimerSlot) -> Option<u32> {
        self.0.borrow().armed.get(&slot).copied()
    }
}

impl Platform for MockPlatform {
    fn now_ms(&self) -> u32 {
        self.0.borrow().now
    }

    fn resolve(&mut self, host: &str) -> Option<Ipv4Addr> {
        self.0.borrow().hosts.get(host).copied()
    }

    fn bind(&mut self, protocol: u8) -> Result<Registration, StackError> {
        assert_eq!(protocol, IPPROTO_ICMP);
        let mut state = self.0.borrow_mut();
        if state.fail_bind {
            return Err(StackError::NoMemory);
        }
        let registration = Registration::new(state.bound.len() as u32 + 1);
        state.bound.push(registration);
        Ok(registration)
    }

    fn unbind(&mut self, registration: Registration) {
        self.0.borrow_mut().unbound.push(registration);
    }

    fn alloc(&mut self, len: usize) -> Option<PacketBuffer> {
        if self.0.borrow().fail_alloc {
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
        self.0
            .borrow_mut()
            .sent
            .push((registration, packet.payload().to_vec(), dest));
        Ok(())
    }

    fn arm(&mut self, slot: TimerSlot, delay_ms: u32) {
        self.0.borrow_mut().armed.insert(slot, delay_ms);
    }

    fn disarm(&mut self, slot: TimerSlot) {
        self.0.borrow_mut().armed.remove(&slot);
    }

    fn lookup_mac(&mut self, addr: Ipv4Addr) -> Option<MacAddress> {
        self.0.borrow().arp.get(&addr).copied()
    }
}

/// IPv4 packet carrying the echo reply a well-behaved host would send
/// back for `request`.
pub fn reply_to(request: &[u8], ttl: u8) -> PacketBuffer {
    let mut icmp = request.to_vec();
    icmp[0] = ICMP_ECHO_REPLY;
    icmp[2] = 0;
    icmp[3] = 0;
    let checksum = internet_checksum(&icmp);
    icmp[2..4].copy_from_slice(&checksum.to_be_bytes());

    ipv4_wrap(&icmp, ttl)
}

pub fn ipv4_wrap(icmp: &[u8], ttl: u8) -> PacketBuffer {
    let mut packet = vec![0u8; 20];
    packet[0] = 0x45;
    packet[2..4].copy_from_slice(&((20 + icmp.len()) as u16).to_be_bytes());
    packet[8] = ttl;
    packet[9] = IPPROTO_ICMP;
    packet[12..16].copy_from_slice(&TARGET.octets());
    packet[16..20].copy_from_slice(&[192, 168, 1, 2]);
    packet.extend_from_slice(icmp);

    PacketBuffer::from_vec(packet)
}

// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Ping sequencer
//!
//! One engine runs at most one sequence of echo requests at a time, with
//! exactly one request in flight. Every request gets the full timeout
//! window: a reply is recorded when it arrives, but the decision to send
//! the next request (or to end the sequence) is only taken when the
//! per-request timer fires.

use crate::codec::{echo_message_size, next_sequence, write_echo_request, EchoHeader, Ipv4Info};
use crate::config::PingerConfig;
use crate::dispatch;
use crate::error::PingError;
use crate::platform::{PacketBuffer, Platform, RecvVerdict, TimerSlot};
use crate::registration::ProtocolBinding;
use crate::response::PingerResponse;
use log::{debug, info, trace, warn};
use std::cell::Cell;
use std::net::Ipv4Addr;
use std::rc::Rc;

/// Echo identifier used unless [`Pinger::set_packet_id`] says otherwise
pub const DEFAULT_PACKET_ID: u16 = 0xDEAD;

/// 32 payload bytes make a 40 byte echo message.
pub const DEFAULT_PAYLOAD_LEN: u16 = 32;

/// Largest payload that still fits an IPv4 datagram
pub const MAX_PAYLOAD_LEN: u16 = 65507;

/// Called for every request, answered or not. Returning `false` ends the
/// sequence at the next timeout.
pub type ReceiveCallback = Box<dyn FnMut(&PingerResponse) -> bool>;

/// Called once when a sequence is over.
pub type EndCallback = Box<dyn FnMut(&PingerResponse)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    AwaitingReply,
}

/// Requests the end of the running sequence from outside the engine,
/// e.g. from inside a callback or a signal flag check.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Rc<Cell<bool>>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.set(true);
    }

    fn take(&self) -> bool {
        self.0.replace(false)
    }
}

/// Asynchronous ICMP echo engine.
pub struct Pinger<P: Platform> {
    platform: P,
    binding: ProtocolBinding,
    state: State,
    packet_id: u16,
    payload_len: u16,
    requests_remaining: u32,
    first_request_at: u32,
    request_at: u32,
    dispatch_pending: bool,
    stop_requested: StopHandle,
    response: PingerResponse,
    on_receive: Option<ReceiveCallback>,
    on_end: Option<EndCallback>,
    /// End callback to install once the running sequence has ended
    next_on_end: Option<Option<EndCallback>>,
}

impl<P: Platform> Pinger<P> {
    pub fn new(platform: P) -> Self {
        Self {
            platform,
            binding: ProtocolBinding::new(),
            state: State::Idle,
            packet_id: DEFAULT_PACKET_ID,
            payload_len: DEFAULT_PAYLOAD_LEN,
            requests_remaining: 0,
            first_request_at: 0,
            request_at: 0,
            dispatch_pending: false,
            stop_requested: StopHandle::default(),
            response: PingerResponse::new(),
            on_receive: None,
            on_end: None,
            next_on_end: None,
        }
    }

    pub fn with_config(platform: P, config: &PingerConfig) -> Self {
        let mut pinger = Self::new(platform);
        pinger.set_packet_id(config.packet_id);
        pinger.set_payload_len(config.payload_len);
        pinger
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    /// Set the callback run for every request of a sequence.
    pub fn on_receive<F>(&mut self, callback: F)
    where
        F: FnMut(&PingerResponse) -> bool + 'static,
    {
        self.on_receive = Some(Box::new(callback));
    }

    /// Set the callback run when a sequence ends.
    pub fn on_end<F>(&mut self, callback: F)
    where
        F: FnMut(&PingerResponse) + 'static,
    {
        self.on_end = Some(Box::new(callback));
        self.next_on_end = None;
    }

    pub(crate) fn replace_on_end(&mut self, callback: Option<EndCallback>) -> Option<EndCallback> {
        std::mem::replace(&mut self.on_end, callback)
    }

    /// Put `callback` back as the end callback, but only after the running
    /// sequence (if any) has ended with the current one.
    pub(crate) fn restore_on_end(&mut self, callback: Option<EndCallback>) {
        if self.is_busy() {
            self.next_on_end = Some(callback);
        } else {
            self.on_end = callback;
        }
    }

    /// Start `count` echo requests to `target`, waiting `timeout_ms` for
    /// each one.
    pub fn ping(&mut self, target: Ipv4Addr, count: u32, timeout_ms: u32) -> Result<(), PingError> {
        self.check_startable(count)?;

        if target.is_unspecified() {
            return Err(PingError::InvalidTarget(target));
        }

        self.binding
            .bind(&mut self.platform)
            .map_err(PingError::Registration)?;

        self.response.reset();
        self.response.dest_ip = target;
        self.response.echo_request_timeout = timeout_ms;

        self.requests_remaining = count;
        self.stop_requested.take();
        self.first_request_at = self.platform.now_ms();

        info!(
            "pinging {} with {} bytes of data, {} requests, {} ms timeout",
            target, self.payload_len, count, timeout_ms
        );

        self.send_next();
        Ok(())
    }

    /// Resolve `host` and ping the address it maps to.
    pub fn ping_host(&mut self, host: &str, count: u32, timeout_ms: u32) -> Result<(), PingError> {
        self.check_startable(count)?;

        let target = self
            .platform
            .resolve(host)
            .ok_or_else(|| PingError::Resolution(host.to_string()))?;
        debug!("resolved {} to {}", host, target);

        self.ping(target, count, timeout_ms)?;
        self.response.dest_hostname = Some(host.to_string());
        Ok(())
    }

    /// Ping with the count and timeout of `config`.
    pub fn ping_host_with(&mut self, host: &str, config: &PingerConfig) -> Result<(), PingError> {
        self.ping_host(host, config.count, config.timeout_ms)
    }

    fn check_startable(&self, count: u32) -> Result<(), PingError> {
        if count == 0 {
            return Err(PingError::ZeroCount);
        }
        if self.is_busy() {
            return Err(PingError::Busy);
        }
        Ok(())
    }

    /// Identifier stamped on outgoing requests. Engines sharing one stack
    /// need distinct identifiers to tell their replies apart.
    pub fn set_packet_id(&mut self, id: u16) {
        self.packet_id = id;
    }

    pub fn packet_id(&self) -> u16 {
        self.packet_id
    }

    pub fn set_payload_len(&mut self, len: u16) {
        self.payload_len = len.min(MAX_PAYLOAD_LEN);
    }

    pub fn payload_len(&self) -> u16 {
        self.payload_len
    }

    /// Ask the running sequence to end. Takes effect when the current
    /// request's timer fires; the end callback reports completion.
    pub fn stop(&mut self) {
        self.requests_remaining = 0;
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop_requested.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.state != State::Idle || self.requests_remaining > 0
    }

    pub fn requests_remaining(&self) -> u32 {
        self.requests_remaining
    }

    pub fn response(&self) -> &PingerResponse {
        &self.response
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_bound()
    }

    /// Drop the ICMP registration now instead of with the engine. The
    /// next `ping` binds again.
    pub fn release(&mut self) {
        self.binding.unbind(&mut self.platform);
    }

    /// Offer a received ICMP packet, starting at its IPv4 header.
    ///
    /// Only an echo reply answering the outstanding request is consumed.
    /// Anything else comes back as [`RecvVerdict::PassThrough`] with the
    /// buffer exactly as it was delivered.
    pub fn deliver_packet(&mut self, packet: &mut PacketBuffer, from: Ipv4Addr) -> RecvVerdict {
        if self.state != State::AwaitingReply || self.response.received_response {
            return RecvVerdict::PassThrough;
        }

        let ip = match Ipv4Info::parse(packet.payload()) {
            Some(ip) => ip,
            None => return RecvVerdict::PassThrough,
        };

        if !packet.advance(ip.header_len) {
            return RecvVerdict::PassThrough;
        }

        let answers = EchoHeader::parse(packet.payload())
            .map(|header| header.answers(self.packet_id, self.response.sequence_number))
            .unwrap_or(false);

        if !answers {
            packet.retreat(ip.header_len);
            trace!("ignoring icmp packet from {}", from);
            return RecvVerdict::PassThrough;
        }

        let rtt = self.platform.now_ms().wrapping_sub(self.request_at);
        let mac = self.platform.lookup_mac(from);
        self.response.record_reply(rtt, ip.ttl, mac);

        if self.requests_remaining == 0 {
            self.response.settle_average();
        }

        debug!(
            "reply from {}: icmp_seq={} ttl={} time={} ms",
            from, self.response.sequence_number, ip.ttl, rtt
        );

        if self.on_receive.is_some() {
            self.dispatch_pending = true;
            dispatch::defer_receive(&mut self.platform);
        }

        RecvVerdict::Consumed
    }

    /// Called by the platform when one of the engine's timers expires.
    pub fn deliver_timer(&mut self, slot: TimerSlot) {
        match slot {
            TimerSlot::Dispatch => self.run_dispatch(),
            TimerSlot::Timeout => self.request_timed_out(),
        }
    }

    fn run_dispatch(&mut self) {
        dispatch::cancel(&mut self.platform);

        if !std::mem::take(&mut self.dispatch_pending) {
            return;
        }

        if !self.notify_receive() {
            self.stop();
        }
    }

    /// Runs the receive callback; `true` means keep going.
    fn notify_receive(&mut self) -> bool {
        match self.on_receive.as_mut() {
            Some(callback) => callback(&self.response),
            None => true,
        }
    }

    fn request_timed_out(&mut self) {
        self.platform.disarm(TimerSlot::Timeout);

        if self.state != State::AwaitingReply {
            return;
        }

        // A reply that raced the timer still gets reported before the
        // record moves on to the next request.
        if self.dispatch_pending {
            self.run_dispatch();
        }

        if !self.response.received_response {
            debug!("request icmp_seq={} timed out", self.response.sequence_number);
            if !self.notify_receive() {
                self.stop();
            }
        }

        if self.stop_requested.take() {
            self.stop();
        }

        if self.requests_remaining > 0 {
            self.send_next();
        } else {
            self.finish();
        }
    }

    fn send_next(&mut self) {
        let seq = next_sequence(self.response.sequence_number);
        let size = echo_message_size(self.payload_len);

        self.response.sequence_number = seq;
        self.response.received_response = false;
        self.response.echo_message_size = size as u16;

        match self.platform.alloc(size) {
            Some(packet) if packet.len() == size => self.transmit(packet, seq),
            Some(packet) => warn!(
                "packet buffer of {} bytes instead of {}, skipping icmp_seq={}",
                packet.len(),
                size,
                seq
            ),
            None => warn!("no memory for echo request, skipping icmp_seq={}", seq),
        }

        self.request_at = self.platform.now_ms();
        self.response.total_sent_requests = self.response.total_sent_requests.saturating_add(1);
        self.requests_remaining = self.requests_remaining.saturating_sub(1);
        self.state = State::AwaitingReply;

        self.platform.disarm(TimerSlot::Timeout);
        self.platform
            .arm(TimerSlot::Timeout, self.response.echo_request_timeout);
    }

    fn transmit(&mut self, mut packet: PacketBuffer, seq: u16) {
        let platform = &self.platform;
        let written = write_echo_request(packet.payload_mut(), self.packet_id, seq, |message| {
            platform.checksum(message)
        });
        if !written {
            warn!("packet buffer too small for icmp_seq={}", seq);
            return;
        }

        let registration = match self.binding.handle() {
            Some(registration) => registration,
            None => {
                warn!("icmp registration released, skipping icmp_seq={}", seq);
                return;
            }
        };

        match self.platform.send(registration, packet, self.response.dest_ip) {
            Ok(()) => debug!(
                "sent echo request to {} icmp_seq={} id={:#06x}",
                self.response.dest_ip, seq, self.packet_id
            ),
            Err(e) => warn!("failed to send icmp_seq={}: {}", seq, e),
        }
    }

    fn finish(&mut self) {
        dispatch::cancel(&mut self.platform);
        self.dispatch_pending = false;
        self.requests_remaining = 0;
        self.state = State::Idle;

        let elapsed = self.platform.now_ms().wrapping_sub(self.first_request_at);
        self.response.finish(elapsed);

        info!(
            "{} requests sent, {} replies received, {} ms",
            self.response.total_sent_requests, self.response.total_received_responses, elapsed
        );

        if let Some(callback) = self.on_end.as_mut() {
            callback(&self.response);
        }
        if let Some(callback) = self.next_on_end.take() {
            self.on_end = callback;
        }
    }
}

impl<P: Platform> Drop for Pinger<P> {
    fn drop(&mut self) {
        self.platform.disarm(TimerSlot::Timeout);
        self.platform.disarm(TimerSlot::Dispatch);
        self.binding.unbind(&mut self.platform);
    }
}

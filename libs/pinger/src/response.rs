// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Ping sequence statistics

use crate::platform::MacAddress;
use std::net::Ipv4Addr;

/// State of the running (or last finished) ping sequence.
///
/// `min_response_time`, `max_response_time` and `avg_response_time` only
/// mean something once `total_received_responses > 0`; a finished
/// sequence without replies reports all three as zero. The average is
/// filled in when the last request has been answered or the sequence
/// ends, never in between.
#[derive(Debug, Clone, PartialEq)]
pub struct PingerResponse {
    /// Round trip of the latest reply, in ms
    pub response_time: u32,
    pub max_response_time: u32,
    pub min_response_time: u32,
    pub avg_response_time: f32,
    pub dest_ip: Ipv4Addr,
    /// Link-layer address of the host that sent the latest reply
    pub dest_mac: Option<MacAddress>,
    pub dest_hostname: Option<String>,
    /// Echo header plus payload, in bytes
    pub echo_message_size: u16,
    /// Sequence number of the outstanding request
    pub sequence_number: u16,
    /// Whether the outstanding request has been answered
    pub received_response: bool,
    pub time_to_live: u8,
    pub total_sent_requests: u32,
    pub total_received_responses: u32,
    /// Wall time from the first request to the end of the sequence, in ms
    pub total_pinging_time: u32,
    pub echo_request_timeout: u32,
    response_time_sum: u64,
}

impl PingerResponse {
    pub fn new() -> Self {
        Self {
            response_time: 0,
            max_response_time: 0,
            min_response_time: u32::MAX,
            avg_response_time: 0.0,
            dest_ip: Ipv4Addr::UNSPECIFIED,
            dest_mac: None,
            dest_hostname: None,
            echo_message_size: 0,
            sequence_number: 0,
            received_response: false,
            time_to_live: 0,
            total_sent_requests: 0,
            total_received_responses: 0,
            total_pinging_time: 0,
            echo_request_timeout: 0,
            response_time_sum: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Account for one accepted reply.
    pub(crate) fn record_reply(&mut self, rtt_ms: u32, ttl: u8, mac: Option<MacAddress>) {
        self.received_response = true;
        self.total_received_responses = self.total_received_responses.saturating_add(1);
        self.time_to_live = ttl;
        self.dest_mac = mac;
        self.response_time = rtt_ms;
        self.max_response_time = self.max_response_time.max(rtt_ms);
        self.min_response_time = self.min_response_time.min(rtt_ms);
        self.response_time_sum = self.response_time_sum.saturating_add(rtt_ms as u64);
    }

    /// Average over the replies received so far.
    pub(crate) fn settle_average(&mut self) {
        if self.total_received_responses > 0 {
            self.avg_response_time =
                (self.response_time_sum as f64 / self.total_received_responses as f64) as f32;
        }
    }

    /// Final bookkeeping once no request is left.
    pub(crate) fn finish(&mut self, elapsed_ms: u32) {
        self.total_pinging_time = elapsed_ms;

        if self.total_received_responses == 0 {
            self.avg_response_time = 0.0;
            self.min_response_time = 0;
            self.max_response_time = 0;
        } else {
            self.settle_average();
        }
    }

    pub fn lost_requests(&self) -> u32 {
        self.total_sent_requests
            .saturating_sub(self.total_received_responses)
    }

    pub fn loss_percent(&self) -> f64 {
        if self.total_sent_requests == 0 {
            return 0.0;
        }
        (self.lost_requests() as f64 / self.total_sent_requests as f64) * 100.0
    }
}

impl Default for PingerResponse {
    fn default() -> Self {
        Self::new()
    }
}

// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! pinger - Asynchronous ICMP echo engine
//!
//! A callback-driven ping engine for network stacks that expose raw
//! protocol interception and one-shot timers instead of threads. The
//! engine never blocks: it sends one echo request, arms a timer and
//! waits for the platform to deliver either the matching reply or the
//! timer expiry.

pub mod checksum;
pub mod codec;
pub mod config;
pub mod error;
pub mod legacy;
pub mod platform;
pub mod response;

mod dispatch;
mod registration;
mod sequencer;

pub use codec::{ECHO_HEADER_SIZE, ICMP_ECHO_REPLY, ICMP_ECHO_REQUEST, IPPROTO_ICMP};
pub use config::PingerConfig;
pub use error::{PingError, StackError};
pub use platform::{MacAddress, PacketBuffer, Platform, RecvVerdict, Registration, TimerSlot};
pub use response::PingerResponse;
pub use sequencer::{
    EndCallback, Pinger, ReceiveCallback, StopHandle, DEFAULT_PACKET_ID, DEFAULT_PAYLOAD_LEN,
    MAX_PAYLOAD_LEN,
};

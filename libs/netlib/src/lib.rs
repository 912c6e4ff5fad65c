// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! netlib - Networking Library for Rustica
//!
//! Host side of the ping engine: raw ICMP socket, timers, name and
//! neighbour lookups, and the event loop that drives `pinger` engines.

pub mod arp;
pub mod raw;
pub mod resolve;
pub mod stack;
pub mod timers;

pub use raw::{IcmpSocket, RawSocket};
pub use stack::{EndpointId, HostPlatform, HostStack};

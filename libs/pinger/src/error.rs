// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Error types

use std::net::Ipv4Addr;
use thiserror::Error;

/// Reasons a ping sequence could not be started.
#[derive(Debug, Error)]
pub enum PingError {
    #[error("request count must be greater than zero")]
    ZeroCount,

    #[error("a ping sequence is already running")]
    Busy,

    #[error("invalid target address {0}")]
    InvalidTarget(Ipv4Addr),

    #[error("unable to resolve host {0}")]
    Resolution(String),

    #[error("unable to register for ICMP traffic")]
    Registration(#[source] StackError),

    #[error("network stack failure")]
    Stack(#[from] StackError),
}

/// Failures reported by the underlying network stack.
#[derive(Debug, Error)]
pub enum StackError {
    #[error("out of memory")]
    NoMemory,

    #[error("network I/O error")]
    Io(#[from] std::io::Error),

    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Binding to the stack's raw ICMP interception point

use crate::codec::IPPROTO_ICMP;
use crate::error::StackError;
use crate::platform::{Platform, Registration};
use log::{debug, warn};

/// Lazily created, long-lived ICMP registration.
#[derive(Debug, Default)]
pub(crate) struct ProtocolBinding {
    handle: Option<Registration>,
}

impl ProtocolBinding {
    pub(crate) fn new() -> Self {
        Self { handle: None }
    }

    pub(crate) fn handle(&self) -> Option<Registration> {
        self.handle
    }

    pub(crate) fn is_bound(&self) -> bool {
        self.handle.is_some()
    }

    /// No-op when already bound.
    pub(crate) fn bind<P: Platform>(&mut self, platform: &mut P) -> Result<Registration, StackError> {
        if let Some(handle) = self.handle {
            return Ok(handle);
        }

        let handle = platform.bind(IPPROTO_ICMP).map_err(|e| {
            warn!("icmp registration failed: {}", e);
            e
        })?;
        debug!("bound icmp registration {}", handle.id());

        self.handle = Some(handle);
        Ok(handle)
    }

    /// Safe to call when never bound.
    pub(crate) fn unbind<P: Platform>(&mut self, platform: &mut P) {
        if let Some(handle) = self.handle.take() {
            debug!("releasing icmp registration {}", handle.id());
            platform.unbind(handle);
        }
    }
}

// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Deferred user callback invocation
//!
//! Replies are accepted inside the stack's packet delivery path. The
//! receive callback is never run there; instead the zero-delay dispatch
//! timer is armed and the callback runs when that timer fires.

use crate::platform::{Platform, TimerSlot};

/// Delay used for the dispatch timer
const DISPATCH_DELAY_MS: u32 = 0;

/// Queue the receive callback for the next turn of the event loop.
pub(crate) fn defer_receive<P: Platform>(platform: &mut P) {
    platform.disarm(TimerSlot::Dispatch);
    platform.arm(TimerSlot::Dispatch, DISPATCH_DELAY_MS);
}

pub(crate) fn cancel<P: Platform>(platform: &mut P) {
    platform.disarm(TimerSlot::Dispatch);
}

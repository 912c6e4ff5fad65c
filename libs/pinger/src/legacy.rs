// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Blocking single-request ping on top of the asynchronous engine

use crate::error::{PingError, StackError};
use crate::platform::Platform;
use crate::response::PingerResponse;
use crate::sequencer::Pinger;
use log::debug;
use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::rc::Rc;

/// Send one echo request and drive `pump` until the sequence is over.
///
/// `pump` runs one turn of the caller's event loop (deliver packets,
/// fire timers). The engine's own end callback is swapped out while the
/// request is in flight. If `pump` fails, the request is abandoned: the
/// engine stays busy until its timeout, and the previous end callback
/// only comes back once that has happened.
pub fn ping_once<P, F>(
    pinger: &mut Pinger<P>,
    target: Ipv4Addr,
    timeout_ms: u32,
    mut pump: F,
) -> Result<PingerResponse, PingError>
where
    P: Platform,
    F: FnMut(&mut Pinger<P>) -> Result<(), StackError>,
{
    pinger.ping(target, 1, timeout_ms)?;

    let done: Rc<RefCell<Option<PingerResponse>>> = Rc::new(RefCell::new(None));
    let signal = Rc::clone(&done);
    let previous = pinger.replace_on_end(Some(Box::new(move |response: &PingerResponse| {
        *signal.borrow_mut() = Some(response.clone());
    })));

    let result = wait_for_end(pinger, &done, &mut pump);
    if let Err(e) = &result {
        debug!("abandoning single echo request to {}: {}", target, e);
        pinger.stop();
    }
    pinger.restore_on_end(previous);

    result.map_err(PingError::from)
}

fn wait_for_end<P, F>(
    pinger: &mut Pinger<P>,
    done: &RefCell<Option<PingerResponse>>,
    pump: &mut F,
) -> Result<PingerResponse, StackError>
where
    P: Platform,
    F: FnMut(&mut Pinger<P>) -> Result<(), StackError>,
{
    loop {
        if let Some(response) = done.borrow_mut().take() {
            return Ok(response);
        }
        pump(pinger)?;
    }
}

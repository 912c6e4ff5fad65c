// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Neighbour (ARP) table lookups

use pinger::MacAddress;
use std::net::Ipv4Addr;

pub const ARP_TABLE_PATH: &str = "/proc/net/arp";

/// MAC address the kernel has cached for `addr`.
pub fn lookup(addr: Ipv4Addr) -> Option<MacAddress> {
    let content = std::fs::read_to_string(ARP_TABLE_PATH).ok()?;
    find_in_table(&content, addr)
}

/// Scans the text form of the kernel ARP table:
///
/// ```text
/// IP address       HW type     Flags       HW address            Mask     Device
/// 192.168.1.1      0x1         0x2         00:11:22:33:44:55     *        eth0
/// ```
///
/// Incomplete entries carry an all-zero address and are skipped.
pub fn find_in_table(content: &str, addr: Ipv4Addr) -> Option<MacAddress> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let ip: Ipv4Addr = fields.next()?.parse().ok()?;
            let hw = fields.nth(2)?;
            Some((ip, hw))
        })
        .find(|(ip, _)| *ip == addr)
        .and_then(|(_, hw)| parse_mac(hw))
        .filter(|mac| !mac.is_zero())
}

pub fn parse_mac(text: &str) -> Option<MacAddress> {
    let mut bytes = [0u8; 6];
    let mut parts = text.split(':');

    for byte in bytes.iter_mut() {
        *byte = u8::from_str_radix(parts.next()?, 16).ok()?;
    }

    if parts.next().is_some() {
        return None;
    }

    Some(MacAddress::new(bytes))
}

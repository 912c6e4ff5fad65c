// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ICMP echo packet codec

use crate::checksum::internet_checksum;

/// IP protocol number of ICMP
pub const IPPROTO_ICMP: u8 = 1;

pub const ICMP_ECHO_REQUEST: u8 = 8;
pub const ICMP_ECHO_REPLY: u8 = 0;

/// type + code + checksum + identifier + sequence
pub const ECHO_HEADER_SIZE: usize = 8;

/// IPv4 header without options
pub const IPV4_MIN_HEADER_SIZE: usize = 20;

/// Sequence numbers never reach this value; they restart at 0.
pub const SEQUENCE_LIMIT: u16 = 0x7FFF;

const FILL_FIRST: u8 = b'a';
const FILL_LAST: u8 = b'w';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoHeader {
    pub icmp_type: u8,
    pub icmp_code: u8,
    pub icmp_cksum: u16,
    pub icmp_id: u16,
    pub icmp_seq: u16,
}

impl EchoHeader {
    pub fn echo_request(id: u16, seq: u16) -> Self {
        Self {
            icmp_type: ICMP_ECHO_REQUEST,
            icmp_code: 0,
            icmp_cksum: 0,
            icmp_id: id,
            icmp_seq: seq,
        }
    }

    /// Reads the first 8 bytes of an ICMP message. Multi-byte fields are
    /// in network byte order on the wire.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < ECHO_HEADER_SIZE {
            return None;
        }

        Some(Self {
            icmp_type: data[0],
            icmp_code: data[1],
            icmp_cksum: u16::from_be_bytes([data[2], data[3]]),
            icmp_id: u16::from_be_bytes([data[4], data[5]]),
            icmp_seq: u16::from_be_bytes([data[6], data[7]]),
        })
    }

    /// Writes the header into the first 8 bytes of `buf`. Returns false,
    /// leaving `buf` untouched, when it is shorter than that.
    pub fn write(&self, buf: &mut [u8]) -> bool {
        if buf.len() < ECHO_HEADER_SIZE {
            return false;
        }

        buf[0] = self.icmp_type;
        buf[1] = self.icmp_code;
        buf[2..4].copy_from_slice(&self.icmp_cksum.to_be_bytes());
        buf[4..6].copy_from_slice(&self.icmp_id.to_be_bytes());
        buf[6..8].copy_from_slice(&self.icmp_seq.to_be_bytes());
        true
    }

    /// Identifier, sequence and type all match the outstanding request.
    pub fn answers(&self, id: u16, seq: u16) -> bool {
        self.icmp_id == id && self.icmp_seq == seq && self.icmp_type == ICMP_ECHO_REPLY
    }
}

/// Fields the engine needs from the IPv4 header of a received packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Info {
    pub header_len: usize,
    pub ttl: u8,
}

impl Ipv4Info {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < IPV4_MIN_HEADER_SIZE || data[0] >> 4 != 4 {
            return None;
        }

        let header_len = (data[0] & 0x0F) as usize * 4;
        if header_len < IPV4_MIN_HEADER_SIZE || data.len() < header_len {
            return None;
        }

        Some(Self {
            header_len,
            ttl: data[8],
        })
    }
}

/// Header plus payload size of an echo message
pub fn echo_message_size(payload_len: u16) -> usize {
    ECHO_HEADER_SIZE + payload_len as usize
}

/// Sequence number that follows `seq`.
pub fn next_sequence(seq: u16) -> u16 {
    match seq.wrapping_add(1) {
        SEQUENCE_LIMIT => 0,
        next => next,
    }
}

/// Fills `payload` with 'a'..='w' repeated.
pub fn fill_payload(payload: &mut [u8]) {
    let mut byte = FILL_FIRST;
    for slot in payload.iter_mut() {
        *slot = byte;
        byte = if byte == FILL_LAST { FILL_FIRST } else { byte + 1 };
    }
}

/// Writes a complete echo request into `message`, whose length is the
/// echo message size. The checksum is computed with `checksum` over the
/// whole message after header and payload are in place. Returns false
/// when `message` cannot hold the echo header.
pub fn write_echo_request<F>(message: &mut [u8], id: u16, seq: u16, checksum: F) -> bool
where
    F: Fn(&[u8]) -> u16,
{
    let mut header = EchoHeader::echo_request(id, seq);
    if !header.write(message) {
        return false;
    }
    fill_payload(&mut message[ECHO_HEADER_SIZE..]);

    header.icmp_cksum = checksum(message);
    message[2..4].copy_from_slice(&header.icmp_cksum.to_be_bytes());
    true
}

/// Convenience form of [`write_echo_request`] with the software checksum.
pub fn build_echo_request(id: u16, seq: u16, payload_len: u16) -> Vec<u8> {
    let mut message = vec![0; echo_message_size(payload_len)];
    write_echo_request(&mut message, id, seq, internet_checksum);
    message
}

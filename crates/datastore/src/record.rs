//! On-page record layout: `[Valid:1][Size:2][Payload:Size]`.

use storage::data_page::MAX_FREE_SPACE;

pub const VALID: u8 = 0x06;
pub const INVALID: u8 = 0x00;
pub const HEADER_LEN: usize = 3;

/// Largest payload that still fits on an empty data page.
pub const MAX_PAYLOAD: usize = MAX_FREE_SPACE - HEADER_LEN;

/// Builds the on-page bytes for a live record.
pub fn wrap(payload: &[u8]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(HEADER_LEN + payload.len());
    raw.push(VALID);
    raw.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    raw.extend_from_slice(payload);
    raw
}

/// Payload size declared by a record header.
pub fn declared_size(header: &[u8]) -> usize {
    u16::from_be_bytes([header[1], header[2]]) as usize
}

/// Turns a record image into a tombstone.
pub fn invalidate(raw: &mut [u8]) {
    raw[0] = INVALID;
}

//! Meta page (page 1) layout.
//!
//! Two 8-byte markers detect an unclean shutdown: a random value is written
//! at offset 100 every time the store opens and copied to offset 108 on a
//! clean close. If they differ on the next open, recovery must run.

use crate::{PAGE_SIZE, Page};

pub const META_PAGE: common::PageNo = 1;

const OPEN_MARKER: usize = 100;
const MARKER_LEN: usize = 8;
const CLOSE_MARKER: usize = OPEN_MARKER + MARKER_LEN;

/// Fresh contents for page 1 of a new file, with an open marker already set.
pub fn initial() -> Vec<u8> {
    let mut buf = vec![0u8; PAGE_SIZE];
    let marker: [u8; MARKER_LEN] = rand::random();
    buf[OPEN_MARKER..CLOSE_MARKER].copy_from_slice(&marker);
    buf
}

/// Writes a new random open marker.
pub fn stamp_open(page: &Page) {
    let marker: [u8; MARKER_LEN] = rand::random();
    page.write_at(OPEN_MARKER, &marker);
}

/// Copies the open marker over the close marker.
pub fn stamp_close(page: &Page) {
    let mut buf = page.bytes();
    buf.copy_within(OPEN_MARKER..CLOSE_MARKER, CLOSE_MARKER);
    drop(buf);
    page.set_dirty(true);
}

/// True when the last session closed cleanly.
pub fn is_clean(page: &Page) -> bool {
    let buf = page.bytes();
    buf[OPEN_MARKER..CLOSE_MARKER] == buf[CLOSE_MARKER..CLOSE_MARKER + MARKER_LEN]
}

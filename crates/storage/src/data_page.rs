//! Data page layout: `[FreeSpaceOffset:2][records...][free]`.
//!
//! Records are appended at the free-space offset and never move, so a
//! record's position is stable for the lifetime of the file.

use crate::{PAGE_SIZE, Page};
use common::{DbError, DbResult};

pub const HEADER_LEN: usize = 2;
/// Free bytes on an empty data page.
pub const MAX_FREE_SPACE: usize = PAGE_SIZE - HEADER_LEN;

/// Fresh contents for a newly allocated data page.
pub fn initial() -> Vec<u8> {
    let mut buf = vec![0u8; PAGE_SIZE];
    write_free_offset(&mut buf, HEADER_LEN as u16);
    buf
}

fn read_free_offset(buf: &[u8]) -> u16 {
    u16::from_be_bytes([buf[0], buf[1]])
}

fn write_free_offset(buf: &mut [u8], offset: u16) {
    buf[..HEADER_LEN].copy_from_slice(&offset.to_be_bytes());
}

pub fn free_offset(page: &Page) -> u16 {
    read_free_offset(&page.bytes())
}

pub fn free_space(page: &Page) -> usize {
    PAGE_SIZE - free_offset(page) as usize
}

/// Appends `raw` at the free-space offset and returns where it landed.
pub fn append(page: &Page, raw: &[u8]) -> DbResult<u16> {
    let mut buf = page.bytes();
    let offset = read_free_offset(&buf);
    let end = offset as usize + raw.len();
    if end > PAGE_SIZE {
        return Err(DbError::Storage(format!(
            "page {} has {} free bytes, record needs {}",
            page.number(),
            PAGE_SIZE - offset as usize,
            raw.len()
        )));
    }
    buf[offset as usize..end].copy_from_slice(raw);
    write_free_offset(&mut buf, end as u16);
    drop(buf);
    page.set_dirty(true);
    Ok(offset)
}

fn check_bounds(page: &Page, offset: u16, len: usize) -> DbResult<usize> {
    let end = offset as usize + len;
    if (offset as usize) < HEADER_LEN || end > PAGE_SIZE {
        return Err(DbError::Corruption(format!(
            "log entry addresses bytes {offset}..{end} outside data page {}",
            page.number()
        )));
    }
    Ok(end)
}

/// Replays an insert: writes `raw` at `offset` and moves the free-space
/// offset past it if it was not already.
pub fn recover_insert(page: &Page, offset: u16, raw: &[u8]) -> DbResult<()> {
    let end = check_bounds(page, offset, raw.len())?;
    let mut buf = page.bytes();
    buf[offset as usize..end].copy_from_slice(raw);
    if (read_free_offset(&buf) as usize) < end {
        write_free_offset(&mut buf, end as u16);
    }
    drop(buf);
    page.set_dirty(true);
    Ok(())
}

/// Replays an update: overwrites the bytes at `offset`.
pub fn recover_update(page: &Page, offset: u16, raw: &[u8]) -> DbResult<()> {
    check_bounds(page, offset, raw.len())?;
    page.write_at(offset as usize, raw);
    Ok(())
}

//! Fixed-size pages and the in-page layouts built on top of them.
//!
//! A page file is a sequence of 8 KiB pages numbered from 1:
//! - page 1 is the meta page carrying the clean-shutdown markers ([`meta`])
//! - pages 2.. are data pages: a 2-byte free-space offset followed by packed
//!   records ([`data_page`])
//!
//! [`FreeSpaceIndex`] tracks how much room each data page has left so inserts
//! can find a page without scanning the file.

#[cfg(test)]
mod tests;

pub mod data_page;
mod free_space;
pub mod meta;

pub use free_space::{FreeSpaceIndex, PageInfo};

use common::PageNo;
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};

pub const PAGE_SIZE: usize = 8192;

/// Byte offset of page `number` inside the page file.
pub fn page_offset(number: PageNo) -> u64 {
    (number as u64 - 1) * PAGE_SIZE as u64
}

/// One cached page. The buffer is shared by every holder of the page; the
/// dirty flag tells the cache whether eviction must write it back.
#[derive(Debug)]
pub struct Page {
    number: PageNo,
    data: Mutex<Vec<u8>>,
    dirty: AtomicBool,
}

impl Page {
    pub fn new(number: PageNo, data: Vec<u8>) -> Self {
        debug_assert_eq!(data.len(), PAGE_SIZE);
        Self {
            number,
            data: Mutex::new(data),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn number(&self) -> PageNo {
        self.number
    }

    /// Locks the page buffer. Hold the guard only for the copy in or out.
    pub fn bytes(&self) -> MutexGuard<'_, Vec<u8>> {
        self.data.lock()
    }

    /// Copies `len` bytes starting at `offset`.
    pub fn read_at(&self, offset: usize, len: usize) -> Vec<u8> {
        self.data.lock()[offset..offset + len].to_vec()
    }

    /// Overwrites bytes starting at `offset` and marks the page dirty.
    pub fn write_at(&self, offset: usize, bytes: &[u8]) {
        self.data.lock()[offset..offset + bytes.len()].copy_from_slice(bytes);
        self.set_dirty(true);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::Release);
    }
}

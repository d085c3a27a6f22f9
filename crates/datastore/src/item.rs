use crate::record::{self, HEADER_LEN};
use common::{DbResult, Uid, Xid, uid_page};
use parking_lot::{RwLock, RwLockWriteGuard};
use std::sync::Arc;
use storage::Page;
use wal::{LogEntry, Wal};

/// A record pinned in memory: a byte range of a cached page plus the lock
/// that serializes writers of that range.
#[derive(Debug)]
pub struct DataItem {
    uid: Uid,
    page: Arc<Page>,
    offset: usize,
    len: usize,
    lock: RwLock<()>,
    wal: Arc<Wal>,
}

impl DataItem {
    pub(crate) fn new(uid: Uid, page: Arc<Page>, offset: usize, len: usize, wal: Arc<Wal>) -> Self {
        Self {
            uid,
            page,
            offset,
            len,
            lock: RwLock::new(()),
            wal,
        }
    }

    pub fn uid(&self) -> Uid {
        self.uid
    }

    pub(crate) fn page(&self) -> &Page {
        &self.page
    }

    pub fn is_valid(&self) -> bool {
        self.page.read_at(self.offset, 1)[0] == record::VALID
    }

    /// Copy of the payload, taken under the item's read lock.
    pub fn data(&self) -> Vec<u8> {
        let _read = self.lock.read();
        self.page
            .read_at(self.offset + HEADER_LEN, self.len - HEADER_LEN)
    }

    /// Payload length in bytes.
    pub fn size(&self) -> usize {
        self.len - HEADER_LEN
    }

    /// Starts an in-place change: takes the write lock, marks the page dirty
    /// and keeps the current bytes so the change can be logged or undone.
    pub fn before_modify(&self) -> ModifyGuard<'_> {
        let write = self.lock.write();
        self.page.set_dirty(true);
        let old = self.page.read_at(self.offset, self.len);
        ModifyGuard {
            item: self,
            _write: write,
            old,
            finished: false,
        }
    }
}

/// Exclusive access to a [`DataItem`] between `before_modify` and either
/// [`after_modify`](Self::after_modify) or [`rollback`](Self::rollback).
///
/// Dropping an unfinished guard rolls the change back.
pub struct ModifyGuard<'a> {
    item: &'a DataItem,
    _write: RwLockWriteGuard<'a, ()>,
    old: Vec<u8>,
    finished: bool,
}

impl ModifyGuard<'_> {
    /// Current payload, including changes made through this guard.
    pub fn data(&self) -> Vec<u8> {
        let item = self.item;
        item.page
            .read_at(item.offset + HEADER_LEN, item.len - HEADER_LEN)
    }

    /// Overwrites payload bytes starting at `at`.
    ///
    /// # Panics
    ///
    /// Panics if the write runs past the end of the payload.
    pub fn write(&mut self, at: usize, bytes: &[u8]) {
        let item = self.item;
        assert!(
            at + bytes.len() <= item.len - HEADER_LEN,
            "write of {} bytes at {at} overruns a {}-byte payload",
            bytes.len(),
            item.len - HEADER_LEN
        );
        item.page.write_at(item.offset + HEADER_LEN + at, bytes);
    }

    /// Logs the old and new images under `xid` and releases the write lock.
    /// If the log append fails the change is rolled back.
    pub fn after_modify(mut self, xid: Xid) -> DbResult<()> {
        let item = self.item;
        let new = item.page.read_at(item.offset, item.len);
        let entry = LogEntry::Update {
            xid,
            page: uid_page(item.uid),
            offset: item.offset as u16,
            old: self.old.clone(),
            new,
        };
        let logged = item.wal.append(&entry.encode());
        if logged.is_ok() {
            self.finished = true;
        }
        logged
    }

    /// Restores the old image and releases the write lock.
    pub fn rollback(mut self) {
        self.restore();
    }

    fn restore(&mut self) {
        if !self.finished {
            self.item.page.write_at(self.item.offset, &self.old);
            self.finished = true;
        }
    }
}

impl Drop for ModifyGuard<'_> {
    fn drop(&mut self) {
        self.restore();
    }
}

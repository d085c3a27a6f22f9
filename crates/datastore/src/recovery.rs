//! Startup recovery from the write-ahead log.
//!
//! Runs before the store accepts any work when the meta page shows the last
//! session did not close cleanly:
//! 1. cut the page file down to the highest page the log mentions
//! 2. redo entries of finished transactions in log order
//! 3. undo entries of transactions still marked active, newest first, then
//!    mark those transactions aborted
//!
//! Entries of aborted transactions are replayed in their rolled-back form:
//! inserts land as tombstones (keeping their space reserved) and updates are
//! skipped. Running recovery again over its own output therefore changes
//! nothing.

use crate::record;
use buffer::PageCache;
use common::{DbResult, PageNo, Xid};
use std::collections::BTreeMap;
use storage::data_page;
use txn::{TransactionStatusStore, XidStatus};
use wal::{LogEntry, Wal};

/// What a recovery pass did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    pub max_page: PageNo,
    pub redone: usize,
    pub undone: usize,
    pub aborted: Vec<Xid>,
}

fn read_entries(wal: &Wal) -> DbResult<Vec<LogEntry>> {
    wal.rewind();
    let mut entries = Vec::new();
    while let Some(payload) = wal.next()? {
        entries.push(LogEntry::decode(&payload)?);
    }
    Ok(entries)
}

enum Apply<'a> {
    Insert(&'a [u8]),
    Update(&'a [u8]),
}

fn apply(pages: &PageCache, page: PageNo, offset: u16, what: Apply<'_>) -> DbResult<()> {
    let pg = pages.get(page)?;
    let result = match what {
        Apply::Insert(raw) => data_page::recover_insert(&pg, offset, raw),
        Apply::Update(raw) => data_page::recover_update(&pg, offset, raw),
    };
    let released = pages.release(&pg);
    result.and(released)
}

fn tombstone(raw: &[u8]) -> Vec<u8> {
    let mut raw = raw.to_vec();
    record::invalidate(&mut raw);
    raw
}

pub fn recover(
    tm: &TransactionStatusStore,
    wal: &Wal,
    pages: &PageCache,
) -> DbResult<RecoveryStats> {
    tracing::info!("recovery.start");
    let entries = read_entries(wal)?;
    let mut stats = RecoveryStats {
        max_page: entries.iter().map(LogEntry::page).max().unwrap_or(1).max(1),
        ..RecoveryStats::default()
    };
    pages.truncate(stats.max_page)?;
    tracing::info!(
        max_page = stats.max_page,
        entries = entries.len(),
        "recovery.truncate"
    );

    let mut active: BTreeMap<Xid, Vec<&LogEntry>> = BTreeMap::new();
    for entry in &entries {
        match tm.status(entry.xid())? {
            XidStatus::Active => active.entry(entry.xid()).or_default().push(entry),
            XidStatus::Committed => {
                redo(pages, entry)?;
                stats.redone += 1;
            }
            XidStatus::Aborted => {
                if let LogEntry::Insert {
                    page, offset, raw, ..
                } = entry
                {
                    apply(pages, *page, *offset, Apply::Insert(&tombstone(raw)))?;
                    stats.redone += 1;
                }
            }
        }
    }
    tracing::info!(redone = stats.redone, "recovery.redo");

    for (xid, entries) in active {
        for entry in entries.iter().rev() {
            undo(pages, entry)?;
            stats.undone += 1;
        }
        tm.abort(xid)?;
        stats.aborted.push(xid);
    }
    tracing::info!(undone = stats.undone, aborted = ?stats.aborted, "recovery.undo");

    Ok(stats)
}

fn redo(pages: &PageCache, entry: &LogEntry) -> DbResult<()> {
    match entry {
        LogEntry::Insert {
            page, offset, raw, ..
        } => apply(pages, *page, *offset, Apply::Insert(raw)),
        LogEntry::Update {
            page, offset, new, ..
        } => apply(pages, *page, *offset, Apply::Update(new)),
    }
}

fn undo(pages: &PageCache, entry: &LogEntry) -> DbResult<()> {
    match entry {
        LogEntry::Insert {
            page, offset, raw, ..
        } => apply(pages, *page, *offset, Apply::Insert(&tombstone(raw))),
        LogEntry::Update {
            page, offset, old, ..
        } => apply(pages, *page, *offset, Apply::Update(old)),
    }
}

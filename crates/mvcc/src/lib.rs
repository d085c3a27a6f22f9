//! Multi-version concurrency control over the data item layer.
//!
//! Every stored row carries the id of the transaction that created it (xmin)
//! and of the one that deleted it (xmax, 0 while live). Rows are never
//! rewritten in place except to stamp xmax, so an update is a delete followed
//! by an insert.
//!
//! - visibility depends on the reader's [`IsolationLevel`]
//! - deleters take a per-row lock from the [`LockTable`], waiting for the
//!   current holder and failing fast on a deadlock
//! - a repeatable-read transaction that would delete a version it never saw
//!   is aborted by the engine
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use common::Config;
//! # use datastore::DataStore;
//! # use txn::TransactionStatusStore;
//! use mvcc::{IsolationLevel, VersionManager};
//!
//! # let cfg = Config::default();
//! # let tm = Arc::new(TransactionStatusStore::create(cfg.file_path("xid")).unwrap());
//! # let ds = Arc::new(DataStore::create(&cfg).unwrap());
//! let vm = VersionManager::new(tm, ds);
//! let xid = vm.begin(IsolationLevel::RepeatableRead).unwrap();
//! let uid = vm.insert(xid, b"row").unwrap();
//! assert_eq!(vm.read(xid, uid).unwrap(), Some(b"row".to_vec()));
//! vm.commit(xid).unwrap();
//! ```


pub mod entry;
mod lock_table;
mod transaction;
pub mod visibility;

pub use lock_table::{Acquire, LockTable, WaitHandle};
pub use transaction::{IsolationLevel, Transaction};

use common::{DbError, DbResult, SUPER_XID, Uid, Xid};
use datastore::{DataItem, DataStore};
use entry::Entry;
use hashbrown::HashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use txn::TransactionStatusStore;

/// Transactional row store.
pub struct VersionManager {
    tm: Arc<TransactionStatusStore>,
    ds: Arc<DataStore>,
    active: Mutex<HashMap<Xid, Arc<Transaction>>>,
    super_txn: Arc<Transaction>,
    locks: LockTable,
}

impl VersionManager {
    pub fn new(tm: Arc<TransactionStatusStore>, ds: Arc<DataStore>) -> Self {
        Self {
            tm,
            ds,
            active: Mutex::new(HashMap::new()),
            super_txn: Arc::new(Transaction::new(
                SUPER_XID,
                IsolationLevel::ReadCommitted,
                [],
            )),
            locks: LockTable::new(),
        }
    }

    /// Starts a transaction. Repeatable-read transactions snapshot the set of
    /// transactions running right now.
    pub fn begin(&self, level: IsolationLevel) -> DbResult<Xid> {
        let mut active = self.active.lock();
        let xid = self.tm.begin()?;
        let t = Transaction::new(xid, level, active.keys().copied());
        active.insert(xid, Arc::new(t));
        tracing::debug!(xid, ?level, "mvcc.begin");
        Ok(xid)
    }

    fn transaction(&self, xid: Xid) -> DbResult<Arc<Transaction>> {
        if xid == SUPER_XID {
            return Ok(Arc::clone(&self.super_txn));
        }
        self.active
            .lock()
            .get(&xid)
            .cloned()
            .ok_or(DbError::UnknownTransaction(xid))
    }

    fn running(&self, xid: Xid) -> DbResult<Arc<Transaction>> {
        let t = self.transaction(xid)?;
        if t.is_aborted() {
            return Err(DbError::TransactionAborted(xid));
        }
        Ok(t)
    }

    /// Payload of `uid` if the row is visible to `xid`.
    pub fn read(&self, xid: Xid, uid: Uid) -> DbResult<Option<Vec<u8>>> {
        let t = self.running(xid)?;
        let Some(item) = self.ds.read(uid)? else {
            return Ok(None);
        };
        let visible = self.visible_entry(&t, &item);
        self.ds.release(&item)?;
        Ok(visible?.map(|entry| entry.data))
    }

    fn visible_entry(&self, t: &Transaction, item: &DataItem) -> DbResult<Option<Entry>> {
        let entry = Entry::parse(item.uid(), item.data())?;
        if visibility::is_visible(&self.tm, t, entry.xmin, entry.xmax)? {
            Ok(Some(entry))
        } else {
            Ok(None)
        }
    }

    /// Stores `data` as a new row created by `xid`.
    pub fn insert(&self, xid: Xid, data: &[u8]) -> DbResult<Uid> {
        self.running(xid)?;
        self.ds
            .insert(xid, &entry::wrap(xid, data))
            .map_err(|e| match e {
                DbError::RecordTooLarge { max, .. } => DbError::RecordTooLarge {
                    size: data.len(),
                    max: max - entry::DATA_OFFSET,
                },
                other => other,
            })
    }

    /// Marks `uid` deleted by `xid`.
    ///
    /// Returns `false` if the row is not visible or `xid` already deleted it.
    /// Any error aborts `xid`.
    pub fn delete(&self, xid: Xid, uid: Uid) -> DbResult<bool> {
        let t = self.running(xid)?;
        let outcome = match self.ds.read(uid) {
            Ok(Some(item)) => {
                let outcome = self.delete_item(&t, &item);
                let released = self.ds.release(&item);
                outcome.and_then(|deleted| released.map(|_| deleted))
            }
            Ok(None) => Ok(false),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(deleted) => Ok(deleted),
            Err(e) => {
                self.hazard_abort(&t)?;
                Err(e)
            }
        }
    }

    fn delete_item(&self, t: &Transaction, item: &DataItem) -> DbResult<bool> {
        if self.visible_entry(t, item)?.is_none() {
            return Ok(false);
        }

        if let Acquire::Wait(handle) = self.locks.acquire(t.xid, item.uid())? {
            handle.wait();
            // The previous holder may have deleted the row before letting go.
            let entry = Entry::parse(item.uid(), item.data())?;
            if entry.xmax != t.xid
                && !visibility::is_version_skip(&self.tm, t, entry.xmax)?
                && !visibility::is_visible(&self.tm, t, entry.xmin, entry.xmax)?
            {
                return Ok(false);
            }
        }

        let entry = Entry::parse(item.uid(), item.data())?;
        if entry.xmax == t.xid {
            return Ok(false);
        }
        if visibility::is_version_skip(&self.tm, t, entry.xmax)? {
            tracing::warn!(
                xid = t.xid,
                uid = item.uid(),
                xmax = entry.xmax,
                "mvcc.version_hopping"
            );
            return Err(DbError::VersionConflict {
                xid: t.xid,
                uid: item.uid(),
            });
        }

        let mut guard = item.before_modify();
        guard.write(entry::XMAX_OFFSET, &t.xid.to_be_bytes());
        guard.after_modify(t.xid)?;
        Ok(true)
    }

    /// Aborts `t` on the engine's initiative. The transaction stays known so
    /// later calls report [`DbError::TransactionAborted`] until the caller
    /// ends it with [`abort`](Self::abort).
    fn hazard_abort(&self, t: &Transaction) -> DbResult<()> {
        if t.xid == SUPER_XID || t.mark_aborted() {
            return Ok(());
        }
        tracing::warn!(xid = t.xid, "mvcc.hazard_abort");
        self.tm.abort(t.xid)?;
        self.locks.release_all(t.xid);
        Ok(())
    }

    pub fn commit(&self, xid: Xid) -> DbResult<()> {
        if xid == SUPER_XID {
            return Err(DbError::Transaction("the super transaction cannot commit".into()));
        }
        let t = self.transaction(xid)?;
        if t.is_aborted() {
            return Err(DbError::TransactionAborted(xid));
        }
        self.tm.commit(xid)?;
        self.active.lock().remove(&xid);
        self.locks.release_all(xid);
        tracing::debug!(xid, "mvcc.commit");
        Ok(())
    }

    pub fn abort(&self, xid: Xid) -> DbResult<()> {
        if xid == SUPER_XID {
            return Err(DbError::Transaction("the super transaction cannot abort".into()));
        }
        let t = self
            .active
            .lock()
            .remove(&xid)
            .ok_or(DbError::UnknownTransaction(xid))?;
        if t.mark_aborted() {
            return Ok(());
        }
        self.tm.abort(xid)?;
        self.locks.release_all(xid);
        tracing::debug!(xid, "mvcc.abort");
        Ok(())
    }

    /// Whether the engine has already aborted `xid` on its own.
    pub fn is_hazard_aborted(&self, xid: Xid) -> DbResult<bool> {
        Ok(self.transaction(xid)?.is_aborted())
    }

    /// Record `xid` is blocked on, if it is waiting for a lock.
    pub fn waiting_on(&self, xid: Xid) -> Option<Uid> {
        self.locks.waiting_on(xid)
    }

    pub fn data_store(&self) -> &Arc<DataStore> {
        &self.ds
    }
}

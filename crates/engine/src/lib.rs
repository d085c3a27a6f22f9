//! Embeddable transactional storage engine.
//!
//! [`Engine`] wires together the four files of a database instance:
//!
//! | file          | owner                                  |
//! |---------------|----------------------------------------|
//! | `<name>.xid`  | [`TransactionStatusStore`]             |
//! | `<name>.pg`   | [`DataStore`] pages                    |
//! | `<name>.log`  | [`DataStore`] write-ahead log          |
//! | `<name>.bt`   | [`Booter`]                             |
//!
//! Rows go through MVCC; indexes are B+Trees maintained outside any user
//! transaction.
//!
//! # Example
//!
//! ```no_run
//! use common::Config;
//! use engine::Engine;
//! use mvcc::IsolationLevel;
//!
//! # fn main() -> anyhow::Result<()> {
//! let engine = Engine::create(Config::builder().data_dir("./db".into()).build())?;
//! let xid = engine.begin(IsolationLevel::ReadCommitted)?;
//! let row = engine.insert(xid, b"alice")?;
//! let index = engine.create_index()?;
//! engine.index_insert(index, row, 42)?;
//! engine.commit(xid)?;
//! assert_eq!(engine.index_search(index, 42)?, vec![row]);
//! engine.close()?;
//! # Ok(())
//! # }
//! ```


mod boot;

pub use boot::Booter;

use anyhow::{Context, Result};
use btree::BPlusTree;
use common::{Config, DbError, DbResult, Uid, Xid};
use datastore::DataStore;
use hashbrown::HashMap;
use mvcc::{IsolationLevel, VersionManager};
use parking_lot::Mutex;
use std::{fs, sync::Arc};
use txn::TransactionStatusStore;

/// One open database instance.
pub struct Engine {
    cfg: Config,
    tm: Arc<TransactionStatusStore>,
    ds: Arc<DataStore>,
    vm: VersionManager,
    booter: Booter,
    indexes: Mutex<HashMap<Uid, Arc<BPlusTree>>>,
}

impl Engine {
    /// Creates a fresh database under `cfg.data_dir`. Fails if any of its
    /// files already exist.
    pub fn create(cfg: Config) -> Result<Self> {
        fs::create_dir_all(&cfg.data_dir).with_context(|| {
            format!("failed to create data directory {}", cfg.data_dir.display())
        })?;
        let tm = TransactionStatusStore::create(cfg.file_path("xid"))
            .context("failed to create transaction status file")?;
        let ds = DataStore::create(&cfg).context("failed to create data store")?;
        let booter = Booter::create(&cfg).context("failed to create boot file")?;
        tracing::info!(stem = %cfg.file_stem().display(), "engine.create");
        Ok(Self::assemble(cfg, tm, ds, booter))
    }

    /// Opens an existing database, recovering from the log if the previous
    /// session did not close cleanly.
    pub fn open(cfg: Config) -> Result<Self> {
        let tm = TransactionStatusStore::open(cfg.file_path("xid"))
            .context("failed to open transaction status file")?;
        let ds = DataStore::open(&cfg, &tm).context("failed to open data store")?;
        let booter = Booter::open(&cfg).context("failed to open boot file")?;
        tracing::info!(stem = %cfg.file_stem().display(), xids = tm.count(), "engine.open");
        Ok(Self::assemble(cfg, tm, ds, booter))
    }

    fn assemble(cfg: Config, tm: TransactionStatusStore, ds: DataStore, booter: Booter) -> Self {
        let tm = Arc::new(tm);
        let ds = Arc::new(ds);
        Self {
            vm: VersionManager::new(Arc::clone(&tm), Arc::clone(&ds)),
            cfg,
            tm,
            ds,
            booter,
            indexes: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn begin(&self, level: IsolationLevel) -> DbResult<Xid> {
        self.vm.begin(level)
    }

    pub fn commit(&self, xid: Xid) -> DbResult<()> {
        self.vm.commit(xid)
    }

    pub fn abort(&self, xid: Xid) -> DbResult<()> {
        self.vm.abort(xid)
    }

    pub fn insert(&self, xid: Xid, data: &[u8]) -> DbResult<Uid> {
        self.vm.insert(xid, data)
    }

    pub fn read(&self, xid: Xid, uid: Uid) -> DbResult<Option<Vec<u8>>> {
        self.vm.read(xid, uid)
    }

    pub fn delete(&self, xid: Xid, uid: Uid) -> DbResult<bool> {
        self.vm.delete(xid, uid)
    }

    /// Row `xid` is blocked on while another transaction holds it.
    pub fn waiting_on(&self, xid: Xid) -> Option<Uid> {
        self.vm.waiting_on(xid)
    }

    /// Builds an empty index and returns its handle.
    pub fn create_index(&self) -> DbResult<Uid> {
        let handle = BPlusTree::create(&self.ds)?;
        self.open_index(handle)?;
        Ok(handle)
    }

    /// Attaches an index created in an earlier session.
    pub fn open_index(&self, handle: Uid) -> DbResult<()> {
        let mut indexes = self.indexes.lock();
        if !indexes.contains_key(&handle) {
            let tree = BPlusTree::load(Arc::clone(&self.ds), handle)?;
            indexes.insert(handle, Arc::new(tree));
        }
        Ok(())
    }

    fn index(&self, handle: Uid) -> DbResult<Arc<BPlusTree>> {
        self.indexes
            .lock()
            .get(&handle)
            .cloned()
            .ok_or_else(|| DbError::Index(format!("index {handle:#x} is not open")))
    }

    pub fn index_insert(&self, handle: Uid, row: Uid, key: i64) -> DbResult<()> {
        self.index(handle)?.insert(row, key)
    }

    pub fn index_search(&self, handle: Uid, key: i64) -> DbResult<Vec<Uid>> {
        self.index(handle)?.search(key)
    }

    pub fn index_search_range(&self, handle: Uid, lo: i64, hi: i64) -> DbResult<Vec<Uid>> {
        self.index(handle)?.search_range(lo, hi)
    }

    /// Uid stored in the boot file, if one was ever set.
    pub fn boot_uid(&self) -> DbResult<Option<Uid>> {
        let bytes = self.booter.load()?;
        match <[u8; 8]>::try_from(bytes.as_slice()) {
            Ok(raw) => Ok(Some(Uid::from_be_bytes(raw))),
            Err(_) if bytes.is_empty() => Ok(None),
            Err(_) => Err(DbError::Corruption(format!(
                "boot file {} holds {} bytes",
                self.booter.path().display(),
                bytes.len()
            ))),
        }
    }

    pub fn set_boot_uid(&self, uid: Uid) -> DbResult<()> {
        self.booter.update(&uid.to_be_bytes())
    }

    /// Releases every index and closes the files cleanly.
    pub fn close(self) -> DbResult<()> {
        for (_, tree) in self.indexes.lock().drain() {
            tree.close()?;
        }
        self.ds.close()?;
        self.tm.close()?;
        tracing::info!(stem = %self.cfg.file_stem().display(), "engine.close");
        Ok(())
    }
}

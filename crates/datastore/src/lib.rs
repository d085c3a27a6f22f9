//! Data item layer: variable-length records addressed by uid.
//!
//! A [`DataStore`] owns the page file, the write-ahead log and the
//! free-space index. Records are appended to data pages and never move; the
//! uid of a record is its page number and in-page offset. Every insert and
//! every in-place change goes through the log first.
//!
//! # Example
//!
//! ```no_run
//! use common::{Config, SUPER_XID};
//! use datastore::DataStore;
//!
//! let cfg = Config::builder().data_dir("/tmp/db".into()).build();
//! let ds = DataStore::create(&cfg).unwrap();
//! let uid = ds.insert(SUPER_XID, b"payload").unwrap();
//!
//! let item = ds.read(uid).unwrap().expect("record is live");
//! assert_eq!(item.data(), b"payload");
//! ds.release(&item).unwrap();
//! ds.close().unwrap();
//! ```

#[cfg(test)]
mod tests;

mod item;
pub mod record;
pub mod recovery;

pub use item::{DataItem, ModifyGuard};
pub use recovery::RecoveryStats;

use buffer::{CacheSource, PageCache, RefCache};
use common::{Config, DbError, DbResult, PageNo, Uid, Xid, uid_from, uid_offset, uid_page};
use std::sync::Arc;
use storage::{FreeSpaceIndex, PAGE_SIZE, Page, data_page, meta};
use txn::TransactionStatusStore;
use wal::{LogEntry, Wal};

/// Attempts at finding a page with room before an insert gives up.
const INSERT_ATTEMPTS: usize = 5;

/// Page cache capacity implied by a config.
pub fn page_cache_pages(cfg: &Config) -> usize {
    (cfg.page_cache_bytes / PAGE_SIZE as u64) as usize
}

/// Materializes [`DataItem`]s for the item cache.
struct ItemSource {
    pages: Arc<PageCache>,
    wal: Arc<Wal>,
}

impl ItemSource {
    fn build(&self, uid: Uid, page: &Arc<Page>) -> DbResult<DataItem> {
        let offset = uid_offset(uid) as usize;
        if offset < data_page::HEADER_LEN || offset + record::HEADER_LEN > PAGE_SIZE {
            return Err(DbError::Storage(format!(
                "uid {uid:#x} has no record header"
            )));
        }
        let header = page.read_at(offset, record::HEADER_LEN);
        let len = record::HEADER_LEN + record::declared_size(&header);
        if offset + len > PAGE_SIZE {
            return Err(DbError::Corruption(format!(
                "record {uid:#x} of {len} bytes runs past the end of its page"
            )));
        }
        Ok(DataItem::new(
            uid,
            Arc::clone(page),
            offset,
            len,
            Arc::clone(&self.wal),
        ))
    }
}

impl CacheSource for ItemSource {
    type Item = DataItem;

    fn load(&self, uid: Uid) -> DbResult<DataItem> {
        let page = self.pages.get(uid_page(uid))?;
        let built = self.build(uid, &page);
        if built.is_err() {
            self.pages.release(&page)?;
        }
        built
    }

    fn evict(&self, item: &DataItem) -> DbResult<()> {
        self.pages.release(item.page())
    }
}

/// Record store over one page file and one log.
pub struct DataStore {
    items: RefCache<ItemSource>,
    pages: Arc<PageCache>,
    wal: Arc<Wal>,
    free_space: FreeSpaceIndex,
    meta: Arc<Page>,
}

impl DataStore {
    /// Creates `<name>.pg` and `<name>.log`. Fails if either exists.
    pub fn create(cfg: &Config) -> DbResult<Self> {
        let pages = Arc::new(PageCache::create(
            cfg.file_path("pg"),
            page_cache_pages(cfg),
        )?);
        let wal = Arc::new(Wal::create(cfg.file_path("log"))?);

        let meta_page = pages.allocate(meta::initial())?;
        debug_assert_eq!(meta_page, meta::META_PAGE);
        let meta = pages.get(meta::META_PAGE)?;
        tracing::info!(path = %cfg.file_path("pg").display(), "datastore.create");

        Ok(Self::assemble(cfg, pages, wal, meta))
    }

    /// Opens an existing store, running recovery if the last session crashed.
    pub fn open(cfg: &Config, tm: &TransactionStatusStore) -> DbResult<Self> {
        let pages = Arc::new(PageCache::open(cfg.file_path("pg"), page_cache_pages(cfg))?);
        let wal = Arc::new(Wal::open(cfg.file_path("log"))?);
        if pages.page_count() < meta::META_PAGE {
            return Err(DbError::Corruption("page file has no meta page".into()));
        }

        let meta = pages.get(meta::META_PAGE)?;
        if !meta::is_clean(&meta) {
            tracing::warn!("datastore.unclean_shutdown");
            recovery::recover(tm, &wal, &pages)?;
        }

        let store = Self::assemble(cfg, pages, wal, meta);
        store.fill_free_space()?;
        meta::stamp_open(&store.meta);
        store.pages.flush_page(&store.meta)?;
        tracing::info!(pages = store.pages.page_count(), "datastore.open");
        Ok(store)
    }

    fn assemble(cfg: &Config, pages: Arc<PageCache>, wal: Arc<Wal>, meta: Arc<Page>) -> Self {
        let source = ItemSource {
            pages: Arc::clone(&pages),
            wal: Arc::clone(&wal),
        };
        Self {
            items: RefCache::new(source, cfg.data_cache_items),
            pages,
            wal,
            free_space: FreeSpaceIndex::new(),
            meta,
        }
    }

    fn fill_free_space(&self) -> DbResult<()> {
        for pgno in (meta::META_PAGE + 1)..=self.pages.page_count() {
            let page = self.pages.get(pgno)?;
            self.free_space.record(pgno, data_page::free_space(&page));
            self.pages.release(&page)?;
        }
        Ok(())
    }

    /// Stores `payload` as a new record on behalf of `xid`.
    pub fn insert(&self, xid: Xid, payload: &[u8]) -> DbResult<Uid> {
        let raw = record::wrap(payload);
        if raw.len() > data_page::MAX_FREE_SPACE {
            return Err(DbError::RecordTooLarge {
                size: payload.len(),
                max: record::MAX_PAYLOAD,
            });
        }

        let mut target = None;
        for _ in 0..INSERT_ATTEMPTS {
            if let Some(info) = self.free_space.checkout(raw.len()) {
                target = Some(info.page);
                break;
            }
            let pgno = self.pages.allocate(data_page::initial())?;
            self.free_space.record(pgno, data_page::MAX_FREE_SPACE);
        }
        let Some(pgno) = target else {
            return Err(DbError::Storage(format!(
                "no page with {} free bytes after {INSERT_ATTEMPTS} attempts",
                raw.len()
            )));
        };

        match self.append_record(pgno, xid, &raw) {
            Ok((uid, free)) => {
                self.free_space.record(pgno, free);
                tracing::debug!(xid, uid, size = payload.len(), "datastore.insert");
                Ok(uid)
            }
            Err(e) => {
                self.free_space.record(pgno, 0);
                Err(e)
            }
        }
    }

    fn append_record(&self, pgno: PageNo, xid: Xid, raw: &[u8]) -> DbResult<(Uid, usize)> {
        let page = self.pages.get(pgno)?;
        let written = self.log_and_append(&page, xid, raw);
        let released = self.pages.release(&page);
        let written = written?;
        released?;
        Ok(written)
    }

    fn log_and_append(&self, page: &Page, xid: Xid, raw: &[u8]) -> DbResult<(Uid, usize)> {
        let offset = data_page::free_offset(page);
        let entry = LogEntry::Insert {
            xid,
            page: page.number(),
            offset,
            raw: raw.to_vec(),
        };
        self.wal.append(&entry.encode())?;
        let at = data_page::append(page, raw)?;
        Ok((uid_from(page.number(), at), data_page::free_space(page)))
    }

    /// Pins the record at `uid`. Returns `None` for a tombstone.
    ///
    /// Every `Some` must be handed back through [`release`](Self::release).
    pub fn read(&self, uid: Uid) -> DbResult<Option<Arc<DataItem>>> {
        let item = self.items.get(uid)?;
        if item.is_valid() {
            Ok(Some(item))
        } else {
            self.items.release(uid)?;
            Ok(None)
        }
    }

    pub fn release(&self, item: &DataItem) -> DbResult<()> {
        self.items.release(item.uid())
    }

    pub fn page_count(&self) -> PageNo {
        self.pages.page_count()
    }

    /// Flushes everything and stamps the meta page as cleanly closed.
    pub fn close(&self) -> DbResult<()> {
        self.items.close()?;
        meta::stamp_close(&self.meta);
        self.pages.flush_page(&self.meta)?;
        self.pages.close()?;
        self.wal.close()?;
        tracing::info!("datastore.close");
        Ok(())
    }
}

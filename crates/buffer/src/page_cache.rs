use crate::{CacheSource, RefCache};
use common::{DbError, DbResult, PageNo};
use parking_lot::Mutex;
use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    },
};
use storage::{PAGE_SIZE, Page, page_offset};

/// Smallest page cache the engine will run with.
pub const PAGE_CACHE_MIN_PAGES: usize = 10;

/// Below this many pages the cache works but thrashes under concurrent load.
const PAGE_CACHE_WARN_PAGES: usize = 16;

/// The page file seen as a [`CacheSource`].
#[derive(Debug)]
struct PageFile {
    path: PathBuf,
    file: Mutex<File>,
    page_count: AtomicU32,
}

impl PageFile {
    fn write_page(&self, number: PageNo, bytes: &[u8]) -> DbResult<()> {
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page_offset(number)))
            .map_err(|e| DbError::Storage(format!("Failed to seek to page {number}: {e}")))?;
        file.write_all(bytes)
            .map_err(|e| DbError::Storage(format!("Failed to write page {number}: {e}")))?;
        Ok(())
    }

    fn sync(&self) -> DbResult<()> {
        self.file
            .lock()
            .sync_all()
            .map_err(|e| DbError::Storage(format!("Failed to fsync {}: {e}", self.path.display())))
    }
}

impl CacheSource for PageFile {
    type Item = Page;

    fn load(&self, key: u64) -> DbResult<Page> {
        let number = key as PageNo;
        let count = self.page_count.load(Ordering::Acquire);
        if number == 0 || number > count {
            return Err(DbError::Storage(format!(
                "page {number} out of range (file has {count} pages)"
            )));
        }

        let mut buf = vec![0u8; PAGE_SIZE];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(page_offset(number)))
            .map_err(|e| DbError::Storage(format!("Failed to seek to page {number}: {e}")))?;
        file.read_exact(&mut buf)
            .map_err(|e| DbError::Storage(format!("Failed to read page {number}: {e}")))?;
        Ok(Page::new(number, buf))
    }

    fn evict(&self, page: &Page) -> DbResult<()> {
        if !page.is_dirty() {
            return Ok(());
        }
        let bytes = page.bytes().clone();
        self.write_page(page.number(), &bytes)?;
        page.set_dirty(false);
        Ok(())
    }
}

/// Page file fronted by a reference-counted page cache.
///
/// Pages are written back when their last reference is released, on
/// [`flush_page`](Self::flush_page), or on [`close`](Self::close).
pub struct PageCache {
    cache: RefCache<PageFile>,
}

impl PageCache {
    /// Creates a new, empty page file. Fails if `path` already exists.
    pub fn create(path: impl AsRef<Path>, capacity: usize) -> DbResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                DbError::Storage(format!(
                    "Failed to create page file {}: {e}",
                    path.display()
                ))
            })?;
        Self::with_file(path, file, capacity)
    }

    /// Opens an existing page file. The page count is derived from its length.
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> DbResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                DbError::Storage(format!("Failed to open page file {}: {e}", path.display()))
            })?;
        Self::with_file(path, file, capacity)
    }

    fn with_file(path: PathBuf, file: File, capacity: usize) -> DbResult<Self> {
        if capacity < PAGE_CACHE_MIN_PAGES {
            return Err(DbError::Storage(format!(
                "page cache of {capacity} pages is below the minimum of {PAGE_CACHE_MIN_PAGES}"
            )));
        }
        if capacity < PAGE_CACHE_WARN_PAGES {
            tracing::warn!(capacity, "page_cache.undersized");
        }

        let len = file.metadata()?.len();
        let page_count = (len / PAGE_SIZE as u64) as PageNo;
        tracing::debug!(path = %path.display(), page_count, "page_cache.open");

        let source = PageFile {
            path,
            file: Mutex::new(file),
            page_count: AtomicU32::new(page_count),
        };
        Ok(Self {
            cache: RefCache::new(source, capacity),
        })
    }

    /// Appends a page holding `init` and writes it through immediately.
    pub fn allocate(&self, init: Vec<u8>) -> DbResult<PageNo> {
        if init.len() != PAGE_SIZE {
            return Err(DbError::Storage(format!(
                "page image is {} bytes, expected {PAGE_SIZE}",
                init.len()
            )));
        }
        let file = self.cache.source();
        let number = file.page_count.fetch_add(1, Ordering::AcqRel) + 1;
        file.write_page(number, &init)?;
        file.sync()?;
        Ok(number)
    }

    /// Pins page `number`. Pair every call with [`release`](Self::release).
    pub fn get(&self, number: PageNo) -> DbResult<Arc<Page>> {
        self.cache.get(number as u64)
    }

    pub fn release(&self, page: &Page) -> DbResult<()> {
        self.cache.release(page.number() as u64)
    }

    /// Writes one page through to disk and fsyncs, independent of eviction.
    pub fn flush_page(&self, page: &Page) -> DbResult<()> {
        let file = self.cache.source();
        let bytes = page.bytes().clone();
        file.write_page(page.number(), &bytes)?;
        page.set_dirty(false);
        file.sync()
    }

    /// Cuts the file down to pages `1..=max` (or grows it with zeros).
    pub fn truncate(&self, max: PageNo) -> DbResult<()> {
        let file = self.cache.source();
        let len = max as u64 * PAGE_SIZE as u64;
        file.file
            .lock()
            .set_len(len)
            .map_err(|e| DbError::Storage(format!("Failed to truncate page file: {e}")))?;
        file.page_count.store(max, Ordering::Release);
        Ok(())
    }

    pub fn page_count(&self) -> PageNo {
        self.cache.source().page_count.load(Ordering::Acquire)
    }

    /// Writes back every resident dirty page and fsyncs the file.
    pub fn close(&self) -> DbResult<()> {
        self.cache.close()?;
        self.cache.source().sync()
    }

    pub fn resident(&self) -> usize {
        self.cache.resident()
    }
}

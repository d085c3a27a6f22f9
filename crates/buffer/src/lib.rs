//! Reference-counted caching and the page cache built on it.
//!
//! [`RefCache`] is a generic cache where callers hold explicit references:
//! - `get` loads a resource through a [`CacheSource`] on first use and bumps
//!   its reference count afterwards
//! - `release` drops one reference; the last release writes the resource back
//!   through the source and frees its slot
//! - concurrent `get`s of a key that is still loading wait for that load
//!
//! [`PageCache`] plugs a page file into it.
//!
//! # Example
//!
//! ```no_run
//! use buffer::PageCache;
//! use storage::data_page;
//!
//! let cache = PageCache::create("/tmp/db/easydb.pg", 64).unwrap();
//! let pgno = cache.allocate(data_page::initial()).unwrap();
//!
//! let page = cache.get(pgno).unwrap();
//! data_page::append(&page, b"hello").unwrap();
//! cache.release(&page).unwrap();
//!
//! cache.close().unwrap();
//! ```


mod cache;
mod page_cache;

pub use cache::{CacheSource, RefCache};
pub use page_cache::{PAGE_CACHE_MIN_PAGES, PageCache};

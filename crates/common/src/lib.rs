#[cfg(test)]
mod tests;

pub mod pretty;

use serde::{Deserialize, Serialize};
use std::{io, path::PathBuf};
use thiserror::Error;

/// 1-based page number inside the page file.
/// Examples:
/// - `let meta: PageNo = 1; // validity page`
/// - `let first_data: PageNo = 2;`
pub type PageNo = u32;

/// Transaction identifier handed out by the status store.
/// Examples:
/// - `let system: Xid = SUPER_XID;`
/// - `let first_user_txn: Xid = 1;`
pub type Xid = u64;

/// Row identifier: page number in the high 32 bits, in-page offset in the low 16.
/// Examples:
/// - `let uid: Uid = uid_from(2, 2); // first record of the first data page`
/// - `let uid: Uid = uid_from(7, 1024);`
pub type Uid = u64;

/// Reserved transaction used for engine-internal writes; always committed.
pub const SUPER_XID: Xid = 0;

/// Packs a page number and in-page offset into a uid.
pub fn uid_from(page: PageNo, offset: u16) -> Uid {
    ((page as u64) << 32) | offset as u64
}

/// Page number half of a uid.
pub fn uid_page(uid: Uid) -> PageNo {
    (uid >> 32) as PageNo
}

/// In-page offset half of a uid.
pub fn uid_offset(uid: Uid) -> u16 {
    (uid & 0xFFFF) as u16
}

/// Canonical error type shared across engine subsystems.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("storage: {0}")]
    Storage(String),
    #[error("wal: {0}")]
    Wal(String),
    #[error("transaction: {0}")]
    Transaction(String),
    #[error("index: {0}")]
    Index(String),
    #[error("cache is full")]
    CacheFull,
    #[error("record of {size} bytes exceeds page capacity of {max} bytes")]
    RecordTooLarge { size: usize, max: usize },
    #[error("deadlock: transaction {xid} waiting on record {uid:#x}")]
    Deadlock { xid: Xid, uid: Uid },
    #[error("version conflict: transaction {xid} cannot delete record {uid:#x}")]
    VersionConflict { xid: Xid, uid: Uid },
    #[error("transaction {0} was aborted")]
    TransactionAborted(Xid),
    #[error("unknown transaction {0}")]
    UnknownTransaction(Xid),
    #[error("corruption: {0}")]
    Corruption(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl DbError {
    /// Fatal errors mean on-disk state can no longer be trusted; the embedding
    /// process decides whether to shut down.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DbError::Corruption(_))
    }
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// Default page cache size: 64 MiB.
pub const DEFAULT_PAGE_CACHE_BYTES: u64 = 64 << 20;

/// Runtime configuration for an engine instance.
///
/// # Example
/// ```
/// use common::Config;
/// use std::path::PathBuf;
///
/// let config = Config::builder()
///     .data_dir(PathBuf::from("./my_db"))
///     .name("orders")
///     .page_cache_bytes(8 << 20)
///     .build();
/// assert_eq!(config.file_stem(), PathBuf::from("./my_db/orders"));
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    /// Directory holding the `.xid`, `.log`, `.pg` and `.bt` files.
    #[builder(default = PathBuf::from("./db_data"))]
    pub data_dir: PathBuf,
    /// File stem shared by every database file.
    #[builder(into, default = String::from("easydb"))]
    pub name: String,
    /// Page cache capacity in bytes.
    #[builder(default = DEFAULT_PAGE_CACHE_BYTES)]
    pub page_cache_bytes: u64,
    /// Number of data items the record cache keeps resident.
    #[builder(default = 4096)]
    pub data_cache_items: usize,
}

impl Config {
    /// `data_dir/name`; each subsystem appends its own extension.
    pub fn file_stem(&self) -> PathBuf {
        self.data_dir.join(&self.name)
    }

    /// `data_dir/name.ext`, keeping any dots already in `name`.
    pub fn file_path(&self, ext: &str) -> PathBuf {
        let mut path = self.file_stem().into_os_string();
        path.push(".");
        path.push(ext);
        PathBuf::from(path)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./db_data"),
            name: String::from("easydb"),
            page_cache_bytes: DEFAULT_PAGE_CACHE_BYTES,
            data_cache_items: 4096,
        }
    }
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{
        Config, DbError, DbResult, PageNo, SUPER_XID, Uid, Xid, uid_from, uid_offset, uid_page,
    };
}

//! Durable transaction status table (the `.xid` file).
//!
//! ```text
//! [TransactionCount:8] [Status(xid=1):1] [Status(xid=2):1] ...
//! ```
//!
//! Transaction ids are handed out sequentially from 1. Id 0 is the super
//! transaction used for engine-internal writes: it is always committed and
//! never stored.


use common::{DbError, DbResult, SUPER_XID, Xid};
use parking_lot::Mutex;
use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

const HEADER_LEN: u64 = 8;

/// Terminal and non-terminal transaction states as stored on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum XidStatus {
    Active = 0,
    Committed = 1,
    Aborted = 2,
}

impl TryFrom<u8> for XidStatus {
    type Error = DbError;

    fn try_from(value: u8) -> DbResult<Self> {
        match value {
            0 => Ok(XidStatus::Active),
            1 => Ok(XidStatus::Committed),
            2 => Ok(XidStatus::Aborted),
            other => Err(DbError::Corruption(format!(
                "unknown transaction status byte {other}"
            ))),
        }
    }
}

fn status_offset(xid: Xid) -> u64 {
    HEADER_LEN + (xid - 1)
}

#[derive(Debug)]
struct XidFile {
    file: File,
    count: u64,
}

impl XidFile {
    fn write_at(&mut self, at: u64, bytes: &[u8]) -> DbResult<()> {
        self.file
            .seek(SeekFrom::Start(at))
            .and_then(|_| self.file.write_all(bytes))
            .map_err(|e| DbError::Transaction(format!("Failed to write xid file: {e}")))
    }

    fn sync(&mut self) -> DbResult<()> {
        self.file
            .sync_all()
            .map_err(|e| DbError::Transaction(format!("Failed to fsync xid file: {e}")))
    }
}

/// Maps transaction ids to [`XidStatus`].
#[derive(Debug)]
pub struct TransactionStatusStore {
    path: PathBuf,
    state: Mutex<XidFile>,
}

impl TransactionStatusStore {
    /// Creates an empty store. Fails if `path` already exists.
    pub fn create(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                DbError::Transaction(format!("Failed to create xid file {}: {e}", path.display()))
            })?;

        let mut state = XidFile { file, count: 0 };
        state.write_at(0, &0u64.to_be_bytes())?;
        state.sync()?;
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Opens an existing store, checking that its length matches the header.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| {
                DbError::Transaction(format!("Failed to open xid file {}: {e}", path.display()))
            })?;

        let len = file.metadata()?.len();
        if len < HEADER_LEN {
            return Err(DbError::Corruption(format!(
                "xid file {} is {len} bytes, shorter than its header",
                path.display()
            )));
        }
        let mut header = [0u8; HEADER_LEN as usize];
        file.read_exact(&mut header)?;
        let count = u64::from_be_bytes(header);
        if len != HEADER_LEN + count {
            return Err(DbError::Corruption(format!(
                "xid file {} claims {count} transactions but is {len} bytes",
                path.display()
            )));
        }
        tracing::debug!(path = %path.display(), count, "txn.open");

        Ok(Self {
            path,
            state: Mutex::new(XidFile { file, count }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Allocates the next transaction id and marks it active.
    pub fn begin(&self) -> DbResult<Xid> {
        let mut state = self.state.lock();
        let xid = state.count + 1;
        state.write_at(status_offset(xid), &[XidStatus::Active as u8])?;
        state.count = xid;
        state.write_at(0, &xid.to_be_bytes())?;
        state.sync()?;
        Ok(xid)
    }

    pub fn commit(&self, xid: Xid) -> DbResult<()> {
        self.set_status(xid, XidStatus::Committed)
    }

    pub fn abort(&self, xid: Xid) -> DbResult<()> {
        self.set_status(xid, XidStatus::Aborted)
    }

    fn set_status(&self, xid: Xid, status: XidStatus) -> DbResult<()> {
        if xid == SUPER_XID {
            return Ok(());
        }
        let mut state = self.state.lock();
        if xid > state.count {
            return Err(DbError::UnknownTransaction(xid));
        }
        state.write_at(status_offset(xid), &[status as u8])?;
        state.sync()
    }

    pub fn status(&self, xid: Xid) -> DbResult<XidStatus> {
        if xid == SUPER_XID {
            return Ok(XidStatus::Committed);
        }
        let mut state = self.state.lock();
        if xid > state.count {
            return Err(DbError::UnknownTransaction(xid));
        }
        let mut byte = [0u8; 1];
        state
            .file
            .seek(SeekFrom::Start(status_offset(xid)))
            .and_then(|_| state.file.read_exact(&mut byte))
            .map_err(|e| DbError::Transaction(format!("Failed to read xid file: {e}")))?;
        XidStatus::try_from(byte[0])
    }

    pub fn is_active(&self, xid: Xid) -> DbResult<bool> {
        Ok(self.status(xid)? == XidStatus::Active)
    }

    pub fn is_committed(&self, xid: Xid) -> DbResult<bool> {
        Ok(self.status(xid)? == XidStatus::Committed)
    }

    pub fn is_aborted(&self, xid: Xid) -> DbResult<bool> {
        Ok(self.status(xid)? == XidStatus::Aborted)
    }

    /// Number of transaction ids handed out so far.
    pub fn count(&self) -> u64 {
        self.state.lock().count
    }

    pub fn close(&self) -> DbResult<()> {
        self.state.lock().sync()
    }
}

//! Write-ahead log for the data item layer.
//!
//! Every page mutation is described by a [`LogEntry`] that is appended and
//! fsynced here before the change becomes visible. On startup the recovery
//! routine walks the log to redo finished work and undo whatever crashed
//! transactions left behind.
//!
//! # File format
//!
//! ```text
//! [RollingChecksum:4] [Len:4][Checksum:4][Payload:Len] [Len:4][Checksum:4][Payload:Len] ...
//! ```
//!
//! - each entry carries a checksum of its own payload
//! - the header holds a checksum folded over every complete frame ever appended
//! - a frame cut short by a crash (a torn tail) is cut off when the log is opened
//!
//! # Example
//!
//! ```no_run
//! use wal::{LogEntry, Wal};
//!
//! let wal = Wal::create("data/easydb.log").unwrap();
//! let entry = LogEntry::Insert { xid: 1, page: 2, offset: 2, raw: vec![6, 0, 1, 42] };
//! wal.append(&entry.encode()).unwrap();
//!
//! wal.rewind();
//! while let Some(payload) = wal.next().unwrap() {
//!     let entry = LogEntry::decode(&payload).unwrap();
//!     println!("{entry:?}");
//! }
//! ```

#[cfg(test)]
mod tests;

mod entry;

pub use entry::LogEntry;

use common::{DbError, DbResult};
use parking_lot::Mutex;
use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

/// Multiplier of the polynomial checksum.
pub const CHECKSUM_SEED: i32 = 711;

const HEADER_LEN: u64 = 4;
const FRAME_HEADER_LEN: usize = 8;

/// Folds `bytes` into `acc`. Bytes are treated as signed, arithmetic wraps.
pub fn checksum(acc: i32, bytes: &[u8]) -> i32 {
    bytes.iter().fold(acc, |acc, &b| {
        acc.wrapping_mul(CHECKSUM_SEED).wrapping_add(b as i8 as i32)
    })
}

fn frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&checksum(0, payload).to_be_bytes());
    frame.extend_from_slice(payload);
    frame
}

#[derive(Debug)]
struct WalState {
    file: File,
    checksum: i32,
    cursor: u64,
    len: u64,
}

impl WalState {
    fn load(file: File) -> DbResult<(Self, i32)> {
        let len = file.metadata()?.len();
        if len < HEADER_LEN {
            return Err(DbError::Corruption(format!(
                "log file is {len} bytes, shorter than its header"
            )));
        }
        let mut state = Self {
            file,
            checksum: 0,
            cursor: HEADER_LEN,
            len,
        };
        let mut header = [0u8; HEADER_LEN as usize];
        state.read_exact_at(0, &mut header)?;
        Ok((state, i32::from_be_bytes(header)))
    }

    fn read_exact_at(&mut self, at: u64, buf: &mut [u8]) -> DbResult<()> {
        self.file
            .seek(SeekFrom::Start(at))
            .map_err(|e| DbError::Wal(format!("Failed to seek log: {e}")))?;
        self.file
            .read_exact(buf)
            .map_err(|e| DbError::Wal(format!("Failed to read log: {e}")))
    }

    /// Reads the complete frame at the cursor and advances past it. Returns
    /// `None`, leaving the cursor alone, for a short or corrupt frame.
    fn read_frame(&mut self) -> DbResult<Option<Vec<u8>>> {
        let start = self.cursor;
        if start + FRAME_HEADER_LEN as u64 > self.len {
            return Ok(None);
        }
        let mut head = [0u8; FRAME_HEADER_LEN];
        self.read_exact_at(start, &mut head)?;
        let size = u32::from_be_bytes([head[0], head[1], head[2], head[3]]) as usize;
        let expected = i32::from_be_bytes([head[4], head[5], head[6], head[7]]);
        if start + (FRAME_HEADER_LEN + size) as u64 > self.len {
            return Ok(None);
        }

        let mut frame = vec![0u8; FRAME_HEADER_LEN + size];
        frame[..FRAME_HEADER_LEN].copy_from_slice(&head);
        self.read_exact_at(start + FRAME_HEADER_LEN as u64, &mut frame[FRAME_HEADER_LEN..])?;
        if checksum(0, &frame[FRAME_HEADER_LEN..]) != expected {
            tracing::warn!(offset = start, "wal.entry_checksum_mismatch");
            return Ok(None);
        }
        self.cursor += frame.len() as u64;
        Ok(Some(frame))
    }

    fn write_header(&mut self) -> DbResult<()> {
        self.file
            .seek(SeekFrom::Start(0))
            .and_then(|_| self.file.write_all(&self.checksum.to_be_bytes()))
            .and_then(|_| self.file.sync_all())
            .map_err(|e| DbError::Wal(format!("Failed to update log checksum: {e}")))
    }
}

/// Result of a read-only pass over a log file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogScan {
    /// Payloads of every verified entry, in append order.
    pub entries: Vec<Vec<u8>>,
    pub stored_checksum: i32,
    pub computed_checksum: i32,
    /// Bytes after the last verified entry.
    pub torn_bytes: u64,
}

/// Append-only log file with a read cursor.
#[derive(Debug)]
pub struct Wal {
    path: PathBuf,
    state: Mutex<WalState>,
}

impl Wal {
    /// Creates an empty log. Fails if `path` already exists.
    pub fn create(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| DbError::Wal(format!("Failed to create log {}: {e}", path.display())))?;

        let mut state = WalState {
            file,
            checksum: 0,
            cursor: HEADER_LEN,
            len: HEADER_LEN,
        };
        state.write_header()?;
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Opens an existing log, verifying every entry and cutting off a torn tail.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| DbError::Wal(format!("Failed to open log {}: {e}", path.display())))?;

        let (mut state, stored) = WalState::load(file)?;
        let mut computed = 0;
        let mut entries = 0usize;
        while let Some(frame) = state.read_frame()? {
            computed = checksum(computed, &frame);
            entries += 1;
        }
        if computed != stored {
            tracing::warn!(stored, computed, "wal.checksum_mismatch");
        }

        let valid_end = state.cursor;
        if valid_end < state.len {
            tracing::warn!(dropped = state.len - valid_end, "wal.torn_tail");
            state
                .file
                .set_len(valid_end)
                .map_err(|e| DbError::Wal(format!("Failed to truncate log: {e}")))?;
            state.len = valid_end;
        }
        state.checksum = computed;
        state.write_header()?;
        state.cursor = HEADER_LEN;
        tracing::info!(path = %path.display(), entries, "wal.open");

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Reads `path` without modifying it.
    pub fn scan(path: impl AsRef<Path>) -> DbResult<LogScan> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| DbError::Wal(format!("Failed to open log {}: {e}", path.display())))?;
        let (mut state, stored_checksum) = WalState::load(file)?;

        let mut computed_checksum = 0;
        let mut entries = Vec::new();
        while let Some(frame) = state.read_frame()? {
            computed_checksum = checksum(computed_checksum, &frame);
            entries.push(frame[FRAME_HEADER_LEN..].to_vec());
        }
        Ok(LogScan {
            entries,
            stored_checksum,
            computed_checksum,
            torn_bytes: state.len - state.cursor,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one entry and fsyncs it together with the updated header.
    pub fn append(&self, payload: &[u8]) -> DbResult<()> {
        let frame = frame(payload);
        let mut state = self.state.lock();
        let end = state.len;
        state
            .file
            .seek(SeekFrom::Start(end))
            .and_then(|_| state.file.write_all(&frame))
            .and_then(|_| state.file.sync_data())
            .map_err(|e| DbError::Wal(format!("Failed to append log entry: {e}")))?;
        state.len += frame.len() as u64;
        state.checksum = checksum(state.checksum, &frame);
        state.write_header()
    }

    /// Moves the read cursor back to the first entry.
    pub fn rewind(&self) {
        self.state.lock().cursor = HEADER_LEN;
    }

    /// Payload of the entry at the cursor, or `None` at the end of the log.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&self) -> DbResult<Option<Vec<u8>>> {
        let frame = self.state.lock().read_frame()?;
        Ok(frame.map(|mut frame| frame.split_off(FRAME_HEADER_LEN)))
    }

    /// Current rolling checksum.
    pub fn checksum(&self) -> i32 {
        self.state.lock().checksum
    }

    pub fn close(&self) -> DbResult<()> {
        self.state
            .lock()
            .file
            .sync_all()
            .map_err(|e| DbError::Wal(format!("Failed to sync log: {e}")))
    }
}

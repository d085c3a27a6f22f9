use bytes::{Buf, BufMut};
use common::{DbError, DbResult, PageNo, Uid, Xid, uid_from};
use serde::Serialize;

const TYPE_INSERT: u8 = 1;
const TYPE_UPDATE: u8 = 2;
// Type + Xid + PageNumber + Offset
const ENTRY_HEADER_LEN: usize = 1 + 8 + 4 + 2;

/// A page mutation as recorded in the log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum LogEntry {
    /// A whole record written at `offset`.
    Insert {
        xid: Xid,
        page: PageNo,
        offset: u16,
        raw: Vec<u8>,
    },
    /// An in-place overwrite. `old` and `new` always have the same length.
    Update {
        xid: Xid,
        page: PageNo,
        offset: u16,
        old: Vec<u8>,
        new: Vec<u8>,
    },
}

impl LogEntry {
    pub fn xid(&self) -> Xid {
        match self {
            LogEntry::Insert { xid, .. } | LogEntry::Update { xid, .. } => *xid,
        }
    }

    pub fn page(&self) -> PageNo {
        match self {
            LogEntry::Insert { page, .. } | LogEntry::Update { page, .. } => *page,
        }
    }

    pub fn offset(&self) -> u16 {
        match self {
            LogEntry::Insert { offset, .. } | LogEntry::Update { offset, .. } => *offset,
        }
    }

    /// Uid of the record this entry touches.
    pub fn uid(&self) -> Uid {
        uid_from(self.page(), self.offset())
    }

    pub fn encode(&self) -> Vec<u8> {
        let (kind, data_len) = match self {
            LogEntry::Insert { raw, .. } => (TYPE_INSERT, raw.len()),
            LogEntry::Update { old, new, .. } => (TYPE_UPDATE, old.len() + new.len()),
        };
        let mut buf = Vec::with_capacity(ENTRY_HEADER_LEN + data_len);
        buf.put_u8(kind);
        buf.put_u64(self.xid());
        buf.put_u32(self.page());
        buf.put_u16(self.offset());
        match self {
            LogEntry::Insert { raw, .. } => buf.put_slice(raw),
            LogEntry::Update { old, new, .. } => {
                buf.put_slice(old);
                buf.put_slice(new);
            }
        }
        buf
    }

    pub fn decode(payload: &[u8]) -> DbResult<Self> {
        if payload.len() < ENTRY_HEADER_LEN {
            return Err(DbError::Wal(format!(
                "log entry of {} bytes is shorter than its header",
                payload.len()
            )));
        }
        let mut buf = payload;
        let kind = buf.get_u8();
        let xid = buf.get_u64();
        let page = buf.get_u32();
        let offset = buf.get_u16();

        match kind {
            TYPE_INSERT => Ok(LogEntry::Insert {
                xid,
                page,
                offset,
                raw: buf.to_vec(),
            }),
            TYPE_UPDATE => {
                if buf.len() % 2 != 0 {
                    return Err(DbError::Wal(format!(
                        "update entry carries an odd image length {}",
                        buf.len()
                    )));
                }
                let (old, new) = buf.split_at(buf.len() / 2);
                Ok(LogEntry::Update {
                    xid,
                    page,
                    offset,
                    old: old.to_vec(),
                    new: new.to_vec(),
                })
            }
            other => Err(DbError::Wal(format!("unknown log entry type {other}"))),
        }
    }
}

//! Versioned record layout: `[Xmin:8][Xmax:8][Data]`.

use common::{DbError, DbResult, Uid, Xid};

pub const XMIN_OFFSET: usize = 0;
pub const XMAX_OFFSET: usize = 8;
pub const DATA_OFFSET: usize = 16;

/// Xmax value of a record nobody has deleted.
pub const NOT_DELETED: Xid = 0;

pub fn wrap(xmin: Xid, data: &[u8]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(DATA_OFFSET + data.len());
    raw.extend_from_slice(&xmin.to_be_bytes());
    raw.extend_from_slice(&NOT_DELETED.to_be_bytes());
    raw.extend_from_slice(data);
    raw
}

/// Creator, deleter and user bytes of a versioned record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub xmin: Xid,
    pub xmax: Xid,
    pub data: Vec<u8>,
}

impl Entry {
    pub fn parse(uid: Uid, mut raw: Vec<u8>) -> DbResult<Self> {
        if raw.len() < DATA_OFFSET {
            return Err(DbError::Corruption(format!(
                "record {uid:#x} is {} bytes, too short for version stamps",
                raw.len()
            )));
        }
        let xmin = read_xid(&raw[XMIN_OFFSET..XMAX_OFFSET]);
        let xmax = read_xid(&raw[XMAX_OFFSET..DATA_OFFSET]);
        let data = raw.split_off(DATA_OFFSET);
        Ok(Self { xmin, xmax, data })
    }
}

fn read_xid(bytes: &[u8]) -> Xid {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Xid::from_be_bytes(buf)
}

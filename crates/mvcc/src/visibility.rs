//! Visibility and version-hopping rules.

use crate::{
    entry::NOT_DELETED,
    transaction::{IsolationLevel, Transaction},
};
use common::{DbResult, Xid};
use txn::TransactionStatusStore;

/// Whether a version stamped `(xmin, xmax)` is visible to `t`.
pub fn is_visible(
    tm: &TransactionStatusStore,
    t: &Transaction,
    xmin: Xid,
    xmax: Xid,
) -> DbResult<bool> {
    if xmin == t.xid && xmax == NOT_DELETED {
        return Ok(true);
    }
    match t.level {
        IsolationLevel::ReadCommitted => read_committed(tm, xmin, xmax),
        IsolationLevel::RepeatableRead => repeatable_read(tm, t, xmin, xmax),
    }
}

fn read_committed(tm: &TransactionStatusStore, xmin: Xid, xmax: Xid) -> DbResult<bool> {
    if !tm.is_committed(xmin)? {
        return Ok(false);
    }
    Ok(xmax == NOT_DELETED || !tm.is_committed(xmax)?)
}

fn repeatable_read(
    tm: &TransactionStatusStore,
    t: &Transaction,
    xmin: Xid,
    xmax: Xid,
) -> DbResult<bool> {
    if xmin >= t.xid || t.in_snapshot(xmin) || !tm.is_committed(xmin)? {
        return Ok(false);
    }
    if xmax == NOT_DELETED || xmax > t.xid || t.in_snapshot(xmax) {
        return Ok(true);
    }
    Ok(!tm.is_committed(xmax)?)
}

/// Under repeatable read, deleting a version whose deleter committed outside
/// `t`'s snapshot would skip over a version `t` never saw.
pub fn is_version_skip(tm: &TransactionStatusStore, t: &Transaction, xmax: Xid) -> DbResult<bool> {
    if t.level == IsolationLevel::ReadCommitted || xmax == NOT_DELETED {
        return Ok(false);
    }
    Ok(tm.is_committed(xmax)? && (xmax > t.xid || t.in_snapshot(xmax)))
}

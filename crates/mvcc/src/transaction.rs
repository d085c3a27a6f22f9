use common::{SUPER_XID, Xid};
use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

/// How much of other transactions' work a transaction may observe.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum IsolationLevel {
    /// Sees every committed version at the time of each read.
    #[default]
    ReadCommitted,
    /// Sees the database as of its own begin.
    RepeatableRead,
}

/// In-memory state of a running transaction.
#[derive(Debug)]
pub struct Transaction {
    pub xid: Xid,
    pub level: IsolationLevel,
    snapshot: HashSet<Xid>,
    aborted: AtomicBool,
}

impl Transaction {
    /// `active` is only consulted under repeatable read.
    pub fn new(xid: Xid, level: IsolationLevel, active: impl IntoIterator<Item = Xid>) -> Self {
        let snapshot = match level {
            IsolationLevel::ReadCommitted => HashSet::new(),
            IsolationLevel::RepeatableRead => {
                active.into_iter().filter(|&x| x != SUPER_XID).collect()
            }
        };
        Self {
            xid,
            level,
            snapshot,
            aborted: AtomicBool::new(false),
        }
    }

    /// Whether `xid` was still running when this transaction began.
    pub fn in_snapshot(&self, xid: Xid) -> bool {
        self.snapshot.contains(&xid)
    }

    /// True once the engine has aborted this transaction on its own.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Sets the sticky abort flag; returns whether it was already set.
    pub(crate) fn mark_aborted(&self) -> bool {
        self.aborted.swap(true, Ordering::AcqRel)
    }
}

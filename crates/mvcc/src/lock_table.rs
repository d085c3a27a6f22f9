//! Record write locks with wait-for-graph deadlock detection.
//!
//! ```text
//! T1 holds A, waits for B:  T1 -> holder(B) = T2
//! T2 holds B, waits for A:  T2 -> holder(A) = T1   (cycle)
//! ```
//!
//! Each transaction waits for at most one record, so the wait-for graph has
//! out-degree one and a cycle search is a walk along a single chain.

use common::{DbError, DbResult, Uid, Xid};
use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex};
use std::{collections::VecDeque, sync::Arc};

/// Blocks a waiting transaction until the record is handed to it.
#[derive(Debug, Default)]
pub struct WaitHandle {
    granted: Mutex<bool>,
    cond: Condvar,
}

impl WaitHandle {
    pub fn wait(&self) {
        let mut granted = self.granted.lock();
        while !*granted {
            self.cond.wait(&mut granted);
        }
    }

    fn grant(&self) {
        *self.granted.lock() = true;
        self.cond.notify_all();
    }
}

/// Outcome of [`LockTable::acquire`].
#[derive(Debug)]
pub enum Acquire {
    Granted,
    /// Another transaction holds the record; block on the handle.
    Wait(Arc<WaitHandle>),
}

#[derive(Debug, Default)]
struct LockState {
    held: HashMap<Xid, Vec<Uid>>,
    holder: HashMap<Uid, Xid>,
    waiters: HashMap<Uid, VecDeque<Xid>>,
    waits_for: HashMap<Xid, Uid>,
    handles: HashMap<Xid, Arc<WaitHandle>>,
}

impl LockState {
    fn grant(&mut self, xid: Xid, uid: Uid) {
        self.holder.insert(uid, xid);
        self.held.entry(xid).or_default().push(uid);
    }

    fn cancel_wait(&mut self, xid: Xid) {
        let Some(uid) = self.waits_for.remove(&xid) else {
            return;
        };
        if let Some(queue) = self.waiters.get_mut(&uid) {
            queue.retain(|&x| x != xid);
            if queue.is_empty() {
                self.waiters.remove(&uid);
            }
        }
        self.handles.remove(&xid);
    }

    /// Gives `uid` to its longest-waiting live waiter, if any.
    fn hand_off(&mut self, uid: Uid) {
        self.holder.remove(&uid);
        let Some(queue) = self.waiters.get_mut(&uid) else {
            return;
        };
        while let Some(next) = queue.pop_front() {
            let Some(handle) = self.handles.remove(&next) else {
                continue;
            };
            self.waits_for.remove(&next);
            self.holder.insert(uid, next);
            self.held.entry(next).or_default().push(uid);
            handle.grant();
            break;
        }
        if queue.is_empty() {
            self.waiters.remove(&uid);
        }
    }

    fn has_deadlock(&self) -> bool {
        let mut stamps: HashMap<Xid, u64> = HashMap::new();
        let mut stamp = 0;
        for &xid in self.held.keys() {
            if stamps.contains_key(&xid) {
                continue;
            }
            stamp += 1;
            if self.chain_closes(xid, stamp, &mut stamps) {
                return true;
            }
        }
        false
    }

    /// Follows `xid -> holder(waits_for(xid))` from `start`. Meeting the
    /// current stamp means a cycle; meeting an older one means a chain
    /// already known to end.
    fn chain_closes(&self, start: Xid, stamp: u64, stamps: &mut HashMap<Xid, u64>) -> bool {
        let mut xid = start;
        loop {
            match stamps.get(&xid) {
                Some(&seen) if seen == stamp => return true,
                Some(_) => return false,
                None => {}
            }
            stamps.insert(xid, stamp);
            let Some(uid) = self.waits_for.get(&xid) else {
                return false;
            };
            let Some(&holder) = self.holder.get(uid) else {
                return false;
            };
            xid = holder;
        }
    }
}

/// Per-record exclusive locks taken by deleting transactions.
#[derive(Debug, Default)]
pub struct LockTable {
    state: Mutex<LockState>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests `uid` for `xid`.
    ///
    /// Fails with [`DbError::Deadlock`] if waiting would close a cycle; the
    /// request is withdrawn and the caller is expected to abort `xid`.
    pub fn acquire(&self, xid: Xid, uid: Uid) -> DbResult<Acquire> {
        let mut state = self.state.lock();
        if state.held.get(&xid).is_some_and(|uids| uids.contains(&uid)) {
            return Ok(Acquire::Granted);
        }
        if !state.holder.contains_key(&uid) {
            state.grant(xid, uid);
            return Ok(Acquire::Granted);
        }

        state.waits_for.insert(xid, uid);
        state.waiters.entry(uid).or_default().push_back(xid);
        let handle = Arc::new(WaitHandle::default());
        state.handles.insert(xid, Arc::clone(&handle));

        if state.has_deadlock() {
            state.cancel_wait(xid);
            tracing::warn!(xid, uid, "lock.deadlock");
            return Err(DbError::Deadlock { xid, uid });
        }
        tracing::debug!(xid, uid, holder = ?state.holder.get(&uid), "lock.wait");
        Ok(Acquire::Wait(handle))
    }

    /// Releases everything `xid` holds, handing each record to its next waiter.
    pub fn release_all(&self, xid: Xid) {
        let mut state = self.state.lock();
        if let Some(uids) = state.held.remove(&xid) {
            for uid in uids {
                state.hand_off(uid);
            }
        }
        state.cancel_wait(xid);
    }

    /// Transaction currently holding `uid`.
    pub fn holder(&self, uid: Uid) -> Option<Xid> {
        self.state.lock().holder.get(&uid).copied()
    }

    /// Record `xid` is queued for, if any.
    pub fn waiting_on(&self, xid: Xid) -> Option<Uid> {
        self.state.lock().waits_for.get(&xid).copied()
    }
}

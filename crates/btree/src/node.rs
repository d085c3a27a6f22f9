//! On-disk B+Tree node.
//!
//! ```text
//! [leaf:1][count:2][sibling:8] then `count` slots of [uid:8][key:8]
//! ```
//!
//! In a leaf a slot pairs a row uid with its key. In an internal node key k
//! bounds the child at slot k from above: new keys below it go there, equal
//! keys go right. The last key of the rightmost node on a level is
//! [`KEY_INFINITY`].

use common::{DbError, DbResult, Uid};

/// Balance factor: nodes split when they reach `2 * BALANCE` slots.
pub const BALANCE: usize = 32;

pub const HEADER_LEN: usize = 11;
const SLOT_LEN: usize = 16;
/// One slot of headroom for the entry that triggers a split.
const SLOT_CAPACITY: usize = 2 * BALANCE + 2;
pub const NODE_SIZE: usize = HEADER_LEN + SLOT_CAPACITY * SLOT_LEN;

/// Sibling value of the rightmost node on a level.
pub const NO_SIBLING: Uid = 0;
pub const KEY_INFINITY: i64 = i64::MAX;

const LEAF_FLAG: u8 = 1;
const INTERNAL_FLAG: u8 = 0;

/// Where a descent continues after scanning one internal node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Next {
    Child(Uid),
    /// Every key here is at most the target; a concurrent split moved the
    /// range to the right.
    Sibling(Uid),
}

/// Leaf hits plus the sibling to continue with if the scan ran off the end.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RangeHits {
    pub uids: Vec<Uid>,
    pub sibling: Option<Uid>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub leaf: bool,
    pub sibling: Uid,
    pub slots: Vec<(Uid, i64)>,
}

impl Node {
    pub fn empty_leaf() -> Self {
        Self {
            leaf: true,
            sibling: NO_SIBLING,
            slots: Vec::new(),
        }
    }

    /// Internal root over two children split at `key`.
    pub fn root(left: Uid, right: Uid, key: i64) -> Self {
        Self {
            leaf: false,
            sibling: NO_SIBLING,
            slots: vec![(left, key), (right, KEY_INFINITY)],
        }
    }

    pub fn decode(uid: Uid, raw: &[u8]) -> DbResult<Self> {
        if raw.len() < HEADER_LEN {
            return Err(corrupt(uid, "header is truncated"));
        }
        let leaf = match raw[0] {
            LEAF_FLAG => true,
            INTERNAL_FLAG => false,
            other => return Err(corrupt(uid, &format!("unknown node flag {other}"))),
        };
        let count = u16::from_be_bytes([raw[1], raw[2]]) as usize;
        if count > SLOT_CAPACITY || raw.len() < HEADER_LEN + count * SLOT_LEN {
            return Err(corrupt(uid, &format!("{count} slots do not fit")));
        }
        let sibling = read_u64(&raw[3..HEADER_LEN]);
        let slots = raw[HEADER_LEN..HEADER_LEN + count * SLOT_LEN]
            .chunks_exact(SLOT_LEN)
            .map(|slot| (read_u64(&slot[..8]), read_u64(&slot[8..]) as i64))
            .collect();
        Ok(Self {
            leaf,
            sibling,
            slots,
        })
    }

    /// Fixed-size image, zero padded to [`NODE_SIZE`].
    pub fn encode(&self) -> Vec<u8> {
        let mut raw = Vec::with_capacity(NODE_SIZE);
        raw.push(if self.leaf { LEAF_FLAG } else { INTERNAL_FLAG });
        raw.extend_from_slice(&(self.slots.len() as u16).to_be_bytes());
        raw.extend_from_slice(&self.sibling.to_be_bytes());
        for (uid, key) in &self.slots {
            raw.extend_from_slice(&uid.to_be_bytes());
            raw.extend_from_slice(&key.to_be_bytes());
        }
        raw.resize(NODE_SIZE, 0);
        raw
    }

    fn sibling(&self) -> Option<Uid> {
        (self.sibling != NO_SIBLING).then_some(self.sibling)
    }

    /// Child of an internal node that a new `key` belongs under.
    pub fn search_next(&self, key: i64) -> Next {
        self.route(|k| k > key)
    }

    /// Leftmost child of an internal node that may hold `key`. Equal keys
    /// left of a split boundary stay reachable from here.
    pub fn search_first(&self, key: i64) -> Next {
        self.route(|k| k >= key)
    }

    fn route(&self, covers: impl Fn(i64) -> bool) -> Next {
        self.slots
            .iter()
            .find(|&&(_, k)| covers(k))
            .map_or(Next::Sibling(self.sibling), |&(uid, _)| Next::Child(uid))
    }

    /// Row uids of this leaf with keys in `lo..=hi`.
    pub fn search_range(&self, lo: i64, hi: i64) -> RangeHits {
        let start = self.slots.partition_point(|&(_, k)| k < lo);
        let hits = self.slots[start..]
            .iter()
            .take_while(|&&(_, k)| k <= hi)
            .map(|&(uid, _)| uid)
            .collect::<Vec<_>>();
        let exhausted = start + hits.len() == self.slots.len();
        RangeHits {
            uids: hits,
            sibling: if exhausted { self.sibling() } else { None },
        }
    }

    /// Inserts `(uid, key)` in order.
    ///
    /// Returns `false` when `key` is past every slot and the node has a right
    /// sibling, in which case the pair belongs further right.
    pub fn insert(&mut self, uid: Uid, key: i64) -> DbResult<bool> {
        let at = self.slots.partition_point(|&(_, k)| k < key);
        if at == self.slots.len() && self.sibling().is_some() {
            return Ok(false);
        }
        if self.leaf {
            self.slots.insert(at, (uid, key));
            return Ok(true);
        }
        // The split child keeps its slot under the new, smaller bound and the
        // new child takes over the old bound.
        let Some(&(_, bound)) = self.slots.get(at) else {
            return Err(DbError::Corruption(format!(
                "rightmost internal node has no bound above key {key}"
            )));
        };
        self.slots[at].1 = key;
        self.slots.insert(at + 1, (uid, bound));
        Ok(true)
    }

    pub fn needs_split(&self) -> bool {
        self.slots.len() >= 2 * BALANCE
    }

    /// Moves the upper half into a new right node that inherits this node's
    /// sibling. The caller stores it and points `sibling` at it.
    ///
    /// Returns the right node and the separator the parent must file it under.
    pub fn split(&mut self) -> (Node, i64) {
        let upper = self.slots.split_off(BALANCE);
        let separator = if self.leaf {
            upper[0].1
        } else {
            self.slots[BALANCE - 1].1
        };
        let right = Node {
            leaf: self.leaf,
            sibling: self.sibling,
            slots: upper,
        };
        (right, separator)
    }
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_be_bytes(buf)
}

fn corrupt(uid: Uid, what: &str) -> DbError {
    DbError::Corruption(format!("b+tree node {uid:#x}: {what}"))
}

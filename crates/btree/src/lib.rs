//! Disk-resident B+Tree over signed 64-bit keys.
//!
//! Every node is one record in the [`DataStore`], written by the super
//! transaction so index maintenance never takes part in row visibility. The
//! tree handle is the uid of a small "root cell" record holding the current
//! root's uid, so growing a new root is a single logged write.
//!
//! Readers take no locks across levels. A node that was split after its
//! parent was read still links to its new right half, so a search that finds
//! nothing in a node follows the sibling chain instead of starting over.
//!
//! Duplicate keys are accepted. Inserts descend to the rightmost child that
//! can take a key while searches start at the leftmost one and scan forward,
//! so a run of equal keys split across leaves is still found whole.


mod node;

pub use node::{BALANCE, KEY_INFINITY, NODE_SIZE, NO_SIBLING, Next, Node, RangeHits};

use common::{DbError, DbResult, SUPER_XID, Uid};
use datastore::{DataItem, DataStore};
use parking_lot::Mutex;
use std::sync::Arc;

/// Result of offering a pair to one node.
enum Placement {
    Inserted(Option<(Uid, i64)>),
    MoveRight(Uid),
}

/// Handle to one index.
pub struct BPlusTree {
    ds: Arc<DataStore>,
    root_cell: Arc<DataItem>,
    root_lock: Mutex<()>,
}

impl BPlusTree {
    /// Writes an empty tree and returns its root cell uid.
    pub fn create(ds: &DataStore) -> DbResult<Uid> {
        let leaf = ds.insert(SUPER_XID, &Node::empty_leaf().encode())?;
        let cell = ds.insert(SUPER_XID, &leaf.to_be_bytes())?;
        tracing::debug!(cell, root = leaf, "btree.create");
        Ok(cell)
    }

    /// Attaches to the tree whose root cell is `root_cell`.
    pub fn load(ds: Arc<DataStore>, root_cell: Uid) -> DbResult<Self> {
        let Some(cell) = ds.read(root_cell)? else {
            return Err(DbError::Index(format!("no index root at {root_cell:#x}")));
        };
        if cell.size() != 8 {
            let size = cell.size();
            ds.release(&cell)?;
            return Err(DbError::Index(format!(
                "record {root_cell:#x} is {size} bytes, not an index root"
            )));
        }
        Ok(Self {
            ds,
            root_cell: cell,
            root_lock: Mutex::new(()),
        })
    }

    pub fn root_cell(&self) -> Uid {
        self.root_cell.uid()
    }

    fn root(&self) -> Uid {
        let _guard = self.root_lock.lock();
        let raw = self.root_cell.data();
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&raw[..8]);
        Uid::from_be_bytes(buf)
    }

    fn node(&self, uid: Uid) -> DbResult<Node> {
        let Some(item) = self.ds.read(uid)? else {
            return Err(DbError::Corruption(format!(
                "b+tree node {uid:#x} is missing"
            )));
        };
        let node = Node::decode(uid, &item.data());
        self.ds.release(&item)?;
        node
    }

    /// Child of internal node `uid` picked by `route`, following siblings.
    fn next_child(
        &self,
        mut uid: Uid,
        mut node: Node,
        key: i64,
        route: fn(&Node, i64) -> Next,
    ) -> DbResult<Uid> {
        loop {
            match route(&node, key) {
                Next::Child(child) => return Ok(child),
                Next::Sibling(NO_SIBLING) => {
                    return Err(DbError::Corruption(format!(
                        "b+tree node {uid:#x} has no child for key {key}"
                    )));
                }
                Next::Sibling(sibling) => {
                    uid = sibling;
                    node = self.node(uid)?;
                }
            }
        }
    }

    fn find_leaf(&self, key: i64) -> DbResult<Uid> {
        let mut uid = self.root();
        loop {
            let node = self.node(uid)?;
            if node.leaf {
                return Ok(uid);
            }
            uid = self.next_child(uid, node, key, Node::search_first)?;
        }
    }

    /// Row uids stored under exactly `key`.
    pub fn search(&self, key: i64) -> DbResult<Vec<Uid>> {
        self.search_range(key, key)
    }

    /// Row uids with keys in `lo..=hi`, in key order.
    pub fn search_range(&self, lo: i64, hi: i64) -> DbResult<Vec<Uid>> {
        let mut uids = Vec::new();
        if lo > hi {
            return Ok(uids);
        }
        let mut leaf = self.find_leaf(lo)?;
        loop {
            let hits = self.node(leaf)?.search_range(lo, hi);
            uids.extend(hits.uids);
            match hits.sibling {
                Some(next) => leaf = next,
                None => return Ok(uids),
            }
        }
    }

    /// Indexes row `uid` under `key`.
    pub fn insert(&self, uid: Uid, key: i64) -> DbResult<()> {
        let root = self.root();
        if let Some((right, separator)) = self.insert_below(root, uid, key)? {
            self.grow(root, right, separator)?;
        }
        Ok(())
    }

    /// Inserts into the subtree at `node_uid`; returns the split that the
    /// caller must file one level up.
    fn insert_below(&self, node_uid: Uid, uid: Uid, key: i64) -> DbResult<Option<(Uid, i64)>> {
        let node = self.node(node_uid)?;
        if node.leaf {
            return self.insert_and_split(node_uid, uid, key);
        }
        let child = self.next_child(node_uid, node, key, Node::search_next)?;
        match self.insert_below(child, uid, key)? {
            Some((right, separator)) => self.insert_and_split(node_uid, right, separator),
            None => Ok(None),
        }
    }

    fn insert_and_split(
        &self,
        mut node_uid: Uid,
        uid: Uid,
        key: i64,
    ) -> DbResult<Option<(Uid, i64)>> {
        loop {
            let Some(item) = self.ds.read(node_uid)? else {
                return Err(DbError::Corruption(format!(
                    "b+tree node {node_uid:#x} is missing"
                )));
            };
            let placed = self.place(&item, uid, key);
            self.ds.release(&item)?;
            match placed? {
                Placement::Inserted(split) => return Ok(split),
                Placement::MoveRight(sibling) => node_uid = sibling,
            }
        }
    }

    fn place(&self, item: &DataItem, uid: Uid, key: i64) -> DbResult<Placement> {
        let mut guard = item.before_modify();
        let mut node = Node::decode(item.uid(), &guard.data())?;
        if !node.insert(uid, key)? {
            guard.rollback();
            return Ok(Placement::MoveRight(node.sibling));
        }

        let split = if node.needs_split() {
            let (right, separator) = node.split();
            let right_uid = self.ds.insert(SUPER_XID, &right.encode())?;
            node.sibling = right_uid;
            tracing::debug!(
                node = item.uid(),
                right = right_uid,
                separator,
                "btree.split"
            );
            Some((right_uid, separator))
        } else {
            None
        };

        guard.write(0, &node.encode());
        guard.after_modify(SUPER_XID)?;
        Ok(Placement::Inserted(split))
    }

    /// Replaces the root after it split into `old_root` and `right`.
    fn grow(&self, old_root: Uid, right: Uid, separator: i64) -> DbResult<()> {
        let _guard = self.root_lock.lock();
        let new_root = self
            .ds
            .insert(SUPER_XID, &Node::root(old_root, right, separator).encode())?;
        let mut cell = self.root_cell.before_modify();
        cell.write(0, &new_root.to_be_bytes());
        cell.after_modify(SUPER_XID)?;
        tracing::debug!(root = new_root, separator, "btree.new_root");
        Ok(())
    }

    /// Releases the pinned root cell.
    pub fn close(&self) -> DbResult<()> {
        self.ds.release(&self.root_cell)
    }
}

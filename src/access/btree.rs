//! In-memory B+ tree secondary index.
//!
//! Maps a column value to the RecordIds carrying it. The tree lives outside
//! the durability boundary: it is rebuilt from the heap on restart and is
//! never page-backed. Nodes live in an arena and refer to each other by
//! index, so there are no ownership cycles.

use crate::access::tuple::RecordId;
use crate::access::value::Value;
use std::cmp::Ordering;

/// Maximum key count per node before a split is triggered.
pub const DEFAULT_ORDER: usize = 4;

type NodeId = usize;

/// A non-null value usable as an index key. Nulls are never indexed.
///
/// Ordering is total: values of different kinds order by kind (int, then
/// string, then bool), values of the same kind by their natural order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key(Value);

impl Key {
    pub fn from_value(value: &Value) -> Option<Self> {
        if value.is_null() {
            None
        } else {
            Some(Key(value.clone()))
        }
    }

    fn rank(&self) -> u8 {
        match self.0 {
            Value::Null => unreachable!("null keys are rejected at construction"),
            Value::Int32(_) => 0,
            Value::String(_) => 1,
            Value::Boolean(_) => 2,
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.0, &other.0) {
            (Value::Int32(a), Value::Int32(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

struct InternalNode {
    keys: Vec<Key>,
    // children.len() == keys.len() + 1
    children: Vec<NodeId>,
}

struct LeafNode {
    keys: Vec<Key>,
    // One RecordId list per key, supporting duplicates.
    values: Vec<Vec<RecordId>>,
    next: Option<NodeId>,
}

enum Node {
    Internal(InternalNode),
    Leaf(LeafNode),
}

/// Order-N B+ tree over one indexed column.
pub struct BPlusTree {
    column_name: String,
    order: usize,
    nodes: Vec<Node>,
    root: NodeId,
}

impl BPlusTree {
    pub fn new(column_name: impl Into<String>) -> Self {
        Self::with_order(column_name, DEFAULT_ORDER)
    }

    pub fn with_order(column_name: impl Into<String>, order: usize) -> Self {
        assert!(order >= 3, "B+ tree order must be at least 3");
        let root = Node::Leaf(LeafNode {
            keys: Vec::new(),
            values: Vec::new(),
            next: None,
        });
        Self {
            column_name: column_name.into(),
            order,
            nodes: vec![root],
            root: 0,
        }
    }

    pub fn column_name(&self) -> &str {
        &self.column_name
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Insert `rid` under `key`. Null keys are silently skipped.
    pub fn insert(&mut self, key: &Value, rid: RecordId) {
        let Some(key) = Key::from_value(key) else {
            return;
        };

        if let Some((separator, right)) = self.insert_rec(self.root, key, rid) {
            let old_root = self.root;
            self.root = self.alloc(Node::Internal(InternalNode {
                keys: vec![separator],
                children: vec![old_root, right],
            }));
        }
    }

    /// Exact-match lookup. Empty for absent or null keys.
    pub fn search(&self, key: &Value) -> Vec<RecordId> {
        let Some(key) = Key::from_value(key) else {
            return Vec::new();
        };

        let leaf = self.find_leaf(&key);
        match &self.nodes[leaf] {
            Node::Leaf(node) => node
                .keys
                .iter()
                .position(|k| *k == key)
                .map(|i| node.values[i].clone())
                .unwrap_or_default(),
            Node::Internal(_) => unreachable!("find_leaf returns a leaf"),
        }
    }

    /// All RecordIds with `min <= key <= max`, walking the leaf chain.
    pub fn range_search(&self, min: &Value, max: &Value) -> Vec<RecordId> {
        let (Some(min), Some(max)) = (Key::from_value(min), Key::from_value(max)) else {
            return Vec::new();
        };

        let mut results = Vec::new();
        let mut current = Some(self.find_leaf(&min));

        while let Some(leaf_id) = current {
            let Node::Leaf(leaf) = &self.nodes[leaf_id] else {
                unreachable!("leaf chain only links leaves");
            };
            for (i, key) in leaf.keys.iter().enumerate() {
                if *key > max {
                    return results;
                }
                if *key >= min {
                    results.extend_from_slice(&leaf.values[i]);
                }
            }
            current = leaf.next;
        }

        results
    }

    /// Remove `rid` from `key`'s value list; the key itself disappears when
    /// its list empties. Nodes are never merged or rebalanced on delete;
    /// the tree shrinks only in key count.
    pub fn delete(&mut self, key: &Value, rid: RecordId) {
        let Some(key) = Key::from_value(key) else {
            return;
        };

        let leaf_id = self.find_leaf(&key);
        let Node::Leaf(leaf) = &mut self.nodes[leaf_id] else {
            unreachable!("find_leaf returns a leaf");
        };
        if let Some(i) = leaf.keys.iter().position(|k| *k == key) {
            leaf.values[i].retain(|r| *r != rid);
            if leaf.values[i].is_empty() {
                leaf.keys.remove(i);
                leaf.values.remove(i);
            }
        }
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Descend to the leaf that would hold `key`: at each internal node,
    /// take the first child whose separator exceeds the key.
    fn find_leaf(&self, key: &Key) -> NodeId {
        let mut current = self.root;
        loop {
            match &self.nodes[current] {
                Node::Leaf(_) => return current,
                Node::Internal(node) => {
                    let idx = node
                        .keys
                        .iter()
                        .position(|k| key < k)
                        .unwrap_or(node.keys.len());
                    current = node.children[idx];
                }
            }
        }
    }

    /// Recursive insert. Returns `Some((separator, new_right_node))` when
    /// the visited node split.
    fn insert_rec(&mut self, node_id: NodeId, key: Key, rid: RecordId) -> Option<(Key, NodeId)> {
        let child = match &self.nodes[node_id] {
            Node::Leaf(_) => None,
            Node::Internal(node) => {
                let idx = node
                    .keys
                    .iter()
                    .position(|k| key < *k)
                    .unwrap_or(node.keys.len());
                Some((idx, node.children[idx]))
            }
        };

        match child {
            None => self.insert_into_leaf(node_id, key, rid),
            Some((idx, child_id)) => {
                let split = self.insert_rec(child_id, key, rid)?;
                self.insert_into_internal(node_id, idx, split)
            }
        }
    }

    fn insert_into_leaf(&mut self, leaf_id: NodeId, key: Key, rid: RecordId) -> Option<(Key, NodeId)> {
        let split = {
            let Node::Leaf(leaf) = &mut self.nodes[leaf_id] else {
                unreachable!();
            };

            if let Some(i) = leaf.keys.iter().position(|k| *k == key) {
                leaf.values[i].push(rid);
            } else {
                let idx = leaf
                    .keys
                    .iter()
                    .position(|k| key < *k)
                    .unwrap_or(leaf.keys.len());
                leaf.keys.insert(idx, key);
                leaf.values.insert(idx, vec![rid]);
            }

            if leaf.keys.len() < self.order {
                return None;
            }

            let mid = leaf.keys.len() / 2;
            let keys = leaf.keys.split_off(mid);
            let values = leaf.values.split_off(mid);
            let next = leaf.next.take();
            (keys, values, next)
        };

        let (keys, values, next) = split;
        let separator = keys[0].clone();
        let new_leaf = self.alloc(Node::Leaf(LeafNode { keys, values, next }));

        let Node::Leaf(leaf) = &mut self.nodes[leaf_id] else {
            unreachable!();
        };
        leaf.next = Some(new_leaf);

        Some((separator, new_leaf))
    }

    fn insert_into_internal(
        &mut self,
        node_id: NodeId,
        child_idx: usize,
        split: (Key, NodeId),
    ) -> Option<(Key, NodeId)> {
        let (separator, new_child) = split;

        let overflow = {
            let Node::Internal(node) = &mut self.nodes[node_id] else {
                unreachable!();
            };
            node.keys.insert(child_idx, separator);
            node.children.insert(child_idx + 1, new_child);

            if node.keys.len() < self.order {
                return None;
            }

            // Split around the middle key, which moves up to the parent.
            let mid = node.keys.len() / 2;
            let right_keys = node.keys.split_off(mid + 1);
            let push_up = node.keys.pop().expect("mid key exists");
            let right_children = node.children.split_off(mid + 1);
            (push_up, right_keys, right_children)
        };

        let (push_up, right_keys, right_children) = overflow;
        let right = self.alloc(Node::Internal(InternalNode {
            keys: right_keys,
            children: right_children,
        }));

        Some((push_up, right))
    }

    /// Leftmost-to-rightmost walk of the leaf chain; used by tests to check
    /// ordering invariants.
    #[cfg(test)]
    fn leaf_keys(&self) -> Vec<Key> {
        let mut current = self.root;
        loop {
            match &self.nodes[current] {
                Node::Internal(node) => current = node.children[0],
                Node::Leaf(_) => break,
            }
        }

        let mut keys = Vec::new();
        let mut next = Some(current);
        while let Some(leaf_id) = next {
            let Node::Leaf(leaf) = &self.nodes[leaf_id] else {
                unreachable!();
            };
            keys.extend(leaf.keys.iter().cloned());
            next = leaf.next;
        }
        keys
    }
}

//! Adaptive radix tree
//!
//! Byte-keyed radix tree whose inner nodes grow through 4, 16, 48 and 256
//! child slots and shrink back as children are removed. Single-child chains
//! are collapsed into a compressed `prefix`. Leaves keep the full key, so a
//! lookup only has to compare the leaf it lands on.
//!
//! A key that ends exactly at an inner node (a prefix of other keys) is stored
//! as that node's `terminal` leaf, which sorts before all of its children.

use std::mem;

/// Ordered map from byte strings to `V`
pub struct AdaptiveRadixTree<V> {
    root: Option<Node<V>>,
    len: usize,
}

enum Node<V> {
    Leaf(Box<Leaf<V>>),
    Inner(Box<Inner<V>>),
}

struct Leaf<V> {
    key: Vec<u8>,
    value: V,
}

struct Inner<V> {
    /// Compressed path shared by everything below this node
    prefix: Vec<u8>,
    terminal: Option<Box<Leaf<V>>>,
    children: Children<V>,
}

impl<V> Inner<V> {
    fn new(prefix: Vec<u8>) -> Self {
        Self {
            prefix,
            terminal: None,
            children: Children::Node4(SortedNode::new()),
        }
    }

    /// Hang `leaf` below this node, whose subtree starts at `depth`
    fn attach_leaf(&mut self, leaf: Box<Leaf<V>>, depth: usize) {
        if leaf.key.len() == depth {
            self.terminal = Some(leaf);
        } else {
            let byte = leaf.key[depth];
            self.children.add(byte, Node::Leaf(leaf));
        }
    }
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

impl<V> Default for AdaptiveRadixTree<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> AdaptiveRadixTree<V> {
    pub fn new() -> Self {
        Self { root: None, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, key: &[u8]) -> Option<&V> {
        let mut node = self.root.as_ref()?;
        let mut depth = 0;
        loop {
            match node {
                Node::Leaf(leaf) => return (leaf.key == key).then_some(&leaf.value),
                Node::Inner(inner) => {
                    if !key[depth..].starts_with(&inner.prefix) {
                        return None;
                    }
                    depth += inner.prefix.len();
                    if depth == key.len() {
                        return inner.terminal.as_ref().map(|leaf| &leaf.value);
                    }
                    node = inner.children.find(key[depth])?;
                    depth += 1;
                }
            }
        }
    }

    /// Insert or replace; returns the previous value
    pub fn insert(&mut self, key: Vec<u8>, value: V) -> Option<V> {
        let old = match self.root.as_mut() {
            Some(root) => Self::insert_at(root, key, value, 0),
            None => {
                self.root = Some(Node::Leaf(Box::new(Leaf { key, value })));
                None
            }
        };
        if old.is_none() {
            self.len += 1;
        }
        old
    }

    fn insert_at(node: &mut Node<V>, key: Vec<u8>, value: V, depth: usize) -> Option<V> {
        match node {
            Node::Leaf(leaf) => {
                if leaf.key == key {
                    return Some(mem::replace(&mut leaf.value, value));
                }
                // Two distinct keys: branch where they diverge
                let split_depth = depth + common_prefix_len(&leaf.key[depth..], &key[depth..]);
                let mut inner = Box::new(Inner::new(key[depth..split_depth].to_vec()));
                inner.attach_leaf(Box::new(Leaf { key, value }), split_depth);

                let old = mem::replace(node, Node::Inner(inner));
                if let (Node::Inner(inner), Node::Leaf(existing)) = (node, old) {
                    inner.attach_leaf(existing, split_depth);
                }
                None
            }
            Node::Inner(inner) => {
                let matched = common_prefix_len(&inner.prefix, &key[depth..]);
                if matched < inner.prefix.len() {
                    // Split the compressed path at the first mismatch
                    let branch = inner.prefix[matched];
                    let mut parent = Box::new(Inner::new(inner.prefix[..matched].to_vec()));
                    inner.prefix.drain(..=matched);
                    parent.attach_leaf(Box::new(Leaf { key, value }), depth + matched);

                    let old = mem::replace(node, Node::Inner(parent));
                    if let Node::Inner(parent) = node {
                        parent.children.add(branch, old);
                    }
                    return None;
                }

                let depth = depth + inner.prefix.len();
                if depth == key.len() {
                    if let Some(leaf) = inner.terminal.as_mut() {
                        return Some(mem::replace(&mut leaf.value, value));
                    }
                    inner.terminal = Some(Box::new(Leaf { key, value }));
                    return None;
                }

                let byte = key[depth];
                match inner.children.find_mut(byte) {
                    Some(child) => Self::insert_at(child, key, value, depth + 1),
                    None => {
                        inner
                            .children
                            .add(byte, Node::Leaf(Box::new(Leaf { key, value })));
                        None
                    }
                }
            }
        }
    }

    /// Remove `key`; returns its value if it was present
    pub fn remove(&mut self, key: &[u8]) -> Option<V> {
        let removed = match self.root.as_mut()? {
            Node::Leaf(leaf) => {
                if leaf.key != key {
                    return None;
                }
                match self.root.take() {
                    Some(Node::Leaf(leaf)) => Some(leaf.value),
                    _ => None,
                }
            }
            Node::Inner(inner) => {
                let removed = Self::remove_in(inner, key, 0);
                if removed.is_some() {
                    self.root = self.root.take().and_then(Self::compact);
                }
                removed
            }
        };
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    fn remove_in(inner: &mut Inner<V>, key: &[u8], depth: usize) -> Option<V> {
        if !key[depth..].starts_with(&inner.prefix) {
            return None;
        }
        let depth = depth + inner.prefix.len();
        if depth == key.len() {
            return inner.terminal.take().map(|leaf| leaf.value);
        }

        let byte = key[depth];
        let removed = match inner.children.find_mut(byte)? {
            Node::Leaf(leaf) => {
                if leaf.key != key {
                    return None;
                }
                match inner.children.remove(byte) {
                    Some(Node::Leaf(leaf)) => leaf.value,
                    _ => return None,
                }
            }
            Node::Inner(child) => {
                let removed = Self::remove_in(child, key, depth + 1)?;
                if let Some(child) = inner.children.remove(byte) {
                    if let Some(child) = Self::compact(child) {
                        inner.children.add(byte, child);
                    }
                }
                removed
            }
        };
        inner.children.shrink();
        Some(removed)
    }

    /// Collapse an inner node left with at most one entry
    fn compact(node: Node<V>) -> Option<Node<V>> {
        let mut inner = match node {
            leaf @ Node::Leaf(_) => return Some(leaf),
            Node::Inner(inner) => inner,
        };
        match (inner.children.len(), inner.terminal.is_some()) {
            (0, false) => None,
            (0, true) => inner.terminal.take().map(Node::Leaf),
            (1, false) => {
                let (byte, child) = inner.children.take_single()?;
                match child {
                    leaf @ Node::Leaf(_) => Some(leaf),
                    Node::Inner(mut child) => {
                        let mut prefix = mem::take(&mut inner.prefix);
                        prefix.push(byte);
                        prefix.extend_from_slice(&child.prefix);
                        child.prefix = prefix;
                        Some(Node::Inner(child))
                    }
                }
            }
            _ => Some(Node::Inner(inner)),
        }
    }

    /// Visit every entry in ascending key order
    pub fn for_each<F: FnMut(&[u8], &V)>(&self, mut visit: F) {
        if let Some(root) = &self.root {
            Self::walk(root, &mut visit);
        }
    }

    fn walk<F: FnMut(&[u8], &V)>(node: &Node<V>, visit: &mut F) {
        match node {
            Node::Leaf(leaf) => visit(&leaf.key, &leaf.value),
            Node::Inner(inner) => {
                if let Some(leaf) = &inner.terminal {
                    visit(&leaf.key, &leaf.value);
                }
                for child in inner.children.ordered() {
                    Self::walk(child, visit);
                }
            }
        }
    }
}

// =============================================================================
// Child Containers
// =============================================================================

/// Node4 / Node16: parallel arrays kept sorted by key byte
struct SortedNode<V, const N: usize> {
    keys: [u8; N],
    slots: [Option<Node<V>>; N],
    len: usize,
}

impl<V, const N: usize> SortedNode<V, N> {
    fn new() -> Self {
        Self {
            keys: [0; N],
            slots: std::array::from_fn(|_| None),
            len: 0,
        }
    }

    fn position(&self, byte: u8) -> Option<usize> {
        self.keys[..self.len].iter().position(|&k| k == byte)
    }

    fn insert(&mut self, byte: u8, node: Node<V>) {
        let at = self.keys[..self.len].partition_point(|&k| k < byte);
        for i in (at..self.len).rev() {
            self.keys[i + 1] = self.keys[i];
            self.slots[i + 1] = self.slots[i].take();
        }
        self.keys[at] = byte;
        self.slots[at] = Some(node);
        self.len += 1;
    }

    fn remove(&mut self, byte: u8) -> Option<Node<V>> {
        let at = self.position(byte)?;
        let node = self.slots[at].take();
        for i in at..self.len - 1 {
            self.keys[i] = self.keys[i + 1];
            self.slots[i] = self.slots[i + 1].take();
        }
        self.len -= 1;
        node
    }

    fn into_entries(self) -> Vec<(u8, Node<V>)> {
        let keys = self.keys;
        self.slots
            .into_iter()
            .take(self.len)
            .enumerate()
            .filter_map(|(i, slot)| slot.map(|node| (keys[i], node)))
            .collect()
    }
}

/// Node48: 256-entry byte map into 48 slots (0 = empty, else slot + 1)
struct IndexedNode<V> {
    index: [u8; 256],
    slots: Box<[Option<Node<V>>; 48]>,
    len: usize,
}

impl<V> IndexedNode<V> {
    fn new() -> Self {
        Self {
            index: [0; 256],
            slots: Box::new(std::array::from_fn(|_| None)),
            len: 0,
        }
    }

    fn insert(&mut self, byte: u8, node: Node<V>) {
        if let Some(free) = self.slots.iter().position(Option::is_none) {
            self.slots[free] = Some(node);
            self.index[byte as usize] = free as u8 + 1;
            self.len += 1;
        }
    }

    fn remove(&mut self, byte: u8) -> Option<Node<V>> {
        let slot = self.index[byte as usize];
        if slot == 0 {
            return None;
        }
        self.index[byte as usize] = 0;
        self.len -= 1;
        self.slots[slot as usize - 1].take()
    }

    fn into_entries(mut self) -> Vec<(u8, Node<V>)> {
        let mut entries = Vec::with_capacity(self.len);
        for byte in 0..=255u8 {
            let slot = self.index[byte as usize];
            if slot != 0 {
                if let Some(node) = self.slots[slot as usize - 1].take() {
                    entries.push((byte, node));
                }
            }
        }
        entries
    }
}

/// Node256: direct byte-indexed slots
struct DirectNode<V> {
    slots: Box<[Option<Node<V>>; 256]>,
    len: usize,
}

impl<V> DirectNode<V> {
    fn new() -> Self {
        Self {
            slots: Box::new(std::array::from_fn(|_| None)),
            len: 0,
        }
    }

    fn into_entries(self) -> Vec<(u8, Node<V>)> {
        self.slots
            .into_iter()
            .enumerate()
            .filter_map(|(byte, slot)| slot.map(|node| (byte as u8, node)))
            .collect()
    }
}

enum Children<V> {
    Node4(SortedNode<V, 4>),
    Node16(SortedNode<V, 16>),
    Node48(IndexedNode<V>),
    Node256(DirectNode<V>),
}

impl<V> Children<V> {
    fn len(&self) -> usize {
        match self {
            Children::Node4(n) => n.len,
            Children::Node16(n) => n.len,
            Children::Node48(n) => n.len,
            Children::Node256(n) => n.len,
        }
    }

    fn is_full(&self) -> bool {
        match self {
            Children::Node4(n) => n.len == 4,
            Children::Node16(n) => n.len == 16,
            Children::Node48(n) => n.len == 48,
            Children::Node256(_) => false,
        }
    }

    fn find(&self, byte: u8) -> Option<&Node<V>> {
        match self {
            Children::Node4(n) => n.position(byte).and_then(|i| n.slots[i].as_ref()),
            Children::Node16(n) => n.position(byte).and_then(|i| n.slots[i].as_ref()),
            Children::Node48(n) => match n.index[byte as usize] {
                0 => None,
                slot => n.slots[slot as usize - 1].as_ref(),
            },
            Children::Node256(n) => n.slots[byte as usize].as_ref(),
        }
    }

    fn find_mut(&mut self, byte: u8) -> Option<&mut Node<V>> {
        match self {
            Children::Node4(n) => n.position(byte).and_then(|i| n.slots[i].as_mut()),
            Children::Node16(n) => n.position(byte).and_then(|i| n.slots[i].as_mut()),
            Children::Node48(n) => match n.index[byte as usize] {
                0 => None,
                slot => n.slots[slot as usize - 1].as_mut(),
            },
            Children::Node256(n) => n.slots[byte as usize].as_mut(),
        }
    }

    /// Add a child for a byte that has none yet, growing when full
    fn add(&mut self, byte: u8, node: Node<V>) {
        if self.is_full() {
            self.grow();
        }
        match self {
            Children::Node4(n) => n.insert(byte, node),
            Children::Node16(n) => n.insert(byte, node),
            Children::Node48(n) => n.insert(byte, node),
            Children::Node256(n) => {
                n.slots[byte as usize] = Some(node);
                n.len += 1;
            }
        }
    }

    fn remove(&mut self, byte: u8) -> Option<Node<V>> {
        match self {
            Children::Node4(n) => n.remove(byte),
            Children::Node16(n) => n.remove(byte),
            Children::Node48(n) => n.remove(byte),
            Children::Node256(n) => {
                let node = n.slots[byte as usize].take();
                if node.is_some() {
                    n.len -= 1;
                }
                node
            }
        }
    }

    fn take_entries(&mut self) -> Vec<(u8, Node<V>)> {
        match mem::replace(self, Children::Node4(SortedNode::new())) {
            Children::Node4(n) => n.into_entries(),
            Children::Node16(n) => n.into_entries(),
            Children::Node48(n) => n.into_entries(),
            Children::Node256(n) => n.into_entries(),
        }
    }

    fn take_single(&mut self) -> Option<(u8, Node<V>)> {
        if self.len() != 1 {
            return None;
        }
        self.take_entries().pop()
    }

    fn grow(&mut self) {
        let grown = match self {
            Children::Node4(_) => Children::Node16(SortedNode::new()),
            Children::Node16(_) => Children::Node48(IndexedNode::new()),
            Children::Node48(_) | Children::Node256(_) => Children::Node256(DirectNode::new()),
        };
        self.rebuild(grown);
    }

    /// Move to a smaller container once well below capacity
    fn shrink(&mut self) {
        let smaller = match self {
            Children::Node16(n) if n.len <= 3 => Children::Node4(SortedNode::new()),
            Children::Node48(n) if n.len <= 12 => Children::Node16(SortedNode::new()),
            Children::Node256(n) if n.len <= 37 => Children::Node48(IndexedNode::new()),
            _ => return,
        };
        self.rebuild(smaller);
    }

    fn rebuild(&mut self, mut target: Children<V>) {
        for (byte, node) in self.take_entries() {
            match &mut target {
                Children::Node4(n) => n.insert(byte, node),
                Children::Node16(n) => n.insert(byte, node),
                Children::Node48(n) => n.insert(byte, node),
                Children::Node256(n) => {
                    n.slots[byte as usize] = Some(node);
                    n.len += 1;
                }
            }
        }
        *self = target;
    }

    /// Children in ascending byte order
    fn ordered(&self) -> Vec<&Node<V>> {
        match self {
            Children::Node4(n) => n.slots[..n.len].iter().flatten().collect(),
            Children::Node16(n) => n.slots[..n.len].iter().flatten().collect(),
            Children::Node48(n) => n
                .index
                .iter()
                .filter(|&&slot| slot != 0)
                .filter_map(|&slot| n.slots[slot as usize - 1].as_ref())
                .collect(),
            Children::Node256(n) => n.slots.iter().flatten().collect(),
        }
    }
}

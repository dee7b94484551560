//! A generic prefix trie keyed by path segments.
//!
//! `PathTrie<V>` stores at most one value per node. Nodes are addressed by
//! the segments a [`Segmenter`] produces for a key, so operations are O(k)
//! in the number of segments. The trie does no locking of its own.

use std::collections::BTreeMap;
use std::ops::ControlFlow;

use crate::segment::{Segmenter, Segments, path_segmenter};

#[derive(Debug, Clone)]
struct Node<V> {
    value: Option<V>,
    children: BTreeMap<String, Node<V>>,
}

impl<V> Default for Node<V> {
    fn default() -> Self {
        Self {
            value: None,
            children: BTreeMap::new(),
        }
    }
}

impl<V> Node<V> {
    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    fn count_values(&self) -> usize {
        let own = usize::from(self.value.is_some());
        own + self.children.values().map(Node::count_values).sum::<usize>()
    }

    fn count_nodes(&self) -> usize {
        self.children.len() + self.children.values().map(Node::count_nodes).sum::<usize>()
    }
}

/// A prefix trie keyed by path segments.
///
/// # Example
///
/// ```rust
/// use mountfs_trie::PathTrie;
///
/// let mut trie: PathTrie<i32> = PathTrie::new();
/// trie.put("/a/b", 1);
/// trie.put("/a/b/c", 2);
///
/// // get() stops at the deepest node that exists.
/// assert_eq!(trie.get("/a/b/c/d"), (Some(&2), "d"));
/// assert_eq!(trie.get_exact("/a/b"), Some(&1));
/// ```
#[derive(Debug, Clone)]
pub struct PathTrie<V> {
    root: Node<V>,
    segmenter: Segmenter,
}

impl<V> Default for PathTrie<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> PathTrie<V> {
    /// Create an empty trie using [`path_segmenter`].
    pub fn new() -> Self {
        Self::with_segmenter(path_segmenter)
    }

    /// Create an empty trie with a custom segmenter.
    pub fn with_segmenter(segmenter: Segmenter) -> Self {
        Self {
            root: Node::default(),
            segmenter,
        }
    }

    /// The segmenter this trie splits keys with.
    pub fn segmenter(&self) -> Segmenter {
        self.segmenter
    }

    fn segments<'k>(&self, key: &'k str) -> Segments<'k> {
        Segments::new(key, self.segmenter)
    }

    /// Insert `value` at `key`, replacing any existing value.
    ///
    /// Returns `true` if the node had no value before.
    pub fn put(&mut self, key: &str, value: V) -> bool {
        let mut node = &mut self.root;
        for (segment, _) in Segments::new(key, self.segmenter) {
            node = node.children.entry(segment.to_owned()).or_default();
        }
        node.value.replace(value).is_none()
    }

    /// Walk as deep as the key's segments exist and return the value of the
    /// deepest node reached together with the unmatched tail of the key.
    ///
    /// The returned value is `None` when that node is an intermediate node.
    /// If not even the first segment exists, returns `(None, "")`.
    pub fn get<'k>(&self, key: &'k str) -> (Option<&V>, &'k str) {
        let mut node = &self.root;
        let mut reached = None;
        for (segment, end) in self.segments(key) {
            match node.children.get(segment) {
                Some(child) => {
                    node = child;
                    reached = Some(end);
                }
                None => break,
            }
        }
        match reached {
            Some(end) => (node.value.as_ref(), strip_separator(&key[end..])),
            None => (None, ""),
        }
    }

    /// Value stored at exactly `key`.
    pub fn get_exact(&self, key: &str) -> Option<&V> {
        let mut node = &self.root;
        for (segment, _) in self.segments(key) {
            node = node.children.get(segment)?;
        }
        node.value.as_ref()
    }

    /// Deepest node on the key's chain that holds a value, with the
    /// unmatched tail of the key.
    pub fn longest_match<'k>(&self, key: &'k str) -> Option<(&V, &'k str)> {
        let mut node = &self.root;
        let mut best = node.value.as_ref().map(|v| (v, 0));
        for (segment, end) in self.segments(key) {
            match node.children.get(segment) {
                Some(child) => {
                    node = child;
                    if let Some(value) = &node.value {
                        best = Some((value, end));
                    }
                }
                None => break,
            }
        }
        best.map(|(value, end)| (value, strip_separator(&key[end..])))
    }

    /// Clear the value at exactly `key`.
    ///
    /// Returns `true` if a node existed at `key`, whether or not it held a
    /// value. A node left without value and children is unlinked, and so is
    /// every ancestor that becomes empty as a result.
    pub fn delete(&mut self, key: &str) -> bool {
        let parts: Vec<&str> = self.segments(key).map(|(segment, _)| segment).collect();
        Self::delete_in(&mut self.root, &parts).is_some()
    }

    /// Returns `None` if the key does not exist, otherwise whether `node`
    /// is now empty and should be unlinked by its parent.
    fn delete_in(node: &mut Node<V>, parts: &[&str]) -> Option<bool> {
        match parts.split_first() {
            None => {
                node.value = None;
                Some(node.is_leaf())
            }
            Some((first, rest)) => {
                let child = node.children.get_mut(*first)?;
                let unlink = Self::delete_in(child, rest)?;
                if unlink {
                    node.children.remove(*first);
                }
                Some(unlink && node.is_leaf() && node.value.is_none())
            }
        }
    }

    /// Depth-first traversal over every node holding a value.
    ///
    /// `f` receives the node's full key and value. Returning
    /// `ControlFlow::Break` stops the walk and the break value is returned.
    /// Siblings are visited in key order.
    pub fn walk<B, F>(&self, mut f: F) -> ControlFlow<B>
    where
        F: FnMut(&str, &V) -> ControlFlow<B>,
    {
        let mut key = String::new();
        Self::walk_node(&self.root, &mut key, &mut f)
    }

    fn walk_node<B, F>(node: &Node<V>, key: &mut String, f: &mut F) -> ControlFlow<B>
    where
        F: FnMut(&str, &V) -> ControlFlow<B>,
    {
        if let Some(value) = &node.value {
            if let ControlFlow::Break(b) = f(key, value) {
                return ControlFlow::Break(b);
            }
        }
        for (segment, child) in &node.children {
            let len = key.len();
            key.push_str(segment);
            let flow = Self::walk_node(child, key, f);
            key.truncate(len);
            if let ControlFlow::Break(b) = flow {
                return ControlFlow::Break(b);
            }
        }
        ControlFlow::Continue(())
    }

    /// Visit every valued node on the chain from the root towards `key`.
    ///
    /// `f` receives the key prefix leading to each node. The full key does
    /// not have to exist; the walk ends where the chain does.
    pub fn walk_path<B, F>(&self, key: &str, mut f: F) -> ControlFlow<B>
    where
        F: FnMut(&str, &V) -> ControlFlow<B>,
    {
        let mut node = &self.root;
        if let Some(value) = &node.value {
            if let ControlFlow::Break(b) = f("", value) {
                return ControlFlow::Break(b);
            }
        }
        for (segment, end) in self.segments(key) {
            let Some(child) = node.children.get(segment) else {
                break;
            };
            node = child;
            if let Some(value) = &node.value {
                if let ControlFlow::Break(b) = f(&key[..end], value) {
                    return ControlFlow::Break(b);
                }
            }
        }
        ControlFlow::Continue(())
    }

    /// Number of values stored.
    pub fn len(&self) -> usize {
        self.root.count_values()
    }

    /// True if no node holds a value.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of nodes below the root, valued or not.
    pub fn node_count(&self) -> usize {
        self.root.count_nodes()
    }
}

fn strip_separator(rest: &str) -> &str {
    rest.trim_start_matches('/')
}

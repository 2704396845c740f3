use generational_arena::{Arena, Index};
use tracing::instrument;

/// A single document node: scalar text plus ordered, repeatable-label children.
#[derive(Debug, Clone)]
pub struct Node {
    /// Scalar payload; the empty string doubles as "no value"
    pub value: String,
    /// (label, child) pairs in insertion order; label `""` marks an array element
    pub children: Vec<(String, Index)>,
}

impl Node {
    fn leaf(value: String) -> Self {
        Self {
            value,
            children: Vec::new(),
        }
    }

    fn empty() -> Self {
        Self::leaf(String::new())
    }
}

/// Arena-backed storage for one document tree.
///
/// Uses generational arena for memory-safe node handles: a handle to a freed
/// node resolves to "absent" instead of dangling, which keeps live views
/// usable across arbitrary mutation of the tree.
#[derive(Debug)]
pub struct TreeStore {
    /// Arena storage for all tree nodes
    arena: Arena<Node>,
    /// Index of the root node, allocated at construction and never freed
    root: Index,
}

impl Default for TreeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeStore {
    pub fn new() -> Self {
        let mut arena = Arena::new();
        let root = arena.insert(Node::empty());
        Self { arena, root }
    }

    pub fn root(&self) -> Index {
        self.root
    }

    pub fn contains(&self, idx: Index) -> bool {
        self.arena.contains(idx)
    }

    /// Resets the root to an empty node in place. The root handle stays
    /// valid, so views anchored at the root survive a clear; views anchored
    /// at freed descendants resolve as absent afterwards.
    #[instrument(level = "trace", skip(self))]
    pub fn clear(&mut self) {
        self.reset_node(self.root);
    }

    /// Drops the node's value and children in place, freeing the child
    /// subtrees. The node's own handle stays valid.
    #[instrument(level = "trace", skip(self))]
    pub fn reset_node(&mut self, idx: Index) {
        let children = match self.arena.get_mut(idx) {
            Some(node) => {
                node.value.clear();
                std::mem::take(&mut node.children)
            }
            None => return,
        };
        for (_, child) in children {
            self.free_subtree(child);
        }
    }

    /// Resolves a dot-path relative to `origin`; the empty path is `origin`
    /// itself. Each segment takes the first child whose label matches, so
    /// duplicate labels resolve to their first occurrence and empty segments
    /// match `""`-labelled (array) children.
    #[instrument(level = "trace", skip(self))]
    pub fn find(&self, origin: Index, path: &str) -> Option<Index> {
        if !self.contains(origin) {
            return None;
        }
        if path.is_empty() {
            return Some(origin);
        }
        let mut current = origin;
        for segment in path.split('.') {
            current = self.child_by_label(current, segment)?;
        }
        Some(current)
    }

    /// Like `find` but creates empty nodes for the missing tail of the path
    /// (get-or-create, first match reused). Returns `None` only when
    /// `origin` itself is stale.
    #[instrument(level = "trace", skip(self))]
    pub fn ensure(&mut self, origin: Index, path: &str) -> Option<Index> {
        if !self.contains(origin) {
            return None;
        }
        if path.is_empty() {
            return Some(origin);
        }
        let mut current = origin;
        for segment in path.split('.') {
            current = match self.child_by_label(current, segment) {
                Some(idx) => idx,
                None => {
                    let child = self.arena.insert(Node::empty());
                    if let Some(parent) = self.arena.get_mut(current) {
                        parent.children.push((segment.to_string(), child));
                    }
                    child
                }
            };
        }
        Some(current)
    }

    #[instrument(level = "trace", skip(self))]
    pub fn put_value(&mut self, origin: Index, path: &str, value: &str) -> Option<Index> {
        let idx = self.ensure(origin, path)?;
        self.set_value(idx, value);
        Some(idx)
    }

    pub fn value(&self, idx: Index) -> Option<&str> {
        self.arena.get(idx).map(|node| node.value.as_str())
    }

    pub fn set_value(&mut self, idx: Index, value: &str) {
        if let Some(node) = self.arena.get_mut(idx) {
            node.value = value.to_string();
        }
    }

    /// Direct children of `idx` in insertion order; empty for stale handles.
    pub fn children(&self, idx: Index) -> &[(String, Index)] {
        self.arena
            .get(idx)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn child_count(&self, idx: Index) -> usize {
        self.children(idx).len()
    }

    /// Allocates a detached leaf holding `value`.
    pub fn new_node(&mut self, value: &str) -> Index {
        self.arena.insert(Node::leaf(value.to_string()))
    }

    #[instrument(level = "trace", skip(self))]
    pub fn append_child(&mut self, parent: Index, label: &str, child: Index) {
        if let Some(node) = self.arena.get_mut(parent) {
            node.children.push((label.to_string(), child));
        } else {
            self.free_subtree(child);
        }
    }

    /// Removes every direct child of `parent` carrying `label` and frees
    /// their subtrees. Returns how many children were removed.
    #[instrument(level = "trace", skip(self))]
    pub fn erase_children(&mut self, parent: Index, label: &str) -> usize {
        let mut removed = Vec::new();
        if let Some(node) = self.arena.get_mut(parent) {
            node.children.retain(|(l, idx)| {
                if l.as_str() == label {
                    removed.push(*idx);
                    false
                } else {
                    true
                }
            });
        }
        let count = removed.len();
        for idx in removed {
            self.free_subtree(idx);
        }
        count
    }

    /// Removes the i-th direct child of `parent`, freeing its subtree.
    #[instrument(level = "trace", skip(self))]
    pub fn remove_child_at(&mut self, parent: Index, i: usize) -> bool {
        let child = match self.arena.get_mut(parent) {
            Some(node) if i < node.children.len() => node.children.remove(i).1,
            _ => return false,
        };
        self.free_subtree(child);
        true
    }

    /// Deep copy of the subtree at `idx`, returned as a detached node in
    /// this store. A stale handle copies to an empty node.
    #[instrument(level = "trace", skip(self))]
    pub fn clone_subtree(&mut self, idx: Index) -> Index {
        let (value, children) = match self.arena.get(idx) {
            Some(node) => (node.value.clone(), node.children.clone()),
            None => (String::new(), Vec::new()),
        };
        let copy = self.arena.insert(Node::leaf(value));
        for (label, child) in children {
            let child_copy = self.clone_subtree(child);
            if let Some(node) = self.arena.get_mut(copy) {
                node.children.push((label, child_copy));
            }
        }
        copy
    }

    /// Deep copy of a subtree living in another store, returned as a
    /// detached node in this one.
    #[instrument(level = "trace", skip(self, source))]
    pub fn import_subtree(&mut self, source: &TreeStore, idx: Index) -> Index {
        let (value, children) = match source.arena.get(idx) {
            Some(node) => (node.value.clone(), node.children.clone()),
            None => (String::new(), Vec::new()),
        };
        let copy = self.arena.insert(Node::leaf(value));
        for (label, child) in children {
            let child_copy = self.import_subtree(source, child);
            if let Some(node) = self.arena.get_mut(copy) {
                node.children.push((label, child_copy));
            }
        }
        copy
    }

    /// Returns the subtree at `idx` to the arena.
    #[instrument(level = "trace", skip(self))]
    pub fn free_subtree(&mut self, idx: Index) {
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.arena.remove(current) {
                for (_, child) in node.children {
                    stack.push(child);
                }
            }
        }
    }

    /// Consumes the detached subtree `src`, merging its children into `dst`.
    ///
    /// An array-shaped source (every child labelled `""`, the empty child
    /// list included) appends its children; an object-shaped source recurses
    /// into an existing destination child when the incoming child has
    /// children of its own, and otherwise replaces the first matching child
    /// wholesale (or appends when the label is new). `src`'s own scalar
    /// never moves. Children are moved, not re-copied; the consumed shells
    /// and every replaced subtree are freed before returning.
    #[instrument(level = "trace", skip(self))]
    pub fn merge_detached(&mut self, dst: Index, src: Index) {
        let src_children = match self.arena.get_mut(src) {
            Some(node) => std::mem::take(&mut node.children),
            None => Vec::new(),
        };
        let array_shaped = src_children.iter().all(|(label, _)| label.is_empty());
        if array_shaped {
            for (_, child) in src_children {
                self.append_child(dst, "", child);
            }
        } else {
            for (label, child) in src_children {
                let child_has_children = self
                    .arena
                    .get(child)
                    .map(|node| !node.children.is_empty())
                    .unwrap_or(false);
                if child_has_children {
                    if let Some(existing) = self.child_by_label(dst, &label) {
                        self.merge_detached(existing, child);
                        continue;
                    }
                }
                if !self.replace_child(dst, &label, child) {
                    self.append_child(dst, &label, child);
                }
            }
        }
        self.arena.remove(src);
    }

    fn child_by_label(&self, parent: Index, label: &str) -> Option<Index> {
        let node = self.arena.get(parent)?;
        node.children
            .iter()
            .find(|(l, _)| l.as_str() == label)
            .map(|(_, idx)| *idx)
    }

    /// Swaps `replacement` into the slot of the first child labelled
    /// `label`, freeing the previous subtree. False when no child matches.
    fn replace_child(&mut self, parent: Index, label: &str, replacement: Index) -> bool {
        let old = match self.arena.get_mut(parent) {
            Some(node) => {
                match node.children.iter_mut().find(|(l, _)| l.as_str() == label) {
                    Some(slot) => std::mem::replace(&mut slot.1, replacement),
                    None => return false,
                }
            }
            None => return false,
        };
        self.free_subtree(old);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_resolves_first_match() {
        let mut store = TreeStore::new();
        let root = store.root();
        let first = store.new_node("1");
        let second = store.new_node("2");
        store.append_child(root, "x", first);
        store.append_child(root, "x", second);

        let found = store.find(root, "x").unwrap();
        assert_eq!(store.value(found), Some("1"));
    }

    #[test]
    fn test_find_empty_path_is_origin() {
        let store = TreeStore::new();
        assert_eq!(store.find(store.root(), ""), Some(store.root()));
    }

    #[test]
    fn test_ensure_creates_intermediate_nodes() {
        let mut store = TreeStore::new();
        let root = store.root();
        let leaf = store.ensure(root, "a.b.c").unwrap();

        assert_eq!(store.value(leaf), Some(""));
        assert_eq!(store.find(root, "a.b.c"), Some(leaf));
        // intermediate nodes are reused on the next walk
        assert_eq!(store.ensure(root, "a.b.c"), Some(leaf));
        assert_eq!(store.child_count(root), 1);
    }

    #[test]
    fn test_erase_children_removes_all_matches() {
        let mut store = TreeStore::new();
        let root = store.root();
        for value in ["1", "2"] {
            let child = store.new_node(value);
            store.append_child(root, "dup", child);
        }
        let keep = store.new_node("3");
        store.append_child(root, "other", keep);

        assert_eq!(store.erase_children(root, "dup"), 2);
        assert_eq!(store.child_count(root), 1);
        assert!(store.find(root, "dup").is_none());
        assert!(store.find(root, "other").is_some());
    }

    #[test]
    fn test_clone_subtree_is_deep() {
        let mut store = TreeStore::new();
        let root = store.root();
        store.put_value(root, "a.b", "deep");

        let src = store.find(root, "a").unwrap();
        let copy = store.clone_subtree(src);
        store.set_value(store.find(root, "a.b").unwrap(), "changed");

        let copied_leaf = store.find(copy, "b").unwrap();
        assert_eq!(store.value(copied_leaf), Some("deep"));
    }

    #[test]
    fn test_clear_keeps_root_handle_valid() {
        let mut store = TreeStore::new();
        let root = store.root();
        store.put_value(root, "a.b", "1");
        let stale = store.find(root, "a").unwrap();

        store.clear();

        assert!(store.contains(root));
        assert_eq!(store.child_count(root), 0);
        assert!(!store.contains(stale));
    }

    #[test]
    fn test_merge_detached_replaces_leaves_and_appends_new_keys() {
        let mut store = TreeStore::new();
        let root = store.root();
        store.put_value(root, "a", "old");
        store.put_value(root, "b", "kept");

        let src = store.new_node("");
        let a = store.new_node("new");
        let c = store.new_node("fresh");
        store.append_child(src, "a", a);
        store.append_child(src, "c", c);

        store.merge_detached(root, src);

        assert_eq!(store.value(store.find(root, "a").unwrap()), Some("new"));
        assert_eq!(store.value(store.find(root, "b").unwrap()), Some("kept"));
        assert_eq!(store.value(store.find(root, "c").unwrap()), Some("fresh"));
        let labels: Vec<_> = store
            .children(root)
            .iter()
            .map(|(l, _)| l.clone())
            .collect();
        assert_eq!(labels, vec!["a", "b", "c"]);
        assert!(!store.contains(src), "consumed shell must be freed");
    }

    #[test]
    fn test_merge_detached_array_source_appends() {
        let mut store = TreeStore::new();
        let root = store.root();
        let dst = store.ensure(root, "ary").unwrap();
        for value in ["1", "2"] {
            let child = store.new_node(value);
            store.append_child(dst, "", child);
        }

        let src = store.new_node("");
        for value in ["3", "4"] {
            let child = store.new_node(value);
            store.append_child(src, "", child);
        }

        store.merge_detached(dst, src);

        let values: Vec<_> = store
            .children(dst)
            .iter()
            .map(|(_, idx)| store.value(*idx).unwrap().to_string())
            .collect();
        assert_eq!(values, vec!["1", "2", "3", "4"]);
    }
}

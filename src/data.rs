use std::cell::RefCell;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::ptr;
use std::str::FromStr;

use generational_arena::Index;
use tracing::instrument;

use crate::errors::{TreeError, TreeResult};
use crate::store::TreeStore;
use crate::tree::DataTree;
use crate::{display, json, xml};

/// Non-owning cursor into a shared document tree.
///
/// A view holds a store handle, an anchor node and a dot-path relative to
/// that anchor; it re-resolves the path on every access, so it never
/// dangles when the tree mutates underneath it — a location that has gone
/// away simply reads as absent. Views over overlapping paths alias freely:
/// mutation through one is immediately visible through every other, which
/// is what makes `tree.child("a").child("b")` composition cheap.
///
/// Obtained from [`DataTree::child`]/[`DataTree::as_data`], by indexing
/// deeper with [`Data::child`], or from iteration and [`Data::at`], which
/// yield views anchored directly at the child they name. Rebinding a view
/// is plain cloning/reassignment; dropping one releases nothing.
#[derive(Clone)]
pub struct Data<'t> {
    store: &'t RefCell<TreeStore>,
    origin: Index,
    context: String,
    key: String,
    path: String,
}

impl<'t> Data<'t> {
    pub(crate) fn new(
        store: &'t RefCell<TreeStore>,
        origin: Index,
        context: &str,
        key: &str,
    ) -> Self {
        let path = if context.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", context, key)
        };
        Self {
            store,
            origin,
            context: context.to_string(),
            key: key.to_string(),
            path,
        }
    }

    /// A view anchored directly at `origin` with an empty path, as yielded
    /// by iteration and positional access. `key` keeps the child's label.
    pub(crate) fn rooted(store: &'t RefCell<TreeStore>, origin: Index, key: &str) -> Self {
        Self {
            store,
            origin,
            context: String::new(),
            key: key.to_string(),
            path: String::new(),
        }
    }

    /// The dot-path this view resolves, relative to its anchor node.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The local label of the location this view names.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Derives the view for `key` under the current path. Pure path
    /// composition: no store access, no node creation.
    ///
    /// # Panics
    ///
    /// Panics when `key` is empty; array elements are addressed with
    /// [`Data::at`], never with an empty key.
    pub fn child(&self, key: &str) -> Data<'t> {
        assert!(!key.is_empty(), "Data::child cannot take an empty key");
        Data::new(self.store, self.origin, &self.path, key)
    }

    fn resolve(&self) -> Option<Index> {
        self.store.borrow().find(self.origin, &self.path)
    }

    fn read_value(&self) -> Option<String> {
        let store = self.store.borrow();
        let idx = store.find(self.origin, &self.path)?;
        store.value(idx).map(|value| value.to_string())
    }

    fn not_found(&self) -> TreeError {
        TreeError::PathNotFound(self.path.clone())
    }

    /// True iff a node is resolvable at the current path. No value or type
    /// check; an empty node exists all the same.
    pub fn exists(&self) -> bool {
        self.resolve().is_some()
    }

    /// True when the node is absent or its stored text is empty.
    pub fn is_blank(&self) -> bool {
        match self.read_value() {
            Some(value) => value.is_empty(),
            None => true,
        }
    }

    /// True when the node is absent or its stored text is the literal
    /// `"null"`.
    pub fn is_null(&self) -> bool {
        match self.read_value() {
            Some(value) => value == "null",
            None => true,
        }
    }

    /// Resolves the path and parses the scalar stored there.
    #[instrument(level = "trace", skip(self))]
    pub fn get<T>(&self) -> TreeResult<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        let value = self.read_value().ok_or_else(|| self.not_found())?;
        value.parse::<T>().map_err(|e| TreeError::Conversion {
            path: self.path.clone(),
            value: value.clone(),
            reason: e.to_string(),
        })
    }

    /// Like [`Data::get`], but falls back to `default` when the path is
    /// absent or the stored text does not parse.
    pub fn get_or<T: FromStr>(&self, default: T) -> T {
        self.read_value()
            .and_then(|value| value.parse().ok())
            .unwrap_or(default)
    }

    /// Writes `value` at the current path, creating missing intermediate
    /// nodes along the way. Fails only when the view's anchor node has been
    /// removed from the tree.
    #[instrument(level = "trace", skip(self, value))]
    pub fn set<V: Display>(&self, value: V) -> TreeResult<()> {
        let mut store = self.store.borrow_mut();
        store
            .put_value(self.origin, &self.path, &value.to_string())
            .map(|_| ())
            .ok_or_else(|| self.not_found())
    }

    /// Presence-based fallback: `self` when it resolves, `fallback`
    /// otherwise. Presence, not truthiness — a stored `0` or empty string
    /// still wins over the fallback.
    pub fn or(self, fallback: Data<'t>) -> Data<'t> {
        if self.exists() {
            self
        } else {
            fallback
        }
    }

    /// Number of direct children at the current path.
    #[instrument(level = "trace", skip(self))]
    pub fn count(&self) -> TreeResult<usize> {
        let store = self.store.borrow();
        let idx = store
            .find(self.origin, &self.path)
            .ok_or_else(|| self.not_found())?;
        Ok(store.child_count(idx))
    }

    /// Labels of the direct children in insertion order; the repeated `""`
    /// labels of array elements are included.
    #[instrument(level = "trace", skip(self))]
    pub fn get_keys(&self) -> TreeResult<Vec<String>> {
        let store = self.store.borrow();
        let idx = store
            .find(self.origin, &self.path)
            .ok_or_else(|| self.not_found())?;
        Ok(store
            .children(idx)
            .iter()
            .map(|(label, _)| label.clone())
            .collect())
    }

    /// Reports which of `keys` are not present as immediate children of the
    /// current node. An absent node reports every key as missing.
    #[instrument(level = "trace", skip(self))]
    pub fn find_missing_keys(&self, keys: &[&str]) -> Vec<String> {
        let store = self.store.borrow();
        keys.iter()
            .filter(|key| {
                let path = if self.path.is_empty() {
                    (**key).to_string()
                } else {
                    format!("{}.{}", self.path, key)
                };
                store.find(self.origin, &path).is_none()
            })
            .map(|key| (*key).to_string())
            .collect()
    }

    /// True iff every key in `keys` is present as an immediate child.
    pub fn require(&self, keys: &[&str]) -> bool {
        self.find_missing_keys(keys).is_empty()
    }

    /// True for zero children or when every direct child is an unlabelled
    /// array element. The first labelled child short-circuits to false, so
    /// a malformed mixed node stays order-dependent rather than validated.
    /// An absent node is vacuously array-shaped.
    pub fn is_array(&self) -> bool {
        let store = self.store.borrow();
        let idx = match store.find(self.origin, &self.path) {
            Some(idx) => idx,
            None => return true,
        };
        store
            .children(idx)
            .iter()
            .all(|(label, _)| label.is_empty())
    }

    /// Collects each direct child's own scalar, in order.
    #[instrument(level = "trace", skip(self))]
    pub fn to_vec<T>(&self) -> TreeResult<Vec<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        let store = self.store.borrow();
        let idx = store
            .find(self.origin, &self.path)
            .ok_or_else(|| self.not_found())?;
        let mut items = Vec::new();
        for (_, child) in store.children(idx) {
            let value = store.value(*child).unwrap_or("");
            items.push(value.parse::<T>().map_err(|e| TreeError::Conversion {
                path: self.path.clone(),
                value: value.to_string(),
                reason: e.to_string(),
            })?);
        }
        Ok(items)
    }

    /// Replaces the node with an array: previous children and value are
    /// dropped, each element appended as an unlabelled leaf in input order.
    #[instrument(level = "trace", skip(self, values))]
    pub fn from_vec<V: Display>(&self, values: &[V]) -> TreeResult<()> {
        let mut store = self.store.borrow_mut();
        let idx = store
            .ensure(self.origin, &self.path)
            .ok_or_else(|| self.not_found())?;
        store.reset_node(idx);
        for value in values {
            let child = store.new_node(&value.to_string());
            store.append_child(idx, "", child);
        }
        Ok(())
    }

    /// Appends an unlabelled leaf holding `value`, creating the node first
    /// when absent. The existing node's shape is not validated.
    #[instrument(level = "trace", skip(self, value))]
    pub fn push<V: Display>(&self, value: V) -> TreeResult<()> {
        let mut store = self.store.borrow_mut();
        let idx = store
            .ensure(self.origin, &self.path)
            .ok_or_else(|| self.not_found())?;
        let child = store.new_node(&value.to_string());
        store.append_child(idx, "", child);
        Ok(())
    }

    /// Appends an unlabelled structural copy of `source`'s subtree,
    /// creating the node first when absent. Works across trees.
    #[instrument(level = "trace", skip(self, source))]
    pub fn push_subtree(&self, source: &Data<'_>) -> TreeResult<()> {
        if ptr::eq(self.store, source.store) {
            let mut store = self.store.borrow_mut();
            let src_idx = store
                .find(source.origin, &source.path)
                .ok_or_else(|| source.not_found())?;
            let idx = store
                .ensure(self.origin, &self.path)
                .ok_or_else(|| self.not_found())?;
            let copy = store.clone_subtree(src_idx);
            store.append_child(idx, "", copy);
        } else {
            let src_store = source.store.borrow();
            let src_idx = src_store
                .find(source.origin, &source.path)
                .ok_or_else(|| source.not_found())?;
            let mut store = self.store.borrow_mut();
            let idx = store
                .ensure(self.origin, &self.path)
                .ok_or_else(|| self.not_found())?;
            let copy = store.import_subtree(&src_store, src_idx);
            store.append_child(idx, "", copy);
        }
        Ok(())
    }

    /// The i-th direct child (insertion order) as a view rooted at that
    /// child: its path is empty, its key is the child's label, and further
    /// indexing resolves relative to the child itself.
    #[instrument(level = "trace", skip(self))]
    pub fn at(&self, i: usize) -> TreeResult<Data<'t>> {
        let store = self.store.borrow();
        let idx = store
            .find(self.origin, &self.path)
            .ok_or_else(|| self.not_found())?;
        let children = store.children(idx);
        let (label, child) = children.get(i).ok_or(TreeError::IndexOutOfRange {
            index: i,
            len: children.len(),
        })?;
        Ok(Data::rooted(self.store, *child, label))
    }

    /// Iterates the direct children as views rooted at each child, like
    /// [`Data::at`]. The child list is snapshotted up front, so children
    /// removed mid-iteration resolve as absent instead of invalidating the
    /// iterator. An absent node yields nothing.
    pub fn iter(&self) -> ChildIter<'t> {
        let store = self.store.borrow();
        let children = match store.find(self.origin, &self.path) {
            Some(idx) => store.children(idx).to_vec(),
            None => Vec::new(),
        };
        ChildIter {
            store: self.store,
            children: children.into_iter(),
        }
    }

    /// Visits each direct child in order; the first `false` from the
    /// visitor stops the walk. The visitor may freely write through the
    /// views it receives.
    pub fn each<F>(&self, mut visitor: F)
    where
        F: FnMut(Data<'t>) -> bool,
    {
        for child in self.iter() {
            if !visitor(child) {
                break;
            }
        }
    }

    /// Removes the i-th direct child and frees its subtree.
    #[instrument(level = "trace", skip(self))]
    pub fn remove_at(&self, i: usize) -> TreeResult<()> {
        let mut store = self.store.borrow_mut();
        let idx = store
            .find(self.origin, &self.path)
            .ok_or_else(|| self.not_found())?;
        let len = store.child_count(idx);
        if !store.remove_child_at(idx, i) {
            return Err(TreeError::IndexOutOfRange { index: i, len });
        }
        Ok(())
    }

    /// Removes every child carrying this view's key from the parent node.
    /// Idempotent: an already-absent location is a no-op.
    #[instrument(level = "trace", skip(self))]
    pub fn destroy(&self) {
        let mut store = self.store.borrow_mut();
        if let Some(parent) = store.find(self.origin, &self.context) {
            store.erase_children(parent, &self.key);
        }
    }

    /// Deep-merges `source`'s subtree into this node in place.
    ///
    /// An array-shaped source concatenates: its children are appended as
    /// new unlabelled children, never matched element-wise. An object-shaped
    /// source recurses per label where the destination already has that
    /// child and the incoming child has children of its own; otherwise the
    /// destination child is replaced wholesale — scalar leaves always
    /// overwrite. Existing destination key order is preserved, new keys
    /// append in source order, and the source's own scalar is never copied.
    /// The destination node is created when absent; an absent source is an
    /// error and leaves the destination untouched.
    #[instrument(level = "debug", skip(self, source))]
    pub fn merge(&self, source: &Data<'_>) -> TreeResult<()> {
        if ptr::eq(self.store, source.store) {
            let mut store = self.store.borrow_mut();
            let src_idx = store
                .find(source.origin, &source.path)
                .ok_or_else(|| source.not_found())?;
            let dst_idx = store
                .ensure(self.origin, &self.path)
                .ok_or_else(|| self.not_found())?;
            let copy = store.clone_subtree(src_idx);
            store.merge_detached(dst_idx, copy);
        } else {
            let src_store = source.store.borrow();
            let src_idx = src_store
                .find(source.origin, &source.path)
                .ok_or_else(|| source.not_found())?;
            let mut store = self.store.borrow_mut();
            let dst_idx = store
                .ensure(self.origin, &self.path)
                .ok_or_else(|| self.not_found())?;
            let copy = store.import_subtree(&src_store, src_idx);
            store.merge_detached(dst_idx, copy);
        }
        Ok(())
    }

    /// Merges another tree's full contents into this node.
    pub fn merge_tree(&self, tree: &DataTree) -> TreeResult<()> {
        self.merge(&tree.as_data())
    }

    /// Serializes the subtree at the current path to JSON text.
    #[instrument(level = "debug", skip(self))]
    pub fn to_json(&self) -> TreeResult<String> {
        let store = self.store.borrow();
        let idx = store
            .find(self.origin, &self.path)
            .ok_or_else(|| self.not_found())?;
        let value = json::encode_node(&store, idx);
        Ok(serde_json::to_string(&value)?)
    }

    /// Writes the JSON serialization of the subtree into `out`.
    #[instrument(level = "debug", skip(self, out))]
    pub fn write_json<W: io::Write>(&self, out: &mut W) -> TreeResult<()> {
        let store = self.store.borrow();
        let idx = store
            .find(self.origin, &self.path)
            .ok_or_else(|| self.not_found())?;
        let value = json::encode_node(&store, idx);
        serde_json::to_writer(out, &value)?;
        Ok(())
    }

    /// Serializes the subtree at the current path to XML text.
    #[instrument(level = "debug", skip(self))]
    pub fn to_xml(&self) -> TreeResult<String> {
        let store = self.store.borrow();
        let idx = store
            .find(self.origin, &self.path)
            .ok_or_else(|| self.not_found())?;
        Ok(xml::encode_node(&store, idx))
    }

    /// Renders the subtree as an indented tree, for debugging output.
    pub fn render(&self) -> TreeResult<String> {
        let store = self.store.borrow();
        let idx = store
            .find(self.origin, &self.path)
            .ok_or_else(|| self.not_found())?;
        let label = if self.key.is_empty() {
            "."
        } else {
            self.key.as_str()
        };
        Ok(display::render_node(&store, idx, label).to_string())
    }
}

impl fmt::Debug for Data<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Data")
            .field("path", &self.path)
            .field("key", &self.key)
            .finish()
    }
}

impl PartialEq<&str> for Data<'_> {
    /// String comparison against the stored value; an absent node compares
    /// unequal to everything.
    fn eq(&self, other: &&str) -> bool {
        self.read_value().as_deref() == Some(*other)
    }
}

impl PartialEq<String> for Data<'_> {
    fn eq(&self, other: &String) -> bool {
        self.read_value().as_ref() == Some(other)
    }
}

/// Snapshot iterator over a node's direct children.
pub struct ChildIter<'t> {
    store: &'t RefCell<TreeStore>,
    children: std::vec::IntoIter<(String, Index)>,
}

impl<'t> Iterator for ChildIter<'t> {
    type Item = Data<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        let (label, idx) = self.children.next()?;
        Some(Data::rooted(self.store, idx, &label))
    }
}

impl<'a, 't> IntoIterator for &'a Data<'t> {
    type Item = Data<'t>;
    type IntoIter = ChildIter<'t>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

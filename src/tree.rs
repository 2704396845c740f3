use std::cell::RefCell;
use std::collections::HashMap;

use tracing::instrument;

use crate::data::{ChildIter, Data};
use crate::errors::TreeResult;
use crate::store::TreeStore;

/// Owning root of one document tree.
///
/// Sole owner of the backing store; every [`Data`] view borrows from it and
/// is bounded by its lifetime. [`DataTree::clear`] resets the store in
/// place, so root-level views stay usable across a clear while views
/// anchored inside freed subtrees read as absent afterwards.
#[derive(Debug, Default)]
pub struct DataTree {
    store: RefCell<TreeStore>,
}

impl DataTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn store(&self) -> &RefCell<TreeStore> {
        &self.store
    }

    /// A view over the whole tree (empty path, anchored at the root).
    pub fn as_data(&self) -> Data<'_> {
        let root = self.store.borrow().root();
        Data::new(&self.store, root, "", "")
    }

    /// Root-level indexing.
    ///
    /// # Panics
    ///
    /// Panics when `key` is empty, like [`Data::child`]; the whole-tree
    /// view is [`DataTree::as_data`].
    pub fn child(&self, key: &str) -> Data<'_> {
        self.as_data().child(key)
    }

    /// Empties the tree in place.
    #[instrument(level = "debug", skip(self))]
    pub fn clear(&self) {
        self.store.borrow_mut().clear();
    }

    /// Writes every entry as a leaf at its key, each key interpreted as a
    /// dot-path. Entries land in map iteration order (unspecified); the
    /// existing contents are kept.
    #[instrument(level = "debug", skip(self, map))]
    pub fn from_map(&self, map: &HashMap<String, String>) -> &Self {
        let mut store = self.store.borrow_mut();
        let root = store.root();
        for (key, value) in map {
            store.put_value(root, key, value);
        }
        self
    }

    /// Merges `other`'s full contents into this tree's root.
    pub fn merge(&self, other: &DataTree) -> TreeResult<()> {
        self.as_data().merge(&other.as_data())
    }

    /// Iterates the root's direct children, like [`Data::iter`].
    pub fn iter(&self) -> ChildIter<'_> {
        self.as_data().iter()
    }

    /// Removes the i-th direct child of the root.
    pub fn remove_at(&self, i: usize) -> TreeResult<()> {
        self.as_data().remove_at(i)
    }
}

impl<'a> IntoIterator for &'a DataTree {
    type Item = Data<'a>;
    type IntoIter = ChildIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

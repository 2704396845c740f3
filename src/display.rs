use std::fmt;

use generational_arena::Index;
use termtree::Tree;

use crate::store::TreeStore;
use crate::tree::DataTree;

/// Builds a displayable tree for the node at `idx`. Nodes show as
/// `label: value`, or just the label when no scalar is stored; array
/// elements show `-` in place of their empty label.
pub(crate) fn render_node(store: &TreeStore, idx: Index, label: &str) -> Tree<String> {
    let leaves: Vec<_> = store
        .children(idx)
        .iter()
        .map(|(child_label, child)| render_node(store, *child, child_label))
        .collect();
    Tree::new(node_label(store, idx, label)).with_leaves(leaves)
}

fn node_label(store: &TreeStore, idx: Index, label: &str) -> String {
    let shown = if label.is_empty() { "-" } else { label };
    match store.value(idx) {
        Some(value) if !value.is_empty() => format!("{}: {}", shown, value),
        _ => shown.to_string(),
    }
}

impl fmt::Display for DataTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let store = self.store().borrow();
        let tree = render_node(&store, store.root(), ".");
        write!(f, "{}", tree)
    }
}

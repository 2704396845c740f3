//! JSON bridge: the tree's array/object shape mapped onto `serde_json`
//! values. Object key order is observable, so the `preserve_order` feature
//! is required for round-trips.

use std::fs;
use std::io;
use std::path::Path;

use generational_arena::Index;
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::instrument;

use crate::errors::TreeResult;
use crate::store::TreeStore;
use crate::tree::DataTree;

/// Encodes the subtree at `idx`: all-unlabelled children become an array,
/// labelled children an object (first occurrence wins for duplicated
/// labels, matching first-match path resolution; the node's own value is
/// dropped), and a childless node its value as a string. Scalars always
/// emit as strings — the tree stores text, not typed values.
pub(crate) fn encode_node(store: &TreeStore, idx: Index) -> Value {
    let children = store.children(idx);
    if children.is_empty() {
        return Value::String(store.value(idx).unwrap_or("").to_string());
    }
    if children.iter().all(|(label, _)| label.is_empty()) {
        Value::Array(
            children
                .iter()
                .map(|(_, child)| encode_node(store, *child))
                .collect(),
        )
    } else {
        let mut object = Map::new();
        for (label, child) in children {
            if !object.contains_key(label.as_str()) {
                object.insert(label.clone(), encode_node(store, *child));
            }
        }
        Value::Object(object)
    }
}

/// Builds children under `parent` from a JSON value: objects become
/// labelled children in document order, arrays unlabelled children, and
/// scalars the node's text (`null` stores the literal text `"null"`).
pub(crate) fn decode_value(store: &mut TreeStore, parent: Index, value: &Value) {
    match value {
        Value::Null => store.set_value(parent, "null"),
        Value::Bool(b) => store.set_value(parent, if *b { "true" } else { "false" }),
        Value::Number(n) => store.set_value(parent, &n.to_string()),
        Value::String(s) => store.set_value(parent, s),
        Value::Array(items) => {
            for item in items {
                let child = store.new_node("");
                store.append_child(parent, "", child);
                decode_value(store, child, item);
            }
        }
        Value::Object(map) => {
            for (label, item) in map {
                let child = store.new_node("");
                store.append_child(parent, label, child);
                decode_value(store, child, item);
            }
        }
    }
}

impl DataTree {
    /// Serializes the whole tree to JSON text. An empty tree is `{}`.
    #[instrument(level = "debug", skip(self))]
    pub fn to_json(&self) -> TreeResult<String> {
        Ok(serde_json::to_string(&self.root_value())?)
    }

    /// Writes the whole tree's JSON into `out`.
    #[instrument(level = "debug", skip(self, out))]
    pub fn write_json<W: io::Write>(&self, out: &mut W) -> TreeResult<()> {
        serde_json::to_writer(out, &self.root_value())?;
        Ok(())
    }

    /// Replaces the tree's contents with the decoded document. On a parse
    /// error the tree is left untouched.
    #[instrument(level = "debug", skip(self, text))]
    pub fn from_json(&self, text: &str) -> TreeResult<&Self> {
        let value: Value = serde_json::from_str(text)?;
        self.replace_with(&value);
        Ok(self)
    }

    /// Like [`DataTree::from_json`], decoding the document from a reader.
    #[instrument(level = "debug", skip(self, source))]
    pub fn from_json_reader<R: io::Read>(&self, source: R) -> TreeResult<&Self> {
        let value: Value = serde_json::from_reader(source)?;
        self.replace_with(&value);
        Ok(self)
    }

    /// Like [`DataTree::from_json`], reading the document from a file.
    #[instrument(level = "debug", skip(self, path))]
    pub fn from_json_file<P: AsRef<Path>>(&self, path: P) -> TreeResult<&Self> {
        let text = fs::read_to_string(path)?;
        self.from_json(&text)
    }

    fn root_value(&self) -> Value {
        let store = self.store().borrow();
        let root = store.root();
        if store.child_count(root) == 0 && store.value(root).unwrap_or("").is_empty() {
            return Value::Object(Map::new());
        }
        encode_node(&store, root)
    }

    fn replace_with(&self, value: &Value) {
        let mut store = self.store().borrow_mut();
        store.clear();
        let root = store.root();
        decode_value(&mut store, root, value);
    }
}

impl Serialize for DataTree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.root_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for DataTree {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let tree = DataTree::new();
        tree.replace_with(&value);
        Ok(tree)
    }
}

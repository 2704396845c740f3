//! XML bridge. Elements map to labelled children (element name = label),
//! text content to node values, attributes to leaf children, and `<item>`
//! elements to unlabelled array children. Attributes only exist on decode;
//! encoding never emits them. Multiple top-level elements are accepted
//! (fragment semantics).

use std::fs;
use std::io::Read;
use std::path::Path;

use generational_arena::Index;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::instrument;

use crate::errors::{TreeError, TreeResult};
use crate::store::TreeStore;
use crate::tree::DataTree;

/// Element name standing in for the empty (array-element) label.
const ARRAY_ELEMENT_TAG: &str = "item";

const XML_DECL: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

/// Encodes the subtree at `idx`: the declaration followed by one element
/// per child. `""` labels emit as `<item>`, a node's escaped text precedes
/// its child elements, and labels are taken verbatim as element names —
/// labels that are not valid XML names produce invalid XML.
pub(crate) fn encode_node(store: &TreeStore, idx: Index) -> String {
    let mut out = String::from(XML_DECL);
    for (label, child) in store.children(idx) {
        write_element(store, label, *child, &mut out);
    }
    out
}

fn write_element(store: &TreeStore, label: &str, idx: Index, out: &mut String) {
    let name = if label.is_empty() {
        ARRAY_ELEMENT_TAG
    } else {
        label
    };
    let value = store.value(idx).unwrap_or("");
    let children = store.children(idx);

    if value.is_empty() && children.is_empty() {
        out.push('<');
        out.push_str(name);
        out.push_str("/>");
        return;
    }

    out.push('<');
    out.push_str(name);
    out.push('>');
    if !value.is_empty() {
        out.push_str(&escape(value));
    }
    for (child_label, child) in children {
        write_element(store, child_label, *child, out);
    }
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

/// Decoded document held detached from any store, so a parse error cannot
/// leave a half-replaced tree behind.
#[derive(Debug, Default)]
struct XmlNode {
    value: String,
    children: Vec<(String, XmlNode)>,
}

impl XmlNode {
    fn leaf(value: String) -> Self {
        Self {
            value,
            children: Vec::new(),
        }
    }
}

fn parse_document(text: &str) -> TreeResult<XmlNode> {
    let mut reader = Reader::from_str(text);
    let config = reader.config_mut();
    config.trim_text_start = true;
    config.trim_text_end = true;

    let mut root = XmlNode::default();
    let mut stack: Vec<(String, XmlNode)> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let label = element_label(e.name().as_ref());
                let mut node = XmlNode::default();
                decode_attributes(&e, &mut node, reader.buffer_position())?;
                stack.push((label, node));
            }
            Ok(Event::Empty(e)) => {
                let label = element_label(e.name().as_ref());
                let mut node = XmlNode::default();
                decode_attributes(&e, &mut node, reader.buffer_position())?;
                attach(&mut root, &mut stack, label, node);
            }
            Ok(Event::End(_)) => match stack.pop() {
                Some((label, node)) => attach(&mut root, &mut stack, label, node),
                None => {
                    return Err(TreeError::Xml(format!(
                        "unexpected closing tag at position {}",
                        reader.buffer_position()
                    )))
                }
            },
            Ok(Event::Text(e)) => {
                let pos = reader.buffer_position();
                let text = e
                    .unescape()
                    .map_err(|err| TreeError::Xml(format!("{} at position {}", err, pos)))?;
                current_node(&mut root, &mut stack).value.push_str(&text);
            }
            Ok(Event::CData(e)) => {
                current_node(&mut root, &mut stack)
                    .value
                    .push_str(&String::from_utf8_lossy(&e));
            }
            Ok(Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_)) => {}
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(TreeError::Xml(format!(
                    "{} at position {}",
                    e,
                    reader.buffer_position()
                )))
            }
        }
    }

    if let Some((label, _)) = stack.pop() {
        let name = if label.is_empty() {
            ARRAY_ELEMENT_TAG.to_string()
        } else {
            label
        };
        return Err(TreeError::Xml(format!("unclosed element <{}>", name)));
    }
    Ok(root)
}

fn element_label(name: &[u8]) -> String {
    let name = String::from_utf8_lossy(name);
    if name == ARRAY_ELEMENT_TAG {
        String::new()
    } else {
        name.into_owned()
    }
}

fn decode_attributes(element: &BytesStart<'_>, node: &mut XmlNode, pos: u64) -> TreeResult<()> {
    for attr in element.attributes() {
        let attr =
            attr.map_err(|e| TreeError::Xml(format!("{} at position {}", e, pos)))?;
        let label = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| TreeError::Xml(format!("{} at position {}", e, pos)))?;
        node.children.push((label, XmlNode::leaf(value.into_owned())));
    }
    Ok(())
}

fn attach(root: &mut XmlNode, stack: &mut Vec<(String, XmlNode)>, label: String, node: XmlNode) {
    let parent = match stack.last_mut() {
        Some((_, parent)) => parent,
        None => root,
    };
    parent.children.push((label, node));
}

fn current_node<'a>(root: &'a mut XmlNode, stack: &'a mut Vec<(String, XmlNode)>) -> &'a mut XmlNode {
    match stack.last_mut() {
        Some((_, node)) => node,
        None => root,
    }
}

impl DataTree {
    /// Serializes the whole tree to XML text: declaration plus one element
    /// per root child.
    #[instrument(level = "debug", skip(self))]
    pub fn to_xml(&self) -> TreeResult<String> {
        let store = self.store().borrow();
        let root = store.root();
        Ok(encode_node(&store, root))
    }

    /// Replaces the tree's contents with the decoded document. On a parse
    /// error the tree is left untouched.
    #[instrument(level = "debug", skip(self, text))]
    pub fn from_xml(&self, text: &str) -> TreeResult<&Self> {
        let doc = parse_document(text)?;
        self.commit_document(&doc);
        Ok(self)
    }

    /// Like [`DataTree::from_xml`], reading the whole source first.
    #[instrument(level = "debug", skip(self, source))]
    pub fn from_xml_reader<R: Read>(&self, mut source: R) -> TreeResult<&Self> {
        let mut text = String::new();
        source.read_to_string(&mut text)?;
        self.from_xml(&text)
    }

    /// Like [`DataTree::from_xml`], reading the document from a file.
    #[instrument(level = "debug", skip(self, path))]
    pub fn from_xml_file<P: AsRef<Path>>(&self, path: P) -> TreeResult<&Self> {
        let text = fs::read_to_string(path)?;
        self.from_xml(&text)
    }

    fn commit_document(&self, doc: &XmlNode) {
        let mut store = self.store().borrow_mut();
        store.clear();
        let root = store.root();
        commit(&mut store, root, doc);
    }
}

fn commit(store: &mut TreeStore, parent: Index, node: &XmlNode) {
    store.set_value(parent, &node.value);
    for (label, child) in &node.children {
        let idx = store.new_node("");
        store.append_child(parent, label, idx);
        commit(store, idx, child);
    }
}

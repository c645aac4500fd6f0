//! # Document nodes
//!
//! The editable tree is made of two node kinds:
//!
//! - [`Text`]: a string plus flat formatting marks (`{"text": "hi", "bold": true}`)
//! - [`Element`]: ordered children plus element attributes (`{"children": [...], "type": "paragraph"}`)
//!
//! The root of a document is not a node itself; it is the top-level list of
//! children held by [`crate::Document`]. All lookups here operate on such a
//! list.

use crate::errors::{EditorError, Result};
use crate::path::Path;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Formatting marks (for text) or attributes (for elements).
pub type Properties = BTreeMap<String, serde_json::Value>;

/// Property keys that describe structure and can never be set as attributes.
pub const RESERVED_KEYS: [&str; 2] = ["text", "children"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Text {
    pub text: String,
    #[serde(flatten)]
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub children: Vec<Node>,
    #[serde(flatten)]
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Text(Text),
    Element(Element),
}

impl Text {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            properties: Properties::new(),
        }
    }
}

impl Element {
    pub fn new(children: Vec<Node>) -> Self {
        Self {
            children,
            properties: Properties::new(),
        }
    }
}

impl Node {
    /// Plain text leaf without marks.
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(Text::new(text))
    }

    /// Element without attributes.
    pub fn element(children: Vec<Node>) -> Self {
        Node::Element(Element::new(children))
    }

    /// Builder-style property setter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.properties_mut().insert(key.into(), value.into());
        self
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Node::Text(_))
    }

    pub fn is_element(&self) -> bool {
        matches!(self, Node::Element(_))
    }

    pub fn as_text(&self) -> Option<&Text> {
        match self {
            Node::Text(t) => Some(t),
            Node::Element(_) => None,
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        }
    }

    pub fn properties(&self) -> &Properties {
        match self {
            Node::Text(t) => &t.properties,
            Node::Element(e) => &e.properties,
        }
    }

    pub fn properties_mut(&mut self) -> &mut Properties {
        match self {
            Node::Text(t) => &mut t.properties,
            Node::Element(e) => &mut e.properties,
        }
    }

    pub fn children(&self) -> Option<&Vec<Node>> {
        self.as_element().map(|e| &e.children)
    }

    /// Concatenated text content of the subtree.
    pub fn string(&self) -> String {
        match self {
            Node::Text(t) => t.text.clone(),
            Node::Element(e) => e.children.iter().map(Node::string).collect(),
        }
    }
}

impl From<Text> for Node {
    fn from(t: Text) -> Self {
        Node::Text(t)
    }
}

impl From<Element> for Node {
    fn from(e: Element) -> Self {
        Node::Element(e)
    }
}

/// Node at `path` below `root`.
pub fn get<'a>(root: &'a [Node], path: &Path) -> Result<&'a Node> {
    let (first, rest) = path
        .split_first()
        .ok_or_else(|| EditorError::InvalidPath("the root is not a node".into()))?;
    let mut node = root
        .get(*first)
        .ok_or_else(|| EditorError::NodeNotFound(path.clone()))?;
    for &index in rest {
        node = match node {
            Node::Element(e) => e
                .children
                .get(index)
                .ok_or_else(|| EditorError::NodeNotFound(path.clone()))?,
            Node::Text(_) => return Err(EditorError::NodeNotFound(path.clone())),
        };
    }
    Ok(node)
}

pub fn get_mut<'a>(root: &'a mut [Node], path: &Path) -> Result<&'a mut Node> {
    let (first, rest) = path
        .split_first()
        .ok_or_else(|| EditorError::InvalidPath("the root is not a node".into()))?;
    let mut node = root
        .get_mut(*first)
        .ok_or_else(|| EditorError::NodeNotFound(path.clone()))?;
    for &index in rest {
        node = match node {
            Node::Element(e) => e
                .children
                .get_mut(index)
                .ok_or_else(|| EditorError::NodeNotFound(path.clone()))?,
            Node::Text(_) => return Err(EditorError::NodeNotFound(path.clone())),
        };
    }
    Ok(node)
}

pub fn has(root: &[Node], path: &Path) -> bool {
    !path.is_root() && get(root, path).is_ok()
}

/// Children list of the node at `path`; the root path yields `root` itself.
pub fn children_at<'a>(root: &'a [Node], path: &Path) -> Result<&'a [Node]> {
    if path.is_root() {
        return Ok(root);
    }
    match get(root, path)? {
        Node::Element(e) => Ok(&e.children),
        Node::Text(_) => Err(EditorError::NotElement(path.clone())),
    }
}

pub fn children_at_mut<'a>(root: &'a mut Vec<Node>, path: &Path) -> Result<&'a mut Vec<Node>> {
    if path.is_root() {
        return Ok(root);
    }
    match get_mut(root, path)? {
        Node::Element(e) => Ok(&mut e.children),
        Node::Text(_) => Err(EditorError::NotElement(path.clone())),
    }
}

/// Text leaf at `path`.
pub fn leaf<'a>(root: &'a [Node], path: &Path) -> Result<&'a Text> {
    match get(root, path)? {
        Node::Text(t) => Ok(t),
        Node::Element(_) => Err(EditorError::NotText(path.clone())),
    }
}

pub fn leaf_mut<'a>(root: &'a mut [Node], path: &Path) -> Result<&'a mut Text> {
    match get_mut(root, path)? {
        Node::Text(t) => Ok(t),
        Node::Element(_) => Err(EditorError::NotText(path.clone())),
    }
}

/// All text leaves in document order, with their paths.
pub fn texts(root: &[Node]) -> Vec<(Path, &Text)> {
    fn walk<'a>(nodes: &'a [Node], prefix: &Path, out: &mut Vec<(Path, &'a Text)>) {
        for (i, node) in nodes.iter().enumerate() {
            let path = prefix.child(i);
            match node {
                Node::Text(t) => out.push((path, t)),
                Node::Element(e) => walk(&e.children, &path, out),
            }
        }
    }

    let mut out = Vec::new();
    walk(root, &Path::root(), &mut out);
    out
}

/// Total number of nodes in the tree.
pub fn count(root: &[Node]) -> usize {
    root.iter()
        .map(|n| match n {
            Node::Text(_) => 1,
            Node::Element(e) => 1 + count(&e.children),
        })
        .sum()
}

/*!
In-memory state document: a tree of named nodes holding text.
*/

use std::collections::BTreeMap;

/// One named node. A node carries either a value or child nodes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StateNode {
    pub name: String,
    pub value: Option<String>,
    pub children: Vec<StateNode>,
}

impl StateNode {
    /// A leaf node holding `value`.
    pub fn value<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            children: Vec::new(),
        }
    }

    /// An empty level node.
    pub fn level<N: Into<String>>(name: N) -> Self {
        Self {
            name: name.into(),
            value: None,
            children: Vec::new(),
        }
    }

    /// True for level nodes, including levels that ended up empty.
    pub fn is_level(&self) -> bool {
        self.value.is_none()
    }

    /// Number of nodes in the subtree rooted here.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(StateNode::node_count).sum::<usize>()
    }
}

/// A complete state document.
///
/// The root is an application-chosen name with optional attributes; only the
/// markup backend writes them, the compact backend writes the children as the
/// top-level object.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StateDocument {
    pub root_name: String,
    pub root_attributes: BTreeMap<String, String>,
    pub children: Vec<StateNode>,
}

impl StateDocument {
    pub fn new<S: Into<String>>(root_name: S) -> Self {
        Self {
            root_name: root_name.into(),
            root_attributes: BTreeMap::new(),
            children: Vec::new(),
        }
    }

    /// Add a root attribute.
    pub fn with_attribute<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.root_attributes.insert(key.into(), value.into());
        self
    }

    /// Number of nodes below the root.
    pub fn node_count(&self) -> usize {
        self.children.iter().map(StateNode::node_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

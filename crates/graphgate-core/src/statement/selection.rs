//! Flat selection tree produced by the query compiler.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Parent id of root nodes.
pub const ROOT_PARENT: i32 = -1;

/// One selected field or table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionNode {
    /// Index of the node in its tree.
    pub id: i32,
    /// Index of the parent node, or [`ROOT_PARENT`].
    pub parent_id: i32,
    /// Field name in the response.
    pub name: String,
    /// Backing table.
    pub table: String,
    /// Selected columns.
    #[serde(default)]
    pub columns: Vec<String>,
    /// Whether the result carries a `<name>_cursor` field.
    #[serde(default)]
    pub cursor: bool,
}

impl SelectionNode {
    pub fn root(id: i32, name: impl Into<String>, table: impl Into<String>) -> Self {
        Self::child(id, ROOT_PARENT, name, table)
    }

    pub fn child(id: i32, parent_id: i32, name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            id,
            parent_id,
            name: name.into(),
            table: table.into(),
            columns: Vec::new(),
            cursor: false,
        }
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_cursor(mut self) -> Self {
        self.cursor = true;
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_id == ROOT_PARENT
    }

    /// Name of the cursor field this node emits.
    pub fn cursor_field(&self) -> Option<String> {
        self.cursor.then(|| format!("{}_cursor", self.name))
    }
}

/// Arena of selection nodes linked by parent index.
///
/// Every node's id equals its index and every parent precedes its children,
/// so walking parent links always terminates at a root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<SelectionNode>", into = "Vec<SelectionNode>")]
pub struct SelectionTree {
    nodes: Vec<SelectionNode>,
}

impl SelectionTree {
    /// Build a tree, validating node ids and parent links.
    pub fn new(nodes: Vec<SelectionNode>) -> Result<Self, Error> {
        for (index, node) in nodes.iter().enumerate() {
            if node.id < 0 || node.id as usize != index {
                return Err(Error::MalformedInput(format!(
                    "selection node '{}' has id {} at index {}",
                    node.name, node.id, index
                )));
            }
            if node.parent_id != ROOT_PARENT && (node.parent_id < 0 || node.parent_id >= node.id) {
                return Err(Error::MalformedInput(format!(
                    "selection node '{}' has invalid parent {}",
                    node.name, node.parent_id
                )));
            }
        }
        Ok(Self { nodes })
    }

    pub fn get(&self, id: i32) -> Option<&SelectionNode> {
        usize::try_from(id).ok().and_then(|i| self.nodes.get(i))
    }

    pub fn nodes(&self) -> &[SelectionNode] {
        &self.nodes
    }

    pub fn roots(&self) -> impl Iterator<Item = &SelectionNode> {
        self.nodes.iter().filter(|n| n.is_root())
    }

    pub fn children(&self, id: i32) -> impl Iterator<Item = &SelectionNode> {
        self.nodes.iter().filter(move |n| n.parent_id == id)
    }

    /// Names from the root down to `id`, inclusive.
    pub fn path(&self, id: i32) -> Vec<&str> {
        let mut path = Vec::new();
        let mut current = self.get(id);
        while let Some(node) = current {
            path.push(node.name.as_str());
            current = if node.is_root() {
                None
            } else {
                self.get(node.parent_id)
            };
        }
        path.reverse();
        path
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl TryFrom<Vec<SelectionNode>> for SelectionTree {
    type Error = Error;

    fn try_from(nodes: Vec<SelectionNode>) -> Result<Self, Self::Error> {
        Self::new(nodes)
    }
}

impl From<SelectionTree> for Vec<SelectionNode> {
    fn from(tree: SelectionTree) -> Self {
        tree.nodes
    }
}

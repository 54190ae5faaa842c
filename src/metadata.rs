//! Metadata tree for listing built tasks.
//!
//! Children are recorded before their parents, so a parent's tree can be
//! assembled as soon as it is created. Append-only for the session.

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt::Write;

#[derive(Debug, Clone)]
struct Entry {
    label: String,
    children: Vec<usize>,
}

/// A node of the rendered tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetadataNode {
    pub label: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nodes: Vec<MetadataNode>,
}

/// Task id -> label and children.
#[derive(Debug, Default)]
pub struct MetadataTree {
    entries: RwLock<IndexMap<usize, Entry>>,
}

impl MetadataTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or relabel) a task.
    pub fn set(&self, id: usize, label: impl Into<String>) {
        let label = label.into();
        let mut entries = self.entries.write();
        match entries.get_mut(&id) {
            Some(entry) => entry.label = label,
            None => {
                entries.insert(
                    id,
                    Entry {
                        label,
                        children: Vec::new(),
                    },
                );
            }
        }
    }

    /// Attach children to an already recorded task.
    pub fn set_children(&self, id: usize, children: Vec<usize>) {
        if let Some(entry) = self.entries.write().get_mut(&id) {
            entry.children = children;
        }
    }

    pub fn label(&self, id: usize) -> Option<String> {
        self.entries.read().get(&id).map(|e| e.label.clone())
    }

    pub fn contains(&self, id: usize) -> bool {
        self.entries.read().contains_key(&id)
    }

    /// The subtree rooted at `id`.
    pub fn tree(&self, id: usize) -> Option<MetadataNode> {
        let entries = self.entries.read();
        build(&entries, id)
    }

    /// Indented text rendering of the given roots.
    pub fn render(&self, roots: &[usize]) -> String {
        let mut out = String::new();
        for root in roots {
            if let Some(node) = self.tree(*root) {
                render_node(&mut out, &node, 0);
            }
        }
        out
    }
}

fn build(entries: &IndexMap<usize, Entry>, id: usize) -> Option<MetadataNode> {
    let entry = entries.get(&id)?;
    Some(MetadataNode {
        label: entry.label.clone(),
        nodes: entry
            .children
            .iter()
            .filter_map(|child| build(entries, *child))
            .collect(),
    })
}

fn render_node(out: &mut String, node: &MetadataNode, depth: usize) {
    let _ = writeln!(out, "{}{}", "  ".repeat(depth), node.label);
    for child in &node.nodes {
        render_node(out, child, depth + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_and_render() {
        let tree = MetadataTree::new();
        tree.set(2, "build:minify");
        tree.set(3, "<concat>");
        tree.set(1, "build");
        tree.set_children(1, vec![2, 3]);

        let node = tree.tree(1).unwrap();
        assert_eq!(node.label, "build");
        assert_eq!(node.nodes.len(), 2);
        assert_eq!(node.nodes[1].label, "<concat>");
        assert_eq!(tree.render(&[1]), "build\n  build:minify\n  <concat>\n");
    }

    #[test]
    fn test_unknown_ids() {
        let tree = MetadataTree::new();
        assert!(tree.tree(7).is_none());
        tree.set_children(7, vec![1]);
        assert!(!tree.contains(7));
        assert_eq!(tree.render(&[7]), "");
    }
}

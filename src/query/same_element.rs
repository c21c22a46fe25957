//! Scopes the terms inside same-element groups to their struct field
//!
//! `same_element(view = "attrs") { key:color, value:red }` becomes a group
//! over `attrs.key` and `attrs.value`, so view resolution and slot
//! reservation see the nested fields and not the top-level ones.

use super::ast::{walk_node_mut, Node, NodeKind, VisitMut};
use super::types::TermHeader;

/// Rewrite every same-element group in `root`
pub fn rewrite_same_element(root: &mut Node) {
    SameElementRewriter.visit_node_mut(root);
}

struct SameElementRewriter;

impl VisitMut for SameElementRewriter {
    fn visit_node_mut(&mut self, node: &mut Node) {
        if let Node::SameElement(group) = node {
            if !group.header.view.is_empty() {
                let mut prefixer = ViewPrefixer {
                    prefix: format!("{}.", group.header.view),
                };
                for child in group.children.iter_mut() {
                    prefixer.visit_node_mut(child);
                }
            }
        }
        walk_node_mut(self, node);
    }
}

struct ViewPrefixer {
    prefix: String,
}

impl VisitMut for ViewPrefixer {
    fn visit_header_mut(&mut self, _kind: NodeKind, header: &mut TermHeader) {
        if !header.view.starts_with(&self.prefix) {
            header.view = format!("{}{}", self.prefix, header.view);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn views(node: &Node) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(h) = node.header() {
            out.push(h.view.clone());
        }
        for c in node.children() {
            out.extend(views(c));
        }
        out
    }

    #[test]
    fn test_children_are_prefixed() {
        let mut root = Node::and(vec![
            Node::word(1, "title", "rust"),
            Node::same_element(
                2,
                "attrs",
                vec![Node::word(3, "key", "color"), Node::word(4, "value", "red")],
            ),
        ]);
        rewrite_same_element(&mut root);
        assert_eq!(views(&root), vec!["title", "attrs", "attrs.key", "attrs.value"]);
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let mut root = Node::same_element(1, "attrs", vec![Node::word(2, "key", "color")]);
        rewrite_same_element(&mut root);
        let once = root.clone();
        rewrite_same_element(&mut root);
        assert_eq!(root, once);
    }

    #[test]
    fn test_groups_are_scoped_separately() {
        let mut root = Node::or(vec![
            Node::same_element(1, "a", vec![Node::word(2, "k", "x")]),
            Node::same_element(3, "b", vec![Node::word(4, "k", "x")]),
        ]);
        rewrite_same_element(&mut root);
        assert_eq!(views(&root), vec!["a", "a.k", "b", "b.k"]);
    }
}

//! Chooses how positional operators unpack their postings
//!
//! Phrase and same-element operators are expensive to unpack. With `delay`
//! they are marked lazy so conjunctions evaluate them last. With `split`,
//! an operator directly under an And is marked split and the And receives
//! unranked copies of its word terms, which filter documents before the
//! positional check runs.

use tracing::warn;

use super::ast::{Node, TermNode};
use super::types::{TermId, TermKind, Unpacking};
use crate::config::UnpackingFlags;

/// Annotate `root` according to `flags`
pub fn optimize_unpacking(root: Node, has_white_list: bool, flags: UnpackingFlags) -> Node {
    if flags.is_noop() {
        return root;
    }
    let mut next_id = TermId::first_free(root.max_term_id());

    // The white list is conjoined later; a bare positional root still
    // needs an And to hold its filter terms.
    let mut root = if flags.split && has_white_list && is_positional(&root) {
        Node::and(vec![root])
    } else {
        root
    };
    annotate(&mut root, flags, &mut next_id);
    root
}

fn is_positional(node: &Node) -> bool {
    matches!(node, Node::Phrase(_) | Node::SameElement(_))
}

fn annotate(node: &mut Node, flags: UnpackingFlags, next_id: &mut Option<TermId>) {
    if let Some(children) = node.children_mut() {
        for child in children.iter_mut() {
            annotate(child, flags, next_id);
        }
    }

    if flags.delay && is_positional(node) {
        if let Some(header) = node.header_mut() {
            header.unpacking = Unpacking::Lazy;
        }
    }

    if flags.split {
        if let Node::And(and) = node {
            let mut copies = Vec::new();
            for child in and.children.iter_mut().filter(|c| is_positional(c)) {
                if let Some(header) = child.header_mut() {
                    header.unpacking = Unpacking::Split;
                }
                copies.extend(unranked_word_copies(child, next_id));
            }
            and.children.extend(copies);
        }
    }
}

fn unranked_word_copies(node: &Node, next_id: &mut Option<TermId>) -> Vec<Node> {
    let mut copies = Vec::new();
    for child in node.children() {
        match child {
            Node::Term(term) if term.kind == TermKind::Word => {
                let Some(id) = *next_id else {
                    warn!(term = %term.header.id, "No free term id for unranked copy, skipping");
                    continue;
                };
                let mut header = term.header.clone();
                header.id = id;
                header.ranked = false;
                header.unpacking = Unpacking::Eager;
                header.fields.clear();
                *next_id = id.next();
                copies.push(Node::Term(TermNode {
                    header,
                    term: term.term.clone(),
                    kind: TermKind::Word,
                }));
            }
            other => copies.extend(unranked_word_copies(other, next_id)),
        }
    }
    copies
}

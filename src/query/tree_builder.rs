//! Builds the typed query tree from a serialized stack

use std::collections::HashSet;

use super::ast::{Intermediate, Node, Proximity, TermGroup, TermNode, WeightedSetTerm, WeightedToken};
use super::stack::{ItemHeader, ItemType, StackDumpIterator, StackItem};
use super::types::{TermHeader, TermId, Weight};
use crate::error::{MatchError, Result};

/// Deepest nesting accepted before the stack is rejected
pub const MAX_STACK_DEPTH: usize = 256;

pub struct QueryTreeCreator;

impl QueryTreeCreator {
    /// Decode `stack` into a query tree.
    ///
    /// Any corruption yields an error; no partial tree is ever returned.
    pub fn create(stack: &[u8]) -> Result<Node> {
        if stack.is_empty() {
            return Err(MatchError::EmptyStack);
        }

        let mut items = StackDumpIterator::new(stack);
        let root = Self::build_node(&mut items, 0)?;
        if items.has_remaining() {
            return Err(MatchError::malformed("trailing bytes after root item"));
        }

        let mut seen = HashSet::new();
        for id in root.term_ids() {
            if !seen.insert(id) {
                return Err(MatchError::malformed(format!("duplicate term id {}", id)));
            }
        }
        Ok(root)
    }

    fn build_node(items: &mut StackDumpIterator<'_>, depth: usize) -> Result<Node> {
        if depth > MAX_STACK_DEPTH {
            return Err(MatchError::malformed("query stack nested too deeply"));
        }
        let item = items
            .next()
            .ok_or_else(|| MatchError::malformed("stack ended before all children were read"))??;

        let node = match item {
            StackItem::Intermediate { item_type, arity } => {
                let children = Self::build_children(items, arity, depth)?;
                let inner = Intermediate { children };
                match item_type {
                    ItemType::And => Node::And(inner),
                    ItemType::Or => Node::Or(inner),
                    ItemType::AndNot => Node::AndNot(inner),
                    _ => Node::Rank(inner),
                }
            }
            StackItem::Proximity {
                item_type,
                arity,
                window,
            } => {
                let children = Self::build_children(items, arity, depth)?;
                let inner = Proximity { window, children };
                if item_type == ItemType::Near {
                    Node::Near(inner)
                } else {
                    Node::ONear(inner)
                }
            }
            StackItem::Group {
                item_type,
                arity,
                header,
            } => {
                let children = Self::build_children(items, arity, depth)?;
                if item_type == ItemType::Phrase
                    && children.iter().any(|c| !matches!(c, Node::Term(_)))
                {
                    return Err(MatchError::malformed("phrase may only contain terms"));
                }
                let group = TermGroup {
                    header: term_header(header),
                    children,
                };
                match item_type {
                    ItemType::Phrase => Node::Phrase(group),
                    ItemType::SameElement => Node::SameElement(group),
                    _ => Node::Equiv(group),
                }
            }
            StackItem::WeightedSet { header, tokens } => Node::WeightedSet(WeightedSetTerm {
                header: term_header(header),
                tokens: tokens
                    .into_iter()
                    .map(|(token, weight)| WeightedToken {
                        token,
                        weight: Weight(weight),
                    })
                    .collect(),
            }),
            StackItem::Term { kind, header, term } => Node::Term(TermNode {
                header: term_header(header),
                term,
                kind,
            }),
        };
        Ok(node)
    }

    fn build_children(
        items: &mut StackDumpIterator<'_>,
        arity: u32,
        depth: usize,
    ) -> Result<Vec<Node>> {
        (0..arity)
            .map(|_| Self::build_node(items, depth + 1))
            .collect()
    }
}

fn term_header(item: ItemHeader) -> TermHeader {
    let mut header = TermHeader::new(TermId(item.id), item.view, Weight(item.weight));
    header.ranked = item.ranked;
    header
}

//! Term descriptors for ranking setup

use serde::Serialize;

use super::ast::{Node, NodeKind};
use super::types::{TermId, Weight};
use crate::match_data::SlotHandle;

/// One concrete field of a ranked term
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TermFieldData {
    pub field_id: u32,
    pub name: String,
    #[serde(skip)]
    pub handle: Option<SlotHandle>,
}

/// What the ranking framework needs to know about a term
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TermData {
    pub id: TermId,
    pub kind: &'static str,
    pub view: String,
    pub weight: Weight,
    /// Number of leaf terms this term stands for (phrase length)
    pub phrase_length: usize,
    pub fields: Vec<TermFieldData>,
}

/// Ranked terms in pre-order.
///
/// Phrases, equivs and weighted sets count as one term; their children are
/// not reported separately. Same-element groups report their children.
pub fn extract_terms(root: &Node) -> Vec<TermData> {
    let mut terms = Vec::new();
    collect(root, &mut terms);
    terms
}

fn collect(node: &Node, out: &mut Vec<TermData>) {
    match node.kind() {
        NodeKind::Term | NodeKind::Phrase | NodeKind::Equiv | NodeKind::WeightedSet => {
            if let Some(header) = node.header().filter(|h| h.ranked) {
                out.push(TermData {
                    id: header.id,
                    kind: node.kind().name(),
                    view: header.view.clone(),
                    weight: header.weight,
                    phrase_length: if node.kind() == NodeKind::Phrase {
                        node.children().len()
                    } else {
                        1
                    },
                    fields: header
                        .fields
                        .iter()
                        .map(|f| TermFieldData {
                            field_id: f.field_id,
                            name: f.name.clone(),
                            handle: f.handle,
                        })
                        .collect(),
                });
            }
        }
        _ => {
            for child in node.children() {
                collect(child, out);
            }
        }
    }
}

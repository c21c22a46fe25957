//! Query tree to blueprint

use tracing::trace;

use super::leaf::{LeafSpec, RequestContext, SearchContext};
use super::{Blueprint, Op};
use crate::match_data::SlotHandle;
use crate::query::ast::Node;
use crate::query::types::{FieldBinding, TermHeader, TermId, TermKind};

pub struct BlueprintBuilder<'r, 'a> {
    request: &'r RequestContext,
    context: &'a dyn SearchContext,
}

impl<'r, 'a> BlueprintBuilder<'r, 'a> {
    /// Build the blueprint for `root` and set its doc-id limit
    pub fn build(
        request: &'r RequestContext,
        root: &Node,
        context: &'a dyn SearchContext,
    ) -> Blueprint<'a> {
        let builder = Self { request, context };
        let mut blueprint = builder.build_node(root);
        blueprint.set_doc_id_limit(context.doc_id_limit());
        blueprint
    }

    fn build_node(&self, node: &Node) -> Blueprint<'a> {
        match node {
            Node::Term(term) => self.build_term(&term.header, &term.term, term.kind, true),
            Node::And(i) => self.build_intermediate(Op::And, &i.children),
            Node::Or(i) => self.build_intermediate(Op::Or, &i.children),
            Node::AndNot(i) => self.build_intermediate(Op::AndNot, &i.children),
            Node::Rank(i) => self.build_intermediate(Op::Rank, &i.children),
            Node::Near(p) => self.build_intermediate(Op::Near { window: p.window }, &p.children),
            Node::ONear(p) => self.build_intermediate(Op::ONear { window: p.window }, &p.children),
            Node::Phrase(g) => self.build_group(Op::Phrase, &g.header, &g.children),
            Node::SameElement(g) => self.build_group(Op::SameElement, &g.header, &g.children),
            Node::Equiv(g) => self.build_group(Op::Equiv, &g.header, &g.children),
            Node::WeightedSet(ws) => {
                let tokens = ws
                    .tokens
                    .iter()
                    .map(|t| {
                        self.build_term(&ws.header, &t.token, TermKind::Word, false)
                            .with_weight(t.weight.0)
                    })
                    .collect();
                let mut bp = Blueprint::intermediate(Op::WeightedSet, tokens)
                    .with_unpack(handles(&ws.header), ws.header.weight.0);
                bp.set_expensive(ws.header.unpacking.is_expensive());
                bp
            }
        }
    }

    fn build_intermediate(&self, op: Op, children: &[Node]) -> Blueprint<'a> {
        Blueprint::intermediate(op, children.iter().map(|c| self.build_node(c)).collect())
    }

    fn build_group(&self, op: Op, header: &TermHeader, children: &[Node]) -> Blueprint<'a> {
        let mut bp = self
            .build_intermediate(op, children)
            .with_unpack(handles(header), header.weight.0);
        bp.set_expensive(header.unpacking.is_expensive());
        bp
    }

    /// One leaf per resolved field; several fields become an Or in
    /// resolver order
    fn build_term(&self, header: &TermHeader, term: &str, kind: TermKind, unpack: bool) -> Blueprint<'a> {
        let mut leaves: Vec<Blueprint<'a>> = header
            .fields
            .iter()
            .map(|field| self.build_field_leaf(header.id, field, term, kind, header.weight.0, unpack))
            .collect();
        let mut bp = match leaves.len() {
            0 => Blueprint::empty(),
            1 => leaves.remove(0),
            _ => Blueprint::intermediate(Op::Or, leaves),
        };
        if !bp.is_empty_leaf() {
            bp.set_expensive(header.unpacking.is_expensive());
        }
        bp
    }

    fn build_field_leaf(
        &self,
        term_id: TermId,
        field: &FieldBinding,
        term: &str,
        kind: TermKind,
        weight: i32,
        unpack: bool,
    ) -> Blueprint<'a> {
        let searchable = if field.is_attribute {
            self.context.attributes()
        } else {
            self.context.indexes()
        };
        let spec = LeafSpec {
            term_id,
            field,
            term,
            kind,
        };
        let handle = if unpack { field.handle } else { None };
        match searchable.create_leaf(self.request, &spec) {
            Some(search) => {
                trace!(term_id = %term_id, field = %field.name, "Created leaf");
                Blueprint::leaf(search, handle, weight)
            }
            None => {
                trace!(term_id = %term_id, field = %field.name, "Field has no searchable data");
                Blueprint::empty()
            }
        }
    }
}

fn handles(header: &TermHeader) -> Vec<SlotHandle> {
    header.fields.iter().filter_map(|f| f.handle).collect()
}

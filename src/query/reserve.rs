//! Match-data slot reservation

use super::ast::{Node, NodeKind, VisitMut};
use super::types::TermHeader;
use crate::match_data::MatchDataLayout;

/// Reserve one slot per (term, field) binding, in pre-order
pub fn reserve_match_data(root: &mut Node, layout: &mut MatchDataLayout) {
    MatchDataReserveVisitor { layout }.visit_node_mut(root);
}

struct MatchDataReserveVisitor<'a> {
    layout: &'a mut MatchDataLayout,
}

impl<'a> VisitMut for MatchDataReserveVisitor<'a> {
    fn visit_header_mut(&mut self, _kind: NodeKind, header: &mut TermHeader) {
        for field in header.fields.iter_mut() {
            field.handle = Some(self.layout.alloc(header.id, field.field_id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::match_data::SlotHandle;
    use crate::query::types::{FieldBinding, TermId};

    fn bind(node: &mut Node, fields: &[u32]) {
        node.header_mut().unwrap().fields =
            fields.iter().map(|&id| FieldBinding::new(id, format!("f{}", id), false)).collect();
    }

    #[test]
    fn test_pre_order_slots() {
        let mut a = Node::word(1, "a", "x");
        let mut b = Node::word(2, "b", "y");
        bind(&mut a, &[0, 1]);
        bind(&mut b, &[0]);
        let mut root = Node::or(vec![a, b]);

        let mut layout = MatchDataLayout::new();
        reserve_match_data(&mut root, &mut layout);

        assert_eq!(layout.len(), 3);
        let first = &root.children()[0].header().unwrap().fields;
        assert_eq!(first[0].handle, Some(SlotHandle(0)));
        assert_eq!(first[1].handle, Some(SlotHandle(1)));
        assert_eq!(layout.lookup(TermId(2), 0), Some(SlotHandle(2)));
    }

    #[test]
    fn test_unbound_term_gets_no_slot() {
        let mut root = Node::word(1, "missing", "x");
        let mut layout = MatchDataLayout::new();
        reserve_match_data(&mut root, &mut layout);
        assert!(layout.is_empty());
    }
}

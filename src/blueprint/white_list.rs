//! Conjoining a visibility filter into a built blueprint
//!
//! The filter must restrict the matching set without touching ranking-only
//! or excluding children. It is therefore attached below the deepest node
//! of the chain of Rank/AndNot nodes starting at the root, next to that
//! node's first child.

use super::{Blueprint, Op};

/// Merge `white_list` into `root` and re-propagate the doc-id limit
pub fn merge_white_list<'a>(
    mut root: Blueprint<'a>,
    white_list: Blueprint<'a>,
    doc_id_limit: u32,
) -> Blueprint<'a> {
    if has_matching_child(&root) {
        let node = deepest_rank_or_and_not(&mut root);
        let first = node.remove_child(0);
        node.insert_child(0, Blueprint::intermediate(Op::And, vec![first, white_list]));
    } else {
        root = Blueprint::intermediate(Op::And, vec![root, white_list]);
    }
    root.set_doc_id_limit(doc_id_limit);
    root
}

fn has_matching_child(bp: &Blueprint<'_>) -> bool {
    bp.is_rank_or_and_not() && bp.child_count() > 0
}

/// Last node of the Rank/AndNot chain that starts at `bp`
fn deepest_rank_or_and_not<'b, 'a>(bp: &'b mut Blueprint<'a>) -> &'b mut Blueprint<'a> {
    if has_matching_child(bp.child(0)) {
        deepest_rank_or_and_not(bp.child_mut(0))
    } else {
        bp
    }
}

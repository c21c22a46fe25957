//! Cost-based blueprint rewriting
//!
//! Each pass rewrites bottom-up:
//!
//! - And: nested Ands are flattened; children are ordered by ascending
//!   estimate with expensive children last.
//! - Or: nested Ors are flattened, empty children dropped and the rest
//!   ordered by descending estimate.
//! - AndNot: a leading AndNot is flattened, empty negatives dropped and the
//!   negatives ordered by descending estimate.
//! - Rank: empty ranking-only children are dropped.
//!
//! Sorting is stable and positional operators keep their order, so a pass
//! over an already optimized tree changes nothing.

use std::cmp::Reverse;
use std::sync::Arc;

use tracing::debug;

use super::{Blueprint, BlueprintKind, GlobalFilter, Op};

/// Run one rewrite pass over `bp`
pub fn optimize(mut bp: Blueprint<'_>) -> Blueprint<'_> {
    bp.assert_mutable("optimize");
    if let BlueprintKind::Intermediate { op, children, .. } = &mut bp.kind {
        let optimized: Vec<Blueprint<'_>> = std::mem::take(children).into_iter().map(optimize).collect();
        *children = match op {
            Op::And => optimize_and(optimized),
            Op::Or => optimize_or(optimized),
            Op::AndNot => optimize_and_not(optimized),
            Op::Rank => optimize_rank(optimized),
            _ => optimized,
        };
    }
    bp.update_state();
    bp
}

fn est(bp: &Blueprint<'_>) -> u64 {
    bp.state.estimate.est_hits
}

fn is_empty(bp: &Blueprint<'_>) -> bool {
    bp.state.estimate.empty
}

/// An intermediate of `op` without own slots that can be merged into its parent
fn is_plain(bp: &Blueprint<'_>, op: Op) -> bool {
    match &bp.kind {
        BlueprintKind::Intermediate { op: own, handles, .. } => {
            *own == op && handles.is_empty() && !bp.state.expensive
        }
        _ => false,
    }
}

fn into_children(bp: Blueprint<'_>) -> Vec<Blueprint<'_>> {
    match bp.kind {
        BlueprintKind::Intermediate { children, .. } => children,
        _ => Vec::new(),
    }
}

fn flatten(children: Vec<Blueprint<'_>>, op: Op) -> Vec<Blueprint<'_>> {
    let mut out = Vec::with_capacity(children.len());
    for child in children {
        if is_plain(&child, op) {
            out.extend(into_children(child));
        } else {
            out.push(child);
        }
    }
    out
}

fn optimize_and(children: Vec<Blueprint<'_>>) -> Vec<Blueprint<'_>> {
    let mut children = flatten(children, Op::And);
    children.sort_by_key(|c| (c.state.expensive, est(c)));
    children
}

fn optimize_or(children: Vec<Blueprint<'_>>) -> Vec<Blueprint<'_>> {
    let mut children = flatten(children, Op::Or);
    if children.iter().any(|c| !is_empty(c)) {
        children.retain(|c| !is_empty(c));
    } else {
        children.truncate(1);
    }
    children.sort_by_key(|c| Reverse(est(c)));
    children
}

fn optimize_and_not(mut children: Vec<Blueprint<'_>>) -> Vec<Blueprint<'_>> {
    if children.first().map_or(false, |c| is_plain(c, Op::AndNot)) {
        let rest = children.split_off(1);
        let mut merged = children.into_iter().flat_map(into_children).collect::<Vec<_>>();
        merged.extend(rest);
        children = merged;
    }
    if children.len() > 1 {
        let mut negatives = children.split_off(1);
        negatives.retain(|c| !is_empty(c));
        negatives.sort_by_key(|c| Reverse(est(c)));
        children.extend(negatives);
    }
    children
}

fn optimize_rank(mut children: Vec<Blueprint<'_>>) -> Vec<Blueprint<'_>> {
    if children.len() > 1 {
        let mut ranking = children.split_off(1);
        ranking.retain(|c| !is_empty(c));
        children.extend(ranking);
    }
    children
}

/// Where the two-phase protocol stands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OptimizePhase {
    Built,
    Optimized,
    FilterAttached,
    Done,
}

/// Optimize, attach the global filter if any node asks for it, optimize
/// again. The rewrite never runs more than twice.
#[derive(Debug)]
pub struct TwoPhaseOptimizer {
    phase: OptimizePhase,
    passes: u32,
}

impl Default for TwoPhaseOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TwoPhaseOptimizer {
    pub const MAX_PASSES: u32 = 2;

    pub fn new() -> Self {
        Self {
            phase: OptimizePhase::Built,
            passes: 0,
        }
    }

    pub fn phase(&self) -> OptimizePhase {
        self.phase
    }

    pub fn passes(&self) -> u32 {
        self.passes
    }

    /// Advance the protocol; `make_filter` is only called if the optimized
    /// tree wants a global filter
    pub fn run<'a, F>(&mut self, bp: Blueprint<'a>, make_filter: F) -> Blueprint<'a>
    where
        F: FnOnce(&Blueprint<'a>) -> Arc<GlobalFilter>,
    {
        match self.phase {
            OptimizePhase::Built => {
                let mut bp = self.pass(bp);
                self.phase = OptimizePhase::Optimized;
                if bp.state.want_global_filter {
                    let filter = make_filter(&bp);
                    debug!(eligible = filter.count(), "Attaching global filter");
                    bp.set_global_filter(&filter);
                    self.phase = OptimizePhase::FilterAttached;
                    bp = self.pass(bp);
                    self.phase = OptimizePhase::Done;
                }
                bp
            }
            OptimizePhase::Optimized | OptimizePhase::FilterAttached => {
                let bp = self.pass(bp);
                self.phase = OptimizePhase::Done;
                bp
            }
            OptimizePhase::Done => {
                debug!("Blueprint already optimized twice, skipping");
                bp
            }
        }
    }

    fn pass<'a>(&mut self, bp: Blueprint<'a>) -> Blueprint<'a> {
        self.passes += 1;
        assert!(
            self.passes <= Self::MAX_PASSES,
            "optimizer pass {} exceeds the limit of {}",
            self.passes,
            Self::MAX_PASSES
        );
        optimize(bp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blueprint::tests::{estimates, leaf, FixedLeaf};

    fn sensitive(docs: &[u32]) -> Blueprint<'static> {
        let mut search = FixedLeaf::boxed(docs);
        search.filter_sensitive = true;
        Blueprint::leaf(search, None, 100)
    }

    fn limited(mut bp: Blueprint<'static>) -> Blueprint<'static> {
        bp.set_doc_id_limit(100);
        bp
    }

    #[test]
    fn test_and_sorts_ascending_and_flattens() {
        let root = limited(Blueprint::intermediate(
            Op::And,
            vec![
                leaf(&[1, 2, 3]),
                Blueprint::intermediate(Op::And, vec![leaf(&[1, 2]), leaf(&[1, 2, 3, 4])]),
                leaf(&[1]),
            ],
        ));
        let root = optimize(root);
        assert_eq!(root.child_count(), 4);
        assert_eq!(estimates(&root), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_and_puts_expensive_last() {
        let mut lazy = leaf(&[1]);
        lazy.set_expensive(true);
        let root = optimize(limited(Blueprint::intermediate(Op::And, vec![lazy, leaf(&[1, 2, 3])])));
        assert_eq!(estimates(&root), vec![3, 1]);
        assert!(root.child(1).state().is_expensive());
    }

    #[test]
    fn test_or_drops_empty_and_sorts_descending() {
        let root = limited(Blueprint::intermediate(
            Op::Or,
            vec![leaf(&[1]), Blueprint::empty(), leaf(&[1, 2, 3]), leaf(&[])],
        ));
        let root = optimize(root);
        assert_eq!(estimates(&root), vec![3, 1]);

        let all_empty = optimize(limited(Blueprint::intermediate(
            Op::Or,
            vec![Blueprint::empty(), Blueprint::empty()],
        )));
        assert_eq!(all_empty.child_count(), 1);
    }

    #[test]
    fn test_and_not_flattens_leading_and_not() {
        let root = limited(Blueprint::intermediate(
            Op::AndNot,
            vec![
                Blueprint::intermediate(Op::AndNot, vec![leaf(&[1, 2, 3, 4]), leaf(&[1])]),
                leaf(&[1, 2]),
                Blueprint::empty(),
            ],
        ));
        let root = optimize(root);
        assert_eq!(estimates(&root), vec![4, 2, 1]);
    }

    #[test]
    fn test_rank_keeps_first_child_even_if_empty() {
        let root = limited(Blueprint::intermediate(
            Op::Rank,
            vec![Blueprint::empty(), leaf(&[1]), Blueprint::empty()],
        ));
        let root = optimize(root);
        assert_eq!(root.child_count(), 2);
        assert!(root.child(0).is_empty_leaf());
    }

    #[test]
    fn test_positional_order_is_kept() {
        let root = limited(Blueprint::intermediate(
            Op::Phrase,
            vec![leaf(&[1, 2, 3]), leaf(&[1])],
        ));
        assert_eq!(estimates(&optimize(root)), vec![3, 1]);
    }

    #[test]
    fn test_optimize_is_idempotent() {
        let root = limited(Blueprint::intermediate(
            Op::Or,
            vec![
                leaf(&[1]),
                Blueprint::intermediate(Op::And, vec![leaf(&[1, 2]), leaf(&[2])]),
                leaf(&[1, 2, 3]),
            ],
        ));
        let once = optimize(root);
        let dump = once.as_string();
        let twice = optimize(once);
        assert_eq!(twice.as_string(), dump);
    }

    #[test]
    fn test_two_phase_without_filter() {
        let mut optimizer = TwoPhaseOptimizer::new();
        let bp = limited(Blueprint::intermediate(Op::And, vec![leaf(&[1, 2]), leaf(&[1])]));
        let bp = optimizer.run(bp, |_| panic!("no filter wanted"));
        assert_eq!(optimizer.phase(), OptimizePhase::Optimized);
        let dump = bp.as_string();

        let bp = optimizer.run(bp, |_| panic!("no filter wanted"));
        assert_eq!(optimizer.phase(), OptimizePhase::Done);
        assert_eq!(bp.as_string(), dump);

        let bp = optimizer.run(bp, |_| panic!("no filter wanted"));
        assert_eq!(optimizer.passes(), 2);
        assert_eq!(bp.as_string(), dump);
    }

    #[test]
    fn test_two_phase_attaches_filter_and_reorders() {
        let mut optimizer = TwoPhaseOptimizer::new();
        // 3 hits overall, 1 inside the filter
        let bp = limited(Blueprint::intermediate(
            Op::And,
            vec![leaf(&[10, 11]), sensitive(&[1, 50, 60])],
        ));
        let mut calls = 0;
        let bp = optimizer.run(bp, |_| {
            calls += 1;
            let wl: roaring::RoaringBitmap = [1u32, 10].into_iter().collect();
            GlobalFilter::create(Some(&wl), 100)
        });
        assert_eq!(calls, 1);
        assert_eq!(optimizer.phase(), OptimizePhase::Done);
        assert_eq!(optimizer.passes(), 2);
        assert_eq!(estimates(&bp), vec![1, 2]);
        assert!(bp.child(0).state().want_global_filter());
    }
}

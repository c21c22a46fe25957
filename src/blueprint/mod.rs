//! Blueprints: the cost-annotated plan built from a query tree
//!
//! A blueprint tree mirrors the query tree. Leaves wrap a [`LeafSearch`]
//! borrowed from storage; intermediates combine child estimates according
//! to their operator. The tree is mutable until [`Blueprint::freeze`];
//! afterwards only [`Blueprint::create_search`] may be called, any number
//! of times and from any number of threads.

pub mod builder;
pub mod global_filter;
pub mod leaf;
pub mod optimizer;
pub mod white_list;

use std::fmt::Write as _;
use std::sync::Arc;

use roaring::RoaringBitmap;

pub use global_filter::GlobalFilter;
pub use leaf::{LeafSearch, LeafSpec, RequestContext, SearchContext, Searchable, WhiteListLeaf};
pub use optimizer::{OptimizePhase, TwoPhaseOptimizer};

use crate::error::{MatchError, Result};
use crate::eval::Aggr;
use crate::match_data::{MatchData, SlotHandle};
use crate::search::{
    AndIterator, AndNotIterator, EmptyIterator, OrIterator, RankIterator, SearchIterator,
    UnpackRecorder, WeightedSetIterator,
};

/// Estimated number of hits
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HitEstimate {
    pub est_hits: u64,
    pub empty: bool,
}

impl Default for HitEstimate {
    fn default() -> Self {
        Self::empty()
    }
}

impl HitEstimate {
    pub fn new(est_hits: u64, empty: bool) -> Self {
        Self { est_hits, empty }
    }

    pub fn empty() -> Self {
        Self {
            est_hits: 0,
            empty: true,
        }
    }

    /// Fraction of the corpus expected to match
    pub fn hit_ratio(&self, doc_id_limit: u32) -> f64 {
        if self.empty {
            return 0.0;
        }
        if doc_id_limit == 0 {
            return 1.0;
        }
        (self.est_hits as f64 / doc_id_limit as f64).min(1.0)
    }
}

/// Execution hints passed down while fetching postings
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ExecuteInfo {
    /// The iterator drives the search and must find every hit itself
    pub strict: bool,
    /// Expected fraction of documents the iterator will be asked about
    pub hit_rate: f64,
}

impl ExecuteInfo {
    pub const TRUE: ExecuteInfo = ExecuteInfo {
        strict: true,
        hit_rate: 1.0,
    };
    pub const FALSE: ExecuteInfo = ExecuteInfo {
        strict: false,
        hit_rate: 1.0,
    };

    pub fn create(strict: bool, hit_rate: f64) -> Self {
        Self {
            strict,
            hit_rate: hit_rate.clamp(0.0, 1.0),
        }
    }
}

/// Planning state of a blueprint node
#[derive(Clone, Debug, Default, PartialEq)]
pub struct State {
    estimate: HitEstimate,
    cost: f64,
    doc_id_limit: u32,
    want_global_filter: bool,
    expensive: bool,
    frozen: bool,
}

impl State {
    pub fn estimate(&self) -> HitEstimate {
        self.estimate
    }

    pub fn cost(&self) -> f64 {
        self.cost
    }

    pub fn doc_id_limit(&self) -> u32 {
        self.doc_id_limit
    }

    pub fn want_global_filter(&self) -> bool {
        self.want_global_filter
    }

    /// Lazily or split unpacked; conjunctions evaluate it last
    pub fn is_expensive(&self) -> bool {
        self.expensive
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}

/// Intermediate operators
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    And,
    Or,
    AndNot,
    Rank,
    Near { window: u32 },
    ONear { window: u32 },
    Phrase,
    SameElement,
    Equiv,
    WeightedSet,
}

impl Op {
    pub fn name(&self) -> &'static str {
        match self {
            Op::And => "and",
            Op::Or => "or",
            Op::AndNot => "and_not",
            Op::Rank => "rank",
            Op::Near { .. } => "near",
            Op::ONear { .. } => "onear",
            Op::Phrase => "phrase",
            Op::SameElement => "same_element",
            Op::Equiv => "equiv",
            Op::WeightedSet => "weighted_set",
        }
    }

    /// Matches only where every child matches
    pub fn is_and_like(&self) -> bool {
        matches!(
            self,
            Op::And | Op::Near { .. } | Op::ONear { .. } | Op::Phrase | Op::SameElement
        )
    }

    /// Matches where any child matches
    pub fn is_or_like(&self) -> bool {
        matches!(self, Op::Or | Op::Equiv | Op::WeightedSet)
    }

    pub fn is_positional(&self) -> bool {
        matches!(
            self,
            Op::Near { .. } | Op::ONear { .. } | Op::Phrase | Op::SameElement
        )
    }
}

#[derive(Debug)]
enum BlueprintKind<'a> {
    Leaf {
        search: Box<dyn LeafSearch + 'a>,
        handle: Option<SlotHandle>,
    },
    Empty,
    Intermediate {
        op: Op,
        children: Vec<Blueprint<'a>>,
        /// The operator's own match-data slots
        handles: Vec<SlotHandle>,
    },
}

#[derive(Debug)]
pub struct Blueprint<'a> {
    state: State,
    weight: i32,
    kind: BlueprintKind<'a>,
}

impl<'a> Blueprint<'a> {
    pub fn leaf(search: Box<dyn LeafSearch + 'a>, handle: Option<SlotHandle>, weight: i32) -> Self {
        let mut bp = Self {
            state: State::default(),
            weight,
            kind: BlueprintKind::Leaf { search, handle },
        };
        bp.update_state();
        bp
    }

    pub fn empty() -> Self {
        Self {
            state: State::default(),
            weight: 0,
            kind: BlueprintKind::Empty,
        }
    }

    pub fn intermediate(op: Op, children: Vec<Blueprint<'a>>) -> Self {
        let mut bp = Self {
            state: State::default(),
            weight: 0,
            kind: BlueprintKind::Intermediate {
                op,
                children,
                handles: Vec::new(),
            },
        };
        bp.update_state();
        bp
    }

    /// Leaf over a visibility bitmap
    pub fn white_list(bits: Arc<RoaringBitmap>) -> Self {
        Self::leaf(Box::new(WhiteListLeaf::new(bits)), None, 0)
    }

    /// Give an intermediate its own match-data slots
    pub fn with_unpack(mut self, handles: Vec<SlotHandle>, weight: i32) -> Self {
        self.assert_mutable("with_unpack");
        match &mut self.kind {
            BlueprintKind::Intermediate { handles: own, .. } => *own = handles,
            _ => panic!("with_unpack on a non-intermediate blueprint"),
        }
        self.weight = weight;
        self
    }

    pub fn with_weight(mut self, weight: i32) -> Self {
        self.assert_mutable("with_weight");
        self.weight = weight;
        self
    }

    pub fn set_expensive(&mut self, expensive: bool) {
        self.assert_mutable("set_expensive");
        self.state.expensive = expensive;
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn weight(&self) -> i32 {
        self.weight
    }

    pub fn is_frozen(&self) -> bool {
        self.state.frozen
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, BlueprintKind::Leaf { .. })
    }

    pub fn is_empty_leaf(&self) -> bool {
        matches!(self.kind, BlueprintKind::Empty)
    }

    pub fn op(&self) -> Option<Op> {
        match &self.kind {
            BlueprintKind::Intermediate { op, .. } => Some(*op),
            _ => None,
        }
    }

    pub fn is_rank_or_and_not(&self) -> bool {
        matches!(self.op(), Some(Op::Rank) | Some(Op::AndNot))
    }

    pub fn children(&self) -> &[Blueprint<'a>] {
        match &self.kind {
            BlueprintKind::Intermediate { children, .. } => children,
            _ => &[],
        }
    }

    pub fn child_count(&self) -> usize {
        self.children().len()
    }

    pub fn child(&self, index: usize) -> &Blueprint<'a> {
        &self.children()[index]
    }

    pub fn child_mut(&mut self, index: usize) -> &mut Blueprint<'a> {
        match &mut self.kind {
            BlueprintKind::Intermediate { children, .. } => &mut children[index],
            _ => panic!("child_mut on a leaf blueprint"),
        }
    }

    /// Slots written by this node itself
    pub fn own_handles(&self) -> Vec<SlotHandle> {
        match &self.kind {
            BlueprintKind::Leaf { handle, .. } => handle.iter().copied().collect(),
            BlueprintKind::Empty => Vec::new(),
            BlueprintKind::Intermediate { handles, .. } => handles.clone(),
        }
    }

    /// Every slot written anywhere in this subtree, in pre-order
    pub fn all_handles(&self) -> Vec<SlotHandle> {
        let mut out = self.own_handles();
        for child in self.children() {
            out.extend(child.all_handles());
        }
        out
    }

    /// Visibility bitmap if this is a white-list leaf
    pub fn white_list_filter(&self) -> Option<Arc<RoaringBitmap>> {
        match &self.kind {
            BlueprintKind::Leaf { search, .. } => search.white_list_filter(),
            _ => None,
        }
    }

    pub fn add_child(&mut self, child: Blueprint<'a>) -> &mut Self {
        self.children_for_update("add_child").push(child);
        self.update_state();
        self
    }

    pub fn insert_child(&mut self, index: usize, child: Blueprint<'a>) {
        self.children_for_update("insert_child").insert(index, child);
        self.update_state();
    }

    pub fn remove_child(&mut self, index: usize) -> Blueprint<'a> {
        let child = self.children_for_update("remove_child").remove(index);
        self.update_state();
        child
    }

    /// Set the doc-id limit of this subtree and recompute its estimates
    pub fn set_doc_id_limit(&mut self, limit: u32) {
        self.assert_mutable("set_doc_id_limit");
        self.state.doc_id_limit = limit;
        if let BlueprintKind::Intermediate { children, .. } = &mut self.kind {
            for child in children.iter_mut() {
                child.set_doc_id_limit(limit);
            }
        }
        self.update_state();
    }

    /// Hand the global filter to every node that asked for it
    pub fn set_global_filter(&mut self, filter: &Arc<GlobalFilter>) {
        self.assert_mutable("set_global_filter");
        if !self.state.want_global_filter {
            return;
        }
        match &mut self.kind {
            BlueprintKind::Leaf { search, .. } => search.set_global_filter(Arc::clone(filter)),
            BlueprintKind::Intermediate { children, .. } => {
                for child in children.iter_mut() {
                    child.set_global_filter(filter);
                }
            }
            BlueprintKind::Empty => {}
        }
        self.update_state();
    }

    /// Fetch postings for every leaf.
    ///
    /// Conjunctions make only their first child strict and scale the hit
    /// rate of later children by the estimates before them. Disjunctions
    /// pass the hints on unchanged. Rank and AndNot keep the hints for the
    /// first child only.
    pub fn fetch_postings(&mut self, info: &ExecuteInfo) {
        self.assert_mutable("fetch_postings");
        let limit = self.state.doc_id_limit;
        match &mut self.kind {
            BlueprintKind::Leaf { search, .. } => search.fetch_postings(info),
            BlueprintKind::Empty => {}
            BlueprintKind::Intermediate { op, children, .. } => {
                let op = *op;
                let mut hit_rate = info.hit_rate;
                for (i, child) in children.iter_mut().enumerate() {
                    let child_info = if i == 0 || op.is_or_like() {
                        *info
                    } else if op.is_and_like() {
                        ExecuteInfo::create(false, hit_rate)
                    } else {
                        ExecuteInfo::create(false, info.hit_rate)
                    };
                    child.fetch_postings(&child_info);
                    if op.is_and_like() {
                        hit_rate *= child.state.estimate.hit_ratio(limit);
                    }
                }
            }
        }
    }

    /// Make the tree immutable
    pub fn freeze(&mut self) {
        self.state.frozen = true;
        if let BlueprintKind::Intermediate { children, .. } = &mut self.kind {
            for child in children.iter_mut() {
                child.freeze();
            }
        }
    }

    /// Create a fresh iterator tree. Calls are independent of each other.
    ///
    /// `md` is only checked to hold every reserved slot. The iterators keep
    /// their slot handles and write into whatever buffer is passed to
    /// [`SearchIterator::unpack`], which must be laid out like `md`.
    ///
    /// Panics unless the tree is frozen.
    pub fn create_search(&self, md: &MatchData) -> Result<Box<dyn SearchIterator + '_>> {
        assert!(
            self.state.frozen,
            "create_search requires a frozen blueprint"
        );
        let needed = self
            .all_handles()
            .into_iter()
            .map(|h| h.index() + 1)
            .max()
            .unwrap_or(0);
        if md.len() < needed {
            return Err(MatchError::MatchDataTooSmall {
                needed,
                actual: md.len(),
            });
        }
        Ok(self.build_iterator())
    }

    fn build_iterator(&self) -> Box<dyn SearchIterator + '_> {
        match &self.kind {
            BlueprintKind::Leaf { search, handle } => search.create_iterator(*handle, self.weight),
            BlueprintKind::Empty => Box::new(EmptyIterator),
            BlueprintKind::Intermediate {
                op,
                children,
                handles,
            } => {
                let mut iterators: Vec<Box<dyn SearchIterator + '_>> =
                    children.iter().map(Blueprint::build_iterator).collect();
                let search: Box<dyn SearchIterator + '_> = match op {
                    Op::WeightedSet => {
                        let tokens = iterators
                            .into_iter()
                            .zip(children.iter().map(Blueprint::weight))
                            .collect();
                        return Box::new(WeightedSetIterator::new(tokens, handles.clone()));
                    }
                    Op::Or | Op::Equiv => Box::new(OrIterator::new(iterators)),
                    Op::AndNot | Op::Rank if iterators.is_empty() => Box::new(EmptyIterator),
                    Op::AndNot => {
                        let first = iterators.remove(0);
                        Box::new(AndNotIterator::new(first, iterators))
                    }
                    Op::Rank => {
                        let first = iterators.remove(0);
                        Box::new(RankIterator::new(first, iterators))
                    }
                    _ => Box::new(AndIterator::new(iterators)),
                };
                if handles.is_empty() {
                    search
                } else {
                    Box::new(UnpackRecorder::new(search, handles.clone(), self.weight))
                }
            }
        }
    }

    /// Indented dump of the tree with its planning state
    pub fn as_string(&self) -> String {
        let mut out = String::new();
        self.write_tree(&mut out, 0);
        out
    }

    fn write_tree(&self, out: &mut String, depth: usize) {
        let name = match &self.kind {
            BlueprintKind::Leaf { search, .. } => search.describe(),
            BlueprintKind::Empty => "empty".to_string(),
            BlueprintKind::Intermediate { op, .. } => match op {
                Op::Near { window } | Op::ONear { window } => format!("{}({})", op.name(), window),
                other => other.name().to_string(),
            },
        };
        let estimate = self.state.estimate;
        let _ = writeln!(
            out,
            "{:indent$}{} est={}{} cost={:.1} limit={}{}{}",
            "",
            name,
            estimate.est_hits,
            if estimate.empty { " (empty)" } else { "" },
            self.state.cost,
            self.state.doc_id_limit,
            if self.state.want_global_filter { " wants_filter" } else { "" },
            if self.state.expensive { " expensive" } else { "" },
            indent = depth * 2
        );
        for child in self.children() {
            child.write_tree(out, depth + 1);
        }
    }

    fn assert_mutable(&self, what: &str) {
        assert!(!self.state.frozen, "{} on a frozen blueprint", what);
    }

    fn children_for_update(&mut self, what: &str) -> &mut Vec<Blueprint<'a>> {
        self.assert_mutable(what);
        match &mut self.kind {
            BlueprintKind::Intermediate { children, .. } => children,
            _ => panic!("{} on a leaf blueprint", what),
        }
    }

    fn update_state(&mut self) {
        let limit = self.state.doc_id_limit;
        match &self.kind {
            BlueprintKind::Leaf { search, .. } => {
                self.state.estimate = search.estimate();
                self.state.cost = 1.0;
                self.state.want_global_filter = search.wants_global_filter();
            }
            BlueprintKind::Empty => {
                self.state.estimate = HitEstimate::empty();
                self.state.cost = 0.0;
                self.state.want_global_filter = false;
            }
            BlueprintKind::Intermediate { op, children, .. } => {
                self.state.estimate = combine_estimates(*op, children, limit);
                let child_cost = Aggr::Sum
                    .fold(children.iter().map(|c| c.state.cost))
                    .unwrap_or(0.0);
                self.state.cost = if op.is_positional() {
                    child_cost + children.len() as f64
                } else {
                    child_cost
                };
                self.state.want_global_filter =
                    children.iter().any(|c| c.state.want_global_filter);
            }
        }
    }
}

fn combine_estimates(op: Op, children: &[Blueprint<'_>], doc_id_limit: u32) -> HitEstimate {
    let hits = |c: &Blueprint<'_>| c.state.estimate.est_hits as f64;
    if op.is_and_like() {
        if children.is_empty() || children.iter().any(|c| c.state.estimate.empty) {
            return HitEstimate::empty();
        }
        let min = Aggr::Min.fold(children.iter().map(hits)).unwrap_or(0.0);
        HitEstimate::new(min as u64, false)
    } else if op.is_or_like() {
        let mut sum = Aggr::Sum.fold(children.iter().map(hits)).unwrap_or(0.0) as u64;
        if doc_id_limit > 0 {
            sum = sum.min(doc_id_limit as u64);
        }
        let empty = children.iter().all(|c| c.state.estimate.empty);
        HitEstimate::new(sum, empty)
    } else {
        children
            .first()
            .map_or_else(HitEstimate::empty, |c| c.state.estimate)
    }
}

//! Per-request query planning
//!
//! A [`Query`] is created for one search request and driven through the
//! pipeline stages strictly in order:
//!
//! ```text
//! build_tree -> reserve_handles -> optimize (x1 or x2) -> fetch_postings -> freeze -> create_search*
//! ```
//!
//! Input problems surface as [`MatchError`]s from `build_tree`. Calling a
//! stage out of order is a bug in the caller and panics.

use std::sync::Arc;

use roaring::RoaringBitmap;
use tracing::{debug, info};

use crate::blueprint::builder::BlueprintBuilder;
use crate::blueprint::white_list::merge_white_list;
use crate::blueprint::{
    Blueprint, ExecuteInfo, GlobalFilter, HitEstimate, OptimizePhase, RequestContext,
    SearchContext, TwoPhaseOptimizer,
};
use crate::config::{MatchingConfig, UnpackingFlags};
use crate::error::Result;
use crate::match_data::{MatchData, MatchDataLayout};
use crate::query::ast::Node;
use crate::query::location::{add_location_node, Location};
use crate::query::reserve::reserve_match_data;
use crate::query::resolve_view::{resolve_views, IndexEnvironment, ViewResolver};
use crate::query::same_element::rewrite_same_element;
use crate::query::term_data::{extract_terms, TermData};
use crate::query::tree_builder::QueryTreeCreator;
use crate::query::unpacking::optimize_unpacking;
use crate::search::SearchIterator;

/// Pipeline stage a [`Query`] has completed
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    New,
    TreeBuilt,
    HandlesReserved,
    Optimized,
    PostingsFetched,
    Frozen,
}

/// Query plan for one search request
#[derive(Debug)]
pub struct Query<'a> {
    config: MatchingConfig,
    stage: Stage,
    tree: Option<Node>,
    location: Location,
    white_list: Option<Blueprint<'a>>,
    white_list_bits: Option<Arc<RoaringBitmap>>,
    blueprint: Option<Blueprint<'a>>,
    optimizer: TwoPhaseOptimizer,
    doc_id_limit: u32,
}

impl<'a> Default for Query<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> Query<'a> {
    pub fn new() -> Self {
        Self::with_config(MatchingConfig::default())
    }

    pub fn with_config(config: MatchingConfig) -> Self {
        Self {
            config,
            stage: Stage::New,
            tree: None,
            location: Location::default(),
            white_list: None,
            white_list_bits: None,
            blueprint: None,
            optimizer: TwoPhaseOptimizer::new(),
            doc_id_limit: 0,
        }
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Visibility filter to be merged into the blueprint.
    ///
    /// Must be set before `build_tree` since it influences unpacking.
    pub fn set_white_list_blueprint(&mut self, white_list: Blueprint<'a>) {
        self.expect_stage(Stage::New, "set_white_list_blueprint");
        self.white_list_bits = white_list.white_list_filter();
        self.white_list = Some(white_list);
    }

    /// Build and rewrite the query tree.
    ///
    /// Fails if the stack is empty or malformed; no later stage may run
    /// in that case. A bad location string is logged and ignored.
    pub fn build_tree(
        &mut self,
        stack: &[u8],
        location: &str,
        resolver: &ViewResolver,
        env: &dyn IndexEnvironment,
        flags: UnpackingFlags,
    ) -> Result<()> {
        self.expect_stage(Stage::New, "build_tree");
        let mut root = QueryTreeCreator::create(stack)?;
        rewrite_same_element(&mut root);
        let root = add_location_node(location, root, &mut self.location, self.config.location_weight);
        let mut root = optimize_unpacking(root, self.white_list.is_some(), flags);
        resolve_views(&mut root, resolver, env);
        debug!(terms = root.term_count(), "Query tree built");
        self.tree = Some(root);
        self.stage = Stage::TreeBuilt;
        Ok(())
    }

    /// Ranked terms in tree order
    pub fn extract_terms(&self) -> Vec<TermData> {
        extract_terms(self.tree_ref("extract_terms"))
    }

    /// The location descriptor; `valid` is false if no ranked location was given
    pub fn extract_location(&self) -> &Location {
        &self.location
    }

    /// Reserve match-data slots, build the blueprint and merge the white list
    pub fn reserve_handles(
        &mut self,
        request: &RequestContext,
        context: &'a dyn SearchContext,
        layout: &mut MatchDataLayout,
    ) {
        self.expect_stage(Stage::TreeBuilt, "reserve_handles");
        let request_id = request.request_id.as_deref().unwrap_or("-");
        let Some(tree) = self.tree.as_mut() else {
            panic!("query tree missing after build_tree");
        };
        reserve_match_data(tree, layout);

        let mut blueprint = BlueprintBuilder::build(request, tree, context);
        debug!(request_id, "Blueprint before white list:\n{}", blueprint.as_string());
        if let Some(white_list) = self.white_list.take() {
            blueprint = merge_white_list(blueprint, white_list, context.doc_id_limit());
            debug!(request_id, "Blueprint after white list:\n{}", blueprint.as_string());
        }
        info!(
            request_id,
            slots = layout.len(),
            est_hits = blueprint.state().estimate().est_hits,
            "Handles reserved"
        );
        self.doc_id_limit = context.doc_id_limit();
        self.blueprint = Some(blueprint);
        self.stage = Stage::HandlesReserved;
    }

    /// Cost-optimize the blueprint, attaching the global filter if wanted.
    ///
    /// May be called again; the rewrite never runs more than twice.
    pub fn optimize(&mut self) {
        assert!(
            matches!(self.stage, Stage::HandlesReserved | Stage::Optimized),
            "optimize called in stage {:?}",
            self.stage
        );
        let blueprint = self.take_blueprint();
        let white_list = self.white_list_bits.as_deref();
        let doc_id_limit = self.doc_id_limit;
        let blueprint = self
            .optimizer
            .run(blueprint, |_| GlobalFilter::create(white_list, doc_id_limit));
        if self.optimizer.phase() == OptimizePhase::Done {
            debug!(passes = self.optimizer.passes(), "Blueprint optimized");
        }
        debug!("Optimized blueprint:\n{}", blueprint.as_string());
        self.blueprint = Some(blueprint);
        self.stage = Stage::Optimized;
    }

    pub fn fetch_postings(&mut self) {
        self.expect_stage(Stage::Optimized, "fetch_postings");
        self.blueprint_mut().fetch_postings(&ExecuteInfo::TRUE);
        self.stage = Stage::PostingsFetched;
    }

    pub fn freeze(&mut self) {
        self.expect_stage(Stage::PostingsFetched, "freeze");
        self.blueprint_mut().freeze();
        self.stage = Stage::Frozen;
    }

    /// Estimated hits of the whole plan
    pub fn estimate(&self) -> HitEstimate {
        self.blueprint_ref("estimate").state().estimate()
    }

    /// A fresh iterator tree writing into `md`.
    ///
    /// Repeatable; iterators from separate calls share no mutable state.
    pub fn create_search(&self, md: &MatchData) -> Result<Box<dyn SearchIterator + '_>> {
        self.expect_stage(Stage::Frozen, "create_search");
        self.blueprint_ref("create_search").create_search(md)
    }

    /// Number of term leaves in the query tree
    pub fn term_count(&self) -> usize {
        self.tree.as_ref().map_or(0, Node::term_count)
    }

    pub fn doc_id_limit(&self) -> u32 {
        self.doc_id_limit
    }

    pub fn tree(&self) -> Option<&Node> {
        self.tree.as_ref()
    }

    pub fn blueprint(&self) -> Option<&Blueprint<'a>> {
        self.blueprint.as_ref()
    }

    /// Textual dump of the current blueprint
    pub fn explain(&self) -> String {
        self.blueprint
            .as_ref()
            .map_or_else(String::new, Blueprint::as_string)
    }

    fn expect_stage(&self, expected: Stage, what: &str) {
        assert!(
            self.stage == expected,
            "{} called in stage {:?}, expected {:?}",
            what,
            self.stage,
            expected
        );
    }

    fn tree_ref(&self, what: &str) -> &Node {
        match &self.tree {
            Some(tree) => tree,
            None => panic!("{} called before build_tree", what),
        }
    }

    fn blueprint_ref(&self, what: &str) -> &Blueprint<'a> {
        match &self.blueprint {
            Some(bp) => bp,
            None => panic!("{} called before reserve_handles", what),
        }
    }

    fn blueprint_mut(&mut self) -> &mut Blueprint<'a> {
        match &mut self.blueprint {
            Some(bp) => bp,
            None => panic!("blueprint missing in stage {:?}", self.stage),
        }
    }

    fn take_blueprint(&mut self) -> Blueprint<'a> {
        match self.blueprint.take() {
            Some(bp) => bp,
            None => panic!("blueprint missing in stage {:?}", self.stage),
        }
    }
}

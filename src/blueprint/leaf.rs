//! Leaf searches and the collaborators that create them
//!
//! Storage engines implement [`Searchable`]; the blueprint builder asks it
//! for one [`LeafSearch`] per (term, field). Leaves borrow from the storage
//! they were created by, so storage must outlive the blueprint.

use std::fmt;
use std::sync::Arc;

use roaring::RoaringBitmap;

use super::global_filter::GlobalFilter;
use super::{ExecuteInfo, HitEstimate};
use crate::config::MatchingConfig;
use crate::match_data::SlotHandle;
use crate::query::types::{FieldBinding, TermId, TermKind};
use crate::search::{BitmapIterator, SearchIterator};

/// Search over one field for one term value
pub trait LeafSearch: Send + Sync + fmt::Debug {
    fn estimate(&self) -> HitEstimate;

    /// True if the estimate depends on the global filter
    fn wants_global_filter(&self) -> bool {
        false
    }

    fn set_global_filter(&mut self, _filter: Arc<GlobalFilter>) {}

    /// Materialize postings ahead of iterator creation
    fn fetch_postings(&mut self, info: &ExecuteInfo);

    fn create_iterator(&self, handle: Option<SlotHandle>, weight: i32) -> Box<dyn SearchIterator + '_>;

    /// Visibility bitmap, if this leaf is a white list
    fn white_list_filter(&self) -> Option<Arc<RoaringBitmap>> {
        None
    }

    fn describe(&self) -> String;
}

/// What the builder asks a [`Searchable`] for
#[derive(Debug)]
pub struct LeafSpec<'q> {
    pub term_id: TermId,
    pub field: &'q FieldBinding,
    pub term: &'q str,
    pub kind: TermKind,
}

/// A storage engine able to create leaf searches
pub trait Searchable: Send + Sync {
    /// `None` if the field is not present in this storage
    fn create_leaf<'s>(
        &'s self,
        request: &RequestContext,
        spec: &LeafSpec<'_>,
    ) -> Option<Box<dyn LeafSearch + 's>>;
}

/// Per-request view of the storage a query runs against
pub trait SearchContext: Sync {
    fn indexes(&self) -> &dyn Searchable;

    fn attributes(&self) -> &dyn Searchable;

    /// One past the largest document id
    fn doc_id_limit(&self) -> u32;
}

/// Request-scoped settings handed to the storage collaborators
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub max_term_expansions: usize,
    pub request_id: Option<String>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self {
            max_term_expansions: MatchingConfig::default().max_term_expansions,
            request_id: None,
        }
    }
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &MatchingConfig) -> Self {
        Self {
            max_term_expansions: config.max_term_expansions,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn with_max_term_expansions(mut self, max: usize) -> Self {
        self.max_term_expansions = max;
        self
    }
}

/// Leaf over a caller-supplied visibility bitmap
#[derive(Debug)]
pub struct WhiteListLeaf {
    bits: Arc<RoaringBitmap>,
}

impl WhiteListLeaf {
    pub fn new(bits: Arc<RoaringBitmap>) -> Self {
        Self { bits }
    }
}

impl LeafSearch for WhiteListLeaf {
    fn estimate(&self) -> HitEstimate {
        HitEstimate::new(self.bits.len(), self.bits.is_empty())
    }

    fn fetch_postings(&mut self, _info: &ExecuteInfo) {}

    fn create_iterator(&self, _handle: Option<SlotHandle>, _weight: i32) -> Box<dyn SearchIterator + '_> {
        Box::new(BitmapIterator::new(&self.bits, None, 0))
    }

    fn white_list_filter(&self) -> Option<Arc<RoaringBitmap>> {
        Some(Arc::clone(&self.bits))
    }

    fn describe(&self) -> String {
        format!("white_list({} docs)", self.bits.len())
    }
}

use std::sync::Arc;

use roaring::RoaringBitmap;
use tracing::trace;

use super::MemoryIndex;
use crate::blueprint::{ExecuteInfo, GlobalFilter, HitEstimate, LeafSearch};
use crate::match_data::SlotHandle;
use crate::query::types::TermKind;
use crate::search::{BitmapIterator, SearchIterator};

/// Leaf over one field of a [`MemoryIndex`]
///
/// The estimate is computed when the leaf is created; postings are only
/// materialized by [`LeafSearch::fetch_postings`].
#[derive(Debug)]
pub struct MemoryLeaf<'a> {
    index: &'a MemoryIndex,
    field: String,
    term: String,
    kind: TermKind,
    max_expansions: usize,
    filter_sensitive: bool,
    estimate: HitEstimate,
    filter: Option<Arc<GlobalFilter>>,
    postings: Option<RoaringBitmap>,
}

impl<'a> MemoryLeaf<'a> {
    pub fn new(
        index: &'a MemoryIndex,
        field: &str,
        term: &str,
        kind: TermKind,
        max_expansions: usize,
        filter_sensitive: bool,
    ) -> Self {
        let mut leaf = Self {
            index,
            field: field.to_string(),
            term: term.to_string(),
            kind,
            max_expansions,
            filter_sensitive,
            estimate: HitEstimate::empty(),
            filter: None,
            postings: None,
        };
        let hits = leaf.matches().len();
        leaf.estimate = HitEstimate::new(hits, hits == 0);
        leaf
    }

    fn matches(&self) -> RoaringBitmap {
        self.index
            .lookup(&self.field, &self.term, self.kind, self.max_expansions)
            .unwrap_or_default()
    }
}

impl<'a> LeafSearch for MemoryLeaf<'a> {
    fn estimate(&self) -> HitEstimate {
        self.estimate
    }

    fn wants_global_filter(&self) -> bool {
        self.filter_sensitive
    }

    fn set_global_filter(&mut self, filter: Arc<GlobalFilter>) {
        let hits = self.matches().intersection_len(filter.bits());
        self.estimate = HitEstimate::new(hits, hits == 0);
        self.filter = Some(filter);
    }

    fn fetch_postings(&mut self, info: &ExecuteInfo) {
        let mut bits = self.matches();
        if let Some(filter) = &self.filter {
            bits &= filter.bits();
        }
        trace!(
            leaf = %self.describe(),
            strict = info.strict,
            hits = bits.len(),
            "Fetched postings"
        );
        self.postings = Some(bits);
    }

    fn create_iterator(&self, handle: Option<SlotHandle>, weight: i32) -> Box<dyn SearchIterator + '_> {
        match &self.postings {
            Some(bits) => Box::new(BitmapIterator::new(bits, handle, weight)),
            None => panic!("postings for {} were never fetched", self.describe()),
        }
    }

    fn describe(&self) -> String {
        match self.kind {
            TermKind::Word => format!("{}:{}", self.field, self.term),
            kind => format!("{}:{}({})", self.field, kind.name(), self.term),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::match_data::MatchData;
    use crate::search::matching_docs;

    fn index() -> MemoryIndex {
        let index = MemoryIndex::new();
        index.index_text("title", 1, "rust planner");
        index.index_text("title", 3, "rust");
        index.index_text("title", 8, "go");
        index
    }

    #[test]
    fn test_estimate_then_fetch() {
        let index = index();
        let mut leaf = MemoryLeaf::new(&index, "title", "rust", TermKind::Word, 16, false);
        assert_eq!(leaf.estimate(), HitEstimate::new(2, false));
        assert_eq!(leaf.describe(), "title:rust");

        leaf.fetch_postings(&ExecuteInfo::TRUE);
        let mut md = MatchData::with_slots(1);
        let mut it = leaf.create_iterator(Some(SlotHandle(0)), 7);
        assert_eq!(matching_docs(it.as_mut(), &mut md, 10), vec![1, 3]);
        assert!(md.get(SlotHandle(0)).has_hit(3));
    }

    #[test]
    fn test_global_filter_narrows_estimate_and_postings() {
        let index = index();
        let mut leaf = MemoryLeaf::new(&index, "title", "rust", TermKind::Word, 16, true);
        assert!(leaf.wants_global_filter());

        let wl: RoaringBitmap = [3u32, 8].into_iter().collect();
        leaf.set_global_filter(GlobalFilter::create(Some(&wl), 10));
        assert_eq!(leaf.estimate(), HitEstimate::new(1, false));

        leaf.fetch_postings(&ExecuteInfo::TRUE);
        let mut md = MatchData::default();
        let mut it = leaf.create_iterator(None, 0);
        assert_eq!(matching_docs(it.as_mut(), &mut md, 10), vec![3]);
    }

    #[test]
    #[should_panic(expected = "never fetched")]
    fn test_iterator_before_fetch_panics() {
        let index = index();
        let leaf = MemoryLeaf::new(&index, "title", "rust", TermKind::Prefix, 16, false);
        let _ = leaf.create_iterator(None, 0);
    }
}

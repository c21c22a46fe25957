//! Executable search iterators
//!
//! Iterators are strict: `seek(target)` positions on the first match at or
//! after `target`. Targets must never decrease; seeking below the current
//! position returns the current document again.

pub mod bitmap;
pub mod intermediate;

use std::fmt::Debug;

pub use bitmap::BitmapIterator;
pub use intermediate::{
    AndIterator, AndNotIterator, OrIterator, RankIterator, UnpackRecorder, WeightedSetIterator,
};

use crate::match_data::MatchData;

pub trait SearchIterator: Send + Debug {
    /// First match at or after `target`, or `None` when exhausted
    fn seek(&mut self, target: u32) -> Option<u32>;

    /// Write ranking signals for `doc_id`, which the iterator must be positioned on
    fn unpack(&mut self, doc_id: u32, md: &mut MatchData);
}

/// Iterator that never matches
#[derive(Debug, Default)]
pub struct EmptyIterator;

impl SearchIterator for EmptyIterator {
    fn seek(&mut self, _target: u32) -> Option<u32> {
        None
    }

    fn unpack(&mut self, _doc_id: u32, _md: &mut MatchData) {}
}

/// Drive `search` over `[0, doc_id_limit)`, unpacking every hit
pub fn matching_docs(
    search: &mut dyn SearchIterator,
    md: &mut MatchData,
    doc_id_limit: u32,
) -> Vec<u32> {
    let mut hits = Vec::new();
    let mut target = 0;
    while target < doc_id_limit {
        let Some(doc) = search.seek(target) else {
            break;
        };
        if doc >= doc_id_limit {
            break;
        }
        search.unpack(doc, md);
        hits.push(doc);
        match doc.checked_add(1) {
            Some(next) => target = next,
            None => break,
        }
    }
    hits
}

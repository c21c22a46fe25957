use super::SearchIterator;
use crate::match_data::{MatchData, SlotHandle};

type Child<'a> = Box<dyn SearchIterator + 'a>;

/// Matches documents all children match (leapfrog join)
#[derive(Debug)]
pub struct AndIterator<'a> {
    children: Vec<Child<'a>>,
}

impl<'a> AndIterator<'a> {
    pub fn new(children: Vec<Child<'a>>) -> Self {
        Self { children }
    }
}

impl<'a> SearchIterator for AndIterator<'a> {
    fn seek(&mut self, target: u32) -> Option<u32> {
        if self.children.is_empty() {
            return None;
        }
        let mut candidate = target;
        'outer: loop {
            for child in self.children.iter_mut() {
                let doc = child.seek(candidate)?;
                if doc != candidate {
                    candidate = doc;
                    continue 'outer;
                }
            }
            return Some(candidate);
        }
    }

    fn unpack(&mut self, doc_id: u32, md: &mut MatchData) {
        for child in self.children.iter_mut() {
            child.unpack(doc_id, md);
        }
    }
}

/// Matches documents any child matches
#[derive(Debug)]
pub struct OrIterator<'a> {
    children: Vec<Child<'a>>,
}

impl<'a> OrIterator<'a> {
    pub fn new(children: Vec<Child<'a>>) -> Self {
        Self { children }
    }
}

impl<'a> SearchIterator for OrIterator<'a> {
    fn seek(&mut self, target: u32) -> Option<u32> {
        self.children
            .iter_mut()
            .filter_map(|child| child.seek(target))
            .min()
    }

    fn unpack(&mut self, doc_id: u32, md: &mut MatchData) {
        for child in self.children.iter_mut() {
            if child.seek(doc_id) == Some(doc_id) {
                child.unpack(doc_id, md);
            }
        }
    }
}

/// Matches the first child minus every later child
#[derive(Debug)]
pub struct AndNotIterator<'a> {
    positive: Child<'a>,
    negatives: Vec<Child<'a>>,
}

impl<'a> AndNotIterator<'a> {
    pub fn new(positive: Child<'a>, negatives: Vec<Child<'a>>) -> Self {
        Self {
            positive,
            negatives,
        }
    }
}

impl<'a> SearchIterator for AndNotIterator<'a> {
    fn seek(&mut self, target: u32) -> Option<u32> {
        let mut candidate = target;
        loop {
            let doc = self.positive.seek(candidate)?;
            let excluded = self
                .negatives
                .iter_mut()
                .any(|neg| neg.seek(doc) == Some(doc));
            if !excluded {
                return Some(doc);
            }
            candidate = doc.checked_add(1)?;
        }
    }

    fn unpack(&mut self, doc_id: u32, md: &mut MatchData) {
        self.positive.unpack(doc_id, md);
    }
}

/// Matches the first child; later children only contribute ranking signals
#[derive(Debug)]
pub struct RankIterator<'a> {
    matching: Child<'a>,
    ranking: Vec<Child<'a>>,
}

impl<'a> RankIterator<'a> {
    pub fn new(matching: Child<'a>, ranking: Vec<Child<'a>>) -> Self {
        Self { matching, ranking }
    }
}

impl<'a> SearchIterator for RankIterator<'a> {
    fn seek(&mut self, target: u32) -> Option<u32> {
        self.matching.seek(target)
    }

    fn unpack(&mut self, doc_id: u32, md: &mut MatchData) {
        self.matching.unpack(doc_id, md);
        for child in self.ranking.iter_mut() {
            if child.seek(doc_id) == Some(doc_id) {
                child.unpack(doc_id, md);
            }
        }
    }
}

/// Matches any token; unpacks the best matching token weight
#[derive(Debug)]
pub struct WeightedSetIterator<'a> {
    tokens: Vec<(Child<'a>, i32)>,
    handles: Vec<SlotHandle>,
}

impl<'a> WeightedSetIterator<'a> {
    pub fn new(tokens: Vec<(Child<'a>, i32)>, handles: Vec<SlotHandle>) -> Self {
        Self { tokens, handles }
    }
}

impl<'a> SearchIterator for WeightedSetIterator<'a> {
    fn seek(&mut self, target: u32) -> Option<u32> {
        self.tokens
            .iter_mut()
            .filter_map(|(child, _)| child.seek(target))
            .min()
    }

    fn unpack(&mut self, doc_id: u32, md: &mut MatchData) {
        let best = self
            .tokens
            .iter_mut()
            .filter_map(|(child, weight)| (child.seek(doc_id) == Some(doc_id)).then_some(*weight))
            .max();
        if let Some(weight) = best {
            for &handle in &self.handles {
                md.get_mut(handle).set_hit(doc_id, weight);
            }
        }
    }
}

/// Records a hit in the operator's own slots after unpacking its inner iterator
#[derive(Debug)]
pub struct UnpackRecorder<'a> {
    inner: Child<'a>,
    handles: Vec<SlotHandle>,
    weight: i32,
}

impl<'a> UnpackRecorder<'a> {
    pub fn new(inner: Child<'a>, handles: Vec<SlotHandle>, weight: i32) -> Self {
        Self {
            inner,
            handles,
            weight,
        }
    }
}

impl<'a> SearchIterator for UnpackRecorder<'a> {
    fn seek(&mut self, target: u32) -> Option<u32> {
        self.inner.seek(target)
    }

    fn unpack(&mut self, doc_id: u32, md: &mut MatchData) {
        self.inner.unpack(doc_id, md);
        for &handle in &self.handles {
            md.get_mut(handle).set_hit(doc_id, self.weight);
        }
    }
}

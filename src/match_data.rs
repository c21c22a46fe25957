//! Match-data layout and per-evaluation buffers
//!
//! The layout is filled once by the reservation pass and read-only
//! afterwards. Every evaluation pass gets its own [`MatchData`] buffer
//! created from the layout.

use std::collections::HashMap;

use crate::query::types::TermId;

/// Index of a reserved slot in a match-data buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotHandle(pub u32);

impl SlotHandle {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Slot assignment for one query, keyed by term and concrete field
#[derive(Debug, Default)]
pub struct MatchDataLayout {
    slots: Vec<(TermId, u32)>,
    index: HashMap<(TermId, u32), SlotHandle>,
}

impl MatchDataLayout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the slot for a (term, field) pair.
    ///
    /// Reserving the same pair twice is a pipeline bug and panics.
    pub fn alloc(&mut self, term: TermId, field_id: u32) -> SlotHandle {
        let key = (term, field_id);
        assert!(
            !self.index.contains_key(&key),
            "slot for term {} field {} reserved twice",
            term,
            field_id
        );
        let handle = SlotHandle(self.slots.len() as u32);
        self.slots.push(key);
        self.index.insert(key, handle);
        handle
    }

    pub fn lookup(&self, term: TermId, field_id: u32) -> Option<SlotHandle> {
        self.index.get(&(term, field_id)).copied()
    }

    /// The (term, field) pair a slot was reserved for
    pub fn owner(&self, handle: SlotHandle) -> Option<(TermId, u32)> {
        self.slots.get(handle.index()).copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Allocate a fresh buffer covering every reserved slot
    pub fn create_match_data(&self) -> MatchData {
        MatchData::with_slots(self.slots.len())
    }
}

/// Ranking signal written for one term/field on the current document
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TermFieldMatchData {
    /// Document the signal belongs to; `None` until the slot is first hit
    pub doc_id: Option<u32>,
    pub weight: i32,
}

impl TermFieldMatchData {
    pub fn set_hit(&mut self, doc_id: u32, weight: i32) {
        self.doc_id = Some(doc_id);
        self.weight = weight;
    }

    pub fn has_hit(&self, doc_id: u32) -> bool {
        self.doc_id == Some(doc_id)
    }
}

/// Per-evaluation buffer of term-field match data
#[derive(Clone, Debug, Default)]
pub struct MatchData {
    slots: Vec<TermFieldMatchData>,
}

impl MatchData {
    pub fn with_slots(count: usize) -> Self {
        Self {
            slots: vec![TermFieldMatchData::default(); count],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, handle: SlotHandle) -> &TermFieldMatchData {
        &self.slots[handle.index()]
    }

    pub fn get_mut(&mut self, handle: SlotHandle) -> &mut TermFieldMatchData {
        &mut self.slots[handle.index()]
    }

    /// Slots hit on `doc_id`, in slot order
    pub fn hits(&self, doc_id: u32) -> Vec<SlotHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.has_hit(doc_id))
            .map(|(i, _)| SlotHandle(i as u32))
            .collect()
    }
}

use std::borrow::Cow;

use roaring::RoaringBitmap;

use super::SearchIterator;
use crate::match_data::{MatchData, SlotHandle};

/// Posting iterator over a document bitmap
#[derive(Debug)]
pub struct BitmapIterator<'a> {
    bits: Cow<'a, RoaringBitmap>,
    handle: Option<SlotHandle>,
    weight: i32,
    current: Option<u32>,
    at_end: bool,
}

impl<'a> BitmapIterator<'a> {
    pub fn new(bits: &'a RoaringBitmap, handle: Option<SlotHandle>, weight: i32) -> Self {
        Self::from_cow(Cow::Borrowed(bits), handle, weight)
    }

    pub fn owned(bits: RoaringBitmap, handle: Option<SlotHandle>, weight: i32) -> Self {
        Self::from_cow(Cow::Owned(bits), handle, weight)
    }

    fn from_cow(bits: Cow<'a, RoaringBitmap>, handle: Option<SlotHandle>, weight: i32) -> Self {
        Self {
            bits,
            handle,
            weight,
            current: None,
            at_end: false,
        }
    }
}

impl<'a> SearchIterator for BitmapIterator<'a> {
    fn seek(&mut self, target: u32) -> Option<u32> {
        if let Some(current) = self.current {
            if current >= target {
                return Some(current);
            }
        }
        if self.at_end {
            return None;
        }
        // rank counts members <= value, so this is the index of the first member >= target
        let skipped = if target == 0 {
            0
        } else {
            self.bits.rank(target - 1)
        };
        self.current = u32::try_from(skipped)
            .ok()
            .and_then(|n| self.bits.select(n));
        self.at_end = self.current.is_none();
        self.current
    }

    fn unpack(&mut self, doc_id: u32, md: &mut MatchData) {
        if let Some(handle) = self.handle {
            md.get_mut(handle).set_hit(doc_id, self.weight);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seek_is_strict_and_cached() {
        let bits: RoaringBitmap = [3u32, 7, 100].into_iter().collect();
        let mut it = BitmapIterator::new(&bits, None, 0);
        assert_eq!(it.seek(0), Some(3));
        assert_eq!(it.seek(3), Some(3));
        assert_eq!(it.seek(4), Some(7));
        assert_eq!(it.seek(2), Some(7));
        assert_eq!(it.seek(8), Some(100));
        assert_eq!(it.seek(101), None);
        assert_eq!(it.seek(500), None);
    }

    #[test]
    fn test_unpack_writes_slot() {
        let bits: RoaringBitmap = [5u32].into_iter().collect();
        let mut md = MatchData::with_slots(1);
        let mut it = BitmapIterator::owned(bits, Some(SlotHandle(0)), 42);
        assert_eq!(it.seek(0), Some(5));
        it.unpack(5, &mut md);
        assert!(md.get(SlotHandle(0)).has_hit(5));
        assert_eq!(md.get(SlotHandle(0)).weight, 42);
    }
}

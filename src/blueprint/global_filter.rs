use std::sync::Arc;

use roaring::RoaringBitmap;

/// Immutable set of documents eligible to match, shared by every
/// blueprint that asked for it
#[derive(Debug)]
pub struct GlobalFilter {
    bits: RoaringBitmap,
    doc_id_limit: u32,
}

impl GlobalFilter {
    /// Documents in `[0, doc_id_limit)`, restricted to `white_list` when given
    pub fn create(white_list: Option<&RoaringBitmap>, doc_id_limit: u32) -> Arc<Self> {
        let mut bits = RoaringBitmap::new();
        bits.insert_range(0..doc_id_limit);
        if let Some(white_list) = white_list {
            bits &= white_list;
        }
        Arc::new(Self { bits, doc_id_limit })
    }

    pub fn contains(&self, doc_id: u32) -> bool {
        self.bits.contains(doc_id)
    }

    pub fn count(&self) -> u64 {
        self.bits.len()
    }

    pub fn bits(&self) -> &RoaringBitmap {
        &self.bits
    }

    pub fn doc_id_limit(&self) -> u32 {
        self.doc_id_limit
    }
}

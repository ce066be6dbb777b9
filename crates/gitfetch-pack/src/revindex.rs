//! Reverse index: offset → OID mapping.
//!
//! The reverse index provides the inverse of the pack index: given a byte
//! offset in a pack file, find the OID and index position of the object
//! at that offset. Built in-memory from an already-parsed [`PackIndex`].

use gitfetch_hash::ObjectId;

use crate::index::PackIndex;
use crate::PackError;

/// Reverse index: offset → OID mapping.
pub struct ReverseIndex {
    /// Sorted array of (offset, index_position) pairs.
    entries: Vec<(u64, u32)>,
}

impl ReverseIndex {
    /// Build a reverse index from a pack index.
    pub fn build(index: &PackIndex) -> Result<Self, PackError> {
        let n = index.num_objects();
        let mut entries: Vec<(u64, u32)> = Vec::with_capacity(n as usize);
        for i in 0..n {
            entries.push((index.offset_at_index(i)?, i));
        }
        entries.sort_by_key(|&(offset, _)| offset);
        Ok(Self { entries })
    }

    /// Look up the OID of the object at the given pack offset.
    pub fn lookup_offset(&self, offset: u64, index: &PackIndex) -> Option<ObjectId> {
        self.entries
            .binary_search_by_key(&offset, |&(off, _)| off)
            .ok()
            .map(|pos| {
                let (_, idx_pos) = self.entries[pos];
                index.oid_at_index(idx_pos)
            })
    }

    /// Look up the index position of the object at the given pack offset.
    pub fn index_position_at_offset(&self, offset: u64) -> Option<u32> {
        self.entries
            .binary_search_by_key(&offset, |&(off, _)| off)
            .ok()
            .map(|pos| self.entries[pos].1)
    }

    /// Number of entries.
    pub fn num_entries(&self) -> usize {
        self.entries.len()
    }

    /// Iterate over (offset, index_position) pairs in offset order.
    pub fn iter(&self) -> impl Iterator<Item = &(u64, u32)> {
        self.entries.iter()
    }
}

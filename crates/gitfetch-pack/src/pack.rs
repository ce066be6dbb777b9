//! `PackFile`: decoding packfile bytes held entirely in memory.
//!
//! A pack file contains a header, a sequence of compressed objects
//! (possibly deltified), and a trailing checksum.

use flate2::{Decompress, FlushDecompress};
use gitfetch_hash::hasher::Hasher;
use gitfetch_hash::ObjectId;
use gitfetch_object::ObjectType;

use crate::entry::{parse_entry_header, PackEntry};
use crate::index::PackIndex;
use crate::{
    PackEntryType, PackError, PackedObject, MAX_DELTA_CHAIN_DEPTH, PACK_HEADER_SIZE,
    PACK_SIGNATURE, PACK_VERSION,
};

/// A decoded packfile backed by an in-memory byte buffer, paired with its
/// index for OID lookups.
pub struct PackFile {
    data: Vec<u8>,
    index: PackIndex,
    num_objects: u32,
}

impl PackFile {
    /// Build a `PackFile` from the raw bytes of a `.pack` stream and an
    /// already-parsed index for it.
    pub fn parse(data: Vec<u8>, index: PackIndex) -> Result<Self, PackError> {
        if data.len() < PACK_HEADER_SIZE {
            return Err(PackError::InvalidHeader("file too small".into()));
        }
        if &data[0..4] != PACK_SIGNATURE {
            return Err(PackError::InvalidHeader("bad PACK signature".into()));
        }
        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if version != PACK_VERSION {
            return Err(PackError::UnsupportedVersion(version));
        }
        let num_objects = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);

        if index.num_objects() != num_objects {
            return Err(PackError::InvalidHeader(format!(
                "pack has {} objects but index has {}",
                num_objects,
                index.num_objects()
            )));
        }

        Ok(Self {
            data,
            index,
            num_objects,
        })
    }

    /// Read an object by OID.
    ///
    /// Returns `None` if the OID is not in this pack.
    pub fn read_object(&self, oid: &ObjectId) -> Result<Option<PackedObject>, PackError> {
        match self.index.lookup(oid)? {
            Some(offset) => self.read_at_offset(oid, offset).map(Some),
            None => Ok(None),
        }
    }

    /// Read an object at a known offset in the pack.
    ///
    /// Resolves delta chains iteratively (not recursively) to handle
    /// arbitrary chain depths safely.
    pub fn read_at_offset(&self, id: &ObjectId, offset: u64) -> Result<PackedObject, PackError> {
        self.read_at_offset_with_resolver(id, offset, |_| None)
    }

    /// Read an object by OID, with an external resolver for cross-pack REF_DELTA bases.
    ///
    /// The resolver is called when a REF_DELTA references a base OID not found in this pack.
    /// It should return the resolved base object's type and data if found externally.
    pub fn read_object_with_resolver(
        &self,
        oid: &ObjectId,
        resolver: impl Fn(&ObjectId) -> Option<(ObjectType, Vec<u8>)>,
    ) -> Result<Option<PackedObject>, PackError> {
        match self.index.lookup(oid)? {
            Some(offset) => self
                .read_at_offset_with_resolver(oid, offset, resolver)
                .map(Some),
            None => Ok(None),
        }
    }

    /// Read an object at a known offset, with an external resolver for cross-pack REF_DELTA bases.
    fn read_at_offset_with_resolver(
        &self,
        id: &ObjectId,
        offset: u64,
        resolver: impl Fn(&ObjectId) -> Option<(ObjectType, Vec<u8>)>,
    ) -> Result<PackedObject, PackError> {
        let mut chain: Vec<(PackEntry, Vec<u8>)> = Vec::new();
        let mut current_offset = offset;

        for depth in 0..MAX_DELTA_CHAIN_DEPTH {
            let entry = parse_entry_header(&self.data[current_offset as usize..], current_offset)?;

            let compressed = &self.data[entry.data_offset as usize..];
            let (decompressed, _) =
                decompress(compressed, entry.uncompressed_size, current_offset)?;

            match entry.entry_type {
                PackEntryType::Commit
                | PackEntryType::Tree
                | PackEntryType::Blob
                | PackEntryType::Tag => {
                    let obj_type = entry.entry_type.to_object_type().expect("non-delta type");

                    let mut data = decompressed;
                    for (_, delta_data) in chain.iter().rev() {
                        data = crate::delta::apply::apply_delta(&data, delta_data)?;
                    }

                    return verify_object_id(*id, obj_type, data);
                }
                PackEntryType::OfsDelta { base_offset } => {
                    chain.push((entry, decompressed));
                    current_offset = base_offset;
                }
                PackEntryType::RefDelta { base_oid } => {
                    chain.push((entry, decompressed));
                    if let Some(base_offset) = self.index.lookup(&base_oid)? {
                        current_offset = base_offset;
                    } else if let Some((obj_type, base_data)) = resolver(&base_oid) {
                        let mut data = base_data;
                        for (_, delta_data) in chain.iter().rev() {
                            data = crate::delta::apply::apply_delta(&data, delta_data)?;
                        }
                        return verify_object_id(*id, obj_type, data);
                    } else {
                        return Err(PackError::MissingBase(base_oid));
                    }
                }
            }

            if depth + 1 >= MAX_DELTA_CHAIN_DEPTH {
                return Err(PackError::DeltaChainTooDeep {
                    offset,
                    max_depth: MAX_DELTA_CHAIN_DEPTH,
                });
            }
        }

        Err(PackError::DeltaChainTooDeep {
            offset,
            max_depth: MAX_DELTA_CHAIN_DEPTH,
        })
    }

    /// Check if this pack contains the given OID.
    pub fn contains(&self, oid: &ObjectId) -> bool {
        matches!(self.index.lookup(oid), Ok(Some(_)))
    }

    /// Get the number of objects in this pack.
    pub fn num_objects(&self) -> u32 {
        self.num_objects
    }

    /// Get the pack index.
    pub fn index(&self) -> &PackIndex {
        &self.index
    }

    /// Get the raw pack data.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Confirm a materialised object's content actually hashes to the
/// identifier the index claimed for it: `SHA1(kind " " size NUL payload)`
/// must equal `id`. An index entry is a claim, not a fact, until this
/// check runs.
fn verify_object_id(id: ObjectId, obj_type: ObjectType, data: Vec<u8>) -> Result<PackedObject, PackError> {
    let kind = std::str::from_utf8(obj_type.as_bytes()).expect("object type names are ASCII");
    let computed = Hasher::hash_object(kind, &data)?;
    if computed != id {
        return Err(PackError::ChecksumMismatch {
            expected: id,
            actual: computed,
        });
    }
    Ok(PackedObject {
        id,
        obj_type,
        data,
    })
}

/// Decompress a zlib-framed pack entry, returning the decompressed bytes and
/// the number of compressed input bytes actually consumed.
///
/// Packed objects are concatenated with no length prefix, so the only way to
/// find where the next entry begins is to track how much of the input the
/// zlib stream itself consumed.
pub(crate) fn decompress(
    compressed: &[u8],
    expected_size: usize,
    offset: u64,
) -> Result<(Vec<u8>, usize), PackError> {
    let mut decompressor = Decompress::new(true);
    let mut out = vec![0u8; expected_size];
    decompressor
        .decompress(compressed, &mut out, FlushDecompress::Finish)
        .map_err(|_| PackError::CorruptEntry(offset))?;

    let produced = decompressor.total_out() as usize;
    if produced != expected_size {
        return Err(PackError::CorruptEntry(offset));
    }
    Ok((out, decompressor.total_in() as usize))
}

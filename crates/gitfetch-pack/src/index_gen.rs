//! Index generation and sequential (no-index) packfile decoding.
//!
//! Both operations share the same first pass: walk the packfile byte
//! stream one entry at a time, since the compressed length of each entry
//! is only known once the inflater has consumed it. [`generate_index`]
//! turns that walk into a v2 `.idx` plus a v1 `.ridx`; [`decode_packfile`]
//! turns it into the final list of materialised objects, resolving
//! deltas as it goes.

use std::collections::HashMap;

use gitfetch_hash::hasher::Hasher;
use gitfetch_hash::ObjectId;
use gitfetch_object::ObjectType;

use crate::entry::parse_entry_header;
use crate::pack::decompress;
use crate::{PackEntryType, PackError, PackedObject, PACK_HEADER_SIZE, PACK_SIGNATURE, PACK_VERSION};

const HASH_LEN: usize = 20;
const RIDX_SIGNATURE: &[u8; 4] = b"RIDX";
const RIDX_VERSION: u32 = 1;
const RIDX_HASH_ID_SHA1: u32 = 1;

/// A single object record read off the wire before delta resolution.
struct RawEntry {
    offset: u64,
    total_len: u64,
    crc: u32,
    kind: RawKind,
}

enum RawKind {
    Concrete(ObjectType, Vec<u8>),
    Ofs(u64, Vec<u8>),
    Ref(ObjectId, Vec<u8>),
}

/// Read the 12-byte pack header, returning the declared object count.
fn read_pack_header(data: &[u8]) -> Result<u32, PackError> {
    if data.len() < PACK_HEADER_SIZE + HASH_LEN {
        return Err(PackError::InvalidHeader("pack too small".into()));
    }
    if &data[0..4] != PACK_SIGNATURE {
        return Err(PackError::InvalidHeader("bad PACK signature".into()));
    }
    let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
    if version != PACK_VERSION {
        return Err(PackError::UnsupportedVersion(version));
    }
    Ok(u32::from_be_bytes([data[8], data[9], data[10], data[11]]))
}

/// Walk every object in the pack once, in pack order, recording its exact
/// on-disk byte range (needed for CRC-32) and its raw (possibly deltified)
/// decompressed payload.
fn walk_entries(data: &[u8]) -> Result<Vec<RawEntry>, PackError> {
    let count = read_pack_header(data)?;
    let content_end = data.len() - HASH_LEN;

    let mut entries = Vec::with_capacity(count as usize);
    let mut offset = PACK_HEADER_SIZE as u64;

    for _ in 0..count {
        if offset as usize >= content_end {
            return Err(PackError::BadFormat(
                "pack header count exceeds object stream".into(),
            ));
        }
        let header = parse_entry_header(&data[offset as usize..content_end], offset)?;
        let compressed = &data[header.data_offset as usize..content_end];
        let (decompressed, consumed) = decompress(compressed, header.uncompressed_size, offset)?;
        let total_len = (header.data_offset - offset) + consumed as u64;

        let record_end = (offset + total_len) as usize;
        if record_end > content_end {
            return Err(PackError::CorruptEntry(offset));
        }

        let mut crc_hasher = crc32fast::Hasher::new();
        crc_hasher.update(&data[offset as usize..record_end]);
        let crc = crc_hasher.finalize();

        let kind = match header.entry_type {
            PackEntryType::Commit => RawKind::Concrete(ObjectType::Commit, decompressed),
            PackEntryType::Tree => RawKind::Concrete(ObjectType::Tree, decompressed),
            PackEntryType::Blob => RawKind::Concrete(ObjectType::Blob, decompressed),
            PackEntryType::Tag => RawKind::Concrete(ObjectType::Tag, decompressed),
            PackEntryType::OfsDelta { base_offset } => RawKind::Ofs(base_offset, decompressed),
            PackEntryType::RefDelta { base_oid } => RawKind::Ref(base_oid, decompressed),
        };

        entries.push(RawEntry {
            offset,
            total_len,
            crc,
            kind,
        });
        offset += total_len;
    }

    Ok(entries)
}

/// Resolve every entry's final `(type, content)`, applying delta chains of
/// arbitrary order via a fixed-point worklist: an entry is resolved once its
/// base (by offset for ofs-delta, by identifier for ref-delta) is resolved.
///
/// `external` supplies bases that never arrive in this pack, for thin-pack
/// decoding against a caller's existing object store; pass a function that
/// always returns `None` when no such store is available.
fn resolve_all(
    entries: &[RawEntry],
    external: &dyn Fn(&ObjectId) -> Option<(ObjectType, Vec<u8>)>,
) -> Result<Vec<(ObjectType, Vec<u8>)>, PackError> {
    let by_offset: HashMap<u64, usize> = entries
        .iter()
        .enumerate()
        .map(|(i, e)| (e.offset, i))
        .collect();

    let mut resolved: Vec<Option<(ObjectType, Vec<u8>)>> = entries.iter().map(|_| None).collect();
    let mut id_to_index: HashMap<ObjectId, usize> = HashMap::new();
    let mut pending: Vec<usize> = (0..entries.len()).collect();

    loop {
        let mut progressed = false;
        let mut still_pending = Vec::new();

        for i in pending {
            let outcome: Option<(ObjectType, Vec<u8>)> = match &entries[i].kind {
                RawKind::Concrete(ty, data) => Some((*ty, data.clone())),
                RawKind::Ofs(base_offset, delta) => {
                    let base_idx = by_offset
                        .get(base_offset)
                        .copied()
                        .ok_or(PackError::CorruptEntry(entries[i].offset))?;
                    match &resolved[base_idx] {
                        Some((base_ty, base_data)) => {
                            Some((*base_ty, crate::delta::apply::apply_delta(base_data, delta)?))
                        }
                        None => None,
                    }
                }
                RawKind::Ref(base_oid, delta) => {
                    if let Some(&base_idx) = id_to_index.get(base_oid) {
                        let (base_ty, base_data) = resolved[base_idx].as_ref().expect("resolved");
                        Some((*base_ty, crate::delta::apply::apply_delta(base_data, delta)?))
                    } else if let Some((base_ty, base_data)) = external(base_oid) {
                        Some((base_ty, crate::delta::apply::apply_delta(&base_data, delta)?))
                    } else {
                        None
                    }
                }
            };

            match outcome {
                Some((ty, data)) => {
                    let oid = Hasher::hash_object(ty.as_bytes_str(), &data)?;
                    id_to_index.insert(oid, i);
                    resolved[i] = Some((ty, data));
                    progressed = true;
                }
                None => still_pending.push(i),
            }
        }

        pending = still_pending;
        if pending.is_empty() {
            break;
        }
        if !progressed {
            let stuck = pending[0];
            return Err(match &entries[stuck].kind {
                RawKind::Ref(base_oid, _) => PackError::UnresolvedDelta(*base_oid),
                _ => PackError::UnresolvedDelta(ObjectId::NULL),
            });
        }
    }

    Ok(resolved
        .into_iter()
        .map(|r| r.expect("every entry resolved or error returned above"))
        .collect())
}

trait AsBytesStr {
    fn as_bytes_str(&self) -> &'static str;
}

impl AsBytesStr for ObjectType {
    fn as_bytes_str(&self) -> &'static str {
        match self {
            ObjectType::Commit => "commit",
            ObjectType::Tree => "tree",
            ObjectType::Blob => "blob",
            ObjectType::Tag => "tag",
        }
    }
}

/// Decode a packfile with no companion index, resolving every object
/// (including delta chains) and returning the materialised list.
///
/// `external` resolves `RefDelta` bases not present in this pack — pass a
/// closure that always returns `None` for a self-contained (non-thin) pack.
pub fn decode_packfile(
    data: &[u8],
    external: &dyn Fn(&ObjectId) -> Option<(ObjectType, Vec<u8>)>,
) -> Result<Vec<PackedObject>, PackError> {
    verify_trailer(data)?;
    let entries = walk_entries(data)?;
    let resolved = resolve_all(&entries, external)?;

    entries
        .iter()
        .zip(resolved.into_iter())
        .map(|(_entry, (obj_type, data))| {
            let id = Hasher::hash_object(obj_type.as_bytes_str(), &data)?;
            Ok(PackedObject {
                id,
                obj_type,
                data,
            })
        })
        .collect()
}

fn verify_trailer(data: &[u8]) -> Result<(), PackError> {
    if data.len() < HASH_LEN {
        return Err(PackError::InvalidHeader("pack too small for trailer".into()));
    }
    let content = &data[..data.len() - HASH_LEN];
    let stored = ObjectId::from_bytes(&data[data.len() - HASH_LEN..])
        .map_err(|_| PackError::InvalidHeader("invalid trailer bytes".into()))?;
    let mut hasher = Hasher::new();
    hasher.update(content);
    let computed = hasher.finalize()?;
    if computed != stored {
        return Err(PackError::ChecksumMismatch {
            expected: stored,
            actual: computed,
        });
    }
    Ok(())
}

/// Derive a v2 pack index and a v1 reverse index directly from packfile
/// bytes, with no prior index to lean on.
///
/// Rejects packs containing any object at or beyond the 2 GiB boundary
/// with [`PackError::LargeOffsetUnsupported`] — this client never needs to
/// address packs that large, and the 64-bit offset table this would
/// require is unimplemented.
pub fn generate_index(pack_bytes: &[u8]) -> Result<(Vec<u8>, Vec<u8>), PackError> {
    verify_trailer(pack_bytes)?;
    let entries = walk_entries(pack_bytes)?;

    for entry in &entries {
        if entry.offset >= (1u64 << 31) {
            return Err(PackError::LargeOffsetUnsupported);
        }
    }

    let resolved = resolve_all(&entries, &|_| None)?;

    let pack_order: Vec<(ObjectId, u64, u32)> = entries
        .iter()
        .zip(resolved.iter())
        .map(|(entry, (ty, data))| {
            let oid = Hasher::hash_object(ty.as_bytes_str(), data)?;
            Ok((oid, entry.offset, entry.crc))
        })
        .collect::<Result<_, PackError>>()?;

    let pack_checksum = ObjectId::from_bytes(&pack_bytes[pack_bytes.len() - HASH_LEN..])
        .expect("verify_trailer already validated trailer length");

    let mut sorted = pack_order.clone();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let idx = build_idx(&sorted, &pack_checksum)?;
    let ridx = build_ridx(&pack_order, &sorted, &pack_checksum)?;

    Ok((idx, ridx))
}

fn build_idx(sorted: &[(ObjectId, u64, u32)], pack_checksum: &ObjectId) -> Result<Vec<u8>, PackError> {
    use crate::{IDX_SIGNATURE, IDX_VERSION};

    let mut idx = Vec::new();
    idx.extend_from_slice(&IDX_SIGNATURE);
    idx.extend_from_slice(&IDX_VERSION.to_be_bytes());

    let mut fanout = [0u32; 256];
    for (oid, _, _) in sorted {
        fanout[oid.first_byte() as usize] += 1;
    }
    for i in 1..256 {
        fanout[i] += fanout[i - 1];
    }
    for count in fanout {
        idx.extend_from_slice(&count.to_be_bytes());
    }

    for (oid, _, _) in sorted {
        idx.extend_from_slice(oid.as_bytes());
    }
    for (_, _, crc) in sorted {
        idx.extend_from_slice(&crc.to_be_bytes());
    }
    for (_, offset, _) in sorted {
        idx.extend_from_slice(&(*offset as u32).to_be_bytes());
    }

    idx.extend_from_slice(pack_checksum.as_bytes());
    let mut hasher = Hasher::new();
    hasher.update(&idx);
    let idx_checksum = hasher.finalize()?;
    idx.extend_from_slice(idx_checksum.as_bytes());

    Ok(idx)
}

fn build_ridx(
    pack_order: &[(ObjectId, u64, u32)],
    sorted: &[(ObjectId, u64, u32)],
    pack_checksum: &ObjectId,
) -> Result<Vec<u8>, PackError> {
    let position: HashMap<ObjectId, u32> = sorted
        .iter()
        .enumerate()
        .map(|(pos, (oid, _, _))| (*oid, pos as u32))
        .collect();

    let mut ridx = Vec::new();
    ridx.extend_from_slice(RIDX_SIGNATURE);
    ridx.extend_from_slice(&RIDX_VERSION.to_be_bytes());
    ridx.extend_from_slice(&RIDX_HASH_ID_SHA1.to_be_bytes());

    for (oid, _, _) in pack_order {
        let pos = position[oid];
        ridx.extend_from_slice(&pos.to_be_bytes());
    }

    ridx.extend_from_slice(pack_checksum.as_bytes());
    let mut hasher = Hasher::new();
    hasher.update(&ridx);
    let ridx_checksum = hasher.finalize()?;
    ridx.extend_from_slice(ridx_checksum.as_bytes());

    Ok(ridx)
}

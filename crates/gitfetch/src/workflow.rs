//! The partial-clone workflow: blobless fetch, subdirectory resolution,
//! blob enumeration, and a second object-specific fetch for whatever the
//! caller's cache doesn't already have.

use std::collections::HashMap;

use bstr::BString;
use gitfetch_hash::ObjectId;
use gitfetch_object::{Commit, ObjectType};
use gitfetch_protocol::fetch::FetchOptions;
use gitfetch_transport::UploadPackTransport;
use tokio_util::sync::CancellationToken;

use crate::store::ObjectStore;
use crate::walk::{self, WalkEntry};
use crate::FetchError;

/// A caller-supplied cache of previously-fetched blobs.
///
/// A pure capability — a lookup hook and a notify-on-load hook. Optional:
/// its absence just means every missing blob is re-fetched every time.
/// `load_subdirectory` never owns or centralises cache storage itself.
pub trait BlobCache: Send + Sync {
    /// Return the blob's content if already cached.
    fn lookup(&self, id: &ObjectId) -> Option<Vec<u8>>;

    /// Called once per blob newly retrieved by the secondary fetch, so the
    /// cache can persist it for next time. Advisory: the caller's own
    /// failures here are not this crate's concern.
    fn notify_loaded(&self, id: &ObjectId, data: &[u8]);
}

/// Fetch just the files under `path` at `commit_id`, without a local git
/// binary or a full clone.
///
/// Drives the six-step partial-clone flow: a blobless, depth-1 fetch
/// locates the commit and every tree reachable from it; the requested
/// subdirectory is navigated and its blobs enumerated; any blob not
/// already known (in the blobless store or the caller's cache) is
/// retrieved by a second, object-specific thin fetch; the result is a
/// `path -> bytes` map for every regular/executable file under `path`.
///
/// A missing tree during subdirectory navigation aborts (trees in a
/// blobless clone are always complete). A blob still missing after the
/// secondary fetch also aborts.
pub async fn load_subdirectory(
    transport: &dyn UploadPackTransport,
    repo_url: &str,
    commit_id: &ObjectId,
    path: &[&str],
    cache: Option<&dyn BlobCache>,
    cancel: &CancellationToken,
) -> Result<HashMap<BString, Vec<u8>>, FetchError> {
    let span = tracing::info_span!(
        "load_subdirectory",
        repo = %repo_host(repo_url),
        commit = %commit_id,
        path_components = path.len(),
    );
    let _enter = span.enter();

    // Step 1: blobless fetch at depth 1.
    let blobless_opts = FetchOptions::new().depth(1).filter("blob:none");
    let response = gitfetch_protocol::fetch::fetch(
        transport,
        repo_url,
        std::slice::from_ref(commit_id),
        &blobless_opts,
        cancel,
    )
    .await?;
    let objects = gitfetch_pack::decode_packfile(&response.pack_data, &|_| None)?;
    let mut store = ObjectStore::from_packed_objects(objects);

    // Step 2: commit -> root tree -> requested subdirectory.
    let commit = load_commit(&store, commit_id)?;
    let subdir_tree_id = walk::navigate_subdirectory(&store, &commit.tree, path)?;

    // Step 3: enumerate every blob reachable under the subdirectory.
    let entries = walk::enumerate_blobs(&store, &subdir_tree_id)?;

    // Step 4: split into already-known/cached vs. missing.
    let mut missing = Vec::new();
    let mut from_cache: Vec<(ObjectId, Vec<u8>)> = Vec::new();
    for entry in &entries {
        if let WalkEntry::Blob { id, .. } = entry {
            if store.contains(id) {
                continue;
            }
            if let Some(data) = cache.and_then(|c| c.lookup(id)) {
                from_cache.push((*id, data));
                continue;
            }
            missing.push(*id);
        }
    }

    tracing::debug!(
        total_blobs = entries.len(),
        cached = from_cache.len(),
        missing = missing.len(),
        "blob enumeration complete"
    );

    // Step 5: thin fetch whatever's missing, then merge + notify the cache.
    if !missing.is_empty() {
        let thin_opts = FetchOptions::new();
        let thin_response =
            gitfetch_protocol::fetch::fetch(transport, repo_url, &missing, &thin_opts, cancel).await?;
        let external = |id: &ObjectId| store.get(id).map(|(t, d)| (t, d.to_vec()));
        let thin_objects = gitfetch_pack::decode_packfile(&thin_response.pack_data, &external)?;
        for obj in thin_objects {
            if let Some(cache) = cache {
                cache.notify_loaded(&obj.id, &obj.data);
            }
            store.insert(obj.id, obj.obj_type, obj.data);
        }
    }
    for (id, data) in from_cache {
        store.insert(id, ObjectType::Blob, data);
    }

    // Step 6: materialise path -> bytes from the now-complete store.
    let mut result = HashMap::with_capacity(entries.len());
    for entry in entries {
        if let WalkEntry::Blob { path, id } = entry {
            let (_, data) = store.get(&id).ok_or(FetchError::MissingObject(id))?;
            result.insert(path, data.to_vec());
        }
    }

    tracing::debug!(files = result.len(), "subdirectory materialised");
    Ok(result)
}

fn load_commit(store: &ObjectStore, id: &ObjectId) -> Result<Commit, FetchError> {
    let (obj_type, data) = store.get(id).ok_or(FetchError::MissingObject(*id))?;
    if obj_type != ObjectType::Commit {
        return Err(FetchError::NotACommit(*id));
    }
    Ok(Commit::parse(data)?)
}

fn repo_host(repo_url: &str) -> &str {
    repo_url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(repo_url)
        .split('/')
        .next()
        .unwrap_or(repo_url)
}

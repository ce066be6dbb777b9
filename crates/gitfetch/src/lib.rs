//! Fetches files from a remote Git repository over Smart-HTTP, without a
//! local git binary, a filesystem, or a full object database.
//!
//! This crate is the orchestration layer on top of [`gitfetch_protocol`]
//! (wire protocol), [`gitfetch_pack`] (packfile decode), and
//! [`gitfetch_object`] (commit/tree parsing). Its main entry point,
//! [`load_subdirectory`], drives the partial-clone workflow: a blobless
//! fetch locates the requested subdirectory's tree, then a second,
//! object-specific fetch retrieves only the blobs actually needed.

pub mod store;
pub mod walk;
pub mod workflow;

pub use gitfetch_protocol::fetch::{discover_refs, fetch, resolve_symref, FetchOptions, FetchResponse, RefAdvertisement};
pub use store::ObjectStore;
pub use walk::{WalkEntry, WalkError};
pub use workflow::{load_subdirectory, BlobCache};

use gitfetch_hash::ObjectId;

/// Composite error type for the orchestration layer.
///
/// Each variant either wraps a lower crate's own error type (the "eleven
/// kinds" in the error design are a classification for documentation and
/// tests, not a literal flat enum — each concrete error belongs to the
/// crate that can actually produce it) or names something only the
/// orchestration layer itself can get wrong.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error(transparent)]
    Hash(#[from] gitfetch_hash::HashError),

    #[error(transparent)]
    Object(#[from] gitfetch_object::ObjectError),

    #[error(transparent)]
    Pack(#[from] gitfetch_pack::PackError),

    #[error(transparent)]
    Transport(#[from] gitfetch_transport::TransportError),

    #[error(transparent)]
    Protocol(#[from] gitfetch_protocol::ProtocolError),

    #[error(transparent)]
    Walk(#[from] walk::WalkError),

    #[error("object {0} is not a commit")]
    NotACommit(ObjectId),

    #[error("blob {0} missing from object store after thin fetch")]
    MissingObject(ObjectId),
}

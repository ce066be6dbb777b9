//! SHA-1 object identity for gitfetch.
//!
//! This crate provides the `ObjectId` type, hash computation, and hex
//! encoding/decoding used throughout the fetch pipeline. Only SHA-1 is
//! supported — non-SHA-1 object identifiers are out of scope for this
//! client.

mod error;
pub mod hex;
mod oid;
pub mod hasher;
pub mod fanout;

pub use error::HashError;
pub use oid::ObjectId;

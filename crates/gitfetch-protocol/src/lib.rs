//! Smart-HTTP upload-pack fetch protocol.
//!
//! This crate drives the client side of a git fetch against a Smart-HTTP
//! remote: pkt-line framing, v1 capability negotiation, side-band demux,
//! and the full/shallow/blobless/thin-pack request shapes. It knows
//! nothing about how bytes reach the server (`gitfetch-transport`) or how
//! the resulting packfile is decoded (`gitfetch-pack`) — it only builds
//! and parses the wire exchange between them.

pub mod capability;
pub mod fetch;
pub mod pktline;
pub mod sideband;
pub mod v1;

/// Errors that can occur during protocol operations.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid pkt-line: {0}")]
    InvalidPktLine(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("server error: {0}")]
    ServerError(String),

    #[error(transparent)]
    Transport(#[from] gitfetch_transport::TransportError),

    #[error(transparent)]
    Pack(#[from] gitfetch_pack::PackError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

//! The fetch driver: reference discovery and the upload-pack request/response
//! exchange, built on top of [`crate::v1`], [`crate::pktline`], and
//! [`crate::sideband`].

use std::io::{Cursor, Read};

use gitfetch_hash::ObjectId;
use gitfetch_transport::UploadPackTransport;
use tokio_util::sync::CancellationToken;

use crate::capability::{self, Capabilities, SidebandMode};
use crate::pktline::{PktLine, PktLineReader, PktLineWriter};
use crate::sideband::SidebandReader;
use crate::v1;
use crate::ProtocolError;

/// Knobs for a single `fetch` call: shallow depth, an object filter
/// (`"blob:none"` for a blobless fetch), and any `have` lines to narrow
/// the pack the server sends back.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    depth: Option<u32>,
    filter: Option<String>,
    haves: Vec<ObjectId>,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit commit history to `depth` generations (a history-shallowed fetch).
    pub fn depth(mut self, depth: u32) -> Self {
        self.depth = Some(depth);
        self
    }

    /// Request a blobless fetch (`filter blob:none`) or any other object filter.
    pub fn filter(mut self, spec: impl Into<String>) -> Self {
        self.filter = Some(spec.into());
        self
    }

    /// Identifiers the client already has, sent as `have` lines to narrow the pack.
    pub fn haves(mut self, haves: Vec<ObjectId>) -> Self {
        self.haves = haves;
        self
    }

    pub fn depth_value(&self) -> Option<u32> {
        self.depth
    }

    pub fn filter_value(&self) -> Option<&str> {
        self.filter.as_deref()
    }
}

/// The refs and capabilities advertised by `GET info/refs`.
#[derive(Debug, Clone, Default)]
pub struct RefAdvertisement {
    pub refs: Vec<(ObjectId, bstr::BString)>,
    pub capabilities: Capabilities,
}

/// Packfile bytes plus any shallow-boundary bookkeeping from the response.
#[derive(Debug)]
pub struct FetchResponse {
    pub pack_data: Vec<u8>,
    pub shallow_commits: Vec<ObjectId>,
    pub unshallow_commits: Vec<ObjectId>,
}

/// `GET {repo}/info/refs?service=git-upload-pack`, parsed.
pub async fn discover_refs(
    transport: &dyn UploadPackTransport,
    repo_url: &str,
    cancel: &CancellationToken,
) -> Result<RefAdvertisement, ProtocolError> {
    let span = tracing::info_span!("discover_refs", repo = %repo_host(repo_url));
    let _enter = span.enter();

    let body = transport.get_info_refs(repo_url, cancel).await?;
    let mut pkt_reader = PktLineReader::new(Cursor::new(body));
    let (refs, capabilities) = v1::parse_ref_advertisement(&mut pkt_reader)?;

    tracing::debug!(ref_count = refs.len(), "discovered refs");
    Ok(RefAdvertisement { refs, capabilities })
}

/// Resolve a symbolic reference (typically `HEAD`) to the refname it points at.
pub async fn resolve_symref(
    transport: &dyn UploadPackTransport,
    repo_url: &str,
    name: &str,
    cancel: &CancellationToken,
) -> Result<Option<String>, ProtocolError> {
    let advertisement = discover_refs(transport, repo_url, cancel).await?;
    Ok(v1::resolve_symref(&advertisement.capabilities, name).map(str::to_string))
}

/// Fetch a packfile for the given want identifiers.
///
/// Performs its own reference-discovery request first (to learn server
/// capabilities), then the upload-pack POST. Safe to call with a handful
/// of wants (a full or shallow-history fetch), a single commit plus
/// `opts.filter("blob:none")` (a blobless fetch), or a list of specific
/// object identifiers with no filter (an object-specific thin fetch).
pub async fn fetch(
    transport: &dyn UploadPackTransport,
    repo_url: &str,
    wants: &[ObjectId],
    opts: &FetchOptions,
    cancel: &CancellationToken,
) -> Result<FetchResponse, ProtocolError> {
    let span = tracing::info_span!(
        "fetch",
        repo = %repo_host(repo_url),
        wants = wants.len(),
        depth = opts.depth,
        filter = opts.filter.as_deref().unwrap_or("")
    );
    let _enter = span.enter();

    if wants.is_empty() {
        return Ok(FetchResponse {
            pack_data: Vec::new(),
            shallow_commits: Vec::new(),
            unshallow_commits: Vec::new(),
        });
    }

    let advertisement = discover_refs(transport, repo_url, cancel).await?;
    let server_caps = &advertisement.capabilities;

    let client_caps = capability::negotiate_fetch_capabilities(server_caps, opts.filter.is_some());
    let sideband_mode = capability::select_sideband(server_caps);

    let shallow_lines: Vec<String> = opts
        .depth
        .filter(|_| server_caps.has("shallow"))
        .map(|depth| vec![format!("deepen {depth}")])
        .unwrap_or_default();

    let filter_spec = opts
        .filter
        .as_deref()
        .filter(|_| server_caps.has("filter"));

    let mut body = Vec::new();
    {
        let mut writer = PktLineWriter::new(&mut body);
        v1::send_fetch_request(
            &mut writer,
            wants,
            &client_caps,
            &shallow_lines,
            filter_spec,
            &opts.haves,
        )?;
    }

    let response_bytes = transport.post_upload_pack(repo_url, body, cancel).await?;

    let mut pkt_reader = PktLineReader::new(Cursor::new(response_bytes));
    let (shallow_commits, unshallow_commits, leftover) =
        v1::read_negotiation_response(&mut pkt_reader)?;

    let pack_data = match sideband_mode {
        SidebandMode::None => read_no_sideband_pack(pkt_reader, leftover)?,
        SidebandMode::Band | SidebandMode::Band64k => {
            let mut sideband = SidebandReader::new(pkt_reader);
            sideband.read_all_data_with_leftover(leftover)?
        }
    };

    tracing::debug!(
        pack_bytes = pack_data.len(),
        shallow = shallow_commits.len(),
        unshallow = unshallow_commits.len(),
        "fetch complete"
    );

    Ok(FetchResponse {
        pack_data,
        shallow_commits,
        unshallow_commits,
    })
}

/// Capture the packfile when no side-band was negotiated.
///
/// Without side-band, the bytes following the ACK/NAK section may arrive
/// raw (starting with the `PACK` signature) or still wrapped in
/// pkt-lines. `leftover` is a payload `read_negotiation_response` had to
/// consume to find the end of that section. Sniff the signature across
/// it plus the rest of the stream, then either use it as-is or strip the
/// pkt-line framing back off.
fn read_no_sideband_pack(
    pkt_reader: PktLineReader<Cursor<Vec<u8>>>,
    leftover: Option<Vec<u8>>,
) -> Result<Vec<u8>, ProtocolError> {
    let mut tail = leftover.unwrap_or_default();
    pkt_reader.into_inner().read_to_end(&mut tail)?;

    if tail.starts_with(b"PACK") {
        return Ok(tail);
    }

    let mut framed = PktLineReader::new(Cursor::new(tail));
    let mut pack_data = Vec::new();
    loop {
        match framed.read_pkt()? {
            PktLine::Data(data) => pack_data.extend_from_slice(&data),
            PktLine::Flush | PktLine::Delimiter | PktLine::ResponseEnd => break,
        }
    }
    Ok(pack_data)
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

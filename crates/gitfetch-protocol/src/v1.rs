//! v1 reference advertisement parsing and want/have negotiation.
//!
//! This client only speaks v1 — the server's `GET info/refs` response is
//! read as a plain v1 ref list with capabilities after a NUL on the first
//! line. (A `version 2` first line would indicate the server switched to
//! protocol v2, which this client does not request and does not parse.)

use bstr::BString;
use gitfetch_hash::ObjectId;

use crate::capability::Capabilities;
use crate::pktline::{PktLine, PktLineReader, PktLineWriter};
use crate::ProtocolError;

/// Parse the `info/refs` response body into its advertised refs and
/// server capabilities.
///
/// The first non-comment ref line carries capabilities after a NUL byte.
/// Lines beginning with `#` (e.g. `# service=git-upload-pack`) are
/// skipped, as is the flush packet that typically follows them.
pub fn parse_ref_advertisement<R: std::io::Read>(
    reader: &mut PktLineReader<R>,
) -> Result<(Vec<(ObjectId, BString)>, Capabilities), ProtocolError> {
    let mut refs = Vec::new();
    let mut capabilities = Capabilities::default();
    let mut first_ref_line = true;

    loop {
        match reader.read_pkt()? {
            PktLine::Flush | PktLine::Delimiter | PktLine::ResponseEnd => {
                if refs.is_empty() && first_ref_line {
                    // Flush terminating the "# service=..." preamble section.
                    continue;
                }
                break;
            }
            PktLine::Data(data) => {
                let line = strip_newline(&data);

                if line.starts_with(b"#") {
                    continue;
                }

                if first_ref_line {
                    first_ref_line = false;

                    if let Some(nul_pos) = line.iter().position(|&b| b == 0) {
                        let ref_part = &line[..nul_pos];
                        let caps_str = String::from_utf8_lossy(&line[nul_pos + 1..]);
                        capabilities = Capabilities::parse_v1(&caps_str);
                        parse_ref_line(ref_part, &mut refs)?;
                    } else {
                        parse_ref_line(line, &mut refs)?;
                    }
                } else {
                    parse_ref_line(line, &mut refs)?;
                }
            }
        }
    }

    Ok((refs, capabilities))
}

/// Parse a single ref advertisement line: `<40-hex-oid> <refname>`.
fn parse_ref_line(line: &[u8], refs: &mut Vec<(ObjectId, BString)>) -> Result<(), ProtocolError> {
    if line.starts_with(b"#") || line.is_empty() {
        return Ok(());
    }

    let space_pos = line.iter().position(|&b| b == b' ').ok_or_else(|| {
        ProtocolError::Protocol(format!(
            "invalid ref line (no space): {}",
            String::from_utf8_lossy(line)
        ))
    })?;

    let oid_hex = &line[..space_pos];
    let refname = &line[space_pos + 1..];

    let oid_str = std::str::from_utf8(oid_hex)
        .map_err(|_| ProtocolError::Protocol("invalid UTF-8 in OID".into()))?;

    let oid = ObjectId::from_hex(oid_str)
        .map_err(|e| ProtocolError::Protocol(format!("invalid OID in ref advertisement: {e}")))?;

    refs.push((oid, BString::from(refname)));
    Ok(())
}

/// Resolve `HEAD` (or another symbolic ref) to its target ref name via
/// the `symref=<name>:<target>` capability, if the server advertised one.
pub fn resolve_symref<'a>(caps: &'a Capabilities, name: &str) -> Option<&'a str> {
    caps.entries().iter().find_map(|e| {
        if e.name != "symref" {
            return None;
        }
        let value = e.value.as_deref()?;
        let (lhs, rhs) = value.split_once(':')?;
        (lhs == name).then_some(rhs)
    })
}

/// Send `want` lines (with capabilities on the first), optional shallow
/// negotiation lines, `have` lines, and a final `done`.
pub fn send_fetch_request<W: std::io::Write>(
    writer: &mut PktLineWriter<W>,
    wants: &[ObjectId],
    client_caps: &[String],
    shallow_lines: &[String],
    filter_spec: Option<&str>,
    haves: &[ObjectId],
) -> Result<(), ProtocolError> {
    for (i, want) in wants.iter().enumerate() {
        if i == 0 && !client_caps.is_empty() {
            let caps_str = client_caps.join(" ");
            writer.write_text(&format!("want {want} {caps_str}"))?;
        } else {
            writer.write_text(&format!("want {want}"))?;
        }
    }

    for line in shallow_lines {
        writer.write_text(line)?;
    }

    if let Some(spec) = filter_spec {
        writer.write_text(&format!("filter {spec}"))?;
    }

    writer.write_flush()?;

    for have in haves {
        writer.write_text(&format!("have {have}"))?;
    }

    writer.write_text("done")?;
    writer.flush()
}

/// Consume the ACK/NAK (and any `shallow`/`unshallow`) section that
/// precedes the packfile in the server's response, returning the
/// boundary commits reported.
///
/// The third return value is a pkt-line payload that was read off the
/// wire but didn't match any recognised negotiation line. The section
/// ended without an explicit terminal `NAK`/`ACK ... ready`, so this
/// packet is actually the start of the packfile (raw, sideband-tagged,
/// or itself pkt-line framed) and must be handed back instead of
/// dropped.
pub fn read_negotiation_response<R: std::io::Read>(
    reader: &mut PktLineReader<R>,
) -> Result<(Vec<ObjectId>, Vec<ObjectId>, Option<Vec<u8>>), ProtocolError> {
    let mut shallow_commits = Vec::new();
    let mut unshallow_commits = Vec::new();

    loop {
        match reader.read_pkt()? {
            PktLine::Data(data) => {
                let line = String::from_utf8_lossy(strip_newline(&data)).to_string();
                if line == "NAK" {
                    return Ok((shallow_commits, unshallow_commits, None));
                }
                if let Some(hex) = line.strip_prefix("shallow ") {
                    if let Ok(oid) = ObjectId::from_hex(hex.trim()) {
                        shallow_commits.push(oid);
                    }
                    continue;
                }
                if let Some(hex) = line.strip_prefix("unshallow ") {
                    if let Ok(oid) = ObjectId::from_hex(hex.trim()) {
                        unshallow_commits.push(oid);
                    }
                    continue;
                }
                if line.starts_with("ACK ") {
                    if line.contains(" ready") || line.ends_with("ACK") {
                        return Ok((shallow_commits, unshallow_commits, None));
                    }
                    continue;
                }
                return Ok((shallow_commits, unshallow_commits, Some(data)));
            }
            PktLine::Flush | PktLine::Delimiter | PktLine::ResponseEnd => {
                return Ok((shallow_commits, unshallow_commits, None));
            }
        }
    }
}

/// Legacy entry point kept for the existing negotiation tests: send a
/// want/have/done exchange and read the ACK/NAK section, reporting
/// whether the server is ready to send a pack.
pub fn negotiate_fetch<W: std::io::Write, R: std::io::Read>(
    writer: &mut PktLineWriter<W>,
    reader: &mut PktLineReader<R>,
    wants: &[ObjectId],
    haves: &[ObjectId],
    client_caps: &[String],
) -> Result<bool, ProtocolError> {
    if wants.is_empty() {
        return Ok(false);
    }

    send_fetch_request(writer, wants, client_caps, &[], None, haves)?;
    read_negotiation_response(reader)?;
    Ok(true)
}

fn strip_newline(data: &[u8]) -> &[u8] {
    if data.last() == Some(&b'\n') {
        &data[..data.len() - 1]
    } else {
        data
    }
}

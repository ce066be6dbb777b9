//! Sideband multiplexing for git protocol.
//!
//! During fetch/push, the server multiplexes data, progress, and error
//! messages over sideband channels:
//! - Band 1: pack data
//! - Band 2: progress messages (sent to stderr)
//! - Band 3: fatal error messages

use std::io::Read;

use crate::pktline::{PktLine, PktLineReader};
use crate::ProtocolError;

/// Sideband channel identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    /// Pack data (band 1).
    Data = 1,
    /// Progress messages (band 2).
    Progress = 2,
    /// Fatal error (band 3).
    Error = 3,
}

/// Callback for handling sideband progress/error messages.
pub type SidebandCallback = Box<dyn FnMut(Band, &[u8]) + Send>;

/// Result of demuxing a single pkt-line payload by its channel byte.
enum Demuxed {
    Data(Vec<u8>),
    Skip,
    End,
}

/// Sideband demultiplexer.
///
/// Reads pkt-lines and separates data (band 1) from progress (band 2)
/// and error (band 3) messages.
pub struct SidebandReader<R> {
    reader: PktLineReader<R>,
    callback: Option<SidebandCallback>,
}

impl<R: Read> SidebandReader<R> {
    pub fn new(reader: PktLineReader<R>) -> Self {
        Self {
            reader,
            callback: None,
        }
    }

    /// Set a callback for progress/error messages.
    pub fn with_callback(mut self, callback: SidebandCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Demux a single already-read pkt-line payload by its channel byte.
    /// Shared by [`Self::read_data`] and by callers that consumed a pkt-line
    /// upstream (e.g. while scanning for the ACK/NAK negotiation boundary)
    /// before realising it was actually the first band-tagged chunk.
    fn demux(&mut self, data: Vec<u8>) -> Result<Demuxed, ProtocolError> {
        if data.is_empty() {
            return Ok(Demuxed::End);
        }

        let band = data[0];
        let payload = &data[1..];

        match band {
            1 => Ok(Demuxed::Data(payload.to_vec())),
            2 => {
                if let Some(ref mut cb) = self.callback {
                    cb(Band::Progress, payload);
                } else {
                    let msg = String::from_utf8_lossy(payload);
                    tracing::debug!(target: "gitfetch::remote", "{}", msg.trim_end());
                }
                Ok(Demuxed::Skip)
            }
            3 => {
                let msg = String::from_utf8_lossy(payload).to_string();
                if let Some(ref mut cb) = self.callback {
                    cb(Band::Error, payload);
                }
                Err(ProtocolError::ServerError(msg))
            }
            _ => Err(ProtocolError::Protocol(format!(
                "unknown sideband channel: {}",
                band
            ))),
        }
    }

    /// Read the next data packet (band 1).
    ///
    /// Progress and error messages are dispatched to the callback.
    /// Returns None on flush packet (end of data).
    /// Returns error on band 3 (fatal error from server).
    pub fn read_data(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        loop {
            match self.reader.read_pkt()? {
                PktLine::Flush | PktLine::Delimiter | PktLine::ResponseEnd => {
                    return Ok(None);
                }
                PktLine::Data(data) => match self.demux(data)? {
                    Demuxed::Data(d) => return Ok(Some(d)),
                    Demuxed::Skip => continue,
                    Demuxed::End => return Ok(None),
                },
            }
        }
    }

    /// Read all remaining data from band 1, collecting into a Vec.
    pub fn read_all_data(&mut self) -> Result<Vec<u8>, ProtocolError> {
        self.read_all_data_with_leftover(None)
    }

    /// Like [`Self::read_all_data`], but first demuxes a pkt-line payload
    /// the caller already read off the wire (while it was still looking
    /// for the ACK/NAK negotiation boundary) before continuing to pull
    /// fresh pkt-lines from the stream.
    pub fn read_all_data_with_leftover(
        &mut self,
        leftover: Option<Vec<u8>>,
    ) -> Result<Vec<u8>, ProtocolError> {
        let mut result = Vec::new();
        if let Some(data) = leftover {
            if let Demuxed::Data(d) = self.demux(data)? {
                result.extend_from_slice(&d);
            }
        }
        while let Some(chunk) = self.read_data()? {
            result.extend_from_slice(&chunk);
        }
        Ok(result)
    }

    /// Get the underlying pkt-line reader.
    pub fn into_inner(self) -> PktLineReader<R> {
        self.reader
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pktline::PktLineWriter;
    use std::io::Cursor;

    fn make_sideband_packet(band: u8, data: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut writer = PktLineWriter::new(&mut buf);
        let mut pkt = vec![band];
        pkt.extend_from_slice(data);
        writer.write_line(&pkt).unwrap();
        buf
    }

    #[test]
    fn read_data_band() {
        let mut buf = make_sideband_packet(1, b"pack data here");
        // Add flush
        buf.extend_from_slice(b"0000");

        let reader = PktLineReader::new(Cursor::new(buf));
        let mut sb = SidebandReader::new(reader);

        let data = sb.read_data().unwrap().unwrap();
        assert_eq!(data, b"pack data here");

        // Next read should return None (flush)
        assert!(sb.read_data().unwrap().is_none());
    }

    #[test]
    fn read_progress_band_skipped() {
        let mut buf = make_sideband_packet(2, b"Counting objects: 5\n");
        buf.extend_from_slice(&make_sideband_packet(1, b"actual data"));
        buf.extend_from_slice(b"0000");

        let reader = PktLineReader::new(Cursor::new(buf));
        let mut progress_msgs = Vec::new();
        let cb: SidebandCallback = Box::new(move |band, data| {
            if band == Band::Progress {
                progress_msgs.push(data.to_vec());
            }
        });
        let mut sb = SidebandReader::new(reader).with_callback(cb);

        // Should skip progress and return data
        let data = sb.read_data().unwrap().unwrap();
        assert_eq!(data, b"actual data");
    }

    #[test]
    fn read_error_band() {
        let mut buf = make_sideband_packet(3, b"repository not found");
        buf.extend_from_slice(b"0000");

        let reader = PktLineReader::new(Cursor::new(buf));
        let mut sb = SidebandReader::new(reader);

        let err = sb.read_data().unwrap_err();
        match err {
            ProtocolError::ServerError(msg) => {
                assert!(msg.contains("repository not found"));
            }
            _ => panic!("expected ServerError, got {:?}", err),
        }
    }

    #[test]
    fn read_all_data() {
        let mut buf = make_sideband_packet(1, b"chunk1");
        buf.extend_from_slice(&make_sideband_packet(1, b"chunk2"));
        buf.extend_from_slice(b"0000");

        let reader = PktLineReader::new(Cursor::new(buf));
        let mut sb = SidebandReader::new(reader);

        let data = sb.read_all_data().unwrap();
        assert_eq!(data, b"chunk1chunk2");
    }

    #[test]
    fn read_all_data_with_leftover_prepends_demuxed_chunk() {
        let mut pkt = vec![1u8];
        pkt.extend_from_slice(b"chunk1");

        let mut buf = make_sideband_packet(1, b"chunk2");
        buf.extend_from_slice(b"0000");

        let reader = PktLineReader::new(Cursor::new(buf));
        let mut sb = SidebandReader::new(reader);

        let data = sb.read_all_data_with_leftover(Some(pkt)).unwrap();
        assert_eq!(data, b"chunk1chunk2");
    }
}

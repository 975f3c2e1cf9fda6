//! Side-band multiplexing: pack bytes, progress text, and fatal errors
//! share one response stream, distinguished by a leading channel byte.

use std::io::{Read, Write};

use crate::capability::SidebandMode;
use crate::pktline::{Packet, PktReader, PktWriter};
use crate::WireError;

/// Channel byte values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    /// Pack data.
    Pack = 1,
    /// Human-readable progress.
    Progress = 2,
    /// Fatal error; the stream ends after this.
    Fatal = 3,
}

/// Send `data` on `band`, split into frames the negotiated mode allows.
/// With side-band off, pack data goes through raw and the other bands
/// are dropped.
pub fn send<W: Write>(
    out: &mut PktWriter<W>,
    mode: SidebandMode,
    band: Band,
    data: &[u8],
) -> Result<(), WireError> {
    if mode == SidebandMode::None {
        if band == Band::Pack {
            out.inner_mut().write_all(data)?;
        }
        return Ok(());
    }

    for chunk in data.chunks(mode.chunk_len()) {
        let mut frame = Vec::with_capacity(1 + chunk.len());
        frame.push(band as u8);
        frame.extend_from_slice(chunk);
        out.write_data(&frame)?;
    }
    Ok(())
}

/// Demultiplexer for a side-band stream (the client's view; tests use
/// it to pick a response apart).
pub struct SidebandReader<R> {
    inner: PktReader<R>,
    pub progress: Vec<Vec<u8>>,
}

impl<R: Read> SidebandReader<R> {
    pub fn new(inner: PktReader<R>) -> Self {
        Self {
            inner,
            progress: Vec::new(),
        }
    }

    /// Next chunk of pack data; progress frames are collected on the
    /// side, a fatal frame becomes an error, flush ends the stream.
    pub fn read_pack_data(&mut self) -> Result<Option<Vec<u8>>, WireError> {
        loop {
            match self.inner.read_packet()? {
                Packet::Flush => return Ok(None),
                Packet::Delim | Packet::ResponseEnd => {
                    return Err(WireError::BadFraming("v2 packet in side-band".into()))
                }
                Packet::Data(data) => {
                    let Some((&band, payload)) = data.split_first() else {
                        return Ok(None);
                    };
                    match band {
                        1 => return Ok(Some(payload.to_vec())),
                        2 => self.progress.push(payload.to_vec()),
                        3 => {
                            return Err(WireError::Protocol(
                                String::from_utf8_lossy(payload).into_owned(),
                            ))
                        }
                        other => {
                            return Err(WireError::BadFraming(format!(
                                "unknown side-band channel {other}"
                            )))
                        }
                    }
                }
            }
        }
    }

    /// Concatenate all pack data until the stream closes.
    pub fn read_all_pack_data(&mut self) -> Result<Vec<u8>, WireError> {
        let mut out = Vec::new();
        while let Some(chunk) = self.read_pack_data()? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    pub fn into_inner(self) -> PktReader<R> {
        self.inner
    }
}

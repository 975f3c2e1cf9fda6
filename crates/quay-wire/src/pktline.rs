//! Pkt-line framing: four hex digits of length (counting themselves)
//! then that many payload bytes. Lengths 0-2 are reserved control
//! packets: flush, delimiter, response-end.

use std::io::{Read, Write};

use crate::WireError;

/// Largest payload one frame can carry (0xfff0 minus the length field).
pub const MAX_FRAME_DATA: usize = 65516;

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Data(Vec<u8>),
    /// `0000`: section terminator.
    Flush,
    /// `0001`: section delimiter.
    Delim,
    /// `0002`: response end.
    ResponseEnd,
}

impl Packet {
    /// Payload with a trailing newline stripped, for text lines.
    pub fn text(&self) -> Option<&[u8]> {
        match self {
            Packet::Data(data) => Some(match data.last() {
                Some(b'\n') => &data[..data.len() - 1],
                _ => data,
            }),
            _ => None,
        }
    }
}

/// Decode as many complete frames as `buf` holds. Returns the frames
/// and the unconsumed tail, which a caller accumulating reads keeps for
/// next time.
pub fn parse_pkt_lines(buf: &[u8]) -> Result<(Vec<Packet>, &[u8]), WireError> {
    let mut frames = Vec::new();
    let mut rest = buf;

    loop {
        if rest.len() < 4 {
            return Ok((frames, rest));
        }
        let declared = decode_len(&rest[..4])?;
        match declared {
            0 => frames.push(Packet::Flush),
            1 => frames.push(Packet::Delim),
            2 => frames.push(Packet::ResponseEnd),
            3 => return Err(WireError::BadFraming("length 3 is reserved".into())),
            _ => {
                let total = declared as usize;
                if total - 4 > MAX_FRAME_DATA {
                    return Err(WireError::OversizeFrame(total - 4));
                }
                if rest.len() < total {
                    return Ok((frames, rest));
                }
                frames.push(Packet::Data(rest[4..total].to_vec()));
                rest = &rest[total..];
                continue;
            }
        }
        rest = &rest[4..];
    }
}

fn decode_len(hex: &[u8]) -> Result<u16, WireError> {
    let text = std::str::from_utf8(hex)
        .map_err(|_| WireError::BadFraming(format!("non-ASCII length field {hex:?}")))?;
    u16::from_str_radix(text, 16)
        .map_err(|_| WireError::BadFraming(format!("invalid length field {text:?}")))
}

/// Frame reader over a byte channel.
pub struct PktReader<R> {
    inner: R,
}

impl<R: Read> PktReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Read exactly one frame.
    pub fn read_packet(&mut self) -> Result<Packet, WireError> {
        let mut len_field = [0u8; 4];
        self.inner
            .read_exact(&mut len_field)
            .map_err(|e| WireError::from_channel(e, "pkt-line length"))?;

        match decode_len(&len_field)? {
            0 => Ok(Packet::Flush),
            1 => Ok(Packet::Delim),
            2 => Ok(Packet::ResponseEnd),
            3 => Err(WireError::BadFraming("length 3 is reserved".into())),
            declared => {
                let data_len = declared as usize - 4;
                if data_len > MAX_FRAME_DATA {
                    return Err(WireError::OversizeFrame(data_len));
                }
                let mut data = vec![0u8; data_len];
                self.inner
                    .read_exact(&mut data)
                    .map_err(|e| WireError::from_channel(e, "pkt-line payload"))?;
                Ok(Packet::Data(data))
            }
        }
    }

    /// Read data frames until a flush, collecting payloads.
    pub fn read_until_flush(&mut self) -> Result<Vec<Vec<u8>>, WireError> {
        let mut lines = Vec::new();
        loop {
            match self.read_packet()? {
                Packet::Data(data) => lines.push(data),
                Packet::Flush => return Ok(lines),
                Packet::Delim | Packet::ResponseEnd => {
                    return Err(WireError::BadFraming(
                        "unexpected v2 control packet".into(),
                    ))
                }
            }
        }
    }
}

/// Frame writer over a byte channel.
pub struct PktWriter<W> {
    inner: W,
}

impl<W: Write> PktWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn inner_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Write one data frame.
    pub fn write_data(&mut self, data: &[u8]) -> Result<(), WireError> {
        if data.len() > MAX_FRAME_DATA {
            return Err(WireError::OversizeFrame(data.len()));
        }
        write!(self.inner, "{:04x}", data.len() + 4)?;
        self.inner.write_all(data)?;
        Ok(())
    }

    /// Write a text line, newline-terminating it if needed.
    pub fn write_text(&mut self, text: &str) -> Result<(), WireError> {
        if text.ends_with('\n') {
            self.write_data(text.as_bytes())
        } else {
            let mut line = Vec::with_capacity(text.len() + 1);
            line.extend_from_slice(text.as_bytes());
            line.push(b'\n');
            self.write_data(&line)
        }
    }

    /// `0000`
    pub fn write_flush(&mut self) -> Result<(), WireError> {
        self.inner.write_all(b"0000")?;
        Ok(())
    }

    /// `0001`
    pub fn write_delim(&mut self) -> Result<(), WireError> {
        self.inner.write_all(b"0001")?;
        Ok(())
    }

    /// `0002`
    pub fn write_response_end(&mut self) -> Result<(), WireError> {
        self.inner.write_all(b"0002")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), WireError> {
        self.inner.flush()?;
        Ok(())
    }
}

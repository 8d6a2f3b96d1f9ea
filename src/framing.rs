//! Reassembly of length-prefixed blob frames from an arbitrarily chunked
//! byte stream.
//!
//! Input arrives in chunks whose sizes the decoder does not control, so the
//! machine buffers bytes until the next whole unit (length word, blob
//! header, or blob payload) is available, consumes exactly that many, and
//! otherwise returns to the caller to await more input. No partial-message
//! decoding ever happens.

use prost::Message;
use tracing::{span, trace, Level};

use crate::error::{Error, Result};
use crate::proto;

/// Sanity cap on the BlobHeader message length word.
const MAX_BLOB_HEADER_SIZE: usize = 64 * 1024;
/// Sanity cap on a single blob payload.
const MAX_BLOB_SIZE: usize = 32 * 1024 * 1024;
/// Consumed bytes are dropped from the accumulator only once the read
/// cursor has moved at least this far, so small frames don't cause a
/// memmove per frame.
const COMPACT_THRESHOLD: usize = 64 * 1024;

/// One reassembled frame: the blob, still compressed, tagged with the
/// header type that announced it.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Frame {
    Header(proto::Blob),
    Data(proto::Blob),
}

/// The machine is defined by how many bytes it must buffer before it can
/// take the next step.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Awaiting the big-endian u32 length of the next BlobHeader.
    #[default]
    WantLen,
    /// Awaiting a BlobHeader of the given length.
    WantHeader(usize),
    /// Awaiting the payload of the OSMHeader blob.
    WantHeaderBlob(usize),
    /// Awaiting the payload of an OSMData blob.
    WantDataBlob(usize),
}

impl State {
    fn needed(&self) -> usize {
        match *self {
            State::WantLen => 4,
            State::WantHeader(n) | State::WantHeaderBlob(n) | State::WantDataBlob(n) => n,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Reassembler {
    buf: Vec<u8>,
    pos: usize,
    state: State,
    header_seen: bool,
}

impl Reassembler {
    pub(crate) fn new() -> Self {
        Reassembler::default()
    }

    /// Feed one chunk, returning every frame it completes, in order.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Result<Vec<Frame>> {
        let _span = span!(Level::TRACE, "reassemble").entered();

        if self.pos >= COMPACT_THRESHOLD && self.pos * 2 >= self.buf.len() {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        loop {
            let needed = self.state.needed();
            if self.buf.len() - self.pos < needed {
                return Ok(frames);
            }
            let bytes = &self.buf[self.pos..self.pos + needed];

            self.state = match std::mem::take(&mut self.state) {
                State::WantLen => {
                    let mut len_bytes = [0u8; 4];
                    len_bytes.copy_from_slice(bytes);
                    let len = u32::from_be_bytes(len_bytes) as usize;
                    trace!("blob header length: {}", len);
                    if len > MAX_BLOB_HEADER_SIZE {
                        return Err(Error::Format(format!(
                            "blob header length {} exceeds the {} byte cap",
                            len, MAX_BLOB_HEADER_SIZE
                        )));
                    }
                    State::WantHeader(len)
                }
                State::WantHeader(_) => {
                    let header = proto::BlobHeader::decode(bytes)?;
                    trace!("blob type: {}, datasize: {}", header.r#type, header.datasize);
                    let datasize = usize::try_from(header.datasize).map_err(|_| {
                        Error::Format(format!("negative blob datasize {}", header.datasize))
                    })?;
                    if datasize > MAX_BLOB_SIZE {
                        return Err(Error::Format(format!(
                            "blob of {} bytes exceeds the {} byte cap",
                            datasize, MAX_BLOB_SIZE
                        )));
                    }
                    match header.r#type.as_str() {
                        "OSMHeader" => {
                            if self.header_seen {
                                return Err(Error::InputSequence(
                                    "more than one OSMHeader blob".to_string(),
                                ));
                            }
                            State::WantHeaderBlob(datasize)
                        }
                        "OSMData" => {
                            if !self.header_seen {
                                return Err(Error::InputSequence(
                                    "OSMData blob before the OSMHeader blob".to_string(),
                                ));
                            }
                            State::WantDataBlob(datasize)
                        }
                        other => {
                            return Err(Error::Format(format!("unknown blob type {:?}", other)))
                        }
                    }
                }
                State::WantHeaderBlob(_) => {
                    self.header_seen = true;
                    frames.push(Frame::Header(proto::Blob::decode(bytes)?));
                    State::WantLen
                }
                State::WantDataBlob(_) => {
                    frames.push(Frame::Data(proto::Blob::decode(bytes)?));
                    State::WantLen
                }
            };
            self.pos += needed;
        }
    }

    /// Assert the stream ended on a frame boundary after at least the
    /// header frame.
    pub(crate) fn finish(&self) -> Result<()> {
        if !self.header_seen {
            return Err(Error::Format(
                "stream ended before a complete OSMHeader blob".to_string(),
            ));
        }
        let buffered = self.buf.len() - self.pos;
        if self.state != State::WantLen || buffered != 0 {
            return Err(Error::Format(format!(
                "truncated stream: {} byte(s) of an unfinished frame",
                buffered
            )));
        }
        Ok(())
    }
}

//! Push-based decoding surface mapping reassembled frames to batches.

use prost::Message;
use tracing::{span, trace, Level};

use crate::blob::{self, RawBlob};
use crate::elements::Entity;
use crate::error::Result;
use crate::framing::{Frame, Reassembler};
use crate::options::Options;
use crate::proto;
use crate::reconstruct;

/// One unit of decoder output. The header arrives first as a batch of one
/// entity; after that, batches correspond one-to-one to data blobs, in
/// source order.
#[derive(Debug, Clone, PartialEq)]
pub enum Batch {
    Entities(Vec<Entity>),
    /// Emitted instead of entities for data blobs when
    /// [`Options::write_raw`] is set. Pair with [`RawBlob::inflate`] and
    /// [`parse`] to reconstruct downstream.
    Raw(RawBlob),
}

/// Stateful streaming decoder. Feed byte chunks of any size with
/// [`push`](Decoder::push); each call returns every batch the new bytes
/// completed, then suspends until more input arrives. [`finish`](Decoder::finish)
/// asserts the stream ended on a frame boundary.
pub struct Decoder {
    framer: Reassembler,
    options: Options,
}

impl Decoder {
    pub fn new(options: Options) -> Self {
        Decoder {
            framer: Reassembler::new(),
            options,
        }
    }

    /// Feed one chunk. Batches come back in source order; an error is
    /// fatal and leaves the decoder unusable.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<Batch>> {
        let _span = span!(Level::TRACE, "decoder_push", len = chunk.len()).entered();
        let frames = self.framer.push(chunk)?;
        let mut batches = Vec::with_capacity(frames.len());
        for frame in frames {
            batches.push(self.decode_frame(frame)?);
        }
        Ok(batches)
    }

    /// Drain and assert the terminal state: a stream must end exactly at a
    /// frame boundary, after at least the header frame.
    pub fn finish(&self) -> Result<()> {
        self.framer.finish()
    }

    fn decode_frame(&self, frame: Frame) -> Result<Batch> {
        match frame {
            Frame::Header(raw) => {
                let bytes = blob::decompress(raw)?;
                let header = proto::HeaderBlock::decode(bytes.as_slice())?;
                trace!("decoded header block");
                Ok(Batch::Entities(vec![Entity::Header(
                    reconstruct::header_entity(header),
                )]))
            }
            Frame::Data(raw) if self.options.write_raw => {
                Ok(Batch::Raw(blob::into_raw_blob(raw)?))
            }
            Frame::Data(raw) => {
                let bytes = blob::decompress(raw)?;
                let block = proto::PrimitiveBlock::decode(bytes.as_slice())?;
                Ok(Batch::Entities(reconstruct::block_entities(
                    block,
                    &self.options,
                )?))
            }
        }
    }
}

/// Decode one inflated primitive block into its entity batch: the
/// reconstruction half of the raw-passthrough mode, usable on its own.
pub fn parse(block_bytes: &[u8], options: &Options) -> Result<Vec<Entity>> {
    let block = proto::PrimitiveBlock::decode(block_bytes)?;
    reconstruct::block_entities(block, options)
}

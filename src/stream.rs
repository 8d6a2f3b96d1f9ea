//! Flat one-by-one iteration over a byte source.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::decoder::{Batch, Decoder};
use crate::elements::Entity;
use crate::error::Result;
use crate::options::Options;
use crate::progress::ProgressRead;

const CHUNK_SIZE: usize = 64 * 1024;

/// A pull-based sequence of single entities, flattening the per-blob
/// batches in source order.
///
/// The per-entity handoff costs measurably more than consuming whole
/// batches; prefer [`Decoder::push`] for bulk counting and sinks, and this
/// iterator for ergonomic element-at-a-time processing.
pub struct EntityStream<R: Read> {
    reader: R,
    decoder: Decoder,
    pending: VecDeque<Entity>,
    chunk: Vec<u8>,
    done: bool,
}

impl<R: Read> EntityStream<R> {
    /// Wrap any byte source. Raw passthrough is a batch-surface mode, so
    /// the flat sequence always reconstructs entities.
    pub fn new(reader: R, options: Options) -> Self {
        EntityStream {
            reader,
            decoder: Decoder::new(options.write_raw(false)),
            pending: VecDeque::new(),
            chunk: vec![0u8; CHUNK_SIZE],
            done: false,
        }
    }

    fn step(&mut self) -> Result<()> {
        let n = self.reader.read(&mut self.chunk)?;
        if n == 0 {
            self.done = true;
            return self.decoder.finish();
        }
        for batch in self.decoder.push(&self.chunk[..n])? {
            match batch {
                Batch::Entities(entities) => self.pending.extend(entities),
                // Unreachable: write_raw is cleared in the constructor.
                Batch::Raw(_) => {}
            }
        }
        Ok(())
    }
}

impl EntityStream<BufReader<File>> {
    /// Stream a `.osm.pbf` file from disk.
    pub fn from_file(path: impl AsRef<Path>, options: Options) -> Result<Self> {
        let file = BufReader::new(File::open(path)?);
        Ok(EntityStream::new(file, options))
    }
}

impl<F> EntityStream<ProgressRead<BufReader<File>, F>>
where
    F: FnMut(u64),
{
    /// Stream a file, invoking `progress` with the cumulative byte count
    /// every `interval` bytes consumed (0 picks the default interval).
    pub fn from_file_with_progress(
        path: impl AsRef<Path>,
        options: Options,
        interval: u64,
        progress: F,
    ) -> Result<Self> {
        let file = BufReader::new(File::open(path)?);
        Ok(EntityStream::new(
            ProgressRead::with_interval(file, interval, progress),
            options,
        ))
    }
}

impl<R: Read> Iterator for EntityStream<R> {
    type Item = Result<Entity>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entity) = self.pending.pop_front() {
                return Some(Ok(entity));
            }
            if self.done {
                return None;
            }
            if let Err(err) = self.step() {
                self.done = true;
                return Some(Err(err));
            }
        }
    }
}

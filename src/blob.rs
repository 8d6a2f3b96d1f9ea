use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::error::{Error, Result};
use crate::proto;

/// Still-compressed payload of a data blob, emitted in raw-passthrough mode.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBlob {
    pub compression: Compression,
    pub data: Vec<u8>,
    /// Decompressed size, when the writer recorded it.
    pub raw_size: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Zlib,
}

impl RawBlob {
    /// Undo the compression step, yielding the serialized primitive block
    /// that [`crate::parse`] consumes.
    pub fn inflate(&self) -> Result<Vec<u8>> {
        match self.compression {
            Compression::None => Ok(self.data.clone()),
            Compression::Zlib => inflate_zlib(&self.data, self.raw_size),
        }
    }
}

/// Split a blob into its payload without decompressing. Fails on codecs
/// this crate does not carry.
pub(crate) fn into_raw_blob(blob: proto::Blob) -> Result<RawBlob> {
    let raw_size = blob.raw_size.and_then(|n| usize::try_from(n).ok());
    match blob.data {
        Some(proto::blob::Data::ZlibData(data)) => Ok(RawBlob {
            compression: Compression::Zlib,
            data,
            raw_size,
        }),
        Some(proto::blob::Data::Raw(data)) => Ok(RawBlob {
            compression: Compression::None,
            data,
            raw_size,
        }),
        Some(proto::blob::Data::LzmaData(_)) => Err(Error::UnsupportedCompression("lzma")),
        Some(proto::blob::Data::ObsoleteBzip2Data(_)) => {
            Err(Error::UnsupportedCompression("bzip2"))
        }
        Some(proto::blob::Data::Lz4Data(_)) => Err(Error::UnsupportedCompression("lz4")),
        Some(proto::blob::Data::ZstdData(_)) => Err(Error::UnsupportedCompression("zstd")),
        None => Err(Error::UnsupportedCompression("no payload present")),
    }
}

/// Extract and decompress a blob payload in one step.
pub(crate) fn decompress(blob: proto::Blob) -> Result<Vec<u8>> {
    let raw = into_raw_blob(blob)?;
    match raw.compression {
        Compression::None => Ok(raw.data),
        Compression::Zlib => inflate_zlib(&raw.data, raw.raw_size),
    }
}

fn inflate_zlib(data: &[u8], size_hint: Option<usize>) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut decoded = Vec::with_capacity(size_hint.unwrap_or(data.len()));
    decoder.read_to_end(&mut decoded)?;
    Ok(decoded)
}

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Every error is fatal: the decoder's input is a pure byte stream, so
/// there is nothing to retry. Errors surface synchronously from the
/// `push`/`finish` call (or iterator step) that hit them.
#[derive(Debug, Error)]
pub enum Error {
    /// Framing or length inconsistencies, unknown blob header types,
    /// truncation at end of stream.
    #[error("format error: {0}")]
    Format(String),

    /// A recognized blob type arriving out of sequence: data before the
    /// header, or a second header.
    #[error("input sequence error: {0}")]
    InputSequence(String),

    /// The blob carries neither `raw` nor `zlib_data`.
    #[error("unsupported compression: {0}")]
    UnsupportedCompression(&'static str),

    /// A primitive group with a non-empty changeset collection.
    #[error("changesets are not implemented")]
    ChangesetsNotImplemented,

    /// Arrays declared parallel by the format differ in length.
    #[error("parallel array mismatch in {0}")]
    ParallelArrayMismatch(&'static str),

    #[error("failed to decode protobuf message: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

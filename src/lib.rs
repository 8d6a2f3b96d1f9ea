//! A streaming decoder for the OpenStreetMap PBF file format (`*.osm.pbf`).
//!
//! The decoder consumes an arbitrary byte stream carrying a PBF payload and
//! produces the file header followed by nodes, ways and relations in source
//! order, without ever buffering the whole file. Inputs in the tens of
//! gigabytes are processed incrementally: bytes go in chunk by chunk, and a
//! batch of entities comes out per data blob.
//!
//! Two surfaces are offered. The batch surface is the fast path:
//!
//! ```no_run
//! use osmpbf_stream::{Batch, Decoder, Options};
//!
//! # fn main() -> osmpbf_stream::Result<()> {
//! let mut decoder = Decoder::new(Options::new());
//! let mut nodes = 0usize;
//! for chunk in std::fs::read("extract.osm.pbf")?.chunks(64 * 1024) {
//!     for batch in decoder.push(chunk)? {
//!         if let Batch::Entities(entities) = batch {
//!             nodes += entities
//!                 .iter()
//!                 .filter(|e| matches!(e, osmpbf_stream::Entity::Node(_)))
//!                 .count();
//!         }
//!     }
//! }
//! decoder.finish()?;
//! # Ok(())
//! # }
//! ```
//!
//! The flat surface trades some throughput for one-at-a-time iteration:
//!
//! ```no_run
//! use osmpbf_stream::{EntityStream, Options};
//!
//! # fn main() -> osmpbf_stream::Result<()> {
//! for entity in EntityStream::from_file("extract.osm.pbf", Options::new())? {
//!     println!("{:?}", entity?.id());
//! }
//! # Ok(())
//! # }
//! ```

pub use blob::{Compression, RawBlob};
pub use decoder::{parse, Batch, Decoder};
pub use elements::{
    BBox, Entity, Header, Info, Member, MemberType, Node, Relation, Tags, Way,
    DENSE_NODES, HAS_METADATA, HISTORICAL_INFORMATION, LOCATIONS_ON_WAYS, SORT_GEOGRAPHIC,
    SORT_TYPE_THEN_ID, SUPPORTED_FEATURES,
};
pub use error::{Error, Result};
pub use options::{Options, TagFilter, TagFilters};
pub use progress::{ProgressRead, DEFAULT_PROGRESS_INTERVAL};
pub use stream::EntityStream;

mod blob;
mod decoder;
mod elements;
mod error;
mod framing;
mod options;
mod progress;
mod proto;
mod reconstruct;
mod stream;

#[cfg(test)]
pub(crate) mod testutil;

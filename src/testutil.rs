//! Builders for synthetic PBF payloads, shared by the per-module tests.
//! Streams are produced by encoding the same message structs the decoder
//! consumes and framing them by hand.

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression;
use prost::Message;

use crate::proto;

/// String table with the reserved empty string at index 0.
pub(crate) fn string_table(strings: Vec<&str>) -> proto::StringTable {
    let mut s = vec![Vec::new()];
    s.extend(strings.into_iter().map(|x| x.as_bytes().to_vec()));
    proto::StringTable { s }
}

pub(crate) fn dense_block(
    id_deltas: Vec<i64>,
    lat_deltas: Vec<i64>,
    lon_deltas: Vec<i64>,
    strings: Vec<&str>,
) -> proto::PrimitiveBlock {
    proto::PrimitiveBlock {
        stringtable: string_table(strings),
        primitivegroup: vec![proto::PrimitiveGroup {
            dense: Some(proto::DenseNodes {
                id: id_deltas,
                lat: lat_deltas,
                lon: lon_deltas,
                ..Default::default()
            }),
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// One non-dense node: id 17 at (1.5, -1.5), amenity=cafe, version 2 by carol.
pub(crate) fn plain_node_block() -> proto::PrimitiveBlock {
    proto::PrimitiveBlock {
        stringtable: string_table(vec!["amenity", "cafe", "carol"]),
        primitivegroup: vec![proto::PrimitiveGroup {
            nodes: vec![proto::Node {
                id: 17,
                keys: vec![1],
                vals: vec![2],
                info: Some(proto::Info {
                    version: Some(2),
                    user_sid: Some(3),
                    ..Default::default()
                }),
                lat: 15_000_000,
                lon: -15_000_000,
            }],
            ..Default::default()
        }],
        ..Default::default()
    }
}

pub(crate) fn way_block(ref_deltas: Vec<i64>, strings: Vec<&str>) -> proto::PrimitiveBlock {
    proto::PrimitiveBlock {
        stringtable: string_table(strings),
        primitivegroup: vec![proto::PrimitiveGroup {
            ways: vec![proto::Way {
                id: 7,
                refs: ref_deltas,
                ..Default::default()
            }],
            ..Default::default()
        }],
        ..Default::default()
    }
}

pub(crate) fn relation_block(
    memid_deltas: Vec<i64>,
    types: Vec<i32>,
    roles_sid: Vec<i32>,
    strings: Vec<&str>,
) -> proto::PrimitiveBlock {
    proto::PrimitiveBlock {
        stringtable: string_table(strings),
        primitivegroup: vec![proto::PrimitiveGroup {
            relations: vec![proto::Relation {
                id: 4,
                memids: memid_deltas,
                types,
                roles_sid,
                ..Default::default()
            }],
            ..Default::default()
        }],
        ..Default::default()
    }
}

pub(crate) fn header_block() -> proto::HeaderBlock {
    proto::HeaderBlock {
        bbox: Some(proto::HeaderBBox {
            left: -1_000_000_000,
            right: 1_000_000_000,
            top: 500_000_000,
            bottom: -500_000_000,
        }),
        required_features: vec!["DenseNodes".to_string()],
        writingprogram: Some("osmpbf-stream tests".to_string()),
        ..Default::default()
    }
}

pub(crate) fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Wrap serialized block bytes in a Blob, zlib-compressed or raw.
pub(crate) fn blob(block_bytes: Vec<u8>, compressed: bool) -> proto::Blob {
    if compressed {
        proto::Blob {
            raw_size: Some(block_bytes.len() as i32),
            data: Some(proto::blob::Data::ZlibData(deflate(&block_bytes))),
        }
    } else {
        proto::Blob {
            raw_size: None,
            data: Some(proto::blob::Data::Raw(block_bytes)),
        }
    }
}

/// One length-prefixed frame: BE u32 header length, BlobHeader, blob bytes.
pub(crate) fn frame(blob_type: &str, blob_bytes: &[u8]) -> Vec<u8> {
    let header = proto::BlobHeader {
        r#type: blob_type.to_string(),
        indexdata: None,
        datasize: blob_bytes.len() as i32,
    };
    let header_bytes = header.encode_to_vec();
    let mut out = Vec::new();
    out.extend_from_slice(&(header_bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(blob_bytes);
    out
}

pub(crate) fn header_frame() -> Vec<u8> {
    let blob = blob(header_block().encode_to_vec(), false);
    frame("OSMHeader", &blob.encode_to_vec())
}

pub(crate) fn data_frame(block: &proto::PrimitiveBlock, compressed: bool) -> Vec<u8> {
    let blob = blob(block.encode_to_vec(), compressed);
    frame("OSMData", &blob.encode_to_vec())
}

/// A zlib-compressed data frame with three dense nodes: ids 100..=102, all
/// at (10.0, 20.0).
pub(crate) fn dense_frame_simple() -> Vec<u8> {
    let mut block = dense_block(
        vec![100, 1, 1],
        vec![100_000_000, 0, 0],
        vec![200_000_000, 0, 0],
        vec![],
    );
    block.granularity = Some(100);
    data_frame(&block, true)
}

pub(crate) fn file_bytes(frames: Vec<Vec<u8>>) -> Vec<u8> {
    frames.concat()
}

//! The decoded element model handed to consumers.

use std::collections::HashMap;

/// Well-known `required_features` values. A reader that honors this module
/// can process files requiring any subset of [`SUPPORTED_FEATURES`].
pub const DENSE_NODES: &str = "DenseNodes";
pub const HISTORICAL_INFORMATION: &str = "HistoricalInformation";

/// Well-known `optional_features` values.
pub const HAS_METADATA: &str = "Has_Metadata";
pub const SORT_TYPE_THEN_ID: &str = "Sort.Type_then_ID";
pub const SORT_GEOGRAPHIC: &str = "Sort.Geographic";
pub const LOCATIONS_ON_WAYS: &str = "LocationsOnWays";

pub const SUPPORTED_FEATURES: &[&str] = &[DENSE_NODES, HISTORICAL_INFORMATION];

pub type Tags = HashMap<String, String>;

#[derive(Debug, Clone, PartialEq)]
pub enum Entity {
    Header(Header),
    Node(Node),
    Way(Way),
    Relation(Relation),
}

/// Decoded file header; always the first emitted entity, as a batch of one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    pub bbox: Option<BBox>,
    pub required_features: Vec<String>,
    pub optional_features: Vec<String>,
    pub writingprogram: Option<String>,
    pub source: Option<String>,
    pub osmosis_replication_timestamp: Option<i64>,
    pub osmosis_replication_sequence_number: Option<i64>,
    pub osmosis_replication_base_url: Option<String>,
}

impl Header {
    /// Required features of this file that the given reader capabilities do
    /// not cover. Empty means the file is safe to process.
    pub fn unsupported_features<'a>(&'a self, supported: &[&str]) -> Vec<&'a str> {
        self.required_features
            .iter()
            .map(String::as_str)
            .filter(|f| !supported.contains(f))
            .collect()
    }
}

/// Bounding box in nanodegrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BBox {
    pub left: i64,
    pub right: i64,
    pub top: i64,
    pub bottom: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: i64,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Present only when non-empty after filtering.
    pub tags: Option<Tags>,
    pub info: Option<Info>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Way {
    pub id: i64,
    /// Node ids in path order.
    pub refs: Vec<i64>,
    pub tags: Option<Tags>,
    pub info: Option<Info>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    pub id: i64,
    pub members: Vec<Member>,
    pub tags: Option<Tags>,
    pub info: Option<Info>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub member_type: MemberType,
    pub member_ref: i64,
    pub role: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberType {
    Node,
    Way,
    Relation,
}

/// Element metadata. Zero-valued fields are left unset; `visible` is set
/// only when the element is explicitly marked deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Info {
    pub version: Option<i32>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: Option<i64>,
    pub changeset: Option<i64>,
    pub uid: Option<i32>,
    pub user: Option<String>,
    pub visible: Option<bool>,
}

impl Info {
    pub(crate) fn is_empty(&self) -> bool {
        self.version.is_none()
            && self.timestamp.is_none()
            && self.changeset.is_none()
            && self.uid.is_none()
            && self.user.is_none()
            && self.visible.is_none()
    }
}

impl Entity {
    pub fn id(&self) -> Option<i64> {
        match self {
            Entity::Header(_) => None,
            Entity::Node(n) => Some(n.id),
            Entity::Way(w) => Some(w.id),
            Entity::Relation(r) => Some(r.id),
        }
    }

    pub fn tags(&self) -> Option<&Tags> {
        match self {
            Entity::Header(_) => None,
            Entity::Node(n) => n.tags.as_ref(),
            Entity::Way(w) => w.tags.as_ref(),
            Entity::Relation(r) => r.tags.as_ref(),
        }
    }

    pub fn info(&self) -> Option<&Info> {
        match self {
            Entity::Header(_) => None,
            Entity::Node(n) => n.info.as_ref(),
            Entity::Way(w) => w.info.as_ref(),
            Entity::Relation(r) => r.info.as_ref(),
        }
    }
}

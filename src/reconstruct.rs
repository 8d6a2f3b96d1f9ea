//! Reconstruction of high-level entities from a decoded primitive block.
//!
//! A primitive block is self-contained: it carries its own string table and
//! coordinate scaling, and none of it is shared with neighboring blocks.
//! Reconstruction resolves string indices, reverses the delta chains, and
//! converts fixed-precision coordinates to degrees, emitting entities in
//! the source order (nodes, dense nodes, ways, relations per group).

use tracing::trace;

use crate::elements::{Entity, Header, Info, Member, MemberType, Node, Relation, Tags, Way};
use crate::error::{Error, Result};
use crate::options::{Options, TagFilter};
use crate::proto;

// --------------------------------------------------------------------------
// BlockContext
// --------------------------------------------------------------------------

/// Per-block decode state: the string table plus the coordinate and
/// timestamp scaling factors. Dropped with the block.
struct BlockContext {
    strings: Vec<String>,
    /// Raw coordinate units per degree.
    granularity_scale: f64,
    /// Offsets pre-converted to degrees.
    lat_offset: f64,
    lon_offset: f64,
    /// Timestamp multiplier yielding milliseconds.
    date_granularity: i64,
}

impl BlockContext {
    fn new(
        stringtable: proto::StringTable,
        granularity: Option<i32>,
        lat_offset: Option<i64>,
        lon_offset: Option<i64>,
        date_granularity: Option<i32>,
    ) -> Self {
        let strings = stringtable
            .s
            .iter()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .collect();
        // The unset and the literal-100 cases share the 1e7 constant; the
        // branch is load-bearing for writers that emit exactly 100.
        let granularity_scale = match granularity {
            None | Some(100) => 1e7,
            Some(g) => 1e9 / f64::from(g),
        };
        BlockContext {
            strings,
            granularity_scale,
            lat_offset: lat_offset.unwrap_or(0) as f64 * 1e-9,
            lon_offset: lon_offset.unwrap_or(0) as f64 * 1e-9,
            date_granularity: i64::from(date_granularity.unwrap_or(1000)),
        }
    }

    fn lat(&self, raw: i64) -> f64 {
        self.lat_offset + raw as f64 / self.granularity_scale
    }

    fn lon(&self, raw: i64) -> f64 {
        self.lon_offset + raw as f64 / self.granularity_scale
    }

    fn string(&self, index: i64) -> Result<&str> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.strings.get(i))
            .map(String::as_str)
            .ok_or_else(|| Error::Format(format!("string table index {} out of range", index)))
    }

    /// User names resolve through the string table; index 0 and the empty
    /// string both mean anonymous.
    fn user(&self, sid: i64) -> Result<Option<String>> {
        if sid == 0 {
            return Ok(None);
        }
        let name = self.string(sid)?;
        Ok((!name.is_empty()).then(|| name.to_string()))
    }
}

// --------------------------------------------------------------------------
// Block-level entry points
// --------------------------------------------------------------------------

pub(crate) fn header_entity(block: proto::HeaderBlock) -> Header {
    Header {
        bbox: block.bbox.map(|b| crate::elements::BBox {
            left: b.left,
            right: b.right,
            top: b.top,
            bottom: b.bottom,
        }),
        required_features: block.required_features,
        optional_features: block.optional_features,
        writingprogram: block.writingprogram,
        source: block.source,
        osmosis_replication_timestamp: block.osmosis_replication_timestamp,
        osmosis_replication_sequence_number: block.osmosis_replication_sequence_number,
        osmosis_replication_base_url: block.osmosis_replication_base_url,
    }
}

/// Turn one primitive block into its ordered entity batch.
pub(crate) fn block_entities(block: proto::PrimitiveBlock, opts: &Options) -> Result<Vec<Entity>> {
    let proto::PrimitiveBlock {
        stringtable,
        primitivegroup,
        granularity,
        lat_offset,
        lon_offset,
        date_granularity,
    } = block;
    let ctx = BlockContext::new(
        stringtable,
        granularity,
        lat_offset,
        lon_offset,
        date_granularity,
    );

    let mut out = Vec::new();
    for group in primitivegroup {
        if !group.changesets.is_empty() {
            return Err(Error::ChangesetsNotImplemented);
        }
        for node in group.nodes {
            out.push(node_entity(&ctx, node, opts)?);
        }
        if let Some(dense) = group.dense {
            dense_entities(&ctx, dense, opts, &mut out)?;
        }
        for way in group.ways {
            out.push(way_entity(&ctx, way, opts)?);
        }
        for relation in group.relations {
            out.push(relation_entity(&ctx, relation, opts)?);
        }
    }
    trace!("reconstructed {} entities from block", out.len());
    Ok(out)
}

// --------------------------------------------------------------------------
// Per-element reconstruction
// --------------------------------------------------------------------------

fn node_entity(ctx: &BlockContext, node: proto::Node, opts: &Options) -> Result<Entity> {
    Ok(Entity::Node(Node {
        id: node.id,
        lat: ctx.lat(node.lat),
        lon: ctx.lon(node.lon),
        tags: keyed_tags(ctx, &node.keys, &node.vals, &opts.tags.node, "node keys/vals")?,
        info: plain_info(ctx, node.info.as_ref(), opts.with_info)?,
    }))
}

fn way_entity(ctx: &BlockContext, way: proto::Way, opts: &Options) -> Result<Entity> {
    let tags = keyed_tags(ctx, &way.keys, &way.vals, &opts.tags.way, "way keys/vals")?;
    let info = plain_info(ctx, way.info.as_ref(), opts.with_info)?;
    let mut acc = 0i64;
    let refs = way
        .refs
        .iter()
        .map(|&delta| {
            acc += delta;
            acc
        })
        .collect();
    Ok(Entity::Way(Way {
        id: way.id,
        refs,
        tags,
        info,
    }))
}

fn relation_entity(
    ctx: &BlockContext,
    relation: proto::Relation,
    opts: &Options,
) -> Result<Entity> {
    if relation.memids.len() != relation.types.len()
        || relation.memids.len() != relation.roles_sid.len()
    {
        return Err(Error::ParallelArrayMismatch("relation member arrays"));
    }
    let tags = keyed_tags(
        ctx,
        &relation.keys,
        &relation.vals,
        &opts.tags.relation,
        "relation keys/vals",
    )?;
    let info = plain_info(ctx, relation.info.as_ref(), opts.with_info)?;

    let mut acc = 0i64;
    let mut members = Vec::with_capacity(relation.memids.len());
    for ((&delta, &code), &role_sid) in relation
        .memids
        .iter()
        .zip(&relation.types)
        .zip(&relation.roles_sid)
    {
        acc += delta;
        let member_type = match proto::relation::MemberType::try_from(code) {
            Ok(proto::relation::MemberType::Node) => MemberType::Node,
            Ok(proto::relation::MemberType::Way) => MemberType::Way,
            Ok(proto::relation::MemberType::Relation) => MemberType::Relation,
            Err(_) => {
                return Err(Error::Format(format!(
                    "unknown relation member type code {}",
                    code
                )))
            }
        };
        members.push(Member {
            member_type,
            member_ref: acc,
            role: ctx.string(i64::from(role_sid))?.to_string(),
        });
    }
    Ok(Entity::Relation(Relation {
        id: relation.id,
        members,
        tags,
        info,
    }))
}

fn dense_entities(
    ctx: &BlockContext,
    dense: proto::DenseNodes,
    opts: &Options,
    out: &mut Vec<Entity>,
) -> Result<()> {
    let count = dense.id.len();
    if dense.lat.len() != count || dense.lon.len() != count {
        return Err(Error::ParallelArrayMismatch("dense node coordinate arrays"));
    }
    let mut meta = match (opts.with_info, dense.denseinfo) {
        (true, Some(info)) => Some(DenseMeta::new(info, count)?),
        _ => None,
    };

    let (mut id, mut lat, mut lon) = (0i64, 0i64, 0i64);
    let mut cursor = 0usize;
    for i in 0..count {
        id += dense.id[i];
        lat += dense.lat[i];
        lon += dense.lon[i];

        let tags = dense_tags(ctx, &dense.keys_vals, &mut cursor, &opts.tags.node)?;
        let info = match meta.as_mut() {
            Some(meta) => meta.advance(ctx, i)?,
            None => None,
        };
        out.push(Entity::Node(Node {
            id,
            lat: ctx.lat(lat),
            lon: ctx.lon(lon),
            tags,
            info,
        }));
    }
    Ok(())
}

/// Consume one node's worth of (key, value) index pairs up to the 0
/// sentinel. The cursor always advances, even when the filter drops every
/// tag; an empty `keys_vals` means no node in the group has tags.
fn dense_tags(
    ctx: &BlockContext,
    keys_vals: &[i32],
    cursor: &mut usize,
    filter: &TagFilter,
) -> Result<Option<Tags>> {
    if keys_vals.is_empty() {
        return Ok(None);
    }
    let mut tags = Tags::new();
    loop {
        let key_index = match keys_vals.get(*cursor) {
            Some(&0) => {
                *cursor += 1;
                break;
            }
            Some(&k) => k,
            None => break,
        };
        let value_index = *keys_vals.get(*cursor + 1).ok_or_else(|| {
            Error::Format("dense tag key without a value".to_string())
        })?;
        *cursor += 2;

        let key = ctx.string(i64::from(key_index))?;
        if filter.keeps(key) {
            let value = ctx.string(i64::from(value_index))?.to_string();
            tags.insert(key.to_string(), value);
        }
    }
    Ok((!tags.is_empty()).then_some(tags))
}

fn keyed_tags(
    ctx: &BlockContext,
    keys: &[u32],
    vals: &[u32],
    filter: &TagFilter,
    what: &'static str,
) -> Result<Option<Tags>> {
    if keys.len() != vals.len() {
        return Err(Error::ParallelArrayMismatch(what));
    }
    if keys.is_empty() || *filter == TagFilter::None {
        return Ok(None);
    }
    let mut tags = Tags::new();
    for (&k, &v) in keys.iter().zip(vals) {
        let key = ctx.string(i64::from(k))?;
        if filter.keeps(key) {
            let value = ctx.string(i64::from(v))?.to_string();
            tags.insert(key.to_string(), value);
        }
    }
    Ok((!tags.is_empty()).then_some(tags))
}

// --------------------------------------------------------------------------
// Info
// --------------------------------------------------------------------------

fn plain_info(
    ctx: &BlockContext,
    info: Option<&proto::Info>,
    with_info: bool,
) -> Result<Option<Info>> {
    if !with_info {
        return Ok(None);
    }
    let Some(raw) = info else {
        return Ok(None);
    };
    let user = ctx.user(i64::from(raw.user_sid.unwrap_or(0)))?;
    Ok(compose_info(
        raw.version.unwrap_or(0),
        raw.timestamp.unwrap_or(0),
        raw.changeset.unwrap_or(0),
        raw.uid.unwrap_or(0),
        user,
        raw.visible,
        ctx.date_granularity,
    ))
}

/// Apply the omission rules once: zero-valued fields stay unset, `visible`
/// is kept only when explicitly false, and an all-unset metadata record is
/// dropped entirely.
fn compose_info(
    version: i32,
    raw_timestamp: i64,
    changeset: i64,
    uid: i32,
    user: Option<String>,
    visible: Option<bool>,
    date_granularity: i64,
) -> Option<Info> {
    let info = Info {
        version: (version != 0).then_some(version),
        timestamp: (raw_timestamp != 0).then_some(raw_timestamp * date_granularity),
        changeset: (changeset != 0).then_some(changeset),
        uid: (uid != 0).then_some(uid),
        user,
        visible: match visible {
            Some(false) => Some(false),
            _ => None,
        },
    };
    (!info.is_empty()).then_some(info)
}

/// Running accumulators over the delta-encoded metadata columns.
struct DenseMeta {
    info: proto::DenseInfo,
    timestamp: i64,
    changeset: i64,
    uid: i64,
    user_sid: i64,
}

impl DenseMeta {
    fn new(info: proto::DenseInfo, count: usize) -> Result<Self> {
        if info.version.len() != count
            || info.timestamp.len() != count
            || info.changeset.len() != count
            || info.uid.len() != count
            || info.user_sid.len() != count
        {
            return Err(Error::ParallelArrayMismatch("dense metadata arrays"));
        }
        // An absent visibility column means every node is visible.
        if !info.visible.is_empty() && info.visible.len() != count {
            return Err(Error::ParallelArrayMismatch("dense visibility array"));
        }
        Ok(DenseMeta {
            info,
            timestamp: 0,
            changeset: 0,
            uid: 0,
            user_sid: 0,
        })
    }

    fn advance(&mut self, ctx: &BlockContext, i: usize) -> Result<Option<Info>> {
        self.timestamp += self.info.timestamp[i];
        self.changeset += self.info.changeset[i];
        self.uid += i64::from(self.info.uid[i]);
        self.user_sid += i64::from(self.info.user_sid[i]);

        let user = ctx.user(self.user_sid)?;
        let visible = if self.info.visible.is_empty() {
            None
        } else {
            Some(self.info.visible[i])
        };
        Ok(compose_info(
            self.info.version[i],
            self.timestamp,
            self.changeset,
            self.uid as i32,
            user,
            visible,
            ctx.date_granularity,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::TagFilters;
    use crate::testutil;

    fn ids(entities: &[Entity]) -> Vec<i64> {
        entities.iter().filter_map(Entity::id).collect()
    }

    fn node(entity: &Entity) -> &Node {
        match entity {
            Entity::Node(n) => n,
            other => panic!("expected a node, got {:?}", other),
        }
    }

    #[test]
    fn dense_deltas_are_prefix_summed() {
        let block = testutil::dense_block(
            vec![10, 5, -3],
            vec![100, 1, -2],
            vec![200, 4, -8],
            vec![],
        );
        let entities = block_entities(block, &Options::new()).unwrap();
        assert_eq!(ids(&entities), vec![10, 15, 12]);
    }

    #[test]
    fn coordinates_scale_with_default_granularity() {
        let mut block = testutil::dense_block(vec![1], vec![330_000_000], vec![-330_000_000], vec![]);
        block.granularity = Some(100);
        let entities = block_entities(block, &Options::new()).unwrap();
        let n = node(&entities[0]);
        assert!((n.lat - 33.0).abs() < 1e-9);
        assert!((n.lon + 33.0).abs() < 1e-9);
    }

    #[test]
    fn coordinates_scale_with_coarse_granularity() {
        let mut block = testutil::dense_block(vec![1], vec![33_000_000], vec![33_000_000], vec![]);
        block.granularity = Some(1000);
        let entities = block_entities(block, &Options::new()).unwrap();
        let n = node(&entities[0]);
        assert!((n.lat - 33.0).abs() < 1e-9);
    }

    #[test]
    fn offsets_shift_coordinates() {
        let mut block = testutil::dense_block(vec![1], vec![0], vec![0], vec![]);
        block.lat_offset = Some(1_000_000_000);
        block.lon_offset = Some(-500_000_000);
        let entities = block_entities(block, &Options::new()).unwrap();
        let n = node(&entities[0]);
        assert!((n.lat - 1.0).abs() < 1e-9);
        assert!((n.lon + 0.5).abs() < 1e-9);
    }

    #[test]
    fn dense_tags_follow_the_sentinel_cursor() {
        // strings: ["", "highway", "primary", "name", "A1"]
        let mut block = testutil::dense_block(
            vec![1, 1, 1],
            vec![0, 0, 0],
            vec![0, 0, 0],
            vec!["highway", "primary", "name", "A1"],
        );
        // node 0: highway=primary, name=A1; node 1: none; node 2: highway=primary
        block.primitivegroup[0].dense.as_mut().unwrap().keys_vals =
            vec![1, 2, 3, 4, 0, 0, 1, 2, 0];
        let entities = block_entities(block, &Options::new()).unwrap();
        let tags0 = node(&entities[0]).tags.as_ref().unwrap();
        assert_eq!(tags0.get("highway").unwrap(), "primary");
        assert_eq!(tags0.get("name").unwrap(), "A1");
        assert!(node(&entities[1]).tags.is_none());
        let tags2 = node(&entities[2]).tags.as_ref().unwrap();
        assert_eq!(tags2.len(), 1);
        assert_eq!(tags2.get("highway").unwrap(), "primary");
    }

    #[test]
    fn tag_filter_still_advances_the_dense_cursor() {
        let mut block = testutil::dense_block(
            vec![1, 1],
            vec![0, 0],
            vec![0, 0],
            vec!["highway", "primary", "name", "A1"],
        );
        block.primitivegroup[0].dense.as_mut().unwrap().keys_vals = vec![1, 2, 3, 4, 0, 3, 4, 0];
        let opts = Options::new().tags(TagFilters {
            node: TagFilter::only(["name"]),
            ..TagFilters::default()
        });
        let entities = block_entities(block, &opts).unwrap();
        // Node 0 keeps only `name`; node 1's cursor must not have drifted.
        let tags0 = node(&entities[0]).tags.as_ref().unwrap();
        assert_eq!(tags0.len(), 1);
        assert_eq!(tags0.get("name").unwrap(), "A1");
        let tags1 = node(&entities[1]).tags.as_ref().unwrap();
        assert_eq!(tags1.get("name").unwrap(), "A1");
    }

    #[test]
    fn empty_keys_vals_means_no_tags_anywhere() {
        let block = testutil::dense_block(vec![1, 1], vec![0, 0], vec![0, 0], vec![]);
        let entities = block_entities(block, &Options::new()).unwrap();
        assert!(entities.iter().all(|e| e.tags().is_none()));
    }

    #[test]
    fn dense_metadata_accumulates_and_omits_zeroes() {
        let mut block = testutil::dense_block(
            vec![1, 1, 1],
            vec![0, 0, 0],
            vec![0, 0, 0],
            vec!["alice", "bob"],
        );
        let dense = block.primitivegroup[0].dense.as_mut().unwrap();
        dense.denseinfo = Some(proto::DenseInfo {
            version: vec![1, 0, 2],
            timestamp: vec![10, 5, -3],
            changeset: vec![7, 0, 1],
            uid: vec![42, 0, -42],
            user_sid: vec![1, 1, -2],
            visible: vec![true, true, false],
        });
        let opts = Options::new().with_info(true);
        let entities = block_entities(block, &opts).unwrap();

        let info0 = node(&entities[0]).info.as_ref().unwrap();
        assert_eq!(info0.version, Some(1));
        assert_eq!(info0.timestamp, Some(10_000));
        assert_eq!(info0.changeset, Some(7));
        assert_eq!(info0.uid, Some(42));
        assert_eq!(info0.user.as_deref(), Some("alice"));
        assert_eq!(info0.visible, None);

        let info1 = node(&entities[1]).info.as_ref().unwrap();
        assert_eq!(info1.version, None);
        assert_eq!(info1.timestamp, Some(15_000));
        assert_eq!(info1.user.as_deref(), Some("bob"));

        // Deltas walked user_sid back to 0: anonymous, uid cancelled out,
        // explicitly invisible.
        let info2 = node(&entities[2]).info.as_ref().unwrap();
        assert_eq!(info2.timestamp, Some(12_000));
        assert_eq!(info2.uid, None);
        assert_eq!(info2.user, None);
        assert_eq!(info2.visible, Some(false));
    }

    #[test]
    fn missing_visible_column_means_all_visible() {
        let mut block = testutil::dense_block(vec![1], vec![0], vec![0], vec![]);
        block.primitivegroup[0].dense.as_mut().unwrap().denseinfo = Some(proto::DenseInfo {
            version: vec![3],
            timestamp: vec![1],
            changeset: vec![1],
            uid: vec![1],
            user_sid: vec![0],
            visible: vec![],
        });
        let opts = Options::new().with_info(true);
        let entities = block_entities(block, &opts).unwrap();
        assert_eq!(node(&entities[0]).info.as_ref().unwrap().visible, None);
    }

    #[test]
    fn info_is_never_emitted_when_disabled() {
        let mut block = testutil::dense_block(vec![1], vec![0], vec![0], vec![]);
        block.primitivegroup[0].dense.as_mut().unwrap().denseinfo = Some(proto::DenseInfo {
            version: vec![3],
            timestamp: vec![1],
            changeset: vec![1],
            uid: vec![1],
            user_sid: vec![0],
            visible: vec![],
        });
        let entities = block_entities(block, &Options::new()).unwrap();
        assert!(node(&entities[0]).info.is_none());
    }

    #[test]
    fn date_granularity_scales_timestamps() {
        let mut block = testutil::dense_block(vec![1], vec![0], vec![0], vec![]);
        block.date_granularity = Some(500);
        block.primitivegroup[0].dense.as_mut().unwrap().denseinfo = Some(proto::DenseInfo {
            version: vec![1],
            timestamp: vec![9],
            changeset: vec![0],
            uid: vec![0],
            user_sid: vec![0],
            visible: vec![],
        });
        let opts = Options::new().with_info(true);
        let entities = block_entities(block, &opts).unwrap();
        assert_eq!(
            node(&entities[0]).info.as_ref().unwrap().timestamp,
            Some(4500)
        );
    }

    #[test]
    fn plain_nodes_decode_with_tags_and_info() {
        let block = testutil::plain_node_block();
        let opts = Options::new().with_info(true);
        let entities = block_entities(block, &opts).unwrap();
        let n = node(&entities[0]);
        assert_eq!(n.id, 17);
        assert!((n.lat - 1.5).abs() < 1e-9);
        assert_eq!(n.tags.as_ref().unwrap().get("amenity").unwrap(), "cafe");
        let info = n.info.as_ref().unwrap();
        assert_eq!(info.version, Some(2));
        assert_eq!(info.user.as_deref(), Some("carol"));
    }

    #[test]
    fn way_refs_are_prefix_summed() {
        let block = testutil::way_block(vec![5, 10, -2], vec![]);
        let entities = block_entities(block, &Options::new()).unwrap();
        match &entities[0] {
            Entity::Way(w) => assert_eq!(w.refs, vec![5, 15, 13]),
            other => panic!("expected a way, got {:?}", other),
        }
    }

    #[test]
    fn relation_members_resolve_types_and_roles() {
        let block = testutil::relation_block(
            vec![5, 10, -2],
            vec![0, 1, 2],
            vec![1, 2, 1],
            vec!["from", "to"],
        );
        let entities = block_entities(block, &Options::new()).unwrap();
        match &entities[0] {
            Entity::Relation(r) => {
                let expected = [
                    (MemberType::Node, 5, "from"),
                    (MemberType::Way, 15, "to"),
                    (MemberType::Relation, 13, "from"),
                ];
                assert_eq!(r.members.len(), expected.len());
                for (member, (kind, reference, role)) in r.members.iter().zip(expected) {
                    assert_eq!(member.member_type, kind);
                    assert_eq!(member.member_ref, reference);
                    assert_eq!(member.role, role);
                }
            }
            other => panic!("expected a relation, got {:?}", other),
        }
    }

    #[test]
    fn relation_member_arrays_must_align() {
        let block = testutil::relation_block(vec![5, 10], vec![0], vec![1, 2], vec!["from", "to"]);
        assert!(matches!(
            block_entities(block, &Options::new()),
            Err(Error::ParallelArrayMismatch(_))
        ));
    }

    #[test]
    fn dense_coordinate_arrays_must_align() {
        let mut block = testutil::dense_block(vec![1, 2], vec![0, 0], vec![0, 0], vec![]);
        block.primitivegroup[0].dense.as_mut().unwrap().lon.pop();
        assert!(matches!(
            block_entities(block, &Options::new()),
            Err(Error::ParallelArrayMismatch(_))
        ));
    }

    #[test]
    fn changeset_groups_are_rejected() {
        let mut block = testutil::dense_block(vec![1], vec![0], vec![0], vec![]);
        block.primitivegroup[0]
            .changesets
            .push(proto::ChangeSet { id: 9 });
        assert!(matches!(
            block_entities(block, &Options::new()),
            Err(Error::ChangesetsNotImplemented)
        ));
    }

    #[test]
    fn string_table_index_out_of_range_is_a_format_error() {
        let mut block = testutil::dense_block(vec![1], vec![0], vec![0], vec!["k"]);
        block.primitivegroup[0].dense.as_mut().unwrap().keys_vals = vec![1, 99, 0];
        assert!(matches!(
            block_entities(block, &Options::new()),
            Err(Error::Format(_))
        ));
    }
}

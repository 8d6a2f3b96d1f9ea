use std::collections::HashSet;

/// Tag inclusion policy for one entity kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TagFilter {
    /// Keep every tag.
    #[default]
    All,
    /// Keep no tags.
    None,
    /// Keep only tags whose key is in the set.
    Only(HashSet<String>),
}

impl TagFilter {
    /// Build a key-set filter from anything yielding string-ish keys.
    pub fn only<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TagFilter::Only(keys.into_iter().map(Into::into).collect())
    }

    pub fn keeps(&self, key: &str) -> bool {
        match self {
            TagFilter::All => true,
            TagFilter::None => false,
            TagFilter::Only(keys) => keys.contains(key),
        }
    }

    /// An empty key set keeps nothing and collapses to `None`.
    fn normalized(self) -> Self {
        match self {
            TagFilter::Only(keys) if keys.is_empty() => TagFilter::None,
            other => other,
        }
    }
}

impl From<bool> for TagFilter {
    fn from(keep: bool) -> Self {
        if keep {
            TagFilter::All
        } else {
            TagFilter::None
        }
    }
}

/// Per-entity-kind tag filters. A kind left at its default keeps all tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagFilters {
    pub node: TagFilter,
    pub way: TagFilter,
    pub relation: TagFilter,
}

impl TagFilters {
    /// The same filter for all three entity kinds.
    pub fn uniform(filter: TagFilter) -> Self {
        TagFilters {
            node: filter.clone(),
            way: filter.clone(),
            relation: filter,
        }
    }

    fn normalized(self) -> Self {
        TagFilters {
            node: self.node.normalized(),
            way: self.way.normalized(),
            relation: self.relation.normalized(),
        }
    }
}

impl From<bool> for TagFilters {
    fn from(keep: bool) -> Self {
        TagFilters::uniform(keep.into())
    }
}

/// Decoder configuration.
#[derive(Debug, Clone)]
pub struct Options {
    pub(crate) tags: TagFilters,
    pub(crate) with_info: bool,
    pub(crate) write_raw: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            tags: TagFilters::default(),
            with_info: false,
            write_raw: false,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Options::default()
    }

    /// Tag inclusion: `true`/`false` for everything, or per-kind filters.
    pub fn tags(mut self, tags: impl Into<TagFilters>) -> Self {
        self.tags = tags.into().normalized();
        self
    }

    /// Emit element metadata (version, timestamp, changeset, user, ...).
    pub fn with_info(mut self, with_info: bool) -> Self {
        self.with_info = with_info;
        self
    }

    /// Skip reconstruction of data blobs and emit their still-compressed
    /// payloads instead. The header blob is always decoded.
    pub fn write_raw(mut self, write_raw: bool) -> Self {
        self.write_raw = write_raw;
        self
    }
}

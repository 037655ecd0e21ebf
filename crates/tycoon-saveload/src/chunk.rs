//! Chunked stream containers, the chunk registry, and the save/load drivers.
//!
//! A savegame stream is a header followed by independent tagged chunks and
//! a terminating end tag. Each chunk declares its container kind on the
//! wire: an opaque blob, a dense or sparse index/record array, or a
//! self-describing table that embeds its own field list. Loading runs in
//! three stages over the whole stream: every chunk's records are read,
//! then every chunk validates its reference surrogates, then every chunk
//! runs its semantic post-load step.

use serde::Serialize;

use crate::compat::LegacyLayout;
use crate::feature::LoadedFeatures;
use crate::pool::Pool;
use crate::stream::{
    LoadError, MIN_SAVEGAME_VERSION, Reader, SAVE_MAGIC, SAVEGAME_VERSION, SaveError, Tag,
    TERMINATOR_INDEX, Writer,
};
use crate::table::{ClampEvent, LoadContext, RecordTable, SaveContext, Schema};

// ---------------------------------------------------------------------------
// Startup errors
// ---------------------------------------------------------------------------

/// Registry construction errors. These are programming mistakes in the
/// chunk and table definitions, caught once when the registry is frozen.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("table {table}: field {field} has overlapping descriptors")]
    OverlappingDescriptors {
        table: &'static str,
        field: &'static str,
    },
    #[error("table {table}: legacy layout names unknown field {field}")]
    UnknownLegacyField {
        table: &'static str,
        field: &'static str,
    },
    #[error("table {table}: legacy layout contains a zero-byte skip")]
    ZeroSkip { table: &'static str },
    #[error("table {table}: cross-reference op targets non-integer field {field}")]
    CrossRefNotInt {
        table: &'static str,
        field: &'static str,
    },
    #[error("chunk tag {0} registered twice")]
    DuplicateChunkTag(Tag),
    #[error("feature marker {0:?} declared with reserved minor version 0")]
    ReservedFeatureMinor(&'static str),
}

// ---------------------------------------------------------------------------
// Container kinds
// ---------------------------------------------------------------------------

/// On-wire container kind of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContainerKind {
    /// Opaque length-prefixed byte body.
    Blob,
    /// Dense index/record array: indices must run 0, 1, 2, ...
    Array,
    /// Sparse index/record array: strictly increasing indices, gaps legal.
    SparseArray,
    /// Sparse array preceded by an embedded field list.
    Table,
}

impl ContainerKind {
    pub fn to_u8(self) -> u8 {
        match self {
            ContainerKind::Blob => 0,
            ContainerKind::Array => 1,
            ContainerKind::SparseArray => 2,
            ContainerKind::Table => 3,
        }
    }

    pub fn from_u8(b: u8, chunk: Tag) -> Result<Self, LoadError> {
        Ok(match b {
            0 => ContainerKind::Blob,
            1 => ContainerKind::Array,
            2 => ContainerKind::SparseArray,
            3 => ContainerKind::Table,
            other => return Err(LoadError::UnknownContainerKind { chunk, kind: other }),
        })
    }
}

// ---------------------------------------------------------------------------
// The chunk trait
// ---------------------------------------------------------------------------

/// One registered chunk of world state.
///
/// `save` writes the container kind byte and body (the helpers below do
/// both); the driver has already written the tag. `load` receives the
/// already-read container kind and the reader positioned at the body.
pub trait Chunk<W> {
    fn tag(&self) -> Tag;

    fn save(&self, w: &mut Writer, world: &W, ctx: &SaveContext) -> Result<(), SaveError>;

    fn load(
        &self,
        r: &mut Reader<'_>,
        kind: ContainerKind,
        world: &mut W,
        ctx: &mut LoadContext,
    ) -> Result<(), LoadError>;

    /// Stage two: validate this chunk's reference surrogates against the
    /// now fully populated pools. Runs after every chunk has loaded.
    fn fix_references(&self, _world: &mut W, _ctx: &LoadContext) -> Result<(), LoadError> {
        Ok(())
    }

    /// Stage three: semantic fixups (derived state, data reconstructed
    /// for old versions). Runs after every chunk's references check out.
    fn post_load(&self, _world: &mut W, _ctx: &LoadContext) -> Result<(), LoadError> {
        Ok(())
    }

    /// Whether this chunk should be written at all for the given world.
    fn should_save(&self, _world: &W) -> bool {
        true
    }

    /// Startup self-check of this chunk's tables and legacy layouts.
    fn check_consistency(&self) -> Result<(), StartupError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Assembles a [`ChunkRegistry`], checking definition consistency when
/// the set is frozen.
pub struct ChunkRegistryBuilder<W> {
    chunks: Vec<Box<dyn Chunk<W>>>,
    features: Vec<(&'static str, u16)>,
}

impl<W> Default for ChunkRegistryBuilder<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> ChunkRegistryBuilder<W> {
    pub fn new() -> Self {
        Self {
            chunks: Vec::new(),
            features: Vec::new(),
        }
    }

    /// Register a chunk. Save order is registration order.
    pub fn register(mut self, chunk: impl Chunk<W> + 'static) -> Self {
        self.chunks.push(Box::new(chunk));
        self
    }

    /// Declare a feature marker this build writes into every save.
    pub fn feature(mut self, name: &'static str, minor: u16) -> Self {
        self.features.push((name, minor));
        self
    }

    /// Freeze the registry, validating every chunk definition.
    pub fn build(self) -> Result<ChunkRegistry<W>, StartupError> {
        for (i, chunk) in self.chunks.iter().enumerate() {
            for other in &self.chunks[i + 1..] {
                if chunk.tag() == other.tag() {
                    return Err(StartupError::DuplicateChunkTag(chunk.tag()));
                }
            }
            chunk.check_consistency()?;
        }
        for &(name, minor) in &self.features {
            if minor == 0 {
                return Err(StartupError::ReservedFeatureMinor(name));
            }
        }
        Ok(ChunkRegistry {
            chunks: self.chunks,
            features: self.features,
        })
    }
}

/// The frozen set of chunks making up the savegame format, plus the
/// feature markers this build declares in its stream headers.
pub struct ChunkRegistry<W> {
    chunks: Vec<Box<dyn Chunk<W>>>,
    features: Vec<(&'static str, u16)>,
}

/// Diagnostics of one completed load.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub version: u16,
    pub features: Vec<FeatureInfo>,
    pub clamps: Vec<ClampEvent>,
}

impl LoadReport {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FeatureInfo {
    pub name: String,
    pub minor: u16,
}

/// A successfully loaded world plus its load diagnostics.
#[derive(Debug)]
pub struct Loaded<W> {
    pub world: W,
    pub report: LoadReport,
}

/// Structural description of a stream, produced without keeping the
/// decoded world.
#[derive(Debug, Clone, Serialize)]
pub struct StreamInfo {
    pub version: u16,
    pub features: Vec<FeatureInfo>,
    pub chunks: Vec<ChunkInfo>,
}

impl StreamInfo {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkInfo {
    pub tag: String,
    pub kind: ContainerKind,
    pub entries: u32,
}

struct RunOutcome {
    version: u16,
    features: LoadedFeatures,
    clamps: Vec<ClampEvent>,
    chunks: Vec<ChunkInfo>,
}

impl<W> ChunkRegistry<W> {
    fn find(&self, tag: Tag) -> Option<&dyn Chunk<W>> {
        self.chunks
            .iter()
            .find(|c| c.tag() == tag)
            .map(|c| c.as_ref())
    }

    fn declared_features(&self) -> LoadedFeatures {
        let mut features = LoadedFeatures::new();
        for &(name, minor) in &self.features {
            features.declare(name, minor);
        }
        features
    }

    /// Serialize the whole world at the current format version.
    pub fn save_stream(&self, world: &W) -> Result<Vec<u8>, SaveError> {
        let ctx = SaveContext::new(SAVEGAME_VERSION, self.declared_features());
        let mut w = Writer::new();
        w.put_u32(SAVE_MAGIC);
        w.put_u16(ctx.version);
        ctx.features.write(&mut w)?;
        for chunk in &self.chunks {
            if !chunk.should_save(world) {
                continue;
            }
            w.put_tag(chunk.tag());
            chunk.save(&mut w, world, &ctx)?;
        }
        w.put_tag(Tag::END);
        Ok(w.into_bytes())
    }

    fn run_load(&self, bytes: &[u8], world: &mut W) -> Result<RunOutcome, LoadError> {
        let mut r = Reader::new(bytes);

        let magic = r.get_u32()?;
        if magic != SAVE_MAGIC {
            return Err(LoadError::InvalidMagic(magic));
        }
        let version = r.get_u16()?;
        if version > SAVEGAME_VERSION {
            return Err(LoadError::FutureVersion(version));
        }
        if version < MIN_SAVEGAME_VERSION {
            return Err(LoadError::AncientVersion(version));
        }
        let features = LoadedFeatures::read(&mut r)?;

        let mut ctx = LoadContext::new(version, features);
        let mut chunks = Vec::new();
        loop {
            let tag = r.get_tag()?;
            if tag == Tag::END {
                break;
            }
            let chunk = self.find(tag).ok_or(LoadError::UnknownChunk(tag))?;
            let kind = ContainerKind::from_u8(r.get_u8()?, tag)?;
            ctx.begin_chunk();
            chunk.load(&mut r, kind, world, &mut ctx)?;
            chunks.push(ChunkInfo {
                tag: tag.to_string(),
                kind,
                entries: ctx.entries_in_chunk(),
            });
        }

        for chunk in &self.chunks {
            chunk.fix_references(world, &ctx)?;
        }
        for chunk in &self.chunks {
            chunk.post_load(world, &ctx)?;
        }

        Ok(RunOutcome {
            version,
            features: ctx.features.clone(),
            clamps: ctx.take_clamps(),
            chunks,
        })
    }
}

impl<W: Default> ChunkRegistry<W> {
    /// Deserialize a full world from a stream. Any error discards the
    /// partially constructed world wholesale.
    pub fn load_stream(&self, bytes: &[u8]) -> Result<Loaded<W>, LoadError> {
        let mut world = W::default();
        let outcome = self.run_load(bytes, &mut world)?;
        Ok(Loaded {
            world,
            report: LoadReport {
                version: outcome.version,
                features: feature_infos(&outcome.features),
                clamps: outcome.clamps,
            },
        })
    }

    /// Validate a stream end to end and describe its structure, without
    /// returning the decoded world.
    pub fn check_stream(&self, bytes: &[u8]) -> Result<StreamInfo, LoadError> {
        let mut scratch = W::default();
        let outcome = self.run_load(bytes, &mut scratch)?;
        Ok(StreamInfo {
            version: outcome.version,
            features: feature_infos(&outcome.features),
            chunks: outcome.chunks,
        })
    }
}

fn feature_infos(features: &LoadedFeatures) -> Vec<FeatureInfo> {
    features
        .iter()
        .map(|(name, minor)| FeatureInfo {
            name: name.to_string(),
            minor,
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Body helpers: blobs
// ---------------------------------------------------------------------------

/// Write a blob chunk body (kind byte, u32 length, raw bytes).
pub fn save_blob(w: &mut Writer, body: &[u8]) {
    w.put_u8(ContainerKind::Blob.to_u8());
    w.put_u32(body.len() as u32);
    w.put_bytes(body);
}

/// Read a blob chunk body as a bounded sub-reader. When `expected` is
/// given, a differing stored length is corrupt input.
pub fn load_blob<'a>(
    r: &mut Reader<'a>,
    chunk: Tag,
    kind: ContainerKind,
    expected: Option<usize>,
) -> Result<Reader<'a>, LoadError> {
    if kind != ContainerKind::Blob {
        return Err(LoadError::UnexpectedContainerKind { chunk });
    }
    let len = r.get_u32()? as usize;
    if let Some(expected) = expected {
        if len != expected {
            return Err(LoadError::BlobLength {
                chunk,
                expected,
                got: len,
            });
        }
    }
    r.sub_reader(len)
}

// ---------------------------------------------------------------------------
// Body helpers: index/record arrays
// ---------------------------------------------------------------------------

/// Write an array-family chunk body over `(index, record)` entries. The
/// caller guarantees index ordering (pool iteration already yields index
/// order; dense arrays enumerate from zero).
pub fn save_records<'r, R: 'static>(
    w: &mut Writer,
    kind: ContainerKind,
    table: &RecordTable<R>,
    entries: impl IntoIterator<Item = (u32, &'r R)>,
    ctx: &SaveContext,
) -> Result<(), SaveError>
where
    R: 'r,
{
    w.put_u8(kind.to_u8());
    if kind == ContainerKind::Table {
        table.schema(ctx).write(w)?;
    }
    for (index, rec) in entries {
        let mut body = Writer::new();
        table.save_record(&mut body, rec, ctx)?;
        w.put_u32(index);
        w.put_u32(body.len() as u32);
        w.put_bytes(body.as_bytes());
    }
    w.put_u32(TERMINATOR_INDEX);
    Ok(())
}

enum IndexOrder {
    Dense { next: u32 },
    Sparse { prev: Option<u32> },
}

/// Iterator over the `(index, payload)` entries of an array-family chunk
/// body, enforcing the container's index ordering rule.
struct Entries<'r, 'a> {
    r: &'r mut Reader<'a>,
    chunk: Tag,
    order: IndexOrder,
}

impl<'r, 'a> Entries<'r, 'a> {
    fn new(r: &'r mut Reader<'a>, chunk: Tag, kind: ContainerKind) -> Self {
        let order = match kind {
            ContainerKind::Array => IndexOrder::Dense { next: 0 },
            _ => IndexOrder::Sparse { prev: None },
        };
        Self { r, chunk, order }
    }

    fn next_entry(&mut self) -> Result<Option<(u32, Reader<'a>)>, LoadError> {
        let index = self.r.get_u32()?;
        if index == TERMINATOR_INDEX {
            return Ok(None);
        }
        match &mut self.order {
            IndexOrder::Dense { next } => {
                if index != *next {
                    return Err(LoadError::DenseIndexOutOfOrder {
                        chunk: self.chunk,
                        expected: *next,
                        got: index,
                    });
                }
                *next += 1;
            }
            IndexOrder::Sparse { prev } => {
                if let Some(prev) = *prev {
                    if index <= prev {
                        return Err(LoadError::SparseIndexOutOfOrder {
                            chunk: self.chunk,
                            prev,
                            got: index,
                        });
                    }
                }
                *prev = Some(index);
            }
        }
        let len = self.r.get_u32()? as usize;
        let body = self.r.sub_reader(len)?;
        Ok(Some((index, body)))
    }
}

fn finish_record(sub: &Reader<'_>, chunk: Tag, index: u32) -> Result<(), LoadError> {
    if sub.is_empty() {
        Ok(())
    } else {
        Err(LoadError::TrailingBytes {
            chunk,
            index,
            leftover: sub.remaining(),
        })
    }
}

/// Load an array-family chunk body into a pool, placing each record at
/// its stored index. Self-describing tables reconcile their embedded
/// field list first; plain arrays go through the legacy layout covering
/// the stream version, or the positional descriptor walk if none does.
pub fn load_records_into_pool<R: 'static>(
    r: &mut Reader<'_>,
    chunk: Tag,
    kind: ContainerKind,
    table: &RecordTable<R>,
    layout: Option<&LegacyLayout>,
    pool: &mut Pool<R>,
    make: fn() -> R,
    ctx: &mut LoadContext,
) -> Result<(), LoadError> {
    pool.clear();
    match kind {
        ContainerKind::Blob => Err(LoadError::UnexpectedContainerKind { chunk }),
        ContainerKind::Table => {
            let schema = Schema::read(r)?;
            let plan = table.build_plan(&schema, ctx)?;
            let mut entries = Entries::new(r, chunk, kind);
            while let Some((index, mut sub)) = entries.next_entry()? {
                let mut rec = make();
                table.load_record_planned(&mut sub, &mut rec, &plan, ctx)?;
                finish_record(&sub, chunk, index)?;
                pool.insert_at(index, rec);
                ctx.note_entry();
            }
            Ok(())
        }
        ContainerKind::Array | ContainerKind::SparseArray => {
            let legacy = layout.filter(|l| l.covers(ctx.version));
            let mut entries = Entries::new(r, chunk, kind);
            while let Some((index, mut sub)) = entries.next_entry()? {
                let mut rec = make();
                match legacy {
                    Some(layout) => layout.load_record(&mut sub, &mut rec, table, ctx)?,
                    None => table.load_record_legacy(&mut sub, &mut rec, ctx)?,
                }
                finish_record(&sub, chunk, index)?;
                pool.insert_at(index, rec);
                ctx.note_entry();
            }
            Ok(())
        }
    }
}

/// Load a dense array or table chunk body into a plain vector.
pub fn load_records_into_vec<R: 'static>(
    r: &mut Reader<'_>,
    chunk: Tag,
    kind: ContainerKind,
    table: &RecordTable<R>,
    layout: Option<&LegacyLayout>,
    out: &mut Vec<R>,
    make: fn() -> R,
    ctx: &mut LoadContext,
) -> Result<(), LoadError> {
    out.clear();
    match kind {
        ContainerKind::Blob | ContainerKind::SparseArray => {
            Err(LoadError::UnexpectedContainerKind { chunk })
        }
        ContainerKind::Table => {
            let schema = Schema::read(r)?;
            let plan = table.build_plan(&schema, ctx)?;
            let mut entries = Entries::new(r, chunk, ContainerKind::Array);
            while let Some((index, mut sub)) = entries.next_entry()? {
                let mut rec = make();
                table.load_record_planned(&mut sub, &mut rec, &plan, ctx)?;
                finish_record(&sub, chunk, index)?;
                out.push(rec);
                ctx.note_entry();
            }
            Ok(())
        }
        ContainerKind::Array => {
            let legacy = layout.filter(|l| l.covers(ctx.version));
            let mut entries = Entries::new(r, chunk, kind);
            while let Some((index, mut sub)) = entries.next_entry()? {
                let mut rec = make();
                match legacy {
                    Some(layout) => layout.load_record(&mut sub, &mut rec, table, ctx)?,
                    None => table.load_record_legacy(&mut sub, &mut rec, ctx)?,
                }
                finish_record(&sub, chunk, index)?;
                out.push(rec);
                ctx.note_entry();
            }
            Ok(())
        }
    }
}

/// Load a single-record chunk body (stored as a one-entry array or table)
/// into an existing record.
pub fn load_single_record<R: 'static>(
    r: &mut Reader<'_>,
    chunk: Tag,
    kind: ContainerKind,
    table: &RecordTable<R>,
    layout: Option<&LegacyLayout>,
    rec: &mut R,
    ctx: &mut LoadContext,
) -> Result<(), LoadError> {
    match kind {
        ContainerKind::Blob => Err(LoadError::UnexpectedContainerKind { chunk }),
        ContainerKind::Table => {
            let schema = Schema::read(r)?;
            let plan = table.build_plan(&schema, ctx)?;
            let mut entries = Entries::new(r, chunk, kind);
            while let Some((index, mut sub)) = entries.next_entry()? {
                table.load_record_planned(&mut sub, rec, &plan, ctx)?;
                finish_record(&sub, chunk, index)?;
                ctx.note_entry();
            }
            Ok(())
        }
        ContainerKind::Array | ContainerKind::SparseArray => {
            let legacy = layout.filter(|l| l.covers(ctx.version));
            let mut entries = Entries::new(r, chunk, kind);
            while let Some((index, mut sub)) = entries.next_entry()? {
                match legacy {
                    Some(layout) => layout.load_record(&mut sub, rec, table, ctx)?,
                    None => table.load_record_legacy(&mut sub, rec, ctx)?,
                }
                finish_record(&sub, chunk, index)?;
                ctx.note_entry();
            }
            Ok(())
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Field, IntWidth, OPEN};
    use crate::pool::{NULL_REF, resolve_ref};

    // -----------------------------------------------------------------------
    // Helpers: a two-chunk world
    // -----------------------------------------------------------------------

    #[derive(Debug, Clone, PartialEq)]
    struct Counter {
        value: i64,
        link: u32,
    }

    impl Default for Counter {
        fn default() -> Self {
            Self {
                value: 0,
                link: NULL_REF,
            }
        }
    }

    #[derive(Debug, Default)]
    struct TestWorld {
        counters: Pool<Counter>,
        tick: u64,
    }

    impl Default for Pool<Counter> {
        fn default() -> Self {
            Pool::new("counters")
        }
    }

    const CNTR: Tag = Tag(*b"CNTR");
    const TICK: Tag = Tag(*b"TICK");

    fn counter_table() -> RecordTable<Counter> {
        RecordTable::new(
            "counter",
            vec![
                Field::int("value", (1, OPEN), IntWidth::I32, |c: &Counter| c.value, |c, v| {
                    c.value = v
                }),
                Field::reference("link", (1, OPEN), "counters", |c: &Counter| c.link, |c, v| {
                    c.link = v
                }),
            ],
        )
    }

    struct CounterChunk {
        table: RecordTable<Counter>,
    }

    impl CounterChunk {
        fn new() -> Self {
            Self {
                table: counter_table(),
            }
        }
    }

    impl Chunk<TestWorld> for CounterChunk {
        fn tag(&self) -> Tag {
            CNTR
        }

        fn save(&self, w: &mut Writer, world: &TestWorld, ctx: &SaveContext) -> Result<(), SaveError> {
            save_records(w, ContainerKind::Table, &self.table, world.counters.iter(), ctx)
        }

        fn load(
            &self,
            r: &mut Reader<'_>,
            kind: ContainerKind,
            world: &mut TestWorld,
            ctx: &mut LoadContext,
        ) -> Result<(), LoadError> {
            load_records_into_pool(
                r,
                CNTR,
                kind,
                &self.table,
                None,
                &mut world.counters,
                Counter::default,
                ctx,
            )
        }

        fn fix_references(&self, world: &mut TestWorld, _ctx: &LoadContext) -> Result<(), LoadError> {
            for (_, counter) in world.counters.iter() {
                resolve_ref(&world.counters, counter.link)?;
            }
            Ok(())
        }

        fn check_consistency(&self) -> Result<(), StartupError> {
            self.table.check_consistency()
        }
    }

    struct TickChunk;

    impl Chunk<TestWorld> for TickChunk {
        fn tag(&self) -> Tag {
            TICK
        }

        fn save(&self, w: &mut Writer, world: &TestWorld, _ctx: &SaveContext) -> Result<(), SaveError> {
            save_blob(w, &world.tick.to_be_bytes());
            Ok(())
        }

        fn load(
            &self,
            r: &mut Reader<'_>,
            kind: ContainerKind,
            world: &mut TestWorld,
            ctx: &mut LoadContext,
        ) -> Result<(), LoadError> {
            let mut body = load_blob(r, TICK, kind, Some(8))?;
            world.tick = body.get_u64()?;
            ctx.note_entry();
            Ok(())
        }
    }

    fn registry() -> ChunkRegistry<TestWorld> {
        ChunkRegistryBuilder::new()
            .register(TickChunk)
            .register(CounterChunk::new())
            .feature("testmark", 1)
            .build()
            .unwrap()
    }

    fn sample_world() -> TestWorld {
        let mut world = TestWorld {
            tick: 987_654,
            ..TestWorld::default()
        };
        world.counters.insert_at(0, Counter { value: -5, link: 2 });
        // Deliberate gap at index 1.
        world.counters.insert_at(2, Counter { value: 40, link: NULL_REF });
        world
    }

    // -----------------------------------------------------------------------
    // Test 1: Full stream round-trip, gaps preserved
    // -----------------------------------------------------------------------
    #[test]
    fn chunk_stream_round_trip() {
        let reg = registry();
        let world = sample_world();
        let bytes = reg.save_stream(&world).unwrap();

        let loaded = reg.load_stream(&bytes).unwrap();
        assert_eq!(loaded.world.tick, 987_654);
        assert_eq!(loaded.world.counters.len(), 2);
        assert_eq!(
            loaded.world.counters.get(0),
            Some(&Counter { value: -5, link: 2 })
        );
        assert!(!loaded.world.counters.contains(1));
        assert_eq!(loaded.report.version, SAVEGAME_VERSION);
        assert_eq!(loaded.report.features.len(), 1);
        assert_eq!(loaded.report.features[0].name, "testmark");
        assert!(loaded.report.clamps.is_empty());
    }

    // -----------------------------------------------------------------------
    // Test 2: Header validation
    // -----------------------------------------------------------------------
    #[test]
    fn chunk_header_validation() {
        let reg = registry();

        let mut w = Writer::new();
        w.put_u32(0x4241_4421);
        let bytes = w.into_bytes();
        assert!(matches!(
            reg.load_stream(&bytes),
            Err(LoadError::InvalidMagic(0x4241_4421))
        ));

        let mut w = Writer::new();
        w.put_u32(SAVE_MAGIC);
        w.put_u16(SAVEGAME_VERSION + 1);
        let bytes = w.into_bytes();
        assert!(matches!(
            reg.load_stream(&bytes),
            Err(LoadError::FutureVersion(_))
        ));

        let mut w = Writer::new();
        w.put_u32(SAVE_MAGIC);
        w.put_u16(0);
        let bytes = w.into_bytes();
        assert!(matches!(
            reg.load_stream(&bytes),
            Err(LoadError::AncientVersion(0))
        ));
    }

    // -----------------------------------------------------------------------
    // Test 3: Unknown chunk tag aborts the load
    // -----------------------------------------------------------------------
    #[test]
    fn chunk_unknown_tag_rejected() {
        let reg = registry();
        let mut w = Writer::new();
        w.put_u32(SAVE_MAGIC);
        w.put_u16(SAVEGAME_VERSION);
        w.put_u8(0); // no features
        w.put_tag(Tag(*b"WHAT"));
        let bytes = w.into_bytes();
        assert!(matches!(
            reg.load_stream(&bytes),
            Err(LoadError::UnknownChunk(tag)) if tag == Tag(*b"WHAT")
        ));
    }

    // -----------------------------------------------------------------------
    // Test 4: Sparse index ordering is enforced
    // -----------------------------------------------------------------------
    #[test]
    fn chunk_sparse_ordering_enforced() {
        let reg = registry();
        let table = counter_table();
        let ctx = SaveContext::new(SAVEGAME_VERSION, LoadedFeatures::new());

        let a = Counter { value: 1, link: NULL_REF };
        let b = Counter { value: 2, link: NULL_REF };

        let mut w = Writer::new();
        w.put_u32(SAVE_MAGIC);
        w.put_u16(SAVEGAME_VERSION);
        w.put_u8(0);
        w.put_tag(CNTR);
        // Indices 5 then 3: not increasing.
        save_records(&mut w, ContainerKind::Table, &table, [(5, &a), (3, &b)], &ctx).unwrap();
        w.put_tag(Tag::END);
        let bytes = w.into_bytes();

        assert!(matches!(
            reg.load_stream(&bytes),
            Err(LoadError::SparseIndexOutOfOrder { prev: 5, got: 3, .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Test 5: Trailing bytes inside a record payload are corrupt
    // -----------------------------------------------------------------------
    #[test]
    fn chunk_trailing_record_bytes_rejected() {
        let reg = registry();
        let table = counter_table();
        let ctx = SaveContext::new(SAVEGAME_VERSION, LoadedFeatures::new());

        let mut body = Writer::new();
        table
            .save_record(&mut body, &Counter { value: 9, link: NULL_REF }, &ctx)
            .unwrap();

        let mut w = Writer::new();
        w.put_u32(SAVE_MAGIC);
        w.put_u16(SAVEGAME_VERSION);
        w.put_u8(0);
        w.put_tag(CNTR);
        w.put_u8(ContainerKind::Table.to_u8());
        table.schema(&ctx).write(&mut w).unwrap();
        w.put_u32(0);
        w.put_u32(body.len() as u32 + 1); // one stray byte
        w.put_bytes(body.as_bytes());
        w.put_u8(0xEE);
        w.put_u32(TERMINATOR_INDEX);
        w.put_tag(Tag::END);
        let bytes = w.into_bytes();

        assert!(matches!(
            reg.load_stream(&bytes),
            Err(LoadError::TrailingBytes { index: 0, leftover: 1, .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Test 6: Dangling reference fails in the fix-up stage
    // -----------------------------------------------------------------------
    #[test]
    fn chunk_dangling_reference_rejected() {
        let reg = registry();
        let mut world = TestWorld::default();
        world
            .counters
            .insert_at(0, Counter { value: 1, link: 77 });
        let bytes = reg.save_stream(&world).unwrap();

        match reg.load_stream(&bytes) {
            Err(LoadError::InvalidReference { pool: "counters", index: 77 }) => {}
            other => panic!("expected InvalidReference, got {:?}", other.err()),
        }
    }

    // -----------------------------------------------------------------------
    // Test 7: check_stream describes the stream without the world
    // -----------------------------------------------------------------------
    #[test]
    fn chunk_check_stream_reports_structure() {
        let reg = registry();
        let bytes = reg.save_stream(&sample_world()).unwrap();

        let info = reg.check_stream(&bytes).unwrap();
        assert_eq!(info.version, SAVEGAME_VERSION);
        assert_eq!(info.chunks.len(), 2);
        assert_eq!(info.chunks[0].tag, "TICK");
        assert_eq!(info.chunks[0].kind, ContainerKind::Blob);
        assert_eq!(info.chunks[0].entries, 1);
        assert_eq!(info.chunks[1].tag, "CNTR");
        assert_eq!(info.chunks[1].kind, ContainerKind::Table);
        assert_eq!(info.chunks[1].entries, 2);

        // And the report serializes.
        assert!(info.to_json().unwrap().contains("\"CNTR\""));
    }

    // -----------------------------------------------------------------------
    // Test 8: Duplicate tags and reserved feature minors fail at build
    // -----------------------------------------------------------------------
    #[test]
    fn chunk_registry_build_validation() {
        let dup = ChunkRegistryBuilder::new()
            .register(TickChunk)
            .register(TickChunk)
            .build();
        assert!(matches!(dup, Err(StartupError::DuplicateChunkTag(tag)) if tag == TICK));

        let reserved = ChunkRegistryBuilder::<TestWorld>::new()
            .register(TickChunk)
            .feature("fork", 0)
            .build();
        assert!(matches!(
            reserved,
            Err(StartupError::ReservedFeatureMinor("fork"))
        ));
    }

    // -----------------------------------------------------------------------
    // Test 9: should_save elides a chunk and loading tolerates its absence
    // -----------------------------------------------------------------------
    #[test]
    fn chunk_should_save_elision() {
        struct OptionalTick;
        impl Chunk<TestWorld> for OptionalTick {
            fn tag(&self) -> Tag {
                TICK
            }
            fn save(&self, w: &mut Writer, world: &TestWorld, _ctx: &SaveContext) -> Result<(), SaveError> {
                save_blob(w, &world.tick.to_be_bytes());
                Ok(())
            }
            fn load(
                &self,
                r: &mut Reader<'_>,
                kind: ContainerKind,
                world: &mut TestWorld,
                _ctx: &mut LoadContext,
            ) -> Result<(), LoadError> {
                let mut body = load_blob(r, TICK, kind, Some(8))?;
                world.tick = body.get_u64()?;
                Ok(())
            }
            fn should_save(&self, world: &TestWorld) -> bool {
                world.tick != 0
            }
        }

        let reg = ChunkRegistryBuilder::new()
            .register(OptionalTick)
            .register(CounterChunk::new())
            .build()
            .unwrap();

        let world = TestWorld::default(); // tick 0, chunk elided
        let bytes = reg.save_stream(&world).unwrap();
        let info = reg.check_stream(&bytes).unwrap();
        assert_eq!(info.chunks.len(), 1);
        assert_eq!(info.chunks[0].tag, "CNTR");

        // Absent chunk leaves the default value untouched.
        let loaded = reg.load_stream(&bytes).unwrap();
        assert_eq!(loaded.world.tick, 0);
    }

    // -----------------------------------------------------------------------
    // Test 10: Unknown container kind byte is corrupt
    // -----------------------------------------------------------------------
    #[test]
    fn chunk_unknown_container_kind() {
        let reg = registry();
        let mut w = Writer::new();
        w.put_u32(SAVE_MAGIC);
        w.put_u16(SAVEGAME_VERSION);
        w.put_u8(0);
        w.put_tag(CNTR);
        w.put_u8(9);
        let bytes = w.into_bytes();
        assert!(matches!(
            reg.load_stream(&bytes),
            Err(LoadError::UnknownContainerKind { kind: 9, .. })
        ));
    }

    // -----------------------------------------------------------------------
    // Test 11: Blob length mismatch is corrupt
    // -----------------------------------------------------------------------
    #[test]
    fn chunk_blob_length_mismatch() {
        let reg = registry();
        let mut w = Writer::new();
        w.put_u32(SAVE_MAGIC);
        w.put_u16(SAVEGAME_VERSION);
        w.put_u8(0);
        w.put_tag(TICK);
        w.put_u8(ContainerKind::Blob.to_u8());
        w.put_u32(4); // tick blobs are 8 bytes
        w.put_u32(0);
        let bytes = w.into_bytes();
        assert!(matches!(
            reg.load_stream(&bytes),
            Err(LoadError::BlobLength { expected: 8, got: 4, .. })
        ));
    }
}

//! The gamelog: an append-only record of notable events in a game's life,
//! kept across every save and load so that bug reports carry provenance.

use serde::Serialize;

use tycoon_saveload::chunk::{
    Chunk, ContainerKind, StartupError, load_records_into_vec, save_records,
};
use tycoon_saveload::field::{Field, IntRange, IntWidth, OPEN};
use tycoon_saveload::stream::{LoadError, Reader, SaveError, Tag, Writer};
use tycoon_saveload::table::{LoadContext, RecordTable, SaveContext};

use crate::world::World;

pub const GLOG: Tag = Tag(*b"GLOG");

// Entry kinds.
pub const LOG_GAME_START: u8 = 0;
pub const LOG_SAVED: u8 = 1;
pub const LOG_LOADED: u8 = 2;
pub const LOG_SETTING_CHANGED: u8 = 3;
pub const LOG_RECOVERED: u8 = 4;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GamelogEntry {
    pub kind: u8,
    pub tick: u64,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Gamelog {
    entries: Vec<GamelogEntry>,
}

impl Gamelog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, kind: u8, tick: u64, message: impl Into<String>) {
        self.entries.push(GamelogEntry {
            kind,
            tick,
            message: message.into(),
        });
    }

    pub fn entries(&self) -> &[GamelogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Human-readable dump, one line per entry, for bug reports.
    pub fn dump(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        for entry in &self.entries {
            let kind = match entry.kind {
                LOG_GAME_START => "start",
                LOG_SAVED => "saved",
                LOG_LOADED => "loaded",
                LOG_SETTING_CHANGED => "setting",
                LOG_RECOVERED => "recovered",
                _ => "unknown",
            };
            let _ = writeln!(out, "[{:>10}] {:<9} {}", entry.tick, kind, entry.message);
        }
        out
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&self.entries)
    }

    pub(crate) fn entries_mut(&mut self) -> &mut Vec<GamelogEntry> {
        &mut self.entries
    }
}

// ---------------------------------------------------------------------------
// Descriptor table
// ---------------------------------------------------------------------------

pub fn gamelog_table() -> RecordTable<GamelogEntry> {
    RecordTable::new(
        "gamelog_entry",
        vec![
            Field::int_clamped(
                "kind",
                (1, OPEN),
                IntWidth::U8,
                IntRange::new(LOG_GAME_START as i64, LOG_RECOVERED as i64, LOG_GAME_START as i64),
                |e: &GamelogEntry| e.kind as i64,
                |e, v| e.kind = v as u8,
            ),
            Field::int("tick", (1, OPEN), IntWidth::U64, |e: &GamelogEntry| e.tick as i64, |e, v| {
                e.tick = v as u64
            }),
            Field::str("message", (1, OPEN), |e: &GamelogEntry| e.message.clone(), |e, v| {
                e.message = v
            }),
        ],
    )
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

pub struct GamelogChunk {
    table: RecordTable<GamelogEntry>,
}

impl GamelogChunk {
    pub fn new() -> Self {
        Self {
            table: gamelog_table(),
        }
    }
}

impl Default for GamelogChunk {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunk<World> for GamelogChunk {
    fn tag(&self) -> Tag {
        GLOG
    }

    fn save(&self, w: &mut Writer, world: &World, ctx: &SaveContext) -> Result<(), SaveError> {
        let entries = world
            .gamelog
            .entries()
            .iter()
            .enumerate()
            .map(|(i, e)| (i as u32, e));
        save_records(w, ContainerKind::Array, &self.table, entries, ctx)
    }

    fn load(
        &self,
        r: &mut Reader<'_>,
        kind: ContainerKind,
        world: &mut World,
        ctx: &mut LoadContext,
    ) -> Result<(), LoadError> {
        load_records_into_vec(
            r,
            GLOG,
            kind,
            &self.table,
            None,
            world.gamelog.entries_mut(),
            GamelogEntry::default,
            ctx,
        )
    }

    fn should_save(&self, world: &World) -> bool {
        !world.gamelog.is_empty()
    }

    fn check_consistency(&self) -> Result<(), StartupError> {
        self.table.check_consistency()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

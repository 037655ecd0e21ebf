//! Game settings: a single-record chunk with the format's hairiest
//! backward-compatibility story.
//!
//! Streams older than version 11 interleave a long-removed town growth
//! field between difficulty and the payment mode, and number the payment
//! modes differently: manual came first, balanced second. Version 11
//! renumbered them so balanced is the zero default. A legacy layout
//! covers the whole pre-11 range with an explicit skip and a remap.

use tycoon_saveload::chunk::{
    Chunk, ContainerKind, StartupError, load_single_record, save_records,
};
use tycoon_saveload::compat::{LegacyLayout, LegacyOp};
use tycoon_saveload::field::{Field, IntRange, IntWidth, OPEN};
use tycoon_saveload::stream::{LoadError, Reader, SaveError, Tag, Writer};
use tycoon_saveload::table::{LoadContext, RecordTable, SaveContext};

use crate::world::World;

pub const SETT: Tag = Tag(*b"SETT");

/// First version using the renumbered payment modes and the compact
/// record layout.
const PAYMENT_RENUMBER_VERSION: u16 = 11;

// Payment modes, current numbering.
pub const PAYMENT_BALANCED: i64 = 0;
pub const PAYMENT_MANUAL: i64 = 1;
pub const PAYMENT_AGGRESSIVE: i64 = 2;

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub difficulty: u8,
    pub pause_mode: u8,
    pub payment_mode: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            difficulty: 2,
            pause_mode: 0,
            payment_mode: PAYMENT_BALANCED as u8,
        }
    }
}

// ---------------------------------------------------------------------------
// Descriptor table and legacy layout
// ---------------------------------------------------------------------------

pub fn settings_table() -> RecordTable<Settings> {
    RecordTable::new(
        "settings",
        vec![
            Field::int_clamped(
                "difficulty",
                (1, OPEN),
                IntWidth::U8,
                IntRange::new(0, 5, 2),
                |s: &Settings| s.difficulty as i64,
                |s, v| s.difficulty = v as u8,
            ),
            Field::int_clamped(
                "payment_mode",
                (1, OPEN),
                IntWidth::U8,
                IntRange::new(PAYMENT_BALANCED, PAYMENT_AGGRESSIVE, PAYMENT_BALANCED),
                |s: &Settings| s.payment_mode as i64,
                |s, v| s.payment_mode = v as u8,
            ),
            Field::int_clamped(
                "pause_mode",
                (1, OPEN),
                IntWidth::U8,
                IntRange::new(0, 2, 0),
                |s: &Settings| s.pause_mode as i64,
                |s, v| s.pause_mode = v as u8,
            ),
        ],
    )
}

/// Pre-renumbering payment modes: 0 was manual, 1 was balanced.
fn remap_payment_mode(old: i64) -> i64 {
    match old {
        0 => PAYMENT_MANUAL,
        1 => PAYMENT_BALANCED,
        other => other,
    }
}

pub fn settings_legacy_layout() -> LegacyLayout {
    LegacyLayout::new(
        1,
        PAYMENT_RENUMBER_VERSION,
        vec![
            LegacyOp::Field { name: "difficulty" },
            // Town growth rate, removed without replacement.
            LegacyOp::Skip { bytes: 2 },
            LegacyOp::CrossRef {
                name: "payment_mode",
                transform: remap_payment_mode,
            },
            LegacyOp::Field { name: "pause_mode" },
        ],
    )
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

pub struct SettingsChunk {
    table: RecordTable<Settings>,
    layout: LegacyLayout,
}

impl SettingsChunk {
    pub fn new() -> Self {
        Self {
            table: settings_table(),
            layout: settings_legacy_layout(),
        }
    }
}

impl Default for SettingsChunk {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunk<World> for SettingsChunk {
    fn tag(&self) -> Tag {
        SETT
    }

    fn save(&self, w: &mut Writer, world: &World, ctx: &SaveContext) -> Result<(), SaveError> {
        save_records(
            w,
            ContainerKind::Table,
            &self.table,
            [(0, &world.settings)],
            ctx,
        )
    }

    fn load(
        &self,
        r: &mut Reader<'_>,
        kind: ContainerKind,
        world: &mut World,
        ctx: &mut LoadContext,
    ) -> Result<(), LoadError> {
        load_single_record(
            r,
            SETT,
            kind,
            &self.table,
            Some(&self.layout),
            &mut world.settings,
            ctx,
        )
    }

    fn check_consistency(&self) -> Result<(), StartupError> {
        self.table.check_consistency()?;
        self.layout.validate(&self.table)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

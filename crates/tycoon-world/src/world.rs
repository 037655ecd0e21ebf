//! The whole game world, its calendar chunk, and the frozen chunk
//! registry defining the savegame format.

use tycoon_saveload::chunk::{
    Chunk, ChunkRegistry, ChunkRegistryBuilder, ContainerKind, StartupError, load_blob, save_blob,
};
use tycoon_saveload::pool::Pool;
use tycoon_saveload::stream::{LoadError, Reader, SaveError, Tag, Writer};
use tycoon_saveload::table::{LoadContext, SaveContext};

use crate::company::{Company, CompanyChunk};
use crate::gamelog::{Gamelog, GamelogChunk};
use crate::order::{OrderChunk, OrderList};
use crate::settings::{Settings, SettingsChunk};
use crate::vehicle::{Vehicle, VehicleChunk};

pub const DATE: Tag = Tag(*b"DATE");

/// Minor version of the dispatch feature this build writes into every
/// stream header.
pub const DISPATCH_FEATURE_MINOR: u16 = 2;

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct World {
    pub vehicles: Pool<Vehicle>,
    pub order_lists: Pool<OrderList>,
    pub companies: Pool<Company>,
    pub settings: Settings,
    pub gamelog: Gamelog,
    pub tick: u64,
    pub calendar_day: u32,
}

impl Default for World {
    fn default() -> Self {
        Self {
            vehicles: Pool::new("vehicles"),
            order_lists: Pool::new("order_lists"),
            companies: Pool::new("companies"),
            settings: Settings::default(),
            gamelog: Gamelog::new(),
            tick: 0,
            calendar_day: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Calendar chunk
// ---------------------------------------------------------------------------

/// Fixed-shape global state: the simulation tick and calendar day, stored
/// as a 12-byte blob.
pub struct DateChunk;

const DATE_BLOB_LEN: usize = 12;

impl Chunk<World> for DateChunk {
    fn tag(&self) -> Tag {
        DATE
    }

    fn save(&self, w: &mut Writer, world: &World, _ctx: &SaveContext) -> Result<(), SaveError> {
        let mut body = Writer::new();
        body.put_u64(world.tick);
        body.put_u32(world.calendar_day);
        save_blob(w, body.as_bytes());
        Ok(())
    }

    fn load(
        &self,
        r: &mut Reader<'_>,
        kind: ContainerKind,
        world: &mut World,
        ctx: &mut LoadContext,
    ) -> Result<(), LoadError> {
        let mut body = load_blob(r, DATE, kind, Some(DATE_BLOB_LEN))?;
        world.tick = body.get_u64()?;
        world.calendar_day = body.get_u32()?;
        ctx.note_entry();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Build the frozen chunk registry defining the savegame format. Save
/// order is registration order; fails if any chunk or layout definition
/// is inconsistent.
pub fn registry() -> Result<ChunkRegistry<World>, StartupError> {
    ChunkRegistryBuilder::new()
        .register(DateChunk)
        .register(SettingsChunk::new())
        .register(CompanyChunk::new())
        .register(OrderChunk::new())
        .register(VehicleChunk::new())
        .register(GamelogChunk::new())
        .feature("dispatch", DISPATCH_FEATURE_MINOR)
        .build()
}

// ===========================================================================
// Tests
// ===========================================================================

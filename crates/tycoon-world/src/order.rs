//! Shared order lists and their nested order records.

use tycoon_saveload::chunk::{
    Chunk, ContainerKind, StartupError, load_records_into_pool, save_records,
};
use tycoon_saveload::field::{Field, IntRange, IntWidth, OPEN};
use tycoon_saveload::pool::{NULL_REF, resolve_ref};
use tycoon_saveload::stream::{LoadError, Reader, SaveError, Tag, Writer};
use tycoon_saveload::table::{LoadContext, RecordTable, SaveContext};

use crate::world::World;

pub const ORDR: Tag = Tag(*b"ORDR");

// Order kinds.
pub const ORDER_GOTO: i64 = 0;
pub const ORDER_LOAD: i64 = 1;
pub const ORDER_UNLOAD: i64 = 2;
pub const ORDER_SERVICE: i64 = 3;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One step in an order list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Order {
    pub dest: u16,
    pub kind: u8,
    /// Ticks to wait at the destination before departing.
    pub wait_time: u16,
}

/// An order list shared by all vehicles of one consist group.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderList {
    pub owner: u32,
    pub orders: Vec<Order>,
}

impl Default for OrderList {
    fn default() -> Self {
        Self {
            owner: NULL_REF,
            orders: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Descriptor tables
// ---------------------------------------------------------------------------

fn order_table() -> RecordTable<Order> {
    RecordTable::new(
        "order",
        vec![
            Field::int("dest", (1, OPEN), IntWidth::U16, |o: &Order| o.dest as i64, |o, v| {
                o.dest = v as u16
            }),
            Field::int_clamped(
                "kind",
                (1, OPEN),
                IntWidth::U8,
                IntRange::new(ORDER_GOTO, ORDER_SERVICE, ORDER_GOTO),
                |o: &Order| o.kind as i64,
                |o, v| o.kind = v as u8,
            ),
            Field::int("wait_time", (1, OPEN), IntWidth::U16, |o: &Order| o.wait_time as i64, |o, v| {
                o.wait_time = v as u16
            }),
        ],
    )
}

pub fn order_list_table() -> RecordTable<OrderList> {
    RecordTable::new(
        "order_list",
        vec![
            Field::reference("owner", (1, OPEN), "companies", |l: &OrderList| l.owner, |l, v| {
                l.owner = v
            }),
            Field::list(
                "orders",
                (1, OPEN),
                order_table(),
                |l: &OrderList| &l.orders,
                |l| &mut l.orders,
                Order::default,
            ),
        ],
    )
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

pub struct OrderChunk {
    table: RecordTable<OrderList>,
}

impl OrderChunk {
    pub fn new() -> Self {
        Self {
            table: order_list_table(),
        }
    }
}

impl Default for OrderChunk {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunk<World> for OrderChunk {
    fn tag(&self) -> Tag {
        ORDR
    }

    fn save(&self, w: &mut Writer, world: &World, ctx: &SaveContext) -> Result<(), SaveError> {
        save_records(w, ContainerKind::Table, &self.table, world.order_lists.iter(), ctx)
    }

    fn load(
        &self,
        r: &mut Reader<'_>,
        kind: ContainerKind,
        world: &mut World,
        ctx: &mut LoadContext,
    ) -> Result<(), LoadError> {
        load_records_into_pool(
            r,
            ORDR,
            kind,
            &self.table,
            None,
            &mut world.order_lists,
            OrderList::default,
            ctx,
        )
    }

    fn fix_references(&self, world: &mut World, _ctx: &LoadContext) -> Result<(), LoadError> {
        for (_, list) in world.order_lists.iter() {
            resolve_ref(&world.companies, list.owner)?;
        }
        Ok(())
    }

    fn check_consistency(&self) -> Result<(), StartupError> {
        self.table.check_consistency()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

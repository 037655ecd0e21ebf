//! Vehicles: the most version-churned record type in the format.
//!
//! The cargo counter was widened from one byte to two at format version 5,
//! and the dispatch schedule only exists in streams written at version 12
//! or later -- or by any fork declaring the `dispatch` feature marker,
//! whatever its version counter says.

use tycoon_saveload::chunk::{
    Chunk, ContainerKind, StartupError, load_records_into_pool, save_records,
};
use tycoon_saveload::feature::{Combine, FeatureTest};
use tycoon_saveload::field::{Field, IntWidth, OPEN};
use tycoon_saveload::pool::{NULL_REF, resolve_ref};
use tycoon_saveload::stream::{LoadError, Reader, SaveError, Tag, Writer};
use tycoon_saveload::table::{LoadContext, RecordTable, SaveContext};

use crate::world::World;

pub const VEHS: Tag = Tag(*b"VEHS");

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One scheduled departure slot of a vehicle's dispatch timetable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSlot {
    /// Departure offset in ticks from the start of the timetable cycle.
    pub offset: u32,
    pub flags: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Vehicle {
    pub name: String,
    pub cargo_count: u32,
    pub profit: i64,
    /// Owning company, as a pool-index surrogate.
    pub owner: u32,
    /// Next vehicle in the same consist chain.
    pub next: u32,
    /// Shared order list this vehicle follows.
    pub orders: u32,
    pub dispatch_slots: Vec<DispatchSlot>,
}

impl Default for Vehicle {
    fn default() -> Self {
        Self {
            name: String::new(),
            cargo_count: 0,
            profit: 0,
            owner: NULL_REF,
            next: NULL_REF,
            orders: NULL_REF,
            dispatch_slots: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Descriptor tables
// ---------------------------------------------------------------------------

fn dispatch_slot_table() -> RecordTable<DispatchSlot> {
    RecordTable::new(
        "dispatch_slot",
        vec![
            Field::int("offset", (1, OPEN), IntWidth::U32, |s: &DispatchSlot| s.offset as i64, |s, v| {
                s.offset = v as u32
            }),
            Field::int("flags", (1, OPEN), IntWidth::U8, |s: &DispatchSlot| s.flags as i64, |s, v| {
                s.flags = v as u8
            }),
        ],
    )
}

pub fn vehicle_table() -> RecordTable<Vehicle> {
    RecordTable::new(
        "vehicle",
        vec![
            Field::str("name", (1, OPEN), |v: &Vehicle| v.name.clone(), |v, s| v.name = s),
            // Widened at version 5.
            Field::int("cargo_count", (1, 5), IntWidth::U8, |v: &Vehicle| v.cargo_count as i64, |v, x| {
                v.cargo_count = x as u32
            }),
            Field::int("cargo_count", (5, OPEN), IntWidth::U16, |v: &Vehicle| v.cargo_count as i64, |v, x| {
                v.cargo_count = x as u32
            }),
            Field::int("profit", (1, OPEN), IntWidth::I64, |v: &Vehicle| v.profit, |v, x| {
                v.profit = x
            }),
            Field::reference("owner", (1, OPEN), "companies", |v: &Vehicle| v.owner, |v, x| {
                v.owner = x
            }),
            Field::reference("next", (1, OPEN), "vehicles", |v: &Vehicle| v.next, |v, x| {
                v.next = x
            }),
            Field::reference("orders", (3, OPEN), "order_lists", |v: &Vehicle| v.orders, |v, x| {
                v.orders = x
            }),
            Field::list(
                "dispatch_slots",
                (12, OPEN),
                dispatch_slot_table(),
                |v: &Vehicle| &v.dispatch_slots,
                |v| &mut v.dispatch_slots,
                DispatchSlot::default,
            )
            .with_feature(FeatureTest::at_least("dispatch", 1, Combine::Or)),
        ],
    )
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

pub struct VehicleChunk {
    table: RecordTable<Vehicle>,
}

impl VehicleChunk {
    pub fn new() -> Self {
        Self {
            table: vehicle_table(),
        }
    }
}

impl Default for VehicleChunk {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunk<World> for VehicleChunk {
    fn tag(&self) -> Tag {
        VEHS
    }

    fn save(&self, w: &mut Writer, world: &World, ctx: &SaveContext) -> Result<(), SaveError> {
        save_records(w, ContainerKind::Table, &self.table, world.vehicles.iter(), ctx)
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
            VEHS,
            kind,
            &self.table,
            None,
            &mut world.vehicles,
            Vehicle::default,
            ctx,
        )
    }

    fn fix_references(&self, world: &mut World, _ctx: &LoadContext) -> Result<(), LoadError> {
        for (_, vehicle) in world.vehicles.iter() {
            resolve_ref(&world.companies, vehicle.owner)?;
            resolve_ref(&world.vehicles, vehicle.next)?;
            resolve_ref(&world.order_lists, vehicle.orders)?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use tycoon_saveload::feature::LoadedFeatures;
    use tycoon_saveload::stream::SAVEGAME_VERSION;

    fn ctxs(version: u16) -> (SaveContext, LoadContext) {
        (
            SaveContext::new(version, LoadedFeatures::new()),
            LoadContext::new(version, LoadedFeatures::new()),
        )
    }

    fn sample() -> Vehicle {
        Vehicle {
            name: "Mallard".into(),
            cargo_count: 480,
            profit: -1250,
            owner: 1,
            next: NULL_REF,
            orders: 0,
            dispatch_slots: vec![
                DispatchSlot { offset: 0, flags: 1 },
                DispatchSlot { offset: 1800, flags: 0 },
            ],
        }
    }

    // -----------------------------------------------------------------------
    // Test 1: Record round-trip at the current version
    // -----------------------------------------------------------------------
    #[test]
    fn vehicle_record_round_trip() {
        let table = vehicle_table();
        let (sctx, mut lctx) = ctxs(SAVEGAME_VERSION);
        let vehicle = sample();

        let mut w = Writer::new();
        table.save_record(&mut w, &vehicle, &sctx).unwrap();
        let bytes = w.into_bytes();

        let mut loaded = Vehicle::default();
        let mut r = Reader::new(&bytes);
        table.load_record_legacy(&mut r, &mut loaded, &mut lctx).unwrap();
        assert_eq!(loaded, vehicle);
        assert!(r.is_empty());
    }

    // -----------------------------------------------------------------------
    // Test 2: Pre-widening streams store cargo_count in one byte
    // -----------------------------------------------------------------------
    #[test]
    fn vehicle_narrow_cargo_count() {
        let table = vehicle_table();
        let (_, mut lctx) = ctxs(4);

        let mut w = Writer::new();
        w.put_str("Rocket").unwrap();
        w.put_u8(0xFF); // cargo_count at its one-byte maximum
        w.put_i64(100);
        w.put_u32(NULL_REF); // owner
        w.put_u32(NULL_REF); // next
        w.put_u32(NULL_REF); // orders, present since version 3
        let bytes = w.into_bytes();

        let mut loaded = Vehicle::default();
        let mut r = Reader::new(&bytes);
        table.load_record_legacy(&mut r, &mut loaded, &mut lctx).unwrap();
        assert_eq!(loaded.cargo_count, 255);
        assert!(loaded.dispatch_slots.is_empty());
        assert!(r.is_empty());
    }

    // -----------------------------------------------------------------------
    // Test 3: The dispatch feature marker unlocks the field on old versions
    // -----------------------------------------------------------------------
    #[test]
    fn vehicle_dispatch_by_feature_marker() {
        let table = vehicle_table();
        let mut features = LoadedFeatures::new();
        features.declare("dispatch", 1);
        let sctx = SaveContext::new(8, features.clone());
        let mut lctx = LoadContext::new(8, features);

        let vehicle = sample();
        let mut w = Writer::new();
        table.save_record(&mut w, &vehicle, &sctx).unwrap();
        let bytes = w.into_bytes();

        let mut loaded = Vehicle::default();
        let mut r = Reader::new(&bytes);
        table.load_record_legacy(&mut r, &mut loaded, &mut lctx).unwrap();
        assert_eq!(loaded.dispatch_slots, vehicle.dispatch_slots);

        // Without the marker, a version-8 stream has no dispatch data.
        let (sctx, mut lctx) = ctxs(8);
        let mut w = Writer::new();
        table.save_record(&mut w, &vehicle, &sctx).unwrap();
        let bytes = w.into_bytes();
        let mut loaded = Vehicle::default();
        let mut r = Reader::new(&bytes);
        table.load_record_legacy(&mut r, &mut loaded, &mut lctx).unwrap();
        assert!(loaded.dispatch_slots.is_empty());
        assert!(r.is_empty());
    }

    // -----------------------------------------------------------------------
    // Test 4: Table self-consistency
    // -----------------------------------------------------------------------
    #[test]
    fn vehicle_table_consistent() {
        vehicle_table().check_consistency().unwrap();
    }
}

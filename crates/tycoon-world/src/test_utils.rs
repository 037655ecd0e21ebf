//! Shared test helpers for integration tests.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests and in integration tests (via the
//! `test-utils` feature).

use tycoon_saveload::pool::NULL_REF;
use tycoon_saveload::stream::{SAVE_MAGIC, Writer};

use crate::company::{Company, EconomyRecord};
use crate::gamelog::{LOG_GAME_START, LOG_SAVED};
use crate::order::{ORDER_LOAD, ORDER_UNLOAD, Order, OrderList};
use crate::settings::{PAYMENT_MANUAL, Settings};
use crate::vehicle::{DispatchSlot, Vehicle};
use crate::world::World;

// ===========================================================================
// World builders
// ===========================================================================

/// A small but representative world: two companies, a shared order list,
/// a two-vehicle consist chain, a pool gap, and a populated gamelog.
pub fn sample_world() -> World {
    let mut world = World::default();
    world.tick = 1_234_567;
    world.calendar_day = 4_018;
    world.settings = Settings {
        difficulty: 3,
        pause_mode: 0,
        payment_mode: PAYMENT_MANUAL as u8,
    };

    let gwr = world.companies.alloc(Company {
        name: "Great Western".into(),
        balance: 180_000,
        history: vec![
            EconomyRecord { income: 60_000, expenses: 25_000 },
            EconomyRecord { income: 75_000, expenses: 30_000 },
        ],
        vehicle_count: 0,
    });
    let lner = world.companies.alloc(Company {
        name: "Northern Eastern".into(),
        balance: -4_500,
        history: Vec::new(),
        vehicle_count: 0,
    });

    let coal_run = world.order_lists.alloc(OrderList {
        owner: gwr,
        orders: vec![
            Order { dest: 14, kind: ORDER_LOAD as u8, wait_time: 90 },
            Order { dest: 3, kind: ORDER_UNLOAD as u8, wait_time: 0 },
        ],
    });

    let wagon = world.vehicles.alloc(Vehicle {
        name: String::new(),
        cargo_count: 320,
        profit: 0,
        owner: gwr,
        next: NULL_REF,
        orders: NULL_REF,
        dispatch_slots: Vec::new(),
    });
    world.vehicles.alloc(Vehicle {
        name: "Mallard".into(),
        cargo_count: 0,
        profit: 42_000,
        owner: gwr,
        next: wagon,
        orders: coal_run,
        dispatch_slots: vec![
            DispatchSlot { offset: 0, flags: 1 },
            DispatchSlot { offset: 3_600, flags: 0 },
        ],
    });
    let lone = world.vehicles.alloc(Vehicle {
        name: "Puffing Billy".into(),
        cargo_count: 12,
        profit: -800,
        owner: lner,
        next: NULL_REF,
        orders: NULL_REF,
        dispatch_slots: Vec::new(),
    });

    // Leave a gap in the vehicle pool so saves exercise sparse indices.
    world.vehicles.free(lone);
    world.vehicles.insert_at(
        3,
        Vehicle {
            name: "Relief".into(),
            cargo_count: 5,
            profit: 10,
            owner: lner,
            next: NULL_REF,
            orders: NULL_REF,
            dispatch_slots: Vec::new(),
        },
    );

    world.gamelog.append(LOG_GAME_START, 0, "game started");
    world.gamelog.append(LOG_SAVED, 1_000_000, "autosave");
    world
}

/// An empty world with default settings, for absence-of-chunk tests.
pub fn empty_world() -> World {
    World::default()
}

// ===========================================================================
// Raw stream builders
// ===========================================================================

/// A writer pre-loaded with a stream header at the given version and no
/// feature markers. Callers append chunks and the end tag by hand.
pub fn header_at(version: u16) -> Writer {
    let mut w = Writer::new();
    w.put_u32(SAVE_MAGIC);
    w.put_u16(version);
    w.put_u8(0);
    w
}

//! Tycoon World -- the persisted game state and its savegame format.
//!
//! Each entity module defines its record type, the descriptor table that
//! persists it, and the chunk that owns its pool. [`world::registry`]
//! assembles the frozen chunk registry; everything else goes through the
//! drivers in `tycoon-saveload`.
//!
//! # Format history highlights
//!
//! - **v5** -- vehicle `cargo_count` widened from one byte to two.
//! - **v7** -- company economy history list first persisted; older loads
//!   reconstruct one synthetic quarter from the balance.
//! - **v11** -- settings record compacted: the dead town growth field was
//!   dropped and the payment modes renumbered.
//! - **v12** -- vehicle dispatch timetables added, also readable from any
//!   stream declaring the `dispatch` feature marker.

pub mod company;
pub mod gamelog;
pub mod order;
pub mod settings;
pub mod vehicle;
pub mod world;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

//! Tycoon Saveload -- the versioned savegame engine for tycoon-style games.
//!
//! This crate provides the table-driven binary serialization framework the
//! game state crates build on: field descriptor tables, the chunked stream
//! container format, stable-index object pools with reference surrogates,
//! and the backward-compatibility machinery that keeps a decade of old
//! savegames loadable.
//!
//! # Three-Stage Load Pipeline
//!
//! [`chunk::ChunkRegistry::load_stream`] deserializes a stream through the
//! following stages:
//!
//! 1. **Read** -- Validate the header, then decode every chunk's records
//!    into freshly cleared pools at their persisted indices.
//! 2. **Fix references** -- Each chunk validates its reference surrogates
//!    against the now fully populated pools; a dangling index aborts the
//!    load.
//! 3. **Post-load** -- Each chunk rebuilds derived state and reconstructs
//!    data that old format versions never stored.
//!
//! # Versioning Pattern
//!
//! A field whose width or meaning changed over the format's history has
//! several descriptors with the same name and disjoint version ranges;
//! the interpreter selects the one applicable to the stream being read:
//!
//! ```rust,ignore
//! Field::int("cargo_count", (1, 5), IntWidth::U8, get, set),
//! Field::int("cargo_count", (5, OPEN), IntWidth::U16, get, set),
//! ```
//!
//! # Key Types
//!
//! - [`chunk::ChunkRegistry`] -- Frozen set of chunks making up the format,
//!   with the save/load/check drivers.
//! - [`table::RecordTable`] -- Ordered field descriptor table for one
//!   record type, interpreted on both the save and load paths.
//! - [`field::Field`] -- One version-gated field descriptor with accessor
//!   functions instead of reflection.
//! - [`pool::Pool`] -- Stable-slot arena whose indices double as persisted
//!   reference surrogates.
//! - [`compat::LegacyLayout`] -- Positional recipe for record layouts of
//!   old format versions, with skip and cross-reference remap ops.
//! - [`feature::FeatureTest`] -- Named fork/capability markers orthogonal
//!   to the canonical version counter.

pub mod chunk;
pub mod compat;
pub mod feature;
pub mod field;
pub mod pool;
pub mod stream;
pub mod table;

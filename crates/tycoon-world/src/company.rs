//! Companies, their economy history, and the derived state rebuilt after
//! every load.
//!
//! The quarterly economy history was first persisted at format version 7.
//! Loading an older stream reconstructs a single synthetic quarter from
//! the company balance, so the finance window is never empty. The cached
//! vehicle count is never persisted at all; it is recomputed from the
//! vehicle pool in the post-load stage.

use tycoon_saveload::chunk::{
    Chunk, ContainerKind, StartupError, load_records_into_pool, save_records,
};
use tycoon_saveload::field::{Field, IntWidth, OPEN};
use tycoon_saveload::stream::{LoadError, Reader, SaveError, Tag, Writer};
use tycoon_saveload::table::{LoadContext, RecordTable, SaveContext};

use crate::world::World;

pub const PLYR: Tag = Tag(*b"PLYR");

/// First format version that persists the economy history list.
const HISTORY_VERSION: u16 = 7;

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One quarter of a company's income statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EconomyRecord {
    pub income: i64,
    pub expenses: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Company {
    pub name: String,
    pub balance: i64,
    pub history: Vec<EconomyRecord>,
    /// Derived: number of vehicles owned. Rebuilt after every load.
    pub vehicle_count: u32,
}

// ---------------------------------------------------------------------------
// Descriptor tables
// ---------------------------------------------------------------------------

fn economy_table() -> RecordTable<EconomyRecord> {
    RecordTable::new(
        "economy_record",
        vec![
            Field::int("income", (1, OPEN), IntWidth::I64, |e: &EconomyRecord| e.income, |e, v| {
                e.income = v
            }),
            Field::int("expenses", (1, OPEN), IntWidth::I64, |e: &EconomyRecord| e.expenses, |e, v| {
                e.expenses = v
            }),
        ],
    )
}

pub fn company_table() -> RecordTable<Company> {
    RecordTable::new(
        "company",
        vec![
            Field::str("name", (1, OPEN), |c: &Company| c.name.clone(), |c, v| c.name = v),
            Field::int("balance", (1, OPEN), IntWidth::I64, |c: &Company| c.balance, |c, v| {
                c.balance = v
            }),
            Field::list(
                "history",
                (HISTORY_VERSION, OPEN),
                economy_table(),
                |c: &Company| &c.history,
                |c| &mut c.history,
                EconomyRecord::default,
            ),
        ],
    )
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

pub struct CompanyChunk {
    table: RecordTable<Company>,
}

impl CompanyChunk {
    pub fn new() -> Self {
        Self {
            table: company_table(),
        }
    }
}

impl Default for CompanyChunk {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunk<World> for CompanyChunk {
    fn tag(&self) -> Tag {
        PLYR
    }

    fn save(&self, w: &mut Writer, world: &World, ctx: &SaveContext) -> Result<(), SaveError> {
        save_records(w, ContainerKind::Table, &self.table, world.companies.iter(), ctx)
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
            PLYR,
            kind,
            &self.table,
            None,
            &mut world.companies,
            Company::default,
            ctx,
        )
    }

    fn post_load(&self, world: &mut World, ctx: &LoadContext) -> Result<(), LoadError> {
        // Streams older than the history list get one synthetic quarter
        // derived from the closing balance.
        if ctx.version < HISTORY_VERSION {
            for (_, company) in world.companies.iter_mut() {
                if company.history.is_empty() {
                    company.history.push(EconomyRecord {
                        income: company.balance.max(0),
                        expenses: (-company.balance).max(0),
                    });
                }
            }
        }

        // The vehicle count cache is derived state, recomputed wholesale.
        let counts: Vec<(u32, u32)> = world
            .companies
            .iter()
            .map(|(index, _)| {
                let owned = world
                    .vehicles
                    .iter()
                    .filter(|(_, v)| v.owner == index)
                    .count();
                (index, owned as u32)
            })
            .collect();
        for (index, owned) in counts {
            if let Some(company) = world.companies.get_mut(index) {
                company.vehicle_count = owned;
            }
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

//! Legacy layout tables: positional recipes for record layouts whose shape
//! cannot be reconstructed from version-gated field descriptors alone.
//!
//! Old streams sometimes interleave fields that no longer exist, or store a
//! value whose meaning has since changed. A [`LegacyLayout`] covers such a
//! version range with an explicit op sequence: read this field, skip that
//! many dead bytes, read-and-remap the other one. Layouts are validated
//! against their record table when the chunk registry is frozen, so a typo
//! in a field name fails at startup rather than at the first old save.

use std::sync::OnceLock;

use crate::chunk::StartupError;
use crate::field::FieldKind;
use crate::stream::{LoadError, Reader};
use crate::table::{LoadContext, RecordTable};

// ---------------------------------------------------------------------------
// Ops
// ---------------------------------------------------------------------------

/// One step of a legacy record layout.
#[derive(Clone, Copy)]
pub enum LegacyOp {
    /// Read the named field via its version-applicable descriptor.
    Field { name: &'static str },
    /// Skip a fixed number of bytes belonging to a removed field.
    Skip { bytes: usize },
    /// Read the named integer field, then remap the decoded value before
    /// it is domain-checked and stored. Used when an enumeration was
    /// renumbered between format versions.
    CrossRef {
        name: &'static str,
        transform: fn(i64) -> i64,
    },
}

/// A [`LegacyOp`] with its field name pre-resolved to descriptor indices.
#[derive(Debug, Clone)]
enum ResolvedOp {
    Field {
        name: &'static str,
        candidates: Vec<usize>,
    },
    Skip {
        bytes: usize,
    },
    CrossRef {
        name: &'static str,
        candidates: Vec<usize>,
        transform: fn(i64) -> i64,
    },
}

// ---------------------------------------------------------------------------
// Layouts
// ---------------------------------------------------------------------------

/// Positional layout recipe for records saved in `[from, to)`.
pub struct LegacyLayout {
    from: u16,
    to: u16,
    ops: Vec<LegacyOp>,
    resolved: OnceLock<Vec<ResolvedOp>>,
}

impl LegacyLayout {
    pub fn new(from: u16, to: u16, ops: Vec<LegacyOp>) -> Self {
        Self {
            from,
            to,
            ops,
            resolved: OnceLock::new(),
        }
    }

    /// Whether this layout governs records saved at `version`.
    pub fn covers(&self, version: u16) -> bool {
        version >= self.from && version < self.to
    }

    /// Startup check against the owning record table: every named field
    /// must exist, skips must be non-zero, and cross-reference targets
    /// must be integer fields.
    pub fn validate<R: 'static>(&self, table: &RecordTable<R>) -> Result<(), StartupError> {
        for op in &self.ops {
            match op {
                LegacyOp::Skip { bytes: 0 } => {
                    return Err(StartupError::ZeroSkip { table: table.name() });
                }
                LegacyOp::Skip { .. } => {}
                LegacyOp::Field { name } => {
                    if table.candidates(name).is_empty() {
                        return Err(StartupError::UnknownLegacyField {
                            table: table.name(),
                            field: name,
                        });
                    }
                }
                LegacyOp::CrossRef { name, .. } => {
                    let candidates = table.candidates(name);
                    if candidates.is_empty() {
                        return Err(StartupError::UnknownLegacyField {
                            table: table.name(),
                            field: name,
                        });
                    }
                    for idx in candidates {
                        if !matches!(table.fields()[idx].kind, FieldKind::Int(_)) {
                            return Err(StartupError::CrossRefNotInt {
                                table: table.name(),
                                field: name,
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn resolved<R: 'static>(&self, table: &RecordTable<R>) -> &[ResolvedOp] {
        self.resolved.get_or_init(|| {
            self.ops
                .iter()
                .map(|op| match *op {
                    LegacyOp::Field { name } => ResolvedOp::Field {
                        name,
                        candidates: table.candidates(name),
                    },
                    LegacyOp::Skip { bytes } => ResolvedOp::Skip { bytes },
                    LegacyOp::CrossRef { name, transform } => ResolvedOp::CrossRef {
                        name,
                        candidates: table.candidates(name),
                        transform,
                    },
                })
                .collect()
        })
    }

    /// Load one record by executing this layout's op sequence. Where a
    /// field has several descriptors, the one applicable at the stream's
    /// version is selected; none applying is corrupt input.
    pub fn load_record<R: 'static>(
        &self,
        r: &mut Reader<'_>,
        rec: &mut R,
        table: &RecordTable<R>,
        ctx: &mut LoadContext,
    ) -> Result<(), LoadError> {
        for op in self.resolved(table) {
            match op {
                ResolvedOp::Skip { bytes } => r.skip(*bytes)?,
                ResolvedOp::Field { name, candidates } => {
                    let idx = pick(table, candidates, name, ctx)?;
                    table.load_field(r, rec, idx, None, ctx)?;
                }
                ResolvedOp::CrossRef {
                    name,
                    candidates,
                    transform,
                } => {
                    let idx = pick(table, candidates, name, ctx)?;
                    table.load_field(r, rec, idx, Some(*transform), ctx)?;
                }
            }
        }
        Ok(())
    }
}

fn pick<R: 'static>(
    table: &RecordTable<R>,
    candidates: &[usize],
    name: &str,
    ctx: &LoadContext,
) -> Result<usize, LoadError> {
    candidates
        .iter()
        .copied()
        .find(|&i| table.fields()[i].applies(ctx.version, &ctx.features))
        .ok_or_else(|| LoadError::NoApplicableDescriptor {
            field: name.to_string(),
            version: ctx.version,
        })
}

// ===========================================================================
// Tests
// ===========================================================================

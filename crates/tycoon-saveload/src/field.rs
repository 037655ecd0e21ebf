//! Field descriptors: one persistable fact about a record type.
//!
//! A descriptor names a field, declares its stored encoding and the format
//! version range in which that encoding applied, and carries a pair of
//! accessor functions instead of any reflection. A field whose width or
//! meaning changed over the format's history simply has several descriptors
//! with the same name and disjoint version ranges; the interpreter selects
//! the one applicable to the stream being read.

use crate::feature::{Combine, FeatureTest, LoadedFeatures};
use crate::stream::{LoadError, Reader, Writer};
use crate::table::{ListAccess, ListField, RecordTable};

/// Open upper bound for a descriptor's version range.
pub const OPEN: u16 = u16::MAX;

// ---------------------------------------------------------------------------
// Stored integer widths
// ---------------------------------------------------------------------------

/// Width and signedness of an integer as stored on the wire. The in-memory
/// working type is always `i64`; extension from the stored width follows the
/// stored signedness, so a `U8` value of 0xFF always loads as 255. Unsigned
/// 64-bit fields travel through `i64` by bit pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntWidth {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
}

impl IntWidth {
    pub fn size(self) -> usize {
        match self {
            IntWidth::I8 | IntWidth::U8 => 1,
            IntWidth::I16 | IntWidth::U16 => 2,
            IntWidth::I32 | IntWidth::U32 => 4,
            IntWidth::I64 | IntWidth::U64 => 8,
        }
    }

    pub fn is_signed(self) -> bool {
        matches!(
            self,
            IntWidth::I8 | IntWidth::I16 | IntWidth::I32 | IntWidth::I64
        )
    }

    pub fn type_code(self) -> TypeCode {
        match self {
            IntWidth::I8 => TypeCode::I8,
            IntWidth::U8 => TypeCode::U8,
            IntWidth::I16 => TypeCode::I16,
            IntWidth::U16 => TypeCode::U16,
            IntWidth::I32 => TypeCode::I32,
            IntWidth::U32 => TypeCode::U32,
            IntWidth::I64 => TypeCode::I64,
            IntWidth::U64 => TypeCode::U64,
        }
    }

    /// Read one value at this width, extending into the `i64` working type.
    pub fn read(self, r: &mut Reader<'_>) -> Result<i64, LoadError> {
        Ok(match self {
            IntWidth::I8 => r.get_i8()? as i64,
            IntWidth::U8 => r.get_u8()? as i64,
            IntWidth::I16 => r.get_i16()? as i64,
            IntWidth::U16 => r.get_u16()? as i64,
            IntWidth::I32 => r.get_i32()? as i64,
            IntWidth::U32 => r.get_u32()? as i64,
            IntWidth::I64 => r.get_i64()?,
            IntWidth::U64 => r.get_u64()? as i64,
        })
    }

    /// Write one value at this width, truncating from the working type.
    pub fn write(self, w: &mut Writer, v: i64) {
        match self {
            IntWidth::I8 => w.put_i8(v as i8),
            IntWidth::U8 => w.put_u8(v as u8),
            IntWidth::I16 => w.put_i16(v as i16),
            IntWidth::U16 => w.put_u16(v as u16),
            IntWidth::I32 => w.put_i32(v as i32),
            IntWidth::U32 => w.put_u32(v as u32),
            IntWidth::I64 => w.put_i64(v),
            IntWidth::U64 => w.put_u64(v as u64),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire type codes
// ---------------------------------------------------------------------------

/// Encoding tag carried per field by self-describing table chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCode {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    Str,
    Ref,
    List,
}

impl TypeCode {
    pub fn to_u8(self) -> u8 {
        match self {
            TypeCode::I8 => 1,
            TypeCode::U8 => 2,
            TypeCode::I16 => 3,
            TypeCode::U16 => 4,
            TypeCode::I32 => 5,
            TypeCode::U32 => 6,
            TypeCode::I64 => 7,
            TypeCode::U64 => 8,
            TypeCode::Str => 9,
            TypeCode::Ref => 10,
            TypeCode::List => 11,
        }
    }

    pub fn from_u8(b: u8) -> Result<Self, LoadError> {
        Ok(match b {
            1 => TypeCode::I8,
            2 => TypeCode::U8,
            3 => TypeCode::I16,
            4 => TypeCode::U16,
            5 => TypeCode::I32,
            6 => TypeCode::U32,
            7 => TypeCode::I64,
            8 => TypeCode::U64,
            9 => TypeCode::Str,
            10 => TypeCode::Ref,
            11 => TypeCode::List,
            other => return Err(LoadError::UnknownTypeCode(other)),
        })
    }

    /// The stored width, if this code is an integer code.
    pub fn int_width(self) -> Option<IntWidth> {
        Some(match self {
            TypeCode::I8 => IntWidth::I8,
            TypeCode::U8 => IntWidth::U8,
            TypeCode::I16 => IntWidth::I16,
            TypeCode::U16 => IntWidth::U16,
            TypeCode::I32 => IntWidth::I32,
            TypeCode::U32 => IntWidth::U32,
            TypeCode::I64 => IntWidth::I64,
            TypeCode::U64 => IntWidth::U64,
            _ => return None,
        })
    }
}

// ---------------------------------------------------------------------------
// Field kinds
// ---------------------------------------------------------------------------

/// Legal domain of an integer field. A decoded value outside `[min, max]`
/// is reset to `default` and the load continues; persisted data may have
/// been produced by a build with different validity rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntRange {
    pub min: i64,
    pub max: i64,
    pub default: i64,
}

impl IntRange {
    pub const fn new(min: i64, max: i64, default: i64) -> Self {
        Self { min, max, default }
    }

    pub fn contains(&self, v: i64) -> bool {
        v >= self.min && v <= self.max
    }
}

/// Integer field: stored width plus accessor pair and optional legal domain.
pub struct IntField<R> {
    pub stored: IntWidth,
    pub get: fn(&R) -> i64,
    pub set: fn(&mut R, i64),
    pub range: Option<IntRange>,
}

/// Variable-length string field (u16 length prefix on the wire).
pub struct StrField<R> {
    pub get: fn(&R) -> String,
    pub set: fn(&mut R, String),
}

/// Reference field: a pool-index surrogate (`NULL_REF` for absent).
pub struct RefField<R> {
    /// Name of the pool this reference points into, for error reporting
    /// and registry documentation.
    pub pool: &'static str,
    pub get: fn(&R) -> u32,
    pub set: fn(&mut R, u32),
}

/// The encoding kind of one field descriptor.
pub enum FieldKind<R> {
    Int(IntField<R>),
    Str(StrField<R>),
    Ref(RefField<R>),
    /// Nested variable-length record sequence, recursing into its own
    /// record table via a type-erased accessor.
    List(Box<dyn ListAccess<R> + Send + Sync>),
}

impl<R> FieldKind<R> {
    pub fn type_code(&self) -> TypeCode {
        match self {
            FieldKind::Int(f) => f.stored.type_code(),
            FieldKind::Str(_) => TypeCode::Str,
            FieldKind::Ref(_) => TypeCode::Ref,
            FieldKind::List(_) => TypeCode::List,
        }
    }
}

// ---------------------------------------------------------------------------
// Field
// ---------------------------------------------------------------------------

/// One field descriptor: name, version applicability, optional feature
/// gate, and encoding kind.
pub struct Field<R> {
    pub name: &'static str,
    /// First format version this descriptor applies to (inclusive).
    pub from: u16,
    /// First format version this descriptor no longer applies to
    /// (exclusive); [`OPEN`] for still-current descriptors.
    pub to: u16,
    pub feature: Option<FeatureTest>,
    pub kind: FieldKind<R>,
}

impl<R: 'static> Field<R> {
    pub fn int(
        name: &'static str,
        (from, to): (u16, u16),
        stored: IntWidth,
        get: fn(&R) -> i64,
        set: fn(&mut R, i64),
    ) -> Self {
        Self {
            name,
            from,
            to,
            feature: None,
            kind: FieldKind::Int(IntField {
                stored,
                get,
                set,
                range: None,
            }),
        }
    }

    pub fn int_clamped(
        name: &'static str,
        (from, to): (u16, u16),
        stored: IntWidth,
        range: IntRange,
        get: fn(&R) -> i64,
        set: fn(&mut R, i64),
    ) -> Self {
        Self {
            name,
            from,
            to,
            feature: None,
            kind: FieldKind::Int(IntField {
                stored,
                get,
                set,
                range: Some(range),
            }),
        }
    }

    pub fn str(
        name: &'static str,
        (from, to): (u16, u16),
        get: fn(&R) -> String,
        set: fn(&mut R, String),
    ) -> Self {
        Self {
            name,
            from,
            to,
            feature: None,
            kind: FieldKind::Str(StrField { get, set }),
        }
    }

    pub fn reference(
        name: &'static str,
        (from, to): (u16, u16),
        pool: &'static str,
        get: fn(&R) -> u32,
        set: fn(&mut R, u32),
    ) -> Self {
        Self {
            name,
            from,
            to,
            feature: None,
            kind: FieldKind::Ref(RefField { pool, get, set }),
        }
    }

    pub fn list<C: Send + Sync + 'static>(
        name: &'static str,
        (from, to): (u16, u16),
        table: RecordTable<C>,
        get: fn(&R) -> &Vec<C>,
        get_mut: fn(&mut R) -> &mut Vec<C>,
        make: fn() -> C,
    ) -> Self
    where
        R: Send + Sync,
    {
        Self {
            name,
            from,
            to,
            feature: None,
            kind: FieldKind::List(Box::new(ListField::new(table, get, get_mut, make))),
        }
    }

    /// Attach an extended feature test to this descriptor.
    pub fn with_feature(mut self, test: FeatureTest) -> Self {
        self.feature = Some(test);
        self
    }

    /// Whether this descriptor applies to a stream at `version` with the
    /// given feature markers.
    pub fn applies(&self, version: u16, features: &LoadedFeatures) -> bool {
        let base = version >= self.from && version < self.to;
        match self.feature {
            None => base,
            Some(test) => match test.combine {
                Combine::And => base && test.matches(features),
                Combine::Or => base || test.matches(features),
            },
        }
    }

    /// Whether this descriptor's version range overlaps another's.
    pub fn overlaps(&self, other: &Field<R>) -> bool {
        self.from < other.to && other.from < self.to
    }
}

// ===========================================================================
// Tests
// ===========================================================================

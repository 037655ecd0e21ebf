//! The record descriptor table interpreter.
//!
//! A [`RecordTable`] is the ordered list of field descriptors for one
//! entity kind. The interpreter walks it to write records in declaration
//! order, to read legacy (positional) records filtered by version and
//! feature applicability, and to reconcile the embedded field list of a
//! self-describing table chunk against the compiled table, producing a
//! load plan that skips unknown stream fields by their declared length.

use serde::Serialize;

use crate::chunk::StartupError;
use crate::feature::LoadedFeatures;
use crate::field::{Field, FieldKind, IntWidth, TypeCode};
use crate::stream::{LoadError, Reader, SaveError, Writer};

// ---------------------------------------------------------------------------
// Save / load contexts
// ---------------------------------------------------------------------------

/// Parameters governing one save operation.
#[derive(Debug, Clone)]
pub struct SaveContext {
    pub version: u16,
    pub features: LoadedFeatures,
}

impl SaveContext {
    pub fn new(version: u16, features: LoadedFeatures) -> Self {
        Self { version, features }
    }
}

/// One out-of-domain value reset to its declared default during a load.
/// Never an error; collected for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClampEvent {
    pub table: &'static str,
    pub field: &'static str,
    pub stored: i64,
    pub reset_to: i64,
}

/// Parameters and diagnostics of one load operation. The version and
/// feature markers come from the stream header and govern every chunk's
/// field selection for the remainder of the load.
#[derive(Debug, Clone)]
pub struct LoadContext {
    pub version: u16,
    pub features: LoadedFeatures,
    clamps: Vec<ClampEvent>,
    entries_in_chunk: u32,
}

impl LoadContext {
    pub fn new(version: u16, features: LoadedFeatures) -> Self {
        Self {
            version,
            features,
            clamps: Vec::new(),
            entries_in_chunk: 0,
        }
    }

    pub fn record_clamp(&mut self, table: &'static str, field: &'static str, stored: i64, reset_to: i64) {
        self.clamps.push(ClampEvent {
            table,
            field,
            stored,
            reset_to,
        });
    }

    pub fn clamps(&self) -> &[ClampEvent] {
        &self.clamps
    }

    pub fn take_clamps(&mut self) -> Vec<ClampEvent> {
        std::mem::take(&mut self.clamps)
    }

    /// Count one record (or blob) toward the chunk currently loading.
    pub fn note_entry(&mut self) {
        self.entries_in_chunk += 1;
    }

    pub fn begin_chunk(&mut self) {
        self.entries_in_chunk = 0;
    }

    pub fn entries_in_chunk(&self) -> u32 {
        self.entries_in_chunk
    }
}

// ---------------------------------------------------------------------------
// Stream schema (the self-describing field list of table chunks)
// ---------------------------------------------------------------------------

/// One field as described by a table chunk's embedded field list.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaField {
    pub label: String,
    pub code: TypeCode,
    /// Nested field list for LIST-coded fields.
    pub sub: Option<Schema>,
}

/// The embedded field list of one table chunk (possibly nested).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    pub fields: Vec<SchemaField>,
}

impl Schema {
    pub fn write(&self, w: &mut Writer) -> Result<(), SaveError> {
        w.put_u16(self.fields.len() as u16);
        for f in &self.fields {
            if f.label.len() > u8::MAX as usize {
                return Err(SaveError::LabelTooLong(f.label.clone()));
            }
            w.put_u8(f.label.len() as u8);
            w.put_bytes(f.label.as_bytes());
            w.put_u8(f.code.to_u8());
            if let Some(sub) = &f.sub {
                sub.write(w)?;
            }
        }
        Ok(())
    }

    pub fn read(r: &mut Reader<'_>) -> Result<Self, LoadError> {
        let count = r.get_u16()?;
        let mut fields = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let len = r.get_u8()? as usize;
            let label = String::from_utf8(r.get_bytes(len)?.to_vec())
                .map_err(|_| LoadError::InvalidUtf8)?;
            let code = TypeCode::from_u8(r.get_u8()?)?;
            let sub = if code == TypeCode::List {
                Some(Schema::read(r)?)
            } else {
                None
            };
            fields.push(SchemaField { label, code, sub });
        }
        Ok(Schema { fields })
    }
}

/// Skip one value of the given stream-described type. This is what makes
/// unknown fields in table chunks tolerable: every encoding either has a
/// fixed width or carries its own length.
pub fn skip_value(r: &mut Reader<'_>, field: &SchemaField) -> Result<(), LoadError> {
    match field.code {
        TypeCode::Str => {
            let len = r.get_u16()? as usize;
            r.skip(len)
        }
        TypeCode::Ref => r.skip(4),
        TypeCode::List => {
            let sub = field.sub.as_ref().ok_or_else(|| LoadError::SchemaMismatch {
                field: field.label.clone(),
            })?;
            let count = read_list_count(r)?;
            for _ in 0..count {
                for f in &sub.fields {
                    skip_value(r, f)?;
                }
            }
            Ok(())
        }
        code => {
            // Remaining codes are all fixed-width integers.
            match code.int_width() {
                Some(width) => r.skip(width.size()),
                None => Err(LoadError::SchemaMismatch {
                    field: field.label.clone(),
                }),
            }
        }
    }
}

/// Read a list element count and bound it by the bytes actually left in
/// the record. Every element encoding is at least one byte, so a count
/// larger than the remainder can only come from corrupt input; checking
/// up front keeps a hostile count from driving a huge allocation.
fn read_list_count(r: &mut Reader<'_>) -> Result<u32, LoadError> {
    let count = r.get_u32()?;
    if count as usize > r.remaining() {
        return Err(LoadError::ListCount {
            count,
            remaining: r.remaining(),
        });
    }
    Ok(count)
}

// ---------------------------------------------------------------------------
// Load plans
// ---------------------------------------------------------------------------

/// The reconciliation of one stream schema against one compiled table:
/// for each stream field in order, either where to put it or how to skip it.
#[derive(Debug)]
pub struct LoadPlan {
    ops: Vec<PlanOp>,
}

#[derive(Debug)]
enum PlanOp {
    Int { field: usize, width: IntWidth },
    Str { field: usize },
    Ref { field: usize },
    List { field: usize, sub: LoadPlan },
    Skip(SchemaField),
}

// ---------------------------------------------------------------------------
// Record tables
// ---------------------------------------------------------------------------

/// The ordered field descriptor table for one record type.
pub struct RecordTable<R> {
    name: &'static str,
    fields: Vec<Field<R>>,
}

impl<R: 'static> RecordTable<R> {
    pub fn new(name: &'static str, fields: Vec<Field<R>>) -> Self {
        Self { name, fields }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &[Field<R>] {
        &self.fields
    }

    /// Indices of all descriptors sharing a field name.
    pub(crate) fn candidates(&self, name: &str) -> Vec<usize> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.name == name)
            .map(|(i, _)| i)
            .collect()
    }

    fn applicable<'t>(
        &'t self,
        version: u16,
        features: &'t LoadedFeatures,
    ) -> impl Iterator<Item = &'t Field<R>> {
        self.fields
            .iter()
            .filter(move |f| f.applies(version, features))
    }

    // -- Startup self-consistency ------------------------------------------

    /// Verify that descriptors sharing a name have mutually exclusive
    /// version ranges, recursing into nested list tables. Run once when
    /// the chunk registry is frozen.
    pub fn check_consistency(&self) -> Result<(), StartupError> {
        for (i, a) in self.fields.iter().enumerate() {
            for b in &self.fields[i + 1..] {
                if a.name == b.name && a.overlaps(b) {
                    return Err(StartupError::OverlappingDescriptors {
                        table: self.name,
                        field: a.name,
                    });
                }
            }
        }
        for f in &self.fields {
            if let FieldKind::List(list) = &f.kind {
                list.check()?;
            }
        }
        Ok(())
    }

    // -- Save path ---------------------------------------------------------

    /// Write one record's applicable fields in declaration order.
    pub fn save_record(&self, w: &mut Writer, rec: &R, ctx: &SaveContext) -> Result<(), SaveError> {
        for f in self.applicable(ctx.version, &ctx.features) {
            match &f.kind {
                FieldKind::Int(int) => int.stored.write(w, (int.get)(rec)),
                FieldKind::Str(s) => w.put_str(&(s.get)(rec))?,
                FieldKind::Ref(rf) => w.put_u32((rf.get)(rec)),
                FieldKind::List(list) => list.save(w, rec, ctx)?,
            }
        }
        Ok(())
    }

    /// The embedded field list a table chunk writes for this record type.
    pub fn schema(&self, ctx: &SaveContext) -> Schema {
        let fields = self
            .applicable(ctx.version, &ctx.features)
            .map(|f| SchemaField {
                label: f.name.to_string(),
                code: f.kind.type_code(),
                sub: match &f.kind {
                    FieldKind::List(list) => Some(list.schema(ctx)),
                    _ => None,
                },
            })
            .collect();
        Schema { fields }
    }

    // -- Load path: self-describing table chunks ---------------------------

    /// Reconcile a stream schema against this table. Unknown stream fields
    /// become skip ops; an integer code is accepted for any integer field
    /// (extension follows the stream code's signedness); a fundamental kind
    /// mismatch is corrupt input. Compiled fields absent from the stream
    /// are simply left at their default-constructed value.
    pub fn build_plan(&self, stream: &Schema, ctx: &LoadContext) -> Result<LoadPlan, LoadError> {
        let mut ops = Vec::with_capacity(stream.fields.len());
        for sf in &stream.fields {
            let hit = self
                .fields
                .iter()
                .enumerate()
                .find(|(_, f)| f.name == sf.label && f.applies(ctx.version, &ctx.features));
            let Some((idx, field)) = hit else {
                ops.push(PlanOp::Skip(sf.clone()));
                continue;
            };
            let op = match (&field.kind, sf.code, sf.code.int_width()) {
                (FieldKind::Int(_), _, Some(width)) => PlanOp::Int { field: idx, width },
                (FieldKind::Str(_), TypeCode::Str, _) => PlanOp::Str { field: idx },
                (FieldKind::Ref(_), TypeCode::Ref, _) => PlanOp::Ref { field: idx },
                (FieldKind::List(list), TypeCode::List, _) => {
                    let sub_schema =
                        sf.sub.as_ref().ok_or_else(|| LoadError::SchemaMismatch {
                            field: sf.label.clone(),
                        })?;
                    PlanOp::List {
                        field: idx,
                        sub: list.plan(sub_schema, ctx)?,
                    }
                }
                _ => {
                    return Err(LoadError::SchemaMismatch {
                        field: sf.label.clone(),
                    });
                }
            };
            ops.push(op);
        }
        Ok(LoadPlan { ops })
    }

    /// Load one record by executing a previously built plan.
    pub fn load_record_planned(
        &self,
        r: &mut Reader<'_>,
        rec: &mut R,
        plan: &LoadPlan,
        ctx: &mut LoadContext,
    ) -> Result<(), LoadError> {
        for op in &plan.ops {
            match op {
                PlanOp::Int { field, width } => {
                    self.load_int(r, rec, *field, Some(*width), None, ctx)?;
                }
                PlanOp::Str { field } => {
                    if let FieldKind::Str(s) = &self.fields[*field].kind {
                        (s.set)(rec, r.get_str()?);
                    }
                }
                PlanOp::Ref { field } => {
                    if let FieldKind::Ref(rf) = &self.fields[*field].kind {
                        (rf.set)(rec, r.get_u32()?);
                    }
                }
                PlanOp::List { field, sub } => {
                    if let FieldKind::List(list) = &self.fields[*field].kind {
                        list.load_planned(r, rec, sub, ctx)?;
                    }
                }
                PlanOp::Skip(sf) => skip_value(r, sf)?,
            }
        }
        Ok(())
    }

    // -- Load path: legacy (positional) records ----------------------------

    /// Load one record from a non-self-describing chunk: walk the compiled
    /// table in declaration order, reading exactly the fields applicable at
    /// the stream's version and feature set.
    pub fn load_record_legacy(
        &self,
        r: &mut Reader<'_>,
        rec: &mut R,
        ctx: &mut LoadContext,
    ) -> Result<(), LoadError> {
        let indices: Vec<usize> = self
            .fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.applies(ctx.version, &ctx.features))
            .map(|(i, _)| i)
            .collect();
        for idx in indices {
            self.load_field(r, rec, idx, None, ctx)?;
        }
        Ok(())
    }

    /// Load one field via its descriptor's own stored encoding.
    pub(crate) fn load_field(
        &self,
        r: &mut Reader<'_>,
        rec: &mut R,
        idx: usize,
        transform: Option<fn(i64) -> i64>,
        ctx: &mut LoadContext,
    ) -> Result<(), LoadError> {
        match &self.fields[idx].kind {
            FieldKind::Int(_) => self.load_int(r, rec, idx, None, transform, ctx),
            FieldKind::Str(s) => {
                (s.set)(rec, r.get_str()?);
                Ok(())
            }
            FieldKind::Ref(rf) => {
                (rf.set)(rec, r.get_u32()?);
                Ok(())
            }
            FieldKind::List(list) => list.load_legacy(r, rec, ctx),
        }
    }

    /// Read, optionally transform, domain-check, and store one integer
    /// field. `width` overrides the descriptor's stored width when the
    /// stream schema declared a different one.
    fn load_int(
        &self,
        r: &mut Reader<'_>,
        rec: &mut R,
        idx: usize,
        width: Option<IntWidth>,
        transform: Option<fn(i64) -> i64>,
        ctx: &mut LoadContext,
    ) -> Result<(), LoadError> {
        let field = &self.fields[idx];
        let FieldKind::Int(int) = &field.kind else {
            return Err(LoadError::SchemaMismatch {
                field: field.name.to_string(),
            });
        };
        let mut v = width.unwrap_or(int.stored).read(r)?;
        if let Some(f) = transform {
            v = f(v);
        }
        if let Some(range) = int.range {
            if !range.contains(v) {
                ctx.record_clamp(self.name, field.name, v, range.default);
                v = range.default;
            }
        }
        (int.set)(rec, v);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Struct-list access
// ---------------------------------------------------------------------------

/// Type-erased access to a nested record-sequence field, so that a
/// [`RecordTable`] can hold list fields of arbitrary element types and
/// recurse to arbitrary nesting depth.
pub trait ListAccess<R>: Send + Sync {
    fn schema(&self, ctx: &SaveContext) -> Schema;
    fn plan(&self, stream: &Schema, ctx: &LoadContext) -> Result<LoadPlan, LoadError>;
    fn save(&self, w: &mut Writer, rec: &R, ctx: &SaveContext) -> Result<(), SaveError>;
    fn load_legacy(&self, r: &mut Reader<'_>, rec: &mut R, ctx: &mut LoadContext)
    -> Result<(), LoadError>;
    fn load_planned(
        &self,
        r: &mut Reader<'_>,
        rec: &mut R,
        plan: &LoadPlan,
        ctx: &mut LoadContext,
    ) -> Result<(), LoadError>;
    fn check(&self) -> Result<(), StartupError>;
}

/// The one concrete [`ListAccess`] implementation: a nested table plus
/// accessors for the owning record's `Vec` field.
pub struct ListField<R, C> {
    table: RecordTable<C>,
    get: fn(&R) -> &Vec<C>,
    get_mut: fn(&mut R) -> &mut Vec<C>,
    make: fn() -> C,
}

impl<R, C: 'static> ListField<R, C> {
    pub fn new(
        table: RecordTable<C>,
        get: fn(&R) -> &Vec<C>,
        get_mut: fn(&mut R) -> &mut Vec<C>,
        make: fn() -> C,
    ) -> Self {
        Self {
            table,
            get,
            get_mut,
            make,
        }
    }
}

impl<R: Send + Sync, C: Send + Sync + 'static> ListAccess<R> for ListField<R, C> {
    fn schema(&self, ctx: &SaveContext) -> Schema {
        self.table.schema(ctx)
    }

    fn plan(&self, stream: &Schema, ctx: &LoadContext) -> Result<LoadPlan, LoadError> {
        self.table.build_plan(stream, ctx)
    }

    fn save(&self, w: &mut Writer, rec: &R, ctx: &SaveContext) -> Result<(), SaveError> {
        let elems = (self.get)(rec);
        if elems.len() > u32::MAX as usize {
            return Err(SaveError::ListTooLong(elems.len()));
        }
        w.put_u32(elems.len() as u32);
        for elem in elems {
            self.table.save_record(w, elem, ctx)?;
        }
        Ok(())
    }

    fn load_legacy(
        &self,
        r: &mut Reader<'_>,
        rec: &mut R,
        ctx: &mut LoadContext,
    ) -> Result<(), LoadError> {
        let count = read_list_count(r)?;
        let target = (self.get_mut)(rec);
        target.clear();
        for _ in 0..count {
            let mut elem = (self.make)();
            self.table.load_record_legacy(r, &mut elem, ctx)?;
            target.push(elem);
        }
        Ok(())
    }

    fn load_planned(
        &self,
        r: &mut Reader<'_>,
        rec: &mut R,
        plan: &LoadPlan,
        ctx: &mut LoadContext,
    ) -> Result<(), LoadError> {
        let count = read_list_count(r)?;
        (self.get_mut)(rec).clear();
        for _ in 0..count {
            let mut elem = (self.make)();
            self.table.load_record_planned(r, &mut elem, plan, ctx)?;
            (self.get_mut)(rec).push(elem);
        }
        Ok(())
    }

    fn check(&self) -> Result<(), StartupError> {
        self.table.check_consistency()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

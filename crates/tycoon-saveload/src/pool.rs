//! Index-addressed object pools with stable slots.
//!
//! A pool index is assigned when an object is created and never changes for
//! the object's lifetime; persisted reference surrogates are exactly these
//! indices. Freed slots become reusable, and sparse-array loading inserts
//! objects back at their persisted index.

use crate::stream::LoadError;

/// Reserved surrogate value for a null/absent relation.
pub const NULL_REF: u32 = u32::MAX;

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// Stable-slot arena owning all live instances of one entity kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Pool<T> {
    name: &'static str,
    slots: Vec<Option<T>>,
}

impl<T> Pool<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Allocate the lowest free slot and place `value` there.
    pub fn alloc(&mut self, value: T) -> u32 {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(value);
                return i as u32;
            }
        }
        self.slots.push(Some(value));
        (self.slots.len() - 1) as u32
    }

    /// Place `value` at an explicit index, growing the pool as needed.
    /// Used when loading sparse-array chunks whose indices come from the
    /// stream. Overwrites anything already in the slot.
    pub fn insert_at(&mut self, index: u32, value: T) {
        let index = index as usize;
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        self.slots[index] = Some(value);
    }

    /// Free a slot, making its index reusable. Returns the evicted value.
    pub fn free(&mut self, index: u32) -> Option<T> {
        self.slots.get_mut(index as usize).and_then(Option::take)
    }

    pub fn get(&self, index: u32) -> Option<&T> {
        self.slots.get(index as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        self.slots.get_mut(index as usize).and_then(Option::as_mut)
    }

    pub fn contains(&self, index: u32) -> bool {
        self.get(index).is_some()
    }

    /// Number of live objects (not the slot capacity).
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Iterate live objects in index order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (i as u32, v)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (u32, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_mut().map(|v| (i as u32, v)))
    }
}

// ---------------------------------------------------------------------------
// Reference resolution
// ---------------------------------------------------------------------------

/// Resolve a persisted reference surrogate against a pool.
///
/// `NULL_REF` resolves to `None`; a live index resolves to itself; a dead
/// or out-of-range index is corrupt input. Because relations stay as plain
/// indices after loading, running resolution again over an already-resolved
/// graph is a no-op.
pub fn resolve_ref<T>(pool: &Pool<T>, raw: u32) -> Result<Option<u32>, LoadError> {
    if raw == NULL_REF {
        return Ok(None);
    }
    if pool.contains(raw) {
        Ok(Some(raw))
    } else {
        Err(LoadError::InvalidReference {
            pool: pool.name,
            index: raw,
        })
    }
}

// ===========================================================================
// Tests
// ===========================================================================

//! Extended feature tests: named fork/capability markers read once from the
//! stream header, orthogonal to the canonical format version counter.
//!
//! A third-party fork that extended the format independently announces its
//! capabilities as `(name, minor version)` markers. Field descriptors can
//! then gate on a marker instead of (or in addition to) a version range.

use crate::stream::{LoadError, Reader, SaveError, Writer};

// ---------------------------------------------------------------------------
// Feature tests
// ---------------------------------------------------------------------------

/// How a feature test combines with the descriptor's base version range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combine {
    /// Field applies only when both the version range and the feature match.
    And,
    /// Field applies when either the version range or the feature matches.
    Or,
}

/// A named predicate over the feature markers of the stream being read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureTest {
    pub name: &'static str,
    /// Inclusive minimum feature minor version.
    pub min: u16,
    /// Inclusive maximum feature minor version.
    pub max: u16,
    pub combine: Combine,
}

impl FeatureTest {
    /// Test for a feature at `min` or any later minor version.
    pub const fn at_least(name: &'static str, min: u16, combine: Combine) -> Self {
        Self {
            name,
            min,
            max: u16::MAX,
            combine,
        }
    }

    /// Whether the loaded markers satisfy this test.
    pub fn matches(&self, features: &LoadedFeatures) -> bool {
        match features.minor(self.name) {
            Some(minor) => minor >= self.min && minor <= self.max,
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Loaded feature markers
// ---------------------------------------------------------------------------

/// The feature markers declared by one stream header, in declaration order.
/// Evaluated once per load and read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedFeatures {
    markers: Vec<(String, u16)>,
}

impl LoadedFeatures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a marker. A later declaration of the same name wins.
    pub fn declare(&mut self, name: &str, minor: u16) {
        if let Some(entry) = self.markers.iter_mut().find(|(n, _)| n == name) {
            entry.1 = minor;
        } else {
            self.markers.push((name.to_string(), minor));
        }
    }

    /// The minor version a marker was declared at, if present.
    pub fn minor(&self, name: &str) -> Option<u16> {
        self.markers
            .iter()
            .find(|(n, _)| n == name)
            .map(|&(_, minor)| minor)
    }

    pub fn has(&self, name: &str) -> bool {
        self.minor(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u16)> {
        self.markers.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Write the header feature block.
    pub fn write(&self, w: &mut Writer) -> Result<(), SaveError> {
        if self.markers.len() > u8::MAX as usize {
            return Err(SaveError::TooManyFeatures(self.markers.len()));
        }
        w.put_u8(self.markers.len() as u8);
        for (name, minor) in &self.markers {
            if name.len() > u8::MAX as usize {
                return Err(SaveError::FeatureNameTooLong(name.clone()));
            }
            w.put_u8(name.len() as u8);
            w.put_bytes(name.as_bytes());
            w.put_u16(*minor);
        }
        Ok(())
    }

    /// Read the header feature block. Minor version 0 is reserved and
    /// treated as corrupt input.
    pub fn read(r: &mut Reader<'_>) -> Result<Self, LoadError> {
        let count = r.get_u8()?;
        let mut features = Self::new();
        for _ in 0..count {
            let len = r.get_u8()? as usize;
            let bytes = r.get_bytes(len)?;
            let name =
                String::from_utf8(bytes.to_vec()).map_err(|_| LoadError::InvalidUtf8)?;
            let minor = r.get_u16()?;
            if minor == 0 {
                return Err(LoadError::ReservedFeatureVersion(name));
            }
            features.declare(&name, minor);
        }
        Ok(features)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

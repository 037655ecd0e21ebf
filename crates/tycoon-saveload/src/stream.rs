//! Byte-stream primitives for the savegame wire format.
//!
//! All multi-byte integers are big-endian and fixed-width. The `Writer`
//! owns a growable buffer; the `Reader` is a bounds-checked cursor over a
//! borrowed slice that reports truncation as an error instead of panicking.

use std::fmt;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number at the start of every savegame stream ("TSAV").
pub const SAVE_MAGIC: u32 = 0x5453_4156;

/// Current savegame format version. Increment when the wire format changes.
pub const SAVEGAME_VERSION: u16 = 12;

/// Oldest format version this build can still read.
pub const MIN_SAVEGAME_VERSION: u16 = 1;

/// Reserved array index marking the end of an array or sparse-array chunk.
pub const TERMINATOR_INDEX: u32 = u32::MAX;

// ---------------------------------------------------------------------------
// Chunk tags
// ---------------------------------------------------------------------------

/// Four-byte chunk identifier, unique across the format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(pub [u8; 4]);

impl Tag {
    /// The all-zero tag terminating the chunk sequence.
    pub const END: Tag = Tag([0; 4]);

    pub const fn new(bytes: [u8; 4]) -> Self {
        Tag(bytes)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{b:02X}")?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur while writing a savegame stream.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("string field too long: {0} bytes (limit 65535)")]
    StringTooLong(usize),
    #[error("field label too long: {0}")]
    LabelTooLong(String),
    #[error("feature marker name too long: {0}")]
    FeatureNameTooLong(String),
    #[error("too many feature markers: {0} (limit 255)")]
    TooManyFeatures(usize),
    #[error("list field has too many elements: {0}")]
    ListTooLong(usize),
}

/// Corrupt-input errors. Every variant is fatal: the load aborts and the
/// partially constructed world is discarded wholesale.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("unexpected end of stream at byte {offset}: needed {needed} more byte(s)")]
    UnexpectedEof { offset: usize, needed: usize },
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SAVE_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("savegame from future version {} (this build reads up to {})", .0, SAVEGAME_VERSION)]
    FutureVersion(u16),
    #[error("savegame version {} is older than the minimum readable version {}", .0, MIN_SAVEGAME_VERSION)]
    AncientVersion(u16),
    #[error("unknown chunk tag {0}")]
    UnknownChunk(Tag),
    #[error("chunk {chunk}: unknown container kind {kind}")]
    UnknownContainerKind { chunk: Tag, kind: u8 },
    #[error("chunk {chunk}: stored with unexpected container kind")]
    UnexpectedContainerKind { chunk: Tag },
    #[error("unknown field type code {0}")]
    UnknownTypeCode(u8),
    #[error("chunk {chunk}: dense array index {got}, expected {expected}")]
    DenseIndexOutOfOrder { chunk: Tag, expected: u32, got: u32 },
    #[error("chunk {chunk}: sparse array index {got} does not increase past {prev}")]
    SparseIndexOutOfOrder { chunk: Tag, prev: u32, got: u32 },
    #[error("chunk {chunk}: record {index} has {leftover} unconsumed byte(s)")]
    TrailingBytes { chunk: Tag, index: u32, leftover: usize },
    #[error("chunk {chunk}: blob length {got} does not match expected {expected}")]
    BlobLength { chunk: Tag, expected: usize, got: usize },
    #[error("invalid reference into {pool} pool: index {index}")]
    InvalidReference { pool: &'static str, index: u32 },
    #[error("field {field} has no descriptor applicable at version {version}")]
    NoApplicableDescriptor { field: String, version: u16 },
    #[error("field {field}: stream type incompatible with the compiled table")]
    SchemaMismatch { field: String },
    #[error("list count {count} exceeds the {remaining} byte(s) left in the record")]
    ListCount { count: u32, remaining: usize },
    #[error("feature marker {0:?} declares reserved minor version 0")]
    ReservedFeatureVersion(String),
    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Append-only big-endian byte sink.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn put_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn put_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_i8(&mut self, v: i8) {
        self.put_u8(v as u8);
    }

    pub fn put_i16(&mut self, v: i16) {
        self.put_u16(v as u16);
    }

    pub fn put_i32(&mut self, v: i32) {
        self.put_u32(v as u32);
    }

    pub fn put_i64(&mut self, v: i64) {
        self.put_u64(v as u64);
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn put_tag(&mut self, tag: Tag) {
        self.buf.extend_from_slice(&tag.0);
    }

    /// Write a length-prefixed UTF-8 string (u16 length).
    pub fn put_str(&mut self, s: &str) -> Result<(), SaveError> {
        if s.len() > u16::MAX as usize {
            return Err(SaveError::StringTooLong(s.len()));
        }
        self.put_u16(s.len() as u16);
        self.put_bytes(s.as_bytes());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Bounds-checked big-endian cursor over a byte slice.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], LoadError> {
        if self.remaining() < n {
            return Err(LoadError::UnexpectedEof {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn skip(&mut self, n: usize) -> Result<(), LoadError> {
        self.take(n).map(|_| ())
    }

    /// Split off a sub-reader covering the next `n` bytes.
    pub fn sub_reader(&mut self, n: usize) -> Result<Reader<'a>, LoadError> {
        Ok(Reader::new(self.take(n)?))
    }

    /// Read the next `n` raw bytes.
    pub fn get_bytes(&mut self, n: usize) -> Result<&'a [u8], LoadError> {
        self.take(n)
    }

    pub fn get_u8(&mut self) -> Result<u8, LoadError> {
        Ok(self.take(1)?[0])
    }

    pub fn get_u16(&mut self) -> Result<u16, LoadError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn get_u32(&mut self) -> Result<u32, LoadError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn get_u64(&mut self) -> Result<u64, LoadError> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn get_i8(&mut self) -> Result<i8, LoadError> {
        Ok(self.get_u8()? as i8)
    }

    pub fn get_i16(&mut self) -> Result<i16, LoadError> {
        Ok(self.get_u16()? as i16)
    }

    pub fn get_i32(&mut self) -> Result<i32, LoadError> {
        Ok(self.get_u32()? as i32)
    }

    pub fn get_i64(&mut self) -> Result<i64, LoadError> {
        Ok(self.get_u64()? as i64)
    }

    pub fn get_tag(&mut self) -> Result<Tag, LoadError> {
        let b = self.take(4)?;
        Ok(Tag([b[0], b[1], b[2], b[3]]))
    }

    /// Read a length-prefixed UTF-8 string (u16 length).
    pub fn get_str(&mut self) -> Result<String, LoadError> {
        let len = self.get_u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| LoadError::InvalidUtf8)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

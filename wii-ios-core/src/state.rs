//! Save-state codec.
//!
//! Every stateful subsystem writes itself field by field into a
//! [`StateWriter`] and reads back in the same order from a [`StateReader`].
//! Values are little-endian; variable-length data is prefixed with a `u32`
//! length.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use thiserror::Error;

/// Errors raised while restoring a save-state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("save-state truncated while reading {0}")]
    Truncated(&'static str),

    #[error("invalid save-state value for {field}: {value}")]
    InvalidValue { field: &'static str, value: u64 },
}

impl StateError {
    pub fn invalid(field: &'static str, value: impl Into<u64>) -> Self {
        Self::InvalidValue {
            field,
            value: value.into(),
        }
    }
}

#[derive(Debug, Default)]
pub struct StateWriter {
    buf: Vec<u8>,
}

impl StateWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    // Writes into a Vec cannot fail, so the io::Result is discarded.

    pub fn write_u8(&mut self, v: u8) {
        let _ = self.buf.write_u8(v);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.write_u8(v as u8);
    }

    pub fn write_u16(&mut self, v: u16) {
        let _ = self.buf.write_u16::<LittleEndian>(v);
    }

    pub fn write_u32(&mut self, v: u32) {
        let _ = self.buf.write_u32::<LittleEndian>(v);
    }

    pub fn write_i32(&mut self, v: i32) {
        let _ = self.buf.write_i32::<LittleEndian>(v);
    }

    pub fn write_u64(&mut self, v: u64) {
        let _ = self.buf.write_u64::<LittleEndian>(v);
    }

    pub fn write_i64(&mut self, v: i64) {
        let _ = self.buf.write_i64::<LittleEndian>(v);
    }

    /// Fixed-size raw bytes, no length prefix.
    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_u32(bytes.len() as u32);
        self.write_raw(bytes);
    }

    pub fn write_str(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }
}

pub struct StateReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> StateReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(bytes),
        }
    }

    pub fn remaining(&self) -> usize {
        let len = self.cursor.get_ref().len();
        len.saturating_sub(self.cursor.position() as usize)
    }

    pub fn read_u8(&mut self, field: &'static str) -> Result<u8, StateError> {
        self.cursor
            .read_u8()
            .map_err(|_| StateError::Truncated(field))
    }

    pub fn read_bool(&mut self, field: &'static str) -> Result<bool, StateError> {
        match self.read_u8(field)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(StateError::invalid(field, other)),
        }
    }

    pub fn read_u16(&mut self, field: &'static str) -> Result<u16, StateError> {
        self.cursor
            .read_u16::<LittleEndian>()
            .map_err(|_| StateError::Truncated(field))
    }

    pub fn read_u32(&mut self, field: &'static str) -> Result<u32, StateError> {
        self.cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| StateError::Truncated(field))
    }

    pub fn read_i32(&mut self, field: &'static str) -> Result<i32, StateError> {
        self.cursor
            .read_i32::<LittleEndian>()
            .map_err(|_| StateError::Truncated(field))
    }

    pub fn read_u64(&mut self, field: &'static str) -> Result<u64, StateError> {
        self.cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| StateError::Truncated(field))
    }

    pub fn read_i64(&mut self, field: &'static str) -> Result<i64, StateError> {
        self.cursor
            .read_i64::<LittleEndian>()
            .map_err(|_| StateError::Truncated(field))
    }

    pub fn read_raw(&mut self, out: &mut [u8], field: &'static str) -> Result<(), StateError> {
        std::io::Read::read_exact(&mut self.cursor, out).map_err(|_| StateError::Truncated(field))
    }

    pub fn read_bytes(&mut self, field: &'static str) -> Result<Vec<u8>, StateError> {
        let len = self.read_u32(field)? as usize;
        if len > self.remaining() {
            return Err(StateError::Truncated(field));
        }
        let mut out = vec![0; len];
        self.read_raw(&mut out, field)?;
        Ok(out)
    }

    pub fn read_string(&mut self, field: &'static str) -> Result<String, StateError> {
        let bytes = self.read_bytes(field)?;
        String::from_utf8(bytes).map_err(|_| StateError::invalid(field, 0u64))
    }
}

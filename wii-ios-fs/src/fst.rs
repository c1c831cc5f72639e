//! In-memory FST tree and its `fst.bin` serialization.
//!
//! `fst.bin` is a pre-order list of 0x20-byte big-endian records:
//!
//! | off | size | field        |
//! |-----|------|--------------|
//! | 0x0 | 12   | name         |
//! | 0xC | 4    | uid          |
//! | 0x10| 2    | gid          |
//! | 0x12| 1    | is_file      |
//! | 0x13| 3    | modes        |
//! | 0x16| 1    | attribute    |
//! | 0x17| 1    | padding      |
//! | 0x18| 4    | x3 (unused)  |
//! | 0x1C| 4    | child count  |

use std::io::{self, Cursor, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::types::{Gid, MAX_FILENAME_LENGTH, MAX_PATH_DEPTH, Metadata, Mode, Modes, Uid};

pub const SERIALIZED_ENTRY_SIZE: usize = 0x20;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FstEntry {
    pub name: String,
    pub data: Metadata,
    /// Creation order; new entries are appended.
    pub children: Vec<FstEntry>,
}

impl FstEntry {
    pub fn root() -> Self {
        Self {
            name: "/".to_string(),
            data: Metadata {
                modes: Modes::new(Mode::ReadWrite, Mode::ReadWrite, Mode::Read),
                ..Metadata::default()
            },
            children: Vec::new(),
        }
    }

    /// uid 0 may do anything; everyone else gets the owner, group or other
    /// mode depending on which identity matches first.
    pub fn check_permission(&self, uid: Uid, gid: Gid, requested: Mode) -> bool {
        if uid == 0 {
            return true;
        }
        let granted = if self.data.uid == uid {
            self.data.modes.owner
        } else if self.data.gid == gid {
            self.data.modes.group
        } else {
            self.data.modes.other
        };
        granted.allows(requested)
    }

    pub fn child_index(&self, name: &str) -> Option<usize> {
        self.children.iter().position(|c| c.name == name)
    }

    /// Number of entries below this one, recursively.
    pub fn descendant_count(&self) -> usize {
        self.children
            .iter()
            .map(|c| 1 + c.descendant_count())
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Serialization
// ---------------------------------------------------------------------------

fn write_entry(out: &mut Vec<u8>, entry: &FstEntry) -> io::Result<()> {
    let mut name = [0u8; MAX_FILENAME_LENGTH];
    let n = entry.name.len().min(MAX_FILENAME_LENGTH);
    name[..n].copy_from_slice(&entry.name.as_bytes()[..n]);
    out.write_all(&name)?;
    out.write_u32::<BigEndian>(entry.data.uid)?;
    out.write_u16::<BigEndian>(entry.data.gid)?;
    out.write_u8(entry.data.is_file as u8)?;
    out.write_u8(entry.data.modes.owner as u8)?;
    out.write_u8(entry.data.modes.group as u8)?;
    out.write_u8(entry.data.modes.other as u8)?;
    out.write_u8(entry.data.attribute)?;
    out.write_u8(0)?;
    out.write_u32::<BigEndian>(0)?;
    out.write_u32::<BigEndian>(entry.children.len() as u32)?;
    for child in &entry.children {
        write_entry(out, child)?;
    }
    Ok(())
}

pub fn serialize(root: &FstEntry) -> Vec<u8> {
    let mut out = Vec::with_capacity((root.descendant_count() + 1) * SERIALIZED_ENTRY_SIZE);
    // Writes into a Vec cannot fail.
    let _ = write_entry(&mut out, root);
    out
}

fn read_entry(cursor: &mut Cursor<&[u8]>, depth: usize) -> Option<FstEntry> {
    if depth > MAX_PATH_DEPTH {
        return None;
    }
    let mut name = [0u8; MAX_FILENAME_LENGTH];
    cursor.read_exact(&mut name).ok()?;
    let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
    let uid = cursor.read_u32::<BigEndian>().ok()?;
    let gid = cursor.read_u16::<BigEndian>().ok()?;
    let is_file = cursor.read_u8().ok()? != 0;
    let owner = Mode::from_u8(cursor.read_u8().ok()?);
    let group = Mode::from_u8(cursor.read_u8().ok()?);
    let other = Mode::from_u8(cursor.read_u8().ok()?);
    let attribute = cursor.read_u8().ok()?;
    let _padding = cursor.read_u8().ok()?;
    let _x3 = cursor.read_u32::<BigEndian>().ok()?;
    let num_children = cursor.read_u32::<BigEndian>().ok()?;

    let mut entry = FstEntry {
        name: String::from_utf8_lossy(&name[..end]).into_owned(),
        data: Metadata {
            uid,
            gid,
            attribute,
            modes: Modes::new(owner, group, other),
            is_file,
            ..Metadata::default()
        },
        children: Vec::new(),
    };
    for _ in 0..num_children {
        entry.children.push(read_entry(cursor, depth + 1)?);
    }
    Some(entry)
}

/// Parse a serialized FST. `None` if the data is truncated or nested
/// deeper than a Wii path can be.
pub fn deserialize(bytes: &[u8]) -> Option<FstEntry> {
    let mut cursor = Cursor::new(bytes);
    read_entry(&mut cursor, 0)
}

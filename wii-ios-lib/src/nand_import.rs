//! BootMii `nand.bin` importer.
//!
//! A raw dump stores 0x800-byte pages each followed by 0x40 bytes of
//! spare/ECC data. The last 16 blocks of the logical image hold SFFS
//! superblocks; the newest one describes the FAT and FST. File clusters are
//! AES-128-CBC encrypted with the console's NAND key.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use wii_ios_core::util::{read_ascii, read_u16_be, read_u32_be};
use wii_ios_crypto::BootMiiKeys;
use wii_ios_crypto::aes;
use wii_ios_crypto::keys::KEYS_BIN_SIZE;
use wii_ios_fs::{FsError, HostFileSystem, Mode, Modes};

use crate::error::ImportError;
use crate::settings::keys_path;

pub const NAND_BIN_SIZE: u64 = 0x2100_0000;
pub const NAND_BIN_WITH_KEYS_SIZE: u64 = NAND_BIN_SIZE + KEYS_BIN_SIZE as u64;

const PAGE_SIZE: u64 = 0x800;
const SPARE_SIZE: u64 = 0x40;
const RAW_PAGE_SIZE: u64 = PAGE_SIZE + SPARE_SIZE;

const CLUSTER_SIZE: usize = 0x4000;
const CLUSTER_COUNT: usize = 0x8000;

const SUPERBLOCK_START: u64 = 0x1FC0_0000;
const SUPERBLOCK_END: u64 = 0x2000_0000;
const SUPERBLOCK_STRIDE: u64 = 0x4_0000;
const SUPERBLOCK_MAGIC: &[u8; 4] = b"SFFS";

const FAT_OFFSET: usize = 0xC;
const FST_OFFSET: usize = FAT_OFFSET + CLUSTER_COUNT * 2;
const FST_ENTRY_SIZE: usize = 0x20;
const FST_ENTRY_COUNT: usize = 0x17FF;
const SUPERBLOCK_SIZE: usize = FST_OFFSET + FST_ENTRY_COUNT * FST_ENTRY_SIZE;

/// FAT values at or above this end a cluster chain.
const FAT_CHAIN_END: u16 = 0xFFF0;
const NO_ENTRY: u16 = 0xFFFF;

/// A reader that implements both Read and Seek.
pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Receives import progress updates.
pub trait ImportProgress {
    /// Called when a phase starts (e.g. "Locating superblock").
    fn on_phase(&self, message: &str);

    /// Called after each file or directory is written.
    fn on_entry(&self, count: usize, path: &str);

    fn on_complete(&self, summary: &ImportSummary);
}

/// Discards all updates.
pub struct SilentProgress;

impl ImportProgress for SilentProgress {
    fn on_phase(&self, _message: &str) {}
    fn on_entry(&self, _count: usize, _path: &str) {}
    fn on_complete(&self, _summary: &ImportSummary) {}
}

/// Logs through the `log` crate.
pub struct LogProgress;

impl ImportProgress for LogProgress {
    fn on_phase(&self, message: &str) {
        log::info!("{message}");
    }

    fn on_entry(&self, count: usize, path: &str) {
        if count.is_multiple_of(100) {
            log::info!("  [{count}] {path}");
        } else {
            log::debug!("  [{count}] {path}");
        }
    }

    fn on_complete(&self, summary: &ImportSummary) {
        log::info!(
            "Imported {} files and {} directories ({} bytes)",
            summary.files,
            summary.directories,
            summary.bytes
        );
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
    pub superblock_generation: u32,
}

// ---------------------------------------------------------------------------
// Dump access
// ---------------------------------------------------------------------------

/// Logical (spare-stripped) view of a raw dump.
struct NandDump<'r> {
    reader: &'r mut dyn ReadSeek,
}

impl NandDump<'_> {
    fn read_logical(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let mut done = 0;
        while done < buf.len() {
            let logical = offset + done as u64;
            let within = logical % PAGE_SIZE;
            let physical = (logical / PAGE_SIZE) * RAW_PAGE_SIZE + within;
            let chunk = (buf.len() - done).min((PAGE_SIZE - within) as usize);
            self.reader.seek(SeekFrom::Start(physical))?;
            self.reader.read_exact(&mut buf[done..done + chunk])?;
            done += chunk;
        }
        Ok(())
    }

    fn read_keys(&mut self) -> Result<BootMiiKeys, ImportError> {
        let mut buf = vec![0u8; KEYS_BIN_SIZE];
        self.reader.seek(SeekFrom::Start(NAND_BIN_SIZE))?;
        self.reader.read_exact(&mut buf)?;
        Ok(BootMiiKeys::parse(&buf)?)
    }

    /// The valid superblock with the highest generation number.
    fn find_superblock(&mut self) -> Result<Superblock, ImportError> {
        let mut best: Option<(u64, u32)> = None;
        let mut header = [0u8; 8];
        let mut offset = SUPERBLOCK_START;
        while offset < SUPERBLOCK_END {
            self.read_logical(offset, &mut header)?;
            if &header[..4] == SUPERBLOCK_MAGIC {
                let generation = read_u32_be(&header, 4);
                log::debug!("Superblock at {offset:#x}, generation {generation}");
                if best.is_none_or(|(_, g)| generation > g) {
                    best = Some((offset, generation));
                }
            }
            offset += SUPERBLOCK_STRIDE;
        }

        let (offset, generation) = best.ok_or(ImportError::NoSuperblock)?;
        let mut data = vec![0u8; SUPERBLOCK_SIZE];
        self.read_logical(offset, &mut data)?;
        log::info!("Using superblock generation {generation} at {offset:#x}");
        Ok(Superblock { data, generation })
    }

    fn read_cluster(&mut self, cluster: u16, key: &[u8; 16]) -> Result<Vec<u8>, ImportError> {
        let mut raw = vec![0u8; CLUSTER_SIZE];
        self.read_logical(u64::from(cluster) * CLUSTER_SIZE as u64, &mut raw)?;
        let mut iv = [0u8; 16];
        Ok(aes::cbc_decrypt(key, &mut iv, &raw))
    }
}

struct Superblock {
    data: Vec<u8>,
    generation: u32,
}

impl Superblock {
    fn fat(&self, cluster: u16) -> u16 {
        read_u16_be(&self.data, FAT_OFFSET + usize::from(cluster) * 2)
    }

    fn entry(&self, index: u16) -> Result<FstEntry, ImportError> {
        let index = usize::from(index);
        if index >= FST_ENTRY_COUNT {
            return Err(ImportError::corrupted(format!(
                "FST index {index:#x} out of range"
            )));
        }
        let off = FST_OFFSET + index * FST_ENTRY_SIZE;
        Ok(FstEntry::parse(&self.data[off..off + FST_ENTRY_SIZE]))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FstEntry {
    name: String,
    mode: u8,
    attribute: u8,
    sub: u16,
    sib: u16,
    size: u32,
    uid: u32,
    gid: u16,
}

impl FstEntry {
    fn parse(raw: &[u8]) -> Self {
        Self {
            name: read_ascii(&raw[..12]),
            mode: raw[0x0C],
            attribute: raw[0x0D],
            sub: read_u16_be(raw, 0x0E),
            sib: read_u16_be(raw, 0x10),
            size: read_u32_be(raw, 0x12),
            uid: read_u32_be(raw, 0x16),
            gid: read_u16_be(raw, 0x1A),
        }
    }

    fn is_file(&self) -> bool {
        self.mode & 3 == 1
    }

    fn is_directory(&self) -> bool {
        self.mode & 3 == 2
    }

    /// Owner, group and other permissions sit in the upper six bits.
    fn modes(&self) -> Modes {
        Modes::new(
            Mode::from_u8(self.mode >> 6),
            Mode::from_u8(self.mode >> 4),
            Mode::from_u8(self.mode >> 2),
        )
    }
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

/// Import the dump at `path` into `fs`, replacing its contents.
///
/// Keys appended to the dump take precedence over `fallback_keys`.
pub fn import_nand_bin(
    path: &Path,
    fs: &mut HostFileSystem,
    fallback_keys: Option<&BootMiiKeys>,
    progress: &dyn ImportProgress,
) -> Result<ImportSummary, ImportError> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    import_nand(&mut file, size, fs, fallback_keys, progress)
}

pub fn import_nand(
    reader: &mut dyn ReadSeek,
    size: u64,
    fs: &mut HostFileSystem,
    fallback_keys: Option<&BootMiiKeys>,
    progress: &dyn ImportProgress,
) -> Result<ImportSummary, ImportError> {
    if size != NAND_BIN_SIZE && size != NAND_BIN_WITH_KEYS_SIZE {
        return Err(ImportError::BadSize(size));
    }
    let mut dump = NandDump { reader };

    let keys = if size == NAND_BIN_WITH_KEYS_SIZE {
        dump.read_keys()?
    } else {
        fallback_keys.cloned().ok_or(ImportError::MissingKeys)?
    };

    progress.on_phase("Locating superblock");
    let superblock = dump.find_superblock()?;

    progress.on_phase("Extracting files");
    fs.format(0).map_err(|source| ImportError::Fs {
        path: "/".to_string(),
        source,
    })?;
    let mut importer = Importer {
        dump,
        superblock: &superblock,
        fs: &mut *fs,
        key: keys.nand_key,
        progress,
        visited: HashSet::new(),
        summary: ImportSummary {
            superblock_generation: superblock.generation,
            ..ImportSummary::default()
        },
    };
    importer.run()?;
    let summary = importer.summary;

    let keys_file = keys_path(fs.root_path());
    std::fs::write(&keys_file, keys.to_bytes())?;
    log::info!("Wrote {}", keys_file.display());

    progress.on_complete(&summary);
    Ok(summary)
}

struct Importer<'a, 'r> {
    dump: NandDump<'r>,
    superblock: &'a Superblock,
    fs: &'a mut HostFileSystem,
    key: [u8; 16],
    progress: &'a dyn ImportProgress,
    visited: HashSet<u16>,
    summary: ImportSummary,
}

impl Importer<'_, '_> {
    fn run(&mut self) -> Result<(), ImportError> {
        let root = self.superblock.entry(0)?;
        if !root.is_directory() {
            return Err(ImportError::corrupted("FST root is not a directory"));
        }
        self.visited.insert(0);

        // Pending (first entry of a sibling list, parent path) pairs.
        let mut pending = vec![(root.sub, String::new())];
        while let Some((first, parent)) = pending.pop() {
            let mut index = first;
            while index != NO_ENTRY {
                if !self.visited.insert(index) {
                    return Err(ImportError::corrupted(format!(
                        "FST entry {index:#x} is linked twice"
                    )));
                }
                let entry = self.superblock.entry(index)?;
                let path = format!("{parent}/{}", entry.name);
                if entry.is_directory() {
                    self.import_directory(&path, &entry)?;
                    if entry.sub != NO_ENTRY {
                        pending.push((entry.sub, path));
                    }
                } else if entry.is_file() {
                    self.import_file(&path, &entry)?;
                } else {
                    log::warn!("Skipping {path}: unknown entry type {:#x}", entry.mode & 3);
                }
                index = entry.sib;
            }
        }
        Ok(())
    }

    fn import_directory(&mut self, path: &str, entry: &FstEntry) -> Result<(), ImportError> {
        let fs_err = |source: FsError| ImportError::Fs {
            path: path.to_string(),
            source,
        };
        self.fs
            .create_directory(0, 0, path, entry.attribute, entry.modes())
            .map_err(fs_err)?;
        self.fs
            .set_metadata(0, path, entry.uid, entry.gid, entry.attribute, entry.modes())
            .map_err(fs_err)?;
        self.summary.directories += 1;
        self.progress
            .on_entry(self.summary.files + self.summary.directories, path);
        Ok(())
    }

    fn import_file(&mut self, path: &str, entry: &FstEntry) -> Result<(), ImportError> {
        let data = self.read_file_data(path, entry)?;
        let fs_err = |source: FsError| ImportError::Fs {
            path: path.to_string(),
            source,
        };
        self.fs
            .create_file(0, 0, path, entry.attribute, entry.modes())
            .map_err(fs_err)?;
        // Ownership can only move while the file is still empty.
        self.fs
            .set_metadata(0, path, entry.uid, entry.gid, entry.attribute, entry.modes())
            .map_err(fs_err)?;
        if !data.is_empty() {
            let fd = self.fs.open_file(0, 0, path, Mode::Write).map_err(fs_err)?;
            let written = self.fs.write_bytes_to_file(fd, &data);
            let closed = self.fs.close(fd);
            written.and(closed).map_err(fs_err)?;
        }

        self.summary.files += 1;
        self.summary.bytes += data.len() as u64;
        self.progress
            .on_entry(self.summary.files + self.summary.directories, path);
        Ok(())
    }

    fn read_file_data(&mut self, path: &str, entry: &FstEntry) -> Result<Vec<u8>, ImportError> {
        let size = entry.size as usize;
        let max_clusters = size.div_ceil(CLUSTER_SIZE);
        let mut data = Vec::with_capacity(max_clusters * CLUSTER_SIZE);
        let mut cluster = entry.sub;
        while cluster < FAT_CHAIN_END && data.len() < size {
            if usize::from(cluster) >= CLUSTER_COUNT {
                return Err(ImportError::corrupted(format!(
                    "{path}: cluster {cluster:#x} out of range"
                )));
            }
            data.extend(self.dump.read_cluster(cluster, &self.key)?);
            cluster = self.superblock.fat(cluster);
        }
        if data.len() < size {
            return Err(ImportError::corrupted(format!(
                "{path}: cluster chain ends after {} of {size} bytes",
                data.len()
            )));
        }
        data.truncate(size);
        Ok(data)
    }
}

#[cfg(test)]
#[path = "tests/nand_import_tests.rs"]
mod tests;

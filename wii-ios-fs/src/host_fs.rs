//! IOS FS implemented on top of a host directory.
//!
//! The host filesystem decides whether a file exists and holds its bytes.
//! Everything else (owner, group, modes, attribute, creation order) lives in
//! the FST, which is persisted to `sys/fst.bin` after every metadata change.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use wii_ios_core::{StateError, StateReader, StateWriter, Stateful};

use crate::fst::{self, FstEntry};
use crate::path::{
    escape_path, is_printable, is_valid_non_root_path, is_valid_path, split_path_and_basename,
    unescape_file_name,
};
use crate::types::{
    CLUSTER_SIZE, DirectoryStats, Fd, FileAttribute, FileStatus, FsError, Gid, MAX_HANDLES,
    MAX_PATH_DEPTH, Metadata, Mode, Modes, NandStats, SeekMode, Uid,
};

const NAND_STATS: NandStats = NandStats {
    cluster_size: CLUSTER_SIZE,
    free_clusters: 0x5DEC,
    used_clusters: 0x1DD4,
    bad_clusters: 0x10,
    reserved_clusters: 0x02F0,
    free_inodes: 0x146B,
    used_inodes: 0x0394,
};

const TOTAL_CLUSTERS: u32 = NAND_STATS.free_clusters + NAND_STATS.used_clusters;
const TOTAL_INODES: u32 = NAND_STATS.free_inodes + NAND_STATS.used_inodes;

const VIVIFIED_MODES: Modes = Modes::new(Mode::ReadWrite, Mode::ReadWrite, Mode::ReadWrite);

// ---------------------------------------------------------------------------
// Open retry hook
// ---------------------------------------------------------------------------

/// Asked whether a failed host open should be attempted again. A frontend
/// can show a dialog here; the library default gives up immediately.
pub trait OpenRetryPrompt {
    fn should_retry(&self, path: &Path, error: &io::Error) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoRetry;

impl OpenRetryPrompt for NoRetry {
    fn should_retry(&self, path: &Path, error: &io::Error) -> bool {
        log::error!("Could not open {}: {}", path.display(), error);
        false
    }
}

// ---------------------------------------------------------------------------
// Shared host files
// ---------------------------------------------------------------------------

type HostFileMap = RefCell<HashMap<PathBuf, Weak<HostFile>>>;

/// A host file shared by every handle that opened the same path. It removes
/// itself from the cache when the last handle lets go of it.
#[derive(Debug)]
struct HostFile {
    file: File,
    path: PathBuf,
    registry: Weak<HostFileMap>,
}

impl HostFile {
    fn size(&self) -> u32 {
        self.file
            .metadata()
            .map(|m| u32::try_from(m.len()).unwrap_or(u32::MAX))
            .unwrap_or(0)
    }
}

impl Drop for HostFile {
    fn drop(&mut self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        let Ok(mut map) = registry.try_borrow_mut() else {
            return;
        };
        if map.get(&self.path).is_some_and(|w| w.strong_count() == 0) {
            map.remove(&self.path);
        }
    }
}

#[derive(Debug, Default)]
struct Handle {
    opened: bool,
    mode: Mode,
    uid: Uid,
    gid: Gid,
    wii_path: String,
    host_file: Option<Rc<HostFile>>,
    file_offset: u32,
}

// ---------------------------------------------------------------------------
// FST lookup
// ---------------------------------------------------------------------------

fn host_path_for(root: &Path, wii_path: &str) -> PathBuf {
    let escaped = escape_path(wii_path);
    root.join(escaped.trim_start_matches('/'))
}

/// Walk the FST to `path`, creating entries for anything that exists on the
/// host but has no FST record yet. `None` if the host path does not exist.
fn fst_entry_for_path<'a>(
    root_entry: &'a mut FstEntry,
    root: &Path,
    path: &str,
) -> Option<&'a mut FstEntry> {
    if path == "/" {
        return Some(root_entry);
    }
    if !is_valid_non_root_path(path) {
        return None;
    }
    let host_path = host_path_for(root, path);
    let host_info = fs::metadata(&host_path).ok()?;

    let mut entry = root_entry;
    for component in path[1..].split('/') {
        let index = match entry.child_index(component) {
            Some(index) => index,
            None => {
                log::info!("Creating FST entry for {} under {}", component, entry.name);
                entry.children.push(FstEntry {
                    name: component.to_string(),
                    data: Metadata {
                        modes: VIVIFIED_MODES,
                        ..Metadata::default()
                    },
                    children: Vec::new(),
                });
                entry.children.len() - 1
            }
        };
        entry = &mut entry.children[index];
    }

    entry.data.is_file = host_info.is_file();
    if entry.data.is_file {
        entry.children.clear();
    }
    Some(entry)
}

fn count_tree(dir: &Path) -> io::Result<(u32, u64)> {
    let mut entries = 0u32;
    let mut size = 0u64;
    for child in fs::read_dir(dir)? {
        let child = child?;
        let info = child.metadata()?;
        entries = entries.saturating_add(1);
        if info.is_dir() {
            let (sub_entries, sub_size) = count_tree(&child.path())?;
            entries = entries.saturating_add(sub_entries);
            size += sub_size;
        } else {
            size += info.len();
        }
    }
    Ok((entries, size))
}

// ---------------------------------------------------------------------------
// HostFileSystem
// ---------------------------------------------------------------------------

pub struct HostFileSystem {
    root_path: PathBuf,
    root_entry: FstEntry,
    handles: Vec<Handle>,
    open_files: Rc<HostFileMap>,
    retry_prompt: Box<dyn OpenRetryPrompt>,
}

impl HostFileSystem {
    /// Use `root` as the NAND root, creating it if needed, and load its FST.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root_path = root.into();
        if let Err(e) = fs::create_dir_all(&root_path) {
            log::error!("Failed to create NAND root {}: {}", root_path.display(), e);
        }
        let mut fs = Self {
            root_path,
            root_entry: FstEntry::root(),
            handles: (0..MAX_HANDLES).map(|_| Handle::default()).collect(),
            open_files: Rc::new(RefCell::new(HashMap::new())),
            retry_prompt: Box::new(NoRetry),
        };
        fs.load_fst();
        fs
    }

    pub fn set_retry_prompt(&mut self, prompt: Box<dyn OpenRetryPrompt>) {
        self.retry_prompt = prompt;
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Host location of a Wii path.
    pub fn host_path(&self, wii_path: &str) -> PathBuf {
        host_path_for(&self.root_path, wii_path)
    }

    fn fst_path(&self) -> PathBuf {
        self.root_path.join("sys").join("fst.bin")
    }

    fn load_fst(&mut self) {
        let path = self.fst_path();
        let Ok(bytes) = fs::read(&path) else {
            // A fresh NAND has no FST yet.
            return;
        };
        match fst::deserialize(&bytes) {
            Some(root) => self.root_entry = root,
            None => log::error!(
                "Failed to parse {}: at least one entry is invalid",
                path.display()
            ),
        }
    }

    fn save_fst(&self) {
        let path = self.fst_path();
        let tmp = path.with_extension("bin.tmp");
        let result = path
            .parent()
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|_| fs::write(&tmp, fst::serialize(&self.root_entry)))
            .and_then(|_| fs::rename(&tmp, &path));
        if let Err(e) = result {
            log::error!("Failed to save FST to {}: {}", path.display(), e);
        }
    }

    fn entry(&mut self, path: &str) -> Option<&mut FstEntry> {
        fst_entry_for_path(&mut self.root_entry, &self.root_path, path)
    }

    fn is_file_opened(&self, path: &str) -> bool {
        self.handles.iter().any(|h| h.opened && h.wii_path == path)
    }

    fn is_directory_in_use(&self, path: &str) -> bool {
        self.handles
            .iter()
            .any(|h| h.opened && h.wii_path.starts_with(path))
    }

    /// Wipe the NAND and start over with an empty FST. All handles are
    /// closed.
    pub fn format(&mut self, uid: Uid) -> Result<(), FsError> {
        if uid != 0 {
            return Err(FsError::AccessDenied);
        }
        if self.root_path.exists() {
            fs::remove_dir_all(&self.root_path).map_err(|e| {
                log::error!("Failed to delete {}: {}", self.root_path.display(), e);
                FsError::UnknownError
            })?;
        }
        fs::create_dir_all(&self.root_path).map_err(|_| FsError::UnknownError)?;
        self.root_entry = FstEntry::root();
        self.save_fst();
        self.handles.iter_mut().for_each(|h| *h = Handle::default());
        Ok(())
    }

    fn create_file_or_directory(
        &mut self,
        uid: Uid,
        gid: Gid,
        path: &str,
        attribute: FileAttribute,
        modes: Modes,
        is_file: bool,
    ) -> Result<(), FsError> {
        if !is_valid_non_root_path(path) || !is_printable(path) {
            return Err(FsError::Invalid);
        }
        if !is_file && path.matches('/').count() > MAX_PATH_DEPTH {
            return Err(FsError::TooManyPathComponents);
        }

        let split = split_path_and_basename(path);
        let parent = self.entry(split.parent).ok_or(FsError::NotFound)?;
        if !parent.check_permission(uid, gid, Mode::Write) {
            return Err(FsError::AccessDenied);
        }

        let host_path = self.host_path(path);
        if host_path.exists() {
            return Err(FsError::AlreadyExists);
        }
        let created = if is_file {
            File::create(&host_path).map(|_| ())
        } else {
            fs::create_dir(&host_path)
        };
        if let Err(e) = created {
            log::error!("Failed to create {}: {}", host_path.display(), e);
            return Err(FsError::UnknownError);
        }

        let entry = self.entry(path).ok_or(FsError::UnknownError)?;
        entry.name = split.file_name.to_string();
        entry.data = Metadata {
            uid,
            gid,
            attribute,
            modes,
            is_file,
            ..Metadata::default()
        };
        self.save_fst();
        Ok(())
    }

    pub fn create_file(
        &mut self,
        uid: Uid,
        gid: Gid,
        path: &str,
        attribute: FileAttribute,
        modes: Modes,
    ) -> Result<(), FsError> {
        self.create_file_or_directory(uid, gid, path, attribute, modes, true)
    }

    pub fn create_directory(
        &mut self,
        uid: Uid,
        gid: Gid,
        path: &str,
        attribute: FileAttribute,
        modes: Modes,
    ) -> Result<(), FsError> {
        self.create_file_or_directory(uid, gid, path, attribute, modes, false)
    }

    /// Create every missing parent directory of `path`. The last component
    /// itself is not created.
    pub fn create_full_path(
        &mut self,
        uid: Uid,
        gid: Gid,
        path: &str,
        attribute: FileAttribute,
        modes: Modes,
    ) -> Result<(), FsError> {
        let mut position = 1;
        while let Some(offset) = path.get(position..).and_then(|rest| rest.find('/')) {
            let end = position + offset;
            let subpath = &path[..end];
            match self.get_metadata(uid, gid, subpath) {
                Ok(metadata) if metadata.is_file => return Err(FsError::Invalid),
                Ok(_) => {}
                Err(FsError::NotFound) => {
                    self.create_directory(uid, gid, subpath, attribute, modes)?
                }
                Err(e) => return Err(e),
            }
            position = end + 1;
        }
        Ok(())
    }

    pub fn delete(&mut self, uid: Uid, gid: Gid, path: &str) -> Result<(), FsError> {
        if !is_valid_non_root_path(path) {
            return Err(FsError::Invalid);
        }
        let split = split_path_and_basename(path);
        let parent = self.entry(split.parent).ok_or(FsError::NotFound)?;
        if !parent.check_permission(uid, gid, Mode::Write) {
            return Err(FsError::AccessDenied);
        }

        let host_path = self.host_path(path);
        let info = fs::metadata(&host_path).map_err(|_| FsError::NotFound)?;
        let removed = if info.is_file() && !self.is_file_opened(path) {
            fs::remove_file(&host_path)
        } else if info.is_dir() && !self.is_directory_in_use(path) {
            fs::remove_dir_all(&host_path)
        } else {
            return Err(FsError::InUse);
        };
        if let Err(e) = removed {
            log::error!("Failed to delete {}: {}", host_path.display(), e);
            return Err(FsError::UnknownError);
        }

        if let Some(parent) = self.entry(split.parent) {
            if let Some(index) = parent.child_index(split.file_name) {
                parent.children.remove(index);
            }
        }
        self.save_fst();
        Ok(())
    }

    pub fn rename(
        &mut self,
        uid: Uid,
        gid: Gid,
        old_path: &str,
        new_path: &str,
    ) -> Result<(), FsError> {
        if !is_valid_non_root_path(old_path) || !is_valid_non_root_path(new_path) {
            return Err(FsError::Invalid);
        }
        let old_split = split_path_and_basename(old_path);
        let new_split = split_path_and_basename(new_path);

        let old_parent_ok = self
            .entry(old_split.parent)
            .ok_or(FsError::NotFound)?
            .check_permission(uid, gid, Mode::Write);
        let new_parent_ok = self
            .entry(new_split.parent)
            .ok_or(FsError::NotFound)?
            .check_permission(uid, gid, Mode::Write);
        if !old_parent_ok || !new_parent_ok {
            return Err(FsError::AccessDenied);
        }

        let is_file = self.entry(old_path).ok_or(FsError::NotFound)?.data.is_file;
        if is_file && old_split.file_name != new_split.file_name {
            return Err(FsError::Invalid);
        }
        if (is_file && self.is_file_opened(old_path))
            || (!is_file && self.is_directory_in_use(old_path))
        {
            return Err(FsError::InUse);
        }

        let host_old = self.host_path(old_path);
        let host_new = self.host_path(new_path);
        if let Ok(target) = fs::metadata(&host_new) {
            if target.is_file() != is_file {
                return Err(FsError::Invalid);
            }
            let removed = if is_file {
                fs::remove_file(&host_new)
            } else {
                fs::remove_dir_all(&host_new)
            };
            if let Err(e) = removed {
                log::warn!("Failed to replace {}: {}", host_new.display(), e);
            }
        }
        if let Err(e) = fs::rename(&host_old, &host_new) {
            log::error!(
                "Failed to rename {} to {}: {}",
                host_old.display(),
                host_new.display(),
                e
            );
            return Err(FsError::NotFound);
        }

        let moved = self.entry(old_split.parent).and_then(|parent| {
            parent
                .child_index(old_split.file_name)
                .map(|index| parent.children.remove(index))
        });
        if let (Some(moved), Some(target)) = (moved, self.entry(new_path)) {
            *target = FstEntry {
                name: new_split.file_name.to_string(),
                ..moved
            };
        }
        self.save_fst();
        Ok(())
    }

    /// Names in a directory, most recently created FST entry first. Host
    /// files without an FST record come last in name order.
    pub fn read_directory(
        &mut self,
        uid: Uid,
        gid: Gid,
        path: &str,
    ) -> Result<Vec<String>, FsError> {
        if !is_valid_path(path) {
            return Err(FsError::Invalid);
        }
        let host_path = self.host_path(path);
        let entry = self.entry(path).ok_or(FsError::NotFound)?;
        if !entry.check_permission(uid, gid, Mode::Read) {
            return Err(FsError::AccessDenied);
        }
        if entry.data.is_file {
            return Err(FsError::Invalid);
        }

        let sort_keys: HashMap<&str, i64> = entry
            .children
            .iter()
            .enumerate()
            .map(|(i, child)| (child.name.as_str(), i as i64))
            .collect();
        let key = |name: &str| sort_keys.get(name).copied().unwrap_or(-1);

        let mut names: Vec<String> = fs::read_dir(&host_path)
            .map_err(|_| FsError::NotFound)?
            .filter_map(|child| child.ok())
            .map(|child| unescape_file_name(&child.file_name().to_string_lossy()))
            .collect();
        names.sort_by(|a, b| key(b).cmp(&key(a)).then_with(|| a.cmp(b)));
        Ok(names)
    }

    pub fn get_metadata(&mut self, uid: Uid, gid: Gid, path: &str) -> Result<Metadata, FsError> {
        let mut metadata = if path == "/" {
            self.root_entry.data
        } else {
            if !is_valid_non_root_path(path) {
                return Err(FsError::Invalid);
            }
            let split = split_path_and_basename(path);
            let parent = self.entry(split.parent).ok_or(FsError::NotFound)?;
            if !parent.check_permission(uid, gid, Mode::Read) {
                return Err(FsError::AccessDenied);
            }
            self.entry(path).ok_or(FsError::NotFound)?.data
        };
        metadata.size = fs::metadata(self.host_path(path))
            .ok()
            .filter(|m| m.is_file())
            .map_or(0, |m| u32::try_from(m.len()).unwrap_or(u32::MAX));
        Ok(metadata)
    }

    /// Change ownership, attribute and modes. Only uid 0 may hand a file to
    /// another uid, and only while the file is empty.
    pub fn set_metadata(
        &mut self,
        caller_uid: Uid,
        path: &str,
        uid: Uid,
        gid: Gid,
        attribute: FileAttribute,
        modes: Modes,
    ) -> Result<(), FsError> {
        if !is_valid_path(path) {
            return Err(FsError::Invalid);
        }
        let is_empty = fs::metadata(self.host_path(path)).map_or(true, |m| m.len() == 0);
        let entry = self.entry(path).ok_or(FsError::NotFound)?;
        if caller_uid != 0 && caller_uid != entry.data.uid {
            return Err(FsError::AccessDenied);
        }
        if caller_uid != 0 && uid != entry.data.uid {
            return Err(FsError::AccessDenied);
        }
        if entry.data.uid != uid && entry.data.is_file && !is_empty {
            return Err(FsError::FileNotEmpty);
        }

        entry.data.uid = uid;
        entry.data.gid = gid;
        entry.data.attribute = attribute;
        entry.data.modes = modes;
        self.save_fst();
        Ok(())
    }

    pub fn get_nand_stats(&self) -> NandStats {
        NAND_STATS
    }

    pub fn get_directory_stats(&self, path: &str) -> Result<DirectoryStats, FsError> {
        if !is_valid_path(path) {
            return Err(FsError::Invalid);
        }
        let host_path = self.host_path(path);
        let info = fs::metadata(&host_path).map_err(|_| FsError::NotFound)?;
        if !info.is_dir() {
            return Err(FsError::Invalid);
        }
        let (entries, total_size) = count_tree(&host_path).map_err(|e| {
            log::warn!("Failed to scan {}: {}", host_path.display(), e);
            FsError::UnknownError
        })?;
        let clusters = total_size / u64::from(CLUSTER_SIZE);
        Ok(DirectoryStats {
            used_clusters: clusters.min(u64::from(TOTAL_CLUSTERS)) as u32,
            used_inodes: entries.saturating_add(1).min(TOTAL_INODES),
        })
    }

    // -----------------------------------------------------------------------
    // File handles
    // -----------------------------------------------------------------------

    fn open_host_file(&self, host_path: &Path) -> Option<Rc<HostFile>> {
        let cached = self
            .open_files
            .borrow()
            .get(host_path)
            .and_then(Weak::upgrade);
        if cached.is_some() {
            return cached;
        }

        let file = loop {
            match OpenOptions::new().read(true).write(true).open(host_path) {
                Ok(file) => break file,
                Err(e) => {
                    if !self.retry_prompt.should_retry(host_path, &e) {
                        return None;
                    }
                }
            }
        };
        let host_file = Rc::new(HostFile {
            file,
            path: host_path.to_path_buf(),
            registry: Rc::downgrade(&self.open_files),
        });
        self.open_files
            .borrow_mut()
            .insert(host_path.to_path_buf(), Rc::downgrade(&host_file));
        Some(host_file)
    }

    fn handle(&self, fd: Fd) -> Option<&Handle> {
        self.handles.get(fd as usize).filter(|h| h.opened)
    }

    fn handle_mut(&mut self, fd: Fd) -> Option<&mut Handle> {
        self.handles.get_mut(fd as usize).filter(|h| h.opened)
    }

    pub fn open_file(&mut self, uid: Uid, gid: Gid, path: &str, mode: Mode) -> Result<Fd, FsError> {
        let fd = self
            .handles
            .iter()
            .position(|h| !h.opened)
            .ok_or(FsError::NoFreeHandle)?;

        let host_path = self.host_path(path);
        if !host_path.is_file() {
            return Err(FsError::NotFound);
        }
        let entry = self.entry(path).ok_or(FsError::NotFound)?;
        if !entry.check_permission(uid, gid, mode) {
            return Err(FsError::AccessDenied);
        }

        let host_file = self.open_host_file(&host_path).ok_or(FsError::UnknownError)?;
        self.handles[fd] = Handle {
            opened: true,
            mode,
            uid,
            gid,
            wii_path: path.to_string(),
            host_file: Some(host_file),
            file_offset: 0,
        };
        Ok(fd as Fd)
    }

    pub fn close(&mut self, fd: Fd) -> Result<(), FsError> {
        let handle = self.handle_mut(fd).ok_or(FsError::Invalid)?;
        *handle = Handle::default();
        Ok(())
    }

    /// Read up to `buf.len()` bytes at the handle's offset. Reads stop at
    /// end of file; the offset advances by what was actually read.
    pub fn read_bytes_from_file(&mut self, fd: Fd, buf: &mut [u8]) -> Result<u32, FsError> {
        let handle = self.handle_mut(fd).ok_or(FsError::Invalid)?;
        if !handle.mode.allows(Mode::Read) {
            return Err(FsError::AccessDenied);
        }
        let host_file = handle.host_file.clone().ok_or(FsError::Invalid)?;

        let remaining = host_file.size().saturating_sub(handle.file_offset) as usize;
        let count = buf.len().min(remaining);
        let mut file = &host_file.file;
        file.seek(SeekFrom::Start(u64::from(handle.file_offset)))
            .map_err(|_| FsError::ShortRead)?;

        let mut read = 0;
        while read < count {
            match file.read(&mut buf[read..count]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    log::warn!("Read from {} failed: {}", host_file.path.display(), e);
                    return Err(FsError::ShortRead);
                }
            }
        }
        handle.file_offset += read as u32;
        Ok(read as u32)
    }

    pub fn write_bytes_to_file(&mut self, fd: Fd, data: &[u8]) -> Result<u32, FsError> {
        let handle = self.handle_mut(fd).ok_or(FsError::Invalid)?;
        if !handle.mode.allows(Mode::Write) {
            return Err(FsError::AccessDenied);
        }
        let host_file = handle.host_file.clone().ok_or(FsError::Invalid)?;

        let mut file = &host_file.file;
        file.seek(SeekFrom::Start(u64::from(handle.file_offset)))
            .and_then(|_| file.write_all(data))
            .map_err(|e| {
                log::warn!("Write to {} failed: {}", host_file.path.display(), e);
                FsError::UnknownError
            })?;
        handle.file_offset = handle.file_offset.wrapping_add(data.len() as u32);
        Ok(data.len() as u32)
    }

    /// Seeking past the end of the file is rejected; negative offsets are
    /// passed as their two's complement.
    pub fn seek_file(&mut self, fd: Fd, offset: u32, mode: SeekMode) -> Result<u32, FsError> {
        let handle = self.handle_mut(fd).ok_or(FsError::Invalid)?;
        let size = handle.host_file.as_ref().map_or(0, |f| f.size());
        let new_position = match mode {
            SeekMode::Set => offset,
            SeekMode::Current => handle.file_offset.wrapping_add(offset),
            SeekMode::End => size.wrapping_add(offset),
        };
        if new_position > size {
            return Err(FsError::Invalid);
        }
        handle.file_offset = new_position;
        Ok(new_position)
    }

    pub fn get_file_status(&self, fd: Fd) -> Result<FileStatus, FsError> {
        let handle = self.handle(fd).ok_or(FsError::Invalid)?;
        Ok(FileStatus {
            offset: handle.file_offset,
            size: handle.host_file.as_ref().map_or(0, |f| f.size()),
        })
    }
}

impl Stateful for HostFileSystem {
    fn save_state(&self, w: &mut StateWriter) {
        for handle in &self.handles {
            w.write_bool(handle.opened);
            w.write_u8(handle.mode as u8);
            w.write_u32(handle.uid);
            w.write_u16(handle.gid);
            w.write_str(&handle.wii_path);
            w.write_u32(handle.file_offset);
        }
    }

    fn load_state(&mut self, r: &mut StateReader<'_>) -> Result<(), StateError> {
        let mut handles = Vec::with_capacity(MAX_HANDLES);
        for _ in 0..MAX_HANDLES {
            handles.push(Handle {
                opened: r.read_bool("fs_handle.opened")?,
                mode: Mode::from_u8(r.read_u8("fs_handle.mode")?),
                uid: r.read_u32("fs_handle.uid")?,
                gid: r.read_u16("fs_handle.gid")?,
                wii_path: r.read_string("fs_handle.wii_path")?,
                host_file: None,
                file_offset: r.read_u32("fs_handle.file_offset")?,
            });
        }

        for handle in handles.iter_mut().filter(|h| h.opened) {
            handle.host_file = self.open_host_file(&self.host_path(&handle.wii_path));
            if handle.host_file.is_none() {
                log::error!("Could not reopen {} after loading state", handle.wii_path);
                *handle = Handle::default();
            }
        }
        self.handles = handles;
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/host_fs_tests.rs"]
mod tests;

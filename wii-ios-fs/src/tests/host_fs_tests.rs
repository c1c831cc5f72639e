use super::*;

use tempfile::TempDir;

const ALL_RW: Modes = Modes::new(Mode::ReadWrite, Mode::ReadWrite, Mode::ReadWrite);

fn setup() -> (TempDir, HostFileSystem) {
    let dir = tempfile::tempdir().unwrap();
    let fs = HostFileSystem::new(dir.path());
    (dir, fs)
}

fn create_with_contents(fs: &mut HostFileSystem, path: &str, contents: &[u8]) {
    fs.create_file(0, 0, path, 0, ALL_RW).unwrap();
    let fd = fs.open_file(0, 0, path, Mode::Write).unwrap();
    assert_eq!(
        fs.write_bytes_to_file(fd, contents).unwrap(),
        contents.len() as u32
    );
    fs.close(fd).unwrap();
}

// ---------------------------------------------------------------------------
// Creation and metadata
// ---------------------------------------------------------------------------

#[test]
fn created_entries_carry_their_metadata() {
    let (_dir, mut fs) = setup();
    let modes = Modes::new(Mode::ReadWrite, Mode::Read, Mode::None);
    fs.create_directory(0, 0, "/tmp", 0, ALL_RW).unwrap();
    fs.create_file(0, 0x3031, "/tmp/a.bin", 2, modes).unwrap();

    let meta = fs.get_metadata(0, 0, "/tmp/a.bin").unwrap();
    assert!(meta.is_file);
    assert_eq!(meta.gid, 0x3031);
    assert_eq!(meta.attribute, 2);
    assert_eq!(meta.modes, modes);
    assert_eq!(meta.size, 0);

    let dir_meta = fs.get_metadata(0, 0, "/tmp").unwrap();
    assert!(!dir_meta.is_file);
    assert!(fs.host_path("/tmp/a.bin").is_file());
}

#[test]
fn create_rejects_bad_requests() {
    let (_dir, mut fs) = setup();
    assert_eq!(fs.create_file(0, 0, "/", 0, ALL_RW), Err(FsError::Invalid));
    assert_eq!(fs.create_file(0, 0, "rel", 0, ALL_RW), Err(FsError::Invalid));
    assert_eq!(fs.create_file(0, 0, "/a\x01", 0, ALL_RW), Err(FsError::Invalid));
    assert_eq!(
        fs.create_file(0, 0, "/missing/file", 0, ALL_RW),
        Err(FsError::NotFound)
    );
    assert_eq!(
        fs.create_directory(0, 0, "/a/b/c/d/e/f/g/h/i", 0, ALL_RW),
        Err(FsError::TooManyPathComponents)
    );

    fs.create_file(0, 0, "/dup", 0, ALL_RW).unwrap();
    assert_eq!(
        fs.create_file(0, 0, "/dup", 0, ALL_RW),
        Err(FsError::AlreadyExists)
    );
}

#[test]
fn create_needs_write_access_to_parent() {
    let (_dir, mut fs) = setup();
    let owner_only = Modes::new(Mode::ReadWrite, Mode::None, Mode::None);
    fs.create_directory(0, 0, "/locked", 0, owner_only).unwrap();
    assert_eq!(
        fs.create_file(0x1000, 1, "/locked/f", 0, ALL_RW),
        Err(FsError::AccessDenied)
    );
    // The root is read-only for "other".
    assert_eq!(
        fs.create_file(0x1000, 1, "/f", 0, ALL_RW),
        Err(FsError::AccessDenied)
    );
}

#[test]
fn host_only_files_get_default_entries() {
    let (dir, mut fs) = setup();
    std::fs::write(dir.path().join("host.bin"), b"abcd").unwrap();

    let meta = fs.get_metadata(0, 0, "/host.bin").unwrap();
    assert!(meta.is_file);
    assert_eq!(meta.uid, 0);
    assert_eq!(meta.modes, ALL_RW);
    assert_eq!(meta.size, 4);
    assert_eq!(fs.get_metadata(0, 0, "/nope"), Err(FsError::NotFound));
}

#[test]
fn create_full_path_creates_parents_only() {
    let (_dir, mut fs) = setup();
    fs.create_full_path(0, 0, "/a/b/c/file", 0, ALL_RW).unwrap();
    assert!(!fs.get_metadata(0, 0, "/a/b/c").unwrap().is_file);
    assert_eq!(fs.get_metadata(0, 0, "/a/b/c/file"), Err(FsError::NotFound));

    // Existing prefixes are left alone.
    fs.create_full_path(0, 0, "/a/b/d/file", 0, ALL_RW).unwrap();
    assert!(fs.host_path("/a/b/d").is_dir());

    fs.create_file(0, 0, "/a/plain", 0, ALL_RW).unwrap();
    assert_eq!(
        fs.create_full_path(0, 0, "/a/plain/x", 0, ALL_RW),
        Err(FsError::Invalid)
    );
}

#[test]
fn set_metadata_ownership_rules() {
    let (_dir, mut fs) = setup();
    fs.create_file(0, 0, "/f", 0, ALL_RW).unwrap();
    // Empty files may be handed to another uid.
    fs.set_metadata(0, "/f", 0x1000, 1, 0, ALL_RW).unwrap();

    let fd = fs.open_file(0x1000, 1, "/f", Mode::Write).unwrap();
    fs.write_bytes_to_file(fd, b"data").unwrap();
    fs.close(fd).unwrap();

    assert_eq!(
        fs.set_metadata(0x2000, "/f", 0x1000, 1, 0, ALL_RW),
        Err(FsError::AccessDenied)
    );
    assert_eq!(
        fs.set_metadata(0x1000, "/f", 0x2000, 1, 0, ALL_RW),
        Err(FsError::AccessDenied)
    );
    assert_eq!(
        fs.set_metadata(0, "/f", 0x2000, 1, 0, ALL_RW),
        Err(FsError::FileNotEmpty)
    );

    let read_only = Modes::new(Mode::Read, Mode::Read, Mode::None);
    fs.set_metadata(0x1000, "/f", 0x1000, 7, 0x20, read_only)
        .unwrap();
    let meta = fs.get_metadata(0, 0, "/f").unwrap();
    assert_eq!((meta.uid, meta.gid, meta.attribute), (0x1000, 7, 0x20));
    assert_eq!(meta.modes, read_only);
}

// ---------------------------------------------------------------------------
// File handles
// ---------------------------------------------------------------------------

#[test]
fn handles_to_the_same_file_see_each_others_writes() {
    let (_dir, mut fs) = setup();
    fs.create_file(0, 0, "/shared.bin", 0, ALL_RW).unwrap();
    let first = fs.open_file(0, 0, "/shared.bin", Mode::ReadWrite).unwrap();
    let second = fs.open_file(0, 0, "/shared.bin", Mode::ReadWrite).unwrap();
    assert_ne!(first, second);
    assert_eq!(fs.open_files.borrow().len(), 1);

    fs.write_bytes_to_file(first, b"hello").unwrap();
    let mut buf = [0u8; 5];
    assert_eq!(fs.read_bytes_from_file(second, &mut buf).unwrap(), 5);
    assert_eq!(&buf, b"hello");

    fs.seek_file(first, 0, SeekMode::Set).unwrap();
    fs.write_bytes_to_file(first, b"J").unwrap();
    fs.seek_file(second, 0, SeekMode::Set).unwrap();
    fs.read_bytes_from_file(second, &mut buf).unwrap();
    assert_eq!(&buf, b"Jello");

    fs.close(first).unwrap();
    assert_eq!(fs.open_files.borrow().len(), 1);
    fs.close(second).unwrap();
    assert!(fs.open_files.borrow().is_empty());
}

#[test]
fn reads_are_clamped_to_end_of_file() {
    let (_dir, mut fs) = setup();
    create_with_contents(&mut fs, "/ten", b"0123456789");
    let fd = fs.open_file(0, 0, "/ten", Mode::Read).unwrap();
    fs.seek_file(fd, 8, SeekMode::Set).unwrap();

    let mut buf = [0u8; 100];
    assert_eq!(fs.read_bytes_from_file(fd, &mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], b"89");
    assert_eq!(
        fs.get_file_status(fd).unwrap(),
        FileStatus {
            offset: 10,
            size: 10
        }
    );
    assert_eq!(fs.read_bytes_from_file(fd, &mut buf).unwrap(), 0);
}

#[test]
fn seeking_past_the_end_is_invalid() {
    let (_dir, mut fs) = setup();
    create_with_contents(&mut fs, "/ten", b"0123456789");
    let fd = fs.open_file(0, 0, "/ten", Mode::Read).unwrap();

    assert_eq!(fs.seek_file(fd, 11, SeekMode::Set), Err(FsError::Invalid));
    assert_eq!(fs.seek_file(fd, 0, SeekMode::End), Ok(10));
    assert_eq!(fs.seek_file(fd, (-2i32) as u32, SeekMode::Current), Ok(8));
    assert_eq!(fs.seek_file(fd, 3, SeekMode::Current), Err(FsError::Invalid));
    assert_eq!(fs.get_file_status(fd).unwrap().offset, 8);
}

#[test]
fn handle_mode_limits_access() {
    let (_dir, mut fs) = setup();
    create_with_contents(&mut fs, "/f", b"abc");
    let reader = fs.open_file(0, 0, "/f", Mode::Read).unwrap();
    let writer = fs.open_file(0, 0, "/f", Mode::Write).unwrap();
    assert_eq!(
        fs.write_bytes_to_file(reader, b"x"),
        Err(FsError::AccessDenied)
    );
    let mut buf = [0u8; 3];
    assert_eq!(
        fs.read_bytes_from_file(writer, &mut buf),
        Err(FsError::AccessDenied)
    );
}

#[test]
fn open_checks_permissions() {
    let (_dir, mut fs) = setup();
    fs.create_file(0, 0, "/owned", 0, ALL_RW).unwrap();
    let modes = Modes::new(Mode::ReadWrite, Mode::Read, Mode::None);
    fs.set_metadata(0, "/owned", 0x1000, 1, 0, modes).unwrap();

    assert!(fs.open_file(0x1000, 9, "/owned", Mode::ReadWrite).is_ok());
    assert!(fs.open_file(0x2000, 1, "/owned", Mode::Read).is_ok());
    assert_eq!(
        fs.open_file(0x2000, 1, "/owned", Mode::Write),
        Err(FsError::AccessDenied)
    );
    assert_eq!(
        fs.open_file(0x2000, 2, "/owned", Mode::Read),
        Err(FsError::AccessDenied)
    );
}

#[test]
fn open_requires_an_existing_file() {
    let (_dir, mut fs) = setup();
    fs.create_directory(0, 0, "/dir", 0, ALL_RW).unwrap();
    assert_eq!(
        fs.open_file(0, 0, "/missing", Mode::Read),
        Err(FsError::NotFound)
    );
    assert_eq!(fs.open_file(0, 0, "/dir", Mode::Read), Err(FsError::NotFound));
}

#[test]
fn handle_table_holds_sixteen_files() {
    let (_dir, mut fs) = setup();
    fs.create_file(0, 0, "/f", 0, ALL_RW).unwrap();
    let fds: Vec<Fd> = (0..16)
        .map(|_| fs.open_file(0, 0, "/f", Mode::Read).unwrap())
        .collect();
    assert_eq!(
        fs.open_file(0, 0, "/f", Mode::Read),
        Err(FsError::NoFreeHandle)
    );

    fs.close(fds[3]).unwrap();
    assert_eq!(fs.open_file(0, 0, "/f", Mode::Read), Ok(fds[3]));

    assert_eq!(fs.close(99), Err(FsError::Invalid));
    fs.close(fds[0]).unwrap();
    assert_eq!(fs.close(fds[0]), Err(FsError::Invalid));
}

// ---------------------------------------------------------------------------
// Delete and rename
// ---------------------------------------------------------------------------

#[test]
fn open_files_cannot_be_deleted() {
    let (_dir, mut fs) = setup();
    fs.create_directory(0, 0, "/dir", 0, ALL_RW).unwrap();
    fs.create_file(0, 0, "/dir/f", 0, ALL_RW).unwrap();
    let fd = fs.open_file(0, 0, "/dir/f", Mode::Read).unwrap();

    assert_eq!(fs.delete(0, 0, "/dir/f"), Err(FsError::InUse));
    assert_eq!(fs.delete(0, 0, "/dir"), Err(FsError::InUse));
    assert_eq!(fs.rename(0, 0, "/dir", "/dir2"), Err(FsError::InUse));

    fs.close(fd).unwrap();
    fs.delete(0, 0, "/dir/f").unwrap();
    assert_eq!(fs.get_metadata(0, 0, "/dir/f"), Err(FsError::NotFound));
    fs.delete(0, 0, "/dir").unwrap();
    assert!(!fs.host_path("/dir").exists());
    assert_eq!(fs.delete(0, 0, "/dir"), Err(FsError::NotFound));
}

#[test]
fn rename_moves_files_between_directories() {
    let (_dir, mut fs) = setup();
    fs.create_directory(0, 0, "/a", 0, ALL_RW).unwrap();
    fs.create_directory(0, 0, "/b", 0, ALL_RW).unwrap();
    create_with_contents(&mut fs, "/a/x", b"payload");
    fs.set_metadata(0, "/a/x", 0, 0x55, 3, ALL_RW).unwrap();

    assert_eq!(fs.rename(0, 0, "/a/x", "/b/y"), Err(FsError::Invalid));
    fs.rename(0, 0, "/a/x", "/b/x").unwrap();

    assert_eq!(fs.get_metadata(0, 0, "/a/x"), Err(FsError::NotFound));
    let meta = fs.get_metadata(0, 0, "/b/x").unwrap();
    assert_eq!((meta.gid, meta.attribute, meta.size), (0x55, 3, 7));
    assert_eq!(fs.read_directory(0, 0, "/a").unwrap(), Vec::<String>::new());

    let fd = fs.open_file(0, 0, "/b/x", Mode::Read).unwrap();
    assert_eq!(fs.rename(0, 0, "/b/x", "/a/x"), Err(FsError::InUse));
    fs.close(fd).unwrap();
}

#[test]
fn rename_replaces_targets_of_the_same_kind() {
    let (_dir, mut fs) = setup();
    fs.create_directory(0, 0, "/a", 0, ALL_RW).unwrap();
    fs.create_directory(0, 0, "/b", 0, ALL_RW).unwrap();
    create_with_contents(&mut fs, "/a/f", b"new");
    create_with_contents(&mut fs, "/b/f", b"older");

    fs.rename(0, 0, "/a/f", "/b/f").unwrap();
    assert_eq!(fs.get_metadata(0, 0, "/b/f").unwrap().size, 3);

    fs.create_directory(0, 0, "/c", 0, ALL_RW).unwrap();
    fs.create_file(0, 0, "/c/sub", 0, ALL_RW).unwrap();
    fs.create_directory(0, 0, "/b/sub", 0, ALL_RW).unwrap();
    assert_eq!(fs.rename(0, 0, "/b/sub", "/c/sub"), Err(FsError::Invalid));
    fs.rename(0, 0, "/b", "/renamed").unwrap();
    assert!(fs.get_metadata(0, 0, "/renamed/sub").is_ok());
}

// ---------------------------------------------------------------------------
// Directories
// ---------------------------------------------------------------------------

#[test]
fn directory_listing_is_newest_first() {
    let (dir, mut fs) = setup();
    fs.create_directory(0, 0, "/d", 0, ALL_RW).unwrap();
    for name in ["one", "two", "a:b"] {
        fs.create_file(0, 0, &format!("/d/{name}"), 0, ALL_RW).unwrap();
    }
    std::fs::write(dir.path().join("d").join("zzz"), b"").unwrap();
    std::fs::write(dir.path().join("d").join("aaa"), b"").unwrap();

    assert!(dir.path().join("d").join("a__3a__b").is_file());
    assert_eq!(
        fs.read_directory(0, 0, "/d").unwrap(),
        vec!["a:b", "two", "one", "aaa", "zzz"]
    );
    assert_eq!(fs.read_directory(0, 0, "/d/one"), Err(FsError::Invalid));
    assert_eq!(fs.read_directory(0, 0, "/none"), Err(FsError::NotFound));
    assert_eq!(fs.read_directory(0, 0, "bad"), Err(FsError::Invalid));
}

#[test]
fn directory_listing_needs_read_access() {
    let (_dir, mut fs) = setup();
    let private = Modes::new(Mode::ReadWrite, Mode::None, Mode::None);
    fs.create_directory(0, 0, "/private", 0, private).unwrap();
    assert_eq!(
        fs.read_directory(0x1000, 1, "/private"),
        Err(FsError::AccessDenied)
    );
    assert!(fs.read_directory(0, 0, "/private").is_ok());
}

#[test]
fn directory_stats_count_inodes_and_clusters() {
    let (_dir, mut fs) = setup();
    fs.create_directory(0, 0, "/d", 0, ALL_RW).unwrap();
    fs.create_directory(0, 0, "/d/s", 0, ALL_RW).unwrap();
    create_with_contents(&mut fs, "/d/a", &[1u8; 0x4000]);
    create_with_contents(&mut fs, "/d/s/b", &[2u8; 0x8000]);

    assert_eq!(
        fs.get_directory_stats("/d").unwrap(),
        DirectoryStats {
            used_clusters: 3,
            used_inodes: 4
        }
    );
    assert_eq!(fs.get_directory_stats("/d/a"), Err(FsError::Invalid));
    assert_eq!(fs.get_directory_stats("/x"), Err(FsError::NotFound));
}

#[test]
fn nand_stats_are_fixed() {
    let (_dir, fs) = setup();
    let stats = fs.get_nand_stats();
    assert_eq!(stats.cluster_size, 0x4000);
    assert_eq!(stats.free_clusters, 0x5DEC);
    assert_eq!(stats.used_inodes, 0x0394);
}

#[test]
fn format_wipes_everything() {
    let (_dir, mut fs) = setup();
    create_with_contents(&mut fs, "/f", b"abc");
    let fd = fs.open_file(0, 0, "/f", Mode::Read).unwrap();

    assert_eq!(fs.format(0x1000), Err(FsError::AccessDenied));
    fs.format(0).unwrap();

    assert_eq!(fs.get_metadata(0, 0, "/f"), Err(FsError::NotFound));
    assert_eq!(fs.close(fd), Err(FsError::Invalid));
    assert_eq!(fs.read_directory(0, 0, "/").unwrap(), vec!["sys"]);
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[test]
fn fst_survives_a_restart() {
    let (dir, mut fs) = setup();
    let modes = Modes::new(Mode::ReadWrite, Mode::Read, Mode::None);
    fs.create_directory(0, 0, "/title", 0, ALL_RW).unwrap();
    fs.create_file(0, 0, "/title/data.bin", 0, ALL_RW).unwrap();
    fs.set_metadata(0, "/title/data.bin", 0x1000, 0x3031, 4, modes)
        .unwrap();
    drop(fs);

    assert!(dir.path().join("sys").join("fst.bin").is_file());
    let mut reloaded = HostFileSystem::new(dir.path());
    let meta = reloaded.get_metadata(0, 0, "/title/data.bin").unwrap();
    assert_eq!((meta.uid, meta.gid, meta.attribute), (0x1000, 0x3031, 4));
    assert_eq!(meta.modes, modes);
}

#[test]
fn corrupt_fst_falls_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("sys")).unwrap();
    std::fs::write(dir.path().join("sys").join("fst.bin"), [0u8; 7]).unwrap();
    std::fs::write(dir.path().join("file"), b"x").unwrap();

    let mut fs = HostFileSystem::new(dir.path());
    assert_eq!(fs.get_metadata(0, 0, "/file").unwrap().modes, ALL_RW);
    fs.create_file(0, 0, "/new", 0, ALL_RW).unwrap();
}

#[test]
fn save_state_restores_open_handles() {
    let (_dir, mut fs) = setup();
    create_with_contents(&mut fs, "/f", b"0123456789");
    let fd = fs.open_file(0, 0, "/f", Mode::Read).unwrap();
    fs.seek_file(fd, 4, SeekMode::Set).unwrap();

    let mut w = StateWriter::new();
    fs.save_state(&mut w);
    let state = w.into_bytes();
    fs.close(fd).unwrap();

    fs.load_state(&mut StateReader::new(&state)).unwrap();
    assert_eq!(fs.get_file_status(fd).unwrap().offset, 4);
    let mut buf = [0u8; 2];
    fs.read_bytes_from_file(fd, &mut buf).unwrap();
    assert_eq!(&buf, b"45");

    assert!(matches!(
        fs.load_state(&mut StateReader::new(&state[..10])),
        Err(StateError::Truncated(_))
    ));
}

use std::io::Write;
use std::path::{Path, PathBuf};

use owo_colors::OwoColorize;
use owo_colors::Stream::Stdout;

use wii_ios_core::util::format_bytes;
use wii_ios_crypto::BootMiiKeys;
use wii_ios_fs::{Fd, FsError, HostFileSystem, Metadata, Mode};
use wii_ios_lib::LogProgress;
use wii_ios_lib::nand_import::import_nand_bin;
use wii_ios_lib::settings::resolve_nand_root;

use crate::error::CliError;

/// All browsing happens as the kernel, which bypasses permissions.
const ROOT_UID: u32 = 0;
const ROOT_GID: u16 = 0;

fn open_nand(nand_root: Option<PathBuf>) -> Result<HostFileSystem, CliError> {
    let root = resolve_nand_root(nand_root);
    if !root.is_dir() {
        return Err(CliError::invalid_input(format!(
            "NAND root {} does not exist; run 'wii-ios nand import' first",
            root.display()
        )));
    }
    Ok(HostFileSystem::new(root))
}

fn mode_str(mode: Mode) -> &'static str {
    match mode {
        Mode::None => "--",
        Mode::Read => "r-",
        Mode::Write => "-w",
        Mode::ReadWrite => "rw",
    }
}

pub(crate) fn permissions(metadata: &Metadata) -> String {
    format!(
        "{}{}{}{}",
        if metadata.is_file { '-' } else { 'd' },
        mode_str(metadata.modes.owner),
        mode_str(metadata.modes.group),
        mode_str(metadata.modes.other)
    )
}

pub(crate) fn child_path(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Import a BootMii dump into the NAND root.
pub(crate) fn run_nand_import(
    dump: &Path,
    keys: Option<PathBuf>,
    nand_root: Option<PathBuf>,
) -> Result<(), CliError> {
    let root = resolve_nand_root(nand_root);
    std::fs::create_dir_all(&root)?;
    let fallback = keys.map(|p| BootMiiKeys::from_file(&p)).transpose()?;

    log::info!(
        "Importing {} into {}",
        dump.display().if_supports_color(Stdout, |t| t.cyan()),
        root.display().if_supports_color(Stdout, |t| t.cyan()),
    );
    let mut fs = HostFileSystem::new(&root);
    let summary = import_nand_bin(dump, &mut fs, fallback.as_ref(), &LogProgress)?;

    log::info!(
        "{} {} files, {} directories, {} (superblock generation {})",
        "\u{2714}".if_supports_color(Stdout, |t| t.green()),
        summary.files,
        summary.directories,
        format_bytes(summary.bytes),
        summary.superblock_generation,
    );
    Ok(())
}

/// List a NAND directory, one entry per line.
pub(crate) fn run_nand_ls(path: &str, nand_root: Option<PathBuf>) -> Result<(), CliError> {
    let mut fs = open_nand(nand_root)?;
    let names = fs
        .read_directory(ROOT_UID, ROOT_GID, path)
        .map_err(|e| CliError::fs(path, e))?;

    for name in names {
        let full = child_path(path, &name);
        let metadata = fs
            .get_metadata(ROOT_UID, ROOT_GID, &full)
            .map_err(|e| CliError::fs(&full, e))?;
        let display = if metadata.is_file {
            name
        } else {
            format!("{}/", name.if_supports_color(Stdout, |t| t.blue()))
        };
        log::info!(
            "{} {:08x} {:04x} {:>10} {}",
            permissions(&metadata),
            metadata.uid,
            metadata.gid,
            metadata.size,
            display
        );
    }
    Ok(())
}

/// Copy a NAND file to stdout or a host file.
pub(crate) fn run_nand_cat(
    path: &str,
    output: Option<&Path>,
    nand_root: Option<PathBuf>,
) -> Result<(), CliError> {
    let mut fs = open_nand(nand_root)?;
    let fd = fs
        .open_file(ROOT_UID, ROOT_GID, path, Mode::Read)
        .map_err(|e| CliError::fs(path, e))?;
    let data = read_all(&mut fs, fd).map_err(|e| CliError::fs(path, e));
    fs.close(fd).map_err(|e| CliError::fs(path, e))?;
    let data = data?;

    match output {
        Some(out) => {
            std::fs::write(out, &data)?;
            log::info!(
                "{} {} written to {}",
                "\u{2714}".if_supports_color(Stdout, |t| t.green()),
                format_bytes(data.len() as u64),
                out.display().if_supports_color(Stdout, |t| t.cyan()),
            );
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&data)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

fn read_all(fs: &mut HostFileSystem, fd: Fd) -> Result<Vec<u8>, FsError> {
    let size = fs.get_file_status(fd)?.size;
    let mut data = vec![0u8; size as usize];
    let read = fs.read_bytes_from_file(fd, &mut data)?;
    data.truncate(read as usize);
    Ok(data)
}

/// Show ownership, permissions and size of a NAND entry.
pub(crate) fn run_nand_stat(path: &str, nand_root: Option<PathBuf>) -> Result<(), CliError> {
    let mut fs = open_nand(nand_root)?;
    let metadata = fs
        .get_metadata(ROOT_UID, ROOT_GID, path)
        .map_err(|e| CliError::fs(path, e))?;

    log::info!("{}", path.if_supports_color(Stdout, |t| t.bold()));
    log::info!(
        "  type:        {}",
        if metadata.is_file { "file" } else { "directory" }
    );
    log::info!("  permissions: {}", permissions(&metadata));
    log::info!("  owner:       {:08x}", metadata.uid);
    log::info!("  group:       {:04x}", metadata.gid);
    log::info!("  attribute:   {:#04x}", metadata.attribute);
    if metadata.is_file {
        log::info!(
            "  size:        {} ({})",
            metadata.size,
            format_bytes(u64::from(metadata.size))
        );
    }
    log::info!("  FST index:   {}", metadata.fst_index);
    Ok(())
}

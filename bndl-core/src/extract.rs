// bndl-core/src/extract.rs
//! Unpacks downloaded bundle archives into a staging directory.
//!
//! The format is detected from the file content, not its name. When every
//! entry lives under one top-level directory (the usual `name-v1.2.3/...`
//! layout of release archives) that directory is stripped so the bundle's
//! files land directly in the target.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read, Seek};
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path, PathBuf};

use bndl_common::error::TransportFailure;
use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{debug, warn};
use zip::read::ZipArchive;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
    Tar,
}

pub fn detect_format(archive_path: &Path) -> Result<ArchiveFormat, TransportFailure> {
    let kind = infer::get_from_path(archive_path)?;
    match kind.map(|k| k.extension()) {
        Some("zip") => Ok(ArchiveFormat::Zip),
        Some("gz") => Ok(ArchiveFormat::TarGz),
        Some("tar") => Ok(ArchiveFormat::Tar),
        Some(other) => Err(TransportFailure::corrupt(format!(
            "unsupported archive type '{}' for {}",
            other,
            archive_path.display()
        ))),
        None => Err(TransportFailure::corrupt(format!(
            "could not determine archive type of {}",
            archive_path.display()
        ))),
    }
}

/// Tracks top-level components while scanning an archive.
#[derive(Default)]
struct RootScan {
    roots: HashSet<PathBuf>,
    nested: bool,
    irregular: bool,
}

impl RootScan {
    fn observe(&mut self, path: &Path) {
        let mut components = path.components().filter(|c| *c != Component::CurDir);
        match components.next() {
            Some(Component::Normal(name)) => {
                self.roots.insert(PathBuf::from(name));
                if components.next().is_some() {
                    self.nested = true;
                }
            }
            Some(_) => self.irregular = true,
            None => {}
        }
    }

    /// One top-level directory holding everything.
    fn single_root(self) -> Option<PathBuf> {
        if self.irregular || !self.nested || self.roots.len() != 1 {
            return None;
        }
        self.roots.into_iter().next()
    }
}

fn corrupt(archive: &Path, e: impl std::fmt::Display) -> TransportFailure {
    TransportFailure::corrupt(format!("failed to read archive {}: {}", archive.display(), e))
}

fn infer_tar_root<R: Read>(reader: R, archive_path: &Path) -> Result<Option<PathBuf>, TransportFailure> {
    let mut archive = Archive::new(reader);
    let mut scan = RootScan::default();
    for entry in archive.entries().map_err(|e| corrupt(archive_path, e))? {
        let entry = entry.map_err(|e| corrupt(archive_path, e))?;
        if matches!(
            entry.header().entry_type(),
            tar::EntryType::XGlobalHeader | tar::EntryType::XHeader
        ) {
            continue;
        }
        let path = entry.path().map_err(|e| corrupt(archive_path, e))?;
        scan.observe(&path);
    }
    Ok(scan.single_root())
}

fn infer_zip_root<R: Read + Seek>(archive: &ZipArchive<R>) -> Option<PathBuf> {
    let mut scan = RootScan::default();
    for name in archive.file_names() {
        scan.observe(Path::new(name));
    }
    scan.single_root()
}

/// Returns `path` with `strip` leading components removed, or `None` when
/// nothing is left or the path tries to leave the target.
fn stripped(path: &Path, strip: usize) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components().skip(strip) {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (!out.as_os_str().is_empty()).then_some(out)
}

/// A symlink target is kept only when it is relative and never climbs out
/// of the directory holding the link.
fn is_contained_link(target: &Path) -> bool {
    !target.as_os_str().is_empty()
        && target
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

pub fn extract_archive(archive_path: &Path, target_dir: &Path) -> Result<(), TransportFailure> {
    let format = detect_format(archive_path)?;
    debug!(
        "Extracting archive '{}' ({:?}) to '{}'",
        archive_path.display(),
        format,
        target_dir.display()
    );
    fs::create_dir_all(target_dir)?;

    match format {
        ArchiveFormat::Zip => {
            let mut archive = ZipArchive::new(File::open(archive_path)?)
                .map_err(|e| corrupt(archive_path, e))?;
            let strip = usize::from(infer_zip_root(&archive).is_some());
            extract_zip(&mut archive, target_dir, strip, archive_path)
        }
        ArchiveFormat::TarGz => {
            let root = infer_tar_root(GzDecoder::new(File::open(archive_path)?), archive_path)?;
            let strip = usize::from(root.is_some());
            extract_tar(GzDecoder::new(File::open(archive_path)?), target_dir, strip, archive_path)
        }
        ArchiveFormat::Tar => {
            let root = infer_tar_root(File::open(archive_path)?, archive_path)?;
            let strip = usize::from(root.is_some());
            extract_tar(File::open(archive_path)?, target_dir, strip, archive_path)
        }
    }
}

/// Unpacks a tar stream, e.g. the output of `git archive`.
pub fn extract_tar<R: Read>(
    reader: R,
    target_dir: &Path,
    strip: usize,
    archive_path: &Path,
) -> Result<(), TransportFailure> {
    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.set_overwrite(true);
    fs::create_dir_all(target_dir)?;
    let root = fs::canonicalize(target_dir)?;

    for entry in archive.entries().map_err(|e| corrupt(archive_path, e))? {
        let mut entry = entry.map_err(|e| corrupt(archive_path, e))?;
        let entry_type = entry.header().entry_type();
        if matches!(
            entry_type,
            tar::EntryType::XGlobalHeader | tar::EntryType::XHeader
        ) {
            continue;
        }
        let original = entry.path().map_err(|e| corrupt(archive_path, e))?.into_owned();
        let Some(relative) = stripped(&original, strip) else {
            if original.components().any(|c| c == Component::ParentDir) {
                warn!(
                    "Skipping unsafe path {} in {}",
                    original.display(),
                    archive_path.display()
                );
            }
            continue;
        };
        if entry_type == tar::EntryType::Link {
            warn!(
                "Skipping hardlink {} in {}",
                original.display(),
                archive_path.display()
            );
            continue;
        }
        if entry_type == tar::EntryType::Symlink {
            let link = entry.link_name().map_err(|e| corrupt(archive_path, e))?;
            if !link.as_deref().is_some_and(is_contained_link) {
                warn!(
                    "Skipping symlink {} pointing outside the bundle in {}",
                    original.display(),
                    archive_path.display()
                );
                continue;
            }
        }
        let dest = target_dir.join(&relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
            if !fs::canonicalize(parent)?.starts_with(&root) {
                warn!(
                    "Skipping {} in {}: parent resolves outside {}",
                    original.display(),
                    archive_path.display(),
                    target_dir.display()
                );
                continue;
            }
        }
        entry.unpack(&dest).map_err(|e| {
            TransportFailure::local_io(format!(
                "failed to unpack {} to {}: {}",
                original.display(),
                dest.display(),
                e
            ))
        })?;
    }
    Ok(())
}

fn extract_zip<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    target_dir: &Path,
    strip: usize,
    archive_path: &Path,
) -> Result<(), TransportFailure> {
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(|e| corrupt(archive_path, e))?;
        let Some(enclosed) = file.enclosed_name() else {
            warn!(
                "Skipping unsafe path {} in {}",
                file.name(),
                archive_path.display()
            );
            continue;
        };
        let Some(relative) = stripped(&enclosed, strip) else {
            continue;
        };
        let dest = target_dir.join(relative);
        if file.is_dir() {
            fs::create_dir_all(&dest)?;
            continue;
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&dest)?;
        io::copy(&mut file, &mut out).map_err(|e| corrupt(archive_path, e))?;

        #[cfg(unix)]
        if let Some(mode) = file.unix_mode() {
            fs::set_permissions(&dest, fs::Permissions::from_mode(mode & 0o777))?;
        }
    }
    Ok(())
}

// bndl-common/src/cache.rs
// On-disk bundle cache: layout, lookup across roots, atomic install.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::descriptor::{DescriptorSpec, DescriptorType, EntityTarget, Locator, SHORT_HASH_LEN};
use crate::error::{BndlError, Result};

/// Written inside a staging directory right before it is renamed into place.
pub const COMPLETE_MARKER: &str = ".bndl-complete";
const STAGING_PREFIX: &str = ".staging-";
/// Hex characters of the repository hash appended to git entry names.
const LOCATOR_HASH_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    Primary,
    Fallback,
    ConfigLocal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRoot {
    pub path: PathBuf,
    pub kind: RootKind,
}

/// A complete entry found in one of the roots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheHit {
    pub path: PathBuf,
    pub root: RootKind,
}

/// A listed cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedEntry {
    pub root: RootKind,
    pub descriptor_type: DescriptorType,
    pub relative: PathBuf,
    pub path: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct CompletionRecord {
    descriptor: String,
    installed_at: String,
}

/// Owns the bundle cache directory tree. Only the primary root is ever
/// written to; fallback and config-local roots are populated externally.
#[derive(Debug, Clone)]
pub struct BundleCache {
    primary: PathBuf,
    fallbacks: Vec<PathBuf>,
    config_local: Option<PathBuf>,
}

impl BundleCache {
    pub fn new(primary: PathBuf, fallbacks: Vec<PathBuf>, config_local: Option<PathBuf>) -> Self {
        Self {
            primary,
            fallbacks,
            config_local,
        }
    }

    pub fn primary_root(&self) -> &Path {
        &self.primary
    }

    /// Roots in search order: primary, fallbacks, config-local.
    pub fn roots(&self) -> Vec<CacheRoot> {
        let mut roots = vec![CacheRoot {
            path: self.primary.clone(),
            kind: RootKind::Primary,
        }];
        roots.extend(self.fallbacks.iter().map(|p| CacheRoot {
            path: p.clone(),
            kind: RootKind::Fallback,
        }));
        if let Some(local) = &self.config_local {
            roots.push(CacheRoot {
                path: local.clone(),
                kind: RootKind::ConfigLocal,
            });
        }
        roots
    }

    /// Root-relative directory of a fully specified descriptor. `None` for
    /// types that are never cached or specs without a version.
    pub fn entry_relpath(spec: &DescriptorSpec) -> Option<PathBuf> {
        let version = spec.version()?;
        let type_dir = spec.descriptor_type().cache_dir_name()?;
        let mut rel = PathBuf::from(type_dir);
        match spec.locator() {
            Locator::AppStore { name, .. } | Locator::Manual { name } => {
                rel.push(segment(name));
                rel.push(segment(version));
            }
            Locator::Git { path } => {
                rel.push(repo_segment(path));
                rel.push(segment(version));
            }
            Locator::GitBranch { path, .. } => {
                rel.push(repo_segment(path));
                let short: String = version.chars().take(SHORT_HASH_LEN).collect();
                rel.push(segment(&short.to_ascii_lowercase()));
            }
            Locator::Shotgun {
                entity_type,
                field,
                target,
            } => {
                rel.push(segment(&format!("{entity_type}_{field}")));
                match target {
                    EntityTarget::Id(id) => rel.push(id.to_string()),
                    EntityTarget::Named { name, project_id } => {
                        rel.push(segment(&format!("p{project_id}_{name}")))
                    }
                }
                rel.push(format!("v{}", segment(version)));
            }
            Locator::Path { .. } | Locator::Dev { .. } => return None,
        }
        Some(rel)
    }

    /// Where the entry lives (or would live) in the primary root.
    pub fn primary_path(&self, spec: &DescriptorSpec) -> Option<PathBuf> {
        Self::entry_relpath(spec).map(|rel| self.primary.join(rel))
    }

    /// First complete entry across all roots, in search order.
    pub fn lookup(&self, spec: &DescriptorSpec) -> Option<CacheHit> {
        let rel = Self::entry_relpath(spec)?;
        // Manual payloads are always placed by external tooling.
        let external = spec.descriptor_type() == DescriptorType::Manual;
        for root in self.roots() {
            let candidate = root.path.join(&rel);
            let require_marker = root.kind == RootKind::Primary && !external;
            if is_complete(&candidate, require_marker) {
                debug!(
                    "Cache hit for {} in {:?} root: {}",
                    spec,
                    root.kind,
                    candidate.display()
                );
                return Some(CacheHit {
                    path: candidate,
                    root: root.kind,
                });
            }
        }
        debug!("Cache miss for {}", spec);
        None
    }

    /// Stages a fresh entry via `fetch` and renames it into place.
    ///
    /// `fetch` receives an empty staging directory inside the primary root.
    /// If another writer installs the same entry first, its copy wins and
    /// the staging directory is discarded. Errors from `fetch` are returned
    /// unchanged; the staging directory is removed either way.
    pub fn install_with<F>(&self, spec: &DescriptorSpec, fetch: F) -> Result<PathBuf>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        let tag = spec.tag();
        let rel = Self::entry_relpath(spec).ok_or_else(|| {
            BndlError::unsupported(tag.clone(), "descriptor has no cache entry")
        })?;
        let target = self.primary.join(&rel);
        let type_dir = self.primary.join(rel.iter().next().unwrap_or_default());

        fs::create_dir_all(&type_dir).map_err(|e| {
            BndlError::cache_write(
                tag.clone(),
                format!("failed to create {}: {e}", type_dir.display()),
            )
        })?;
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&type_dir)
            .map_err(|e| {
                BndlError::cache_write(
                    tag.clone(),
                    format!("failed to create staging dir in {}: {e}", type_dir.display()),
                )
            })?;
        debug!("Staging {} in {}", spec, staging.path().display());

        fetch(staging.path())?;

        let record = CompletionRecord {
            descriptor: spec.to_uri(),
            installed_at: humantime::format_rfc3339_seconds(SystemTime::now()).to_string(),
        };
        let record = serde_json::to_vec_pretty(&record)?;
        fs::write(staging.path().join(COMPLETE_MARKER), record).map_err(|e| {
            BndlError::cache_write(tag.clone(), format!("failed to write completion marker: {e}"))
        })?;

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                BndlError::cache_write(
                    tag.clone(),
                    format!("failed to create {}: {e}", parent.display()),
                )
            })?;
        }

        if target.exists() && !is_complete(&target, true) {
            warn!(
                "Replacing incomplete cache entry at {}",
                target.display()
            );
            evict(&target, &type_dir);
        }

        // The TempDir guard's cleanup is a no-op once the directory has been
        // renamed away.
        match fs::rename(staging.path(), &target) {
            Ok(()) => {
                debug!("Installed {} at {}", spec, target.display());
                Ok(target)
            }
            Err(e) if is_complete(&target, true) => {
                debug!(
                    "Lost install race for {} ({}), using existing entry {}",
                    spec,
                    e,
                    target.display()
                );
                Ok(target)
            }
            Err(e) => Err(BndlError::cache_write(
                tag,
                format!(
                    "failed to move {} to {}: {e}",
                    staging.path().display(),
                    target.display()
                ),
            )),
        }
    }

    /// Complete entries in every root.
    pub fn entries(&self) -> Vec<CachedEntry> {
        let mut found = Vec::new();
        for root in self.roots() {
            for descriptor_type in DescriptorType::ALL {
                let Some(type_dir) = descriptor_type.cache_dir_name() else {
                    continue;
                };
                let depth = if descriptor_type == DescriptorType::Shotgun { 4 } else { 3 };
                let base = root.path.join(type_dir);
                if !base.is_dir() {
                    continue;
                }
                for entry in WalkDir::new(&base)
                    .min_depth(depth - 1)
                    .max_depth(depth - 1)
                    .into_iter()
                    .filter_entry(|e| !is_staging(e.path()))
                    .filter_map(|e| e.ok())
                {
                    let path = entry.path();
                    if !is_complete(
                        path,
                        root.kind == RootKind::Primary && descriptor_type != DescriptorType::Manual,
                    ) {
                        continue;
                    }
                    let relative = path
                        .strip_prefix(&root.path)
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|_| path.to_path_buf());
                    found.push(CachedEntry {
                        root: root.kind,
                        descriptor_type,
                        relative,
                        path: path.to_path_buf(),
                    });
                }
            }
        }
        found
    }

    /// Removes staging directories in the primary root older than
    /// `max_age`. Returns how many were removed.
    pub fn sweep_staging(&self, max_age: Duration) -> Result<usize> {
        let mut removed = 0;
        let now = SystemTime::now();
        for descriptor_type in DescriptorType::ALL {
            let Some(type_dir) = descriptor_type.cache_dir_name() else {
                continue;
            };
            let base = self.primary.join(type_dir);
            if !base.is_dir() {
                continue;
            }
            for entry in fs::read_dir(&base)? {
                let entry = entry?;
                let path = entry.path();
                if !is_staging(&path) {
                    continue;
                }
                let age = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|modified| now.duration_since(modified).ok())
                    .unwrap_or_default();
                if age < max_age {
                    continue;
                }
                match fs::remove_dir_all(&path) {
                    Ok(()) => {
                        debug!("Removed abandoned staging dir {}", path.display());
                        removed += 1;
                    }
                    Err(e) => warn!("Failed to remove staging dir {}: {}", path.display(), e),
                }
            }
        }
        Ok(removed)
    }
}

fn is_staging(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(STAGING_PREFIX))
}

/// Entries written by this cache carry the marker. Entries placed by
/// external tooling count as complete when they are non-empty.
fn is_complete(path: &Path, require_marker: bool) -> bool {
    if !path.is_dir() {
        return false;
    }
    if path.join(COMPLETE_MARKER).is_file() {
        return true;
    }
    !require_marker && fs::read_dir(path).is_ok_and(|mut entries| entries.next().is_some())
}

/// Moves an incomplete entry out of the way and deletes it. Failures are
/// logged; a concurrent writer may have already replaced it.
///
/// Another writer can finish its install between the completeness check and
/// the rename here. An entry that turns out to carry the marker once moved
/// is put back instead of being deleted.
fn evict(target: &Path, type_dir: &Path) {
    let trash = match tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(type_dir)
    {
        Ok(trash) => trash,
        Err(e) => {
            warn!("Failed to create eviction dir in {}: {}", type_dir.display(), e);
            return;
        }
    };
    let evicted = trash.path().join("evicted");
    if let Err(e) = fs::rename(target, &evicted) {
        debug!("Could not evict {}: {}", target.display(), e);
        return;
    }
    if evicted.join(COMPLETE_MARKER).is_file() {
        debug!(
            "Entry at {} was completed concurrently, restoring it",
            target.display()
        );
        if let Err(e) = fs::rename(&evicted, target) {
            debug!("Could not restore {}: {}", target.display(), e);
        }
    }
}

/// `<basename>-<hash>`: repositories that share a basename but live at
/// different locations get separate entries.
fn repo_segment(path: &str) -> String {
    let trimmed = path.trim_end_matches(['/', '\\']);
    let digest = hex::encode(Sha256::digest(trimmed.as_bytes()));
    format!(
        "{}-{}",
        segment(&crate::descriptor::repo_basename(path)),
        &digest[..LOCATOR_HASH_LEN]
    )
}

/// Makes a user-supplied string safe to use as a single path component.
fn segment(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '+') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => format!("_{cleaned}"),
        _ => cleaned,
    }
}

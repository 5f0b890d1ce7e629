// bndl-core/src/transport/local.rs
//! Descriptors that never touch the network.

use std::fs;
use std::path::PathBuf;

use bndl_common::descriptor::PathSet;
use bndl_common::error::{BndlError, DescriptorTag, Result};
use bndl_common::version::LooseVersion;
use bndl_common::{expand, BundleCache, DescriptorSpec, PathContext};

/// `path` and `dev` descriptors: the bundle is used where it lives.
pub(crate) struct LocalTransport {
    paths: PathSet,
    tag: DescriptorTag,
}

impl LocalTransport {
    pub(crate) fn new(paths: PathSet, tag: DescriptorTag) -> Self {
        Self { paths, tag }
    }

    pub(crate) fn tag(&self) -> &DescriptorTag {
        &self.tag
    }

    /// The expanded location for the running platform.
    pub(crate) fn location(&self, path_context: &PathContext) -> Result<PathBuf> {
        let raw = self.paths.current_platform().ok_or_else(|| {
            BndlError::invalid(
                self.tag.locator.clone(),
                "no path given for the current platform",
            )
        })?;
        expand(raw, path_context)
    }
}

/// `manual` descriptors: someone else put the payload into a cache root.
pub(crate) struct ManualTransport {
    tag: DescriptorTag,
}

impl ManualTransport {
    pub(crate) fn new(tag: DescriptorTag) -> Self {
        Self { tag }
    }

    pub(crate) fn tag(&self) -> &DescriptorTag {
        &self.tag
    }

    /// Versions present under `manual/<name>/` in any root, oldest first.
    pub(crate) fn list_versions(&self, spec: &DescriptorSpec, cache: &BundleCache) -> Vec<String> {
        let unversioned = spec.with_version("0");
        let Some(rel) = BundleCache::entry_relpath(&unversioned) else {
            return Vec::new();
        };
        let Some(name_dir) = rel.parent() else {
            return Vec::new();
        };
        let mut versions: Vec<String> = cache
            .roots()
            .iter()
            .filter_map(|root| fs::read_dir(root.path.join(name_dir)).ok())
            .flat_map(|entries| entries.filter_map(|e| e.ok()))
            .filter(|e| e.path().is_dir())
            .filter_map(|e| e.file_name().to_str().map(str::to_string))
            .filter(|name| !name.starts_with('.'))
            .filter(|version| cache.lookup(&spec.with_version(version.as_str())).is_some())
            .collect();
        versions.sort_by_key(|v| LooseVersion::parse(v));
        versions.dedup();
        versions
    }
}

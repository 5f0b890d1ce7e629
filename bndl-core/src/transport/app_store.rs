// bndl-core/src/transport/app_store.rs
use std::path::Path;

use bndl_common::error::{BndlError, DescriptorTag, Result};
use bndl_common::version::latest_version;
use bndl_common::VersionPattern;
use bndl_net::RegistryVersion;
use tracing::{debug, error};

use super::{scratch_dir, TransportEnv};
use crate::extract::extract_archive;

pub(crate) struct AppStoreTransport {
    name: String,
    label: Option<String>,
    tag: DescriptorTag,
}

impl AppStoreTransport {
    pub(crate) fn new(name: &str, label: Option<String>, tag: DescriptorTag) -> Self {
        Self {
            name: name.to_string(),
            label,
            tag,
        }
    }

    fn index(&self, env: &TransportEnv) -> Result<Vec<RegistryVersion>> {
        let client = env.registry(&self.tag)?;
        client
            .list_versions(&self.name)
            .map_err(|e| e.into_error(self.tag.clone()))
    }

    /// Index entries this descriptor may pick from: all of them, or only
    /// those carrying the label.
    fn candidates(&self, env: &TransportEnv) -> Result<Vec<RegistryVersion>> {
        let index = self.index(env)?;
        let Some(label) = &self.label else {
            return Ok(index);
        };
        let labeled: Vec<RegistryVersion> =
            index.into_iter().filter(|v| v.has_label(label)).collect();
        if labeled.is_empty() {
            return Err(BndlError::NotFound {
                descriptor: self.tag.clone(),
                message: format!("no version of '{}' carries label '{}'", self.name, label),
            });
        }
        Ok(labeled)
    }

    pub(crate) fn list_versions(&self, env: &TransportEnv) -> Result<Vec<String>> {
        Ok(self
            .candidates(env)?
            .into_iter()
            .map(|v| v.version)
            .collect())
    }

    pub(crate) fn resolve_latest(
        &self,
        pattern: Option<&VersionPattern>,
        env: &TransportEnv,
    ) -> Result<String> {
        let candidates = self.candidates(env)?;
        let versions = candidates.iter().map(|v| v.version.as_str());
        let latest = match pattern {
            Some(pattern) => pattern.latest(versions),
            None => latest_version(versions),
        };
        let latest = latest.ok_or_else(|| BndlError::NotFound {
            descriptor: self.tag.clone(),
            message: match pattern {
                Some(p) => format!("no version of '{}' matches '{}'", self.name, p),
                None => format!("registry lists no versions of '{}'", self.name),
            },
        })?;
        debug!("Latest registry version of '{}' is {}", self.name, latest);
        Ok(latest.to_string())
    }

    pub(crate) fn fetch(&self, version: &str, staging: &Path, env: &TransportEnv) -> Result<()> {
        let index = self.index(env)?;
        let entry = index
            .iter()
            .find(|v| v.version == version)
            .ok_or_else(|| BndlError::NotFound {
                descriptor: self.tag.clone(),
                message: format!("registry has no version {} of '{}'", version, self.name),
            })?;

        let client = env.registry(&self.tag)?;
        let scratch = scratch_dir(&self.tag)?;
        let archive = scratch.path().join("bundle.archive");
        debug!("Downloading {} {} from {}", self.name, version, entry.url);
        client.download(entry, &archive).map_err(|e| {
            error!("Download of {} {} failed: {}", self.name, version, e);
            e.into_error(self.tag.clone())
        })?;
        extract_archive(&archive, staging).map_err(|e| e.into_error(self.tag.clone()))
    }
}

// bndl-net/src/registry.rs
//! Client for the bundle registry's version index.
//!
//! `GET {base}/api/v1/bundles/{name}/versions` answers with
//!
//! ```json
//! { "versions": [ { "version": "v1.2.3", "labels": ["stable"],
//!                   "url": "https://cdn/.../v1.2.3.zip", "sha256": "..." } ] }
//! ```
//!
//! Download URLs may be relative to the registry base.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bndl_common::error::{BndlError, Result, TransportFailure};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::http::{build_http_client, download_to_file, get_json};
use crate::validation::validate_url;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegistryVersion {
    pub version: String,
    #[serde(default)]
    pub labels: Vec<String>,
    pub url: String,
    #[serde(default)]
    pub sha256: Option<String>,
}

impl RegistryVersion {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

#[derive(Debug, Deserialize)]
struct VersionIndex {
    versions: Vec<RegistryVersion>,
}

#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: Url,
    client: Client,
    allow_insecure: bool,
}

impl RegistryClient {
    pub fn new(
        base_url: &str,
        token: Option<&str>,
        timeout: Duration,
        allow_insecure: bool,
    ) -> Result<Self> {
        let base_url = validate_url(base_url, allow_insecure)
            .map_err(|e| BndlError::Config(format!("registry URL: {}", e.message)))?;
        if base_url.cannot_be_a_base() {
            return Err(BndlError::Config(format!(
                "registry URL '{base_url}' cannot be used as a base"
            )));
        }
        Ok(Self {
            base_url,
            client: build_http_client(timeout, token)?,
            allow_insecure,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The index URL for `name`, with the name percent-encoded as a single
    /// path segment.
    pub fn versions_url(&self, name: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["api", "v1", "bundles", name, "versions"]);
        }
        url
    }

    pub fn list_versions(
        &self,
        name: &str,
    ) -> std::result::Result<Vec<RegistryVersion>, TransportFailure> {
        let url = self.versions_url(name);
        let index: VersionIndex = get_json(&self.client, url.as_str(), None)?;
        debug!(
            "Registry lists {} version(s) of '{}'",
            index.versions.len(),
            name
        );
        Ok(index.versions)
    }

    /// Downloads the archive of `entry` to `dest`.
    pub fn download(
        &self,
        entry: &RegistryVersion,
        dest: &Path,
    ) -> std::result::Result<PathBuf, TransportFailure> {
        let url = self.base_url.join(&entry.url).map_err(|e| {
            TransportFailure::corrupt(format!(
                "registry published an invalid URL '{}': {e}",
                entry.url
            ))
        })?;
        let url = validate_url(url.as_str(), self.allow_insecure)?;
        download_to_file(&self.client, url.as_str(), dest, entry.sha256.as_deref(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_index_url_under_base_path() {
        let client =
            RegistryClient::new("https://reg.example.com/mirror/", None, Duration::from_secs(5), false)
                .unwrap();
        assert_eq!(
            client.versions_url("tk-multi loader").as_str(),
            "https://reg.example.com/mirror/api/v1/bundles/tk-multi%20loader/versions"
        );
    }

    #[test]
    fn rejects_insecure_registry_without_opt_in() {
        let err = RegistryClient::new("http://reg.example.com", None, Duration::from_secs(5), false)
            .unwrap_err();
        assert!(matches!(err, BndlError::Config(_)));
    }
}

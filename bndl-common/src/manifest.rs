// bndl-common/src/manifest.rs
//! The small part of a bundle manifest that resolution needs.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{BndlError, Result};

pub const MANIFEST_FILENAME: &str = "bundle.toml";

/// `bundle.toml` at the root of a bundle:
///
/// ```toml
/// name = "tk-config-basic"
/// version = "v1.4.2"
///
/// [core]
/// type = "app_store"
/// name = "tk-core"
/// version = "v0.20.6"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BundleManifest {
    pub name: Option<String>,
    pub version: Option<String>,
    #[serde(default)]
    core: Option<toml::Table>,
}

impl BundleManifest {
    /// The declared required-core descriptor as a flat dictionary.
    pub fn core_descriptor(&self) -> Result<Option<BTreeMap<String, String>>> {
        let Some(table) = &self.core else {
            return Ok(None);
        };
        let mut fields = BTreeMap::new();
        for (key, value) in table {
            let value = match value {
                toml::Value::String(s) => s.clone(),
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                other => {
                    return Err(BndlError::invalid(
                        format!("[core] {key}"),
                        format!("unsupported value type '{}'", other.type_str()),
                    ))
                }
            };
            fields.insert(key.clone(), value);
        }
        Ok(Some(fields))
    }
}

/// Reads a bundle's declared name, version and required core.
pub trait ManifestReader: Send + Sync {
    fn read(&self, bundle_root: &Path) -> Result<BundleManifest>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TomlManifestReader;

impl ManifestReader for TomlManifestReader {
    fn read(&self, bundle_root: &Path) -> Result<BundleManifest> {
        let path = bundle_root.join(MANIFEST_FILENAME);
        if !path.is_file() {
            debug!("No manifest at {}, using empty manifest", path.display());
            return Ok(BundleManifest::default());
        }
        let raw = fs::read_to_string(&path)?;
        toml::from_str(&raw).map_err(|e| BndlError::InvalidManifest {
            path: path.clone(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_core_declaration() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(MANIFEST_FILENAME),
            r#"
name = "tk-config-basic"
version = "v1.4.2"

[core]
type = "shotgun"
entity_type = "PipelineConfiguration"
field = "core"
id = 12
version = 345
"#,
        )
        .unwrap();

        let manifest = TomlManifestReader.read(dir.path()).unwrap();
        assert_eq!(manifest.name.as_deref(), Some("tk-config-basic"));
        let core = manifest.core_descriptor().unwrap().unwrap();
        assert_eq!(core["type"], "shotgun");
        assert_eq!(core["id"], "12");
        assert_eq!(core["version"], "345");
    }

    #[test]
    fn missing_manifest_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = TomlManifestReader.read(dir.path()).unwrap();
        assert!(manifest.core_descriptor().unwrap().is_none());
    }

    #[test]
    fn malformed_manifest_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(MANIFEST_FILENAME), "name = [").unwrap();
        let err = TomlManifestReader.read(dir.path()).unwrap_err();
        assert!(matches!(err, BndlError::InvalidManifest { .. }));
    }
}

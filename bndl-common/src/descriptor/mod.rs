// bndl-common/src/descriptor/mod.rs
//! The descriptor model: what a bundle request names, independent of how it
//! is written down.
//!
//! A descriptor can be written as a URI (`bndl:descriptor:git?path=...`) or
//! as a flat string dictionary. Both parse into a [`DescriptorSpec`], which
//! carries the typed [`Locator`] fields for exactly one [`DescriptorType`].

mod expand;
mod uri;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use self::expand::{expand, PathContext};
pub use self::uri::{is_descriptor_version_missing, Representation, LEGACY_SCHEMES, URI_SCHEME};
use crate::error::{BndlError, DescriptorTag, Result};

/// Number of hex characters of a commit hash that identify a branch entry.
pub const SHORT_HASH_LEN: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DescriptorType {
    AppStore,
    Shotgun,
    Git,
    GitBranch,
    Path,
    Dev,
    Manual,
}

impl DescriptorType {
    pub const ALL: [DescriptorType; 7] = [
        DescriptorType::AppStore,
        DescriptorType::Shotgun,
        DescriptorType::Git,
        DescriptorType::GitBranch,
        DescriptorType::Path,
        DescriptorType::Dev,
        DescriptorType::Manual,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AppStore => "app_store",
            Self::Shotgun => "shotgun",
            Self::Git => "git",
            Self::GitBranch => "git_branch",
            Self::Path => "path",
            Self::Dev => "dev",
            Self::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Keys a dictionary of this type may carry besides `type`.
    pub fn allowed_keys(self) -> &'static [&'static str] {
        match self {
            Self::AppStore => &["name", "version", "label"],
            Self::Shotgun => &["entity_type", "field", "id", "name", "project_id", "version"],
            Self::Git => &["path", "version"],
            Self::GitBranch => &["path", "branch", "version"],
            Self::Path | Self::Dev => &[
                "path",
                "linux_path",
                "mac_path",
                "windows_path",
                "name",
                "version",
            ],
            Self::Manual => &["name", "version"],
        }
    }

    /// Whether a concrete version must be present for the descriptor to be
    /// usable.
    pub fn requires_version(self) -> bool {
        !matches!(self, Self::Path | Self::Dev)
    }

    /// Whether the transport can discover available versions.
    pub fn supports_latest(self) -> bool {
        matches!(
            self,
            Self::AppStore | Self::Shotgun | Self::Git | Self::GitBranch
        )
    }

    /// Path and dev descriptors read from their live location and are never
    /// copied into a bundle cache.
    pub fn is_cacheable(self) -> bool {
        !matches!(self, Self::Path | Self::Dev)
    }

    /// First segment of the on-disk cache layout for this type.
    pub fn cache_dir_name(self) -> Option<&'static str> {
        match self {
            Self::AppStore => Some("app_store"),
            Self::Shotgun => Some("sg"),
            Self::Git => Some("git"),
            Self::GitBranch => Some("gitbranch"),
            Self::Manual => Some("manual"),
            Self::Path | Self::Dev => None,
        }
    }
}

impl fmt::Display for DescriptorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    App,
    Engine,
    Framework,
    Config,
    Core,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Engine => "engine",
            Self::Framework => "framework",
            Self::Config => "config",
            Self::Core => "core",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "app" => Ok(Self::App),
            "engine" => Ok(Self::Engine),
            "framework" => Ok(Self::Framework),
            "config" => Ok(Self::Config),
            "core" => Ok(Self::Core),
            other => Err(format!(
                "unknown category '{other}' (expected app, engine, framework, config or core)"
            )),
        }
    }
}

/// How an attachment descriptor identifies its entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityTarget {
    Id(u64),
    Named { name: String, project_id: u64 },
}

/// The platform-specific path keys of a path/dev descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct PathSet {
    pub path: Option<String>,
    pub linux_path: Option<String>,
    pub mac_path: Option<String>,
    pub windows_path: Option<String>,
}

impl PathSet {
    /// The raw, unexpanded path for the running platform.
    pub fn current_platform(&self) -> Option<&str> {
        let specific = if cfg!(target_os = "windows") {
            self.windows_path.as_deref()
        } else if cfg!(target_os = "macos") {
            self.mac_path.as_deref()
        } else {
            self.linux_path.as_deref()
        };
        specific.or(self.path.as_deref())
    }

    fn is_empty(&self) -> bool {
        self.path.is_none()
            && self.linux_path.is_none()
            && self.mac_path.is_none()
            && self.windows_path.is_none()
    }

    fn write_fields(&self, fields: &mut BTreeMap<String, String>) {
        let keys = [
            ("path", &self.path),
            ("linux_path", &self.linux_path),
            ("mac_path", &self.mac_path),
            ("windows_path", &self.windows_path),
        ];
        for (key, value) in keys {
            if let Some(value) = value {
                fields.insert(key.to_string(), value.clone());
            }
        }
    }
}

/// Type-specific locator fields, one variant per [`DescriptorType`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Locator {
    AppStore {
        name: String,
        label: Option<String>,
    },
    Shotgun {
        entity_type: String,
        field: String,
        target: EntityTarget,
    },
    Git {
        path: String,
    },
    GitBranch {
        path: String,
        branch: String,
    },
    Path {
        paths: PathSet,
        name: Option<String>,
    },
    Dev {
        paths: PathSet,
        name: Option<String>,
    },
    Manual {
        name: String,
    },
}

impl Locator {
    pub fn descriptor_type(&self) -> DescriptorType {
        match self {
            Self::AppStore { .. } => DescriptorType::AppStore,
            Self::Shotgun { .. } => DescriptorType::Shotgun,
            Self::Git { .. } => DescriptorType::Git,
            Self::GitBranch { .. } => DescriptorType::GitBranch,
            Self::Path { .. } => DescriptorType::Path,
            Self::Dev { .. } => DescriptorType::Dev,
            Self::Manual { .. } => DescriptorType::Manual,
        }
    }
}

/// A validated, in-memory descriptor request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DescriptorSpec {
    category: Category,
    locator: Locator,
    version: Option<String>,
}

impl DescriptorSpec {
    /// Parses either representation. A missing `version` is only accepted
    /// for types that carry none, unless `allow_missing_version` is set.
    pub fn parse(
        representation: &Representation,
        category: Category,
        allow_missing_version: bool,
    ) -> Result<Self> {
        let fields = representation.to_fields()?;
        Self::from_fields(&fields, category, allow_missing_version)
    }

    pub fn from_fields(
        fields: &BTreeMap<String, String>,
        category: Category,
        allow_missing_version: bool,
    ) -> Result<Self> {
        let raw = uri::render_for_error(fields);
        let invalid = |message: String| BndlError::invalid(raw.clone(), message);

        let type_str = fields
            .get("type")
            .ok_or_else(|| invalid("missing required key 'type'".to_string()))?;
        let descriptor_type = DescriptorType::parse(type_str)
            .ok_or_else(|| invalid(format!("unknown descriptor type '{type_str}'")))?;

        let allowed = descriptor_type.allowed_keys();
        if let Some(unknown) = fields
            .keys()
            .find(|k| k.as_str() != "type" && !allowed.contains(&k.as_str()))
        {
            return Err(invalid(format!(
                "unknown key '{unknown}' for descriptor type '{descriptor_type}'"
            )));
        }
        if let Some((key, _)) = fields.iter().find(|(_, v)| v.is_empty()) {
            return Err(invalid(format!("key '{key}' has an empty value")));
        }

        // Git locators end up on a git command line.
        if matches!(descriptor_type, DescriptorType::Git | DescriptorType::GitBranch) {
            if let Some((key, _)) = fields
                .iter()
                .find(|(k, v)| k.as_str() != "type" && v.starts_with('-'))
            {
                return Err(invalid(format!("key '{key}' must not start with '-'")));
            }
        }

        let opt = |key: &str| fields.get(key).cloned();
        let required = |key: &str| {
            fields.get(key).cloned().ok_or_else(|| {
                invalid(format!(
                    "missing required key '{key}' for descriptor type '{descriptor_type}'"
                ))
            })
        };
        let parse_id = |key: &str, value: &str| {
            value.parse::<u64>().map_err(|_| {
                invalid(format!("key '{key}' must be an integer, got '{value}'"))
            })
        };

        let version = opt("version");
        if version.is_none() && descriptor_type.requires_version() && !allow_missing_version {
            return Err(invalid(format!(
                "missing required key 'version' for descriptor type '{descriptor_type}'"
            )));
        }

        let locator = match descriptor_type {
            DescriptorType::AppStore => Locator::AppStore {
                name: required("name")?,
                label: opt("label"),
            },
            DescriptorType::Shotgun => {
                let target = match (opt("id"), opt("name"), opt("project_id")) {
                    (Some(id), None, None) => EntityTarget::Id(parse_id("id", &id)?),
                    (None, Some(name), Some(project_id)) => EntityTarget::Named {
                        name,
                        project_id: parse_id("project_id", &project_id)?,
                    },
                    (Some(_), _, _) => {
                        return Err(invalid(
                            "'id' cannot be combined with 'name' or 'project_id'".to_string(),
                        ))
                    }
                    _ => {
                        return Err(invalid(
                            "shotgun descriptors need either 'id' or both 'name' and 'project_id'"
                                .to_string(),
                        ))
                    }
                };
                if let Some(version) = &version {
                    parse_id("version", version)?;
                }
                Locator::Shotgun {
                    entity_type: required("entity_type")?,
                    field: required("field")?,
                    target,
                }
            }
            DescriptorType::Git => Locator::Git {
                path: required("path")?,
            },
            DescriptorType::GitBranch => {
                if let Some(version) = &version {
                    if version.len() < SHORT_HASH_LEN
                        || !version.chars().all(|c| c.is_ascii_hexdigit())
                    {
                        return Err(invalid(format!(
                            "git_branch version must be a commit hash of at least {SHORT_HASH_LEN} hex characters, got '{version}'"
                        )));
                    }
                }
                Locator::GitBranch {
                    path: required("path")?,
                    branch: required("branch")?,
                }
            }
            DescriptorType::Path | DescriptorType::Dev => {
                let paths = PathSet {
                    path: opt("path"),
                    linux_path: opt("linux_path"),
                    mac_path: opt("mac_path"),
                    windows_path: opt("windows_path"),
                };
                if paths.is_empty() {
                    return Err(invalid(format!(
                        "descriptor type '{descriptor_type}' needs one of 'path', 'linux_path', 'mac_path' or 'windows_path'"
                    )));
                }
                let name = opt("name");
                if descriptor_type == DescriptorType::Dev {
                    Locator::Dev { paths, name }
                } else {
                    Locator::Path { paths, name }
                }
            }
            DescriptorType::Manual => Locator::Manual {
                name: required("name")?,
            },
        };

        Ok(Self {
            category,
            locator,
            version,
        })
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn descriptor_type(&self) -> DescriptorType {
        self.locator.descriptor_type()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// A copy of this spec pinned to `version`.
    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self {
            category: self.category,
            locator: self.locator.clone(),
            version: Some(version.into()),
        }
    }

    /// The dictionary representation, including `type`.
    pub fn to_fields(&self) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        fields.insert(
            "type".to_string(),
            self.descriptor_type().as_str().to_string(),
        );
        match &self.locator {
            Locator::AppStore { name, label } => {
                fields.insert("name".into(), name.clone());
                if let Some(label) = label {
                    fields.insert("label".into(), label.clone());
                }
            }
            Locator::Shotgun {
                entity_type,
                field,
                target,
            } => {
                fields.insert("entity_type".into(), entity_type.clone());
                fields.insert("field".into(), field.clone());
                match target {
                    EntityTarget::Id(id) => {
                        fields.insert("id".into(), id.to_string());
                    }
                    EntityTarget::Named { name, project_id } => {
                        fields.insert("name".into(), name.clone());
                        fields.insert("project_id".into(), project_id.to_string());
                    }
                }
            }
            Locator::Git { path } => {
                fields.insert("path".into(), path.clone());
            }
            Locator::GitBranch { path, branch } => {
                fields.insert("path".into(), path.clone());
                fields.insert("branch".into(), branch.clone());
            }
            Locator::Path { paths, name } | Locator::Dev { paths, name } => {
                paths.write_fields(&mut fields);
                if let Some(name) = name {
                    fields.insert("name".into(), name.clone());
                }
            }
            Locator::Manual { name } => {
                fields.insert("name".into(), name.clone());
            }
        }
        if let Some(version) = &self.version {
            fields.insert("version".into(), version.clone());
        }
        fields
    }

    /// The normalized URI representation.
    pub fn to_uri(&self) -> String {
        uri::fields_to_uri(&self.to_fields())
    }

    /// Short human-readable locator used in error messages and logs.
    pub fn locator_label(&self) -> String {
        match &self.locator {
            Locator::AppStore { name, .. } | Locator::Manual { name } => name.clone(),
            Locator::Shotgun {
                entity_type,
                field,
                target,
            } => match target {
                EntityTarget::Id(id) => format!("{entity_type}:{id}.{field}"),
                EntityTarget::Named { name, project_id } => {
                    format!("{entity_type}:{name}@project{project_id}.{field}")
                }
            },
            Locator::Git { path } => path.clone(),
            Locator::GitBranch { path, branch } => format!("{path}#{branch}"),
            Locator::Path { paths, .. } | Locator::Dev { paths, .. } => {
                paths.current_platform().unwrap_or_default().to_string()
            }
        }
    }

    /// The bundle's short name as used in cache paths and listings.
    pub fn system_name(&self) -> String {
        match &self.locator {
            Locator::AppStore { name, .. } | Locator::Manual { name } => name.clone(),
            Locator::Shotgun {
                entity_type,
                target,
                ..
            } => match target {
                EntityTarget::Id(id) => format!("{entity_type}_{id}"),
                EntityTarget::Named { name, .. } => name.clone(),
            },
            Locator::Git { path } | Locator::GitBranch { path, .. } => repo_basename(path),
            Locator::Path { paths, name } | Locator::Dev { paths, name } => {
                name.clone().unwrap_or_else(|| {
                    repo_basename(paths.current_platform().unwrap_or_default())
                })
            }
        }
    }

    pub fn tag(&self) -> DescriptorTag {
        DescriptorTag {
            descriptor_type: self.descriptor_type(),
            category: self.category,
            locator: self.locator_label(),
        }
    }
}

impl fmt::Display for DescriptorSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uri())
    }
}

/// Last path component of a repository location, e.g. `tk-config.git` for
/// both `https://host/org/tk-config.git` and `git@host:org/tk-config.git`.
pub fn repo_basename(path: &str) -> String {
    let trimmed = path.trim_end_matches(['/', '\\']);
    trimmed
        .rsplit(['/', '\\', ':'])
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(trimmed)
        .to_string()
}

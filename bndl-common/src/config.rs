// bndl-common/src/config.rs
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use tracing::debug;

use super::error::{BndlError, Result};

pub const BUNDLE_CACHE_PATH_VAR: &str = "BNDL_BUNDLE_CACHE_PATH";
pub const FALLBACK_PATHS_VAR: &str = "BNDL_BUNDLE_CACHE_FALLBACK_PATHS";
pub const DISABLE_REGISTRY_VAR: &str = "BNDL_DISABLE_REGISTRY_ACCESS";
pub const REGISTRY_URL_VAR: &str = "BNDL_REGISTRY_URL";
pub const REGISTRY_TOKEN_VAR: &str = "BNDL_REGISTRY_TOKEN";
pub const SITE_URL_VAR: &str = "BNDL_SITE_URL";
pub const SITE_TOKEN_VAR: &str = "BNDL_SITE_TOKEN";
pub const TIMEOUT_SECS_VAR: &str = "BNDL_TIMEOUT_SECS";
pub const ALLOW_INSECURE_HTTP_VAR: &str = "BNDL_ALLOW_INSECURE_HTTP";
pub const GIT_EXECUTABLE_VAR: &str = "BNDL_GIT";

pub const DEFAULT_REGISTRY_URL: &str = "https://registry.bndl.dev";
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Process-level settings, read once by the CLI and turned into a
/// resolution context. Nothing below the CLI reads the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub bundle_cache_path: PathBuf,
    pub fallback_paths: Vec<PathBuf>,
    pub registry_disabled: bool,
    pub registry_url: String,
    pub registry_token: Option<String>,
    pub site_url: Option<String>,
    pub site_token: Option<String>,
    pub timeout: Duration,
    pub allow_insecure_http: bool,
    pub git_executable: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        debug!("Loading bndl configuration");
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|s| !s.trim().is_empty());

        let bundle_cache_path = match non_empty(BUNDLE_CACHE_PATH_VAR) {
            Some(path) => PathBuf::from(path),
            None => {
                let default = default_cache_root();
                debug!(
                    "{} not set, falling back to default: {}",
                    BUNDLE_CACHE_PATH_VAR,
                    default.display()
                );
                default
            }
        };

        let fallback_paths = non_empty(FALLBACK_PATHS_VAR)
            .map(|list| {
                env::split_paths(&list)
                    .filter(|p| !p.as_os_str().is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let timeout = match non_empty(TIMEOUT_SECS_VAR) {
            Some(raw) => Duration::from_secs(raw.trim().parse::<u64>().map_err(|e| {
                BndlError::Config(format!("{TIMEOUT_SECS_VAR}='{raw}' is not a number: {e}"))
            })?),
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let config = Self {
            bundle_cache_path,
            fallback_paths,
            registry_disabled: non_empty(DISABLE_REGISTRY_VAR).is_some_and(|v| is_truthy(&v)),
            registry_url: non_empty(REGISTRY_URL_VAR)
                .unwrap_or_else(|| DEFAULT_REGISTRY_URL.to_string()),
            registry_token: non_empty(REGISTRY_TOKEN_VAR),
            site_url: non_empty(SITE_URL_VAR),
            site_token: non_empty(SITE_TOKEN_VAR),
            timeout,
            allow_insecure_http: non_empty(ALLOW_INSECURE_HTTP_VAR)
                .is_some_and(|v| is_truthy(&v)),
            git_executable: non_empty(GIT_EXECUTABLE_VAR).map(PathBuf::from),
        };
        debug!("Effective bundle cache root: {}", config.bundle_cache_path.display());
        debug!("Configuration loaded successfully.");
        Ok(config)
    }

    pub fn bundle_cache_path(&self) -> &Path {
        &self.bundle_cache_path
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.bundle_cache_path.join("logs")
    }
}

fn default_cache_root() -> PathBuf {
    ProjectDirs::from("", "", "bndl")
        .map(|dirs| dirs.cache_dir().join("bundle_cache"))
        .unwrap_or_else(|| env::temp_dir().join("bndl").join("bundle_cache"))
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn reads_cache_roots_and_flags() {
        let sep = if cfg!(windows) { ";" } else { ":" };
        let fallbacks = format!("/mnt/a{sep}/mnt/b");
        let config = Config::from_lookup(lookup(&[
            (BUNDLE_CACHE_PATH_VAR, "/var/bndl"),
            (FALLBACK_PATHS_VAR, &fallbacks),
            (DISABLE_REGISTRY_VAR, "1"),
            (TIMEOUT_SECS_VAR, "12"),
        ]))
        .unwrap();
        assert_eq!(config.bundle_cache_path, PathBuf::from("/var/bndl"));
        assert_eq!(
            config.fallback_paths,
            vec![PathBuf::from("/mnt/a"), PathBuf::from("/mnt/b")]
        );
        assert!(config.registry_disabled);
        assert_eq!(config.timeout, Duration::from_secs(12));
        assert_eq!(config.registry_url, DEFAULT_REGISTRY_URL);
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert!(config.fallback_paths.is_empty());
        assert!(!config.registry_disabled);
        assert!(config.bundle_cache_path.ends_with("bundle_cache"));
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
    }

    #[test]
    fn rejects_bad_timeout() {
        let err = Config::from_lookup(lookup(&[(TIMEOUT_SECS_VAR, "soon")])).unwrap_err();
        assert!(matches!(err, BndlError::Config(_)));
    }
}

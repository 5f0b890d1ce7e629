// bndl-core/src/context.rs
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bndl_common::config::{Config, DEFAULT_REGISTRY_URL, DEFAULT_TIMEOUT_SECS};
use bndl_common::error::Result;
use bndl_common::manifest::{ManifestReader, TomlManifestReader};
use bndl_common::store::EntityStore;
use bndl_common::PathContext;
use bndl_net::RestEntityStore;
use tracing::debug;

use crate::git::{GitBackend, GitCli};

/// Everything a resolution may depend on, passed in explicitly. The engine
/// never reads the process environment itself.
#[derive(Clone)]
pub struct ResolutionContext {
    pub primary_root: PathBuf,
    pub fallback_roots: Vec<PathBuf>,
    /// Bundle cache shipped inside a pipeline configuration; searched last.
    pub config_bundle_cache: Option<PathBuf>,
    pub registry_disabled: bool,
    pub registry_url: String,
    pub registry_token: Option<String>,
    pub allow_insecure_http: bool,
    /// Budget for each remote operation.
    pub timeout: Duration,
    pub path_context: PathContext,
    pub git: Arc<dyn GitBackend>,
    pub entity_store: Option<Arc<dyn EntityStore>>,
    pub manifest_reader: Arc<dyn ManifestReader>,
}

impl ResolutionContext {
    /// A context with defaults: system git, no entity store, registry at
    /// its public address.
    pub fn new(primary_root: impl Into<PathBuf>) -> Self {
        Self {
            primary_root: primary_root.into(),
            fallback_roots: Vec::new(),
            config_bundle_cache: None,
            registry_disabled: false,
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            registry_token: None,
            allow_insecure_http: false,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            path_context: PathContext::default(),
            git: Arc::new(GitCli::default()),
            entity_store: None,
            manifest_reader: Arc::new(TomlManifestReader),
        }
    }

    /// Builds the context the CLI runs with.
    pub fn from_config(config: &Config) -> Result<Self> {
        let entity_store: Option<Arc<dyn EntityStore>> = match &config.site_url {
            Some(site) => {
                debug!("Using REST entity store at {}", site);
                Some(Arc::new(RestEntityStore::new(
                    site,
                    config.site_token.as_deref(),
                    config.timeout,
                    config.allow_insecure_http,
                )?))
            }
            None => None,
        };
        Ok(Self {
            primary_root: config.bundle_cache_path.clone(),
            fallback_roots: config.fallback_paths.clone(),
            config_bundle_cache: None,
            registry_disabled: config.registry_disabled,
            registry_url: config.registry_url.clone(),
            registry_token: config.registry_token.clone(),
            allow_insecure_http: config.allow_insecure_http,
            timeout: config.timeout,
            path_context: PathContext::from_process(),
            git: Arc::new(GitCli::new(config.git_executable.clone())),
            entity_store,
            manifest_reader: Arc::new(TomlManifestReader),
        })
    }

    pub fn with_fallback_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.fallback_roots = roots;
        self
    }

    pub fn with_config_bundle_cache(mut self, root: impl Into<PathBuf>) -> Self {
        self.config_bundle_cache = Some(root.into());
        self
    }

    pub fn with_registry(mut self, url: impl Into<String>, token: Option<String>) -> Self {
        self.registry_url = url.into();
        self.registry_token = token;
        self
    }

    pub fn with_registry_disabled(mut self, disabled: bool) -> Self {
        self.registry_disabled = disabled;
        self
    }

    pub fn with_insecure_http(mut self, allow: bool) -> Self {
        self.allow_insecure_http = allow;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_path_context(mut self, path_context: PathContext) -> Self {
        self.path_context = path_context;
        self
    }

    pub fn with_git(mut self, git: Arc<dyn GitBackend>) -> Self {
        self.git = git;
        self
    }

    pub fn with_entity_store(mut self, store: Arc<dyn EntityStore>) -> Self {
        self.entity_store = Some(store);
        self
    }

    pub fn with_manifest_reader(mut self, reader: Arc<dyn ManifestReader>) -> Self {
        self.manifest_reader = reader;
        self
    }
}

impl fmt::Debug for ResolutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolutionContext")
            .field("primary_root", &self.primary_root)
            .field("fallback_roots", &self.fallback_roots)
            .field("config_bundle_cache", &self.config_bundle_cache)
            .field("registry_disabled", &self.registry_disabled)
            .field("registry_url", &self.registry_url)
            .field("registry_token", &self.registry_token.as_ref().map(|_| "<redacted>"))
            .field("allow_insecure_http", &self.allow_insecure_http)
            .field("timeout", &self.timeout)
            .field("entity_store", &self.entity_store.is_some())
            .finish_non_exhaustive()
    }
}

// bndl-core/src/resolver.rs
//! Turns descriptor representations into handles and handles into local
//! directories.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use bndl_common::error::{BndlError, Result};
use bndl_common::manifest::MANIFEST_FILENAME;
use bndl_common::{BundleCache, Category, DescriptorSpec, DescriptorType, Representation, VersionPattern};
use tracing::debug;

use crate::context::ResolutionContext;
use crate::transport::{Session, Transport, TransportEnv};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreateOptions {
    /// Resolve the newest available version right away. `version` may then
    /// be left out of the representation.
    pub resolve_latest: bool,
}

pub(crate) struct ResolverShared {
    pub(crate) env: TransportEnv,
    inflight: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl ResolverShared {
    /// The in-process lock for one cache entry.
    fn entry_lock(&self, key: &Path) -> Arc<Mutex<()>> {
        let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(inflight.entry(key.to_path_buf()).or_default())
    }

    fn release_entry_lock(&self, key: &Path, lock: Arc<Mutex<()>>) {
        let mut inflight = self.inflight.lock().unwrap_or_else(PoisonError::into_inner);
        // One reference in the map, one held here: nobody else is waiting.
        if Arc::strong_count(&lock) == 2 {
            inflight.remove(key);
        }
    }
}

/// Entry point of the engine. Cheap to clone; clones share the in-process
/// fetch coalescing and the registry client.
#[derive(Clone)]
pub struct Resolver {
    shared: Arc<ResolverShared>,
}

impl Resolver {
    pub fn new(ctx: ResolutionContext) -> Self {
        debug!("Creating resolver for cache root {}", ctx.primary_root.display());
        Self {
            shared: Arc::new(ResolverShared {
                env: TransportEnv::new(ctx),
                inflight: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn context(&self) -> &ResolutionContext {
        &self.shared.env.ctx
    }

    pub fn cache(&self) -> &BundleCache {
        &self.shared.env.cache
    }

    /// Parses `representation` into a handle. No I/O happens unless
    /// `options.resolve_latest` is set.
    pub fn create_descriptor(
        &self,
        representation: impl Into<Representation>,
        category: Category,
        options: CreateOptions,
    ) -> Result<DescriptorHandle> {
        if options.resolve_latest {
            return self.latest_descriptor(representation, category, None);
        }
        let spec = DescriptorSpec::parse(&representation.into(), category, false)?;
        Ok(self.handle_for(spec))
    }

    /// Parses `representation`, which may leave out `version`, and pins it
    /// to the newest version matching `pattern` with a single lookup.
    /// Path and dev descriptors are returned as given.
    pub fn latest_descriptor(
        &self,
        representation: impl Into<Representation>,
        category: Category,
        pattern: Option<&str>,
    ) -> Result<DescriptorHandle> {
        let representation = representation.into();
        let spec = DescriptorSpec::parse(&representation, category, true)?;
        let handle = self.handle_for(spec);
        if handle.descriptor_type().supports_latest() {
            return handle.find_latest_version(pattern);
        }
        if handle.version().is_none() && handle.descriptor_type().requires_version() {
            return Err(BndlError::invalid(
                representation.to_string(),
                format!(
                    "descriptor type '{}' cannot resolve a latest version, 'version' is required",
                    handle.descriptor_type()
                ),
            ));
        }
        Ok(handle)
    }

    pub(crate) fn handle_for(&self, spec: DescriptorSpec) -> DescriptorHandle {
        DescriptorHandle {
            inner: Arc::new(HandleInner {
                transport: Transport::for_spec(&spec),
                spec,
                shared: Arc::clone(&self.shared),
                local_path: OnceLock::new(),
            }),
        }
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("context", &self.shared.env.ctx)
            .finish()
    }
}

struct HandleInner {
    spec: DescriptorSpec,
    transport: Transport,
    shared: Arc<ResolverShared>,
    local_path: OnceLock<PathBuf>,
}

/// A resolved descriptor request. Immutable: latest-version lookups return
/// a new handle.
#[derive(Clone)]
pub struct DescriptorHandle {
    inner: Arc<HandleInner>,
}

impl DescriptorHandle {
    pub fn spec(&self) -> &DescriptorSpec {
        &self.inner.spec
    }

    pub fn descriptor_type(&self) -> DescriptorType {
        self.inner.spec.descriptor_type()
    }

    pub fn category(&self) -> Category {
        self.inner.spec.category()
    }

    /// `None` for path/dev descriptors without a version.
    pub fn version(&self) -> Option<&str> {
        self.inner.spec.version()
    }

    pub fn uri(&self) -> String {
        self.inner.spec.to_uri()
    }

    pub fn system_name(&self) -> String {
        self.inner.spec.system_name()
    }

    pub fn is_dev(&self) -> bool {
        self.descriptor_type() == DescriptorType::Dev
    }

    fn env(&self) -> &TransportEnv {
        &self.inner.shared.env
    }

    /// Whether the payload is available locally right now. Checked afresh
    /// on every call.
    pub fn is_cached(&self) -> bool {
        match &self.inner.transport {
            Transport::Local(local) => local
                .location(&self.env().ctx.path_context)
                .is_ok_and(|p| p.exists()),
            _ => self.env().cache.lookup(&self.inner.spec).is_some(),
        }
    }

    /// Where the payload lives or would be installed: the primary cache
    /// entry, or the expanded path for local descriptors.
    pub fn cache_location(&self) -> Option<PathBuf> {
        match &self.inner.transport {
            Transport::Local(local) => local.location(&self.env().ctx.path_context).ok(),
            _ => self.env().cache.primary_path(&self.inner.spec),
        }
    }

    /// Set once `ensure_local` has succeeded.
    pub fn local_path(&self) -> Option<&Path> {
        self.inner.local_path.get().map(PathBuf::as_path)
    }

    pub fn list_versions(&self) -> Result<Vec<String>> {
        let mut session = Session::default();
        self.inner
            .transport
            .list_versions(&self.inner.spec, self.env(), &mut session)
    }

    /// Makes the payload available locally and returns its directory.
    /// Safe to call repeatedly and from several threads or processes.
    pub fn ensure_local(&self) -> Result<PathBuf> {
        if let Some(path) = self.inner.local_path.get() {
            return Ok(path.clone());
        }
        let path = self.locate_or_fetch()?;
        if self.category() == Category::Config {
            self.check_declares_core(&path)?;
        }
        Ok(self.inner.local_path.get_or_init(|| path).clone())
    }

    /// A config bundle is only usable together with the core it names.
    fn check_declares_core(&self, root: &Path) -> Result<()> {
        let manifest = self.env().ctx.manifest_reader.read(root)?;
        if manifest.core_descriptor()?.is_none() {
            return Err(BndlError::InvalidManifest {
                path: root.join(MANIFEST_FILENAME),
                message: format!("config bundle {} declares no [core]", self.uri()),
            });
        }
        Ok(())
    }

    fn locate_or_fetch(&self) -> Result<PathBuf> {
        let spec = &self.inner.spec;
        let env = self.env();

        if let Transport::Local(local) = &self.inner.transport {
            let path = local.location(&env.ctx.path_context)?;
            if !path.exists() {
                return Err(BndlError::MissingPayload {
                    descriptor: spec.tag(),
                    path,
                });
            }
            debug!("Using local bundle at {}", path.display());
            return Ok(path);
        }

        let Some(version) = spec.version() else {
            return Err(BndlError::invalid(
                spec.to_uri(),
                "descriptor has no version, resolve the latest version first",
            ));
        };
        if let Some(hit) = env.cache.lookup(spec) {
            return Ok(hit.path);
        }
        let Some(key) = env.cache.primary_path(spec) else {
            return Err(BndlError::unsupported(spec.tag(), "descriptor has no cache entry"));
        };
        if let Transport::Manual(_) = &self.inner.transport {
            return Err(BndlError::MissingPayload {
                descriptor: spec.tag(),
                path: key,
            });
        }

        let lock = self.inner.shared.entry_lock(&key);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            match env.cache.lookup(spec) {
                Some(hit) => {
                    debug!("{} was installed while waiting", spec);
                    Ok(hit.path)
                }
                None => {
                    debug!("Fetching {} into the bundle cache", spec);
                    env.cache.install_with(spec, |staging| {
                        self.inner.transport.fetch(spec, version, staging, env)
                    })
                }
            }
        };
        self.inner.shared.release_entry_lock(&key, lock);
        result
    }

    /// A new handle pinned to the newest available version, optionally
    /// constrained by a `v1.x.x` style pattern.
    pub fn find_latest_version(&self, pattern: Option<&str>) -> Result<DescriptorHandle> {
        let mut session = Session::default();
        self.latest_with(pattern, &mut session)
    }

    /// Resolves the latest version and makes it local in one call.
    pub fn download_latest(&self, pattern: Option<&str>) -> Result<DescriptorHandle> {
        let mut session = Session::default();
        let latest = self.latest_with(pattern, &mut session)?;
        latest.ensure_local()?;
        Ok(latest)
    }

    fn latest_with(&self, pattern: Option<&str>, session: &mut Session) -> Result<DescriptorHandle> {
        let spec = &self.inner.spec;
        if !spec.descriptor_type().supports_latest() {
            return Err(BndlError::unsupported(
                spec.tag(),
                format!(
                    "descriptor type '{}' has no notion of a latest version",
                    spec.descriptor_type()
                ),
            ));
        }
        let pattern = pattern
            .map(|p| VersionPattern::parse(p).map_err(|e| BndlError::invalid(p, e)))
            .transpose()?;
        let version = self
            .inner
            .transport
            .resolve_latest(pattern.as_ref(), self.env(), session)?;
        if spec.version() == Some(version.as_str()) {
            debug!("{} is already the latest version", spec);
        } else {
            debug!("Latest version of {} is {}", spec.locator_label(), version);
        }
        Ok(self.resolver().handle_for(spec.with_version(version)))
    }

    pub(crate) fn resolver(&self) -> Resolver {
        Resolver {
            shared: Arc::clone(&self.inner.shared),
        }
    }
}

impl fmt::Debug for DescriptorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorHandle")
            .field("uri", &self.uri())
            .field("category", &self.category())
            .field("local_path", &self.local_path())
            .finish()
    }
}

impl fmt::Display for DescriptorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner.spec, f)
    }
}

impl PartialEq for DescriptorHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.spec == other.inner.spec
    }
}

impl Eq for DescriptorHandle {}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn handles_and_resolver_are_thread_safe() {
        assert_send_sync::<Resolver>();
        assert_send_sync::<DescriptorHandle>();
    }

    #[test]
    fn create_descriptor_does_no_io() {
        let resolver = Resolver::new(
            ResolutionContext::new("/nonexistent/bndl-root").with_registry_disabled(true),
        );
        let handle = resolver
            .create_descriptor(
                "bndl:descriptor:app_store?name=tk-core&version=v0.20.1",
                Category::Core,
                CreateOptions::default(),
            )
            .unwrap();
        assert_eq!(handle.version(), Some("v0.20.1"));
        assert!(!handle.is_cached());
        assert!(handle.local_path().is_none());
        assert_eq!(
            handle.cache_location().unwrap(),
            PathBuf::from("/nonexistent/bndl-root/app_store/tk-core/v0.20.1")
        );
    }

    #[test]
    fn invalid_representation_fails_before_io() {
        let resolver = Resolver::new(ResolutionContext::new("/nonexistent/bndl-root"));
        let err = resolver
            .create_descriptor(
                "bndl:descriptor:git?path=%2Fr.git",
                Category::App,
                CreateOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, BndlError::InvalidRepresentation { .. }));
    }

    #[test]
    fn latest_is_unsupported_for_local_and_manual() {
        let resolver = Resolver::new(ResolutionContext::new("/nonexistent/bndl-root"));
        for uri in [
            "bndl:descriptor:dev?path=%2Fwork%2Ftk-multi-loader",
            "bndl:descriptor:manual?name=tk-framework-qt&version=v1.0.0",
        ] {
            let handle = resolver
                .create_descriptor(uri, Category::App, CreateOptions::default())
                .unwrap();
            let err = handle.find_latest_version(None).unwrap_err();
            assert!(matches!(err, BndlError::UnsupportedOperation { .. }), "{uri}");
        }
    }
}

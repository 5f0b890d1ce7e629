// bndl-core/src/transport/mod.rs
//! One transport per descriptor type, selected once when a handle is built.
//!
//! Transports know how to list versions, pick the latest one and fetch a
//! given version into a staging directory. They never touch the cache
//! layout; installing what they fetch is the cache's job.

mod app_store;
mod git;
mod local;
mod shotgun;

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use bndl_common::error::{BndlError, DescriptorTag, Result, UnavailableReason};
use bndl_common::{BundleCache, DescriptorSpec, Locator, VersionPattern};
use bndl_net::RegistryClient;
use tracing::debug;

pub(crate) use self::app_store::AppStoreTransport;
pub(crate) use self::git::{GitBranchTransport, GitTagTransport};
pub(crate) use self::local::{LocalTransport, ManualTransport};
pub(crate) use self::shotgun::ShotgunTransport;
use crate::context::ResolutionContext;

/// Per-call memo of `(entity_type, name, project_id) -> id` lookups. Lives
/// for one resolution call only.
#[derive(Debug, Default)]
pub(crate) struct Session {
    entity_ids: HashMap<(String, String, u64), u64>,
}

impl Session {
    pub(crate) fn entity_id(&self, entity_type: &str, name: &str, project_id: u64) -> Option<u64> {
        self.entity_ids
            .get(&(entity_type.to_string(), name.to_string(), project_id))
            .copied()
    }

    pub(crate) fn remember_entity_id(
        &mut self,
        entity_type: &str,
        name: &str,
        project_id: u64,
        id: u64,
    ) {
        self.entity_ids
            .insert((entity_type.to_string(), name.to_string(), project_id), id);
    }
}

/// What transports share across handles of one resolver: the context and
/// the registry client, built on first use.
pub(crate) struct TransportEnv {
    pub(crate) ctx: ResolutionContext,
    pub(crate) cache: BundleCache,
    registry: Mutex<Option<Arc<RegistryClient>>>,
}

impl TransportEnv {
    pub(crate) fn new(ctx: ResolutionContext) -> Self {
        let cache = BundleCache::new(
            ctx.primary_root.clone(),
            ctx.fallback_roots.clone(),
            ctx.config_bundle_cache.clone(),
        );
        Self {
            ctx,
            cache,
            registry: Mutex::new(None),
        }
    }

    pub(crate) fn registry(&self, tag: &DescriptorTag) -> Result<Arc<RegistryClient>> {
        if self.ctx.registry_disabled {
            return Err(BndlError::TransportUnavailable {
                descriptor: tag.clone(),
                reason: UnavailableReason::Disabled,
                message: "registry access is disabled".to_string(),
            });
        }
        let mut slot = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = slot.as_ref() {
            return Ok(Arc::clone(client));
        }
        debug!("Connecting to registry at {}", self.ctx.registry_url);
        let client = RegistryClient::new(
            &self.ctx.registry_url,
            self.ctx.registry_token.as_deref(),
            self.ctx.timeout,
            self.ctx.allow_insecure_http,
        )
        .map_err(|e| BndlError::TransportUnavailable {
            descriptor: tag.clone(),
            reason: UnavailableReason::NotConfigured,
            message: e.to_string(),
        })?;
        let client = Arc::new(client);
        *slot = Some(Arc::clone(&client));
        Ok(client)
    }
}

/// Scratch space for downloaded archives, outside of any cache root.
pub(crate) fn scratch_dir(tag: &DescriptorTag) -> Result<tempfile::TempDir> {
    tempfile::Builder::new()
        .prefix("bndl-download-")
        .tempdir()
        .map_err(|e| BndlError::cache_write(tag.clone(), format!("failed to create scratch dir: {e}")))
}

pub(crate) enum Transport {
    AppStore(AppStoreTransport),
    Shotgun(ShotgunTransport),
    GitTag(GitTagTransport),
    GitBranch(GitBranchTransport),
    Local(LocalTransport),
    Manual(ManualTransport),
}

impl Transport {
    pub(crate) fn for_spec(spec: &DescriptorSpec) -> Self {
        let tag = spec.tag();
        match spec.locator() {
            Locator::AppStore { name, label } => {
                Transport::AppStore(AppStoreTransport::new(name, label.clone(), tag))
            }
            Locator::Shotgun {
                entity_type,
                field,
                target,
            } => Transport::Shotgun(ShotgunTransport::new(
                entity_type,
                field,
                target.clone(),
                tag,
            )),
            Locator::Git { path } => Transport::GitTag(GitTagTransport::new(path, tag)),
            Locator::GitBranch { path, branch } => {
                Transport::GitBranch(GitBranchTransport::new(path, branch, tag))
            }
            Locator::Path { paths, .. } | Locator::Dev { paths, .. } => {
                Transport::Local(LocalTransport::new(paths.clone(), tag))
            }
            Locator::Manual { .. } => Transport::Manual(ManualTransport::new(tag)),
        }
    }

    pub(crate) fn list_versions(
        &self,
        spec: &DescriptorSpec,
        env: &TransportEnv,
        session: &mut Session,
    ) -> Result<Vec<String>> {
        match self {
            Transport::AppStore(t) => t.list_versions(env),
            Transport::Shotgun(t) => t.list_versions(env, session),
            Transport::GitTag(t) => t.list_versions(env),
            Transport::GitBranch(t) => t.list_versions(env),
            Transport::Local(_) => Ok(spec.version().map(str::to_string).into_iter().collect()),
            Transport::Manual(t) => Ok(t.list_versions(spec, &env.cache)),
        }
    }

    pub(crate) fn resolve_latest(
        &self,
        pattern: Option<&VersionPattern>,
        env: &TransportEnv,
        session: &mut Session,
    ) -> Result<String> {
        match self {
            Transport::AppStore(t) => t.resolve_latest(pattern, env),
            Transport::Shotgun(t) => t.resolve_latest(pattern, env, session),
            Transport::GitTag(t) => t.resolve_latest(pattern, env),
            Transport::GitBranch(t) => t.resolve_latest(pattern, env),
            Transport::Local(t) => Err(BndlError::unsupported(
                t.tag().clone(),
                "local descriptors have no notion of a latest version",
            )),
            Transport::Manual(t) => Err(BndlError::unsupported(
                t.tag().clone(),
                "manual descriptors have no notion of a latest version",
            )),
        }
    }

    /// Fetches `version` into `staging`, which is empty and owned by the
    /// caller. Only called for cacheable types.
    pub(crate) fn fetch(
        &self,
        spec: &DescriptorSpec,
        version: &str,
        staging: &Path,
        env: &TransportEnv,
    ) -> Result<()> {
        match self {
            Transport::AppStore(t) => t.fetch(version, staging, env),
            Transport::Shotgun(t) => t.fetch(version, staging, env),
            Transport::GitTag(t) => t.fetch(version, staging, env),
            Transport::GitBranch(t) => t.fetch(version, staging, env),
            Transport::Local(t) => Err(BndlError::unsupported(
                t.tag().clone(),
                "local descriptors are never fetched",
            )),
            Transport::Manual(t) => Err(BndlError::MissingPayload {
                descriptor: t.tag().clone(),
                path: env
                    .cache
                    .primary_path(spec)
                    .unwrap_or_else(|| env.ctx.primary_root.clone()),
            }),
        }
    }
}

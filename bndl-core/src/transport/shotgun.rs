// bndl-core/src/transport/shotgun.rs
//! Bundles uploaded as attachments on a site entity. The attachment id is
//! the version; a newer upload always gets a higher id.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bndl_common::descriptor::EntityTarget;
use bndl_common::error::{BndlError, DescriptorTag, Result, UnavailableReason};
use bndl_common::store::EntityStore;
use bndl_common::VersionPattern;
use tracing::debug;

use super::{scratch_dir, Session, TransportEnv};
use crate::extract::extract_archive;

pub(crate) struct ShotgunTransport {
    entity_type: String,
    field: String,
    target: EntityTarget,
    tag: DescriptorTag,
}

impl ShotgunTransport {
    pub(crate) fn new(
        entity_type: &str,
        field: &str,
        target: EntityTarget,
        tag: DescriptorTag,
    ) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            field: field.to_string(),
            target,
            tag,
        }
    }

    fn store(&self, env: &TransportEnv) -> Result<Arc<dyn EntityStore>> {
        env.ctx
            .entity_store
            .clone()
            .ok_or_else(|| BndlError::TransportUnavailable {
                descriptor: self.tag.clone(),
                reason: UnavailableReason::NotConfigured,
                message: "no entity store session was provided".to_string(),
            })
    }

    fn entity_id(
        &self,
        store: &dyn EntityStore,
        timeout: Duration,
        session: &mut Session,
    ) -> Result<u64> {
        let (name, project_id) = match &self.target {
            EntityTarget::Id(id) => return Ok(*id),
            EntityTarget::Named { name, project_id } => (name, *project_id),
        };
        if let Some(id) = session.entity_id(&self.entity_type, name, project_id) {
            return Ok(id);
        }
        let id = store
            .find_entity_id(&self.entity_type, name, project_id, timeout)
            .map_err(|e| e.into_error(self.tag.clone()))?
            .ok_or_else(|| BndlError::NotFound {
                descriptor: self.tag.clone(),
                message: format!(
                    "no {} named '{}' in project {}",
                    self.entity_type, name, project_id
                ),
            })?;
        debug!(
            "Resolved {} '{}' in project {} to id {}",
            self.entity_type, name, project_id, id
        );
        session.remember_entity_id(&self.entity_type, name, project_id, id);
        Ok(id)
    }

    fn latest_attachment(&self, env: &TransportEnv, session: &mut Session) -> Result<Option<u64>> {
        let store = self.store(env)?;
        let entity_id = self.entity_id(store.as_ref(), env.ctx.timeout, session)?;
        store
            .latest_attachment_id(&self.entity_type, entity_id, &self.field, env.ctx.timeout)
            .map_err(|e| e.into_error(self.tag.clone()))
    }

    /// Only the current upload is reachable, so this lists at most one.
    pub(crate) fn list_versions(
        &self,
        env: &TransportEnv,
        session: &mut Session,
    ) -> Result<Vec<String>> {
        Ok(self
            .latest_attachment(env, session)?
            .map(|id| id.to_string())
            .into_iter()
            .collect())
    }

    pub(crate) fn resolve_latest(
        &self,
        pattern: Option<&VersionPattern>,
        env: &TransportEnv,
        session: &mut Session,
    ) -> Result<String> {
        if let Some(pattern) = pattern {
            return Err(BndlError::unsupported(
                self.tag.clone(),
                format!("attachment versions cannot be constrained by '{pattern}'"),
            ));
        }
        let id = self.latest_attachment(env, session)?.ok_or_else(|| BndlError::NotFound {
            descriptor: self.tag.clone(),
            message: format!("field '{}' holds no attachment", self.field),
        })?;
        Ok(id.to_string())
    }

    pub(crate) fn fetch(&self, version: &str, staging: &Path, env: &TransportEnv) -> Result<()> {
        let attachment_id: u64 = version.parse().map_err(|_| {
            BndlError::invalid(
                version,
                "attachment versions must be integer attachment ids",
            )
        })?;
        let store = self.store(env)?;
        let scratch = scratch_dir(&self.tag)?;
        let archive = scratch.path().join("attachment.archive");
        store
            .download_attachment(attachment_id, &archive, env.ctx.timeout)
            .map_err(|e| e.into_error(self.tag.clone()))?;
        extract_archive(&archive, staging).map_err(|e| e.into_error(self.tag.clone()))
    }
}

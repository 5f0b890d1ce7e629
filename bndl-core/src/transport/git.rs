// bndl-core/src/transport/git.rs
use std::path::Path;

use bndl_common::error::{BndlError, DescriptorTag, Result};
use bndl_common::version::latest_version;
use bndl_common::VersionPattern;
use tracing::debug;

use super::TransportEnv;

/// Tagged releases of a repository.
pub(crate) struct GitTagTransport {
    path: String,
    tag: DescriptorTag,
}

impl GitTagTransport {
    pub(crate) fn new(path: &str, tag: DescriptorTag) -> Self {
        Self {
            path: path.to_string(),
            tag,
        }
    }

    pub(crate) fn list_versions(&self, env: &TransportEnv) -> Result<Vec<String>> {
        env.ctx
            .git
            .list_tags(&self.path, env.ctx.timeout)
            .map_err(|e| e.into_error(self.tag.clone()))
    }

    pub(crate) fn resolve_latest(
        &self,
        pattern: Option<&VersionPattern>,
        env: &TransportEnv,
    ) -> Result<String> {
        let tags = self.list_versions(env)?;
        let names = tags.iter().map(String::as_str);
        let latest = match pattern {
            Some(pattern) => pattern.latest(names),
            None => latest_version(names),
        };
        let latest = latest.ok_or_else(|| BndlError::NotFound {
            descriptor: self.tag.clone(),
            message: match pattern {
                Some(p) => format!("no tag of {} matches '{}'", self.path, p),
                None => format!("{} has no tags", self.path),
            },
        })?;
        debug!("Latest tag of {} is {}", self.path, latest);
        Ok(latest.to_string())
    }

    pub(crate) fn fetch(&self, version: &str, staging: &Path, env: &TransportEnv) -> Result<()> {
        env.ctx
            .git
            .export_tag(&self.path, version, staging, env.ctx.timeout)
            .map_err(|e| e.into_error(self.tag.clone()))
    }
}

/// The head commit of a branch.
pub(crate) struct GitBranchTransport {
    path: String,
    branch: String,
    tag: DescriptorTag,
}

impl GitBranchTransport {
    pub(crate) fn new(path: &str, branch: &str, tag: DescriptorTag) -> Self {
        Self {
            path: path.to_string(),
            branch: branch.to_string(),
            tag,
        }
    }

    fn head(&self, env: &TransportEnv) -> Result<String> {
        env.ctx
            .git
            .branch_head(&self.path, &self.branch, env.ctx.timeout)
            .map_err(|e| e.into_error(self.tag.clone()))
    }

    /// Only the head is tracked; older commits are not listed.
    pub(crate) fn list_versions(&self, env: &TransportEnv) -> Result<Vec<String>> {
        Ok(vec![self.head(env)?])
    }

    pub(crate) fn resolve_latest(
        &self,
        pattern: Option<&VersionPattern>,
        env: &TransportEnv,
    ) -> Result<String> {
        if let Some(pattern) = pattern {
            return Err(BndlError::unsupported(
                self.tag.clone(),
                format!("branch commits cannot be constrained by '{pattern}'"),
            ));
        }
        let head = self.head(env)?;
        debug!("Head of {}#{} is {}", self.path, self.branch, head);
        Ok(head)
    }

    pub(crate) fn fetch(&self, version: &str, staging: &Path, env: &TransportEnv) -> Result<()> {
        env.ctx
            .git
            .export_commit(&self.path, version, staging, env.ctx.timeout)
            .map_err(|e| e.into_error(self.tag.clone()))
    }
}

// bndl-common/src/descriptor/expand.rs
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::LazyLock;

use directories::UserDirs;
use regex::{Captures, Regex};

use crate::error::{BndlError, Result};

pub const PIPELINE_CONFIG_TOKEN: &str = "{PIPELINE_CONFIG}";
pub const CONFIG_FOLDER_TOKEN: &str = "{CONFIG_FOLDER}";

static ENV_VAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}|\$([A-Za-z_][A-Za-z0-9_]*)")
        .expect("static regex is valid")
});

/// Values that path tokens expand to. Built by the caller; expansion never
/// reads process state on its own.
#[derive(Debug, Clone, Default)]
pub struct PathContext {
    pub home: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub pipeline_config: Option<PathBuf>,
    pub config_folder: Option<PathBuf>,
}

impl PathContext {
    /// Snapshot of the current process environment and home directory.
    pub fn from_process() -> Self {
        Self {
            home: UserDirs::new().map(|ud| ud.home_dir().to_path_buf()),
            env: std::env::vars().collect(),
            pipeline_config: None,
            config_folder: None,
        }
    }

    pub fn with_pipeline_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.pipeline_config = Some(path.into());
        self
    }

    pub fn with_config_folder(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_folder = Some(path.into());
        self
    }
}

/// Expands `{PIPELINE_CONFIG}`, `{CONFIG_FOLDER}`, `$VAR` / `${VAR}` and a
/// leading `~`. Unknown environment variables are left untouched.
pub fn expand(raw: &str, ctx: &PathContext) -> Result<PathBuf> {
    let mut path = raw.to_string();

    for (token, value) in [
        (PIPELINE_CONFIG_TOKEN, &ctx.pipeline_config),
        (CONFIG_FOLDER_TOKEN, &ctx.config_folder),
    ] {
        if path.contains(token) {
            let value = value.as_ref().ok_or_else(|| {
                BndlError::invalid(raw, format!("{token} used but no value is known for it"))
            })?;
            path = path.replace(token, &value.to_string_lossy());
        }
    }

    let path = ENV_VAR_RE
        .replace_all(&path, |caps: &Captures<'_>| {
            let name = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str())
                .unwrap_or_default();
            ctx.env
                .get(name)
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned();

    if path == "~" || path.starts_with("~/") || path.starts_with("~\\") {
        let home = ctx
            .home
            .as_ref()
            .ok_or_else(|| BndlError::invalid(raw, "'~' used but no home directory is known"))?;
        let rest = path[1..].trim_start_matches(['/', '\\']);
        return Ok(if rest.is_empty() {
            home.clone()
        } else {
            home.join(rest)
        });
    }

    Ok(PathBuf::from(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> PathContext {
        PathContext {
            home: Some(PathBuf::from("/home/artist")),
            env: HashMap::from([
                ("HOME".to_string(), "/home/artist".to_string()),
                ("STUDIO".to_string(), "/mnt/studio".to_string()),
            ]),
            ..Default::default()
        }
    }

    #[test]
    fn expands_env_vars_and_home() {
        let ctx = ctx();
        assert_eq!(
            expand("${HOME}/x", &ctx).unwrap(),
            PathBuf::from("/home/artist/x")
        );
        assert_eq!(
            expand("$STUDIO/bundles", &ctx).unwrap(),
            PathBuf::from("/mnt/studio/bundles")
        );
        assert_eq!(
            expand("~/dev/tk-core", &ctx).unwrap(),
            PathBuf::from("/home/artist/dev/tk-core")
        );
        assert_eq!(
            expand("$UNSET_VAR/x", &ctx).unwrap(),
            PathBuf::from("$UNSET_VAR/x")
        );
    }

    #[test]
    fn pipeline_tokens_need_context() {
        let ctx = ctx();
        assert!(expand("{CONFIG_FOLDER}/bundles/app", &ctx).is_err());

        let ctx = ctx
            .with_config_folder("/proj/config")
            .with_pipeline_config("/proj");
        assert_eq!(
            expand("{CONFIG_FOLDER}/bundles/app", &ctx).unwrap(),
            PathBuf::from("/proj/config/bundles/app")
        );
        assert_eq!(
            expand("{PIPELINE_CONFIG}/install", &ctx).unwrap(),
            PathBuf::from("/proj/install")
        );
    }
}

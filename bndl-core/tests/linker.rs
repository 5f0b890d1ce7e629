mod common;

use std::sync::Arc;

use bndl_common::error::BndlError;
use bndl_common::Category;
use bndl_core::{resolve_core_dependency, CreateOptions, Resolver};

use common::{context, FakeGit};

const CONFIG_REPO: &str = "/srv/repos/tk-config-basic";
const CORE_REPO: &str = "/srv/repos/tk-core";
const CONFIG: &str = "bndl:descriptor:git?path=%2Fsrv%2Frepos%2Ftk-config-basic&version=v1.4.2";

fn config_manifest(core: &str) -> String {
    format!("name = \"tk-config-basic\"\nversion = \"v1.4.2\"\n\n[core]\n{core}")
}

fn resolver(git: FakeGit) -> (tempfile::TempDir, Resolver, Arc<FakeGit>) {
    let root = tempfile::tempdir().unwrap();
    let git = Arc::new(git);
    let resolver = Resolver::new(context(root.path()).with_git(git.clone()));
    (root, resolver, git)
}

#[test]
fn resolves_pinned_core() {
    let manifest = config_manifest(&format!(
        "type = \"git\"\npath = \"{CORE_REPO}\"\nversion = \"v0.20.1\"\n"
    ));
    let git = FakeGit::with_tags(&["v1.4.2", "v0.20.1", "v0.20.6"])
        .with_tree(CONFIG_REPO, "v1.4.2", &[("bundle.toml", manifest.as_str())])
        .with_tree(CORE_REPO, "v0.20.1", &[("bundle.toml", "name = \"tk-core\"\n")]);
    let (root, resolver, git) = resolver(git);

    let config = resolver
        .create_descriptor(CONFIG, Category::Config, CreateOptions::default())
        .unwrap();
    let core = resolve_core_dependency(&config).unwrap().unwrap();
    assert_eq!(core.category(), Category::Core);
    assert_eq!(core.version(), Some("v0.20.1"));
    assert_eq!(
        core.local_path().unwrap(),
        root.path().join("git/tk-core-9e2c0684/v0.20.1")
    );
    assert_eq!(git.export_count(), 2);
}

#[test]
fn unpinned_core_resolves_latest() {
    let manifest = config_manifest(&format!("type = \"git\"\npath = \"{CORE_REPO}\"\n"));
    let git = FakeGit::with_tags(&["v1.4.2", "v0.20.1", "v0.20.6"])
        .with_tree(CONFIG_REPO, "v1.4.2", &[("bundle.toml", manifest.as_str())]);
    let (_root, resolver, _git) = resolver(git);

    let config = resolver
        .create_descriptor(CONFIG, Category::Config, CreateOptions::default())
        .unwrap();
    let core = resolve_core_dependency(&config).unwrap().unwrap();
    // Both repositories share the fake tag list.
    assert_eq!(core.version(), Some("v1.4.2"));
    assert!(core.is_cached());
}

#[test]
fn core_declaring_a_core_is_a_cycle() {
    let manifest = config_manifest(&format!(
        "type = \"git\"\npath = \"{CORE_REPO}\"\nversion = \"v0.20.1\"\n"
    ));
    let core_manifest = format!(
        "name = \"tk-core\"\n\n[core]\ntype = \"git\"\npath = \"{CONFIG_REPO}\"\nversion = \"v1.4.2\"\n"
    );
    let git = FakeGit::with_tags(&["v1.4.2", "v0.20.1"])
        .with_tree(CONFIG_REPO, "v1.4.2", &[("bundle.toml", manifest.as_str())])
        .with_tree(CORE_REPO, "v0.20.1", &[("bundle.toml", core_manifest.as_str())]);
    let (_root, resolver, _git) = resolver(git);

    let config = resolver
        .create_descriptor(CONFIG, Category::Config, CreateOptions::default())
        .unwrap();
    match resolve_core_dependency(&config).unwrap_err() {
        BndlError::DependencyCycle { chain } => {
            assert_eq!(chain.len(), 3);
            assert_eq!(chain[0], config.uri());
            assert!(chain[1].contains("tk-core"));
            assert!(chain[2].contains("tk-config-basic"));
        }
        other => panic!("expected a dependency cycle, got {other}"),
    }

    // A core bundle may not declare a core at all.
    let core = resolver
        .create_descriptor(
            "bndl:descriptor:git?path=%2Fsrv%2Frepos%2Ftk-core&version=v0.20.1",
            Category::Core,
            CreateOptions::default(),
        )
        .unwrap();
    match resolve_core_dependency(&core).unwrap_err() {
        BndlError::DependencyCycle { chain } => assert_eq!(chain.len(), 2),
        other => panic!("expected a dependency cycle, got {other}"),
    }
}

#[test]
fn config_without_core_is_invalid() {
    let git = FakeGit::with_tags(&["v1.4.2"]).with_tree(
        CONFIG_REPO,
        "v1.4.2",
        &[("bundle.toml", "name = \"tk-config-basic\"\n")],
    );
    let (_root, resolver, _git) = resolver(git);

    let config = resolver
        .create_descriptor(CONFIG, Category::Config, CreateOptions::default())
        .unwrap();
    let err = config.ensure_local().unwrap_err();
    assert!(matches!(err, BndlError::InvalidManifest { .. }), "{err}");
    assert!(config.local_path().is_none());
    let err = resolve_core_dependency(&config).unwrap_err();
    assert!(matches!(err, BndlError::InvalidManifest { .. }), "{err}");

    // The same payload is fine as an app.
    let app = resolver
        .create_descriptor(CONFIG, Category::App, CreateOptions::default())
        .unwrap();
    assert!(app.ensure_local().unwrap().join("bundle.toml").is_file());
    assert!(resolve_core_dependency(&app).unwrap().is_none());
}

#[test]
fn apps_without_core_have_no_dependency() {
    let git = FakeGit::with_tags(&["v1.9.0"]);
    let (_root, resolver, _git) = resolver(git);
    let app = resolver
        .create_descriptor(
            "bndl:descriptor:git?path=%2Fsrv%2Frepos%2Ftk-multi-loader&version=v1.9.0",
            Category::App,
            CreateOptions::default(),
        )
        .unwrap();
    assert!(resolve_core_dependency(&app).unwrap().is_none());
    assert!(app.local_path().is_some());
}

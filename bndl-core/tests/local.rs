mod common;

use std::collections::{BTreeMap, HashMap};
use std::fs;

use bndl_common::error::BndlError;
use bndl_common::{Category, PathContext};
use bndl_core::{CreateOptions, Resolver};

use common::context;

fn path_context(home: &std::path::Path) -> PathContext {
    PathContext {
        home: Some(home.to_path_buf()),
        env: HashMap::from([("STUDIO_ROOT".to_string(), home.display().to_string())]),
        pipeline_config: None,
        config_folder: None,
    }
}

#[test]
fn dev_descriptor_uses_the_live_location() {
    let root = tempfile::tempdir().unwrap();
    let work = tempfile::tempdir().unwrap();
    let loader = work.path().join("tk-multi-loader");
    fs::create_dir_all(&loader).unwrap();

    let resolver =
        Resolver::new(context(root.path()).with_path_context(path_context(work.path())));
    let handle = resolver
        .create_descriptor(
            "bndl:descriptor:dev?path=%24%7BSTUDIO_ROOT%7D%2Ftk-multi-loader",
            Category::App,
            CreateOptions::default(),
        )
        .unwrap();
    assert!(handle.is_dev());
    assert_eq!(handle.version(), None);
    assert_eq!(handle.system_name(), "tk-multi-loader");
    assert!(handle.is_cached());
    assert_eq!(handle.cache_location().unwrap(), loader);
    assert_eq!(handle.ensure_local().unwrap(), loader);

    // Nothing is ever written to the cache for local descriptors.
    assert_eq!(fs::read_dir(root.path()).unwrap().count(), 0);

    let err = handle.find_latest_version(None).unwrap_err();
    assert!(matches!(err, BndlError::UnsupportedOperation { .. }), "{err}");
}

#[test]
fn path_descriptor_expands_home() {
    let root = tempfile::tempdir().unwrap();
    let home = tempfile::tempdir().unwrap();
    fs::create_dir_all(home.path().join("bundles/tk-core")).unwrap();

    let resolver = Resolver::new(context(root.path()).with_path_context(path_context(home.path())));
    let handle = resolver
        .create_descriptor(
            "bndl:descriptor:path?path=~%2Fbundles%2Ftk-core&version=v0.20.1",
            Category::Core,
            CreateOptions::default(),
        )
        .unwrap();
    assert!(!handle.is_dev());
    assert_eq!(handle.version(), Some("v0.20.1"));
    assert_eq!(handle.list_versions().unwrap(), ["v0.20.1"]);
    assert_eq!(handle.ensure_local().unwrap(), home.path().join("bundles/tk-core"));
}

#[test]
fn home_token_stays_literal_until_the_path_is_used() {
    let root = tempfile::tempdir().unwrap();
    let home = tempfile::tempdir().unwrap();
    fs::create_dir_all(home.path().join("x")).unwrap();
    let paths = PathContext {
        env: HashMap::from([("HOME".to_string(), home.path().display().to_string())]),
        ..PathContext::default()
    };

    let resolver = Resolver::new(context(root.path()).with_path_context(paths));
    let handle = resolver
        .create_descriptor(
            BTreeMap::from([
                ("type".to_string(), "path".to_string()),
                ("path".to_string(), "${HOME}/x".to_string()),
            ]),
            Category::App,
            CreateOptions::default(),
        )
        .unwrap();
    assert_eq!(handle.spec().to_fields()["path"], "${HOME}/x");
    assert!(handle.uri().contains("%24%7BHOME%7D%2Fx"), "{}", handle.uri());
    assert_eq!(handle.ensure_local().unwrap(), home.path().join("x"));
}

#[test]
fn missing_local_path_is_missing_payload() {
    let root = tempfile::tempdir().unwrap();
    let home = tempfile::tempdir().unwrap();
    let resolver = Resolver::new(context(root.path()).with_path_context(path_context(home.path())));
    let handle = resolver
        .create_descriptor(
            "bndl:descriptor:path?path=~%2Fnot-there",
            Category::App,
            CreateOptions::default(),
        )
        .unwrap();
    assert!(!handle.is_cached());
    let err = handle.ensure_local().unwrap_err();
    assert!(matches!(err, BndlError::MissingPayload { .. }), "{err}");
}

#[test]
fn manual_payload_must_already_be_present() {
    let root = tempfile::tempdir().unwrap();
    let resolver = Resolver::new(context(root.path()));
    let uri = "bndl:descriptor:manual?name=tk-framework-qt&version=v1.0.0";

    let handle = resolver
        .create_descriptor(uri, Category::Framework, CreateOptions::default())
        .unwrap();
    let err = handle.ensure_local().unwrap_err();
    match err {
        BndlError::MissingPayload { path, .. } => {
            assert_eq!(path, root.path().join("manual/tk-framework-qt/v1.0.0"))
        }
        other => panic!("expected MissingPayload, got {other}"),
    }

    // Placed by hand: no completion marker, still usable.
    let entry = root.path().join("manual/tk-framework-qt/v1.0.0");
    fs::create_dir_all(&entry).unwrap();
    fs::write(entry.join("info.yml"), "name: tk-framework-qt").unwrap();
    fs::create_dir_all(root.path().join("manual/tk-framework-qt/v0.9.2")).unwrap();
    fs::write(root.path().join("manual/tk-framework-qt/v0.9.2/info.yml"), "").unwrap();

    let handle = resolver
        .create_descriptor(uri, Category::Framework, CreateOptions::default())
        .unwrap();
    assert!(handle.is_cached());
    assert_eq!(handle.ensure_local().unwrap(), entry);
    assert_eq!(handle.list_versions().unwrap(), ["v0.9.2", "v1.0.0"]);
}

#[test]
fn manual_without_version_cannot_resolve_latest() {
    let resolver = Resolver::new(context(std::path::Path::new("/nonexistent/bndl-root")));
    let err = resolver
        .create_descriptor(
            "bndl:descriptor:manual?name=tk-framework-qt",
            Category::Framework,
            CreateOptions {
                resolve_latest: true,
            },
        )
        .unwrap_err();
    assert!(matches!(err, BndlError::InvalidRepresentation { .. }), "{err}");
}

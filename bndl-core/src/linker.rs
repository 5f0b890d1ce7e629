// bndl-core/src/linker.rs
//! Follows a bundle's declared core dependency, one hop deep.

use std::collections::BTreeMap;

use bndl_common::error::{BndlError, Result};
use bndl_common::manifest::BundleManifest;
use bndl_common::{Category, DescriptorSpec, Representation};
use tracing::debug;

use crate::resolver::{CreateOptions, DescriptorHandle};

impl DescriptorHandle {
    fn manifest(&self) -> Result<BundleManifest> {
        let root = self.ensure_local()?;
        self.resolver().context().manifest_reader.read(&root)
    }
}

fn describe(fields: &BTreeMap<String, String>) -> String {
    DescriptorSpec::from_fields(fields, Category::Core, true)
        .map(|spec| spec.to_uri())
        .unwrap_or_else(|_| Representation::Fields(fields.clone()).to_string())
}

/// Makes `bundle` local, reads its manifest and resolves the core it
/// declares, making that local too.
///
/// Returns `None` for bundles without a core declaration. Config bundles
/// never get that far: making one local already requires a declared core.
/// A core that declares a core of its own is a cycle.
pub fn resolve_core_dependency(bundle: &DescriptorHandle) -> Result<Option<DescriptorHandle>> {
    let manifest = bundle.manifest()?;
    let declared = manifest.core_descriptor()?;

    let Some(core_fields) = declared else {
        debug!("{} declares no core", bundle);
        return Ok(None);
    };

    if bundle.category() == Category::Core {
        return Err(BndlError::DependencyCycle {
            chain: vec![bundle.uri(), describe(&core_fields)],
        });
    }

    let resolve_latest = !core_fields.contains_key("version");
    let core = bundle.resolver().create_descriptor(
        core_fields,
        Category::Core,
        CreateOptions { resolve_latest },
    )?;
    debug!("{} requires core {}", bundle, core);

    let core_manifest = core.manifest()?;
    if let Some(nested) = core_manifest.core_descriptor()? {
        return Err(BndlError::DependencyCycle {
            chain: vec![bundle.uri(), core.uri(), describe(&nested)],
        });
    }
    Ok(Some(core))
}

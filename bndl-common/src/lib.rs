// bndl-common/src/lib.rs
pub mod cache;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod manifest;
pub mod store;
pub mod version;

// Re-export key types
pub use cache::BundleCache;
pub use config::Config;
pub use descriptor::{
    expand, is_descriptor_version_missing, Category, DescriptorSpec, DescriptorType, Locator,
    PathContext, Representation,
};
pub use error::{BndlError, DescriptorTag, FailureKind, Result, TransportFailure, UnavailableReason};
pub use version::{LooseVersion, VersionPattern};

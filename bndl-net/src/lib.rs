// bndl-net/src/lib.rs
pub mod entity;
pub mod http;
pub mod registry;
pub mod validation;

pub use bndl_common::error::{BndlError, Result, TransportFailure};
pub use entity::RestEntityStore;
pub use http::{build_http_client, download_to_file, get_json};
pub use registry::{RegistryClient, RegistryVersion};
pub use validation::{validate_url, verify_checksum};

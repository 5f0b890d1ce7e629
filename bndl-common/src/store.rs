// bndl-common/src/store.rs
//! Remote entity store used by attachment (`shotgun`) descriptors.
//!
//! The store is an opaque, already-authenticated session supplied by the
//! caller. Implementations report failures as [`TransportFailure`] so the
//! adapter can attach descriptor context. Every call receives the time
//! budget of the resolution it belongs to.

use std::path::Path;
use std::time::Duration;

use crate::error::TransportFailure;

pub trait EntityStore: Send + Sync {
    /// Looks up an entity id by name within a project.
    fn find_entity_id(
        &self,
        entity_type: &str,
        name: &str,
        project_id: u64,
        timeout: Duration,
    ) -> Result<Option<u64>, TransportFailure>;

    /// Id of the attachment currently stored in `field`, if any.
    fn latest_attachment_id(
        &self,
        entity_type: &str,
        entity_id: u64,
        field: &str,
        timeout: Duration,
    ) -> Result<Option<u64>, TransportFailure>;

    /// Writes the attachment's bytes to `dest`.
    fn download_attachment(
        &self,
        attachment_id: u64,
        dest: &Path,
        timeout: Duration,
    ) -> Result<(), TransportFailure>;
}

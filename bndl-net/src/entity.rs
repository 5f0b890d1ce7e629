// bndl-net/src/entity.rs
//! [`EntityStore`] backed by a site's REST API.

use std::path::Path;
use std::time::Duration;

use bndl_common::error::{BndlError, Result, TransportFailure};
use bndl_common::store::EntityStore;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::http::{build_http_client, download_to_file, get_json};
use crate::validation::validate_url;

/// Field an entity's display name is stored in.
const NAME_FIELD: &str = "code";

#[derive(Debug, Deserialize)]
struct EntityList {
    data: Vec<EntityRecord>,
}

#[derive(Debug, Deserialize)]
struct EntityRecord {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct EntityDocument {
    data: EntityData,
}

#[derive(Debug, Deserialize)]
struct EntityData {
    #[serde(default)]
    attributes: serde_json::Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct RestEntityStore {
    site: Url,
    client: Client,
}

impl RestEntityStore {
    pub fn new(
        site_url: &str,
        token: Option<&str>,
        timeout: Duration,
        allow_insecure: bool,
    ) -> Result<Self> {
        let site = validate_url(site_url, allow_insecure)
            .map_err(|e| BndlError::Config(format!("site URL: {}", e.message)))?;
        if site.cannot_be_a_base() {
            return Err(BndlError::Config(format!(
                "site URL '{site}' cannot be used as a base"
            )));
        }
        Ok(Self {
            site,
            client: build_http_client(timeout, token)?,
        })
    }

    fn endpoint<'a, I>(&self, segments: I) -> Url
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut url = self.site.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(["api", "v1", "entity"]).extend(segments);
        }
        url
    }
}

impl EntityStore for RestEntityStore {
    fn find_entity_id(
        &self,
        entity_type: &str,
        name: &str,
        project_id: u64,
        timeout: Duration,
    ) -> std::result::Result<Option<u64>, TransportFailure> {
        let mut url = self.endpoint([entity_type]);
        url.query_pairs_mut()
            .append_pair(&format!("filter[{NAME_FIELD}]"), name)
            .append_pair("filter[project.Project.id]", &project_id.to_string())
            .append_pair("fields", "id");
        let list: EntityList = get_json(&self.client, url.as_str(), Some(timeout))?;
        if list.data.len() > 1 {
            debug!(
                "{} {} entities named '{}' in project {}, using the first",
                list.data.len(),
                entity_type,
                name,
                project_id
            );
        }
        Ok(list.data.first().map(|record| record.id))
    }

    fn latest_attachment_id(
        &self,
        entity_type: &str,
        entity_id: u64,
        field: &str,
        timeout: Duration,
    ) -> std::result::Result<Option<u64>, TransportFailure> {
        let id = entity_id.to_string();
        let mut url = self.endpoint([entity_type, id.as_str()]);
        url.query_pairs_mut().append_pair("fields", field);
        let doc: EntityDocument = get_json(&self.client, url.as_str(), Some(timeout))?;
        let attachment = doc.data.attributes.get(field).and_then(|v| v.get("id"));
        match attachment {
            None => Ok(None),
            Some(id) => id.as_u64().map(Some).ok_or_else(|| {
                TransportFailure::corrupt(format!(
                    "attachment id in field '{field}' is not an integer: {id}"
                ))
            }),
        }
    }

    fn download_attachment(
        &self,
        attachment_id: u64,
        dest: &Path,
        timeout: Duration,
    ) -> std::result::Result<(), TransportFailure> {
        let id = attachment_id.to_string();
        let url = self.endpoint(["attachments", id.as_str(), "download"]);
        download_to_file(&self.client, url.as_str(), dest, None, Some(timeout))?;
        Ok(())
    }
}

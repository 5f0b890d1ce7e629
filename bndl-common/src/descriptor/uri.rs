// bndl-common/src/descriptor/uri.rs
//! URI <-> dictionary conversion.
//!
//! `bndl:descriptor:<type>?key=value&...` with values form-urlencoded, so
//! reserved characters (`:`, `/`, `@`, whitespace, `{}`) never appear raw.
//! Keys are written in sorted order.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use url::form_urlencoded;

use crate::error::{BndlError, Result};

pub const URI_SCHEME: &str = "bndl";
/// Schemes accepted on input in addition to [`URI_SCHEME`].
pub const LEGACY_SCHEMES: &[&str] = &["sgtk"];

const DESCRIPTOR_SEGMENT: &str = "descriptor";

/// Either way of writing a descriptor down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Representation {
    Uri(String),
    Fields(BTreeMap<String, String>),
}

impl Representation {
    /// The flat dictionary form, including `type`. Does not validate keys
    /// beyond what is needed to split the URI.
    pub fn to_fields(&self) -> Result<BTreeMap<String, String>> {
        match self {
            Self::Uri(uri) => parse_uri(uri),
            Self::Fields(fields) => Ok(fields.clone()),
        }
    }
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uri(uri) => f.write_str(uri),
            Self::Fields(fields) => f.write_str(&render_for_error(fields)),
        }
    }
}

impl From<&str> for Representation {
    fn from(uri: &str) -> Self {
        Self::Uri(uri.to_string())
    }
}

impl From<String> for Representation {
    fn from(uri: String) -> Self {
        Self::Uri(uri)
    }
}

impl From<BTreeMap<String, String>> for Representation {
    fn from(fields: BTreeMap<String, String>) -> Self {
        Self::Fields(fields)
    }
}

impl From<HashMap<String, String>> for Representation {
    fn from(fields: HashMap<String, String>) -> Self {
        Self::Fields(fields.into_iter().collect())
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Representation {
    fn from(pairs: [(&str, &str); N]) -> Self {
        Self::Fields(
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

pub(crate) fn parse_uri(uri: &str) -> Result<BTreeMap<String, String>> {
    let invalid = |message: &str| BndlError::invalid(uri, message);

    let (head, query) = match uri.split_once('?') {
        Some((head, query)) => (head, Some(query)),
        None => (uri, None),
    };

    let mut parts = head.splitn(3, ':');
    let scheme = parts.next().unwrap_or_default();
    let segment = parts.next();
    let descriptor_type = parts.next();

    if scheme != URI_SCHEME && !LEGACY_SCHEMES.contains(&scheme) {
        return Err(invalid(&format!(
            "unknown scheme '{scheme}', expected '{URI_SCHEME}'"
        )));
    }
    if segment != Some(DESCRIPTOR_SEGMENT) {
        return Err(invalid("expected '<scheme>:descriptor:<type>'"));
    }
    let descriptor_type = match descriptor_type {
        Some(t) if !t.is_empty() => t,
        _ => return Err(invalid("missing descriptor type")),
    };

    let mut fields = BTreeMap::new();
    fields.insert("type".to_string(), descriptor_type.to_string());

    let Some(query) = query else {
        return Ok(fields);
    };
    check_percent_encoding(query).map_err(|msg| invalid(&msg))?;

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        if !pair.contains('=') {
            return Err(invalid(&format!("query parameter '{pair}' has no value")));
        }
        for (key, value) in form_urlencoded::parse(pair.as_bytes()) {
            if key == "type" {
                return Err(invalid(
                    "'type' belongs in the URI path, not in the query",
                ));
            }
            if fields
                .insert(key.clone().into_owned(), value.into_owned())
                .is_some()
            {
                return Err(invalid(&format!("duplicate key '{key}'")));
            }
        }
    }
    Ok(fields)
}

pub(crate) fn fields_to_uri(fields: &BTreeMap<String, String>) -> String {
    let descriptor_type = fields.get("type").map(String::as_str).unwrap_or_default();
    let mut query = form_urlencoded::Serializer::new(String::new());
    for (key, value) in fields.iter().filter(|(k, _)| k.as_str() != "type") {
        query.append_pair(key, value);
    }
    let query = query.finish();
    if query.is_empty() {
        format!("{URI_SCHEME}:{DESCRIPTOR_SEGMENT}:{descriptor_type}")
    } else {
        format!("{URI_SCHEME}:{DESCRIPTOR_SEGMENT}:{descriptor_type}?{query}")
    }
}

/// Renders possibly-invalid fields for an error message.
pub(crate) fn render_for_error(fields: &BTreeMap<String, String>) -> String {
    let inner = fields
        .iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{inner}}}")
}

fn check_percent_encoding(query: &str) -> std::result::Result<(), String> {
    let bytes = query.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes
                .get(i + 1..i + 3)
                .is_some_and(|hex| hex.iter().all(u8::is_ascii_hexdigit));
            if !valid {
                return Err(format!("malformed percent-encoding at offset {i}"));
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    Ok(())
}

/// True only for path, dev and manual shaped descriptors without a
/// `version` key. Anything unparsable is reported as not missing.
pub fn is_descriptor_version_missing(representation: &Representation) -> bool {
    let Ok(fields) = representation.to_fields() else {
        return false;
    };
    let versionless_type = matches!(
        fields.get("type").map(String::as_str),
        Some("path" | "dev" | "manual")
    );
    versionless_type && !fields.contains_key("version")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{Category, DescriptorSpec};

    #[test]
    fn uri_round_trips_through_fields() {
        let fields: BTreeMap<String, String> = [
            ("type", "path"),
            ("path", "{PIPELINE_CONFIG}/bundles/my app@1:x"),
            ("name", "my app"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let uri = fields_to_uri(&fields);
        assert!(uri.starts_with("bndl:descriptor:path?"));
        for reserved in ['{', '}', '@', ' ', '/'] {
            assert!(!uri["bndl:descriptor:path?".len()..].contains(reserved));
        }
        assert_eq!(parse_uri(&uri).unwrap(), fields);

        let from_dict =
            DescriptorSpec::parse(&Representation::Fields(fields), Category::App, false).unwrap();
        let from_uri =
            DescriptorSpec::parse(&Representation::Uri(uri), Category::App, false).unwrap();
        assert_eq!(from_dict, from_uri);
    }

    #[test]
    fn serialization_is_order_independent() {
        let a = "sgtk:descriptor:app_store?version=v1.0.0&name=tk-core";
        let b = "bndl:descriptor:app_store?name=tk-core&version=v1.0.0";
        let spec_a = DescriptorSpec::parse(&a.into(), Category::Core, false).unwrap();
        let spec_b = DescriptorSpec::parse(&b.into(), Category::Core, false).unwrap();
        assert_eq!(spec_a.to_uri(), b);
        assert_eq!(spec_a.to_uri(), spec_b.to_uri());
    }

    #[test]
    fn rejects_malformed_uris() {
        for bad in [
            "bndl:descriptor",
            "bndl:descriptor:",
            "http:descriptor:git?path=x",
            "bndl:thing:git?path=x",
            "bndl:descriptor:git?path=%2",
            "bndl:descriptor:git?path=%zz&version=v1",
            "bndl:descriptor:git?path",
            "bndl:descriptor:git?path=a&path=b",
            "bndl:descriptor:git?type=git",
        ] {
            assert!(parse_uri(bad).is_err(), "expected failure for {bad}");
        }
    }

    #[test]
    fn version_missing_only_for_path_shaped_types() {
        assert!(is_descriptor_version_missing(&Representation::from([
            ("type", "dev"),
            ("path", "/x"),
        ])));
        assert!(!is_descriptor_version_missing(&Representation::from([
            ("type", "dev"),
            ("path", "/x"),
            ("version", "v0.1"),
        ])));
        assert!(!is_descriptor_version_missing(&Representation::from([
            ("type", "app_store"),
            ("name", "tk-core"),
        ])));
        assert!(is_descriptor_version_missing(&Representation::from(
            "bndl:descriptor:manual?name=tk-core"
        )));
    }
}

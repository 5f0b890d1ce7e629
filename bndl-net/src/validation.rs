// bndl-net/src/validation.rs
use std::fs::File;
use std::io;
use std::path::Path;

use bndl_common::error::{FailureKind, TransportFailure, UnavailableReason};
use sha2::{Digest, Sha256};
use tracing::debug;
use url::Url;

pub fn verify_checksum(path: &Path, expected: &str) -> Result<(), TransportFailure> {
    debug!("Verifying checksum for: {}", path.display());
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let bytes_copied = io::copy(&mut file, &mut hasher)?;
    let actual = hex::encode(hasher.finalize());
    debug!("Calculated SHA256: {} ({} bytes read)", actual, bytes_copied);
    debug!("Expected SHA256:   {}", expected);
    if actual.eq_ignore_ascii_case(expected.trim()) {
        Ok(())
    } else {
        Err(TransportFailure::corrupt(format!(
            "checksum mismatch for {}: expected {}, got {}",
            path.display(),
            expected,
            actual
        )))
    }
}

/// Parses a URL and checks its scheme. Plain `http` is refused unless
/// `allow_insecure` is set.
pub fn validate_url(url_str: &str, allow_insecure: bool) -> Result<Url, TransportFailure> {
    let refuse = |message: String| {
        TransportFailure::new(
            FailureKind::Unavailable(UnavailableReason::NotConfigured),
            message,
        )
    };
    let url = Url::parse(url_str).map_err(|e| refuse(format!("failed to parse URL '{url_str}': {e}")))?;
    match url.scheme() {
        "https" => Ok(url),
        "http" if allow_insecure => Ok(url),
        scheme => Err(refuse(format!(
            "invalid URL scheme for '{url_str}': must be https, got '{scheme}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn checksum_matches_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("payload");
        fs::write(&file, b"hello").unwrap();
        let digest = "2CF24DBA5FB0A30E26E83B2AC5B9E29E1B161E5C1FA7425E73043362938B9824";
        verify_checksum(&file, digest).unwrap();

        let err = verify_checksum(&file, &"0".repeat(64)).unwrap_err();
        assert_eq!(err.kind, FailureKind::Corrupt);
    }

    #[test]
    fn http_needs_opt_in() {
        assert!(validate_url("https://registry.example.com", false).is_ok());
        assert!(validate_url("http://127.0.0.1:1234", false).is_err());
        assert!(validate_url("http://127.0.0.1:1234", true).is_ok());
        assert!(validate_url("ftp://example.com/x", true).is_err());
        assert!(validate_url("not a url", true).is_err());
    }
}

// bndl-common/src/version.rs
//! Loose version ordering for tag-like version strings.
//!
//! `v1.10.0`, `1.10`, `v2.0.0-beta` and `v1.2.3rc1` are all accepted. Numeric
//! components compare as integers with missing trailing components counting
//! as zero. Whatever follows the numeric run is the suffix: a version with a
//! suffix sorts *below* the same numbers without one (`v1.2.3-rc1 < v1.2.3`),
//! and two suffixes compare by semver pre-release precedence.

use std::cmp::Ordering;
use std::fmt;

use semver::Prerelease;

#[derive(Debug, Clone)]
pub struct LooseVersion {
    raw: String,
    numbers: Vec<u64>,
    suffix: Option<String>,
}

impl LooseVersion {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let mut rest = match trimmed.strip_prefix(['v', 'V']) {
            Some(r) if r.starts_with(|c: char| c.is_ascii_digit()) => r,
            _ => trimmed,
        };

        let mut numbers = Vec::new();
        loop {
            let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
            if digits == 0 {
                break;
            }
            numbers.push(rest[..digits].parse().unwrap_or(u64::MAX));
            rest = &rest[digits..];
            match rest.strip_prefix('.') {
                Some(next) if next.starts_with(|c: char| c.is_ascii_digit()) => rest = next,
                _ => break,
            }
        }

        let suffix = rest.trim_start_matches(['.', '-', '+', '_']);
        Self {
            raw: raw.to_string(),
            numbers,
            suffix: (!suffix.is_empty()).then(|| suffix.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn numbers(&self) -> &[u64] {
        &self.numbers
    }

    pub fn suffix(&self) -> Option<&str> {
        self.suffix.as_deref()
    }
}

fn compare_suffix(a: &str, b: &str) -> Ordering {
    match (Prerelease::new(a), Prerelease::new(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}

impl Ord for LooseVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        // Names without any number (`master`, `nightly`) rank below every
        // numbered version, pre-releases included.
        match (self.numbers.is_empty(), other.numbers.is_empty()) {
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }
        let len = self.numbers.len().max(other.numbers.len());
        for i in 0..len {
            let a = self.numbers.get(i).copied().unwrap_or(0);
            let b = other.numbers.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        match (&self.suffix, &other.suffix) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => compare_suffix(a, b),
        }
    }
}

impl PartialOrd for LooseVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for LooseVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for LooseVersion {}

impl fmt::Display for LooseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// The highest version in `versions`, by loose ordering.
pub fn latest_version<'a, I>(versions: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    versions
        .into_iter()
        .max_by(|a, b| LooseVersion::parse(a).cmp(&LooseVersion::parse(b)))
}

/// A `v1.x.x` style constraint on "latest".
///
/// Fixed components must match; `x` components are free. Once a component is
/// `x`, every following one must be too. A pattern without wildcards matches
/// exactly one version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPattern {
    raw: String,
    parts: Vec<Option<u64>>,
}

impl VersionPattern {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let body = raw.trim().trim_start_matches(['v', 'V']);
        if body.is_empty() {
            return Err(format!("empty version pattern '{raw}'"));
        }
        let mut parts = Vec::new();
        let mut seen_wildcard = false;
        for component in body.split('.') {
            match component {
                "x" | "X" | "*" => {
                    seen_wildcard = true;
                    parts.push(None);
                }
                number if !seen_wildcard => {
                    let n = number
                        .parse::<u64>()
                        .map_err(|_| format!("invalid component '{number}' in pattern '{raw}'"))?;
                    parts.push(Some(n));
                }
                _ => {
                    return Err(format!(
                        "pattern '{raw}' has a fixed component after a wildcard"
                    ))
                }
            }
        }
        Ok(Self {
            raw: raw.to_string(),
            parts,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn has_wildcard(&self) -> bool {
        self.parts.iter().any(Option::is_none)
    }

    pub fn matches(&self, version: &LooseVersion) -> bool {
        if !self.has_wildcard() {
            let exact = LooseVersion {
                raw: self.raw.clone(),
                numbers: self.parts.iter().flatten().copied().collect(),
                suffix: None,
            };
            return *version == exact;
        }
        self.parts.iter().enumerate().all(|(i, part)| match part {
            Some(n) => version.numbers().get(i).copied().unwrap_or(0) == *n,
            None => true,
        })
    }

    /// The highest version matching this pattern.
    pub fn latest<'a, I>(&self, versions: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = &'a str>,
    {
        latest_version(
            versions
                .into_iter()
                .filter(|v| self.matches(&LooseVersion::parse(v))),
        )
    }
}

impl fmt::Display for VersionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> LooseVersion {
        LooseVersion::parse(s)
    }

    #[test]
    fn orders_numeric_components_as_integers() {
        let mut versions = vec![v("v1.2.3"), v("v1.10.0"), v("v1.9.9"), v("v2.0.0-beta")];
        versions.sort();
        let sorted: Vec<&str> = versions.iter().map(LooseVersion::as_str).collect();
        assert_eq!(sorted, ["v1.2.3", "v1.9.9", "v1.10.0", "v2.0.0-beta"]);
        assert_eq!(
            latest_version(["v1.2.3", "v1.10.0", "v1.9.9", "v2.0.0-beta"]),
            Some("v2.0.0-beta")
        );
    }

    #[test]
    fn prefix_and_trailing_zeros_are_insignificant() {
        assert_eq!(v("v1.2"), v("1.2.0"));
        assert_eq!(v("V3"), v("3.0.0"));
        assert!(v("1.2.0.1") > v("v1.2"));
    }

    #[test]
    fn suffix_sorts_below_release() {
        assert!(v("v1.2.3-rc1") < v("v1.2.3"));
        assert!(v("v1.2.3rc1") < v("v1.2.3rc2"));
        assert!(v("v1.2.3-alpha") < v("v1.2.3-beta"));
        assert!(v("v1.2.3-beta.2") < v("v1.2.3-beta.11"));
        assert!(v("v1.2.4-alpha") > v("v1.2.3"));
    }

    #[test]
    fn non_numeric_versions_sort_lowest() {
        let parsed = v("master");
        assert!(parsed.numbers().is_empty());
        assert_eq!(parsed.suffix(), Some("master"));
        assert!(parsed < v("v0.0.1"));
        assert!(parsed < v("0.0.0-alpha"));
        assert!(v("nightly") < v("v0.0.0-alpha.1"));
        assert!(v("alpha") < v("beta"));
        assert_eq!(
            latest_version(["master", "v0.0.0-alpha", "nightly"]),
            Some("v0.0.0-alpha")
        );
    }

    #[test]
    fn patterns_constrain_latest() {
        let versions = ["v1.2.3", "v1.4.0", "v1.4.12", "v2.0.0", "v2.1.0-beta"];
        let pattern = VersionPattern::parse("v1.x.x").unwrap();
        assert_eq!(pattern.latest(versions), Some("v1.4.12"));

        let pattern = VersionPattern::parse("v1.4.x").unwrap();
        assert_eq!(pattern.latest(versions), Some("v1.4.12"));

        let pattern = VersionPattern::parse("v1.2.3").unwrap();
        assert_eq!(pattern.latest(versions), Some("v1.2.3"));

        let pattern = VersionPattern::parse("v3.x").unwrap();
        assert_eq!(pattern.latest(versions), None);
    }

    #[test]
    fn rejects_bad_patterns() {
        assert!(VersionPattern::parse("v1.x.2").is_err());
        assert!(VersionPattern::parse("vfoo").is_err());
        assert!(VersionPattern::parse("").is_err());
    }
}

//! Dotted firmware versions and version ranges.
//!
//! Firmware versions are written `X.Y` or `X.Y.Z`. Two-component versions
//! are padded with `.0` before comparing them as semantic versions, and
//! each component is compared numerically, so `"1.10" > "1.9"` and
//! `"1.05" == "1.5"`.

use std::cmp::Ordering;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\d{1,5}\.\d{1,5}(?:\.\d{1,5})?$").expect("static regex must compile")
});

/// Returns `true` if `text` is a two- or three-component dotted version.
pub fn is_version(text: &str) -> bool {
    VERSION_RE.is_match(text)
}

/// Pads a two-component version to three components (`"1.2"` → `"1.2.0"`).
/// Other input is returned unchanged.
pub fn pad_version(text: &str) -> String {
    if is_version(text) && text.matches('.').count() == 1 {
        format!("{text}.0")
    } else {
        text.to_string()
    }
}

/// Parses a dotted version into a [`semver::Version`].
pub fn parse_version(text: &str) -> Option<Version> {
    let text = text.trim();
    if !is_version(text) {
        return None;
    }
    let mut parts = text.split('.').map(|part| part.parse::<u64>());
    let major = parts.next()?.ok()?;
    let minor = parts.next()?.ok()?;
    let patch = match parts.next() {
        Some(patch) => patch.ok()?,
        None => 0,
    };
    Some(Version::new(major, minor, patch))
}

/// Compares two dotted versions. Returns `None` if either is malformed.
///
/// # Examples
///
/// ```
/// use std::cmp::Ordering;
/// use device_config_core::version::compare_versions;
///
/// assert_eq!(compare_versions("1.0", "1.0.0"), Some(Ordering::Equal));
/// assert_eq!(compare_versions("1.10", "1.9"), Some(Ordering::Greater));
/// assert_eq!(compare_versions("1.x", "1.0"), None);
/// ```
pub fn compare_versions(a: &str, b: &str) -> Option<Ordering> {
    Some(parse_version(a)?.cmp(&parse_version(b)?))
}

/// Inclusive firmware version range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareVersionRange {
    pub min: String,
    pub max: String,
}

impl FirmwareVersionRange {
    /// Creates a validated range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if either bound is not a dotted
    /// version or `min > max`.
    pub fn new(min: impl Into<String>, max: impl Into<String>) -> Result<Self> {
        let range = Self {
            min: min.into(),
            max: max.into(),
        };
        range.validate()?;
        Ok(range)
    }

    /// Range accepting every firmware (`0.0` to `255.255`).
    pub fn any() -> Self {
        Self {
            min: "0.0".to_string(),
            max: "255.255".to_string(),
        }
    }

    fn validate(&self) -> Result<()> {
        for (name, bound) in [("min", &self.min), ("max", &self.max)] {
            if !is_version(bound) {
                return Err(ConfigError::Invalid(format!(
                    "firmwareVersion.{name} \"{bound}\" must be a version in the format X.Y or X.Y.Z"
                )));
            }
        }
        if compare_versions(&self.min, &self.max) == Some(Ordering::Greater) {
            return Err(ConfigError::Invalid(format!(
                "firmwareVersion.min {} must not be greater than firmwareVersion.max {}",
                self.min, self.max
            )));
        }
        Ok(())
    }

    /// Returns `true` if `version` lies within the range, bounds included.
    /// Malformed versions never match.
    pub fn contains(&self, version: &str) -> bool {
        let (Some(min), Some(max), Some(version)) = (
            parse_version(&self.min),
            parse_version(&self.max),
            parse_version(version),
        ) else {
            return false;
        };
        min <= version && version <= max
    }

    /// Returns `true` if the two ranges share at least one version.
    pub fn overlaps(&self, other: &FirmwareVersionRange) -> bool {
        let parsed = (
            parse_version(&self.min),
            parse_version(&self.max),
            parse_version(&other.min),
            parse_version(&other.max),
        );
        match parsed {
            (Some(a_min), Some(a_max), Some(b_min), Some(b_max)) => {
                a_min <= b_max && b_min <= a_max
            }
            _ => false,
        }
    }
}

impl fmt::Display for FirmwareVersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.min, self.max)
    }
}

/// Firmware dimension of a document or index entry.
///
/// Serialized as `{ "min": ..., "max": ... }` or `false` for devices that
/// have no firmware version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FirmwareVersionRepr", into = "FirmwareVersionRepr")]
pub enum FirmwareVersion {
    Range(FirmwareVersionRange),
    Unversioned,
}

impl FirmwareVersion {
    /// Returns the range, if any.
    pub fn range(&self) -> Option<&FirmwareVersionRange> {
        match self {
            FirmwareVersion::Range(range) => Some(range),
            FirmwareVersion::Unversioned => None,
        }
    }

    pub fn is_unversioned(&self) -> bool {
        matches!(self, FirmwareVersion::Unversioned)
    }

    /// Returns `true` if a device reporting `version` is covered.
    /// Unversioned entries never cover a concrete version.
    pub fn contains(&self, version: &str) -> bool {
        self.range().is_some_and(|range| range.contains(version))
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FirmwareVersion::Range(range) => write!(f, "{range}"),
            FirmwareVersion::Unversioned => f.write_str("unversioned"),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum FirmwareVersionRepr {
    Range(FirmwareVersionRange),
    Flag(bool),
}

impl TryFrom<FirmwareVersionRepr> for FirmwareVersion {
    type Error = String;

    fn try_from(repr: FirmwareVersionRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            FirmwareVersionRepr::Range(range) => {
                range.validate().map_err(|err| err.to_string())?;
                Ok(FirmwareVersion::Range(range))
            }
            FirmwareVersionRepr::Flag(false) => Ok(FirmwareVersion::Unversioned),
            FirmwareVersionRepr::Flag(true) => {
                Err("firmwareVersion must be a range object or false".to_string())
            }
        }
    }
}

impl From<FirmwareVersion> for FirmwareVersionRepr {
    fn from(value: FirmwareVersion) -> Self {
        match value {
            FirmwareVersion::Range(range) => FirmwareVersionRepr::Range(range),
            FirmwareVersion::Unversioned => FirmwareVersionRepr::Flag(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_version() {
        assert_eq!(pad_version("1.2"), "1.2.0");
        assert_eq!(pad_version("1.2.3"), "1.2.3");
        assert_eq!(pad_version("abc"), "abc");
    }

    #[test]
    fn test_leading_zeros_compare_numerically() {
        assert_eq!(compare_versions("1.05", "1.5"), Some(Ordering::Equal));
        assert_eq!(compare_versions("2.255", "2.3"), Some(Ordering::Greater));
    }

    #[test]
    fn test_range_contains_is_inclusive() {
        let range = FirmwareVersionRange::new("1.0", "2.0").unwrap();
        assert!(range.contains("1.5"));
        assert!(range.contains("2.0"));
        assert!(range.contains("1.0.0"));
        assert!(!range.contains("2.1"));
        assert!(!range.contains("0.9"));
        assert!(!range.contains("garbage"));
    }

    #[test]
    fn test_range_rejects_inverted_bounds() {
        let err = FirmwareVersionRange::new("2.0", "1.0").unwrap_err();
        assert!(err.to_string().contains("must not be greater"));
        assert!(FirmwareVersionRange::new("1", "2.0").is_err());
    }

    #[test]
    fn test_overlaps() {
        let a = FirmwareVersionRange::new("1.0", "2.0").unwrap();
        let b = FirmwareVersionRange::new("2.0", "3.0").unwrap();
        let c = FirmwareVersionRange::new("2.1", "3.0").unwrap();
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert!(FirmwareVersionRange::any().overlaps(&c));
    }

    #[test]
    fn test_firmware_version_serde() {
        let unversioned: FirmwareVersion = serde_json::from_str("false").unwrap();
        assert!(unversioned.is_unversioned());
        assert_eq!(serde_json::to_string(&unversioned).unwrap(), "false");

        let ranged: FirmwareVersion =
            serde_json::from_str(r#"{"min":"1.0","max":"1.9"}"#).unwrap();
        assert!(ranged.contains("1.9"));
        assert!(!unversioned.contains("1.0"));

        assert!(serde_json::from_str::<FirmwareVersion>("true").is_err());
        assert!(serde_json::from_str::<FirmwareVersion>(r#"{"min":"3.0","max":"1.0"}"#).is_err());
    }
}

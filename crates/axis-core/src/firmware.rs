//! Pinned firmware release and version comparison
//!
//! Every camera in the fleet runs the same production release. A device whose
//! active version differs in either direction is upgraded (or downgraded) to
//! the pin.

use serde::{Deserialize, Serialize};

/// The production firmware release every device must run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FirmwarePin {
    /// Release version as reported by the device (e.g. "10.12.166")
    pub release: String,
    /// Artifact file name in the firmware object store
    pub filename: String,
    /// Optional SHA256 of the artifact (hex)
    pub sha256: Option<String>,
}

impl Default for FirmwarePin {
    fn default() -> Self {
        Self {
            release: "10.12.166".to_string(),
            filename: "M3058-PLVE_10_12_166.bin".to_string(),
            sha256: None,
        }
    }
}

/// Result of comparing the active firmware against the pin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwareStatus {
    /// Device runs the pinned release
    UpToDate,
    /// Device runs something else and must be upgraded
    Mismatch { active: String, target: String },
    /// Device did not report an active version
    Unknown,
}

impl FirmwareStatus {
    pub fn needs_upgrade(&self) -> bool {
        !matches!(self, FirmwareStatus::UpToDate)
    }
}

/// Compare the device's active firmware version against the pin.
///
/// Versions are compared as semver when both sides parse, otherwise as
/// trimmed strings.
pub fn compare_firmware(active: Option<&str>, pin: &FirmwarePin) -> FirmwareStatus {
    let Some(active) = active else {
        return FirmwareStatus::Unknown;
    };

    let same = match (
        semver::Version::parse(&clean_version_string(active)),
        semver::Version::parse(&clean_version_string(&pin.release)),
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => active.trim() == pin.release.trim(),
    };

    if same {
        FirmwareStatus::UpToDate
    } else {
        FirmwareStatus::Mismatch {
            active: active.to_string(),
            target: pin.release.clone(),
        }
    }
}

/// Remove a leading `v`/`V` and surrounding whitespace
fn clean_version_string(version: &str) -> String {
    let v = version.trim();
    v.strip_prefix(['v', 'V']).unwrap_or(v).to_string()
}

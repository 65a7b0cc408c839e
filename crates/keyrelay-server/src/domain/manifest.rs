//! The device manifest: which devices the relay should drive.
//!
//! Provisioning (out of scope for the relay) makes each device's input
//! server reachable and then hands the relay a TOML manifest:
//!
//! ```toml
//! [[devices]]
//! serial = "R58M123ABC"
//! name = "Galaxy S21"
//! ws_url = "ws://localhost:8886"
//!
//! [[devices]]
//! serial = "emulator-5554"
//! ws_url = "ws://localhost:8887"
//! ```
//!
//! `name` is optional and defaults to the serial.  Devices can also be given
//! on the command line as `SERIAL=NAME@URL` (or `SERIAL@URL`), parsed by
//! [`DeviceEntry::from_str`](std::str::FromStr).
//!
//! Parsing here is pure: string in, validated value out.  Reading the file is
//! `main.rs`'s job.

use std::collections::HashSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::messages::BROADCAST_TARGET;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to parse device manifest TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("device #{index} has an empty serial")]
    EmptySerial { index: usize },

    #[error("device '{serial}' has invalid ws_url '{url}' (expected ws:// or wss://)")]
    InvalidUrl { serial: String, url: String },

    #[error("device serial '{0}' is reserved for broadcast commands")]
    ReservedSerial(String),

    #[error("device '{0}' is listed more than once")]
    DuplicateSerial(String),

    #[error("invalid device spec '{0}' (expected SERIAL=NAME@URL)")]
    InvalidInline(String),
}

/// One device to register.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    pub serial: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub ws_url: String,
}

impl DeviceEntry {
    /// Display name, falling back to the serial.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.serial)
    }
}

impl FromStr for DeviceEntry {
    type Err = ManifestError;

    /// Parses `SERIAL=NAME@URL` or `SERIAL@URL`.
    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let invalid = || ManifestError::InvalidInline(spec.to_string());
        let (head, ws_url) = spec.split_once('@').ok_or_else(invalid)?;
        let (serial, name) = match head.split_once('=') {
            Some((serial, name)) => (serial, Some(name.trim().to_string())),
            None => (head, None),
        };
        let entry = DeviceEntry {
            serial: serial.trim().to_string(),
            name: name.filter(|n| !n.is_empty()),
            ws_url: ws_url.trim().to_string(),
        };
        entry.validate(0)?;
        Ok(entry)
    }
}

impl DeviceEntry {
    fn validate(&self, index: usize) -> Result<(), ManifestError> {
        if self.serial.trim().is_empty() {
            return Err(ManifestError::EmptySerial { index });
        }
        if self.serial == BROADCAST_TARGET {
            return Err(ManifestError::ReservedSerial(self.serial.clone()));
        }
        let has_scheme = self.ws_url.starts_with("ws://") || self.ws_url.starts_with("wss://");
        let has_host = self
            .ws_url
            .split_once("://")
            .is_some_and(|(_, rest)| !rest.is_empty() && !rest.starts_with('/'));
        if !(has_scheme && has_host) {
            return Err(ManifestError::InvalidUrl {
                serial: self.serial.clone(),
                url: self.ws_url.clone(),
            });
        }
        Ok(())
    }
}

/// The parsed manifest file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceManifest {
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

impl DeviceManifest {
    /// Parses and validates manifest TOML.
    pub fn from_toml_str(text: &str) -> Result<Self, ManifestError> {
        let manifest: DeviceManifest = toml::from_str(text)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Checks every entry and rejects duplicate serials.
    pub fn validate(&self) -> Result<(), ManifestError> {
        let mut seen = HashSet::new();
        for (index, entry) in self.devices.iter().enumerate() {
            entry.validate(index)?;
            if !seen.insert(entry.serial.as_str()) {
                return Err(ManifestError::DuplicateSerial(entry.serial.clone()));
            }
        }
        Ok(())
    }

    /// Appends entries, keeping the duplicate-serial rule.
    pub fn extend(
        &mut self,
        entries: impl IntoIterator<Item = DeviceEntry>,
    ) -> Result<(), ManifestError> {
        self.devices.extend(entries);
        self.validate()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_manifest_with_optional_name() {
        // Arrange
        let text = r#"
            [[devices]]
            serial = "R58M"
            name = "Galaxy"
            ws_url = "ws://localhost:8886"

            [[devices]]
            serial = "emulator-5554"
            ws_url = "ws://localhost:8887"
        "#;

        // Act
        let manifest = DeviceManifest::from_toml_str(text).unwrap();

        // Assert
        assert_eq!(manifest.devices.len(), 2);
        assert_eq!(manifest.devices[0].label(), "Galaxy");
        assert_eq!(manifest.devices[1].label(), "emulator-5554");
        assert_eq!(manifest.devices[1].ws_url, "ws://localhost:8887");
    }

    #[test]
    fn test_empty_manifest_is_valid() {
        let manifest = DeviceManifest::from_toml_str("").unwrap();
        assert!(manifest.is_empty());
    }

    #[test]
    fn test_missing_ws_url_is_parse_error() {
        let err = DeviceManifest::from_toml_str("[[devices]]\nserial = \"a\"\n").unwrap_err();
        assert!(matches!(err, ManifestError::Parse(_)));
    }

    #[test]
    fn test_non_websocket_url_is_rejected() {
        let text = "[[devices]]\nserial = \"a\"\nws_url = \"http://localhost:8886\"\n";
        let err = DeviceManifest::from_toml_str(text).unwrap_err();
        assert!(matches!(err, ManifestError::InvalidUrl { .. }));
    }

    #[test]
    fn test_empty_serial_is_rejected() {
        let text = "[[devices]]\nserial = \" \"\nws_url = \"ws://h:1\"\n";
        let err = DeviceManifest::from_toml_str(text).unwrap_err();
        assert!(matches!(err, ManifestError::EmptySerial { index: 0 }));
    }

    #[test]
    fn test_broadcast_serial_is_rejected() {
        let text = "[[devices]]\nserial = \"broadcast\"\nws_url = \"ws://h:1\"\n";
        let err = DeviceManifest::from_toml_str(text).unwrap_err();
        assert!(matches!(err, ManifestError::ReservedSerial(ref s) if s == "broadcast"));

        let inline = "broadcast=All@ws://h:1".parse::<DeviceEntry>().unwrap_err();
        assert!(matches!(inline, ManifestError::ReservedSerial(_)));
    }

    #[test]
    fn test_duplicate_serial_is_rejected() {
        let text = r#"
            [[devices]]
            serial = "a"
            ws_url = "ws://h:1"
            [[devices]]
            serial = "a"
            ws_url = "ws://h:2"
        "#;
        let err = DeviceManifest::from_toml_str(text).unwrap_err();
        assert!(matches!(err, ManifestError::DuplicateSerial(s) if s == "a"));
    }

    #[test]
    fn test_inline_spec_with_name() {
        let entry: DeviceEntry = "R58M=Galaxy S21@ws://localhost:8886".parse().unwrap();
        assert_eq!(entry.serial, "R58M");
        assert_eq!(entry.name.as_deref(), Some("Galaxy S21"));
        assert_eq!(entry.ws_url, "ws://localhost:8886");
    }

    #[test]
    fn test_inline_spec_without_name() {
        let entry: DeviceEntry = "R58M@wss://10.0.0.2:443".parse().unwrap();
        assert_eq!(entry.label(), "R58M");
        assert_eq!(entry.ws_url, "wss://10.0.0.2:443");
    }

    #[test]
    fn test_inline_spec_without_url_is_rejected() {
        let err = "R58M=Galaxy".parse::<DeviceEntry>().unwrap_err();
        assert!(matches!(err, ManifestError::InvalidInline(_)));
    }

    #[test]
    fn test_extend_rejects_duplicate_across_sources() {
        let mut manifest =
            DeviceManifest::from_toml_str("[[devices]]\nserial = \"a\"\nws_url = \"ws://h:1\"\n")
                .unwrap();
        let inline: DeviceEntry = "a@ws://h:2".parse().unwrap();

        let err = manifest.extend([inline]).unwrap_err();

        assert!(matches!(err, ManifestError::DuplicateSerial(_)));
    }
}

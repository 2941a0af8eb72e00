//! Camera list loading
//!
//! Reads `cameras.json`. Accepted shapes:
//!
//! ```json
//! { "cameras": [ { "ip": "192.168.0.126", "type": "ptzoptics" } ] }
//! [ { "ip": "192.168.0.127", "camera_type": "sony-visca-ip", "control_port": 52381 } ]
//! ```
//!
//! The file is read-only from our side; it is never created or rewritten.

use crate::RegistryError;
use ptz_protocol::{CameraEndpoint, ProtocolVariant};
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use tracing::{info, warn};

/// Camera used when no list is configured
pub const DEFAULT_CAMERA_HOST: &str = "192.168.0.126";

pub fn default_endpoints() -> Vec<CameraEndpoint> {
    vec![CameraEndpoint::new(DEFAULT_CAMERA_HOST, ProtocolVariant::PtzOptics)]
}

/// Both accepted document shapes; entries stay untyped so one bad entry
/// cannot sink the whole list
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CameraList {
    Wrapped { cameras: Vec<Value> },
    Bare(Vec<Value>),
}

/// One `cameras.json` entry
#[derive(Debug, Deserialize)]
struct CameraEntry {
    ip: String,
    #[serde(default, rename = "type", alias = "camera_type")]
    camera_type: Option<String>,
    #[serde(default)]
    control_port: Option<u16>,
}

impl CameraEntry {
    fn into_endpoint(self) -> Result<CameraEndpoint, String> {
        let host = self.ip.trim();
        if host.is_empty() {
            return Err("missing ip".into());
        }

        let type_name = self
            .camera_type
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(ProtocolVariant::PtzOptics.name());
        let variant = ProtocolVariant::from_name(type_name)
            .ok_or_else(|| format!("unknown camera type {:?}", type_name))?;

        let endpoint = CameraEndpoint::new(host, variant);
        match self.control_port {
            None => Ok(endpoint),
            Some(0) => Err("invalid control_port 0".into()),
            Some(port) => Ok(endpoint.with_control_port(port)),
        }
    }
}

/// Parse a camera list. Malformed entries are skipped with a warning; a
/// document that is not JSON or has no camera list is an error.
pub fn parse_cameras(json: &str) -> Result<Vec<CameraEndpoint>, RegistryError> {
    let list: CameraList = serde_json::from_str(json).map_err(|e| {
        RegistryError::Config(format!(
            "expected a list or an object with a \"cameras\" list: {}",
            e
        ))
    })?;
    let entries = match list {
        CameraList::Wrapped { cameras } => cameras,
        CameraList::Bare(entries) => entries,
    };

    let mut endpoints = Vec::with_capacity(entries.len());
    for (i, entry) in entries.into_iter().enumerate() {
        let parsed = serde_json::from_value::<CameraEntry>(entry)
            .map_err(|e| e.to_string())
            .and_then(CameraEntry::into_endpoint);
        match parsed {
            Ok(endpoint) => endpoints.push(endpoint),
            Err(reason) => warn!("Skipping camera entry {}: {}", i, reason),
        }
    }
    Ok(endpoints)
}

/// Load the camera list at `path`, falling back to the built-in default camera
/// when the file is missing, unreadable, or lists no usable camera.
pub fn load_cameras(path: &Path) -> Vec<CameraEndpoint> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            info!("No camera list at {} ({}), using default camera", path.display(), e);
            return default_endpoints();
        }
    };

    match parse_cameras(&text) {
        Ok(endpoints) if !endpoints.is_empty() => {
            info!("Loaded {} camera(s) from {}", endpoints.len(), path.display());
            endpoints
        }
        Ok(_) => {
            warn!("{} lists no usable camera, using default camera", path.display());
            default_endpoints()
        }
        Err(e) => {
            warn!("Ignoring {}: {}", path.display(), e);
            default_endpoints()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_file(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("camera-registry-{}-{}", std::process::id(), name));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_parse_object_form() {
        let endpoints = parse_cameras(
            r#"{"cameras": [{"ip": " 10.0.0.5 ", "type": "ptzoptics"}, {"ip": "10.0.0.6", "type": "sony"}]}"#,
        )
        .unwrap();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].host(), "10.0.0.5");
        assert_eq!(endpoints[1].variant(), ProtocolVariant::SonyViscaIp);
    }

    #[test]
    fn test_parse_list_form_with_aliases() {
        let endpoints = parse_cameras(
            r#"[{"ip": "10.0.0.7", "camera_type": "sony-visca-ip", "control_port": 1259}, {"ip": "10.0.0.8"}]"#,
        )
        .unwrap();
        assert_eq!(endpoints[0].control_port(), 1259);
        assert_eq!(endpoints[1].variant(), ProtocolVariant::PtzOptics);
        assert_eq!(endpoints[1].control_port(), 5678);
    }

    #[test]
    fn test_bad_entries_skipped() {
        let endpoints = parse_cameras(
            r#"{"cameras": [
                "10.0.0.1",
                {"ip": "   "},
                {"ip": "10.0.0.2", "type": "betamax"},
                {"ip": "10.0.0.3", "control_port": 70000},
                {"ip": "10.0.0.5", "control_port": 0},
                {"camera_type": "sony"},
                {"ip": "10.0.0.4"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(endpoints.len(), 1);
        assert_eq!(endpoints[0].host(), "10.0.0.4");
    }

    #[test]
    fn test_malformed_documents() {
        assert!(matches!(parse_cameras("{"), Err(RegistryError::Config(_))));
        assert!(matches!(parse_cameras("42"), Err(RegistryError::Config(_))));
        assert!(matches!(parse_cameras(r#"{"cameras": 1}"#), Err(RegistryError::Config(_))));
    }

    #[test]
    fn test_missing_file_uses_default() {
        let path = std::env::temp_dir().join("camera-registry-does-not-exist.json");
        let endpoints = load_cameras(&path);
        assert_eq!(endpoints, default_endpoints());
        assert_eq!(endpoints[0].host(), DEFAULT_CAMERA_HOST);
        assert!(!path.exists());
    }

    #[test]
    fn test_load_from_file() {
        let path = temp_file("cams.json", r#"{"cameras": [{"ip": "10.1.1.1"}, {"ip": "10.1.1.2"}]}"#);
        let endpoints = load_cameras(&path);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(endpoints.len(), 2);
    }

    #[test]
    fn test_empty_or_garbage_file_uses_default() {
        let empty = temp_file("empty.json", r#"{"cameras": []}"#);
        let garbage = temp_file("garbage.json", "not json");
        assert_eq!(load_cameras(&empty), default_endpoints());
        assert_eq!(load_cameras(&garbage), default_endpoints());
        std::fs::remove_file(&empty).unwrap();
        std::fs::remove_file(&garbage).unwrap();
    }
}

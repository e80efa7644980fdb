use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("camera id must not be empty")]
    EmptyCameraId,
    #[error("{field} URL must not be empty")]
    EmptyUrl { field: &'static str },
    #[error("{field} URL '{url}' uses unsupported scheme '{scheme}'")]
    UnsupportedScheme {
        field: &'static str,
        url: String,
        scheme: String,
    },
    #[error("camera {camera_id}: at least one detection class must be enabled")]
    NoClasses { camera_id: String },
    #[error("camera {camera_id}: class '{class}' is not produced by the detector")]
    UnknownClass { camera_id: String, class: String },
    #[error("duplicate camera id '{0}'")]
    DuplicateCamera(String),
    #[error("{0}")]
    InvalidSetting(String),
    #[error("failed to read cameras file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse cameras file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

const SUPPORTED_SCHEMES: &[&str] = &["rtsp", "rtsps", "rtmp", "http", "https", "file"];

/// Per-camera wiring, supplied once at pipeline start.
///
/// Immutable for the lifetime of a pipeline: a configuration change means
/// a new pipeline, never an in-place update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraConfig {
    camera_id: String,
    input_url: String,
    output_url: String,
    enabled_classes: BTreeSet<String>,
}

impl CameraConfig {
    pub fn new(
        camera_id: impl Into<String>,
        input_url: impl Into<String>,
        output_url: impl Into<String>,
        enabled_classes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, ConfigError> {
        let camera_id = camera_id.into().trim().to_string();
        if camera_id.is_empty() {
            return Err(ConfigError::EmptyCameraId);
        }
        let input_url = validate_url("input", input_url.into())?;
        let output_url = validate_url("output", output_url.into())?;
        let enabled_classes: BTreeSet<String> = enabled_classes
            .into_iter()
            .map(|c| c.into().trim().to_lowercase())
            .filter(|c| !c.is_empty())
            .collect();
        if enabled_classes.is_empty() {
            return Err(ConfigError::NoClasses { camera_id });
        }
        Ok(Self {
            camera_id,
            input_url,
            output_url,
            enabled_classes,
        })
    }

    pub fn camera_id(&self) -> &str {
        &self.camera_id
    }

    pub fn input_url(&self) -> &str {
        &self.input_url
    }

    pub fn output_url(&self) -> &str {
        &self.output_url
    }

    pub fn enabled_classes(&self) -> &BTreeSet<String> {
        &self.enabled_classes
    }

    pub fn is_enabled(&self, class_label: &str) -> bool {
        self.enabled_classes.contains(class_label)
    }

    /// Rejects classes the detector cannot produce, so a typo does not
    /// silently disable a camera.
    pub fn check_classes(&self, known: &[String]) -> Result<(), ConfigError> {
        for class in &self.enabled_classes {
            if !known.iter().any(|k| k == class) {
                return Err(ConfigError::UnknownClass {
                    camera_id: self.camera_id.clone(),
                    class: class.clone(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct CameraEntry {
    id: String,
    input: String,
    output: String,
    #[serde(default = "default_classes")]
    classes: Vec<String>,
}

#[derive(Deserialize)]
struct CamerasFile {
    cameras: Vec<CameraEntry>,
}

fn default_classes() -> Vec<String> {
    vec!["face".to_string()]
}

/// Loads a JSON cameras file:
///
/// ```json
/// { "cameras": [ { "id": "lobby", "input": "rtsp://...", "output": "rtsp://...", "classes": ["face"] } ] }
/// ```
pub fn load_cameras_file(path: &Path) -> Result<Vec<CameraConfig>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_cameras(&text).map_err(|e| match e {
        ParseFailure::Json(source) => ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        },
        ParseFailure::Invalid(e) => e,
    })
}

enum ParseFailure {
    Json(serde_json::Error),
    Invalid(ConfigError),
}

fn parse_cameras(text: &str) -> Result<Vec<CameraConfig>, ParseFailure> {
    let file: CamerasFile = serde_json::from_str(text).map_err(ParseFailure::Json)?;
    let mut seen = BTreeSet::new();
    let mut configs = Vec::with_capacity(file.cameras.len());
    for entry in file.cameras {
        if !seen.insert(entry.id.clone()) {
            return Err(ParseFailure::Invalid(ConfigError::DuplicateCamera(entry.id)));
        }
        let config = CameraConfig::new(entry.id, entry.input, entry.output, entry.classes)
            .map_err(ParseFailure::Invalid)?;
        configs.push(config);
    }
    Ok(configs)
}

fn validate_url(field: &'static str, url: String) -> Result<String, ConfigError> {
    let url = url.trim().to_string();
    if url.is_empty() {
        return Err(ConfigError::EmptyUrl { field });
    }
    if let Some((scheme, _)) = url.split_once("://") {
        let scheme = scheme.to_lowercase();
        if !SUPPORTED_SCHEMES.contains(&scheme.as_str()) {
            return Err(ConfigError::UnsupportedScheme { field, url, scheme });
        }
    }
    Ok(url)
}

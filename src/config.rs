// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Configuration of a height analysis run.
//!
//! Every field has a default, so a JSON file only needs to name what differs:
//! ```json
//! {
//!     "shutter_speed_in_ms": 80,
//!     "setup": {
//!         "calibration_file": "/home/slstudio/calibration.xml",
//!         "camera_ids": ["CAM_LEFT", "CAM_RIGHT"]
//!     }
//! }
//! ```
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::exception::{ClientException, ClientResult};
use crate::messages::{AnalysisGoal, SetupRequest, COMMAND_PORT};

pub const DEFAULT_ACTION_NAME: &str = "/ximea_mono/slstudio/heightAnalysis";
pub const DEFAULT_SETUP_SERVICE: &str = "/ximea_mono/slstudio/setupSlstudio";
pub const DEFAULT_SHUTTER_SPEED_IN_MS: u32 = 50;
pub const DEFAULT_COLOR_MAP_PATH: &str = "/tmp/color_map.png";
pub const DEFAULT_IMAGE_ON_PATH: &str = "/tmp/imageOn.png";

/// Where the bridge lives and how often to knock while it is not up yet.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// IP-Address or hostname of the bridge
    pub address: String,
    pub port: u16,
    pub retry_interval_ms: u64,
}

impl ServerConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            address: "127.0.0.1".to_string(),
            port: COMMAND_PORT,
            retry_interval_ms: 500,
        }
    }
}

/// Arguments of the one-time `setupSlstudio` call.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SetupConfig {
    pub service_name: String,
    /// Path on the server side, not checked locally.
    pub calibration_file: String,
    /// Falls back to the shutter speed of the analysis goal.
    pub shutter_speed_in_ms: Option<u32>,
    pub camera_ids: Vec<String>,
    pub auxiliary: Vec<String>,
}

impl Default for SetupConfig {
    fn default() -> Self {
        SetupConfig {
            service_name: DEFAULT_SETUP_SERVICE.to_string(),
            calibration_file: String::new(),
            shutter_speed_in_ms: None,
            camera_ids: Vec::new(),
            auxiliary: Vec::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub color_map: PathBuf,
    pub image_on: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            color_map: PathBuf::from(DEFAULT_COLOR_MAP_PATH),
            image_on: PathBuf::from(DEFAULT_IMAGE_ON_PATH),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub server: ServerConfig,
    pub action_name: String,
    pub shutter_speed_in_ms: u32,
    /// The setup call is skipped when this is `None`.
    pub setup: Option<SetupConfig>,
    pub output: OutputConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            server: ServerConfig::default(),
            action_name: DEFAULT_ACTION_NAME.to_string(),
            shutter_speed_in_ms: DEFAULT_SHUTTER_SPEED_IN_MS,
            setup: None,
            output: OutputConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Reads a configuration from a JSON file. Missing fields take their defaults.
    /// # Errors
    /// * [`ConfigException`](`crate::exception::ClientException::ConfigException`) if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> ClientResult<ClientConfig> {
        let content = fs::read_to_string(path).map_err(|e| ClientException::ConfigException {
            message: format!("could not read {}: {}", path.display(), e),
        })?;
        serde_json::from_str(&content).map_err(|e| ClientException::ConfigException {
            message: format!("could not parse {}: {}", path.display(), e),
        })
    }

    /// # Errors
    /// * [`ConfigException`](`crate::exception::ClientException::ConfigException`) naming the first invalid field.
    pub fn validate(&self) -> ClientResult<()> {
        if self.shutter_speed_in_ms == 0 {
            return Err(config_exception("shutter_speed_in_ms must be positive"));
        }
        if self.action_name.is_empty() {
            return Err(config_exception("action_name must not be empty"));
        }
        if let Some(setup) = &self.setup {
            if setup.service_name.is_empty() {
                return Err(config_exception("setup.service_name must not be empty"));
            }
            if setup.calibration_file.is_empty() {
                return Err(config_exception("setup.calibration_file must not be empty"));
            }
            if setup.camera_ids.is_empty() {
                return Err(config_exception("setup.camera_ids must name at least one camera"));
            }
            if setup.shutter_speed_in_ms == Some(0) {
                return Err(config_exception("setup.shutter_speed_in_ms must be positive"));
            }
        }
        Ok(())
    }

    pub fn goal(&self) -> AnalysisGoal {
        AnalysisGoal {
            shutter_speed_in_ms: self.shutter_speed_in_ms,
        }
    }

    pub fn setup_request(&self) -> Option<SetupRequest> {
        self.setup.as_ref().map(|setup| SetupRequest {
            calibration_file: setup.calibration_file.clone(),
            shutter_speed_in_ms: setup
                .shutter_speed_in_ms
                .unwrap_or(self.shutter_speed_in_ms),
            camera_ids: setup.camera_ids.clone(),
            auxiliary: setup.auxiliary.clone(),
        })
    }
}

fn config_exception(message: &'static str) -> ClientException {
    ClientException::ConfigException {
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use crate::config::{ClientConfig, SetupConfig, DEFAULT_ACTION_NAME};
    use crate::exception::ClientException;

    #[test]
    fn defaults_match_the_fixed_literals() {
        let config = ClientConfig::default();
        assert_eq!(config.action_name, DEFAULT_ACTION_NAME);
        assert_eq!(config.shutter_speed_in_ms, 50);
        assert_eq!(config.output.color_map, PathBuf::from("/tmp/color_map.png"));
        assert_eq!(config.output.image_on, PathBuf::from("/tmp/imageOn.png"));
        assert!(config.setup.is_none());
        assert!(config.setup_request().is_none());
        config.validate().unwrap();
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"shutter_speed_in_ms": 80,
                "server": {{"port": 9000}},
                "setup": {{"calibration_file": "/srv/calib.xml", "camera_ids": ["A", "B"]}}}}"#
        )
        .unwrap();
        let config = ClientConfig::from_file(file.path()).unwrap();
        assert_eq!(config.shutter_speed_in_ms, 80);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.address, "127.0.0.1");
        let request = config.setup_request().unwrap();
        assert_eq!(request.calibration_file, "/srv/calib.xml");
        assert_eq!(request.shutter_speed_in_ms, 80);
        assert_eq!(request.camera_ids, vec!["A".to_string(), "B".to_string()]);
        assert!(request.auxiliary.is_empty());
        config.validate().unwrap();
    }

    #[test]
    fn unreadable_file_is_a_config_error() {
        match ClientConfig::from_file(&PathBuf::from("/nonexistent/height.json")) {
            Err(ClientException::ConfigException { .. }) => {}
            other => panic!("Expected ConfigException but found {:?}", other),
        }
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = ClientConfig::default();
        config.shutter_speed_in_ms = 0;
        assert!(config.validate().is_err());

        let mut config = ClientConfig::default();
        config.setup = Some(SetupConfig {
            calibration_file: "/srv/calib.xml".to_string(),
            ..SetupConfig::default()
        });
        assert!(config.validate().is_err());

        config.setup.as_mut().unwrap().camera_ids = vec!["A".to_string()];
        config.validate().unwrap();
    }
}

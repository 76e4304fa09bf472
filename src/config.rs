use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::AppError;

pub const ENV_PREFIX: &str = "LABEL_LENS";
const DEFAULT_CONFIG_NAME: &str = "label-lens";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub endpoint: String,
    pub max_labels: u32,
    pub confidence: u32,
    pub remove_people: bool,
    pub request_timeout_secs: Option<u64>,
    pub command_buffer_size: usize,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            max_labels: 5,
            confidence: 90,
            remove_people: false,
            request_timeout_secs: None,
            command_buffer_size: 32,
        }
    }
}

impl Configuration {
    /// Layers an optional TOML file and `LABEL_LENS_*` environment variables
    /// over the built-in defaults. Without an explicit path, `label-lens.toml`
    /// in the working directory is read if it exists.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_NAME).required(false),
        };

        let configuration: Configuration = Config::builder()
            .add_source(file)
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;

        configuration.validate()?;
        Ok(configuration)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !(1..=100).contains(&self.max_labels) {
            return Err(AppError::InvalidParameter {
                name: "max_labels",
                reason: format!("default {} is outside 1..=100", self.max_labels),
            });
        }
        if self.confidence > 100 {
            return Err(AppError::InvalidParameter {
                name: "confidence",
                reason: format!("default {} is outside 0..=100", self.confidence),
            });
        }
        if self.command_buffer_size == 0 {
            return Err(AppError::Config(
                "command_buffer_size must be greater than zero".to_string(),
            ));
        }
        if self.request_timeout_secs == Some(0) {
            return Err(AppError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

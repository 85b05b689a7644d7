use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tunables of a controller instance, parsed from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerSettings {
    /// Records per presentation page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Records requested per on-demand pull.
    #[serde(default = "default_batch_limit")]
    pub batch_limit: usize,

    /// Matching records after which a streaming session completes.
    #[serde(default = "default_stream_limit")]
    pub stream_limit: usize,
}

fn default_page_size() -> usize {
    20
}

fn default_batch_limit() -> usize {
    200
}

fn default_stream_limit() -> usize {
    200
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            batch_limit: default_batch_limit(),
            stream_limit: default_stream_limit(),
        }
    }
}

impl ControllerSettings {
    /// Load settings from a TOML file.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Settings {
            context: "read",
            detail: format!("'{path}': {e}"),
        })?;
        Self::parse(&content)
    }

    /// Parse settings from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(toml_str).map_err(|e| ConfigError::Settings {
            context: "parse",
            detail: e.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("page_size", self.page_size),
            ("batch_limit", self.batch_limit),
            ("stream_limit", self.stream_limit),
        ] {
            if value == 0 {
                return Err(ConfigError::Settings {
                    context: "validate",
                    detail: format!("{name} must be greater than zero"),
                });
            }
        }
        Ok(())
    }
}

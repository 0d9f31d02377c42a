use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Interest management parameters: view size and per-tick budgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterestConfig {
    /// View radius in regions along x and z.
    pub horizontal_radius: i32,
    /// View radius in regions along y.
    pub vertical_radius: i32,
    /// Successful generations allowed per tick.
    pub max_generated_per_tick: usize,
    /// Wall-clock time generation may use per tick.
    pub generation_budget_ms: u64,
    /// Trackers fully delivered per tick.
    pub max_sent_per_tick: usize,
    /// Ticks between priority re-sorts of the work queues.
    pub sort_interval: u64,
    /// Voxel changes buffered per region before a full resend.
    pub change_buffer_capacity: usize,
    /// Height changes buffered per column before a full resend.
    pub height_buffer_capacity: usize,
}

impl Default for InterestConfig {
    fn default() -> Self {
        Self {
            horizontal_radius: 8,
            vertical_radius: 4,
            max_generated_per_tick: 24,
            generation_budget_ms: 50,
            max_sent_per_tick: 81 * 8,
            sort_interval: 4,
            change_buffer_capacity: 32,
            height_buffer_capacity: 8,
        }
    }
}

impl InterestConfig {
    pub fn generation_budget(&self) -> Duration {
        Duration::from_millis(self.generation_budget_ms)
    }

    /// Load and validate a JSON config. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        let config: InterestConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.horizontal_radius < 0 || self.vertical_radius < 0 {
            return Err(ConfigError::Invalid(format!(
                "view radii must be non-negative, got {}/{}",
                self.horizontal_radius, self.vertical_radius
            )));
        }
        let zeroes = [
            ("max_generated_per_tick", self.max_generated_per_tick),
            ("max_sent_per_tick", self.max_sent_per_tick),
            ("sort_interval", self.sort_interval as usize),
            ("change_buffer_capacity", self.change_buffer_capacity),
            ("height_buffer_capacity", self.height_buffer_capacity),
        ];
        if let Some((name, _)) = zeroes.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be positive")));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = InterestConfig::default();
        assert_eq!(config.horizontal_radius, 8);
        assert_eq!(config.vertical_radius, 4);
        assert_eq!(config.max_sent_per_tick, 648);
        assert_eq!(config.generation_budget(), Duration::from_millis(50));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_negative_radius() {
        let config = InterestConfig {
            vertical_radius: -1,
            ..InterestConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_zero_capacity() {
        let config = InterestConfig {
            change_buffer_capacity: 0,
            ..InterestConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("change_buffer_capacity"));
    }

    #[test]
    fn partial_json_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("interest.json");
        std::fs::write(&path, r#"{ "horizontal_radius": 3, "sort_interval": 2 }"#).unwrap();
        let config = InterestConfig::from_json_file(&path).unwrap();
        assert_eq!(config.horizontal_radius, 3);
        assert_eq!(config.sort_interval, 2);
        assert_eq!(config.vertical_radius, 4);
    }

    #[test]
    fn invalid_json_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("interest.json");
        std::fs::write(&path, r#"{ "sort_interval": 0 }"#).unwrap();
        assert!(matches!(
            InterestConfig::from_json_file(&path),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            InterestConfig::from_json_file(dir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
    }
}

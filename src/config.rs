use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cpu::BOOT_ROM_SIZE;
use crate::memory::ADDRESS_SPACE;

/// Which behavior to follow where the historical core and the real
/// LR35902 disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compatibility {
    /// Reproduce the historical core: `BIT` overwrites F with 0/1, `JR NZ`
    /// tests bit 0 of F, `XOR A`/`INC C` leave flags alone, `CALL` pushes PC+1.
    #[default]
    Legacy,
    /// Hardware semantics for those instructions.
    Accurate,
}

impl Compatibility {
    pub fn to_string(&self) -> &'static str {
        match self {
            Compatibility::Legacy => "legacy",
            Compatibility::Accurate => "accurate",
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn default_memory_size() -> usize {
    ADDRESS_SPACE
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Backing store size in bytes; addresses at or above it fault.
    #[serde(default = "default_memory_size")]
    pub memory_size: usize,
    #[serde(default)]
    pub compatibility: Compatibility,
    /// Record Prometheus metrics for every executed instruction.
    #[serde(default)]
    pub record_metrics: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            memory_size: default_memory_size(),
            compatibility: Compatibility::default(),
            record_metrics: false,
        }
    }
}

impl CoreConfig {
    pub fn accurate() -> Self {
        Self {
            compatibility: Compatibility::Accurate,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: CoreConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(BOOT_ROM_SIZE..=ADDRESS_SPACE).contains(&self.memory_size) {
            return Err(ConfigError::Invalid(format!(
                "memory_size {:#X} must be between {:#X} and {:#X}",
                self.memory_size, BOOT_ROM_SIZE, ADDRESS_SPACE
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.memory_size, 0x10000);
        assert_eq!(config.compatibility, Compatibility::Legacy);
        assert!(!config.record_metrics);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_json_uses_defaults() {
        let config = CoreConfig::from_json_str("{}").unwrap();
        assert_eq!(config, CoreConfig::default());
    }

    #[test]
    fn test_parse_all_fields() {
        let config = CoreConfig::from_json_str(
            r#"{"memory_size": 8192, "compatibility": "accurate", "record_metrics": true}"#,
        )
        .unwrap();
        assert_eq!(config.memory_size, 0x2000);
        assert_eq!(config.compatibility, Compatibility::Accurate);
        assert!(config.record_metrics);
    }

    #[test]
    fn test_rejects_memory_smaller_than_boot_rom() {
        let result = CoreConfig::from_json_str(r#"{"memory_size": 16}"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_memory_larger_than_address_space() {
        let result = CoreConfig::from_json_str(r#"{"memory_size": 70000}"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_unknown_compatibility() {
        let result = CoreConfig::from_json_str(r#"{"compatibility": "turbo"}"#);
        assert!(matches!(result, Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_load_missing_file() {
        let result = CoreConfig::load("/nonexistent/lr35902.json");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}

//! Simulation configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via MODELRT_CONFIG)
//! 3. Environment variables

use crate::scenario::ScenarioStep;
use modelrt_core::EngineConfig;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Simulation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Runtime limits.
    pub engine: EngineConfig,
    /// Vending machine behavior.
    pub machine: MachineConfig,
    /// Products seeded at start-up.
    pub catalog: Vec<ProductSpec>,
    /// Scripted events played against the machine.
    pub scenario: Vec<ScenarioStep>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            machine: MachineConfig::default(),
            catalog: default_catalog(),
            scenario: default_scenario(),
        }
    }
}

impl Config {
    /// Loads configuration from file, then applies environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("MODELRT_CONFIG") {
            config = Self::from_file(&path)?;
        }

        if let Ok(path) = std::env::var("MODELRT_SCENARIO") {
            config.scenario = Self::scenario_from_file(&path)?;
        }

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))
    }

    /// Loads a list of scenario steps from a YAML file.
    pub fn scenario_from_file(path: impl AsRef<Path>) -> Result<Vec<ScenarioStep>, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(max) = std::env::var("MODELRT_MAX_CASCADE") {
            if let Ok(n) = max.parse() {
                self.engine.max_cascade = n;
            }
        }

        if let Ok(limit) = std::env::var("MODELRT_HISTORY_LIMIT") {
            if let Ok(n) = limit.parse() {
                self.engine.history_limit = n;
            }
        }

        self.machine.apply_env_overrides();
    }

    /// Checks the catalog and machine settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.machine.validate()?;

        let mut codes = HashSet::new();
        for product in &self.catalog {
            if product.code.is_empty() {
                return Err(ConfigError::ValidationError(
                    "catalog entry with an empty product code".to_string(),
                ));
            }
            if !codes.insert(product.code.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate product code '{}'",
                    product.code
                )));
            }
            if !product.price.is_finite() || product.price < 0.0 {
                return Err(ConfigError::ValidationError(format!(
                    "product '{}' has an invalid price {}",
                    product.code, product.price
                )));
            }
            if product.stock < 0 {
                return Err(ConfigError::ValidationError(format!(
                    "product '{}' has negative stock {}",
                    product.code, product.stock
                )));
            }
        }

        for (index, step) in self.scenario.iter().enumerate() {
            if step.event.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "scenario step {} has no event",
                    index + 1
                )));
            }
        }

        Ok(())
    }

    /// Saves configuration to a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)
            .map_err(|e| ConfigError::ParseError(path.to_path_buf(), e.to_string()))?;
        std::fs::write(path, content).map_err(|e| ConfigError::IoError(path.to_path_buf(), e))?;
        Ok(())
    }
}

/// Vending machine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineConfig {
    /// Seconds a customer has to pay before the order times out (0 = never).
    pub payment_timeout_secs: f64,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            payment_timeout_secs: 30.0,
        }
    }
}

impl MachineConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(timeout) = std::env::var("MODELRT_PAYMENT_TIMEOUT_SECS") {
            if let Ok(secs) = timeout.parse() {
                self.payment_timeout_secs = secs;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.payment_timeout_secs.is_finite() || self.payment_timeout_secs < 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "invalid payment_timeout_secs {}",
                self.payment_timeout_secs
            )));
        }
        Ok(())
    }

    /// Returns the payment timeout, or None when disabled.
    pub fn payment_timeout(&self) -> Option<Duration> {
        if self.payment_timeout_secs > 0.0 {
            Duration::try_from_secs_f64(self.payment_timeout_secs).ok()
        } else {
            None
        }
    }
}

/// A product seeded into the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSpec {
    pub code: String,
    pub name: String,
    pub price: f64,
    pub stock: i64,
}

impl ProductSpec {
    pub fn new(code: &str, name: &str, price: f64, stock: i64) -> Self {
        Self {
            code: code.to_string(),
            name: name.to_string(),
            price,
            stock,
        }
    }
}

fn default_catalog() -> Vec<ProductSpec> {
    vec![
        ProductSpec::new("A1", "Mineral Water", 5000.0, 5),
        ProductSpec::new("B2", "Iced Coffee", 12000.0, 2),
        ProductSpec::new("C3", "Potato Chips", 8000.0, 0),
    ]
}

fn default_scenario() -> Vec<ScenarioStep> {
    vec![
        ScenarioStep::new("ProductSelected", json!({"p_productCode": "A1"})),
        ScenarioStep::new("PaymentSuccess", json!({})),
        ScenarioStep::new("ProductSelected", json!({"p_productCode": "C3"})),
        ScenarioStep::new("Reset", json!({})),
        ScenarioStep::new("ProductSelected", json!({"p_productCode": "Z9"})),
        ScenarioStep::new("ProductSelected", json!({"p_productCode": "B2"})),
        ScenarioStep::new("CancelOrder", json!({})),
    ]
}

/// Configuration error.
#[derive(Debug)]
pub enum ConfigError {
    IoError(PathBuf, std::io::Error),
    ParseError(PathBuf, String),
    ValidationError(String),
}

impl ConfigError {
    /// Returns a stable code suitable for log lines.
    pub fn error_code(&self) -> &'static str {
        match self {
            ConfigError::IoError(..) => "CONFIG_IO",
            ConfigError::ParseError(..) => "CONFIG_PARSE",
            ConfigError::ValidationError(_) => "CONFIG_INVALID",
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(path, e) => {
                write!(f, "failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::ValidationError(msg) => {
                write!(f, "configuration validation failed: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.engine.max_cascade, 10_000);
        assert_eq!(config.machine.payment_timeout_secs, 30.0);
        assert_eq!(config.catalog.len(), 3);
        assert!(!config.scenario.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_payment_timeout() {
        let mut machine = MachineConfig::default();
        assert_eq!(machine.payment_timeout(), Some(Duration::from_secs(30)));
        machine.payment_timeout_secs = 0.0;
        assert_eq!(machine.payment_timeout(), None);
    }

    #[test]
    fn test_validate_catalog() {
        let mut config = Config::default();
        config.catalog.push(ProductSpec::new("A1", "Duplicate", 1.0, 1));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = Config::default();
        config.catalog[0].price = -1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.catalog[0].stock = -3;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.machine.payment_timeout_secs = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = r#"
machine:
  payment_timeout_secs: 5
catalog:
  - code: D4
    name: Tea
    price: 4000
    stock: 1
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.machine.payment_timeout_secs, 5.0);
        assert_eq!(config.catalog, vec![ProductSpec::new("D4", "Tea", 4000.0, 1)]);
        assert_eq!(config.engine, EngineConfig::default());
        assert_eq!(config.scenario.len(), default_scenario().len());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("modelrt.yaml");

        let mut config = Config::default();
        config.engine.history_limit = 64;
        config.scenario = vec![ScenarioStep::new("Reset", json!({})).wait_ms(25)];
        config.save(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.engine.history_limit, 64);
        assert_eq!(loaded.catalog, config.catalog);
        assert_eq!(loaded.scenario, config.scenario);
    }

    #[test]
    fn test_missing_file() {
        let err = Config::from_file("/nonexistent/modelrt.yaml").unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_IO");
        assert!(err.to_string().contains("failed to read config file"));
    }

    #[test]
    fn test_scenario_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scenario.yaml");
        std::fs::write(
            &path,
            "- event: ProductSelected\n  payload:\n    p_productCode: A1\n  wait_ms: 10\n- event: CancelOrder\n",
        )
        .unwrap();

        let steps = Config::scenario_from_file(&path).unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].payload, json!({"p_productCode": "A1"}));
        assert_eq!(steps[0].wait_ms, 10);
        assert_eq!(steps[1].wait_ms, 0);
    }
}

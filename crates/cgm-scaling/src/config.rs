//! Balancing configuration.
//!
//! One immutable [`BalanceConfig`] value is handed to the engine per run. Files
//! may use the snake_case field names or the upper-case option names of the
//! exchange pipeline (`MAX_ITERATION`, `BALANCE_THRESHOLD`, ...).
//!
//! ```toml
//! [balancing]
//! max_iteration = 20
//! balance_threshold = 1.5
//! constant_power_factor = false
//! ```

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::{ScalingError, ScalingResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    /// Upper bound on load-scaling iterations
    #[serde(alias = "MAX_ITERATION")]
    pub max_iteration: usize,
    /// Allowed |offset| per area, MW (inclusive)
    #[serde(alias = "BALANCE_THRESHOLD")]
    pub balance_threshold: f64,
    /// Recompute reactive power from the initial q/p ratio when active power changes
    #[serde(alias = "CONSTANT_POWER_FACTOR")]
    pub constant_power_factor: bool,
    /// Clamp bound for |q/p|
    #[serde(alias = "POWER_FACTOR_THRESHOLD")]
    pub power_factor_threshold: f64,
    /// Islands with fewer buses are ignored
    #[serde(alias = "MIN_COMPONENT_BUSES")]
    pub min_component_buses: usize,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            max_iteration: 15,
            balance_threshold: 2.0,
            constant_power_factor: true,
            power_factor_threshold: 1.0,
            min_component_buses: 2,
        }
    }
}

/// TOML files may nest the options under `[balancing]`.
#[derive(Deserialize)]
struct TomlFile {
    balancing: BalanceConfig,
}

impl BalanceConfig {
    pub fn validate(&self) -> ScalingResult<()> {
        if !self.balance_threshold.is_finite() || self.balance_threshold < 0.0 {
            return Err(ScalingError::InvalidConfig(format!(
                "balance_threshold must be a finite non-negative number, got {}",
                self.balance_threshold
            )));
        }
        if !self.power_factor_threshold.is_finite() || self.power_factor_threshold <= 0.0 {
            return Err(ScalingError::InvalidConfig(format!(
                "power_factor_threshold must be a finite positive number, got {}",
                self.power_factor_threshold
            )));
        }
        Ok(())
    }

    pub fn from_toml_str(content: &str) -> ScalingResult<Self> {
        let table: toml::Table = toml::from_str(content)
            .map_err(|e| ScalingError::InvalidConfig(format!("parsing TOML: {e}")))?;
        let parsed = if table.contains_key("balancing") {
            toml::from_str::<TomlFile>(content).map(|f| f.balancing)
        } else {
            toml::from_str::<BalanceConfig>(content)
        };
        parsed.map_err(|e| ScalingError::InvalidConfig(format!("parsing TOML: {e}")))
    }

    pub fn from_yaml_str(content: &str) -> ScalingResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| ScalingError::InvalidConfig(format!("parsing YAML: {e}")))
    }

    pub fn from_json_str(content: &str) -> ScalingResult<Self> {
        serde_json::from_str(content)
            .map_err(|e| ScalingError::InvalidConfig(format!("parsing JSON: {e}")))
    }

    /// Load and validate a config file; the format follows the extension.
    pub fn load_from_path(path: impl AsRef<Path>) -> ScalingResult<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)?;
        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::from_toml_str(&data)?,
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                Self::from_yaml_str(&data)?
            }
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::from_json_str(&data)?,
            _ => Self::from_toml_str(&data)
                .or_else(|_| Self::from_yaml_str(&data))
                .or_else(|_| Self::from_json_str(&data))
                .map_err(|_| {
                    ScalingError::InvalidConfig(format!(
                        "'{}' is not valid TOML, YAML or JSON",
                        path.display()
                    ))
                })?,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn defaults_match_pipeline_settings() {
        let config = BalanceConfig::default();
        assert_eq!(config.max_iteration, 15);
        assert_eq!(config.balance_threshold, 2.0);
        assert!(config.constant_power_factor);
        assert_eq!(config.power_factor_threshold, 1.0);
        config.validate().unwrap();
    }

    #[test]
    fn toml_with_balancing_table() {
        let file = write_temp(
            ".toml",
            "[balancing]\nmax_iteration = 20\nbalance_threshold = 1.5\n",
        );
        let config = BalanceConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.max_iteration, 20);
        assert_eq!(config.balance_threshold, 1.5);
        assert!(config.constant_power_factor);
    }

    #[test]
    fn flat_toml_with_upper_case_names() {
        let config =
            BalanceConfig::from_toml_str("MAX_ITERATION = 3\nCONSTANT_POWER_FACTOR = false\n")
                .unwrap();
        assert_eq!(config.max_iteration, 3);
        assert!(!config.constant_power_factor);
    }

    #[test]
    fn yaml_and_json_by_extension() {
        let yaml = write_temp(".yaml", "BALANCE_THRESHOLD: 0.5\npower_factor_threshold: 0.8\n");
        let config = BalanceConfig::load_from_path(yaml.path()).unwrap();
        assert_eq!(config.balance_threshold, 0.5);
        assert_eq!(config.power_factor_threshold, 0.8);

        let json = write_temp(".json", r#"{"max_iteration": 7}"#);
        assert_eq!(BalanceConfig::load_from_path(json.path()).unwrap().max_iteration, 7);
    }

    #[test]
    fn unknown_extension_falls_back() {
        let file = write_temp(".cfg", r#"{"MIN_COMPONENT_BUSES": 5}"#);
        assert_eq!(
            BalanceConfig::load_from_path(file.path()).unwrap().min_component_buses,
            5
        );
    }

    #[test]
    fn validation_rejects_bad_thresholds() {
        let negative = BalanceConfig {
            balance_threshold: -1.0,
            ..Default::default()
        };
        assert!(matches!(negative.validate(), Err(ScalingError::InvalidConfig(_))));

        let zero_clamp = BalanceConfig {
            power_factor_threshold: 0.0,
            ..Default::default()
        };
        assert!(zero_clamp.validate().is_err());

        let file = write_temp(".toml", "balance_threshold = nan\n");
        assert!(BalanceConfig::load_from_path(file.path()).is_err());
    }
}

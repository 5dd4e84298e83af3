//! Configuration loading and parsing

use anyhow::{bail, Context, Result};
use flipdot_driver::{DriverConfig, PinMapping, SignSpec};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::fs;
use std::path::Path;

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Serial device the panels hang off
    pub serial_port: String,
    /// Port the RPC listener binds to
    #[serde(alias = "grpc_port")]
    pub rpc_port: u16,
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Upper bound on concurrently served connections
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: usize,
    pub pins: PinMapping,
    /// `[signs.<name>]` tables, in document order
    #[serde(deserialize_with = "keyed_signs")]
    pub signs: Vec<SignSpec>,
}

/// Body of a `[signs.<name>]` table; the name comes from the table key
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SignTable {
    address: u8,
    width: usize,
    height: usize,
    #[serde(default)]
    flip: bool,
}

fn keyed_signs<'de, D>(deserializer: D) -> std::result::Result<Vec<SignSpec>, D::Error>
where
    D: Deserializer<'de>,
{
    struct SignsVisitor;

    impl<'de> Visitor<'de> for SignsVisitor {
        type Value = Vec<SignSpec>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a table of signs keyed by name")
        }

        fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
        where
            A: MapAccess<'de>,
        {
            let mut signs = Vec::new();
            while let Some((name, table)) = map.next_entry::<String, SignTable>()? {
                signs.push(
                    SignSpec::new(name, table.address, table.width, table.height)
                        .flipped(table.flip),
                );
            }
            Ok(signs)
        }
    }

    deserializer.deserialize_map(SignsVisitor)
}

fn default_listen_address() -> String {
    "0.0.0.0".to_string()
}

fn default_max_workers() -> usize {
    10
}

fn default_baud_rate() -> usize {
    4800
}

impl AppConfig {
    /// Semantic checks that deserialization cannot express
    pub fn validate(&self) -> Result<()> {
        if self.serial_port.trim().is_empty() {
            bail!("Config missing: serial_port is empty");
        }
        if self.max_workers == 0 {
            bail!("max_workers must be at least 1");
        }
        if self.baud_rate == 0 {
            bail!("baud_rate must be positive");
        }
        self.driver_config()
            .validate()
            .context("Invalid sign configuration")?;
        Ok(())
    }

    /// The part of the configuration the driver library consumes
    pub fn driver_config(&self) -> DriverConfig {
        self.signs
            .iter()
            .cloned()
            .fold(DriverConfig::new(self.pins), DriverConfig::add_sign)
    }
}

/// Load and validate configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config
        .validate()
        .with_context(|| format!("Invalid config file: {:?}", path))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE_CONFIG: &str = r#"
        serial_port = '/dev/ttyUSB0'
        grpc_port = 5001

        [pins]
        sign = 40
        light = 38

        [signs]
        [signs.top]
        address = 1
        width = 84
        height = 7
        flip = true

        [signs.bottom]
        address = 2
        width = 12
        height = 18
        flip = false
    "#;

    #[test]
    fn test_config_deserialization() {
        let config: AppConfig = toml::from_str(SIMPLE_CONFIG).unwrap();
        assert_eq!(config.serial_port, "/dev/ttyUSB0");
        assert_eq!(config.rpc_port, 5001);
        assert_eq!(config.pins, PinMapping::new(40, 38));
        assert_eq!(config.max_workers, 10);
        assert_eq!(config.baud_rate, 4800);

        assert_eq!(config.signs[0], SignSpec::new("top", 1, 84, 7).flipped(true));
        assert_eq!(config.signs[1], SignSpec::new("bottom", 2, 12, 18));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, SIMPLE_CONFIG).unwrap();

        let config = load_config(&path).unwrap();
        let driver = config.driver_config();
        let names: Vec<&str> = driver.signs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["top", "bottom"]);
    }

    #[test]
    fn test_missing_keys_are_fatal() {
        let without_light = SIMPLE_CONFIG.replace("light = 38", "");
        let err = toml::from_str::<AppConfig>(&without_light).unwrap_err();
        assert!(err.to_string().contains("light"));

        let without_height = SIMPLE_CONFIG.replace("height = 18", "");
        assert!(toml::from_str::<AppConfig>(&without_height).is_err());

        let misspelled = SIMPLE_CONFIG.replace("flip = true", "flipped = true");
        assert!(toml::from_str::<AppConfig>(&misspelled).is_err());

        let without_port = SIMPLE_CONFIG.replace("serial_port = '/dev/ttyUSB0'", "");
        assert!(toml::from_str::<AppConfig>(&without_port).is_err());
    }

    #[test]
    fn test_semantic_validation() {
        let shared_address = SIMPLE_CONFIG.replace("address = 2", "address = 1");
        let config: AppConfig = toml::from_str(&shared_address).unwrap();
        assert!(config.validate().is_err());

        let mut config: AppConfig = toml::from_str(SIMPLE_CONFIG).unwrap();
        config.signs.clear();
        assert!(config.validate().is_err());

        let mut config: AppConfig = toml::from_str(SIMPLE_CONFIG).unwrap();
        config.max_workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sign_order_follows_document() {
        let reordered = r#"
            serial_port = '/dev/ttyUSB0'
            grpc_port = 5001

            [pins]
            sign = 20
            light = 21

            [signs.zulu]
            address = 3
            width = 8
            height = 8

            [signs.alpha]
            address = 4
            width = 8
            height = 8
        "#;
        let config: AppConfig = toml::from_str(reordered).unwrap();
        let names: Vec<&str> = config.signs.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["zulu", "alpha"]);
        assert!(!config.signs[0].flip);
    }

    #[test]
    fn test_unreadable_file() {
        let err = load_config(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}

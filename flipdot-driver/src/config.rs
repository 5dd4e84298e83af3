//! Driver configuration types
//!
//! This module defines the configuration the driver library needs: the sign
//! specifications and the power pin mapping. Parsing the configuration file
//! is the application's job; the driver only validates what it is given.

use crate::panel::hanover;
use crate::types::{DriverError, Result, SignSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Binding of the two logical power rails to physical output identifiers
///
/// With [`SysfsOutputProvider`](crate::outputs::SysfsOutputProvider) the ids
/// are kernel GPIO line numbers, not physical header pin positions. On a
/// Raspberry Pi, header pins 40 (sign) and 38 (light) are BCM lines 21 and 20,
/// plus the gpiochip base on kernels that offset it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinMapping {
    /// Output driving the sign panels' power
    pub sign: u32,
    /// Output driving the light's power
    pub light: u32,
}

impl PinMapping {
    pub fn new(sign: u32, light: u32) -> Self {
        Self { sign, light }
    }
}

/// Everything the driver needs to bring the signs up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Signs in registration order
    pub signs: Vec<SignSpec>,
    /// Power pin mapping
    pub pins: PinMapping,
}

impl DriverConfig {
    /// Create a configuration with no signs
    pub fn new(pins: PinMapping) -> Self {
        Self {
            signs: Vec::new(),
            pins,
        }
    }

    /// Builder method: append a sign
    pub fn add_sign(mut self, sign: SignSpec) -> Self {
        self.signs.push(sign);
        self
    }

    /// Check the whole configuration before any hardware is touched
    pub fn validate(&self) -> Result<()> {
        if self.signs.is_empty() {
            return Err(DriverError::Configuration("no signs supplied".to_string()));
        }
        if self.pins.sign == self.pins.light {
            return Err(DriverError::Configuration(format!(
                "sign and light share output {}",
                self.pins.sign
            )));
        }

        let mut names = HashSet::new();
        let mut addresses = HashSet::new();
        for sign in &self.signs {
            sign.validate()?;
            if sign.address > hanover::MAX_ADDRESS {
                return Err(DriverError::Configuration(format!(
                    "sign {} has address {}, the bus supports 1..={}",
                    sign.name,
                    sign.address,
                    hanover::MAX_ADDRESS
                )));
            }
            if !names.insert(sign.name.as_str()) {
                return Err(DriverError::Configuration(format!(
                    "duplicate sign name: {}",
                    sign.name
                )));
            }
            if !addresses.insert(sign.address) {
                return Err(DriverError::Configuration(format!(
                    "sign {} reuses bus address {}",
                    sign.name, sign.address
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ErrorKind;

    fn two_signs() -> DriverConfig {
        DriverConfig::new(PinMapping::new(21, 20))
            .add_sign(SignSpec::new("top", 1, 84, 7).flipped(true))
            .add_sign(SignSpec::new("bottom", 2, 84, 7))
    }

    #[test]
    fn test_driver_config_builder() {
        let config = two_signs();
        assert_eq!(config.signs.len(), 2);
        assert_eq!(config.signs[0].name, "top");
        assert!(config.signs[0].flip);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_duplicates() {
        let config = two_signs().add_sign(SignSpec::new("top", 3, 10, 10));
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("duplicate sign name: top"));

        let config = two_signs().add_sign(SignSpec::new("side", 2, 10, 10));
        assert!(config.validate().unwrap_err().to_string().contains("address 2"));
    }

    #[test]
    fn test_rejects_empty_and_bad_pins() {
        let config = DriverConfig::new(PinMapping::new(21, 20));
        assert!(config.validate().is_err());

        let config = DriverConfig::new(PinMapping::new(7, 7)).add_sign(SignSpec::new("a", 1, 1, 1));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_address_out_of_range() {
        let config = DriverConfig::new(PinMapping::new(1, 2)).add_sign(SignSpec::new("a", 16, 1, 1));
        assert!(config.validate().is_err());
    }
}

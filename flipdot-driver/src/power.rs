//! Power rail sequencing
//!
//! The [`PowerSequencer`] owns the digital outputs for the sign and light
//! rails. Both rails start low, can be driven independently, and are forced
//! low and released on shutdown (or on drop, if shutdown never ran).

use crate::config::PinMapping;
use crate::types::{DriverError, PowerState, Result};
use std::fmt;

/// A single digital output line
///
/// Implementations talk to the host platform. Calls are not assumed to be
/// reentrant; the sequencer serializes them.
pub trait DigitalOutput: Send {
    /// Drive the output high (`true`) or low (`false`)
    fn write(&mut self, high: bool) -> Result<()>;

    /// Give the line back to the platform
    fn release(&mut self) -> Result<()>;
}

/// Source of configured digital outputs
pub trait OutputProvider {
    /// Claim output `id` as an output, initially low
    fn open(&self, id: u32, rail: Rail) -> Result<Box<dyn DigitalOutput>>;
}

/// Logical power rails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rail {
    Sign,
    Light,
}

impl fmt::Display for Rail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rail::Sign => write!(f, "sign"),
            Rail::Light => write!(f, "light"),
        }
    }
}

/// Safe, independent control of the sign and light rails
pub struct PowerSequencer {
    sign: Box<dyn DigitalOutput>,
    light: Box<dyn DigitalOutput>,
    pins: PinMapping,
    state: PowerState,
    released: bool,
}

impl PowerSequencer {
    /// Claim both outputs in the unpowered state
    ///
    /// Any failure here is fatal: it means the pin mapping does not match the
    /// hardware. A sign output claimed before the light output failed is
    /// released again.
    pub fn initialize(provider: &dyn OutputProvider, pins: PinMapping) -> Result<Self> {
        log::info!(
            "Configuring power outputs: sign={}, light={}",
            pins.sign,
            pins.light
        );
        let mut sign = provider.open(pins.sign, Rail::Sign)?;
        let light = match provider.open(pins.light, Rail::Light) {
            Ok(light) => light,
            Err(e) => {
                if let Err(release_err) = sign.release() {
                    log::warn!("Failed to release sign output: {}", release_err);
                }
                return Err(e);
            }
        };

        Ok(Self {
            sign,
            light,
            pins,
            state: PowerState::default(),
            released: false,
        })
    }

    /// Drive the sign rail
    pub fn set_sign_power(&mut self, on: bool) -> Result<()> {
        self.write_rail(Rail::Sign, on)
    }

    /// Drive the light rail, independently of the sign rail
    pub fn set_light_power(&mut self, on: bool) -> Result<()> {
        self.write_rail(Rail::Light, on)
    }

    /// Current rail levels, as last written
    pub fn state(&self) -> PowerState {
        self.state
    }

    pub fn pins(&self) -> PinMapping {
        self.pins
    }

    /// True once [`shutdown`](Self::shutdown) has run
    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Drive both rails low and release the outputs
    ///
    /// Every step is attempted even if an earlier one fails; the first error
    /// is returned. Calling this again after a shutdown is a no-op.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        log::info!("Powering down sign and light rails");

        let mut first_error = None;
        let steps = [
            self.write_rail(Rail::Sign, false),
            self.write_rail(Rail::Light, false),
        ];
        self.released = true;
        let releases = [self.sign.release(), self.light.release()];

        for result in steps.into_iter().chain(releases) {
            if let Err(e) = result {
                log::warn!("Power shutdown step failed: {}", e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn write_rail(&mut self, rail: Rail, on: bool) -> Result<()> {
        if self.released {
            return Err(DriverError::InvalidState(format!(
                "{} rail already released",
                rail
            )));
        }
        log::debug!("Setting {} power {}", rail, if on { "on" } else { "off" });
        match rail {
            Rail::Sign => {
                self.sign.write(on)?;
                self.state.sign_powered = on;
            }
            Rail::Light => {
                self.light.write(on)?;
                self.state.light_powered = on;
            }
        }
        Ok(())
    }
}

impl Drop for PowerSequencer {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::warn!("Power shutdown on drop failed: {}", e);
        }
    }
}

impl fmt::Debug for PowerSequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PowerSequencer")
            .field("pins", &self.pins)
            .field("state", &self.state)
            .field("released", &self.released)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{OutputEvent, RecordingOutputs};
    use crate::types::ErrorKind;

    const PINS: PinMapping = PinMapping { sign: 1, light: 2 };

    #[test]
    fn test_initialize_configures_both_low() {
        let outputs = RecordingOutputs::new();
        let power = PowerSequencer::initialize(&outputs, PINS).unwrap();

        assert_eq!(power.state(), PowerState::default());
        assert_eq!(
            outputs.events(),
            vec![OutputEvent::Opened(1), OutputEvent::Opened(2)]
        );
    }

    #[test]
    fn test_light_writes_leave_sign_alone() {
        let outputs = RecordingOutputs::new();
        let mut power = PowerSequencer::initialize(&outputs, PINS).unwrap();

        power.set_light_power(true).unwrap();
        power.set_light_power(false).unwrap();

        assert_eq!(outputs.writes(2), vec![true, false]);
        assert!(outputs.writes(1).is_empty());
        assert!(!power.state().sign_powered);
    }

    #[test]
    fn test_redundant_writes_are_accepted() {
        let outputs = RecordingOutputs::new();
        let mut power = PowerSequencer::initialize(&outputs, PINS).unwrap();

        power.set_sign_power(true).unwrap();
        power.set_sign_power(true).unwrap();
        assert!(power.state().sign_powered);
        assert_eq!(outputs.writes(1), vec![true, true]);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let outputs = RecordingOutputs::new();
        let mut power = PowerSequencer::initialize(&outputs, PINS).unwrap();
        power.set_sign_power(true).unwrap();
        power.set_light_power(true).unwrap();

        power.shutdown().unwrap();
        power.shutdown().unwrap();
        drop(power);

        assert_eq!(outputs.writes(1), vec![true, false]);
        assert_eq!(outputs.writes(2), vec![true, false]);
        assert_eq!(outputs.released(), vec![1, 2]);
    }

    #[test]
    fn test_writes_after_shutdown_fail() {
        let outputs = RecordingOutputs::new();
        let mut power = PowerSequencer::initialize(&outputs, PINS).unwrap();
        power.shutdown().unwrap();

        let err = power.set_light_power(true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_drop_forces_rails_low() {
        let outputs = RecordingOutputs::new();
        {
            let mut power = PowerSequencer::initialize(&outputs, PINS).unwrap();
            power.set_sign_power(true).unwrap();
        }
        assert_eq!(outputs.writes(1), vec![true, false]);
        assert_eq!(outputs.released(), vec![1, 2]);
    }

    #[test]
    fn test_failed_light_open_releases_sign() {
        let outputs = RecordingOutputs::new().fail_open(2);
        let err = PowerSequencer::initialize(&outputs, PINS).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::HardwareFault);
        assert_eq!(outputs.released(), vec![1]);
    }
}

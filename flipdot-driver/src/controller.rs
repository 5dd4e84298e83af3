//! Sign controller
//!
//! The [`Controller`] is the entry point for driving signs. It owns the sign
//! registry, the panel link and the power sequencer, and runs the lifecycle:
//!
//! ```text
//! Unpowered --start--> Ready <--test(start/stop)--> TestMode
//!     ^                  |                             |
//!     +------shutdown----+-------------shutdown--------+
//! ```
//!
//! Every operation runs under a single lock, so the panel link and the power
//! outputs never see concurrent calls.

use crate::config::DriverConfig;
use crate::panel::PanelLink;
use crate::power::{OutputProvider, PowerSequencer};
use crate::registry::SignRegistry;
use crate::types::{DriverError, Image, PowerState, Result, SignInfo, SignSpec};
use parking_lot::Mutex;
use std::fmt;

/// Lifecycle state of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Sign rail low, no panel traffic allowed
    Unpowered,
    /// Sign rail high, panels registered
    Ready,
    /// Panels showing the test pattern
    TestMode,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Unpowered => write!(f, "Unpowered"),
            LifecycleState::Ready => write!(f, "Ready"),
            LifecycleState::TestMode => write!(f, "TestMode"),
        }
    }
}

/// Operations the service façade forwards to
///
/// Implemented by [`Controller`]; the seam lets the façade be exercised on
/// its own.
pub trait SignController: Send + Sync {
    /// All signs in registration order
    fn signs(&self) -> Result<Vec<SignInfo>>;

    /// A single sign by exact name
    fn sign(&self, name: &str) -> Result<SignInfo>;

    /// Reshape a flat bitmap for `sign` and send it
    fn draw(&self, sign: &str, bitmap: Vec<bool>) -> Result<()>;

    /// Start (`true`) or stop (`false`) the test pattern
    fn test(&self, start: bool) -> Result<()>;

    /// Switch the light rail
    fn set_light(&self, on: bool) -> Result<()>;
}

struct Inner {
    state: LifecycleState,
    registry: SignRegistry,
    link: Box<dyn PanelLink>,
    power: PowerSequencer,
    registered: bool,
    shut_down: bool,
}

impl Inner {
    fn require_powered(&self, operation: &str) -> Result<()> {
        if self.shut_down {
            return Err(DriverError::InvalidState(format!(
                "cannot {}: controller has been shut down",
                operation
            )));
        }
        if self.state == LifecycleState::Unpowered {
            return Err(DriverError::InvalidState(format!(
                "cannot {}: signs are not powered",
                operation
            )));
        }
        Ok(())
    }

    fn register_signs(&mut self) -> Result<()> {
        let specs: Vec<SignSpec> = self.registry.iter().map(|e| e.spec.clone()).collect();
        for spec in specs {
            let mut info = self.link.add_sign(&spec)?;
            if (info.width, info.height) != (spec.width, spec.height) {
                log::warn!(
                    "Panel link reports {}x{} for sign {}, configured as {}x{}",
                    info.width,
                    info.height,
                    spec.name,
                    spec.width,
                    spec.height
                );
            }
            info.name = spec.name.clone();
            self.registry.update_info(&spec.name, info)?;
        }
        Ok(())
    }
}

/// Lifecycle and draw orchestration for a set of signs
pub struct Controller {
    inner: Mutex<Inner>,
}

impl Controller {
    /// Create a controller in the `Unpowered` state
    ///
    /// Fails with a configuration error if the signs are invalid or clash.
    /// Nothing is sent to the panel link until [`start`](Self::start).
    pub fn new(
        signs: impl IntoIterator<Item = SignSpec>,
        link: Box<dyn PanelLink>,
        power: PowerSequencer,
    ) -> Result<Self> {
        let registry = SignRegistry::from_specs(signs)?;
        log::info!("Controller created with {} sign(s)", registry.len());
        Ok(Self {
            inner: Mutex::new(Inner {
                state: LifecycleState::Unpowered,
                registry,
                link,
                power,
                registered: false,
                shut_down: false,
            }),
        })
    }

    /// Validate `config`, claim the power outputs and create the controller
    ///
    /// Validation happens before any output is touched.
    pub fn from_config(
        config: &DriverConfig,
        link: Box<dyn PanelLink>,
        outputs: &dyn OutputProvider,
    ) -> Result<Self> {
        config.validate()?;
        let power = PowerSequencer::initialize(outputs, config.pins)?;
        Self::new(config.signs.iter().cloned(), link, power)
    }

    /// Power the signs and register them with the panel link
    ///
    /// A no-op when already powered. If registration fails the sign rail is
    /// driven low again before the error is returned.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.shut_down {
            return Err(DriverError::InvalidState(
                "cannot start: controller has been shut down".to_string(),
            ));
        }
        if inner.state != LifecycleState::Unpowered {
            log::debug!("start() called while {}, ignoring", inner.state);
            return Ok(());
        }

        inner.power.set_sign_power(true)?;
        if !inner.registered {
            if let Err(e) = inner.register_signs() {
                log::error!("Sign registration failed: {}", e);
                if let Err(off) = inner.power.set_sign_power(false) {
                    log::warn!("Failed to power signs back down: {}", off);
                }
                return Err(e);
            }
            inner.registered = true;
        }

        inner.state = LifecycleState::Ready;
        log::info!("Signs powered, {} registered", inner.registry.len());
        Ok(())
    }

    /// All signs in registration order
    pub fn signs(&self) -> Result<Vec<SignInfo>> {
        log::debug!("signs() called");
        let inner = self.inner.lock();
        inner.require_powered("get sign info")?;
        Ok(inner.registry.infos())
    }

    /// A single sign by exact, case-sensitive name
    pub fn sign(&self, name: &str) -> Result<SignInfo> {
        log::debug!("sign(name={}) called", name);
        let inner = self.inner.lock();
        inner.require_powered("get sign info")?;
        inner.registry.info(name)
    }

    /// Reshape a flat bitmap row-major and draw it on `sign`
    ///
    /// Nothing is sent unless the bitmap has exactly `width * height` pixels.
    pub fn draw(&self, sign: &str, bitmap: Vec<bool>) -> Result<()> {
        log::debug!("draw(sign={}, {} pixels) called", sign, bitmap.len());
        let mut inner = self.inner.lock();
        inner.require_powered("draw")?;
        let info = inner.registry.info(sign)?;
        let image = Image::from_flat(sign, info.width, info.height, bitmap)?;
        inner.link.draw_image(sign, &image)
    }

    /// Draw an already shaped image on `sign`
    pub fn draw_image(&self, sign: &str, image: &Image) -> Result<()> {
        log::debug!("draw_image(sign={}) called", sign);
        let mut inner = self.inner.lock();
        inner.require_powered("draw")?;
        let info = inner.registry.info(sign)?;
        if image.shape() != (info.height, info.width) {
            return Err(DriverError::InvalidImage {
                sign: sign.to_string(),
                expected: info.width * info.height,
                actual: image.width() * image.height(),
            });
        }
        inner.link.draw_image(sign, image)
    }

    /// Start or stop the test pattern on all signs
    ///
    /// Starting again while in test mode re-sends the pattern; stopping while
    /// not in test mode does nothing.
    pub fn test(&self, start: bool) -> Result<()> {
        log::debug!("test(start={}) called", start);
        let mut inner = self.inner.lock();
        inner.require_powered("change test mode")?;

        if start {
            inner.link.start_test_signs()?;
            inner.state = LifecycleState::TestMode;
        } else if inner.state == LifecycleState::TestMode {
            inner.link.stop_test_signs()?;
            inner.state = LifecycleState::Ready;
        } else {
            log::debug!("Test mode not active, nothing to stop");
        }
        Ok(())
    }

    pub fn start_test(&self) -> Result<()> {
        self.test(true)
    }

    pub fn stop_test(&self) -> Result<()> {
        self.test(false)
    }

    /// Switch the light, in any lifecycle state
    pub fn set_light(&self, on: bool) -> Result<()> {
        log::debug!("set_light(on={}) called", on);
        self.inner.lock().power.set_light_power(on)
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.lock().state
    }

    pub fn power_state(&self) -> PowerState {
        self.inner.lock().power.state()
    }

    /// Power everything down and release the hardware
    ///
    /// Waits for any in-flight operation. Safe to call more than once; the
    /// controller cannot be started again afterwards.
    pub fn shutdown(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.shut_down {
            return Ok(());
        }
        log::info!("Shutting down from {}", inner.state);
        inner.shut_down = true;
        inner.state = LifecycleState::Unpowered;

        let power = inner.power.shutdown();
        let link = inner.link.close();
        if let Err(e) = &link {
            log::warn!("Failed to close panel link: {}", e);
        }
        power.and(link)
    }
}

impl SignController for Controller {
    fn signs(&self) -> Result<Vec<SignInfo>> {
        Controller::signs(self)
    }

    fn sign(&self, name: &str) -> Result<SignInfo> {
        Controller::sign(self, name)
    }

    fn draw(&self, sign: &str, bitmap: Vec<bool>) -> Result<()> {
        Controller::draw(self, sign, bitmap)
    }

    fn test(&self, start: bool) -> Result<()> {
        Controller::test(self, start)
    }

    fn set_light(&self, on: bool) -> Result<()> {
        Controller::set_light(self, on)
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::warn!("Shutdown on drop failed: {}", e);
        }
    }
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("Controller")
            .field("state", &inner.state)
            .field("signs", &inner.registry.len())
            .field("power", &inner.power)
            .finish()
    }
}

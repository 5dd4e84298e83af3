//! Panel links
//!
//! A panel link is a bus connection to addressable panels. The controller
//! decides when and what to send; the link decides how it goes on the wire.

use crate::types::{Image, Result, SignInfo, SignSpec};

pub mod hanover;

pub use hanover::HanoverLink;

/// Bus connection to one or more addressable panels
pub trait PanelLink: Send {
    /// Register a panel, returning the dimensions the link will accept for it
    ///
    /// Registering a spec identical to an already registered one succeeds, so
    /// a start that failed partway can be retried.
    fn add_sign(&mut self, spec: &SignSpec) -> Result<SignInfo>;

    /// Send a full frame to a registered panel
    fn draw_image(&mut self, sign: &str, image: &Image) -> Result<()>;

    /// Start the test pattern on every registered panel
    fn start_test_signs(&mut self) -> Result<()>;

    /// Stop the test pattern on every registered panel
    fn stop_test_signs(&mut self) -> Result<()>;

    /// Flush and close the underlying transport
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

//! Flipdot Driver Library
//!
//! Remote control of Hanover flipdot panels and an associated light. The
//! library maps sign names and bitmaps onto panel-addressed draw commands,
//! sequences the sign and light power rails, and exposes a small
//! request/response service for an RPC front end.
//!
//! # Architecture
//!
//! - [`PowerSequencer`] owns the digital outputs for the two power rails
//! - [`Controller`] owns the sign registry and the [`PanelLink`], and runs the
//!   `Unpowered -> Ready <-> TestMode -> Unpowered` lifecycle
//! - [`Service`] translates requests into controller calls and errors into
//!   status codes
//!
//! The library does NOT:
//! - Open serial ports or listen on sockets
//! - Parse configuration files
//!
//! Both live in the application layer (flipdot-cli).
//!
//! # Example Usage
//!
//! ```no_run
//! use flipdot_driver::{Controller, DriverConfig, HanoverLink, PinMapping, SignSpec};
//! use flipdot_driver::outputs::SysfsOutputProvider;
//! use std::fs::OpenOptions;
//!
//! let config = DriverConfig::new(PinMapping::new(20, 21))
//!     .add_sign(SignSpec::new("top", 1, 84, 7).flipped(true));
//!
//! let port = OpenOptions::new().write(true).open("/dev/ttyUSB0").unwrap();
//! let link = HanoverLink::new(port);
//! let controller =
//!     Controller::from_config(&config, Box::new(link), &SysfsOutputProvider::new()).unwrap();
//!
//! controller.start().unwrap();
//! controller.draw("top", vec![true; 84 * 7]).unwrap();
//! controller.shutdown().unwrap();
//! ```

// Public modules
pub mod config;
pub mod controller;
pub mod outputs;
pub mod panel;
pub mod power;
pub mod registry;
pub mod service;
pub mod testing;
pub mod types;

// Re-export main types for convenience
pub use config::{DriverConfig, PinMapping};
pub use controller::{Controller, LifecycleState, SignController};
pub use panel::{HanoverLink, PanelLink};
pub use power::{DigitalOutput, OutputProvider, PowerSequencer, Rail};
pub use registry::SignRegistry;
pub use service::{Service, Status, StatusCode};
pub use types::{DriverError, ErrorKind, Image, PowerState, Result, SignInfo, SignSpec};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Core types for the flipdot driver
//!
//! This module defines the data model shared by the power sequencer, the sign
//! registry and the service façade: static sign configuration, the runtime
//! view of a sign, pixel images and the driver's error taxonomy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for driver operations
pub type Result<T> = std::result::Result<T, DriverError>;

/// Static configuration for one panel
///
/// Created once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignSpec {
    /// Unique, case-sensitive sign name
    pub name: String,
    /// Bus address of the panel
    pub address: u8,
    /// Panel width in pixels
    pub width: usize,
    /// Panel height in pixels
    pub height: usize,
    /// True if the panel is mounted upside down
    #[serde(default)]
    pub flip: bool,
}

impl SignSpec {
    /// Create a new sign specification (mounted the right way up)
    pub fn new(name: impl Into<String>, address: u8, width: usize, height: usize) -> Self {
        Self {
            name: name.into(),
            address,
            width,
            height,
            flip: false,
        }
    }

    /// Builder method: mark the panel as mounted inverted
    pub fn flipped(mut self, flip: bool) -> Self {
        self.flip = flip;
        self
    }

    /// Number of pixels on the panel
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Check the fields that do not depend on other signs
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(DriverError::Configuration(
                "sign name must not be empty".to_string(),
            ));
        }
        if self.address == 0 {
            return Err(DriverError::Configuration(format!(
                "sign {} has address 0, addresses must be positive",
                self.name
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(DriverError::Configuration(format!(
                "sign {} has invalid dimensions {}x{}",
                self.name, self.width, self.height
            )));
        }
        Ok(())
    }

    /// Runtime view derived from this specification
    pub fn info(&self) -> SignInfo {
        SignInfo {
            name: self.name.clone(),
            width: self.width,
            height: self.height,
        }
    }
}

/// Runtime-queryable view of a sign
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInfo {
    pub name: String,
    pub width: usize,
    pub height: usize,
}

/// A rectangular boolean pixel grid, stored row-major
///
/// Pixel `(row, column)` lives at index `row * width + column`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    width: usize,
    height: usize,
    pixels: Vec<bool>,
}

impl Image {
    /// Create an all-off image
    pub fn blank(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![false; width * height],
        }
    }

    /// Reshape a flat bitmap row-major into a `height x width` image
    ///
    /// Fails with [`DriverError::InvalidImage`] if `pixels.len() != width * height`;
    /// the data is never truncated or padded.
    pub fn from_flat(sign: &str, width: usize, height: usize, pixels: Vec<bool>) -> Result<Self> {
        let expected = width * height;
        if pixels.len() != expected {
            return Err(DriverError::InvalidImage {
                sign: sign.to_string(),
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Build an image from nested rows, every row must have the same length
    pub fn from_rows(sign: &str, rows: &[Vec<bool>]) -> Result<Self> {
        let height = rows.len();
        let width = rows.first().map(Vec::len).unwrap_or(0);
        if rows.iter().any(|row| row.len() != width) {
            return Err(DriverError::InvalidImage {
                sign: sign.to_string(),
                expected: width * height,
                actual: rows.iter().map(Vec::len).sum(),
            });
        }
        let pixels = rows.iter().flatten().copied().collect();
        Self::from_flat(sign, width, height, pixels)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Shape as `(rows, columns)`
    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// Pixel state, `None` when out of bounds
    pub fn get(&self, row: usize, column: usize) -> Option<bool> {
        if row >= self.height || column >= self.width {
            return None;
        }
        Some(self.pixels[row * self.width + column])
    }

    /// Set a pixel, ignoring coordinates outside the image
    pub fn set(&mut self, row: usize, column: usize, on: bool) {
        if row < self.height && column < self.width {
            self.pixels[row * self.width + column] = on;
        }
    }

    /// Iterate rows top to bottom
    pub fn rows(&self) -> impl Iterator<Item = &[bool]> {
        // chunks(0) panics, an empty image simply has no rows
        self.pixels.chunks(self.width.max(1)).take(self.height)
    }

    /// The same image rotated by 180 degrees
    pub fn rotated(&self) -> Self {
        let mut pixels = self.pixels.clone();
        pixels.reverse();
        Self {
            width: self.width,
            height: self.height,
            pixels,
        }
    }

    /// Row-major pixel data
    pub fn as_flat(&self) -> &[bool] {
        &self.pixels
    }
}

/// State of the two independent power rails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerState {
    pub sign_powered: bool,
    pub light_powered: bool,
}

/// Machine-checkable classification of a [`DriverError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    NotFound,
    InvalidImage,
    InvalidEnum,
    InvalidState,
    HardwareFault,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Configuration => write!(f, "Configuration"),
            ErrorKind::NotFound => write!(f, "NotFound"),
            ErrorKind::InvalidImage => write!(f, "InvalidImage"),
            ErrorKind::InvalidEnum => write!(f, "InvalidEnum"),
            ErrorKind::InvalidState => write!(f, "InvalidState"),
            ErrorKind::HardwareFault => write!(f, "HardwareFault"),
        }
    }
}

/// Errors that can occur while driving the signs
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Sign not found: {0}")]
    NotFound(String),

    #[error("Invalid image for sign {sign}: expected {expected} pixels, got {actual}")]
    InvalidImage {
        sign: String,
        expected: usize,
        actual: usize,
    },

    #[error("Unexpected {field} value {value}")]
    InvalidEnum { field: &'static str, value: i32 },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Hardware fault: {0}")]
    HardwareFault(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl DriverError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            DriverError::Configuration(_) => ErrorKind::Configuration,
            DriverError::NotFound(_) => ErrorKind::NotFound,
            DriverError::InvalidImage { .. } => ErrorKind::InvalidImage,
            DriverError::InvalidEnum { .. } => ErrorKind::InvalidEnum,
            DriverError::InvalidState(_) => ErrorKind::InvalidState,
            DriverError::HardwareFault(_) | DriverError::IoError(_) => ErrorKind::HardwareFault,
        }
    }
}

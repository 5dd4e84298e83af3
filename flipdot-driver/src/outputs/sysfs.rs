//! Linux sysfs GPIO outputs
//!
//! Output identifiers are GPIO line numbers under `/sys/class/gpio`.

use crate::power::{DigitalOutput, OutputProvider, Rail};
use crate::types::{DriverError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Default sysfs GPIO root
pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// Opens GPIO lines through the sysfs interface
#[derive(Debug, Clone)]
pub struct SysfsOutputProvider {
    root: PathBuf,
}

impl SysfsOutputProvider {
    pub fn new() -> Self {
        Self::with_root(SYSFS_GPIO_ROOT)
    }

    /// Use a different sysfs root
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for SysfsOutputProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputProvider for SysfsOutputProvider {
    /// `id` is a kernel line number, as written to `export`
    fn open(&self, id: u32, rail: Rail) -> Result<Box<dyn DigitalOutput>> {
        let line_dir = self.root.join(format!("gpio{}", id));
        if !line_dir.exists() {
            log::debug!("Exporting GPIO {} for {} rail", id, rail);
            write_attr(&self.root.join("export"), &id.to_string())?;
        }
        if !line_dir.exists() {
            return Err(DriverError::HardwareFault(format!(
                "GPIO {} did not appear under {:?} after export",
                id, self.root
            )));
        }

        // "low" configures the line as an output that starts low
        write_attr(&line_dir.join("direction"), "low")?;
        log::info!("GPIO {} configured as {} output", id, rail);

        Ok(Box::new(SysfsOutput {
            id,
            value: line_dir.join("value"),
            unexport: self.root.join("unexport"),
        }))
    }
}

/// One exported sysfs GPIO line
#[derive(Debug)]
pub struct SysfsOutput {
    id: u32,
    value: PathBuf,
    unexport: PathBuf,
}

impl SysfsOutput {
    pub fn id(&self) -> u32 {
        self.id
    }
}

impl DigitalOutput for SysfsOutput {
    fn write(&mut self, high: bool) -> Result<()> {
        write_attr(&self.value, if high { "1" } else { "0" })
    }

    fn release(&mut self) -> Result<()> {
        log::debug!("Unexporting GPIO {}", self.id);
        write_attr(&self.unexport, &self.id.to_string())
    }
}

fn write_attr(path: &Path, value: &str) -> Result<()> {
    fs::write(path, value).map_err(|e| {
        DriverError::HardwareFault(format!("failed to write {:?} to {:?}: {}", value, path, e))
    })
}

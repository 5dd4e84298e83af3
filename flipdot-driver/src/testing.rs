//! Recording stand-ins for the hardware collaborators
//!
//! [`RecordingOutputs`] and [`RecordingPanelLink`] keep a shared log of every
//! call made to them. Clones share the log, so a test can hand one clone to
//! the controller and inspect the other. The CLI's dry-run mode uses the
//! same types in place of real GPIO lines.

use crate::panel::PanelLink;
use crate::power::{DigitalOutput, OutputProvider, Rail};
use crate::types::{DriverError, Image, Result, SignInfo, SignSpec};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

/// A call made to a recorded output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Opened(u32),
    Write(u32, bool),
    Released(u32),
}

/// Output provider whose lines only record what they are told
#[derive(Debug, Clone, Default)]
pub struct RecordingOutputs {
    events: Arc<Mutex<Vec<OutputEvent>>>,
    failing: HashSet<u32>,
}

impl RecordingOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: make opening output `id` fail
    pub fn fail_open(mut self, id: u32) -> Self {
        self.failing.insert(id);
        self
    }

    /// Every recorded event, in order
    pub fn events(&self) -> Vec<OutputEvent> {
        self.events.lock().clone()
    }

    /// Values written to output `id`, in order
    pub fn writes(&self, id: u32) -> Vec<bool> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                OutputEvent::Write(line, high) if *line == id => Some(*high),
                _ => None,
            })
            .collect()
    }

    /// Released outputs, in order
    pub fn released(&self) -> Vec<u32> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                OutputEvent::Released(line) => Some(*line),
                _ => None,
            })
            .collect()
    }
}

impl OutputProvider for RecordingOutputs {
    fn open(&self, id: u32, rail: Rail) -> Result<Box<dyn DigitalOutput>> {
        if self.failing.contains(&id) {
            return Err(DriverError::HardwareFault(format!(
                "output {} for {} rail unavailable",
                id, rail
            )));
        }
        self.events.lock().push(OutputEvent::Opened(id));
        Ok(Box::new(RecordingOutput {
            id,
            events: Arc::clone(&self.events),
        }))
    }
}

struct RecordingOutput {
    id: u32,
    events: Arc<Mutex<Vec<OutputEvent>>>,
}

impl DigitalOutput for RecordingOutput {
    fn write(&mut self, high: bool) -> Result<()> {
        log::trace!("output {} -> {}", self.id, high);
        self.events.lock().push(OutputEvent::Write(self.id, high));
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.events.lock().push(OutputEvent::Released(self.id));
        Ok(())
    }
}

/// A call made to a recorded panel link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelCall {
    AddSign(SignSpec),
    Draw { sign: String, image: Image },
    StartTest,
    StopTest,
    Close,
}

/// Panel link that accepts everything and records it
#[derive(Debug, Clone, Default)]
pub struct RecordingPanelLink {
    calls: Arc<Mutex<Vec<PanelCall>>>,
    rejected: Option<String>,
}

impl RecordingPanelLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: refuse to register the named sign
    pub fn reject_sign(mut self, name: impl Into<String>) -> Self {
        self.rejected = Some(name.into());
        self
    }

    pub fn calls(&self) -> Vec<PanelCall> {
        self.calls.lock().clone()
    }

    /// Number of recorded calls matching `predicate`
    pub fn count(&self, predicate: impl Fn(&PanelCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| predicate(call)).count()
    }

    /// Names of registered signs, in order
    pub fn registered(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                PanelCall::AddSign(spec) => Some(spec.name.clone()),
                _ => None,
            })
            .collect()
    }

    /// Drawn frames, in order
    pub fn draws(&self) -> Vec<(String, Image)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                PanelCall::Draw { sign, image } => Some((sign.clone(), image.clone())),
                _ => None,
            })
            .collect()
    }
}

impl PanelLink for RecordingPanelLink {
    fn add_sign(&mut self, spec: &SignSpec) -> Result<SignInfo> {
        if self.rejected.as_deref() == Some(spec.name.as_str()) {
            return Err(DriverError::HardwareFault(format!(
                "panel {} did not accept registration",
                spec.name
            )));
        }
        self.calls.lock().push(PanelCall::AddSign(spec.clone()));
        Ok(spec.info())
    }

    fn draw_image(&mut self, sign: &str, image: &Image) -> Result<()> {
        self.calls.lock().push(PanelCall::Draw {
            sign: sign.to_string(),
            image: image.clone(),
        });
        Ok(())
    }

    fn start_test_signs(&mut self) -> Result<()> {
        self.calls.lock().push(PanelCall::StartTest);
        Ok(())
    }

    fn stop_test_signs(&mut self) -> Result<()> {
        self.calls.lock().push(PanelCall::StopTest);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.calls.lock().push(PanelCall::Close);
        Ok(())
    }
}

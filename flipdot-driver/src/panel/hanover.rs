//! Hanover panel protocol
//!
//! Frames are ASCII framed with a trailing checksum:
//!
//! ```text
//! STX | command (1 hex digit) | address (1 hex digit) | payload (2 hex digits per byte) | ETX | checksum (2 hex digits)
//! ```
//!
//! The checksum is the two's complement of the 8-bit sum of every byte after
//! STX up to and including ETX.
//!
//! Image payloads start with the number of data bytes, followed by the pixels
//! packed column by column: each column takes `ceil(height / 8)` bytes, row
//! `r` lands in bit `r % 8` of byte `r / 8`.

use super::PanelLink;
use crate::types::{DriverError, Image, Result, SignInfo, SignSpec};
use std::io::Write;

/// Highest address a panel can be set to
pub const MAX_ADDRESS: u8 = 0x0F;

/// Address that every panel listens to
pub const BROADCAST_ADDRESS: u8 = 0x00;

const STX: u8 = 0x02;
const ETX: u8 = 0x03;
const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Commands understood by the panels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    WriteImage,
    StartTest,
    StopTest,
}

impl Command {
    fn code(self) -> u8 {
        match self {
            Command::WriteImage => 0x1,
            Command::StartTest => 0x3,
            Command::StopTest => 0xC,
        }
    }
}

/// A single frame addressed to one panel (or all of them)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub command: Command,
    pub address: u8,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(command: Command, address: u8) -> Self {
        Self {
            command,
            address,
            payload: Vec::new(),
        }
    }

    /// Image frame for a panel, `image` already oriented for the panel
    pub fn image(address: u8, image: &Image) -> Self {
        let data = pack_columns(image);
        let mut payload = Vec::with_capacity(data.len() + 1);
        // The length byte wraps for panels larger than 255 bytes
        payload.push((data.len() & 0xFF) as u8);
        payload.extend(data);
        Self {
            command: Command::WriteImage,
            address,
            payload,
        }
    }

    /// Serialize the frame, checksum included
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(6 + self.payload.len() * 2);
        frame.push(STX);
        frame.push(hex_digit(self.command.code()));
        frame.push(hex_digit(self.address));
        for byte in &self.payload {
            push_hex_byte(&mut frame, *byte);
        }
        frame.push(ETX);
        let sum = checksum(&frame[1..]);
        push_hex_byte(&mut frame, sum);
        frame
    }
}

fn hex_digit(nibble: u8) -> u8 {
    HEX_DIGITS[(nibble & 0x0F) as usize]
}

fn push_hex_byte(frame: &mut Vec<u8>, byte: u8) {
    frame.push(hex_digit(byte >> 4));
    frame.push(hex_digit(byte));
}

fn checksum(bytes: &[u8]) -> u8 {
    let sum = bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    (!sum).wrapping_add(1)
}

/// Pack an image column by column, least significant bit at the top
pub fn pack_columns(image: &Image) -> Vec<u8> {
    let bytes_per_column = image.height().div_ceil(8);
    let mut data = vec![0u8; image.width() * bytes_per_column];
    for (row, pixels) in image.rows().enumerate() {
        for (column, on) in pixels.iter().enumerate() {
            if *on {
                data[column * bytes_per_column + row / 8] |= 1 << (row % 8);
            }
        }
    }
    data
}

#[derive(Debug, Clone)]
struct HanoverSign {
    name: String,
    address: u8,
    width: usize,
    height: usize,
    flip: bool,
}

impl HanoverSign {
    fn matches(&self, spec: &SignSpec) -> bool {
        self.name == spec.name
            && self.address == spec.address
            && self.width == spec.width
            && self.height == spec.height
            && self.flip == spec.flip
    }
}

/// Panel link speaking the Hanover protocol over a byte stream
///
/// The stream is usually a serial port, but anything implementing
/// [`Write`] will do.
#[derive(Debug)]
pub struct HanoverLink<W> {
    port: W,
    signs: Vec<HanoverSign>,
}

impl<W: Write + Send> HanoverLink<W> {
    pub fn new(port: W) -> Self {
        Self {
            port,
            signs: Vec::new(),
        }
    }

    /// The underlying transport
    pub fn get_ref(&self) -> &W {
        &self.port
    }

    pub fn into_inner(self) -> W {
        self.port
    }

    fn find(&self, name: &str) -> Result<&HanoverSign> {
        self.signs
            .iter()
            .find(|sign| sign.name == name)
            .ok_or_else(|| DriverError::NotFound(name.to_string()))
    }

    fn send(&mut self, packet: &Packet) -> Result<()> {
        let frame = packet.encode();
        log::trace!(
            "Sending {:?} to address {}: {}",
            packet.command,
            packet.address,
            String::from_utf8_lossy(&frame[1..frame.len() - 3])
        );
        self.port.write_all(&frame)?;
        self.port.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> PanelLink for HanoverLink<W> {
    fn add_sign(&mut self, spec: &SignSpec) -> Result<SignInfo> {
        if spec.address == BROADCAST_ADDRESS || spec.address > MAX_ADDRESS {
            return Err(DriverError::Configuration(format!(
                "sign {} has address {} outside 1..={}",
                spec.name, spec.address, MAX_ADDRESS
            )));
        }
        if let Some(existing) = self
            .signs
            .iter()
            .find(|sign| sign.name == spec.name || sign.address == spec.address)
        {
            if existing.matches(spec) {
                log::debug!("Hanover sign {} already registered", spec.name);
                return Ok(spec.info());
            }
            return Err(DriverError::Configuration(format!(
                "sign {} (address {}) clashes with registered sign {} (address {})",
                spec.name, spec.address, existing.name, existing.address
            )));
        }

        log::debug!(
            "Registered Hanover sign {} at address {} ({}x{}{})",
            spec.name,
            spec.address,
            spec.width,
            spec.height,
            if spec.flip { ", flipped" } else { "" }
        );
        self.signs.push(HanoverSign {
            name: spec.name.clone(),
            address: spec.address,
            width: spec.width,
            height: spec.height,
            flip: spec.flip,
        });
        Ok(spec.info())
    }

    fn draw_image(&mut self, sign: &str, image: &Image) -> Result<()> {
        let target = self.find(sign)?;
        if image.shape() != (target.height, target.width) {
            return Err(DriverError::InvalidImage {
                sign: sign.to_string(),
                expected: target.width * target.height,
                actual: image.width() * image.height(),
            });
        }

        let packet = if target.flip {
            Packet::image(target.address, &image.rotated())
        } else {
            Packet::image(target.address, image)
        };
        self.send(&packet)
    }

    fn start_test_signs(&mut self) -> Result<()> {
        self.send(&Packet::new(Command::StartTest, BROADCAST_ADDRESS))
    }

    fn stop_test_signs(&mut self) -> Result<()> {
        self.send(&Packet::new(Command::StopTest, BROADCAST_ADDRESS))
    }

    fn close(&mut self) -> Result<()> {
        self.port.flush()?;
        Ok(())
    }
}

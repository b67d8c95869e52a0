//! USB bus enumeration through `lsusb`.

use super::{run_command, UsbSource};
use crate::error::SourceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbDevice {
    pub bus: String,
    pub device: String,
    pub vendor_id: String,
    pub product_id: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct LsusbReader {
    pub program: String,
    pub timeout: Duration,
}

impl Default for LsusbReader {
    fn default() -> Self {
        Self {
            program: "lsusb".into(),
            timeout: Duration::from_secs(5),
        }
    }
}

#[async_trait]
impl UsbSource for LsusbReader {
    async fn devices(&self) -> Result<Vec<UsbDevice>, SourceError> {
        let stdout = run_command(&self.program, &[], self.timeout).await?;
        Ok(parse_lsusb(&stdout))
    }
}

/// Parses `Bus 001 Device 002: ID 2109:3431 VIA Labs, Inc. Hub` lines.
/// Lines that do not match are skipped.
pub fn parse_lsusb(output: &str) -> Vec<UsbDevice> {
    output.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<UsbDevice> {
    let rest = line.trim().strip_prefix("Bus ")?;
    let (bus, rest) = rest.split_once(" Device ")?;
    let (device, rest) = rest.split_once(": ID ")?;
    let (ids, description) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let (vendor_id, product_id) = ids.split_once(':')?;

    let digits = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit());
    let hex = |s: &str| !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit());
    if !digits(bus) || !digits(device) || !hex(vendor_id) || !hex(product_id) {
        return None;
    }

    Some(UsbDevice {
        bus: bus.to_string(),
        device: device.to_string(),
        vendor_id: vendor_id.to_string(),
        product_id: product_id.to_string(),
        description: description.trim().to_string(),
    })
}

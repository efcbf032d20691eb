//! DAQ handle
//!
//! A [`DaqHandle`] remembers only a serial number. Every attribute is read by
//! resolving that serial against the live topology, so a handle survives the
//! card being unplugged and plugged back in, and never returns a stale value.
//! Two reads on the same handle may therefore see different physical devices
//! if the topology changed in between; use [`DaqHandle::info`] when the
//! attributes must come from one resolution.

use crate::blink::{self, BlinkProfile};
use crate::bus::UsbBus;
use crate::error::Result;
use crate::locator::Locator;
use crate::types::DaqInfo;
use std::fmt;

/// A Measurement Computing DAQ identified by serial number
#[derive(Debug, Clone)]
pub struct DaqHandle<B: UsbBus> {
    locator: Locator<B>,
    serial: String,
}

impl<B: UsbBus> DaqHandle<B> {
    pub fn new(locator: Locator<B>, serial: impl Into<String>) -> Self {
        Self {
            locator,
            serial: serial.into(),
        }
    }

    /// Locator this handle resolves through
    pub fn locator(&self) -> &Locator<B> {
        &self.locator
    }

    /// Serial number this handle resolves by
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// USB Vendor ID of the device currently carrying this serial
    pub fn vendor_id(&self) -> Result<u16> {
        Ok(self.locator.resolve_by_serial(&self.serial)?.descriptor.vendor_id)
    }

    /// USB Product ID of the device currently carrying this serial
    pub fn product_id(&self) -> Result<u16> {
        Ok(self.locator.resolve_by_serial(&self.serial)?.descriptor.product_id)
    }

    /// Manufacturer string, empty if the device has none
    pub fn manufacturer(&self) -> Result<String> {
        let resolved = self.locator.resolve_by_serial(&self.serial)?;
        resolved
            .open()?
            .read_string(resolved.descriptor.manufacturer_index)
    }

    /// Product name string, empty if the device has none
    pub fn product(&self) -> Result<String> {
        let resolved = self.locator.resolve_by_serial(&self.serial)?;
        resolved.open()?.read_string(resolved.descriptor.product_index)
    }

    /// Read every attribute from a single resolution
    pub fn info(&self) -> Result<DaqInfo> {
        let resolved = self.locator.resolve_by_serial(&self.serial)?;
        let descriptor = resolved.descriptor;
        let mut device = resolved.open()?;

        Ok(DaqInfo {
            serial_number: self.serial.clone(),
            vendor_id: descriptor.vendor_id,
            product_id: descriptor.product_id,
            manufacturer: device.read_string(descriptor.manufacturer_index)?,
            product: device.read_string(descriptor.product_index)?,
            bus_number: descriptor.bus_number,
            device_address: descriptor.address,
            speed: descriptor.speed,
        })
    }

    /// Blink the LED `count` times (firmware default when `None`)
    pub fn blink(&self, profile: &BlinkProfile, count: Option<u8>) -> Result<()> {
        blink::blink(&self.locator, &self.serial, profile, count)
    }
}

impl<B: UsbBus> fmt::Display for DaqHandle<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DAQ {}", self.serial)
    }
}

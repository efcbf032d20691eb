//! libusb backend
//!
//! Implements the [`crate::bus`] traits on top of `rusb`. A single
//! [`rusb::Context`] is created per process and shared by every clone of
//! [`RusbBus`]; enumeration still happens from scratch on each call.

use crate::bus::{BusDevice, DeviceIo, UsbBus};
use crate::error::{DaqError, Result};
use crate::types::{DeviceDescriptor, DeviceSpeed};
use rusb::{Context, Device, DeviceHandle, UsbContext};
use std::time::Duration;
use tracing::debug;

/// USB bus backed by a libusb context
#[derive(Clone)]
pub struct RusbBus {
    context: Context,
}

impl RusbBus {
    /// Create the process-wide USB context
    pub fn new() -> Result<Self> {
        let context = Context::new().map_err(DaqError::Context)?;
        debug!("Created libusb context");
        Ok(Self { context })
    }

    /// Wrap an existing context
    pub fn from_context(context: Context) -> Self {
        Self { context }
    }
}

impl std::fmt::Debug for RusbBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RusbBus").finish_non_exhaustive()
    }
}

impl UsbBus for RusbBus {
    type Device = RusbDevice;

    fn devices(&self) -> std::result::Result<Vec<RusbDevice>, rusb::Error> {
        let devices = self.context.devices()?;
        Ok(devices.iter().map(|device| RusbDevice { device }).collect())
    }
}

/// A device from a libusb enumeration
pub struct RusbDevice {
    device: Device<Context>,
}

impl BusDevice for RusbDevice {
    type Io = RusbIo;

    fn bus_number(&self) -> u8 {
        self.device.bus_number()
    }

    fn address(&self) -> u8 {
        self.device.address()
    }

    fn descriptor(&self) -> std::result::Result<DeviceDescriptor, rusb::Error> {
        let descriptor = self.device.device_descriptor()?;
        Ok(DeviceDescriptor {
            vendor_id: descriptor.vendor_id(),
            product_id: descriptor.product_id(),
            serial_number_index: descriptor.serial_number_string_index(),
            manufacturer_index: descriptor.manufacturer_string_index(),
            product_index: descriptor.product_string_index(),
            bus_number: self.device.bus_number(),
            address: self.device.address(),
            speed: map_device_speed(self.device.speed()),
        })
    }

    fn open(&self) -> std::result::Result<RusbIo, rusb::Error> {
        let handle = self.device.open()?;
        Ok(RusbIo { handle })
    }
}

/// An open libusb device handle; dropping it closes the device
pub struct RusbIo {
    handle: DeviceHandle<Context>,
}

impl DeviceIo for RusbIo {
    fn read_string_ascii(&mut self, index: u8) -> std::result::Result<String, rusb::Error> {
        self.handle.read_string_descriptor_ascii(index)
    }

    fn write_control(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        timeout: Duration,
    ) -> std::result::Result<usize, rusb::Error> {
        self.handle
            .write_control(request_type, request, value, index, data, timeout)
    }

    fn write_interrupt(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> std::result::Result<usize, rusb::Error> {
        self.handle.write_interrupt(endpoint, data, timeout)
    }

    fn read_interrupt(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> std::result::Result<usize, rusb::Error> {
        self.handle.read_interrupt(endpoint, buf, timeout)
    }

    fn set_auto_detach_kernel_driver(
        &mut self,
        enable: bool,
    ) -> std::result::Result<(), rusb::Error> {
        self.handle.set_auto_detach_kernel_driver(enable)
    }

    fn claim_interface(&mut self, interface: u8) -> std::result::Result<(), rusb::Error> {
        self.handle.claim_interface(interface)
    }

    fn release_interface(&mut self, interface: u8) -> std::result::Result<(), rusb::Error> {
        self.handle.release_interface(interface)
    }

    fn clear_halt(&mut self, endpoint: u8) -> std::result::Result<(), rusb::Error> {
        self.handle.clear_halt(endpoint)
    }
}

/// Map rusb device speed to DeviceSpeed
fn map_device_speed(speed: rusb::Speed) -> DeviceSpeed {
    match speed {
        rusb::Speed::Low => DeviceSpeed::Low,
        rusb::Speed::Full => DeviceSpeed::Full,
        rusb::Speed::High => DeviceSpeed::High,
        rusb::Speed::Super => DeviceSpeed::Super,
        rusb::Speed::SuperPlus => DeviceSpeed::SuperPlus,
        _ => DeviceSpeed::Unknown,
    }
}

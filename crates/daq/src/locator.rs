//! Device locator
//!
//! Walks the USB topology from scratch on every call. Nothing is cached
//! between calls so that a DAQ can be unplugged and plugged back in between
//! two operations on the same [`DaqHandle`].

use crate::blink::TransferTimeouts;
use crate::bus::{BusDevice, UsbBus};
use crate::device::OpenDevice;
use crate::error::{DaqError, Result};
use crate::handle::DaqHandle;
use crate::types::DeviceDescriptor;
use tracing::{debug, info, warn};

/// Finds DAQ devices on a USB bus
#[derive(Debug, Clone)]
pub struct Locator<B: UsbBus> {
    bus: B,
    timeouts: TransferTimeouts,
}

/// A device that matched the vendor filter but produced no handle
#[derive(Debug, Clone)]
pub struct SkippedDevice {
    pub bus_number: u8,
    pub address: u8,
    pub product_id: u16,
    pub error: DaqError,
}

/// Result of a bulk scan
#[derive(Debug)]
pub struct Scan<B: UsbBus> {
    /// One handle per readable matching device, in enumeration order
    pub handles: Vec<DaqHandle<B>>,
    /// Matching devices that could not be opened or read
    pub skipped: Vec<SkippedDevice>,
}

/// A device found by serial number
#[derive(Debug, Clone)]
pub struct Resolved<D> {
    pub device: D,
    pub descriptor: DeviceDescriptor,
}

impl<D: BusDevice> Resolved<D> {
    /// Open the resolved device
    pub fn open(&self) -> Result<OpenDevice<D::Io>> {
        OpenDevice::open(&self.device)
    }
}

impl<B: UsbBus> Locator<B> {
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            timeouts: TransferTimeouts::default(),
        }
    }

    /// Use `timeouts` for transfers issued through handles from this locator
    pub fn with_timeouts(mut self, timeouts: TransferTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn timeouts(&self) -> &TransferTimeouts {
        &self.timeouts
    }

    /// Build a handle for `serial` without touching the bus
    pub fn handle(&self, serial: impl Into<String>) -> DaqHandle<B> {
        DaqHandle::new(self.clone(), serial)
    }

    /// Find every device with `vendor_id`
    ///
    /// Devices that fail to open or whose serial number cannot be read are
    /// skipped and reported in [`Scan::skipped`]. Only a failure to list the
    /// bus itself is an error.
    pub fn scan(&self, vendor_id: u16) -> Result<Scan<B>> {
        let devices = self.bus.devices().map_err(DaqError::Enumeration)?;
        let mut scan = Scan {
            handles: Vec::new(),
            skipped: Vec::new(),
        };

        for device in devices {
            let descriptor = match device.descriptor() {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    debug!(
                        "Skipping device at bus {:03} address {:03} without descriptor: {}",
                        device.bus_number(),
                        device.address(),
                        e
                    );
                    continue;
                }
            };

            if descriptor.vendor_id != vendor_id {
                continue;
            }

            match read_serial(&device, &descriptor) {
                Ok(serial) => {
                    debug!(
                        "Found {:04x}:{:04x} at bus {:03} address {:03} with serial '{}'",
                        descriptor.vendor_id,
                        descriptor.product_id,
                        descriptor.bus_number,
                        descriptor.address,
                        serial
                    );
                    scan.handles.push(self.handle(serial));
                }
                Err(error) => {
                    warn!(
                        "Skipping {:04x}:{:04x} at bus {:03} address {:03}: {}",
                        descriptor.vendor_id,
                        descriptor.product_id,
                        descriptor.bus_number,
                        descriptor.address,
                        error
                    );
                    scan.skipped.push(SkippedDevice {
                        bus_number: descriptor.bus_number,
                        address: descriptor.address,
                        product_id: descriptor.product_id,
                        error,
                    });
                }
            }
        }

        info!(
            "Found {} device(s) with vendor {:04x} ({} skipped)",
            scan.handles.len(),
            vendor_id,
            scan.skipped.len()
        );
        Ok(scan)
    }

    /// Find every device with `vendor_id` and return a handle for each
    pub fn enumerate_matching(&self, vendor_id: u16) -> Result<Vec<DaqHandle<B>>> {
        Ok(self.scan(vendor_id)?.handles)
    }

    /// Find the first device, of any vendor, whose serial number string is
    /// exactly `serial`
    pub fn resolve_by_serial(&self, serial: &str) -> Result<Resolved<B::Device>> {
        if serial.is_empty() {
            debug!("Refusing to resolve an empty serial number");
            return Err(DaqError::DeviceNotFound {
                serial: String::new(),
                unreadable: 0,
            });
        }

        let devices = self.bus.devices().map_err(DaqError::Enumeration)?;
        let mut unreadable = 0;

        for device in devices {
            let Ok(descriptor) = device.descriptor() else {
                continue;
            };
            if descriptor.serial_number_index.is_none() {
                continue;
            }

            match read_serial(&device, &descriptor) {
                Ok(candidate) if candidate == serial => {
                    debug!(
                        "Resolved serial '{}' to {:04x}:{:04x} at bus {:03} address {:03}",
                        serial,
                        descriptor.vendor_id,
                        descriptor.product_id,
                        descriptor.bus_number,
                        descriptor.address
                    );
                    return Ok(Resolved { device, descriptor });
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Could not read serial while resolving '{}': {}", serial, e);
                    unreadable += 1;
                }
            }
        }

        debug!("No device with serial '{}'", serial);
        Err(DaqError::DeviceNotFound {
            serial: serial.to_string(),
            unreadable,
        })
    }
}

/// Open `device` just long enough to read its serial number
fn read_serial<D: BusDevice>(device: &D, descriptor: &DeviceDescriptor) -> Result<String> {
    let mut open = OpenDevice::open(device)?;
    open.read_string(descriptor.serial_number_index)
}

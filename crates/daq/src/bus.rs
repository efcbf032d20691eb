//! USB bus abstraction
//!
//! The locator only needs a handful of host-library operations: list the
//! devices on every bus, read a device descriptor, open a device, read string
//! descriptors, push control/interrupt transfers and read interrupt replies.
//! These traits name that surface so the locator can run against libusb
//! (see [`crate::libusb`]) or a fabricated topology in tests (see
//! [`crate::test_utils`]).
//!
//! Errors at this seam are plain [`rusb::Error`] values; the locator maps
//! them into [`crate::DaqError`] with context.

use crate::types::DeviceDescriptor;
use std::time::Duration;

/// A USB host bus (or set of buses) that can be enumerated
///
/// Implementations are cheap to clone and share one underlying host context.
pub trait UsbBus: Clone {
    type Device: BusDevice;

    /// Enumerate every device on every bus, in host enumeration order
    ///
    /// Each call must reflect the current topology; implementations must not
    /// cache the list.
    fn devices(&self) -> Result<Vec<Self::Device>, rusb::Error>;
}

/// A device entry from one enumeration snapshot
pub trait BusDevice {
    type Io: DeviceIo;

    fn bus_number(&self) -> u8;

    fn address(&self) -> u8;

    /// Read the device descriptor (no I/O to the device is required)
    fn descriptor(&self) -> Result<DeviceDescriptor, rusb::Error>;

    /// Open the device. The returned handle closes the device when dropped.
    fn open(&self) -> Result<Self::Io, rusb::Error>;
}

/// An open device handle
pub trait DeviceIo {
    /// Read a string descriptor as ASCII
    fn read_string_ascii(&mut self, index: u8) -> Result<String, rusb::Error>;

    /// Write a control transfer, returning the number of bytes written
    fn write_control(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error>;

    /// Write an interrupt transfer, returning the number of bytes written
    fn write_interrupt(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error>;

    /// Read one interrupt transfer into `buf`, returning the number of bytes read
    fn read_interrupt(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error>;

    fn set_auto_detach_kernel_driver(&mut self, enable: bool) -> Result<(), rusb::Error>;

    fn claim_interface(&mut self, interface: u8) -> Result<(), rusb::Error>;

    fn release_interface(&mut self, interface: u8) -> Result<(), rusb::Error>;

    fn clear_halt(&mut self, endpoint: u8) -> Result<(), rusb::Error>;
}

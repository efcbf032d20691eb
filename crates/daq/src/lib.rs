//! Measurement Computing USB DAQ access
//!
//! Locates Measurement Computing data-acquisition cards on the USB bus and
//! exposes them as [`DaqHandle`]s keyed by serial number. Attributes are read
//! lazily by re-resolving the serial number on every access. Every model can
//! blink its indicator LED; the USB-TEMP additionally has a driver for
//! status, calibration, temperature reads and its digital port
//! ([`usb_temp`]).
//!
//! ```no_run
//! use daq::{BlinkProfile, find_daqs};
//!
//! # fn main() -> daq::Result<()> {
//! for handle in find_daqs()? {
//!     println!("{} {}", handle.serial(), handle.product()?);
//!     handle.blink(&BlinkProfile::interrupt(0x40, 1), Some(3))?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod blink;
pub mod bus;
pub mod device;
pub mod error;
pub mod handle;
pub mod libusb;
pub mod locator;
pub mod test_utils;
pub mod types;
pub mod usb_temp;

pub use blink::{BlinkProfile, BlinkTransport, TransferTimeouts, blink};
pub use bus::{BusDevice, DeviceIo, UsbBus};
pub use device::OpenDevice;
pub use error::{DaqError, ErrorKind, Result};
pub use handle::DaqHandle;
pub use libusb::RusbBus;
pub use locator::{Locator, Resolved, Scan, SkippedDevice};
pub use types::{
    DEFAULT_FULL_SPEED_TIMEOUT, DEFAULT_HIGH_SPEED_TIMEOUT, DaqInfo, DeviceDescriptor,
    DeviceSpeed, MCC_VENDOR_ID, STRING_DESCRIPTOR_BUFFER_LEN,
};
pub use usb_temp::{USB_TEMP_PRODUCT_ID, UsbTemp};

/// Find every Measurement Computing device on the system
///
/// Creates a libusb context for the returned handles to share.
pub fn find_daqs() -> Result<Vec<DaqHandle<RusbBus>>> {
    Locator::new(RusbBus::new()?).enumerate_matching(MCC_VENDOR_ID)
}

//! USB and DAQ type definitions

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// USB vendor ID assigned to Measurement Computing
pub const MCC_VENDOR_ID: u16 = 0x09db;

/// Size of the buffer a string descriptor is read into, including the
/// terminating NUL. Longer strings are silently truncated.
pub const STRING_DESCRIPTOR_BUFFER_LEN: usize = 256;

/// Default transfer timeout for full-speed (and slower) devices
pub const DEFAULT_FULL_SPEED_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default transfer timeout for high-speed (and faster) devices
pub const DEFAULT_HIGH_SPEED_TIMEOUT: Duration = Duration::from_millis(2_000);

/// USB device speed
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeviceSpeed {
    /// Speed not reported by the host controller
    #[default]
    Unknown,
    /// Low speed - 1.5 Mbps (USB 1.0)
    Low,
    /// Full speed - 12 Mbps (USB 1.1)
    Full,
    /// High speed - 480 Mbps (USB 2.0)
    High,
    /// SuperSpeed - 5 Gbps (USB 3.0)
    Super,
    /// SuperSpeed+ - 10 Gbps (USB 3.1)
    SuperPlus,
}

impl DeviceSpeed {
    /// True for high-speed links and above
    pub fn is_high_speed(self) -> bool {
        matches!(
            self,
            DeviceSpeed::High | DeviceSpeed::Super | DeviceSpeed::SuperPlus
        )
    }
}

/// Device descriptor copied out of an enumeration snapshot
///
/// Only the fields the locator needs are kept. String fields are referenced
/// by descriptor index; `None` means the device does not advertise that
/// string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceDescriptor {
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// `iSerialNumber`
    pub serial_number_index: Option<u8>,
    /// `iManufacturer`
    pub manufacturer_index: Option<u8>,
    /// `iProduct`
    pub product_index: Option<u8>,
    /// Bus number the device was found on
    pub bus_number: u8,
    /// Device address on the bus
    pub address: u8,
    /// Negotiated link speed
    pub speed: DeviceSpeed,
}

/// All attributes of a DAQ read during a single resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaqInfo {
    pub serial_number: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub manufacturer: String,
    pub product: String,
    pub bus_number: u8,
    pub device_address: u8,
    pub speed: DeviceSpeed,
}

/// Clamp a string read from a descriptor to what fits in the read buffer
pub(crate) fn clamp_descriptor_string(mut value: String) -> String {
    let max = STRING_DESCRIPTOR_BUFFER_LEN - 1;
    if value.len() > max {
        let mut end = max;
        while !value.is_char_boundary(end) {
            end -= 1;
        }
        value.truncate(end);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_high_speed_classification() {
        assert!(!DeviceSpeed::Unknown.is_high_speed());
        assert!(!DeviceSpeed::Low.is_high_speed());
        assert!(!DeviceSpeed::Full.is_high_speed());
        assert!(DeviceSpeed::High.is_high_speed());
        assert!(DeviceSpeed::Super.is_high_speed());
        assert!(DeviceSpeed::SuperPlus.is_high_speed());
    }

    #[test]
    fn test_clamp_keeps_short_strings() {
        assert_eq!(clamp_descriptor_string("USB-TEMP".into()), "USB-TEMP");
        assert_eq!(clamp_descriptor_string(String::new()), "");
    }

    #[test]
    fn test_clamp_truncates_long_strings() {
        let long = "x".repeat(400);
        let clamped = clamp_descriptor_string(long);
        assert_eq!(clamped.len(), STRING_DESCRIPTOR_BUFFER_LEN - 1);
    }

    #[test]
    fn test_clamp_respects_char_boundary() {
        // 254 ASCII bytes followed by a two-byte character straddling the limit
        let value = format!("{}é", "a".repeat(254));
        let clamped = clamp_descriptor_string(value);
        assert_eq!(clamped.len(), 254);
    }

    #[test]
    fn test_info_serializes_speed_in_snake_case() {
        let info = DaqInfo {
            serial_number: "01A2B3C4".into(),
            vendor_id: MCC_VENDOR_ID,
            product_id: 0x008d,
            manufacturer: "MCC".into(),
            product: "USB-TEMP".into(),
            bus_number: 1,
            device_address: 5,
            speed: DeviceSpeed::SuperPlus,
        };
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"super_plus\""));
        assert!(json.contains("\"serial_number\":\"01A2B3C4\""));
    }
}

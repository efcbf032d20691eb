//! LED blink command
//!
//! Blinking is the one command every model understands. The command code
//! and the way it is delivered differ between DAQ models, so both come from a
//! caller-supplied [`BlinkProfile`] rather than from constants.

use crate::bus::{DeviceIo, UsbBus};
use crate::error::{DaqError, Result};
use crate::locator::Locator;
use crate::types::{DEFAULT_FULL_SPEED_TIMEOUT, DEFAULT_HIGH_SPEED_TIMEOUT, DeviceSpeed};
use rusb::{Direction, Recipient, RequestType};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// HID class request `SET_REPORT`
pub const HID_SET_REPORT: u8 = 0x09;

/// HID report type `Output`, in the high byte of `wValue`
pub const HID_OUTPUT_REPORT: u16 = 2 << 8;

/// How the blink command reaches the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BlinkTransport {
    /// Interrupt OUT write of `[command, count]` to `endpoint`
    ///
    /// A short write is retried once.
    Interrupt { endpoint: u8 },
    /// HID `SET_REPORT` output report on the control endpoint
    HidReport { report_id: u8 },
    /// Vendor control request with `bRequest = command` and `[count]` as data
    VendorRequest,
}

/// Per-model blink settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlinkProfile {
    /// Firmware command code that blinks the LED
    pub command: u8,
    pub transport: BlinkTransport,
    /// Interface claimed for interrupt and HID transports
    #[serde(default)]
    pub interface: u8,
    /// Overrides the speed-based default timeout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl BlinkProfile {
    pub fn interrupt(command: u8, endpoint: u8) -> Self {
        Self {
            command,
            transport: BlinkTransport::Interrupt { endpoint },
            interface: 0,
            timeout_ms: None,
        }
    }

    pub fn hid_report(command: u8, report_id: u8) -> Self {
        Self {
            command,
            transport: BlinkTransport::HidReport { report_id },
            interface: 0,
            timeout_ms: None,
        }
    }

    pub fn vendor_request(command: u8) -> Self {
        Self {
            command,
            transport: BlinkTransport::VendorRequest,
            interface: 0,
            timeout_ms: None,
        }
    }

    /// Payload for the report-style transports
    fn report_payload(&self, count: Option<u8>) -> Vec<u8> {
        match count {
            Some(count) => vec![self.command, count],
            None => vec![self.command],
        }
    }
}

/// Transfer timeouts by link speed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferTimeouts {
    pub full_speed_ms: u64,
    pub high_speed_ms: u64,
}

impl Default for TransferTimeouts {
    fn default() -> Self {
        Self {
            full_speed_ms: DEFAULT_FULL_SPEED_TIMEOUT.as_millis() as u64,
            high_speed_ms: DEFAULT_HIGH_SPEED_TIMEOUT.as_millis() as u64,
        }
    }
}

impl TransferTimeouts {
    /// Timeout for a device negotiated at `speed`
    pub fn for_speed(&self, speed: DeviceSpeed) -> Duration {
        if speed.is_high_speed() {
            Duration::from_millis(self.high_speed_ms)
        } else {
            Duration::from_millis(self.full_speed_ms)
        }
    }
}

/// Blink the LED of the device with serial number `serial`
///
/// The serial number is resolved against the current topology first; if that
/// fails no I/O is performed. A zero timeout, from the profile or from the
/// locator's speed table, is refused before the device is opened. The device
/// is released before returning on every path.
pub fn blink<B: UsbBus>(
    locator: &Locator<B>,
    serial: &str,
    profile: &BlinkProfile,
    count: Option<u8>,
) -> Result<()> {
    if count == Some(0) {
        return Err(DaqError::InvalidCount);
    }
    if profile.timeout_ms == Some(0) {
        return Err(DaqError::InvalidTimeout);
    }

    let resolved = locator.resolve_by_serial(serial)?;
    let timeout = checked_timeout(
        profile
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| locator.timeouts().for_speed(resolved.descriptor.speed)),
    )?;

    let mut device = resolved.open()?;

    match profile.transport {
        BlinkTransport::Interrupt { endpoint } => {
            device.claim_interface(profile.interface)?;
            let endpoint = out_endpoint(endpoint);
            let payload = profile.report_payload(count);
            write_interrupt_with_retry(
                device.interrupt_pair_io(endpoint),
                endpoint,
                &payload,
                timeout,
            )?;
        }
        BlinkTransport::HidReport { report_id } => {
            device.claim_interface(profile.interface)?;
            let payload = profile.report_payload(count);
            let written = device
                .control_io()
                .write_control(
                    rusb::request_type(Direction::Out, RequestType::Class, Recipient::Interface),
                    HID_SET_REPORT,
                    HID_OUTPUT_REPORT | u16::from(report_id),
                    u16::from(profile.interface),
                    &payload,
                    timeout,
                )
                .map_err(|source| DaqError::Transfer {
                    endpoint: 0,
                    source,
                })?;
            expect_written(0, written, payload.len())?;
        }
        BlinkTransport::VendorRequest => {
            let payload = [count.unwrap_or(1)];
            let written = device
                .control_io()
                .write_control(
                    rusb::request_type(Direction::Out, RequestType::Vendor, Recipient::Device),
                    profile.command,
                    0,
                    0,
                    &payload,
                    timeout,
                )
                .map_err(|source| DaqError::Transfer {
                    endpoint: 0,
                    source,
                })?;
            expect_written(0, written, payload.len())?;
        }
    }

    info!(
        "Blinked LED on '{}' ({:04x}:{:04x})",
        serial, resolved.descriptor.vendor_id, resolved.descriptor.product_id
    );
    Ok(())
}

/// OUT address for endpoint number `endpoint`
pub(crate) fn out_endpoint(endpoint: u8) -> u8 {
    endpoint & 0x0f
}

/// Refuse a zero timeout, which libusb would wait on forever
pub(crate) fn checked_timeout(timeout: Duration) -> Result<Duration> {
    if timeout.is_zero() {
        Err(DaqError::InvalidTimeout)
    } else {
        Ok(timeout)
    }
}

/// Write `payload` to an interrupt endpoint, retrying once on a short write
pub(crate) fn write_interrupt_with_retry<H: DeviceIo>(
    io: &mut H,
    endpoint: u8,
    payload: &[u8],
    timeout: Duration,
) -> Result<()> {
    let written = io
        .write_interrupt(endpoint, payload, timeout)
        .map_err(|source| DaqError::Transfer { endpoint, source })?;
    if written == payload.len() {
        debug!("Interrupt write to {:#04x}: {} bytes", endpoint, written);
        return Ok(());
    }

    warn!(
        "Short interrupt write to {:#04x} ({} of {} bytes), retrying",
        endpoint,
        written,
        payload.len()
    );
    let written = io
        .write_interrupt(endpoint, payload, timeout)
        .map_err(|source| DaqError::Transfer { endpoint, source })?;
    expect_written(endpoint, written, payload.len())
}

fn expect_written(endpoint: u8, written: usize, expected: usize) -> Result<()> {
    if written == expected {
        Ok(())
    } else {
        Err(DaqError::ShortWrite {
            endpoint,
            written,
            expected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let timeouts = TransferTimeouts::default();
        assert_eq!(timeouts.full_speed_ms, 10_000);
        assert_eq!(timeouts.high_speed_ms, 2_000);
        assert_eq!(
            timeouts.for_speed(DeviceSpeed::Full),
            Duration::from_secs(10)
        );
        assert_eq!(
            timeouts.for_speed(DeviceSpeed::High),
            Duration::from_secs(2)
        );
        assert_eq!(
            timeouts.for_speed(DeviceSpeed::Unknown),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_report_payload() {
        let profile = BlinkProfile::interrupt(0x40, 1);
        assert_eq!(profile.report_payload(None), vec![0x40]);
        assert_eq!(profile.report_payload(Some(5)), vec![0x40, 5]);
    }

    #[test]
    fn test_out_endpoint_strips_direction() {
        assert_eq!(out_endpoint(0x01), 0x01);
        assert_eq!(out_endpoint(0x81), 0x01);
    }

    #[test]
    fn test_checked_timeout() {
        assert!(matches!(
            checked_timeout(Duration::ZERO),
            Err(DaqError::InvalidTimeout)
        ));
        assert_eq!(
            checked_timeout(Duration::from_millis(1)).unwrap(),
            Duration::from_millis(1)
        );
    }

    #[test]
    fn test_expect_written() {
        assert!(expect_written(1, 2, 2).is_ok());
        assert!(matches!(
            expect_written(1, 1, 2),
            Err(DaqError::ShortWrite {
                endpoint: 1,
                written: 1,
                expected: 2
            })
        ));
    }

    #[test]
    fn test_profile_deserialize() {
        let profile: BlinkProfile = serde_json::from_str(
            r#"{"command": 64, "transport": {"kind": "hid_report", "report_id": 64}}"#,
        )
        .unwrap();
        assert_eq!(profile, BlinkProfile::hid_report(0x40, 0x40));

        let profile: BlinkProfile = serde_json::from_str(
            r#"{"command": 65, "transport": {"kind": "vendor_request"}, "timeout_ms": 500}"#,
        )
        .unwrap();
        assert_eq!(profile.transport, BlinkTransport::VendorRequest);
        assert_eq!(profile.timeout_ms, Some(500));
    }
}

//! USB-TEMP driver
//!
//! The USB-TEMP speaks HID reports over the interrupt pair on endpoint 1.
//! Every command is an output report whose first byte (the report ID) is the
//! command code; commands that answer do so with an input report carrying
//! the same ID followed by the reply payload.
//!
//! Like [`DaqHandle`], a [`UsbTemp`] only remembers a serial number. Each
//! operation resolves it, checks the product ID, claims interface 0 and
//! releases everything again before returning.
//!
//! ```no_run
//! use daq::usb_temp::{Units, UsbTemp};
//! use daq::{Locator, RusbBus};
//!
//! # fn main() -> daq::Result<()> {
//! let locator = Locator::new(RusbBus::new()?);
//! let temp = UsbTemp::new(locator.handle("01A2B3C4"));
//! println!("channel 0: {:.2} C", temp.read_temperature(0, Units::Celsius)?);
//! # Ok(())
//! # }
//! ```

use crate::blink::{checked_timeout, write_interrupt_with_retry};
use crate::bus::{BusDevice, DeviceIo, UsbBus};
use crate::device::OpenDevice;
use crate::error::{DaqError, Result};
use crate::handle::DaqHandle;
use std::thread;
use std::time::Duration;
use tracing::{debug, info};

/// Product ID of the USB-TEMP
pub const USB_TEMP_PRODUCT_ID: u16 = 0x008d;

/// Highest temperature input channel
pub const MAX_CHANNEL: u8 = 7;

/// Highest digital port bit
pub const MAX_DIO_BIT: u8 = 7;

/// USB-TEMP command codes (HID report IDs)
pub mod command {
    pub const DCONFIG: u8 = 0x01;
    pub const DCONFIG_BIT: u8 = 0x02;
    pub const DIN: u8 = 0x03;
    pub const DOUT: u8 = 0x04;
    pub const TIN: u8 = 0x18;
    pub const TIN_SCAN: u8 = 0x19;
    pub const BLINK_LED: u8 = 0x40;
    pub const GET_STATUS: u8 = 0x44;
    pub const CALIBRATE: u8 = 0x4b;
    pub const GET_BURNOUT_STATUS: u8 = 0x4c;
}

/// Endpoint number of the report pipe
const REPORT_ENDPOINT: u8 = 1;

/// IN address of the report pipe
const REPLY_ENDPOINT: u8 = 0x80 | REPORT_ENDPOINT;

const INTERFACE: u8 = 0;

/// Largest full-speed interrupt packet
const MAX_REPORT_LEN: usize = 64;

/// Interrupt reads attempted while waiting for a reply
pub const REPLY_READS: usize = 10;

/// Timeout of each reply read
pub const REPLY_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Units of a temperature reading
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Units {
    /// Degrees Celsius
    #[default]
    Celsius,
    /// Raw converter counts
    Raw,
}

impl Units {
    fn code(self) -> u8 {
        match self {
            Units::Celsius => 0x00,
            Units::Raw => 0x01,
        }
    }
}

/// Direction of the digital port or one of its bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    In,
    Out,
}

impl PortDirection {
    fn code(self) -> u8 {
        match self {
            PortDirection::In => 0x01,
            PortDirection::Out => 0x00,
        }
    }
}

/// How long [`UsbTemp::calibrate`] waits for the device to finish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationPoll {
    /// Status reads before giving up
    pub max_polls: u32,
    /// Pause between status reads
    pub interval: Duration,
}

impl Default for CalibrationPoll {
    fn default() -> Self {
        Self {
            max_polls: 200,
            interval: Duration::from_millis(50),
        }
    }
}

/// A USB-TEMP identified by serial number
#[derive(Debug, Clone)]
pub struct UsbTemp<B: UsbBus> {
    handle: DaqHandle<B>,
}

impl<B: UsbBus> UsbTemp<B> {
    pub fn new(handle: DaqHandle<B>) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &DaqHandle<B> {
        &self.handle
    }

    /// Device status byte; zero means idle
    pub fn status(&self) -> Result<u8> {
        self.session()?.status()
    }

    /// Run a channel calibration and wait until the device reports idle
    pub fn calibrate(&self, poll: CalibrationPoll) -> Result<()> {
        let mut session = self.session()?;
        session.send(&[command::CALIBRATE])?;

        for polls in 1..=poll.max_polls {
            if session.status()? == 0 {
                info!(
                    "Calibrated '{}' after {} status poll(s)",
                    self.handle.serial(),
                    polls
                );
                return Ok(());
            }
            thread::sleep(poll.interval);
        }

        Err(DaqError::Busy {
            polls: poll.max_polls,
        })
    }

    /// Read one temperature input channel
    pub fn read_temperature(&self, channel: u8, units: Units) -> Result<f32> {
        check_channel(channel)?;
        let payload = self.session()?.exchange(
            &[command::TIN, channel, units.code(), 0x00],
            1 + 4,
        )?;
        Ok(decode_floats(&payload)[0])
    }

    /// Read channels `first..=last` in one report
    pub fn scan_temperatures(&self, first: u8, last: u8, units: Units) -> Result<Vec<f32>> {
        check_channel(first)?;
        check_channel(last)?;
        if first > last {
            return Err(DaqError::InvalidChannel {
                channel: first,
                reason: "scan start is after scan end",
            });
        }

        let channels = usize::from(last - first) + 1;
        let payload = self.session()?.exchange(
            &[command::TIN_SCAN, first, last, units.code(), 0x00],
            1 + 4 * channels,
        )?;
        Ok(decode_floats(&payload))
    }

    /// Thermocouple burnout bits selected by `mask`; a set bit means the
    /// channel has no sensor attached
    pub fn burnout_status(&self, mask: u8) -> Result<u8> {
        let payload = self
            .session()?
            .exchange(&[command::GET_BURNOUT_STATUS, 0x00, 0x00], 2)?;
        Ok(payload[0] & mask)
    }

    /// Set the direction of the whole digital port
    pub fn configure_port(&self, direction: PortDirection) -> Result<()> {
        self.session()?
            .send(&[command::DCONFIG, direction.code()])
    }

    /// Set the direction of one digital port bit
    pub fn configure_bit(&self, bit: u8, direction: PortDirection) -> Result<()> {
        if bit > MAX_DIO_BIT {
            return Err(DaqError::InvalidChannel {
                channel: bit,
                reason: "digital bit must be 0-7",
            });
        }
        self.session()?
            .send(&[command::DCONFIG_BIT, bit, direction.code()])
    }

    /// Read the digital port
    pub fn read_port(&self) -> Result<u8> {
        let payload = self.session()?.exchange(&[command::DIN, 0x00, 0x00], 2)?;
        Ok(payload[0])
    }

    /// Write the digital port
    pub fn write_port(&self, value: u8) -> Result<()> {
        self.session()?.send(&[command::DOUT, value])
    }

    fn session(&self) -> Result<Session<<B::Device as BusDevice>::Io>> {
        let locator = self.handle.locator();
        let resolved = locator.resolve_by_serial(self.handle.serial())?;

        if resolved.descriptor.product_id != USB_TEMP_PRODUCT_ID {
            return Err(DaqError::UnsupportedProduct {
                serial: self.handle.serial().to_string(),
                product_id: resolved.descriptor.product_id,
                expected: USB_TEMP_PRODUCT_ID,
            });
        }

        let timeout = checked_timeout(locator.timeouts().for_speed(resolved.descriptor.speed))?;
        let mut device = resolved.open()?;
        device.claim_interface(INTERFACE)?;

        Ok(Session { device, timeout })
    }
}

/// One open, claimed USB-TEMP
struct Session<H: DeviceIo> {
    device: OpenDevice<H>,
    timeout: Duration,
}

impl<H: DeviceIo> Session<H> {
    fn send(&mut self, report: &[u8]) -> Result<()> {
        write_interrupt_with_retry(
            self.device.interrupt_pair_io(REPORT_ENDPOINT),
            REPORT_ENDPOINT,
            report,
            self.timeout,
        )
    }

    /// Send `report` and return the payload of the matching input report,
    /// without its report ID
    fn exchange(&mut self, report: &[u8], reply_len: usize) -> Result<Vec<u8>> {
        let command = report[0];
        self.send(report)?;

        let mut buf = [0u8; MAX_REPORT_LEN];
        for _ in 0..REPLY_READS {
            let received = match self.device.interrupt_pair_io(REPORT_ENDPOINT).read_interrupt(
                REPLY_ENDPOINT,
                &mut buf,
                REPLY_READ_TIMEOUT,
            ) {
                Ok(0) | Err(rusb::Error::Timeout) => continue,
                Ok(n) => n,
                Err(source) => {
                    return Err(DaqError::Transfer {
                        endpoint: REPLY_ENDPOINT,
                        source,
                    });
                }
            };

            if buf[0] != command {
                debug!(
                    "Discarding input report {:#04x} while waiting for {:#04x}",
                    buf[0], command
                );
                continue;
            }
            if received < reply_len {
                return Err(DaqError::ShortReply {
                    command,
                    received,
                    expected: reply_len,
                });
            }
            return Ok(buf[1..reply_len].to_vec());
        }

        Err(DaqError::NoReply {
            command,
            attempts: REPLY_READS,
        })
    }

    fn status(&mut self) -> Result<u8> {
        let payload = self.exchange(&[command::GET_STATUS, 0x00, 0x00], 2)?;
        Ok(payload[0])
    }
}

fn check_channel(channel: u8) -> Result<()> {
    if channel > MAX_CHANNEL {
        return Err(DaqError::InvalidChannel {
            channel,
            reason: "temperature channel must be 0-7",
        });
    }
    Ok(())
}

/// Little-endian IEEE-754 singles
fn decode_floats(payload: &[u8]) -> Vec<f32> {
    payload
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_floats() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&21.5f32.to_le_bytes());
        payload.extend_from_slice(&(-40.25f32).to_le_bytes());
        assert_eq!(decode_floats(&payload), vec![21.5, -40.25]);
    }

    #[test]
    fn test_check_channel() {
        assert!(check_channel(0).is_ok());
        assert!(check_channel(MAX_CHANNEL).is_ok());
        assert!(matches!(
            check_channel(8),
            Err(DaqError::InvalidChannel { channel: 8, .. })
        ));
    }

    #[test]
    fn test_codes() {
        assert_eq!(Units::Celsius.code(), 0x00);
        assert_eq!(Units::Raw.code(), 0x01);
        assert_eq!(PortDirection::In.code(), 0x01);
        assert_eq!(PortDirection::Out.code(), 0x00);
    }
}

//! Fabricated USB topologies for testing
//!
//! [`FakeBus`] implements [`UsbBus`] over a list of [`FakeDevice`]s and
//! records every open, close, string read, claim, release and transfer per
//! device so tests can assert on the exact I/O performed. Interrupt reads
//! are answered from a per-device queue of canned input reports.
//!
//! # Example
//!
//! ```
//! use daq::test_utils::{FakeBus, FakeDevice};
//! use daq::{Locator, MCC_VENDOR_ID};
//!
//! let bus = FakeBus::new(vec![
//!     FakeDevice::new(MCC_VENDOR_ID, 0x0082).at(1, 2).serial("AA11"),
//! ]);
//! let locator = Locator::new(bus.clone());
//! let handles = locator.enumerate_matching(MCC_VENDOR_ID).unwrap();
//! assert_eq!(handles[0].serial(), "AA11");
//! assert_eq!(bus.stats(1, 2).closes, 1);
//! ```

use crate::bus::{BusDevice, DeviceIo, UsbBus};
use crate::types::{DeviceDescriptor, DeviceSpeed};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const MANUFACTURER_INDEX: u8 = 1;
const PRODUCT_INDEX: u8 = 2;
const SERIAL_INDEX: u8 = 3;

/// A fabricated device
#[derive(Debug, Clone)]
pub struct FakeDevice {
    pub bus_number: u8,
    pub address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
    pub speed: DeviceSpeed,
    pub serial: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
    /// Error returned by `open`
    pub open_error: Option<rusb::Error>,
    /// Error returned by every string descriptor read
    pub string_error: Option<rusb::Error>,
    /// Error returned by every transfer
    pub transfer_error: Option<rusb::Error>,
    /// Number of leading transfers that write one byte less than requested
    pub short_writes: usize,
    /// Input reports returned by interrupt reads, in order
    pub replies: Vec<Vec<u8>>,
}

impl FakeDevice {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            bus_number: 1,
            address: 1,
            vendor_id,
            product_id,
            speed: DeviceSpeed::Full,
            serial: None,
            manufacturer: None,
            product: None,
            open_error: None,
            string_error: None,
            transfer_error: None,
            short_writes: 0,
            replies: Vec::new(),
        }
    }

    pub fn at(mut self, bus_number: u8, address: u8) -> Self {
        self.bus_number = bus_number;
        self.address = address;
        self
    }

    pub fn speed(mut self, speed: DeviceSpeed) -> Self {
        self.speed = speed;
        self
    }

    pub fn serial(mut self, serial: &str) -> Self {
        self.serial = Some(serial.to_string());
        self
    }

    pub fn manufacturer(mut self, manufacturer: &str) -> Self {
        self.manufacturer = Some(manufacturer.to_string());
        self
    }

    pub fn product(mut self, product: &str) -> Self {
        self.product = Some(product.to_string());
        self
    }

    pub fn unopenable(mut self, error: rusb::Error) -> Self {
        self.open_error = Some(error);
        self
    }

    pub fn unreadable_strings(mut self, error: rusb::Error) -> Self {
        self.string_error = Some(error);
        self
    }

    pub fn failing_transfers(mut self, error: rusb::Error) -> Self {
        self.transfer_error = Some(error);
        self
    }

    pub fn short_writes(mut self, count: usize) -> Self {
        self.short_writes = count;
        self
    }

    /// Queue an input report for the next interrupt read
    pub fn reply(mut self, report: &[u8]) -> Self {
        self.replies.push(report.to_vec());
        self
    }

    fn key(&self) -> (u8, u8) {
        (self.bus_number, self.address)
    }

    fn descriptor(&self) -> DeviceDescriptor {
        DeviceDescriptor {
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            serial_number_index: self.serial.as_ref().map(|_| SERIAL_INDEX),
            manufacturer_index: self.manufacturer.as_ref().map(|_| MANUFACTURER_INDEX),
            product_index: self.product.as_ref().map(|_| PRODUCT_INDEX),
            bus_number: self.bus_number,
            address: self.address,
            speed: self.speed,
        }
    }

    fn string(&self, index: u8) -> Option<&String> {
        match index {
            MANUFACTURER_INDEX => self.manufacturer.as_ref(),
            PRODUCT_INDEX => self.product.as_ref(),
            SERIAL_INDEX => self.serial.as_ref(),
            _ => None,
        }
    }
}

/// A transfer recorded by the fake bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedTransfer {
    Control {
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: Vec<u8>,
        timeout: Duration,
    },
    Interrupt {
        endpoint: u8,
        data: Vec<u8>,
        timeout: Duration,
    },
    InterruptIn {
        endpoint: u8,
        length: usize,
        timeout: Duration,
    },
}

/// Per-device I/O counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub opens: usize,
    pub closes: usize,
    pub string_reads: Vec<u8>,
    pub claims: Vec<u8>,
    pub releases: Vec<u8>,
    pub halts_cleared: Vec<u8>,
    pub transfers: Vec<RecordedTransfer>,
}

#[derive(Debug, Default)]
struct Topology {
    devices: Vec<FakeDevice>,
    stats: HashMap<(u8, u8), DeviceStats>,
    replies: HashMap<(u8, u8), VecDeque<Vec<u8>>>,
    enumeration_error: Option<rusb::Error>,
    enumerations: usize,
}

/// A fabricated USB bus
#[derive(Debug, Clone, Default)]
pub struct FakeBus {
    inner: Arc<Mutex<Topology>>,
}

impl FakeBus {
    pub fn new(devices: Vec<FakeDevice>) -> Self {
        let bus = Self::default();
        bus.replace_devices(devices);
        bus
    }

    /// Swap the topology, as if devices were unplugged and plugged back in
    ///
    /// Canned replies of the new devices are appended to their queues.
    pub fn replace_devices(&self, devices: Vec<FakeDevice>) {
        let mut topology = self.lock();
        for device in &devices {
            topology
                .replies
                .entry(device.key())
                .or_default()
                .extend(device.replies.iter().cloned());
        }
        topology.devices = devices;
    }

    /// Input reports not yet consumed for the device at `bus_number`/`address`
    pub fn pending_replies(&self, bus_number: u8, address: u8) -> usize {
        self.lock()
            .replies
            .get(&(bus_number, address))
            .map_or(0, VecDeque::len)
    }

    /// Make every subsequent enumeration fail
    pub fn fail_enumeration(&self, error: rusb::Error) {
        self.lock().enumeration_error = Some(error);
    }

    /// I/O counters for the device at `bus_number`/`address`
    pub fn stats(&self, bus_number: u8, address: u8) -> DeviceStats {
        self.lock()
            .stats
            .get(&(bus_number, address))
            .cloned()
            .unwrap_or_default()
    }

    /// Number of completed bus enumerations
    pub fn enumerations(&self) -> usize {
        self.lock().enumerations
    }

    /// Total opens across all devices
    pub fn total_opens(&self) -> usize {
        self.lock().stats.values().map(|s| s.opens).sum()
    }

    /// True when every open has been matched by a close
    pub fn all_closed(&self) -> bool {
        self.lock().stats.values().all(|s| s.opens == s.closes)
    }

    fn lock(&self) -> MutexGuard<'_, Topology> {
        // A panicking test thread must not hide the counters from the others.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_reply(&self, key: (u8, u8)) -> Option<Vec<u8>> {
        self.lock().replies.get_mut(&key)?.pop_front()
    }

    fn record<F: FnOnce(&mut DeviceStats)>(&self, key: (u8, u8), f: F) {
        f(self.lock().stats.entry(key).or_default());
    }
}

impl UsbBus for FakeBus {
    type Device = FakeBusDevice;

    fn devices(&self) -> Result<Vec<FakeBusDevice>, rusb::Error> {
        let mut topology = self.lock();
        if let Some(error) = topology.enumeration_error {
            return Err(error);
        }
        topology.enumerations += 1;
        Ok(topology
            .devices
            .iter()
            .cloned()
            .map(|fake| FakeBusDevice {
                bus: self.clone(),
                fake,
            })
            .collect())
    }
}

/// A device entry from one [`FakeBus`] enumeration
#[derive(Debug, Clone)]
pub struct FakeBusDevice {
    bus: FakeBus,
    fake: FakeDevice,
}

impl BusDevice for FakeBusDevice {
    type Io = FakeIo;

    fn bus_number(&self) -> u8 {
        self.fake.bus_number
    }

    fn address(&self) -> u8 {
        self.fake.address
    }

    fn descriptor(&self) -> Result<DeviceDescriptor, rusb::Error> {
        Ok(self.fake.descriptor())
    }

    fn open(&self) -> Result<FakeIo, rusb::Error> {
        if let Some(error) = self.fake.open_error {
            return Err(error);
        }
        self.bus.record(self.fake.key(), |s| s.opens += 1);
        Ok(FakeIo {
            bus: self.bus.clone(),
            fake: self.fake.clone(),
            writes: 0,
        })
    }
}

/// An open fake device; dropping it counts as a close
#[derive(Debug)]
pub struct FakeIo {
    bus: FakeBus,
    fake: FakeDevice,
    writes: usize,
}

impl FakeIo {
    fn write(&mut self, data: &[u8], transfer: RecordedTransfer) -> Result<usize, rusb::Error> {
        self.bus
            .record(self.fake.key(), |s| s.transfers.push(transfer));
        if let Some(error) = self.fake.transfer_error {
            return Err(error);
        }
        self.writes += 1;
        if self.writes <= self.fake.short_writes {
            return Ok(data.len().saturating_sub(1));
        }
        Ok(data.len())
    }
}

impl DeviceIo for FakeIo {
    fn read_string_ascii(&mut self, index: u8) -> Result<String, rusb::Error> {
        self.bus
            .record(self.fake.key(), |s| s.string_reads.push(index));
        if let Some(error) = self.fake.string_error {
            return Err(error);
        }
        self.fake
            .string(index)
            .cloned()
            .ok_or(rusb::Error::InvalidParam)
    }

    fn write_control(
        &mut self,
        request_type: u8,
        request: u8,
        value: u16,
        index: u16,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error> {
        self.write(
            data,
            RecordedTransfer::Control {
                request_type,
                request,
                value,
                index,
                data: data.to_vec(),
                timeout,
            },
        )
    }

    fn write_interrupt(
        &mut self,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error> {
        self.write(
            data,
            RecordedTransfer::Interrupt {
                endpoint,
                data: data.to_vec(),
                timeout,
            },
        )
    }

    fn read_interrupt(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize, rusb::Error> {
        let length = buf.len();
        self.bus.record(self.fake.key(), |s| {
            s.transfers.push(RecordedTransfer::InterruptIn {
                endpoint,
                length,
                timeout,
            })
        });
        if let Some(error) = self.fake.transfer_error {
            return Err(error);
        }
        // An empty queue behaves like a device with nothing to say
        let report = self
            .bus
            .next_reply(self.fake.key())
            .ok_or(rusb::Error::Timeout)?;
        let n = report.len().min(length);
        buf[..n].copy_from_slice(&report[..n]);
        Ok(n)
    }

    fn set_auto_detach_kernel_driver(&mut self, _enable: bool) -> Result<(), rusb::Error> {
        Err(rusb::Error::NotSupported)
    }

    fn claim_interface(&mut self, interface: u8) -> Result<(), rusb::Error> {
        self.bus
            .record(self.fake.key(), |s| s.claims.push(interface));
        Ok(())
    }

    fn release_interface(&mut self, interface: u8) -> Result<(), rusb::Error> {
        self.bus
            .record(self.fake.key(), |s| s.releases.push(interface));
        Ok(())
    }

    fn clear_halt(&mut self, endpoint: u8) -> Result<(), rusb::Error> {
        self.bus
            .record(self.fake.key(), |s| s.halts_cleared.push(endpoint));
        Ok(())
    }
}

impl Drop for FakeIo {
    fn drop(&mut self) {
        self.bus.record(self.fake.key(), |s| s.closes += 1);
    }
}

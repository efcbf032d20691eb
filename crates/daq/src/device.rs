//! Scoped device access
//!
//! [`OpenDevice`] owns an open handle for the duration of one operation and
//! undoes everything it did when dropped: endpoints it wrote to have their
//! halt condition cleared, a claimed interface is released, and the handle is
//! closed. This holds on every exit path, including early `?` returns.

use crate::bus::{BusDevice, DeviceIo};
use crate::error::{DaqError, Result};
use crate::types::clamp_descriptor_string;
use tracing::{debug, warn};

/// Direction bit of an IN endpoint address
const ENDPOINT_DIR_IN: u8 = 0x80;

/// An open device that is released when dropped
pub struct OpenDevice<H: DeviceIo> {
    io: H,
    bus: u8,
    address: u8,
    claimed_interface: Option<u8>,
    used_endpoints: Vec<u8>,
}

impl<H: DeviceIo> OpenDevice<H> {
    /// Open `device` for the lifetime of the returned guard
    pub fn open<D>(device: &D) -> Result<Self>
    where
        D: BusDevice<Io = H>,
    {
        let bus = device.bus_number();
        let address = device.address();

        let io = device.open().map_err(|source| {
            warn!(
                "Failed to open device at bus {:03} address {:03}: {}",
                bus, address, source
            );
            DaqError::Open {
                bus,
                address,
                source,
            }
        })?;

        debug!("Opened device at bus {:03} address {:03}", bus, address);

        Ok(Self {
            io,
            bus,
            address,
            claimed_interface: None,
            used_endpoints: Vec::new(),
        })
    }

    pub fn bus_number(&self) -> u8 {
        self.bus
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Read an optional string descriptor
    ///
    /// A missing index yields an empty string. The result is clamped to the
    /// descriptor buffer size.
    pub fn read_string(&mut self, index: Option<u8>) -> Result<String> {
        let Some(index) = index else {
            return Ok(String::new());
        };

        let value = self
            .io
            .read_string_ascii(index)
            .map_err(|source| DaqError::Descriptor { index, source })?;

        Ok(clamp_descriptor_string(value))
    }

    /// Claim `interface`, detaching a kernel driver if one is bound
    ///
    /// Platforms without kernel driver detach support are tolerated.
    pub fn claim_interface(&mut self, interface: u8) -> Result<()> {
        match self.io.set_auto_detach_kernel_driver(true) {
            Ok(()) | Err(rusb::Error::NotSupported) => {}
            Err(e) => {
                debug!(
                    "Could not enable kernel driver auto-detach on interface {}: {}",
                    interface, e
                );
            }
        }

        self.io
            .claim_interface(interface)
            .map_err(|source| DaqError::Open {
                bus: self.bus,
                address: self.address,
                source,
            })?;

        debug!(
            "Claimed interface {} on device {:03}:{:03}",
            interface, self.bus, self.address
        );
        self.claimed_interface = Some(interface);
        Ok(())
    }

    /// Access the raw handle for transfers, remembering `endpoint` so its
    /// halt state is cleared on release
    pub fn endpoint_io(&mut self, endpoint: u8) -> &mut H {
        self.track_endpoint(endpoint);
        &mut self.io
    }

    /// Access the raw handle for the interrupt pair with endpoint number
    /// `number`; both the IN and the OUT endpoint are cleared on release
    pub fn interrupt_pair_io(&mut self, number: u8) -> &mut H {
        let number = number & 0x0f;
        self.track_endpoint(ENDPOINT_DIR_IN | number);
        self.track_endpoint(number);
        &mut self.io
    }

    fn track_endpoint(&mut self, endpoint: u8) {
        if !self.used_endpoints.contains(&endpoint) {
            self.used_endpoints.push(endpoint);
        }
    }

    /// Access the raw handle for control transfers on endpoint 0
    pub fn control_io(&mut self) -> &mut H {
        &mut self.io
    }
}

impl<H: DeviceIo> Drop for OpenDevice<H> {
    fn drop(&mut self) {
        for endpoint in self.used_endpoints.drain(..) {
            if let Err(e) = self.io.clear_halt(endpoint) {
                debug!("Could not clear halt on endpoint {:#04x}: {}", endpoint, e);
            }
        }

        if let Some(interface) = self.claimed_interface.take() {
            if let Err(e) = self.io.release_interface(interface) {
                warn!("Failed to release interface {}: {}", interface, e);
            }
        }

        debug!(
            "Closed device at bus {:03} address {:03}",
            self.bus, self.address
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::UsbBus;
    use crate::test_utils::{FakeBus, FakeDevice};

    fn single(device: FakeDevice) -> (FakeBus, <FakeBus as UsbBus>::Device) {
        let bus = FakeBus::new(vec![device]);
        let entry = bus.devices().unwrap().remove(0);
        (bus, entry)
    }

    #[test]
    fn test_drop_closes_device() {
        let (bus, entry) = single(FakeDevice::new(0x09db, 0x008d).at(1, 4));
        {
            let _device = OpenDevice::open(&entry).unwrap();
            assert_eq!(bus.stats(1, 4).opens, 1);
            assert_eq!(bus.stats(1, 4).closes, 0);
        }
        assert_eq!(bus.stats(1, 4).closes, 1);
    }

    #[test]
    fn test_open_failure_is_reported() {
        let (bus, entry) = single(
            FakeDevice::new(0x09db, 0x008d)
                .at(2, 7)
                .unopenable(rusb::Error::Access),
        );
        let err = OpenDevice::open(&entry).err().unwrap();
        match err {
            DaqError::Open {
                bus: 2,
                address: 7,
                source: rusb::Error::Access,
            } => {}
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(bus.stats(2, 7).closes, 0);
    }

    #[test]
    fn test_missing_string_index_is_empty() {
        let (_bus, entry) = single(FakeDevice::new(0x09db, 0x008d));
        let mut device = OpenDevice::open(&entry).unwrap();
        assert_eq!(device.read_string(None).unwrap(), "");
    }

    #[test]
    fn test_invalid_string_index_is_error() {
        let (_bus, entry) = single(FakeDevice::new(0x09db, 0x008d).serial("AA11"));
        let mut device = OpenDevice::open(&entry).unwrap();
        let err = device.read_string(Some(42)).err().unwrap();
        assert!(matches!(err, DaqError::Descriptor { index: 42, .. }));
    }

    #[test]
    fn test_release_undoes_claim_and_endpoints() {
        let (bus, entry) = single(FakeDevice::new(0x09db, 0x008d).at(1, 9));
        {
            let mut device = OpenDevice::open(&entry).unwrap();
            device.claim_interface(0).unwrap();
            device.endpoint_io(0x01);
            device.endpoint_io(0x01);
        }
        let stats = bus.stats(1, 9);
        assert_eq!(stats.claims, vec![0]);
        assert_eq!(stats.releases, vec![0]);
        assert_eq!(stats.halts_cleared, vec![0x01]);
        assert_eq!(stats.closes, 1);
    }

    #[test]
    fn test_interrupt_pair_clears_in_then_out() {
        let (bus, entry) = single(FakeDevice::new(0x09db, 0x008d).at(1, 9));
        {
            let mut device = OpenDevice::open(&entry).unwrap();
            device.claim_interface(0).unwrap();
            device.interrupt_pair_io(0x81);
            device.interrupt_pair_io(1);
        }
        let stats = bus.stats(1, 9);
        assert_eq!(stats.halts_cleared, vec![0x81, 0x01]);
        assert_eq!(stats.releases, vec![0]);
    }
}

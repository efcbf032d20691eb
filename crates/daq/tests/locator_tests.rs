//! Integration tests for the device locator and DAQ handles
//!
//! Runs the locator against fabricated topologies:
//! - Vendor filtering during bulk scans
//! - Serial number resolution (vendor-agnostic, byte-exact)
//! - Lazy attribute getters and hot-swap behaviour
//! - Device release on every path

use daq::test_utils::{FakeBus, FakeDevice};
use daq::{DaqError, ErrorKind, Locator, MCC_VENDOR_ID};

fn mcc(product_id: u16, address: u8, serial: &str) -> FakeDevice {
    FakeDevice::new(MCC_VENDOR_ID, product_id)
        .at(1, address)
        .serial(serial)
        .manufacturer("MCC")
}

mod enumerate_matching {
    use super::*;

    #[test]
    fn test_other_vendors_give_empty_result() {
        let bus = FakeBus::new(vec![
            mcc(0x0082, 2, "AA11"),
            mcc(0x008d, 3, "CC33"),
            FakeDevice::new(0x1234, 0x0001).at(1, 4).serial("BB22"),
        ]);
        let locator = Locator::new(bus.clone());

        for vendor_id in [0x0000, 0x09da, 0x09dc, 0x1d6b, 0xffff] {
            let handles = locator.enumerate_matching(vendor_id).unwrap();
            assert!(handles.is_empty(), "vendor {:#06x} matched", vendor_id);
        }
        // Non-matching devices are never opened
        assert_eq!(bus.total_opens(), 0);
    }

    #[test]
    fn test_returns_each_matching_device_once() {
        let serials = ["01D7A1E8", "01D7A1E9", "01D7A1EA", "01D7A1EB", "01D7A1EC"];
        let mut devices: Vec<FakeDevice> = serials
            .iter()
            .enumerate()
            .map(|(i, serial)| mcc(0x0082, i as u8 + 2, serial))
            .collect();
        devices.insert(2, FakeDevice::new(0x046d, 0xc52b).at(1, 40).serial("NOTADAQ"));
        let bus = FakeBus::new(devices);

        let handles = Locator::new(bus.clone())
            .enumerate_matching(MCC_VENDOR_ID)
            .unwrap();

        let found: Vec<&str> = handles.iter().map(|h| h.serial()).collect();
        assert_eq!(found, serials);
        assert!(bus.all_closed());
    }

    #[test]
    fn test_empty_bus() {
        let bus = FakeBus::new(Vec::new());
        let handles = Locator::new(bus).enumerate_matching(MCC_VENDOR_ID).unwrap();
        assert!(handles.is_empty());
    }

    #[test]
    fn test_unopenable_device_is_skipped_not_fatal() {
        let bus = FakeBus::new(vec![
            mcc(0x0082, 2, "AA11").unopenable(rusb::Error::Access),
            mcc(0x0082, 3, "AA12"),
        ]);
        let locator = Locator::new(bus.clone());

        let scan = locator.scan(MCC_VENDOR_ID).unwrap();
        assert_eq!(scan.handles.len(), 1);
        assert_eq!(scan.handles[0].serial(), "AA12");
        assert_eq!(scan.skipped.len(), 1);
        assert_eq!(scan.skipped[0].error.kind(), ErrorKind::OpenFailure);
        assert!(bus.all_closed());
    }

    #[test]
    fn test_unreadable_serial_is_skipped() {
        let bus = FakeBus::new(vec![
            mcc(0x0082, 2, "AA11").unreadable_strings(rusb::Error::Pipe),
        ]);
        let scan = Locator::new(bus.clone()).scan(MCC_VENDOR_ID).unwrap();

        assert!(scan.handles.is_empty());
        assert_eq!(
            scan.skipped[0].error.kind(),
            ErrorKind::DescriptorReadFailure
        );
        // Opened for the read, then released
        assert_eq!(bus.stats(1, 2).opens, 1);
        assert_eq!(bus.stats(1, 2).closes, 1);
    }

    #[test]
    fn test_rescans_on_every_call() {
        let bus = FakeBus::new(vec![mcc(0x0082, 2, "AA11")]);
        let locator = Locator::new(bus.clone());

        assert_eq!(locator.enumerate_matching(MCC_VENDOR_ID).unwrap().len(), 1);
        bus.replace_devices(vec![mcc(0x0082, 2, "AA11"), mcc(0x0082, 3, "AA12")]);
        assert_eq!(locator.enumerate_matching(MCC_VENDOR_ID).unwrap().len(), 2);
        assert_eq!(bus.enumerations(), 2);
    }
}

mod resolve_by_serial {
    use super::*;

    #[test]
    fn test_resolve_is_idempotent() {
        let bus = FakeBus::new(vec![
            mcc(0x0082, 2, "AA11").product("USB-1208FS"),
            mcc(0x008d, 3, "CC33").product("USB-TEMP"),
        ]);
        let locator = Locator::new(bus);

        let first = locator.resolve_by_serial("CC33").unwrap();
        let second = locator.resolve_by_serial("CC33").unwrap();
        assert_eq!(first.descriptor, second.descriptor);

        let handle = locator.handle("CC33");
        assert_eq!(handle.info().unwrap(), handle.info().unwrap());
    }

    #[test]
    fn test_unknown_serial_is_not_found() {
        let bus = FakeBus::new(vec![mcc(0x0082, 2, "AA11")]);
        let err = Locator::new(bus).resolve_by_serial("ZZ99").unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DeviceNotFound);
        assert!(matches!(
            err,
            DaqError::DeviceNotFound { ref serial, unreadable: 0 } if serial == "ZZ99"
        ));
    }

    #[test]
    fn test_first_match_in_enumeration_order_wins() {
        let bus = FakeBus::new(vec![
            mcc(0x0082, 2, "DUP"),
            mcc(0x008d, 3, "DUP"),
        ]);
        let resolved = Locator::new(bus).resolve_by_serial("DUP").unwrap();
        assert_eq!(resolved.descriptor.product_id, 0x0082);
        assert_eq!(resolved.descriptor.address, 2);
    }

    #[test]
    fn test_devices_without_serial_are_not_opened() {
        let bus = FakeBus::new(vec![
            FakeDevice::new(0x1d6b, 0x0002).at(1, 1),
            mcc(0x0082, 2, "AA11"),
        ]);
        Locator::new(bus.clone()).resolve_by_serial("AA11").unwrap();

        assert_eq!(bus.stats(1, 1).opens, 0);
        assert_eq!(bus.stats(1, 2).opens, 1);
        assert!(bus.all_closed());
    }

    #[test]
    fn test_scenario_two_vendors() {
        let bus = FakeBus::new(vec![
            FakeDevice::new(MCC_VENDOR_ID, 0x0082)
                .at(1, 2)
                .serial("AA11")
                .product("USB-1208FS"),
            FakeDevice::new(0x1234, 0x0001).at(1, 3).serial("BB22"),
        ]);
        let locator = Locator::new(bus);

        let handles = locator.enumerate_matching(MCC_VENDOR_ID).unwrap();
        assert_eq!(handles.len(), 1);
        assert_eq!(handles[0].serial(), "AA11");

        // Resolution matches on serial alone, whatever the vendor
        let resolved = locator.resolve_by_serial("BB22").unwrap();
        assert_eq!(resolved.descriptor.vendor_id, 0x1234);

        assert!(locator.resolve_by_serial("CC33").unwrap_err().is_not_found());
    }
}

mod attributes {
    use super::*;

    #[test]
    fn test_missing_strings_are_empty() {
        let bus = FakeBus::new(vec![
            FakeDevice::new(MCC_VENDOR_ID, 0x0082).at(1, 2).serial("AA11"),
        ]);
        let handle = Locator::new(bus).handle("AA11");

        assert_eq!(handle.manufacturer().unwrap(), "");
        assert_eq!(handle.product().unwrap(), "");
        assert_eq!(handle.vendor_id().unwrap(), MCC_VENDOR_ID);
        assert_eq!(handle.product_id().unwrap(), 0x0082);
    }

    #[test]
    fn test_empty_serial_fails_every_getter() {
        let bus = FakeBus::new(vec![mcc(0x0082, 2, "AA11")]);
        let handle = Locator::new(bus).handle("");

        assert!(handle.vendor_id().unwrap_err().is_not_found());
        assert!(handle.product_id().unwrap_err().is_not_found());
        assert!(handle.manufacturer().unwrap_err().is_not_found());
        assert!(handle.product().unwrap_err().is_not_found());
        assert!(handle.info().unwrap_err().is_not_found());
    }

    #[test]
    fn test_unplugged_device_is_not_found_not_stale() {
        let bus = FakeBus::new(vec![mcc(0x0082, 2, "AA11").product("USB-1208FS")]);
        let handle = Locator::new(bus.clone()).handle("AA11");
        assert_eq!(handle.product().unwrap(), "USB-1208FS");

        bus.replace_devices(Vec::new());
        assert!(handle.product().unwrap_err().is_not_found());
        assert!(handle.vendor_id().unwrap_err().is_not_found());
    }

    #[test]
    fn test_replugged_device_is_found_again() {
        let bus = FakeBus::new(vec![mcc(0x0082, 2, "AA11")]);
        let handle = Locator::new(bus.clone()).handle("AA11");
        assert_eq!(handle.product_id().unwrap(), 0x0082);

        // Same card re-enumerated at a new address on another bus
        bus.replace_devices(vec![
            FakeDevice::new(MCC_VENDOR_ID, 0x0082)
                .at(2, 9)
                .serial("AA11")
                .manufacturer("MCC"),
        ]);
        let info = handle.info().unwrap();
        assert_eq!(info.bus_number, 2);
        assert_eq!(info.device_address, 9);
        assert_eq!(info.manufacturer, "MCC");
    }

    #[test]
    fn test_long_strings_are_truncated() {
        let long = "P".repeat(300);
        let bus = FakeBus::new(vec![mcc(0x0082, 2, "AA11").product(&long)]);
        let product = Locator::new(bus).handle("AA11").product().unwrap();

        assert_eq!(product.len(), daq::STRING_DESCRIPTOR_BUFFER_LEN - 1);
    }

    #[test]
    fn test_enumeration_failure_surfaces_from_getters() {
        let bus = FakeBus::new(vec![mcc(0x0082, 2, "AA11")]);
        let handle = Locator::new(bus.clone()).handle("AA11");
        bus.fail_enumeration(rusb::Error::NoDevice);

        assert_eq!(
            handle.vendor_id().unwrap_err().kind(),
            ErrorKind::Enumeration
        );
    }
}

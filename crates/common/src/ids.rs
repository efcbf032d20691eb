//! USB vendor/product ID parsing

use crate::{Error, Result};

/// Parse a 16-bit USB ID written as hex, with or without a `0x` prefix
///
/// ```
/// assert_eq!(common::parse_usb_id("0x09db").unwrap(), 0x09db);
/// assert_eq!(common::parse_usb_id("09DB").unwrap(), 0x09db);
/// ```
pub fn parse_usb_id(value: &str) -> Result<u16> {
    let invalid = |reason: &str| Error::InvalidId {
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = value.trim();
    let hex_part = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    if hex_part.is_empty() || hex_part.len() > 4 {
        return Err(invalid("hex part must be 1-4 digits"));
    }

    u16::from_str_radix(hex_part, 16).map_err(|_| invalid("not a valid hex number"))
}

/// Format a USB ID the way `lsusb` does
pub fn format_usb_id(id: u16) -> String {
    format!("{:04x}", id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid() {
        assert_eq!(parse_usb_id("0x09db").unwrap(), 0x09db);
        assert_eq!(parse_usb_id("0X09DB").unwrap(), 0x09db);
        assert_eq!(parse_usb_id("9db").unwrap(), 0x09db);
        assert_eq!(parse_usb_id(" 0xffff ").unwrap(), 0xffff);
        assert_eq!(parse_usb_id("0").unwrap(), 0);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(parse_usb_id("").is_err());
        assert!(parse_usb_id("0x").is_err());
        assert!(parse_usb_id("0x12345").is_err());
        assert!(parse_usb_id("0xGHIJ").is_err());
        assert!(parse_usb_id("-1").is_err());
    }

    #[test]
    fn test_invalid_message_names_value() {
        let err = parse_usb_id("0xZZ").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("0xZZ"));
        assert!(msg.contains("not a valid hex number"));
    }

    #[test]
    fn test_format() {
        assert_eq!(format_usb_id(0x09db), "09db");
        assert_eq!(format_usb_id(0x8d), "008d");
    }
}

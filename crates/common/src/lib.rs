//! Common utilities for mcdaq
//!
//! Shared ambient pieces used by the binaries: the application error type,
//! tracing setup, and parsing of USB vendor/product IDs.

pub mod error;
pub mod ids;
pub mod logging;

pub use error::{Error, Result};
pub use ids::{format_usb_id, parse_usb_id};
pub use logging::{LOG_LEVELS, setup_logging};

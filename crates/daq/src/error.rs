//! DAQ error types

use thiserror::Error;

/// Errors produced while locating or talking to a DAQ device
///
/// Every failure is reported explicitly; a successful empty value (for
/// example a device without a manufacturer string) is never an error.
#[derive(Debug, Clone, Error)]
pub enum DaqError {
    /// No device on the bus carries the requested serial number
    #[error("No device with serial number '{serial}' was found ({unreadable} device(s) could not be read)")]
    DeviceNotFound { serial: String, unreadable: usize },

    /// The device was enumerated but could not be opened
    #[error("Failed to open device at bus {bus:03} address {address:03}: {source}")]
    Open {
        bus: u8,
        address: u8,
        source: rusb::Error,
    },

    /// A string descriptor could not be read from an opened device
    #[error("Failed to read string descriptor {index}: {source}")]
    Descriptor { index: u8, source: rusb::Error },

    /// A control or interrupt transfer returned an I/O error
    #[error("Transfer to endpoint {endpoint:#04x} failed: {source}")]
    Transfer { endpoint: u8, source: rusb::Error },

    /// A transfer completed but wrote fewer bytes than requested
    #[error("Short write to endpoint {endpoint:#04x}: wrote {written} of {expected} bytes")]
    ShortWrite {
        endpoint: u8,
        written: usize,
        expected: usize,
    },

    /// The USB context could not be created
    #[error("Failed to initialise USB context: {0}")]
    Context(#[source] rusb::Error),

    /// The bus device list could not be obtained
    #[error("Failed to enumerate USB devices: {0}")]
    Enumeration(#[source] rusb::Error),

    /// A blink repeat count of zero was requested
    #[error("Blink count must be at least 1")]
    InvalidCount,

    /// A transfer timeout of zero was requested; libusb treats it as unlimited
    #[error("Transfer timeout must be greater than 0")]
    InvalidTimeout,

    /// A channel outside the range the device supports
    #[error("Invalid channel {channel}: {reason}")]
    InvalidChannel { channel: u8, reason: &'static str },

    /// The device carrying the serial number is not the expected model
    #[error("Device '{serial}' has product ID {product_id:#06x}, expected {expected:#06x}")]
    UnsupportedProduct {
        serial: String,
        product_id: u16,
        expected: u16,
    },

    /// No input report for the command arrived
    #[error("No reply to command {command:#04x} after {attempts} read(s)")]
    NoReply { command: u8, attempts: usize },

    /// The reply report was shorter than the command's reply format
    #[error("Reply to command {command:#04x} too short: got {received} of {expected} bytes")]
    ShortReply {
        command: u8,
        received: usize,
        expected: usize,
    },

    /// The device stayed busy for every status poll
    #[error("Device still busy after {polls} status poll(s)")]
    Busy { polls: u32 },
}

/// Coarse classification of [`DaqError`] for callers that only care about
/// what went wrong, not the details
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    DeviceNotFound,
    OpenFailure,
    DescriptorReadFailure,
    TransferFailure,
    Enumeration,
    InvalidArgument,
}

impl DaqError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            DaqError::DeviceNotFound { .. } => ErrorKind::DeviceNotFound,
            DaqError::Open { .. } => ErrorKind::OpenFailure,
            DaqError::Descriptor { .. } => ErrorKind::DescriptorReadFailure,
            DaqError::Transfer { .. } | DaqError::ShortWrite { .. } => ErrorKind::TransferFailure,
            DaqError::Context(_) | DaqError::Enumeration(_) => ErrorKind::Enumeration,
            DaqError::NoReply { .. } | DaqError::ShortReply { .. } | DaqError::Busy { .. } => {
                ErrorKind::TransferFailure
            }
            DaqError::InvalidCount
            | DaqError::InvalidTimeout
            | DaqError::InvalidChannel { .. }
            | DaqError::UnsupportedProduct { .. } => ErrorKind::InvalidArgument,
        }
    }

    /// True when the error means the device simply is not there
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::DeviceNotFound
    }
}

/// Type alias for DAQ results
pub type Result<T> = std::result::Result<T, DaqError>;

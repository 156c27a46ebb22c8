//! Error types for dome drive operations.

use thiserror::Error;

/// Result type alias for dome drive operations.
pub type Result<T> = std::result::Result<T, DriveError>;

/// Error types for AMC drive communication and motion control.
#[derive(Error, Debug)]
pub enum DriveError {
    /// Serial port communication error
    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation attempted before the link was established
    #[error("Not connected")]
    NotConnected,

    /// Expected bytes did not arrive within the timeout window
    #[error("Communication timeout")]
    Timeout,

    /// The controller reported a protocol-level fault in the response header
    #[error("Bad response: status byte {status:#04x}")]
    BadResponse {
        /// Status byte returned in the response header (1 means OK)
        status: u8,
    },

    /// Response checksum validation failed (only when enforcement is enabled)
    #[error("Checksum mismatch: computed {computed:#06x}, received {received:#06x}")]
    ChecksumMismatch {
        /// Checksum computed over the received bytes
        computed: u16,
        /// Checksum carried by the frame
        received: u16,
    },

    /// Response payload was shorter than the operation requires
    #[error("Short payload: expected at least {expected} bytes, got {actual}")]
    ShortPayload {
        /// Minimum payload length the operation requires
        expected: usize,
        /// Payload length actually received
        actual: usize,
    },

    /// Motion did not converge after the retry policy was exhausted
    #[error("Command failed")]
    CommandFailed,

    /// Configuration store error
    #[error("Config error: {0}")]
    Config(String),
}

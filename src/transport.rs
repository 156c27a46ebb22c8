//! Byte transport abstraction over the serial link.
//!
//! The protocol layer only needs purge/send/flush plus time-bounded single
//! byte reads, so that is the whole trait; the host integration layer owns
//! the port lifetime beyond that.

use std::io::Read;
use std::time::Duration;

use serialport::SerialPort;

use crate::constants::{BAUD_RATE, BYTE_TIMEOUT_MS};
use crate::error::{DriveError, Result};

/// Minimal transport interface consumed by the frame codec.
pub trait Transport {
    /// Drop any stale bytes in the receive (and transmit) buffers.
    fn purge(&mut self) -> Result<()>;

    /// Write all bytes of a request.
    fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Flush the transmit path.
    fn flush(&mut self) -> Result<()>;

    /// Read a single byte, waiting at most `timeout`.
    ///
    /// Returns [`DriveError::Timeout`] if no byte arrives within the window.
    fn read_byte(&mut self, timeout: Duration) -> Result<u8>;
}

/// [`Transport`] backed by a real serial port (115200 8N1).
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
}

impl SerialTransport {
    /// Open the named serial port with the protocol's fixed settings.
    pub fn open(port_name: &str) -> Result<Self> {
        let port = serialport::new(port_name, BAUD_RATE)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(Duration::from_millis(BYTE_TIMEOUT_MS))
            .open()?;
        Ok(SerialTransport { port })
    }

    /// List available serial ports.
    pub fn list_ports() -> Result<Vec<serialport::SerialPortInfo>> {
        Ok(serialport::available_ports()?)
    }
}

impl Transport for SerialTransport {
    fn purge(&mut self) -> Result<()> {
        self.port.clear(serialport::ClearBuffer::All)?;
        Ok(())
    }

    fn send(&mut self, data: &[u8]) -> Result<()> {
        use std::io::Write;
        self.port.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        use std::io::Write;
        self.port.flush()?;
        Ok(())
    }

    fn read_byte(&mut self, timeout: Duration) -> Result<u8> {
        self.port.set_timeout(timeout)?;
        let mut byte = [0u8; 1];
        match self.port.read_exact(&mut byte) {
            Ok(()) => Ok(byte[0]),
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Err(DriveError::Timeout),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::collections::VecDeque;
    use std::time::Duration;

    use crate::error::{DriveError, Result};

    use super::Transport;

    /// Scripted transport: responses are queued up front, requests are
    /// captured for inspection. An empty queue reads as a timeout.
    #[derive(Default)]
    pub struct MockTransport {
        pub rx: VecDeque<u8>,
        pub tx: Vec<u8>,
        pub purges: usize,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue raw response bytes.
        pub fn queue(&mut self, bytes: &[u8]) {
            self.rx.extend(bytes.iter().copied());
        }
    }

    impl Transport for MockTransport {
        fn purge(&mut self) -> Result<()> {
            // stale-buffer purge must not eat scripted responses
            self.purges += 1;
            Ok(())
        }

        fn send(&mut self, data: &[u8]) -> Result<()> {
            self.tx.extend_from_slice(data);
            Ok(())
        }

        fn flush(&mut self) -> Result<()> {
            Ok(())
        }

        fn read_byte(&mut self, _timeout: Duration) -> Result<u8> {
            self.rx.pop_front().ok_or(DriveError::Timeout)
        }
    }
}

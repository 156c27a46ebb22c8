//! Register command layer: typed operations over the frame codec.
//!
//! Every call is one half-duplex round trip: purge stale receive bytes,
//! encode and send the request, flush, then decode the response. A 4-bit
//! sequence counter shared by all requests of a session is stamped into the
//! control byte and advances on every command; the drive echoes but never
//! checks it, so neither do we.

use std::time::Duration;

use log::trace;

use crate::constants::*;
use crate::error::{DriveError, Result};
use crate::frame::{decode_response, encode_request, ResponseFrame};
use crate::transport::Transport;
use crate::types::{Direction, ProtocolVariant, RegisterAddress, StatusWord};

/// Register-access link to the drive.
pub struct DriveLink<T: Transport> {
    transport: T,
    seq: u8,
    variant: ProtocolVariant,
    verify_crc: bool,
    timeout: Duration,
}

impl<T: Transport> DriveLink<T> {
    pub fn new(transport: T, variant: ProtocolVariant, verify_crc: bool) -> Self {
        DriveLink {
            transport,
            seq: 0,
            variant,
            verify_crc,
            timeout: Duration::from_millis(BYTE_TIMEOUT_MS),
        }
    }

    pub fn variant(&self) -> ProtocolVariant {
        self.variant
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn next_seq(&mut self) -> u8 {
        let seq = self.seq;
        self.seq = (self.seq + 1) & 0x0F;
        seq
    }

    fn round_trip(&mut self, request: Vec<u8>) -> Result<ResponseFrame> {
        self.transport.purge()?;
        trace!("sending {:02X?}", request);
        self.transport.send(&request)?;
        self.transport.flush()?;
        decode_response(&mut self.transport, self.timeout, self.verify_crc)
    }

    /// Read a register; returns the raw payload bytes.
    pub fn read_register(&mut self, register: RegisterAddress) -> Result<Vec<u8>> {
        let seq = self.next_seq();
        let request = encode_request(Direction::Read, seq, register, &[]);
        let response = self.round_trip(request)?;
        Ok(response.payload)
    }

    /// Write a register with the given payload words.
    pub fn write_register(&mut self, register: RegisterAddress, words: &[u16]) -> Result<()> {
        let seq = self.next_seq();
        let request = encode_request(Direction::Write, seq, register, words);
        self.round_trip(request)?;
        Ok(())
    }

    /// Unlock command writes; required once after connecting.
    pub fn gain_write_access(&mut self) -> Result<()> {
        self.write_register(REG_WRITE_ACCESS, &[WRITE_ACCESS_KEY])
    }

    /// Enable the motor power stage. Required before any motion command.
    pub fn enable_bridge(&mut self) -> Result<()> {
        self.write_register(REG_CONTROL, &[CONTROL_ENABLE_BRIDGE])
    }

    /// Disable the motor power stage. Done unconditionally on disconnect.
    pub fn disable_bridge(&mut self) -> Result<()> {
        self.write_register(REG_CONTROL, &[CONTROL_DISABLE_BRIDGE])
    }

    /// Start the drive's homing sequence.
    pub fn home(&mut self) -> Result<()> {
        self.write_register(REG_CONTROL, &[CONTROL_HOME])
    }

    /// Stop any motion in progress.
    pub fn stop(&mut self) -> Result<()> {
        self.write_register(REG_CONTROL, &[CONTROL_STOP])
    }

    /// Clear latched event flags on the controller.
    pub fn reset_events(&mut self) -> Result<()> {
        self.write_register(REG_CONTROL, &[CONTROL_RESET_EVENTS])
    }

    /// Latch the measured-position register into the tick origin.
    pub fn sync(&mut self) -> Result<()> {
        self.write_register(REG_CONTROL, &[CONTROL_SYNC])
    }

    /// Write the measured-position register.
    pub fn set_measured_position(&mut self, ticks: u32) -> Result<()> {
        self.write_register(REG_SET_POSITION, &split_words(ticks))
    }

    /// Redefine the controller's tick origin to `ticks`.
    ///
    /// Two sequential writes; there is no rollback of the first if the
    /// second fails.
    pub fn sync_ticks_position(&mut self, ticks: u32) -> Result<()> {
        self.set_measured_position(ticks)?;
        self.sync()
    }

    /// Command a move to an absolute tick position.
    pub fn goto_ticks(&mut self, ticks: u32) -> Result<()> {
        self.write_register(REG_GOTO, &split_words(ticks))
    }

    /// Current position in encoder ticks.
    pub fn get_position_ticks(&mut self) -> Result<u32> {
        let payload = self.read_register(REG_POSITION)?;
        if payload.len() < 4 {
            return Err(DriveError::ShortPayload {
                expected: 4,
                actual: payload.len(),
            });
        }
        Ok(u32::from_le_bytes([
            payload[0], payload[1], payload[2], payload[3],
        ]))
    }

    /// Read one of the status sub-registers.
    pub fn get_status(&mut self, offset: u8) -> Result<StatusWord> {
        let register = RegisterAddress::new(STATUS_INDEX, offset, STATUS_WORDS);
        let payload = self.read_register(register)?;
        if payload.len() < 2 {
            return Err(DriveError::ShortPayload {
                expected: 2,
                actual: payload.len(),
            });
        }
        let word = StatusWord(u16::from_le_bytes([payload[0], payload[1]]));
        trace!("status register {:#04x} = {:#06x}", offset, word.0);
        Ok(word)
    }

    /// Read the status sub-register carrying the motion bits for this
    /// firmware generation.
    pub fn get_drive_status(&mut self) -> Result<StatusWord> {
        self.get_status(self.variant.status_offset())
    }

    /// Firmware name string, at offset 32 of the firmware info block.
    pub fn get_firmware_version(&mut self) -> Result<String> {
        let payload = self.read_register(REG_FIRMWARE)?;
        Ok(string_at(&payload, 32))
    }

    /// Control board name, at offset 2 of the product info block.
    pub fn get_product_info(&mut self) -> Result<String> {
        let payload = self.read_register(REG_PRODUCT_INFO)?;
        Ok(string_at(&payload, 2))
    }
}

/// Split a 32-bit value into the two little-endian payload words the
/// position registers expect.
fn split_words(value: u32) -> [u16; 2] {
    [(value & 0xFFFF) as u16, (value >> 16) as u16]
}

/// Extract a NUL-terminated ASCII string starting at `offset`.
fn string_at(payload: &[u8], offset: usize) -> String {
    let bytes = payload.get(offset..).unwrap_or(&[]);
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

//! Frame codec for the drive's register-access protocol.
//!
//! A request is a 6-byte header (`SOF`, device address, control byte,
//! register index, register offset, word count) followed by a big-endian
//! CRC-16/XMODEM of those 6 bytes, then, for writes, the payload words in
//! little-endian byte order followed by a big-endian CRC of the payload
//! alone. Responses mirror the layout, with header byte 3 carrying a status
//! flag (1 = OK) and byte 5 the word count of the returned payload.

use std::time::Duration;

use log::{debug, trace};

use crate::checksum::crc16_xmodem;
use crate::constants::{DEVICE_ADDRESS, SOF};
use crate::error::{DriveError, Result};
use crate::transport::Transport;
use crate::types::{Direction, RegisterAddress};

/// Byte position of the status flag in a response header.
const STATUS_BYTE: usize = 3;
/// Byte position of the payload word count in a response header.
const WORD_COUNT_BYTE: usize = 5;
/// Header length including its CRC.
pub const HEADER_LEN: usize = 8;

/// Parsed response frame.
#[derive(Debug, Clone)]
pub struct ResponseFrame {
    /// Control byte echoed by the drive
    pub control: u8,
    /// Status flag from header byte 3 (1 = OK)
    pub status: u8,
    /// Returned payload, `word_count * 2` bytes
    pub payload: Vec<u8>,
}

/// Build a request frame for the given register and optional payload words.
///
/// The sequence nibble is caller-supplied; the register command layer owns
/// the wrapping counter shared by all requests of a session.
pub fn encode_request(
    direction: Direction,
    seq: u8,
    register: RegisterAddress,
    payload: &[u16],
) -> Vec<u8> {
    debug_assert_eq!(payload.is_empty(), direction == Direction::Read);

    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len() * 2 + 2);
    frame.push(SOF);
    frame.push(DEVICE_ADDRESS);
    frame.push(direction.bits() | ((seq & 0x0F) << 2));
    frame.push(register.index);
    frame.push(register.offset);
    frame.push(register.words);

    let header_crc = crc16_xmodem(&frame[..6]);
    frame.extend_from_slice(&header_crc.to_be_bytes());

    if !payload.is_empty() {
        let start = frame.len();
        for word in payload {
            frame.extend_from_slice(&word.to_le_bytes());
        }
        let payload_crc = crc16_xmodem(&frame[start..]);
        frame.extend_from_slice(&payload_crc.to_be_bytes());
    }

    frame
}

/// Read and parse one response frame from the transport.
///
/// Every byte read is individually bounded by `timeout`, so a stalled link
/// surfaces as [`DriveError::Timeout`] rather than a hang. The header and
/// payload CRCs are recomputed and logged; they are only enforced when
/// `verify_crc` is set, matching the legacy non-enforcing behavior of the
/// drive firmware in the field.
pub fn decode_response<T: Transport>(
    transport: &mut T,
    timeout: Duration,
    verify_crc: bool,
) -> Result<ResponseFrame> {
    let mut header = [0u8; HEADER_LEN];
    for byte in header.iter_mut() {
        *byte = transport.read_byte(timeout)?;
    }

    let header_crc = crc16_xmodem(&header[..6]);
    let received_header_crc = u16::from_be_bytes([header[6], header[7]]);
    trace!(
        "response header {:02X?}, crc computed {:04X} received {:04X}",
        header,
        header_crc,
        received_header_crc
    );
    if verify_crc && header_crc != received_header_crc {
        return Err(DriveError::ChecksumMismatch {
            computed: header_crc,
            received: received_header_crc,
        });
    }

    let status = header[STATUS_BYTE];
    if status != 1 {
        debug!("drive reported fault, status byte {:#04x}", status);
        return Err(DriveError::BadResponse { status });
    }

    let data_len = header[WORD_COUNT_BYTE] as usize * 2;
    let mut payload = Vec::with_capacity(data_len);
    if data_len > 0 {
        for _ in 0..data_len {
            payload.push(transport.read_byte(timeout)?);
        }
        let crc_hi = transport.read_byte(timeout)?;
        let crc_lo = transport.read_byte(timeout)?;

        let payload_crc = crc16_xmodem(&payload);
        let received_payload_crc = u16::from_be_bytes([crc_hi, crc_lo]);
        trace!(
            "response payload {:02X?}, crc computed {:04X} received {:04X}",
            payload,
            payload_crc,
            received_payload_crc
        );
        if verify_crc && payload_crc != received_payload_crc {
            return Err(DriveError::ChecksumMismatch {
                computed: payload_crc,
                received: received_payload_crc,
            });
        }
    }

    Ok(ResponseFrame {
        control: header[2],
        status,
        payload,
    })
}

/// Build a synthetic response frame, used by tests to script a drive.
#[cfg(test)]
pub(crate) fn build_response(control: u8, status: u8, payload: &[u8]) -> Vec<u8> {
    assert_eq!(payload.len() % 2, 0);
    let mut frame = vec![
        SOF,
        DEVICE_ADDRESS,
        control,
        status,
        0x00,
        (payload.len() / 2) as u8,
    ];
    let header_crc = crc16_xmodem(&frame);
    frame.extend_from_slice(&header_crc.to_be_bytes());
    if !payload.is_empty() {
        frame.extend_from_slice(payload);
        frame.extend_from_slice(&crc16_xmodem(payload).to_be_bytes());
    }
    frame
}

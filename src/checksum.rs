//! CRC-16/XMODEM checksum used by the drive's register protocol.
//!
//! Polynomial 0x1021, initial value 0x0000, no input/output reflection and
//! no final XOR. Both the 6-byte frame header and the payload carry their
//! own checksum, appended big-endian.

/// Compute the CRC-16/XMODEM of a byte slice.
pub fn crc16_xmodem(data: &[u8]) -> u16 {
    let mut crc: u16 = 0x0000;
    for &byte in data {
        crc ^= (byte as u16) << 8;
        for _ in 0..8 {
            if crc & 0x8000 != 0 {
                crc = (crc << 1) ^ 0x1021;
            } else {
                crc <<= 1;
            }
        }
    }
    crc
}

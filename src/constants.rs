//! Protocol constants for AMC drive communication.
//!
//! This module defines the framing bytes, the fixed register map, the drive
//! status bit-field and the timing parameters of the serial protocol.

use crate::types::RegisterAddress;

/// Start-of-frame byte
pub const SOF: u8 = 0xA5;

/// Fixed device address of the drive on the serial bus
pub const DEVICE_ADDRESS: u8 = 0x3F;

/// Baud rate (115200 bps, 8N1)
pub const BAUD_RATE: u32 = 115_200;

/// Per-byte read timeout in milliseconds
pub const BYTE_TIMEOUT_MS: u64 = 1000;

/// Window after a motion command during which the drive is assumed moving,
/// masking the controller's status lag right after the command is issued
pub const SETTLE_TIME_MS: u64 = 2000;

/// Default encoder ticks per full dome revolution
pub const DEFAULT_TICKS_PER_REV: u32 = 969_840;

// Register map. Index/offset/word-count triplets from the drive manual,
// section 2.3.1 (control parameters) and 2.3.3 (monitor commands).

/// Write-access register; writing [`WRITE_ACCESS_KEY`] unlocks command writes
pub const REG_WRITE_ACCESS: RegisterAddress = RegisterAddress::new(0x07, 0x00, 0x01);

/// Key value written to gain write access
pub const WRITE_ACCESS_KEY: u16 = 0x000F;

/// Control parameter register; bridge, home, stop, sync and reset-events are
/// all bit writes to this register
pub const REG_CONTROL: RegisterAddress = RegisterAddress::new(0x01, 0x00, 0x01);

/// Enable the motor power stage
pub const CONTROL_ENABLE_BRIDGE: u16 = 0x0000;
/// Disable the motor power stage
pub const CONTROL_DISABLE_BRIDGE: u16 = 0x0001;
/// Redefine the internal tick origin from the measured-position register
pub const CONTROL_SYNC: u16 = 0x0008;
/// Start the homing sequence
pub const CONTROL_HOME: u16 = 0x0020;
/// Stop any motion in progress
pub const CONTROL_STOP: u16 = 0x0040;
/// Clear latched event flags
pub const CONTROL_RESET_EVENTS: u16 = 0x1000;

/// Measured-position register, written before a sync to move the tick origin
pub const REG_SET_POSITION: RegisterAddress = RegisterAddress::new(0x39, 0x00, 0x02);

/// Target-position register; writing starts a goto
pub const REG_GOTO: RegisterAddress = RegisterAddress::new(0x45, 0x00, 0x02);

/// Current position in encoder ticks
pub const REG_POSITION: RegisterAddress = RegisterAddress::new(0x12, 0x00, 0x02);

/// Product information block (control board name at payload offset 2)
pub const REG_PRODUCT_INFO: RegisterAddress = RegisterAddress::new(0x8C, 0x00, 0x31);

/// Firmware information block (firmware name at payload offset 32)
pub const REG_FIRMWARE: RegisterAddress = RegisterAddress::new(0x0B, 0x00, 0x80);

/// Status register index; the sub-register is selected by the offset byte
pub const STATUS_INDEX: u8 = 0x02;
/// Status registers are one word wide
pub const STATUS_WORDS: u8 = 0x01;

/// Drive bridge status sub-register
pub const STATUS_BRIDGE_OFFSET: u8 = 0x00;
/// Drive protection status sub-register
pub const STATUS_DRIVE_PROT_OFFSET: u8 = 0x01;
/// System protection status sub-register
pub const STATUS_SYS_PROT_OFFSET: u8 = 0x02;
/// Drive status word 1
pub const STATUS_1_OFFSET: u8 = 0x03;
/// Drive status word 2 (motion and homing bits live here on current firmware)
pub const STATUS_2_OFFSET: u8 = 0x04;
/// Drive status word 3
pub const STATUS_3_OFFSET: u8 = 0x05;

// Drive status bit-field, manual table 2.12.

/// Zero-velocity bit; on current firmware 0 means the dome is moving
pub const STATUS_MOVING: u16 = 0x0001;
/// Target position reached
pub const STATUS_POSITION_REACHED: u16 = 0x0002;
/// Home sensor active
pub const STATUS_IN_HOME_POSITION: u16 = 0x0040;
/// Homing sequence in progress
pub const STATUS_HOMING: u16 = 0x1000;
/// Homing sequence finished
pub const STATUS_HOMING_COMPLETE: u16 = 0x4000;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_TICKS_PER_REV, STATUS_1_OFFSET, STATUS_2_OFFSET, STATUS_HOMING,
    STATUS_HOMING_COMPLETE, STATUS_IN_HOME_POSITION, STATUS_MOVING,
};
use crate::error::Result;

/// Transfer direction encoded in the control byte of a request frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    /// Direction bits of the control byte.
    pub fn bits(self) -> u8 {
        match self {
            Direction::Read => 0x01,
            Direction::Write => 0x02,
        }
    }
}

/// Index/offset/word-count triplet addressing a drive register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterAddress {
    pub index: u8,
    pub offset: u8,
    pub words: u8,
}

impl RegisterAddress {
    pub const fn new(index: u8, offset: u8, words: u8) -> Self {
        RegisterAddress {
            index,
            offset,
            words,
        }
    }

    /// Same register with a different offset byte (status sub-registers).
    pub const fn at_offset(self, offset: u8) -> Self {
        RegisterAddress { offset, ..self }
    }
}

/// Firmware generation of the drive.
///
/// Two incompatible status-word interpretations exist across firmware
/// generations; the variant is selected at construction time and
/// parameterizes both the status decoding and the sub-register polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolVariant {
    /// Older firmware: the MOVING bit is set while the dome is in motion.
    Legacy,
    /// Current firmware: the MOVING bit is a zero-velocity flag (0 while
    /// moving), and a started-but-not-yet-moving homing sequence must also
    /// count as motion.
    Current,
}

impl Default for ProtocolVariant {
    fn default() -> Self {
        ProtocolVariant::Current
    }
}

impl ProtocolVariant {
    /// Offset of the status sub-register carrying the motion/homing bits.
    pub fn status_offset(self) -> u8 {
        match self {
            ProtocolVariant::Legacy => STATUS_1_OFFSET,
            ProtocolVariant::Current => STATUS_2_OFFSET,
        }
    }
}

/// Raw 16-bit drive status word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusWord(pub u16);

impl StatusWord {
    /// Whether the dome is in motion, per the firmware generation's bit
    /// semantics.
    pub fn is_moving(self, variant: ProtocolVariant) -> bool {
        match variant {
            ProtocolVariant::Legacy => self.0 & STATUS_MOVING != 0,
            ProtocolVariant::Current => {
                if self.0 & STATUS_MOVING == 0 {
                    // zero-velocity flag clear: the dome is moving
                    true
                } else {
                    // homing has started but the dome hasn't picked up speed
                    self.0 & STATUS_HOMING == STATUS_HOMING
                        && self.0 & STATUS_HOMING_COMPLETE != STATUS_HOMING_COMPLETE
                }
            }
        }
    }

    /// Whether the home sensor reports the dome at the home position.
    pub fn is_at_home(self, variant: ProtocolVariant) -> bool {
        match variant {
            ProtocolVariant::Legacy => self.0 & STATUS_IN_HOME_POSITION != 0,
            ProtocolVariant::Current => {
                if self.0 & STATUS_HOMING == STATUS_HOMING
                    && self.0 & STATUS_IN_HOME_POSITION != STATUS_IN_HOME_POSITION
                {
                    false
                } else {
                    self.0 & STATUS_IN_HOME_POSITION == STATUS_IN_HOME_POSITION
                }
            }
        }
    }
}

/// Shutter state as reported by the dome.
///
/// The shutter is not wired to the drive protocol on this dome model; the
/// state query is hard-coded to report `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutterState {
    Open,
    Opening,
    Closed,
    Closing,
    Error,
}

/// Persisted drive configuration.
///
/// Owned by the device facade and externally persisted through a
/// [`ConfigStore`]; the unit conversions read it on every call so a setter
/// takes effect immediately.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    /// Serial port name, e.g. `/dev/ttyUSB0` or `COM3`
    pub port: String,
    /// Azimuth of the home sensor, degrees in [0, 360)
    pub home_azimuth: f64,
    /// Park azimuth, degrees in [0, 360)
    pub park_azimuth: f64,
    /// Encoder ticks per full dome revolution
    pub ticks_per_rev: u32,
    /// Whether the host should drive the shutter through this plugin
    pub shutter_control: bool,
    /// Firmware generation of the connected drive
    pub variant: ProtocolVariant,
    /// Enforce CRC validation on read responses. The controller firmware in
    /// the field ships frames whose checksums are not trustworthy, so the
    /// legacy behavior (off) only logs the computed values.
    pub verify_response_crc: bool,
}

impl Default for DriveConfig {
    fn default() -> Self {
        DriveConfig {
            port: String::new(),
            home_azimuth: 0.0,
            park_azimuth: 0.0,
            ticks_per_rev: DEFAULT_TICKS_PER_REV,
            shutter_control: false,
            variant: ProtocolVariant::default(),
            verify_response_crc: false,
        }
    }
}

/// Boundary to the host's persisted settings store.
pub trait ConfigStore {
    /// Load the drive configuration.
    fn load(&self) -> Result<DriveConfig>;
    /// Persist the drive configuration.
    fn store(&self, config: &DriveConfig) -> Result<()>;
}

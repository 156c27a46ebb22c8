//! # AMC Dome Driver
//!
//! A Rust driver for observatory dome rotators built on AMC servo drive
//! controllers, speaking the drive's checksummed register protocol over a
//! serial line.
//!
//! ## Features
//!
//! - Register-level access to the drive (CRC-16 framed, half-duplex)
//! - Pollable goto, park, homing and calibration with the retry policies
//!   the dome mechanics need
//! - Azimuth/encoder-tick conversions parameterized by home azimuth and
//!   ticks per revolution
//! - Support for both the legacy and current firmware status layouts
//!
//! ## Example
//!
//! ```no_run
//! use amc_dome::{AmcDome, DriveConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DriveConfig {
//!         port: "/dev/ttyUSB0".into(),
//!         ..DriveConfig::default()
//!     };
//!     let mut dome = AmcDome::open(config)?;
//!     dome.goto_azimuth(180.0)?;
//!     while !dome.is_goto_complete()? {
//!         std::thread::sleep(std::time::Duration::from_millis(500));
//!     }
//!     println!("dome at {:.1} degrees", dome.current_azimuth()?);
//!     Ok(())
//! }
//! ```

pub mod checksum;
pub mod constants;
pub mod convert;
pub mod dome;
pub mod error;
pub mod frame;
pub mod motion;
pub mod protocol;
pub mod transport;
pub mod types;

pub use dome::AmcDome;
pub use error::{DriveError, Result};
pub use protocol::DriveLink;
pub use transport::{SerialTransport, Transport};
pub use types::*;

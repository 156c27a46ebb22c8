//! Device facade: the operations a dome-control host polls.
//!
//! Start commands issue their register writes synchronously and return;
//! the host then polls the matching `is_*_complete` predicate from its own
//! timer loop. `Ok(true)` means complete, `Ok(false)` means still in
//! progress, `Err(CommandFailed)` means the motion did not converge after
//! the retry policy ran out.

use std::time::Instant;

use log::{debug, info, warn};

use crate::convert::{azimuth_to_ticks, normalize_azimuth, ticks_to_azimuth};
use crate::error::{DriveError, Result};
use crate::motion::{
    settle_masks_motion, Followup, MotionState, PollOutcome, StatusSnapshot,
};
use crate::protocol::DriveLink;
use crate::transport::{SerialTransport, Transport};
use crate::types::{DriveConfig, ShutterState};

/// AMC drive dome rotator.
pub struct AmcDome<T: Transport> {
    link: DriveLink<T>,
    config: DriveConfig,
    connected: bool,
    homed: bool,
    parked: bool,
    shutter_open: bool,
    calibrating: bool,
    current_az: f64,
    current_el: f64,
    current_ticks: u32,
    firmware: String,
    product: String,
    motion: MotionState,
    last_motion_command: Instant,
}

impl AmcDome<SerialTransport> {
    /// Open the configured serial port and connect to the drive.
    pub fn open(config: DriveConfig) -> Result<Self> {
        let transport = SerialTransport::open(&config.port)?;
        let mut dome = AmcDome::new(transport, config);
        dome.connect()?;
        Ok(dome)
    }
}

impl<T: Transport> AmcDome<T> {
    /// Wrap an already-open transport. Call [`connect`](Self::connect)
    /// before issuing commands.
    pub fn new(transport: T, config: DriveConfig) -> Self {
        let link = DriveLink::new(transport, config.variant, config.verify_response_crc);
        AmcDome {
            link,
            config,
            connected: false,
            homed: false,
            parked: true,
            shutter_open: false,
            calibrating: false,
            current_az: 0.0,
            current_el: 0.0,
            current_ticks: 0,
            firmware: String::new(),
            product: String::new(),
            motion: MotionState::Idle,
            last_motion_command: Instant::now(),
        }
    }

    /// Establish the session: unlock write access, stop anything the drive
    /// was doing, enable the bridge and read the identity strings.
    ///
    /// On any handshake failure the dome stays disconnected.
    pub fn connect(&mut self) -> Result<()> {
        self.connected = true;
        if let Err(e) = self.handshake() {
            self.connected = false;
            return Err(e);
        }
        info!("connected to {} ({})", self.product, self.firmware);
        Ok(())
    }

    fn handshake(&mut self) -> Result<()> {
        self.link.gain_write_access()?;
        self.abort()?;
        self.link.enable_bridge()?;
        self.product = self.link.get_product_info()?;
        self.firmware = self.link.get_firmware_version()?;
        Ok(())
    }

    /// Disable the bridge and drop the session state.
    ///
    /// The bridge disable is unconditional; a dome left idle must not keep
    /// its power stage energized.
    pub fn disconnect(&mut self) {
        if self.connected {
            if let Err(e) = self.link.disable_bridge() {
                warn!("disable bridge on disconnect failed: {}", e);
            }
            let _ = self.link.transport_mut().purge();
        }
        self.connected = false;
        self.homed = false;
        self.parked = true;
        self.calibrating = false;
        self.motion.reset();
        info!("disconnected");
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_parked(&self) -> bool {
        self.parked
    }

    pub fn is_home(&self) -> bool {
        self.homed
    }

    /// Firmware name read at connect time.
    pub fn firmware_version(&self) -> &str {
        &self.firmware
    }

    /// Control board name read at connect time.
    pub fn product_info(&self) -> &str {
        &self.product
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    pub fn home_azimuth(&self) -> f64 {
        self.config.home_azimuth
    }

    pub fn set_home_azimuth(&mut self, az: f64) {
        self.config.home_azimuth = az;
    }

    pub fn park_azimuth(&self) -> f64 {
        self.config.park_azimuth
    }

    pub fn set_park_azimuth(&mut self, az: f64) {
        self.config.park_azimuth = az;
    }

    pub fn ticks_per_rev(&self) -> u32 {
        self.config.ticks_per_rev
    }

    pub fn set_ticks_per_rev(&mut self, ticks: u32) {
        self.config.ticks_per_rev = ticks;
    }

    /// Current azimuth; reads the drive when connected, otherwise the last
    /// known value.
    pub fn current_azimuth(&mut self) -> Result<f64> {
        if self.connected {
            self.read_azimuth()?;
        }
        Ok(self.current_az)
    }

    /// Current elevation, synthesized from the shutter state.
    pub fn current_elevation(&self) -> f64 {
        self.current_el
    }

    /// Last position read from the drive, in raw encoder ticks.
    pub fn current_ticks(&self) -> u32 {
        self.current_ticks
    }

    pub fn is_shutter_open(&self) -> bool {
        self.shutter_open
    }

    /// Shutter state. The shutter is not wired to the drive protocol on
    /// this dome model; the query reports `Open`.
    pub fn shutter_state(&self) -> Result<ShutterState> {
        if !self.connected {
            return Err(DriveError::NotConnected);
        }
        Ok(ShutterState::Open)
    }

    /// Whether the dome is in motion. Queries issued within the settle
    /// window after a motion command report moving regardless of device
    /// status, masking controller status lag.
    pub fn is_moving(&mut self) -> Result<bool> {
        if !self.connected {
            return Err(DriveError::NotConnected);
        }
        if settle_masks_motion(self.last_motion_command.elapsed()) {
            return Ok(true);
        }
        let status = self.link.get_drive_status()?;
        Ok(status.is_moving(self.link.variant()))
    }

    /// Rotate the dome to an azimuth.
    pub fn goto_azimuth(&mut self, az: f64) -> Result<()> {
        if !self.connected {
            return Err(DriveError::NotConnected);
        }
        let target = normalize_azimuth(az);
        self.command_goto(target)?;
        self.motion = MotionState::new_goto(target);
        Ok(())
    }

    pub fn is_goto_complete(&mut self) -> Result<bool> {
        if !self.connected {
            return Err(DriveError::NotConnected);
        }
        let snapshot = self.poll_status()?;
        let (outcome, followup) = self.motion.poll_goto(&snapshot);
        if let Followup::Goto(target) = followup {
            debug!(
                "goto fell short at {:.2}, re-issuing goto to {:.2}",
                snapshot.current_az, target
            );
        }
        self.run_followup(followup)?;
        self.finish(outcome)
    }

    /// Rotate to the park azimuth.
    pub fn park(&mut self) -> Result<()> {
        if !self.connected {
            return Err(DriveError::NotConnected);
        }
        let target = normalize_azimuth(self.config.park_azimuth);
        info!("parking to {:.2}", target);
        self.command_goto(target)?;
        self.motion = MotionState::new_parking(target);
        Ok(())
    }

    pub fn is_park_complete(&mut self) -> Result<bool> {
        if !self.connected {
            return Err(DriveError::NotConnected);
        }
        let snapshot = self.poll_status()?;
        let (outcome, followup) = self.motion.poll_park(&snapshot);
        self.run_followup(followup)?;
        match outcome {
            PollOutcome::Complete => {
                self.parked = true;
                Ok(true)
            }
            PollOutcome::Incomplete => Ok(false),
            PollOutcome::Failed => {
                warn!(
                    "park stopped at {:.2}, expected {:.2}",
                    snapshot.current_az, self.config.park_azimuth
                );
                self.parked = false;
                self.homed = false;
                Err(DriveError::CommandFailed)
            }
        }
    }

    /// Leave the parked state. Position is assumed to be the park azimuth;
    /// no device interaction is required.
    pub fn unpark(&mut self) -> Result<()> {
        self.parked = false;
        self.current_az = self.config.park_azimuth;
        Ok(())
    }

    pub fn is_unpark_complete(&mut self) -> Result<bool> {
        if !self.connected {
            return Err(DriveError::NotConnected);
        }
        self.parked = false;
        Ok(true)
    }

    /// Start the two-step homing sequence: drive to the home sensor, then
    /// one corrective goto to the configured home azimuth.
    ///
    /// A no-op success when calibration is in progress or the dome is
    /// already at home.
    pub fn find_home(&mut self) -> Result<()> {
        if !self.connected {
            return Err(DriveError::NotConnected);
        }
        if self.calibrating {
            return Ok(());
        }
        let status = self.link.get_drive_status()?;
        if status.is_at_home(self.link.variant()) {
            self.homed = true;
            return Ok(());
        }
        self.link.enable_bridge()?;
        self.link.home()?;
        self.last_motion_command = Instant::now();
        self.motion = MotionState::new_homing();
        Ok(())
    }

    pub fn is_find_home_complete(&mut self) -> Result<bool> {
        if !self.connected {
            return Err(DriveError::NotConnected);
        }
        let snapshot = self.poll_status()?;
        let home_az = self.config.home_azimuth;
        let (outcome, followup) = self.motion.poll_home(&snapshot, home_az);
        self.run_followup(followup)?;
        match outcome {
            PollOutcome::Complete => {
                self.homed = true;
                Ok(true)
            }
            PollOutcome::Incomplete => {
                self.homed = false;
                Ok(false)
            }
            PollOutcome::Failed => {
                warn!("not moving and not at home, homing failed");
                self.homed = false;
                self.parked = false;
                Err(DriveError::CommandFailed)
            }
        }
    }

    /// Start a calibration pass.
    ///
    /// The firmware's measurement sequence is not driven from here; this
    /// enables the bridge and arms the completion check, which corrects any
    /// drift between the reported position and the home azimuth.
    pub fn calibrate(&mut self) -> Result<()> {
        if !self.connected {
            return Err(DriveError::NotConnected);
        }
        self.link.enable_bridge()?;
        self.calibrating = true;
        self.motion = MotionState::Calibrating;
        Ok(())
    }

    pub fn is_calibrate_complete(&mut self) -> Result<bool> {
        if !self.connected {
            return Err(DriveError::NotConnected);
        }
        let snapshot = self.poll_status()?;
        let home_az = self.config.home_azimuth;
        let (outcome, followup) = self.motion.poll_calibrate(&snapshot, home_az);
        self.run_followup(followup)?;
        match outcome {
            PollOutcome::Incomplete => {
                self.homed = false;
                Ok(false)
            }
            _ => {
                self.homed = true;
                self.calibrating = false;
                Ok(true)
            }
        }
    }

    /// Stop the dome: disable the bridge, clear latched events, write the
    /// STOP bit, and drop any in-flight retry/phase state.
    ///
    /// Advisory only; a blocking read in progress is not interrupted.
    pub fn abort(&mut self) -> Result<()> {
        if !self.connected {
            return Err(DriveError::NotConnected);
        }
        self.link.disable_bridge()?;
        self.link.reset_events()?;
        self.link.stop()?;
        self.last_motion_command = Instant::now();
        self.motion.reset();
        self.calibrating = false;
        Ok(())
    }

    /// Redefine the controller's tick origin so the current position reads
    /// as `az`.
    pub fn sync_dome(&mut self, az: f64) -> Result<()> {
        if !self.connected {
            return Err(DriveError::NotConnected);
        }
        self.link.enable_bridge()?;
        let az = normalize_azimuth(az);
        let ticks = azimuth_to_ticks(az, self.config.home_azimuth, self.config.ticks_per_rev);
        self.link.sync_ticks_position(ticks)?;
        self.last_motion_command = Instant::now();
        self.current_az = az;
        Ok(())
    }

    /// Open the shutter. Capability placeholder: the shutter is not wired
    /// to this controller, so no device command is issued.
    pub fn open_shutter(&mut self) -> Result<()> {
        if !self.connected {
            return Err(DriveError::NotConnected);
        }
        if self.calibrating {
            return Ok(());
        }
        info!("opening shutter");
        Ok(())
    }

    /// Close the shutter. Capability placeholder, like
    /// [`open_shutter`](Self::open_shutter).
    pub fn close_shutter(&mut self) -> Result<()> {
        if !self.connected {
            return Err(DriveError::NotConnected);
        }
        if self.calibrating {
            return Ok(());
        }
        info!("closing shutter");
        Ok(())
    }

    pub fn is_open_complete(&mut self) -> Result<bool> {
        let state = self.shutter_state()?;
        if state == ShutterState::Open {
            self.shutter_open = true;
            self.current_el = 90.0;
            Ok(true)
        } else {
            self.shutter_open = false;
            self.current_el = 0.0;
            Ok(false)
        }
    }

    pub fn is_close_complete(&mut self) -> Result<bool> {
        let state = self.shutter_state()?;
        if state == ShutterState::Closed {
            self.shutter_open = false;
            self.current_el = 0.0;
            Ok(true)
        } else {
            self.shutter_open = true;
            self.current_el = 90.0;
            Ok(false)
        }
    }

    /// Enable the bridge and command a goto; restarts the settle timer.
    fn command_goto(&mut self, az: f64) -> Result<()> {
        self.link.enable_bridge()?;
        let ticks = azimuth_to_ticks(az, self.config.home_azimuth, self.config.ticks_per_rev);
        self.link.goto_ticks(ticks)?;
        self.last_motion_command = Instant::now();
        Ok(())
    }

    fn read_azimuth(&mut self) -> Result<f64> {
        let ticks = self.link.get_position_ticks()?;
        let az = ticks_to_azimuth(ticks, self.config.home_azimuth, self.config.ticks_per_rev);
        debug!("position {} ticks = {:.2} degrees", ticks, az);
        self.current_ticks = ticks;
        self.current_az = az;
        Ok(az)
    }

    /// One status/position read cycle for the completion predicates. Inside
    /// the settle window no I/O happens at all and the dome is assumed
    /// moving.
    fn poll_status(&mut self) -> Result<StatusSnapshot> {
        if settle_masks_motion(self.last_motion_command.elapsed()) {
            return Ok(StatusSnapshot::assumed_moving());
        }
        let status = self.link.get_drive_status()?;
        let variant = self.link.variant();
        let moving = status.is_moving(variant);
        let at_home = status.is_at_home(variant);
        let current_az = if moving {
            self.current_az
        } else {
            self.read_azimuth()?
        };
        Ok(StatusSnapshot {
            moving,
            at_home,
            current_az,
        })
    }

    fn run_followup(&mut self, followup: Followup) -> Result<()> {
        match followup {
            Followup::None => Ok(()),
            Followup::Goto(az) => self.command_goto(az),
            Followup::RestartSettle => {
                self.last_motion_command = Instant::now();
                Ok(())
            }
            Followup::ResyncToHome => {
                let home_az = self.config.home_azimuth;
                debug!(
                    "resyncing position {:.2} to home azimuth {:.2}",
                    self.current_az, home_az
                );
                self.sync_dome(home_az)
            }
        }
    }

    fn finish(&self, outcome: PollOutcome) -> Result<bool> {
        match outcome {
            PollOutcome::Complete => Ok(true),
            PollOutcome::Incomplete => Ok(false),
            PollOutcome::Failed => Err(DriveError::CommandFailed),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::frame::build_response;
    use crate::transport::mock::MockTransport;

    fn test_config() -> DriveConfig {
        DriveConfig {
            home_azimuth: 0.0,
            park_azimuth: 270.0,
            ticks_per_rev: 3600, // 10 ticks per degree
            ..DriveConfig::default()
        }
    }

    fn connected_dome() -> AmcDome<MockTransport> {
        let mut dome = AmcDome::new(MockTransport::new(), test_config());
        dome.connected = true;
        dome
    }

    fn elapse_settle(dome: &mut AmcDome<MockTransport>) {
        dome.last_motion_command = Instant::now()
            .checked_sub(Duration::from_secs(3))
            .expect("clock too close to epoch");
    }

    fn write_ack() -> Vec<u8> {
        build_response(0x02, 1, &[])
    }

    // status word with the zero-velocity bit set: stopped on Current firmware
    fn stopped_status() -> Vec<u8> {
        build_response(0x01, 1, &0x0001u16.to_le_bytes())
    }

    fn moving_status() -> Vec<u8> {
        build_response(0x01, 1, &0x0000u16.to_le_bytes())
    }

    fn position(ticks: u32) -> Vec<u8> {
        build_response(0x01, 1, &ticks.to_le_bytes())
    }

    fn queue(dome: &mut AmcDome<MockTransport>, frames: &[Vec<u8>]) {
        for frame in frames {
            dome.link.transport_mut().queue(frame);
        }
    }

    #[test]
    fn operations_require_connection() {
        let mut dome = AmcDome::new(MockTransport::new(), test_config());
        assert!(matches!(
            dome.goto_azimuth(100.0),
            Err(DriveError::NotConnected)
        ));
        assert!(matches!(dome.park(), Err(DriveError::NotConnected)));
        assert!(matches!(dome.abort(), Err(DriveError::NotConnected)));
    }

    #[test]
    fn failed_connect_leaves_dome_disconnected() {
        // nothing scripted: the handshake's first read times out
        let mut dome = AmcDome::new(MockTransport::new(), test_config());
        assert!(matches!(dome.connect(), Err(DriveError::Timeout)));
        assert!(!dome.is_connected());
        assert!(matches!(
            dome.goto_azimuth(100.0),
            Err(DriveError::NotConnected)
        ));
    }

    #[test]
    fn goto_completes_when_position_within_tolerance() {
        let mut dome = connected_dome();
        queue(&mut dome, &[write_ack(), write_ack()]); // bridge + goto
        dome.goto_azimuth(180.0).unwrap();

        elapse_settle(&mut dome);
        queue(&mut dome, &[stopped_status(), position(1800)]);
        assert!(dome.is_goto_complete().unwrap());
    }

    #[test]
    fn goto_poll_masked_inside_settle_window() {
        let mut dome = connected_dome();
        queue(&mut dome, &[write_ack(), write_ack()]);
        dome.goto_azimuth(180.0).unwrap();

        // no responses queued: the masked poll must not touch the device
        assert!(!dome.is_goto_complete().unwrap());
    }

    #[test]
    fn goto_retries_once_then_reports_failure() {
        let mut dome = connected_dome();
        queue(&mut dome, &[write_ack(), write_ack()]);
        dome.goto_azimuth(180.0).unwrap();

        // stopped 20 degrees short: expect one corrective goto
        elapse_settle(&mut dome);
        queue(
            &mut dome,
            &[stopped_status(), position(1600), write_ack(), write_ack()],
        );
        assert!(!dome.is_goto_complete().unwrap());

        // still short on the second poll: command failed
        elapse_settle(&mut dome);
        queue(&mut dome, &[stopped_status(), position(1600)]);
        assert!(matches!(
            dome.is_goto_complete(),
            Err(DriveError::CommandFailed)
        ));
    }

    #[test]
    fn goto_incomplete_while_device_reports_motion() {
        let mut dome = connected_dome();
        queue(&mut dome, &[write_ack(), write_ack()]);
        dome.goto_azimuth(90.0).unwrap();

        elapse_settle(&mut dome);
        queue(&mut dome, &[moving_status()]);
        assert!(!dome.is_goto_complete().unwrap());
    }

    #[test]
    fn park_mismatch_clears_parked_and_homed() {
        let mut dome = connected_dome();
        dome.homed = true;
        queue(&mut dome, &[write_ack(), write_ack()]);
        dome.park().unwrap();

        elapse_settle(&mut dome);
        queue(&mut dome, &[stopped_status(), position(2650)]); // 265 degrees
        assert!(matches!(
            dome.is_park_complete(),
            Err(DriveError::CommandFailed)
        ));
        assert!(!dome.is_parked());
        assert!(!dome.is_home());
    }

    #[test]
    fn park_completes_on_floor_match() {
        let mut dome = connected_dome();
        queue(&mut dome, &[write_ack(), write_ack()]);
        dome.park().unwrap();

        elapse_settle(&mut dome);
        queue(&mut dome, &[stopped_status(), position(2704)]); // 270.4 degrees
        assert!(dome.is_park_complete().unwrap());
        assert!(dome.is_parked());
    }

    #[test]
    fn unpark_is_synchronous() {
        let mut dome = connected_dome();
        dome.unpark().unwrap();
        assert!(!dome.is_parked());
        assert_eq!(dome.current_az, 270.0);
        assert!(dome.is_unpark_complete().unwrap());
    }

    #[test]
    fn find_home_noop_when_already_at_sensor() {
        let mut dome = connected_dome();
        // status word: stopped with the home sensor bit set
        queue(
            &mut dome,
            &[build_response(0x01, 1, &0x0041u16.to_le_bytes())],
        );
        dome.find_home().unwrap();
        assert!(dome.is_home());
        assert_eq!(dome.motion, MotionState::Idle);
    }

    #[test]
    fn homing_corrective_goto_then_complete() {
        let mut dome = connected_dome();
        dome.config.home_azimuth = 10.0;
        // not at home: status read, bridge enable, HOME write
        queue(&mut dome, &[stopped_status(), write_ack(), write_ack()]);
        dome.find_home().unwrap();

        // at the sensor, stopped at 3 degrees: corrective goto issued
        elapse_settle(&mut dome);
        queue(
            &mut dome,
            &[
                build_response(0x01, 1, &0x0041u16.to_le_bytes()),
                position(30),
                write_ack(), // bridge
                write_ack(), // goto
            ],
        );
        assert!(!dome.is_find_home_complete().unwrap());
        assert!(!dome.is_home());

        // corrective goto converged on the home azimuth
        elapse_settle(&mut dome);
        queue(
            &mut dome,
            &[
                build_response(0x01, 1, &0x0041u16.to_le_bytes()),
                position(100), // 10 degrees
            ],
        );
        assert!(dome.is_find_home_complete().unwrap());
        assert!(dome.is_home());
    }

    #[test]
    fn abort_resets_motion_state() {
        let mut dome = connected_dome();
        queue(&mut dome, &[write_ack(), write_ack()]);
        dome.goto_azimuth(45.0).unwrap();
        assert_ne!(dome.motion, MotionState::Idle);

        queue(&mut dome, &[write_ack(), write_ack(), write_ack()]);
        dome.abort().unwrap();
        assert_eq!(dome.motion, MotionState::Idle);
        assert!(!dome.calibrating);
    }

    #[test]
    fn shutter_placeholders_synthesize_open_state() {
        let mut dome = connected_dome();
        dome.open_shutter().unwrap();
        assert!(dome.is_open_complete().unwrap());
        assert_eq!(dome.current_elevation(), 90.0);

        // the hard-coded Open state means close never reports complete
        dome.close_shutter().unwrap();
        assert!(!dome.is_close_complete().unwrap());
    }

    #[test]
    fn calibrate_completes_and_resyncs_drift() {
        let mut dome = connected_dome();
        dome.config.home_azimuth = 10.0;
        queue(&mut dome, &[write_ack()]); // bridge enable
        dome.calibrate().unwrap();
        assert!(dome.calibrating);

        // stopped at 14 degrees: drift, expect set-position + sync writes
        elapse_settle(&mut dome);
        queue(
            &mut dome,
            &[
                stopped_status(),
                position(140),
                write_ack(), // bridge
                write_ack(), // set measured position
                write_ack(), // sync
            ],
        );
        assert!(dome.is_calibrate_complete().unwrap());
        assert!(dome.is_home());
        assert!(!dome.calibrating);
        assert_eq!(dome.current_az, 10.0);
    }
}

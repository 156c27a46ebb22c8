//! Motion state machine for the pollable dome operations.
//!
//! Goto, park, home and calibrate are asynchronous at the device level: a
//! start command kicks the drive off and the host then polls a completion
//! predicate from its own scheduling loop. The machine here is a tagged
//! state plus pure transition functions over a [`StatusSnapshot`], so the
//! retry and two-phase-homing policies are testable without a drive on the
//! other end. Device I/O stays in the facade, which executes the
//! [`Followup`] a transition asks for.

use std::time::Duration;

use crate::constants::SETTLE_TIME_MS;

/// Latest device state fed into a poll transition.
#[derive(Debug, Clone, Copy)]
pub struct StatusSnapshot {
    /// Dome in motion (already debounce-masked by the facade)
    pub moving: bool,
    /// Home sensor active
    pub at_home: bool,
    /// Current azimuth in degrees, valid when not moving
    pub current_az: f64,
}

impl StatusSnapshot {
    /// Snapshot for the settle window, when no status is read at all.
    pub fn assumed_moving() -> Self {
        StatusSnapshot {
            moving: true,
            at_home: false,
            current_az: 0.0,
        }
    }
}

/// Result of polling an in-flight operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Complete,
    Incomplete,
    Failed,
}

/// Device command a transition asks the facade to issue.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Followup {
    None,
    /// Re-issue or issue a goto to the given azimuth
    Goto(f64),
    /// Restart the settle timer without issuing a command
    RestartSettle,
    /// Resynchronize the controller's tick origin to the home azimuth
    ResyncToHome,
}

/// Phase of the two-step homing sequence: drive to the home sensor, then
/// one corrective goto to the configured home azimuth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomingPhase {
    AwaitingHome,
    AwaitingFinalGoto,
}

/// In-flight motion operation, if any.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MotionState {
    Idle,
    Goto {
        target_az: f64,
        retries: u8,
    },
    Parking {
        target_az: f64,
    },
    Homing {
        phase: HomingPhase,
        retries: u8,
        goto_retries: u8,
    },
    Calibrating,
}

impl MotionState {
    pub fn new_goto(target_az: f64) -> Self {
        MotionState::Goto {
            target_az,
            retries: 0,
        }
    }

    pub fn new_parking(target_az: f64) -> Self {
        MotionState::Parking { target_az }
    }

    pub fn new_homing() -> Self {
        MotionState::Homing {
            phase: HomingPhase::AwaitingHome,
            retries: 0,
            goto_retries: 0,
        }
    }

    /// Poll a goto in flight.
    ///
    /// Moving reports incomplete; an azimuth within one degree of the
    /// target completes; otherwise the goto is re-issued exactly once
    /// before the operation fails.
    pub fn poll_goto(&mut self, status: &StatusSnapshot) -> (PollOutcome, Followup) {
        match self {
            MotionState::Goto { target_az, retries } => {
                let target = *target_az;
                let (outcome, followup) = goto_step(target, retries, status);
                if outcome != PollOutcome::Incomplete {
                    *self = MotionState::Idle;
                }
                (outcome, followup)
            }
            _ => (PollOutcome::Complete, Followup::None),
        }
    }

    /// Poll a park in flight. Exact floor-degree match or failure, no
    /// retries.
    pub fn poll_park(&mut self, status: &StatusSnapshot) -> (PollOutcome, Followup) {
        match self {
            MotionState::Parking { target_az } => {
                if status.moving {
                    return (PollOutcome::Incomplete, Followup::None);
                }
                let outcome = if target_az.floor() == status.current_az.floor() {
                    PollOutcome::Complete
                } else {
                    PollOutcome::Failed
                };
                *self = MotionState::Idle;
                (outcome, Followup::None)
            }
            _ => (PollOutcome::Complete, Followup::None),
        }
    }

    /// Poll the two-phase homing sequence.
    pub fn poll_home(&mut self, status: &StatusSnapshot, home_az: f64) -> (PollOutcome, Followup) {
        match self {
            MotionState::Homing {
                phase,
                retries,
                goto_retries,
            } => {
                if status.moving {
                    return (PollOutcome::Incomplete, Followup::None);
                }
                if status.at_home {
                    match phase {
                        HomingPhase::AwaitingHome => {
                            // at the sensor; one corrective goto to the
                            // configured home azimuth
                            *phase = HomingPhase::AwaitingFinalGoto;
                            *goto_retries = 0;
                            (PollOutcome::Incomplete, Followup::Goto(home_az))
                        }
                        HomingPhase::AwaitingFinalGoto => {
                            let (outcome, followup) = goto_step(home_az, goto_retries, status);
                            if outcome != PollOutcome::Incomplete {
                                *self = MotionState::Idle;
                            }
                            (outcome, followup)
                        }
                    }
                } else if *retries == 0 {
                    // sometimes the sensor is passed, or homing hasn't
                    // actually started; give it one more settle window
                    *retries = 1;
                    (PollOutcome::Incomplete, Followup::RestartSettle)
                } else {
                    *self = MotionState::Idle;
                    (PollOutcome::Failed, Followup::None)
                }
            }
            _ => (PollOutcome::Complete, Followup::None),
        }
    }

    /// Poll a calibration. Always concludes complete once motion stops,
    /// resynchronizing the tick origin when the position drifted off the
    /// home azimuth.
    pub fn poll_calibrate(
        &mut self,
        status: &StatusSnapshot,
        home_az: f64,
    ) -> (PollOutcome, Followup) {
        match self {
            MotionState::Calibrating => {
                if status.moving {
                    return (PollOutcome::Incomplete, Followup::None);
                }
                let followup = if home_az.floor() != status.current_az.floor() {
                    Followup::ResyncToHome
                } else {
                    Followup::None
                };
                *self = MotionState::Idle;
                (PollOutcome::Complete, followup)
            }
            _ => (PollOutcome::Complete, Followup::None),
        }
    }

    /// Drop any in-flight operation and its retry/phase counters.
    pub fn reset(&mut self) {
        *self = MotionState::Idle;
    }
}

fn goto_step(target_az: f64, retries: &mut u8, status: &StatusSnapshot) -> (PollOutcome, Followup) {
    if status.moving {
        return (PollOutcome::Incomplete, Followup::None);
    }
    if azimuths_match(target_az, status.current_az) {
        *retries = 0;
        (PollOutcome::Complete, Followup::None)
    } else if *retries == 0 {
        *retries = 1;
        (PollOutcome::Incomplete, Followup::Goto(target_az))
    } else {
        *retries = 0;
        (PollOutcome::Failed, Followup::None)
    }
}

/// Whole-degree comparison with a one degree tolerance either side, the
/// heading error the dome mechanics can leave after a goto.
pub fn azimuths_match(target_az: f64, current_az: f64) -> bool {
    let mut current = current_az;
    if current > 0.0 && current < 1.0 {
        current = 0.0;
    }
    let mut target = target_az;
    while target.ceil() >= 360.0 {
        target = target.ceil() - 360.0;
    }
    while current.ceil() >= 360.0 {
        current = current.ceil() - 360.0;
    }
    (target.floor() - current.floor()).abs() <= 1.0
}

/// Movement debounce: any moving query within the settle window of the
/// last motion command reports moving, masking controller status lag right
/// after a command is issued.
pub fn settle_masks_motion(since_last_command: Duration) -> bool {
    since_last_command < Duration::from_millis(SETTLE_TIME_MS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stopped_at(az: f64) -> StatusSnapshot {
        StatusSnapshot {
            moving: false,
            at_home: false,
            current_az: az,
        }
    }

    fn at_home(az: f64) -> StatusSnapshot {
        StatusSnapshot {
            moving: false,
            at_home: true,
            current_az: az,
        }
    }

    fn moving() -> StatusSnapshot {
        StatusSnapshot {
            moving: true,
            at_home: false,
            current_az: 0.0,
        }
    }

    #[test]
    fn goto_incomplete_while_moving() {
        let mut state = MotionState::new_goto(120.0);
        let (outcome, followup) = state.poll_goto(&moving());
        assert_eq!(outcome, PollOutcome::Incomplete);
        assert_eq!(followup, Followup::None);
        assert_ne!(state, MotionState::Idle);
    }

    #[test]
    fn goto_completes_within_one_degree() {
        let mut state = MotionState::new_goto(120.0);
        let (outcome, _) = state.poll_goto(&stopped_at(120.7));
        assert_eq!(outcome, PollOutcome::Complete);
        assert_eq!(state, MotionState::Idle);
    }

    #[test]
    fn goto_retries_once_then_fails() {
        let mut state = MotionState::new_goto(120.0);

        // 5 degrees off: one corrective goto, still incomplete
        let (outcome, followup) = state.poll_goto(&stopped_at(125.0));
        assert_eq!(outcome, PollOutcome::Incomplete);
        assert_eq!(followup, Followup::Goto(120.0));

        // still off on the next poll: failed, retry counter reset
        let (outcome, followup) = state.poll_goto(&stopped_at(125.0));
        assert_eq!(outcome, PollOutcome::Failed);
        assert_eq!(followup, Followup::None);
        assert_eq!(state, MotionState::Idle);
    }

    #[test]
    fn goto_converges_after_single_retry() {
        let mut state = MotionState::new_goto(120.0);
        let (_, followup) = state.poll_goto(&stopped_at(125.0));
        assert_eq!(followup, Followup::Goto(120.0));
        let (outcome, _) = state.poll_goto(&stopped_at(119.5));
        assert_eq!(outcome, PollOutcome::Complete);
    }

    #[test]
    fn homing_issues_corrective_goto_at_sensor() {
        let mut state = MotionState::new_homing();
        let (outcome, followup) = state.poll_home(&at_home(3.0), 10.0);
        assert_eq!(outcome, PollOutcome::Incomplete);
        assert_eq!(followup, Followup::Goto(10.0));

        // moving again during the corrective goto
        let (outcome, _) = state.poll_home(&moving(), 10.0);
        assert_eq!(outcome, PollOutcome::Incomplete);

        // corrective goto converged on the home azimuth
        let (outcome, _) = state.poll_home(&at_home(10.2), 10.0);
        assert_eq!(outcome, PollOutcome::Complete);
        assert_eq!(state, MotionState::Idle);
    }

    #[test]
    fn homing_final_goto_must_converge() {
        let mut state = MotionState::new_homing();
        state.poll_home(&at_home(3.0), 10.0);

        // stopped short of the home azimuth: the inner goto retries
        let (outcome, followup) = state.poll_home(&at_home(5.0), 10.0);
        assert_eq!(outcome, PollOutcome::Incomplete);
        assert_eq!(followup, Followup::Goto(10.0));

        // still short: command failed
        let (outcome, _) = state.poll_home(&at_home(5.0), 10.0);
        assert_eq!(outcome, PollOutcome::Failed);
    }

    #[test]
    fn homing_retries_settle_when_sensor_missed() {
        let mut state = MotionState::new_homing();

        let (outcome, followup) = state.poll_home(&stopped_at(200.0), 10.0);
        assert_eq!(outcome, PollOutcome::Incomplete);
        assert_eq!(followup, Followup::RestartSettle);

        let (outcome, _) = state.poll_home(&stopped_at(200.0), 10.0);
        assert_eq!(outcome, PollOutcome::Failed);
        assert_eq!(state, MotionState::Idle);
    }

    #[test]
    fn park_requires_exact_floor_match() {
        let mut state = MotionState::new_parking(270.0);
        let (outcome, _) = state.poll_park(&moving());
        assert_eq!(outcome, PollOutcome::Incomplete);

        let mut state = MotionState::new_parking(270.0);
        let (outcome, _) = state.poll_park(&stopped_at(270.4));
        assert_eq!(outcome, PollOutcome::Complete);

        // no retry for park, unlike goto
        let mut state = MotionState::new_parking(270.0);
        let (outcome, followup) = state.poll_park(&stopped_at(272.0));
        assert_eq!(outcome, PollOutcome::Failed);
        assert_eq!(followup, Followup::None);
    }

    #[test]
    fn calibrate_resyncs_on_drift() {
        let mut state = MotionState::Calibrating;
        let (outcome, followup) = state.poll_calibrate(&stopped_at(14.0), 10.0);
        assert_eq!(outcome, PollOutcome::Complete);
        assert_eq!(followup, Followup::ResyncToHome);

        let mut state = MotionState::Calibrating;
        let (outcome, followup) = state.poll_calibrate(&stopped_at(10.3), 10.0);
        assert_eq!(outcome, PollOutcome::Complete);
        assert_eq!(followup, Followup::None);
    }

    #[test]
    fn settle_window_masks_motion() {
        assert!(settle_masks_motion(Duration::from_millis(0)));
        assert!(settle_masks_motion(Duration::from_millis(1999)));
        assert!(!settle_masks_motion(Duration::from_millis(2000)));
    }

    #[test]
    fn azimuth_match_handles_wraparound() {
        assert!(azimuths_match(0.0, 359.9)); // ceil(359.9) == 360 wraps to 0
        assert!(azimuths_match(359.5, 359.9)); // both normalize to 0
        assert!(azimuths_match(0.0, 0.5));
        assert!(!azimuths_match(0.0, 5.0));
    }

    #[test]
    fn reset_clears_in_flight_state() {
        let mut state = MotionState::new_goto(90.0);
        state.poll_goto(&stopped_at(120.0)); // arms the retry counter
        state.reset();
        assert_eq!(state, MotionState::Idle);
    }
}

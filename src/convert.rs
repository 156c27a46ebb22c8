//! Conversions between dome azimuth in degrees and encoder ticks.
//!
//! Both directions are parameterized by the configured home azimuth and
//! ticks-per-revolution so a settings change takes effect on the next call.
//!
//! Precondition: `ticks_per_rev > 0`. The facade never calls into here
//! before the configuration is set; a zero value is a programming error,
//! not a runtime condition.

/// Normalize an azimuth into [0, 360).
pub fn normalize_azimuth(az: f64) -> f64 {
    let mut az = az;
    while az < 0.0 {
        az += 360.0;
    }
    while az >= 360.0 {
        az -= 360.0;
    }
    az
}

/// Convert an azimuth in degrees to encoder ticks from home.
///
/// Result is normalized into `[0, ticks_per_rev)`.
pub fn azimuth_to_ticks(az: f64, home_az: f64, ticks_per_rev: u32) -> u32 {
    let rev = ticks_per_rev as i64;
    let mut ticks = (0.5 + (az - home_az) * ticks_per_rev as f64 / 360.0).floor() as i64;
    while ticks >= rev {
        ticks -= rev;
    }
    while ticks < 0 {
        ticks += rev;
    }
    ticks as u32
}

/// Convert encoder ticks from home to an azimuth in degrees.
///
/// Result is normalized into `[0, 360)`.
pub fn ticks_to_azimuth(ticks: u32, home_az: f64, ticks_per_rev: u32) -> f64 {
    normalize_azimuth(home_az + ticks as f64 * 360.0 / ticks_per_rev as f64)
}

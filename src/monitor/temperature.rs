//! Temperature tracking: running min/max, change reports and limits.

use serde::{Deserialize, Serialize};

use super::state::PersistentState;

/// Limits in Celsius; 0 disables a check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempLimits {
    /// Report changes of at least this many degrees.
    pub diff: u8,
    pub info: u8,
    pub crit: u8,
}

impl TempLimits {
    pub fn enabled(&self) -> bool {
        self.diff != 0 || self.info != 0 || self.crit != 0
    }
}

/// Volatile part of the tracker; min/max live in the persisted state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TempTracker {
    /// Last reported temperature, 0 before the first reading.
    pub last:      u8,
    /// Epoch seconds until which a new minimum is not accepted, 0 = none.
    pub min_delay: i64,
}

/// What one reading produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TempReport {
    Initial { text: String },
    Changed { text: String },
    Info { text: String },
    Critical { text: String },
    /// Dropped far enough below the limits to clear a critical warning.
    Cleared { limit: u8 },
}

fn fmt_temp(t: u8) -> String {
    if t == 0 {
        "??".into()
    } else {
        t.to_string()
    }
}

/// Seconds after the first reading before a new minimum is accepted.
pub const MIN_TEMP_DELAY: i64 = 1800 - 60;

impl TempTracker {
    /// Hold off minimum updates for [`MIN_TEMP_DELAY`].
    pub fn delay_min(&mut self, now: i64) {
        self.min_delay = now + MIN_TEMP_DELAY;
    }

    /// Feed one reading. `None` means the temperature could not be read.
    pub fn update(
        &mut self,
        device: &str,
        current: Option<u8>,
        limits: &TempLimits,
        state: &mut PersistentState,
        now: i64,
    ) -> (Vec<TempReport>, bool) {
        let mut out = Vec::new();
        let mut dirty = false;
        let Some(cur) = current.filter(|t| (1..255).contains(t)) else {
            return (out, dirty);
        };

        let mut maxchg = "";
        if cur > state.temp_max {
            if state.temp_max != 0 {
                maxchg = "!";
            }
            state.temp_max = cur;
            dirty = true;
        }

        let mut minchg = "";
        if self.last == 0 {
            if state.temp_min == 0 || cur < state.temp_min {
                self.delay_min(now);
            }
            out.push(TempReport::Initial {
                text: format!(
                    "Device: {}, initial Temperature is {} Celsius (Min/Max {}/{}{})",
                    device,
                    cur,
                    fmt_temp(state.temp_min),
                    state.temp_max,
                    maxchg
                ),
            });
            self.last = cur;
        } else {
            if self.min_delay != 0
                && ((state.temp_min != 0 && cur > state.temp_min) || self.min_delay <= now)
            {
                self.min_delay = 0;
                if state.temp_min == 0 {
                    state.temp_min = 255;
                }
            }
            if self.min_delay == 0 && cur < state.temp_min {
                state.temp_min = cur;
                dirty = true;
                if cur != self.last {
                    minchg = "!";
                }
            }
            let delta = cur as i32 - self.last as i32;
            if limits.diff != 0
                && (!minchg.is_empty() || !maxchg.is_empty() || delta.unsigned_abs() >= limits.diff as u32)
            {
                out.push(TempReport::Changed {
                    text: format!(
                        "Device: {}, Temperature changed {:+} Celsius to {} Celsius (Min/Max {}{}/{}{})",
                        device,
                        delta,
                        cur,
                        fmt_temp(state.temp_min),
                        minchg,
                        state.temp_max,
                        maxchg
                    ),
                });
                self.last = cur;
            }
        }

        let minmax = format!("(Min/Max {}{}/{}{})", fmt_temp(state.temp_min), minchg, state.temp_max, maxchg);
        if limits.crit != 0 && cur >= limits.crit {
            out.push(TempReport::Critical {
                text: format!(
                    "Device: {}, Temperature {} Celsius reached critical limit of {} Celsius {}",
                    device, cur, limits.crit, minmax
                ),
            });
        } else if limits.info != 0 && cur >= limits.info {
            out.push(TempReport::Info {
                text: format!(
                    "Device: {}, Temperature {} Celsius reached limit of {} Celsius {}",
                    device, cur, limits.info, minmax
                ),
            });
        } else if limits.crit != 0 {
            let limit = if limits.info != 0 { limits.info } else { limits.crit.saturating_sub(5) };
            if cur < limit {
                out.push(TempReport::Cleared { limit });
            }
        }
        (out, dirty)
    }
}

//! Configuration for compilation and scheduling
//!
//! All fields have defaults, so a partial (or empty) config deserializes
//! cleanly.

use chrono::Duration;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Bounds on allocated time as factors of a step's expected duration `T0`
///
/// The optimizer may compress or extend allocated time within
/// `[min_factor * T0, max_factor * T0]`; this is how allocated time trades
/// against calendar capacity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationBounds {
    pub min_factor: f64,
    pub max_factor: f64,
}

impl Default for AllocationBounds {
    fn default() -> Self {
        Self {
            min_factor: 0.0,
            max_factor: 2.0,
        }
    }
}

impl AllocationBounds {
    pub(crate) fn bounds_for(&self, t0: Duration) -> (Duration, Duration) {
        let secs = t0.num_seconds() as f64;
        (
            Duration::seconds((secs * self.min_factor).round() as i64),
            Duration::seconds((secs * self.max_factor).round() as i64),
        )
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    /// Timezone applied to recurrence rules that don't carry their own
    pub default_tz: Tz,

    /// Budget handed to the external optimizer
    pub solver_timeout_secs: u64,

    /// Slot length for integer-time solvers gridding the problem
    pub slot_minutes: u32,

    pub allocation: AllocationBounds,

    /// Fixed log-space dispersion of the completion-time distribution.
    /// When unset, dispersion is derived per step from its `confidence`.
    pub sigma: Option<f64>,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            default_tz: Tz::UTC,
            solver_timeout_secs: 120,
            slot_minutes: 5,
            allocation: AllocationBounds::default(),
            sigma: None,
        }
    }
}

impl CascadeConfig {
    pub fn slot(&self) -> Duration {
        // A zero-length slot would divide the grid away; floor at one
        // minute.
        Duration::minutes(i64::from(self.slot_minutes.max(1)))
    }

    pub fn solver_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.solver_timeout_secs)
    }

    pub(crate) fn sigma_for(&self, confidence: u32) -> f64 {
        self.sigma
            .unwrap_or_else(|| crate::utility::sigma_for_confidence(confidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CascadeConfig::default();
        assert_eq!(config.default_tz, Tz::UTC);
        assert_eq!(config.solver_timeout_secs, 120);
        assert_eq!(config.slot(), Duration::minutes(5));
        assert_eq!(config.allocation.max_factor, 2.0);
    }

    #[test]
    fn partial_config_deserializes_with_defaults() {
        let config: CascadeConfig =
            serde_json::from_str(r#"{"default_tz":"Europe/London","slot_minutes":15}"#).unwrap();
        assert_eq!(config.default_tz, chrono_tz::Europe::London);
        assert_eq!(config.slot_minutes, 15);
        assert_eq!(config.solver_timeout_secs, 120);
    }

    #[test]
    fn zero_slot_length_is_floored() {
        let config: CascadeConfig = serde_json::from_str(r#"{"slot_minutes":0}"#).unwrap();
        assert_eq!(config.slot(), Duration::minutes(1));
    }

    #[test]
    fn allocation_bounds_scale_t0() {
        let bounds = AllocationBounds::default();
        let (lo, hi) = bounds.bounds_for(Duration::hours(1));
        assert_eq!(lo, Duration::zero());
        assert_eq!(hi, Duration::hours(2));
    }
}

//! Probabilistic utility of allocated time
//!
//! Completion time of a step is modeled as a log-normal random variable
//! with median `T0` (the expected duration) and log-space dispersion
//! `sigma`, so `F(0) = 0`, `F(T0) = 0.5`, and `F(a) -> 1` as `a` grows.
//! A step's utility for an allocation `a` is `priority * F(a)`. The
//! distribution family is an explicit design choice: anything satisfying
//! the three boundary conditions would do, and `sigma` is configurable
//! because changing it materially changes allocation behavior.

use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Default log-space dispersion for a confidence level
///
/// Higher confidence in the `T0` estimate means a tighter distribution.
pub fn sigma_for_confidence(confidence: u32) -> f64 {
    1.0 / (f64::from(confidence) + 3.0)
}

/// Utility as a function of allocated time for one atomic instance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UtilityCurve {
    /// Maximum achievable utility (`U0`, the resolved priority)
    pub max_utility: f64,
    /// Median completion time in seconds
    pub median_secs: i64,
    /// Log-space dispersion
    pub sigma: f64,
}

impl UtilityCurve {
    pub fn new(priority: u32, t0: Duration, sigma: f64) -> Self {
        Self {
            max_utility: f64::from(priority),
            median_secs: t0.num_seconds(),
            sigma,
        }
    }

    /// `P(completion <= a)` under the log-normal model
    pub fn completion_probability(&self, allocated: Duration) -> f64 {
        let a = allocated.num_seconds() as f64;
        if a <= 0.0 {
            return 0.0;
        }
        // Zero dispersion degenerates to a step at the median.
        if self.sigma <= 0.0 {
            return if a < self.median_secs as f64 { 0.0 } else { 1.0 };
        }
        let z = (a / self.median_secs as f64).ln() / self.sigma;
        normal_cdf(z)
    }

    /// Expected utility of allocating `a`, ignoring deadlines
    pub fn utility(&self, allocated: Duration) -> f64 {
        self.max_utility * self.completion_probability(allocated)
    }
}

/// Standard normal CDF
fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

/// Error function, Abramowitz & Stegun 7.1.26 (max error 1.5e-7)
fn erf(x: f64) -> f64 {
    // The polynomial's coefficients miss zero by ~1e-9; pin the symmetry
    // point so the median condition holds exactly.
    if x == 0.0 {
        return 0.0;
    }
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + 0.3275911 * x);
    let poly = t
        * (0.254829592
            + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));

    sign * (1.0 - poly * (-x * x).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn curve() -> UtilityCurve {
        UtilityCurve::new(2, Duration::hours(1), sigma_for_confidence(1))
    }

    #[test]
    fn zero_allocation_yields_zero() {
        assert_eq!(curve().utility(Duration::zero()), 0.0);
        assert_eq!(curve().utility(Duration::seconds(-5)), 0.0);
    }

    #[test]
    fn median_allocation_yields_half_priority() {
        let u = curve().utility(Duration::hours(1));
        assert!((u - 1.0).abs() < 1e-9, "expected 0.5 * priority, got {u}");
    }

    #[test]
    fn utility_saturates_at_priority() {
        let u = curve().utility(Duration::hours(100));
        assert!(u > 1.999 && u <= 2.0, "got {u}");
    }

    #[test]
    fn erf_matches_reference_values() {
        // erf(1) = 0.8427007929..., erf(2) = 0.9953222650...
        assert!((erf(1.0) - 0.842_700_79).abs() < 1e-6);
        assert!((erf(2.0) - 0.995_322_27).abs() < 1e-6);
        assert!((erf(-1.0) + 0.842_700_79).abs() < 1e-6);
        assert_eq!(erf(0.0), 0.0);
    }

    #[test]
    fn zero_dispersion_is_a_step_at_the_median() {
        let curve = UtilityCurve::new(1, Duration::hours(1), 0.0);
        assert_eq!(curve.utility(Duration::minutes(59)), 0.0);
        assert_eq!(curve.utility(Duration::hours(1)), 1.0);
        assert_eq!(curve.utility(Duration::hours(2)), 1.0);
    }

    #[test]
    fn higher_confidence_tightens_distribution() {
        let loose = UtilityCurve::new(1, Duration::hours(1), sigma_for_confidence(1));
        let tight = UtilityCurve::new(1, Duration::hours(1), sigma_for_confidence(10));

        // Past the median, the tighter distribution is more certain of
        // completion; before it, less.
        let past = Duration::minutes(90);
        let before = Duration::minutes(30);
        assert!(tight.utility(past) > loose.utility(past));
        assert!(tight.utility(before) < loose.utility(before));
    }

    proptest! {
        #[test]
        fn utility_is_monotone_nondecreasing(a in 0i64..20_000, b in 0i64..20_000) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let c = curve();
            prop_assert!(c.utility(Duration::seconds(lo)) <= c.utility(Duration::seconds(hi)) + 1e-12);
        }

        #[test]
        fn utility_is_bounded_by_priority(a in 0i64..10_000_000) {
            let c = curve();
            let u = c.utility(Duration::seconds(a));
            prop_assert!((0.0..=c.max_utility).contains(&u));
        }
    }
}

//! Objective evaluation: how good is a set of assignments?
//!
//! The primary term is the sum of effective utilities. Ties are broken by
//! the integral of the cumulative utility function (CUF), the
//! right-continuous step function that jumps by an instance's effective
//! utility at its completion instant: among schedules with equal total
//! utility, the one banking utility earlier has the larger integral.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::problem::CompiledProblem;
use crate::schedule::Assignment;

/// Lexicographic objective value of a schedule
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    /// Sum of effective utilities over all scheduled instances
    pub total_utility: f64,
    /// Integral of the CUF over the horizon, in utility-hours
    pub cuf_integral: f64,
}

/// Orders objectives: total utility first, CUF integral as tie-break
pub fn compare(a: &Objective, b: &Objective) -> Ordering {
    a.total_utility
        .total_cmp(&b.total_utility)
        .then(a.cuf_integral.total_cmp(&b.cuf_integral))
}

/// Evaluates assignments against a compiled problem
///
/// Assignments for unknown keys or with non-positive allocations contribute
/// nothing. An instance completing at `end` adds
/// `u * hours(horizon.end - end)` to the integral, which is exactly the
/// area its CUF step sweeps over the rest of the horizon.
pub fn evaluate(problem: &CompiledProblem, assignments: &[Assignment]) -> Objective {
    let mut total = 0.0;
    let mut integral = 0.0;

    for assignment in assignments {
        let Some(instance) = problem.instance(&assignment.key) else {
            continue;
        };
        if assignment.allocated <= Duration::zero() {
            continue;
        }
        let utility = instance.effective_utility(assignment.start, assignment.allocated);
        total += utility;

        let end = assignment.start + assignment.allocated;
        if end < problem.horizon.end {
            integral += utility * hours(problem.horizon.end - end);
        }
    }

    Objective {
        total_utility: total,
        cuf_integral: integral,
    }
}

/// The CUF as `(instant, cumulative utility)` step points
///
/// Starts at `(horizon.start, 0.0)`; each further point is the value from
/// that instant onwards.
pub fn cuf_points(
    problem: &CompiledProblem,
    assignments: &[Assignment],
) -> Vec<(DateTime<Utc>, f64)> {
    let mut completions: Vec<(DateTime<Utc>, f64)> = assignments
        .iter()
        .filter_map(|a| {
            let instance = problem.instance(&a.key)?;
            (a.allocated > Duration::zero())
                .then(|| (a.start + a.allocated, instance.effective_utility(a.start, a.allocated)))
        })
        .collect();
    completions.sort_by_key(|(t, _)| *t);

    let mut points = vec![(problem.horizon.start, 0.0)];
    let mut acc = 0.0;
    for (t, u) in completions {
        acc += u;
        match points.last_mut() {
            Some((last_t, last_v)) if *last_t == t => *last_v = acc,
            _ => points.push((t, acc)),
        }
    }
    points
}

fn hours(d: Duration) -> f64 {
    d.num_seconds() as f64 / 3600.0
}

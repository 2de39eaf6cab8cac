//! Schedules, validation, and the optimizer seam
//!
//! A `Schedule` is the result of solving a `CompiledProblem`: one
//! assignment per scheduled instance, plus the evaluated objective.
//! Optimizers are external; anything that can turn a problem into
//! assignments within a time budget can implement [`Optimizer`].

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::duration_secs;
use crate::domain::OccurrenceKey;
use crate::objective::{self, Objective};
use crate::problem::{CompiledProblem, Horizon};

#[derive(Debug, Error)]
pub enum SolveError {
    #[error("optimizer exceeded its {budget:?} budget")]
    Timeout { budget: std::time::Duration },

    #[error("optimizer failed: {0}")]
    Backend(String),
}

/// A way a schedule can fail validation against its problem
#[derive(Debug, Error, PartialEq)]
pub enum ScheduleViolation {
    #[error("assignment for '{0}' has no matching instance")]
    UnknownInstance(OccurrenceKey),

    #[error("'{0}' is assigned more than once")]
    DuplicateAssignment(OccurrenceKey),

    #[error("'{key}' starts at {start}, before its earliest start {earliest}")]
    StartsTooEarly {
        key: OccurrenceKey,
        start: DateTime<Utc>,
        earliest: DateTime<Utc>,
    },

    #[error("'{key}' runs past the horizon end")]
    OverrunsHorizon { key: OccurrenceKey },

    #[error("'{key}' is allocated time outside its bounds")]
    AllocationOutOfBounds { key: OccurrenceKey },

    #[error("'{first}' and '{second}' overlap")]
    Overlap {
        first: OccurrenceKey,
        second: OccurrenceKey,
    },

    #[error("'{key}' overlaps a busy block")]
    BusyOverlap { key: OccurrenceKey },

    #[error("'{successor}' starts before its predecessor '{predecessor}' finishes")]
    PrecedenceViolated {
        predecessor: OccurrenceKey,
        successor: OccurrenceKey,
    },

    #[error("'{successor}' is scheduled but its predecessor '{predecessor}' is not")]
    UnscheduledPredecessor {
        predecessor: OccurrenceKey,
        successor: OccurrenceKey,
    },
}

/// One placed instance: start plus allocated time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub key: OccurrenceKey,
    pub start: DateTime<Utc>,
    #[serde(with = "duration_secs")]
    pub allocated: Duration,
}

impl Assignment {
    pub fn end(&self) -> DateTime<Utc> {
        self.start + self.allocated
    }
}

/// A line of schedule output, ready for display or export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub key: OccurrenceKey,
    pub name: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(with = "duration_secs")]
    pub allocated: Duration,
    pub utility: f64,
    pub max_utility: f64,
}

/// A solved schedule over one horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub horizon: Horizon,
    /// Assignments sorted by start, then key
    pub assignments: Vec<Assignment>,
    pub objective: Objective,
}

impl Schedule {
    /// Builds a schedule from raw optimizer output
    ///
    /// Zero-length allocations mean "not scheduled" and are dropped.
    pub fn from_assignments(problem: &CompiledProblem, assignments: Vec<Assignment>) -> Self {
        let mut assignments = assignments;
        assignments.retain(|a| a.allocated > Duration::zero());
        assignments.sort_by(|a, b| (a.start, &a.key).cmp(&(b.start, &b.key)));
        let objective = objective::evaluate(problem, &assignments);
        Self {
            horizon: problem.horizon,
            assignments,
            objective,
        }
    }

    pub fn is_scheduled(&self, key: &OccurrenceKey) -> bool {
        self.assignments.iter().any(|a| &a.key == key)
    }

    /// Instances of the problem that got no time
    pub fn unscheduled(&self, problem: &CompiledProblem) -> Vec<OccurrenceKey> {
        problem
            .instances
            .iter()
            .map(|i| i.key.clone())
            .filter(|k| !self.is_scheduled(k))
            .collect()
    }

    /// Display-ready rows, in start order
    pub fn entries(&self, problem: &CompiledProblem) -> Vec<ScheduleEntry> {
        self.assignments
            .iter()
            .filter_map(|a| {
                let instance = problem.instance(&a.key)?;
                Some(ScheduleEntry {
                    key: a.key.clone(),
                    name: instance.name.clone(),
                    start: a.start,
                    end: a.end(),
                    allocated: a.allocated,
                    utility: instance.effective_utility(a.start, a.allocated),
                    max_utility: f64::from(instance.priority),
                })
            })
            .collect()
    }

    /// Checks the schedule against every structural constraint of the
    /// problem
    pub fn validate(&self, problem: &CompiledProblem) -> Result<(), ScheduleViolation> {
        // A schedule is a mapping: one assignment per instance.
        let mut by_key: BTreeMap<&OccurrenceKey, &Assignment> = BTreeMap::new();
        for assignment in &self.assignments {
            if by_key.insert(&assignment.key, assignment).is_some() {
                return Err(ScheduleViolation::DuplicateAssignment(assignment.key.clone()));
            }
        }

        for assignment in &self.assignments {
            let Some(instance) = problem.instance(&assignment.key) else {
                return Err(ScheduleViolation::UnknownInstance(assignment.key.clone()));
            };
            if assignment.start < instance.earliest_start {
                return Err(ScheduleViolation::StartsTooEarly {
                    key: assignment.key.clone(),
                    start: assignment.start,
                    earliest: instance.earliest_start,
                });
            }
            if assignment.end() > problem.horizon.end {
                return Err(ScheduleViolation::OverrunsHorizon {
                    key: assignment.key.clone(),
                });
            }
            if assignment.allocated < instance.alloc_min || assignment.allocated > instance.alloc_max
            {
                return Err(ScheduleViolation::AllocationOutOfBounds {
                    key: assignment.key.clone(),
                });
            }
            for block in &problem.busy {
                if block.start < assignment.end() && assignment.start < block.end {
                    return Err(ScheduleViolation::BusyOverlap {
                        key: assignment.key.clone(),
                    });
                }
            }
        }

        // Assignments are sorted by start, so overlap only ever shows up
        // between neighbours.
        for pair in self.assignments.windows(2) {
            if pair[0].end() > pair[1].start {
                return Err(ScheduleViolation::Overlap {
                    first: pair[0].key.clone(),
                    second: pair[1].key.clone(),
                });
            }
        }

        for (pred, succ) in &problem.precedence {
            let Some(succ_assignment) = by_key.get(succ) else {
                continue;
            };
            match by_key.get(pred) {
                Some(pred_assignment) => {
                    if pred_assignment.end() > succ_assignment.start {
                        return Err(ScheduleViolation::PrecedenceViolated {
                            predecessor: pred.clone(),
                            successor: succ.clone(),
                        });
                    }
                }
                None => {
                    return Err(ScheduleViolation::UnscheduledPredecessor {
                        predecessor: pred.clone(),
                        successor: succ.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// The seam between compilation and any concrete solver
pub trait Optimizer {
    fn solve(
        &self,
        problem: &CompiledProblem,
        timeout: std::time::Duration,
    ) -> Result<Schedule, SolveError>;
}

//! Solver-agnostic problem description produced by compilation
//!
//! A `CompiledProblem` bundles the atomic instances (each with its utility
//! curve, deadline cutoff and start window), the leaf-level precedence
//! edges, and the merged background busy blocks over one horizon. It is the
//! whole interface handed to an external optimizer; nothing in it assumes a
//! particular solver.

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::domain::duration_secs;
use crate::domain::recurrence::{enumerate_pattern, RecurrencePattern};
use crate::domain::{OccurrenceKey, TaskId};
use crate::utility::UtilityCurve;

/// The `[start, end)` window being scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Horizon {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Horizon {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}

/// Externally-imposed busy time that cannot host any task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundInterval {
    /// A concrete one-off `[start, end)` block, already resolved to UTC
    Block {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// A recurring obligation (sleep, standing meetings) expanded per
    /// horizon
    Recurring {
        pattern: RecurrencePattern,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tz: Option<Tz>,
        #[serde(with = "duration_secs")]
        duration: Duration,
    },
}

impl BackgroundInterval {
    /// Concrete blocks this interval occupies within the horizon, clipped
    /// to it
    pub(crate) fn blocks_within(&self, horizon: Horizon, default_tz: Tz) -> Vec<BusyBlock> {
        let raw: Vec<(DateTime<Utc>, DateTime<Utc>)> = match self {
            BackgroundInterval::Block { start, end } => vec![(*start, *end)],
            BackgroundInterval::Recurring {
                pattern,
                tz,
                duration,
            } => {
                // Start a day early so sessions straddling the horizon
                // start are not missed.
                let from = horizon.start - Duration::days(1);
                enumerate_pattern(pattern, tz.unwrap_or(default_tz), from, horizon.end)
                    .into_iter()
                    .map(|s| (s, s + *duration))
                    .collect()
            }
        };

        raw.into_iter()
            .filter_map(|(start, end)| {
                let start = start.max(horizon.start);
                let end = end.min(horizon.end);
                (start < end).then_some(BusyBlock { start, end })
            })
            .collect()
    }
}

/// A merged, horizon-clipped busy block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyBlock {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Sorts blocks and coalesces overlapping or touching neighbours
pub(crate) fn merge_blocks(mut blocks: Vec<BusyBlock>) -> Vec<BusyBlock> {
    blocks.sort_by_key(|b| (b.start, b.end));

    let mut merged: Vec<BusyBlock> = Vec::with_capacity(blocks.len());
    for block in blocks {
        match merged.last_mut() {
            Some(prev) if block.start <= prev.end => prev.end = prev.end.max(block.end),
            _ => merged.push(block),
        }
    }
    merged
}

/// One schedulable occurrence of a Step, fully resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomicTaskInstance {
    pub key: OccurrenceKey,
    pub source: TaskId,
    pub name: String,

    /// Expected duration `T0`
    #[serde(with = "duration_secs")]
    pub expected_duration: Duration,

    /// Resolved priority; also the maximum achievable utility
    pub priority: u32,

    /// Log-space dispersion of the completion-time distribution
    pub sigma: f64,

    /// Resolved deadline: a hard cutoff on utility, not just a ranking
    /// signal
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,

    /// No feasible placement starts earlier than this
    pub earliest_start: DateTime<Utc>,

    #[serde(with = "duration_secs")]
    pub alloc_min: Duration,

    #[serde(with = "duration_secs")]
    pub alloc_max: Duration,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub predecessors: BTreeSet<OccurrenceKey>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub successors: BTreeSet<OccurrenceKey>,
}

impl AtomicTaskInstance {
    pub fn curve(&self) -> UtilityCurve {
        UtilityCurve::new(self.priority, self.expected_duration, self.sigma)
    }

    /// Utility of allocating `a`, ignoring placement
    pub fn utility(&self, allocated: Duration) -> f64 {
        self.curve().utility(allocated)
    }

    /// Utility of a concrete placement: zero once the placement finishes
    /// past the deadline
    pub fn effective_utility(&self, start: DateTime<Utc>, allocated: Duration) -> f64 {
        if let Some(deadline) = self.deadline {
            if start + allocated > deadline {
                return 0.0;
            }
        }
        self.utility(allocated)
    }
}

/// The assembled scheduling problem for one horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledProblem {
    pub horizon: Horizon,

    /// Instances sorted by key
    pub instances: Vec<AtomicTaskInstance>,

    /// Precedence edges `(predecessor, successor)` at the instance level
    pub precedence: Vec<(OccurrenceKey, OccurrenceKey)>,

    /// Merged busy blocks, sorted and non-overlapping
    pub busy: Vec<BusyBlock>,

    /// Slot length for integer-time gridding
    #[serde(with = "duration_secs")]
    pub slot: Duration,
}

impl CompiledProblem {
    pub fn instance(&self, key: &OccurrenceKey) -> Option<&AtomicTaskInstance> {
        self.instances
            .binary_search_by(|i| i.key.cmp(key))
            .ok()
            .map(|idx| &self.instances[idx])
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Slot index of an instant relative to the horizon start (floor)
    pub fn slot_of(&self, instant: DateTime<Utc>) -> i64 {
        (instant - self.horizon.start).num_seconds() / self.slot.num_seconds()
    }

    /// Instant at the start of a slot
    pub fn instant_of(&self, slot: i64) -> DateTime<Utc> {
        self.horizon.start + Duration::seconds(slot * self.slot.num_seconds())
    }

    /// Number of whole slots in the horizon
    pub fn total_slots(&self) -> i64 {
        self.slot_of(self.horizon.end)
    }

    /// Slots needed to cover a duration (ceiling)
    pub fn slots_for(&self, duration: Duration) -> i64 {
        let unit = self.slot.num_seconds();
        (duration.num_seconds() + unit - 1) / unit
    }
}

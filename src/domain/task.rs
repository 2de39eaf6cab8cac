//! Task domain model
//!
//! A `Step` is an atomic, binary-completion unit of work. A `Goal` is a
//! composite task over an ordered list of children (Steps or Goals) and is
//! complete iff every descendant leaf is complete. Goals carry no duration,
//! status, or priority of their own.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::duration_secs;
use super::id::TaskId;
use super::recurrence::RecurrenceRule;

/// Completion status of a Step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Todo,
    Done,
}

impl Status {
    /// Returns true if this status represents completion
    pub fn is_done(&self) -> bool {
        matches!(self, Status::Done)
    }
}

/// Ordering constraints against other tasks
///
/// `before` lists tasks this one must precede; `after` lists tasks that must
/// precede this one. Compilation inverts every `before` into the
/// counterpart's `after`, so downstream passes only see predecessors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dependencies {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub before: BTreeSet<TaskId>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub after: BTreeSet<TaskId>,
}

impl Dependencies {
    /// Creates an empty dependency set
    pub fn new() -> Self {
        Self::default()
    }

    /// Dependencies with only predecessors
    pub fn after<I: IntoIterator<Item = TaskId>>(ids: I) -> Self {
        Self {
            before: BTreeSet::new(),
            after: ids.into_iter().collect(),
        }
    }

    /// Dependencies with only successors
    pub fn before<I: IntoIterator<Item = TaskId>>(ids: I) -> Self {
        Self {
            before: ids.into_iter().collect(),
            after: BTreeSet::new(),
        }
    }

    /// Returns true if no constraint is recorded
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }
}

/// Leaf task: the only schedulable unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub id: TaskId,
    pub name: String,

    /// Expected time to complete (`T0`), strictly positive
    #[serde(with = "duration_secs")]
    pub duration: Duration,

    /// Higher means more urgent; doubles as the maximum achievable utility
    #[serde(default = "default_priority")]
    pub priority: u32,

    /// Confidence in the `T0` estimate; drives the dispersion of the
    /// completion-time distribution
    #[serde(default = "default_confidence")]
    pub confidence: u32,

    #[serde(default)]
    pub status: Status,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<RecurrenceRule>,

    #[serde(default, skip_serializing_if = "Dependencies::is_empty")]
    pub deps: Dependencies,
}

fn default_priority() -> u32 {
    1
}

fn default_confidence() -> u32 {
    1
}

impl Step {
    /// Creates a step with the id derived from the name
    pub fn new(name: impl Into<String>, duration: Duration) -> Self {
        let name = name.into();
        Self {
            id: TaskId::from_name(&name),
            name,
            duration,
            priority: default_priority(),
            confidence: default_confidence(),
            status: Status::default(),
            deadline: None,
            tags: BTreeSet::new(),
            recurrence: None,
            deps: Dependencies::new(),
        }
    }
}

/// Composite task over an ordered, duplicate-free list of children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: TaskId,
    pub name: String,

    /// Child task ids, Steps or Goals; non-empty, no duplicates, no
    /// self-reference
    pub children: Vec<TaskId>,

    /// When set, each child implicitly depends on all earlier children
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub ordered: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurrence: Option<RecurrenceRule>,

    #[serde(default, skip_serializing_if = "Dependencies::is_empty")]
    pub deps: Dependencies,
}

impl Goal {
    /// Creates a goal with the id derived from the name
    pub fn new(name: impl Into<String>, children: Vec<TaskId>) -> Self {
        let name = name.into();
        Self {
            id: TaskId::from_name(&name),
            name,
            children,
            ordered: false,
            deadline: None,
            tags: BTreeSet::new(),
            recurrence: None,
            deps: Dependencies::new(),
        }
    }
}

/// A node of the task graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Task {
    Goal(Goal),
    Step(Step),
}

impl Task {
    pub fn id(&self) -> &TaskId {
        match self {
            Task::Step(s) => &s.id,
            Task::Goal(g) => &g.id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Task::Step(s) => &s.name,
            Task::Goal(g) => &g.name,
        }
    }

    pub fn deps(&self) -> &Dependencies {
        match self {
            Task::Step(s) => &s.deps,
            Task::Goal(g) => &g.deps,
        }
    }

    pub fn as_step(&self) -> Option<&Step> {
        match self {
            Task::Step(s) => Some(s),
            Task::Goal(_) => None,
        }
    }

    pub fn as_goal(&self) -> Option<&Goal> {
        match self {
            Task::Goal(g) => Some(g),
            Task::Step(_) => None,
        }
    }
}

impl From<Step> for Task {
    fn from(s: Step) -> Self {
        Task::Step(s)
    }
}

impl From<Goal> for Task {
    fn from(g: Goal) -> Self {
        Task::Goal(g)
    }
}

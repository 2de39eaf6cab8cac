//! Identifiers for tasks and expanded occurrences
//!
//! A `TaskId` is either given explicitly or derived from the task name by
//! slugification, so the same task list always produces the same ids.
//! An `OccurrenceKey` addresses a single expansion of a (possibly recurring)
//! task and stays stable across re-expansion, which keeps recurrence
//! overrides addressable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable unique identifier for a task
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a task id from an explicit string
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Derives a task id from a human-readable name
    ///
    /// Lowercases and collapses every run of non-alphanumeric characters
    /// into a single `-`, e.g. `"Write: the report!"` becomes
    /// `"write-the-report"`.
    pub fn from_name(name: &str) -> Self {
        let mut slug = String::with_capacity(name.len());
        let mut pending_dash = false;
        for c in name.chars() {
            if c.is_alphanumeric() {
                if pending_dash && !slug.is_empty() {
                    slug.push('-');
                }
                pending_dash = false;
                for lower in c.to_lowercase() {
                    slug.push(lower);
                }
            } else {
                pending_dash = true;
            }
        }
        Self(slug)
    }

    /// Returns the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TaskId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Key of a single schedulable occurrence of a task
///
/// Non-recurring tasks have exactly one occurrence, keyed by the task id
/// alone. Recurring tasks are keyed by `(task id, nominal instant)` where the
/// nominal instant is the unrecurred occurrence time, before any `shift`
/// override is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OccurrenceKey {
    pub task: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nominal: Option<DateTime<Utc>>,
}

impl OccurrenceKey {
    /// Key for the single occurrence of a non-recurring task
    pub fn single(task: TaskId) -> Self {
        Self {
            task,
            nominal: None,
        }
    }

    /// Key for one occurrence of a recurring task
    pub fn recurring(task: TaskId, nominal: DateTime<Utc>) -> Self {
        Self {
            task,
            nominal: Some(nominal),
        }
    }
}

impl fmt::Display for OccurrenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.nominal {
            Some(nominal) => write!(f, "{}@{}", self.task, nominal.to_rfc3339()),
            None => write!(f, "{}", self.task),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn slug_derivation() {
        assert_eq!(TaskId::from_name("Task A").as_str(), "task-a");
        assert_eq!(TaskId::from_name("Write: the report!").as_str(), "write-the-report");
        assert_eq!(TaskId::from_name("  spaced  out  ").as_str(), "spaced-out");
    }

    #[test]
    fn slug_is_deterministic() {
        assert_eq!(TaskId::from_name("Same Name"), TaskId::from_name("Same Name"));
    }

    #[test]
    fn explicit_id_wins_over_derivation() {
        let id = TaskId::new("my-id");
        assert_eq!(id.as_str(), "my-id");
    }

    #[test]
    fn occurrence_key_display() {
        let single = OccurrenceKey::single(TaskId::new("report"));
        assert_eq!(single.to_string(), "report");

        let nominal = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let rec = OccurrenceKey::recurring(TaskId::new("standup"), nominal);
        assert_eq!(rec.to_string(), "standup@2026-03-01T09:00:00+00:00");
    }

    #[test]
    fn occurrence_key_ordering_is_stable() {
        let t1 = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let a = OccurrenceKey::single(TaskId::new("a"));
        let b1 = OccurrenceKey::recurring(TaskId::new("b"), t1);
        let b2 = OccurrenceKey::recurring(TaskId::new("b"), t2);

        let mut keys = vec![b2.clone(), b1.clone(), a.clone()];
        keys.sort();
        assert_eq!(keys, vec![a, b1, b2]);
    }

    #[test]
    fn serde_roundtrip() {
        let nominal = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let key = OccurrenceKey::recurring(TaskId::new("standup"), nominal);
        let json = serde_json::to_string(&key).unwrap();
        let parsed: OccurrenceKey = serde_json::from_str(&json).unwrap();
        assert_eq!(key, parsed);
    }
}

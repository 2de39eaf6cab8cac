//! Domain model: tasks, identifiers, recurrence rules, and the task graph.

pub mod graph;
pub mod id;
pub mod recurrence;
pub mod task;

pub use graph::{GraphError, TaskGraph};
pub use id::{OccurrenceKey, TaskId};
pub use recurrence::{Extent, Occurrence, OccurrenceOverride, RecurrencePattern, RecurrenceRule};
pub use task::{Dependencies, Goal, Status, Step, Task};

/// Serde adapter storing a `chrono::Duration` as whole seconds.
pub(crate) mod duration_secs {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::seconds(i64::deserialize(d)?))
    }
}

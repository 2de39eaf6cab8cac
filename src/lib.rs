//! Cascade: a task-graph compiler for calendar scheduling.
//!
//! Cascade turns a graph of goals and steps (with deadlines, dependencies,
//! recurrence rules and priorities) into a flat, solver-agnostic scheduling
//! problem over a time horizon, and evaluates candidate schedules with a
//! probabilistic utility model: allocating time `a` to a step earns
//! `priority * F(a)`, where `F` is a log-normal completion-time CDF with
//! median at the step's expected duration.
//!
//! The pipeline is pure and deterministic:
//!
//! 1. build a [`TaskGraph`] from steps and goals;
//! 2. [`compile()`] it for a [`Horizon`] into a [`CompiledProblem`]
//!    (inheritance resolved, recurrence expanded, cycles rejected,
//!    background merged);
//! 3. hand the problem to any [`Optimizer`];
//! 4. [`Schedule::validate`] the result and read its [`Objective`].
//!
//! [`Session`] wraps the pipeline in an immutable snapshot for callers
//! that iterate on their inputs.

pub mod compile;
pub mod config;
pub mod domain;
pub mod objective;
pub mod problem;
pub mod schedule;
pub mod session;
pub mod utility;

pub use compile::{compile, CompileError};
pub use config::{AllocationBounds, CascadeConfig};
pub use domain::{
    Dependencies, Extent, Goal, GraphError, OccurrenceKey, OccurrenceOverride, RecurrencePattern,
    RecurrenceRule, Status, Step, Task, TaskGraph, TaskId,
};
pub use objective::Objective;
pub use problem::{AtomicTaskInstance, BackgroundInterval, BusyBlock, CompiledProblem, Horizon};
pub use schedule::{
    Assignment, Optimizer, Schedule, ScheduleEntry, ScheduleViolation, SolveError,
};
pub use session::{ScheduleError, Session};
pub use utility::UtilityCurve;

//! Scheduling sessions
//!
//! A `Session` snapshots everything a scheduling run needs: config, the
//! task graph, and background intervals. Sessions are immutable; editing
//! one produces a new value, so a solve always sees a consistent snapshot
//! and concurrent runs never observe half-applied edits.

use thiserror::Error;
use tracing::info;

use crate::compile::{self, CompileError};
use crate::config::CascadeConfig;
use crate::domain::TaskGraph;
use crate::problem::{BackgroundInterval, CompiledProblem, Horizon};
use crate::schedule::{Optimizer, Schedule, SolveError};

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Solve(#[from] SolveError),
}

/// An immutable snapshot of scheduling inputs
#[derive(Debug, Clone, Default)]
pub struct Session {
    config: CascadeConfig,
    graph: TaskGraph,
    background: Vec<BackgroundInterval>,
    last_schedule: Option<Schedule>,
}

impl Session {
    pub fn new(config: CascadeConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Replaces the task graph; any previous result no longer describes
    /// these inputs and is discarded
    pub fn with_graph(self, graph: TaskGraph) -> Self {
        Self {
            graph,
            last_schedule: None,
            ..self
        }
    }

    pub fn with_background(self, background: Vec<BackgroundInterval>) -> Self {
        Self {
            background,
            last_schedule: None,
            ..self
        }
    }

    pub fn config(&self) -> &CascadeConfig {
        &self.config
    }

    pub fn graph(&self) -> &TaskGraph {
        &self.graph
    }

    pub fn background(&self) -> &[BackgroundInterval] {
        &self.background
    }

    pub fn last_schedule(&self) -> Option<&Schedule> {
        self.last_schedule.as_ref()
    }

    /// Compiles this session's inputs for a horizon
    pub fn compile(&self, horizon: Horizon) -> Result<CompiledProblem, CompileError> {
        compile::compile(&self.graph, horizon, &self.background, &self.config)
    }

    /// Compiles and solves, returning the successor session holding the
    /// result
    pub fn schedule(
        self,
        horizon: Horizon,
        optimizer: &dyn Optimizer,
    ) -> Result<(Session, Schedule), ScheduleError> {
        let problem = self.compile(horizon)?;
        let schedule = optimizer.solve(&problem, self.config.solver_timeout())?;
        info!(
            scheduled = schedule.assignments.len(),
            total = problem.instances.len(),
            utility = schedule.objective.total_utility,
            "solved schedule"
        );
        let next = Session {
            last_schedule: Some(schedule.clone()),
            ..self
        };
        Ok((next, schedule))
    }
}

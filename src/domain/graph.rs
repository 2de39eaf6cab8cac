//! The task graph: a flat arena of Steps and Goals keyed by TaskId
//!
//! Goals reference their children by id, so the composite hierarchy is a
//! directed graph over one node table rather than a tree of owned nodes.
//! Dependency edges live alongside it. The graph is immutable during a
//! scheduling run: it is rebuilt on every import, so derived indexes are
//! recomputed per compilation pass and need no invalidation protocol.

use std::collections::HashMap;

use thiserror::Error;

use super::id::TaskId;
use super::task::{Goal, Step, Task};

#[derive(Debug, Error, PartialEq)]
pub enum GraphError {
    #[error("task '{missing}' referenced by '{referenced_by}' is not defined")]
    UnknownTask {
        referenced_by: TaskId,
        missing: TaskId,
    },

    #[error("task id '{0}' is defined more than once")]
    DuplicateTask(TaskId),

    #[error("goal '{0}' has no children")]
    EmptyGoal(TaskId),

    #[error("goal '{goal}' lists child '{child}' more than once")]
    DuplicateChild { goal: TaskId, child: TaskId },

    #[error("task '{0}' references itself")]
    SelfReference(TaskId),

    #[error("step '{0}' has a non-positive duration")]
    InvalidDuration(TaskId),
}

/// Directed multigraph of Steps, Goals, containment and dependency edges
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskGraph {
    tasks: HashMap<TaskId, Task>,
    /// Definition order; drives deterministic traversal and the
    /// earliest-defined-ancestor tie-break
    order: Vec<TaskId>,
    /// Explicit dependency edges: `.0` must complete before `.1`
    edges: Vec<(TaskId, TaskId)>,
}

impl TaskGraph {
    /// Creates an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from a task collection in one pass
    pub fn from_tasks<I>(tasks: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = Task>,
    {
        let mut graph = Self::new();
        for task in tasks {
            graph.add_task(task)?;
        }
        Ok(graph)
    }

    /// Adds a task, validating its local shape
    pub fn add_task(&mut self, task: Task) -> Result<(), GraphError> {
        let id = task.id().clone();
        if self.tasks.contains_key(&id) {
            return Err(GraphError::DuplicateTask(id));
        }

        match &task {
            Task::Step(step) => validate_step(step)?,
            Task::Goal(goal) => validate_goal(goal)?,
        }
        if task.deps().before.contains(&id) || task.deps().after.contains(&id) {
            return Err(GraphError::SelfReference(id));
        }

        self.order.push(id.clone());
        self.tasks.insert(id, task);
        Ok(())
    }

    /// Records that `from` must complete before `to`
    pub fn add_dependency(&mut self, from: &TaskId, to: &TaskId) -> Result<(), GraphError> {
        if !self.tasks.contains_key(from) {
            return Err(GraphError::UnknownTask {
                referenced_by: to.clone(),
                missing: from.clone(),
            });
        }
        if !self.tasks.contains_key(to) {
            return Err(GraphError::UnknownTask {
                referenced_by: from.clone(),
                missing: to.clone(),
            });
        }
        if from == to {
            return Err(GraphError::SelfReference(from.clone()));
        }
        self.edges.push((from.clone(), to.clone()));
        Ok(())
    }

    /// Looks a task up by id
    pub fn resolve(&self, id: &TaskId) -> Result<&Task, GraphError> {
        self.tasks.get(id).ok_or_else(|| GraphError::UnknownTask {
            referenced_by: id.clone(),
            missing: id.clone(),
        })
    }

    /// Tasks in definition order
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.order.iter().filter_map(|id| self.tasks.get(id))
    }

    /// Steps in definition order
    pub fn steps(&self) -> impl Iterator<Item = &Step> {
        self.tasks().filter_map(Task::as_step)
    }

    /// Goals in definition order
    pub fn goals(&self) -> impl Iterator<Item = &Goal> {
        self.tasks().filter_map(Task::as_goal)
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.tasks.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Position of a task in definition order
    pub(crate) fn definition_index(&self, id: &TaskId) -> Option<usize> {
        self.order.iter().position(|t| t == id)
    }

    /// Derived status of a Goal: done iff every descendant leaf is done.
    /// For a Step this is its own status.
    pub fn is_done(&self, id: &TaskId) -> Result<bool, GraphError> {
        // Worklist walk; containment cycles terminate because visited ids
        // are never re-queued.
        let mut seen = std::collections::HashSet::new();
        let mut work = vec![id.clone()];
        while let Some(current) = work.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            match self.resolve(&current)? {
                Task::Step(step) => {
                    if !step.status.is_done() {
                        return Ok(false);
                    }
                }
                Task::Goal(goal) => work.extend(goal.children.iter().cloned()),
            }
        }
        Ok(true)
    }

    /// All dependency edges at the task (pre-expansion) level, each meaning
    /// `.0` must complete before `.1`
    ///
    /// Collects the explicit edges, inverts every `before` declaration into
    /// an `after`, and injects the implicit chain edges of `ordered` goals.
    /// Fails on references to undefined ids.
    pub(crate) fn dependency_edges(&self) -> Result<Vec<(TaskId, TaskId)>, GraphError> {
        let mut edges = self.edges.clone();

        for task in self.tasks() {
            let id = task.id();
            for target in &task.deps().before {
                self.check_ref(id, target)?;
                edges.push((id.clone(), target.clone()));
            }
            for source in &task.deps().after {
                self.check_ref(id, source)?;
                edges.push((source.clone(), id.clone()));
            }
        }

        for goal in self.goals() {
            if goal.ordered {
                for i in 1..goal.children.len() {
                    for j in 0..i {
                        edges.push((goal.children[j].clone(), goal.children[i].clone()));
                    }
                }
            }
        }

        Ok(edges)
    }

    fn check_ref(&self, referenced_by: &TaskId, id: &TaskId) -> Result<(), GraphError> {
        if self.tasks.contains_key(id) {
            Ok(())
        } else {
            Err(GraphError::UnknownTask {
                referenced_by: referenced_by.clone(),
                missing: id.clone(),
            })
        }
    }
}

fn validate_step(step: &Step) -> Result<(), GraphError> {
    if step.duration <= chrono::Duration::zero() {
        return Err(GraphError::InvalidDuration(step.id.clone()));
    }
    Ok(())
}

fn validate_goal(goal: &Goal) -> Result<(), GraphError> {
    if goal.children.is_empty() {
        return Err(GraphError::EmptyGoal(goal.id.clone()));
    }
    let mut seen = std::collections::HashSet::new();
    for child in &goal.children {
        if child == &goal.id {
            return Err(GraphError::SelfReference(goal.id.clone()));
        }
        if !seen.insert(child) {
            return Err(GraphError::DuplicateChild {
                goal: goal.id.clone(),
                child: child.clone(),
            });
        }
    }
    Ok(())
}

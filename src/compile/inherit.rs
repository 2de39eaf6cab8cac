//! Inheritance resolver
//!
//! Walks every root-to-leaf containment path and resolves each leaf's
//! `(deadline, recurrence, tags)` triple:
//! - deadlines only ever tighten: a leaf ends up with the minimum of its own
//!   deadline and every ancestor goal's;
//! - an explicit recurrence on a step always wins; otherwise the
//!   ancestor-supplied rule with the smallest graph distance to the leaf
//!   wins, ties broken by the earliest-defined ancestor;
//! - tags are the union of the leaf's own and all ancestors'; explicit leaf
//!   tags are never removed.
//!
//! Traversal uses an explicit frame stack, not recursion; revisiting a goal
//! already on the current path is a containment cycle.

use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};

use crate::domain::{RecurrenceRule, Step, Task, TaskGraph, TaskId};

use super::CompileError;

/// Per-leaf resolution produced by the inheritance pass
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedLeaf {
    pub deadline: Option<DateTime<Utc>>,
    pub recurrence: Option<RecurrenceRule>,
    pub tags: BTreeSet<String>,
}

#[derive(Debug)]
struct Candidate {
    rule: RecurrenceRule,
    distance: usize,
    definition_index: usize,
}

impl Candidate {
    fn beats(&self, other: &Candidate) -> bool {
        (self.distance, self.definition_index) < (other.distance, other.definition_index)
    }
}

#[derive(Debug)]
struct Accum {
    deadline: Option<DateTime<Utc>>,
    explicit_recurrence: Option<RecurrenceRule>,
    inherited: Option<Candidate>,
    tags: BTreeSet<String>,
}

impl Accum {
    fn seed(step: &Step) -> Self {
        Self {
            deadline: step.deadline,
            explicit_recurrence: step.recurrence.clone(),
            inherited: None,
            tags: step.tags.clone(),
        }
    }

    fn into_resolved(self) -> ResolvedLeaf {
        ResolvedLeaf {
            deadline: self.deadline,
            recurrence: self
                .explicit_recurrence
                .or(self.inherited.map(|c| c.rule)),
            tags: self.tags,
        }
    }
}

enum Frame {
    Enter(TaskId),
    Exit,
}

/// Resolves every leaf of the graph
///
/// Includes `done` steps: they are excluded from instance generation later
/// but still participate as satisfied predecessors.
pub(crate) fn resolve_leaves(
    graph: &TaskGraph,
) -> Result<HashMap<TaskId, ResolvedLeaf>, CompileError> {
    let child_ids: HashSet<&TaskId> = graph
        .goals()
        .flat_map(|g| g.children.iter())
        .collect();

    let mut accums: HashMap<TaskId, Accum> = HashMap::new();
    let mut visited: HashSet<TaskId> = HashSet::new();

    let roots: Vec<TaskId> = graph
        .tasks()
        .filter(|t| !child_ids.contains(t.id()))
        .map(|t| t.id().clone())
        .collect();
    for root in roots {
        walk(graph, root, &mut visited, &mut accums)?;
    }

    // Goals caught in a containment cycle have no root above them and are
    // missed by the root walk; walking them directly surfaces the cycle.
    let stranded: Vec<TaskId> = graph
        .tasks()
        .map(|t| t.id().clone())
        .filter(|id| !visited.contains(id))
        .collect();
    for id in stranded {
        if !visited.contains(&id) {
            walk(graph, id, &mut visited, &mut accums)?;
        }
    }

    Ok(accums
        .into_iter()
        .map(|(id, accum)| (id, accum.into_resolved()))
        .collect())
}

fn walk(
    graph: &TaskGraph,
    start: TaskId,
    visited: &mut HashSet<TaskId>,
    accums: &mut HashMap<TaskId, Accum>,
) -> Result<(), CompileError> {
    let mut stack = vec![Frame::Enter(start)];
    let mut path: Vec<TaskId> = Vec::new();
    let mut on_path: HashSet<TaskId> = HashSet::new();

    while let Some(frame) = stack.pop() {
        match frame {
            Frame::Enter(id) => {
                visited.insert(id.clone());
                match graph.resolve(&id)? {
                    Task::Step(step) => visit_leaf(graph, step, &path, accums),
                    Task::Goal(goal) => {
                        if on_path.contains(&id) {
                            let pos = path.iter().position(|t| *t == id).unwrap_or(0);
                            let mut cycle: Vec<TaskId> = path[pos..].to_vec();
                            cycle.push(id);
                            return Err(CompileError::Cycle(cycle));
                        }
                        on_path.insert(id.clone());
                        path.push(id.clone());
                        stack.push(Frame::Exit);
                        for child in goal.children.iter().rev() {
                            stack.push(Frame::Enter(child.clone()));
                        }
                    }
                }
            }
            Frame::Exit => {
                if let Some(id) = path.pop() {
                    on_path.remove(&id);
                }
            }
        }
    }
    Ok(())
}

fn visit_leaf(graph: &TaskGraph, step: &Step, path: &[TaskId], accums: &mut HashMap<TaskId, Accum>) {
    let accum = accums
        .entry(step.id.clone())
        .or_insert_with(|| Accum::seed(step));

    for (pos, ancestor_id) in path.iter().enumerate() {
        let Some(goal) = graph.resolve(ancestor_id).ok().and_then(Task::as_goal) else {
            continue;
        };

        // Tightening-only deadline merge.
        accum.deadline = match (accum.deadline, goal.deadline) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        accum.tags.extend(goal.tags.iter().cloned());

        if accum.explicit_recurrence.is_none() {
            if let Some(rule) = &goal.recurrence {
                let candidate = Candidate {
                    rule: rule.clone(),
                    distance: path.len() - pos,
                    definition_index: graph.definition_index(ancestor_id).unwrap_or(usize::MAX),
                };
                let replace = match &accum.inherited {
                    Some(current) => candidate.beats(current),
                    None => true,
                };
                if replace {
                    accum.inherited = Some(candidate);
                }
            }
        }
    }
}

//! Compilation: task graph + horizon + background -> `CompiledProblem`
//!
//! One pure pass. Resolves inheritance down every containment path, expands
//! goal-level dependency edges to leaf pairs, rejects cycles, expands
//! recurrence rules into occurrences, drops `done` steps (their outgoing
//! obligations are treated as satisfied), propagates earliest-start bounds
//! along the precedence DAG, and merges background intervals into disjoint
//! busy blocks. Compiling the same inputs twice yields identical output.

mod inherit;

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{DateTime, Utc};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::CascadeConfig;
use crate::domain::{GraphError, OccurrenceKey, Task, TaskGraph, TaskId};
use crate::problem::{merge_blocks, AtomicTaskInstance, BackgroundInterval, CompiledProblem, Horizon};

#[derive(Debug, Error, PartialEq)]
pub enum CompileError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("dependency cycle detected: {}", join_ids(.0))]
    Cycle(Vec<TaskId>),

    #[error("structurally unsatisfiable problem: {0}")]
    InfeasibleGraph(String),

    #[error("horizon start {start} is not before its end {end}")]
    InvalidHorizon {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

fn join_ids(path: &[TaskId]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Compiles the graph into a solver-agnostic problem for one horizon
pub fn compile(
    graph: &TaskGraph,
    horizon: Horizon,
    background: &[BackgroundInterval],
    config: &CascadeConfig,
) -> Result<CompiledProblem, CompileError> {
    if horizon.end <= horizon.start {
        return Err(CompileError::InvalidHorizon {
            start: horizon.start,
            end: horizon.end,
        });
    }

    let leaves = leaf_index(graph)?;
    let resolved = inherit::resolve_leaves(graph)?;

    // Goal-level dependency edges expand to the cartesian product of the
    // endpoints' descendant leaves. Degenerate self-pairs are kept so the
    // cycle check can report them.
    let mut leaf_edges: BTreeSet<(TaskId, TaskId)> = BTreeSet::new();
    for (from, to) in graph.dependency_edges()? {
        if let (Some(from_leaves), Some(to_leaves)) = (leaves.get(&from), leaves.get(&to)) {
            for f in from_leaves {
                for t in to_leaves {
                    leaf_edges.insert((f.clone(), t.clone()));
                }
            }
        }
    }

    // Cycles are checked over every leaf, `done` ones included: marking a
    // step done must never be what breaks a cycle.
    let mut adjacency: BTreeMap<TaskId, Vec<TaskId>> = BTreeMap::new();
    for (from, to) in &leaf_edges {
        adjacency.entry(from.clone()).or_default().push(to.clone());
    }
    if let Some(cycle) = find_cycle(graph.steps().map(|s| s.id.clone()), &adjacency) {
        return Err(CompileError::Cycle(cycle));
    }

    for (from, to) in &leaf_edges {
        if let (Some(f), Some(t)) = (resolved.get(from), resolved.get(to)) {
            if let (Some(fd), Some(td)) = (f.deadline, t.deadline) {
                if fd > td {
                    warn!(
                        predecessor = %from,
                        successor = %to,
                        "predecessor deadline falls after its successor's"
                    );
                }
            }
        }
    }

    let mut instances: Vec<AtomicTaskInstance> = Vec::new();
    for step in graph.steps() {
        if step.status.is_done() {
            continue;
        }
        let Some(res) = resolved.get(&step.id) else {
            continue;
        };

        let occurrences: Vec<(OccurrenceKey, DateTime<Utc>)> = match &res.recurrence {
            Some(rule) => rule
                .expand_within(horizon.start, horizon.end, config.default_tz)
                .into_iter()
                .map(|o| (OccurrenceKey::recurring(step.id.clone(), o.nominal), o.instant))
                .collect(),
            None => vec![(OccurrenceKey::single(step.id.clone()), horizon.start)],
        };

        let (alloc_min, alloc_max) = config.allocation.bounds_for(step.duration);
        for (key, instant) in occurrences {
            instances.push(AtomicTaskInstance {
                key,
                source: step.id.clone(),
                name: step.name.clone(),
                expected_duration: step.duration,
                priority: step.priority,
                sigma: config.sigma_for(step.confidence),
                deadline: res.deadline,
                earliest_start: instant.max(horizon.start),
                alloc_min,
                alloc_max,
                tags: res.tags.clone(),
                predecessors: BTreeSet::new(),
                successors: BTreeSet::new(),
            });
        }
    }
    instances.sort_by(|a, b| a.key.cmp(&b.key));

    // Instance precedence: every leaf edge crossed with the occurrence sets
    // of both endpoints. Edges touching a done or out-of-horizon step have
    // no instances on that side and vanish here.
    let mut by_task: HashMap<TaskId, Vec<usize>> = HashMap::new();
    for (idx, inst) in instances.iter().enumerate() {
        by_task.entry(inst.source.clone()).or_default().push(idx);
    }
    let mut edge_idx: BTreeSet<(usize, usize)> = BTreeSet::new();
    for (from, to) in &leaf_edges {
        if let (Some(fs), Some(ts)) = (by_task.get(from), by_task.get(to)) {
            for &i in fs {
                for &j in ts {
                    edge_idx.insert((i, j));
                }
            }
        }
    }
    let edge_idx: Vec<(usize, usize)> = edge_idx.into_iter().collect();

    for &(i, j) in &edge_idx {
        let pred_key = instances[i].key.clone();
        let succ_key = instances[j].key.clone();
        instances[i].successors.insert(succ_key);
        instances[j].predecessors.insert(pred_key);
    }

    propagate_earliest_starts(&mut instances, &edge_idx)?;

    let mut blocks = Vec::new();
    for interval in background {
        blocks.extend(interval.blocks_within(horizon, config.default_tz));
    }
    let busy = merge_blocks(blocks);

    let precedence: Vec<(OccurrenceKey, OccurrenceKey)> = edge_idx
        .iter()
        .map(|&(i, j)| (instances[i].key.clone(), instances[j].key.clone()))
        .collect();

    debug!(
        instances = instances.len(),
        precedence = precedence.len(),
        busy = busy.len(),
        "compiled problem"
    );

    Ok(CompiledProblem {
        horizon,
        instances,
        precedence,
        busy,
        slot: config.slot(),
    })
}

/// Descendant leaves of every task; a step's entry is itself
///
/// Memoized post-order walk over the containment graph. Also validates that
/// goal children resolve.
fn leaf_index(graph: &TaskGraph) -> Result<HashMap<TaskId, BTreeSet<TaskId>>, CompileError> {
    let mut memo: HashMap<TaskId, BTreeSet<TaskId>> = HashMap::new();

    for task in graph.tasks() {
        if memo.contains_key(task.id()) {
            continue;
        }

        let mut stack: Vec<(TaskId, usize)> = vec![(task.id().clone(), 0)];
        let mut on_stack: HashSet<TaskId> = HashSet::new();
        on_stack.insert(task.id().clone());

        while let Some((id, child_idx)) = stack.last().cloned() {
            match graph.resolve(&id)? {
                Task::Step(_) => {
                    memo.insert(id.clone(), BTreeSet::from([id.clone()]));
                    on_stack.remove(&id);
                    stack.pop();
                }
                Task::Goal(goal) => {
                    if child_idx < goal.children.len() {
                        if let Some(top) = stack.last_mut() {
                            top.1 += 1;
                        }
                        let child = goal.children[child_idx].clone();
                        if on_stack.contains(&child) {
                            let pos = stack.iter().position(|(t, _)| *t == child).unwrap_or(0);
                            let mut cycle: Vec<TaskId> =
                                stack[pos..].iter().map(|(t, _)| t.clone()).collect();
                            cycle.push(child);
                            return Err(CompileError::Cycle(cycle));
                        }
                        if !memo.contains_key(&child) {
                            graph.resolve(&child).map_err(|_| GraphError::UnknownTask {
                                referenced_by: id.clone(),
                                missing: child.clone(),
                            })?;
                            on_stack.insert(child.clone());
                            stack.push((child, 0));
                        }
                    } else {
                        let mut collected = BTreeSet::new();
                        for child in &goal.children {
                            if let Some(child_leaves) = memo.get(child) {
                                collected.extend(child_leaves.iter().cloned());
                            }
                        }
                        memo.insert(id.clone(), collected);
                        on_stack.remove(&id);
                        stack.pop();
                    }
                }
            }
        }
    }

    Ok(memo)
}

/// Finds a cycle in the leaf dependency graph, returning its path with the
/// entry node repeated at both ends
fn find_cycle(
    nodes: impl Iterator<Item = TaskId>,
    adjacency: &BTreeMap<TaskId, Vec<TaskId>>,
) -> Option<Vec<TaskId>> {
    #[derive(PartialEq)]
    enum Color {
        Gray,
        Black,
    }
    let mut colors: HashMap<TaskId, Color> = HashMap::new();

    for start in nodes {
        if colors.contains_key(&start) {
            continue;
        }
        let mut stack: Vec<(TaskId, usize)> = vec![(start.clone(), 0)];
        colors.insert(start, Color::Gray);

        while let Some((id, child_idx)) = stack.last().cloned() {
            let next = adjacency.get(&id).and_then(|v| v.get(child_idx)).cloned();
            match next {
                Some(child) => {
                    if let Some(top) = stack.last_mut() {
                        top.1 += 1;
                    }
                    match colors.get(&child) {
                        Some(Color::Gray) => {
                            let pos = stack.iter().position(|(t, _)| *t == child).unwrap_or(0);
                            let mut cycle: Vec<TaskId> =
                                stack[pos..].iter().map(|(t, _)| t.clone()).collect();
                            cycle.push(child);
                            return Some(cycle);
                        }
                        Some(Color::Black) => {}
                        None => {
                            colors.insert(child.clone(), Color::Gray);
                            stack.push((child, 0));
                        }
                    }
                }
                None => {
                    colors.insert(id, Color::Black);
                    stack.pop();
                }
            }
        }
    }
    None
}

/// Lifts each instance's earliest start to at least that of every
/// predecessor, in topological order
fn propagate_earliest_starts(
    instances: &mut [AtomicTaskInstance],
    edges: &[(usize, usize)],
) -> Result<(), CompileError> {
    let mut dag = DiGraph::<usize, ()>::with_capacity(instances.len(), edges.len());
    let nodes: Vec<NodeIndex> = (0..instances.len()).map(|i| dag.add_node(i)).collect();
    for &(i, j) in edges {
        dag.add_edge(nodes[i], nodes[j], ());
    }

    // The leaf-level check has already run; a cycle here means occurrence
    // expansion itself went wrong.
    let order = toposort(&dag, None)
        .map_err(|_| CompileError::InfeasibleGraph("instance precedence is cyclic".to_string()))?;

    for node in order {
        let i = dag[node];
        let bound = instances[i].earliest_start;
        let successors: Vec<usize> = dag.neighbors(node).map(|n| dag[n]).collect();
        for j in successors {
            if instances[j].earliest_start < bound {
                instances[j].earliest_start = bound;
            }
        }
    }
    Ok(())
}

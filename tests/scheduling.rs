//! End-to-end scheduling through the public API, using a greedy
//! earliest-fit optimizer as the reference solver.

use std::collections::{BTreeMap, BTreeSet};

use cascade::{
    compile, objective, Assignment, AtomicTaskInstance, BackgroundInterval, CascadeConfig,
    CompileError, CompiledProblem, Dependencies, Goal, Horizon, OccurrenceKey, Optimizer,
    RecurrencePattern, RecurrenceRule, Schedule, ScheduleError, Session, SolveError, Step, Task,
    TaskGraph, TaskId,
};
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};

/// Greedy reference optimizer: places instances in dependency order, each at
/// the earliest gap that fits its expected duration. Not optimal, but every
/// schedule it emits is feasible.
struct EarliestFit;

impl Optimizer for EarliestFit {
    fn solve(
        &self,
        problem: &CompiledProblem,
        _timeout: std::time::Duration,
    ) -> Result<Schedule, SolveError> {
        let mut placed: BTreeMap<OccurrenceKey, Assignment> = BTreeMap::new();
        let mut skipped: BTreeSet<OccurrenceKey> = BTreeSet::new();
        let mut occupied: Vec<(DateTime<Utc>, DateTime<Utc>)> =
            problem.busy.iter().map(|b| (b.start, b.end)).collect();

        let mut remaining: Vec<&AtomicTaskInstance> = problem.instances.iter().collect();
        remaining.sort_by(|a, b| (a.earliest_start, &a.key).cmp(&(b.earliest_start, &b.key)));

        while let Some(pos) = remaining.iter().position(|i| {
            i.predecessors
                .iter()
                .all(|p| placed.contains_key(p) || skipped.contains(p))
        }) {
            let instance = remaining.remove(pos);
            if instance.predecessors.iter().any(|p| skipped.contains(p)) {
                skipped.insert(instance.key.clone());
                continue;
            }

            let mut start = instance.earliest_start;
            for pred in &instance.predecessors {
                if let Some(a) = placed.get(pred) {
                    start = start.max(a.start + a.allocated);
                }
            }

            let allocated = instance
                .expected_duration
                .max(instance.alloc_min)
                .min(instance.alloc_max);

            occupied.sort();
            loop {
                let end = start + allocated;
                match occupied.iter().find(|&&(bs, be)| bs < end && start < be) {
                    Some(&(_, be)) => start = be,
                    None => break,
                }
            }

            if start + allocated > problem.horizon.end {
                skipped.insert(instance.key.clone());
                continue;
            }
            occupied.push((start, start + allocated));
            placed.insert(
                instance.key.clone(),
                Assignment {
                    key: instance.key.clone(),
                    start,
                    allocated,
                },
            );
        }

        Ok(Schedule::from_assignments(
            problem,
            placed.into_values().collect(),
        ))
    }
}

fn utc(d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, d, h, 0, 0).unwrap()
}

fn id(s: &str) -> TaskId {
    TaskId::new(s)
}

fn single(s: &str) -> OccurrenceKey {
    OccurrenceKey::single(id(s))
}

fn session(tasks: impl IntoIterator<Item = Task>) -> Session {
    Session::new(CascadeConfig::default()).with_graph(TaskGraph::from_tasks(tasks).unwrap())
}

#[test]
fn dependent_steps_schedule_in_order() {
    let mut a = Step::new("A", Duration::hours(1));
    a.priority = 2;
    a.deps = Dependencies::before([id("b")]);
    let mut b = Step::new("B", Duration::hours(2));
    b.priority = 2;

    let (_, schedule) = session([a.into(), b.into()])
        .schedule(Horizon::new(utc(1, 8), utc(1, 12)), &EarliestFit)
        .unwrap();

    assert_eq!(schedule.assignments.len(), 2);
    assert_eq!(schedule.assignments[0].key, single("a"));
    assert_eq!(schedule.assignments[0].start, utc(1, 8));
    assert_eq!(schedule.assignments[1].key, single("b"));
    assert_eq!(schedule.assignments[1].start, utc(1, 9));
    // Both allocated exactly T0: each banks half its priority.
    assert!((schedule.objective.total_utility - 2.0).abs() < 1e-9);
}

#[test]
fn schedules_validate_against_their_problem() {
    let mut a = Step::new("A", Duration::hours(1));
    a.deps = Dependencies::before([id("b")]);
    let b = Step::new("B", Duration::hours(2));
    let s = session([a.into(), b.into()]);

    let horizon = Horizon::new(utc(1, 8), utc(1, 12));
    let problem = s.compile(horizon).unwrap();
    let (_, schedule) = s.schedule(horizon, &EarliestFit).unwrap();

    assert_eq!(schedule.validate(&problem), Ok(()));
}

#[test]
fn goal_deadline_reaches_the_leaves() {
    let mut x = Step::new("X", Duration::hours(1));
    x.deadline = Some(utc(2, 0));
    let y = Step::new("Y", Duration::hours(1));
    let mut g = Goal::new("G", vec![id("x"), id("y")]);
    g.deadline = Some(utc(1, 18));

    let s = session([x.into(), y.into(), g.into()]);
    let problem = s.compile(Horizon::new(utc(1, 8), utc(3, 0))).unwrap();

    for key in ["x", "y"] {
        assert_eq!(
            problem.instance(&single(key)).unwrap().deadline,
            Some(utc(1, 18)),
            "leaf {key}"
        );
    }
}

#[test]
fn cycles_fail_compilation() {
    let mut a = Step::new("A", Duration::hours(1));
    a.deps = Dependencies::before([id("b")]);
    let mut b = Step::new("B", Duration::hours(1));
    b.deps = Dependencies::before([id("a")]);

    let err = session([a.into(), b.into()])
        .schedule(Horizon::new(utc(1, 8), utc(1, 12)), &EarliestFit)
        .unwrap_err();

    assert!(matches!(
        err,
        ScheduleError::Compile(CompileError::Cycle(_))
    ));
}

#[test]
fn background_blocks_are_respected() {
    let a = Step::new("Deep work", Duration::hours(2));
    let s = session([a.into()]).with_background(vec![
        BackgroundInterval::Block {
            start: utc(1, 8),
            end: utc(1, 9),
        },
        BackgroundInterval::Recurring {
            pattern: RecurrencePattern::Daily {
                at: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            },
            tz: None,
            duration: Duration::hours(1),
        },
    ]);

    let horizon = Horizon::new(utc(1, 8), utc(1, 18));
    let problem = s.compile(horizon).unwrap();
    let (_, schedule) = s.schedule(horizon, &EarliestFit).unwrap();

    assert_eq!(schedule.validate(&problem), Ok(()));
    assert_eq!(schedule.assignments[0].start, utc(1, 9));
}

#[test]
fn recurring_predecessor_pushes_successor_past_its_last_occurrence() {
    let mut standup = Step::new("Standup", Duration::minutes(30));
    standup.recurrence = Some(RecurrenceRule::new(RecurrencePattern::Daily {
        at: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
    }));
    standup.deps = Dependencies::before([id("retro")]);
    let retro = Step::new("Retro", Duration::hours(1));

    let s = session([standup.into(), retro.into()]);
    let horizon = Horizon::new(utc(1, 0), utc(4, 0));
    let problem = s.compile(horizon).unwrap();
    let (_, schedule) = s.schedule(horizon, &EarliestFit).unwrap();

    assert_eq!(schedule.validate(&problem), Ok(()));
    assert_eq!(schedule.assignments.len(), 4);

    let retro_start = schedule
        .assignments
        .iter()
        .find(|a| a.key == single("retro"))
        .map(|a| a.start)
        .unwrap();
    // After the day-3 standup finishes.
    assert!(retro_start >= utc(3, 9) + Duration::minutes(30));
}

#[test]
fn ordered_goals_chain_descendant_leaves() {
    // Outer goal orders [prep, task-a]; prep holds task-b. The implicit
    // edge expands to task-b before task-a.
    let task_a = Step::new("Task A", Duration::hours(1));
    let task_b = Step::new("Task B", Duration::hours(1));
    let prep = Goal::new("Prep", vec![id("task-b")]);
    let mut outer = Goal::new("Outer", vec![id("prep"), id("task-a")]);
    outer.ordered = true;

    let s = session([task_a.into(), task_b.into(), prep.into(), outer.into()]);
    let problem = s.compile(Horizon::new(utc(1, 8), utc(1, 18))).unwrap();

    assert!(problem
        .precedence
        .contains(&(single("task-b"), single("task-a"))));
    let (_, schedule) = s
        .schedule(Horizon::new(utc(1, 8), utc(1, 18)), &EarliestFit)
        .unwrap();
    assert_eq!(schedule.validate(&problem), Ok(()));
}

#[test]
fn done_work_unblocks_without_being_scheduled() {
    let mut done = Step::new("Research", Duration::hours(1));
    done.status = cascade::Status::Done;
    done.deps = Dependencies::before([id("write")]);
    let write = Step::new("Write", Duration::hours(1));

    let s = session([done.into(), write.into()]);
    let horizon = Horizon::new(utc(1, 8), utc(1, 12));
    let problem = s.compile(horizon).unwrap();
    let (_, schedule) = s.schedule(horizon, &EarliestFit).unwrap();

    assert!(problem.instance(&single("research")).is_none());
    assert_eq!(schedule.assignments.len(), 1);
    assert_eq!(schedule.assignments[0].start, utc(1, 8));
    assert_eq!(schedule.validate(&problem), Ok(()));
}

#[test]
fn equal_utility_schedules_prefer_front_loading() {
    let a = Step::new("A", Duration::hours(1));
    let s = session([a.into()]);
    let problem = s.compile(Horizon::new(utc(1, 8), utc(1, 18))).unwrap();

    let early = objective::evaluate(
        &problem,
        &[Assignment {
            key: single("a"),
            start: utc(1, 8),
            allocated: Duration::hours(1),
        }],
    );
    let late = objective::evaluate(
        &problem,
        &[Assignment {
            key: single("a"),
            start: utc(1, 15),
            allocated: Duration::hours(1),
        }],
    );

    assert!((early.total_utility - late.total_utility).abs() < 1e-9);
    assert_eq!(
        objective::compare(&early, &late),
        std::cmp::Ordering::Greater
    );
}

#[test]
fn compilation_is_idempotent_end_to_end() {
    let mut standup = Step::new("Standup", Duration::minutes(30));
    standup.recurrence = Some(RecurrenceRule::new(RecurrencePattern::Daily {
        at: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
    }));
    let mut g = Goal::new("Cadence", vec![id("standup")]);
    g.tags.insert("ritual".to_string());

    let s = session([standup.into(), g.into()]);
    let horizon = Horizon::new(utc(1, 0), utc(8, 0));

    let first = s.compile(horizon).unwrap();
    let second = s.compile(horizon).unwrap();
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn compile_function_matches_session_compile() {
    let a = Step::new("A", Duration::hours(1));
    let graph = TaskGraph::from_tasks([a.into()]).unwrap();
    let config = CascadeConfig::default();
    let horizon = Horizon::new(utc(1, 8), utc(1, 12));

    let direct = compile(&graph, horizon, &[], &config).unwrap();
    let via_session = Session::new(config)
        .with_graph(graph)
        .compile(horizon)
        .unwrap();
    assert_eq!(direct, via_session);
}

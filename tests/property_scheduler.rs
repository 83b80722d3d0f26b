// tests/property_scheduler.rs

use std::collections::{BTreeSet, HashMap};

use proptest::prelude::*;
use taskweave::dag::{DependencyGraph, Dispatch, Scheduler};
use taskweave::exec::ExecutionRecord;
use taskweave::task::{ExecutionContext, Task, TaskBuilder, TaskError, TaskOutcome};
use taskweave::{RunStatus, SkipReason, TaskState, TaskweaveError};

#[derive(Debug, Clone)]
struct Workload {
    deps: Vec<BTreeSet<usize>>,
    failing: BTreeSet<usize>,
    tolerant: BTreeSet<usize>,
}

fn name(i: usize) -> String {
    format!("task_{i}")
}

fn task(i: usize, deps: impl IntoIterator<Item = usize>, tolerant: bool) -> Task {
    let mut b = TaskBuilder::create(name(i)).unwrap();
    b.with_execution(|_ctx, _cancel| async { TaskOutcome::Success })
        .continue_on_failure(tolerant)
        .with_dependencies(deps.into_iter().map(name))
        .unwrap();
    b.build().unwrap()
}

// Task N may only depend on tasks 0..N, which keeps the graph acyclic.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Workload> {
    (1..=max_tasks).prop_flat_map(|n| {
        (
            proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..4), n),
            proptest::collection::btree_set(0..n, 0..=n / 2),
            proptest::collection::btree_set(0..n, 0..=n),
        )
            .prop_map(move |(raw, failing, tolerant)| Workload {
                deps: raw
                    .into_iter()
                    .enumerate()
                    .map(|(i, picks)| {
                        if i == 0 {
                            BTreeSet::new()
                        } else {
                            picks.into_iter().map(|p| p % i).collect()
                        }
                    })
                    .collect(),
                failing,
                tolerant,
            })
    })
}

fn build(workload: &Workload) -> DependencyGraph {
    let mut graph = DependencyGraph::new();
    // Insert in reverse so insertion order never matches dependency order.
    for i in (0..workload.deps.len()).rev() {
        let t = task(i, workload.deps[i].iter().copied(), workload.tolerant.contains(&i));
        graph.add_task(t).unwrap();
    }
    graph
}

/// Drive a scheduler the way the runtime does, completing in-flight tasks
/// one at a time in dispatch order. Returns the completion sequence.
fn simulate(scheduler: &mut Scheduler, failing: &BTreeSet<String>) -> Vec<String> {
    let ctx = ExecutionContext::new();
    let mut running: Vec<String> = Vec::new();
    let mut finished = Vec::new();

    scheduler.start();
    for _ in 0..1000 {
        let ready = scheduler.step_ready().ready;
        for t in ready {
            if let (Dispatch::Run(scheduled), _) = scheduler.dispatch(&t, &ctx) {
                running.push(scheduled.name().to_string());
            }
        }
        if running.is_empty() {
            break;
        }

        let t = running.remove(0);
        let record = if failing.contains(&t) {
            ExecutionRecord::failed(&t, 1, TaskError::new("scripted failure"))
        } else {
            ExecutionRecord::succeeded(&t, 1)
        };
        scheduler.handle_completion(record);
        finished.push(t);
    }
    finished
}

proptest! {
    #[test]
    fn scheduler_reaches_a_consistent_terminal_state(workload in dag_strategy(12)) {
        let failing: BTreeSet<String> = workload.failing.iter().map(|&i| name(i)).collect();
        let mut scheduler = Scheduler::new(build(&workload)).unwrap();

        let finished = simulate(&mut scheduler, &failing);
        let position: HashMap<&str, usize> = finished
            .iter()
            .enumerate()
            .map(|(i, t)| (t.as_str(), i))
            .collect();

        prop_assert!(scheduler.is_finished());
        prop_assert_eq!(scheduler.in_flight(), 0);

        let mut fatal_failure = false;
        for i in 0..workload.deps.len() {
            let t = name(i);
            let info = scheduler.task_info(&t).unwrap();
            prop_assert!(info.state.is_terminal(), "{} ended {}", t, info.state);

            // A task that ran did so after all of its dependencies succeeded.
            if let Some(&at) = position.get(t.as_str()) {
                for &d in &workload.deps[i] {
                    let dep = name(d);
                    prop_assert_eq!(scheduler.run_state_of(&dep), Some(TaskState::Succeeded));
                    prop_assert!(position[dep.as_str()] < at);
                }
            } else {
                prop_assert_eq!(info.state, TaskState::Skipped);
                prop_assert!(info.skip_reason.is_some());
            }

            if info.state == TaskState::Failed && !workload.tolerant.contains(&i) {
                fatal_failure = true;
            }
            // Upstream skips only come from tolerated failures.
            if info.skip_reason == Some(SkipReason::UpstreamFailed) {
                let tolerated = (0..workload.deps.len()).any(|j| {
                    workload.tolerant.contains(&j)
                        && scheduler.run_state_of(&name(j)) == Some(TaskState::Failed)
                });
                prop_assert!(tolerated);
            }
        }

        let expected = if fatal_failure { RunStatus::Aborted } else { RunStatus::Completed };
        prop_assert_eq!(scheduler.status(), expected);
        prop_assert_eq!(scheduler.abort_cause().is_some(), fatal_failure);

        // Only succeeded tasks are candidates for compensation.
        for t in scheduler.completion_order() {
            prop_assert_eq!(scheduler.run_state_of(t), Some(TaskState::Succeeded));
        }
    }

    #[test]
    fn cycle_error_names_a_real_cycle(
        ring in 2usize..6,
        extras in proptest::collection::vec(any::<usize>(), 0..6),
    ) {
        let mut graph = DependencyGraph::new();
        for i in 0..ring {
            graph.add_task(task(i, [(i + 1) % ring], false)).unwrap();
        }
        // Acyclic hangers-on that depend on ring members or earlier extras.
        for (k, pick) in extras.iter().enumerate() {
            let i = ring + k;
            graph.add_task(task(i, [pick % i], false)).unwrap();
        }

        match graph.seal() {
            Err(TaskweaveError::DagCycle { path }) => {
                prop_assert!(path.len() >= 3);
                prop_assert_eq!(path.first(), path.last());
                for pair in path.windows(2) {
                    let deps = graph.task(&pair[0]).unwrap().dependencies();
                    prop_assert!(
                        deps.contains(&pair[1]),
                        "{} does not depend on {}", pair[0], pair[1]
                    );
                }
            }
            other => prop_assert!(false, "expected a cycle, got {:?}", other),
        }
        prop_assert!(!graph.is_sealed());
    }
}

// tests/engine_scenarios.rs

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use taskweave::engine::{AbortCause, Engine, RunOptions};
use taskweave::task::{ExecutionContext, Task, TaskBuilder, TaskOutcome};
use taskweave::{RunStatus, SkipReason, TaskState, TaskweaveError};
use taskweave_test_utils::{FakeTask, Recorder, graph_of, init_tracing, with_timeout};
use tokio_util::sync::CancellationToken;

type TestResult = Result<(), Box<dyn Error>>;

fn engine() -> Engine {
    Engine::new(RunOptions::default())
}

#[tokio::test]
async fn chain_runs_in_order_without_compensation() -> TestResult {
    init_tracing();
    let rec = Recorder::new();
    let graph = graph_of([
        FakeTask::new("C").after(&["B"]).recorder(&rec).compensated().build(),
        FakeTask::new("A").recorder(&rec).compensated().build(),
        FakeTask::new("B").after(&["A"]).recorder(&rec).compensated().build(),
    ]);

    let result = with_timeout(engine().run(graph, ExecutionContext::new())).await?;

    assert_eq!(result.status, RunStatus::Completed);
    assert!(result.is_success());
    assert_eq!(rec.with_prefix("start:"), vec!["A", "B", "C"]);
    assert!(rec.with_prefix("comp:").is_empty());
    assert!(result.compensation.is_none());
    assert!(result.abort_cause.is_none());

    // Reports follow execution order.
    let names: Vec<&str> = result.tasks.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["A", "B", "C"]);
    for task in &result.tasks {
        assert_eq!(task.state, TaskState::Succeeded);
        assert_eq!(task.attempts, 1);
        assert!(task.started_at.is_some() && task.finished_at.is_some());
    }
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_abort_and_compensate_predecessor() -> TestResult {
    init_tracing();
    let rec = Recorder::new();
    let graph = graph_of([
        FakeTask::new("A").recorder(&rec).compensated().build(),
        FakeTask::new("B")
            .after(&["A"])
            .recorder(&rec)
            .always_fails()
            .retries(2, Duration::from_millis(100))
            .build(),
    ]);

    let result = with_timeout(engine().run(graph, ExecutionContext::new())).await?;

    assert_eq!(result.status, RunStatus::Aborted);
    let b = result.task("B").unwrap();
    assert_eq!(b.state, TaskState::Failed);
    assert_eq!(b.attempts, 3);
    assert_eq!(rec.count("start:B"), 3);
    assert_eq!(b.error.as_ref().unwrap().message(), "attempt 3 failed");

    assert_eq!(result.state_of("A"), Some(TaskState::Succeeded));
    assert!(matches!(
        &result.abort_cause,
        Some(AbortCause::TaskFailed { task, .. }) if task == "B"
    ));

    let report = result.compensation.as_ref().unwrap();
    assert_eq!(report.compensated(), vec!["A"]);
    assert_eq!(report.trigger, result.abort_cause.clone().unwrap());
    Ok(())
}

#[tokio::test]
async fn failure_without_compensation_actions_lists_predecessor_as_succeeded() -> TestResult {
    let graph = graph_of([
        FakeTask::new("A").build(),
        FakeTask::new("B").after(&["A"]).always_fails().build(),
    ]);

    let result = with_timeout(engine().run(graph, ExecutionContext::new())).await?;

    assert_eq!(result.status, RunStatus::Aborted);
    assert_eq!(result.state_of("A"), Some(TaskState::Succeeded));
    assert!(result.compensation.as_ref().unwrap().entries.is_empty());
    Ok(())
}

#[tokio::test]
async fn higher_priority_starts_first_with_one_slot() -> TestResult {
    let rec = Recorder::new();
    let graph = graph_of([
        FakeTask::new("low").priority(1).recorder(&rec).build(),
        FakeTask::new("mid").priority(5).recorder(&rec).build(),
        FakeTask::new("high").priority(10).recorder(&rec).build(),
        FakeTask::new("also-mid").priority(5).recorder(&rec).build(),
    ]);

    let options = RunOptions::default().with_concurrency_limit(1);
    let result = with_timeout(Engine::new(options).run(graph, ExecutionContext::new())).await?;

    assert!(result.is_success());
    assert_eq!(
        rec.with_prefix("start:"),
        vec!["high", "mid", "also-mid", "low"]
    );
    Ok(())
}

fn tracked(name: &str, running: &Arc<AtomicUsize>, peak: &Arc<AtomicUsize>) -> Task {
    let running = Arc::clone(running);
    let peak = Arc::clone(peak);
    let mut b = TaskBuilder::create(name).unwrap();
    b.with_execution(move |_ctx, _cancel| {
        let running = Arc::clone(&running);
        let peak = Arc::clone(&peak);
        async move {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            running.fetch_sub(1, Ordering::SeqCst);
            TaskOutcome::Success
        }
    });
    b.build().unwrap()
}

#[tokio::test(start_paused = true)]
async fn concurrency_limit_bounds_in_flight_tasks() -> TestResult {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let graph = graph_of((0..8).map(|i| tracked(&format!("t{i}"), &running, &peak)));

    let options = RunOptions::default().with_concurrency_limit(3);
    let result = with_timeout(Engine::new(options).run(graph, ExecutionContext::new())).await?;

    assert!(result.is_success());
    assert_eq!(peak.load(Ordering::SeqCst), 3);
    assert_eq!(result.tasks_in(TaskState::Succeeded).len(), 8);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn retry_backoff_frees_the_slot_for_other_tasks() -> TestResult {
    let rec = Recorder::new();
    let graph = graph_of([
        FakeTask::new("flaky")
            .fails_times(1)
            .retries(1, Duration::from_secs(1))
            .recorder(&rec)
            .build(),
        FakeTask::new("other").recorder(&rec).build(),
    ]);

    let options = RunOptions::default().with_concurrency_limit(1);
    let result = with_timeout(Engine::new(options).run(graph, ExecutionContext::new())).await?;

    assert!(result.is_success());
    assert_eq!(
        rec.entries(),
        vec!["start:flaky", "start:other", "done:other", "start:flaky", "done:flaky"]
    );
    assert_eq!(result.task("flaky").unwrap().attempts, 2);
    Ok(())
}

#[tokio::test]
async fn false_condition_skips_task_but_unblocks_dependents() -> TestResult {
    let rec = Recorder::new();
    let graph = graph_of([
        FakeTask::new("gate").condition(false).recorder(&rec).build(),
        FakeTask::new("after-gate").after(&["gate"]).recorder(&rec).build(),
        FakeTask::new("deploy").when("deploy").recorder(&rec).build(),
    ]);
    let ctx = ExecutionContext::builder().property("deploy", "yes").build();

    let result = with_timeout(engine().run(graph, ctx)).await?;

    assert_eq!(result.status, RunStatus::Completed);
    let gate = result.task("gate").unwrap();
    assert_eq!(gate.state, TaskState::Skipped);
    assert_eq!(gate.skip_reason, Some(SkipReason::ConditionFalse));
    assert_eq!(gate.attempts, 0);
    assert_eq!(result.state_of("after-gate"), Some(TaskState::Succeeded));
    assert_eq!(result.state_of("deploy"), Some(TaskState::Succeeded));
    assert_eq!(rec.count("start:gate"), 0);
    Ok(())
}

#[tokio::test]
async fn continue_on_failure_skips_only_the_failed_branch() -> TestResult {
    let graph = graph_of([
        FakeTask::new("lint").always_fails().continue_on_failure().build(),
        FakeTask::new("report").after(&["lint"]).build(),
        FakeTask::new("publish").after(&["report"]).build(),
        FakeTask::new("test").build(),
        FakeTask::new("package").after(&["test"]).build(),
    ]);

    let result = with_timeout(engine().run(graph, ExecutionContext::new())).await?;

    assert_eq!(result.status, RunStatus::Completed);
    assert!(result.abort_cause.is_none());
    assert_eq!(result.state_of("lint"), Some(TaskState::Failed));
    for name in ["report", "publish"] {
        let t = result.task(name).unwrap();
        assert_eq!(t.state, TaskState::Skipped);
        assert_eq!(t.skip_reason, Some(SkipReason::UpstreamFailed));
    }
    assert_eq!(result.tasks_in(TaskState::Succeeded), vec!["test", "package"]);
    Ok(())
}

#[tokio::test]
async fn abort_skips_undispatched_tasks() -> TestResult {
    let graph = graph_of([
        FakeTask::new("boom").always_fails().build(),
        FakeTask::new("downstream").after(&["boom"]).build(),
    ]);

    let result = with_timeout(engine().run(graph, ExecutionContext::new())).await?;

    let downstream = result.task("downstream").unwrap();
    assert_eq!(downstream.state, TaskState::Skipped);
    assert_eq!(downstream.skip_reason, Some(SkipReason::RunAborted));
    assert_eq!(downstream.attempts, 0);
    Ok(())
}

#[tokio::test]
async fn panicking_task_fails_without_killing_the_run() -> TestResult {
    let graph = graph_of([
        FakeTask::new("explodes").panics().continue_on_failure().build(),
        FakeTask::new("fine").build(),
    ]);

    let result = with_timeout(engine().run(graph, ExecutionContext::new())).await?;

    let t = result.task("explodes").unwrap();
    assert_eq!(t.state, TaskState::Failed);
    assert!(t.error.as_ref().unwrap().message().starts_with("task panicked"));
    assert_eq!(result.state_of("fine"), Some(TaskState::Succeeded));
    Ok(())
}

#[tokio::test]
async fn empty_graph_completes_immediately() -> TestResult {
    let result = engine().run(graph_of(Vec::<Task>::new()), ExecutionContext::new()).await?;
    assert_eq!(result.status, RunStatus::Completed);
    assert!(result.tasks.is_empty());
    Ok(())
}

#[tokio::test]
async fn structural_errors_are_returned_before_anything_runs() {
    let rec = Recorder::new();
    let cyclic = graph_of([
        FakeTask::new("a").after(&["b"]).recorder(&rec).build(),
        FakeTask::new("b").after(&["a"]).recorder(&rec).build(),
    ]);
    match engine().run(cyclic, ExecutionContext::new()).await {
        Err(TaskweaveError::DagCycle { path }) => {
            assert_eq!(path.first(), path.last());
            assert_eq!(path.len(), 3);
        }
        other => panic!("expected a cycle error, got {other:?}"),
    }

    let dangling = graph_of([FakeTask::new("a").after(&["ghost"]).recorder(&rec).build()]);
    assert!(matches!(
        engine().run(dangling, ExecutionContext::new()).await,
        Err(TaskweaveError::MissingDependency { .. })
    ));

    let bad_options = Engine::new(RunOptions::default().with_concurrency_limit(0));
    assert!(matches!(
        bad_options.run(graph_of([FakeTask::new("a").build()]), ExecutionContext::new()).await,
        Err(TaskweaveError::Validation(_))
    ));

    assert!(rec.entries().is_empty());
}

#[tokio::test]
async fn free_function_runs_with_a_limit() -> TestResult {
    let graph = graph_of([FakeTask::new("a").build(), FakeTask::new("b").after(&["a"]).build()]);
    let result = taskweave::engine::run(graph, Some(1), CancellationToken::new()).await?;
    assert!(result.is_success());
    Ok(())
}

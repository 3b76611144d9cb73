#![cfg(unix)]

mod common;

use common::{Fixture, SERVER, WAIT, kill_hard, wait_for_job_start};

use pgd_supervisor::{
    ActionError, ErrorKind, JobKind, JobState, RestorePolicy, ServerState, SupervisorEvent,
};

use std::time::Duration;

use googletest::prelude::*;
use serial_test::serial;

async fn running_fixture() -> Fixture {
    let fixture = Fixture::new();
    fixture.registry.start(SERVER).await.unwrap();
    fixture
}

#[tokio::test]
#[serial]
async fn given_running_server_when_dump_submitted_then_file_written() {
    // Given
    let fixture = running_fixture().await;
    let target = fixture.temp.path().join("sales.dump");

    // When
    let ticket = fixture
        .registry
        .submit_job(SERVER, JobKind::dump("sales", &target));
    let id = ticket.id();
    let result = tokio::time::timeout(WAIT, ticket.outcome()).await.unwrap();

    // Then
    assert_that!(result, ok(anything()));
    assert_that!(
        std::fs::read_to_string(&target).unwrap(),
        eq("archive of sales\n")
    );
    assert_that!(fixture.registry.job_state(id), some(eq(JobState::Succeeded)));

    fixture.registry.stop(SERVER).await.unwrap();
}

#[tokio::test]
#[serial]
async fn given_stopped_server_when_job_submitted_then_nothing_spawned() {
    // Given
    let fixture = Fixture::new();

    // When
    let result = fixture
        .registry
        .submit_job(SERVER, JobKind::drop_database("scratch"))
        .outcome()
        .await;

    // Then
    assert_that!(result.map_err(|e| e.kind()), err(eq(ErrorKind::ServerNotRunning)));
    assert_that!(fixture.jobs_log(), is_empty());
}

#[tokio::test]
#[serial]
async fn given_failing_tool_when_job_runs_then_tool_error_with_stderr() {
    // Given
    let fixture = running_fixture().await;
    fixture.set_failure("dropdb", "database \"scratch\" does not exist");

    // When
    let result = fixture
        .registry
        .submit_job(SERVER, JobKind::drop_database("scratch"))
        .outcome()
        .await;

    // Then
    assert_that!(
        result,
        err(eq(&ActionError::ToolError {
            tool: String::from("dropdb"),
            exit_code: Some(1),
            stderr_tail: String::from("dropdb: error: database \"scratch\" does not exist"),
        }))
    );

    fixture.registry.stop(SERVER).await.unwrap();
}

#[tokio::test]
#[serial]
async fn given_several_jobs_when_submitted_then_run_in_order_without_overlap() {
    // Given
    let fixture = running_fixture().await;
    fixture.set_delay("dropdb", 0.2);

    // When
    let tickets: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|db| {
            fixture
                .registry
                .submit_job(SERVER, JobKind::drop_database(db))
        })
        .collect();
    for ticket in tickets {
        let result = tokio::time::timeout(WAIT, ticket.outcome()).await.unwrap();
        assert_that!(result, ok(anything()));
    }

    // Then
    assert_that!(
        fixture.jobs_log(),
        elements_are![
            eq("start dropdb a"),
            eq("end dropdb a"),
            eq("start dropdb b"),
            eq("end dropdb b"),
            eq("start dropdb c"),
            eq("end dropdb c"),
        ]
    );

    fixture.registry.stop(SERVER).await.unwrap();
}

#[tokio::test]
#[serial]
async fn given_concurrent_submitters_when_jobs_run_then_never_overlap() {
    // Given
    let fixture = running_fixture().await;
    fixture.set_delay("dropdb", 0.1);

    // When
    let mut submitters = Vec::new();
    for index in 0..4 {
        let registry = fixture.registry.clone();
        submitters.push(tokio::spawn(async move {
            registry
                .submit_job(SERVER, JobKind::drop_database(format!("db{index}")))
                .outcome()
                .await
        }));
    }
    for submitter in submitters {
        let result = tokio::time::timeout(WAIT, submitter).await.unwrap().unwrap();
        assert_that!(result, ok(anything()));
    }

    // Then: every start is immediately followed by its own end
    let log = fixture.jobs_log();
    assert_that!(log.len(), eq(8));
    for pair in log.chunks(2) {
        let started = pair[0].strip_prefix("start ").unwrap();
        let ended = pair[1].strip_prefix("end ").unwrap();
        assert_that!(started, eq(ended));
    }

    fixture.registry.stop(SERVER).await.unwrap();
}

#[tokio::test]
#[serial]
async fn given_queued_job_when_cancelled_then_resolves_cancelled_and_never_runs() {
    // Given
    let fixture = running_fixture().await;
    fixture.set_delay("dropdb", 0.5);
    let first = fixture
        .registry
        .submit_job(SERVER, JobKind::drop_database("first"));
    let second = fixture
        .registry
        .submit_job(SERVER, JobKind::drop_database("second"));
    let second_id = second.id();

    // When
    let cancel = fixture.registry.cancel_job(second_id);

    // Then
    assert_that!(cancel, ok(anything()));
    assert_that!(second.outcome().await, err(eq(&ActionError::Cancelled)));
    assert_that!(fixture.registry.job_state(second_id), some(eq(JobState::Cancelled)));
    assert_that!(first.outcome().await, ok(anything()));
    assert_that!(
        fixture.jobs_log(),
        elements_are![eq("start dropdb first"), eq("end dropdb first")]
    );

    fixture.registry.stop(SERVER).await.unwrap();
}

#[tokio::test]
#[serial]
async fn given_running_job_when_cancelled_then_cancelled_promptly() {
    // Given
    let fixture = running_fixture().await;
    fixture.set_delay("dropdb", 30.0);
    let ticket = fixture
        .registry
        .submit_job(SERVER, JobKind::drop_database("slow"));
    let id = ticket.id();
    fixture.wait_for_log_line("start dropdb slow").await;

    // When
    let cancel = fixture.registry.cancel_job(id);

    // Then
    assert_that!(cancel, ok(anything()));
    let result = tokio::time::timeout(WAIT, ticket.outcome()).await.unwrap();
    assert_that!(result, err(eq(&ActionError::Cancelled)));
    assert_that!(fixture.registry.job_state(id), some(eq(JobState::Cancelled)));
    assert_that!(
        fixture.registry.cancel_job(id).map_err(|e| e.kind()),
        err(eq(ErrorKind::UnknownJob))
    );

    fixture.registry.stop(SERVER).await.unwrap();
}

#[tokio::test]
#[serial]
async fn given_running_dump_when_server_stopped_then_stop_waits_for_dump() {
    // Given
    let fixture = running_fixture().await;
    fixture.set_delay("pg_dump", 0.5);
    let target = fixture.temp.path().join("sales.dump");
    let ticket = fixture
        .registry
        .submit_job(SERVER, JobKind::dump("sales", &target));
    fixture.wait_for_log_line("start pg_dump sales").await;

    // When
    let stop = tokio::time::timeout(WAIT, fixture.registry.stop(SERVER))
        .await
        .unwrap();

    // Then: the dump finished before the server went away
    assert_that!(stop, ok(anything()));
    assert_that!(ticket.outcome().await, ok(anything()));
    assert_that!(target.exists(), eq(true));
    assert_that!(fixture.registry.status(SERVER), some(eq(ServerState::Stopped)));
}

#[tokio::test]
#[serial]
async fn given_job_outlasting_drain_timeout_when_stopped_then_job_cancelled() {
    // Given
    let mut settings = common::test_settings();
    settings.job_drain_timeout = Duration::from_millis(300);
    let fixture = Fixture::with_settings(settings);
    fixture.registry.start(SERVER).await.unwrap();
    fixture.set_delay("dropdb", 30.0);
    let ticket = fixture
        .registry
        .submit_job(SERVER, JobKind::drop_database("slow"));
    fixture.wait_for_log_line("start dropdb slow").await;

    // When
    let stop = tokio::time::timeout(WAIT, fixture.registry.stop(SERVER))
        .await
        .unwrap();

    // Then
    assert_that!(stop, ok(anything()));
    assert_that!(ticket.outcome().await, err(eq(&ActionError::Cancelled)));
}

#[tokio::test]
#[serial]
async fn given_stopping_server_when_job_submitted_then_server_not_running() {
    // Given
    let fixture = running_fixture().await;
    fixture.set_delay("dropdb", 0.5);
    let running = fixture
        .registry
        .submit_job(SERVER, JobKind::drop_database("first"));
    fixture.wait_for_log_line("start dropdb first").await;
    let registry = fixture.registry.clone();
    let stop = tokio::spawn(async move { registry.stop(SERVER).await });
    fixture
        .wait_for_state(|state| *state == ServerState::Stopping)
        .await;

    // When
    let late = fixture
        .registry
        .submit_job(SERVER, JobKind::drop_database("late"))
        .outcome()
        .await;

    // Then
    assert_that!(late.map_err(|e| e.kind()), err(eq(ErrorKind::ServerNotRunning)));
    assert_that!(running.outcome().await, ok(anything()));
    assert_that!(stop.await.unwrap(), ok(anything()));
}

#[tokio::test]
#[serial]
async fn given_server_crash_during_drop_when_job_resolves_then_tool_error_without_hang() {
    // Given
    let fixture = running_fixture().await;
    fixture.set_delay("dropdb", 30.0);
    let mut events = fixture.registry.subscribe_events();
    let ticket = fixture
        .registry
        .submit_job(SERVER, JobKind::drop_database("scratch"));
    wait_for_job_start(&mut events, ticket.id()).await;
    fixture.wait_for_log_line("start dropdb scratch").await;

    // When
    kill_hard(fixture.server_pid());

    // Then
    let result = tokio::time::timeout(WAIT, ticket.outcome())
        .await
        .expect("job must not hang after the server died");
    assert_that!(result.map_err(|e| e.kind()), err(eq(ErrorKind::ToolError)));

    let finished = std::iter::from_fn(|| events.try_recv().ok())
        .filter(|event| matches!(event, SupervisorEvent::JobFinished { .. }))
        .count();
    assert_that!(finished, eq(1));
}

#[tokio::test]
#[serial]
async fn given_successful_restore_when_finished_then_databases_changed_event() {
    // Given
    let fixture = running_fixture().await;
    let source = fixture.temp.path().join("sales.pg_dump");
    std::fs::write(&source, b"archive").unwrap();
    let mut events = fixture.registry.subscribe_events();

    // When
    let result = fixture
        .registry
        .submit_job(
            SERVER,
            JobKind::restore("sales_copy", &source, RestorePolicy::CreateNew),
        )
        .outcome()
        .await;

    // Then
    assert_that!(result, ok(anything()));
    assert_that!(
        fixture.jobs_log(),
        elements_are![
            eq("start createdb sales_copy"),
            eq("end createdb sales_copy"),
            eq("start pg_restore sales_copy"),
            eq("end pg_restore sales_copy"),
        ]
    );
    let changed = std::iter::from_fn(|| events.try_recv().ok())
        .any(|event| matches!(event, SupervisorEvent::DatabasesChanged { .. }));
    assert_that!(changed, eq(true));

    fixture.registry.stop(SERVER).await.unwrap();
}

#[tokio::test]
#[serial]
async fn given_create_step_fails_when_restoring_then_restore_step_skipped() {
    let fixture = running_fixture().await;
    let source = fixture.temp.path().join("sales.pg_dump");
    std::fs::write(&source, b"archive").unwrap();
    fixture.set_failure("createdb", "database \"sales\" already exists");

    let result = fixture
        .registry
        .submit_job(
            SERVER,
            JobKind::restore("sales", &source, RestorePolicy::CreateNew),
        )
        .outcome()
        .await;

    assert_that!(result.map_err(|e| e.kind()), err(eq(ErrorKind::ToolError)));
    assert_that!(
        fixture.jobs_log(),
        elements_are![eq("start createdb sales"), eq("end createdb sales")]
    );

    fixture.registry.stop(SERVER).await.unwrap();
}

#[tokio::test]
#[serial]
async fn given_successful_dump_when_finished_then_no_databases_changed_event() {
    let fixture = running_fixture().await;
    let mut events = fixture.registry.subscribe_events();
    let target = fixture.temp.path().join("sales.dump");

    fixture
        .registry
        .submit_job(SERVER, JobKind::dump("sales", &target))
        .outcome()
        .await
        .unwrap();

    let changed = std::iter::from_fn(|| events.try_recv().ok())
        .any(|event| matches!(event, SupervisorEvent::DatabasesChanged { .. }));
    assert_that!(changed, eq(false));

    fixture.registry.stop(SERVER).await.unwrap();
}

#[tokio::test]
#[serial]
async fn given_two_servers_when_jobs_submitted_to_each_then_they_overlap() {
    // Given
    let mut fixture = Fixture::new();
    fixture.add_server("pg2");
    fixture.registry.start(SERVER).await.unwrap();
    fixture.registry.start("pg2").await.unwrap();
    fixture.set_delay("pg_dump", 1.0);

    // When
    let first = fixture
        .registry
        .submit_job(SERVER, JobKind::dump("alpha", fixture.temp.path().join("alpha.dump")));
    let second = fixture
        .registry
        .submit_job("pg2", JobKind::dump("beta", fixture.temp.path().join("beta.dump")));
    let (first, second) = tokio::time::timeout(WAIT, async {
        tokio::join!(first.outcome(), second.outcome())
    })
    .await
    .unwrap();

    // Then: both dumps started before either finished
    assert_that!(first, ok(anything()));
    assert_that!(second, ok(anything()));
    let log = fixture.jobs_log();
    let position = |line: &str| log.iter().position(|l| l == line).unwrap();
    let first_end = std::cmp::min(position("end pg_dump alpha"), position("end pg_dump beta"));
    assert_that!(position("start pg_dump alpha") < first_end, eq(true));
    assert_that!(position("start pg_dump beta") < first_end, eq(true));

    fixture.registry.shutdown().await;
}

#[tokio::test]
#[serial]
async fn given_stop_in_progress_when_shutdown_then_waits_for_it() {
    // Given
    let fixture = running_fixture().await;
    fixture.set_delay("dropdb", 0.5);
    let running = fixture
        .registry
        .submit_job(SERVER, JobKind::drop_database("first"));
    fixture.wait_for_log_line("start dropdb first").await;
    let registry = fixture.registry.clone();
    let stop = tokio::spawn(async move { registry.stop(SERVER).await });
    fixture
        .wait_for_state(|state| *state == ServerState::Stopping)
        .await;

    // When
    let results = tokio::time::timeout(WAIT, fixture.registry.shutdown())
        .await
        .unwrap();

    // Then
    assert_that!(results.len(), eq(1));
    assert_that!(results[0].0, eq(SERVER));
    assert_that!(results[0].1, ok(anything()));
    assert_that!(fixture.registry.status(SERVER), some(eq(ServerState::Stopped)));
    assert_that!(running.outcome().await, ok(anything()));
    assert_that!(stop.await.unwrap(), ok(anything()));
}

mod common;

use common::*;
use mpal::domain::{FatalError, FunctionIndex, Moment, Script, ScriptId, Variable};
use mpal::{MpalError, ResourceTables, TaskState};
use std::time::Duration;

fn tables(moments: Vec<Moment>) -> ResourceTables {
    ResourceTables {
        variables: vec![Variable::new("X", 0), Variable::new("Y", 0)],
        scripts: vec![Script {
            id: ScriptId::new(1),
            moments,
        }],
        ..Default::default()
    }
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// Within the timer's millisecond granularity
fn assert_near(actual: Duration, expected: Duration) {
    assert!(
        actual >= expected && actual <= expected + ms(2),
        "expected about {expected:?}, got {actual:?}"
    );
}

/// Integration test: a join barrier waits for every call of the previous moment
#[tokio::test(start_paused = true)]
async fn join_previous_waits_for_all_calls() {
    let runtime = build(tables(vec![
        Moment::at(0, vec![call(1, [0, 0, 0, 120]), call(2, [0, 0, 0, 40])]),
        Moment::join_previous(vec![assign("X", 1), call(3, [0; 4])]),
    ]));
    let recorder = Recorder::new();
    recorder.install(&runtime, &[1, 2, 3]);

    let handle = runtime.execute_script(ScriptId::new(1)).unwrap();

    tokio::time::sleep(ms(60)).await;
    // B is done but A is not
    assert!(recorder.calls_to(2)[0].finished.is_some());
    assert_eq!(runtime.get_variable("X").unwrap(), 0);

    handle.join().await;
    assert_eq!(runtime.get_variable("X").unwrap(), 1);
    tokio::time::sleep(ms(1)).await;

    let a = recorder.calls_to(1)[0];
    let c = recorder.calls_to(3)[0];
    assert!(c.started >= a.finished.unwrap());
    assert!(runtime.fatal_error().is_none());
}

#[tokio::test(start_paused = true)]
async fn calls_within_a_moment_run_concurrently() {
    let runtime = build(tables(vec![Moment::at(
        0,
        vec![call(1, [0, 0, 0, 100]), call(2, [0, 0, 0, 100])],
    )]));
    let recorder = Recorder::new();
    recorder.install(&runtime, &[1, 2]);

    runtime.execute_script(ScriptId::new(1)).unwrap().join().await;
    tokio::time::sleep(ms(150)).await;

    let calls = recorder.calls();
    assert_eq!(calls.len(), 2);
    // Both started before either finished
    assert!(calls.iter().all(|call| call.started < ms(100)));
}

#[tokio::test(start_paused = true)]
async fn moments_fire_at_their_offsets() {
    let runtime = build(tables(vec![
        Moment::at(0, vec![call(1, [0; 4])]),
        Moment::at(50, vec![call(2, [0; 4])]),
        Moment::at(200, vec![assign("Y", 7)]),
    ]));
    let recorder = Recorder::new();
    recorder.install(&runtime, &[1, 2]);

    let handle = runtime.execute_script(ScriptId::new(1)).unwrap();
    tokio::time::sleep(ms(100)).await;
    assert_eq!(runtime.get_variable("Y").unwrap(), 0);

    handle.join().await;
    assert_eq!(runtime.get_variable("Y").unwrap(), 7);
    assert_near(recorder.calls_to(1)[0].started, ms(0));
    assert_near(recorder.calls_to(2)[0].started, ms(50));
}

/// Offsets after a barrier count from the barrier, not from script start
#[tokio::test(start_paused = true)]
async fn barrier_resets_the_script_clock() {
    let runtime = build(tables(vec![
        Moment::at(0, vec![call(1, [0, 0, 0, 100])]),
        Moment::join_previous(Vec::new()),
        Moment::at(30, vec![call(2, [0; 4])]),
    ]));
    let recorder = Recorder::new();
    recorder.install(&runtime, &[1, 2]);

    runtime.execute_script(ScriptId::new(1)).unwrap().join().await;
    tokio::time::sleep(ms(1)).await;
    assert_near(recorder.calls_to(2)[0].started, ms(130));
}

#[tokio::test(start_paused = true)]
async fn unknown_script_is_not_found() {
    let runtime = build(tables(Vec::new()));
    assert!(matches!(
        runtime.execute_script(ScriptId::new(9)),
        Err(MpalError::NotFound { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn unknown_function_fails_the_script() {
    let runtime = build(tables(vec![
        Moment::at(0, vec![assign("X", 1), call(42, [0; 4])]),
        Moment::at(10, vec![assign("X", 2)]),
    ]));

    let handle = runtime.execute_script(ScriptId::new(1)).unwrap();
    handle.join().await;

    assert_eq!(handle.state(), TaskState::Finished);
    assert_eq!(runtime.get_variable("X").unwrap(), 1);
    assert_eq!(
        runtime.fatal_error(),
        Some(MpalError::Fatal(FatalError::UnknownFunction(FunctionIndex::new(42))))
    );
}

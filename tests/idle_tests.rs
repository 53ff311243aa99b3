mod common;

use common::*;
use mpal::domain::{Action, Item, ItemId, LocationId, Variable};
use mpal::{MpalError, ResourceTables, Runtime, RuntimeConfig};
use std::time::Duration;
use tokio::time::Instant;

const HALL: LocationId = LocationId::new(3);
const EMPTY: LocationId = LocationId::new(4);
const CLOCK: ItemId = ItemId::new(10);

fn tables(actions: Vec<Action>) -> ResourceTables {
    ResourceTables {
        variables: vec![
            Variable::new("Status.10", 1),
            Variable::new("Location.10", 3),
            Variable::new("Status.11", 1),
            Variable::new("Location.11", 3),
            Variable::new("Count", 0),
            Variable::new("Flag", 0),
        ],
        items: vec![
            Item::new(CLOCK, actions),
            Item::new(ItemId::new(11), vec![Action::new(1, 0, vec![increment("Count")])]),
        ],
        ..Default::default()
    }
}

fn runtime_with(actions: Vec<Action>, config: RuntimeConfig) -> (Runtime, Recorder) {
    let runtime = Runtime::builder(tables(actions))
        .config(config)
        .build()
        .unwrap();
    let recorder = Recorder::new();
    recorder.install(&runtime, &[1]);
    (runtime, recorder)
}

fn runtime(actions: Vec<Action>) -> (Runtime, Recorder) {
    runtime_with(actions, test_config())
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

fn count(runtime: &Runtime) -> i32 {
    runtime.get_variable("Count").unwrap()
}

/// Integration test: dispatch rate over 1000 deadlines matches the idle percent
/// Metric: dispatched fraction within 0.05 of 0.30
#[tokio::test(start_paused = true)]
async fn dispatch_rate_follows_percent() {
    let (runtime, _recorder) =
        runtime(vec![Action::new(99, 0, vec![increment("Count")]).with_idle(10, 30)]);

    runtime.start_idle_poll(HALL).unwrap();
    // Deadlines at 0, 10, ..., 9990
    tokio::time::sleep(ms(9_995)).await;
    runtime.stop_idle_poll(HALL).await.unwrap();

    let fraction = f64::from(count(&runtime)) / 1000.0;
    assert!(
        (fraction - 0.30).abs() <= 0.05,
        "dispatched fraction {fraction}"
    );
    assert!(runtime.fatal_error().is_none());
}

#[tokio::test(start_paused = true)]
async fn slot_table_is_bounded() {
    let config = RuntimeConfig {
        max_polling_locations: 2,
        ..test_config()
    };
    let (runtime, _recorder) = runtime_with(
        vec![Action::new(99, 0, vec![increment("Count")]).with_idle(10, 0)],
        config,
    );

    runtime.start_idle_poll(HALL).unwrap();
    assert_eq!(
        runtime.start_idle_poll(HALL).unwrap_err(),
        MpalError::AlreadyPolling { location: HALL }
    );

    // A location without idle items still occupies its slot
    runtime.start_idle_poll(EMPTY).unwrap();
    tokio::time::sleep(ms(5)).await;
    assert!(runtime.is_polling(EMPTY));
    assert_eq!(
        runtime.start_idle_poll(LocationId::new(5)).unwrap_err(),
        MpalError::LimitExceeded { capacity: 2 }
    );

    runtime.stop_idle_poll(EMPTY).await.unwrap();
    assert_eq!(
        runtime.stop_idle_poll(EMPTY).await.unwrap_err(),
        MpalError::NotPolling { location: EMPTY }
    );
    runtime.start_idle_poll(LocationId::new(5)).unwrap();

    runtime.stop_idle_poll(HALL).await.unwrap();
    runtime.stop_idle_poll(LocationId::new(5)).await.unwrap();
    assert!(!runtime.is_polling(HALL));
}

/// Integration test: nothing dispatches for a location after its poll stops
#[tokio::test(start_paused = true)]
async fn stop_prevents_further_dispatch() {
    let (runtime, _recorder) =
        runtime(vec![Action::new(99, 0, vec![increment("Count")]).with_idle(10, 100)]);

    runtime.start_idle_poll(HALL).unwrap();
    tokio::time::sleep(ms(55)).await;
    runtime.stop_idle_poll(HALL).await.unwrap();

    // Deadlines at 0, 10, 20, 30, 40, 50
    assert_eq!(count(&runtime), 6);
    tokio::time::sleep(ms(200)).await;
    assert_eq!(count(&runtime), 6);
}

/// Integration test: stop kills idle actions outliving the shutdown timeout
#[tokio::test(start_paused = true)]
async fn stop_kills_stragglers_after_timeout() {
    let config = RuntimeConfig {
        idle_shutdown_timeout_ms: 50,
        ..test_config()
    };
    let (runtime, recorder) = runtime_with(
        vec![Action::new(99, 0, vec![call(1, [0, 0, 0, 100_000]), increment("Count")]).with_idle(10, 100)],
        config,
    );

    runtime.start_idle_poll(HALL).unwrap();
    tokio::time::sleep(ms(45)).await;
    // One outstanding idle task per item
    assert_eq!(recorder.calls_to(1).len(), 1);
    assert!(runtime.idle_fast_forward());

    let stopper = {
        let runtime = runtime.clone();
        tokio::spawn(async move { runtime.stop_idle_poll(HALL).await })
    };
    tokio::time::sleep(ms(10)).await;
    assert!(!runtime.idle_fast_forward());

    let before = Instant::now();
    stopper.await.unwrap().unwrap();
    assert!(before.elapsed() >= ms(35));
    assert!(runtime.idle_fast_forward());

    tokio::time::sleep(ms(1)).await;
    assert_eq!(recorder.calls_to(1)[0].finished, None);
    assert_eq!(count(&runtime), 0);
    assert!(runtime.fatal_error().is_none());
}

#[tokio::test(start_paused = true)]
async fn idle_and_host_actions_exclude_each_other() {
    let (runtime, recorder) = runtime(vec![
        Action::new(1, 0, vec![call(1, [1, 0, 0, 100])]),
        Action::new(99, 0, vec![call(1, [2, 0, 0, 30]), increment("Count")]).with_idle(10, 100),
    ]);

    // Host action first: idle firings on the same item are skipped
    let host = runtime.do_action(1, CLOCK, 0).unwrap();
    runtime.start_idle_poll(HALL).unwrap();
    tokio::time::sleep(ms(55)).await;
    assert_eq!(count(&runtime), 0);

    host.join().await;
    tokio::time::sleep(ms(15)).await;
    let idle_calls = recorder
        .calls_to(1)
        .into_iter()
        .filter(|call| call.args[0] == 2)
        .count();
    assert_eq!(idle_calls, 1);

    // Idle action in flight: the host is turned away
    assert_eq!(
        runtime.do_action(1, CLOCK, 0).unwrap_err(),
        MpalError::ActionInProgress { item: CLOCK }
    );

    runtime.stop_idle_poll(HALL).await.unwrap();
    assert_eq!(count(&runtime), 1);
    tokio::time::sleep(ms(1)).await;
    assert!(runtime.do_action(1, CLOCK, 0).is_ok());
}

#[tokio::test(start_paused = true)]
async fn idle_precondition_gates_dispatch() {
    let (runtime, _recorder) = runtime(vec![
        Action::new(99, 0, vec![increment("Count")])
            .with_when(var_equals("Flag", 1))
            .with_idle(10, 100),
    ]);

    runtime.start_idle_poll(HALL).unwrap();
    tokio::time::sleep(ms(55)).await;
    assert_eq!(count(&runtime), 0);

    runtime.set_variable("Flag", 1).unwrap();
    tokio::time::sleep(ms(30)).await;
    runtime.stop_idle_poll(HALL).await.unwrap();

    // Deadlines at 60, 70, 80
    assert_eq!(count(&runtime), 3);
}

#[tokio::test(start_paused = true)]
async fn inactive_item_does_not_fire() {
    let (runtime, _recorder) =
        runtime(vec![Action::new(99, 0, vec![increment("Count")]).with_idle(10, 100)]);
    runtime.set_variable("Status.10", 0).unwrap();

    runtime.start_idle_poll(HALL).unwrap();
    tokio::time::sleep(ms(55)).await;
    assert_eq!(count(&runtime), 0);

    runtime.set_variable("Status.10", 1).unwrap();
    tokio::time::sleep(ms(30)).await;
    runtime.stop_idle_poll(HALL).await.unwrap();

    // Deadlines at 60, 70, 80
    assert_eq!(count(&runtime), 3);
    assert!(runtime.fatal_error().is_none());
}

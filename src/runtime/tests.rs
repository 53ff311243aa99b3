//! Tests for the runtime facade

use super::*;
use crate::config::FatalPolicy;
use crate::domain::entities::{Message, Variable};
use crate::domain::errors::FatalError;

#[derive(Default)]
struct RecordingObserver {
    events: Mutex<Vec<(&'static str, ItemId, i32)>>,
}

impl ItemObserver for RecordingObserver {
    fn pattern_changed(&self, item: ItemId, pattern: i32) {
        lock(&self.events).push(("pattern", item, pattern));
    }

    fn status_changed(&self, item: ItemId, status: i32) {
        lock(&self.events).push(("status", item, status));
    }
}

fn tables() -> ResourceTables {
    let mut named = Item::new(ItemId::new(7), Vec::new());
    named.name = Some("lantern".to_string());
    ResourceTables {
        variables: vec![
            Variable::new("Status.7", 1),
            Variable::new("Pattern.7", 0),
            Variable::new("Location.7", 3),
            Variable::new("Location.8", 3),
            Variable::new("Location.9", 4),
            Variable::new("Score", 10),
        ],
        messages: vec![Message {
            id: 5,
            text: "The door is locked.".to_string(),
        }],
        items: vec![named],
        ..Default::default()
    }
}

fn runtime() -> Runtime {
    let config = RuntimeConfig {
        fatal_policy: FatalPolicy::Record,
        ..Default::default()
    };
    Runtime::builder(tables()).config(config).build().unwrap()
}

#[test]
fn get_and_set_variable() {
    let runtime = runtime();
    assert_eq!(runtime.get_variable("Score").unwrap(), 10);

    runtime.set_variable("Score", 42).unwrap();
    assert_eq!(runtime.get_variable("Score").unwrap(), 42);
}

#[test]
fn unknown_variable_is_not_found() {
    let runtime = runtime();
    assert!(matches!(
        runtime.get_variable("Missing"),
        Err(MpalError::NotFound { .. })
    ));
    assert!(matches!(
        runtime.set_variable("Missing", 1),
        Err(MpalError::NotFound { .. })
    ));
}

#[test]
fn observer_sees_pattern_and_status_writes() {
    let runtime = runtime();
    let observer = Arc::new(RecordingObserver::default());
    runtime.set_item_observer(observer.clone());

    runtime.set_variable("Pattern.7", 2).unwrap();
    runtime.set_variable("Status.7", 0).unwrap();
    runtime.set_variable("Score", 99).unwrap();

    let events = lock(&observer.events).clone();
    assert_eq!(
        events,
        vec![
            ("pattern", ItemId::new(7), 2),
            ("status", ItemId::new(7), 0),
        ]
    );
}

#[test]
fn assignment_commands_notify_observer() {
    let runtime = runtime();
    let observer = Arc::new(RecordingObserver::default());
    runtime.set_item_observer(observer.clone());

    runtime
        .assign(&"Pattern.7".into(), &Expression::Const(5))
        .unwrap();
    assert_eq!(lock(&observer.events).as_slice(), &[("pattern", ItemId::new(7), 5)]);
}

#[test]
fn load_resources_rejects_duplicate_variables() {
    let mut tables = tables();
    tables.variables.push(Variable::new("Score", 1));
    let err = Runtime::load_resources(tables).err().unwrap();
    assert!(matches!(err, MpalError::Fatal(FatalError::Consistency(_))));
}

#[test]
fn lookups_over_tables() {
    let runtime = runtime();
    assert_eq!(runtime.message(5), Some("The door is locked."));
    assert_eq!(runtime.message(6), None);
    assert_eq!(runtime.item_name(ItemId::new(7)), Some("lantern"));
    assert_eq!(runtime.item_name(ItemId::new(8)), None);
    assert_eq!(
        runtime.items_in_location(LocationId::new(3)),
        vec![ItemId::new(7), ItemId::new(8)]
    );
}

#[test]
fn missing_status_counts_as_inactive() {
    let runtime = runtime();
    assert_eq!(runtime.item_status(ItemId::new(7)), 1);
    assert_eq!(runtime.item_status(ItemId::new(8)), -1);
}

#[tokio::test]
async fn unknown_custom_function_is_fatal() {
    let runtime = runtime();
    let err = runtime
        .call_custom(FunctionIndex::new(12), [0; 4])
        .await
        .unwrap_err();
    assert!(err.is_fatal());
}

#[tokio::test]
async fn registered_custom_function_receives_arguments() {
    let runtime = runtime();
    runtime.register_custom_function(
        1,
        from_fn(|runtime: Runtime, args: CustomArgs| async move {
            runtime.set_variable("Score", args.iter().sum())
        }),
    );

    runtime
        .execute_command(&Command::CustomCall {
            function: FunctionIndex::new(1),
            args: [1, 2, 3, 4],
        })
        .await
        .unwrap();
    assert_eq!(runtime.get_variable("Score").unwrap(), 10);
}

#[test]
fn escalate_records_fatal_errors_only() {
    let runtime = runtime();
    runtime.escalate(MpalError::AlreadyRunning);
    assert!(runtime.fatal_error().is_none());

    runtime.escalate(MpalError::evaluation("division by zero"));
    assert!(runtime.fatal_error().is_some());
}

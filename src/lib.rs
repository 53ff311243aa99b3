//! # mpal
//!
//! A cooperative scripting runtime for point-and-click adventure games.
//! Item actions, branching dialogs, timed scripts and per-location idle
//! behaviour run as tasks over a shared store of named integer variables.
//!
//! Resource tables come already parsed (see [`infrastructure`] for a JSON
//! loader); game-specific side effects are host callbacks registered by
//! index as [`CustomFunction`]s.
//!
//! ## Quick Start
//!
//! ```rust
//! use mpal::domain::{Action, Command, Item, ItemId, Variable};
//! use mpal::{ResourceTables, Runtime};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), mpal::MpalError> {
//! let tables = ResourceTables {
//!     variables: vec![Variable::new("Status.42", 1), Variable::new("Flag.1", 0)],
//!     items: vec![Item::new(
//!         ItemId::new(42),
//!         vec![Action::new(1, 0, vec![Command::VarAssign {
//!             name: "Flag.1".into(),
//!             value: mpal::domain::Expression::Const(1),
//!         }])],
//!     )],
//!     ..Default::default()
//! };
//!
//! let runtime = Runtime::load_resources(tables)?;
//! let handle = runtime.do_action(1, ItemId::new(42), 0)?;
//! handle.join().await;
//! assert_eq!(runtime.get_variable("Flag.1")?, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Dialogs
//!
//! A running dialog blocks on host input at each choice. The host loops on
//! [`Runtime::wait_for_choice`], reads the options with
//! [`Runtime::dialog_select_list`] and answers with
//! [`Runtime::select_choice`] until [`ChoiceWait::NoDialog`] comes back.

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod runtime;
pub mod scheduler;
pub mod storage;

pub use config::{FatalPolicy, RuntimeConfig};
pub use domain::entities::ResourceTables;
pub use domain::errors::{FatalError, MpalError};
pub use runtime::{
    ChoiceWait, CustomFunction, FunctionRegistry, Runtime, RuntimeBuilder, VariableStore, from_fn,
};
pub use scheduler::{Event, INFINITE, Scheduler, TaskHandle, TaskId, TaskState, WaitOutcome};

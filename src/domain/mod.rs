//! Domain layer - Resource tables, commands and the host boundaries
//!
//! This layer holds the data the runtime executes, independent of how tasks
//! are scheduled or how tables are loaded.

pub mod entities;
pub mod errors;
pub mod repositories;
pub mod services;
pub mod value_objects;

pub use entities::*;
pub use errors::*;
pub use repositories::*;
pub use services::*;
pub use value_objects::*;

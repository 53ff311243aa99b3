//! Infrastructure layer - Concrete sources of resource tables

pub mod repositories;

pub use repositories::*;

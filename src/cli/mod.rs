//! Command-line host for the runtime

pub mod play;

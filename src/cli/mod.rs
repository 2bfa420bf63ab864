//! CLI command implementations

pub mod cleanup;
pub mod definition;
pub mod image;
pub mod run;

pub use definition::{Cli, Commands};

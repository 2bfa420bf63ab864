//! agentbox - Docker sandbox sessions for interactive AI coding agents

pub mod agents;
pub mod cli;
pub mod config;
pub mod containers;
pub mod session;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

// AutoFlow — build, store and replay automation workflows
// License: Apache-2.0

pub mod config;
pub mod executor;
pub mod logger;
pub mod sequencer;
pub mod storage;
pub mod theme;
pub mod workflow;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

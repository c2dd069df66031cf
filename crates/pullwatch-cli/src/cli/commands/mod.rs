//! CLI command handlers, one per file.

mod config;
mod demo;

pub use config::run_config;
pub use demo::{run_demo, DemoArgs};

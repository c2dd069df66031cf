//! `pullwatch config` – print the config path and effective values.

use anyhow::Result;
use pullwatch_core::config::{self, PullwatchConfig};

pub fn run_config(cfg: &PullwatchConfig) -> Result<()> {
    println!("# {}", config::config_path()?.display());
    print!("{}", toml::to_string_pretty(cfg)?);
    Ok(())
}

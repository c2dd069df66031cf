//! CLI for the pullwatch progress tracker.

mod commands;
mod simulated_pull;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pullwatch_core::config;

use commands::{run_config, run_demo, DemoArgs};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "pullwatch")]
#[command(about = "pullwatch: live progress for content-addressed image pulls", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run a synthetic pull against an in-memory content store with live progress.
    Demo {
        /// Image reference shown in the progress header.
        reference: String,

        /// Number of layers in the synthetic image.
        #[arg(long, default_value = "4", value_name = "N")]
        layers: usize,

        /// Size of each layer in bytes.
        #[arg(long, default_value = "4194304", value_name = "BYTES")]
        layer_size: u64,

        /// Make the last layer fail halfway through.
        #[arg(long)]
        fail: bool,
    },

    /// Show the config file location and effective settings.
    Config,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Demo {
                reference,
                layers,
                layer_size,
                fail,
            } => {
                let args = DemoArgs {
                    reference,
                    layers,
                    layer_size,
                    fail,
                };
                run_demo(&cfg, &args).await?;
            }
            CliCommand::Config => run_config(&cfg)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;

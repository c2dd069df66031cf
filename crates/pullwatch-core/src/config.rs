use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Progress display parameters (`[progress]` in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressConfig {
    /// Sampling/redraw interval in milliseconds.
    pub tick_interval_ms: u64,
    /// Column width for job names; longer names are elided.
    pub name_width: usize,
    /// Draw the elapsed/total footer under the table.
    pub show_totals: bool,
    /// Widest line the table may draw; 0 means the terminal width.
    pub max_line_width: usize,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            name_width: 40,
            show_totals: true,
            max_line_width: 0,
        }
    }
}

impl ProgressConfig {
    /// Tick interval, never below 1ms.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

/// Synthetic pull parameters for `pullwatch demo` (`[demo]` in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Layers fetched at the same time.
    pub max_concurrent_downloads: usize,
    /// Bytes written per simulated chunk.
    pub chunk_bytes: u64,
    /// Delay between chunks in milliseconds.
    pub chunk_interval_ms: u64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: 3,
            chunk_bytes: 256 * 1024,
            chunk_interval_ms: 50,
        }
    }
}

/// Global configuration loaded from `~/.config/pullwatch/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PullwatchConfig {
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub demo: DemoConfig,
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("pullwatch")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<PullwatchConfig> {
    load_or_init_at(&config_path()?)
}

pub fn load_or_init_at(path: &Path) -> Result<PullwatchConfig> {
    if !path.exists() {
        let default_cfg = PullwatchConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path)?;
    let cfg: PullwatchConfig = toml::from_str(&data)?;
    Ok(cfg)
}

//! Configuration loading.
//!
//! Optional TOML config at `~/.config/cc-history/config.toml`:
//!
//! ```toml
//! claude_dir = "~/.claude"   # Override for non-standard installs
//!
//! [search]
//! limit = 50                 # Max history-search results
//! ```
//!
//! The resolved directories are built once at startup and passed down
//! explicitly, so readers and the path decoder never consult ambient
//! process state themselves.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

// =============================================================================
// Config File Schema
// =============================================================================

#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Root of Claude Code's data directory (default: ~/.claude)
    pub claude_dir: Option<String>,
    #[serde(default)]
    pub search: SearchSettings,
}

#[derive(Debug, Deserialize)]
pub struct SearchSettings {
    #[serde(default = "default_search_limit")]
    pub limit: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            limit: default_search_limit(),
        }
    }
}

fn default_search_limit() -> usize {
    50
}

/// Load config from ~/.config/cc-history/config.toml (absent file = defaults)
pub fn load_config() -> Result<Config> {
    let home = dirs::home_dir().context("Could not find home directory")?;
    let config_path = home.join(".config/cc-history/config.toml");

    if !config_path.exists() {
        return Ok(Config::default());
    }

    let content = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

    Ok(config)
}

// =============================================================================
// Resolved Storage Locations
// =============================================================================

/// Where Claude Code keeps its history on this machine.
#[derive(Debug, Clone)]
pub struct ClaudeDirs {
    /// ~/.claude (or the configured override)
    pub root: PathBuf,
    /// ~/.claude/projects
    pub projects: PathBuf,
}

impl ClaudeDirs {
    /// Resolve storage locations from config, expanding `~`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let root = match &config.claude_dir {
            Some(dir) => PathBuf::from(shellexpand::tilde(dir).as_ref()),
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".claude"),
        };
        let projects = root.join("projects");
        Ok(Self { root, projects })
    }

    /// The flat prompt log searched by `--search`.
    pub fn history_file(&self) -> PathBuf {
        self.root.join("history.jsonl")
    }
}

// =============================================================================
// Tests
// =============================================================================

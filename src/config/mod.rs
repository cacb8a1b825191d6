mod file_config;

pub use file_config::FileConfig;

use crate::metadata::{EngineOptions, SidecarMode, DEFAULT_UNDO_DEPTH};
use anyhow::{bail, Result};
use clap::ValueEnum;
use std::path::PathBuf;

pub const DEFAULT_LOG_LEVEL: &str = "INFO";

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub undo_depth: Option<usize>,
    pub sidecar_mode: Option<SidecarMode>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    /// Default tracing directive, used when `LOG_LEVEL` is not set.
    pub log_level: String,
    pub undo_depth: usize,
    pub sidecar_mode: SidecarMode,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_path must be specified on the command line or in config file")
            })?;

        if db_path.is_dir() {
            bail!("db_path is a directory: {:?}", db_path);
        }
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            if !parent.is_dir() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }

        let log_level = file
            .log_level
            .or_else(|| cli.log_level.clone())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        let undo_depth = file
            .undo_depth
            .or(cli.undo_depth)
            .unwrap_or(DEFAULT_UNDO_DEPTH);
        if undo_depth == 0 {
            bail!("undo_depth must be at least 1");
        }

        let sidecar_mode = match file.sidecar_mode {
            Some(s) => parse_sidecar_mode(&s)
                .ok_or_else(|| anyhow::anyhow!("Unknown sidecar_mode in config file: {}", s))?,
            None => cli.sidecar_mode.unwrap_or_default(),
        };

        Ok(Self {
            db_path,
            log_level,
            undo_depth,
            sidecar_mode,
        })
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            undo_depth: self.undo_depth,
            sidecar_mode: self.sidecar_mode,
        }
    }
}

fn parse_sidecar_mode(s: &str) -> Option<SidecarMode> {
    SidecarMode::from_str(s, true).ok()
}

//! Configuration loading and discovery for `tiletag.toml`
//!
//! A project may keep export defaults in a `tiletag.toml` next to (or
//! above) its assets. CLI flags override file values, file values
//! override built-in defaults.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::export::ExportOptions;

/// Name of the project configuration file.
pub const CONFIG_FILE: &str = "tiletag.toml";

/// Error raised while reading or validating `tiletag.toml`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// Config file could not be read
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Config file is not valid TOML
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// Config file parsed but holds unusable values
    #[error("invalid config {}: {}", .path.display(), .problems.join("; "))]
    Invalid { path: PathBuf, problems: Vec<String> },
}

/// Root of a `tiletag.toml` file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TiletagConfig {
    /// The `[export]` table
    pub export: ExportSection,
}

/// The `[export]` table: defaults applied to every export.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExportSection {
    /// Tile edge length in pixels
    pub tile_size: Option<u32>,
    /// Atlas column count (0 = square-ish auto layout)
    pub columns: Option<u32>,
    /// Palette index treated as transparent
    pub transparent_index: Option<u8>,
    /// Default output directory
    pub out: Option<PathBuf>,
}

impl TiletagConfig {
    /// Check config values that cannot be rejected by types alone.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.export.tile_size == Some(0) {
            errors.push("export.tile_size must be greater than 0".to_string());
        }
        errors
    }
}

/// Flag values layered over whatever the config file provides.
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    /// `--tile-size`
    pub tile_size: Option<u32>,
    /// `--columns`
    pub columns: Option<u32>,
    /// `--transparent-index`
    pub transparent_index: Option<u8>,
    /// `-o`/`--out`
    pub out: Option<PathBuf>,
}

/// Locate the nearest `tiletag.toml`.
///
/// Ancestors of the working directory are checked first, closest wins;
/// the per-user config directory is the fallback.
pub fn find_config() -> Option<PathBuf> {
    env::current_dir()
        .ok()
        .and_then(find_config_from)
        .or_else(find_xdg_config)
}

/// Per-user fallback location: `$XDG_CONFIG_HOME/tiletag/tiletag.toml`,
/// with `~/.config` standing in when `XDG_CONFIG_HOME` is unset.
pub fn find_xdg_config() -> Option<PathBuf> {
    let base = match env::var_os("XDG_CONFIG_HOME") {
        Some(dir) => PathBuf::from(dir),
        None => PathBuf::from(env::var_os("HOME")?).join(".config"),
    };
    let candidate = base.join("tiletag").join(CONFIG_FILE);
    candidate.is_file().then_some(candidate)
}

/// Walk from `start` toward the filesystem root and return the first
/// `tiletag.toml` encountered.
pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    let mut dir = start.as_path();
    loop {
        let candidate = dir.join(CONFIG_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
}

/// Load the effective configuration.
///
/// An explicit `path` wins; otherwise discovery runs. When nothing is
/// found the built-in defaults apply.
pub fn load_config(path: Option<&Path>) -> Result<TiletagConfig, ConfigError> {
    match path.map(Path::to_path_buf).or_else(find_config) {
        Some(file) => load_config_file(&file),
        None => Ok(TiletagConfig::default()),
    }
}

fn load_config_file(path: &Path) -> Result<TiletagConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: TiletagConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    let problems = config.validate();
    if problems.is_empty() {
        Ok(config)
    } else {
        Err(ConfigError::Invalid {
            path: path.to_path_buf(),
            problems,
        })
    }
}

/// Resolve the effective export options from config and CLI values.
///
/// Precedence per field: CLI flag, then config file, then default.
pub fn resolve_options(config: &TiletagConfig, overrides: &CliOverrides) -> ExportOptions {
    let defaults = ExportOptions::default();
    ExportOptions {
        tile_size: overrides
            .tile_size
            .or(config.export.tile_size)
            .unwrap_or(defaults.tile_size),
        atlas_columns: overrides
            .columns
            .or(config.export.columns)
            .unwrap_or(defaults.atlas_columns),
        transparent_index: overrides
            .transparent_index
            .or(config.export.transparent_index)
            .unwrap_or(defaults.transparent_index),
        decode: defaults.decode,
    }
}

/// Effective output directory: CLI flag, then config file, if either set.
pub fn resolve_out_dir(config: &TiletagConfig, overrides: &CliOverrides) -> Option<PathBuf> {
    overrides.out.clone().or_else(|| config.export.out.clone())
}

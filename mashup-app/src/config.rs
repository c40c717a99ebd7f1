//! Simple configuration file for mashup
//!
//! Stores default mix preferences as `key = value` lines.

use anyhow::{bail, Context};
use mashup_audio::{BitDepth, KeyMode, TempoMode};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// User defaults; every field may be overridden on the command line
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MixConfig {
    pub tempo_mode: Option<TempoMode>,
    pub key_mode: Option<KeyMode>,
    pub normalize: Option<bool>,
    pub bit_depth: Option<BitDepth>,
    /// Append tempo and key to exported track names
    pub tag_exports: Option<bool>,
}

impl MixConfig {
    /// Load from `path`, or from the default location when `None`
    ///
    /// A missing default file yields the default config. An explicit path
    /// must exist.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = Self::config_path();
                match fs::read_to_string(&path) {
                    Ok(content) => Self::parse(&content)
                        .with_context(|| format!("Invalid config file {}", path.display())),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
                    Err(e) => Err(e)
                        .with_context(|| format!("Failed to read config {}", path.display())),
                }
            }
        }
    }

    /// Load config from a specific path
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Get the default config file path
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mashup")
            .join("config.txt")
    }

    /// Parse config from simple key=value format
    fn parse(content: &str) -> anyhow::Result<Self> {
        let mut config = Self::default();

        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                bail!("line {}: expected `key = value`", number + 1);
            };
            let key = key.trim();
            let value = value.trim();
            let at = || format!("line {}: {key}", number + 1);

            match key {
                "tempo_mode" => config.tempo_mode = Some(value.parse::<TempoMode>().with_context(at)?),
                "key_mode" => config.key_mode = Some(value.parse::<KeyMode>().with_context(at)?),
                "normalize" => config.normalize = Some(parse_bool(value).with_context(at)?),
                "tag_exports" => config.tag_exports = Some(parse_bool(value).with_context(at)?),
                "bit_depth" => {
                    let bits: u16 = value.parse().with_context(at)?;
                    match BitDepth::from_bits(bits) {
                        Some(depth) => config.bit_depth = Some(depth),
                        None => bail!("{}: unsupported bit depth {bits}", at()),
                    }
                }
                other => tracing::warn!(key = other, "Ignoring unknown config key"),
            }
        }

        Ok(config)
    }
}

fn parse_bool(value: &str) -> anyhow::Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => bail!("expected a boolean, got {value:?}"),
    }
}

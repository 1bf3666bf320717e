//! Scan configuration: a JSON file with command-line overrides.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Byte offset of the FAT32 volume within the image.
    pub partition_offset: u64,
    /// Deepest directory level to descend into; `None` walks everything.
    pub max_depth: Option<usize>,
    /// Report "." and ".." entries alongside real ones.
    pub show_meta_entries: bool,
    pub output: OutputFormat,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            partition_offset: 0,
            max_depth: None,
            show_meta_entries: true,
            output: OutputFormat::Text,
        }
    }
}

impl ScanConfig {
    /// Get the user config directory path
    pub fn user_config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("fat32-usage"))
    }

    /// Get the user config file path
    pub fn user_config_path() -> Option<PathBuf> {
        Self::user_config_dir().map(|dir| dir.join("config.json"))
    }

    /// Load configuration from `explicit` if given, otherwise from the user
    /// config file when one exists, otherwise the defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_path(path);
        }
        if let Some(user_config) = Self::user_config_path() {
            if user_config.exists() {
                return Self::load_from_path(&user_config);
            }
        }
        Ok(Self::default())
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("invalid config {}", path.display()))
    }

    /// Apply command-line overrides on top of loaded values.
    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(offset) = overrides.partition_offset {
            self.partition_offset = offset;
        }
        if let Some(depth) = overrides.max_depth {
            self.max_depth = Some(depth);
        }
        if overrides.hide_meta {
            self.show_meta_entries = false;
        }
        if overrides.json {
            self.output = OutputFormat::Json;
        }
    }
}

/// Values given on the command line that take priority over the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub partition_offset: Option<u64>,
    pub max_depth: Option<usize>,
    pub hide_meta: bool,
    pub json: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub image: PathBuf,
    pub config: Option<PathBuf>,
    pub overrides: Overrides,
}

pub const USAGE: &str = "usage: fat32-usage [--config FILE] [--offset BYTES] [--max-depth N] [--no-meta] [--json] IMAGE";

impl CliArgs {
    /// Parse arguments, excluding the program name.
    pub fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self> {
        let mut image = None;
        let mut config = None;
        let mut overrides = Overrides::default();
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => config = Some(PathBuf::from(value_for(&mut args, &arg)?)),
                "--offset" => {
                    let value = value_for(&mut args, &arg)?;
                    overrides.partition_offset = Some(parse_number(&value)?);
                }
                "--max-depth" => {
                    let value = value_for(&mut args, &arg)?;
                    overrides.max_depth = Some(
                        value
                            .parse()
                            .with_context(|| format!("invalid depth: {value}"))?,
                    );
                }
                "--no-meta" => overrides.hide_meta = true,
                "--json" => overrides.json = true,
                flag if flag.starts_with("--") => bail!("unknown option {flag}\n{USAGE}"),
                path => {
                    if image.replace(PathBuf::from(path)).is_some() {
                        bail!("more than one image given\n{USAGE}");
                    }
                }
            }
        }

        Ok(Self {
            image: image.ok_or_else(|| anyhow!("no image given\n{USAGE}"))?,
            config,
            overrides,
        })
    }
}

fn value_for(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<String> {
    args.next()
        .ok_or_else(|| anyhow!("{flag} needs a value\n{USAGE}"))
}

/// Decimal or 0x-prefixed hexadecimal.
fn parse_number(value: &str) -> Result<u64> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.with_context(|| format!("invalid number: {value}"))
}

//! File configuration for CLI defaults.
//!
//! `config.toml` holds one `key = value` per line. Strings are double-quoted,
//! integers bare, and `#` starts a comment outside strings. Command-line flags
//! win over file values.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};

/// Config file name inside the application config directory.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Values read from `config.toml`; `None` means "use the built-in default".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// API host override.
    pub api_host: Option<String>,
    /// Base URL of the external signing service.
    pub signer_url: Option<String>,
    /// Per-request timeout in seconds (1..=3600).
    pub timeout_secs: Option<u64>,
    /// Attempts per logical request (1..=10).
    pub max_attempts: Option<u32>,
    /// Delay between transport retries in milliseconds (0..=60000).
    pub retry_delay_ms: Option<u64>,
    /// Replies fetched per comment (1..=100).
    pub reply_cap: Option<usize>,
    /// Concurrent reply listings (1..=16).
    pub reply_fan_out: Option<usize>,
    /// Proxy addresses.
    pub proxies: Vec<String>,
    /// URL used by `proxy test`.
    pub proxy_probe_url: Option<String>,
    /// Lifetime of sessions saved by `session set` (1..=720).
    pub session_ttl_hours: Option<u64>,
    /// Encrypted session file location.
    pub session_file: Option<PathBuf>,
}

impl FileConfig {
    /// Checks every present value against its allowed range.
    pub fn validate(&self) -> Result<()> {
        check_range("timeout_secs", self.timeout_secs, 1, 3600)?;
        check_range("max_attempts", self.max_attempts.map(u64::from), 1, 10)?;
        check_range("retry_delay_ms", self.retry_delay_ms, 0, 60_000)?;
        check_range("reply_cap", self.reply_cap.map(as_u64), 1, 100)?;
        check_range("reply_fan_out", self.reply_fan_out.map(as_u64), 1, 16)?;
        check_range("session_ttl_hours", self.session_ttl_hours, 1, 720)?;
        if self.api_host.as_deref().is_some_and(str::is_empty) {
            bail!("Invalid config value for `api_host`: must not be empty");
        }
        Ok(())
    }
}

fn as_u64(value: usize) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

fn check_range(field: &str, value: Option<u64>, min: u64, max: u64) -> Result<()> {
    match value {
        Some(value) if !(min..=max).contains(&value) => {
            bail!("Invalid config value for `{field}`: {value}. Expected range: {min}..={max}")
        }
        _ => Ok(()),
    }
}

/// Loaded config plus where it came from.
#[derive(Debug, Clone, Default)]
pub struct LoadedConfig {
    /// Resolved path, when a config directory is known.
    pub path: Option<PathBuf>,
    /// Parsed values (defaults when no file exists).
    pub config: FileConfig,
    /// True when a file was read.
    pub loaded_from_file: bool,
}

/// `$XDG_CONFIG_HOME/xhs-crawler/config.toml`, else `$HOME/.config/xhs-crawler/config.toml`.
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    xhs_core::session::default_config_dir()
        .ok()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
}

/// Loads the default config file if it exists.
pub fn load_default_file_config() -> Result<LoadedConfig> {
    let path = resolve_default_config_path();
    match path.as_deref() {
        Some(found) if found.exists() => Ok(LoadedConfig {
            config: load_file_config(found)?,
            path,
            loaded_from_file: true,
        }),
        _ => Ok(LoadedConfig {
            path,
            ..LoadedConfig::default()
        }),
    }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (index, raw_line) in raw.lines().enumerate() {
        let line_no = index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };
        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "api_host" => cfg.api_host = Some(parse_string_literal(value).with_context(invalid)?),
            "signer_url" => {
                cfg.signer_url = Some(parse_string_literal(value).with_context(invalid)?);
            }
            "timeout_secs" => cfg.timeout_secs = Some(parse_integer(value).with_context(invalid)?),
            "max_attempts" => {
                let parsed = parse_integer(value).with_context(invalid)?;
                cfg.max_attempts = Some(
                    u32::try_from(parsed)
                        .map_err(|_| anyhow!("max_attempts out of range for u32"))?,
                );
            }
            "retry_delay_ms" => {
                cfg.retry_delay_ms = Some(parse_integer(value).with_context(invalid)?);
            }
            "reply_cap" => cfg.reply_cap = Some(parse_usize(value).with_context(invalid)?),
            "reply_fan_out" => cfg.reply_fan_out = Some(parse_usize(value).with_context(invalid)?),
            "proxies" => {
                let list = parse_string_literal(value).with_context(invalid)?;
                cfg.proxies = list
                    .split(',')
                    .map(str::trim)
                    .filter(|proxy| !proxy.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            "proxy_probe_url" => {
                cfg.proxy_probe_url = Some(parse_string_literal(value).with_context(invalid)?);
            }
            "session_ttl_hours" => {
                cfg.session_ttl_hours = Some(parse_integer(value).with_context(invalid)?);
            }
            "session_file" => {
                cfg.session_file = Some(PathBuf::from(
                    parse_string_literal(value).with_context(invalid)?,
                ));
            }
            unknown => bail!("Unknown configuration key: '{unknown}' on line {line_no}"),
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw: &str) -> Result<String> {
    raw.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Expected double-quoted string"))
}

fn parse_integer(raw: &str) -> Result<u64> {
    let token = raw.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    if token.starts_with('-') {
        bail!("Expected non-negative integer");
    }
    token
        .parse::<u64>()
        .map_err(|error| anyhow!("Expected integer value: {error}"))
}

fn parse_usize(raw: &str) -> Result<usize> {
    usize::try_from(parse_integer(raw)?).map_err(|_| anyhow!("Integer value out of range"))
}

//! Local configuration stored under `.mint/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::{QueueProperties, parse_flag};
use crate::io::executor::TRUNCATION_MARKER;
use crate::io::queue_store::QueueRef;
use crate::io::session_log::CodexSessionDir;

/// Mint configuration (TOML).
///
/// Edited by hand or through `mint setup`. Missing fields take their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MintConfig {
    /// Queue used when `mint run` is given no argument. Empty means none.
    pub default_queue: String,

    /// Wall-clock budget for one agent invocation, in seconds.
    pub timeout_secs: u64,

    /// Thoughts longer than this many characters are truncated.
    pub thoughts_limit_chars: usize,

    /// Agent session directory; `$HOME/.codex/sessions` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_dir: Option<PathBuf>,

    /// Forward captured agent output to stdout while it runs.
    pub echo_output: bool,

    pub properties: LocalProperties,
}

/// Fallbacks for the queue's own properties.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LocalProperties {
    pub prefix: String,
    pub command: String,
    pub auto_close: bool,
}

impl Default for LocalProperties {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            command: String::new(),
            auto_close: true,
        }
    }
}

impl Default for MintConfig {
    fn default() -> Self {
        Self {
            default_queue: String::new(),
            timeout_secs: 60 * 60,
            thoughts_limit_chars: 49_000,
            session_dir: None,
            echo_output: true,
            properties: LocalProperties::default(),
        }
    }
}

/// Upper bound for `timeout_secs`: one week.
pub const MAX_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

impl MintConfig {
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(anyhow!("timeout_secs must be > 0"));
        }
        if self.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(anyhow!("timeout_secs must be <= {MAX_TIMEOUT_SECS}"));
        }
        let marker_len = TRUNCATION_MARKER.chars().count();
        if self.thoughts_limit_chars < marker_len {
            return Err(anyhow!("thoughts_limit_chars must be >= {marker_len}"));
        }
        if !self.default_queue.trim().is_empty() {
            QueueRef::parse(&self.default_queue).context("default_queue")?;
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Configured session directory, or the agent's default location.
    pub fn session_root(&self) -> Option<PathBuf> {
        self.session_dir
            .clone()
            .or_else(CodexSessionDir::default_root)
    }

    /// Copy non-blank queue properties into the local fallbacks.
    ///
    /// Returns true when anything changed. An unparseable `auto_close` is ignored.
    pub fn sync_properties(&mut self, queue: &QueueProperties) -> bool {
        let local = &mut self.properties;
        let mut changed = false;
        for (incoming, current) in [
            (&queue.prefix, &mut local.prefix),
            (&queue.command, &mut local.command),
        ] {
            let incoming = incoming.trim();
            if !incoming.is_empty() && incoming != current.as_str() {
                *current = incoming.to_string();
                changed = true;
            }
        }
        if let Some(flag) = parse_flag(&queue.auto_close)
            && flag != local.auto_close
        {
            local.auto_close = flag;
            changed = true;
        }
        changed
    }
}

/// Effective settings for one driver pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSettings {
    pub prefix: String,
    pub command: String,
    pub auto_close: bool,
}

impl RunSettings {
    /// Queue properties win when non-blank; local properties fill the gaps.
    ///
    /// Fails when no command is configured anywhere.
    pub fn resolve(queue: &QueueProperties, local: &LocalProperties) -> Result<Self> {
        let pick = |queue_value: &str, local_value: &str| {
            let queue_value = queue_value.trim();
            if queue_value.is_empty() {
                local_value.trim().to_string()
            } else {
                queue_value.to_string()
            }
        };
        let settings = Self {
            prefix: pick(&queue.prefix, &local.prefix),
            command: pick(&queue.command, &local.command),
            auto_close: parse_flag(&queue.auto_close).unwrap_or(local.auto_close),
        };
        if settings.command.is_empty() {
            return Err(anyhow!(
                "command is empty: set it in the queue properties or run `mint setup command \"<cmd>\"`"
            ));
        }
        debug!(command = %settings.command, auto_close = settings.auto_close, "resolved run settings");
        Ok(settings)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `MintConfig::default()`.
pub fn load_config(path: &Path) -> Result<MintConfig> {
    if !path.exists() {
        let cfg = MintConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: MintConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &MintConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

/// Write `contents` next to `path` and rename it into place.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

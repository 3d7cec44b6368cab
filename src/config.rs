// Configuration loading and parsing (herodraft.toml).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::draft::state::TeamIdentity;
use crate::draft::timer::TimerPolicy;
use crate::roster::DraftRoster;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },
}

fn invalid(field: &str, message: &str) -> ConfigError {
    ConfigError::ValidationError {
        field: field.to_string(),
        message: message.to_string(),
    }
}

// ---------------------------------------------------------------------------
// File structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub timers: TimersConfig,
    pub catalog: CatalogConfig,
    #[serde(default, rename = "draft")]
    pub drafts: Vec<DraftConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    /// Token for administrative commands (reset, force_timeout, abandon).
    pub admin_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimersConfig {
    pub grace_secs: u64,
    pub reserve_secs: u64,
    pub resume_countdown_secs: u64,
}

impl Default for TimersConfig {
    fn default() -> Self {
        TimersConfig {
            grace_secs: 30,
            reserve_secs: 130,
            resume_countdown_secs: 3,
        }
    }
}

impl TimersConfig {
    pub fn to_policy(&self) -> TimerPolicy {
        TimerPolicy {
            grace: Duration::from_secs(self.grace_secs),
            reserve: Duration::from_secs(self.reserve_secs),
            resume_countdown: Duration::from_secs(self.resume_countdown_secs),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Path to the heroes.toml catalog file, relative to the config file's
    /// directory unless absolute.
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DraftConfig {
    pub id: String,
    pub team_a: TeamConfig,
    pub team_b: TeamConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TeamConfig {
    pub name: String,
    pub captain_token: String,
}

impl DraftConfig {
    pub fn to_roster(&self) -> DraftRoster {
        DraftRoster {
            draft_id: self.id.clone(),
            teams: [
                TeamIdentity {
                    name: self.team_a.name.clone(),
                    captain: self.team_a.captain_token.clone(),
                },
                TeamIdentity {
                    name: self.team_b.name.clone(),
                    captain: self.team_b.captain_token.clone(),
                },
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// Loading and validation
// ---------------------------------------------------------------------------

/// Load and validate the configuration from `path`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    let config: Config = toml::from_str(&contents).map_err(|source| ConfigError::ParseError {
        path: path.to_path_buf(),
        source,
    })?;
    validate(&config)?;
    Ok(config)
}

/// Resolve the catalog path relative to the config file's directory.
pub fn catalog_path(config: &Config, config_path: &Path) -> PathBuf {
    if config.catalog.path.is_absolute() {
        config.catalog.path.clone()
    } else {
        config_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(&config.catalog.path)
    }
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.server.admin_token.trim().is_empty() {
        return Err(invalid("server.admin_token", "must not be empty"));
    }
    if config.timers.reserve_secs == 0 {
        return Err(invalid("timers.reserve_secs", "must be greater than zero"));
    }
    if config.drafts.is_empty() {
        return Err(invalid("draft", "at least one [[draft]] must be configured"));
    }

    let mut seen_ids = std::collections::HashSet::new();
    for draft in &config.drafts {
        let field = format!("draft.{}", draft.id);
        if draft.id.trim().is_empty() {
            return Err(invalid("draft.id", "must not be empty"));
        }
        if !seen_ids.insert(draft.id.as_str()) {
            return Err(invalid(&field, "duplicate draft id"));
        }
        for (team, label) in [(&draft.team_a, "team_a"), (&draft.team_b, "team_b")] {
            if team.name.trim().is_empty() {
                return Err(invalid(&format!("{field}.{label}.name"), "must not be empty"));
            }
            if team.captain_token.trim().is_empty() {
                return Err(invalid(
                    &format!("{field}.{label}.captain_token"),
                    "must not be empty",
                ));
            }
        }
        if draft.team_a.captain_token == draft.team_b.captain_token {
            return Err(invalid(
                &field,
                "the two captains must have distinct tokens",
            ));
        }
        if draft.team_a.captain_token == config.server.admin_token
            || draft.team_b.captain_token == config.server.admin_token
        {
            return Err(invalid(&field, "captain tokens must differ from admin_token"));
        }
    }
    Ok(())
}

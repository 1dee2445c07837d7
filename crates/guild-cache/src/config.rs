//! Configuration loading and typed config structures for the guild cache.
//!
//! The canonical configuration lives in `guild-config.yaml` next to the
//! engine binary. This module defines strongly-typed structs that mirror
//! the YAML structure and a loader that reads the file. Every field has
//! a default, so a missing section (or a missing file) yields a working
//! configuration.

use std::path::Path;

use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level guild cache configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GuildConfig {
    /// Table capacities and caps.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Guild war rules.
    #[serde(default)]
    pub war: WarConfig,

    /// Periodic timer intervals.
    #[serde(default)]
    pub timers: TimerConfig,

    /// Siege scoring rules.
    #[serde(default)]
    pub siege: SiegeConfig,

    /// Guild skill rules.
    #[serde(default)]
    pub skills: SkillConfig,

    /// Static castle definitions.
    #[serde(default)]
    pub castles: Vec<CastleDefinition>,

    /// Authority channel connection settings.
    #[serde(default)]
    pub infrastructure: InfrastructureConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl GuildConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `NATS_URL` in the environment overrides `infrastructure.nats_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        config.infrastructure.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        Ok(config)
    }
}

/// Capacities of the fixed-size tables and the relation caps.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LimitsConfig {
    /// Member slots per guild (default: 76).
    #[serde(default = "default_member_slots")]
    pub member_slots: usize,

    /// Position definitions per guild (default: 20).
    #[serde(default = "default_position_slots")]
    pub position_slots: usize,

    /// Relation table slots per guild (default: 16).
    #[serde(default = "default_relation_slots")]
    pub relation_slots: usize,

    /// Skill cooldown slots per guild (default: 15).
    #[serde(default = "default_skill_slots")]
    pub skill_slots: usize,

    /// Maximum alliances per guild (default: 3).
    #[serde(default = "default_max_allies")]
    pub max_allies: usize,

    /// Maximum oppositions per guild (default: 10).
    #[serde(default = "default_max_enemies")]
    pub max_enemies: usize,

    /// Maximum exp tax percentage a position may set (default: 50).
    #[serde(default = "default_exp_tax_cap")]
    pub exp_tax_cap: u8,

    /// Exp-cache entries kept pooled for reuse (default: 8192).
    #[serde(default = "default_exp_pool_capacity")]
    pub exp_pool_capacity: usize,

    /// Permanent guardian slots per castle (default: 8).
    #[serde(default = "default_guardian_slots")]
    pub guardian_slots: u8,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            member_slots: default_member_slots(),
            position_slots: default_position_slots(),
            relation_slots: default_relation_slots(),
            skill_slots: default_skill_slots(),
            max_allies: default_max_allies(),
            max_enemies: default_max_enemies(),
            exp_tax_cap: default_exp_tax_cap(),
            exp_pool_capacity: default_exp_pool_capacity(),
            guardian_slots: default_guardian_slots(),
        }
    }
}

/// Guild war rules.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WarConfig {
    /// Reciprocated oppositions become wars (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds after war starts (or after hostile activity) during which
    /// the opposition cannot be broken (default: 600).
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,

    /// Block alliance proposals and relation removal while a siege is
    /// running (default: true).
    #[serde(default = "default_true")]
    pub block_alliance_during_siege: bool,
}

impl Default for WarConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            grace_secs: default_grace_secs(),
            block_alliance_during_siege: true,
        }
    }
}

/// Periodic timer intervals.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TimerConfig {
    /// Exp-cache flush interval in milliseconds (default: 10000).
    #[serde(default = "default_exp_flush_ms")]
    pub exp_flush_ms: u64,

    /// Member position broadcast interval in milliseconds (default: 5000).
    #[serde(default = "default_position_broadcast_ms")]
    pub position_broadcast_ms: u64,

    /// Siege scoring sweep interval in seconds (default: 300).
    #[serde(default = "default_siege_sweep_secs")]
    pub siege_sweep_secs: u64,

    /// Timer queue polling interval in milliseconds (default: 100).
    #[serde(default = "default_timer_poll_ms")]
    pub timer_poll_ms: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            exp_flush_ms: default_exp_flush_ms(),
            position_broadcast_ms: default_position_broadcast_ms(),
            siege_sweep_secs: default_siege_sweep_secs(),
            timer_poll_ms: default_timer_poll_ms(),
        }
    }
}

/// Siege scoring rules.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SiegeConfig {
    /// Seconds of holding per score period (default: 300).
    #[serde(default = "default_score_period_secs")]
    pub score_period_secs: u64,

    /// Economy levels per extra score multiplier (default: 25).
    #[serde(default = "default_economy_step")]
    pub economy_step: u32,
}

impl Default for SiegeConfig {
    fn default() -> Self {
        Self {
            score_period_secs: default_score_period_secs(),
            economy_step: default_economy_step(),
        }
    }
}

/// Guild skill rules.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SkillConfig {
    /// Each skill has its own cooldown slot; otherwise all share slot 0
    /// (default: true).
    #[serde(default = "default_true")]
    pub separate_cooldowns: bool,

    /// Changing the emblem requires the glory skill (default: false).
    #[serde(default)]
    pub emblem_requires_glory: bool,

    /// Skill id of the glory skill (default: 10000).
    #[serde(default = "default_glory_skill_id")]
    pub glory_skill_id: u16,

    /// Skill id of the first guild skill; cooldown slots are offsets from
    /// it (default: 10000).
    #[serde(default = "default_glory_skill_id")]
    pub first_skill_id: u16,
}

impl Default for SkillConfig {
    fn default() -> Self {
        Self {
            separate_cooldowns: true,
            emblem_requires_glory: false,
            glory_skill_id: default_glory_skill_id(),
            first_skill_id: default_glory_skill_id(),
        }
    }
}

/// One castle, as read from static configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CastleDefinition {
    /// Castle id.
    pub id: u32,
    /// Map name.
    pub map: String,
    /// Display name.
    pub name: String,
    /// Event-hook prefix.
    pub event: String,
    /// Siege ruleset of the castle's map (default: 1).
    #[serde(default = "default_ruleset")]
    pub ruleset: u8,
}

/// Authority channel connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InfrastructureConfig {
    /// NATS messaging URL.
    #[serde(default = "default_nats_url")]
    pub nats_url: String,

    /// Subject requests are published on.
    #[serde(default = "default_request_subject")]
    pub request_subject: String,

    /// Subject pushes arrive on.
    #[serde(default = "default_push_subject")]
    pub push_subject: String,
}

impl InfrastructureConfig {
    /// Override the NATS URL with the `NATS_URL` environment variable when
    /// set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("NATS_URL") {
            self.nats_url = val;
        }
    }
}

impl Default for InfrastructureConfig {
    fn default() -> Self {
        Self {
            nats_url: default_nats_url(),
            request_subject: default_request_subject(),
            push_subject: default_push_subject(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

const fn default_true() -> bool {
    true
}

const fn default_member_slots() -> usize {
    76
}

const fn default_position_slots() -> usize {
    20
}

const fn default_relation_slots() -> usize {
    16
}

const fn default_skill_slots() -> usize {
    15
}

const fn default_max_allies() -> usize {
    3
}

const fn default_max_enemies() -> usize {
    10
}

const fn default_exp_tax_cap() -> u8 {
    50
}

const fn default_exp_pool_capacity() -> usize {
    8192
}

const fn default_guardian_slots() -> u8 {
    8
}

const fn default_grace_secs() -> u64 {
    600
}

const fn default_exp_flush_ms() -> u64 {
    10_000
}

const fn default_position_broadcast_ms() -> u64 {
    5_000
}

const fn default_siege_sweep_secs() -> u64 {
    300
}

const fn default_timer_poll_ms() -> u64 {
    100
}

const fn default_score_period_secs() -> u64 {
    300
}

const fn default_economy_step() -> u32 {
    25
}

const fn default_glory_skill_id() -> u16 {
    10_000
}

const fn default_ruleset() -> u8 {
    1
}

fn default_nats_url() -> String {
    "nats://localhost:4222".to_owned()
}

fn default_request_subject() -> String {
    "guild.authority.request".to_owned()
}

fn default_push_subject() -> String {
    "guild.authority.push".to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = GuildConfig::default();
        assert_eq!(config.limits.member_slots, 76);
        assert_eq!(config.limits.max_allies, 3);
        assert_eq!(config.war.grace_secs, 600);
        assert_eq!(config.timers.exp_flush_ms, 10_000);
        assert_eq!(config.siege.economy_step, 25);
        assert!(config.castles.is_empty());
    }

    #[test]
    fn parse_partial_yaml_keeps_defaults() {
        let yaml = r#"
limits:
  max_allies: 1
war:
  grace_secs: 60
castles:
  - id: 0
    map: prtg_cas01
    name: Kriemhild
    event: Agit_A01
  - id: 24
    map: aldeg_cas01
    name: Neuschwanstein
    event: Agit_N01
    ruleset: 2
"#;
        let config = GuildConfig::parse(yaml).unwrap();
        assert_eq!(config.limits.max_allies, 1);
        assert_eq!(config.limits.max_enemies, 10);
        assert_eq!(config.war.grace_secs, 60);
        assert!(config.war.enabled);
        assert_eq!(config.castles.len(), 2);
        assert_eq!(config.castles.first().map(|c| c.ruleset), Some(1));
        assert_eq!(config.castles.get(1).map(|c| c.ruleset), Some(2));
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let config = GuildConfig::parse(include_str!("../../../guild-config.yaml")).unwrap();
        assert_eq!(config.limits, LimitsConfig::default());
        assert_eq!(config.war, WarConfig::default());
        assert_eq!(config.timers, TimerConfig::default());
        assert_eq!(config.siege, SiegeConfig::default());
        assert_eq!(config.skills, SkillConfig::default());
        assert_eq!(config.logging, LoggingConfig::default());
        assert_eq!(config.castles.len(), 7);
        assert!(config.castles.iter().all(|c| c.ruleset == 1 || c.event.starts_with("Agit_S")));
    }

    #[test]
    fn parse_empty_yaml() {
        let config = GuildConfig::parse("{}").unwrap();
        assert_eq!(config, GuildConfig::default());
    }

    #[test]
    fn parse_invalid_yaml_fails() {
        let result = GuildConfig::parse("limits: [not, a, map");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }
}

//! Configuration loading.
//!
//! One TOML file drives everything: server binding and tokens, per-platform
//! settings (priority, cookie, merge window), matcher substitution rules and
//! the optional Emby lookup. The id snapshot lives beside this file.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use danmaku::{MatchMode, SubstitutionRule};
use serde::Deserialize;
use tracing::warn;

/// Snapshot file written beside the active config.
pub const SNAPSHOT_FILE: &str = "ids.json.gz";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AppConfig {
    pub server: ServerConfig,
    pub search: SearchConfig,
    pub emby: EmbyConfig,
    pub matcher: MatcherConfig,
    /// Keyed by platform name; a negative priority disables the platform.
    pub platforms: BTreeMap<String, PlatformConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Accepted path tokens; empty disables token validation.
    pub tokens: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8089,
            tokens: Vec::new(),
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SearchConfig {
    /// Aggregate deadline for one fan-out; a slow platform cannot delay the
    /// whole match beyond this.
    pub timeout_secs: u64,
    /// Overrides the default browser user agent when set.
    pub user_agent: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EmbyConfig {
    pub enabled: bool,
    pub url: String,
    pub user: String,
    pub token: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MatcherConfig {
    pub enabled: bool,
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RuleConfig {
    pub regex: String,
    /// Empty applies the rule on every platform.
    pub platform: String,
    pub replacement: String,
    pub mode: Option<MatchMode>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PlatformConfig {
    pub priority: i32,
    pub cookie: String,
    pub max_workers: usize,
    pub timeout_secs: u64,
    /// Merge window in milliseconds; 0 disables deduplication.
    pub merge_window_ms: i64,
    /// Whether this platform's search API wraps hits in highlight markup.
    pub highlight_markup: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            priority: 0,
            cookie: String::new(),
            max_workers: 4,
            timeout_secs: 30,
            merge_window_ms: 0,
            highlight_markup: false,
        }
    }
}

impl AppConfig {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parse config {}", path.display()))
    }

    /// Compile the configured substitution rules, skipping invalid regexes.
    pub fn compile_rules(&self) -> Vec<SubstitutionRule> {
        if !self.matcher.enabled {
            return Vec::new();
        }
        let mut rules = Vec::with_capacity(self.matcher.rules.len());
        for rule in &self.matcher.rules {
            match regex::Regex::new(&rule.regex) {
                Ok(regex) => rules.push(SubstitutionRule {
                    regex,
                    platform: rule.platform.clone(),
                    replacement: rule.replacement.clone(),
                    mode: rule.mode,
                }),
                Err(error) => {
                    warn!(pattern = %rule.regex, error = %error, "invalid matcher rule skipped");
                }
            }
        }
        rules
    }
}

/// Default config location: `~/.config/danmu-relay/config.toml`.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("danmu-relay")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config: AppConfig = toml::from_str(
            r#"
            [server]
            host = "127.0.0.1"
            port = 9000
            tokens = ["secret"]

            [search]
            timeout-secs = 20

            [emby]
            enabled = true
            url = "http://emby.local:8096"
            user = "user-id"
            token = "api-key"

            [matcher]
            enabled = true

            [[matcher.rules]]
            regex = "剧场版$"
            replacement = ""
            mode = "contains"

            [platforms.bilibili]
            priority = 1
            highlight-markup = true
            merge-window-ms = 1000

            [platforms.tencent]
            priority = 2
            max-workers = 8

            [platforms.youku]
            priority = -1
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.tokens, ["secret"]);
        assert_eq!(config.search.timeout_secs, 20);
        assert!(config.emby.enabled);

        let bilibili = &config.platforms["bilibili"];
        assert_eq!(bilibili.priority, 1);
        assert!(bilibili.highlight_markup);
        assert_eq!(bilibili.merge_window_ms, 1000);
        assert_eq!(bilibili.max_workers, 4);
        assert_eq!(config.platforms["tencent"].max_workers, 8);
        assert_eq!(config.platforms["youku"].priority, -1);

        let rules = config.compile_rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].mode, Some(MatchMode::Contains));
    }

    #[test]
    fn test_invalid_rule_skipped() {
        let config: AppConfig = toml::from_str(
            r#"
            [matcher]
            enabled = true

            [[matcher.rules]]
            regex = "("
            replacement = ""

            [[matcher.rules]]
            regex = "ok"
            replacement = ""
            "#,
        )
        .unwrap();
        assert_eq!(config.compile_rules().len(), 1);
    }

    #[test]
    fn test_rules_ignored_when_disabled() {
        let config: AppConfig = toml::from_str(
            r#"
            [[matcher.rules]]
            regex = "ok"
            replacement = ""
            "#,
        )
        .unwrap();
        assert!(config.compile_rules().is_empty());
    }
}

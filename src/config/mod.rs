//! Configuration file for content-mirror.
//!
//! Settings come from a TOML file (every section optional), and a few of them
//! can be overridden from the command line or the environment. See
//! `content-mirror.example.toml` for a complete file.

pub mod duration;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use mirror_engine::{EngineOptions, LockBackend, MapperOptions, RunnerConfig, SyncMode};
use mirror_types::ShapeRegistry;
use serde::Deserialize;

/// File read when `--config` is not given, if it exists
pub const DEFAULT_CONFIG_PATH: &str = "content-mirror.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub source: SourceConfig,
    pub mirror: MirrorConfig,
    pub store: StoreConfig,
    pub runner: RunnerSection,
    pub debounce: DebounceConfig,
    pub lock: LockConfig,
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    pub api_url: String,
    pub space: String,
    pub environment: String,
    pub access_token: String,
    /// Page size for initial syncs
    pub limit: u32,
    /// Item type filter for initial syncs
    pub scope: String,
    #[serde(deserialize_with = "duration::deserialize")]
    pub timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            api_url: content_source::DEFAULT_API_URL.to_string(),
            space: String::new(),
            environment: "master".to_string(),
            access_token: String::new(),
            limit: 100,
            scope: "all".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MirrorConfig {
    pub locale: String,
    pub content_tags: Vec<String>,
    pub ignore_content_tags: Vec<String>,
    pub preserve_timestamps: bool,
    /// YAML file declaring record shapes per content type
    pub shapes_file: Option<PathBuf>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            locale: mirror_engine::DEFAULT_LOCALE.to_string(),
            content_tags: Vec::new(),
            ignore_content_tags: Vec::new(),
            preserve_timestamps: false,
            shapes_file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Mongodb,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub uri: String,
    pub database: String,
    pub collection: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Mongodb,
            uri: "mongodb://localhost:27017".to_string(),
            database: "content_mirror".to_string(),
            collection: "contentful_models".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunnerSection {
    pub mode: SyncMode,
    #[serde(deserialize_with = "duration::deserialize")]
    pub interval: Duration,
    #[serde(deserialize_with = "duration::deserialize")]
    pub check_interval: Duration,
}

impl Default for RunnerSection {
    fn default() -> Self {
        let defaults = RunnerConfig::default();
        Self {
            mode: defaults.mode,
            interval: defaults.interval,
            check_interval: defaults.check_interval,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DebounceConfig {
    #[serde(deserialize_with = "duration::deserialize")]
    pub window: Duration,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            window: RunnerConfig::default().debounce_window,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LockConfig {
    pub backend: LockBackend,
    #[serde(deserialize_with = "duration::deserialize")]
    pub ttl: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            backend: LockBackend::Lease,
            ttl: Duration::from_secs(15 * 60),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WebhookConfig {
    pub enabled: bool,
    pub listen: SocketAddr,
    pub path: String,
    pub authentication_required: bool,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Accepted `X-Contentful-Topic` patterns; `*` matches any run of characters
    pub accept_topics: Vec<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: SocketAddr::from(([0, 0, 0, 0], 3000)),
            path: "/consyncful/webhook".to_string(),
            authentication_required: true,
            user: None,
            password: None,
            accept_topics: vec![
                "ContentManagement.Entry.*".to_string(),
                "ContentManagement.Asset.*".to_string(),
            ],
        }
    }
}

impl Config {
    /// Load the configuration.
    ///
    /// An explicit `path` must exist. Without one, [`DEFAULT_CONFIG_PATH`] is
    /// read if present, otherwise defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_PATH);
                if !default.exists() {
                    tracing::debug!("No {} found, using defaults", DEFAULT_CONFIG_PATH);
                    return Ok(Self::default());
                }
                default
            }
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Check the settings needed to talk to the content source.
    pub fn validate_source(&self) -> Result<()> {
        if self.source.space.is_empty() {
            anyhow::bail!("source.space is not set (or pass --space / CONTENTFUL_SPACE)");
        }
        if self.source.access_token.is_empty() {
            anyhow::bail!(
                "source.access_token is not set (or pass --access-token / CONTENTFUL_ACCESS_TOKEN)"
            );
        }
        if self.source.limit == 0 {
            anyhow::bail!("source.limit must be at least 1");
        }
        Ok(())
    }

    /// Check the webhook settings when the listener is enabled.
    pub fn validate_webhook(&self) -> Result<()> {
        if !self.webhook.enabled {
            return Ok(());
        }
        if !self.webhook.path.starts_with('/') {
            anyhow::bail!("webhook.path must start with '/'");
        }
        if self.webhook.authentication_required
            && (self.webhook.user.is_none() || self.webhook.password.is_none())
        {
            anyhow::bail!(
                "webhook.authentication_required is set but webhook.user / webhook.password are missing"
            );
        }
        Ok(())
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            limit: self.source.limit,
            scope: self.source.scope.clone(),
            mapper: MapperOptions {
                locale: self.mirror.locale.clone(),
                content_tags: self.mirror.content_tags.clone(),
                ignore_content_tags: self.mirror.ignore_content_tags.clone(),
                preserve_timestamps: self.mirror.preserve_timestamps,
            },
        }
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            mode: self.runner.mode,
            interval: self.runner.interval,
            check_interval: self.runner.check_interval,
            debounce_window: self.debounce.window,
        }
    }

    /// Record shapes from `mirror.shapes_file`, or an empty registry.
    pub fn shapes(&self) -> Result<ShapeRegistry> {
        match &self.mirror.shapes_file {
            Some(path) => ShapeRegistry::from_file(path)
                .with_context(|| format!("Failed to load shapes from {}", path.display())),
            None => Ok(ShapeRegistry::new()),
        }
    }
}

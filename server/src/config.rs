use anyhow::{Context, bail};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::db::backend::{GroupBackend, MemoryBackend};
use crate::db::file::JsonDirBackend;
use crate::db::pool::{create_pool, run_migrations};
use crate::db::sqlite::SqliteBackend;
use crate::engine::group_engine::{DEFAULT_AUDIT_LOG_LIMIT, GroupEngine};
use crate::engine::moderation::{PatternFilter, default_patterns};
use crate::engine::permissions::Rank;
use crate::engine::store::GroupStore;

/// Top-level configuration, loaded from groupwarden.toml.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub store: StoreSection,
    pub database: DatabaseSection,
    pub moderation: ModerationSection,
    pub admin: AdminSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub web_address: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            web_address: "0.0.0.0:8080".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Sqlite,
    File,
    Memory,
}

impl BackendKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Some(Self::Sqlite),
            "file" | "json" => Some(Self::File),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub backend: BackendKind,
    /// Directory for the file backend.
    pub data_dir: String,
    /// Longest wait for a group's lock before failing with a timeout.
    pub lock_timeout_ms: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: BackendKind::Sqlite,
            data_dir: "data".into(),
            lock_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub url: String,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: "sqlite:groupwarden.db?mode=rwc".into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ModerationSection {
    /// Regular expressions, matched case-insensitively.
    pub patterns: Vec<String>,
    pub audit_log_limit: usize,
}

impl Default for ModerationSection {
    fn default() -> Self {
        Self {
            patterns: default_patterns(),
            audit_log_limit: DEFAULT_AUDIT_LOG_LIMIT,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AdminSection {
    /// `group_id:member_id` pairs seeded as group owners on startup.
    pub owners: Vec<String>,
}

impl AdminSection {
    /// Parsed owner pairs, split on the last `:`.
    pub fn owner_pairs(&self) -> anyhow::Result<Vec<(String, String)>> {
        self.owners
            .iter()
            .map(|entry| match entry.rsplit_once(':') {
                Some((group, member)) if !group.is_empty() && !member.is_empty() => {
                    Ok((group.to_string(), member.to_string()))
                }
                _ => bail!("invalid admin owner entry {entry:?}, expected group_id:member_id"),
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Default tracing filter; `RUST_LOG` still wins when set.
    pub filter: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: "info".into(),
        }
    }
}

impl ServerConfig {
    /// Load config from a TOML file. Falls back to defaults if the file doesn't exist.
    /// Environment variables override TOML values.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let mut config = if Path::new(path).exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {path}"))?;
            Self::parse(&contents).with_context(|| format!("failed to parse config file {path}"))?
        } else {
            info!("No config file found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
        if let Some(v) = var("WEB_ADDRESS") {
            self.server.web_address = v;
        }
        if let Some(v) = var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Some(v) = var("STORE_BACKEND") {
            self.store.backend = BackendKind::parse(&v)
                .with_context(|| format!("STORE_BACKEND must be sqlite, file or memory, got {v:?}"))?;
        }
        if let Some(v) = var("DATA_DIR") {
            self.store.data_dir = v;
        }
        if let Some(v) = var("LOCK_TIMEOUT_MS") {
            self.store.lock_timeout_ms = v
                .parse()
                .with_context(|| format!("LOCK_TIMEOUT_MS must be a whole number of milliseconds, got {v:?}"))?;
        }
        if let Some(v) = var("AUDIT_LOG_LIMIT") {
            self.moderation.audit_log_limit = v
                .parse()
                .with_context(|| format!("AUDIT_LOG_LIMIT must be a non-negative integer, got {v:?}"))?;
        }
        if let Some(v) = var("BLOCKED_PATTERNS") {
            self.moderation.patterns = v
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = var("LOG_FILTER") {
            self.logging.filter = v;
        }
        Ok(())
    }
}

/// Open the configured backend and assemble the engine, then seed any
/// owners listed under `[admin]`.
pub async fn build_engine(config: &ServerConfig) -> anyhow::Result<GroupEngine> {
    let backend: Arc<dyn GroupBackend> = match config.store.backend {
        BackendKind::Sqlite => {
            let pool = create_pool(&config.database.url)
                .await
                .with_context(|| format!("failed to connect to database {}", config.database.url))?;
            run_migrations(&pool)
                .await
                .context("failed to run database migrations")?;
            Arc::new(SqliteBackend::new(pool))
        }
        BackendKind::File => Arc::new(
            JsonDirBackend::open(&config.store.data_dir)
                .await
                .with_context(|| format!("failed to open data dir {}", config.store.data_dir))?,
        ),
        BackendKind::Memory => {
            warn!("Using the in-memory backend, group state is lost on exit");
            Arc::new(MemoryBackend::new())
        }
    };

    let filter = PatternFilter::new(&config.moderation.patterns)
        .context("invalid pattern in [moderation] patterns")?;
    info!(patterns = filter.len(), "content filter loaded");

    let store = GroupStore::new(
        backend,
        Duration::from_millis(config.store.lock_timeout_ms),
    );
    let engine = GroupEngine::new(store, Arc::new(filter))
        .with_audit_log_limit(config.moderation.audit_log_limit);

    for (group_id, member_id) in config.admin.owner_pairs()? {
        engine
            .set_rank(&group_id, &member_id, Rank::OWNER)
            .await
            .with_context(|| format!("failed to seed owner {member_id} of group {group_id}"))?;
    }
    Ok(engine)
}

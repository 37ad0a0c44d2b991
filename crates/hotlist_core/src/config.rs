//! Process-wide engine configuration.
//!
//! # Responsibility
//! - Resolve table names, paging bounds, annotation limits and backend
//!   selection once at startup.
//! - Hand the resolved values to components at construction time; no core
//!   operation reads configuration per call.
//!
//! # Invariants
//! - A validated config has non-empty names, `0 < default_page_size <=
//!   max_page_size`, and non-zero timeout, concurrency and attempts.
//! - Credentials never live here; remote backends use their SDK provider chain.

use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

static TABLE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.\-]{3,255}$").expect("valid table name regex"));

pub const DEFAULT_CATEGORY: &str = "gif";
pub const DEFAULT_ITEM_TABLE: &str = "hotlist-items";
pub const DEFAULT_VOTE_TABLE: &str = "hotlist-votes";
pub const DEFAULT_SCORE_INDEX: &str = "Score";
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;
pub const DEFAULT_SQLITE_PATH: &str = "hotlist.db";
const DEFAULT_ANNOTATION_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_ANNOTATION_CONCURRENCY: usize = 16;
const DEFAULT_INCREMENT_ATTEMPTS: u32 = 3;

/// Configuration error raised at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment value could not be parsed.
    InvalidValue {
        key: &'static str,
        value: String,
        message: String,
    },
    /// Parsed values violate a config invariant.
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue {
                key,
                value,
                message,
            } => write!(f, "invalid {key} value `{value}`: {message}"),
            Self::Invalid(message) => write!(f, "invalid configuration: {message}"),
        }
    }
}

impl Error for ConfigError {}

/// DynamoDB client overrides. Unset fields fall back to the SDK defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DynamoDbSettings {
    pub region: Option<String>,
    /// Endpoint override, e.g. DynamoDB Local at `http://localhost:8000`.
    pub endpoint: Option<String>,
    pub timeout_ms: Option<u64>,
}

/// Storage backend selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// Process-local maps. Nothing survives a restart.
    Memory,
    /// Embedded SQLite database file.
    Sqlite { path: PathBuf },
    /// Amazon DynamoDB (requires the `dynamodb` feature).
    DynamoDb(DynamoDbSettings),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Partition discriminator for every item this engine serves.
    pub category: String,
    pub item_table: String,
    pub vote_table: String,
    /// Name of the `(category, score)` secondary index on `item_table`.
    pub score_index: String,
    pub default_page_size: u32,
    pub max_page_size: u32,
    /// Upper bound for one per-item vote lookup during annotation.
    pub annotation_timeout: Duration,
    /// Upper bound on in-flight vote lookups for one page.
    pub annotation_concurrency: usize,
    /// Score increment attempts after an accepted vote.
    pub increment_attempts: u32,
    pub backend: BackendConfig,
}

impl Default for EngineConfig {
    /// In-process defaults with the memory backend.
    fn default() -> Self {
        Self {
            category: DEFAULT_CATEGORY.to_string(),
            item_table: DEFAULT_ITEM_TABLE.to_string(),
            vote_table: DEFAULT_VOTE_TABLE.to_string(),
            score_index: DEFAULT_SCORE_INDEX.to_string(),
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            annotation_timeout: Duration::from_millis(DEFAULT_ANNOTATION_TIMEOUT_MS),
            annotation_concurrency: DEFAULT_ANNOTATION_CONCURRENCY,
            increment_attempts: DEFAULT_INCREMENT_ATTEMPTS,
            backend: BackendConfig::Memory,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from `HOTLIST_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, validating the result.
    ///
    /// Missing keys fall back to defaults; the SQLite backend is the default
    /// selection so a bare environment still persists data.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = EnvReader { lookup: &lookup };

        let backend = match env.string("HOTLIST_BACKEND", "sqlite").as_str() {
            "memory" => BackendConfig::Memory,
            "sqlite" => BackendConfig::Sqlite {
                path: PathBuf::from(env.string("HOTLIST_SQLITE_PATH", DEFAULT_SQLITE_PATH)),
            },
            "dynamodb" => BackendConfig::DynamoDb(DynamoDbSettings {
                region: env.optional("HOTLIST_DYNAMODB_REGION"),
                endpoint: env.optional("HOTLIST_DYNAMODB_ENDPOINT"),
                timeout_ms: env.optional_parsed("HOTLIST_DYNAMODB_TIMEOUT_MS")?,
            }),
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "HOTLIST_BACKEND",
                    value: other.to_string(),
                    message: "expected memory|sqlite|dynamodb".to_string(),
                })
            }
        };

        let config = Self {
            category: env.string("HOTLIST_CATEGORY", DEFAULT_CATEGORY),
            item_table: env.string("HOTLIST_ITEM_TABLE", DEFAULT_ITEM_TABLE),
            vote_table: env.string("HOTLIST_VOTE_TABLE", DEFAULT_VOTE_TABLE),
            score_index: env.string("HOTLIST_SCORE_INDEX", DEFAULT_SCORE_INDEX),
            default_page_size: env.parsed("HOTLIST_PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
            max_page_size: env.parsed("HOTLIST_MAX_PAGE_SIZE", MAX_PAGE_SIZE)?,
            annotation_timeout: Duration::from_millis(env.parsed(
                "HOTLIST_ANNOTATION_TIMEOUT_MS",
                DEFAULT_ANNOTATION_TIMEOUT_MS,
            )?),
            annotation_concurrency: env.parsed(
                "HOTLIST_ANNOTATION_CONCURRENCY",
                DEFAULT_ANNOTATION_CONCURRENCY,
            )?,
            increment_attempts: env
                .parsed("HOTLIST_INCREMENT_ATTEMPTS", DEFAULT_INCREMENT_ATTEMPTS)?,
            backend,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.category.is_empty() || self.category.contains('\0') {
            return Err(ConfigError::Invalid(
                "category must be non-empty and must not contain NUL".to_string(),
            ));
        }
        for (label, name) in [
            ("item_table", &self.item_table),
            ("vote_table", &self.vote_table),
            ("score_index", &self.score_index),
        ] {
            if !TABLE_NAME_RE.is_match(name) {
                return Err(ConfigError::Invalid(format!(
                    "{label} `{name}` must match [A-Za-z0-9_.-]{{3,255}}"
                )));
            }
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(ConfigError::Invalid(format!(
                "page sizes must satisfy 0 < default ({}) <= max ({})",
                self.default_page_size, self.max_page_size
            )));
        }
        if self.annotation_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "annotation timeout must be positive".to_string(),
            ));
        }
        if self.annotation_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "annotation concurrency must be positive".to_string(),
            ));
        }
        if self.increment_attempts == 0 {
            return Err(ConfigError::Invalid(
                "increment attempts must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

struct EnvReader<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<'_, F> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| {
            info!("event=config_default module=config key={key} default={default}");
            default.to_string()
        })
    }

    fn parsed<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr + Display,
        T::Err: Display,
    {
        match self.optional_parsed(key)? {
            Some(value) => Ok(value),
            None => {
                info!("event=config_default module=config key={key} default={default}");
                Ok(default)
            }
        }
    }

    fn optional_parsed<T>(&self, key: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        let Some(raw) = self.optional(key) else {
            return Ok(None);
        };
        raw.parse().map(Some).map_err(|err: T::Err| {
            warn!("event=config_invalid module=config key={key}");
            ConfigError::InvalidValue {
                key,
                value: raw.clone(),
                message: err.to_string(),
            }
        })
    }
}

use crate::core::{MigrationError, Result};
use crate::storage::DurabilityMode;
use std::path::PathBuf;

const URL_SCHEME: &str = "rustmigrate://";

/// Context key used when none is configured.
pub const DEFAULT_CONTEXT_KEY: &str = "default";

/// Migration runner configuration
///
/// Built with chained setters or parsed from a connection-style URL.
#[derive(Debug, Clone, PartialEq)]
pub struct MigrateConfig {
    /// Key that scopes the migration history inside a shared store
    pub context_key: String,

    /// Directory holding the store snapshot and lock files. `None` keeps
    /// everything in memory.
    pub data_dir: Option<PathBuf>,

    /// Directory holding one JSON file per migration
    pub migrations_dir: PathBuf,

    /// Snapshot durability for the store opened in `data_dir`
    pub durability: DurabilityMode,

    /// Run the seed hook after the schema reaches the latest migration
    pub seed_enabled: bool,
}

impl MigrateConfig {
    pub fn new(context_key: &str) -> Self {
        Self {
            context_key: context_key.to_string(),
            data_dir: None,
            migrations_dir: PathBuf::from("migrations"),
            durability: DurabilityMode::default(),
            seed_enabled: true,
        }
    }

    pub fn context_key(mut self, context_key: &str) -> Self {
        self.context_key = context_key.to_string();
        self
    }

    pub fn data_dir<P: Into<PathBuf>>(mut self, data_dir: P) -> Self {
        self.data_dir = Some(data_dir.into());
        self
    }

    pub fn migrations_dir<P: Into<PathBuf>>(mut self, migrations_dir: P) -> Self {
        self.migrations_dir = migrations_dir.into();
        self
    }

    pub fn durability(mut self, durability: DurabilityMode) -> Self {
        self.durability = durability;
        self
    }

    pub fn seed_enabled(mut self, enabled: bool) -> Self {
        self.seed_enabled = enabled;
        self
    }

    /// Parse from a connection string
    ///
    /// Format: "rustmigrate://<data_dir>?context=<key>&durability=<mode>"
    ///
    /// An empty data dir (`rustmigrate://?context=Blog`) means an in-memory
    /// store.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let config = MigrateConfig::from_url("rustmigrate://./data?context=BlogContext")?;
    /// ```
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = url.strip_prefix(URL_SCHEME).ok_or_else(|| {
            MigrationError::Config(format!("URL must start with '{}'", URL_SCHEME))
        })?;

        let (path, query) = match rest.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (rest, None),
        };

        let mut config = Self::default();
        if !path.is_empty() {
            config = config.data_dir(path);
        }

        for pair in query.into_iter().flat_map(|q| q.split('&')) {
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                MigrationError::Config(format!("Invalid query parameter '{}'", pair))
            })?;
            config = match key {
                "context" => config.context_key(value),
                "migrations" => config.migrations_dir(value),
                "durability" => config.durability(value.parse()?),
                "seed" => config.seed_enabled(parse_bool(value)?),
                other => {
                    return Err(MigrationError::Config(format!(
                        "Unknown parameter '{}'",
                        other
                    )));
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    /// Convert to a connection string
    pub fn to_url(&self) -> String {
        let durability = match self.durability {
            DurabilityMode::Sync => "sync",
            DurabilityMode::Async => "async",
            DurabilityMode::None => "none",
        };
        format!(
            "{}{}?context={}&durability={}",
            URL_SCHEME,
            self.data_dir
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
            self.context_key,
            durability
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.context_key.trim().is_empty() {
            return Err(MigrationError::Config(
                "Context key cannot be empty".to_string(),
            ));
        }

        if self.context_key.contains(['&', '?', '\n']) {
            return Err(MigrationError::Config(format!(
                "Context key '{}' contains reserved characters",
                self.context_key
            )));
        }

        if self.migrations_dir.as_os_str().is_empty() {
            return Err(MigrationError::Config(
                "Migrations directory cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CONTEXT_KEY)
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(MigrationError::Config(format!(
            "Expected a boolean, got '{}'",
            other
        ))),
    }
}

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to load config from environment: {0}")]
    Env(#[from] envy::Error),
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub jwt_secret: String,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default = "default_media_root")]
    pub media_root: PathBuf,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,

    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,

    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    #[serde(default = "default_db_connect_attempts")]
    pub db_connect_attempts: u32,

    #[serde(default = "default_db_connect_delay_ms")]
    pub db_connect_delay_ms: u64,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialServerConfig {
    database_url: Option<String>,
    jwt_secret: Option<String>,
    listen_addr: Option<String>,
    media_root: Option<PathBuf>,
    log_dir: Option<String>,
    token_ttl_hours: Option<i64>,
    bcrypt_cost: Option<u32>,
    max_upload_bytes: Option<usize>,
    db_connect_attempts: Option<u32>,
    db_connect_delay_ms: Option<u64>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_media_root() -> PathBuf {
    PathBuf::from("data/media")
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_token_ttl_hours() -> i64 {
    24 * 7
}

fn default_bcrypt_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_db_connect_attempts() -> u32 {
    30
}

fn default_db_connect_delay_ms() -> u64 {
    1000
}

impl ServerConfig {
    /// Loads the configuration from an optional TOML file, with environment
    /// variables (and `.env`) taking precedence over file values.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let file_config = match config_path {
            Some(path_str) => Self::read_file(Path::new(path_str))?,
            None => PartialServerConfig::default(),
        };

        let env_config: PartialServerConfig = envy::from_env::<PartialServerConfig>()?;

        Self::merge(env_config, file_config)
    }

    fn read_file(path: &Path) -> Result<PartialServerConfig, ConfigError> {
        if !path.exists() {
            return Ok(PartialServerConfig::default());
        }
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    // Environment overrides file.
    fn merge(
        env_config: PartialServerConfig,
        file_config: PartialServerConfig,
    ) -> Result<Self, ConfigError> {
        let config = ServerConfig {
            database_url: env_config
                .database_url
                .or(file_config.database_url)
                .ok_or(ConfigError::Missing("DATABASE_URL"))?,
            jwt_secret: env_config
                .jwt_secret
                .or(file_config.jwt_secret)
                .ok_or(ConfigError::Missing("JWT_SECRET"))?,
            listen_addr: env_config
                .listen_addr
                .or(file_config.listen_addr)
                .unwrap_or_else(default_listen_addr),
            media_root: env_config
                .media_root
                .or(file_config.media_root)
                .unwrap_or_else(default_media_root),
            log_dir: env_config
                .log_dir
                .or(file_config.log_dir)
                .unwrap_or_else(default_log_dir),
            token_ttl_hours: env_config
                .token_ttl_hours
                .or(file_config.token_ttl_hours)
                .unwrap_or_else(default_token_ttl_hours),
            bcrypt_cost: env_config
                .bcrypt_cost
                .or(file_config.bcrypt_cost)
                .unwrap_or_else(default_bcrypt_cost),
            max_upload_bytes: env_config
                .max_upload_bytes
                .or(file_config.max_upload_bytes)
                .unwrap_or_else(default_max_upload_bytes),
            db_connect_attempts: env_config
                .db_connect_attempts
                .or(file_config.db_connect_attempts)
                .unwrap_or_else(default_db_connect_attempts),
            db_connect_delay_ms: env_config
                .db_connect_delay_ms
                .or(file_config.db_connect_delay_ms)
                .unwrap_or_else(default_db_connect_delay_ms),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.is_empty() {
            return Err(ConfigError::Invalid {
                key: "JWT_SECRET",
                reason: "must not be empty".to_string(),
            });
        }
        if !(4..=31).contains(&self.bcrypt_cost) {
            return Err(ConfigError::Invalid {
                key: "BCRYPT_COST",
                reason: format!("{} is outside 4..=31", self.bcrypt_cost),
            });
        }
        if self.token_ttl_hours <= 0 {
            return Err(ConfigError::Invalid {
                key: "TOKEN_TTL_HOURS",
                reason: "must be positive".to_string(),
            });
        }
        if self.db_connect_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "DB_CONNECT_ATTEMPTS",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn db_connect_delay(&self) -> Duration {
        Duration::from_millis(self.db_connect_delay_ms)
    }
}

use std::env;
use std::str::FromStr;

// ============================================================================
// Configuration - environment-driven, resolved once at startup
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub db_user: String,
    pub db_password: String,
    pub db_host: String,
    pub db_port: u16,
    pub db_name: String,

    pub kafka_brokers: String,
    pub kafka_topic: String,
    pub kafka_group_id: String,
    pub topic_partitions: i32,

    pub cache_capacity: usize,
    pub http_addr: String,
}

impl Config {
    /// Database credentials have no defaults; everything else falls back to
    /// local-development values. A malformed numeric value is a startup
    /// error, never a silent default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            db_user: required("POSTGRES_USER")?,
            db_password: required("POSTGRES_PASSWORD")?,
            db_host: optional("POSTGRES_HOST", "localhost"),
            db_port: parsed("POSTGRES_PORT", 5432)?,
            db_name: optional("POSTGRES_DB", "orders"),
            kafka_brokers: optional("KAFKA_BROKERS", "127.0.0.1:9092"),
            kafka_topic: optional("KAFKA_TOPIC", "orders"),
            kafka_group_id: optional("KAFKA_GROUP_ID", "order-ingest"),
            topic_partitions: parsed("KAFKA_TOPIC_PARTITIONS", 1)?,
            cache_capacity: parsed("CACHE_CAPACITY", 100)?,
            http_addr: optional("HTTP_ADDR", "0.0.0.0:8080"),
        })
    }

    pub fn database_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.db_user, self.db_password, self.db_host, self.db_port, self.db_name
        )
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

fn optional(name: &'static str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value.parse().map_err(|_| ConfigError::Invalid {
            name,
            value,
        }),
        Err(_) => Ok(default),
    }
}

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_METRICS_PORT: u16 = 9090;
pub const DEFAULT_WORKERS: usize = 1;
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 900;
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_DB_ACQUIRE_TIMEOUT_MS: u64 = 5_000;

// Service configuration sourced from environment variables, with an optional
// YAML override file for ops-friendly deployments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // HTTP bind port for the API.
    pub port: u16,
    // Prometheus metrics bind port.
    pub metrics_port: u16,
    // Postgres settings; unset selects the in-memory store.
    pub database: Option<DatabaseConfig>,
    // AMQP broker URL; unset selects the in-process broker.
    pub rabbitmq_url: Option<String>,
    // Default worker count applied to each new tenant's pool.
    pub workers: usize,
    // HS256 signing secret for bearer tokens.
    pub auth_secret: String,
    // Token lifetime in seconds.
    pub token_ttl_secs: u64,
    // Deadline for draining consumer pools at shutdown.
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
struct ConfigOverride {
    server: Option<ServerOverride>,
    database: Option<DatabaseOverride>,
    rabbitmq: Option<RabbitMqOverride>,
    workers: Option<usize>,
    auth: Option<AuthOverride>,
    shutdown_grace_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ServerOverride {
    port: Option<u16>,
    metrics_port: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct DatabaseOverride {
    url: Option<String>,
    max_connections: Option<u32>,
    acquire_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RabbitMqOverride {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthOverride {
    secret: Option<String>,
    token_ttl_secs: Option<u64>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let port = env_parse("HIVE_PORT", DEFAULT_PORT)?;
        let metrics_port = env_parse("HIVE_METRICS_PORT", DEFAULT_METRICS_PORT)?;
        let workers = env_parse("HIVE_WORKERS", DEFAULT_WORKERS)?;
        let token_ttl_secs = env_parse("HIVE_TOKEN_TTL_SECS", DEFAULT_TOKEN_TTL_SECS)?;
        let shutdown_grace_secs =
            env_parse("HIVE_SHUTDOWN_GRACE_SECS", DEFAULT_SHUTDOWN_GRACE_SECS)?;
        let database = std::env::var("HIVE_DATABASE_URL").ok().map(|url| DatabaseConfig {
            url,
            max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            acquire_timeout_ms: DEFAULT_DB_ACQUIRE_TIMEOUT_MS,
        });
        let rabbitmq_url = std::env::var("HIVE_RABBITMQ_URL").ok();
        let auth_secret = std::env::var("HIVE_AUTH_SECRET").unwrap_or_default();
        let config = Self {
            port,
            metrics_port,
            database,
            rabbitmq_url,
            workers,
            auth_secret,
            token_ttl_secs,
            shutdown_grace_secs,
        };
        Ok(config)
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("HIVE_CONFIG") {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("read HIVE_CONFIG: {path}"))?;
            let overrides: ConfigOverride =
                serde_yaml::from_str(&contents).with_context(|| "parse config yaml")?;
            config.apply(overrides);
        }
        config.validate()?;
        Ok(config)
    }

    fn apply(&mut self, overrides: ConfigOverride) {
        if let Some(server) = overrides.server {
            if let Some(port) = server.port {
                self.port = port;
            }
            if let Some(metrics_port) = server.metrics_port {
                self.metrics_port = metrics_port;
            }
        }
        if let Some(database) = overrides.database {
            if let Some(url) = database.url {
                let current = self.database.get_or_insert_with(|| DatabaseConfig {
                    url: String::new(),
                    max_connections: DEFAULT_DB_MAX_CONNECTIONS,
                    acquire_timeout_ms: DEFAULT_DB_ACQUIRE_TIMEOUT_MS,
                });
                current.url = url;
            }
            if let Some(existing) = self.database.as_mut() {
                if let Some(max_connections) = database.max_connections {
                    existing.max_connections = max_connections;
                }
                if let Some(acquire_timeout_ms) = database.acquire_timeout_ms {
                    existing.acquire_timeout_ms = acquire_timeout_ms;
                }
            }
        }
        if let Some(rabbitmq) = overrides.rabbitmq {
            if let Some(url) = rabbitmq.url {
                self.rabbitmq_url = Some(url);
            }
        }
        if let Some(workers) = overrides.workers {
            self.workers = workers;
        }
        if let Some(auth) = overrides.auth {
            if let Some(secret) = auth.secret {
                self.auth_secret = secret;
            }
            if let Some(token_ttl_secs) = auth.token_ttl_secs {
                self.token_ttl_secs = token_ttl_secs;
            }
        }
        if let Some(shutdown_grace_secs) = overrides.shutdown_grace_secs {
            self.shutdown_grace_secs = shutdown_grace_secs;
        }
    }

    fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            bail!("workers must be greater than zero");
        }
        if self.auth_secret.is_empty() {
            bail!("HIVE_AUTH_SECRET (or auth.secret) must be set");
        }
        Ok(())
    }
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse::<T>().with_context(|| format!("parse {key}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    fn clear_hive_env() {
        for (key, _) in env::vars() {
            if key.starts_with("HIVE_") {
                unsafe {
                    env::remove_var(key);
                }
            }
        }
    }

    fn set_secret() {
        unsafe {
            env::set_var("HIVE_AUTH_SECRET", "s3cret");
        }
    }

    #[serial]
    #[test]
    fn from_env_uses_defaults() {
        clear_hive_env();
        set_secret();
        let config = AppConfig::from_env_or_yaml().expect("config");
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.metrics_port, DEFAULT_METRICS_PORT);
        assert_eq!(config.workers, DEFAULT_WORKERS);
        assert!(config.database.is_none());
        assert!(config.rabbitmq_url.is_none());
        assert_eq!(config.token_ttl_secs, DEFAULT_TOKEN_TTL_SECS);
        clear_hive_env();
    }

    #[serial]
    #[test]
    fn from_env_respects_env_vars() {
        clear_hive_env();
        set_secret();
        unsafe {
            env::set_var("HIVE_PORT", "9000");
            env::set_var("HIVE_WORKERS", "4");
            env::set_var("HIVE_DATABASE_URL", "postgres://localhost/hive");
            env::set_var("HIVE_RABBITMQ_URL", "amqp://localhost:5672");
        }
        let config = AppConfig::from_env_or_yaml().expect("config");
        assert_eq!(config.port, 9000);
        assert_eq!(config.workers, 4);
        assert_eq!(
            config.database.as_ref().map(|db| db.url.as_str()),
            Some("postgres://localhost/hive")
        );
        assert_eq!(config.rabbitmq_url.as_deref(), Some("amqp://localhost:5672"));
        clear_hive_env();
    }

    #[serial]
    #[test]
    fn from_env_rejects_invalid_port() {
        clear_hive_env();
        set_secret();
        unsafe {
            env::set_var("HIVE_PORT", "not-a-port");
        }
        assert!(AppConfig::from_env_or_yaml().is_err());
        clear_hive_env();
    }

    #[serial]
    #[test]
    fn missing_secret_fails_validation() {
        clear_hive_env();
        assert!(AppConfig::from_env_or_yaml().is_err());
    }

    #[serial]
    #[test]
    fn zero_workers_fails_validation() {
        clear_hive_env();
        set_secret();
        unsafe {
            env::set_var("HIVE_WORKERS", "0");
        }
        assert!(AppConfig::from_env_or_yaml().is_err());
        clear_hive_env();
    }

    #[serial]
    #[test]
    fn yaml_overrides_env() {
        clear_hive_env();
        set_secret();
        let tmpdir = TempDir::new().unwrap();
        let config_path = tmpdir.path().join("config.yml");
        fs::write(
            &config_path,
            r#"
server:
  port: 7070
database:
  url: "postgres://db/hive"
  max_connections: 3
rabbitmq:
  url: "amqp://broker:5672"
workers: 8
auth:
  token_ttl_secs: 60
"#,
        )
        .unwrap();
        unsafe {
            env::set_var("HIVE_CONFIG", config_path.to_str().unwrap());
        }

        let config = AppConfig::from_env_or_yaml().expect("config");
        assert_eq!(config.port, 7070);
        assert_eq!(config.workers, 8);
        assert_eq!(config.token_ttl_secs, 60);
        let database = config.database.expect("database");
        assert_eq!(database.url, "postgres://db/hive");
        assert_eq!(database.max_connections, 3);
        assert_eq!(config.rabbitmq_url.as_deref(), Some("amqp://broker:5672"));
        clear_hive_env();
    }

    #[serial]
    #[test]
    fn missing_override_file_fails() {
        clear_hive_env();
        set_secret();
        let tmpdir = TempDir::new().unwrap();
        let nonexistent = tmpdir.path().join("missing.yml");
        unsafe {
            env::set_var("HIVE_CONFIG", nonexistent.to_str().unwrap());
        }
        assert!(AppConfig::from_env_or_yaml().is_err());
        clear_hive_env();
    }

    #[serial]
    #[test]
    fn invalid_override_yaml_fails() {
        clear_hive_env();
        set_secret();
        let tmpdir = TempDir::new().unwrap();
        let config_path = tmpdir.path().join("bad.yml");
        fs::write(&config_path, "this is not: valid: yaml:").unwrap();
        unsafe {
            env::set_var("HIVE_CONFIG", config_path.to_str().unwrap());
        }
        assert!(AppConfig::from_env_or_yaml().is_err());
        clear_hive_env();
    }
}

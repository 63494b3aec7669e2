// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for scrapeyard-server.

use std::net::SocketAddr;

/// Default ceiling for a run's `max_run_time`, in seconds.
pub const DEFAULT_MAX_RUN_TIME: u64 = 86_400;

/// Default image every job runs.
pub const DEFAULT_RUN_IMAGE: &str = "scrapeyard/runner:latest";

/// Default namespace for dispatched jobs.
pub const DEFAULT_JOB_NAMESPACE: &str = "scrapeyard-runs";

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// S3-compatible blob store settings
    pub store: StoreConfig,
    /// Redis settings shared by the stream and key-value store
    pub redis: RedisConfig,
    /// HTTP listen address
    pub listen_addr: SocketAddr,
    /// Global ceiling for `max_run_time` in seconds
    pub max_run_time: u64,
    /// Image used for every job
    pub run_image: String,
    /// Namespace jobs are created in
    pub job_namespace: String,
    /// Log output format
    pub log_format: LogFormat,
}

/// Blob store connection settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Endpoint as `host:port`
    pub host: String,
    /// Bucket holding every blob
    pub bucket: String,
    /// Access key id
    pub access_key: String,
    /// Secret access key
    pub secret_key: String,
    /// Region presented to the S3 client
    pub region: String,
    /// Use https for the endpoint
    pub secure: bool,
}

impl StoreConfig {
    /// Endpoint URL derived from host and scheme.
    pub fn endpoint_url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}", scheme, self.host)
    }
}

/// Redis connection settings.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// `host:port`
    pub address: String,
    /// Password, empty for none
    pub password: String,
}

impl RedisConfig {
    /// `redis://` URL for the address, carrying the password when set.
    pub fn url(&self) -> String {
        let base = format!("redis://{}", self.address);
        if self.password.is_empty() {
            return base;
        }
        match url::Url::parse(&base) {
            Ok(mut url) => match url.set_password(Some(&self.password)) {
                Ok(()) => url.to_string(),
                Err(()) => base,
            },
            _ => base,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable lines
    Text,
    /// One JSON object per line
    Json,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::MissingEnvVar(name))
        };

        let store = StoreConfig {
            host: required("STORE_HOST")?,
            bucket: required("STORE_BUCKET")?,
            access_key: required("STORE_ACCESS_KEY")?,
            secret_key: required("STORE_SECRET_KEY")?,
            region: lookup("STORE_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            secure: lookup("STORE_SECURE")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        };

        let redis = RedisConfig {
            address: lookup("REDIS_ADDRESS").unwrap_or_else(|| "redis:6379".to_string()),
            password: lookup("REDIS_PASSWORD").unwrap_or_default(),
        };

        let listen_addr = parse_listen_addr(
            &lookup("SCRAPEYARD_LISTEN_ADDR").unwrap_or_else(|| ":8080".to_string()),
        )?;

        let max_run_time = match lookup("SCRAPEYARD_MAX_RUN_TIME") {
            Some(v) => v
                .parse()
                .map_err(|_| ConfigError::InvalidNumber("SCRAPEYARD_MAX_RUN_TIME"))?,
            None => DEFAULT_MAX_RUN_TIME,
        };

        let run_image =
            lookup("SCRAPEYARD_RUN_IMAGE").unwrap_or_else(|| DEFAULT_RUN_IMAGE.to_string());

        let job_namespace = lookup("SCRAPEYARD_JOB_NAMESPACE")
            .unwrap_or_else(|| DEFAULT_JOB_NAMESPACE.to_string());

        let log_format = match lookup("SCRAPEYARD_LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            store,
            redis,
            listen_addr,
            max_run_time,
            run_image,
            job_namespace,
            log_format,
        })
    }
}

/// Accepts `host:port`, or `:port` meaning every interface.
fn parse_listen_addr(value: &str) -> Result<SocketAddr, ConfigError> {
    let full = if value.starts_with(':') {
        format!("0.0.0.0{}", value)
    } else {
        value.to_string()
    };
    full.parse().map_err(|_| ConfigError::InvalidAddr(value.to_string()))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    /// The listen address is invalid.
    #[error("Invalid listen address: {0}")]
    InvalidAddr(String),
    /// A numeric variable could not be parsed.
    #[error("Invalid number in environment variable: {0}")]
    InvalidNumber(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const STORE: [(&str, &str); 4] = [
        ("STORE_HOST", "minio:9000"),
        ("STORE_BUCKET", "scrapeyard"),
        ("STORE_ACCESS_KEY", "admin"),
        ("STORE_SECRET_KEY", "changeme"),
    ];

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&STORE)).unwrap();
        assert_eq!(config.listen_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.redis.address, "redis:6379");
        assert_eq!(config.max_run_time, DEFAULT_MAX_RUN_TIME);
        assert_eq!(config.run_image, DEFAULT_RUN_IMAGE);
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.store.endpoint_url(), "http://minio:9000");
    }

    #[test]
    fn test_missing_store_host() {
        let err = Config::from_lookup(lookup(&STORE[1..])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar("STORE_HOST")));
    }

    #[test]
    fn test_overrides() {
        let mut vars = STORE.to_vec();
        vars.push(("SCRAPEYARD_LISTEN_ADDR", "127.0.0.1:9999"));
        vars.push(("SCRAPEYARD_MAX_RUN_TIME", "3600"));
        vars.push(("SCRAPEYARD_LOG_FORMAT", "json"));
        vars.push(("STORE_SECURE", "true"));
        let config = Config::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9999".parse().unwrap());
        assert_eq!(config.max_run_time, 3600);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.store.endpoint_url(), "https://minio:9000");
    }

    #[test]
    fn test_redis_url() {
        let mut redis = RedisConfig {
            address: "redis:6379".to_string(),
            password: String::new(),
        };
        assert_eq!(redis.url(), "redis://redis:6379");

        redis.password = "p@ss".to_string();
        assert_eq!(redis.url(), "redis://:p%40ss@redis:6379");
    }

    #[test]
    fn test_invalid_max_run_time() {
        let mut vars = STORE.to_vec();
        vars.push(("SCRAPEYARD_MAX_RUN_TIME", "forever"));
        assert!(matches!(
            Config::from_lookup(lookup(&vars)),
            Err(ConfigError::InvalidNumber("SCRAPEYARD_MAX_RUN_TIME"))
        ));
    }
}

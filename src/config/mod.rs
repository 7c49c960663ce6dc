use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    pub upstream: UpstreamConfig,
    pub server: ServerConfig,
    pub pointers: PointerConfig,
    pub logging: LoggingConfig,
}

/// Which key-value backend holds the cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Redis,
    Memory,
}

/// Key-value backend configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: BackendKind,
    pub redis_url: String,
    pub pool_size: usize,
    pub command_timeout_ms: u64,
    pub scan_batch_size: usize,
}

/// Outbound request configuration for relaying reads
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
}

/// HTTP listener configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Identity whose pointer configuration drives routing.
    pub principal: String,
}

/// Pointer store location
#[derive(Debug, Clone)]
pub struct PointerConfig {
    pub dir: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let storage = StorageConfig {
            backend: match env::var("STORAGE_BACKEND")
                .unwrap_or_else(|_| "redis".to_string())
                .to_lowercase()
                .as_str()
            {
                "redis" => BackendKind::Redis,
                "memory" => BackendKind::Memory,
                other => {
                    return Err(AppError::Config {
                        message: format!("Unknown STORAGE_BACKEND: {}", other),
                    })
                }
            },
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379/0".to_string()),
            pool_size: parse_var("REDIS_POOL_SIZE", 10),
            command_timeout_ms: parse_var("REDIS_COMMAND_TIMEOUT_MS", 5000),
            scan_batch_size: parse_var("SCAN_BATCH_SIZE", 100),
        };

        if storage.pool_size == 0 {
            return Err(AppError::Config {
                message: "REDIS_POOL_SIZE must be greater than zero".to_string(),
            });
        }
        if storage.scan_batch_size == 0 {
            return Err(AppError::Config {
                message: "SCAN_BATCH_SIZE must be greater than zero".to_string(),
            });
        }

        let upstream = UpstreamConfig {
            connect_timeout_ms: parse_var("UPSTREAM_CONNECT_TIMEOUT_MS", 5000),
            request_timeout_ms: parse_var("UPSTREAM_REQUEST_TIMEOUT_MS", 15000),
        };

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8888".to_string());
        let server = ServerConfig {
            bind_addr: bind_addr.parse().map_err(|_| AppError::Config {
                message: format!("BIND_ADDR is not a socket address: {}", bind_addr),
            })?,
            principal: env::var("PRINCIPAL").unwrap_or_else(|_| "default".to_string()),
        };

        let pointers = PointerConfig {
            dir: PathBuf::from(
                env::var("POINTER_DIR").unwrap_or_else(|_| "./data/pointers".to_string()),
            ),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        Ok(Config {
            storage,
            upstream,
            server,
            pointers,
            logging,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Redis,
            redis_url: "redis://127.0.0.1:6379/0".to_string(),
            pool_size: 10,
            command_timeout_ms: 5000,
            scan_batch_size: 100,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5000,
            request_timeout_ms: 15000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8888)),
            principal: "default".to_string(),
        }
    }
}

impl Default for PointerConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data/pointers"),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            upstream: UpstreamConfig::default(),
            server: ServerConfig::default(),
            pointers: PointerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

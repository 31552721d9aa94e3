use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::constants::limits::{MIN_HASH_OUTPUT_BYTES, MIN_SALT_BYTES};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    pub server: ServerConfig,

    pub session: SessionConfig,

    pub security: SecurityConfig,

    pub bootstrap: BootstrapConfig,

    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub app_name: String,

    pub database_path: String,

    pub log_level: String,

    /// Number of tokio worker threads (default: 0 = number of CPU cores)
    pub worker_threads: usize,

    /// Maximum database connections (default: 5)
    pub max_db_connections: u32,

    /// Minimum database connections (default: 1)
    pub min_db_connections: u32,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_name: "MediaMirror".to_string(),
            database_path: "sqlite:data/mediamirror.db".to_string(),
            log_level: "info".to_string(),
            worker_threads: 0,
            max_db_connections: 5,
            min_db_connections: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,

    pub port: u16,

    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 5000,
            cors_allowed_origins: vec![
                "http://localhost:5000".to_string(),
                "http://127.0.0.1:5000".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub cookie_name: String,

    pub cookie_path: String,

    pub cookie_domain: Option<String>,

    /// Set the Secure flag on the session cookie.
    /// Disable only for local development without HTTPS.
    pub secure: bool,

    pub http_only: bool,

    /// One of "strict", "lax" or "none"
    pub same_site: String,

    /// Lifetime of a persisted session, refreshed on every saved response.
    pub lifetime_days: i64,

    /// Re-issue the cookie (and push expiry forward) even when the session is unmodified.
    pub refresh_each_request: bool,

    /// Upper bound on the serialized session payload.
    pub max_data_bytes: usize,

    /// Responses under these path prefixes never carry a session cookie.
    pub no_cookie_paths: Vec<String>,

    /// Include the client address in the device fingerprint.
    pub bind_client_address: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "mm_session".to_string(),
            cookie_path: "/".to_string(),
            cookie_domain: None,
            secure: true,
            http_only: true,
            same_site: "strict".to_string(),
            lifetime_days: 31,
            refresh_each_request: true,
            max_data_bytes: 4096,
            no_cookie_paths: vec!["/static".to_string()],
            bind_client_address: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Argon2 memory cost in KiB (default: 262144 = 256MB)
    pub argon2_memory_cost_kib: u32,

    /// Argon2 time cost (iterations)
    pub argon2_time_cost: u32,

    pub argon2_parallelism: u32,

    /// Hash output length in bytes
    pub argon2_output_len: u32,

    pub argon2_salt_len: u32,

    /// Recompute weaker stored hashes on the next successful login
    pub auto_rehash: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            argon2_memory_cost_kib: 262_144,
            argon2_time_cost: 3,
            argon2_parallelism: 4,
            argon2_output_len: 64,
            argon2_salt_len: 32,
            auto_rehash: true,
        }
    }
}

/// First-run administrator. Only applied when the schema is created from scratch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BootstrapConfig {
    pub default_user: Option<String>,

    #[serde(skip_serializing)]
    pub default_user_password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,

    pub loki_enabled: bool,

    pub loki_url: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            loki_enabled: false,
            loki_url: "http://localhost:3100".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let paths = Self::config_paths();

        let mut config = None;
        for path in &paths {
            if path.exists() {
                info!("Loading config from: {}", path.display());
                config = Some(Self::load_from_path(path)?);
                break;
            }
        }

        let mut config = config.unwrap_or_else(|| {
            info!("No config file found, using defaults");
            Self::default()
        });
        config.apply_env_overrides();

        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Config saved to: {}", path.display());
        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(name) = std::env::var("APP_NAME") {
            self.general.app_name = name;
        }
        if let Ok(user) = std::env::var("APP_DEFAULT_USER") {
            self.bootstrap.default_user = Some(user);
        }
        if let Ok(password) = std::env::var("APP_DEFAULT_USER_PASSWORD") {
            self.bootstrap.default_user_password = Some(password);
        }
    }

    fn config_paths() -> Vec<PathBuf> {
        let mut paths = vec![];

        paths.push(PathBuf::from("config.toml"));

        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("mediamirror").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".mediamirror").join("config.toml"));
        }

        paths
    }

    pub fn validate(&self) -> Result<()> {
        if self.security.argon2_output_len < MIN_HASH_OUTPUT_BYTES {
            anyhow::bail!("argon2_output_len must be at least {MIN_HASH_OUTPUT_BYTES} bytes");
        }

        if self.security.argon2_salt_len < MIN_SALT_BYTES {
            anyhow::bail!("argon2_salt_len must be at least {MIN_SALT_BYTES} bytes");
        }

        if self.session.cookie_name.is_empty() {
            anyhow::bail!("Session cookie name cannot be empty");
        }

        if self.session.lifetime_days <= 0 {
            anyhow::bail!("Session lifetime must be > 0 days");
        }

        crate::session::cookie::parse_same_site(&self.session.same_site)?;

        Ok(())
    }
}

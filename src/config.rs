use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

/// Lowest PBKDF2 iteration count accepted for key derivation
pub const MIN_KDF_ITERATIONS: u32 = 100_000;

/// Shortest accepted HS256 secret, in bytes
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Placeholder shipped in sample configs; never valid as a signing key
const PLACEHOLDER_JWT_SECRET: &str = "change-me-in-production";

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub encryption: EncryptionConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

/// Storage backend variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Memory,
}

impl BackendKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" => Some(BackendKind::Local),
            "memory" => Some(BackendKind::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_backend")]
    pub backend: BackendKind,
    #[serde(default = "default_local_path")]
    pub local_path: String,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncryptionConfig {
    /// Secret stretched into per-payload keys. Empty means "generate and persist".
    #[serde(default)]
    pub secret: String,
    #[serde(default = "default_kdf_iterations")]
    pub kdf_iterations: u32,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuthConfig {
    /// HS256 secret shared with the identity service that issues bearer tokens.
    /// There is no default: tokens come from elsewhere, so a generated secret
    /// could never verify them.
    #[serde(default)]
    pub jwt_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaintenanceConfig {
    /// Seconds between sweeps; 0 disables the sweep
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    /// Stored objects younger than this are never treated as orphans
    #[serde(default = "default_orphan_grace")]
    pub orphan_grace_secs: u64,
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_db_path() -> String {
    "data/secureshare.db".to_string()
}

fn default_backend() -> BackendKind {
    BackendKind::Local
}

fn default_local_path() -> String {
    "data/uploads".to_string()
}

fn default_max_file_size() -> u64 {
    100 * 1024 * 1024 // 100MB
}

fn default_kdf_iterations() -> u32 {
    MIN_KDF_ITERATIONS
}

fn default_sweep_interval() -> u64 {
    3600
}

fn default_orphan_grace() -> u64 {
    3600
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            local_path: default_local_path(),
            max_file_size: default_max_file_size(),
        }
    }
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            kdf_iterations: default_kdf_iterations(),
        }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            orphan_grace_secs: default_orphan_grace(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides();
        config.enforce_kdf_floor();
        config.ensure_directories()?;
        config.ensure_encryption_secret()?;
        config.check_jwt_secret()?;
        tracing::info!(
            backend = ?config.storage.backend,
            max_file_size = config.storage.max_file_size,
            kdf_iterations = config.encryption.kdf_iterations,
            "Storage configuration"
        );
        Ok(config)
    }

    /// Parse a TOML document, falling back to defaults for missing keys
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.enforce_kdf_floor();
        Ok(config)
    }

    /// Ensure the encryption secret is set and persisted
    fn ensure_encryption_secret(&mut self) -> anyhow::Result<()> {
        if !self.encryption.secret.is_empty() {
            return Ok(());
        }

        let secret_path = Path::new("data/.encryption_secret");

        if secret_path.exists() {
            let secret = fs::read_to_string(secret_path)?;
            self.encryption.secret = secret.trim().to_string();
            tracing::info!("Loaded persisted encryption secret from data/.encryption_secret");
        } else {
            // Losing this file makes every stored payload unreadable
            let secret = format!(
                "{}{}",
                uuid::Uuid::new_v4().simple(),
                uuid::Uuid::new_v4().simple()
            );

            if let Some(parent) = secret_path.parent() {
                fs::create_dir_all(parent)?;
            }

            fs::write(secret_path, &secret)?;
            self.encryption.secret = secret;
            tracing::info!(
                "Generated and persisted new encryption secret to data/.encryption_secret"
            );
        }
        Ok(())
    }

    /// Load configuration from config.toml
    fn load_from_file() -> anyhow::Result<Self> {
        let config_paths = ["config.toml", "data/config.toml"];

        for path in config_paths {
            if Path::new(path).exists() {
                let content = fs::read_to_string(path)?;
                let config = Self::from_toml(&content)?;
                tracing::info!("Loaded configuration from {}", path);
                return Ok(config);
            }
        }

        tracing::info!("No configuration file found, using defaults");
        Ok(Config::default())
    }

    /// Apply environment variable overrides
    /// Format: SS_CONF_<SECTION>_<KEY>
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        // Server overrides
        if let Some(val) = lookup("SS_CONF_SERVER_HOST") {
            self.server.host = val;
        }
        if let Some(port) = lookup("SS_CONF_SERVER_PORT").and_then(|v| v.parse().ok()) {
            self.server.port = port;
        }

        // Database overrides
        if let Some(val) = lookup("SS_CONF_DATABASE_PATH") {
            self.database.path = val;
        }

        // Storage overrides
        if let Some(val) = lookup("SS_CONF_STORAGE_BACKEND") {
            match BackendKind::from_str(&val) {
                Some(kind) => self.storage.backend = kind,
                None => tracing::warn!("Ignoring unknown storage backend '{}'", val),
            }
        }
        if let Some(val) = lookup("SS_CONF_STORAGE_LOCAL_PATH") {
            self.storage.local_path = val;
        }
        if let Some(size) = lookup("SS_CONF_STORAGE_MAX_FILE_SIZE").and_then(|v| v.parse().ok()) {
            self.storage.max_file_size = size;
        }

        // Encryption overrides
        if let Some(val) = lookup("SS_CONF_ENCRYPTION_SECRET") {
            self.encryption.secret = val;
        }
        if let Some(n) = lookup("SS_CONF_ENCRYPTION_KDF_ITERATIONS").and_then(|v| v.parse().ok()) {
            self.encryption.kdf_iterations = n;
        }

        // Auth overrides
        if let Some(val) = lookup("SS_CONF_AUTH_JWT_SECRET") {
            self.auth.jwt_secret = val;
        }

        // Maintenance overrides
        if let Some(secs) =
            lookup("SS_CONF_MAINTENANCE_SWEEP_INTERVAL").and_then(|v| v.parse().ok())
        {
            self.maintenance.sweep_interval_secs = secs;
        }
        if let Some(secs) =
            lookup("SS_CONF_MAINTENANCE_ORPHAN_GRACE").and_then(|v| v.parse().ok())
        {
            self.maintenance.orphan_grace_secs = secs;
        }
    }

    /// Refuse to serve with a missing, placeholder or short token secret
    fn check_jwt_secret(&self) -> anyhow::Result<()> {
        let secret = self.auth.jwt_secret.trim();
        if secret.is_empty() {
            anyhow::bail!("auth.jwt_secret is not set; set SS_CONF_AUTH_JWT_SECRET");
        }
        if secret == PLACEHOLDER_JWT_SECRET {
            anyhow::bail!("auth.jwt_secret is still the placeholder value");
        }
        if secret.len() < MIN_JWT_SECRET_LEN {
            anyhow::bail!(
                "auth.jwt_secret must be at least {} bytes",
                MIN_JWT_SECRET_LEN
            );
        }
        Ok(())
    }

    fn enforce_kdf_floor(&mut self) {
        if self.encryption.kdf_iterations < MIN_KDF_ITERATIONS {
            tracing::warn!(
                "encryption.kdf_iterations={} is below the minimum, using {}",
                self.encryption.kdf_iterations,
                MIN_KDF_ITERATIONS
            );
            self.encryption.kdf_iterations = MIN_KDF_ITERATIONS;
        }
    }

    /// Ensure required directories exist
    fn ensure_directories(&self) -> anyhow::Result<()> {
        if let Some(parent) = Path::new(&self.database.path).parent() {
            fs::create_dir_all(parent)?;
        }

        if self.storage.backend == BackendKind::Local {
            fs::create_dir_all(&self.storage.local_path)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.storage.backend, BackendKind::Local);
        assert_eq!(config.storage.max_file_size, 100 * 1024 * 1024);
        assert_eq!(config.encryption.kdf_iterations, MIN_KDF_ITERATIONS);
    }

    #[test]
    fn toml_sections_are_parsed() {
        let config = Config::from_toml(
            r#"
            [server]
            port = 9000

            [storage]
            backend = "memory"
            max_file_size = 1024

            [encryption]
            secret = "s3cret"
            kdf_iterations = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.storage.backend, BackendKind::Memory);
        assert_eq!(config.storage.max_file_size, 1024);
        assert_eq!(config.encryption.secret, "s3cret");
        // Raised to the floor
        assert_eq!(config.encryption.kdf_iterations, MIN_KDF_ITERATIONS);
    }

    #[test]
    fn jwt_secret_must_be_configured() {
        let mut config = Config::default();
        assert!(config.auth.jwt_secret.is_empty());
        assert!(config.check_jwt_secret().is_err());

        for weak in ["   ", PLACEHOLDER_JWT_SECRET, "short-secret"] {
            config.auth.jwt_secret = weak.to_string();
            assert!(config.check_jwt_secret().is_err(), "accepted {:?}", weak);
        }

        config.apply_overrides(|k| {
            (k == "SS_CONF_AUTH_JWT_SECRET").then(|| "k".repeat(MIN_JWT_SECRET_LEN))
        });
        assert!(config.check_jwt_secret().is_ok());
    }

    #[test]
    fn jwt_secret_from_toml() {
        let config = Config::from_toml(
            r#"
            [auth]
            jwt_secret = "0123456789abcdef0123456789abcdef"
            "#,
        )
        .unwrap();
        assert!(config.check_jwt_secret().is_ok());
        assert!(Config::from_toml("").unwrap().check_jwt_secret().is_err());
    }

    #[test]
    fn env_overrides_win() {
        let vars: HashMap<&str, &str> = [
            ("SS_CONF_STORAGE_BACKEND", "Memory"),
            ("SS_CONF_STORAGE_MAX_FILE_SIZE", "42"),
            ("SS_CONF_SERVER_PORT", "not-a-port"),
            ("SS_CONF_MAINTENANCE_SWEEP_INTERVAL", "0"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.storage.backend, BackendKind::Memory);
        assert_eq!(config.storage.max_file_size, 42);
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.maintenance.sweep_interval_secs, 0);
    }
}

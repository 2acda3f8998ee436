use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Built front-end assets, served for every path the API does not handle
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            static_dir: default_static_dir(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static/dist")
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_backend() -> StoreBackend {
    StoreBackend::Sqlite
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Name of the session cookie
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
    /// Session lifetime in hours (default: 7 days)
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: i64,
    /// Mark the session cookie `Secure` (enable behind HTTPS)
    #[serde(default)]
    pub secure_cookie: bool,
    /// Superadmin created at startup if no user with this email exists
    #[serde(default)]
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_cookie: default_session_cookie(),
            session_ttl_hours: default_session_ttl_hours(),
            secure_cookie: false,
            bootstrap_admin: None,
        }
    }
}

fn default_session_cookie() -> String {
    "auth_session".to_string()
}

/// One year
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;

fn default_session_ttl_hours() -> i64 {
    24 * 7
}

#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
    #[serde(default = "default_admin_name")]
    pub name: String,
}

fn default_admin_name() -> String {
    "Administrator".to_string()
}

/// Path rules for the session gate. Prefixes match whole path segments.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    #[serde(default = "default_login_path")]
    pub login_path: String,
    #[serde(default = "default_dashboard_path")]
    pub dashboard_path: String,
    /// Reachable without a session
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
    /// Skipped by the gate entirely
    #[serde(default = "default_static_prefixes")]
    pub static_prefixes: Vec<String>,
    #[serde(default = "default_superadmin_paths")]
    pub superadmin_paths: Vec<String>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            login_path: default_login_path(),
            dashboard_path: default_dashboard_path(),
            public_paths: default_public_paths(),
            static_prefixes: default_static_prefixes(),
            superadmin_paths: default_superadmin_paths(),
        }
    }
}

fn default_login_path() -> String {
    "/login".to_string()
}

fn default_dashboard_path() -> String {
    "/dashboard".to_string()
}

fn default_public_paths() -> Vec<String> {
    vec!["/health".to_string(), "/api/auth/login".to_string()]
}

fn default_static_prefixes() -> Vec<String> {
    vec![
        "/static".to_string(),
        "/assets".to_string(),
        "/_frsh".to_string(),
        "/favicon.ico".to_string(),
    ]
}

fn default_superadmin_paths() -> Vec<String> {
    vec!["/psychologists".to_string(), "/api/psychologists".to_string()]
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config =
                toml::from_str(&content).with_context(|| "Failed to parse configuration file")?;
            config.validate()?;
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        let ttl = self.auth.session_ttl_hours;
        if !(1..=MAX_SESSION_TTL_HOURS).contains(&ttl) {
            anyhow::bail!(
                "auth.session_ttl_hours must be between 1 and {} (got {})",
                MAX_SESSION_TTL_HOURS,
                ttl
            );
        }
        Ok(())
    }

    /// Defaults with an in-memory store, for tests and throwaway instances
    pub fn in_memory() -> Self {
        let mut config = Self::default();
        config.store.backend = StoreBackend::Memory;
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.auth.session_cookie, "auth_session");
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        assert_eq!(config.access.login_path, "/login");
        assert!(config.auth.bootstrap_admin.is_none());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9100

[store]
backend = "memory"

[auth.bootstrap_admin]
email = "admin@clinic.test"
password = "Str0ng!Passphrase"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.store.backend, StoreBackend::Memory);
        let admin = config.auth.bootstrap_admin.unwrap();
        assert_eq!(admin.name, "Administrator");
        assert_eq!(config.auth.session_ttl_hours, 168);
    }

    #[test]
    fn test_session_ttl_bounds() {
        for ttl in ["0", "-5", "9223372036854775807"] {
            let mut file = NamedTempFile::new().unwrap();
            writeln!(file, "[auth]\nsession_ttl_hours = {}", ttl).unwrap();
            let err = Config::load(file.path()).unwrap_err();
            assert!(err.to_string().contains("session_ttl_hours"), "ttl {}", ttl);
        }
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = Config::load(Path::new("/nonexistent/clinic.toml")).unwrap();
        assert_eq!(config.server.port, 8000);
    }
}

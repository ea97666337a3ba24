//! Application configuration loaded from the environment.
//!
//! Unlike a fail-fast-on-first-error loader, invalid values are accumulated
//! so startup reports every violation at once rather than one at a time.

use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub host: String,
    pub adventures_dir: PathBuf,
    pub project_dir: PathBuf,
    pub allowed_origins: Vec<String>,
    pub max_connections: usize,
    pub log_level: String,
    pub log_file: bool,
    pub node_env: String,
    pub static_root: Option<PathBuf>,
    pub mock_sdk: bool,
    pub agent_base_url: String,
    pub agent_model: String,
    pub agent_api_key: Option<String>,
    pub image_service_base_url: Option<String>,
}

/// Accumulates "field is invalid: reason" strings rather than bailing on the
/// first one, so `AppConfig::from_env` can report every violation together.
#[derive(Default)]
struct Violations(Vec<String>);

impl Violations {
    fn push(&mut self, field: &str, reason: impl std::fmt::Display) {
        self.0.push(format!("{field}: {reason}"));
    }

    /// Read a required variable, recording a violation (and returning a
    /// placeholder) if it is absent.
    fn require(&mut self, key: &str) -> String {
        match env::var(key) {
            Ok(value) if !value.trim().is_empty() => value,
            Ok(_) => {
                self.push(key, "must not be empty");
                String::new()
            }
            Err(_) => {
                self.push(key, "is required");
                String::new()
            }
        }
    }

    /// Parse an optional variable, falling back to `default` when unset and
    /// recording a violation when set but unparsable.
    fn parse_or<T: std::str::FromStr>(&mut self, key: &str, default: T) -> T
    where
        T::Err: std::fmt::Display,
    {
        match env::var(key) {
            Err(_) => default,
            Ok(raw) => match raw.parse() {
                Ok(value) => value,
                Err(e) => {
                    self.push(key, e);
                    default
                }
            },
        }
    }

    fn bool_or(&mut self, key: &str, default: bool) -> bool {
        match env::var(key) {
            Err(_) => default,
            Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    self.push(key, format!("'{other}' is not a recognized boolean"));
                    default
                }
            },
        }
    }
}

const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "fatal"];

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let mut violations = Violations::default();

        let port = violations.parse_or("PORT", 3000u16);
        if port == 0 {
            violations.push("PORT", "must be between 1 and 65535");
        }

        let host = env::var("HOST").unwrap_or_else(|_| "localhost".to_string());

        let adventures_dir = PathBuf::from(
            env::var("ADVENTURES_DIR").unwrap_or_else(|_| "./data/adventures".to_string()),
        );

        let project_dir_raw = violations.require("PROJECT_DIR");
        let project_dir = PathBuf::from(&project_dir_raw);
        if !project_dir_raw.is_empty() && !project_dir.exists() {
            violations.push("PROJECT_DIR", "does not exist");
        }

        let allowed_origins: Vec<String> = env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173,http://localhost:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let max_connections: usize = violations.parse_or("MAX_CONNECTIONS", 100usize);
        if max_connections == 0 {
            violations.push("MAX_CONNECTIONS", "must be a positive integer");
        }

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        if !VALID_LOG_LEVELS.contains(&log_level.as_str()) {
            violations.push(
                "LOG_LEVEL",
                format!("'{log_level}' is not one of {VALID_LOG_LEVELS:?}"),
            );
        }

        let log_file = violations.bool_or("LOG_FILE", false);
        let node_env = env::var("NODE_ENV").unwrap_or_else(|_| "development".to_string());
        let static_root = env::var("STATIC_ROOT").ok().map(PathBuf::from);
        let mock_sdk = violations.bool_or("MOCK_SDK", false);

        let agent_base_url = env::var("AGENT_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:8787".to_string());
        let agent_model = env::var("AGENT_MODEL").unwrap_or_else(|_| "default".to_string());
        let agent_api_key = env::var("AGENT_API_KEY").ok();
        if !mock_sdk && agent_api_key.is_none() {
            tracing::warn!("AGENT_API_KEY is unset; upstream calls will be unauthenticated");
        }

        let image_service_base_url = env::var("IMAGE_SERVICE_BASE_URL").ok();

        if !violations.0.is_empty() {
            return Err(anyhow!(
                "invalid configuration ({} violation(s)):\n{}",
                violations.0.len(),
                violations.0.join("\n")
            ));
        }

        Ok(Self {
            port,
            host,
            adventures_dir,
            project_dir,
            allowed_origins,
            max_connections,
            log_level,
            log_file,
            node_env,
            static_root,
            mock_sdk,
            agent_base_url,
            agent_model,
            agent_api_key,
            image_service_base_url,
        })
    }
}

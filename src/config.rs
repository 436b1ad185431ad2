//! Configuration management.
//!
//! Loads configuration from environment variables (optionally via a `.env`
//! file) covering:
//! - HTTP server binding and public URL
//! - SQLite database location
//! - GitHub OAuth application and API endpoints
//! - Session lifetime
//! - Scan tuning (page size, commit lookup concurrency)

use std::env;
use std::sync::OnceLock;

use crate::error::{Error, Result};

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration
pub fn config() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Initialize configuration (call once at startup)
pub fn init() -> &'static Config {
    config()
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub github: GitHubConfig,
    pub session: SessionConfig,
    pub scan: ScanConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub public_url: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub client_id: String,
    pub client_secret: String,
    /// REST API base, e.g. `https://api.github.com`
    pub api_url: String,
    /// OAuth host, e.g. `https://github.com`
    pub oauth_url: String,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub max_age_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Repositories requested per listing page.
    pub page_size: u32,
    /// Maximum in-flight last-commit lookups per scan.
    pub concurrency: usize,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port = get("PORT", "8080").parse().unwrap_or(8080);

        Self {
            server: ServerConfig {
                host: get("HOST", "0.0.0.0"),
                port,
                public_url: get("PUBLIC_URL", &format!("http://localhost:{}", port))
                    .trim_end_matches('/')
                    .to_string(),
            },
            database: DatabaseConfig {
                path: get("DATABASE_PATH", "./data/abandoned.db"),
            },
            github: GitHubConfig {
                client_id: get("GITHUB_CLIENT_ID", ""),
                client_secret: get("GITHUB_CLIENT_SECRET", ""),
                api_url: get("GITHUB_API_URL", "https://api.github.com")
                    .trim_end_matches('/')
                    .to_string(),
                oauth_url: get("GITHUB_OAUTH_URL", "https://github.com")
                    .trim_end_matches('/')
                    .to_string(),
                scopes: get("GITHUB_SCOPES", "user repo")
                    .split_whitespace()
                    .map(String::from)
                    .collect(),
            },
            session: SessionConfig {
                max_age_seconds: get("SESSION_MAX_AGE", "604800")
                    .parse()
                    .unwrap_or(604800), // 7 days
            },
            scan: ScanConfig {
                page_size: get("SCAN_PAGE_SIZE", "100")
                    .parse()
                    .ok()
                    .filter(|n| (1..=100).contains(n))
                    .unwrap_or(100),
                concurrency: get("SCAN_CONCURRENCY", "4")
                    .parse()
                    .ok()
                    .filter(|n| *n > 0)
                    .unwrap_or(4),
            },
        }
    }

    /// Report missing required settings and malformed URLs.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.github.client_id.is_empty() {
            missing.push("GITHUB_CLIENT_ID");
        }
        if self.github.client_secret.is_empty() {
            missing.push("GITHUB_CLIENT_SECRET");
        }

        if !missing.is_empty() {
            return Err(Error::Validation(format!(
                "Missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        for (name, value) in [
            ("PUBLIC_URL", &self.server.public_url),
            ("GITHUB_API_URL", &self.github.api_url),
            ("GITHUB_OAUTH_URL", &self.github.oauth_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| Error::Validation(format!("{} is not a valid URL: {}", name, e)))?;
        }

        Ok(())
    }

    /// Whether cookies should carry the `Secure` attribute.
    pub fn secure_cookies(&self) -> bool {
        self.server.public_url.starts_with("https")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[]));
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.public_url, "http://localhost:8080");
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.github.scopes, vec!["user", "repo"]);
        assert_eq!(config.scan.page_size, 100);
        assert_eq!(config.scan.concurrency, 4);
        assert!(!config.secure_cookies());
    }

    #[test]
    fn test_out_of_range_scan_settings_fall_back() {
        let config = Config::from_lookup(lookup(&[
            ("SCAN_PAGE_SIZE", "500"),
            ("SCAN_CONCURRENCY", "0"),
        ]));
        assert_eq!(config.scan.page_size, 100);
        assert_eq!(config.scan.concurrency, 4);
    }

    #[test]
    fn test_validate_lists_missing_variables() {
        let config = Config::from_lookup(lookup(&[("GITHUB_CLIENT_ID", "abc")]));
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("GITHUB_CLIENT_SECRET"));
        assert!(!err.contains("GITHUB_CLIENT_ID"));

        let config = Config::from_lookup(lookup(&[
            ("GITHUB_CLIENT_ID", "abc"),
            ("GITHUB_CLIENT_SECRET", "shh"),
            ("PUBLIC_URL", "https://repos.example.com/"),
        ]));
        assert!(config.validate().is_ok());
        assert!(config.secure_cookies());
        assert_eq!(config.server.public_url, "https://repos.example.com");
    }

    #[test]
    fn test_validate_rejects_malformed_urls() {
        let config = Config::from_lookup(lookup(&[
            ("GITHUB_CLIENT_ID", "abc"),
            ("GITHUB_CLIENT_SECRET", "shh"),
            ("GITHUB_API_URL", "not a url"),
        ]));
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("GITHUB_API_URL"));
    }
}

//! Server configuration loaded from environment variables.

use axum::http::HeaderValue;
use tracing::warn;

use intake_core::defaults;

/// `EnvFilter` directives used when `RUST_LOG` is unset. The pipeline crates
/// log worker failures, lease expiry and reclaims at info.
pub const DEFAULT_LOG_FILTER: &str =
    "intake_api=debug,intake_jobs=info,intake_db=info,intake_inference=info,tower_http=debug";

/// Settings for the HTTP server and the stores it opens.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub file_storage_path: String,
    pub prompts_path: String,
    pub allowed_origins: Vec<HeaderValue>,
    pub max_upload_bytes: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: defaults::SERVER_HOST.to_string(),
            port: defaults::SERVER_PORT,
            database_url: defaults::DATABASE_URL.to_string(),
            db_max_connections: defaults::DB_MAX_CONNECTIONS,
            file_storage_path: defaults::FILE_STORAGE_PATH.to_string(),
            prompts_path: defaults::PROMPTS_PATH.to_string(),
            allowed_origins: parse_allowed_origins(defaults::ALLOWED_ORIGINS),
            max_upload_bytes: defaults::MAX_UPLOAD_SIZE_BYTES,
        }
    }
}

impl ApiConfig {
    /// Read `HOST`, `PORT`, `DATABASE_URL`, `DB_MAX_CONNECTIONS`,
    /// `FILE_STORAGE_PATH`, `PROMPTS_PATH` and `ALLOWED_ORIGINS`.
    pub fn from_env() -> Self {
        let base = Self::default();
        Self {
            host: std::env::var("HOST").unwrap_or(base.host),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(base.port),
            database_url: std::env::var("DATABASE_URL").unwrap_or(base.database_url),
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse::<u32>().ok())
                .filter(|&v| v > 0)
                .unwrap_or(base.db_max_connections),
            file_storage_path: std::env::var("FILE_STORAGE_PATH")
                .unwrap_or(base.file_storage_path),
            prompts_path: std::env::var("PROMPTS_PATH").unwrap_or(base.prompts_path),
            allowed_origins: std::env::var("ALLOWED_ORIGINS")
                .map(|v| parse_allowed_origins(&v))
                .unwrap_or(base.allowed_origins),
            max_upload_bytes: base.max_upload_bytes,
        }
    }

    /// Address the listener binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse a comma-separated origin list. Entries that are not `http(s)://`
/// origins are skipped with a warning; an empty result falls back to the
/// default origin.
pub fn parse_allowed_origins(raw: &str) -> Vec<HeaderValue> {
    let origins: Vec<HeaderValue> = raw
        .split(',')
        .filter_map(|s| {
            let trimmed = s.trim().trim_end_matches('/');
            if trimmed.is_empty() {
                return None;
            }
            if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
                warn!("Invalid CORS origin '{}': missing http(s) scheme", trimmed);
                return None;
            }
            match trimmed.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("Invalid CORS origin '{}': {}", trimmed, e);
                    None
                }
            }
        })
        .collect();

    if origins.is_empty() {
        return vec![HeaderValue::from_static(defaults::ALLOWED_ORIGINS)];
    }
    origins
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_filter_covers_pipeline_crates() {
        for target in ["intake_api", "intake_jobs", "intake_db", "intake_inference"] {
            assert!(
                DEFAULT_LOG_FILTER.contains(&format!("{}=", target)),
                "{} missing from default filter",
                target
            );
        }
        assert!(tracing_subscriber::EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }

    #[test]
    fn test_parse_allowed_origins_multiple() {
        let origins = parse_allowed_origins("https://intake.example.com, http://localhost:5173 ,");
        assert_eq!(origins.len(), 2);
        assert_eq!(origins[0], "https://intake.example.com");
        assert_eq!(origins[1], "http://localhost:5173");
    }

    #[test]
    fn test_parse_allowed_origins_skips_invalid() {
        let origins = parse_allowed_origins("not-a-url,https://valid.example.com/");
        assert_eq!(origins.len(), 1);
        assert_eq!(origins[0], "https://valid.example.com");
    }

    #[test]
    fn test_parse_allowed_origins_empty_uses_default() {
        let origins = parse_allowed_origins("  ");
        assert_eq!(origins, vec![HeaderValue::from_static("http://localhost:3000")]);
    }

    #[test]
    fn test_default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.port, 3000);
        assert_eq!(config.bind_addr(), "0.0.0.0:3000");
        assert_eq!(config.max_upload_bytes, 50 * 1024 * 1024);
        assert_eq!(config.db_max_connections, 1);
    }
}

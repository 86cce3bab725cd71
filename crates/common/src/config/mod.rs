//! Configuration management for Baanboard services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Reference catalog cache configuration
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Listing pipeline configuration
    #[serde(default)]
    pub listings: ListingsConfig,

    /// Authentication configuration
    pub auth: AuthConfig,

    /// Object storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Subscription billing configuration
    #[serde(default)]
    pub billing: BillingConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Serve from an empty in-process store instead of PostgreSQL
    #[serde(default)]
    pub in_memory: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    /// How long a localized snapshot of the reference tables stays fresh
    #[serde(default = "default_catalog_ttl")]
    pub ttl_secs: u64,

    /// Language used when a request does not carry one
    #[serde(default = "default_language")]
    pub default_language: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListingsConfig {
    /// Image attached to new listings that arrive without photos
    #[serde(default = "default_listing_image")]
    pub default_image_url: String,

    /// Page size used when a paginated search omits `limit`
    #[serde(default = "default_page_size")]
    pub default_page_size: u64,

    /// Upper bound on `limit`
    #[serde(default = "default_max_page_size")]
    pub max_page_size: u64,

    /// Idle time after which a search session is forgotten
    #[serde(default = "default_search_session_idle")]
    pub search_session_idle_secs: u64,

    /// Search sessions tracked at once
    #[serde(default = "default_max_search_sessions")]
    pub max_search_sessions: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Secret shared with the identity provider for session tokens
    pub jwt_secret: Option<String>,

    /// JWT expiration in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_secs: u64,

    /// Request ID header name
    #[serde(default = "default_request_id_header")]
    pub request_id_header: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Object storage REST endpoint
    #[serde(default = "default_storage_url")]
    pub base_url: String,

    /// Service key sent as bearer token
    pub service_key: Option<String>,

    /// Bucket for listing photos
    #[serde(default = "default_listing_bucket")]
    pub listing_bucket: String,

    /// Bucket for agent avatars
    #[serde(default = "default_avatar_bucket")]
    pub avatar_bucket: String,

    /// Maximum accepted upload size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BillingConfig {
    /// Hosted function that creates checkout sessions
    pub checkout_url: Option<String>,

    /// Customer portal login page
    #[serde(default = "default_portal_url")]
    pub portal_url: String,

    /// Price identifier of the premium plan
    pub premium_price_id: Option<String>,

    /// Where the payment provider sends the agent back to
    #[serde(default = "default_return_url")]
    pub return_url: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_catalog_ttl() -> u64 { 3600 }
fn default_language() -> String { crate::DEFAULT_LANGUAGE.to_string() }
fn default_listing_image() -> String { crate::DEFAULT_LISTING_IMAGE.to_string() }
fn default_page_size() -> u64 { 20 }
fn default_max_page_size() -> u64 { 100 }
fn default_search_session_idle() -> u64 { 600 }
fn default_max_search_sessions() -> u64 { 10_000 }
fn default_jwt_expiration() -> u64 { 3600 }
fn default_request_id_header() -> String { "X-Request-ID".to_string() }
fn default_storage_url() -> String { "http://localhost:54321/storage/v1".to_string() }
fn default_listing_bucket() -> String { "property-images".to_string() }
fn default_avatar_bucket() -> String { "avatars".to_string() }
fn default_max_upload_bytes() -> usize { 5 * 1024 * 1024 }
fn default_portal_url() -> String { "https://billing.stripe.com/p/login/aEUcP91FMd8u75K7ss".to_string() }
fn default_return_url() -> String { "http://localhost:5173/".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "baanboard".to_string() }
fn default_rate_limit() -> u32 { 50 }
fn default_burst() -> u32 { 100 }
fn default_enabled() -> bool { true }

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_catalog_ttl(),
            default_language: default_language(),
        }
    }
}

impl Default for ListingsConfig {
    fn default() -> Self {
        Self {
            default_image_url: default_listing_image(),
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            search_session_idle_secs: default_search_session_idle(),
            max_search_sessions: default_max_search_sessions(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_url: default_storage_url(),
            service_key: None,
            listing_bucket: default_listing_bucket(),
            avatar_bucket: default_avatar_bucket(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            checkout_url: None,
            portal_url: default_portal_url(),
            premium_price_id: None,
            return_url: default_return_url(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__CATALOG__TTL_SECS=600
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Get the reference catalog TTL as Duration
    pub fn catalog_ttl(&self) -> Duration {
        Duration::from_secs(self.catalog.ttl_secs)
    }

    /// Get the search session idle timeout as Duration
    pub fn search_session_idle(&self) -> Duration {
        Duration::from_secs(self.listings.search_session_idle_secs)
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                request_timeout_secs: default_request_timeout(),
                shutdown_timeout_secs: default_shutdown_timeout(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/baanboard".to_string(),
                read_url: None,
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
                in_memory: false,
            },
            catalog: CatalogConfig::default(),
            listings: ListingsConfig::default(),
            auth: AuthConfig {
                jwt_secret: None,
                jwt_expiration_secs: default_jwt_expiration(),
                request_id_header: default_request_id_header(),
            },
            storage: StorageConfig::default(),
            billing: BillingConfig::default(),
            observability: ObservabilityConfig {
                log_level: default_log_level(),
                json_logging: default_json_logging(),
                metrics_port: default_metrics_port(),
                service_name: default_service_name(),
            },
            rate_limit: RateLimitConfig {
                requests_per_second: default_rate_limit(),
                burst: default_burst(),
                enabled: default_enabled(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.catalog_ttl(), Duration::from_secs(3600));
        assert_eq!(config.storage.max_upload_bytes, 5 * 1024 * 1024);
        assert_eq!(config.listings.default_image_url, crate::DEFAULT_LISTING_IMAGE);
    }

    #[test]
    fn test_read_database_fallback() {
        let config = AppConfig::default();
        assert_eq!(config.read_database_url(), "postgres://localhost/baanboard");
    }
}

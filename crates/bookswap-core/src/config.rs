//! Marketplace configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the core can start with zero
//! configuration for local development.

use std::path::PathBuf;

/// Marketplace configuration.
#[derive(Debug, Clone)]
pub struct MarketConfig {
    /// Explicit database file path.
    /// Env: `BOOKSWAP_DB_PATH`
    /// Default: the platform data directory.
    pub db_path: Option<PathBuf>,

    /// Public base URL of the application, used to build cover links.
    /// Env: `APP_BASE_URL`
    /// Default: `http://localhost:8000`
    pub app_base_url: String,

    /// Public base URL of the object store for direct cover links.
    /// Env: `MEDIA_PUBLIC_URL`
    /// Default: unset.
    pub media_public_url: Option<String>,

    /// Prefer direct object-store URLs over the `/media/` proxy.
    /// Env: `MEDIA_PREFER_DIRECT_URL` (true/false)
    /// Default: `false`
    pub media_prefer_direct_url: bool,

    /// Messages returned per thread view when the caller gives no limit.
    /// Env: `CHAT_PAGE_SIZE`
    /// Default: `50`
    pub chat_page_size: u32,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            app_base_url: "http://localhost:8000".to_string(),
            media_public_url: None,
            media_prefer_direct_url: false,
            chat_page_size: 50,
        }
    }
}

impl MarketConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("BOOKSWAP_DB_PATH") {
            if !path.is_empty() {
                config.db_path = Some(PathBuf::from(path));
            }
        }

        if let Ok(url) = std::env::var("APP_BASE_URL") {
            if !url.is_empty() {
                config.app_base_url = url;
            }
        }

        if let Ok(url) = std::env::var("MEDIA_PUBLIC_URL") {
            if !url.is_empty() {
                config.media_public_url = Some(url);
            }
        }

        if let Ok(val) = std::env::var("MEDIA_PREFER_DIRECT_URL") {
            config.media_prefer_direct_url = val == "true" || val == "1";
        }

        if let Ok(val) = std::env::var("CHAT_PAGE_SIZE") {
            match val.parse::<u32>() {
                Ok(n) if n > 0 => config.chat_page_size = n,
                _ => {
                    tracing::warn!(value = %val, "Invalid CHAT_PAGE_SIZE, using default");
                }
            }
        }

        config
    }
}

//! Site configuration management.
//!
//! This module handles loading and saving the worker configuration: the
//! product name and version that together name the cache bucket, the
//! precache manifest, the offline fallback page, and the notification
//! presentation used for push messages.
//!
//! Configuration is stored at `~/.config/solex/config.json`. Every field has a
//! default matching the production site, so a missing file is not an error.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "solex";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment override for the origin the worker is installed on
pub const ORIGIN_ENV: &str = "SOLEX_ORIGIN";

/// Environment override for the log directory
pub const LOG_DIR_ENV: &str = "SOLEX_LOG_DIR";

const DEFAULT_PRODUCT: &str = "solex-logistics";
const DEFAULT_VERSION: &str = "1.0.0";
const DEFAULT_ORIGIN: &str = "http://localhost:8080";
const DEFAULT_OFFLINE_PAGE: &str = "/offline.html";
const DEFAULT_LOGO: &str = "/images/logo/logo_20250630_182319_1.png";

/// Assets written into the bucket at install time.
const DEFAULT_MANIFEST: &[&str] = &[
    "/",
    "/index.html",
    "/css/style.css",
    "/css/responsive.css",
    "/css/components.css",
    "/css/placeholders.css",
    "/css/common.css",
    "/js/main.js",
    "/js/animations.js",
    DEFAULT_LOGO,
    "/images/hero-truck_20250630_182439_1.png",
    "/images/service-general_20250630_182518_1.png",
    "/images/service-light_20250630_182618_1.png",
    "/images/female-driver_20250630_182726_1.png",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub product: String,
    pub version: String,
    pub origin: String,
    pub manifest: Vec<String>,
    pub offline_page: String,
    pub notification: NotificationConfig,
    pub log_dir: Option<PathBuf>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            product: DEFAULT_PRODUCT.to_string(),
            version: DEFAULT_VERSION.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            manifest: DEFAULT_MANIFEST.iter().map(|s| s.to_string()).collect(),
            offline_page: DEFAULT_OFFLINE_PAGE.to_string(),
            notification: NotificationConfig::default(),
            log_dir: None,
        }
    }
}

/// Presentation of notifications raised from push messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub title: String,
    /// Body used when a push message carries no payload
    pub default_body: String,
    pub icon: String,
    pub badge: String,
    pub vibrate: Vec<u32>,
    /// URL opened when the notification's open action is clicked
    pub target_url: String,
    pub open_label: String,
    pub close_label: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: "SOLEX LOGISTICS".to_string(),
            default_body: "SOLEX LOGISTICSからの新しいお知らせ".to_string(),
            icon: DEFAULT_LOGO.to_string(),
            badge: DEFAULT_LOGO.to_string(),
            vibrate: vec![200, 100, 200],
            target_url: "/".to_string(),
            open_label: "開く".to_string(),
            close_label: "閉じる".to_string(),
        }
    }
}

impl SiteConfig {
    /// Load the config file (or defaults), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_env();
        Ok(config)
    }

    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    /// Apply `SOLEX_ORIGIN` and `SOLEX_LOG_DIR` over file values.
    pub fn apply_env(&mut self) {
        if let Ok(origin) = std::env::var(ORIGIN_ENV) {
            if !origin.trim().is_empty() {
                self.origin = origin.trim().to_string();
            }
        }
        if let Ok(dir) = std::env::var(LOG_DIR_ENV) {
            if !dir.trim().is_empty() {
                self.log_dir = Some(PathBuf::from(dir.trim()));
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding on-disk cache buckets.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME).join("buckets"))
    }

    /// Name of the bucket owned by this version, e.g. `solex-logistics-v1.0.0`.
    pub fn bucket_name(&self) -> String {
        format!("{}-v{}", self.product, self.version)
    }
}

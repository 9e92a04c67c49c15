use std::env;
use std::path::PathBuf;
use std::time::Duration;

use log::info;
use url::Url;

use crate::error::ConfigError;

pub const DEFAULT_CHROME_BINARY: &str = "/usr/bin/google-chrome";
pub const DEFAULT_CHROMEDRIVER: &str = "/usr/local/bin/chromedriver";
pub const DEFAULT_CHROMEDRIVER_PORT: u16 = 9515;
pub const DEFAULT_DB_PATH: &str = "projects.db";
pub const DEFAULT_REGISTRY_URL: &str = "https://rera.odisha.gov.in/projects/project-list";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_PAGES: usize = 5;

/// Bounds on every wait the harvester performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub page_load: Duration,
    pub element: Duration,
    pub overlay: Duration,
    /// Fixed pause after navigation and pager clicks.
    pub settle: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            page_load: Duration::from_secs(30),
            element: Duration::from_secs(15),
            overlay: Duration::from_secs(3),
            settle: Duration::from_millis(4000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub chrome_binary: PathBuf,
    pub chromedriver: PathBuf,
    pub chromedriver_port: u16,
    pub db_path: PathBuf,
    pub registry_url: String,
    pub bind_addr: String,
    pub timeouts: Timeouts,
}

impl AppConfig {
    /// Read configuration from the process environment, after loading `.env` if one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        if dotenv::dotenv().is_ok() {
            info!("Loaded .env");
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let defaults = Timeouts::default();

        let registry_url = get("REGISTRY_URL", DEFAULT_REGISTRY_URL);
        Url::parse(&registry_url).map_err(|e| ConfigError::Invalid {
            var: "REGISTRY_URL",
            value: registry_url.clone(),
            reason: e.to_string(),
        })?;

        Ok(AppConfig {
            chrome_binary: PathBuf::from(get("CHROME_BINARY_PATH", DEFAULT_CHROME_BINARY)),
            chromedriver: PathBuf::from(get("CHROMEDRIVER_PATH", DEFAULT_CHROMEDRIVER)),
            chromedriver_port: parse_number(&lookup, "CHROMEDRIVER_PORT", DEFAULT_CHROMEDRIVER_PORT)?,
            db_path: db_path_from_url(&get("DB_URL", DEFAULT_DB_PATH)),
            registry_url,
            bind_addr: get("HARVEST_BIND_ADDR", DEFAULT_BIND_ADDR),
            timeouts: Timeouts {
                page_load: Duration::from_secs(parse_number(
                    &lookup,
                    "HARVEST_PAGE_LOAD_TIMEOUT_SECS",
                    defaults.page_load.as_secs(),
                )?),
                element: Duration::from_secs(parse_number(
                    &lookup,
                    "HARVEST_ELEMENT_TIMEOUT_SECS",
                    defaults.element.as_secs(),
                )?),
                overlay: Duration::from_secs(parse_number(
                    &lookup,
                    "HARVEST_OVERLAY_TIMEOUT_SECS",
                    defaults.overlay.as_secs(),
                )?),
                settle: Duration::from_millis(parse_number(
                    &lookup,
                    "HARVEST_SETTLE_DELAY_MS",
                    defaults.settle.as_millis() as u64,
                )?),
            },
        })
    }
}

fn parse_number<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var).filter(|v| !v.trim().is_empty()) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

/// Accepts a bare path or a `sqlite://` / `sqlite:` URL.
fn db_path_from_url(url: &str) -> PathBuf {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    PathBuf::from(path)
}

/// What a single harvest run is allowed to do.
#[derive(Debug, Clone)]
pub struct HarvestOptions {
    pub base_url: String,
    /// Upper bound on listing pages visited; always supplied by the caller.
    pub max_pages: usize,
    pub timeouts: Timeouts,
}

impl HarvestOptions {
    pub fn new(config: &AppConfig, max_pages: usize) -> Result<Self, ConfigError> {
        if max_pages == 0 {
            return Err(ConfigError::ZeroPages);
        }
        Ok(HarvestOptions {
            base_url: config.registry_url.clone(),
            max_pages,
            timeouts: config.timeouts,
        })
    }
}

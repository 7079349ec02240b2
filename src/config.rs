//! Runtime configuration from the environment
//!
//! | Variable | Default |
//! |---|---|
//! | `NL2SQL_API_BASE` | `http://127.0.0.1:8000` |
//! | `NL2SQL_VIEWPORT` | `1280x800` |
//! | `NL2SQL_WINDOW_MARGIN` | `12` |
//! | `RUST_LOG` | `info,nl2sql_explorer=debug` |

use crate::error::ConfigError;
use crate::geometry::Size;
use crate::window::DEFAULT_MARGIN;
use url::Url;

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000";
pub const DEFAULT_VIEWPORT: Size = Size::new(1280.0, 800.0);
pub const DEFAULT_LOG_FILTER: &str = "info,nl2sql_explorer=debug";

#[derive(Debug, Clone, PartialEq)]
pub struct ExplorerConfig {
    /// Service base address, without a trailing slash
    pub api_base_url: String,
    pub viewport: Size,
    pub window_margin: f32,
    pub log_filter: String,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE.to_string(),
            viewport: DEFAULT_VIEWPORT,
            window_margin: DEFAULT_MARGIN,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl ExplorerConfig {
    /// Load `.env` if present, then read the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or blank keys take their default
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(base) = get("NL2SQL_API_BASE") {
            config.api_base_url = validate_base_url(&base)?;
        }
        if let Some(viewport) = get("NL2SQL_VIEWPORT") {
            config.viewport = parse_viewport(&viewport)?;
        }
        if let Some(margin) = get("NL2SQL_WINDOW_MARGIN") {
            config.window_margin = parse_margin(&margin)?;
        }
        if let Some(filter) = get("RUST_LOG") {
            config.log_filter = filter;
        }
        Ok(config)
    }

    pub fn with_api_base(mut self, base: &str) -> Result<Self, ConfigError> {
        self.api_base_url = validate_base_url(base)?;
        Ok(self)
    }

    pub fn with_viewport(mut self, viewport: Size) -> Self {
        self.viewport = viewport;
        self
    }
}

/// Must be an absolute http(s) URL. Returned without a trailing slash.
pub fn validate_base_url(value: &str) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    let url = Url::parse(trimmed).map_err(|e| ConfigError::InvalidBaseUrl {
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" => Ok(trimmed.trim_end_matches('/').to_string()),
        other => Err(ConfigError::InvalidBaseUrl {
            value: value.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}

/// `WIDTHxHEIGHT`, both positive
pub fn parse_viewport(value: &str) -> Result<Size, ConfigError> {
    let invalid = || ConfigError::InvalidViewport(value.to_string());
    let (w, h) = value
        .trim()
        .split_once(|c| c == 'x' || c == 'X')
        .ok_or_else(invalid)?;
    let w: f32 = w.trim().parse().map_err(|_| invalid())?;
    let h: f32 = h.trim().parse().map_err(|_| invalid())?;
    if !(w.is_finite() && h.is_finite() && w > 0.0 && h > 0.0) {
        return Err(invalid());
    }
    Ok(Size::new(w, h))
}

fn parse_margin(value: &str) -> Result<f32, ConfigError> {
    match value.trim().parse::<f32>() {
        Ok(m) if m.is_finite() && m >= 0.0 => Ok(m),
        _ => Err(ConfigError::InvalidMargin(value.to_string())),
    }
}

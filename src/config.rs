use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_BOUNDARY_URL: &str = "https://raw.githubusercontent.com/Perishleaf/data-visualisation-scripts/master/dash_project_medium/Sydney_suburb.geojson";

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub histogram: HistogramConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    pub sales_csv: PathBuf,
    /// URL (http/https) or local path of the suburb boundary GeoJSON.
    #[serde(default = "default_boundary_source")]
    pub boundary_source: String,
    /// Feature property holding the suburb name.
    #[serde(default = "default_boundary_name_property")]
    pub boundary_name_property: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MapConfig {
    pub center_lat: f64,
    pub center_lon: f64,
    pub zoom: f64,
    pub opacity: f64,
    pub color_max: f64,
    pub token_env: String,
    pub token_file: PathBuf,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            center_lat: -33.865143,
            center_lon: 151.209900,
            zoom: 10.0,
            opacity: 0.6,
            color_max: 2_000_000.0,
            token_env: "MAPBOX_TOKEN".to_string(),
            token_file: PathBuf::from(".mapbox_token"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HistogramConfig {
    /// Upper bound of the price histogram's x axis.
    pub price_max: f64,
    pub price_bins: usize,
    /// Upper bound shared by the bed, bath and car histograms.
    pub count_max: f64,
}

pub const DEFAULT_PRICE_MAX: f64 = 2_500_000.0;

impl Default for HistogramConfig {
    fn default() -> Self {
        Self {
            price_max: DEFAULT_PRICE_MAX,
            price_bins: 50,
            count_max: 10.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8050,
            static_dir: PathBuf::from("static"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
        }
    }
}

fn default_boundary_source() -> String {
    DEFAULT_BOUNDARY_URL.to_string()
}

fn default_boundary_name_property() -> String {
    "nsw_loca_2".to_string()
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config = Self::from_toml(&content)?;
        if config.histogram.price_max != DEFAULT_PRICE_MAX {
            info!(
                "Price histogram range overridden to [0, {}]",
                config.histogram.price_max
            );
        }
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).with_context(|| "Failed to parse TOML configuration")
    }
}

/// Base-layer style for the choropleth, depending on whether a Mapbox token
/// could be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapStyle {
    pub style: String,
    pub access_token: Option<String>,
}

impl MapStyle {
    pub const TOKEN_STYLE: &'static str = "dark";
    pub const FALLBACK_STYLE: &'static str = "carto-darkmatter";

    /// Looks up the token in the environment, then in the token file. A
    /// missing token is not fatal: the map falls back to a tile style that
    /// needs no token.
    pub fn resolve(config: &MapConfig) -> Self {
        let from_env = std::env::var(&config.token_env).ok();
        Self::from_sources(from_env, &config.token_file)
    }

    pub fn from_sources(from_env: Option<String>, token_file: &Path) -> Self {
        let token = from_env
            .filter(|t| !t.trim().is_empty())
            .or_else(|| match fs::read_to_string(token_file) {
                Ok(t) if !t.trim().is_empty() => Some(t),
                Ok(_) => None,
                Err(e) => {
                    warn!(
                        "Mapbox token not found ({}: {}), using open street map tiles",
                        token_file.display(),
                        e
                    );
                    None
                }
            });

        match token {
            Some(t) => Self {
                style: Self::TOKEN_STYLE.to_string(),
                access_token: Some(t.trim().to_string()),
            },
            None => Self {
                style: Self::FALLBACK_STYLE.to_string(),
                access_token: None,
            },
        }
    }
}

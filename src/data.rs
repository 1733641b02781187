use crate::config::AppConfig;
use crate::types::{SaleRecord, SuburbBoundary};
use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, Trim};
use geo::MultiPolygon;
use geojson::GeoJson;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Sales and boundaries as loaded from disk and network, before any
/// aggregation.
pub struct SourceData {
    pub sales: Vec<SaleRecord>,
    pub boundaries: Vec<SuburbBoundary>,
}

pub async fn load_data(config: &AppConfig) -> Result<SourceData> {
    let sales = load_sales(&config.input.sales_csv)?;
    info!("Loaded {} sale records", sales.len());

    let boundaries = load_boundaries(config).await?;
    info!("Loaded {} suburb boundaries", boundaries.len());

    Ok(SourceData { sales, boundaries })
}

pub fn load_sales(path: &Path) -> Result<Vec<SaleRecord>> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file: {:?}", path))?;

    let mut records = Vec::new();
    for (line, result) in rdr.deserialize::<SaleRecord>().enumerate() {
        // Header is line 1.
        let record = result.with_context(|| format!("Malformed sale record at line {}", line + 2))?;
        records.push(record);
    }
    Ok(records)
}

pub async fn load_boundaries(config: &AppConfig) -> Result<Vec<SuburbBoundary>> {
    let source = config.input.boundary_source.as_str();
    let geojson = if is_remote(source) {
        fetch_geojson(source).await?
    } else {
        read_geojson(Path::new(source))?
    };
    parse_boundaries(geojson, &config.input.boundary_name_property)
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

pub async fn fetch_geojson(url: &str) -> Result<GeoJson> {
    info!("Fetching boundary GeoJSON from {}", url);
    let body = reqwest::get(url)
        .await
        .with_context(|| format!("Failed to fetch boundary file: {}", url))?
        .error_for_status()
        .with_context(|| format!("Boundary server refused request: {}", url))?
        .text()
        .await
        .context("Failed to read boundary response body")?;

    body.parse::<GeoJson>().context("Failed to parse boundary GeoJSON")
}

pub fn read_geojson(path: &Path) -> Result<GeoJson> {
    info!("Loading boundary GeoJSON from {:?}", path);
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    content.parse::<GeoJson>().context("Failed to parse boundary GeoJSON")
}

/// Extracts one boundary per polygon feature. Suburb names are title-cased
/// here so they match the casing used in the sales file.
pub fn parse_boundaries(geojson: GeoJson, name_property: &str) -> Result<Vec<SuburbBoundary>> {
    let collection = match geojson {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("Boundary GeoJSON must be a FeatureCollection")),
    };

    let mut boundaries = Vec::new();
    let mut skipped = 0usize;

    for feature in collection.features {
        let name = match feature.properties.as_ref().and_then(|props| props.get(name_property)) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => {
                skipped += 1;
                continue;
            }
        };

        let geometry = match feature.geometry {
            Some(geometry) => {
                let geometry: geo::Geometry<f64> = geometry
                    .value
                    .try_into()
                    .map_err(|e| anyhow!("Failed to convert geometry of {}: {:?}", name, e))?;

                match geometry {
                    geo::Geometry::MultiPolygon(mp) => mp,
                    geo::Geometry::Polygon(p) => MultiPolygon::new(vec![p]),
                    _ => {
                        skipped += 1;
                        continue;
                    }
                }
            }
            None => {
                skipped += 1;
                continue;
            }
        };

        boundaries.push(SuburbBoundary {
            suburb: title_case(&name),
            geometry,
        });
    }

    if skipped > 0 {
        warn!("Skipped {} boundary features without a name or polygon", skipped);
    }
    debug!("Parsed {} boundaries", boundaries.len());

    Ok(boundaries)
}

/// Upper-cases the first letter of every run of letters and lower-cases the
/// rest, so `ST. IVES CHASE` becomes `St. Ives Chase`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

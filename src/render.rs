use crate::config::{AppConfig, HistogramConfig, MapConfig, MapStyle};
use crate::types::{GeoHousePrice, Metric, SaleRecord};
use anyhow::{Context, Result};
use geojson::feature::Id;
use geojson::{Feature, FeatureCollection, Geometry};
use plotly::common::{Font, Marker, Title};
use plotly::layout::{Annotation, Axis};
use plotly::{Bar, Layout, Plot};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fs;
use std::path::PathBuf;
use tracing::info;

/// Plotly's sequential Viridis palette.
pub const VIRIDIS: [&str; 10] = [
    "#440154", "#482878", "#3e4989", "#31688e", "#26828e", "#1f9e89", "#35b779", "#6ece58",
    "#b5de2b", "#fde725",
];

/// Bar colour for every histogram: fourth from the bright end of Viridis.
pub const BAR_COLOR: &str = VIRIDIS[VIRIDIS.len() - 4];

const TRANSPARENT: &str = "rgba(0, 0, 0, 0)";
const FONT_COLOR: &str = "#f2f5fa";
const HISTOGRAM_HEIGHT: usize = 300;
pub const COLORBAR_TITLE: &str = "Selling Price in Millions (AUD)";
pub const EMPTY_ANNOTATION: &str = "No sales recorded";

/// One row of the histogram lookup table.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSpec {
    pub metric: Metric,
    pub axis_label: &'static str,
    pub title: &'static str,
    pub range: (f64, f64),
    pub bins: usize,
}

impl HistogramSpec {
    pub fn title_for(&self, suburb: Option<&str>) -> String {
        match suburb {
            Some(s) => format!("{} in {}", self.title, s),
            None => self.title.to_string(),
        }
    }

    fn bin_width(&self) -> f64 {
        (self.range.1 - self.range.0) / self.bins as f64
    }
}

/// The four histograms, in page order.
pub fn histogram_specs(config: &HistogramConfig) -> Vec<HistogramSpec> {
    let count_range = (0.0, config.count_max);
    // One bin per whole bedroom/bathroom/car space.
    let count_bins = config.count_max.ceil().max(1.0) as usize;

    vec![
        HistogramSpec {
            metric: Metric::Bed,
            axis_label: "Number of Beds",
            title: "Number of Beds Histogram",
            range: count_range,
            bins: count_bins,
        },
        HistogramSpec {
            metric: Metric::SellPrice,
            axis_label: "Selling Price in Millions (AUD)",
            title: "Selling Property Price Histogram",
            range: (0.0, config.price_max),
            bins: config.price_bins.max(1),
        },
        HistogramSpec {
            metric: Metric::Car,
            axis_label: "Number of Cars",
            title: "Number of Cars Histogram",
            range: count_range,
            bins: count_bins,
        },
        HistogramSpec {
            metric: Metric::Bath,
            axis_label: "Number of Baths",
            title: "Number of Baths Histogram",
            range: count_range,
            bins: count_bins,
        },
    ]
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bins {
    pub centers: Vec<f64>,
    pub counts: Vec<usize>,
    pub out_of_range: usize,
}

/// Counts values into `spec.bins` equal-width bins over the fixed range.
/// Bins are half-open except the last, which includes the upper bound.
pub fn bin_values<I>(spec: &HistogramSpec, values: I) -> Bins
where
    I: IntoIterator<Item = f64>,
{
    let (lo, hi) = spec.range;
    let width = spec.bin_width();
    let mut counts = vec![0usize; spec.bins];
    let mut out_of_range = 0;

    for v in values {
        if !(lo..=hi).contains(&v) {
            out_of_range += 1;
            continue;
        }
        let idx = (((v - lo) / width) as usize).min(spec.bins - 1);
        counts[idx] += 1;
    }

    let centers = (0..spec.bins).map(|i| lo + width * (i as f64 + 0.5)).collect();
    Bins {
        centers,
        counts,
        out_of_range,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Histogram {
    pub metric: Metric,
    pub title: String,
    pub empty: bool,
    pub out_of_range: usize,
    pub figure: Value,
}

/// Builds a histogram figure for `records`. The axis range comes from the
/// spec alone, never from the data.
pub fn build_histogram(spec: &HistogramSpec, records: &[&SaleRecord], suburb: Option<&str>) -> Histogram {
    let bins = bin_values(spec, records.iter().filter_map(|r| r.value(spec.metric)));
    let empty = records.is_empty();
    let title = spec.title_for(suburb);

    let trace = Bar::new(bins.centers, bins.counts)
        .name(spec.axis_label)
        .width(spec.bin_width())
        .marker(Marker::new().color(BAR_COLOR));

    let mut layout = Layout::new()
        .title(Title::with_text(title.as_str()))
        .height(HISTOGRAM_HEIGHT)
        .plot_background_color(TRANSPARENT)
        .paper_background_color(TRANSPARENT)
        .font(Font::new().color(FONT_COLOR))
        .bar_gap(0.05)
        .x_axis(
            Axis::new()
                .title(Title::with_text(spec.axis_label))
                .range(vec![spec.range.0, spec.range.1])
                .show_grid(false),
        )
        .y_axis(Axis::new().title(Title::with_text("count")).show_grid(false));
    if empty {
        layout = layout.annotations(vec![Annotation::new()
            .text(EMPTY_ANNOTATION)
            .show_arrow(false)
            .x_ref("paper")
            .y_ref("paper")
            .x(0.5)
            .y(0.5)]);
    }

    let mut plot = Plot::new();
    plot.add_trace(trace);
    plot.set_layout(layout);

    Histogram {
        metric: spec.metric,
        title,
        empty,
        out_of_range: bins.out_of_range,
        figure: serde_json::from_str(&plot.to_json()).unwrap_or_default(),
    }
}

/// Joined table as a FeatureCollection whose feature ids are suburb names.
pub fn suburb_feature_collection(rows: &[GeoHousePrice]) -> FeatureCollection {
    let features = rows
        .iter()
        .map(|row| {
            let mut properties = Map::new();
            properties.insert("suburb".to_string(), json!(row.suburb));
            for metric in Metric::ALL {
                properties.insert(metric.column().to_string(), json!(row.stats.get(metric)));
            }
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(geojson::Value::from(&row.geometry))),
                id: Some(Id::String(row.suburb.clone())),
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Choropleth of median sell price per suburb.
pub fn build_map(rows: &[GeoHousePrice], config: &MapConfig, style: &MapStyle) -> Value {
    let locations: Vec<&str> = rows.iter().map(|r| r.suburb.as_str()).collect();
    let prices: Vec<Option<f64>> = rows.iter().map(|r| r.stats.sell_price).collect();

    json!({
        "data": [{
            "type": "choroplethmapbox",
            "geojson": suburb_feature_collection(rows),
            "featureidkey": "id",
            "locations": locations,
            "z": prices,
            "zmin": 0.0,
            "zmax": config.color_max,
            "colorscale": "Viridis",
            "marker": { "opacity": config.opacity, "line": { "width": 0.5 } },
            "hovertemplate": "Suburb=%{location}<br>Selling Price=%{z}<extra></extra>",
            "colorbar": {
                "title": { "text": COLORBAR_TITLE, "side": "right" },
                "x": 0.92,
                "xpad": 0,
            },
        }],
        "layout": {
            "autosize": true,
            "mapbox": {
                "style": style.style,
                "accesstoken": style.access_token,
                "center": { "lat": config.center_lat, "lon": config.center_lon },
                "zoom": config.zoom,
            },
            "plot_bgcolor": TRANSPARENT,
            "paper_bgcolor": TRANSPARENT,
            "font": { "color": FONT_COLOR },
            "margin": { "l": 0, "r": 0, "t": 0, "b": 0 },
        },
    })
}

/// Writes the joined table and the initial dashboard view into the output
/// directory.
pub fn export(config: &AppConfig, rows: &[GeoHousePrice], view: &impl Serialize) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(&config.output.dir)
        .with_context(|| format!("Failed to create output directory: {:?}", config.output.dir))?;

    let geojson_path = config.output.dir.join("geo_house_prices.geojson");
    let collection = suburb_feature_collection(rows);
    let body = serde_json::to_string(&collection).context("Failed to serialise joined table")?;
    fs::write(&geojson_path, body)
        .with_context(|| format!("Failed to write {:?}", geojson_path))?;
    info!("Wrote {} suburbs to {:?}", rows.len(), geojson_path);

    let view_path = config.output.dir.join("dashboard.json");
    let body = serde_json::to_string_pretty(view).context("Failed to serialise dashboard view")?;
    fs::write(&view_path, body).with_context(|| format!("Failed to write {:?}", view_path))?;
    info!("Wrote initial dashboard view to {:?}", view_path);

    Ok(vec![geojson_path, view_path])
}

//! Click-driven filtering.
//!
//! [`Dashboard`] holds everything loaded at startup and never changes after
//! construction. Each click is handled by advancing a [`Selection`] and
//! building a fresh [`DashboardView`] from it.

use crate::config::{AppConfig, MapStyle};
use crate::data::SourceData;
use crate::processing::{aggregate_by_suburb, filter_sales, geo_join, median_of_aggregates, sales_per_month};
use crate::render::{build_histogram, build_map, histogram_specs, Histogram, HistogramSpec};
use crate::types::{GeoHousePrice, MedianStats, Metric, MonthCount, SaleRecord, SuburbAggregate};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

pub const DEFAULT_HEADER: &str = "Median House Prices Sydney";

/// Controller state. There is no way back to `Unfiltered` once a suburb
/// has been clicked.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum Selection {
    #[default]
    Unfiltered,
    Filtered(String),
}

impl Selection {
    /// Next state after a click. A click without a location keeps the
    /// current state; a click with one replaces any previous selection.
    pub fn apply(self, location: Option<&str>) -> Selection {
        match location {
            Some(suburb) => Selection::Filtered(suburb.to_string()),
            None => self,
        }
    }

    pub fn suburb(&self) -> Option<&str> {
        match self {
            Selection::Unfiltered => None,
            Selection::Filtered(s) => Some(s.as_str()),
        }
    }
}

impl From<Option<String>> for Selection {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(s) => Selection::Filtered(s),
            None => Selection::Unfiltered,
        }
    }
}

impl From<Selection> for Option<String> {
    fn from(value: Selection) -> Self {
        match value {
            Selection::Unfiltered => None,
            Selection::Filtered(s) => Some(s),
        }
    }
}

/// Plotly `clickData` payload. Only the first point is used.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClickData {
    #[serde(default)]
    pub points: Vec<ClickPoint>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClickPoint {
    pub location: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl ClickData {
    pub fn location(&self) -> Option<&str> {
        self.points.first().and_then(|p| p.location.as_deref())
    }

    /// `(lon, lat)` of the first point, if the click carried coordinates.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        let point = self.points.first()?;
        Some((point.lon?, point.lat?))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatLabel {
    pub metric: Metric,
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub header: String,
    pub stats: Vec<StatLabel>,
    pub histograms: Vec<Histogram>,
}

pub fn header_for(selection: &Selection) -> String {
    match selection.suburb() {
        Some(s) => format!("{} (suburb selected {})", DEFAULT_HEADER, s),
        None => DEFAULT_HEADER.to_string(),
    }
}

pub fn stat_labels(stats: &MedianStats) -> Vec<StatLabel> {
    Metric::ALL
        .iter()
        .map(|&metric| {
            let value = match stats.get(metric) {
                Some(v) => format!("{:.2}", v),
                None => "n/a".to_string(),
            };
            let text = match metric {
                Metric::SellPrice => format!("Selling Price is {}", value),
                Metric::Bed => format!("Number of Bedrooms is {}", value),
                Metric::Bath => format!("Number of Bathrooms is {}", value),
                Metric::Car => format!("Number of Carspaces is {}", value),
            };
            StatLabel { metric, text }
        })
        .collect()
}

/// Tables and figures built once at startup.
pub struct Dashboard {
    sales: Vec<SaleRecord>,
    aggregates: Vec<SuburbAggregate>,
    suburbs: Vec<GeoHousePrice>,
    histograms: Vec<HistogramSpec>,
    map: Value,
    month_counts: Vec<MonthCount>,
}

impl Dashboard {
    /// Aggregates and joins the source data. A join with no rows means the
    /// two inputs share no suburb names and is treated as a startup failure.
    pub fn build(source: SourceData, config: &AppConfig, style: &MapStyle) -> Result<Self> {
        let SourceData { sales, boundaries } = source;
        let boundary_count = boundaries.len();

        let aggregates = aggregate_by_suburb(&sales);
        info!("Computed median statistics for {} suburbs", aggregates.len());

        let suburbs = geo_join(boundaries, &aggregates);
        if suburbs.is_empty() {
            bail!(
                "No suburbs matched between {} boundaries and {} aggregates",
                boundary_count,
                aggregates.len()
            );
        }
        info!("Joined {} suburbs onto boundaries", suburbs.len());

        let map = build_map(&suburbs, &config.map, style);
        let month_counts = sales_per_month(&sales);

        Ok(Self {
            sales,
            aggregates,
            suburbs,
            histograms: histogram_specs(&config.histogram),
            map,
            month_counts,
        })
    }

    /// Recomputes the header, stat labels and histograms for `selection`.
    /// Nothing is cached between calls.
    pub fn view(&self, selection: &Selection) -> DashboardView {
        let (records, stats) = match selection.suburb() {
            None => (
                self.sales.iter().collect::<Vec<_>>(),
                median_of_aggregates(&self.aggregates),
            ),
            Some(suburb) => {
                let records = filter_sales(&self.sales, suburb);
                let stats = median_of_aggregates(&aggregate_by_suburb(records.iter().copied()));
                debug!("Selected {} with {} sales", suburb, records.len());
                (records, stats)
            }
        };

        let histograms = self
            .histograms
            .iter()
            .map(|spec| build_histogram(spec, &records, selection.suburb()))
            .collect();

        DashboardView {
            header: header_for(selection),
            stats: stat_labels(&stats),
            histograms,
        }
    }

    pub fn map(&self) -> &Value {
        &self.map
    }

    pub fn suburbs(&self) -> &[GeoHousePrice] {
        &self.suburbs
    }

    pub fn month_counts(&self) -> &[MonthCount] {
        &self.month_counts
    }
}

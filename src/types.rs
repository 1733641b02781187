use chrono::{NaiveDate, NaiveDateTime};
use geo::MultiPolygon;
use serde::{Deserialize, Deserializer, Serialize};

/// One historical sale, as read from the prices CSV.
///
/// `bed`, `bath` and `car` are blank for some listings; those load as `None`
/// and are skipped by the medians.
#[derive(Debug, Clone, Deserialize)]
pub struct SaleRecord {
    #[serde(rename = "Date", deserialize_with = "deserialize_sale_date")]
    pub date: NaiveDate,
    pub suburb: String,
    #[serde(rename = "sellPrice")]
    pub sell_price: f64,
    #[serde(default)]
    pub bed: Option<f64>,
    #[serde(default)]
    pub bath: Option<f64>,
    #[serde(default)]
    pub car: Option<f64>,
}

impl SaleRecord {
    pub fn value(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::SellPrice => Some(self.sell_price),
            Metric::Bed => self.bed,
            Metric::Bath => self.bath,
            Metric::Car => self.car,
        }
    }
}

/// The numeric columns the dashboard summarises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    SellPrice,
    Bed,
    Bath,
    Car,
}

impl Metric {
    /// Stat label order on the page: price, bedrooms, bathrooms, car spaces.
    pub const ALL: [Metric; 4] = [Metric::SellPrice, Metric::Bed, Metric::Bath, Metric::Car];

    /// Column name in the source CSV.
    pub fn column(self) -> &'static str {
        match self {
            Metric::SellPrice => "sellPrice",
            Metric::Bed => "bed",
            Metric::Bath => "bath",
            Metric::Car => "car",
        }
    }
}

/// Median of each metric over some group of sales. A metric with no values
/// in the group is `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MedianStats {
    pub sell_price: Option<f64>,
    pub bed: Option<f64>,
    pub bath: Option<f64>,
    pub car: Option<f64>,
}

impl MedianStats {
    pub fn get(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::SellPrice => self.sell_price,
            Metric::Bed => self.bed,
            Metric::Bath => self.bath,
            Metric::Car => self.car,
        }
    }

    pub fn set(&mut self, metric: Metric, value: Option<f64>) {
        match metric {
            Metric::SellPrice => self.sell_price = value,
            Metric::Bed => self.bed = value,
            Metric::Bath => self.bath = value,
            Metric::Car => self.car = value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuburbAggregate {
    pub suburb: String,
    #[serde(flatten)]
    pub stats: MedianStats,
}

#[derive(Debug, Clone)]
pub struct SuburbBoundary {
    pub suburb: String,
    pub geometry: MultiPolygon<f64>,
}

/// A row of the joined table: boundary geometry plus that suburb's medians.
#[derive(Debug, Clone)]
pub struct GeoHousePrice {
    pub suburb: String,
    pub geometry: MultiPolygon<f64>,
    pub stats: MedianStats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthCount {
    pub month: String,
    pub count: usize,
}

// The prices file has been exported both as plain dates and as timestamps.
fn deserialize_sale_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_sale_date(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid sale date: {raw:?}")))
}

pub fn parse_sale_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%d/%m/%Y"))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|dt| dt.date())
        })
}

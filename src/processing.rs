use crate::types::{
    GeoHousePrice, MedianStats, Metric, MonthCount, SaleRecord, SuburbAggregate, SuburbBoundary,
};
use chrono::Datelike;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// 50th percentile with linear interpolation between the two middle values.
/// NaN and infinite values are skipped.
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let pos = (sorted.len() - 1) as f64 * 0.5;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

/// Medians of every metric over a group of sales, skipping missing values.
pub fn median_stats<'a, I>(records: I) -> MedianStats
where
    I: IntoIterator<Item = &'a SaleRecord>,
{
    let records: Vec<&SaleRecord> = records.into_iter().collect();
    let mut stats = MedianStats::default();
    for metric in Metric::ALL {
        let values: Vec<f64> = records.iter().filter_map(|r| r.value(metric)).collect();
        stats.set(metric, median(&values));
    }
    stats
}

/// Groups sales by exact suburb name and takes per-suburb medians.
/// Output is sorted by suburb.
pub fn aggregate_by_suburb<'a, I>(records: I) -> Vec<SuburbAggregate>
where
    I: IntoIterator<Item = &'a SaleRecord>,
{
    let mut groups: BTreeMap<&str, Vec<&SaleRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.suburb.as_str()).or_default().push(record);
    }

    let groups: Vec<(&str, Vec<&SaleRecord>)> = groups.into_iter().collect();
    groups
        .par_iter()
        .map(|(suburb, group)| SuburbAggregate {
            suburb: suburb.to_string(),
            stats: median_stats(group.iter().copied()),
        })
        .collect()
}

/// Median across suburb aggregates (a median of medians), per metric.
pub fn median_of_aggregates<'a, I>(aggregates: I) -> MedianStats
where
    I: IntoIterator<Item = &'a SuburbAggregate>,
{
    let aggregates: Vec<&SuburbAggregate> = aggregates.into_iter().collect();
    let mut stats = MedianStats::default();
    for metric in Metric::ALL {
        let values: Vec<f64> = aggregates.iter().filter_map(|a| a.stats.get(metric)).collect();
        stats.set(metric, median(&values));
    }
    stats
}

pub fn filter_sales<'a>(records: &'a [SaleRecord], suburb: &str) -> Vec<&'a SaleRecord> {
    records.iter().filter(|r| r.suburb == suburb).collect()
}

/// Inner join of boundaries and aggregates on the exact suburb name.
///
/// Boundary order is kept. Rows without a partner on the other side are
/// dropped without error.
pub fn geo_join(boundaries: Vec<SuburbBoundary>, aggregates: &[SuburbAggregate]) -> Vec<GeoHousePrice> {
    let by_suburb: HashMap<&str, &SuburbAggregate> =
        aggregates.iter().map(|a| (a.suburb.as_str(), a)).collect();

    let joined: Vec<GeoHousePrice> = boundaries
        .into_iter()
        .filter_map(|boundary| {
            by_suburb.get(boundary.suburb.as_str()).map(|aggregate| GeoHousePrice {
                suburb: boundary.suburb,
                geometry: boundary.geometry,
                stats: aggregate.stats,
            })
        })
        .collect();

    debug!("Joined {} suburbs", joined.len());
    joined
}

/// Number of sales per calendar month, most active month first. Ties are
/// broken by calendar order.
pub fn sales_per_month(records: &[SaleRecord]) -> Vec<MonthCount> {
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for record in records {
        *counts.entry(record.date.month()).or_default() += 1;
    }

    let mut months: Vec<(u32, usize)> = counts.into_iter().collect();
    months.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    months
        .into_iter()
        .filter_map(|(month, count)| {
            let name = u8::try_from(month)
                .ok()
                .and_then(|m| chrono::Month::try_from(m).ok())?
                .name();
            Some(MonthCount {
                month: name.to_string(),
                count,
            })
        })
        .collect()
}

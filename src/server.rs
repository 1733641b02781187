use crate::config::AppConfig;
use crate::dashboard::{ClickData, Dashboard, DashboardView, Selection};
use crate::error::ApiError;
use crate::types::{GeoHousePrice, MonthCount, SuburbAggregate};
use anyhow::{Context, Result};
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Path as UrlPath, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use geo::{BoundingRect, Contains, Point};
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

// Bounding box of one joined suburb, pointing back into the row slice.
struct SuburbEnvelope {
    index: usize,
    aabb: AABB<[f64; 2]>,
}

impl RTreeObject for SuburbEnvelope {
    type Envelope = AABB<[f64; 2]>;
    fn envelope(&self) -> Self::Envelope {
        self.aabb
    }
}

/// Point-in-suburb lookup over the joined table.
pub struct SuburbIndex {
    tree: RTree<SuburbEnvelope>,
}

impl SuburbIndex {
    pub fn new(rows: &[GeoHousePrice]) -> Self {
        let items: Vec<SuburbEnvelope> = rows
            .iter()
            .enumerate()
            .filter_map(|(i, row)| {
                let rect = row.geometry.bounding_rect()?;
                Some(SuburbEnvelope {
                    index: i,
                    aabb: AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
                })
            })
            .collect();

        Self {
            tree: RTree::bulk_load(items),
        }
    }

    /// The row whose geometry contains `(lon, lat)`, if any.
    pub fn locate<'a>(&self, rows: &'a [GeoHousePrice], lon: f64, lat: f64) -> Option<&'a GeoHousePrice> {
        let point = Point::new(lon, lat);
        let envelope = AABB::from_point([lon, lat]);

        self.tree
            .locate_in_envelope_intersecting(&envelope)
            .filter_map(|candidate| rows.get(candidate.index))
            .find(|row| row.geometry.contains(&point))
    }
}

pub struct AppState {
    pub dashboard: Dashboard,
    pub index: SuburbIndex,
}

impl AppState {
    pub fn new(dashboard: Dashboard) -> Self {
        info!("Building spatial index for {} suburbs", dashboard.suburbs().len());
        let index = SuburbIndex::new(dashboard.suburbs());
        Self { dashboard, index }
    }

    fn locate(&self, lon: f64, lat: f64) -> Option<&GeoHousePrice> {
        self.index.locate(self.dashboard.suburbs(), lon, lat)
    }
}

#[derive(Debug, Deserialize)]
pub struct DashboardQuery {
    suburb: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ClickRequest {
    #[serde(default)]
    selection: Selection,
    #[serde(default)]
    click: Option<ClickData>,
}

#[derive(Debug, Serialize)]
pub struct ClickResponse {
    selection: Selection,
    view: DashboardView,
}

#[derive(Debug, Deserialize)]
pub struct LocateQuery {
    lat: f64,
    lon: f64,
}

pub fn router(state: Arc<AppState>, static_dir: &Path) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/map", get(map_handler))
        .route("/api/dashboard", get(dashboard_handler))
        .route("/api/click", post(click_handler))
        .route("/api/locate", get(locate_handler))
        .route("/api/suburbs", get(suburbs_handler))
        .route("/api/suburbs/:name", get(suburb_handler))
        .route("/api/sales-per-month", get(sales_per_month_handler))
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: AppConfig, dashboard: Dashboard) -> Result<()> {
    let state = Arc::new(AppState::new(dashboard));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));
    let app = router(state, &config.server.static_dir);

    info!("Starting server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn map_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(state.dashboard.map().clone())
}

async fn dashboard_handler(
    State(state): State<Arc<AppState>>,
    params: Result<Query<DashboardQuery>, QueryRejection>,
) -> Result<Json<DashboardView>, ApiError> {
    let Query(params) = params?;
    let selection = match params.suburb {
        Some(s) if s.trim().is_empty() => {
            return Err(ApiError::BadRequest("suburb must not be empty".to_string()))
        }
        other => Selection::from(other),
    };
    Ok(Json(state.dashboard.view(&selection)))
}

async fn click_handler(
    State(state): State<Arc<AppState>>,
    request: Result<Json<ClickRequest>, JsonRejection>,
) -> Result<Json<ClickResponse>, ApiError> {
    let Json(request) = request?;
    let click = request.click.unwrap_or_default();

    // Clicks on the choropleth carry the suburb name; clicks elsewhere may
    // only carry a coordinate.
    let location = match click.location() {
        Some(name) => Some(name),
        None => click
            .coordinates()
            .and_then(|(lon, lat)| state.locate(lon, lat))
            .map(|row| row.suburb.as_str()),
    };
    debug!("Map clicked at {:?}", location);

    let selection = request.selection.apply(location);
    let view = state.dashboard.view(&selection);
    Ok(Json(ClickResponse { selection, view }))
}

async fn locate_handler(
    State(state): State<Arc<AppState>>,
    params: Result<Query<LocateQuery>, QueryRejection>,
) -> Result<Json<Option<SuburbAggregate>>, ApiError> {
    let Query(params) = params?;
    if !(-90.0..=90.0).contains(&params.lat) || !(-180.0..=180.0).contains(&params.lon) {
        return Err(ApiError::BadRequest(format!(
            "coordinate out of range: lat {}, lon {}",
            params.lat, params.lon
        )));
    }

    Ok(Json(state.locate(params.lon, params.lat).map(suburb_row)))
}

async fn suburbs_handler(State(state): State<Arc<AppState>>) -> Json<Vec<SuburbAggregate>> {
    Json(state.dashboard.suburbs().iter().map(suburb_row).collect())
}

async fn suburb_handler(
    State(state): State<Arc<AppState>>,
    UrlPath(name): UrlPath<String>,
) -> Result<Json<SuburbAggregate>, ApiError> {
    state
        .dashboard
        .suburbs()
        .iter()
        .find(|row| row.suburb == name)
        .map(|row| Json(suburb_row(row)))
        .ok_or_else(|| ApiError::NotFound(format!("no suburb named {}", name)))
}

async fn sales_per_month_handler(State(state): State<Arc<AppState>>) -> Json<Vec<MonthCount>> {
    Json(state.dashboard.month_counts().to_vec())
}

fn suburb_row(row: &GeoHousePrice) -> SuburbAggregate {
    SuburbAggregate {
        suburb: row.suburb.clone(),
        stats: row.stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MedianStats;
    use geo::{polygon, MultiPolygon};

    fn square(suburb: &str, x: f64) -> GeoHousePrice {
        GeoHousePrice {
            suburb: suburb.to_string(),
            geometry: MultiPolygon::new(vec![polygon![
                (x: x, y: 0.0),
                (x: x + 1.0, y: 0.0),
                (x: x + 1.0, y: 1.0),
                (x: x, y: 1.0),
                (x: x, y: 0.0),
            ]]),
            stats: MedianStats::default(),
        }
    }

    #[test]
    fn locate_finds_containing_suburb() {
        let rows = vec![square("Bondi", 0.0), square("Manly", 1.0)];
        let index = SuburbIndex::new(&rows);

        assert_eq!(index.locate(&rows, 0.5, 0.5).map(|r| r.suburb.as_str()), Some("Bondi"));
        assert_eq!(index.locate(&rows, 1.5, 0.5).map(|r| r.suburb.as_str()), Some("Manly"));
        assert!(index.locate(&rows, 5.0, 5.0).is_none());
    }

    #[test]
    fn locate_checks_geometry_not_just_bounding_box() {
        let triangle = GeoHousePrice {
            suburb: "Wedge".to_string(),
            geometry: MultiPolygon::new(vec![polygon![
                (x: 0.0, y: 0.0),
                (x: 1.0, y: 0.0),
                (x: 1.0, y: 1.0),
                (x: 0.0, y: 0.0),
            ]]),
            stats: MedianStats::default(),
        };
        let rows = vec![triangle];
        let index = SuburbIndex::new(&rows);

        assert!(index.locate(&rows, 0.9, 0.1).is_some());
        assert!(index.locate(&rows, 0.1, 0.9).is_none());
    }
}

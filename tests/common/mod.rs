//! Shared fixtures for the API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use housing_dashboard::config::{AppConfig, MapStyle};
use housing_dashboard::dashboard::Dashboard;
use housing_dashboard::data;
use housing_dashboard::server::{router, AppState};

/// Auburn has many cheap sales, Bondi two mid-range ones and Manly a single
/// expensive one, so the median of suburb medians differs from the raw median.
pub const SALES_CSV: &str = "\
Date,Id,suburb,postalCode,sellPrice,bed,bath,car,propType
2019-01-03,1,Auburn,2144,100000,2,1,1,unit
2019-01-04,2,Auburn,2144,100000,2,1,1,unit
2019-02-05,3,Auburn,2144,100000,2,1,1,unit
2019-02-06,4,Auburn,2144,100000,2,1,1,unit
2019-03-07,5,Auburn,2144,100000,2,1,,unit
2019-03-08,6,Bondi,2026,1000000,3,2,1,house
2019-03-09,7,Bondi,2026,1200000,4,2,2,house
2019-04-10,8,Manly,2095,2000000,5,3,2,house
2019-04-11,9,Parramatta,2150,700000,3,2,1,house
";

/// Boundary names are upper case, as served by the remote provider. Auburn,
/// Bondi and Manly are unit squares side by side; Ryde has no sales.
pub const BOUNDARIES: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        {"type": "Feature", "properties": {"nsw_loca_2": "AUBURN"},
         "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
        {"type": "Feature", "properties": {"nsw_loca_2": "BONDI"},
         "geometry": {"type": "Polygon", "coordinates": [[[1,0],[2,0],[2,1],[1,1],[1,0]]]}},
        {"type": "Feature", "properties": {"nsw_loca_2": "MANLY"},
         "geometry": {"type": "Polygon", "coordinates": [[[2,0],[3,0],[3,1],[2,1],[2,0]]]}},
        {"type": "Feature", "properties": {"nsw_loca_2": "RYDE"},
         "geometry": {"type": "Polygon", "coordinates": [[[3,0],[4,0],[4,1],[3,1],[3,0]]]}}
    ]
}"#;

pub const INDEX_HTML: &str = "<html><body>dashboard shell</body></html>";

pub struct TestApp {
    pub router: Router,
    // Keeps the fixture files alive for the duration of the test.
    _dir: TempDir,
}

pub fn fixture_config(dir: &TempDir) -> AppConfig {
    let sales = dir.path().join("prices_data.csv");
    let boundaries = dir.path().join("suburbs.geojson");
    let static_dir = dir.path().join("static");
    std::fs::write(&sales, SALES_CSV).unwrap();
    std::fs::write(&boundaries, BOUNDARIES).unwrap();
    std::fs::create_dir_all(&static_dir).unwrap();
    std::fs::write(static_dir.join("index.html"), INDEX_HTML).unwrap();

    let toml = format!(
        "[input]\nsales_csv = {:?}\nboundary_source = {:?}\n\n[server]\nstatic_dir = {:?}\n\n[output]\ndir = {:?}\n",
        sales.display().to_string(),
        boundaries.display().to_string(),
        static_dir.display().to_string(),
        dir.path().join("output").display().to_string(),
    );
    AppConfig::from_toml(&toml).unwrap()
}

pub fn fallback_style() -> MapStyle {
    MapStyle {
        style: MapStyle::FALLBACK_STYLE.to_string(),
        access_token: None,
    }
}

pub async fn fixture_dashboard() -> (TempDir, AppConfig, Dashboard) {
    let dir = TempDir::new().unwrap();
    let config = fixture_config(&dir);
    let source = data::load_data(&config).await.unwrap();
    let dashboard = Dashboard::build(source, &config, &fallback_style()).unwrap();
    (dir, config, dashboard)
}

pub async fn build_test_app() -> TestApp {
    let (dir, config, dashboard) = fixture_dashboard().await;
    let state = Arc::new(AppState::new(dashboard));
    TestApp {
        router: router(state, &config.server.static_dir),
        _dir: dir,
    }
}

pub async fn get(app: &TestApp, uri: &str) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, bytes.to_vec())
}

pub async fn get_json(app: &TestApp, uri: &str) -> (StatusCode, serde_json::Value) {
    let (status, bytes) = get(app, uri).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

pub async fn post_json(
    app: &TestApp,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

/// Text of the stat label for `metric` in a serialised view.
pub fn stat_text(view: &serde_json::Value, metric: &str) -> String {
    view["stats"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["metric"] == metric)
        .unwrap()["text"]
        .as_str()
        .unwrap()
        .to_string()
}

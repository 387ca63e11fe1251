//! `GET /{model}` point-forecast query handler (§6).
//!
//! Grounded in `edr-api::handlers::position`'s extract-params /
//! negotiate-format / build-response shape, narrowed to the one query kind
//! this minimal surface exposes: an hourly point series, optionally
//! overlaid across every Domain registered for `model`.

use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use chrono::{Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use wx_common::{TimerangeDt, WxError};
use wx_domain::Variable;
use wx_grid::PointMode;
use wx_mixer::Mixer;
use wx_reader::Reader;

use crate::state::AppState;

const HOURLY_DT_SECONDS: u64 = 3600;
const MAX_FORECAST_DAYS: u32 = 16;

/// Query parameters for `GET /{model}`, a subset of §6's full list —
/// `daily`, `current_weather`, and the unit-conversion parameters are
/// accepted but not yet honored by this minimal surface.
#[derive(Debug, Deserialize)]
pub struct QueryParams {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: Option<f64>,
    pub hourly: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub forecast_days: Option<u32>,
    pub past_days: Option<u32>,
    pub format: Option<String>,
}

#[derive(Debug, Serialize)]
struct QueryResponse {
    latitude: f64,
    longitude: f64,
    elevation: f64,
    hourly: serde_json::Map<String, serde_json::Value>,
    hourly_units: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: bool,
    reason: String,
}

fn bad_request(reason: impl Into<String>) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: true, reason: reason.into() })).into_response()
}

fn error_response(err: WxError) -> Response {
    let status = match &err {
        WxError::OutOfRange { .. } => StatusCode::BAD_REQUEST,
        WxError::UpsamplingForbidden { .. } => StatusCode::BAD_REQUEST,
        WxError::GridMiss => StatusCode::NOT_FOUND,
        WxError::Cancelled => StatusCode::GATEWAY_TIMEOUT,
        WxError::FormatInvalid { .. } | WxError::IoError { .. } | WxError::UnitMismatch { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let reason = if matches!(err, WxError::GridMiss) {
        "no data available for this location".to_string()
    } else {
        err.to_string()
    };
    (status, Json(ErrorResponse { error: true, reason })).into_response()
}

/// Parses `start_date`/`end_date` (`YYYY-MM-DD`) if present, otherwise
/// derives a window from `past_days`/`forecast_days` around today (UTC).
fn resolve_time_range(params: &QueryParams) -> Result<TimerangeDt, String> {
    let forecast_days = params.forecast_days.unwrap_or(7);
    if forecast_days == 0 || forecast_days > MAX_FORECAST_DAYS {
        return Err(format!("forecast_days must be in 1..={MAX_FORECAST_DAYS}"));
    }
    let past_days = params.past_days.unwrap_or(0);

    let (start_date, end_date) = match (&params.start_date, &params.end_date) {
        (Some(s), Some(e)) => {
            let start = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| format!("invalid start_date {s}"))?;
            let end = NaiveDate::parse_from_str(e, "%Y-%m-%d").map_err(|_| format!("invalid end_date {e}"))?;
            (start, end)
        }
        _ => {
            let today = Utc::now().date_naive();
            (today - Duration::days(past_days as i64), today + Duration::days(forecast_days as i64))
        }
    };
    if end_date <= start_date {
        return Err("end_date must be after start_date".to_string());
    }

    let start = Utc.from_utc_datetime(&start_date.and_hms_opt(0, 0, 0).unwrap()).timestamp();
    let end = Utc.from_utc_datetime(&end_date.and_hms_opt(0, 0, 0).unwrap()).timestamp();
    TimerangeDt::new(start, end, HOURLY_DT_SECONDS).map_err(|e| e.to_string())
}

/// `GET /{model}`
pub async fn query_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(model): Path<String>,
    Query(params): Query<QueryParams>,
) -> Response {
    if params.latitude.abs() > 90.0 {
        return bad_request("latitude must be in [-90, 90]");
    }
    if params.longitude.abs() > 180.0 {
        return bad_request("longitude must be in [-180, 180]");
    }

    let time_range = match resolve_time_range(&params) {
        Ok(r) => r,
        Err(reason) => return bad_request(reason),
    };

    let requested: Vec<String> = match &params.hourly {
        Some(s) => s.split(',').map(|v| v.trim().to_string()).filter(|v| !v.is_empty()).collect(),
        None => return bad_request("hourly must name at least one variable"),
    };
    if requested.is_empty() {
        return bad_request("hourly must name at least one variable");
    }

    let models: Vec<&str> = if model == "best_match" {
        // `models` is a HashMap, so key order is nondeterministic; the
        // Mixer (§4.6) treats later sources as higher priority, so the
        // overlay stack must be sorted coarse-to-fine rather than relying
        // on registration order, or a coarse Domain could randomly win
        // over a fine one.
        let mut names: Vec<&str> = state.registry.models.keys().map(|s| s.as_str()).collect();
        names.sort_by_key(|name| state.registry.get(name).expect("from registry keys").domain.kind.resolution_rank());
        names
    } else {
        match state.registry.get(&model) {
            Some(_) => vec![model.as_str()],
            None => return bad_request(format!("unknown model {model}")),
        }
    };

    // One Reader per (contributing Domain), built once and reused across
    // every requested Variable — mirrors the Mixer's "ordered stack of
    // sources per point" shape (§4.6). `models` is already coarse-to-fine,
    // so this loop preserves that priority order into `readers`.
    let mut readers = Vec::new();
    let mut first_grid_elevation = None;
    for m in &models {
        let entry = state.registry.get(m).expect("validated above");
        let found = entry.domain.grid.find_point(
            params.latitude,
            params.longitude,
            params.elevation.unwrap_or(0.0),
            PointMode::TerrainOptimised,
        );
        if let Some(found) = found {
            let target_elevation = params.elevation.unwrap_or(found.grid_elevation as f64);
            first_grid_elevation.get_or_insert(target_elevation);
            let reader = Reader::new(
                Arc::clone(&entry.domain),
                Arc::clone(&state.cache),
                found.index,
                found.grid_elevation,
                target_elevation,
                params.latitude,
                params.longitude,
            );
            readers.push((reader, entry));
        }
    }
    if readers.is_empty() {
        return error_response(WxError::GridMiss);
    }

    let mut hourly = serde_json::Map::new();
    let mut hourly_units = serde_json::Map::new();
    hourly.insert("time".to_string(), serde_json::json!(time_steps(&time_range)));

    for name in &requested {
        let variable: Option<&Variable> = readers.iter().find_map(|(_, e)| e.variables.get(name));
        let Some(variable) = variable else {
            return bad_request(format!("unknown variable {name}"));
        };

        let sources: Vec<&dyn wx_mixer::PointSource> = readers
            .iter()
            .filter(|(_, e)| e.variables.contains_key(name))
            .map(|(r, _)| r as &dyn wx_mixer::PointSource)
            .collect();
        let mixer = Mixer::new(sources);

        match mixer.get(variable, time_range) {
            Ok((values, unit)) => {
                hourly.insert(name.clone(), serde_json::json!(values));
                hourly_units.insert(name.clone(), serde_json::json!(unit.as_str()));
            }
            Err(e) => return error_response(e),
        }
    }

    let elevation = first_grid_elevation.unwrap_or(0.0);
    let response = QueryResponse { latitude: params.latitude, longitude: params.longitude, elevation, hourly, hourly_units };

    match params.format.as_deref() {
        Some("csv") => render_csv(&response).into_response(),
        _ => Json(response).into_response(),
    }
}

fn time_steps(time_range: &TimerangeDt) -> Vec<String> {
    (0..time_range.count())
        .map(|i| {
            Utc.timestamp_opt(time_range.step(i), 0)
                .single()
                .map(|dt| dt.format("%Y-%m-%dT%H:%M").to_string())
                .unwrap_or_default()
        })
        .collect()
}

fn render_csv(response: &QueryResponse) -> (StatusCode, [(&'static str, &'static str); 1], String) {
    let mut columns: Vec<&String> = response.hourly.keys().filter(|k| k.as_str() != "time").collect();
    columns.sort();

    let mut out = String::from("time");
    for c in &columns {
        out.push(',');
        out.push_str(c);
    }
    out.push('\n');

    let times = response.hourly.get("time").and_then(|v| v.as_array()).cloned().unwrap_or_default();
    for (i, t) in times.iter().enumerate() {
        out.push_str(t.as_str().unwrap_or_default());
        for c in &columns {
            out.push(',');
            if let Some(v) = response.hourly.get(*c).and_then(|v| v.as_array()).and_then(|a| a.get(i)) {
                out.push_str(&v.to_string());
            }
        }
        out.push('\n');
    }
    (StatusCode::OK, [("content-type", "text/csv")], out)
}

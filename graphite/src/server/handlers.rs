//! HTTP route handlers.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Query, Request, State};
use axum::http::{Method, StatusCode};
use axum::{Form, Json};
use common::Clock;

use super::error::ApiError;
use super::metrics::{Metrics, OperationStatus};
use super::request::RenderParams;
use crate::config::Config;
use crate::error::Error;
use crate::model::{Metric, Series};
use crate::partition::check_window;
use crate::query::Evaluator;
use crate::timeparser::parse_at_time;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub evaluator: Evaluator,
    pub metrics: Arc<Metrics>,
    pub config: Arc<Config>,
    pub clock: Arc<dyn Clock>,
}

/// Handle GET /ping
pub async fn handle_ping(State(state): State<AppState>) -> Result<&'static str, ApiError> {
    state
        .evaluator
        .store()
        .ping()
        .await
        .map_err(|e| ApiError::unavailable(e.to_string()))?;
    Ok("PONG")
}

/// Handle GET /inspect
pub async fn handle_inspect(State(state): State<AppState>) -> Json<Config> {
    Json(state.config.as_ref().clone())
}

/// Handle GET|POST /render
pub async fn handle_render(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<Vec<Series>>, ApiError> {
    let pairs: Vec<(String, String)> = match request.method().clone() {
        Method::GET => {
            let Query(pairs) = Query::<Vec<(String, String)>>::from_request(request, &state)
                .await
                .map_err(|e| {
                    ApiError::bad_request(format!("failed to parse query parameters: {}", e))
                })?;
            pairs
        }
        Method::POST => {
            let Form(pairs) = Form::<Vec<(String, String)>>::from_request(request, &state)
                .await
                .map_err(|e| ApiError::bad_request(format!("failed to parse form body: {}", e)))?;
            pairs
        }
        _ => return Err(ApiError::bad_request("only GET and POST are supported")),
    };

    let params = RenderParams::from_pairs(pairs);
    if params.targets.is_empty() {
        return Err(ApiError::bad_request("no targets requested"));
    }

    let from = parse_at_time(params.from_param(), state.clock.as_ref())?;
    let until = parse_at_time(params.until_param(), state.clock.as_ref())?;
    if from > until {
        return Err(Error::Argument(format!("from ({}) is after until ({})", from, until)).into());
    }
    check_window(from, until).map_err(Error::from)?;

    let count = params.targets.len();
    match state
        .evaluator
        .evaluate_targets(&params.targets, from, until)
        .await
    {
        Ok(series) => {
            state.metrics.record_render(count, OperationStatus::Success);
            Ok(Json(series))
        }
        Err(e) => {
            state.metrics.record_render(count, OperationStatus::Error);
            Err(ApiError::from(e))
        }
    }
}

/// Handle POST /datapoints
pub async fn handle_write(
    State(state): State<AppState>,
    body: Result<Json<Metric>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(metric) = body.map_err(|e| ApiError::bad_request(e.body_text()))?;
    state.evaluator.store().insert_metric(&metric).await?;
    state
        .metrics
        .datapoints_written_total
        .inc_by(metric.datapoints.len() as u64);
    Ok(StatusCode::NO_CONTENT)
}

/// Handle GET /-/healthy
pub async fn handle_healthy() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// Handle GET /metrics
pub async fn handle_metrics(State(state): State<AppState>) -> Result<String, ApiError> {
    state
        .metrics
        .encode()
        .map_err(|e| Error::Internal(format!("failed to encode metrics: {}", e)).into())
}

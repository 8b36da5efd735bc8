use super::WebError;
use crate::AppState;
use axum::{
	http::header::CONTENT_TYPE,
	response::{IntoResponse, Response},
	routing::get,
	Json, Router,
};
use showtrack_services::{Counts, MetricsService};

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

async fn metrics(metrics: MetricsService) -> Result<Response, WebError> {
	let counts = metrics.counts().await?;
	Ok(([(CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], counts.render_prometheus()).into_response())
}

async fn kpi(metrics: MetricsService) -> Result<Json<Counts>, WebError> {
	Ok(Json(metrics.counts().await?))
}

pub fn router() -> Router<AppState> {
	Router::new()
		.route("/metrics", get(metrics))
		.route("/kpi", get(kpi))
}

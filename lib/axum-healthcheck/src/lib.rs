use axum::{http::StatusCode, response::IntoResponse, Json};
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt::Display;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthStatus {
	Healthy,
	Degraded(String),
	Unhealthy(String),
}

pub trait IntoHealthStatus {
	fn into_health_status(self) -> HealthStatus;
}

impl IntoHealthStatus for HealthStatus {
	fn into_health_status(self) -> HealthStatus {
		self
	}
}

impl<T> IntoHealthStatus for Result<T, HealthStatus> {
	fn into_health_status(self) -> HealthStatus {
		match self {
			Ok(_) => HealthStatus::Healthy,
			Err(status) => status,
		}
	}
}

#[derive(Default)]
pub struct HealthCheck {
	checks: IndexMap<&'static str, HealthStatus>,
}

impl HealthCheck {
	pub fn new() -> Self {
		Default::default()
	}

	pub fn add(&mut self, name: &'static str, status: impl IntoHealthStatus) -> &mut Self {
		self.checks.insert(name, status.into_health_status());
		self
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum HealthStatusSeverity {
	#[serde(rename = "healthy")]
	Healthy,
	#[serde(rename = "degraded")]
	Degraded,
	#[serde(rename = "unhealthy")]
	Unhealthy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HealthStatusErrorSeverity {
	Degraded,
	Unhealthy,
}

impl HealthStatus {
	pub fn severity(&self) -> HealthStatusSeverity {
		match self {
			HealthStatus::Healthy => HealthStatusSeverity::Healthy,
			HealthStatus::Degraded(_) => HealthStatusSeverity::Degraded,
			HealthStatus::Unhealthy(_) => HealthStatusSeverity::Unhealthy,
		}
	}

	fn message(&self) -> Option<&str> {
		match self {
			HealthStatus::Healthy => None,
			HealthStatus::Degraded(message) | HealthStatus::Unhealthy(message) => Some(message),
		}
	}
}

/// Turns a fallible check into a status. The error is appended to `message`.
pub trait ResultHealthStatusExt: Sized {
	fn into_health_check(self, severity: HealthStatusErrorSeverity, message: &str) -> HealthStatus;

	fn or_degraded(self, message: &str) -> HealthStatus {
		self.into_health_check(HealthStatusErrorSeverity::Degraded, message)
	}

	fn or_unhealthy(self, message: &str) -> HealthStatus {
		self.into_health_check(HealthStatusErrorSeverity::Unhealthy, message)
	}
}

impl<T, E> ResultHealthStatusExt for Result<T, E>
where
	E: Display,
{
	fn into_health_check(self, severity: HealthStatusErrorSeverity, message: &str) -> HealthStatus {
		match self {
			Ok(_) => HealthStatus::Healthy,
			Err(e) => {
				let message = format!("{message}: {e}");
				match severity {
					HealthStatusErrorSeverity::Degraded => HealthStatus::Degraded(message),
					HealthStatusErrorSeverity::Unhealthy => HealthStatus::Unhealthy(message),
				}
			}
		}
	}
}

#[derive(Serialize)]
struct HealthCheckResponseData {
	status: HealthStatusSeverity,
	#[serde(skip_serializing_if = "Option::is_none")]
	message: Option<String>,
}

#[derive(Serialize)]
struct HealthCheckResponse {
	status: HealthStatusSeverity,
	checks: IndexMap<&'static str, HealthCheckResponseData>,
}

impl<'a> From<&'a HealthCheck> for HealthCheckResponse {
	fn from(check: &'a HealthCheck) -> Self {
		let checks = check
			.checks
			.iter()
			.map(|(name, check)| {
				let data = HealthCheckResponseData {
					status: check.severity(),
					message: check.message().map(str::to_owned),
				};
				(*name, data)
			})
			.collect::<IndexMap<_, _>>();

		let status = checks
			.values()
			.map(|data| data.status)
			.max()
			.unwrap_or(HealthStatusSeverity::Healthy);

		Self { status, checks }
	}
}

impl IntoResponse for HealthCheckResponse {
	fn into_response(self) -> axum::response::Response {
		let status_code = match self.status {
			HealthStatusSeverity::Healthy => StatusCode::OK,
			HealthStatusSeverity::Degraded => StatusCode::OK,
			HealthStatusSeverity::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
		};

		(status_code, Json(self)).into_response()
	}
}

impl HealthCheck {
	pub fn into_response(&self) -> axum::response::Response {
		HealthCheckResponse::from(self).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn worst_check_wins() {
		let mut check = HealthCheck::new();
		check
			.add("db", Ok::<_, &str>(()).or_unhealthy("ping failed"))
			.add("cache", Err::<(), _>("timeout").or_degraded("lookup failed"));

		let response = HealthCheckResponse::from(&check);
		assert_eq!(response.status, HealthStatusSeverity::Degraded);
		assert_eq!(
			serde_json::to_value(&response).unwrap(),
			json!({
				"status": "degraded",
				"checks": {
					"db": { "status": "healthy" },
					"cache": { "status": "degraded", "message": "lookup failed: timeout" },
				},
			})
		);
	}

	#[test]
	fn unhealthy_is_service_unavailable() {
		let mut check = HealthCheck::new();
		check.add("db", Err::<(), _>("connection refused").or_unhealthy("ping failed"));

		assert_eq!(check.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);
	}

	#[test]
	fn empty_check_is_healthy() {
		assert_eq!(HealthCheck::new().into_response().status(), StatusCode::OK);
	}
}

//! Plex webhook. Each user gets a secret address carrying their Plex token.

use super::WebError;
use crate::AppState;
use axum::{
	body::{Body, Bytes},
	extract::{
		multipart::{MultipartError, MultipartRejection},
		rejection::BytesRejection,
		FromRequest, Multipart, Path,
	},
	http::{header::CONTENT_TYPE, Request, StatusCode},
	response::{IntoResponse, Response},
	routing::post,
	Router,
};
use serde::Deserialize;
use showtrack_services::{
	episode::ScrobbleOutcome, plex::PlexPayload, EpisodeService, UserService,
};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
enum PayloadError {
	#[error("unsupported content type {0:?}")]
	UnsupportedMediaType(String),

	#[error("invalid form body: {0}")]
	Form(#[from] serde_urlencoded::de::Error),

	#[error("invalid json payload: {0}")]
	Json(#[from] serde_json::Error),

	#[error("invalid multipart body: {0}")]
	Multipart(#[from] MultipartError),

	#[error("invalid multipart request: {0}")]
	MultipartRequest(#[from] MultipartRejection),

	#[error("failed to read body: {0}")]
	Body(#[from] BytesRejection),

	#[error("multipart body has no payload field")]
	MissingPayload,
}

impl IntoResponse for PayloadError {
	fn into_response(self) -> Response {
		warn!("rejected plex payload: {self}");
		let status = match self {
			Self::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
			_ => StatusCode::BAD_REQUEST,
		};

		(status, "Invalid payload").into_response()
	}
}

#[derive(Deserialize)]
struct PayloadForm {
	payload: String,
}

fn mime(content_type: &str) -> String {
	content_type
		.split(';')
		.next()
		.unwrap_or_default()
		.trim()
		.to_ascii_lowercase()
}

fn parse_payload(content_type: &str, body: &[u8]) -> Result<PlexPayload, PayloadError> {
	let mime = mime(content_type);
	match mime.as_str() {
		"application/json" => Ok(serde_json::from_slice(body)?),
		"application/x-www-form-urlencoded" => {
			let form: PayloadForm = serde_urlencoded::from_bytes(body)?;
			Ok(serde_json::from_str(&form.payload)?)
		}
		_ => Err(PayloadError::UnsupportedMediaType(mime)),
	}
}

/// Plex posts `multipart/form-data` with the event json in the `payload`
/// part, next to an optional `thumb` image.
async fn read_multipart(mut multipart: Multipart) -> Result<PlexPayload, PayloadError> {
	while let Some(field) = multipart.next_field().await? {
		if field.name() == Some("payload") {
			let payload = field.text().await?;
			return Ok(serde_json::from_str(&payload)?);
		}
	}

	Err(PayloadError::MissingPayload)
}

async fn read_payload(request: Request<Body>) -> Result<PlexPayload, PayloadError> {
	let content_type = request
		.headers()
		.get(CONTENT_TYPE)
		.and_then(|v| v.to_str().ok())
		.unwrap_or_default()
		.to_owned();

	if mime(&content_type) == "multipart/form-data" {
		let multipart = Multipart::from_request(request, &()).await?;
		return read_multipart(multipart).await;
	}

	let body = Bytes::from_request(request, &()).await?;
	parse_payload(&content_type, &body)
}

async fn webhook(
	Path(token): Path<String>,
	users: UserService,
	episodes: EpisodeService,
	request: Request<Body>,
) -> Result<Response, WebError> {
	let Some(user) = users.find_by_plex_token(&token).await? else {
		return Err(WebError::NotFound);
	};

	let payload = match read_payload(request).await {
		Ok(payload) => payload,
		Err(e) => return Ok(e.into_response()),
	};

	let Some(scrobble) = payload.scrobble() else {
		debug!(event = %payload.event, "ignoring plex event");
		return Ok(StatusCode::NO_CONTENT.into_response());
	};

	match episodes
		.scrobble(user.id, &scrobble.show, scrobble.season, scrobble.number)
		.await?
	{
		ScrobbleOutcome::Marked { show, episode } => {
			info!(user.id = %user.id, show.id = %show, episode.id = %episode, "plex scrobble recorded");
			Ok(StatusCode::OK.into_response())
		}
		outcome => {
			debug!(user.id = %user.id, show = %scrobble.show, ?outcome, "plex scrobble did not match");
			Ok(StatusCode::NO_CONTENT.into_response())
		}
	}
}

pub fn router() -> Router<AppState> {
	Router::new().route("/plex/:token", post(webhook))
}

#[cfg(test)]
mod tests {
	use super::*;

	const SCROBBLE: &str = r#"{
		"event": "media.scrobble",
		"Metadata": {
			"type": "episode",
			"grandparentTitle": "The Expanse",
			"parentIndex": 2,
			"index": 5
		}
	}"#;

	#[test]
	fn parses_raw_json() {
		let payload = parse_payload("application/json; charset=utf-8", SCROBBLE.as_bytes()).unwrap();
		let scrobble = payload.scrobble().unwrap();
		assert_eq!(scrobble.show, "The Expanse");
		assert_eq!((scrobble.season, scrobble.number), (2, 5));
	}

	#[test]
	fn parses_urlencoded_payload_field() {
		let body = serde_urlencoded::to_string([("payload", SCROBBLE)]).unwrap();
		let payload = parse_payload("application/x-www-form-urlencoded", body.as_bytes()).unwrap();
		assert_eq!(payload.event, "media.scrobble");
	}

	fn multipart_request(parts: &[(&str, &str, &str)]) -> Request<Body> {
		let mut body = String::new();
		for (name, content_type, value) in parts {
			body.push_str(&format!(
				"--plex-boundary\r\nContent-Disposition: form-data; name=\"{name}\"\r\nContent-Type: {content_type}\r\n\r\n{value}\r\n"
			));
		}
		body.push_str("--plex-boundary--\r\n");

		Request::post("/plex/token")
			.header(CONTENT_TYPE, "multipart/form-data; boundary=plex-boundary")
			.body(Body::from(body))
			.unwrap()
	}

	#[tokio::test]
	async fn parses_multipart_payload_part() {
		let request = multipart_request(&[
			("payload", "application/json", SCROBBLE),
			("thumb", "image/jpeg", "not really a jpeg"),
		]);

		let payload = read_payload(request).await.unwrap();
		let scrobble = payload.scrobble().unwrap();
		assert_eq!(scrobble.show, "The Expanse");
		assert_eq!((scrobble.season, scrobble.number), (2, 5));
	}

	#[tokio::test]
	async fn payload_part_may_follow_thumb() {
		let request = multipart_request(&[
			("thumb", "image/jpeg", "not really a jpeg"),
			("payload", "application/json", SCROBBLE),
		]);

		let payload = read_payload(request).await.unwrap();
		assert_eq!(payload.event, "media.scrobble");
	}

	#[tokio::test]
	async fn multipart_without_payload_is_rejected() {
		let request = multipart_request(&[("thumb", "image/jpeg", "not really a jpeg")]);

		let err = read_payload(request).await.unwrap_err();
		assert!(matches!(err, PayloadError::MissingPayload));
		assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
	}

	#[tokio::test]
	async fn json_request_body_is_read() {
		let request = Request::post("/plex/token")
			.header(CONTENT_TYPE, "application/json")
			.body(Body::from(SCROBBLE))
			.unwrap();

		let payload = read_payload(request).await.unwrap();
		assert_eq!(payload.event, "media.scrobble");
	}

	#[test]
	fn rejects_other_content_types() {
		let err = parse_payload("text/plain", SCROBBLE.as_bytes()).unwrap_err();
		assert!(matches!(err, PayloadError::UnsupportedMediaType(t) if t == "text/plain"));
	}

	#[test]
	fn rejects_garbage() {
		assert!(matches!(
			parse_payload("application/json", b"{not json"),
			Err(PayloadError::Json(_))
		));
		assert!(matches!(
			parse_payload("application/x-www-form-urlencoded", b"other=1"),
			Err(PayloadError::Form(_))
		));
	}
}

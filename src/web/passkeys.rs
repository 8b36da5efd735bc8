//! JSON endpoints driving the WebAuthn ceremonies in `public/passkeys.js`.

use crate::{extractors::safe_return_to, AppState};
use axum::{
	async_trait,
	extract::FromRequestParts,
	http::{request, StatusCode},
	response::{IntoResponse, Response},
	routing::post,
	Json, Router,
};
use sea_orm::DbErr;
use serde::{Deserialize, Serialize};
use serde_json::json;
use showtrack_services::{AuthError, AuthService};
use showtrack_session::{Csrf, CsrfError, Session};
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;
use webauthn_rs::prelude::{
	CreationChallengeResponse, PublicKeyCredential, RegisterPublicKeyCredential,
	RequestChallengeResponse,
};

const CSRF_HEADER: &str = "x-csrf-token";

#[derive(Debug, Error)]
enum ApiError {
	#[error("not logged in")]
	Unauthorized,

	#[error("session layer missing from request")]
	MissingSession,

	#[error("csrf check failed: {0}")]
	Csrf(#[from] CsrfError),

	#[error(transparent)]
	Auth(#[from] AuthError),

	#[error(transparent)]
	Db(#[from] DbErr),
}

impl ApiError {
	fn status(&self) -> StatusCode {
		match self {
			Self::Unauthorized => StatusCode::UNAUTHORIZED,
			Self::Csrf(_) => StatusCode::FORBIDDEN,
			Self::Auth(
				AuthError::InvalidCredentials
				| AuthError::UnknownCredential
				| AuthError::PossibleClone,
			) => StatusCode::UNAUTHORIZED,
			Self::Auth(
				AuthError::NoPasskeys
				| AuthError::ChallengeExpired
				| AuthError::MalformedCredential
				| AuthError::Webauthn(_),
			) => StatusCode::BAD_REQUEST,
			Self::MissingSession
			| Self::Auth(
				AuthError::State(_)
				| AuthError::Session(_)
				| AuthError::Password(_)
				| AuthError::DbErr(_),
			)
			| Self::Db(_) => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	fn message(&self) -> String {
		match self.status() {
			StatusCode::INTERNAL_SERVER_ERROR => "Something went wrong".to_owned(),
			StatusCode::FORBIDDEN => "This page has expired, reload and try again".to_owned(),
			_ => self.to_string(),
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status = self.status();
		if status.is_server_error() {
			error!("{self}");
		} else {
			warn!("{self}");
		}

		(status, Json(json!({ "error": self.message() }))).into_response()
	}
}

/// CSRF check for JSON requests, reading the token from a header.
struct HeaderCsrf;

#[async_trait]
impl<S> FromRequestParts<S> for HeaderCsrf
where
	S: Send + Sync,
{
	type Rejection = ApiError;

	async fn from_request_parts(parts: &mut request::Parts, _state: &S) -> Result<Self, Self::Rejection> {
		let csrf = parts
			.extensions
			.get::<Csrf>()
			.ok_or(ApiError::MissingSession)?;

		let token = parts
			.headers
			.get(CSRF_HEADER)
			.and_then(|v| v.to_str().ok())
			.unwrap_or_default();

		csrf.verify(token)?;
		Ok(Self)
	}
}

async fn registration_options(
	_: HeaderCsrf,
	session: Session,
	auth: AuthService,
) -> Result<Json<CreationChallengeResponse>, ApiError> {
	let user = session.user().ok_or(ApiError::Unauthorized)?;
	Ok(Json(auth.start_passkey_registration(&user).await?))
}

#[derive(Deserialize)]
struct RegistrationVerify {
	name: String,
	credential: RegisterPublicKeyCredential,
}

#[derive(Serialize)]
struct RegisteredPasskey {
	id: Uuid,
	name: String,
}

async fn registration_verify(
	_: HeaderCsrf,
	session: Session,
	auth: AuthService,
	Json(body): Json<RegistrationVerify>,
) -> Result<Json<RegisteredPasskey>, ApiError> {
	let user = session.user().ok_or(ApiError::Unauthorized)?;
	let name = match body.name.trim() {
		"" => "Passkey",
		name => name,
	};

	let passkey = auth
		.finish_passkey_registration(&user, name, &body.credential)
		.await?;

	Ok(Json(RegisteredPasskey {
		id: passkey.id,
		name: passkey.name,
	}))
}

#[derive(Deserialize)]
struct LoginOptions {
	email: String,
}

async fn login_options(
	_: HeaderCsrf,
	auth: AuthService,
	Json(body): Json<LoginOptions>,
) -> Result<Json<RequestChallengeResponse>, ApiError> {
	Ok(Json(auth.start_passkey_login(&body.email).await?))
}

#[derive(Deserialize)]
struct LoginVerify {
	credential: PublicKeyCredential,
	#[serde(default)]
	return_to: Option<String>,
}

#[derive(Serialize)]
struct LoggedIn {
	redirect: String,
}

async fn login_verify(
	_: HeaderCsrf,
	auth: AuthService,
	Json(body): Json<LoginVerify>,
) -> Result<Json<LoggedIn>, ApiError> {
	auth.finish_passkey_login(&body.credential).await?;

	Ok(Json(LoggedIn {
		redirect: safe_return_to(body.return_to.as_deref()).to_owned(),
	}))
}

pub fn router() -> Router<AppState> {
	Router::new()
		.route("/registration/options", post(registration_options))
		.route("/registration/verify", post(registration_verify))
		.route("/login/options", post(login_options))
		.route("/login/verify", post(login_verify))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn auth_failures_are_client_errors() {
		assert_eq!(
			ApiError::Auth(AuthError::PossibleClone).status(),
			StatusCode::UNAUTHORIZED
		);
		assert_eq!(
			ApiError::Auth(AuthError::ChallengeExpired).status(),
			StatusCode::BAD_REQUEST
		);
		assert_eq!(ApiError::Csrf(CsrfError::Missing).status(), StatusCode::FORBIDDEN);
		assert_eq!(
			ApiError::Db(DbErr::Custom("down".into())).status(),
			StatusCode::INTERNAL_SERVER_ERROR
		);
	}

	#[test]
	fn server_errors_hide_details() {
		assert_eq!(
			ApiError::Db(DbErr::Custom("password=secret".into())).message(),
			"Something went wrong"
		);
		assert_eq!(ApiError::Unauthorized.message(), "not logged in");
	}
}

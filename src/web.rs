mod account;
mod auth;
mod metrics;
mod passkeys;
mod plex;
mod shows;
mod stats;
mod views;

use crate::AppState;
use axum::{
	http::StatusCode,
	response::{IntoResponse, Redirect, Response},
	routing::get,
	Router,
};
use sea_orm::DbErr;
use showtrack_services::{
	AuthError, EpisodeServiceError, InviteServiceError, PasswordResetError, ShowServiceError,
	UserServiceError,
};
use showtrack_session::{CsrfError, Session};
use std::convert::Infallible;
use thiserror::Error;
use tracing::{error, warn};
use tvmaze_client::TvMazeError;

#[derive(Error, Debug)]
pub enum WebError {
	#[error("page not found")]
	NotFound,

	#[error("bad request: {0}")]
	BadRequest(String),

	#[error("session layer missing from request")]
	MissingSession,

	#[error("csrf check failed: {0}")]
	Csrf(#[from] CsrfError),

	#[error("database error: {0}")]
	Db(#[from] DbErr),

	#[error("catalog error: {0}")]
	Catalog(#[from] TvMazeError),

	#[error(transparent)]
	Show(#[from] ShowServiceError),

	#[error(transparent)]
	Episode(#[from] EpisodeServiceError),

	#[error(transparent)]
	User(#[from] UserServiceError),

	#[error(transparent)]
	Auth(#[from] AuthError),

	#[error(transparent)]
	PasswordReset(#[from] PasswordResetError),

	#[error(transparent)]
	Invite(#[from] InviteServiceError),
}

impl From<Infallible> for WebError {
	fn from(value: Infallible) -> Self {
		match value {}
	}
}

impl WebError {
	fn status(&self) -> StatusCode {
		match self {
			Self::NotFound
			| Self::Show(
				ShowServiceError::NotFound(_)
				| ShowServiceError::NotSubscribed(_)
				| ShowServiceError::NotInCatalog(_),
			)
			| Self::Episode(
				EpisodeServiceError::NotSubscribed(_) | EpisodeServiceError::EpisodeNotInShow { .. },
			) => StatusCode::NOT_FOUND,

			Self::BadRequest(_) => StatusCode::BAD_REQUEST,
			Self::Csrf(_) => StatusCode::FORBIDDEN,
			Self::Catalog(_) | Self::Show(ShowServiceError::Catalog(_)) => StatusCode::BAD_GATEWAY,
			_ => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}
}

impl IntoResponse for WebError {
	fn into_response(self) -> Response {
		let status = self.status();
		let message = match status {
			StatusCode::NOT_FOUND => "Not found",
			StatusCode::BAD_REQUEST => "Bad request",
			StatusCode::FORBIDDEN => "This form has expired, go back, reload the page and try again",
			StatusCode::BAD_GATEWAY => "The show catalog is unavailable right now, try again later",
			_ => "Something went wrong",
		};

		if status.is_server_error() {
			error!("{self}");
		} else {
			warn!("{self}");
		}

		(status, message).into_response()
	}
}

async fn index(session: Session) -> Redirect {
	match session.user() {
		Some(_) => Redirect::to("/tv"),
		None => Redirect::to("/login"),
	}
}

/// Pages and form handlers. These need the session layer.
pub fn router() -> Router<AppState> {
	Router::new()
		.route("/", get(index))
		.merge(auth::router())
		.merge(shows::router())
		.merge(stats::router())
		.merge(account::router())
		.nest("/passkeys", passkeys::router())
}

/// Machine-facing endpoints, served without sessions.
pub fn public_router() -> Router<AppState> {
	Router::new()
		.merge(plex::router())
		.merge(metrics::router())
}

#[cfg(test)]
mod tests {
	use super::*;
	use uuid::Uuid;

	#[test]
	fn status_mapping() {
		assert_eq!(WebError::NotFound.status(), StatusCode::NOT_FOUND);
		assert_eq!(
			WebError::Episode(EpisodeServiceError::NotSubscribed(Uuid::nil())).status(),
			StatusCode::NOT_FOUND
		);
		assert_eq!(
			WebError::Csrf(CsrfError::Mismatch).status(),
			StatusCode::FORBIDDEN
		);
		assert_eq!(
			WebError::Db(DbErr::Custom("boom".into())).status(),
			StatusCode::INTERNAL_SERVER_ERROR
		);
		assert_eq!(
			WebError::User(UserServiceError::PasskeyRequired).status(),
			StatusCode::INTERNAL_SERVER_ERROR
		);
	}
}

use crate::web::WebError;
use axum::{
	async_trait,
	extract::{rejection::FormRejection, Form, FromRequest, FromRequestParts, OriginalUri},
	http::{request, Request},
	response::{IntoResponse, Redirect, Response},
};
use serde::de::DeserializeOwned;
use showtrack_entities::user;
use showtrack_session::{Csrf, CsrfToken, Session};
use std::sync::Arc;

/// Per-request data every page template needs.
pub struct PageContext {
	pub user: Option<Arc<user::Model>>,
	pub csrf: CsrfToken,
}

#[async_trait]
impl<S> FromRequestParts<S> for PageContext
where
	S: Send + Sync,
{
	type Rejection = WebError;

	async fn from_request_parts(parts: &mut request::Parts, state: &S) -> Result<Self, Self::Rejection> {
		let session = Session::from_request_parts(parts, state).await?;
		let csrf = Csrf::from_request_parts(parts, state).await?;

		Ok(Self {
			user: session.user(),
			csrf: csrf.token()?,
		})
	}
}

/// The logged in user. Anonymous requests are redirected to the login page.
pub struct CurrentUser(pub Arc<user::Model>);

pub(crate) fn login_redirect(return_to: &str) -> Redirect {
	let encoded = url::form_urlencoded::byte_serialize(return_to.as_bytes()).collect::<String>();
	Redirect::to(&format!("/login?return_to={encoded}"))
}

/// Only same-site paths are accepted as redirect targets.
pub(crate) fn safe_return_to(return_to: Option<&str>) -> &str {
	match return_to {
		Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.starts_with("/\\") => path,
		_ => "/tv",
	}
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
	S: Send + Sync,
{
	type Rejection = Response;

	async fn from_request_parts(parts: &mut request::Parts, state: &S) -> Result<Self, Self::Rejection> {
		let session = Session::from_request_parts(parts, state)
			.await
			.map_err(IntoResponse::into_response)?;

		match session.user() {
			Some(user) => Ok(Self(user)),
			None => {
				let uri = OriginalUri::from_request_parts(parts, state)
					.await
					.map_err(IntoResponse::into_response)?;
				let return_to = uri
					.0
					.path_and_query()
					.map(|p| p.as_str())
					.unwrap_or("/");

				Err(login_redirect(return_to).into_response())
			}
		}
	}
}

/// Form bodies that carry a `csrf` field.
pub trait CsrfProtected {
	fn csrf(&self) -> &str;
}

/// A urlencoded form whose CSRF token has been checked against the session.
pub struct VerifiedForm<T>(pub T);

#[async_trait]
impl<S, B, T> FromRequest<S, B> for VerifiedForm<T>
where
	T: DeserializeOwned + CsrfProtected,
	B: axum::body::HttpBody + Send + 'static,
	B::Data: Send,
	B::Error: Into<axum::BoxError>,
	S: Send + Sync,
{
	type Rejection = WebError;

	async fn from_request(req: Request<B>, state: &S) -> Result<Self, Self::Rejection> {
		let csrf = req
			.extensions()
			.get::<Csrf>()
			.cloned()
			.ok_or(WebError::MissingSession)?;

		let Form(form) = Form::<T>::from_request(req, state)
			.await
			.map_err(|e: FormRejection| WebError::BadRequest(e.body_text()))?;

		csrf.verify(form.csrf())?;
		Ok(Self(form))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn return_to_must_be_local() {
		assert_eq!(safe_return_to(Some("/tv/123")), "/tv/123");
		assert_eq!(safe_return_to(Some("https://evil.example")), "/tv");
		assert_eq!(safe_return_to(Some("//evil.example")), "/tv");
		assert_eq!(safe_return_to(None), "/tv");
	}
}

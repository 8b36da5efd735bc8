mod csrf;
mod layer;
mod store;

use arc_swap::ArcSwap;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use cookie::{Cookie, CookieBuilder, SameSite};
use http::request;
use sea_orm::{ActiveValue, DatabaseConnection, DbErr, EntityTrait, TransactionTrait};
use serde::{de::DeserializeOwned, Serialize};
use showtrack_entities::{session, user};
use showtrack_utils::utc_now;
use std::{borrow::Cow, convert::Infallible, sync::Arc};
use thiserror::Error;
use time::{Duration, PrimitiveDateTime};
use tracing::{debug, instrument};
use uuid::Uuid;

pub use csrf::{Csrf, CsrfError, CsrfToken};
pub use layer::{SessionLayer, SessionService};
pub(crate) use store::CookieStore;

/// Session lifetimes, extended on access.
pub const EXPIRY_USER: Duration = Duration::days(30);
pub const EXPIRY_ANONYMOUS: Duration = Duration::hours(12);

pub(crate) const COOKIE_NAME: &str = "session";

#[derive(Clone, Debug)]
pub struct CookieConfig {
	pub secure: bool,
	pub domain: Option<String>,
	pub path: String,
}

impl Default for CookieConfig {
	fn default() -> Self {
		Self {
			secure: true,
			domain: None,
			path: "/".into(),
		}
	}
}

#[derive(Error, Debug)]
pub enum SessionError {
	#[error("malformed session state: {0}")]
	State(#[from] serde_json::Error),

	#[error(transparent)]
	DbError(#[from] DbErr),
}

/// What the browser has to be told about the session cookie once the
/// response is written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CookieUpdate {
	Keep,
	Issue,
	Remove,
}

#[derive(Clone, Debug)]
pub(crate) struct SessionState {
	pub(crate) id: Uuid,
	pub(crate) user: Option<Arc<user::Model>>,
	pub(crate) expires: PrimitiveDateTime,
	pub(crate) cookie: CookieUpdate,
}

struct SessionInner {
	db: Arc<DatabaseConnection>,
	store: CookieStore,
	cookie: Arc<CookieConfig>,
	state: ArcSwap<SessionState>,
}

/// The browser session of the current request. Login and logout go through
/// here so the cookie always matches the stored row.
#[derive(Clone)]
pub struct Session {
	inner: Arc<SessionInner>,
}

#[async_trait]
impl<S> FromRequestParts<S> for Session {
	type Rejection = Infallible;

	async fn from_request_parts(
		parts: &mut request::Parts,
		_state: &S,
	) -> Result<Self, Self::Rejection> {
		let session: &Self = parts
			.extensions
			.get()
			.expect("missing session, did you forget session layer");

		Ok(session.clone())
	}
}

impl Session {
	pub(crate) fn new(
		db: Arc<DatabaseConnection>,
		store: CookieStore,
		cookie: Arc<CookieConfig>,
		state: SessionState,
	) -> Self {
		Self {
			inner: Arc::new(SessionInner {
				db,
				store,
				cookie,
				state: ArcSwap::from_pointee(state),
			}),
		}
	}

	pub fn id(&self) -> Uuid {
		self.inner.state.load().id
	}

	pub fn user(&self) -> Option<Arc<user::Model>> {
		self.inner.state.load().user.clone()
	}

	pub fn expires(&self) -> PrimitiveDateTime {
		self.inner.state.load().expires
	}

	pub(crate) fn store(&self) -> &CookieStore {
		&self.inner.store
	}

	fn replace(&self, f: impl FnOnce(&mut SessionState)) {
		let mut state = SessionState::clone(&self.inner.state.load());
		f(&mut state);
		self.inner.state.store(Arc::new(state));
	}

	/// Binds the session to `user` under a fresh id. The row behind the
	/// anonymous id is dropped.
	#[instrument(skip_all, fields(user.id = %user.id))]
	pub async fn login(&self, user: user::Model) -> Result<(), DbErr> {
		let now = utc_now();
		let previous = self.id();
		let id = Uuid::new_v4();
		let expires = now + EXPIRY_USER;

		let tx = self.inner.db.begin().await?;
		session::Entity::delete_by_id(previous).exec(&tx).await?;
		session::Entity::insert(session::ActiveModel {
			id: ActiveValue::Set(id),
			ctime: ActiveValue::Set(now),
			atime: ActiveValue::Set(now),
			etime: ActiveValue::Set(expires),
			user_id: ActiveValue::Set(Some(user.id)),
		})
		.exec_without_returning(&tx)
		.await?;
		tx.commit().await?;

		debug!(session.id = %id, session.previous = %previous, "rotated session on login");
		self.replace(|state| {
			state.id = id;
			state.user = Some(Arc::new(user));
			state.expires = expires;
			state.cookie = CookieUpdate::Issue;
		});

		Ok(())
	}

	#[instrument(skip_all, fields(session.id = %self.id()))]
	pub async fn logout(&self) -> Result<(), DbErr> {
		session::Entity::delete_by_id(self.id())
			.exec(&*self.inner.db)
			.await?;

		self.replace(|state| {
			state.user = None;
			state.cookie = CookieUpdate::Remove;
		});

		Ok(())
	}

	/// Keeps short-lived state, such as a passkey challenge, in an encrypted
	/// cookie next to the session.
	pub fn put_state<T: Serialize>(
		&self,
		name: &'static str,
		value: &T,
		lifetime: Duration,
	) -> Result<(), SessionError> {
		let value = serde_json::to_string(value)?;
		let cookie = self
			.cookie(name, value)
			.same_site(SameSite::Strict)
			.max_age(lifetime)
			.finish();

		self.inner.store.add(cookie);
		Ok(())
	}

	/// Reads state stored with [`Session::put_state`] and removes it, so a
	/// value can be consumed once.
	pub fn take_state<T: DeserializeOwned>(&self, name: &'static str) -> Result<Option<T>, SessionError> {
		let Some(cookie) = self.inner.store.get(name) else {
			return Ok(None);
		};

		self.inner.store.remove(self.cookie(name, String::new()).finish());
		Ok(Some(serde_json::from_str(cookie.value())?))
	}

	pub(crate) fn cookie(&self, name: &'static str, value: String) -> CookieBuilder<'static> {
		let config = &self.inner.cookie;
		let mut builder = Cookie::build(name, value)
			.http_only(true)
			.secure(config.secure)
			.path(config.path.clone());

		if let Some(domain) = config.domain.as_ref() {
			builder = builder.domain(Cow::Owned(domain.clone()));
		}

		builder
	}

	/// Writes the pending session cookie change into the jar.
	pub(crate) fn flush_cookie(&self) {
		let state = self.inner.state.load();
		match state.cookie {
			CookieUpdate::Keep => {}
			CookieUpdate::Issue => self.inner.store.add(
				self
					.cookie(COOKIE_NAME, state.id.to_string())
					.same_site(SameSite::Lax)
					.expires(state.expires.assume_utc())
					.finish(),
			),
			CookieUpdate::Remove => self
				.inner
				.store
				.remove(self.cookie(COOKIE_NAME, String::new()).finish()),
		}
	}

	#[cfg(test)]
	pub(crate) fn detached(id: Uuid) -> Self {
		Self::new(
			Arc::new(DatabaseConnection::Disconnected),
			CookieStore::new(&http::HeaderMap::new(), cookie::Key::generate()),
			Arc::new(CookieConfig::default()),
			SessionState {
				id,
				user: None,
				expires: utc_now() + EXPIRY_ANONYMOUS,
				cookie: CookieUpdate::Keep,
			},
		)
	}

	/// Another session sharing this one's cookies.
	#[cfg(test)]
	pub(crate) fn with_id(&self, id: Uuid) -> Self {
		let mut state = SessionState::clone(&self.inner.state.load());
		state.id = id;
		Self::new(
			self.inner.db.clone(),
			self.inner.store.clone(),
			self.inner.cookie.clone(),
			state,
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde::Deserialize;

	#[derive(Debug, PartialEq, Serialize, Deserialize)]
	struct Challenge {
		user_id: Uuid,
		nonce: u32,
	}

	#[test]
	fn state_is_taken_once() {
		let session = Session::detached(Uuid::new_v4());
		let challenge = Challenge {
			user_id: Uuid::new_v4(),
			nonce: 7,
		};

		session
			.put_state(".challenge", &challenge, Duration::minutes(15))
			.expect("state stored");

		let taken: Option<Challenge> = session.take_state(".challenge").expect("state read");
		assert_eq!(taken, Some(challenge));

		let again: Option<Challenge> = session.take_state(".challenge").expect("state read");
		assert_eq!(again, None);
	}

	#[test]
	fn malformed_state_is_an_error() {
		let session = Session::detached(Uuid::new_v4());
		session
			.put_state(".challenge", &"not a challenge", Duration::minutes(15))
			.expect("state stored");

		let err = session.take_state::<Challenge>(".challenge").unwrap_err();
		assert!(matches!(err, SessionError::State(_)));
	}

	#[test]
	fn state_cookie_is_scoped_and_short_lived() {
		let session = Session::detached(Uuid::new_v4());
		session
			.put_state(".challenge", &1u32, Duration::minutes(15))
			.expect("state stored");

		let cookie = session.store().get(".challenge").expect("cookie stored");
		assert_eq!(cookie.value(), "1");

		let jar = session.store().clone().into_jar();
		let raw = jar.get(".challenge").expect("raw cookie");
		assert_eq!(raw.max_age(), Some(Duration::minutes(15)));
		assert_eq!(raw.same_site(), Some(SameSite::Strict));
		assert_eq!(raw.http_only(), Some(true));
	}
}

use crate::{
	CookieConfig, CookieStore, CookieUpdate, Csrf, Session, SessionError, SessionState, COOKIE_NAME,
	EXPIRY_ANONYMOUS, EXPIRY_USER,
};
use axum::response::{IntoResponse, Response};
use cookie::Key;
use futures::{future::BoxFuture, FutureExt};
use http::{header, HeaderValue, Request, StatusCode};
use sea_orm::{
	sea_query::Expr, ActiveValue, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
};
use showtrack_entities::{session, user};
use showtrack_utils::utc_now;
use std::{convert::Infallible, str::FromStr, sync::Arc};
use time::{Duration, PrimitiveDateTime};
use tower_layer::Layer;
use tower_service::Service;
use tracing::{debug, error, info_span, instrument, Instrument};
use uuid::Uuid;

/// Minimum time between two expiry extensions of the same session.
const REFRESH_INTERVAL: Duration = Duration::hours(1);

/// New expiry for a session last extended at `atime`, or `None` while the
/// previous extension is recent enough.
fn extended_expiry(
	atime: PrimitiveDateTime,
	logged_in: bool,
	now: PrimitiveDateTime,
) -> Option<PrimitiveDateTime> {
	if atime + REFRESH_INTERVAL >= now {
		return None;
	}

	let lifetime = if logged_in { EXPIRY_USER } else { EXPIRY_ANONYMOUS };
	Some(now + lifetime)
}

#[derive(Clone)]
pub struct SessionLayer {
	key: Key,
	cookie: Arc<CookieConfig>,
	db: Arc<DatabaseConnection>,
}

impl SessionLayer {
	/// `master_key` must be at least 32 bytes long.
	pub fn new(master_key: &str, cookie: CookieConfig, db: Arc<DatabaseConnection>) -> Self {
		Self {
			key: Key::derive_from(master_key.as_bytes()),
			cookie: Arc::new(cookie),
			db,
		}
	}
}

impl<S> Layer<S> for SessionLayer {
	type Service = SessionService<S>;

	fn layer(&self, inner: S) -> Self::Service {
		SessionService {
			key: self.key.clone(),
			cookie: self.cookie.clone(),
			db: self.db.clone(),
			inner,
		}
	}
}

#[derive(Clone)]
pub struct SessionService<S> {
	key: Key,
	cookie: Arc<CookieConfig>,
	db: Arc<DatabaseConnection>,
	inner: S,
}

impl<S> SessionService<S> {
	async fn run<B>(mut self, mut req: Request<B>) -> Result<Response, Infallible>
	where
		S: Service<Request<B>, Response = Response> + Send + Clone + 'static,
		<S as Service<Request<B>>>::Error: Into<Infallible> + 'static,
		<S as Service<Request<B>>>::Future: Send,
		B: Send + 'static,
	{
		let store = CookieStore::new(req.headers(), self.key.clone());

		let session = match self.load(&store).await {
			Ok(v) => v,
			Err(e) => {
				error!("failed to load session: {e:#?}");
				return Ok((StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response());
			}
		};

		let span = info_span!("session", session.id = %session.id());
		let csrf = Csrf::new(session.clone(), self.key.signing());

		req.extensions_mut().insert(session.clone());
		req.extensions_mut().insert(csrf);
		let mut res = span
			.in_scope(|| self.inner.call(req))
			.instrument(span)
			.await
			.map_err(Into::into)?;

		session.flush_cookie();
		let jar = session.store().clone().into_jar();
		res.headers_mut().extend(
			jar
				.delta()
				.flat_map(|c| HeaderValue::from_str(&c.encoded().to_string()))
				.map(|value| (header::SET_COOKIE, value)),
		);

		Ok(res)
	}

	#[instrument(skip_all, err)]
	async fn load(&mut self, store: &CookieStore) -> Result<Session, SessionError> {
		let now = utc_now();
		let existing = match store.get(COOKIE_NAME) {
			None => {
				debug!("no session cookie");
				None
			}
			Some(cookie) => match Uuid::from_str(cookie.value()) {
				Err(_) => {
					debug!(value = cookie.value(), "session cookie is not a valid uuid");
					None
				}
				Ok(id) => self.find_live(id, now).await?,
			},
		};

		let state = match existing {
			Some(model) => self.touch(model, now).await?,
			None => self.create(now).await?,
		};

		Ok(Session::new(
			self.db.clone(),
			store.clone(),
			self.cookie.clone(),
			state,
		))
	}

	async fn find_live(
		&mut self,
		id: Uuid,
		now: PrimitiveDateTime,
	) -> Result<Option<session::Model>, DbErr> {
		match session::Entity::find_by_id(id).one(&*self.db).await? {
			None => {
				debug!(session.id = %id, "session not found in db");
				Ok(None)
			}
			Some(model) if model.etime < now => {
				debug!(session.id = %id, "session has expired");
				session::Entity::delete_by_id(model.id)
					.exec(&*self.db)
					.await?;
				Ok(None)
			}
			Some(model) => Ok(Some(model)),
		}
	}

	async fn create(&mut self, now: PrimitiveDateTime) -> Result<SessionState, DbErr> {
		let id = Uuid::new_v4();
		let expires = now + EXPIRY_ANONYMOUS;

		session::Entity::insert(session::ActiveModel {
			id: ActiveValue::Set(id),
			ctime: ActiveValue::Set(now),
			atime: ActiveValue::Set(now),
			etime: ActiveValue::Set(expires),
			user_id: ActiveValue::Set(None),
		})
		.exec_without_returning(&*self.db)
		.await?;

		debug!(session.id = %id, "created new session");
		Ok(SessionState {
			id,
			user: None,
			expires,
			cookie: CookieUpdate::Issue,
		})
	}

	/// Loads the session user and slides the expiry forward. The cookie is only
	/// re-issued when the row was extended.
	async fn touch(
		&mut self,
		model: session::Model,
		now: PrimitiveDateTime,
	) -> Result<SessionState, DbErr> {
		let user = match model.user_id {
			None => None,
			Some(id) => user::Entity::find_by_id(id).one(&*self.db).await?,
		};

		let (expires, cookie) = match extended_expiry(model.atime, user.is_some(), now) {
			None => (model.etime, CookieUpdate::Keep),
			Some(expires) => {
				session::Entity::update_many()
					.col_expr(session::Column::Atime, Expr::value(now))
					.col_expr(session::Column::Etime, Expr::value(expires))
					.filter(session::Column::Id.eq(model.id))
					.exec(&*self.db)
					.await?;

				debug!(session.id = %model.id, "extended session expiry");
				(expires, CookieUpdate::Issue)
			}
		};

		Ok(SessionState {
			id: model.id,
			user: user.map(Arc::new),
			expires,
			cookie,
		})
	}
}

impl<B, S> Service<Request<B>> for SessionService<S>
where
	S: Service<Request<B>, Response = Response> + Send + Clone + 'static,
	<S as Service<Request<B>>>::Error: Into<Infallible> + 'static,
	<S as Service<Request<B>>>::Future: Send,
	B: Send + 'static,
{
	type Response = S::Response;
	type Error = Infallible;
	type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

	fn poll_ready(
		&mut self,
		cx: &mut std::task::Context<'_>,
	) -> std::task::Poll<Result<(), Self::Error>> {
		self.inner.poll_ready(cx).map_err(Into::into)
	}

	fn call(&mut self, req: Request<B>) -> Self::Future {
		self.clone().run(req).boxed()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::body::Body;
	use cookie::{Cookie, CookieJar};
	use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
	use time::macros::datetime;
	use tower::{service_fn, ServiceExt};

	const MASTER_KEY: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

	fn key() -> Key {
		Key::derive_from(MASTER_KEY.as_bytes())
	}

	fn layer(db: MockDatabase) -> SessionLayer {
		SessionLayer::new(
			MASTER_KEY,
			CookieConfig {
				secure: false,
				domain: None,
				path: "/".into(),
			},
			Arc::new(db.into_connection()),
		)
	}

	fn exec(rows_affected: u64) -> MockExecResult {
		MockExecResult {
			last_insert_id: 0,
			rows_affected,
		}
	}

	fn user() -> user::Model {
		let created = datetime!(2024-01-01 00:00);
		user::Model {
			id: Uuid::new_v4(),
			email: "someone@example.com".into(),
			display_name: "Someone".into(),
			legacy_password: None,
			plex_token: None,
			created_at: created,
			updated_at: created,
		}
	}

	fn stored_session(id: Uuid, user_id: Option<Uuid>, atime: PrimitiveDateTime) -> session::Model {
		session::Model {
			id,
			ctime: atime,
			atime,
			etime: atime + EXPIRY_ANONYMOUS,
			user_id,
		}
	}

	fn request_with_session(id: Uuid) -> Request<Body> {
		let mut jar = CookieJar::new();
		jar.private_mut(&key()).add(Cookie::new(COOKIE_NAME, id.to_string()));
		let cookie = jar.get(COOKIE_NAME).expect("encrypted cookie");

		Request::get("/")
			.header(header::COOKIE, cookie.encoded().to_string())
			.body(Body::empty())
			.unwrap()
	}

	/// The session cookie set by a response, decrypted.
	fn session_cookie(res: &Response) -> Option<Cookie<'static>> {
		let mut jar = CookieJar::new();
		res
			.headers()
			.get_all(header::SET_COOKIE)
			.iter()
			.flat_map(|v| v.to_str())
			.flat_map(|v| Cookie::parse_encoded(v.to_owned()))
			.for_each(|c| jar.add_original(c));

		let raw = jar.get(COOKIE_NAME)?.clone();
		let value = jar.private(&key()).get(COOKIE_NAME)?;
		let mut cookie = raw;
		cookie.set_value(value.value().to_owned());
		Some(cookie)
	}

	async fn ok(_req: Request<Body>) -> Result<Response, Infallible> {
		Ok("ok".into_response())
	}

	#[test]
	fn expiry_is_extended_at_most_hourly() {
		let now = datetime!(2024-06-01 12:00);

		assert_eq!(extended_expiry(now - Duration::minutes(30), true, now), None);
		assert_eq!(
			extended_expiry(now - Duration::hours(2), true, now),
			Some(now + EXPIRY_USER)
		);
		assert_eq!(
			extended_expiry(now - Duration::hours(2), false, now),
			Some(now + EXPIRY_ANONYMOUS)
		);
	}

	#[tokio::test]
	async fn new_visitor_gets_anonymous_session() {
		let db = MockDatabase::new(DatabaseBackend::Postgres).append_exec_results([exec(1)]);
		let before = utc_now();

		let res = layer(db)
			.layer(service_fn(ok))
			.oneshot(Request::get("/").body(Body::empty()).unwrap())
			.await
			.unwrap();

		let cookie = session_cookie(&res).expect("session cookie");
		assert!(Uuid::from_str(cookie.value()).is_ok());

		let expires = cookie.expires_datetime().expect("expiry");
		assert!(expires >= (before + EXPIRY_ANONYMOUS).assume_utc() - Duration::seconds(1));
		assert!(expires < (before + EXPIRY_USER).assume_utc());
	}

	#[tokio::test]
	async fn stale_logged_in_session_slides_to_user_expiry() {
		let id = Uuid::new_v4();
		let user = user();
		let db = MockDatabase::new(DatabaseBackend::Postgres)
			.append_query_results([vec![stored_session(
				id,
				Some(user.id),
				utc_now() - Duration::hours(2),
			)]])
			.append_query_results([vec![user.clone()]])
			.append_exec_results([exec(1)]);
		let before = utc_now();

		let res = layer(db)
			.layer(service_fn(ok))
			.oneshot(request_with_session(id))
			.await
			.unwrap();

		let cookie = session_cookie(&res).expect("session cookie");
		assert_eq!(cookie.value(), id.to_string());
		let expires = cookie.expires_datetime().expect("expiry");
		assert!(expires >= (before + EXPIRY_USER).assume_utc() - Duration::seconds(1));
	}

	#[tokio::test]
	async fn recently_used_session_keeps_its_cookie() {
		let id = Uuid::new_v4();
		let db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([vec![
			stored_session(id, None, utc_now() - Duration::minutes(5)),
		]]);

		let res = layer(db)
			.layer(service_fn(ok))
			.oneshot(request_with_session(id))
			.await
			.unwrap();

		assert!(session_cookie(&res).is_none());
	}

	#[tokio::test]
	async fn login_rotates_id_and_issues_user_cookie() {
		let id = Uuid::new_v4();
		let user = user();
		let db = MockDatabase::new(DatabaseBackend::Postgres)
			.append_query_results([vec![stored_session(
				id,
				None,
				utc_now() - Duration::minutes(5),
			)]])
			.append_exec_results([exec(1), exec(1)]);
		let before = utc_now();

		let service = service_fn(move |req: Request<Body>| {
			let user = user.clone();
			async move {
				let session = req.extensions().get::<Session>().cloned().expect("session");
				session.login(user).await.expect("login");
				Ok::<_, Infallible>("ok".into_response())
			}
		});

		let res = layer(db)
			.layer(service)
			.oneshot(request_with_session(id))
			.await
			.unwrap();

		let cookie = session_cookie(&res).expect("session cookie");
		let rotated = Uuid::from_str(cookie.value()).expect("uuid cookie");
		assert_ne!(rotated, id);

		let expires = cookie.expires_datetime().expect("expiry");
		assert!(expires >= (before + EXPIRY_USER).assume_utc() - Duration::seconds(1));
	}

	#[tokio::test]
	async fn logout_removes_cookie() {
		let id = Uuid::new_v4();
		let user = user();
		let db = MockDatabase::new(DatabaseBackend::Postgres)
			.append_query_results([vec![stored_session(
				id,
				Some(user.id),
				utc_now() - Duration::minutes(5),
			)]])
			.append_query_results([vec![user]])
			.append_exec_results([exec(1)]);

		let service = service_fn(|req: Request<Body>| async move {
			let session = req.extensions().get::<Session>().cloned().expect("session");
			assert!(session.user().is_some());
			session.logout().await.expect("logout");
			assert!(session.user().is_none());
			Ok::<_, Infallible>("ok".into_response())
		});

		let res = layer(db)
			.layer(service)
			.oneshot(request_with_session(id))
			.await
			.unwrap();

		let removal = res
			.headers()
			.get_all(header::SET_COOKIE)
			.iter()
			.flat_map(|v| v.to_str())
			.flat_map(|v| Cookie::parse_encoded(v.to_owned()))
			.find(|c| c.name() == COOKIE_NAME)
			.expect("removal cookie");
		assert_eq!(removal.value(), "");
		assert_eq!(removal.max_age(), Some(Duration::ZERO));
	}
}

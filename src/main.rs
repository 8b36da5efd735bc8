mod config;
mod extractors;
mod web;

use axum::{
	extract::{FromRef, State},
	response::IntoResponse,
	routing::get,
	Router,
};
use axum_healthcheck::{HealthCheck, ResultHealthStatusExt};
use config::{Config, ConfigError};
use migration::MigratorTrait;
use sea_orm::{
	ColumnTrait, ConnectOptions, Database, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
};
use showtrack_entities::session;
use showtrack_services::{AuthConfig, LogMailer, SharedMailer};
use showtrack_session::{CookieConfig, SessionLayer};
use showtrack_utils::utc_now;
use std::{path::Path, sync::Arc};
use thiserror::Error;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tower_http::{compression::CompressionLayer, services::ServeDir, trace::TraceLayer};
use tracing::{debug, info, metadata::LevelFilter, warn};
use tracing_forest::ForestLayer;
use tracing_subscriber::{prelude::*, EnvFilter};
use tvmaze_client::{TvMazeClient, TvMazeError};
use url::Url;
use webauthn_rs::prelude::WebauthnError;

const APP_NAME: &str = "showtrack";
const SESSION_SWEEP_INTERVAL: tokio::time::Duration = tokio::time::Duration::from_secs(60 * 60);

/// Public base url of the site.
#[derive(Clone)]
pub struct SelfUrl(pub Arc<Url>);

#[derive(Clone)]
pub struct AppState {
	db: Arc<DatabaseConnection>,
	catalog: Arc<TvMazeClient>,
	auth: AuthConfig,
	mailer: SharedMailer,
	self_url: SelfUrl,
}

impl FromRef<AppState> for Arc<DatabaseConnection> {
	fn from_ref(input: &AppState) -> Self {
		input.db.clone()
	}
}

impl FromRef<AppState> for AuthConfig {
	fn from_ref(input: &AppState) -> Self {
		input.auth.clone()
	}
}

impl FromRef<AppState> for Arc<TvMazeClient> {
	fn from_ref(input: &AppState) -> Self {
		input.catalog.clone()
	}
}

impl FromRef<AppState> for SharedMailer {
	fn from_ref(input: &AppState) -> Self {
		input.mailer.clone()
	}
}

impl FromRef<AppState> for SelfUrl {
	fn from_ref(input: &AppState) -> Self {
		input.self_url.clone()
	}
}

#[derive(Debug, Error)]
enum StartupError {
	#[error(transparent)]
	Config(#[from] ConfigError),

	#[error("database error: {0}")]
	Db(#[from] DbErr),

	#[error("failed to create catalog client: {0}")]
	Catalog(#[from] TvMazeError),

	#[error("invalid webauthn configuration: {0}")]
	Webauthn(#[from] WebauthnError),

	#[error("failed to register signal handler: {0}")]
	Signal(#[from] std::io::Error),

	#[error("server error: {0}")]
	Server(axum::BoxError),
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
	HealthCheck::new()
		.add("db", state.db.ping().await.or_unhealthy("ping failed"))
		.into_response()
}

fn app(state: AppState, sessions: SessionLayer, public_dir: &Path) -> Router {
	Router::new()
		.route("/healthz", get(health_check))
		.merge(web::public_router())
		.merge(web::router().route_layer(sessions))
		.with_state(state)
		.nest_service("/public", ServeDir::new(public_dir))
		.layer(CompressionLayer::new())
		.layer(TraceLayer::new_for_http())
}

fn shutdown_token() -> Result<CancellationToken, std::io::Error> {
	let mut terminate = signal(SignalKind::terminate())?;
	let ct = CancellationToken::new();

	tokio::spawn({
		let ct = ct.clone();
		async move {
			tokio::select! {
				_ = terminate.recv() => {},
				_ = tokio::signal::ctrl_c() => {},
			}

			info!("shutting down");
			ct.cancel();
		}
	});

	Ok(ct)
}

fn spawn_session_sweep(db: Arc<DatabaseConnection>, ct: CancellationToken) {
	tokio::spawn(async move {
		while !ct.is_cancelled() {
			let result = session::Entity::delete_many()
				.filter(session::Column::Etime.lt(utc_now()))
				.exec(&*db)
				.await;

			match result {
				Ok(v) => debug!(
					"deleted {count} expired session rows",
					count = v.rows_affected
				),
				Err(e) => warn!("failed to delete expired sessions: {e:#?}"),
			}

			tokio::select! {
				_ = tokio::time::sleep(SESSION_SWEEP_INTERVAL) => {},
				_ = ct.cancelled() => { break; },
			}
		}
	});
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
	tracing_subscriber::registry()
		.with(ForestLayer::default())
		.with(
			EnvFilter::builder()
				.with_default_directive(LevelFilter::INFO.into())
				.from_env_lossy(),
		)
		.init();

	let config = Config::from_env()?;

	let mut options = ConnectOptions::new(config.database_url.clone());
	if let Some(schema) = &config.database_schema {
		options.set_schema_search_path(schema.clone());
	}
	let db = Database::connect(options).await?;

	if config.run_migrations {
		migration::Migrator::up(&db, None).await?;
	}
	let db = Arc::new(db);

	let catalog = Arc::new(TvMazeClient::new(
		config.catalog_url.clone(),
		config.catalog_timeout(),
	)?);
	let webauthn = AuthConfig::webauthn_for(&config.self_url, APP_NAME)?;

	let state = AppState {
		db: db.clone(),
		catalog,
		auth: AuthConfig::new(db.clone(), webauthn),
		mailer: Arc::new(LogMailer),
		self_url: SelfUrl(Arc::new(config.self_url.clone())),
	};

	let sessions = SessionLayer::new(
		&config.session_key,
		CookieConfig {
			secure: config.secure_cookies,
			domain: None,
			path: "/".into(),
		},
		db.clone(),
	);

	let ct = shutdown_token()?;
	spawn_session_sweep(db, ct.clone());

	let router = app(state, sessions, &config.public_dir);

	info!(addr = %config.listen_addr, "listening");
	axum::Server::bind(&config.listen_addr)
		.serve(router.into_make_service())
		.with_graceful_shutdown(async move { ct.cancelled().await })
		.await
		.map_err(|e| StartupError::Server(e.into()))
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::{
		body::Body,
		http::{Request, StatusCode},
	};
	use sea_orm::{DatabaseBackend, MockDatabase};
	use showtrack_entities::user;
	use tower::ServiceExt;

	fn test_app(db: DatabaseConnection) -> Router {
		let db = Arc::new(db);
		let self_url = Url::parse("http://localhost:8000/").unwrap();
		let webauthn = AuthConfig::webauthn_for(&self_url, APP_NAME).unwrap();
		let state = AppState {
			db: db.clone(),
			catalog: Arc::new(TvMazeClient::with_defaults().unwrap()),
			auth: AuthConfig::new(db.clone(), webauthn),
			mailer: Arc::new(LogMailer),
			self_url: SelfUrl(Arc::new(self_url)),
		};
		let sessions = SessionLayer::new(
			"0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef",
			CookieConfig {
				secure: false,
				domain: None,
				path: "/".into(),
			},
			db,
		);

		app(state, sessions, Path::new("public"))
	}

	#[tokio::test]
	async fn health_check_pings_the_database() {
		let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
		let response = test_app(db)
			.oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
			.await
			.unwrap();

		assert_eq!(response.status(), StatusCode::OK);
	}

	#[tokio::test]
	async fn plex_webhook_rejects_unknown_tokens() {
		let db = MockDatabase::new(DatabaseBackend::Postgres)
			.append_query_results([Vec::<user::Model>::new()])
			.into_connection();
		let response = test_app(db)
			.oneshot(
				Request::post("/plex/not-a-token")
					.header("content-type", "application/json")
					.body(Body::from(r#"{"event":"media.play"}"#))
					.unwrap(),
			)
			.await
			.unwrap();

		assert_eq!(response.status(), StatusCode::NOT_FOUND);
	}

	#[tokio::test]
	async fn plex_webhook_accepts_multipart_events() {
		let created = time::macros::datetime!(2024-01-01 00:00);
		let user = user::Model {
			id: uuid::Uuid::nil(),
			email: "someone@example.com".into(),
			display_name: "Someone".into(),
			legacy_password: None,
			plex_token: Some("secret-token".into()),
			created_at: created,
			updated_at: created,
		};
		let db = MockDatabase::new(DatabaseBackend::Postgres)
			.append_query_results([vec![user]])
			.into_connection();

		let body = concat!(
			"--plex\r\n",
			"Content-Disposition: form-data; name=\"payload\"\r\n",
			"Content-Type: application/json\r\n\r\n",
			r#"{"event":"media.play","Metadata":{"type":"episode"}}"#,
			"\r\n--plex--\r\n",
		);
		let response = test_app(db)
			.oneshot(
				Request::post("/plex/secret-token")
					.header("content-type", "multipart/form-data; boundary=plex")
					.body(Body::from(body))
					.unwrap(),
			)
			.await
			.unwrap();

		assert_eq!(response.status(), StatusCode::NO_CONTENT);
	}
}

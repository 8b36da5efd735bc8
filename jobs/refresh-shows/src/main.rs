use sea_orm::{ConnectOptions, Database, DbErr};
use showtrack_services::{ShowService, ShowServiceError};
use std::{env, future::Future, sync::Arc, time::Duration};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, metadata::LevelFilter, warn, Instrument};
use tracing_forest::ForestLayer;
use tracing_subscriber::{prelude::*, EnvFilter};
use tvmaze_client::{TvMazeClient, DEFAULT_BASE_URL, DEFAULT_TIMEOUT};
use url::Url;

/// How long to back off when the catalog answers 429.
const RATE_LIMIT_DELAY: Duration = Duration::from_secs(10);

fn required_env_var(name: &str) -> Result<String, DbErr> {
	env::var(name).map_err(|_| DbErr::Custom(format!("${name} not found")))
}

fn is_rate_limited(result: &Result<(), ShowServiceError>) -> bool {
	matches!(result, Err(ShowServiceError::Catalog(e)) if e.is_rate_limited())
}

/// Runs `op`, and runs it once more after `delay` when the first attempt was rate limited.
async fn retry_once_if_rate_limited<F, Fut>(
	delay: Duration,
	mut op: F,
) -> Result<(), ShowServiceError>
where
	F: FnMut() -> Fut,
	Fut: Future<Output = Result<(), ShowServiceError>>,
{
	let result = op().await;
	if !is_rate_limited(&result) {
		return result;
	}

	warn!("catalog rate limit hit, retrying in {delay:?}");
	tokio::time::sleep(delay).await;
	op().await
}

fn catalog_client() -> Result<TvMazeClient, Box<dyn std::error::Error>> {
	let base_url = match env::var("CATALOG_URL") {
		Ok(url) => Url::parse(&url)?,
		Err(_) => Url::parse(DEFAULT_BASE_URL)?,
	};

	Ok(TvMazeClient::new(base_url, DEFAULT_TIMEOUT)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	tracing_subscriber::registry()
		.with(ForestLayer::default())
		.with(
			EnvFilter::builder()
				.with_default_directive(LevelFilter::INFO.into())
				.from_env_lossy(),
		)
		.init();

	let mut options = ConnectOptions::new(required_env_var("DATABASE_URL")?);
	if let Ok(schema) = env::var("DATABASE_SCHEMA") {
		options.set_schema_search_path(schema);
	}
	let db = Database::connect(options).await?;

	let ct = CancellationToken::new();
	let mut terminate = signal(SignalKind::terminate())?;
	tokio::spawn({
		let ct = ct.clone();
		async move {
			terminate.recv().await;
			ct.cancel();
		}
	});

	let service = ShowService {
		db: Arc::new(db),
		catalog: Arc::new(catalog_client()?),
	};

	let shows = service.all_shows().await?;
	info!(count = shows.len(), "refreshing shows");

	let mut failed = 0usize;
	for show in shows {
		if ct.is_cancelled() {
			warn!("cancelled, stopping early");
			break;
		}

		let Ok(catalog_id) = u32::try_from(show.catalog_id) else {
			warn!(show.id = %show.id, catalog.id = show.catalog_id, "invalid catalog id");
			failed += 1;
			continue;
		};

		let result = retry_once_if_rate_limited(RATE_LIMIT_DELAY, || async {
			match service.sync_from_catalog(catalog_id, None).await? {
				Some(_) => Ok(()),
				None => {
					warn!("show no longer in the catalog");
					Ok(())
				}
			}
		})
		.instrument(info_span!("refresh show", show.id = %show.id, name = %show.name))
		.await;

		if let Err(e) = result {
			warn!(show.id = %show.id, "failed to refresh show: {e}");
			failed += 1;
		}
	}

	info!(failed, "done");
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use http::StatusCode;
	use std::sync::atomic::{AtomicUsize, Ordering};
	use tvmaze_client::TvMazeError;

	fn catalog_status(status: StatusCode) -> ShowServiceError {
		ShowServiceError::Catalog(TvMazeError::Status {
			url: Url::parse("https://api.tvmaze.com/shows/1").unwrap(),
			status,
		})
	}

	#[tokio::test]
	async fn rate_limited_refresh_is_retried_once() {
		let calls = AtomicUsize::new(0);
		let result = retry_once_if_rate_limited(Duration::ZERO, || async {
			match calls.fetch_add(1, Ordering::SeqCst) {
				0 => Err(catalog_status(StatusCode::TOO_MANY_REQUESTS)),
				_ => Ok(()),
			}
		})
		.await;

		assert!(result.is_ok());
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn second_rate_limit_is_returned() {
		let calls = AtomicUsize::new(0);
		let result = retry_once_if_rate_limited(Duration::ZERO, || async {
			calls.fetch_add(1, Ordering::SeqCst);
			Err(catalog_status(StatusCode::TOO_MANY_REQUESTS))
		})
		.await;

		assert!(matches!(
			result,
			Err(ShowServiceError::Catalog(ref e)) if e.is_rate_limited()
		));
		assert_eq!(calls.load(Ordering::SeqCst), 2);
	}

	#[tokio::test]
	async fn server_errors_are_not_retried() {
		let calls = AtomicUsize::new(0);
		let result = retry_once_if_rate_limited(Duration::ZERO, || async {
			calls.fetch_add(1, Ordering::SeqCst);
			Err(catalog_status(StatusCode::BAD_GATEWAY))
		})
		.await;

		assert!(result.is_err());
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn successful_refresh_runs_once() {
		let calls = AtomicUsize::new(0);
		let result = retry_once_if_rate_limited(Duration::ZERO, || async {
			calls.fetch_add(1, Ordering::SeqCst);
			Ok(())
		})
		.await;

		assert!(result.is_ok());
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn other_errors_are_not_retried() {
		let calls = AtomicUsize::new(0);
		let result = retry_once_if_rate_limited(Duration::ZERO, || async {
			calls.fetch_add(1, Ordering::SeqCst);
			Err(ShowServiceError::NotInCatalog(1))
		})
		.await;

		assert!(matches!(result, Err(ShowServiceError::NotInCatalog(1))));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}
}

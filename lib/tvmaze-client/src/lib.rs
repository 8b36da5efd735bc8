use async_trait::async_trait;
use reqwest::{
	header::{self, HeaderMap},
	Client, Request, Response, StatusCode,
};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, Middleware, Next};
use serde::de::DeserializeOwned;
use std::{borrow::Cow, time::Duration};
use task_local_extensions::Extensions;
use thiserror::Error;
use tracing::{error, info, info_span, instrument, Instrument};
use url::Url;

mod html;
mod shows;

pub static PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub static PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

pub static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

pub static DEFAULT_BASE_URL: &str = "https://api.tvmaze.com/";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

pub use shows::{Episode, SearchResult, Show, ShowWithEpisodes};

#[derive(Error, Debug)]
pub enum TvMazeError {
	#[error("request to {url} timed out")]
	Timeout { url: Url },

	#[error("request to {url} failed: {source}")]
	Network {
		url: Url,
		#[source]
		source: reqwest_middleware::Error,
	},

	#[error("{url} responded with status {status}")]
	Status { url: Url, status: StatusCode },

	#[error("failed to parse response from {url}: {source}")]
	Parse {
		url: Url,
		#[source]
		source: serde_json::Error,
	},

	#[error("unexpected response from {url}: {reason}")]
	InvalidResponse {
		url: Url,
		reason: Cow<'static, str>,
	},

	#[error("invalid url: {0}")]
	Url(#[from] url::ParseError),

	#[error("failed to build http client: {0}")]
	Client(#[from] reqwest::Error),
}

impl TvMazeError {
	fn request(url: &Url, error: reqwest_middleware::Error) -> Self {
		let timed_out = match &error {
			reqwest_middleware::Error::Reqwest(e) => e.is_timeout(),
			reqwest_middleware::Error::Middleware(_) => false,
		};

		if timed_out {
			Self::Timeout { url: url.clone() }
		} else {
			Self::Network {
				url: url.clone(),
				source: error,
			}
		}
	}

	pub(crate) fn invalid(url: &Url, reason: impl Into<Cow<'static, str>>) -> Self {
		Self::InvalidResponse {
			url: url.clone(),
			reason: reason.into(),
		}
	}

	/// The HTTP status the catalog answered with, when the failure came from one.
	pub fn status(&self) -> Option<StatusCode> {
		match self {
			Self::Status { status, .. } => Some(*status),
			_ => None,
		}
	}

	pub fn is_rate_limited(&self) -> bool {
		self.status() == Some(StatusCode::TOO_MANY_REQUESTS)
	}
}

pub(crate) enum TvMazeUrl<'a> {
	Search(&'a str),
	Show(u32),
	ShowWithEpisodes(u32),
	Episodes(u32),
}

impl<'a> TvMazeUrl<'a> {
	fn into_url(self, base: &Url) -> Result<Url, TvMazeError> {
		let url = match self {
			Self::Search(query) => {
				let mut url = base.join("search/shows")?;
				url.query_pairs_mut().append_pair("q", query);
				url
			}
			Self::Show(id) => base.join(&format!("shows/{id}"))?,
			Self::ShowWithEpisodes(id) => {
				let mut url = base.join(&format!("shows/{id}"))?;
				url.query_pairs_mut().append_pair("embed", "episodes");
				url
			}
			Self::Episodes(id) => base.join(&format!("shows/{id}/episodes"))?,
		};

		Ok(url)
	}
}

pub struct TvMazeClient {
	client: ClientWithMiddleware,
	base_url: Url,
}

impl TvMazeClient {
	pub fn new(mut base_url: Url, timeout: Duration) -> Result<Self, TvMazeError> {
		if !base_url.path().ends_with('/') {
			let path = format!("{}/", base_url.path());
			base_url.set_path(&path);
		}

		let mut headers = HeaderMap::new();
		headers.insert(
			header::ACCEPT,
			header::HeaderValue::from_static("application/json"),
		);

		Ok(Self {
			client: ClientBuilder::new(
				Client::builder()
					.user_agent(APP_USER_AGENT)
					.timeout(timeout)
					.pool_idle_timeout(Duration::from_secs(5))
					.pool_max_idle_per_host(2)
					.default_headers(headers)
					.build()?,
			)
			.with(TracingMiddleware)
			.build(),
			base_url,
		})
	}

	pub fn with_defaults() -> Result<Self, TvMazeError> {
		Self::new(Url::parse(DEFAULT_BASE_URL)?, DEFAULT_TIMEOUT)
	}

	pub async fn search_shows(&self, query: &str) -> Result<Vec<SearchResult>, TvMazeError> {
		shows::search_shows(query, self).await
	}

	pub async fn get_show(&self, id: u32) -> Result<Option<Show>, TvMazeError> {
		shows::get_show(id, self).await
	}

	pub async fn get_episodes(&self, id: u32) -> Result<Vec<Episode>, TvMazeError> {
		shows::get_episodes(id, self).await
	}

	pub async fn get_show_with_episodes(
		&self,
		id: u32,
	) -> Result<Option<ShowWithEpisodes>, TvMazeError> {
		shows::get_show_with_episodes(id, self).await
	}

	/// Issues a GET and decodes the JSON body. A 404 maps to `Ok(None)`.
	#[instrument(skip(self, url), fields(url = %url))]
	pub(crate) async fn get_json<T>(&self, url: &Url) -> Result<Option<T>, TvMazeError>
	where
		T: DeserializeOwned,
	{
		let response = self
			.client
			.get(url.clone())
			.send()
			.await
			.map_err(|e| TvMazeError::request(url, e))?;

		let response = match response.status() {
			StatusCode::NOT_FOUND => return Ok(None),
			status if !status.is_success() => {
				let body = response.text().await.unwrap_or_default();
				error!(status = %status, "error response: {body}");
				return Err(TvMazeError::Status {
					url: url.clone(),
					status,
				});
			}
			_ => response,
		};

		let body = response
			.bytes()
			.await
			.map_err(|e| TvMazeError::request(url, e.into()))?;

		serde_json::from_slice(&body)
			.map(Some)
			.map_err(|source| {
				error!(error = %source, "failed to parse response");
				TvMazeError::Parse {
					url: url.clone(),
					source,
				}
			})
	}

	pub(crate) fn url(&self, url: TvMazeUrl<'_>) -> Result<Url, TvMazeError> {
		url.into_url(&self.base_url)
	}
}

struct TracingMiddleware;

#[async_trait]
impl Middleware for TracingMiddleware {
	async fn handle(
		&self,
		req: Request,
		extensions: &mut Extensions,
		next: Next<'_>,
	) -> reqwest_middleware::Result<Response> {
		let span = info_span!(
			"request",
			method = %req.method(),
			uri = %req.url(),
		);

		span
			.in_scope(|| {
				info!(
					method = %req.method(),
					uri = %req.url(),
					"sending request",
				);
				next.run(req, extensions)
			})
			.instrument(span.clone())
			.await
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn urls_are_built_relative_to_base() {
		let client = TvMazeClient::new(
			Url::parse("http://localhost:8080/api").unwrap(),
			DEFAULT_TIMEOUT,
		)
		.unwrap();

		assert_eq!(
			client.url(TvMazeUrl::Search("the wire")).unwrap().as_str(),
			"http://localhost:8080/api/search/shows?q=the+wire"
		);
		assert_eq!(
			client.url(TvMazeUrl::ShowWithEpisodes(169)).unwrap().as_str(),
			"http://localhost:8080/api/shows/169?embed=episodes"
		);
		assert_eq!(
			client.url(TvMazeUrl::Episodes(7)).unwrap().as_str(),
			"http://localhost:8080/api/shows/7/episodes"
		);
	}

	#[test]
	fn status_is_exposed_for_http_failures() {
		let url = Url::parse(DEFAULT_BASE_URL).unwrap();
		let error = TvMazeError::Status {
			url: url.clone(),
			status: StatusCode::TOO_MANY_REQUESTS,
		};

		assert_eq!(error.status(), Some(StatusCode::TOO_MANY_REQUESTS));
		assert!(error.is_rate_limited());
		assert_eq!(TvMazeError::Timeout { url }.status(), None);
	}
}

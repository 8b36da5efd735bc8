use serde::Deserialize;
use std::{net::SocketAddr, path::PathBuf, time::Duration};
use thiserror::Error;
use url::Url;

/// Minimum length of `SESSION_KEY`, required to derive the cookie keys.
pub const MIN_SESSION_KEY_LEN: usize = 32;

/// Server configuration, read from the environment (and `.env` when present).
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
	pub database_url: String,

	/// Postgres schema to use instead of `public`.
	#[serde(default)]
	pub database_schema: Option<String>,

	pub session_key: String,

	/// Public base url, used for reset links and as the WebAuthn origin.
	pub self_url: Url,

	#[serde(default = "default_true")]
	pub secure_cookies: bool,

	#[serde(default = "default_listen_addr")]
	pub listen_addr: SocketAddr,

	#[serde(default = "default_public_dir")]
	pub public_dir: PathBuf,

	#[serde(default = "default_catalog_url")]
	pub catalog_url: Url,

	#[serde(default = "default_catalog_timeout_secs")]
	pub catalog_timeout_secs: u64,

	#[serde(default = "default_true")]
	pub run_migrations: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("failed to load config: {0}")]
	Env(#[from] envy::Error),

	#[error("SESSION_KEY must be at least {MIN_SESSION_KEY_LEN} bytes long")]
	SessionKeyTooShort,

	#[error("SELF_URL must have a host")]
	SelfUrlWithoutHost,
}

fn default_true() -> bool {
	true
}

fn default_listen_addr() -> SocketAddr {
	SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn default_public_dir() -> PathBuf {
	PathBuf::from("public")
}

fn default_catalog_url() -> Url {
	Url::parse(tvmaze_client::DEFAULT_BASE_URL).expect("default catalog url is valid")
}

fn default_catalog_timeout_secs() -> u64 {
	tvmaze_client::DEFAULT_TIMEOUT.as_secs()
}

impl Config {
	pub fn from_env() -> Result<Self, ConfigError> {
		dotenvy::dotenv().ok();
		envy::from_env::<Config>()?.validated()
	}

	#[cfg(test)]
	fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Result<Self, ConfigError> {
		envy::from_iter::<_, Config>(
			pairs
				.into_iter()
				.map(|(k, v)| (k.to_owned(), v.to_owned())),
		)?
		.validated()
	}

	fn validated(self) -> Result<Self, ConfigError> {
		if self.session_key.len() < MIN_SESSION_KEY_LEN {
			return Err(ConfigError::SessionKeyTooShort);
		}

		if self.self_url.host_str().is_none() {
			return Err(ConfigError::SelfUrlWithoutHost);
		}

		Ok(self)
	}

	pub fn catalog_timeout(&self) -> Duration {
		Duration::from_secs(self.catalog_timeout_secs)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const KEY: &str = "0123456789abcdef0123456789abcdef";

	#[test]
	fn defaults_apply() {
		let config = Config::from_pairs([
			("DATABASE_URL", "postgres://localhost/showtrack"),
			("SESSION_KEY", KEY),
			("SELF_URL", "http://localhost:8000/"),
		])
		.expect("valid config");

		assert!(config.secure_cookies);
		assert!(config.run_migrations);
		assert_eq!(config.listen_addr.port(), 8000);
		assert_eq!(config.catalog_timeout(), Duration::from_secs(10));
		assert_eq!(config.catalog_url.as_str(), "https://api.tvmaze.com/");
		assert_eq!(config.database_schema, None);
	}

	#[test]
	fn overrides_are_read() {
		let config = Config::from_pairs([
			("DATABASE_URL", "postgres://localhost/showtrack"),
			("DATABASE_SCHEMA", "tracker"),
			("SESSION_KEY", KEY),
			("SELF_URL", "https://shows.example.com/"),
			("SECURE_COOKIES", "false"),
			("LISTEN_ADDR", "127.0.0.1:3000"),
			("CATALOG_TIMEOUT_SECS", "3"),
		])
		.expect("valid config");

		assert!(!config.secure_cookies);
		assert_eq!(config.database_schema.as_deref(), Some("tracker"));
		assert_eq!(config.listen_addr, SocketAddr::from(([127, 0, 0, 1], 3000)));
		assert_eq!(config.catalog_timeout(), Duration::from_secs(3));
	}

	#[test]
	fn short_session_key_is_rejected() {
		let err = Config::from_pairs([
			("DATABASE_URL", "postgres://localhost/showtrack"),
			("SESSION_KEY", "too short"),
			("SELF_URL", "http://localhost:8000/"),
		])
		.unwrap_err();

		assert!(matches!(err, ConfigError::SessionKeyTooShort));
	}

	#[test]
	fn missing_variables_fail() {
		let err = Config::from_pairs([("SESSION_KEY", KEY)]).unwrap_err();
		assert!(matches!(err, ConfigError::Env(_)));
	}
}

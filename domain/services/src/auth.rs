use crate::{
	password::{verify_password, PasswordError},
	user::{find_by_email, store_password},
};
use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use sea_orm::{
	ActiveModelTrait, ActiveValue, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr,
	EntityTrait, QueryFilter,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use showtrack_entities::{passkey, password, user};
use showtrack_session::{Session, SessionError};
use showtrack_utils::utc_now;
use std::{convert::Infallible, sync::Arc};
use thiserror::Error;
use time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;
use uuid::Uuid;
use webauthn_rs::prelude::{
	CreationChallengeResponse, CredentialID, Passkey, PasskeyAuthentication, PasskeyRegistration,
	PublicKeyCredential, RegisterPublicKeyCredential, RequestChallengeResponse, Webauthn,
	WebauthnBuilder, WebauthnError,
};

const REGISTRATION_COOKIE: &str = ".passkey.registration";
const LOGIN_COOKIE: &str = ".passkey.login";
const CHALLENGE_LIFETIME: Duration = Duration::minutes(15);

struct AuthServiceConfig {
	db: Arc<DatabaseConnection>,
	webauthn: Webauthn,
}

#[derive(Clone)]
pub struct AuthConfig {
	config: Arc<AuthServiceConfig>,
}

impl AuthConfig {
	pub fn new(db: Arc<DatabaseConnection>, webauthn: Webauthn) -> Self {
		Self {
			config: Arc::new(AuthServiceConfig { db, webauthn }),
		}
	}

	/// Relying party for the site served at `self_url`.
	pub fn webauthn_for(self_url: &Url, name: &str) -> Result<Webauthn, WebauthnError> {
		let rp_id = self_url
			.host_str()
			.ok_or(WebauthnError::Configuration)?;

		WebauthnBuilder::new(rp_id, self_url)?.rp_name(name).build()
	}

	fn db(&self) -> &DatabaseConnection {
		&self.config.db
	}

	fn webauthn(&self) -> &Webauthn {
		&self.config.webauthn
	}
}

#[derive(Clone)]
pub struct AuthService {
	config: AuthConfig,
	session: Session,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthService
where
	AuthConfig: FromRef<S>,
	S: Sync,
{
	type Rejection = Infallible;

	async fn from_request_parts(
		parts: &mut http::request::Parts,
		state: &S,
	) -> Result<Self, Self::Rejection> {
		let config = AuthConfig::from_ref(state);
		let session = Session::from_request_parts(parts, state).await?;

		Ok(Self { config, session })
	}
}

#[derive(Debug, Error)]
pub enum AuthError {
	#[error("invalid email or password")]
	InvalidCredentials,

	#[error("no passkeys registered for this account")]
	NoPasskeys,

	#[error("passkey challenge expired")]
	ChallengeExpired,

	#[error("unknown passkey")]
	UnknownCredential,

	#[error("passkey counter did not increase, the authenticator may have been cloned")]
	PossibleClone,

	#[error("malformed passkey credential id")]
	MalformedCredential,

	#[error(transparent)]
	Webauthn(#[from] WebauthnError),

	#[error(transparent)]
	State(#[from] serde_json::Error),

	#[error(transparent)]
	Session(#[from] SessionError),

	#[error(transparent)]
	Password(#[from] PasswordError),

	#[error(transparent)]
	DbErr(#[from] DbErr),
}

#[derive(Serialize, Deserialize)]
struct RegistrationChallenge {
	user_id: Uuid,
	state: PasskeyRegistration,
}

#[derive(Serialize, Deserialize)]
struct LoginChallenge {
	user_id: Uuid,
	state: PasskeyAuthentication,
}

/// Non-zero counters must strictly increase. Authenticators that do not
/// implement counters always report zero.
pub(crate) fn check_counter(stored: i64, reported: u32) -> Result<(), AuthError> {
	if reported != 0 && i64::from(reported) <= stored {
		return Err(AuthError::PossibleClone);
	}

	Ok(())
}

/// Base64url form of a credential id, as stored in the passkey table.
fn credential_key(id: &CredentialID) -> Result<String, AuthError> {
	match serde_json::to_value(id)? {
		serde_json::Value::String(key) => Ok(key),
		_ => Err(AuthError::MalformedCredential),
	}
}

/// Checks an email and password pair. A hash still sitting in the legacy
/// column is moved to the password table on first use.
pub(crate) async fn verify_credentials<C: ConnectionTrait>(
	db: &C,
	email: &str,
	password: &str,
) -> Result<user::Model, AuthError> {
	let user = find_by_email(db, email)
		.await?
		.ok_or(AuthError::InvalidCredentials)?;

	match password::Entity::find_by_id(user.id).one(db).await? {
		Some(row) => {
			if !verify_password(password.to_owned(), row.hash).await? {
				return Err(AuthError::InvalidCredentials);
			}
		}
		None => {
			let legacy = user
				.legacy_password
				.clone()
				.ok_or(AuthError::InvalidCredentials)?;

			if !verify_password(password.to_owned(), legacy.clone()).await? {
				return Err(AuthError::InvalidCredentials);
			}

			store_password(db, user.id, legacy).await?;
			info!(user.id = %user.id, "migrated legacy password");
		}
	}

	Ok(user)
}

impl AuthService {
	pub fn user(&self) -> Option<Arc<user::Model>> {
		self.session.user()
	}

	fn store_challenge<T: Serialize>(&self, name: &'static str, value: &T) -> Result<(), AuthError> {
		self.session.put_state(name, value, CHALLENGE_LIFETIME)?;
		Ok(())
	}

	fn take_challenge<T: DeserializeOwned>(&self, name: &'static str) -> Result<T, AuthError> {
		self
			.session
			.take_state(name)?
			.ok_or(AuthError::ChallengeExpired)
	}

	pub async fn logout(&self) -> Result<(), DbErr> {
		self.session.logout().await
	}

	/// Logs in a user whose credentials were checked elsewhere, such as a
	/// freshly joined account.
	pub async fn start_session(&self, user: user::Model) -> Result<(), DbErr> {
		self.session.login(user).await
	}

	#[instrument(skip_all)]
	pub async fn login_with_password(
		&self,
		email: &str,
		password: &str,
	) -> Result<user::Model, AuthError> {
		let user = verify_credentials(self.config.db(), email, password).await?;
		self.session.login(user.clone()).await?;
		info!(user.id = %user.id, "logged in with password");
		Ok(user)
	}

	async fn stored_passkeys(&self, user_id: Uuid) -> Result<Vec<(passkey::Model, Passkey)>, AuthError> {
		let rows = passkey::Entity::find()
			.filter(passkey::Column::UserId.eq(user_id))
			.all(self.config.db())
			.await?;

		rows
			.into_iter()
			.map(|row| {
				let credential = serde_json::from_str::<Passkey>(&row.credential)?;
				Ok((row, credential))
			})
			.collect()
	}

	#[instrument(skip_all, fields(user.id = %user.id))]
	pub async fn start_passkey_registration(
		&self,
		user: &user::Model,
	) -> Result<CreationChallengeResponse, AuthError> {
		let exclude = self
			.stored_passkeys(user.id)
			.await?
			.into_iter()
			.map(|(_, credential)| credential.cred_id().clone())
			.collect::<Vec<_>>();

		let (challenge, state) = self.config.webauthn().start_passkey_registration(
			user.id,
			&user.email,
			&user.display_name,
			Some(exclude),
		)?;

		self.store_challenge(
			REGISTRATION_COOKIE,
			&RegistrationChallenge {
				user_id: user.id,
				state,
			},
		)?;

		Ok(challenge)
	}

	#[instrument(skip_all, fields(user.id = %user.id))]
	pub async fn finish_passkey_registration(
		&self,
		user: &user::Model,
		name: &str,
		credential: &RegisterPublicKeyCredential,
	) -> Result<passkey::Model, AuthError> {
		let challenge: RegistrationChallenge = self.take_challenge(REGISTRATION_COOKIE)?;
		if challenge.user_id != user.id {
			return Err(AuthError::ChallengeExpired);
		}

		let passkey = self
			.config
			.webauthn()
			.finish_passkey_registration(credential, &challenge.state)?;

		let name = match name.trim() {
			"" => "Passkey".to_owned(),
			name => name.to_owned(),
		};

		let model = passkey::ActiveModel {
			id: ActiveValue::Set(Uuid::new_v4()),
			user_id: ActiveValue::Set(user.id),
			credential_id: ActiveValue::Set(credential_key(passkey.cred_id())?),
			name: ActiveValue::Set(name),
			credential: ActiveValue::Set(serde_json::to_string(&passkey)?),
			counter: ActiveValue::Set(0),
			created_at: ActiveValue::Set(utc_now()),
			last_used_at: ActiveValue::Set(None),
		}
		.insert(self.config.db())
		.await?;

		info!(passkey.id = %model.id, "passkey registered");
		Ok(model)
	}

	/// First step of the email-first passkey login.
	#[instrument(skip_all)]
	pub async fn start_passkey_login(
		&self,
		email: &str,
	) -> Result<RequestChallengeResponse, AuthError> {
		let user = find_by_email(self.config.db(), email)
			.await?
			.ok_or(AuthError::InvalidCredentials)?;

		let credentials = self
			.stored_passkeys(user.id)
			.await?
			.into_iter()
			.map(|(_, credential)| credential)
			.collect::<Vec<_>>();

		if credentials.is_empty() {
			return Err(AuthError::NoPasskeys);
		}

		let (challenge, state) = self
			.config
			.webauthn()
			.start_passkey_authentication(&credentials)?;

		self.store_challenge(
			LOGIN_COOKIE,
			&LoginChallenge {
				user_id: user.id,
				state,
			},
		)?;

		Ok(challenge)
	}

	#[instrument(skip_all)]
	pub async fn finish_passkey_login(
		&self,
		credential: &PublicKeyCredential,
	) -> Result<user::Model, AuthError> {
		let challenge: LoginChallenge = self.take_challenge(LOGIN_COOKIE)?;
		let result = self
			.config
			.webauthn()
			.finish_passkey_authentication(credential, &challenge.state)?;

		let key = credential_key(result.cred_id())?;
		let row = passkey::Entity::find()
			.filter(passkey::Column::CredentialId.eq(key.as_str()))
			.filter(passkey::Column::UserId.eq(challenge.user_id))
			.one(self.config.db())
			.await?
			.ok_or(AuthError::UnknownCredential)?;

		if let Err(e) = check_counter(row.counter, result.counter()) {
			warn!(passkey.id = %row.id, stored = row.counter, reported = result.counter(), "passkey counter regression");
			return Err(e);
		}

		let mut stored = serde_json::from_str::<Passkey>(&row.credential)?;
		stored.update_credential(&result);

		let mut update: passkey::ActiveModel = row.into();
		update.credential = ActiveValue::Set(serde_json::to_string(&stored)?);
		update.counter = ActiveValue::Set(i64::from(result.counter()));
		update.last_used_at = ActiveValue::Set(Some(utc_now()));
		update.update(self.config.db()).await?;

		let user = user::Entity::find_by_id(challenge.user_id)
			.one(self.config.db())
			.await?
			.ok_or(AuthError::UnknownCredential)?;

		self.session.login(user.clone()).await?;
		debug!(user.id = %user.id, "logged in with passkey");
		Ok(user)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

	fn user(legacy_password: Option<String>) -> user::Model {
		let created = time::macros::datetime!(2024-01-01 00:00);
		user::Model {
			id: Uuid::new_v4(),
			email: "someone@example.com".into(),
			display_name: "Someone".into(),
			legacy_password,
			plex_token: None,
			created_at: created,
			updated_at: created,
		}
	}

	fn statements(db: DatabaseConnection) -> String {
		db.into_transaction_log()
			.iter()
			.map(|t| format!("{t:?}"))
			.collect::<Vec<_>>()
			.join("\n")
	}

	#[tokio::test]
	async fn legacy_password_moves_to_password_table() {
		let hash = bcrypt::hash("correct horse", 4).expect("hash");
		let legacy = user(Some(hash));
		let migrated = user::Model {
			legacy_password: None,
			..legacy.clone()
		};

		let db = MockDatabase::new(DatabaseBackend::Postgres)
			.append_query_results([vec![legacy.clone()]])
			.append_query_results([Vec::<password::Model>::new()])
			.append_exec_results([MockExecResult {
				last_insert_id: 0,
				rows_affected: 1,
			}])
			.append_query_results([vec![migrated]])
			.into_connection();

		let verified = verify_credentials(&db, "Someone@Example.com", "correct horse")
			.await
			.expect("legacy password accepted");
		assert_eq!(verified.id, legacy.id);

		let log = statements(db);
		assert!(log.contains(r#"INSERT INTO \"password\""#));
		assert!(log.contains(r#"UPDATE \"user\""#));
		assert!(log.contains(r#"\"legacy_password\" = $1"#));
	}

	#[tokio::test]
	async fn wrong_legacy_password_is_not_migrated() {
		let hash = bcrypt::hash("correct horse", 4).expect("hash");
		let db = MockDatabase::new(DatabaseBackend::Postgres)
			.append_query_results([vec![user(Some(hash))]])
			.append_query_results([Vec::<password::Model>::new()])
			.into_connection();

		let err = verify_credentials(&db, "someone@example.com", "battery staple")
			.await
			.unwrap_err();
		assert!(matches!(err, AuthError::InvalidCredentials));

		let log = statements(db);
		assert!(!log.contains("INSERT"));
		assert!(!log.contains("UPDATE"));
	}

	#[tokio::test]
	async fn account_without_any_password_is_rejected() {
		let db = MockDatabase::new(DatabaseBackend::Postgres)
			.append_query_results([vec![user(None)]])
			.append_query_results([Vec::<password::Model>::new()])
			.into_connection();

		let err = verify_credentials(&db, "someone@example.com", "anything")
			.await
			.unwrap_err();
		assert!(matches!(err, AuthError::InvalidCredentials));
	}

	#[test]
	fn counter_must_increase_when_reported() {
		assert!(check_counter(0, 0).is_ok());
		assert!(check_counter(5, 0).is_ok());
		assert!(check_counter(5, 6).is_ok());
		assert!(matches!(check_counter(5, 5), Err(AuthError::PossibleClone)));
		assert!(matches!(check_counter(5, 4), Err(AuthError::PossibleClone)));
	}

	#[test]
	fn webauthn_uses_site_host() {
		let url = Url::parse("https://shows.example.com/").unwrap();
		assert!(AuthConfig::webauthn_for(&url, "showtrack").is_ok());
	}
}

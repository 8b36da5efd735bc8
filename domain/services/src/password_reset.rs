use crate::{
	macros::define_service,
	password::{hash_password, PasswordError},
	token::{hash_token, random_token},
	user::{find_by_email, store_password},
	validation::{check_email, check_password, ValidationErrors},
};
use async_trait::async_trait;
use futures::FutureExt;
use sea_orm::{
	ActiveValue, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait,
	QueryFilter, TransactionError, TransactionTrait,
};
use showtrack_entities::{password_reset, session, user};
use showtrack_utils::utc_now;
use std::sync::Arc;
use thiserror::Error;
use time::Duration;
use tracing::{debug, info, instrument};
use url::Url;
use uuid::Uuid;

pub const RESET_TOKEN_LIFETIME: Duration = Duration::hours(1);

#[derive(Debug, Error)]
#[error("failed to send mail: {0}")]
pub struct MailerError(pub String);

/// Outbound mail. Only password reset links are ever sent.
#[async_trait]
pub trait Mailer: Send + Sync {
	async fn send_password_reset(&self, user: &user::Model, link: &Url) -> Result<(), MailerError>;
}

pub type SharedMailer = Arc<dyn Mailer>;

/// Writes the mail to the log instead of sending it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
	async fn send_password_reset(&self, user: &user::Model, link: &Url) -> Result<(), MailerError> {
		info!(to = %user.email, %link, "password reset requested");
		Ok(())
	}
}

define_service! {
	#[derive(Clone)]
	pub struct PasswordResetService {
		pub db: Arc<DatabaseConnection>,
		pub mailer: SharedMailer,
	}
}

#[derive(Debug, Error)]
pub enum PasswordResetError {
	#[error("invalid input: {0}")]
	Validation(#[from] ValidationErrors),

	#[error("reset link is invalid or has expired")]
	InvalidToken,

	#[error(transparent)]
	Mailer(#[from] MailerError),

	#[error(transparent)]
	Url(#[from] url::ParseError),

	#[error(transparent)]
	Password(#[from] PasswordError),

	#[error(transparent)]
	DbErr(#[from] DbErr),
}

impl From<TransactionError<PasswordResetError>> for PasswordResetError {
	fn from(value: TransactionError<PasswordResetError>) -> Self {
		match value {
			TransactionError::Connection(db) => db.into(),
			TransactionError::Transaction(inner) => inner,
		}
	}
}

impl PasswordResetService {
	/// Unknown addresses succeed silently so the form cannot be used to probe
	/// for accounts.
	#[instrument(skip_all)]
	pub async fn request(&self, email: &str, base_url: &Url) -> Result<(), PasswordResetError> {
		let mut errors = ValidationErrors::new();
		check_email(&mut errors, email);
		errors.into_result()?;

		let Some(user) = find_by_email(&*self.db, email).await? else {
			debug!("password reset requested for unknown email");
			return Ok(());
		};

		let token = random_token();
		let now = utc_now();
		password_reset::Entity::insert(password_reset::ActiveModel {
			id: ActiveValue::Set(Uuid::new_v4()),
			user_id: ActiveValue::Set(user.id),
			token_hash: ActiveValue::Set(hash_token(&token)),
			expires_at: ActiveValue::Set(now + RESET_TOKEN_LIFETIME),
			created_at: ActiveValue::Set(now),
		})
		.exec_without_returning(&*self.db)
		.await?;

		let link = base_url.join(&format!("reset-password/{token}"))?;
		self.mailer.send_password_reset(&user, &link).await?;
		Ok(())
	}

	async fn find_valid(&self, token: &str) -> Result<Option<password_reset::Model>, DbErr> {
		password_reset::Entity::find()
			.filter(password_reset::Column::TokenHash.eq(hash_token(token)))
			.filter(password_reset::Column::ExpiresAt.gt(utc_now()))
			.one(&*self.db)
			.await
	}

	pub async fn is_valid(&self, token: &str) -> Result<bool, DbErr> {
		Ok(self.find_valid(token).await?.is_some())
	}

	/// Sets the new password, then drops every reset token and session of the user.
	#[instrument(skip_all)]
	pub async fn reset(&self, token: &str, new_password: String) -> Result<(), PasswordResetError> {
		async fn reset_db(
			tx: &DatabaseTransaction,
			user_id: Uuid,
			hash: String,
		) -> Result<(), PasswordResetError> {
			store_password(tx, user_id, hash).await?;

			password_reset::Entity::delete_many()
				.filter(password_reset::Column::UserId.eq(user_id))
				.exec(tx)
				.await?;

			session::Entity::delete_many()
				.filter(session::Column::UserId.eq(user_id))
				.exec(tx)
				.await?;

			Ok(())
		}

		let mut errors = ValidationErrors::new();
		check_password(&mut errors, "password", &new_password);
		errors.into_result()?;

		let reset = self
			.find_valid(token)
			.await?
			.ok_or(PasswordResetError::InvalidToken)?;

		let hash = hash_password(new_password).await?;
		let user_id = reset.user_id;
		self
			.db
			.transaction(move |tx| reset_db(tx, user_id, hash).boxed())
			.await
			.map_err(PasswordResetError::from)?;

		info!(user.id = %user_id, "password reset");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use sea_orm::{DatabaseBackend, MockDatabase};
	use std::sync::Mutex;

	#[derive(Default)]
	struct RecordingMailer {
		links: Mutex<Vec<String>>,
	}

	#[async_trait]
	impl Mailer for RecordingMailer {
		async fn send_password_reset(&self, _user: &user::Model, link: &Url) -> Result<(), MailerError> {
			self.links.lock().unwrap().push(link.to_string());
			Ok(())
		}
	}

	#[tokio::test]
	async fn unknown_email_sends_nothing() {
		let db = MockDatabase::new(DatabaseBackend::Postgres)
			.append_query_results([Vec::<user::Model>::new()])
			.into_connection();
		let mailer = Arc::new(RecordingMailer::default());
		let service = PasswordResetService {
			db: Arc::new(db),
			mailer: mailer.clone(),
		};

		service
			.request("nobody@example.com", &Url::parse("https://example.com/").unwrap())
			.await
			.expect("request succeeds");

		assert!(mailer.links.lock().unwrap().is_empty());
	}

	#[tokio::test]
	async fn malformed_email_is_a_validation_error() {
		let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
		let service = PasswordResetService {
			db: Arc::new(db),
			mailer: Arc::new(LogMailer),
		};

		let err = service
			.request("not an email", &Url::parse("https://example.com/").unwrap())
			.await
			.unwrap_err();

		match err {
			PasswordResetError::Validation(errors) => assert!(errors.get("email").is_some()),
			other => panic!("unexpected error: {other}"),
		}
	}

	#[tokio::test]
	async fn expired_or_unknown_token_is_rejected() {
		let db = MockDatabase::new(DatabaseBackend::Postgres)
			.append_query_results([Vec::<password_reset::Model>::new()])
			.into_connection();
		let service = PasswordResetService {
			db: Arc::new(db),
			mailer: Arc::new(LogMailer),
		};

		let err = service
			.reset("not-a-token", "long enough password".into())
			.await
			.unwrap_err();

		assert!(matches!(err, PasswordResetError::InvalidToken));
	}
}

use crate::{
	macros::define_service,
	password::{hash_password, verify_password, PasswordError},
	token::random_token,
	validation::{check_email, check_password, normalize_email, ValidationErrors},
};
use futures::FutureExt;
use sea_orm::{
	sea_query::OnConflict, ActiveModelTrait, ActiveValue, ColumnTrait, ConnectionTrait,
	DatabaseConnection, DatabaseTransaction, DbErr, EntityTrait, IsolationLevel, PaginatorTrait,
	QueryFilter, QueryOrder, QuerySelect, TransactionError, TransactionTrait,
};
use showtrack_entities::{invite, passkey, password, user};
use showtrack_utils::utc_now;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

pub const MAX_DISPLAY_NAME_LEN: usize = 100;

define_service! {
	#[derive(Clone)]
	pub struct UserService {
		pub db: Arc<DatabaseConnection>,
	}
}

#[derive(Debug, Error)]
pub enum UserServiceError {
	#[error("invalid input: {0}")]
	Validation(#[from] ValidationErrors),

	#[error("invite is invalid or already used")]
	InvalidInvite,

	#[error("email is already in use")]
	EmailInUse,

	#[error("user not found")]
	NotFound,

	#[error("current password is incorrect")]
	WrongPassword,

	#[error("a passkey is required before the password can be removed")]
	PasskeyRequired,

	#[error("the last passkey cannot be removed while no password is set")]
	LastCredential,

	#[error("passkey not found")]
	PasskeyNotFound,

	#[error(transparent)]
	Password(#[from] PasswordError),

	#[error(transparent)]
	DbErr(#[from] DbErr),
}

impl From<TransactionError<UserServiceError>> for UserServiceError {
	fn from(value: TransactionError<UserServiceError>) -> Self {
		match value {
			TransactionError::Connection(db) => db.into(),
			TransactionError::Transaction(inner) => inner,
		}
	}
}

#[derive(Debug, Clone)]
pub struct NewUser {
	pub invite: Uuid,
	pub email: String,
	pub display_name: String,
	pub password: String,
}

impl NewUser {
	fn validate(&self) -> Result<(), ValidationErrors> {
		let mut errors = ValidationErrors::new();
		check_email(&mut errors, &self.email);

		let display_name = self.display_name.trim();
		if display_name.is_empty() {
			errors.add("display_name", "Display name is required");
		} else if display_name.chars().count() > MAX_DISPLAY_NAME_LEN {
			errors.add(
				"display_name",
				format!("Display name must be at most {MAX_DISPLAY_NAME_LEN} characters"),
			);
		}

		check_password(&mut errors, "password", &self.password);
		errors.into_result()
	}
}

pub(crate) fn can_remove_password(passkeys: u64) -> bool {
	passkeys > 0
}

pub(crate) fn can_delete_passkey(passkeys: u64, has_password: bool) -> bool {
	has_password || passkeys > 1
}

pub(crate) async fn find_by_email<C: ConnectionTrait>(
	db: &C,
	email: &str,
) -> Result<Option<user::Model>, DbErr> {
	user::Entity::find()
		.filter(user::Column::Email.eq(normalize_email(email)))
		.one(db)
		.await
}

async fn user_has_password<C: ConnectionTrait>(db: &C, user: &user::Model) -> Result<bool, DbErr> {
	if user.legacy_password.is_some() {
		return Ok(true);
	}

	Ok(password::Entity::find_by_id(user.id).one(db).await?.is_some())
}

async fn count_passkeys<C: ConnectionTrait>(db: &C, user_id: Uuid) -> Result<u64, DbErr> {
	passkey::Entity::find()
		.filter(passkey::Column::UserId.eq(user_id))
		.count(db)
		.await
}

/// Holds the user row until the transaction ends. Credential changes of one
/// user run one at a time behind it.
async fn lock_user(tx: &DatabaseTransaction, user_id: Uuid) -> Result<user::Model, UserServiceError> {
	user::Entity::find_by_id(user_id)
		.lock_exclusive()
		.one(tx)
		.await?
		.ok_or(UserServiceError::NotFound)
}

/// Stores `hash` as the user's password and drops any legacy hash.
pub(crate) async fn store_password<C: ConnectionTrait>(
	db: &C,
	user_id: Uuid,
	hash: String,
) -> Result<(), DbErr> {
	let now = utc_now();
	password::Entity::insert(password::ActiveModel {
		user_id: ActiveValue::Set(user_id),
		hash: ActiveValue::Set(hash),
		updated_at: ActiveValue::Set(now),
	})
	.on_conflict(
		OnConflict::column(password::Column::UserId)
			.update_columns([password::Column::Hash, password::Column::UpdatedAt])
			.to_owned(),
	)
	.exec_without_returning(db)
	.await?;

	user::ActiveModel {
		id: ActiveValue::Unchanged(user_id),
		legacy_password: ActiveValue::Set(None),
		updated_at: ActiveValue::Set(now),
		..Default::default()
	}
	.update(db)
	.await?;

	Ok(())
}

impl UserService {
	pub async fn get(&self, user_id: Uuid) -> Result<Option<user::Model>, DbErr> {
		user::Entity::find_by_id(user_id).one(&*self.db).await
	}

	pub async fn find_by_plex_token(&self, token: &str) -> Result<Option<user::Model>, DbErr> {
		user::Entity::find()
			.filter(user::Column::PlexToken.eq(token))
			.one(&*self.db)
			.await
	}

	pub async fn passkeys(&self, user_id: Uuid) -> Result<Vec<passkey::Model>, DbErr> {
		passkey::Entity::find()
			.filter(passkey::Column::UserId.eq(user_id))
			.order_by_asc(passkey::Column::CreatedAt)
			.all(&*self.db)
			.await
	}

	pub async fn has_password(&self, user: &user::Model) -> Result<bool, DbErr> {
		user_has_password(&*self.db, user).await
	}

	/// Registers a new account, consuming the invite.
	#[instrument(skip_all, fields(invite = %new_user.invite))]
	pub async fn join(&self, new_user: NewUser) -> Result<user::Model, UserServiceError> {
		async fn join_db(
			tx: &DatabaseTransaction,
			new_user: NewUser,
			hash: String,
		) -> Result<user::Model, UserServiceError> {
			let invite = invite::Entity::find_by_id(new_user.invite)
				.filter(invite::Column::UsedBy.is_null())
				.one(tx)
				.await?
				.ok_or(UserServiceError::InvalidInvite)?;

			if find_by_email(tx, &new_user.email).await?.is_some() {
				return Err(UserServiceError::EmailInUse);
			}

			let now = utc_now();
			let user = user::ActiveModel {
				id: ActiveValue::Set(Uuid::new_v4()),
				email: ActiveValue::Set(normalize_email(&new_user.email)),
				display_name: ActiveValue::Set(new_user.display_name.trim().to_owned()),
				legacy_password: ActiveValue::Set(None),
				plex_token: ActiveValue::Set(None),
				created_at: ActiveValue::Set(now),
				updated_at: ActiveValue::Set(now),
			}
			.insert(tx)
			.await?;

			password::ActiveModel {
				user_id: ActiveValue::Set(user.id),
				hash: ActiveValue::Set(hash),
				updated_at: ActiveValue::Set(now),
			}
			.insert(tx)
			.await?;

			let mut invite: invite::ActiveModel = invite.into();
			invite.used_by = ActiveValue::Set(Some(user.id));
			invite.used_at = ActiveValue::Set(Some(now));
			invite.update(tx).await?;

			Ok(user)
		}

		new_user.validate()?;
		let hash = hash_password(new_user.password.clone()).await?;

		let user = self
			.db
			.transaction_with_config(
				|tx| join_db(tx, new_user, hash).boxed(),
				Some(IsolationLevel::Serializable),
				None,
			)
			.await
			.map_err(UserServiceError::from)?;

		info!(user.id = %user.id, "user joined");
		Ok(user)
	}

	/// Owned rows go with the user through foreign key cascades.
	#[instrument(skip(self))]
	pub async fn delete_account(&self, user_id: Uuid) -> Result<(), UserServiceError> {
		let result = user::Entity::delete_by_id(user_id).exec(&*self.db).await?;
		if result.rows_affected == 0 {
			return Err(UserServiceError::NotFound);
		}

		info!(user.id = %user_id, "account deleted");
		Ok(())
	}

	#[instrument(skip(self))]
	pub async fn generate_plex_token(&self, user_id: Uuid) -> Result<String, UserServiceError> {
		let token = random_token();
		self.set_plex_token(user_id, Some(token.clone())).await?;
		Ok(token)
	}

	#[instrument(skip(self))]
	pub async fn remove_plex_token(&self, user_id: Uuid) -> Result<(), UserServiceError> {
		self.set_plex_token(user_id, None).await
	}

	async fn set_plex_token(
		&self,
		user_id: Uuid,
		token: Option<String>,
	) -> Result<(), UserServiceError> {
		let user = user::Entity::find_by_id(user_id)
			.one(&*self.db)
			.await?
			.ok_or(UserServiceError::NotFound)?;

		let mut user: user::ActiveModel = user.into();
		user.plex_token = ActiveValue::Set(token);
		user.updated_at = ActiveValue::Set(utc_now());
		user.update(&*self.db).await?;
		Ok(())
	}

	/// `current` is only checked when the user already has a password.
	#[instrument(skip_all, fields(user.id = %user.id))]
	pub async fn change_password(
		&self,
		user: &user::Model,
		current: Option<String>,
		new_password: String,
	) -> Result<(), UserServiceError> {
		let mut errors = ValidationErrors::new();
		check_password(&mut errors, "new_password", &new_password);
		errors.into_result()?;

		let existing = match password::Entity::find_by_id(user.id).one(&*self.db).await? {
			Some(row) => Some(row.hash),
			None => user.legacy_password.clone(),
		};

		if let Some(existing) = existing {
			let current = current.unwrap_or_default();
			if !verify_password(current, existing).await? {
				return Err(UserServiceError::WrongPassword);
			}
		}

		let hash = hash_password(new_password).await?;
		store_password(&*self.db, user.id, hash).await?;
		info!("password changed");
		Ok(())
	}

	/// Fails while the account has no passkey to fall back on.
	#[instrument(skip(self))]
	pub async fn remove_password(&self, user_id: Uuid) -> Result<(), UserServiceError> {
		async fn remove_password_db(
			tx: &DatabaseTransaction,
			user_id: Uuid,
		) -> Result<(), UserServiceError> {
			lock_user(tx, user_id).await?;
			if !can_remove_password(count_passkeys(tx, user_id).await?) {
				return Err(UserServiceError::PasskeyRequired);
			}

			password::Entity::delete_by_id(user_id).exec(tx).await?;
			user::ActiveModel {
				id: ActiveValue::Unchanged(user_id),
				legacy_password: ActiveValue::Set(None),
				updated_at: ActiveValue::Set(utc_now()),
				..Default::default()
			}
			.update(tx)
			.await?;

			Ok(())
		}

		self
			.db
			.transaction(|tx| remove_password_db(tx, user_id).boxed())
			.await
			.map_err(UserServiceError::from)?;

		info!("password removed");
		Ok(())
	}

	/// Fails when the passkey is the account's last credential.
	#[instrument(skip_all, fields(user.id = %user.id, passkey.id = %passkey_id))]
	pub async fn delete_passkey(
		&self,
		user: &user::Model,
		passkey_id: Uuid,
	) -> Result<(), UserServiceError> {
		async fn delete_passkey_db(
			tx: &DatabaseTransaction,
			user_id: Uuid,
			passkey_id: Uuid,
		) -> Result<(), UserServiceError> {
			let user = lock_user(tx, user_id).await?;
			let passkey = passkey::Entity::find_by_id(passkey_id)
				.filter(passkey::Column::UserId.eq(user_id))
				.one(tx)
				.await?
				.ok_or(UserServiceError::PasskeyNotFound)?;

			let passkeys = count_passkeys(tx, user_id).await?;
			if !can_delete_passkey(passkeys, user_has_password(tx, &user).await?) {
				return Err(UserServiceError::LastCredential);
			}

			passkey::Entity::delete_by_id(passkey.id).exec(tx).await?;
			Ok(())
		}

		let user_id = user.id;
		self
			.db
			.transaction(|tx| delete_passkey_db(tx, user_id, passkey_id).boxed())
			.await
			.map_err(UserServiceError::from)?;

		info!("passkey deleted");
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use sea_orm::{DatabaseBackend, MockDatabase, Value};
	use std::collections::BTreeMap;

	fn count_row(count: i64) -> BTreeMap<&'static str, Value> {
		BTreeMap::from([("num_items", Value::from(count))])
	}

	#[test]
	fn credential_invariants() {
		assert!(!can_remove_password(0));
		assert!(can_remove_password(1));

		assert!(!can_delete_passkey(1, false));
		assert!(can_delete_passkey(1, true));
		assert!(can_delete_passkey(2, false));
	}

	#[test]
	fn new_user_validation() {
		let mut new_user = NewUser {
			invite: Uuid::new_v4(),
			email: "someone@example.com".into(),
			display_name: "Someone".into(),
			password: "long enough".into(),
		};
		assert!(new_user.validate().is_ok());

		new_user.display_name = "   ".into();
		new_user.password = "short".into();
		let errors = new_user.validate().unwrap_err();
		assert!(errors.get("display_name").is_some());
		assert!(errors.get("password").is_some());
		assert!(errors.get("email").is_none());
	}

	fn user(legacy_password: Option<&str>) -> user::Model {
		let created = time::macros::datetime!(2024-01-01 00:00);
		user::Model {
			id: Uuid::new_v4(),
			email: "someone@example.com".into(),
			display_name: "Someone".into(),
			legacy_password: legacy_password.map(Into::into),
			plex_token: None,
			created_at: created,
			updated_at: created,
		}
	}

	fn statements(db: Arc<DatabaseConnection>) -> Vec<String> {
		Arc::try_unwrap(db)
			.unwrap()
			.into_transaction_log()
			.iter()
			.map(|t| format!("{t:?}"))
			.collect()
	}

	#[tokio::test]
	async fn removing_password_without_passkey_fails() {
		let user = user(None);
		let db = MockDatabase::new(DatabaseBackend::Postgres)
			.append_query_results([vec![user.clone()]])
			.append_query_results([vec![count_row(0)]])
			.into_connection();
		let service = UserService { db: Arc::new(db) };

		let err = service.remove_password(user.id).await.unwrap_err();
		assert!(matches!(err, UserServiceError::PasskeyRequired));

		let log = statements(service.db);
		assert!(log.iter().any(|t| t.contains("FOR UPDATE")));
	}

	#[tokio::test]
	async fn last_passkey_stays_without_password() {
		let user = user(None);
		let created = time::macros::datetime!(2024-01-01 00:00);
		let passkey = passkey::Model {
			id: Uuid::new_v4(),
			user_id: user.id,
			credential_id: "credential".into(),
			name: "Laptop".into(),
			credential: "{}".into(),
			counter: 0,
			created_at: created,
			last_used_at: None,
		};

		let db = MockDatabase::new(DatabaseBackend::Postgres)
			.append_query_results([vec![user.clone()]])
			.append_query_results([vec![passkey.clone()]])
			.append_query_results([vec![count_row(1)]])
			.append_query_results([Vec::<password::Model>::new()])
			.into_connection();
		let service = UserService { db: Arc::new(db) };

		let err = service.delete_passkey(&user, passkey.id).await.unwrap_err();
		assert!(matches!(err, UserServiceError::LastCredential));

		let log = statements(service.db);
		assert!(log.iter().any(|t| t.contains("FOR UPDATE")));
		assert!(!log.iter().any(|t| t.contains("DELETE")));
	}

	#[tokio::test]
	async fn invalid_join_does_not_touch_database() {
		let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
		let service = UserService { db: Arc::new(db) };

		let err = service
			.join(NewUser {
				invite: Uuid::new_v4(),
				email: "nope".into(),
				display_name: "Someone".into(),
				password: "long enough".into(),
			})
			.await
			.unwrap_err();

		assert!(matches!(err, UserServiceError::Validation(_)));
	}
}

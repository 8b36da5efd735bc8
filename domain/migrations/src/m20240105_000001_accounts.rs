use crate::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
	async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.create_table(
				Table::create()
					.table(User::Table)
					.col(
						ColumnDef::new(User::Id)
							.uuid()
							.primary_key()
							.default(PgFunc::gen_random_uuid())
							.not_null(),
					)
					.col(ColumnDef::new(User::Email).string().not_null())
					.col(ColumnDef::new(User::DisplayName).string().not_null())
					.col(ColumnDef::new(User::LegacyPassword).string().null())
					.col(ColumnDef::new(User::PlexToken).string().null())
					.col(
						ColumnDef::new(User::CreatedAt)
							.timestamp()
							.not_null()
							.default(PgTimeFunc::utc_now()),
					)
					.col(
						ColumnDef::new(User::UpdatedAt)
							.timestamp()
							.not_null()
							.default(PgTimeFunc::utc_now()),
					)
					.index(
						Index::create()
							.name("uq-user-email")
							.col(User::Email)
							.unique(),
					)
					.index(
						Index::create()
							.name("uq-user-plextoken")
							.col(User::PlexToken)
							.unique(),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(Password::Table)
					.col(
						ColumnDef::new(Password::UserId)
							.uuid()
							.primary_key()
							.not_null(),
					)
					.col(ColumnDef::new(Password::Hash).string().not_null())
					.col(
						ColumnDef::new(Password::UpdatedAt)
							.timestamp()
							.not_null()
							.default(PgTimeFunc::utc_now()),
					)
					.foreign_key(
						ForeignKey::create()
							.name("fk-password-user")
							.from(Password::Table, Password::UserId)
							.to(User::Table, User::Id)
							.on_update(ForeignKeyAction::Cascade)
							.on_delete(ForeignKeyAction::Cascade),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(Passkey::Table)
					.col(
						ColumnDef::new(Passkey::Id)
							.uuid()
							.primary_key()
							.default(PgFunc::gen_random_uuid())
							.not_null(),
					)
					.col(ColumnDef::new(Passkey::UserId).uuid().not_null())
					.col(ColumnDef::new(Passkey::CredentialId).string().not_null())
					.col(ColumnDef::new(Passkey::Name).string().not_null())
					.col(ColumnDef::new(Passkey::Credential).text().not_null())
					.col(
						ColumnDef::new(Passkey::Counter)
							.big_integer()
							.not_null()
							.default(0),
					)
					.col(ColumnDef::new(Passkey::CreatedAt).timestamp().not_null())
					.col(ColumnDef::new(Passkey::LastUsedAt).timestamp().null())
					.index(
						Index::create()
							.name("uq-passkey-credentialid")
							.col(Passkey::CredentialId)
							.unique(),
					)
					.foreign_key(
						ForeignKey::create()
							.name("fk-passkey-user")
							.from(Passkey::Table, Passkey::UserId)
							.to(User::Table, User::Id)
							.on_update(ForeignKeyAction::Cascade)
							.on_delete(ForeignKeyAction::Cascade),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name(Indices::PasskeyUserId)
					.table(Passkey::Table)
					.col(Passkey::UserId)
					.index_type(IndexType::Hash)
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(Session::Table)
					.col(
						ColumnDef::new(Session::Id)
							.uuid()
							.primary_key()
							.default(PgFunc::gen_random_uuid()),
					)
					.col(ColumnDef::new(Session::CreateTime).timestamp().not_null())
					.col(ColumnDef::new(Session::AccessTime).timestamp().not_null())
					.col(ColumnDef::new(Session::ExpiryTime).timestamp().not_null())
					.col(ColumnDef::new(Session::UserId).uuid().null())
					.foreign_key(
						ForeignKey::create()
							.name("fk-session-user")
							.from(Session::Table, Session::UserId)
							.to(User::Table, User::Id)
							.on_update(ForeignKeyAction::Cascade)
							.on_delete(ForeignKeyAction::Cascade),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name(Indices::SessionUserId)
					.table(Session::Table)
					.col(Session::UserId)
					.index_type(IndexType::Hash)
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name(Indices::SessionExpiryTime)
					.table(Session::Table)
					.col(Session::ExpiryTime)
					.index_type(IndexType::BTree)
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(Invite::Table)
					.col(
						ColumnDef::new(Invite::Id)
							.uuid()
							.primary_key()
							.default(PgFunc::gen_random_uuid())
							.not_null(),
					)
					.col(ColumnDef::new(Invite::CreatedBy).uuid().null())
					.col(ColumnDef::new(Invite::UsedBy).uuid().null())
					.col(
						ColumnDef::new(Invite::CreatedAt)
							.timestamp()
							.not_null()
							.default(PgTimeFunc::utc_now()),
					)
					.col(ColumnDef::new(Invite::UsedAt).timestamp().null())
					.foreign_key(
						ForeignKey::create()
							.name("fk-invite-createdby")
							.from(Invite::Table, Invite::CreatedBy)
							.to(User::Table, User::Id)
							.on_update(ForeignKeyAction::Cascade)
							.on_delete(ForeignKeyAction::SetNull),
					)
					.foreign_key(
						ForeignKey::create()
							.name("fk-invite-usedby")
							.from(Invite::Table, Invite::UsedBy)
							.to(User::Table, User::Id)
							.on_update(ForeignKeyAction::Cascade)
							.on_delete(ForeignKeyAction::SetNull),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(PasswordReset::Table)
					.col(
						ColumnDef::new(PasswordReset::Id)
							.uuid()
							.primary_key()
							.default(PgFunc::gen_random_uuid())
							.not_null(),
					)
					.col(ColumnDef::new(PasswordReset::UserId).uuid().not_null())
					.col(ColumnDef::new(PasswordReset::TokenHash).string().not_null())
					.col(
						ColumnDef::new(PasswordReset::ExpiresAt)
							.timestamp()
							.not_null(),
					)
					.col(
						ColumnDef::new(PasswordReset::CreatedAt)
							.timestamp()
							.not_null()
							.default(PgTimeFunc::utc_now()),
					)
					.index(
						Index::create()
							.name("uq-passwordreset-tokenhash")
							.col(PasswordReset::TokenHash)
							.unique(),
					)
					.foreign_key(
						ForeignKey::create()
							.name("fk-passwordreset-user")
							.from(PasswordReset::Table, PasswordReset::UserId)
							.to(User::Table, User::Id)
							.on_update(ForeignKeyAction::Cascade)
							.on_delete(ForeignKeyAction::Cascade),
					)
					.to_owned(),
			)
			.await?;

		Ok(())
	}

	async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.drop_table(Table::drop().table(PasswordReset::Table).to_owned())
			.await?;

		manager
			.drop_table(Table::drop().table(Invite::Table).to_owned())
			.await?;

		manager
			.drop_index(Index::drop().name(Indices::SessionExpiryTime).to_owned())
			.await?;

		manager
			.drop_index(Index::drop().name(Indices::SessionUserId).to_owned())
			.await?;

		manager
			.drop_table(Table::drop().table(Session::Table).to_owned())
			.await?;

		manager
			.drop_index(Index::drop().name(Indices::PasskeyUserId).to_owned())
			.await?;

		manager
			.drop_table(Table::drop().table(Passkey::Table).to_owned())
			.await?;

		manager
			.drop_table(Table::drop().table(Password::Table).to_owned())
			.await?;

		manager
			.drop_table(Table::drop().table(User::Table).to_owned())
			.await?;

		Ok(())
	}
}

enum Indices {
	PasskeyUserId,
	SessionUserId,
	SessionExpiryTime,
}

impl From<Indices> for String {
	fn from(val: Indices) -> Self {
		match val {
			Indices::PasskeyUserId => "ix-passkey-userid".into(),
			Indices::SessionUserId => "ix-session-userid".into(),
			Indices::SessionExpiryTime => "ix-session-etime".into(),
		}
	}
}

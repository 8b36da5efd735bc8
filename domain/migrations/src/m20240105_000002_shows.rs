use crate::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
	async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.create_table(
				Table::create()
					.table(Show::Table)
					.col(ColumnDef::new(Show::Id).uuid().not_null().primary_key())
					.col(ColumnDef::new(Show::CatalogId).integer().not_null())
					.col(ColumnDef::new(Show::Name).string().not_null())
					.col(ColumnDef::new(Show::Premiered).date().null())
					.col(ColumnDef::new(Show::Ended).date().null())
					.col(ColumnDef::new(Show::Rating).double().null())
					.col(ColumnDef::new(Show::ImageUrl).string().null())
					.col(ColumnDef::new(Show::Summary).text().null())
					.col(ColumnDef::new(Show::ImdbId).string().null())
					.col(
						ColumnDef::new(Show::CreatedAt)
							.timestamp()
							.not_null()
							.default(PgTimeFunc::utc_now()),
					)
					.col(
						ColumnDef::new(Show::UpdatedAt)
							.timestamp()
							.not_null()
							.default(PgTimeFunc::utc_now()),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name(Indices::ShowCatalogId)
					.table(Show::Table)
					.col(Show::CatalogId)
					.unique()
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(Episode::Table)
					.col(ColumnDef::new(Episode::Id).uuid().not_null().primary_key())
					.col(ColumnDef::new(Episode::ShowId).uuid().not_null())
					.col(ColumnDef::new(Episode::CatalogId).integer().not_null())
					.col(ColumnDef::new(Episode::Name).string().not_null())
					.col(ColumnDef::new(Episode::Season).integer().not_null())
					.col(ColumnDef::new(Episode::Number).integer().not_null())
					.col(ColumnDef::new(Episode::AirDate).timestamp().null())
					.col(ColumnDef::new(Episode::Runtime).integer().null())
					.col(ColumnDef::new(Episode::Summary).text().null())
					.col(ColumnDef::new(Episode::ImageUrl).string().null())
					.col(
						ColumnDef::new(Episode::CreatedAt)
							.timestamp()
							.not_null()
							.default(PgTimeFunc::utc_now()),
					)
					.col(
						ColumnDef::new(Episode::UpdatedAt)
							.timestamp()
							.not_null()
							.default(PgTimeFunc::utc_now()),
					)
					.foreign_key(
						ForeignKey::create()
							.name(ForeignKeys::EpisodeShowId)
							.from(Episode::Table, Episode::ShowId)
							.to(Show::Table, Show::Id)
							.on_update(ForeignKeyAction::Cascade)
							.on_delete(ForeignKeyAction::Cascade),
					)
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name(Indices::EpisodeCatalogId)
					.table(Episode::Table)
					.col(Episode::CatalogId)
					.unique()
					.to_owned(),
			)
			.await?;

		manager
			.create_index(
				Index::create()
					.name(Indices::EpisodeShowIdAirDate)
					.table(Episode::Table)
					.col(Episode::ShowId)
					.col(Episode::AirDate)
					.to_owned(),
			)
			.await?;

		manager
			.create_table(
				Table::create()
					.table(ShowOnUser::Table)
					.col(ColumnDef::new(ShowOnUser::Id).uuid().not_null().primary_key())
					.col(ColumnDef::new(ShowOnUser::ShowId).uuid().not_null())
					.col(ColumnDef::new(ShowOnUser::UserId).uuid().not_null())
					.col(
						ColumnDef::new(ShowOnUser::Archived)
							.boolean()
							.not_null()
							.default(false),
					)
					.col(
						ColumnDef::new(ShowOnUser::CreatedAt)
							.timestamp()
							.not_null()
							.default(PgTimeFunc::utc_now()),
					)
					.index(
						// a user subscribes to a show at most once
						Index::create()
							.name("uq-showonuser-show-user")
							.col(ShowOnUser::ShowId)
							.col(ShowOnUser::UserId)
							.unique(),
					)
					.foreign_key(
						ForeignKey::create()
							.name(ForeignKeys::ShowOnUserShowId)
							.from(ShowOnUser::Table, ShowOnUser::ShowId)
							.to(Show::Table, Show::Id)
							.on_update(ForeignKeyAction::Cascade)
							.on_delete(ForeignKeyAction::Cascade),
					)
					.foreign_key(
						ForeignKey::create()
							.name(ForeignKeys::ShowOnUserUserId)
							.from(ShowOnUser::Table, ShowOnUser::UserId)
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
					.table(EpisodeOnUser::Table)
					.col(
						ColumnDef::new(EpisodeOnUser::Id)
							.uuid()
							.not_null()
							.primary_key(),
					)
					.col(ColumnDef::new(EpisodeOnUser::EpisodeId).uuid().not_null())
					.col(ColumnDef::new(EpisodeOnUser::ShowId).uuid().not_null())
					.col(ColumnDef::new(EpisodeOnUser::UserId).uuid().not_null())
					.col(
						ColumnDef::new(EpisodeOnUser::Ignored)
							.boolean()
							.not_null()
							.default(false),
					)
					.col(
						ColumnDef::new(EpisodeOnUser::CreatedAt)
							.timestamp()
							.not_null()
							.default(PgTimeFunc::utc_now()),
					)
					.col(
						ColumnDef::new(EpisodeOnUser::UpdatedAt)
							.timestamp()
							.not_null()
							.default(PgTimeFunc::utc_now()),
					)
					.index(
						// one watch record per episode and user
						Index::create()
							.name("uq-episodeonuser-episode-show-user")
							.col(EpisodeOnUser::EpisodeId)
							.col(EpisodeOnUser::ShowId)
							.col(EpisodeOnUser::UserId)
							.unique(),
					)
					.foreign_key(
						ForeignKey::create()
							.name(ForeignKeys::EpisodeOnUserEpisodeId)
							.from(EpisodeOnUser::Table, EpisodeOnUser::EpisodeId)
							.to(Episode::Table, Episode::Id)
							.on_update(ForeignKeyAction::Cascade)
							.on_delete(ForeignKeyAction::Cascade),
					)
					.foreign_key(
						ForeignKey::create()
							.name(ForeignKeys::EpisodeOnUserShowId)
							.from(EpisodeOnUser::Table, EpisodeOnUser::ShowId)
							.to(Show::Table, Show::Id)
							.on_update(ForeignKeyAction::Cascade)
							.on_delete(ForeignKeyAction::Cascade),
					)
					.foreign_key(
						ForeignKey::create()
							.name(ForeignKeys::EpisodeOnUserUserId)
							.from(EpisodeOnUser::Table, EpisodeOnUser::UserId)
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
					.name(Indices::EpisodeOnUserUserIdCreatedAt)
					.table(EpisodeOnUser::Table)
					.col(EpisodeOnUser::UserId)
					.col(EpisodeOnUser::CreatedAt)
					.to_owned(),
			)
			.await?;

		Ok(())
	}

	async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
		manager
			.drop_index(
				Index::drop()
					.name(Indices::EpisodeOnUserUserIdCreatedAt)
					.to_owned(),
			)
			.await?;

		manager
			.drop_table(Table::drop().table(EpisodeOnUser::Table).to_owned())
			.await?;

		manager
			.drop_table(Table::drop().table(ShowOnUser::Table).to_owned())
			.await?;

		manager
			.drop_index(Index::drop().name(Indices::EpisodeShowIdAirDate).to_owned())
			.await?;

		manager
			.drop_index(Index::drop().name(Indices::EpisodeCatalogId).to_owned())
			.await?;

		manager
			.drop_table(Table::drop().table(Episode::Table).to_owned())
			.await?;

		manager
			.drop_index(Index::drop().name(Indices::ShowCatalogId).to_owned())
			.await?;

		manager
			.drop_table(Table::drop().table(Show::Table).to_owned())
			.await?;

		Ok(())
	}
}

enum Indices {
	ShowCatalogId,
	EpisodeCatalogId,
	EpisodeShowIdAirDate,
	EpisodeOnUserUserIdCreatedAt,
}

impl From<Indices> for String {
	fn from(val: Indices) -> Self {
		match val {
			Indices::ShowCatalogId => "ix-show-catalogid".to_owned(),
			Indices::EpisodeCatalogId => "ix-episode-catalogid".to_owned(),
			Indices::EpisodeShowIdAirDate => "ix-episode-showid-airdate".to_owned(),
			Indices::EpisodeOnUserUserIdCreatedAt => "ix-episodeonuser-userid-createdat".to_owned(),
		}
	}
}

enum ForeignKeys {
	EpisodeShowId,
	ShowOnUserShowId,
	ShowOnUserUserId,
	EpisodeOnUserEpisodeId,
	EpisodeOnUserShowId,
	EpisodeOnUserUserId,
}

impl From<ForeignKeys> for String {
	fn from(val: ForeignKeys) -> Self {
		match val {
			ForeignKeys::EpisodeShowId => "fk-episode-showid".to_owned(),
			ForeignKeys::ShowOnUserShowId => "fk-showonuser-showid".to_owned(),
			ForeignKeys::ShowOnUserUserId => "fk-showonuser-userid".to_owned(),
			ForeignKeys::EpisodeOnUserEpisodeId => "fk-episodeonuser-episodeid".to_owned(),
			ForeignKeys::EpisodeOnUserShowId => "fk-episodeonuser-showid".to_owned(),
			ForeignKeys::EpisodeOnUserUserId => "fk-episodeonuser-userid".to_owned(),
		}
	}
}

use crate::{macros::define_service, stats::unwatched_count};
use futures::{future::BoxFuture, FutureExt};
use sea_orm::{
	sea_query::{Expr, OnConflict},
	ActiveModelTrait, ActiveValue, ColumnTrait, DatabaseConnection, DatabaseTransaction, DbErr,
	EntityTrait, FromQueryResult, JoinType, QueryFilter, QueryOrder, QuerySelect, RelationTrait,
	TransactionError, TransactionTrait, TryIntoModel,
};
use showtrack_entities::{episode, episode_on_user, show, show_on_user};
use showtrack_utils::{utc_now, ActiveValueExt, OffsetDateTimeExt};
use std::{
	collections::{BTreeMap, HashMap, HashSet},
	sync::Arc,
};
use thiserror::Error;
use time::PrimitiveDateTime;
use tracing::{debug, info, instrument};
use tvmaze_client::{SearchResult, TvMazeClient, TvMazeError};
use uuid::Uuid;

define_service! {
	#[derive(Clone)]
	pub struct ShowService {
		pub db: Arc<DatabaseConnection>,
		pub catalog: Arc<TvMazeClient>,
	}
}

#[derive(Debug, Error)]
pub enum ShowServiceError {
	#[error("show {0} not found in the catalog")]
	NotInCatalog(u32),

	#[error("show not found: {0}")]
	NotFound(Uuid),

	#[error("not subscribed to show {0}")]
	NotSubscribed(Uuid),

	#[error(transparent)]
	DbErr(#[from] DbErr),

	#[error(transparent)]
	Catalog(#[from] TvMazeError),
}

impl From<TransactionError<ShowServiceError>> for ShowServiceError {
	fn from(value: TransactionError<ShowServiceError>) -> Self {
		match value {
			TransactionError::Connection(db) => db.into(),
			TransactionError::Transaction(inner) => inner,
		}
	}
}

pub struct ShowWithEpisodes {
	pub show: show::Model,
	pub episodes: Vec<episode::Model>,
}

impl ShowWithEpisodes {
	pub fn new(show: show::Model, episodes: Vec<episode::Model>) -> Self {
		Self { show, episodes }
	}
}

/// A subscribed show as listed on the user's show page.
#[derive(Debug, Clone)]
pub struct UserShow {
	pub show: show::Model,
	pub archived: bool,
	pub unwatched: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
	Unwatched,
	Watched(PrimitiveDateTime),
	Ignored,
}

#[derive(Debug, Clone)]
pub struct EpisodeWithState {
	pub episode: episode::Model,
	pub aired: bool,
	pub state: WatchState,
}

#[derive(Debug, Clone)]
pub struct Season {
	pub number: i32,
	pub episodes: Vec<EpisodeWithState>,
}

impl Season {
	pub fn is_fully_watched(&self) -> bool {
		self
			.episodes
			.iter()
			.filter(|e| e.aired)
			.all(|e| e.state != WatchState::Unwatched)
	}
}

pub struct ShowDetail {
	pub show: show::Model,
	pub subscription: Option<show_on_user::Model>,
	pub seasons: Vec<Season>,
	pub unwatched: u64,
}

#[derive(Debug, FromQueryResult)]
struct ShowCount {
	show_id: Uuid,
	count: i64,
}

#[derive(Debug, FromQueryResult)]
struct ShowRecordCount {
	show_id: Uuid,
	ignored: bool,
	count: i64,
}

fn to_i32(value: u32) -> i32 {
	i32::try_from(value).unwrap_or(i32::MAX)
}

/// Splits a show's episodes into seasons, ordered by season and episode number.
pub(crate) fn group_seasons(
	episodes: Vec<episode::Model>,
	records: &[episode_on_user::Model],
	now: PrimitiveDateTime,
) -> Vec<Season> {
	let states = records
		.iter()
		.map(|r| {
			let state = if r.ignored {
				WatchState::Ignored
			} else {
				WatchState::Watched(r.created_at)
			};
			(r.episode_id, state)
		})
		.collect::<HashMap<_, _>>();

	let mut seasons = BTreeMap::<i32, Vec<EpisodeWithState>>::new();
	for episode in episodes {
		let state = states
			.get(&episode.id)
			.copied()
			.unwrap_or(WatchState::Unwatched);

		seasons
			.entry(episode.season)
			.or_default()
			.push(EpisodeWithState {
				aired: episode.has_aired(now),
				episode,
				state,
			});
	}

	seasons
		.into_iter()
		.map(|(number, mut episodes)| {
			episodes.sort_by_key(|e| e.episode.number);
			Season { number, episodes }
		})
		.collect()
}

impl ShowService {
	#[instrument(skip(self))]
	pub async fn search(&self, query: &str) -> Result<Vec<SearchResult>, ShowServiceError> {
		let query = query.trim();
		if query.is_empty() {
			return Ok(Vec::new());
		}

		Ok(self.catalog.search_shows(query).await?)
	}

	/// Catalog ids of every show the user is subscribed to, archived or not.
	pub async fn subscribed_catalog_ids(&self, user_id: Uuid) -> Result<HashSet<i32>, DbErr> {
		let ids = show::Entity::find()
			.select_only()
			.column(show::Column::CatalogId)
			.join(JoinType::InnerJoin, show::Relation::ShowOnUser.def())
			.filter(show_on_user::Column::UserId.eq(user_id))
			.into_tuple::<i32>()
			.all(&*self.db)
			.await?;

		Ok(ids.into_iter().collect())
	}

	/// Imports the show from the catalog (or refreshes it) and subscribes the user.
	/// Re-adding an archived show unarchives it.
	#[instrument(skip(self))]
	pub async fn add_show(
		&self,
		user_id: Uuid,
		catalog_id: u32,
	) -> Result<show::Model, ShowServiceError> {
		let synced = self
			.sync_from_catalog(catalog_id, None)
			.await?
			.ok_or(ShowServiceError::NotInCatalog(catalog_id))?;

		let subscription = show_on_user::ActiveModel {
			id: ActiveValue::Set(Uuid::new_v4()),
			show_id: ActiveValue::Set(synced.show.id),
			user_id: ActiveValue::Set(user_id),
			archived: ActiveValue::Set(false),
			created_at: ActiveValue::Set(utc_now()),
		};

		show_on_user::Entity::insert(subscription)
			.on_conflict(
				OnConflict::columns([show_on_user::Column::ShowId, show_on_user::Column::UserId])
					.update_column(show_on_user::Column::Archived)
					.to_owned(),
			)
			.exec_without_returning(&*self.db)
			.await?;

		info!(show.id = %synced.show.id, show.name = %synced.show.name, "user subscribed to show");
		Ok(synced.show)
	}

	pub async fn all_shows(&self) -> Result<Vec<show::Model>, DbErr> {
		show::Entity::find()
			.order_by_asc(show::Column::UpdatedAt)
			.all(&*self.db)
			.await
	}

	pub async fn get_show(&self, show_id: Uuid) -> Result<Option<show::Model>, DbErr> {
		show::Entity::find_by_id(show_id).one(&*self.db).await
	}

	/// Fetches a show and its episodes from the catalog and upserts them.
	/// Episodes that disappeared from the catalog are deleted together with
	/// their watch records.
	pub async fn sync_from_catalog(
		&self,
		catalog_id: u32,
		transaction: Option<&DatabaseTransaction>,
	) -> Result<Option<ShowWithEpisodes>, ShowServiceError> {
		fn episode_model(
			id: Uuid,
			show_id: Uuid,
			now: PrimitiveDateTime,
			update: tvmaze_client::Episode,
		) -> episode::ActiveModel {
			use sea_orm::ActiveValue::*;

			episode::ActiveModel {
				id: Set(id),
				show_id: Set(show_id),
				catalog_id: Set(to_i32(update.id)),
				name: Set(update.name),
				season: Set(to_i32(update.season)),
				number: Set(to_i32(update.number)),
				air_date: Set(update.aired_at.map(OffsetDateTimeExt::into_primitive_utc)),
				runtime: Set(update.runtime.map(to_i32)),
				summary: Set(update.summary),
				image_url: Set(update.image),
				created_at: Set(now),
				updated_at: Set(now),
			}
		}

		async fn insert_episodes_db(
			tx: &DatabaseTransaction,
			show_id: Uuid,
			now: PrimitiveDateTime,
			episodes: impl IntoIterator<Item = tvmaze_client::Episode>,
		) -> Result<Vec<episode::Model>, ShowServiceError> {
			let (ids, episodes): (Vec<_>, Vec<_>) = episodes
				.into_iter()
				.map(|update| {
					let episode_id = Uuid::new_v4();
					(episode_id, episode_model(episode_id, show_id, now, update))
				})
				.unzip();

			episode::Entity::insert_many(episodes)
				.on_empty_do_nothing()
				.exec(tx)
				.await?;

			let episodes = episode::Entity::find()
				.filter(episode::Column::Id.is_in(ids))
				.all(tx)
				.await?;

			Ok(episodes)
		}

		async fn insert_show_db(
			tx: &DatabaseTransaction,
			update: tvmaze_client::ShowWithEpisodes,
		) -> Result<ShowWithEpisodes, ShowServiceError> {
			use sea_orm::ActiveValue::*;

			let now = utc_now();
			let show = show::ActiveModel {
				id: Set(Uuid::new_v4()),
				catalog_id: Set(to_i32(update.show.id)),
				name: Set(update.show.name),
				premiered: Set(update.show.premiered),
				ended: Set(update.show.ended),
				rating: Set(update.show.rating),
				image_url: Set(update.show.image),
				summary: Set(update.show.summary),
				imdb_id: Set(update.show.imdb_id),
				created_at: Set(now),
				updated_at: Set(now),
			};

			let show = show.insert(tx).await?;
			let episodes = insert_episodes_db(tx, show.id, now, update.episodes).await?;

			Ok(ShowWithEpisodes::new(show, episodes))
		}

		async fn update_show_db(
			tx: &DatabaseTransaction,
			update: tvmaze_client::ShowWithEpisodes,
			show: show::Model,
			episodes: Vec<episode::Model>,
		) -> Result<ShowWithEpisodes, ShowServiceError> {
			let now = utc_now();
			let rating_changed = show.rating != update.show.rating;
			let mut show: show::ActiveModel = show.into();
			show.name.update(update.show.name);
			show.premiered.update(update.show.premiered);
			show.ended.update(update.show.ended);
			if rating_changed {
				show.rating = ActiveValue::Set(update.show.rating);
			}
			if let Some(image) = update.show.image {
				show.image_url.update(Some(image));
			}
			show.summary.update(update.show.summary);
			show.imdb_id.update(update.show.imdb_id);

			let show = if show.is_changed() {
				show.updated_at = ActiveValue::Set(now);
				show.update(tx).await?
			} else {
				show.try_into_model()?
			};

			let old_episodes = episodes;
			let mut episodes = Vec::with_capacity(update.episodes.len());
			let mut to_delete = Vec::new();

			let mut updates = update
				.episodes
				.into_iter()
				.map(|e| (to_i32(e.id), e))
				.collect::<BTreeMap<_, _>>();

			for episode in old_episodes {
				match updates.remove(&episode.catalog_id) {
					Some(update) => {
						let mut episode: episode::ActiveModel = episode.into();
						episode.name.update(update.name);
						episode.season.update(to_i32(update.season));
						episode.number.update(to_i32(update.number));
						episode
							.air_date
							.update(update.aired_at.map(OffsetDateTimeExt::into_primitive_utc));
						episode.runtime.update(update.runtime.map(to_i32));
						episode.summary.update(update.summary);
						if let Some(image) = update.image {
							episode.image_url.update(Some(image));
						}

						let episode = if episode.is_changed() {
							episode.updated_at = ActiveValue::Set(now);
							episode.update(tx).await?
						} else {
							episode.try_into_model()?
						};
						episodes.push(episode);
					}
					None => to_delete.push(episode.id),
				}
			}

			if !updates.is_empty() {
				episodes.extend(insert_episodes_db(tx, show.id, now, updates.into_values()).await?);
			}

			if !to_delete.is_empty() {
				debug!(count = to_delete.len(), "removing episodes missing from the catalog");
				episode::Entity::delete_many()
					.filter(episode::Column::Id.is_in(to_delete))
					.exec(tx)
					.await?;
			}

			episodes.sort_by_key(|e| (e.season, e.number));
			Ok(ShowWithEpisodes::new(show, episodes))
		}

		let tx = match transaction {
			None => {
				fn run_in_transaction(
					service: ShowService,
					catalog_id: u32,
					transaction: &DatabaseTransaction,
				) -> BoxFuture<'_, Result<Option<ShowWithEpisodes>, ShowServiceError>> {
					async move {
						service
							.sync_from_catalog(catalog_id, Some(transaction))
							.await
					}
					.boxed()
				}

				let self_clone = self.clone();
				return self
					.db
					.transaction(move |tx| run_in_transaction(self_clone, catalog_id, tx))
					.await
					.map_err(ShowServiceError::from);
			}
			Some(tx) => tx,
		};

		let from_catalog = match self.catalog.get_show_with_episodes(catalog_id).await? {
			None => return Ok(None),
			Some(v) => v,
		};

		let show = show::Entity::find()
			.filter(show::Column::CatalogId.eq(to_i32(catalog_id)))
			.one(tx)
			.await?;

		let synced = match show {
			None => insert_show_db(tx, from_catalog).await?,
			Some(show) => {
				let episodes = episode::Entity::find()
					.filter(episode::Column::ShowId.eq(show.id))
					.all(tx)
					.await?;

				update_show_db(tx, from_catalog, show, episodes).await?
			}
		};

		Ok(Some(synced))
	}

	#[instrument(skip(self))]
	pub async fn list_for_user(
		&self,
		user_id: Uuid,
		archived: bool,
	) -> Result<Vec<UserShow>, DbErr> {
		let subscriptions = show_on_user::Entity::find()
			.filter(show_on_user::Column::UserId.eq(user_id))
			.filter(show_on_user::Column::Archived.eq(archived))
			.find_also_related(show::Entity)
			.order_by_asc(show::Column::Name)
			.all(&*self.db)
			.await?;

		let ids = subscriptions
			.iter()
			.map(|(s, _)| s.show_id)
			.collect::<Vec<_>>();

		if ids.is_empty() {
			return Ok(Vec::new());
		}

		let now = utc_now();
		let (aired, records) = futures::try_join!(
			episode::Entity::find()
				.select_only()
				.column(episode::Column::ShowId)
				.column_as(episode::Column::Id.count(), "count")
				.filter(episode::Column::ShowId.is_in(ids.clone()))
				.filter(episode::Column::AirDate.lte(now))
				.group_by(episode::Column::ShowId)
				.into_model::<ShowCount>()
				.all(&*self.db),
			episode_on_user::Entity::find()
				.select_only()
				.column(episode_on_user::Column::ShowId)
				.column(episode_on_user::Column::Ignored)
				.column_as(episode_on_user::Column::Id.count(), "count")
				.join(JoinType::InnerJoin, episode_on_user::Relation::Episode.def())
				.filter(episode_on_user::Column::UserId.eq(user_id))
				.filter(episode_on_user::Column::ShowId.is_in(ids))
				.filter(episode::Column::AirDate.lte(now))
				.group_by(episode_on_user::Column::ShowId)
				.group_by(episode_on_user::Column::Ignored)
				.into_model::<ShowRecordCount>()
				.all(&*self.db),
		)?;

		let aired = aired
			.into_iter()
			.map(|c| (c.show_id, c.count.max(0) as u64))
			.collect::<HashMap<_, _>>();

		let mut recorded = HashMap::<Uuid, (u64, u64)>::new();
		for row in records {
			let entry = recorded.entry(row.show_id).or_default();
			let count = row.count.max(0) as u64;
			if row.ignored {
				entry.1 += count;
			} else {
				entry.0 += count;
			}
		}

		let shows = subscriptions
			.into_iter()
			.filter_map(|(subscription, show)| {
				let show = show?;
				let (watched, ignored) = recorded.get(&show.id).copied().unwrap_or_default();
				let aired = aired.get(&show.id).copied().unwrap_or_default();
				Some(UserShow {
					archived: subscription.archived,
					unwatched: unwatched_count(aired, watched, ignored),
					show,
				})
			})
			.collect();

		Ok(shows)
	}

	#[instrument(skip(self))]
	pub async fn detail(
		&self,
		user_id: Uuid,
		show_id: Uuid,
	) -> Result<Option<ShowDetail>, DbErr> {
		let Some(show) = show::Entity::find_by_id(show_id).one(&*self.db).await? else {
			return Ok(None);
		};

		let (subscription, episodes, records) = futures::try_join!(
			show_on_user::Entity::find()
				.filter(show_on_user::Column::ShowId.eq(show_id))
				.filter(show_on_user::Column::UserId.eq(user_id))
				.one(&*self.db),
			episode::Entity::find()
				.filter(episode::Column::ShowId.eq(show_id))
				.order_by_asc(episode::Column::Season)
				.order_by_asc(episode::Column::Number)
				.all(&*self.db),
			episode_on_user::Entity::find()
				.filter(episode_on_user::Column::ShowId.eq(show_id))
				.filter(episode_on_user::Column::UserId.eq(user_id))
				.all(&*self.db),
		)?;

		let seasons = group_seasons(episodes, &records, utc_now());
		let unwatched = seasons
			.iter()
			.flat_map(|s| s.episodes.iter())
			.filter(|e| e.aired && e.state == WatchState::Unwatched)
			.count() as u64;

		Ok(Some(ShowDetail {
			show,
			subscription,
			seasons,
			unwatched,
		}))
	}

	#[instrument(skip(self))]
	pub async fn set_archived(
		&self,
		user_id: Uuid,
		show_id: Uuid,
		archived: bool,
	) -> Result<(), ShowServiceError> {
		let result = show_on_user::Entity::update_many()
			.col_expr(show_on_user::Column::Archived, Expr::value(archived))
			.filter(show_on_user::Column::ShowId.eq(show_id))
			.filter(show_on_user::Column::UserId.eq(user_id))
			.exec(&*self.db)
			.await?;

		if result.rows_affected == 0 {
			return Err(ShowServiceError::NotSubscribed(show_id));
		}

		Ok(())
	}

	/// Unsubscribes the user and drops their watch records for the show.
	#[instrument(skip(self))]
	pub async fn remove(&self, user_id: Uuid, show_id: Uuid) -> Result<(), ShowServiceError> {
		async fn remove_db(
			tx: &DatabaseTransaction,
			user_id: Uuid,
			show_id: Uuid,
		) -> Result<(), ShowServiceError> {
			let result = show_on_user::Entity::delete_many()
				.filter(show_on_user::Column::ShowId.eq(show_id))
				.filter(show_on_user::Column::UserId.eq(user_id))
				.exec(tx)
				.await?;

			if result.rows_affected == 0 {
				return Err(ShowServiceError::NotSubscribed(show_id));
			}

			let records = episode_on_user::Entity::delete_many()
				.filter(episode_on_user::Column::ShowId.eq(show_id))
				.filter(episode_on_user::Column::UserId.eq(user_id))
				.exec(tx)
				.await?;

			debug!(records = records.rows_affected, "removed watch records");
			Ok(())
		}

		self
			.db
			.transaction(move |tx| remove_db(tx, user_id, show_id).boxed())
			.await
			.map_err(ShowServiceError::from)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
	use time::macros::datetime;

	fn episode(show_id: Uuid, season: i32, number: i32, air_date: Option<PrimitiveDateTime>) -> episode::Model {
		let now = datetime!(2024-01-01 00:00);
		episode::Model {
			id: Uuid::new_v4(),
			show_id,
			catalog_id: season * 100 + number,
			name: format!("Episode {number}"),
			season,
			number,
			air_date,
			runtime: Some(30),
			summary: None,
			image_url: None,
			created_at: now,
			updated_at: now,
		}
	}

	fn record(episode: &episode::Model, user_id: Uuid, ignored: bool) -> episode_on_user::Model {
		let at = datetime!(2024-02-01 20:00);
		episode_on_user::Model {
			id: Uuid::new_v4(),
			episode_id: episode.id,
			show_id: episode.show_id,
			user_id,
			ignored,
			created_at: at,
			updated_at: at,
		}
	}

	#[test]
	fn seasons_are_grouped_and_ordered() {
		let show = Uuid::new_v4();
		let user = Uuid::new_v4();
		let aired = Some(datetime!(2024-01-10 20:00));
		let episodes = vec![
			episode(show, 2, 1, aired),
			episode(show, 1, 2, aired),
			episode(show, 1, 1, aired),
			episode(show, 2, 2, Some(datetime!(2025-01-01 00:00))),
		];
		let records = vec![
			record(&episodes[2], user, false),
			record(&episodes[1], user, true),
		];

		let seasons = group_seasons(episodes, &records, datetime!(2024-06-01 00:00));

		assert_eq!(seasons.iter().map(|s| s.number).collect::<Vec<_>>(), vec![1, 2]);
		assert_eq!(
			seasons[0].episodes.iter().map(|e| e.episode.number).collect::<Vec<_>>(),
			vec![1, 2]
		);
		assert_eq!(
			seasons[0].episodes[0].state,
			WatchState::Watched(datetime!(2024-02-01 20:00))
		);
		assert_eq!(seasons[0].episodes[1].state, WatchState::Ignored);
		assert!(seasons[0].is_fully_watched());

		assert!(!seasons[1].episodes[1].aired);
		assert!(!seasons[1].is_fully_watched());
	}

	#[test]
	fn unaired_episodes_do_not_block_full_season() {
		let show = Uuid::new_v4();
		let user = Uuid::new_v4();
		let episodes = vec![
			episode(show, 1, 1, Some(datetime!(2024-01-10 20:00))),
			episode(show, 1, 2, None),
		];
		let records = vec![record(&episodes[0], user, false)];

		let seasons = group_seasons(episodes, &records, datetime!(2024-06-01 00:00));
		assert!(seasons[0].is_fully_watched());
	}

	#[tokio::test]
	async fn archiving_unsubscribed_show_fails() {
		let db = MockDatabase::new(DatabaseBackend::Postgres)
			.append_exec_results([MockExecResult {
				last_insert_id: 0,
				rows_affected: 0,
			}])
			.into_connection();

		let service = ShowService {
			db: Arc::new(db),
			catalog: Arc::new(TvMazeClient::with_defaults().expect("client")),
		};

		let show_id = Uuid::new_v4();
		let err = service
			.set_archived(Uuid::new_v4(), show_id, true)
			.await
			.unwrap_err();

		assert!(matches!(err, ShowServiceError::NotSubscribed(id) if id == show_id));
	}
}

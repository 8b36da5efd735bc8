use crate::{macros::define_service, stats::active_show_ids};
use sea_orm::{
	sea_query::{Expr, Func, OnConflict},
	ActiveValue, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, JoinType,
	QueryFilter, QueryOrder, QuerySelect, RelationTrait,
};
use showtrack_entities::{episode, episode_on_user, show, show_on_user};
use showtrack_utils::utc_now;
use std::{
	collections::{HashMap, HashSet},
	sync::Arc,
};
use thiserror::Error;
use time::PrimitiveDateTime;
use tracing::{debug, instrument};
use uuid::Uuid;

define_service! {
	#[derive(Clone)]
	pub struct EpisodeService {
		pub db: Arc<DatabaseConnection>,
	}
}

#[derive(Debug, Error)]
pub enum EpisodeServiceError {
	#[error("not subscribed to show {0}")]
	NotSubscribed(Uuid),

	#[error("episode {episode} does not belong to show {show}")]
	EpisodeNotInShow { show: Uuid, episode: Uuid },

	#[error(transparent)]
	DbErr(#[from] DbErr),
}

#[derive(Debug, Clone)]
pub struct UpcomingEpisode {
	pub episode: episode::Model,
	pub show: show::Model,
}

#[derive(Debug, Clone)]
pub struct RecentEpisode {
	pub episode: episode::Model,
	pub show: show::Model,
	pub watched_at: PrimitiveDateTime,
}

/// Result of matching a Plex scrobble against the user's subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrobbleOutcome {
	Marked { show: Uuid, episode: Uuid },
	ShowNotFound,
	EpisodeNotFound,
}

/// Aired episodes without any watch record, in the order given.
pub(crate) fn unconnected_aired<'a>(
	episodes: &'a [episode::Model],
	connected: &HashSet<Uuid>,
	now: PrimitiveDateTime,
) -> Vec<&'a episode::Model> {
	episodes
		.iter()
		.filter(|e| e.has_aired(now) && !connected.contains(&e.id))
		.collect()
}

async fn ensure_subscribed<C: ConnectionTrait>(
	db: &C,
	user_id: Uuid,
	show_id: Uuid,
) -> Result<show_on_user::Model, EpisodeServiceError> {
	show_on_user::Entity::find()
		.filter(show_on_user::Column::ShowId.eq(show_id))
		.filter(show_on_user::Column::UserId.eq(user_id))
		.one(db)
		.await?
		.ok_or(EpisodeServiceError::NotSubscribed(show_id))
}

async fn ensure_episode_in_show<C: ConnectionTrait>(
	db: &C,
	show_id: Uuid,
	episode_id: Uuid,
) -> Result<episode::Model, EpisodeServiceError> {
	episode::Entity::find_by_id(episode_id)
		.filter(episode::Column::ShowId.eq(show_id))
		.one(db)
		.await?
		.ok_or(EpisodeServiceError::EpisodeNotInShow {
			show: show_id,
			episode: episode_id,
		})
}

fn record_model(
	user_id: Uuid,
	show_id: Uuid,
	episode_id: Uuid,
	ignored: bool,
	now: PrimitiveDateTime,
) -> episode_on_user::ActiveModel {
	episode_on_user::ActiveModel {
		id: ActiveValue::Set(Uuid::new_v4()),
		episode_id: ActiveValue::Set(episode_id),
		show_id: ActiveValue::Set(show_id),
		user_id: ActiveValue::Set(user_id),
		ignored: ActiveValue::Set(ignored),
		created_at: ActiveValue::Set(now),
		updated_at: ActiveValue::Set(now),
	}
}

fn record_conflict() -> OnConflict {
	OnConflict::columns([
		episode_on_user::Column::EpisodeId,
		episode_on_user::Column::ShowId,
		episode_on_user::Column::UserId,
	])
}

impl EpisodeService {
	/// Inserts or flips the watch record. An existing record with the same
	/// flag is left alone so the watched timestamp survives repeated marks.
	async fn upsert_record(
		&self,
		user_id: Uuid,
		show_id: Uuid,
		episode_id: Uuid,
		ignored: bool,
	) -> Result<(), DbErr> {
		let now = utc_now();
		let rows = episode_on_user::Entity::insert(record_model(
			user_id, show_id, episode_id, ignored, now,
		))
		.on_conflict(
			record_conflict()
				.update_columns([
					episode_on_user::Column::Ignored,
					episode_on_user::Column::CreatedAt,
					episode_on_user::Column::UpdatedAt,
				])
				.action_and_where(
					Expr::col((episode_on_user::Entity, episode_on_user::Column::Ignored)).ne(ignored),
				)
				.to_owned(),
		)
		.exec_without_returning(&*self.db)
		.await?;

		debug!(rows, ignored, "upserted watch record");
		Ok(())
	}

	async fn delete_record(
		&self,
		user_id: Uuid,
		show_id: Uuid,
		episode_id: Uuid,
		ignored: bool,
	) -> Result<(), DbErr> {
		episode_on_user::Entity::delete_many()
			.filter(episode_on_user::Column::EpisodeId.eq(episode_id))
			.filter(episode_on_user::Column::ShowId.eq(show_id))
			.filter(episode_on_user::Column::UserId.eq(user_id))
			.filter(episode_on_user::Column::Ignored.eq(ignored))
			.exec(&*self.db)
			.await?;

		Ok(())
	}

	async fn ensure_connected(
		&self,
		user_id: Uuid,
		show_id: Uuid,
		episode_id: Uuid,
	) -> Result<(), EpisodeServiceError> {
		ensure_subscribed(&*self.db, user_id, show_id).await?;
		ensure_episode_in_show(&*self.db, show_id, episode_id).await?;
		Ok(())
	}

	#[instrument(skip(self))]
	pub async fn mark_watched(
		&self,
		user_id: Uuid,
		show_id: Uuid,
		episode_id: Uuid,
	) -> Result<(), EpisodeServiceError> {
		self.ensure_connected(user_id, show_id, episode_id).await?;
		self.upsert_record(user_id, show_id, episode_id, false).await?;
		Ok(())
	}

	#[instrument(skip(self))]
	pub async fn mark_unwatched(
		&self,
		user_id: Uuid,
		show_id: Uuid,
		episode_id: Uuid,
	) -> Result<(), EpisodeServiceError> {
		self.ensure_connected(user_id, show_id, episode_id).await?;
		self.delete_record(user_id, show_id, episode_id, false).await?;
		Ok(())
	}

	#[instrument(skip(self))]
	pub async fn mark_ignored(
		&self,
		user_id: Uuid,
		show_id: Uuid,
		episode_id: Uuid,
	) -> Result<(), EpisodeServiceError> {
		self.ensure_connected(user_id, show_id, episode_id).await?;
		self.upsert_record(user_id, show_id, episode_id, true).await?;
		Ok(())
	}

	#[instrument(skip(self))]
	pub async fn mark_unignored(
		&self,
		user_id: Uuid,
		show_id: Uuid,
		episode_id: Uuid,
	) -> Result<(), EpisodeServiceError> {
		self.ensure_connected(user_id, show_id, episode_id).await?;
		self.delete_record(user_id, show_id, episode_id, true).await?;
		Ok(())
	}

	/// Marks every aired, not yet recorded episode of the show as watched.
	/// Returns the number of records inserted.
	#[instrument(skip(self))]
	pub async fn mark_all_watched(
		&self,
		user_id: Uuid,
		show_id: Uuid,
	) -> Result<u64, EpisodeServiceError> {
		self.mark_many_watched(user_id, show_id, None).await
	}

	#[instrument(skip(self))]
	pub async fn mark_season_watched(
		&self,
		user_id: Uuid,
		show_id: Uuid,
		season: i32,
	) -> Result<u64, EpisodeServiceError> {
		self.mark_many_watched(user_id, show_id, Some(season)).await
	}

	async fn mark_many_watched(
		&self,
		user_id: Uuid,
		show_id: Uuid,
		season: Option<i32>,
	) -> Result<u64, EpisodeServiceError> {
		ensure_subscribed(&*self.db, user_id, show_id).await?;

		let now = utc_now();
		let mut query = episode::Entity::find()
			.filter(episode::Column::ShowId.eq(show_id))
			.filter(episode::Column::AirDate.lte(now));
		if let Some(season) = season {
			query = query.filter(episode::Column::Season.eq(season));
		}

		let episodes = query.all(&*self.db).await?;
		let connected = episode_on_user::Entity::find()
			.select_only()
			.column(episode_on_user::Column::EpisodeId)
			.filter(episode_on_user::Column::ShowId.eq(show_id))
			.filter(episode_on_user::Column::UserId.eq(user_id))
			.into_tuple::<Uuid>()
			.all(&*self.db)
			.await?
			.into_iter()
			.collect::<HashSet<_>>();

		let records = unconnected_aired(&episodes, &connected, now)
			.into_iter()
			.map(|e| record_model(user_id, show_id, e.id, false, now))
			.collect::<Vec<_>>();

		if records.is_empty() {
			return Ok(0);
		}

		let inserted = episode_on_user::Entity::insert_many(records)
			.on_conflict(record_conflict().do_nothing().to_owned())
			.exec_without_returning(&*self.db)
			.await?;

		debug!(inserted, "marked episodes watched");
		Ok(inserted)
	}

	/// Aired-later episodes of subscribed, non-archived shows, soonest first.
	pub async fn upcoming(
		&self,
		user_id: Uuid,
		limit: u64,
	) -> Result<Vec<UpcomingEpisode>, DbErr> {
		let episodes = episode::Entity::find()
			.find_also_related(show::Entity)
			.filter(episode::Column::ShowId.in_subquery(active_show_ids(user_id)))
			.filter(episode::Column::AirDate.gt(utc_now()))
			.order_by_asc(episode::Column::AirDate)
			.limit(limit)
			.all(&*self.db)
			.await?;

		Ok(
			episodes
				.into_iter()
				.filter_map(|(episode, show)| Some(UpcomingEpisode { show: show?, episode }))
				.collect(),
		)
	}

	/// Watched episodes, most recent first. Ignored records are skipped.
	pub async fn recently_watched(
		&self,
		user_id: Uuid,
		limit: u64,
	) -> Result<Vec<RecentEpisode>, DbErr> {
		let records = episode_on_user::Entity::find()
			.find_also_related(episode::Entity)
			.filter(episode_on_user::Column::UserId.eq(user_id))
			.filter(episode_on_user::Column::Ignored.eq(false))
			.order_by_desc(episode_on_user::Column::CreatedAt)
			.limit(limit)
			.all(&*self.db)
			.await?;

		let show_ids = records
			.iter()
			.map(|(r, _)| r.show_id)
			.collect::<HashSet<_>>();

		let shows = if show_ids.is_empty() {
			HashMap::new()
		} else {
			show::Entity::find()
				.filter(show::Column::Id.is_in(show_ids))
				.all(&*self.db)
				.await?
				.into_iter()
				.map(|s| (s.id, s))
				.collect::<HashMap<_, _>>()
		};

		Ok(
			records
				.into_iter()
				.filter_map(|(record, episode)| {
					Some(RecentEpisode {
						episode: episode?,
						show: shows.get(&record.show_id)?.clone(),
						watched_at: record.created_at,
					})
				})
				.collect(),
		)
	}

	/// Marks an episode watched given the show's title as reported by a
	/// media server. The title is matched case-insensitively against the
	/// user's subscriptions.
	#[instrument(skip(self))]
	pub async fn scrobble(
		&self,
		user_id: Uuid,
		show_name: &str,
		season: i32,
		number: i32,
	) -> Result<ScrobbleOutcome, EpisodeServiceError> {
		let show = show::Entity::find()
			.join(JoinType::InnerJoin, show::Relation::ShowOnUser.def())
			.filter(show_on_user::Column::UserId.eq(user_id))
			.filter(
				Expr::expr(Func::lower(Expr::col((show::Entity, show::Column::Name))))
					.eq(show_name.trim().to_lowercase()),
			)
			.one(&*self.db)
			.await?;

		let Some(show) = show else {
			return Ok(ScrobbleOutcome::ShowNotFound);
		};

		let episode = episode::Entity::find()
			.filter(episode::Column::ShowId.eq(show.id))
			.filter(episode::Column::Season.eq(season))
			.filter(episode::Column::Number.eq(number))
			.one(&*self.db)
			.await?;

		let Some(episode) = episode else {
			return Ok(ScrobbleOutcome::EpisodeNotFound);
		};

		self.upsert_record(user_id, show.id, episode.id, false).await?;
		Ok(ScrobbleOutcome::Marked {
			show: show.id,
			episode: episode.id,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};
	use time::macros::datetime;

	fn episode(number: i32, air_date: Option<PrimitiveDateTime>) -> episode::Model {
		let created = datetime!(2024-01-01 00:00);
		episode::Model {
			id: Uuid::new_v4(),
			show_id: Uuid::nil(),
			catalog_id: number,
			name: format!("Episode {number}"),
			season: 1,
			number,
			air_date,
			runtime: Some(42),
			summary: None,
			image_url: None,
			created_at: created,
			updated_at: created,
		}
	}

	fn subscription(user_id: Uuid, show_id: Uuid) -> show_on_user::Model {
		show_on_user::Model {
			id: Uuid::new_v4(),
			show_id,
			user_id,
			archived: false,
			created_at: datetime!(2024-01-01 00:00),
		}
	}

	#[test]
	fn only_aired_unconnected_episodes_are_selected() {
		let now = datetime!(2024-05-01 12:00);
		let episodes = vec![
			episode(1, Some(datetime!(2024-04-01 20:00))),
			episode(2, Some(datetime!(2024-04-08 20:00))),
			episode(3, Some(datetime!(2024-05-01 12:00))),
			episode(4, Some(datetime!(2024-05-08 20:00))),
			episode(5, None),
		];
		let connected = HashSet::from([episodes[1].id]);

		let selected = unconnected_aired(&episodes, &connected, now)
			.into_iter()
			.map(|e| e.number)
			.collect::<Vec<_>>();

		assert_eq!(selected, vec![1, 3]);
	}

	#[tokio::test]
	async fn mark_watched_requires_subscription() {
		let db = MockDatabase::new(DatabaseBackend::Postgres)
			.append_query_results([Vec::<show_on_user::Model>::new()])
			.into_connection();
		let service = EpisodeService { db: Arc::new(db) };

		let show_id = Uuid::new_v4();
		let err = service
			.mark_watched(Uuid::new_v4(), show_id, Uuid::new_v4())
			.await
			.unwrap_err();

		assert!(matches!(err, EpisodeServiceError::NotSubscribed(id) if id == show_id));
	}

	#[tokio::test]
	async fn mark_ignored_requires_episode_of_show() {
		let user_id = Uuid::new_v4();
		let show_id = Uuid::new_v4();
		let db = MockDatabase::new(DatabaseBackend::Postgres)
			.append_query_results([vec![subscription(user_id, show_id)]])
			.append_query_results([Vec::<episode::Model>::new()])
			.into_connection();
		let service = EpisodeService { db: Arc::new(db) };

		let err = service
			.mark_ignored(user_id, show_id, Uuid::new_v4())
			.await
			.unwrap_err();

		assert!(matches!(err, EpisodeServiceError::EpisodeNotInShow { .. }));
	}

	#[tokio::test]
	async fn mark_all_watched_requires_subscription() {
		let db = MockDatabase::new(DatabaseBackend::Postgres)
			.append_query_results([Vec::<show_on_user::Model>::new()])
			.into_connection();
		let service = EpisodeService { db: Arc::new(db) };

		let err = service
			.mark_all_watched(Uuid::new_v4(), Uuid::new_v4())
			.await
			.unwrap_err();

		assert!(matches!(err, EpisodeServiceError::NotSubscribed(_)));
	}

	#[tokio::test]
	async fn mark_watched_upserts_record() {
		let user_id = Uuid::new_v4();
		let show_id = Uuid::new_v4();
		let mut ep = episode(1, Some(datetime!(2024-01-01 20:00)));
		ep.show_id = show_id;
		let episode_id = ep.id;

		let db = MockDatabase::new(DatabaseBackend::Postgres)
			.append_query_results([vec![subscription(user_id, show_id)]])
			.append_query_results([vec![ep]])
			.append_exec_results([MockExecResult {
				last_insert_id: 0,
				rows_affected: 1,
			}])
			.into_connection();
		let service = EpisodeService { db: Arc::new(db) };

		service
			.mark_watched(user_id, show_id, episode_id)
			.await
			.expect("marked");
	}

	fn show(name: &str) -> show::Model {
		let created = datetime!(2024-01-01 00:00);
		show::Model {
			id: Uuid::new_v4(),
			catalog_id: 1825,
			name: name.into(),
			premiered: None,
			ended: None,
			rating: None,
			image_url: None,
			summary: None,
			imdb_id: None,
			created_at: created,
			updated_at: created,
		}
	}

	fn statements(db: Arc<DatabaseConnection>) -> String {
		Arc::try_unwrap(db)
			.unwrap()
			.into_transaction_log()
			.iter()
			.map(|t| format!("{t:?}"))
			.collect::<Vec<_>>()
			.join("\n")
	}

	#[tokio::test]
	async fn scrobble_matches_show_name_ignoring_case() {
		let user_id = Uuid::new_v4();
		let show = show("The Expanse");
		let mut ep = episode(3, Some(datetime!(2016-01-01 20:00)));
		ep.show_id = show.id;
		ep.season = 2;
		let expected = ScrobbleOutcome::Marked {
			show: show.id,
			episode: ep.id,
		};

		let db = Arc::new(
			MockDatabase::new(DatabaseBackend::Postgres)
				.append_query_results([vec![show]])
				.append_query_results([vec![ep]])
				.append_exec_results([MockExecResult {
					last_insert_id: 0,
					rows_affected: 1,
				}])
				.into_connection(),
		);
		let service = EpisodeService { db: db.clone() };

		let outcome = service
			.scrobble(user_id, "  THE expanse ", 2, 3)
			.await
			.expect("scrobbled");
		assert_eq!(outcome, expected);

		drop(service);
		let log = statements(db);
		assert!(log.contains("LOWER("));
		assert!(log.contains(r#""the expanse""#));
		assert!(log.contains("INSERT INTO"));
	}

	#[tokio::test]
	async fn scrobble_of_unknown_show_marks_nothing() {
		let db = Arc::new(
			MockDatabase::new(DatabaseBackend::Postgres)
				.append_query_results([Vec::<show::Model>::new()])
				.into_connection(),
		);
		let service = EpisodeService { db: db.clone() };

		let outcome = service
			.scrobble(Uuid::new_v4(), "Unknown Show", 1, 1)
			.await
			.expect("scrobbled");
		assert_eq!(outcome, ScrobbleOutcome::ShowNotFound);

		drop(service);
		assert!(!statements(db).contains("INSERT"));
	}

	#[tokio::test]
	async fn scrobble_of_missing_episode_marks_nothing() {
		let show = show("The Expanse");
		let db = Arc::new(
			MockDatabase::new(DatabaseBackend::Postgres)
				.append_query_results([vec![show]])
				.append_query_results([Vec::<episode::Model>::new()])
				.into_connection(),
		);
		let service = EpisodeService { db: db.clone() };

		let outcome = service
			.scrobble(Uuid::new_v4(), "the expanse", 9, 1)
			.await
			.expect("scrobbled");
		assert_eq!(outcome, ScrobbleOutcome::EpisodeNotFound);
	}
}

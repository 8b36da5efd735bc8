use crate::macros::define_service;
use sea_orm::{
	sea_query::{Expr, Query},
	ColumnTrait, DatabaseConnection, DbErr, EntityTrait, FromQueryResult, JoinType, PaginatorTrait,
	QueryFilter, QuerySelect, RelationTrait,
};
use showtrack_entities::{episode, episode_on_user, show_on_user};
use showtrack_utils::{utc_now, DateExt, PrimitiveDateTimeExt};
use std::{
	collections::{BTreeMap, HashSet},
	sync::Arc,
};
use time::{Date, Month, PrimitiveDateTime};
use tracing::instrument;
use uuid::Uuid;

/// Number of calendar months covered by the monthly summary, current month included.
pub const SUMMARY_MONTHS: u32 = 12;

define_service! {
	#[derive(Clone)]
	pub struct StatsService {
		pub db: Arc<DatabaseConnection>,
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromQueryResult)]
pub struct WatchRecord {
	pub show_id: Uuid,
	pub watched_at: PrimitiveDateTime,
	pub runtime: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthlyStat {
	pub year: i32,
	pub month: Month,
	pub label: String,
	pub episodes: u64,
	pub minutes: u64,
	pub shows: u64,
}

impl MonthlyStat {
	fn empty(year: i32, month: Month) -> Self {
		Self {
			year,
			month,
			label: format!("{month} {year}"),
			episodes: 0,
			minutes: 0,
			shows: 0,
		}
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserStats {
	pub watch_minutes: u64,
	pub watched: u64,
	pub ignored: u64,
	pub unwatched: u64,
	pub months: Vec<MonthlyStat>,
}

/// Aired episodes that have neither been watched nor ignored.
pub fn unwatched_count(aired: u64, watched: u64, ignored: u64) -> u64 {
	aired.saturating_sub(watched).saturating_sub(ignored)
}

/// Reduces watch records into one bucket per calendar month, oldest first.
///
/// The window ends with the month of `today` and spans `months` months.
/// Months without records are present with zero values and records outside
/// the window are skipped.
pub fn monthly_stats(
	records: impl IntoIterator<Item = WatchRecord>,
	today: Date,
	months: u32,
) -> Vec<MonthlyStat> {
	if months == 0 {
		return Vec::new();
	}

	let start = today.months_back(months - 1);
	let mut buckets = BTreeMap::new();
	for offset in (0..months).rev() {
		let first = today.months_back(offset);
		buckets.insert(
			(first.year(), first.month() as u8),
			(MonthlyStat::empty(first.year(), first.month()), HashSet::new()),
		);
	}

	for record in records {
		let date = record.watched_at.date();
		if date < start {
			continue;
		}

		let Some((stat, shows)) = buckets.get_mut(&(date.year(), date.month() as u8)) else {
			continue;
		};

		stat.episodes += 1;
		stat.minutes += record.runtime.unwrap_or(0).max(0) as u64;
		shows.insert(record.show_id);
	}

	buckets
		.into_values()
		.map(|(mut stat, shows)| {
			stat.shows = shows.len() as u64;
			stat
		})
		.collect()
}

#[derive(Debug, FromQueryResult)]
struct RecordCount {
	ignored: bool,
	count: i64,
}

#[derive(Debug, FromQueryResult)]
struct Minutes {
	minutes: Option<i64>,
}

impl StatsService {
	#[instrument(skip(self))]
	pub async fn user_stats(&self, user_id: Uuid) -> Result<UserStats, DbErr> {
		let now = utc_now();
		let window_start = PrimitiveDateTime::start_of_day(now.date().months_back(SUMMARY_MONTHS - 1));

		let (counts, minutes, unwatched, records) = futures::try_join!(
			self.record_counts(user_id),
			self.watch_minutes(user_id),
			self.unwatched(user_id, now),
			self.records_since(user_id, window_start),
		)?;

		let (watched, ignored) = counts;
		Ok(UserStats {
			watch_minutes: minutes,
			watched,
			ignored,
			unwatched,
			months: monthly_stats(records, now.date(), SUMMARY_MONTHS),
		})
	}

	async fn record_counts(&self, user_id: Uuid) -> Result<(u64, u64), DbErr> {
		let counts = episode_on_user::Entity::find()
			.select_only()
			.column(episode_on_user::Column::Ignored)
			.column_as(episode_on_user::Column::Id.count(), "count")
			.filter(episode_on_user::Column::UserId.eq(user_id))
			.group_by(episode_on_user::Column::Ignored)
			.into_model::<RecordCount>()
			.all(&*self.db)
			.await?;

		Ok(split_counts(counts))
	}

	async fn watch_minutes(&self, user_id: Uuid) -> Result<u64, DbErr> {
		let minutes = episode_on_user::Entity::find()
			.select_only()
			.column_as(
				Expr::col((episode::Entity, episode::Column::Runtime)).sum(),
				"minutes",
			)
			.join(JoinType::InnerJoin, episode_on_user::Relation::Episode.def())
			.filter(episode_on_user::Column::UserId.eq(user_id))
			.filter(episode_on_user::Column::Ignored.eq(false))
			.into_model::<Minutes>()
			.one(&*self.db)
			.await?;

		Ok(minutes.and_then(|m| m.minutes).unwrap_or(0).max(0) as u64)
	}

	/// Aired episodes of subscribed, non-archived shows minus the records on them.
	async fn unwatched(&self, user_id: Uuid, now: PrimitiveDateTime) -> Result<u64, DbErr> {
		let aired = episode::Entity::find()
			.filter(episode::Column::ShowId.in_subquery(active_show_ids(user_id)))
			.filter(episode::Column::AirDate.lte(now))
			.count(&*self.db)
			.await?;

		let counts = episode_on_user::Entity::find()
			.select_only()
			.column(episode_on_user::Column::Ignored)
			.column_as(episode_on_user::Column::Id.count(), "count")
			.join(JoinType::InnerJoin, episode_on_user::Relation::Episode.def())
			.filter(episode_on_user::Column::UserId.eq(user_id))
			.filter(episode_on_user::Column::ShowId.in_subquery(active_show_ids(user_id)))
			.filter(episode::Column::AirDate.lte(now))
			.group_by(episode_on_user::Column::Ignored)
			.into_model::<RecordCount>()
			.all(&*self.db)
			.await?;

		let (watched, ignored) = split_counts(counts);
		Ok(unwatched_count(aired, watched, ignored))
	}

	async fn records_since(
		&self,
		user_id: Uuid,
		since: PrimitiveDateTime,
	) -> Result<Vec<WatchRecord>, DbErr> {
		episode_on_user::Entity::find()
			.select_only()
			.column(episode_on_user::Column::ShowId)
			.column_as(episode_on_user::Column::CreatedAt, "watched_at")
			.column_as(
				Expr::col((episode::Entity, episode::Column::Runtime)),
				"runtime",
			)
			.join(JoinType::InnerJoin, episode_on_user::Relation::Episode.def())
			.filter(episode_on_user::Column::UserId.eq(user_id))
			.filter(episode_on_user::Column::Ignored.eq(false))
			.filter(episode_on_user::Column::CreatedAt.gte(since))
			.into_model::<WatchRecord>()
			.all(&*self.db)
			.await
	}
}

/// `SELECT show_id FROM show_on_user WHERE user_id = $1 AND NOT archived`
pub(crate) fn active_show_ids(user_id: Uuid) -> sea_orm::sea_query::SelectStatement {
	Query::select()
		.column(show_on_user::Column::ShowId)
		.from(show_on_user::Entity)
		.and_where(show_on_user::Column::UserId.eq(user_id))
		.and_where(show_on_user::Column::Archived.eq(false))
		.to_owned()
}

fn split_counts(counts: Vec<RecordCount>) -> (u64, u64) {
	counts
		.into_iter()
		.fold((0, 0), |(watched, ignored), row| {
			let count = row.count.max(0) as u64;
			if row.ignored {
				(watched, ignored + count)
			} else {
				(watched + count, ignored)
			}
		})
}

use sea_orm::{
	ColumnTrait, ConnectOptions, ConnectionTrait, Database, DbErr, EntityTrait, QueryFilter,
};
use showtrack_entities::{invite, password_reset, session};
use showtrack_utils::utc_now;
use std::env;
use time::{Duration, PrimitiveDateTime};
use tracing::{info, metadata::LevelFilter, warn};
use tracing_forest::ForestLayer;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Used invites are kept this long for reference before being removed.
const USED_INVITE_RETENTION: Duration = Duration::days(90);

fn required_env_var(name: &str) -> Result<String, DbErr> {
	env::var(name).map_err(|_| DbErr::Custom(format!("${name} not found")))
}

async fn delete_expired_sessions<C: ConnectionTrait>(
	db: &C,
	now: PrimitiveDateTime,
) -> Result<u64, DbErr> {
	let result = session::Entity::delete_many()
		.filter(session::Column::Etime.lt(now))
		.exec(db)
		.await?;

	Ok(result.rows_affected)
}

async fn delete_expired_password_resets<C: ConnectionTrait>(
	db: &C,
	now: PrimitiveDateTime,
) -> Result<u64, DbErr> {
	let result = password_reset::Entity::delete_many()
		.filter(password_reset::Column::ExpiresAt.lt(now))
		.exec(db)
		.await?;

	Ok(result.rows_affected)
}

async fn delete_used_invites<C: ConnectionTrait>(
	db: &C,
	now: PrimitiveDateTime,
) -> Result<u64, DbErr> {
	let result = invite::Entity::delete_many()
		.filter(invite::Column::UsedAt.lt(now - USED_INVITE_RETENTION))
		.exec(db)
		.await?;

	Ok(result.rows_affected)
}

#[tokio::main]
async fn main() -> Result<(), DbErr> {
	tracing_subscriber::registry()
		.with(ForestLayer::default())
		.with(
			EnvFilter::builder()
				.with_default_directive(LevelFilter::INFO.into())
				.from_env_lossy(),
		)
		.init();

	let mut options = ConnectOptions::new(required_env_var("DATABASE_URL")?);
	if let Ok(schema) = env::var("DATABASE_SCHEMA") {
		options.set_schema_search_path(schema);
	}
	let db = Database::connect(options).await?;
	let now = utc_now();

	// each step runs on its own so one failure does not block the others
	let mut failed = false;
	for (what, result) in [
		("expired sessions", delete_expired_sessions(&db, now).await),
		(
			"expired password resets",
			delete_expired_password_resets(&db, now).await,
		),
		("used invites", delete_used_invites(&db, now).await),
	] {
		match result {
			Ok(count) => info!("deleted {count} {what}"),
			Err(e) => {
				warn!("failed to delete {what}: {e:#?}");
				failed = true;
			}
		}
	}

	match failed {
		false => Ok(()),
		true => Err(DbErr::Custom("cleanup finished with errors".into())),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Transaction};
	use time::macros::datetime;

	#[tokio::test]
	async fn used_invites_are_kept_for_the_retention_period() {
		let db = MockDatabase::new(DatabaseBackend::Postgres)
			.append_exec_results([MockExecResult {
				last_insert_id: 0,
				rows_affected: 3,
			}])
			.into_connection();

		let deleted = delete_used_invites(&db, datetime!(2024-04-01 12:00))
			.await
			.unwrap();
		assert_eq!(deleted, 3);

		let log = db.into_transaction_log();
		assert_eq!(log.len(), 1);
		assert_eq!(
			log[0],
			Transaction::from_sql_and_values(
				DatabaseBackend::Postgres,
				r#"DELETE FROM "invite" WHERE "invite"."used_at" < $1"#,
				[datetime!(2024-01-02 12:00).into()],
			)
		);
	}
}

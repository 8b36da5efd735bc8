use crate::macros::define_service;
use sea_orm::{
	sea_query::{Expr, Func, SimpleExpr}, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait, QuerySelect,
};
use serde::Serialize;
use showtrack_entities::{episode, episode_on_user, show, show_on_user, user};
use std::{fmt::Write, sync::Arc};

define_service! {
	#[derive(Clone)]
	pub struct MetricsService {
		pub db: Arc<DatabaseConnection>,
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
	pub shows: u64,
	pub connected_shows: u64,
	pub episodes: u64,
	pub connected_episodes: u64,
	pub users: u64,
}

impl Counts {
	fn gauges(&self) -> [(&'static str, &'static str, u64); 5] {
		[
			("showtrack_shows", "Shows known to the tracker.", self.shows),
			(
				"showtrack_connected_shows",
				"Shows with at least one subscriber.",
				self.connected_shows,
			),
			("showtrack_episodes", "Episodes known to the tracker.", self.episodes),
			(
				"showtrack_connected_episodes",
				"Episodes with at least one watch record.",
				self.connected_episodes,
			),
			("showtrack_users", "Registered users.", self.users),
		]
	}

	/// Prometheus text exposition format, version 0.0.4.
	pub fn render_prometheus(&self) -> String {
		let mut out = String::new();
		for (name, help, value) in self.gauges() {
			// writing to a String cannot fail
			let _ = writeln!(out, "# HELP {name} {help}");
			let _ = writeln!(out, "# TYPE {name} gauge");
			let _ = writeln!(out, "{name} {value}");
		}

		out
	}
}

impl MetricsService {
	pub async fn counts(&self) -> Result<Counts, DbErr> {
		let (shows, connected_shows, episodes, connected_episodes, users) = futures::try_join!(
			show::Entity::find().count(&*self.db),
			self.distinct_count::<show_on_user::Entity, _>(show_on_user::Column::ShowId),
			episode::Entity::find().count(&*self.db),
			self.distinct_count::<episode_on_user::Entity, _>(episode_on_user::Column::EpisodeId),
			user::Entity::find().count(&*self.db),
		)?;

		Ok(Counts {
			shows,
			connected_shows,
			episodes,
			connected_episodes,
			users,
		})
	}

	async fn distinct_count<E, C>(&self, column: C) -> Result<u64, DbErr>
	where
		E: EntityTrait,
		C: sea_orm::ColumnTrait,
	{
		let count = E::find()
			.select_only()
			.column_as(SimpleExpr::from(Func::count_distinct(Expr::col(column))), "count")
			.into_tuple::<i64>()
			.one(&*self.db)
			.await?;

		Ok(count.unwrap_or(0).max(0) as u64)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn prometheus_exposition() {
		let counts = Counts {
			shows: 12,
			connected_shows: 10,
			episodes: 340,
			connected_episodes: 200,
			users: 3,
		};

		let text = counts.render_prometheus();
		let lines = text.lines().collect::<Vec<_>>();

		assert_eq!(lines.len(), 15);
		assert_eq!(lines[0], "# HELP showtrack_shows Shows known to the tracker.");
		assert_eq!(lines[1], "# TYPE showtrack_shows gauge");
		assert_eq!(lines[2], "showtrack_shows 12");
		assert!(lines.contains(&"showtrack_connected_episodes 200"));
		assert!(lines.contains(&"showtrack_users 3"));
		assert!(text.ends_with('\n'));

		for line in lines.iter().filter(|l| !l.starts_with('#')) {
			let (name, value) = line.split_once(' ').expect("name value pair");
			assert!(name
				.chars()
				.all(|c| c.is_ascii_alphanumeric() || c == '_'));
			value.parse::<u64>().expect("numeric sample");
		}
	}

	#[test]
	fn kpi_json() {
		let json = serde_json::to_value(Counts::default()).expect("serializes");
		assert_eq!(json["connected_shows"], 0);
		assert_eq!(json.as_object().map(|o| o.len()), Some(5));
	}
}

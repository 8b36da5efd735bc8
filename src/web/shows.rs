use super::{
	views::{RecentPage, SearchPage, ShowListPage, ShowPage, UpcomingPage},
	WebError,
};
use crate::{
	extractors::{CsrfProtected, CurrentUser, PageContext, VerifiedForm},
	AppState,
};
use axum::{
	extract::{Path, Query},
	http::StatusCode,
	response::{IntoResponse, Redirect, Response},
	routing::get,
	Router,
};
use serde::Deserialize;
use showtrack_services::{EpisodeService, ShowService, ShowServiceError};
use tracing::{info, warn};
use uuid::Uuid;

const LIST_LIMIT: u64 = 50;
const CATALOG_UNAVAILABLE: &str = "The show catalog is unavailable right now, try again later.";

#[derive(Deserialize)]
struct ListQuery {
	#[serde(default)]
	archived: Option<String>,
}

impl ListQuery {
	fn archived(&self) -> bool {
		matches!(self.archived.as_deref(), Some("1" | "true" | "on"))
	}
}

async fn list(
	CurrentUser(user): CurrentUser,
	ctx: PageContext,
	Query(query): Query<ListQuery>,
	shows: ShowService,
) -> Result<Response, WebError> {
	let archived = query.archived();
	let shows = shows.list_for_user(user.id, archived).await?;

	Ok(
		ShowListPage {
			ctx: &ctx,
			shows,
			archived,
		}
		.into_response(),
	)
}

#[derive(Deserialize)]
struct SearchQuery {
	#[serde(default)]
	q: String,
}

async fn search(
	CurrentUser(user): CurrentUser,
	ctx: PageContext,
	Query(query): Query<SearchQuery>,
	shows: ShowService,
) -> Result<Response, WebError> {
	let subscribed = shows.subscribed_catalog_ids(user.id).await?;
	let (results, error, status) = match shows.search(&query.q).await {
		Ok(results) => (results, None, StatusCode::OK),
		Err(ShowServiceError::Catalog(e)) => {
			warn!(query = %query.q, "catalog search failed: {e}");
			(Vec::new(), Some(CATALOG_UNAVAILABLE), StatusCode::BAD_GATEWAY)
		}
		Err(e) => return Err(e.into()),
	};

	Ok(
		SearchPage {
			ctx: &ctx,
			query: &query.q,
			results,
			subscribed,
			error,
		}
		.into_response(status),
	)
}

#[derive(Deserialize)]
struct AddShowForm {
	csrf: String,
	show_id: u32,
}

impl CsrfProtected for AddShowForm {
	fn csrf(&self) -> &str {
		&self.csrf
	}
}

async fn add(
	CurrentUser(user): CurrentUser,
	ctx: PageContext,
	shows: ShowService,
	VerifiedForm(form): VerifiedForm<AddShowForm>,
) -> Result<Response, WebError> {
	match shows.add_show(user.id, form.show_id).await {
		Ok(show) => {
			info!(user.id = %user.id, show.id = %show.id, "show added");
			Ok(Redirect::to(&format!("/tv/{}", show.id)).into_response())
		}
		Err(ShowServiceError::Catalog(e)) => {
			warn!(catalog.id = form.show_id, "adding show failed: {e}");
			let subscribed = shows.subscribed_catalog_ids(user.id).await?;
			Ok(
				SearchPage {
					ctx: &ctx,
					query: "",
					results: Vec::new(),
					subscribed,
					error: Some(CATALOG_UNAVAILABLE),
				}
				.into_response(StatusCode::BAD_GATEWAY),
			)
		}
		Err(e) => Err(e.into()),
	}
}

async fn upcoming(
	CurrentUser(user): CurrentUser,
	ctx: PageContext,
	episodes: EpisodeService,
) -> Result<Response, WebError> {
	let episodes = episodes.upcoming(user.id, LIST_LIMIT).await?;
	Ok(UpcomingPage { ctx: &ctx, episodes }.into_response())
}

async fn recent(
	CurrentUser(user): CurrentUser,
	ctx: PageContext,
	episodes: EpisodeService,
) -> Result<Response, WebError> {
	let episodes = episodes.recently_watched(user.id, LIST_LIMIT).await?;
	Ok(RecentPage { ctx: &ctx, episodes }.into_response())
}

async fn detail(
	CurrentUser(user): CurrentUser,
	ctx: PageContext,
	Path(show_id): Path<Uuid>,
	shows: ShowService,
) -> Result<Response, WebError> {
	let detail = shows
		.detail(user.id, show_id)
		.await?
		.ok_or(WebError::NotFound)?;

	Ok(ShowPage { ctx: &ctx, detail }.into_response())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ShowIntent {
	MarkWatched,
	MarkUnwatched,
	MarkIgnored,
	MarkUnignored,
	MarkAllWatched,
	MarkSeasonWatched,
	Archive,
	Unarchive,
	Remove,
}

#[derive(Deserialize)]
struct ShowIntentForm {
	csrf: String,
	intent: ShowIntent,
	episode: Option<Uuid>,
	season: Option<i32>,
}

impl CsrfProtected for ShowIntentForm {
	fn csrf(&self) -> &str {
		&self.csrf
	}
}

impl ShowIntentForm {
	fn episode(&self) -> Result<Uuid, WebError> {
		self
			.episode
			.ok_or_else(|| WebError::BadRequest("missing episode".into()))
	}

	fn season(&self) -> Result<i32, WebError> {
		self
			.season
			.ok_or_else(|| WebError::BadRequest("missing season".into()))
	}
}

async fn update(
	CurrentUser(user): CurrentUser,
	Path(show_id): Path<Uuid>,
	shows: ShowService,
	episodes: EpisodeService,
	VerifiedForm(form): VerifiedForm<ShowIntentForm>,
) -> Result<Redirect, WebError> {
	let back = format!("/tv/{show_id}");

	match form.intent {
		ShowIntent::MarkWatched => {
			episodes
				.mark_watched(user.id, show_id, form.episode()?)
				.await?
		}
		ShowIntent::MarkUnwatched => {
			episodes
				.mark_unwatched(user.id, show_id, form.episode()?)
				.await?
		}
		ShowIntent::MarkIgnored => {
			episodes
				.mark_ignored(user.id, show_id, form.episode()?)
				.await?
		}
		ShowIntent::MarkUnignored => {
			episodes
				.mark_unignored(user.id, show_id, form.episode()?)
				.await?
		}
		ShowIntent::MarkAllWatched => {
			let count = episodes.mark_all_watched(user.id, show_id).await?;
			info!(user.id = %user.id, show.id = %show_id, count, "marked all episodes watched");
		}
		ShowIntent::MarkSeasonWatched => {
			let season = form.season()?;
			let count = episodes
				.mark_season_watched(user.id, show_id, season)
				.await?;
			info!(user.id = %user.id, show.id = %show_id, season, count, "marked season watched");
		}
		ShowIntent::Archive => shows.set_archived(user.id, show_id, true).await?,
		ShowIntent::Unarchive => shows.set_archived(user.id, show_id, false).await?,
		ShowIntent::Remove => {
			shows.remove(user.id, show_id).await?;
			return Ok(Redirect::to("/tv"));
		}
	}

	Ok(Redirect::to(&back))
}

pub fn router() -> Router<AppState> {
	Router::new()
		.route("/tv", get(list))
		.route("/tv/search", get(search).post(add))
		.route("/tv/upcoming", get(upcoming))
		.route("/tv/recent", get(recent))
		.route("/tv/:id", get(detail).post(update))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn intent_forms_parse() {
		let form: ShowIntentForm = serde_urlencoded::from_str(
			"csrf=abc&intent=mark-watched&episode=67e55044-10b1-426f-9247-bb680e5fe0c8",
		)
		.unwrap();
		assert_eq!(form.intent, ShowIntent::MarkWatched);
		assert!(form.episode().is_ok());
		assert!(form.season().is_err());

		let form: ShowIntentForm =
			serde_urlencoded::from_str("csrf=abc&intent=mark-season-watched&season=2").unwrap();
		assert_eq!(form.intent, ShowIntent::MarkSeasonWatched);
		assert_eq!(form.season().unwrap(), 2);

		assert!(serde_urlencoded::from_str::<ShowIntentForm>("csrf=abc&intent=explode").is_err());
	}

	#[test]
	fn archived_flag() {
		let query = |v: Option<&str>| ListQuery {
			archived: v.map(str::to_owned),
		};
		assert!(query(Some("1")).archived());
		assert!(!query(Some("0")).archived());
		assert!(!query(None).archived());
	}
}

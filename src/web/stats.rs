use super::{views::StatsPage, WebError};
use crate::{
	extractors::{CurrentUser, PageContext},
	AppState,
};
use axum::{response::Response, routing::get, Router};
use showtrack_services::StatsService;

async fn stats(
	CurrentUser(user): CurrentUser,
	ctx: PageContext,
	stats: StatsService,
) -> Result<Response, WebError> {
	let stats = stats.user_stats(user.id).await?;
	Ok(StatsPage { ctx: &ctx, stats }.into_response())
}

pub fn router() -> Router<AppState> {
	Router::new().route("/stats", get(stats))
}

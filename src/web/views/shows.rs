use super::{
	components::{CsrfField, IntentButton, Notice},
	format_date, Template,
};
use crate::extractors::PageContext;
use axum::{
	http::StatusCode,
	response::{IntoResponse, Response},
};
use rstml_component::{write_html, For, HtmlComponent, HtmlContent, HtmlFormatter};
use rstml_component_axum::Html;
use showtrack_entities::{episode, show};
use showtrack_services::{
	episode::{RecentEpisode, UpcomingEpisode},
	show::{EpisodeWithState, Season, ShowDetail, UserShow, WatchState},
};
use showtrack_session::CsrfToken;
use std::{collections::HashSet, fmt};
use tvmaze_client::SearchResult;

fn episode_code(episode: &episode::Model) -> String {
	format!("S{:02}E{:02}", episode.season, episode.number)
}

fn year_range(show: &show::Model) -> Option<String> {
	let premiered = show.premiered?;
	Some(match show.ended {
		Some(ended) if ended.year() != premiered.year() => {
			format!("{} - {}", premiered.year(), ended.year())
		}
		Some(_) => premiered.year().to_string(),
		None => format!("{} -", premiered.year()),
	})
}

#[derive(HtmlComponent)]
struct ShowCard {
	show: UserShow,
}

impl HtmlContent for ShowCard {
	fn fmt(self, f: &mut HtmlFormatter) -> fmt::Result {
		let id = self.show.show.id.to_string();
		let unwatched = match self.show.unwatched {
			0 => "Up to date".to_owned(),
			1 => "1 unwatched episode".to_owned(),
			n => format!("{n} unwatched episodes"),
		};

		write_html!(f,
			<li class="show-card" id=("show-", &*id)>
				<a href=("/tv/", &*id)>
					<img src=self.show.show.image_url.as_deref() alt="" referrerpolicy="no-referrer" loading="lazy" />
					<h2>{&*self.show.show.name}</h2>
					<p class="muted">{unwatched}</p>
				</a>
			</li>
		)
	}
}

pub struct ShowListPage<'a> {
	pub ctx: &'a PageContext,
	pub shows: Vec<UserShow>,
	pub archived: bool,
}

impl<'a> ShowListPage<'a> {
	pub fn into_response(self) -> Response {
		Html(self).into_response()
	}
}

impl<'a> HtmlContent for ShowListPage<'a> {
	fn fmt(self, f: &mut HtmlFormatter) -> fmt::Result {
		let (title, other_link, other_label) = match self.archived {
			false => ("Your shows", "/tv?archived=1", "Archived shows"),
			true => ("Archived shows", "/tv", "Active shows"),
		};
		let empty = self.shows.is_empty();

		write_html!(f,
			<Template title=title ctx=self.ctx>
				<header class="page-header">
					<h1>{title}</h1>
					<a href=other_link>{other_label}</a>
				</header>
				{|f: &mut HtmlFormatter| match empty {
					true => write_html!(f,
						<p class="muted">"Nothing here yet. "<a href="/tv/search">"Find a show"</a>" to get started."</p>
					),
					false => Ok(()),
				}}
				<ul class="show-grid">
					<For items={self.shows}>
						{ |f, show| ShowCard { show }.fmt(f) }
					</For>
				</ul>
			</Template>
		)
	}
}

pub struct SearchPage<'a> {
	pub ctx: &'a PageContext,
	pub query: &'a str,
	pub results: Vec<SearchResult>,
	pub subscribed: HashSet<i32>,
	pub error: Option<&'a str>,
}

impl<'a> SearchPage<'a> {
	pub fn into_response(self, status: StatusCode) -> Response {
		(status, Html(self)).into_response()
	}
}

impl<'a> HtmlContent for SearchPage<'a> {
	fn fmt(self, f: &mut HtmlFormatter) -> fmt::Result {
		let csrf = &self.ctx.csrf;
		let subscribed = &self.subscribed;
		let searched = !self.query.trim().is_empty();
		let no_results = searched && self.results.is_empty() && self.error.is_none();

		write_html!(f,
			<Template title="Search" ctx=self.ctx>
				<h1>"Search"</h1>
				<form method="get" action="/tv/search" class="search-form">
					<input type="search" name="q" value=self.query placeholder="Show name" autofocus />
					<button type="submit" class="btn btn-primary">"Search"</button>
				</form>
				<Notice message=self.error kind="error" />
				{|f: &mut HtmlFormatter| match no_results {
					true => write_html!(f, <p class="muted">"No shows matched your search."</p>),
					false => Ok(()),
				}}
				<ul class="search-results">
					<For items={self.results}>
						{ |f, result| {
							let show = result.show;
							let catalog_id = show.id.to_string();
							let premiered = show.premiered.map(|d| d.year().to_string());
							let added = i32::try_from(show.id).map_or(false, |id| subscribed.contains(&id));

							write_html!(f,
								<li class="search-result">
									<img src=show.image.as_deref() alt="" referrerpolicy="no-referrer" loading="lazy" />
									<div>
										<h2>{&*show.name}" "<span class="muted">{premiered}</span></h2>
										<p>{show.summary.as_deref()}</p>
									</div>
									{|f: &mut HtmlFormatter| match added {
										true => write_html!(f, <span class="badge">"Added"</span>),
										false => write_html!(f,
											<form method="post" action="/tv/search">
												<CsrfField token=csrf />
												<input type="hidden" name="show_id" value=&*catalog_id />
												<button type="submit" class="btn btn-primary">"Add"</button>
											</form>
										),
									}}
								</li>
							)
						} }
					</For>
				</ul>
			</Template>
		)
	}
}

pub struct UpcomingPage<'a> {
	pub ctx: &'a PageContext,
	pub episodes: Vec<UpcomingEpisode>,
}

impl<'a> UpcomingPage<'a> {
	pub fn into_response(self) -> Response {
		Html(self).into_response()
	}
}

impl<'a> HtmlContent for UpcomingPage<'a> {
	fn fmt(self, f: &mut HtmlFormatter) -> fmt::Result {
		write_html!(f,
			<Template title="Upcoming" ctx=self.ctx>
				<h1>"Upcoming episodes"</h1>
				<table class="episode-table">
					<tbody>
						<For items={self.episodes}>
							{ |f, item| {
								let show_id = item.show.id.to_string();
								let air_date = item.episode.air_date.map(format_date);
								write_html!(f,
									<tr>
										<td>{air_date}</td>
										<td><a href=("/tv/", &*show_id)>{&*item.show.name}</a></td>
										<td>{episode_code(&item.episode)}</td>
										<td>{&*item.episode.name}</td>
									</tr>
								)
							} }
						</For>
					</tbody>
				</table>
			</Template>
		)
	}
}

pub struct RecentPage<'a> {
	pub ctx: &'a PageContext,
	pub episodes: Vec<RecentEpisode>,
}

impl<'a> RecentPage<'a> {
	pub fn into_response(self) -> Response {
		Html(self).into_response()
	}
}

impl<'a> HtmlContent for RecentPage<'a> {
	fn fmt(self, f: &mut HtmlFormatter) -> fmt::Result {
		write_html!(f,
			<Template title="Recently watched" ctx=self.ctx>
				<h1>"Recently watched"</h1>
				<table class="episode-table">
					<tbody>
						<For items={self.episodes}>
							{ |f, item| {
								let show_id = item.show.id.to_string();
								write_html!(f,
									<tr>
										<td>{format_date(item.watched_at)}</td>
										<td><a href=("/tv/", &*show_id)>{&*item.show.name}</a></td>
										<td>{episode_code(&item.episode)}</td>
										<td>{&*item.episode.name}</td>
									</tr>
								)
							} }
						</For>
					</tbody>
				</table>
			</Template>
		)
	}
}

#[derive(HtmlComponent)]
struct EpisodeRow<'a> {
	item: EpisodeWithState,
	action: &'a str,
	csrf: &'a CsrfToken,
	subscribed: bool,
}

impl<'a> HtmlContent for EpisodeRow<'a> {
	fn fmt(self, f: &mut HtmlFormatter) -> fmt::Result {
		let episode = &self.item.episode;
		let fields = [("episode", episode.id.to_string())];
		let air_date = episode.air_date.map(format_date);
		let (state_class, state_label) = match (self.item.aired, self.item.state) {
			(_, WatchState::Watched(at)) => ("watched", format!("Watched {}", format_date(at))),
			(_, WatchState::Ignored) => ("ignored", "Ignored".to_owned()),
			(false, WatchState::Unwatched) => ("unaired", "Not aired yet".to_owned()),
			(true, WatchState::Unwatched) => ("unwatched", "Unwatched".to_owned()),
		};
		let (action, csrf, subscribed, aired, state) = (
			self.action,
			self.csrf,
			self.subscribed,
			self.item.aired,
			self.item.state,
		);

		write_html!(f,
			<tr class=("episode ", state_class)>
				<td>{episode_code(episode)}</td>
				<td>{&*episode.name}</td>
				<td>{air_date}</td>
				<td>{state_label}</td>
				<td class="episode-actions">
					{|f: &mut HtmlFormatter| match (subscribed, aired, state) {
						(false, _, _) | (true, false, WatchState::Unwatched) => Ok(()),
						(true, true, WatchState::Unwatched) => write_html!(f,
							<IntentButton action=action intent="mark-watched" token=csrf fields=&fields class="btn-small btn-primary">"Watched"</IntentButton>
							<IntentButton action=action intent="mark-ignored" token=csrf fields=&fields class="btn-small">"Ignore"</IntentButton>
						),
						(true, _, WatchState::Watched(_)) => write_html!(f,
							<IntentButton action=action intent="mark-unwatched" token=csrf fields=&fields class="btn-small">"Unwatch"</IntentButton>
						),
						(true, _, WatchState::Ignored) => write_html!(f,
							<IntentButton action=action intent="mark-unignored" token=csrf fields=&fields class="btn-small">"Unignore"</IntentButton>
						),
					}}
				</td>
			</tr>
		)
	}
}

#[derive(HtmlComponent)]
struct SeasonSection<'a> {
	season: Season,
	action: &'a str,
	csrf: &'a CsrfToken,
	subscribed: bool,
}

impl<'a> HtmlContent for SeasonSection<'a> {
	fn fmt(self, f: &mut HtmlFormatter) -> fmt::Result {
		let fully_watched = self.season.is_fully_watched();
		let fields = [("season", self.season.number.to_string())];
		let title = format!("Season {}", self.season.number);
		let (action, csrf, subscribed) = (self.action, self.csrf, self.subscribed);

		write_html!(f,
			<section class="season" id=("season-", self.season.number.to_string())>
				<header class="season-header">
					<h2>{title}</h2>
					{|f: &mut HtmlFormatter| match (subscribed, fully_watched) {
						(_, true) => write_html!(f, <span class="badge">"Watched"</span>),
						(false, false) => Ok(()),
						(true, false) => write_html!(f,
							<IntentButton action=action intent="mark-season-watched" token=csrf fields=&fields class="btn-small">"Mark season watched"</IntentButton>
						),
					}}
				</header>
				<table class="episode-table">
					<tbody>
						<For items={self.season.episodes}>
							{ |f, item| write_html!(f,
								<EpisodeRow item=item action=action csrf=csrf subscribed=subscribed />
							) }
						</For>
					</tbody>
				</table>
			</section>
		)
	}
}

pub struct ShowPage<'a> {
	pub ctx: &'a PageContext,
	pub detail: ShowDetail,
}

impl<'a> ShowPage<'a> {
	pub fn into_response(self) -> Response {
		Html(self).into_response()
	}
}

impl<'a> HtmlContent for ShowPage<'a> {
	fn fmt(self, f: &mut HtmlFormatter) -> fmt::Result {
		let show = self.detail.show;
		let action = format!("/tv/{}", show.id);
		let action = action.as_str();
		let csrf = &self.ctx.csrf;
		let catalog_id = show.catalog_id.to_string();
		let years = year_range(&show);
		let rating = show.rating.map(|r| format!("Rated {r:.1}"));
		let archived = self.detail.subscription.as_ref().map(|s| s.archived);
		let subscribed = archived.is_some();
		let unwatched = format!("{} unwatched", self.detail.unwatched);
		let seasons = self.detail.seasons;

		write_html!(f,
			<Template title=&*show.name ctx=self.ctx>
				<header class="show-header">
					<img src=show.image_url.as_deref() alt="" referrerpolicy="no-referrer" />
					<div>
						<h1>{&*show.name}</h1>
						<p class="muted">{years}" "{rating}</p>
						<p>{show.summary.as_deref()}</p>
						<div class="actions">
							{|f: &mut HtmlFormatter| match archived {
								None => write_html!(f,
									<form method="post" action="/tv/search">
										<CsrfField token=csrf />
										<input type="hidden" name="show_id" value=&*catalog_id />
										<button type="submit" class="btn btn-primary">"Add to my shows"</button>
									</form>
								),
								Some(archived) => write_html!(f,
									<span class="badge">{&*unwatched}</span>
									<IntentButton action=action intent="mark-all-watched" token=csrf fields=&[] class="btn-primary">"Mark all watched"</IntentButton>
									{|f: &mut HtmlFormatter| match archived {
										false => write_html!(f,
											<IntentButton action=action intent="archive" token=csrf fields=&[] class="">"Archive"</IntentButton>
										),
										true => write_html!(f,
											<IntentButton action=action intent="unarchive" token=csrf fields=&[] class="">"Unarchive"</IntentButton>
										),
									}}
									<IntentButton action=action intent="remove" token=csrf fields=&[] class="btn-danger">"Remove"</IntentButton>
								),
							}}
						</div>
					</div>
				</header>
				<For items={seasons}>
					{ |f, season| write_html!(f,
						<SeasonSection season=season action=action csrf=csrf subscribed=subscribed />
					) }
				</For>
			</Template>
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use time::macros::{date, datetime};
	use uuid::Uuid;

	fn show(premiered: Option<time::Date>, ended: Option<time::Date>) -> show::Model {
		show::Model {
			id: Uuid::nil(),
			catalog_id: 1,
			name: "Show".into(),
			premiered,
			ended,
			rating: None,
			image_url: None,
			summary: None,
			imdb_id: None,
			created_at: datetime!(2023-01-01 0:00),
			updated_at: datetime!(2023-01-01 0:00),
		}
	}

	#[test]
	fn year_ranges() {
		assert_eq!(year_range(&show(None, None)), None);
		assert_eq!(
			year_range(&show(Some(date!(2011 - 04 - 17)), None)).as_deref(),
			Some("2011 -")
		);
		assert_eq!(
			year_range(&show(Some(date!(2011 - 04 - 17)), Some(date!(2019 - 05 - 19)))).as_deref(),
			Some("2011 - 2019")
		);
		assert_eq!(
			year_range(&show(Some(date!(2011 - 04 - 17)), Some(date!(2011 - 06 - 19)))).as_deref(),
			Some("2011")
		);
	}
}

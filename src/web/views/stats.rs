use super::{format_minutes, Template};
use crate::extractors::PageContext;
use axum::response::{IntoResponse, Response};
use rstml_component::{write_html, For, HtmlComponent, HtmlContent, HtmlFormatter};
use rstml_component_axum::Html;
use showtrack_services::{stats::MonthlyStat, UserStats};
use std::fmt;

/// Bar width as a percentage of the busiest month.
fn bar_width(value: u64, max: u64) -> u64 {
	match max {
		0 => 0,
		max => value * 100 / max,
	}
}

#[derive(HtmlComponent)]
struct StatCard {
	label: &'static str,
	value: String,
}

impl HtmlContent for StatCard {
	fn fmt(self, f: &mut HtmlFormatter) -> fmt::Result {
		write_html!(f,
			<div class="stat">
				<div class="stat-label">{self.label}</div>
				<div class="stat-value">{self.value}</div>
			</div>
		)
	}
}

#[derive(HtmlComponent)]
struct MonthBar {
	month: MonthlyStat,
	max_episodes: u64,
}

impl HtmlContent for MonthBar {
	fn fmt(self, f: &mut HtmlFormatter) -> fmt::Result {
		let width = bar_width(self.month.episodes, self.max_episodes).to_string();
		let details = format!(
			"{} episodes, {} shows, {}",
			self.month.episodes,
			self.month.shows,
			format_minutes(self.month.minutes)
		);

		write_html!(f,
			<li class="bar-row">
				<span class="bar-label">{&*self.month.label}</span>
				<span class="bar" style=("width: ", &*width, "%") title=&*details></span>
				<span class="bar-value">{self.month.episodes.to_string()}</span>
			</li>
		)
	}
}

pub struct StatsPage<'a> {
	pub ctx: &'a PageContext,
	pub stats: UserStats,
}

impl<'a> StatsPage<'a> {
	pub fn into_response(self) -> Response {
		Html(self).into_response()
	}
}

impl<'a> HtmlContent for StatsPage<'a> {
	fn fmt(self, f: &mut HtmlFormatter) -> fmt::Result {
		let stats = self.stats;
		let max_episodes = stats.months.iter().map(|m| m.episodes).max().unwrap_or(0);

		write_html!(f,
			<Template title="Stats" ctx=self.ctx>
				<h1>"Stats"</h1>
				<div class="stats">
					<StatCard label="Time watched" value=format_minutes(stats.watch_minutes) />
					<StatCard label="Episodes watched" value=stats.watched.to_string() />
					<StatCard label="Episodes ignored" value=stats.ignored.to_string() />
					<StatCard label="Episodes left" value=stats.unwatched.to_string() />
				</div>
				<h2>"Last 12 months"</h2>
				<ul class="bar-chart">
					<For items={stats.months}>
						{ |f, month| MonthBar { month, max_episodes }.fmt(f) }
					</For>
				</ul>
			</Template>
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn bars_scale_to_the_busiest_month() {
		assert_eq!(bar_width(0, 0), 0);
		assert_eq!(bar_width(5, 10), 50);
		assert_eq!(bar_width(10, 10), 100);
		assert_eq!(bar_width(1, 3), 33);
	}
}

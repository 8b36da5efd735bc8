use crate::{html::strip_tags, TvMazeClient, TvMazeError, TvMazeUrl};
use serde::Deserialize;
use time::{format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime};
use tracing::{info, instrument};
use url::Url;

#[derive(Deserialize, Debug)]
struct SearchResultDto {
	#[serde(default)]
	score: f64,
	show: ShowDto,
}

#[derive(Deserialize, Debug)]
struct ShowDto {
	id: u32,
	name: String,
	#[serde(default)]
	premiered: Option<String>,
	#[serde(default)]
	ended: Option<String>,
	#[serde(default)]
	rating: Option<RatingDto>,
	#[serde(default)]
	image: Option<ImageDto>,
	#[serde(default)]
	summary: Option<String>,
	#[serde(default)]
	externals: Option<ExternalsDto>,
	#[serde(default, rename = "_embedded")]
	embedded: Option<EmbeddedDto>,
}

#[derive(Deserialize, Debug)]
struct RatingDto {
	#[serde(default)]
	average: Option<f64>,
}

#[derive(Deserialize, Debug)]
struct ImageDto {
	#[serde(default)]
	medium: Option<String>,
	#[serde(default)]
	original: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ExternalsDto {
	#[serde(default)]
	imdb: Option<String>,
}

#[derive(Deserialize, Debug)]
struct EmbeddedDto {
	#[serde(default)]
	episodes: Vec<EpisodeDto>,
}

#[derive(Deserialize, Debug)]
struct EpisodeDto {
	id: u32,
	#[serde(default)]
	name: Option<String>,
	#[serde(default)]
	season: Option<u32>,
	#[serde(default)]
	number: Option<u32>,
	#[serde(default)]
	airstamp: Option<String>,
	#[serde(default)]
	runtime: Option<u32>,
	#[serde(default)]
	summary: Option<String>,
	#[serde(default)]
	image: Option<ImageDto>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Show {
	pub id: u32,
	pub name: String,
	pub premiered: Option<Date>,
	pub ended: Option<Date>,
	pub rating: Option<f64>,
	pub image: Option<String>,
	pub summary: Option<String>,
	pub imdb_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Episode {
	pub id: u32,
	pub name: String,
	pub season: u32,
	pub number: u32,
	pub aired_at: Option<OffsetDateTime>,
	/// Minutes.
	pub runtime: Option<u32>,
	pub summary: Option<String>,
	pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
	pub score: f64,
	pub show: Show,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ShowWithEpisodes {
	pub show: Show,
	pub episodes: Vec<Episode>,
}

impl ImageDto {
	fn into_url(self) -> Option<String> {
		self.original.or(self.medium)
	}
}

fn parse_date(url: &Url, value: Option<String>) -> Result<Option<Date>, TvMazeError> {
	let format = format_description!("[year]-[month]-[day]");
	value
		.filter(|v| !v.is_empty())
		.map(|v| {
			Date::parse(&v, format)
				.map_err(|_| TvMazeError::invalid(url, format!("invalid date '{v}'")))
		})
		.transpose()
}

fn non_empty(value: Option<String>) -> Option<String> {
	value.map(|v| strip_tags(&v)).filter(|v| !v.is_empty())
}

impl ShowDto {
	fn validate(self, url: &Url) -> Result<(Show, Vec<EpisodeDto>), TvMazeError> {
		if self.id == 0 {
			return Err(TvMazeError::invalid(url, "show id is missing"));
		}

		let name = self.name.trim().to_owned();
		if name.is_empty() {
			return Err(TvMazeError::invalid(url, "show name is empty"));
		}

		let show = Show {
			id: self.id,
			name,
			premiered: parse_date(url, self.premiered)?,
			ended: parse_date(url, self.ended)?,
			rating: self.rating.and_then(|r| r.average),
			image: self.image.and_then(ImageDto::into_url),
			summary: non_empty(self.summary),
			imdb_id: self.externals.and_then(|e| e.imdb).filter(|v| !v.is_empty()),
		};

		let episodes = self.embedded.map(|e| e.episodes).unwrap_or_default();
		Ok((show, episodes))
	}
}

impl EpisodeDto {
	/// Specials come without a number and are not tracked.
	fn validate(self, url: &Url) -> Result<Option<Episode>, TvMazeError> {
		if self.id == 0 {
			return Err(TvMazeError::invalid(url, "episode id is missing"));
		}

		let (season, number) = match (self.season, self.number) {
			(Some(season), Some(number)) => (season, number),
			_ => return Ok(None),
		};

		let aired_at = self
			.airstamp
			.filter(|v| !v.is_empty())
			.map(|v| {
				OffsetDateTime::parse(&v, &Rfc3339)
					.map_err(|_| TvMazeError::invalid(url, format!("invalid airstamp '{v}'")))
			})
			.transpose()?;

		let name = self
			.name
			.map(|n| n.trim().to_owned())
			.filter(|n| !n.is_empty())
			.unwrap_or_else(|| format!("Episode {number}"));

		Ok(Some(Episode {
			id: self.id,
			name,
			season,
			number,
			aired_at,
			runtime: self.runtime,
			summary: non_empty(self.summary),
			image: self.image.and_then(ImageDto::into_url),
		}))
	}
}

fn validate_episodes(
	url: &Url,
	episodes: Vec<EpisodeDto>,
) -> Result<Vec<Episode>, TvMazeError> {
	let mut result = Vec::with_capacity(episodes.len());
	for episode in episodes {
		if let Some(episode) = episode.validate(url)? {
			result.push(episode);
		}
	}

	result.sort_by_key(|e| (e.season, e.number));
	Ok(result)
}

#[instrument(skip(client))]
pub(crate) async fn search_shows(
	query: &str,
	client: &TvMazeClient,
) -> Result<Vec<SearchResult>, TvMazeError> {
	let query = query.trim();
	if query.is_empty() {
		return Ok(Vec::new());
	}

	let url = client.url(TvMazeUrl::Search(query))?;
	let results: Vec<SearchResultDto> = client
		.get_json(&url)
		.await?
		.ok_or_else(|| TvMazeError::invalid(&url, "search endpoint not found"))?;

	results
		.into_iter()
		.map(|r| {
			let (show, _) = r.show.validate(&url)?;
			Ok(SearchResult {
				score: r.score,
				show,
			})
		})
		.collect()
}

#[instrument(skip(client))]
pub(crate) async fn get_show(id: u32, client: &TvMazeClient) -> Result<Option<Show>, TvMazeError> {
	let url = client.url(TvMazeUrl::Show(id))?;
	info!(url = %url, id = %id, "fetching tvmaze show");

	let dto: Option<ShowDto> = client.get_json(&url).await?;
	dto.map(|dto| dto.validate(&url).map(|(show, _)| show))
		.transpose()
}

#[instrument(skip(client))]
pub(crate) async fn get_episodes(id: u32, client: &TvMazeClient) -> Result<Vec<Episode>, TvMazeError> {
	let url = client.url(TvMazeUrl::Episodes(id))?;
	let episodes: Vec<EpisodeDto> = client.get_json(&url).await?.unwrap_or_default();

	validate_episodes(&url, episodes)
}

#[instrument(skip(client))]
pub(crate) async fn get_show_with_episodes(
	id: u32,
	client: &TvMazeClient,
) -> Result<Option<ShowWithEpisodes>, TvMazeError> {
	let url = client.url(TvMazeUrl::ShowWithEpisodes(id))?;
	info!(url = %url, id = %id, "fetching tvmaze show with episodes");

	let dto: Option<ShowDto> = client.get_json(&url).await?;
	let dto = match dto {
		None => return Ok(None),
		Some(dto) => dto,
	};

	if dto.id != id {
		return Err(TvMazeError::invalid(&url, "show id does not match request"));
	}

	let (show, episodes) = dto.validate(&url)?;
	let episodes = validate_episodes(&url, episodes)?;

	Ok(Some(ShowWithEpisodes { show, episodes }))
}

#[cfg(test)]
mod tests {
	use super::*;
	use time::macros::{date, datetime};

	const SHOW_JSON: &str = r#"{
		"id": 1,
		"name": "Under the Dome",
		"premiered": "2013-06-24",
		"ended": "2015-09-10",
		"rating": { "average": 6.5 },
		"image": {
			"medium": "https://static.tvmaze.com/medium/1.jpg",
			"original": "https://static.tvmaze.com/original/1.jpg"
		},
		"summary": "<p><b>Under the Dome</b> is the story of a small town.</p>",
		"externals": { "tvrage": 25988, "thetvdb": 264492, "imdb": "tt1553656" },
		"_embedded": {
			"episodes": [
				{
					"id": 2,
					"name": "The Fire",
					"season": 1,
					"number": 2,
					"airstamp": "2013-07-02T02:00:00+00:00",
					"runtime": 60,
					"summary": "<p>Second.</p>",
					"image": null
				},
				{
					"id": 1,
					"name": "Pilot",
					"season": 1,
					"number": 1,
					"airstamp": "2013-06-25T02:00:00+00:00",
					"runtime": 60,
					"summary": null,
					"image": { "medium": "https://static.tvmaze.com/medium/e1.jpg" }
				},
				{
					"id": 3,
					"name": "Behind the scenes",
					"season": 1,
					"number": null,
					"airstamp": null,
					"runtime": null
				}
			]
		}
	}"#;

	fn url() -> Url {
		Url::parse("https://api.tvmaze.com/shows/1?embed=episodes").unwrap()
	}

	#[test]
	fn show_with_episodes_is_mapped() {
		let dto: ShowDto = serde_json::from_str(SHOW_JSON).unwrap();
		let (show, episodes) = dto.validate(&url()).unwrap();
		let episodes = validate_episodes(&url(), episodes).unwrap();

		assert_eq!(show.id, 1);
		assert_eq!(show.name, "Under the Dome");
		assert_eq!(show.premiered, Some(date!(2013 - 06 - 24)));
		assert_eq!(show.ended, Some(date!(2015 - 09 - 10)));
		assert_eq!(show.rating, Some(6.5));
		assert_eq!(
			show.image.as_deref(),
			Some("https://static.tvmaze.com/original/1.jpg")
		);
		assert_eq!(
			show.summary.as_deref(),
			Some("Under the Dome is the story of a small town.")
		);
		assert_eq!(show.imdb_id.as_deref(), Some("tt1553656"));

		// the special without a number is dropped, the rest sorted
		assert_eq!(episodes.len(), 2);
		assert_eq!(episodes[0].name, "Pilot");
		assert_eq!(episodes[0].aired_at, Some(datetime!(2013-06-25 02:00 UTC)));
		assert_eq!(
			episodes[0].image.as_deref(),
			Some("https://static.tvmaze.com/medium/e1.jpg")
		);
		assert_eq!(episodes[1].number, 2);
		assert_eq!(episodes[1].runtime, Some(60));
	}

	#[test]
	fn empty_show_name_is_rejected() {
		let dto: ShowDto = serde_json::from_str(r#"{ "id": 5, "name": "  " }"#).unwrap();
		let error = dto.validate(&url()).unwrap_err();
		assert!(matches!(error, TvMazeError::InvalidResponse { .. }));
	}

	#[test]
	fn invalid_premiere_date_is_rejected() {
		let dto: ShowDto =
			serde_json::from_str(r#"{ "id": 5, "name": "Show", "premiered": "june 2013" }"#).unwrap();
		assert!(dto.validate(&url()).is_err());
	}

	#[test]
	fn missing_name_fails_to_parse() {
		let error = serde_json::from_str::<ShowDto>(r#"{ "id": 5 }"#);
		assert!(error.is_err());
	}

	#[test]
	fn unnamed_episode_gets_a_fallback_name() {
		let dto: EpisodeDto =
			serde_json::from_str(r#"{ "id": 9, "name": "", "season": 2, "number": 4 }"#).unwrap();
		let episode = dto.validate(&url()).unwrap().unwrap();
		assert_eq!(episode.name, "Episode 4");
		assert_eq!(episode.aired_at, None);
	}

	#[test]
	fn search_results_keep_their_score() {
		let dto: Vec<SearchResultDto> =
			serde_json::from_str(r#"[{ "score": 0.9, "show": { "id": 139, "name": "Girls" } }]"#)
				.unwrap();
		assert_eq!(dto.len(), 1);
		assert_eq!(dto[0].score, 0.9);
		let (show, episodes) = dto.into_iter().next().unwrap().show.validate(&url()).unwrap();
		assert_eq!(show.name, "Girls");
		assert!(episodes.is_empty());
	}
}

//! Plex webhook payloads.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct PlexPayload {
	pub event: String,
	#[serde(rename = "Metadata")]
	pub metadata: Option<PlexMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlexMetadata {
	#[serde(rename = "type")]
	pub kind: String,
	/// Show title for episodes.
	pub grandparent_title: Option<String>,
	/// Season number for episodes.
	pub parent_index: Option<i32>,
	pub index: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scrobble {
	pub show: String,
	pub season: i32,
	pub number: i32,
}

impl PlexPayload {
	/// The watched episode, for `media.scrobble` events on episodes.
	pub fn scrobble(&self) -> Option<Scrobble> {
		if self.event != "media.scrobble" {
			return None;
		}

		let metadata = self.metadata.as_ref()?;
		if metadata.kind != "episode" {
			return None;
		}

		Some(Scrobble {
			show: metadata.grandparent_title.clone()?,
			season: metadata.parent_index?,
			number: metadata.index?,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parse(json: &str) -> PlexPayload {
		serde_json::from_str(json).expect("valid payload")
	}

	#[test]
	fn episode_scrobble() {
		let payload = parse(
			r#"{
				"event": "media.scrobble",
				"user": true,
				"owner": true,
				"Account": { "id": 1, "title": "someone" },
				"Metadata": {
					"type": "episode",
					"title": "Pilot",
					"grandparentTitle": "Severance",
					"parentIndex": 1,
					"index": 1
				}
			}"#,
		);

		assert_eq!(
			payload.scrobble(),
			Some(Scrobble {
				show: "Severance".into(),
				season: 1,
				number: 1,
			})
		);
	}

	#[test]
	fn other_events_are_ignored() {
		let payload = parse(
			r#"{ "event": "media.play", "Metadata": { "type": "episode", "grandparentTitle": "Severance", "parentIndex": 1, "index": 1 } }"#,
		);
		assert_eq!(payload.scrobble(), None);

		let payload = parse(r#"{ "event": "media.scrobble", "Metadata": { "type": "movie", "title": "Heat" } }"#);
		assert_eq!(payload.scrobble(), None);

		let payload = parse(r#"{ "event": "library.new" }"#);
		assert_eq!(payload.scrobble(), None);
	}
}

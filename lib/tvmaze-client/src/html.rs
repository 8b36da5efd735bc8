/// Reduces the catalog's HTML summaries (`<p>..</p>`, `<b>..</b>`) to plain text.
pub(crate) fn strip_tags(html: &str) -> String {
	let mut text = String::with_capacity(html.len());
	let mut in_tag = false;

	for c in html.chars() {
		match c {
			'<' => in_tag = true,
			'>' if in_tag => {
				in_tag = false;
				if !text.is_empty() && !text.ends_with(' ') {
					text.push(' ');
				}
			}
			_ if in_tag => {}
			_ => text.push(c),
		}
	}

	let text = text
		.replace("&amp;", "&")
		.replace("&quot;", "\"")
		.replace("&#39;", "'")
		.replace("&lt;", "<")
		.replace("&gt;", ">")
		.replace("&nbsp;", " ");

	text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn strips_paragraphs_and_entities() {
		assert_eq!(
			strip_tags("<p><b>Under the Dome</b> is the story of a small town&#39;s fate.</p><p>Part two &amp; more</p>"),
			"Under the Dome is the story of a small town's fate. Part two & more"
		);
	}

	#[test]
	fn plain_text_is_untouched() {
		assert_eq!(strip_tags("no markup here"), "no markup here");
	}
}

use super::components::CsrfField;
use crate::extractors::PageContext;
use rstml_component::{write_html, HtmlComponent, HtmlContent, HtmlFormatter};
use showtrack_entities::user;
use showtrack_session::CsrfToken;
use std::fmt;

fn gravatar_url(email: &str) -> String {
	format!(
		"https://www.gravatar.com/avatar/{:x}?d=mp&s=80",
		md5::compute(email.trim().to_lowercase().as_bytes())
	)
}

#[derive(HtmlComponent)]
struct UserMenu<'a> {
	user: Option<&'a user::Model>,
	csrf: &'a CsrfToken,
}

impl<'a> HtmlContent for UserMenu<'a> {
	fn fmt(self, formatter: &mut HtmlFormatter) -> fmt::Result {
		match self.user {
			None => write_html!(formatter,
				<div class="nav-user">
					<a href="/login" class="btn btn-ghost">"Log in"</a>
				</div>
			),
			Some(user) => {
				let avatar_url = gravatar_url(&user.email);
				write_html!(formatter,
					<div class="nav-user">
						<a href="/account" class="avatar" title=&*user.display_name>
							<img src=&*avatar_url alt="" referrerpolicy="no-referrer" width="40" height="40" />
						</a>
						<form method="post" action="/logout">
							<CsrfField token=self.csrf />
							<button type="submit" class="btn btn-ghost">"Log out"</button>
						</form>
					</div>
				)
			}
		}
	}
}

#[derive(HtmlComponent)]
struct NavBar<'a> {
	user: Option<&'a user::Model>,
	csrf: &'a CsrfToken,
}

impl<'a> HtmlContent for NavBar<'a> {
	fn fmt(self, formatter: &mut HtmlFormatter) -> fmt::Result {
		write_html!(formatter,
			<nav class="navbar">
				<a class="brand" href="/">"showtrack"</a>
				{|f: &mut HtmlFormatter| match self.user {
					None => Ok(()),
					Some(_) => write_html!(f,
						<ul class="nav-links">
							<li><a href="/tv">"Shows"</a></li>
							<li><a href="/tv/upcoming">"Upcoming"</a></li>
							<li><a href="/tv/recent">"Recent"</a></li>
							<li><a href="/stats">"Stats"</a></li>
							<li>
								<form method="get" action="/tv/search" class="nav-search">
									<input type="search" name="q" placeholder="Search shows" />
								</form>
							</li>
						</ul>
					),
				}}
				<UserMenu user=self.user csrf=self.csrf />
			</nav>
		)
	}
}

#[derive(HtmlComponent)]
pub struct Template<'a, T, C>
where
	T: AsRef<str>,
	C: HtmlContent,
{
	pub title: T,
	pub children: C,
	pub ctx: &'a PageContext,
}

impl<'a, T, C> HtmlContent for Template<'a, T, C>
where
	T: AsRef<str>,
	C: HtmlContent,
{
	fn fmt(self, formatter: &mut HtmlFormatter) -> fmt::Result {
		write_html!(formatter,
			<!DOCTYPE html>
			<html lang="en">
				<head>
					<meta charset="UTF-8" />
					<meta name="viewport" content="width=device-width, initial-scale=1" />
					<meta name="csrf-token" content=self.ctx.csrf.as_str() />
					<meta name="theme-color" content="#1d232a">
					<title>{self.title.as_ref()}" | showtrack"</title>
					<link rel="stylesheet" type="text/css" href="/public/app.css" />
					<script src="/public/passkeys.js" type="module" />
				</head>
				<body>
					<NavBar user=self.ctx.user.as_deref() csrf=&self.ctx.csrf />
					<main class="page">
						{self.children}
					</main>
				</body>
			</html>
		)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn gravatar_hash_ignores_case_and_whitespace() {
		assert_eq!(gravatar_url(" Me@Example.com "), gravatar_url("me@example.com"));
		assert!(gravatar_url("me@example.com").starts_with("https://www.gravatar.com/avatar/"));
	}
}

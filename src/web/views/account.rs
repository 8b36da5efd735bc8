use super::{
	components::{CsrfField, FieldError, IntentButton, Notice},
	format_date, Template,
};
use crate::extractors::PageContext;
use axum::{
	http::StatusCode,
	response::{IntoResponse, Response},
};
use rstml_component::{write_html, For, HtmlContent, HtmlFormatter};
use rstml_component_axum::Html;
use showtrack_entities::{invite, passkey, user};
use showtrack_services::ValidationErrors;
use std::fmt;
use url::Url;

const ACTION: &str = "/account";

pub struct AccountPage<'a> {
	pub ctx: &'a PageContext,
	pub user: &'a user::Model,
	pub self_url: &'a Url,
	pub has_password: bool,
	pub passkeys: Vec<passkey::Model>,
	pub invites: Vec<invite::Model>,
	pub errors: Option<&'a ValidationErrors>,
	pub notice: Option<&'a str>,
	pub error: Option<&'a str>,
}

impl<'a> AccountPage<'a> {
	pub fn into_response(self, status: StatusCode) -> Response {
		(status, Html(self)).into_response()
	}

	fn link(&self, path: &str) -> String {
		self
			.self_url
			.join(path)
			.map(String::from)
			.unwrap_or_else(|_| path.to_owned())
	}
}

impl<'a> HtmlContent for AccountPage<'a> {
	fn fmt(self, f: &mut HtmlFormatter) -> fmt::Result {
		let csrf = &self.ctx.csrf;
		let errors = self.errors;
		let has_password = self.has_password;
		let plex_url = self
			.user
			.plex_token
			.as_deref()
			.map(|token| self.link(&format!("plex/{token}")));
		let invites = self
			.invites
			.iter()
			.map(|invite| {
				let link = self.link(&format!("join?invite={}", invite.id));
				let status = match invite.used_at {
					Some(at) => format!("Used {}", format_date(at)),
					None => "Open".to_owned(),
				};
				(link, status)
			})
			.collect::<Vec<_>>();

		write_html!(f,
			<Template title="Account" ctx=self.ctx>
				<h1>"Account"</h1>
				<Notice message=self.notice kind="info" />
				<Notice message=self.error kind="error" />

				<section class="card">
					<h2>"Profile"</h2>
					<p>{&*self.user.display_name}" ("{&*self.user.email}")"</p>
				</section>

				<section class="card">
					<h2>"Password"</h2>
					<form method="post" action=ACTION>
						<CsrfField token=csrf />
						<input type="hidden" name="intent" value="change-password" />
						{|f: &mut HtmlFormatter| match has_password {
							false => Ok(()),
							true => write_html!(f,
								<label>
									"Current password"
									<input type="password" name="current_password" autocomplete="current-password" required />
								</label>
								<FieldError errors=errors field="current_password" />
							),
						}}
						<label>
							"New password"
							<input type="password" name="new_password" autocomplete="new-password" required />
						</label>
						<FieldError errors=errors field="new_password" />
						<button type="submit" class="btn btn-primary">"Save password"</button>
					</form>
					{|f: &mut HtmlFormatter| match has_password {
						false => Ok(()),
						true => write_html!(f,
							<IntentButton action=ACTION intent="remove-password" token=csrf fields=&[] class="btn-danger">"Remove password"</IntentButton>
						),
					}}
				</section>

				<section class="card">
					<h2>"Passkeys"</h2>
					<ul class="passkeys">
						<For items={self.passkeys}>
							{ |f, passkey| {
								let fields = [("passkey", passkey.id.to_string())];
								let last_used = match passkey.last_used_at {
									Some(at) => format!("last used {}", format_date(at)),
									None => "never used".to_owned(),
								};
								write_html!(f,
									<li>
										<span>{&*passkey.name}</span>" "
										<span class="muted">"added "{format_date(passkey.created_at)}", "{last_used}</span>
										<IntentButton action=ACTION intent="delete-passkey" token=csrf fields=&fields class="btn-small btn-danger">"Delete"</IntentButton>
									</li>
								)
							} }
						</For>
					</ul>
					<form data-passkey-register class="passkey-register">
						<input type="text" name="name" placeholder="Passkey name" required />
						<button type="submit" class="btn">"Add passkey"</button>
					</form>
					<p class="passkey-error" hidden></p>
				</section>

				<section class="card">
					<h2>"Plex"</h2>
					{|f: &mut HtmlFormatter| match plex_url {
						None => write_html!(f,
							<p>"Generate a webhook address to mark episodes watched from Plex."</p>
							<IntentButton action=ACTION intent="generate-plex-token" token=csrf fields=&[] class="btn-primary">"Generate webhook"</IntentButton>
						),
						Some(url) => write_html!(f,
							<p>"Add this address as a webhook in Plex:"</p>
							<input type="text" readonly value=&*url class="copyable" />
							<IntentButton action=ACTION intent="generate-plex-token" token=csrf fields=&[] class="">"Regenerate"</IntentButton>
							<IntentButton action=ACTION intent="remove-plex-token" token=csrf fields=&[] class="btn-danger">"Remove"</IntentButton>
						),
					}}
				</section>

				<section class="card">
					<h2>"Invites"</h2>
					<ul class="invites">
						<For items={invites}>
							{ |f, (link, status)| write_html!(f,
								<li>
									<input type="text" readonly value=&*link class="copyable" />
									<span class="muted">{status}</span>
								</li>
							) }
						</For>
					</ul>
					<IntentButton action=ACTION intent="create-invite" token=csrf fields=&[] class="">"Create invite"</IntentButton>
				</section>

				<section class="card danger-zone">
					<h2>"Delete account"</h2>
					<p>"This removes your account, shows and watch history for good."</p>
					<IntentButton action=ACTION intent="delete-account" token=csrf fields=&[] class="btn-danger">"Delete my account"</IntentButton>
				</section>
			</Template>
		)
	}
}

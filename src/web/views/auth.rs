use super::{
	components::{CsrfField, FieldError, Notice},
	Template,
};
use crate::extractors::PageContext;
use axum::{
	http::StatusCode,
	response::{IntoResponse, Response},
};
use rstml_component::{write_html, HtmlContent, HtmlFormatter};
use rstml_component_axum::Html;
use showtrack_services::ValidationErrors;
use std::fmt;

pub struct LoginPage<'a> {
	pub ctx: &'a PageContext,
	pub return_to: &'a str,
	pub email: &'a str,
	pub error: Option<&'a str>,
	pub notice: Option<&'a str>,
}

impl<'a> LoginPage<'a> {
	pub fn into_response(self, status: StatusCode) -> Response {
		(status, Html(self)).into_response()
	}
}

impl<'a> HtmlContent for LoginPage<'a> {
	fn fmt(self, f: &mut HtmlFormatter) -> fmt::Result {
		write_html!(f,
			<Template title="Log in" ctx=self.ctx>
				<section class="card narrow">
					<h1>"Log in"</h1>
					<Notice message=self.notice kind="info" />
					<Notice message=self.error kind="error" />
					<form method="post" action="/login" id="login-form">
						<CsrfField token=&self.ctx.csrf />
						<input type="hidden" name="return_to" value=self.return_to />
						<label>
							"Email"
							<input type="email" name="email" value=self.email autocomplete="username webauthn" required />
						</label>
						<label>
							"Password"
							<input type="password" name="password" autocomplete="current-password" />
						</label>
						<div class="actions">
							<button type="submit" class="btn btn-primary">"Log in"</button>
							<button type="button" class="btn" data-passkey-login data-return-to=self.return_to>"Use a passkey"</button>
						</div>
					</form>
					<p class="passkey-error" hidden></p>
					<p><a href="/forgot-password">"Forgot your password?"</a></p>
				</section>
			</Template>
		)
	}
}

pub struct JoinPage<'a> {
	pub ctx: &'a PageContext,
	pub invite: &'a str,
	pub email: &'a str,
	pub display_name: &'a str,
	pub errors: Option<&'a ValidationErrors>,
}

impl<'a> JoinPage<'a> {
	pub fn into_response(self, status: StatusCode) -> Response {
		(status, Html(self)).into_response()
	}
}

impl<'a> HtmlContent for JoinPage<'a> {
	fn fmt(self, f: &mut HtmlFormatter) -> fmt::Result {
		write_html!(f,
			<Template title="Join" ctx=self.ctx>
				<section class="card narrow">
					<h1>"Create an account"</h1>
					<form method="post" action="/join">
						<CsrfField token=&self.ctx.csrf />
						<label>
							"Invite code"
							<input type="text" name="invite" value=self.invite required />
						</label>
						<FieldError errors=self.errors field="invite" />
						<label>
							"Email"
							<input type="email" name="email" value=self.email autocomplete="username" required />
						</label>
						<FieldError errors=self.errors field="email" />
						<label>
							"Display name"
							<input type="text" name="display_name" value=self.display_name required />
						</label>
						<FieldError errors=self.errors field="display_name" />
						<label>
							"Password"
							<input type="password" name="password" autocomplete="new-password" required />
						</label>
						<FieldError errors=self.errors field="password" />
						<button type="submit" class="btn btn-primary">"Join"</button>
					</form>
				</section>
			</Template>
		)
	}
}

pub struct ForgotPasswordPage<'a> {
	pub ctx: &'a PageContext,
	pub email: &'a str,
	pub sent: bool,
	pub errors: Option<&'a ValidationErrors>,
}

impl<'a> ForgotPasswordPage<'a> {
	pub fn into_response(self, status: StatusCode) -> Response {
		(status, Html(self)).into_response()
	}
}

impl<'a> HtmlContent for ForgotPasswordPage<'a> {
	fn fmt(self, f: &mut HtmlFormatter) -> fmt::Result {
		let sent = self
			.sent
			.then_some("If an account exists for that address, a reset link is on its way.");

		write_html!(f,
			<Template title="Forgot password" ctx=self.ctx>
				<section class="card narrow">
					<h1>"Reset your password"</h1>
					<Notice message=sent kind="info" />
					<form method="post" action="/forgot-password">
						<CsrfField token=&self.ctx.csrf />
						<label>
							"Email"
							<input type="email" name="email" value=self.email autocomplete="username" required />
						</label>
						<FieldError errors=self.errors field="email" />
						<button type="submit" class="btn btn-primary">"Send reset link"</button>
					</form>
				</section>
			</Template>
		)
	}
}

pub struct ResetPasswordPage<'a> {
	pub ctx: &'a PageContext,
	pub token: &'a str,
	pub valid: bool,
	pub errors: Option<&'a ValidationErrors>,
}

impl<'a> ResetPasswordPage<'a> {
	pub fn into_response(self, status: StatusCode) -> Response {
		(status, Html(self)).into_response()
	}
}

impl<'a> HtmlContent for ResetPasswordPage<'a> {
	fn fmt(self, f: &mut HtmlFormatter) -> fmt::Result {
		let token = self.token;
		let ctx = self.ctx;
		let errors = self.errors;

		write_html!(f,
			<Template title="Reset password" ctx=self.ctx>
				<section class="card narrow">
					<h1>"Choose a new password"</h1>
					{|f: &mut HtmlFormatter| match self.valid {
						false => write_html!(f,
							<p>"This reset link is invalid or has expired. "<a href="/forgot-password">"Request a new one"</a>"."</p>
						),
						true => write_html!(f,
							<form method="post" action=("/reset-password/", token)>
								<CsrfField token=&ctx.csrf />
								<label>
									"New password"
									<input type="password" name="password" autocomplete="new-password" required />
								</label>
								<FieldError errors=errors field="password" />
								<button type="submit" class="btn btn-primary">"Set password"</button>
							</form>
						),
					}}
				</section>
			</Template>
		)
	}
}

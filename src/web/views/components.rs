use rstml_component::{write_html, HtmlComponent, HtmlContent, HtmlFormatter};
use showtrack_services::ValidationErrors;
use showtrack_session::CsrfToken;
use std::fmt;

#[derive(HtmlComponent)]
pub struct CsrfField<'a> {
	pub token: &'a CsrfToken,
}

impl<'a> HtmlContent for CsrfField<'a> {
	fn fmt(self, f: &mut HtmlFormatter) -> fmt::Result {
		write_html!(f, <input type="hidden" name="csrf" value=self.token.as_str() />)
	}
}

#[derive(HtmlComponent)]
pub struct FieldError<'a> {
	pub errors: Option<&'a ValidationErrors>,
	pub field: &'static str,
}

impl<'a> HtmlContent for FieldError<'a> {
	fn fmt(self, f: &mut HtmlFormatter) -> fmt::Result {
		match self.errors.and_then(|e| e.get(self.field)) {
			None => Ok(()),
			Some(message) => write_html!(f, <p class="field-error">{message}</p>),
		}
	}
}

#[derive(HtmlComponent)]
pub struct Notice<'a> {
	pub message: Option<&'a str>,
	pub kind: &'static str,
}

impl<'a> HtmlContent for Notice<'a> {
	fn fmt(self, f: &mut HtmlFormatter) -> fmt::Result {
		match self.message {
			None => Ok(()),
			Some(message) => write_html!(f, <p class=("notice notice-", self.kind) role="status">{message}</p>),
		}
	}
}

/// A single-button form posting an intent.
#[derive(HtmlComponent)]
pub struct IntentButton<'a, C>
where
	C: HtmlContent,
{
	pub action: &'a str,
	pub intent: &'static str,
	pub token: &'a CsrfToken,
	pub fields: &'a [(&'static str, String)],
	pub class: &'static str,
	pub children: C,
}

impl<'a, C> HtmlContent for IntentButton<'a, C>
where
	C: HtmlContent,
{
	fn fmt(self, f: &mut HtmlFormatter) -> fmt::Result {
		let fields = self.fields;
		write_html!(f,
			<form method="post" action=self.action class="inline-form">
				<CsrfField token=self.token />
				<input type="hidden" name="intent" value=self.intent />
				{|f: &mut HtmlFormatter| {
					for (name, value) in fields {
						write_html!(f, <input type="hidden" name=*name value=&**value />)?;
					}
					Ok(())
				}}
				<button type="submit" class=("btn ", self.class)>{self.children}</button>
			</form>
		)
	}
}

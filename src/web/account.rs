use super::{views::AccountPage, WebError};
use crate::{
	extractors::{CsrfProtected, CurrentUser, PageContext, VerifiedForm},
	AppState, SelfUrl,
};
use axum::{
	extract::{Query, State},
	http::StatusCode,
	response::{IntoResponse, Redirect, Response},
	routing::get,
	Router,
};
use serde::Deserialize;
use showtrack_entities::user;
use showtrack_services::{AuthService, InviteService, UserService, UserServiceError, ValidationErrors};
use tracing::info;
use url::Url;
use uuid::Uuid;

#[derive(Default)]
struct Feedback<'a> {
	errors: Option<ValidationErrors>,
	notice: Option<&'a str>,
	error: Option<&'a str>,
}

async fn render(
	ctx: &PageContext,
	user: &user::Model,
	self_url: &Url,
	users: &UserService,
	invites: &InviteService,
	feedback: Feedback<'_>,
	status: StatusCode,
) -> Result<Response, WebError> {
	let (has_password, passkeys, invites) = futures::try_join!(
		users.has_password(user),
		users.passkeys(user.id),
		invites.created_by(user.id),
	)?;

	Ok(
		AccountPage {
			ctx,
			user,
			self_url,
			has_password,
			passkeys,
			invites,
			errors: feedback.errors.as_ref(),
			notice: feedback.notice,
			error: feedback.error,
		}
		.into_response(status),
	)
}

/// Outcome of a successful intent, carried over the redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum Done {
	PasswordChanged,
	PasswordRemoved,
	PasskeyDeleted,
	PlexTokenGenerated,
	PlexTokenRemoved,
	InviteCreated,
}

impl Done {
	fn as_str(self) -> &'static str {
		match self {
			Self::PasswordChanged => "password-changed",
			Self::PasswordRemoved => "password-removed",
			Self::PasskeyDeleted => "passkey-deleted",
			Self::PlexTokenGenerated => "plex-token-generated",
			Self::PlexTokenRemoved => "plex-token-removed",
			Self::InviteCreated => "invite-created",
		}
	}

	fn message(self) -> &'static str {
		match self {
			Self::PasswordChanged => "Your password has been changed.",
			Self::PasswordRemoved => "Your password has been removed. Log in with a passkey from now on.",
			Self::PasskeyDeleted => "The passkey has been deleted.",
			Self::PlexTokenGenerated => "A new Plex webhook address has been generated.",
			Self::PlexTokenRemoved => "The Plex webhook has been removed.",
			Self::InviteCreated => "A new invite has been created.",
		}
	}
}

#[derive(Deserialize)]
struct AccountQuery {
	#[serde(default)]
	done: Option<Done>,
}

async fn show(
	CurrentUser(user): CurrentUser,
	ctx: PageContext,
	State(SelfUrl(self_url)): State<SelfUrl>,
	Query(query): Query<AccountQuery>,
	users: UserService,
	invites: InviteService,
) -> Result<Response, WebError> {
	let feedback = Feedback {
		notice: query.done.map(Done::message),
		..Default::default()
	};

	render(
		&ctx,
		&user,
		&self_url,
		&users,
		&invites,
		feedback,
		StatusCode::OK,
	)
	.await
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum AccountIntent {
	ChangePassword,
	RemovePassword,
	DeleteAccount,
	GeneratePlexToken,
	RemovePlexToken,
	DeletePasskey,
	CreateInvite,
}

#[derive(Deserialize)]
struct AccountForm {
	csrf: String,
	intent: AccountIntent,
	#[serde(default)]
	current_password: Option<String>,
	#[serde(default)]
	new_password: Option<String>,
	#[serde(default)]
	passkey: Option<Uuid>,
}

impl CsrfProtected for AccountForm {
	fn csrf(&self) -> &str {
		&self.csrf
	}
}

async fn update(
	CurrentUser(user): CurrentUser,
	ctx: PageContext,
	State(SelfUrl(self_url)): State<SelfUrl>,
	auth: AuthService,
	users: UserService,
	invites: InviteService,
	VerifiedForm(form): VerifiedForm<AccountForm>,
) -> Result<Response, WebError> {
	let result = match form.intent {
		AccountIntent::ChangePassword => {
			let current = form.current_password.filter(|p| !p.is_empty());
			let new_password = form.new_password.unwrap_or_default();
			users
				.change_password(&user, current, new_password)
				.await
				.map(|()| Done::PasswordChanged)
		}
		AccountIntent::RemovePassword => users
			.remove_password(user.id)
			.await
			.map(|()| Done::PasswordRemoved),
		AccountIntent::DeletePasskey => {
			let passkey = form
				.passkey
				.ok_or_else(|| WebError::BadRequest("missing passkey".into()))?;
			users
				.delete_passkey(&user, passkey)
				.await
				.map(|()| Done::PasskeyDeleted)
		}
		AccountIntent::GeneratePlexToken => users
			.generate_plex_token(user.id)
			.await
			.map(|_| Done::PlexTokenGenerated),
		AccountIntent::RemovePlexToken => users
			.remove_plex_token(user.id)
			.await
			.map(|()| Done::PlexTokenRemoved),
		AccountIntent::CreateInvite => {
			let invite = invites.create(user.id).await?;
			info!(user.id = %user.id, invite.id = %invite.id, "invite created");
			Ok(Done::InviteCreated)
		}
		AccountIntent::DeleteAccount => {
			users.delete_account(user.id).await?;
			auth.logout().await?;
			return Ok(Redirect::to("/login").into_response());
		}
	};

	let (feedback, status) = match result {
		Ok(done) => {
			let location = format!("/account?done={}", done.as_str());
			return Ok(Redirect::to(&location).into_response());
		}
		Err(UserServiceError::Validation(errors)) => (
			Feedback {
				errors: Some(errors),
				..Default::default()
			},
			StatusCode::BAD_REQUEST,
		),
		Err(UserServiceError::WrongPassword) => (
			Feedback {
				errors: Some(ValidationErrors::single(
					"current_password",
					"Current password is incorrect",
				)),
				..Default::default()
			},
			StatusCode::BAD_REQUEST,
		),
		Err(UserServiceError::PasskeyRequired) => (
			Feedback {
				error: Some("Add a passkey before removing your password."),
				..Default::default()
			},
			StatusCode::CONFLICT,
		),
		Err(UserServiceError::LastCredential) => (
			Feedback {
				error: Some("You cannot delete your last passkey without a password."),
				..Default::default()
			},
			StatusCode::CONFLICT,
		),
		Err(UserServiceError::PasskeyNotFound) => return Err(WebError::NotFound),
		Err(e) => return Err(e.into()),
	};

	render(&ctx, &user, &self_url, &users, &invites, feedback, status).await
}

pub fn router() -> Router<AppState> {
	Router::new().route("/account", get(show).post(update))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn account_forms_parse() {
		let form: AccountForm = serde_urlencoded::from_str(
			"csrf=t&intent=change-password&current_password=&new_password=hunter22",
		)
		.unwrap();
		assert_eq!(form.intent, AccountIntent::ChangePassword);
		assert_eq!(form.current_password.as_deref(), Some(""));
		assert_eq!(form.new_password.as_deref(), Some("hunter22"));

		let form: AccountForm = serde_urlencoded::from_str(
			"csrf=t&intent=delete-passkey&passkey=67e55044-10b1-426f-9247-bb680e5fe0c8",
		)
		.unwrap();
		assert_eq!(form.intent, AccountIntent::DeletePasskey);
		assert!(form.passkey.is_some());
	}

	#[test]
	fn done_round_trips_through_the_query() {
		for done in [
			Done::PasswordChanged,
			Done::PasswordRemoved,
			Done::PasskeyDeleted,
			Done::PlexTokenGenerated,
			Done::PlexTokenRemoved,
			Done::InviteCreated,
		] {
			let query: AccountQuery =
				serde_urlencoded::from_str(&format!("done={}", done.as_str())).unwrap();
			assert_eq!(query.done, Some(done));
		}
	}
}

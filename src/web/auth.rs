use super::{
	views::{ForgotPasswordPage, JoinPage, LoginPage, ResetPasswordPage},
	WebError,
};
use crate::{
	extractors::{safe_return_to, CsrfProtected, PageContext, VerifiedForm},
	AppState, SelfUrl,
};
use axum::{
	extract::{Path, Query, State},
	http::StatusCode,
	response::{IntoResponse, Redirect, Response},
	routing::{get, post},
	Router,
};
use serde::Deserialize;
use showtrack_services::{
	user::NewUser, AuthError, AuthService, PasswordResetError, PasswordResetService, UserService,
	UserServiceError, ValidationErrors,
};
use tracing::info;
use uuid::Uuid;

#[derive(Deserialize)]
struct LoginQuery {
	#[serde(default)]
	return_to: Option<String>,
}

async fn login_page(ctx: PageContext, Query(query): Query<LoginQuery>) -> Response {
	let return_to = safe_return_to(query.return_to.as_deref());
	if ctx.user.is_some() {
		return Redirect::to(return_to).into_response();
	}

	LoginPage {
		ctx: &ctx,
		return_to,
		email: "",
		error: None,
		notice: None,
	}
	.into_response(StatusCode::OK)
}

#[derive(Deserialize)]
struct LoginForm {
	csrf: String,
	email: String,
	#[serde(default)]
	password: String,
	#[serde(default)]
	return_to: Option<String>,
}

impl CsrfProtected for LoginForm {
	fn csrf(&self) -> &str {
		&self.csrf
	}
}

async fn login(
	ctx: PageContext,
	auth: AuthService,
	VerifiedForm(form): VerifiedForm<LoginForm>,
) -> Result<Response, WebError> {
	let return_to = safe_return_to(form.return_to.as_deref());
	match auth.login_with_password(&form.email, &form.password).await {
		Ok(_) => Ok(Redirect::to(return_to).into_response()),
		Err(AuthError::InvalidCredentials) => Ok(
			LoginPage {
				ctx: &ctx,
				return_to,
				email: &form.email,
				error: Some("Invalid email or password."),
				notice: None,
			}
			.into_response(StatusCode::UNAUTHORIZED),
		),
		Err(e) => Err(e.into()),
	}
}

#[derive(Deserialize)]
struct CsrfForm {
	csrf: String,
}

impl CsrfProtected for CsrfForm {
	fn csrf(&self) -> &str {
		&self.csrf
	}
}

async fn logout(
	auth: AuthService,
	VerifiedForm(_): VerifiedForm<CsrfForm>,
) -> Result<Redirect, WebError> {
	auth.logout().await?;
	Ok(Redirect::to("/login"))
}

#[derive(Deserialize)]
struct JoinQuery {
	#[serde(default)]
	invite: Option<String>,
}

async fn join_page(ctx: PageContext, Query(query): Query<JoinQuery>) -> Response {
	if ctx.user.is_some() {
		return Redirect::to("/tv").into_response();
	}

	JoinPage {
		ctx: &ctx,
		invite: query.invite.as_deref().unwrap_or_default(),
		email: "",
		display_name: "",
		errors: None,
	}
	.into_response(StatusCode::OK)
}

#[derive(Deserialize)]
struct JoinForm {
	csrf: String,
	invite: String,
	email: String,
	display_name: String,
	password: String,
}

impl CsrfProtected for JoinForm {
	fn csrf(&self) -> &str {
		&self.csrf
	}
}

async fn join(
	ctx: PageContext,
	auth: AuthService,
	users: UserService,
	VerifiedForm(form): VerifiedForm<JoinForm>,
) -> Result<Response, WebError> {
	let render = |errors: &ValidationErrors| {
		JoinPage {
			ctx: &ctx,
			invite: &form.invite,
			email: &form.email,
			display_name: &form.display_name,
			errors: Some(errors),
		}
		.into_response(StatusCode::BAD_REQUEST)
	};

	let Ok(invite) = Uuid::parse_str(form.invite.trim()) else {
		return Ok(render(&ValidationErrors::single(
			"invite",
			"This invite code is not valid",
		)));
	};

	let new_user = NewUser {
		invite,
		email: form.email.clone(),
		display_name: form.display_name.clone(),
		password: form.password.clone(),
	};

	let user = match users.join(new_user).await {
		Ok(user) => user,
		Err(UserServiceError::Validation(errors)) => return Ok(render(&errors)),
		Err(UserServiceError::InvalidInvite) => {
			return Ok(render(&ValidationErrors::single(
				"invite",
				"This invite has already been used or does not exist",
			)))
		}
		Err(UserServiceError::EmailInUse) => {
			return Ok(render(&ValidationErrors::single(
				"email",
				"An account with this email already exists",
			)))
		}
		Err(e) => return Err(e.into()),
	};

	info!(user.id = %user.id, "user joined");
	auth.start_session(user).await?;
	Ok(Redirect::to("/tv").into_response())
}

async fn forgot_password_page(ctx: PageContext) -> Response {
	ForgotPasswordPage {
		ctx: &ctx,
		email: "",
		sent: false,
		errors: None,
	}
	.into_response(StatusCode::OK)
}

#[derive(Deserialize)]
struct ForgotPasswordForm {
	csrf: String,
	email: String,
}

impl CsrfProtected for ForgotPasswordForm {
	fn csrf(&self) -> &str {
		&self.csrf
	}
}

async fn forgot_password(
	ctx: PageContext,
	State(SelfUrl(self_url)): State<SelfUrl>,
	resets: PasswordResetService,
	VerifiedForm(form): VerifiedForm<ForgotPasswordForm>,
) -> Result<Response, WebError> {
	match resets.request(&form.email, &self_url).await {
		Ok(()) => Ok(
			ForgotPasswordPage {
				ctx: &ctx,
				email: &form.email,
				sent: true,
				errors: None,
			}
			.into_response(StatusCode::OK),
		),
		Err(PasswordResetError::Validation(errors)) => Ok(
			ForgotPasswordPage {
				ctx: &ctx,
				email: &form.email,
				sent: false,
				errors: Some(&errors),
			}
			.into_response(StatusCode::BAD_REQUEST),
		),
		Err(e) => Err(e.into()),
	}
}

async fn reset_password_page(
	ctx: PageContext,
	Path(token): Path<String>,
	resets: PasswordResetService,
) -> Result<Response, WebError> {
	let valid = resets.is_valid(&token).await?;
	let status = match valid {
		true => StatusCode::OK,
		false => StatusCode::NOT_FOUND,
	};

	Ok(
		ResetPasswordPage {
			ctx: &ctx,
			token: &token,
			valid,
			errors: None,
		}
		.into_response(status),
	)
}

#[derive(Deserialize)]
struct ResetPasswordForm {
	csrf: String,
	password: String,
}

impl CsrfProtected for ResetPasswordForm {
	fn csrf(&self) -> &str {
		&self.csrf
	}
}

async fn reset_password(
	ctx: PageContext,
	Path(token): Path<String>,
	resets: PasswordResetService,
	VerifiedForm(form): VerifiedForm<ResetPasswordForm>,
) -> Result<Response, WebError> {
	match resets.reset(&token, form.password).await {
		Ok(()) => Ok(
			LoginPage {
				ctx: &ctx,
				return_to: "/tv",
				email: "",
				error: None,
				notice: Some("Your password has been changed. Log in with the new one."),
			}
			.into_response(StatusCode::OK),
		),
		Err(PasswordResetError::InvalidToken) => Ok(
			ResetPasswordPage {
				ctx: &ctx,
				token: &token,
				valid: false,
				errors: None,
			}
			.into_response(StatusCode::NOT_FOUND),
		),
		Err(PasswordResetError::Validation(errors)) => Ok(
			ResetPasswordPage {
				ctx: &ctx,
				token: &token,
				valid: true,
				errors: Some(&errors),
			}
			.into_response(StatusCode::BAD_REQUEST),
		),
		Err(e) => Err(e.into()),
	}
}

pub fn router() -> Router<AppState> {
	Router::new()
		.route("/login", get(login_page).post(login))
		.route("/logout", post(logout))
		.route("/join", get(join_page).post(join))
		.route("/forgot-password", get(forgot_password_page).post(forgot_password))
		.route(
			"/reset-password/:token",
			get(reset_password_page).post(reset_password),
		)
}

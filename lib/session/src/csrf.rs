use crate::Session;
use async_trait::async_trait;
use axum::extract::FromRequestParts;
use cookie::SameSite;
use hmac::{Hmac, Mac};
use http::request::Parts;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::{convert::Infallible, fmt, sync::Arc, sync::OnceLock};
use subtle::ConstantTimeEq;
use thiserror::Error;
use uuid::Uuid;

const COOKIE_NAME: &str = ".csrf";
const SIGNATURE_LEN: usize = 32;

type HmacSha256 = Hmac<Sha256>;

fn base64_engine() -> &'static impl base64::Engine {
	static ENGINE: OnceLock<base64::engine::GeneralPurpose> = OnceLock::new();

	ENGINE.get_or_init(|| {
		let config = base64::engine::GeneralPurposeConfig::new()
			.with_encode_padding(false)
			.with_decode_padding_mode(base64::engine::DecodePaddingMode::RequireNone);

		base64::engine::GeneralPurpose::new(&base64::alphabet::URL_SAFE, config)
	})
}

fn base64_encode(data: &[u8]) -> String {
	use base64::Engine;
	base64_engine().encode(data)
}

fn base64_decode(data: &str) -> Result<Vec<u8>, base64::DecodeError> {
	use base64::Engine;
	base64_engine().decode(data)
}

#[derive(Serialize, Deserialize, Debug)]
struct SealedToken {
	session_id: Uuid,
	nonce: [u8; 32],
}

#[derive(Debug, Error)]
pub enum CsrfError {
	#[error(transparent)]
	Serialization(#[from] bincode::Error),

	#[error(transparent)]
	HmacInvalidLengthKey(#[from] crypto_common::InvalidLength),

	#[error(transparent)]
	InvalidSignature(#[from] digest::MacError),

	#[error(transparent)]
	InvalidBase64(#[from] base64::DecodeError),

	#[error("csrf token is too short")]
	Malformed,

	#[error("no csrf token was issued for this session")]
	Missing,

	#[error("csrf token does not match")]
	Mismatch,
}

impl SealedToken {
	fn to_sealed_string(&self, key: &[u8]) -> Result<String, CsrfError> {
		let mut mac = HmacSha256::new_from_slice(key)?;
		let mut message = bincode::serialize(self)?;
		mac.update(&message);

		let result = mac.finalize().into_bytes();
		message.extend(result);
		Ok(base64_encode(&message))
	}

	fn from_sealed_string(key: &[u8], sealed: &str) -> Result<Self, CsrfError> {
		let message = base64_decode(sealed)?;
		if message.len() <= SIGNATURE_LEN {
			return Err(CsrfError::Malformed);
		}

		let (message, signature) = message.split_at(message.len() - SIGNATURE_LEN);

		let mut mac = HmacSha256::new_from_slice(key)?;
		mac.update(message);
		mac.verify_slice(signature)?;

		let token: Self = bincode::deserialize(message)?;
		Ok(token)
	}
}

/// A sealed token to embed in forms as the `csrf` field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CsrfToken(Arc<str>);

impl CsrfToken {
	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for CsrfToken {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Issues and verifies double-submit tokens bound to the current session.
#[derive(Clone)]
pub struct Csrf {
	session: Session,
	key: Arc<[u8]>,
}

impl Csrf {
	pub(crate) fn new(session: Session, key: &[u8]) -> Self {
		Self {
			session,
			key: Arc::from(key),
		}
	}

	fn issue(&self) -> Result<CsrfToken, CsrfError> {
		let token = SealedToken {
			session_id: self.session.id(),
			nonce: rand::thread_rng().gen(),
		};

		let sealed = token.to_sealed_string(&self.key)?;
		let cookie = self
			.session
			.cookie(COOKIE_NAME, sealed.clone())
			.same_site(SameSite::Strict)
			.finish();

		self.session.store().add(cookie);
		Ok(CsrfToken(sealed.into()))
	}

	/// Returns the token for this session, issuing a new one when the cookie
	/// is absent or belongs to another session.
	pub fn token(&self) -> Result<CsrfToken, CsrfError> {
		match self.session.store().get(COOKIE_NAME) {
			None => self.issue(),
			Some(cookie) => {
				let value = cookie.value();
				match SealedToken::from_sealed_string(&self.key, value) {
					Ok(token) if token.session_id == self.session.id() => Ok(CsrfToken(value.into())),
					_ => self.issue(),
				}
			}
		}
	}

	/// Checks a submitted token against the cookie and the current session.
	pub fn verify(&self, submitted: &str) -> Result<(), CsrfError> {
		let cookie = self
			.session
			.store()
			.get(COOKIE_NAME)
			.ok_or(CsrfError::Missing)?;
		if !bool::from(cookie.value().as_bytes().ct_eq(submitted.as_bytes())) {
			return Err(CsrfError::Mismatch);
		}

		let token = SealedToken::from_sealed_string(&self.key, submitted)?;
		if token.session_id != self.session.id() {
			return Err(CsrfError::Mismatch);
		}

		Ok(())
	}
}

#[async_trait]
impl<S> FromRequestParts<S> for Csrf {
	type Rejection = Infallible;

	async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
		let csrf: &Self = parts
			.extensions
			.get()
			.expect("missing csrf, did you forget session layer");

		Ok(csrf.clone())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const TEST_KEY: &[u8] = b"foo bar baz abc def long ass key goes here";

	fn csrf_for(session: Session) -> Csrf {
		Csrf::new(session, TEST_KEY)
	}

	#[test]
	fn csrf_token_roundtrip() {
		let token = SealedToken {
			session_id: Uuid::new_v4(),
			nonce: rand::thread_rng().gen(),
		};

		let sealed = token.to_sealed_string(TEST_KEY).expect("sealing works");
		let unsealed = SealedToken::from_sealed_string(TEST_KEY, &sealed).expect("unsealing works");

		assert_eq!(token.nonce, unsealed.nonce);
		assert_eq!(token.session_id, unsealed.session_id);
	}

	#[test]
	fn short_tokens_are_malformed() {
		let sealed = base64_encode(&[1, 2, 3]);
		let err = SealedToken::from_sealed_string(TEST_KEY, &sealed).unwrap_err();
		assert!(matches!(err, CsrfError::Malformed));
	}

	#[test]
	fn tampered_tokens_are_rejected() {
		let token = SealedToken {
			session_id: Uuid::new_v4(),
			nonce: [7; 32],
		};

		let sealed = token.to_sealed_string(TEST_KEY).expect("sealing works");
		let err = SealedToken::from_sealed_string(b"a different key that is long enough", &sealed)
			.unwrap_err();
		assert!(matches!(err, CsrfError::InvalidSignature(_)));
	}

	#[test]
	fn issued_token_verifies() {
		let csrf = csrf_for(Session::detached(Uuid::new_v4()));
		let token = csrf.token().expect("token issued");

		csrf.verify(token.as_str()).expect("token verifies");
		assert_eq!(csrf.token().expect("token reused"), token);
	}

	#[test]
	fn token_is_bound_to_session() {
		let first = csrf_for(Session::detached(Uuid::new_v4()));
		let token = first.token().expect("token issued");

		// same cookie, different session id
		let second = csrf_for(first.session.with_id(Uuid::new_v4()));
		let err = second.verify(token.as_str()).unwrap_err();
		assert!(matches!(err, CsrfError::Mismatch));

		let reissued = second.token().expect("token reissued");
		assert_ne!(reissued, token);
	}

	#[test]
	fn missing_cookie_fails() {
		let csrf = csrf_for(Session::detached(Uuid::new_v4()));
		let err = csrf.verify("anything").unwrap_err();
		assert!(matches!(err, CsrfError::Missing));
	}
}

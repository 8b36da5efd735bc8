//! Random bearer tokens and their stored form.

use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

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

/// 32 random bytes, base64url encoded without padding.
pub fn random_token() -> String {
	let mut bytes = [0u8; 32];
	rand::thread_rng().fill_bytes(&mut bytes);
	base64_encode(&bytes)
}

/// sha-256 of the token, base64url encoded. Only this form is persisted.
pub fn hash_token(token: &str) -> String {
	base64_encode(&Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn tokens_are_url_safe_and_unique() {
		let a = random_token();
		let b = random_token();

		assert_ne!(a, b);
		assert_eq!(a.len(), 43);
		assert!(a
			.chars()
			.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
	}

	#[test]
	fn hash_is_stable() {
		let token = random_token();

		assert_eq!(hash_token(&token), hash_token(&token));
		assert_ne!(hash_token(&token), token);
		assert_ne!(hash_token("a"), hash_token("b"));
	}
}

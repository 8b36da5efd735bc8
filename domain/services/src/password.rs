//! bcrypt hashing, run off the async executor.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
	#[error(transparent)]
	Bcrypt(#[from] bcrypt::BcryptError),

	#[error("password hashing task failed: {0}")]
	Join(#[from] tokio::task::JoinError),
}

pub async fn hash_password(password: String) -> Result<String, PasswordError> {
	let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, bcrypt::DEFAULT_COST))
		.await??;

	Ok(hash)
}

/// Malformed hashes count as a mismatch.
pub async fn verify_password(password: String, hash: String) -> Result<bool, PasswordError> {
	let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash)).await?;

	Ok(verified.unwrap_or(false))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn verifies_own_hash() {
		let hash = bcrypt::hash("correct horse", 4).expect("hash");

		assert!(verify_password("correct horse".into(), hash.clone())
			.await
			.expect("verify"));
		assert!(!verify_password("battery staple".into(), hash)
			.await
			.expect("verify"));
	}

	#[tokio::test]
	async fn garbage_hash_does_not_verify() {
		assert!(!verify_password("anything".into(), "not a hash".into())
			.await
			.expect("verify"));
	}
}

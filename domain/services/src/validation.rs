use indexmap::IndexMap;
use std::fmt;

/// Per-field messages to render next to form inputs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ValidationErrors {
	fields: IndexMap<&'static str, String>,
}

impl ValidationErrors {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn single(field: &'static str, message: impl Into<String>) -> Self {
		let mut errors = Self::new();
		errors.add(field, message);
		errors
	}

	/// Keeps the first message reported for a field.
	pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
		self.fields.entry(field).or_insert_with(|| message.into());
	}

	pub fn get(&self, field: &str) -> Option<&str> {
		self.fields.get(field).map(String::as_str)
	}

	pub fn is_empty(&self) -> bool {
		self.fields.is_empty()
	}

	pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
		self.fields.iter().map(|(k, v)| (*k, v.as_str()))
	}

	pub fn into_result(self) -> Result<(), Self> {
		if self.is_empty() {
			Ok(())
		} else {
			Err(self)
		}
	}
}

impl fmt::Display for ValidationErrors {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let mut first = true;
		for (field, message) in self.iter() {
			if !first {
				f.write_str(", ")?;
			}
			first = false;
			write!(f, "{field}: {message}")?;
		}

		Ok(())
	}
}

impl std::error::Error for ValidationErrors {}

pub(crate) const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn check_email(errors: &mut ValidationErrors, email: &str) {
	let email = email.trim();
	match email.split_once('@') {
		Some((local, domain)) if !local.is_empty() && domain.contains('.') => (),
		_ => errors.add("email", "Enter a valid email address"),
	}
}

pub(crate) fn check_password(errors: &mut ValidationErrors, field: &'static str, password: &str) {
	if password.chars().count() < MIN_PASSWORD_LEN {
		errors.add(
			field,
			format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
		);
	}
}

pub(crate) fn normalize_email(email: &str) -> String {
	email.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn first_message_wins() {
		let mut errors = ValidationErrors::new();
		errors.add("email", "first");
		errors.add("email", "second");

		assert_eq!(errors.get("email"), Some("first"));
		assert!(errors.into_result().is_err());
	}

	#[test]
	fn email_shape() {
		let mut errors = ValidationErrors::new();
		check_email(&mut errors, "someone@example.com");
		assert!(errors.is_empty());

		check_email(&mut errors, "not-an-email");
		assert!(errors.get("email").is_some());
	}

	#[test]
	fn short_passwords_are_rejected() {
		let mut errors = ValidationErrors::new();
		check_password(&mut errors, "password", "short");
		check_password(&mut errors, "confirm", "long enough");

		assert!(errors.get("password").is_some());
		assert!(errors.get("confirm").is_none());
	}
}

use cookie::{Cookie, CookieJar, Key, PrivateJar};
use http::{header, HeaderMap};
use std::sync::{Arc, Mutex, MutexGuard};

struct Inner {
	key: Key,
	jar: CookieJar,
}

/// Request-scoped cookie jar. Every cookie read or written through it is
/// encrypted with the session key.
#[derive(Clone)]
pub(crate) struct CookieStore(Arc<Mutex<Inner>>);

impl CookieStore {
	pub(crate) fn new(headers: &HeaderMap, key: Key) -> Self {
		let mut jar = CookieJar::new();

		headers
			.get_all(header::COOKIE)
			.into_iter()
			.flat_map(|header| header.to_str())
			.flat_map(Cookie::split_parse_encoded)
			.flatten()
			.map(Cookie::into_owned)
			.for_each(|c| jar.add_original(c));

		Self(Arc::new(Mutex::new(Inner { jar, key })))
	}

	fn lock(&self) -> MutexGuard<'_, Inner> {
		// a poisoned jar is still a valid jar
		self.0.lock().unwrap_or_else(|e| e.into_inner())
	}

	pub(crate) fn into_jar(self) -> CookieJar {
		match Arc::try_unwrap(self.0) {
			Ok(mutex) => mutex.into_inner().unwrap_or_else(|e| e.into_inner()).jar,
			Err(arc) => CookieStore(arc).lock().jar.clone(),
		}
	}

	fn with_jar<T>(&self, f: impl FnOnce(PrivateJar<&mut CookieJar>) -> T) -> T {
		let mut guard = self.lock();
		let inner = &mut *guard;
		let private = inner.jar.private_mut(&inner.key);
		f(private)
	}

	pub fn get(&self, name: &str) -> Option<Cookie<'static>> {
		self.with_jar(|jar| jar.get(name))
	}

	pub fn add(&self, cookie: Cookie<'static>) {
		self.with_jar(|mut jar| jar.add(cookie));
	}

	pub fn remove(&self, cookie: Cookie<'static>) {
		self.with_jar(|mut jar| jar.remove(cookie));
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use http::HeaderValue;

	fn store() -> CookieStore {
		CookieStore::new(&HeaderMap::new(), Key::generate())
	}

	#[test]
	fn added_cookies_are_encrypted() {
		let store = store();
		store.add(Cookie::new("name", "value"));

		assert_eq!(store.get("name").map(|c| c.value().to_owned()).as_deref(), Some("value"));
		let jar = store.into_jar();
		let raw = jar.get("name").expect("cookie in jar");
		assert_ne!(raw.value(), "value");
	}

	#[test]
	fn removed_cookies_are_gone() {
		let store = store();
		store.add(Cookie::new("challenge", "state"));
		store.remove(Cookie::new("challenge", ""));

		assert!(store.get("challenge").is_none());
	}

	#[test]
	fn unencrypted_cookies_are_ignored() {
		let mut headers = HeaderMap::new();
		headers.insert(header::COOKIE, HeaderValue::from_static("session=plain"));
		let store = CookieStore::new(&headers, Key::generate());

		assert!(store.get("session").is_none());
	}
}

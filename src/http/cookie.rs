//! Minimal same-origin cookie jar feeding the anti-forgery header.

// crates.io
use http::header::{HeaderMap, SET_COOKIE};
// self
use crate::_prelude::*;

/// Name/value cookie storage shared by clones.
///
/// Only what the backend needs is modelled: values set through `Set-Cookie` on
/// same-origin responses (or seeded by the embedding application) and a `Cookie` header
/// rebuilt from them.
#[derive(Clone, Default)]
pub struct CookieJar(Arc<RwLock<BTreeMap<String, String>>>);
impl CookieJar {
	/// Returns the cookie value for `name`.
	pub fn get(&self, name: &str) -> Option<String> {
		self.0.read().get(name).cloned()
	}

	/// Sets (or replaces) a cookie.
	pub fn set(&self, name: impl Into<String>, value: impl Into<String>) {
		self.0.write().insert(name.into(), value.into());
	}

	/// Removes a cookie.
	pub fn remove(&self, name: &str) {
		self.0.write().remove(name);
	}

	/// Renders the jar as a `Cookie` header value; `None` when empty.
	pub fn header_value(&self) -> Option<String> {
		let jar = self.0.read();

		if jar.is_empty() {
			return None;
		}

		Some(jar.iter().map(|(name, value)| format!("{name}={value}")).collect::<Vec<_>>().join("; "))
	}

	/// Applies every `Set-Cookie` header in `headers`.
	pub fn absorb(&self, headers: &HeaderMap) {
		for raw in headers.get_all(SET_COOKIE).iter().filter_map(|v| v.to_str().ok()) {
			let mut attributes = raw.split(';').map(str::trim);
			let Some((name, value)) = attributes.next().and_then(|pair| pair.split_once('=')) else {
				continue;
			};
			let name = name.trim();

			if name.is_empty() {
				continue;
			}

			let expired = attributes.any(|attr| {
				attr.split_once('=').is_some_and(|(key, value)| {
					key.trim().eq_ignore_ascii_case("max-age")
						&& value.trim().parse::<i64>().is_ok_and(|age| age <= 0)
				})
			});

			if expired {
				self.remove(name);
			} else {
				self.set(name, value.trim().trim_matches('"'));
			}
		}
	}
}
impl Debug for CookieJar {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_set().entries(self.0.read().keys()).finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use http::header::HeaderValue;
	// self
	use super::*;

	#[test]
	fn absorbs_and_expires_cookies() {
		let jar = CookieJar::default();
		let mut headers = HeaderMap::new();

		headers.append(SET_COOKIE, HeaderValue::from_static("csrftoken=abc123; Path=/; SameSite=Lax"));
		headers.append(SET_COOKIE, HeaderValue::from_static("sessionid=s1; HttpOnly"));
		jar.absorb(&headers);

		assert_eq!(jar.get("csrftoken"), Some("abc123".into()));
		assert_eq!(jar.header_value(), Some("csrftoken=abc123; sessionid=s1".into()));

		let mut headers = HeaderMap::new();

		headers.append(SET_COOKIE, HeaderValue::from_static("sessionid=; Max-Age=0; Path=/"));
		jar.absorb(&headers);

		assert_eq!(jar.get("sessionid"), None);
		assert_eq!(format!("{jar:?}"), "{\"csrftoken\"}");
	}
}

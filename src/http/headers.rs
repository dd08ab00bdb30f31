//! Per-call header construction.

// crates.io
use http::header::{
	AUTHORIZATION, CONTENT_TYPE, COOKIE, HeaderMap, HeaderName, HeaderValue,
};
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	config::ClientConfig,
	error::ConfigError,
	http::{BodyKind, CookieJar},
};

/// Inputs for one header build; rebuilt on every try so a fresh token is picked up.
#[derive(Clone, Copy, Debug)]
pub struct HeaderContext<'a> {
	/// Absolute target URL.
	pub url: &'a Url,
	/// Shape of the encoded body.
	pub body: &'a BodyKind,
	/// Caller-supplied headers; they win for every key they set.
	pub extra: &'a HeaderMap,
	/// Forces a JSON content type even without a JSON body.
	pub force_json: bool,
	/// Bearer token to attach; `None` when auth does not apply or no token is stored.
	pub bearer: Option<&'a TokenSecret>,
}

/// Builds the outgoing header set.
///
/// - Multipart bodies keep their boundary content type and never get JSON.
/// - Forced JSON, text, and JSON bodies get `Content-Type: application/json`.
/// - A bearer token becomes `Authorization: Bearer <token>`.
/// - Same-origin targets get the anti-forgery header (empty when the cookie is missing)
///   and the jar's `Cookie` header.
pub fn build_headers(
	config: &ClientConfig,
	cookies: &CookieJar,
	ctx: HeaderContext<'_>,
) -> Result<HeaderMap, ConfigError> {
	let mut headers = HeaderMap::new();

	match ctx.body {
		BodyKind::Multipart(content_type) => {
			headers.insert(CONTENT_TYPE, content_type.clone());
		},
		BodyKind::Text | BodyKind::Json => {
			headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
		},
		BodyKind::Empty if ctx.force_json => {
			headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
		},
		BodyKind::Empty => (),
	}

	if let Some(token) = ctx.bearer {
		let mut value = header_value(AUTHORIZATION.as_str(), &format!("Bearer {}", token.expose()))?;

		value.set_sensitive(true);
		headers.insert(AUTHORIZATION, value);
	}
	if config.is_same_origin(ctx.url) {
		let name = HeaderName::from_bytes(config.csrf.header_name.as_bytes()).map_err(|source| {
			ConfigError::InvalidHeaderName { name: config.csrf.header_name.clone(), source }
		})?;
		let csrf = cookies.get(&config.csrf.cookie_name).unwrap_or_default();

		headers.insert(name, header_value(&config.csrf.header_name, &csrf)?);

		if let Some(cookie) = cookies.header_value() {
			headers.insert(COOKIE, header_value(COOKIE.as_str(), &cookie)?);
		}
	}

	for name in ctx.extra.keys() {
		headers.remove(name);
	}
	for (name, value) in ctx.extra {
		headers.append(name.clone(), value.clone());
	}

	Ok(headers)
}

fn header_value(name: &str, raw: &str) -> Result<HeaderValue, ConfigError> {
	HeaderValue::from_str(raw)
		.map_err(|source| ConfigError::InvalidHeader { name: name.to_owned(), source })
}

//! Unverified JWT payload decoding.
//!
//! Signature validation is the server's job; the client only needs the `exp` claim to
//! plan proactive refreshes. Every malformed input decodes to `None`.

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::_prelude::*;

/// Claims carried by an access token's payload segment.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Claims(serde_json::Map<String, Value>);
impl Claims {
	/// Returns a claim by name.
	pub fn get(&self, name: &str) -> Option<&Value> {
		self.0.get(name)
	}

	/// Expiry in seconds since the Unix epoch, if present and finite.
	pub fn exp(&self) -> Option<f64> {
		self.0.get("exp").and_then(Value::as_f64).filter(|exp| exp.is_finite())
	}

	/// Milliseconds from `now` until expiry; negative once expired.
	pub fn ms_until_expiry(&self, now: OffsetDateTime) -> Option<i64> {
		let exp_ms = self.exp()? * 1_000.;
		let now_ms = (now.unix_timestamp_nanos() / 1_000_000) as f64;
		let remaining = exp_ms - now_ms;

		// `as` saturates at the i64 bounds.
		remaining.is_finite().then_some(remaining as i64)
	}
}

/// Decodes the middle segment of `token` without checking its signature.
pub fn decode_payload(token: &str) -> Option<Claims> {
	let mut segments = token.split('.');
	let _header = segments.next()?;
	let payload = segments.next()?;
	let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;

	match serde_json::from_slice(&bytes).ok()? {
		Value::Object(map) => Some(Claims(map)),
		_ => None,
	}
}

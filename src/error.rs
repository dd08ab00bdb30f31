//! Client-level error types shared across flows, transports, and configuration.

// self
use crate::_prelude::*;

/// Client-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Canonical error surfaced by the request executor and session helpers.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// No HTTP response was obtained (status 0).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Server answered with a failure status.
	#[error("Request failed with HTTP status {status}.")]
	Http {
		/// HTTP status code.
		status: u16,
		/// Parsed JSON payload, or `{"raw": ...}` when the body was not JSON.
		payload: Value,
	},
	/// Credentials were rejected and could not be refreshed; the session was torn down.
	#[error("Session is no longer authenticated; sign in again at {login_url}.")]
	Unauthorized {
		/// Login entry point carrying the current location as its return target.
		login_url: Url,
	},
	/// Token endpoint responded with JSON that does not match the expected shape.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Token endpoint succeeded but omitted the access token.
	#[error("Token endpoint response is missing the access token.")]
	MissingAccessToken,
	/// Login succeeded but the response omitted the refresh token.
	#[error("Token endpoint response is missing the refresh token.")]
	MissingRefreshToken,
	/// Response payload could not be decoded into the requested type.
	#[error("Response payload could not be decoded.")]
	Decode {
		/// Structured decoding failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}
impl Error {
	/// Returns the HTTP status associated with the failure; `0` when no response exists.
	pub fn status(&self) -> u16 {
		match self {
			Self::Http { status, .. } => *status,
			Self::Unauthorized { .. } => 401,
			_ => 0,
		}
	}

	/// Returns `true` for failures that are expected to succeed on retry.
	pub fn is_transient(&self) -> bool {
		match self {
			Self::Transport(_) => true,
			Self::Http { status, .. } => crate::config::is_transient_status(*status),
			_ => false,
		}
	}

	/// Returns the backend's `error.code` field when the payload uses the error envelope.
	pub fn error_code(&self) -> Option<&str> {
		self.envelope_field("code")
	}

	/// Returns the backend's `error.message` field when it is a plain string.
	pub fn error_message(&self) -> Option<&str> {
		self.envelope_field("message")
	}

	fn envelope_field(&self, field: &str) -> Option<&str> {
		match self {
			Self::Http { payload, .. } => payload.get("error")?.get(field)?.as_str(),
			_ => None,
		}
	}
}

/// Configuration and request-construction failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] http::Error),
	/// A header value contains characters HTTP does not allow.
	#[error("Header `{name}` has an invalid value.")]
	InvalidHeader {
		/// Header name.
		name: String,
		/// Underlying validation failure.
		#[source]
		source: http::header::InvalidHeaderValue,
	},
	/// A configured header name is not a valid HTTP token.
	#[error("Header name `{name}` is invalid.")]
	InvalidHeaderName {
		/// Raw header name.
		name: String,
		/// Underlying validation failure.
		#[source]
		source: http::header::InvalidHeaderName,
	},
	/// A configured or requested URL cannot be parsed.
	#[error("URL `{url}` is invalid.")]
	InvalidUrl {
		/// Raw URL or path that failed to resolve.
		url: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Configuration document could not be parsed.
	#[error("Client configuration is malformed.")]
	Document {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// Request body could not be serialized to JSON.
	#[error("Request body could not be serialized to JSON.")]
	BodySerialize(#[source] serde_json::Error),
}

/// Transport-level failures (network, IO, cancellation).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the API.")]
	Io(#[from] std::io::Error),
	/// Caller-supplied cancellation signal aborted the call.
	#[error("Request was cancelled.")]
	Cancelled,
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}

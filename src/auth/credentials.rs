//! Credential pair and token-endpoint payloads.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Storage slot for one half of the credential pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKey {
	/// Short-lived bearer token.
	Access,
	/// Longer-lived token exchanged for new access tokens.
	Refresh,
}
impl CredentialKey {
	/// Storage key used by durable stores and storage-change notifications.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Access => "access",
			Self::Refresh => "refresh",
		}
	}
}
impl Display for CredentialKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for CredentialKey {
	type Err = ();

	fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
		match s {
			"access" => Ok(Self::Access),
			"refresh" => Ok(Self::Refresh),
			_ => Err(()),
		}
	}
}

/// Access + refresh tokens issued together on login.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CredentialPair {
	/// Bearer credential attached to API calls.
	pub access: TokenSecret,
	/// Credential exchanged for new access tokens.
	pub refresh: TokenSecret,
}

#[derive(Serialize)]
pub(crate) struct LoginBody<'a> {
	pub username: &'a str,
	pub password: &'a str,
}

#[derive(Serialize)]
pub(crate) struct RefreshBody<'a> {
	pub refresh: &'a str,
}

/// Token endpoint payload; `refresh` is only present when the server rotates it.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
	#[serde(default)]
	pub access: Option<TokenSecret>,
	#[serde(default)]
	pub refresh: Option<TokenSecret>,
}
impl TokenResponse {
	pub(crate) fn parse(bytes: &[u8]) -> Result<Self> {
		let de = &mut serde_json::Deserializer::from_slice(bytes);

		serde_path_to_error::deserialize(de).map_err(|source| Error::TokenResponse { source })
	}

	pub(crate) fn from_value(value: Value) -> Result<Self> {
		serde_path_to_error::deserialize(value).map_err(|source| Error::TokenResponse { source })
	}
}

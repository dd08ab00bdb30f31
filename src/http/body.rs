//! Request bodies and their wire encodings.

// crates.io
use http::header::{CONTENT_TYPE, HeaderValue};
// self
use crate::{_prelude::*, error::ConfigError};

/// Payload attached to an API call.
#[derive(Clone, Debug, Default)]
pub enum RequestBody {
	/// No body.
	#[default]
	Empty,
	/// Pre-serialized string, sent unchanged.
	Text(String),
	/// Structured record serialized to JSON.
	Json(Value),
	/// Binary multipart form (file uploads).
	Multipart(MultipartForm),
}
impl RequestBody {
	/// Serializes any [`Serialize`] value into a JSON body.
	pub fn json(value: &impl Serialize) -> Result<Self, ConfigError> {
		serde_json::to_value(value).map(Self::Json).map_err(ConfigError::BodySerialize)
	}

	pub(crate) fn encode(&self) -> Result<EncodedBody, ConfigError> {
		let encoded = match self {
			Self::Empty => EncodedBody { bytes: Vec::new(), kind: BodyKind::Empty },
			Self::Text(text) => EncodedBody { bytes: text.clone().into_bytes(), kind: BodyKind::Text },
			Self::Json(value) => EncodedBody {
				bytes: serde_json::to_vec(value).map_err(ConfigError::BodySerialize)?,
				kind: BodyKind::Json,
			},
			Self::Multipart(form) => {
				let boundary = MultipartForm::boundary();
				let content_type = HeaderValue::from_str(&format!(
					"multipart/form-data; boundary={boundary}"
				))
				.map_err(|source| ConfigError::InvalidHeader {
					name: CONTENT_TYPE.to_string(),
					source,
				})?;

				EncodedBody { bytes: form.encode(&boundary), kind: BodyKind::Multipart(content_type) }
			},
		};

		Ok(encoded)
	}
}
impl From<Value> for RequestBody {
	fn from(value: Value) -> Self {
		Self::Json(value)
	}
}
impl From<String> for RequestBody {
	fn from(value: String) -> Self {
		Self::Text(value)
	}
}
impl From<MultipartForm> for RequestBody {
	fn from(value: MultipartForm) -> Self {
		Self::Multipart(value)
	}
}

/// Shape of an encoded body, as seen by the header builder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BodyKind {
	/// Nothing is sent.
	Empty,
	/// Caller-provided string.
	Text,
	/// Serialized structured record.
	Json,
	/// Multipart form; carries its own `Content-Type` with the boundary.
	Multipart(HeaderValue),
}

pub(crate) struct EncodedBody {
	pub bytes: Vec<u8>,
	pub kind: BodyKind,
}

/// One field of a [`MultipartForm`].
#[derive(Clone, Debug)]
pub struct FormPart {
	/// Field name.
	pub name: String,
	/// File name, for file fields.
	pub filename: Option<String>,
	/// Per-part content type, for file fields.
	pub content_type: Option<String>,
	/// Raw field bytes.
	pub data: Vec<u8>,
}

/// Ordered multipart form, re-encodable on every retry.
#[derive(Clone, Debug, Default)]
pub struct MultipartForm {
	parts: Vec<FormPart>,
}
impl MultipartForm {
	/// Creates an empty form.
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends a text field.
	pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.parts.push(FormPart {
			name: name.into(),
			filename: None,
			content_type: None,
			data: value.into().into_bytes(),
		});

		self
	}

	/// Appends a file field.
	pub fn file(
		mut self,
		name: impl Into<String>,
		filename: impl Into<String>,
		content_type: impl Into<String>,
		data: impl Into<Vec<u8>>,
	) -> Self {
		self.parts.push(FormPart {
			name: name.into(),
			filename: Some(filename.into()),
			content_type: Some(content_type.into()),
			data: data.into(),
		});

		self
	}

	/// Fields in insertion order.
	pub fn parts(&self) -> &[FormPart] {
		&self.parts
	}

	fn boundary() -> String {
		format!("----session-client-{:016x}{:016x}", rand::random::<u64>(), rand::random::<u64>())
	}

	fn encode(&self, boundary: &str) -> Vec<u8> {
		let mut buf = Vec::new();

		for part in &self.parts {
			buf.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
			buf.extend_from_slice(
				format!("Content-Disposition: form-data; name=\"{}\"", escape_quoted(&part.name))
					.as_bytes(),
			);

			if let Some(filename) = &part.filename {
				buf.extend_from_slice(
					format!("; filename=\"{}\"", escape_quoted(filename)).as_bytes(),
				);
			}

			buf.extend_from_slice(b"\r\n");

			if let Some(content_type) = &part.content_type {
				buf.extend_from_slice(format!("Content-Type: {content_type}\r\n").as_bytes());
			}

			buf.extend_from_slice(b"\r\n");
			buf.extend_from_slice(&part.data);
			buf.extend_from_slice(b"\r\n");
		}

		buf.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

		buf
	}
}

// Percent-escapes the characters form-data names cannot carry inside quotes.
fn escape_quoted(raw: &str) -> String {
	raw.replace('"', "%22").replace('\r', "%0D").replace('\n', "%0A")
}

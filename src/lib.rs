//! Authenticated JSON API client with singleflight token refresh, proactive expiry
//! scheduling, and best-effort auth sync between sessions sharing one credential store.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod error;
pub mod flows;
pub mod http;
pub mod obs;
pub mod schedule;
pub mod store;
pub mod sync;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports and fakes for tests; enabled via `cfg(test)` or the `test`
	//! crate feature.

	pub use crate::_prelude::*;

	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
	// self
	use crate::{
		config::ClientConfig,
		error::TransportError,
		flows::Session,
		http::{HttpRequest, HttpResponse, HttpTransport, TransportFuture},
		store::{CredentialStore, MemoryStore},
		sync::{LocalBroadcast, SyncChannel},
	};

	type Responder = dyn Fn(&HttpRequest, usize) -> Result<HttpResponse, TransportError> + Send + Sync;

	/// Request observed by a [`ScriptedTransport`].
	#[derive(Clone, Debug)]
	pub struct RecordedRequest {
		/// HTTP method.
		pub method: http::Method,
		/// Full request URI.
		pub uri: String,
		/// Request headers as sent.
		pub headers: http::HeaderMap,
		/// Raw body bytes.
		pub body: Vec<u8>,
	}
	impl RecordedRequest {
		/// Returns the URI path component.
		pub fn path(&self) -> String {
			self.uri
				.parse::<http::Uri>()
				.map(|uri| uri.path().to_owned())
				.expect("Recorded URI should parse.")
		}

		/// Returns a header value as a string.
		pub fn header(&self, name: &str) -> Option<&str> {
			self.headers.get(name).and_then(|value| value.to_str().ok())
		}

		/// Parses the body as JSON.
		pub fn json(&self) -> Value {
			serde_json::from_slice(&self.body).expect("Recorded body should be JSON.")
		}
	}

	/// In-process transport answering every request with a closure.
	///
	/// The closure receives the request and the zero-based index of the call.
	#[derive(Clone)]
	pub struct ScriptedTransport {
		responder: Arc<Responder>,
		requests: Arc<Mutex<Vec<RecordedRequest>>>,
		calls: Arc<AtomicUsize>,
	}
	impl ScriptedTransport {
		/// Creates a transport driven by `responder`.
		pub fn new(
			responder: impl Fn(&HttpRequest, usize) -> Result<HttpResponse, TransportError>
			+ 'static
			+ Send
			+ Sync,
		) -> Self {
			Self {
				responder: Arc::new(responder),
				requests: Default::default(),
				calls: Default::default(),
			}
		}

		/// Every request seen so far.
		pub fn requests(&self) -> Vec<RecordedRequest> {
			self.requests.lock().clone()
		}

		/// Requests whose path equals `path`.
		pub fn requests_to(&self, path: &str) -> Vec<RecordedRequest> {
			self.requests().into_iter().filter(|request| request.path() == path).collect()
		}
	}
	impl HttpTransport for ScriptedTransport {
		fn execute(&self, request: HttpRequest) -> TransportFuture<'_> {
			Box::pin(async move {
				tokio::task::yield_now().await;

				let index = self.calls.fetch_add(1, Ordering::SeqCst);

				self.requests.lock().push(RecordedRequest {
					method: request.method().clone(),
					uri: request.uri().to_string(),
					headers: request.headers().clone(),
					body: request.body().clone(),
				});

				(self.responder)(&request, index)
			})
		}
	}

	/// Builds a buffered JSON response.
	pub fn json_response(status: u16, body: Value) -> HttpResponse {
		let mut response = HttpResponse::new(
			serde_json::to_vec(&body).expect("Failed to serialize scripted response body."),
		);

		*response.status_mut() =
			http::StatusCode::from_u16(status).expect("Scripted status should be valid.");
		response
			.headers_mut()
			.insert(http::header::CONTENT_TYPE, http::HeaderValue::from_static("application/json"));

		response
	}

	/// Builds a buffered response with a raw body.
	pub fn raw_response(status: u16, body: &str) -> HttpResponse {
		let mut response = HttpResponse::new(body.as_bytes().to_vec());

		*response.status_mut() =
			http::StatusCode::from_u16(status).expect("Scripted status should be valid.");

		response
	}

	/// Builds an unsigned JWT whose `exp` lies `expires_in` from now.
	pub fn unsigned_jwt(expires_in: Duration) -> String {
		let exp = (OffsetDateTime::now_utc() + expires_in).unix_timestamp();
		let payload = serde_json::json!({ "exp": exp, "token_type": "access" }).to_string();

		format!("eyJhbGciOiJIUzI1NiJ9.{}.c2lnbmF0dXJl", URL_SAFE_NO_PAD.encode(payload))
	}

	/// Configuration pointing at a fake origin with fast retries.
	pub fn test_config() -> ClientConfig {
		ClientConfig::parse("https://app.test")
			.expect("Test base URL should parse.")
			.with_retry(crate::config::RetryPolicy::new(2, Duration::milliseconds(10)))
	}

	/// Builds a session over `transport`, a fresh memory store, and a fresh channel.
	pub fn build_test_session(
		transport: ScriptedTransport,
	) -> (Arc<Session<ScriptedTransport>>, MemoryStore, LocalBroadcast) {
		let store = MemoryStore::default();
		let channel = LocalBroadcast::new("auth");
		let session = build_tab(transport, &store, &channel);

		(session, store, channel)
	}

	/// Builds another session sharing `store` and `channel`, like a second browser tab.
	pub fn build_tab(
		transport: ScriptedTransport,
		store: &MemoryStore,
		channel: &LocalBroadcast,
	) -> Arc<Session<ScriptedTransport>> {
		let store: Arc<dyn CredentialStore> = Arc::new(store.clone());
		let channel: Arc<dyn SyncChannel> = Arc::new(channel.clone());

		Session::with_http_client(test_config(), store, channel, transport)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::{Arc, Weak},
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use serde_json::Value;
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

pub use ::http as http_types;
#[cfg(feature = "reqwest")] pub use reqwest;
pub use tokio_util::sync::CancellationToken;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};

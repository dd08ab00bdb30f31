//! Request executor: headers, backoff retries, and the one-shot 401 recovery.
//!
//! Every call runs up to `attempts + 1` tries. Headers are rebuilt before each try so a
//! token refreshed in between (by this call or by anyone else) is picked up. A 401 on an
//! authenticated call triggers one shared refresh and one extra try that does not spend
//! retry budget; when the refresh yields nothing the session is torn down.

// crates.io
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
// self
use crate::{
	_prelude::*,
	config::{RetryPolicy, is_transient_status},
	error::{ConfigError, TransportError},
	flows::{RequestInfo, Session, hooks},
	http::{
		EncodedBody, HeaderContext, HttpResponse, HttpTransport, MultipartForm, RequestBody,
		build_headers,
	},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// One API call as described by the caller.
#[derive(Clone, Debug)]
pub struct ApiRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute URL or a path relative to the configured base URL.
	pub url: String,
	/// Payload; ignored for `GET` and `HEAD`.
	pub body: RequestBody,
	/// Per-call headers; they override computed headers with the same name.
	pub headers: HeaderMap,
	/// Sends `Content-Type: application/json` even without a JSON body.
	pub force_json: bool,
	/// Overrides whether the bearer token is attached and 401 recovery applies.
	///
	/// Defaults to `true`.
	pub auth: Option<bool>,
	/// Signal aborting the in-flight try.
	pub cancel: Option<CancellationToken>,
	/// Overrides the configured retry policy.
	pub retry: Option<RetryPolicy>,
}
impl ApiRequest {
	/// Creates a request with no body and default options.
	pub fn new(method: Method, url: impl Into<String>) -> Self {
		Self {
			method,
			url: url.into(),
			body: RequestBody::Empty,
			headers: HeaderMap::new(),
			force_json: false,
			auth: None,
			cancel: None,
			retry: None,
		}
	}

	/// `GET` request.
	pub fn get(url: impl Into<String>) -> Self {
		Self::new(Method::GET, url)
	}

	/// `POST` request.
	pub fn post(url: impl Into<String>) -> Self {
		Self::new(Method::POST, url)
	}

	/// `PATCH` request.
	pub fn patch(url: impl Into<String>) -> Self {
		Self::new(Method::PATCH, url)
	}

	/// `DELETE` request.
	pub fn delete(url: impl Into<String>) -> Self {
		Self::new(Method::DELETE, url)
	}

	/// Sets the payload.
	pub fn with_body(mut self, body: impl Into<RequestBody>) -> Self {
		self.body = body.into();

		self
	}

	/// Adds a per-call header.
	pub fn with_header(mut self, name: &str, value: &str) -> Result<Self, ConfigError> {
		let header = HeaderName::from_bytes(name.as_bytes())
			.map_err(|source| ConfigError::InvalidHeaderName { name: name.into(), source })?;
		let value = HeaderValue::from_str(value)
			.map_err(|source| ConfigError::InvalidHeader { name: name.into(), source })?;

		self.headers.insert(header, value);

		Ok(self)
	}

	/// Overrides the auth flag.
	pub fn with_auth(mut self, auth: bool) -> Self {
		self.auth = Some(auth);

		self
	}

	/// Attaches a cancellation signal.
	pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
		self.cancel = Some(cancel);

		self
	}

	/// Overrides the retry policy.
	pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = Some(retry);

		self
	}

	/// Forces a JSON content type.
	pub fn force_json(mut self) -> Self {
		self.force_json = true;

		self
	}

	fn info(&self) -> RequestInfo {
		RequestInfo { method: self.method.clone(), url: self.url.clone() }
	}
}

/// A single try, fully resolved.
pub(crate) struct Outgoing<'a> {
	pub method: &'a Method,
	pub url: &'a Url,
	pub body: &'a EncodedBody,
	pub headers: &'a HeaderMap,
	pub force_json: bool,
	pub auth: bool,
	pub cancel: Option<&'a CancellationToken>,
}

impl<C> Session<C>
where
	C: ?Sized + HttpTransport,
{
	/// Runs `request` through the retry and re-authentication loop.
	///
	/// Resolves to `Ok(None)` for `204 No Content` and empty bodies, `Ok(Some(json))`
	/// otherwise. Bodies that are not JSON come back as `{"raw": "<text>"}`.
	pub async fn execute(&self, request: ApiRequest) -> Result<Option<Value>> {
		const KIND: FlowKind = FlowKind::Request;

		let info = request.info();
		let registered = self.hooks();
		let span = FlowSpan::new(KIND, "execute");

		if let Some(hook) = &registered.on_request_start {
			hooks::guarded("on_request_start", || hook(&info));
		}

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.run(&request)).await;

		match &result {
			Ok(_) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Success);

				if let Some(hook) = &registered.on_request_end {
					hooks::guarded("on_request_end", || hook(&info));
				}
			},
			Err(e) => {
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);

				if let Some(hook) = &registered.on_request_error {
					hooks::guarded("on_request_error", || hook(&info, e));
				}
			},
		}

		result
	}

	/// `GET` returning the parsed payload.
	pub async fn get(&self, url: &str) -> Result<Option<Value>> {
		self.execute(ApiRequest::get(url)).await
	}

	/// `POST` with a JSON body.
	pub async fn post(&self, url: &str, body: &impl Serialize) -> Result<Option<Value>> {
		self.execute(ApiRequest::post(url).with_body(RequestBody::json(body)?)).await
	}

	/// `PATCH` with a JSON body.
	pub async fn patch(&self, url: &str, body: &impl Serialize) -> Result<Option<Value>> {
		self.execute(ApiRequest::patch(url).with_body(RequestBody::json(body)?)).await
	}

	/// `DELETE` without a body.
	pub async fn delete(&self, url: &str) -> Result<Option<Value>> {
		self.execute(ApiRequest::delete(url)).await
	}

	/// `POST` with a multipart form.
	pub async fn upload(&self, url: &str, form: MultipartForm) -> Result<Option<Value>> {
		self.execute(ApiRequest::post(url).with_body(form)).await
	}

	/// Executes `request` and decodes the payload into `T`.
	///
	/// An absent payload decodes from `null`, so `Option<_>` and `()` targets accept it.
	pub async fn fetch<T>(&self, request: ApiRequest) -> Result<T>
	where
		T: DeserializeOwned,
	{
		let payload = self.execute(request).await?.unwrap_or(Value::Null);

		serde_path_to_error::deserialize(payload).map_err(|source| Error::Decode { source })
	}

	#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
	async fn run(&self, request: &ApiRequest) -> Result<Option<Value>> {
		let url = self.config.resolve(&request.url)?;
		let body = if matches!(request.method, Method::GET | Method::HEAD) {
			RequestBody::Empty.encode()?
		} else {
			request.body.encode()?
		};
		let retry = request.retry.unwrap_or(self.config.retry);
		let auth = request.auth.unwrap_or(true);
		let outgoing = Outgoing {
			method: &request.method,
			url: &url,
			body: &body,
			headers: &request.headers,
			force_json: request.force_json,
			auth,
			cancel: request.cancel.as_ref(),
		};
		let mut try_index = 0;
		let mut refreshed = false;

		loop {
			let response = match self.send(&outgoing).await {
				Ok(response) => response,
				Err(Error::Transport(e)) if try_index < retry.attempts => {
					obs::log_debug!(url = %url, try_index, error = %e, "Transport failure; retrying.");
					backoff(&retry, &mut try_index).await;

					continue;
				},
				Err(e) => return Err(e),
			};
			let status = response.status().as_u16();

			if status == 204 {
				return Ok(None);
			}
			if status == 401 && auth && !refreshed {
				refreshed = true;

				if self.refresh_once().await.is_some() {
					continue;
				}

				return Err(self.teardown(true));
			}
			if is_transient_status(status) && try_index < retry.attempts {
				obs::log_debug!(url = %url, status, try_index, "Transient status; retrying.");
				backoff(&retry, &mut try_index).await;

				continue;
			}

			let payload = parse_payload(response.body());

			if !response.status().is_success() {
				return Err(Error::Http { status, payload: payload.unwrap_or(Value::Null) });
			}

			return Ok(payload);
		}
	}

	/// Sends one try: builds headers, races the transport against cancellation, and
	/// absorbs same-origin cookies.
	pub(crate) async fn send(&self, outgoing: &Outgoing<'_>) -> Result<HttpResponse> {
		let bearer = if outgoing.auth { self.access_token() } else { None };
		let headers = build_headers(&self.config, &self.cookies, HeaderContext {
			url: outgoing.url,
			body: &outgoing.body.kind,
			extra: outgoing.headers,
			force_json: outgoing.force_json,
			bearer: bearer.as_ref(),
		})?;
		let mut builder = http::Request::builder()
			.method(outgoing.method.clone())
			.uri(outgoing.url.as_str());

		if let Some(slot) = builder.headers_mut() {
			*slot = headers;
		}

		let request = builder.body(outgoing.body.bytes.clone()).map_err(ConfigError::from)?;
		let call = self.http_client.execute(request);
		let response = match outgoing.cancel {
			Some(cancel) => tokio::select! {
				biased;
				_ = cancel.cancelled() => Err(TransportError::Cancelled),
				response = call => response,
			},
			None => call.await,
		}?;

		if self.config.is_same_origin(outgoing.url) {
			self.cookies.absorb(response.headers());
		}

		Ok(response)
	}
}

/// Parses a response body: `None` when empty, JSON when it parses, `{"raw": text}` otherwise.
pub(crate) fn parse_payload(bytes: &[u8]) -> Option<Value> {
	if bytes.is_empty() {
		return None;
	}

	Some(serde_json::from_slice(bytes).unwrap_or_else(|_| {
		serde_json::json!({ "raw": String::from_utf8_lossy(bytes) })
	}))
}

async fn backoff(retry: &RetryPolicy, try_index: &mut u32) {
	tokio::time::sleep(retry.delay_for(*try_index).unsigned_abs()).await;

	*try_index += 1;
}

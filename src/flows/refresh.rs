//! Singleflight refresh-token exchange.
//!
//! Any number of callers may ask for a refresh at once (typically several requests that
//! all saw a 401). The first caller performs the exchange while holding the flight guard;
//! the others wait on the same guard and then return the outcome it produced instead of
//! spending the refresh token a second time. A completed flight bumps a generation
//! counter, which is how a waiter tells "someone refreshed while I waited" apart from
//! "no refresh has happened since I asked".

mod metrics;

pub use metrics::RefreshMetrics;

// crates.io
use http::{HeaderMap, Method};
// self
use crate::{
	_prelude::*,
	auth::{RefreshBody, TokenResponse, TokenSecret},
	flows::{Outgoing, Session, parse_payload},
	http::{HttpTransport, RequestBody},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	sync::SyncEvent,
};

#[derive(Debug, Default)]
pub(crate) struct RefreshGate {
	flight: AsyncMutex<()>,
	state: Mutex<FlightState>,
}
impl RefreshGate {
	fn generation(&self) -> u64 {
		self.state.lock().generation
	}

	/// Outcome of the flight that completed after `observed`, if any.
	fn completed_since(&self, observed: u64) -> Option<Option<TokenSecret>> {
		let state = self.state.lock();

		(state.generation != observed).then(|| state.outcome.clone())
	}

	fn complete(&self, outcome: Option<TokenSecret>) {
		let mut state = self.state.lock();

		state.generation = state.generation.wrapping_add(1);
		state.outcome = outcome;
	}
}

#[derive(Debug, Default)]
struct FlightState {
	generation: u64,
	outcome: Option<TokenSecret>,
}

impl<C> Session<C>
where
	C: ?Sized + HttpTransport,
{
	/// Exchanges the stored refresh token for a new access token, at most once at a time.
	///
	/// Resolves to the new access token, or `None` when no refresh token is stored or the
	/// exchange failed for any reason. Failures are logged and counted, never returned.
	pub async fn refresh_once(&self) -> Option<TokenSecret> {
		let observed = self.refresh_gate.generation();
		let _flight = self.refresh_gate.flight.lock().await;

		if let Some(shared) = self.refresh_gate.completed_since(observed) {
			obs::log_debug!(tab = %self.tab, "Joined an in-flight refresh.");

			return shared;
		}

		let outcome = self.exchange_refresh().await;

		self.refresh_gate.complete(outcome.clone());

		outcome
	}

	#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
	async fn exchange_refresh(&self) -> Option<TokenSecret> {
		const KIND: FlowKind = FlowKind::Refresh;

		let Some(refresh) = self.refresh_token() else {
			obs::log_debug!(tab = %self.tab, "No refresh token stored; skipping refresh.");

			return None;
		};
		let span = FlowSpan::new(KIND, "refresh_once");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.refresh_metrics.record_attempt();

		match span.instrument(self.request_refresh(&refresh)).await {
			Ok((access, rotated)) => {
				self.set_access(Some(access.expose()));

				if let Some(rotated) = rotated {
					self.set_refresh(Some(rotated.expose()));
				}

				self.broadcast(SyncEvent::Refreshed);
				self.refresh_metrics.record_success();
				obs::record_flow_outcome(KIND, FlowOutcome::Success);

				Some(access)
			},
			Err(e) => {
				obs::log_warn!(tab = %self.tab, status = e.status(), error = %e, "Token refresh failed.");
				self.refresh_metrics.record_failure();
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);

				None
			},
		}
	}

	async fn request_refresh(
		&self,
		refresh: &TokenSecret,
	) -> Result<(TokenSecret, Option<TokenSecret>)> {
		let url = self.config.resolve(&self.config.endpoints.refresh)?;
		let body = RequestBody::json(&RefreshBody { refresh: refresh.expose() })?.encode()?;
		let headers = HeaderMap::new();
		let response = self
			.send(&Outgoing {
				method: &Method::POST,
				url: &url,
				body: &body,
				headers: &headers,
				force_json: true,
				auth: false,
				cancel: None,
			})
			.await?;

		if !response.status().is_success() {
			return Err(Error::Http {
				status: response.status().as_u16(),
				payload: parse_payload(response.body()).unwrap_or(Value::Null),
			});
		}

		let tokens = TokenResponse::parse(response.body())?;
		let access = tokens
			.access
			.and_then(|token| TokenSecret::non_empty(token.expose()))
			.ok_or(Error::MissingAccessToken)?;
		let rotated = tokens.refresh.and_then(|token| TokenSecret::non_empty(token.expose()));

		Ok((access, rotated))
	}
}

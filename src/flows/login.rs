//! Credential login and session teardown.

// self
use crate::{
	_prelude::*,
	auth::{CredentialPair, LoginBody, TokenResponse, TokenSecret},
	flows::{ApiRequest, Session, hooks},
	http::{HttpTransport, RequestBody},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	sync::SyncEvent,
};

impl<C> Session<C>
where
	C: ?Sized + HttpTransport,
{
	/// Exchanges a username and password for a credential pair.
	///
	/// Stores both tokens, schedules the proactive refresh, and broadcasts a login to
	/// other sessions. Bad credentials surface as [`Error::Http`] with the backend payload.
	pub async fn login(&self, username: &str, password: &str) -> Result<CredentialPair> {
		const KIND: FlowKind = FlowKind::Login;

		let span = FlowSpan::new(KIND, "login");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				let request = ApiRequest::post(self.config.endpoints.login.as_str())
					.with_body(RequestBody::json(&LoginBody { username, password })?)
					.with_auth(false);
				let payload = self.execute(request).await?.unwrap_or(Value::Null);
				let tokens = TokenResponse::from_value(payload)?;
				let access = tokens
					.access
					.and_then(|token| TokenSecret::non_empty(token.expose()))
					.ok_or(Error::MissingAccessToken)?;
				let refresh = tokens
					.refresh
					.and_then(|token| TokenSecret::non_empty(token.expose()))
					.ok_or(Error::MissingRefreshToken)?;

				// Refresh first: storing the access token may trigger an immediate refresh.
				self.set_refresh(Some(refresh.expose()));
				self.set_access(Some(access.expose()));
				self.broadcast(SyncEvent::Login);

				Ok(CredentialPair { access, refresh })
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Clears the session without navigating; returns the login URL for the caller to use.
	pub fn logout(&self) -> Url {
		self.clear_session()
	}

	/// Tears the session down after an unrecoverable 401 and notifies the UI.
	///
	/// `on_auth_fail` wins over `on_navigate`; with neither registered the event is only
	/// logged.
	pub(crate) fn teardown(&self, notify: bool) -> Error {
		let login_url = self.clear_session();

		if notify {
			let registered = self.hooks();

			match (registered.on_auth_fail, registered.on_navigate) {
				(Some(hook), _) => hooks::guarded("on_auth_fail", || hook(&login_url)),
				(None, Some(hook)) => hooks::guarded("on_navigate", || hook(&login_url)),
				(None, None) => {
					obs::log_warn!(tab = %self.tab, login_url = %login_url, "Session expired; no navigation hook registered.");
				},
			}
		}

		Error::Unauthorized { login_url }
	}

	#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
	fn clear_session(&self) -> Url {
		const KIND: FlowKind = FlowKind::Logout;

		let _span = FlowSpan::new(KIND, "teardown").entered();

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.set_access(None);
		self.set_refresh(None);
		self.clear_schedule();
		self.broadcast(SyncEvent::Logout);
		obs::record_flow_outcome(KIND, FlowOutcome::Success);

		let location = self.location();

		self.config.login_url(&location).unwrap_or_else(|e| {
			obs::log_warn!(error = %e, "Login page route is invalid; falling back to the base URL.");

			self.config.base_url.clone()
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{_preludet::*, auth::CredentialKey, sync::SyncChannel};

	#[tokio::test(start_paused = true)]
	async fn login_stores_pair_and_schedules_refresh() {
		let access = unsigned_jwt(Duration::hours(1));
		let reply = access.clone();
		let transport = ScriptedTransport::new(move |_, _| {
			Ok(json_response(200, serde_json::json!({ "access": reply, "refresh": "R1" })))
		});
		let (session, store, channel) = build_test_session(transport.clone());
		let mut inbox = channel.subscribe().expect("Local broadcast should subscribe.");
		let pair = session.login("alice", "x").await.expect("Login should succeed.");
		let sent = transport.requests_to("/auth/token/");

		assert_eq!(pair.access.expose(), access);
		assert_eq!(pair.refresh.expose(), "R1");
		assert_eq!(sent[0].json(), serde_json::json!({ "username": "alice", "password": "x" }));
		assert!(sent[0].header("authorization").is_none());
		assert_eq!(store.snapshot().get(&CredentialKey::Refresh).map(String::as_str), Some("R1"));
		assert!(session.is_refresh_scheduled());

		let mut events = Vec::new();

		while let Ok(Some(message)) =
			tokio::time::timeout(std::time::Duration::from_millis(50), inbox.recv()).await
		{
			events.push(message.event.as_str());
		}

		assert_eq!(events, ["refresh", "access", "login"]);
	}

	#[tokio::test]
	async fn rejected_credentials_surface_backend_error() {
		let transport = ScriptedTransport::new(|_, _| {
			Ok(json_response(401, serde_json::json!({
				"detail": "No active account found with the given credentials"
			})))
		});
		let (session, _, _) = build_test_session(transport.clone());
		let err = session.login("alice", "wrong").await.expect_err("Login should fail.");

		assert!(matches!(err, Error::Http { status: 401, .. }));
		assert_eq!(transport.requests().len(), 1);
		assert!(!session.is_authenticated());
	}

	#[tokio::test]
	async fn login_requires_both_tokens() {
		let transport = ScriptedTransport::new(|_, index| match index {
			0 => Ok(json_response(200, serde_json::json!({ "refresh": "R1" }))),
			_ => Ok(json_response(200, serde_json::json!({ "access": "A1", "refresh": "" }))),
		});
		let (session, store, _) = build_test_session(transport);

		assert!(matches!(session.login("a", "b").await, Err(Error::MissingAccessToken)));
		assert!(matches!(session.login("a", "b").await, Err(Error::MissingRefreshToken)));
		assert!(store.snapshot().is_empty());
	}

	#[tokio::test]
	async fn logout_clears_without_navigation() {
		let transport = ScriptedTransport::new(|_, _| panic!("No request expected."));
		let (session, _, _) = build_test_session(transport);
		let navigated = Arc::new(Mutex::new(0));
		let seen = navigated.clone();

		session.on_navigate(move |_| *seen.lock() += 1);
		session.set_refresh(Some("R1"));
		session.set_access(Some(unsigned_jwt(Duration::hours(1)).as_str()));

		assert!(session.is_refresh_scheduled());

		let login_url = session.logout();

		assert_eq!(login_url.as_str(), "https://app.test/login/?next=%2F");
		assert!(!session.is_authenticated());
		assert!(session.refresh_token().is_none());
		assert!(!session.is_refresh_scheduled());
		assert_eq!(*navigated.lock(), 0);
	}

	#[tokio::test]
	async fn teardown_falls_back_to_navigation_hook() {
		let transport = ScriptedTransport::new(|_, _| panic!("No request expected."));
		let (session, _, _) = build_test_session(transport);
		let navigated = Arc::new(Mutex::new(Vec::new()));
		let seen = navigated.clone();

		session.on_navigate(move |url| seen.lock().push(url.path().to_owned()));

		let err = session.teardown(true);

		assert!(matches!(err, Error::Unauthorized { .. }));
		assert_eq!(*navigated.lock(), ["/login/"]);
	}
}

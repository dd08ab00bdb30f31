//! Client configuration: endpoints, anti-forgery names, retry and refresh timing.

// self
use crate::{_prelude::*, error::ConfigError};

/// Status codes treated as transient server or overload failures.
pub const TRANSIENT_STATUSES: [u16; 4] = [429, 502, 503, 504];

/// Returns `true` when `status` is eligible for backoff retries.
pub fn is_transient_status(status: u16) -> bool {
	TRANSIENT_STATUSES.contains(&status)
}

/// Top-level client configuration.
///
/// Every section has defaults matching the backend's routing, so the only required
/// value is the origin the client talks to.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClientConfig {
	/// Origin (and base path) used to resolve relative URLs and decide same-origin status.
	pub base_url: Url,
	/// Server routes used by the session.
	#[serde(default)]
	pub endpoints: Endpoints,
	/// Anti-forgery cookie and header names.
	#[serde(default)]
	pub csrf: CsrfConfig,
	/// Logical name of the cross-session broadcast channel.
	#[serde(default = "default_channel_name")]
	pub channel_name: String,
	/// Retry policy applied when a request does not override it.
	#[serde(default)]
	pub retry: RetryPolicy,
	/// Proactive refresh timing.
	#[serde(default)]
	pub schedule: ScheduleConfig,
}
impl ClientConfig {
	/// Creates a configuration with default routes for the provided origin.
	pub fn new(base_url: Url) -> Self {
		Self {
			base_url,
			endpoints: Endpoints::default(),
			csrf: CsrfConfig::default(),
			channel_name: default_channel_name(),
			retry: RetryPolicy::default(),
			schedule: ScheduleConfig::default(),
		}
	}

	/// Parses `base_url` and builds a default configuration around it.
	pub fn parse(base_url: &str) -> Result<Self, ConfigError> {
		let url = Url::parse(base_url)
			.map_err(|source| ConfigError::InvalidUrl { url: base_url.into(), source })?;

		Ok(Self::new(url))
	}

	/// Loads a configuration from a JSON document; omitted sections use defaults.
	pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
		let de = &mut serde_json::Deserializer::from_str(raw);

		serde_path_to_error::deserialize(de).map_err(|source| ConfigError::Document { source })
	}

	/// Overrides the server routes.
	pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
		self.endpoints = endpoints;

		self
	}

	/// Overrides the anti-forgery cookie/header names.
	pub fn with_csrf(mut self, csrf: CsrfConfig) -> Self {
		self.csrf = csrf;

		self
	}

	/// Overrides the broadcast channel name.
	pub fn with_channel_name(mut self, name: impl Into<String>) -> Self {
		self.channel_name = name.into();

		self
	}

	/// Overrides the default retry policy.
	pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
		self.retry = retry;

		self
	}

	/// Overrides the proactive refresh timing.
	pub fn with_schedule(mut self, schedule: ScheduleConfig) -> Self {
		self.schedule = schedule;

		self
	}

	/// Resolves an absolute URL or a path relative to [`ClientConfig::base_url`].
	pub fn resolve(&self, target: &str) -> Result<Url, ConfigError> {
		self.base_url
			.join(target)
			.map_err(|source| ConfigError::InvalidUrl { url: target.into(), source })
	}

	/// Returns `true` if `url` shares scheme, host, and port with the base URL.
	pub fn is_same_origin(&self, url: &Url) -> bool {
		url.origin() == self.base_url.origin()
	}

	/// Builds the login redirect carrying `next` as the return target.
	pub fn login_url(&self, next: &str) -> Result<Url, ConfigError> {
		let mut url = self.resolve(&self.endpoints.login_page)?;

		url.query_pairs_mut().append_pair("next", next);

		Ok(url)
	}
}

fn default_channel_name() -> String {
	"auth".into()
}

/// Server routes consumed by the session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
	/// Credential exchange (`{username, password}` → `{access, refresh}`).
	pub login: String,
	/// Refresh exchange (`{refresh}` → `{access, refresh?}`).
	pub refresh: String,
	/// Page users are sent to when the session cannot be recovered.
	pub login_page: String,
}
impl Default for Endpoints {
	fn default() -> Self {
		Self {
			login: "/auth/token/".into(),
			refresh: "/auth/token/refresh/".into(),
			login_page: "/login/".into(),
		}
	}
}

/// Anti-forgery cookie and header names.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsrfConfig {
	/// Cookie that carries the anti-forgery token.
	pub cookie_name: String,
	/// Header the token is mirrored into on same-origin requests.
	pub header_name: String,
}
impl Default for CsrfConfig {
	fn default() -> Self {
		Self { cookie_name: "csrftoken".into(), header_name: "X-CSRFToken".into() }
	}
}

/// Exponential backoff policy for transient failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
	/// Retries after the first try; total tries are `attempts + 1`.
	pub attempts: u32,
	/// Delay before the first retry; doubles on every subsequent one.
	pub base_delay: Duration,
}
impl RetryPolicy {
	/// Creates a policy with the provided budget and base delay.
	pub fn new(attempts: u32, base_delay: Duration) -> Self {
		Self { attempts, base_delay }
	}

	/// Policy that never retries.
	pub fn none() -> Self {
		Self { attempts: 0, ..Self::default() }
	}

	/// Computes `base_delay * 2^try_index`, saturating instead of overflowing.
	pub fn delay_for(&self, try_index: u32) -> Duration {
		let multiplier = 1_i32.checked_shl(try_index).filter(|m| *m > 0).unwrap_or(i32::MAX);

		self.base_delay.saturating_mul(multiplier)
	}
}
impl Default for RetryPolicy {
	fn default() -> Self {
		Self { attempts: 2, base_delay: Duration::milliseconds(400) }
	}
}

/// When to refresh relative to expiry, and how long to coalesce wake-up triggers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
	/// How long before expiry the refresh should run.
	pub lead: Duration,
	/// Lower bound for an armed timer.
	pub min_delay: Duration,
	/// Upper bound for an armed timer.
	pub max_delay: Duration,
	/// Window used to collapse bursts of triggers into one reschedule.
	pub debounce: Duration,
}
impl ScheduleConfig {
	/// Decides how to refresh a token that expires in `until_expiry`.
	pub fn plan(&self, until_expiry: Duration) -> RefreshPlan {
		let raw = until_expiry.saturating_sub(self.lead);

		if !raw.is_positive() {
			return RefreshPlan::Immediate;
		}

		let delay = if raw < self.min_delay {
			self.min_delay
		} else if raw > self.max_delay {
			self.max_delay
		} else {
			raw
		};

		RefreshPlan::After(delay.unsigned_abs())
	}
}
impl Default for ScheduleConfig {
	fn default() -> Self {
		Self {
			lead: Duration::seconds(60),
			min_delay: Duration::seconds(5),
			max_delay: Duration::minutes(30),
			debounce: Duration::milliseconds(300),
		}
	}
}

/// Outcome of [`ScheduleConfig::plan`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshPlan {
	/// The token is expired or inside the lead window; refresh right away.
	Immediate,
	/// Arm a one-shot timer for the given delay.
	After(std::time::Duration),
}

//! Optional callbacks observing request lifecycle and session teardown.
//!
//! Hooks are UI plumbing: spinners, toasts, navigation. They run synchronously on the
//! calling task and a panicking hook is logged and ignored, so no hook can change what
//! the executor returns.

// std
use std::panic::{self, AssertUnwindSafe};
// crates.io
use http::Method;
// self
use crate::{_prelude::*, flows::Session, http::HttpTransport, obs};

/// Identifies the call a lifecycle hook fires for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestInfo {
	/// HTTP method.
	pub method: Method,
	/// URL as the caller passed it (absolute or base-relative).
	pub url: String,
}

/// Callback fired when a request starts or ends.
pub type RequestHook = Arc<dyn Fn(&RequestInfo) + Send + Sync>;
/// Callback fired when a request fails.
pub type RequestErrorHook = Arc<dyn Fn(&RequestInfo, &Error) + Send + Sync>;
/// Callback receiving the login URL after the session was torn down.
pub type NavigationHook = Arc<dyn Fn(&Url) + Send + Sync>;

/// Registered callbacks; every slot is optional.
#[derive(Clone, Default)]
pub struct Hooks {
	/// Fires before the first try of every call.
	pub on_request_start: Option<RequestHook>,
	/// Fires once per call after it succeeded; failures go to [`Hooks::on_request_error`] instead.
	pub on_request_end: Option<RequestHook>,
	/// Fires when a call resolves to an error.
	pub on_request_error: Option<RequestErrorHook>,
	/// Fires when an authenticated call could not be recovered by a refresh.
	///
	/// Takes precedence over [`Hooks::on_navigate`] for that case.
	pub on_auth_fail: Option<NavigationHook>,
	/// Default action after teardown: send the user to the login page.
	pub on_navigate: Option<NavigationHook>,
}
impl Debug for Hooks {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Hooks")
			.field("on_request_start", &self.on_request_start.is_some())
			.field("on_request_end", &self.on_request_end.is_some())
			.field("on_request_error", &self.on_request_error.is_some())
			.field("on_auth_fail", &self.on_auth_fail.is_some())
			.field("on_navigate", &self.on_navigate.is_some())
			.finish()
	}
}

impl<C> Session<C>
where
	C: ?Sized + HttpTransport,
{
	/// Replaces every hook at once.
	pub fn set_hooks(&self, hooks: Hooks) {
		*self.hooks.write() = hooks;
	}

	/// Registers the request-start hook.
	pub fn on_request_start(&self, hook: impl Fn(&RequestInfo) + 'static + Send + Sync) {
		self.hooks.write().on_request_start = Some(Arc::new(hook));
	}

	/// Registers the request-end hook.
	pub fn on_request_end(&self, hook: impl Fn(&RequestInfo) + 'static + Send + Sync) {
		self.hooks.write().on_request_end = Some(Arc::new(hook));
	}

	/// Registers the request-error hook.
	pub fn on_request_error(&self, hook: impl Fn(&RequestInfo, &Error) + 'static + Send + Sync) {
		self.hooks.write().on_request_error = Some(Arc::new(hook));
	}

	/// Registers the unrecoverable-auth hook.
	pub fn on_auth_fail(&self, hook: impl Fn(&Url) + 'static + Send + Sync) {
		self.hooks.write().on_auth_fail = Some(Arc::new(hook));
	}

	/// Registers the navigation hook.
	pub fn on_navigate(&self, hook: impl Fn(&Url) + 'static + Send + Sync) {
		self.hooks.write().on_navigate = Some(Arc::new(hook));
	}

	pub(crate) fn hooks(&self) -> Hooks {
		self.hooks.read().clone()
	}
}

/// Runs `hook`, swallowing a panic.
#[cfg_attr(not(feature = "tracing"), allow(unused_variables))]
pub(crate) fn guarded(name: &'static str, hook: impl FnOnce()) {
	if panic::catch_unwind(AssertUnwindSafe(hook)).is_err() {
		obs::log_warn!(hook = name, "Hook panicked; ignoring.");
	}
}

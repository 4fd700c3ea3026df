//! Orchestrator configuration.

use std::time::Duration;

use capsule_protocol::{ChannelLayout, ClassifierKind, DeviceType};

/// Window passed to device discovery.
pub const DEFAULT_SEARCH_WINDOW: Duration = Duration::from_secs(15);
/// Wait after device-connected before the session may be created.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(2000);
/// Deadline for a session to exist, counted from startup.
pub const DEFAULT_WATCHDOG: Duration = Duration::from_secs(100);
/// Sleep between SDK pumps; also the tick increment.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
/// How long teardown waits for the control plane to confirm a disconnect.
pub const DEFAULT_DISCONNECT_GRACE: Duration = Duration::from_secs(5);

/// Settings consumed once at the start of [`Orchestrator::run`](crate::Orchestrator::run).
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
	pub client_name: String,
	/// Control-plane endpoint handed to the SDK connect call.
	pub endpoint: String,
	pub license_key: String,
	pub layout: ChannelLayout,
	pub device_type: DeviceType,
	pub search_window: Duration,
	pub poll_interval: Duration,
	pub settle_delay: Duration,
	pub watchdog: Duration,
	pub disconnect_grace: Duration,
	/// Classifiers to bind once the session is active.
	pub classifiers: Vec<ClassifierKind>,
}

impl Default for OrchestratorConfig {
	fn default() -> Self {
		Self {
			client_name: "CapsuleClientExample".to_string(),
			endpoint: "inproc://capsule".to_string(),
			license_key: String::new(),
			layout: ChannelLayout::Monopolar,
			device_type: DeviceType::NeiryBand,
			search_window: DEFAULT_SEARCH_WINDOW,
			poll_interval: DEFAULT_POLL_INTERVAL,
			settle_delay: DEFAULT_SETTLE_DELAY,
			watchdog: DEFAULT_WATCHDOG,
			disconnect_grace: DEFAULT_DISCONNECT_GRACE,
			classifiers: ClassifierKind::CREATION_ORDER.to_vec(),
		}
	}
}

impl OrchestratorConfig {
	pub(crate) fn poll_ms(&self) -> u64 {
		millis(self.poll_interval).max(1)
	}
}

pub(crate) fn millis(duration: Duration) -> u64 {
	u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

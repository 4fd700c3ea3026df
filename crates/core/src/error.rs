//! Why a session run ended.

use capsule_protocol::{CalibrationFailReason, DisconnectReason, LicenseError, LocatorFailReason, SdkError, SessionError};
use serde::Serialize;
use thiserror::Error;

/// Reason the orchestrator entered teardown.
///
/// Only the first cause of a run is kept; later fatal events during teardown
/// are logged and ignored.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum TerminationCause {
	#[error("device discovery failed: {0}")]
	DiscoveryFailed(LocatorFailReason),

	#[error("empty device list")]
	NoDevices,

	#[error("device reported an unsupported connection")]
	DeviceUnsupported,

	#[error("device disconnected before the session started")]
	DeviceDisconnected,

	#[error("license verification failed: {0}")]
	LicenseRejected(LicenseError),

	#[error("session error: {0}")]
	SessionError(SessionError),

	#[error("session stopped")]
	SessionStopped,

	#[error("calibration failed: {0}")]
	CalibrationFailed(CalibrationFailReason),

	#[error("no session within {secs}s of startup")]
	Watchdog { secs: u64 },

	#[error("stop requested")]
	StopRequested,

	#[error("SDK call `{call}` failed: {code}")]
	Sdk { call: &'static str, code: SdkError },

	#[error("control-plane connection closed unexpectedly ({0:?})")]
	Disconnected(DisconnectReason),
}

impl TerminationCause {
	/// True for causes that count as a failed run.
	pub fn is_fatal(&self) -> bool {
		!matches!(self, TerminationCause::StopRequested | TerminationCause::SessionStopped)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn user_stop_and_session_end_are_not_fatal() {
		assert!(!TerminationCause::StopRequested.is_fatal());
		assert!(!TerminationCause::SessionStopped.is_fatal());
		assert!(TerminationCause::NoDevices.is_fatal());
		assert!(TerminationCause::Watchdog { secs: 100 }.is_fatal());
	}

	#[test]
	fn causes_serialize_with_kind_tag() {
		let json = serde_json::to_value(TerminationCause::DiscoveryFailed(LocatorFailReason::BluetoothDisabled)).unwrap();
		assert_eq!(json["kind"], "discoveryFailed");
		assert_eq!(json["detail"], "bluetoothDisabled");
	}
}

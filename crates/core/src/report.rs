//! Summary of a finished run.

use capsule_protocol::{ClassifierKind, DeviceInfo};
use serde::Serialize;

use crate::error::TerminationCause;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
	pub cause: TerminationCause,
	/// Tick counter at the end of the run.
	pub elapsed_ms: u64,
	pub frames_sent: u64,
	pub frames_lost: u64,
	pub failed_classifiers: Vec<ClassifierKind>,
	pub device: Option<DeviceInfo>,
	pub session_uuid: Option<String>,
	pub device_connected_at_ms: Option<u64>,
	pub session_created_at_ms: Option<u64>,
}

impl Default for SessionReport {
	fn default() -> Self {
		Self {
			cause: TerminationCause::StopRequested,
			elapsed_ms: 0,
			frames_sent: 0,
			frames_lost: 0,
			failed_classifiers: Vec::new(),
			device: None,
			session_uuid: None,
			device_connected_at_ms: None,
			session_created_at_ms: None,
		}
	}
}

impl SessionReport {
	/// False when the run ended on a fatal cause.
	pub fn is_success(&self) -> bool {
		!self.cause.is_fatal()
	}
}

//! Value types exchanged with the Capsule SDK.
//!
//! These mirror the SDK's enums and payload structs one-to-one so that a
//! binding layer can convert without loss.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Device families the locator can search for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceType {
	NeiryBand,
	NeiryBuds,
	NeiryHeadphones,
	NeiryImpulse,
	SinWave,
	Noise,
}

/// Discovered peripheral descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
	/// Stable identifier used to create the device.
	pub id: String,
	/// Human-readable name.
	pub name: String,
	/// Free-form description shown in discovery listings.
	pub description: String,
	pub device_type: DeviceType,
	/// EEG channel names reported once connected.
	#[serde(default)]
	pub channels: Vec<String>,
}

/// Device operating modes accepted by `switch_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceMode {
	Resistance,
	Idle,
	PowerDown,
	Signal,
	StartMems,
	StopMems,
	StartPpg,
	StopPpg,
	SignalAndResist,
}

/// Device link state reported by the connection-state callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeviceConnectionState {
	Disconnected,
	Connected,
	UnsupportedConnection,
}

/// Outcome code of a device discovery round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "camelCase")]
pub enum LocatorFailReason {
	#[error("ok")]
	Ok,
	#[error("Bluetooth adapter not found or disabled")]
	BluetoothDisabled,
	#[error("unknown discovery error")]
	Unknown,
}

/// License verification failure detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "camelCase")]
pub enum LicenseError {
	#[error("ok")]
	Ok,
	#[error("license key is invalid or expired")]
	InvalidOrExpiredKey,
	#[error("invalid license key format or device serial number")]
	InvalidKeyFormatOrDeviceSerial,
	#[error("license service not found")]
	LicenseServiceNotFound,
	#[error("license service is inaccessible")]
	LicenseServiceInaccessible,
	#[error("license grace period expired")]
	GracePeriodExpired,
}

/// Session-level error reported by the session error callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "camelCase")]
pub enum SessionError {
	#[error("unknown session error")]
	Unknown,
	#[error("session failed to start")]
	FailedToStart,
	#[error("session failed to stop")]
	FailedToStop,
	#[error("session lost connection")]
	LostConnection,
}

/// Why the control-plane connection closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DisconnectReason {
	UserRequested,
	Destruction,
	FatalError,
}

/// Error codes returned synchronously by SDK calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "camelCase")]
pub enum SdkError {
	#[error("failed to connect")]
	FailedToConnect,
	#[error("failed to initialize connection")]
	FailedToInitConnection,
	#[error("failed to initialize")]
	FailedToInitialize,
	#[error("device error")]
	DeviceError,
	#[error("individual NFB is not calibrated")]
	IndividualNfbNotCalibrated,
	#[error("data not received")]
	NotReceived,
	#[error("unlicensed access")]
	UnlicensedAccess,
	#[error("unknown SDK error")]
	Unknown,
}

/// Why an individual NFB calibration did not produce data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "camelCase")]
pub enum CalibrationFailReason {
	#[error("reason unknown")]
	None,
	#[error("too many artifacts")]
	TooManyArtifacts,
	#[error("alpha peak matches one of the alpha range borders")]
	PeakIsABorder,
}

/// Channel arrangement requested at session creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelLayout {
	Bipolar,
	#[default]
	Monopolar,
}

/// Activity markers attached to a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserActivity {
	Activity1,
	Activity2,
	Activity3,
	Activity4,
	Activity5,
	None,
}

/// Classifiers a session can host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClassifierKind {
	/// Neuro-feedback rhythms; owns the calibration state others read.
	NeuroFeedback,
	/// Productivity metrics (fatigue, gravity, concentration).
	Productivity,
	/// Heart-rate indexes from PPG.
	Cardio,
	/// Accelerometer and gyroscope stream.
	Motion,
}

impl ClassifierKind {
	/// Creation order. Neuro-feedback comes first because the others read its calibration.
	pub const CREATION_ORDER: [ClassifierKind; 4] = [
		ClassifierKind::NeuroFeedback,
		ClassifierKind::Productivity,
		ClassifierKind::Cardio,
		ClassifierKind::Motion,
	];

	pub const fn name(self) -> &'static str {
		match self {
			ClassifierKind::NeuroFeedback => "neuro-feedback",
			ClassifierKind::Productivity => "productivity",
			ClassifierKind::Cardio => "cardio",
			ClassifierKind::Motion => "motion",
		}
	}
}

impl std::fmt::Display for ClassifierKind {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.name())
	}
}

/// Creation parameters of the productivity classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductivityParams {
	/// Directory the classifier writes its own logs to.
	pub log_dir: String,
	pub speed: f64,
	pub max_speed: f64,
	pub slow_down: f64,
}

impl Default for ProductivityParams {
	fn default() -> Self {
		Self {
			log_dir: "logs".to_string(),
			speed: 0.05,
			max_speed: 0.05,
			slow_down: 0.001,
		}
	}
}

/// Periodic productivity metrics update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductivityValues {
	pub fatigue_score: f32,
	pub gravity_score: f32,
	pub concentration_score: f32,
	pub relaxation_score: f32,
	pub accumulated_fatigue: f32,
	pub fatigue_growth_rate: f32,
}

/// Neuro-feedback user state: one value per registered feedback function.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NfbUserState {
	pub feedback: Vec<f32>,
}

/// Cardio indexes update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardioData {
	pub artifacted: bool,
	pub kaplan_index: f32,
	pub heart_rate: f32,
	pub stress_index: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point3d {
	pub x: f32,
	pub y: f32,
	pub z: f32,
}

/// One motion sample.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MemsSample {
	pub accelerometer: Point3d,
	pub gyroscope: Point3d,
	/// Device timepoint in microseconds.
	pub timepoint: u64,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn creation_order_starts_with_neuro_feedback() {
		assert_eq!(ClassifierKind::CREATION_ORDER[0], ClassifierKind::NeuroFeedback);
		assert_eq!(ClassifierKind::CREATION_ORDER[3], ClassifierKind::Motion);
	}

	#[test]
	fn device_info_uses_camel_case() {
		let info = DeviceInfo {
			id: "821619".into(),
			name: "Band".into(),
			description: "Neiry Band 821619".into(),
			device_type: DeviceType::NeiryBand,
			channels: vec!["O1-T3".into()],
		};
		let json = serde_json::to_value(&info).unwrap();
		assert_eq!(json["deviceType"], "neiryBand");
		let back: DeviceInfo = serde_json::from_value(json).unwrap();
		assert_eq!(back, info);
	}

	#[test]
	fn failure_reasons_render_readable_messages() {
		assert_eq!(LocatorFailReason::BluetoothDisabled.to_string(), "Bluetooth adapter not found or disabled");
		assert_eq!(CalibrationFailReason::PeakIsABorder.to_string(), "alpha peak matches one of the alpha range borders");
	}
}

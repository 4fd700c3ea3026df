//! Event-source seam over the Capsule SDK.
//!
//! The SDK is callback driven: every callback fires synchronously inside a
//! periodic update call. [`CapsuleSdk::update`] models that pump. It returns
//! the events raised during the call, in delivery order, and the caller
//! dispatches them on the same thread. Control commands are the remaining
//! trait methods; none of them block.

use std::time::Duration;

use capsule_protocol::{
	CalibrationFailReason, CardioData, ChannelLayout, ClassifierKind, DeviceConnectionState, DeviceInfo, DeviceMode, DeviceType, DisconnectReason,
	LicenseError, LocatorFailReason, MemsSample, NfbUserState, ProductivityParams, ProductivityValues, SdkError, SessionError, UserActivity,
};

use crate::handle::{CalibratorHandle, ClassifierHandle, ClientHandle, DeviceHandle, LocatorHandle, SessionHandle};

/// Result of a synchronous SDK call.
pub type SdkResult<T> = std::result::Result<T, SdkError>;

/// Events raised by the SDK during [`CapsuleSdk::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum SdkEvent {
	/// Control-plane connection established.
	Connected,
	/// Control-plane connection closed; all SDK objects must be released.
	Disconnected(DisconnectReason),
	/// Non-fatal control-plane error.
	ClientError(SdkError),
	/// Discovery round finished. `error` is [`LocatorFailReason::Ok`] on success.
	DeviceList { devices: Vec<DeviceInfo>, error: LocatorFailReason },
	/// Device link state changed.
	DeviceConnection(DeviceConnectionState),
	/// Electrode resistances, one `(channel, ohms)` pair per channel.
	Resistances(Vec<(String, f32)>),
	/// License check finished.
	LicenseVerified { verified: bool, error: LicenseError },
	SessionStarted { uuid: String },
	SessionStopped,
	SessionError(SessionError),
	/// Output from a classifier or the calibrator.
	Classifier(ClassifierEvent),
}

/// Classifier and calibrator output.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierEvent {
	NfbInitialized,
	NfbUserState(NfbUserState),
	NfbError(String),
	ProductivityValues(ProductivityValues),
	ProductivityScore(f32),
	ProductivityArtifacts,
	ProductivityIndividualIndexes,
	CardioIndexes(CardioData),
	Mems(Vec<MemsSample>),
	CalibratorReady,
	CalibrationCompleted { individual_peak_frequency: f32 },
	CalibrationFailed(CalibrationFailReason),
}

/// Commands and event pump of the Capsule SDK.
///
/// Release methods take handles by value; the SDK treats each release as final.
pub trait CapsuleSdk {
	/// Library version string.
	fn version(&self) -> String;

	/// Runs one round of SDK work and returns the events it raised.
	fn update(&mut self) -> Vec<SdkEvent>;

	/// Creates the client and starts connecting. Completion arrives as [`SdkEvent::Connected`].
	fn connect(&mut self, client_name: &str, endpoint: &str) -> SdkResult<ClientHandle>;

	/// Requests an orderly disconnect. Completion arrives as [`SdkEvent::Disconnected`].
	fn disconnect(&mut self, client: &ClientHandle);

	fn destroy_client(&mut self, client: ClientHandle);

	/// Starts a discovery round bounded by `search`.
	fn request_devices(&mut self, client: &ClientHandle, device_type: DeviceType, search: Duration) -> SdkResult<LocatorHandle>;

	fn destroy_locator(&mut self, locator: LocatorHandle);

	fn create_device(&mut self, locator: &LocatorHandle, device_id: &str) -> SdkResult<DeviceHandle>;

	/// Starts connecting. State changes arrive as [`SdkEvent::DeviceConnection`].
	fn connect_device(&mut self, device: &DeviceHandle);

	fn release_device(&mut self, device: DeviceHandle);

	fn switch_mode(&mut self, device: &DeviceHandle, mode: DeviceMode);

	/// Firmware version, once the device has reported it.
	fn firmware_version(&mut self, device: &DeviceHandle) -> Option<String>;

	/// Starts license verification. Result arrives as [`SdkEvent::LicenseVerified`].
	fn verify_license(&mut self, client: &ClientHandle, key: &str, device: &DeviceHandle);

	fn create_session(&mut self, client: &ClientHandle, device: &DeviceHandle, layout: ChannelLayout) -> SdkResult<SessionHandle>;

	/// Starts the session. Completion arrives as [`SdkEvent::SessionStarted`].
	fn start_session(&mut self, session: &SessionHandle);

	fn mark_activity(&mut self, session: &SessionHandle, activity: UserActivity);

	fn destroy_session(&mut self, session: SessionHandle);

	/// Creates a classifier of `kind` with its default parameters.
	fn create_classifier(&mut self, session: &SessionHandle, kind: ClassifierKind) -> SdkResult<ClassifierHandle>;

	/// Creates the productivity classifier with explicit parameters.
	fn create_productivity(&mut self, session: &SessionHandle, params: &ProductivityParams) -> SdkResult<ClassifierHandle>;

	fn initialize_classifier(&mut self, classifier: &ClassifierHandle) -> SdkResult<()>;

	fn destroy_classifier(&mut self, classifier: ClassifierHandle);

	/// Registers a named feedback rhythm on a neuro-feedback classifier.
	fn add_feedback_function(&mut self, classifier: &ClassifierHandle, name: &str) -> SdkResult<()>;

	/// Returns the session's calibrator, creating it on first use.
	fn calibrator(&mut self, session: &SessionHandle) -> SdkResult<CalibratorHandle>;

	/// Starts a quick individual calibration. Result arrives as a classifier event.
	fn calibrate_quick(&mut self, calibrator: &CalibratorHandle) -> SdkResult<()>;
}

//! In-process simulated Capsule backend.
//!
//! [`SimulatedCapsule`] answers every command with the events a real device
//! would raise, delayed by a scripted number of pumps, and emits periodic
//! classifier output while a session runs. It also keeps a journal of every
//! command and the set of live objects, so callers can check ordering and
//! that every handle was released exactly once.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use capsule_protocol::{
	CalibrationFailReason, CardioData, ChannelLayout, ClassifierKind, DeviceConnectionState, DeviceInfo, DeviceMode, DeviceType, DisconnectReason,
	LicenseError, LocatorFailReason, MemsSample, NfbUserState, Point3d, ProductivityParams, ProductivityValues, SdkError, SessionError, UserActivity,
};
use capsule_runtime::{
	CalibratorHandle, CapsuleSdk, ClassifierEvent, ClassifierHandle, ClientHandle, DeviceHandle, LocatorHandle, SdkEvent, SdkResult, SessionHandle,
};
use tracing::trace;

/// Behavior of a [`SimulatedCapsule`]. Delays are in pumps.
#[derive(Debug, Clone)]
pub struct SimScript {
	pub devices: Vec<DeviceInfo>,
	pub discovery_error: LocatorFailReason,
	pub discovery_pumps: u64,
	pub connection_state: DeviceConnectionState,
	/// `None` never answers the device connect.
	pub connect_pumps: Option<u64>,
	pub license: Result<(), LicenseError>,
	pub session_start: Result<(), SessionError>,
	/// Device reports `Disconnected` this many pumps after connecting.
	pub drop_device_after: Option<u64>,
	/// Session stops by itself this many pumps after starting.
	pub session_pumps: Option<u64>,
	pub failing_classifiers: Vec<ClassifierKind>,
	pub calibration: Result<f32, CalibrationFailReason>,
	pub calibration_pumps: u64,
	pub productivity_every: u64,
	pub firmware: Option<String>,
	/// Whether `disconnect` is answered with [`SdkEvent::Disconnected`].
	pub answer_disconnect: bool,
}

impl Default for SimScript {
	fn default() -> Self {
		Self {
			devices: vec![sim_device(0)],
			discovery_error: LocatorFailReason::Ok,
			discovery_pumps: 10,
			connection_state: DeviceConnectionState::Connected,
			connect_pumps: Some(5),
			drop_device_after: None,
			license: Ok(()),
			session_start: Ok(()),
			session_pumps: None,
			failing_classifiers: Vec::new(),
			calibration: Ok(10.4),
			calibration_pumps: 40,
			productivity_every: 20,
			firmware: Some("sim-fw 2.4.1".to_string()),
			answer_disconnect: true,
		}
	}
}

/// Simulated band descriptor number `n`.
pub fn sim_device(n: usize) -> DeviceInfo {
	DeviceInfo {
		id: format!("sim-{n}"),
		name: "Neiry Band".to_string(),
		description: format!("Neiry Band (simulated #{n})"),
		device_type: DeviceType::NeiryBand,
		channels: vec!["T3".into(), "T4".into(), "O1".into(), "O2".into()],
	}
}

/// One journaled SDK command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
	Connect { client_name: String, endpoint: String },
	Disconnect,
	DestroyClient,
	RequestDevices { device_type: DeviceType, search: Duration },
	DestroyLocator,
	CreateDevice(String),
	ConnectDevice,
	ReleaseDevice,
	SwitchMode(DeviceMode),
	VerifyLicense(String),
	CreateSession(ChannelLayout),
	StartSession,
	MarkActivity(UserActivity),
	DestroySession,
	CreateClassifier(ClassifierKind),
	InitializeClassifier(ClassifierKind),
	DestroyClassifier(ClassifierKind),
	AddFeedbackFunction(String),
	Calibrator,
	CalibrateQuick,
}

/// A command and the pump count at which it was issued.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
	pub pump: u64,
	pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Object {
	Client,
	Locator,
	Device,
	Session,
	Classifier(ClassifierKind),
	Calibrator,
}

/// Scripted stand-in for the Capsule SDK.
pub struct SimulatedCapsule {
	script: SimScript,
	pump: u64,
	next_id: u64,
	live: HashMap<u64, Object>,
	initialized: HashSet<u64>,
	scheduled: Vec<(u64, SdkEvent)>,
	journal: Vec<Call>,
	violations: Vec<String>,
	device_connected: bool,
	session_started_at: Option<u64>,
	calibrator: Option<u64>,
	productivity_params: Option<ProductivityParams>,
	firmware_reads: u32,
}

impl SimulatedCapsule {
	pub fn new(script: SimScript) -> Self {
		Self {
			script,
			pump: 0,
			next_id: 1,
			live: HashMap::new(),
			initialized: HashSet::new(),
			scheduled: Vec::new(),
			journal: Vec::new(),
			violations: Vec::new(),
			device_connected: false,
			session_started_at: None,
			calibrator: None,
			productivity_params: None,
			firmware_reads: 0,
		}
	}

	pub fn script_mut(&mut self) -> &mut SimScript {
		&mut self.script
	}

	/// Number of `update` calls so far.
	pub fn pumps(&self) -> u64 {
		self.pump
	}

	pub fn journal(&self) -> &[Call] {
		&self.journal
	}

	pub fn commands(&self) -> impl Iterator<Item = &Command> {
		self.journal.iter().map(|c| &c.command)
	}

	/// Objects created and not yet released.
	pub fn outstanding(&self) -> usize {
		self.live.len()
	}

	/// Releases of unknown or mismatched handles.
	pub fn violations(&self) -> &[String] {
		&self.violations
	}

	/// Parameters passed to the last productivity classifier creation.
	pub fn productivity_params(&self) -> Option<&ProductivityParams> {
		self.productivity_params.as_ref()
	}

	/// Times the device firmware version was queried.
	pub fn firmware_reads(&self) -> u32 {
		self.firmware_reads
	}

	/// Queues an event for the next `update`.
	pub fn inject(&mut self, event: SdkEvent) {
		self.schedule(1, event);
	}

	/// Queues an event for the `update` call numbered `pump`.
	pub fn inject_at(&mut self, pump: u64, event: SdkEvent) {
		self.scheduled.push((pump, event));
	}

	fn record(&mut self, command: Command) {
		trace!(target = "capsule.sim", pump = self.pump, ?command, "sdk call");
		self.journal.push(Call { pump: self.pump, command });
	}

	fn schedule(&mut self, delay: u64, event: SdkEvent) {
		self.scheduled.push((self.pump + delay, event));
	}

	fn create(&mut self, object: Object) -> u64 {
		let id = self.next_id;
		self.next_id += 1;
		self.live.insert(id, object);
		id
	}

	fn release(&mut self, id: u64, expected: Object) {
		match self.live.remove(&id) {
			Some(found) if found == expected => {}
			Some(found) => self.violations.push(format!("handle {id}: released as {expected:?}, was {found:?}")),
			None => self.violations.push(format!("handle {id}: {expected:?} released twice or never created")),
		}
	}

	fn is_live(&self, id: u64, expected: Object) -> bool {
		self.live.get(&id) == Some(&expected)
	}

	fn running(&self, kind: ClassifierKind) -> bool {
		self.live.iter().any(|(id, object)| *object == Object::Classifier(kind) && self.initialized.contains(id))
	}

	fn periodic(&self, age: u64, events: &mut Vec<SdkEvent>) {
		let every = self.script.productivity_every.max(1);
		let t = age as f32;

		if age % every == 0 {
			if self.running(ClassifierKind::NeuroFeedback) {
				events.push(SdkEvent::Classifier(ClassifierEvent::NfbUserState(NfbUserState {
					feedback: vec![0.5 + 0.2 * (t / 90.0).sin(), 0.3 + 0.1 * (t / 70.0).cos(), 0.2],
				})));
			}
			if self.running(ClassifierKind::Productivity) {
				events.push(SdkEvent::Classifier(ClassifierEvent::ProductivityValues(ProductivityValues {
					fatigue_score: 20.0 + t / 100.0,
					gravity_score: 1.0 + 0.5 * (t / 150.0).sin(),
					concentration_score: 55.0 + 20.0 * (t / 200.0).sin(),
					relaxation_score: 40.0 + 10.0 * (t / 120.0).cos(),
					accumulated_fatigue: t / 400.0,
					fatigue_growth_rate: 0.25,
				})));
			}
		}
		if age % (every * 2) == 0 && self.running(ClassifierKind::Cardio) {
			events.push(SdkEvent::Classifier(ClassifierEvent::CardioIndexes(CardioData {
				artifacted: false,
				kaplan_index: 1.2,
				heart_rate: 68.0 + 4.0 * (t / 60.0).sin(),
				stress_index: 90.0,
			})));
		}
		if age % (every / 2).max(1) == 0 && self.running(ClassifierKind::Motion) {
			events.push(SdkEvent::Classifier(ClassifierEvent::Mems(vec![MemsSample {
				accelerometer: Point3d { x: 0.0, y: 0.0, z: 1.0 },
				gyroscope: Point3d { x: 0.01, y: -0.02, z: 0.0 },
				timepoint: age * 50_000,
			}])));
		}
	}
}

impl CapsuleSdk for SimulatedCapsule {
	fn version(&self) -> String {
		"capsule-sim 1.0.0".to_string()
	}

	fn update(&mut self) -> Vec<SdkEvent> {
		self.pump += 1;
		let now = self.pump;

		let mut events = Vec::new();
		let mut pending = Vec::with_capacity(self.scheduled.len());
		for (due, event) in std::mem::take(&mut self.scheduled) {
			if due <= now {
				if matches!(event, SdkEvent::SessionStarted { .. }) {
					self.session_started_at = Some(now);
				}
				events.push(event);
			} else {
				pending.push((due, event));
			}
		}
		self.scheduled = pending;

		if let Some(since) = self.session_started_at {
			let age = now - since;
			if age > 0 {
				self.periodic(age, &mut events);
			}
			if self.script.session_pumps == Some(age) {
				self.session_started_at = None;
				events.push(SdkEvent::SessionStopped);
			}
		}
		events
	}

	fn connect(&mut self, client_name: &str, endpoint: &str) -> SdkResult<ClientHandle> {
		self.record(Command::Connect {
			client_name: client_name.to_string(),
			endpoint: endpoint.to_string(),
		});
		let id = self.create(Object::Client);
		self.schedule(1, SdkEvent::Connected);
		Ok(ClientHandle::from_raw(id))
	}

	fn disconnect(&mut self, _client: &ClientHandle) {
		self.record(Command::Disconnect);
		self.session_started_at = None;
		if self.script.answer_disconnect {
			self.schedule(1, SdkEvent::Disconnected(DisconnectReason::UserRequested));
		}
	}

	fn destroy_client(&mut self, client: ClientHandle) {
		self.record(Command::DestroyClient);
		self.release(client.raw(), Object::Client);
	}

	fn request_devices(&mut self, _client: &ClientHandle, device_type: DeviceType, search: Duration) -> SdkResult<LocatorHandle> {
		self.record(Command::RequestDevices { device_type, search });
		let id = self.create(Object::Locator);
		let error = self.script.discovery_error;
		let devices = if error == LocatorFailReason::Ok { self.script.devices.clone() } else { Vec::new() };
		self.schedule(self.script.discovery_pumps, SdkEvent::DeviceList { devices, error });
		Ok(LocatorHandle::from_raw(id))
	}

	fn destroy_locator(&mut self, locator: LocatorHandle) {
		self.record(Command::DestroyLocator);
		self.release(locator.raw(), Object::Locator);
	}

	fn create_device(&mut self, locator: &LocatorHandle, device_id: &str) -> SdkResult<DeviceHandle> {
		self.record(Command::CreateDevice(device_id.to_string()));
		if !self.is_live(locator.raw(), Object::Locator) || !self.script.devices.iter().any(|d| d.id == device_id) {
			return Err(SdkError::DeviceError);
		}
		Ok(DeviceHandle::from_raw(self.create(Object::Device)))
	}

	fn connect_device(&mut self, _device: &DeviceHandle) {
		self.record(Command::ConnectDevice);
		if let Some(delay) = self.script.connect_pumps {
			let state = self.script.connection_state;
			self.device_connected = state == DeviceConnectionState::Connected;
			self.schedule(delay, SdkEvent::DeviceConnection(state));
			if let (DeviceConnectionState::Connected, Some(after)) = (state, self.script.drop_device_after) {
				self.schedule(delay + after, SdkEvent::DeviceConnection(DeviceConnectionState::Disconnected));
			}
		}
	}

	fn release_device(&mut self, device: DeviceHandle) {
		self.record(Command::ReleaseDevice);
		self.device_connected = false;
		self.release(device.raw(), Object::Device);
	}

	fn switch_mode(&mut self, _device: &DeviceHandle, mode: DeviceMode) {
		self.record(Command::SwitchMode(mode));
	}

	fn firmware_version(&mut self, device: &DeviceHandle) -> Option<String> {
		self.firmware_reads += 1;
		if self.device_connected && self.is_live(device.raw(), Object::Device) {
			self.script.firmware.clone()
		} else {
			None
		}
	}

	fn verify_license(&mut self, _client: &ClientHandle, key: &str, _device: &DeviceHandle) {
		self.record(Command::VerifyLicense(key.to_string()));
		let event = match self.script.license {
			Ok(()) => SdkEvent::LicenseVerified { verified: true, error: LicenseError::Ok },
			Err(error) => SdkEvent::LicenseVerified { verified: false, error },
		};
		self.schedule(3, event);
	}

	fn create_session(&mut self, _client: &ClientHandle, device: &DeviceHandle, layout: ChannelLayout) -> SdkResult<SessionHandle> {
		self.record(Command::CreateSession(layout));
		if !self.device_connected || !self.is_live(device.raw(), Object::Device) {
			return Err(SdkError::DeviceError);
		}
		Ok(SessionHandle::from_raw(self.create(Object::Session)))
	}

	fn start_session(&mut self, session: &SessionHandle) {
		self.record(Command::StartSession);
		let event = match self.script.session_start {
			Ok(()) => SdkEvent::SessionStarted {
				uuid: format!("00000000-0000-4000-8000-{:012x}", session.raw()),
			},
			Err(error) => SdkEvent::SessionError(error),
		};
		self.schedule(2, event);
	}

	fn mark_activity(&mut self, _session: &SessionHandle, activity: UserActivity) {
		self.record(Command::MarkActivity(activity));
	}

	fn destroy_session(&mut self, session: SessionHandle) {
		self.record(Command::DestroySession);
		self.session_started_at = None;
		if let Some(calibrator) = self.calibrator.take() {
			self.live.remove(&calibrator);
		}
		self.release(session.raw(), Object::Session);
	}

	fn create_classifier(&mut self, session: &SessionHandle, kind: ClassifierKind) -> SdkResult<ClassifierHandle> {
		self.record(Command::CreateClassifier(kind));
		if !self.is_live(session.raw(), Object::Session) || self.script.failing_classifiers.contains(&kind) {
			return Err(SdkError::FailedToInitialize);
		}
		Ok(ClassifierHandle::from_raw(self.create(Object::Classifier(kind))))
	}

	fn create_productivity(&mut self, session: &SessionHandle, params: &ProductivityParams) -> SdkResult<ClassifierHandle> {
		self.productivity_params = Some(params.clone());
		self.create_classifier(session, ClassifierKind::Productivity)
	}

	fn initialize_classifier(&mut self, classifier: &ClassifierHandle) -> SdkResult<()> {
		let Some(Object::Classifier(kind)) = self.live.get(&classifier.raw()).copied() else {
			return Err(SdkError::FailedToInitialize);
		};
		self.record(Command::InitializeClassifier(kind));
		self.initialized.insert(classifier.raw());
		if kind == ClassifierKind::NeuroFeedback {
			self.schedule(1, SdkEvent::Classifier(ClassifierEvent::NfbInitialized));
			if self.calibrator.is_some() {
				self.schedule(3, SdkEvent::Classifier(ClassifierEvent::CalibratorReady));
			}
		}
		Ok(())
	}

	fn destroy_classifier(&mut self, classifier: ClassifierHandle) {
		let kind = match self.live.get(&classifier.raw()) {
			Some(Object::Classifier(kind)) => *kind,
			_ => ClassifierKind::NeuroFeedback,
		};
		self.record(Command::DestroyClassifier(kind));
		self.initialized.remove(&classifier.raw());
		self.release(classifier.raw(), Object::Classifier(kind));
	}

	fn add_feedback_function(&mut self, _classifier: &ClassifierHandle, name: &str) -> SdkResult<()> {
		self.record(Command::AddFeedbackFunction(name.to_string()));
		Ok(())
	}

	fn calibrator(&mut self, session: &SessionHandle) -> SdkResult<CalibratorHandle> {
		self.record(Command::Calibrator);
		if !self.is_live(session.raw(), Object::Session) {
			return Err(SdkError::FailedToInitialize);
		}
		let id = match self.calibrator {
			Some(id) => id,
			None => {
				let id = self.create(Object::Calibrator);
				self.calibrator = Some(id);
				id
			}
		};
		Ok(CalibratorHandle::from_raw(id))
	}

	fn calibrate_quick(&mut self, calibrator: &CalibratorHandle) -> SdkResult<()> {
		self.record(Command::CalibrateQuick);
		if !self.is_live(calibrator.raw(), Object::Calibrator) {
			return Err(SdkError::IndividualNfbNotCalibrated);
		}
		let event = match self.script.calibration {
			Ok(iapf) => ClassifierEvent::CalibrationCompleted { individual_peak_frequency: iapf },
			Err(reason) => ClassifierEvent::CalibrationFailed(reason),
		};
		self.schedule(self.script.calibration_pumps, SdkEvent::Classifier(event));
		Ok(())
	}
}

//! Session lifecycle state machine.
//!
//! ```text
//! Idle -> Connecting -> Discovering -> Pairing -> Verifying -> SessionStart -> Active
//!                \____________\____________\__________\____________\___________\-> Terminating -> Idle
//! ```
//!
//! One task drives everything: pump the SDK, sleep one poll interval, advance
//! the tick counter, then evaluate the time-gated transitions (settle delay,
//! watchdog, stop flag). Every SDK event is handled synchronously inside the
//! pump that delivered it; telemetry frames are awaited inline, so a
//! reconnecting link pauses the loop until it is back.

use std::fmt;

use capsule_protocol::{DeviceConnectionState, DeviceInfo, DisconnectReason, LicenseError, LocatorFailReason, UserActivity};
use capsule_runtime::{
	CapsuleSdk, ClassifierEvent, ClientHandle, Delivery, DeviceHandle, Error, FrameSink, LocatorHandle, Result, SdkEvent, SessionHandle,
};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{OrchestratorConfig, millis};
use crate::error::TerminationCause;
use crate::pipeline::{ClassifierPipeline, PipelineOutput};
use crate::report::SessionReport;
use crate::stop::StopHandle;

/// Lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
	Idle,
	Connecting,
	Discovering,
	Pairing,
	Verifying,
	SessionStart,
	Active,
	Terminating,
}

impl Phase {
	pub const fn name(self) -> &'static str {
		match self {
			Phase::Idle => "idle",
			Phase::Connecting => "connecting",
			Phase::Discovering => "discovering",
			Phase::Pairing => "pairing",
			Phase::Verifying => "verifying",
			Phase::SessionStart => "session-start",
			Phase::Active => "active",
			Phase::Terminating => "terminating",
		}
	}

	fn is_winding_down(self) -> bool {
		matches!(self, Phase::Terminating | Phase::Idle)
	}
}

impl fmt::Display for Phase {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// The device picked from discovery.
struct DeviceRef {
	info: DeviceInfo,
	handle: DeviceHandle,
}

struct SessionRef {
	handle: SessionHandle,
	uuid: Option<String>,
}

/// Drives one acquisition session from connect to teardown.
///
/// Owns the SDK backend, the telemetry sink and every handle created during a
/// run. After [`run`](Self::run) returns it is back in [`Phase::Idle`] and can
/// be run again.
pub struct Orchestrator<S: CapsuleSdk, K: FrameSink> {
	config: OrchestratorConfig,
	sdk: S,
	sink: K,
	pipeline: ClassifierPipeline,
	stop: StopHandle,
	phase: Phase,
	client: Option<ClientHandle>,
	locator: Option<LocatorHandle>,
	device: Option<DeviceRef>,
	session: Option<SessionRef>,
	ticks: u64,
	connected_at: Option<u64>,
	terminating_since: u64,
	firmware_logged: bool,
	cause: Option<TerminationCause>,
	pending: Option<TerminationCause>,
	report: SessionReport,
}

impl<S: CapsuleSdk, K: FrameSink> Orchestrator<S, K> {
	pub fn new(config: OrchestratorConfig, sdk: S, sink: K) -> Self {
		let pipeline = ClassifierPipeline::new(&config.classifiers);
		Self {
			config,
			sdk,
			sink,
			pipeline,
			stop: StopHandle::new(),
			phase: Phase::Idle,
			client: None,
			locator: None,
			device: None,
			session: None,
			ticks: 0,
			connected_at: None,
			terminating_since: 0,
			firmware_logged: false,
			cause: None,
			pending: None,
			report: SessionReport::default(),
		}
	}

	/// Handle that requests an orderly stop from another task.
	pub fn stop_handle(&self) -> StopHandle {
		self.stop.clone()
	}

	pub fn phase(&self) -> Phase {
		self.phase
	}

	pub fn sdk(&self) -> &S {
		&self.sdk
	}

	pub fn sdk_mut(&mut self) -> &mut S {
		&mut self.sdk
	}

	pub fn sink(&self) -> &K {
		&self.sink
	}

	/// Runs one full lifecycle and returns how it ended.
	///
	/// Only a failing control-plane connect is an `Err`; every failure after
	/// that ends the run through teardown and is reported in
	/// [`SessionReport::cause`].
	pub async fn run(&mut self) -> Result<SessionReport> {
		self.rearm();
		info!(target = "capsule.orchestrator", sdk_version = %self.sdk.version(), client = %self.config.client_name, "starting session lifecycle");

		self.transition(Phase::Connecting);
		let client = match self.sdk.connect(&self.config.client_name, &self.config.endpoint) {
			Ok(client) => client,
			Err(code) => {
				error!(target = "capsule.orchestrator", error = %code, "control-plane connect failed");
				self.transition(Phase::Idle);
				return Err(Error::sdk("connect", code));
			}
		};
		self.client = Some(client);

		self.sink.open().await;

		let poll_ms = self.config.poll_ms();
		while self.phase != Phase::Idle {
			for event in self.sdk.update() {
				self.dispatch(event).await;
			}
			if self.phase == Phase::Idle {
				break;
			}
			tokio::time::sleep(self.config.poll_interval).await;
			self.ticks += poll_ms;
			self.on_tick();
		}

		self.sink.shutdown().await;
		Ok(self.finish())
	}

	fn rearm(&mut self) {
		if self.phase != Phase::Idle {
			warn!(target = "capsule.orchestrator", phase = %self.phase, "previous run was interrupted; releasing its handles");
			self.teardown();
			if let Some(client) = self.client.take() {
				self.sdk.destroy_client(client);
			}
			self.phase = Phase::Idle;
		}
		self.stop.reset();
		self.pipeline = ClassifierPipeline::new(&self.config.classifiers);
		self.ticks = 0;
		self.connected_at = None;
		self.terminating_since = 0;
		self.firmware_logged = false;
		self.cause = None;
		self.pending = None;
		self.report = SessionReport::default();
	}

	fn finish(&mut self) -> SessionReport {
		let mut report = std::mem::take(&mut self.report);
		report.cause = self.cause.take().unwrap_or(TerminationCause::StopRequested);
		report.elapsed_ms = self.ticks;
		report.failed_classifiers = self.pipeline.failed().to_vec();
		info!(
			target = "capsule.orchestrator",
			cause = %report.cause,
			elapsed_ms = report.elapsed_ms,
			frames_sent = report.frames_sent,
			frames_lost = report.frames_lost,
			"session lifecycle finished"
		);
		report
	}

	fn transition(&mut self, next: Phase) {
		if self.phase == next {
			return;
		}
		info!(target = "capsule.orchestrator", from = %self.phase, to = %next, tick_ms = self.ticks, "phase transition");
		self.phase = next;
	}

	async fn dispatch(&mut self, event: SdkEvent) {
		match event {
			SdkEvent::Connected => self.on_connected(),
			SdkEvent::Disconnected(reason) => self.on_disconnected(reason),
			SdkEvent::ClientError(code) => warn!(target = "capsule.orchestrator", error = %code, "client error reported"),
			SdkEvent::DeviceList { devices, error } => self.on_device_list(devices, error),
			SdkEvent::DeviceConnection(state) => self.on_device_connection(state),
			SdkEvent::Resistances(values) => {
				for (channel, ohms) in values {
					info!(target = "capsule.orchestrator", %channel, ohms, "electrode resistance");
				}
			}
			SdkEvent::LicenseVerified { verified, error } => self.on_license(verified, error),
			SdkEvent::SessionStarted { uuid } => self.on_session_started(uuid),
			SdkEvent::SessionStopped => {
				if self.session.is_some() {
					self.terminate(TerminationCause::SessionStopped);
				}
			}
			SdkEvent::SessionError(err) => {
				if self.session.is_some() {
					self.terminate(TerminationCause::SessionError(err));
				} else {
					debug!(target = "capsule.orchestrator", error = %err, "session error without a session");
				}
			}
			SdkEvent::Classifier(event) => self.on_classifier(event).await,
		}
	}

	fn on_connected(&mut self) {
		if self.phase != Phase::Connecting {
			debug!(target = "capsule.orchestrator", phase = %self.phase, "unexpected connected event");
			return;
		}
		let Some(client) = &self.client else {
			return;
		};
		match self.sdk.request_devices(client, self.config.device_type, self.config.search_window) {
			Ok(locator) => {
				self.locator = Some(locator);
				info!(target = "capsule.orchestrator", search = ?self.config.search_window, "searching for devices");
				self.transition(Phase::Discovering);
			}
			Err(code) => self.terminate(TerminationCause::Sdk { call: "request_devices", code }),
		}
	}

	fn on_device_list(&mut self, devices: Vec<DeviceInfo>, error: LocatorFailReason) {
		if self.phase != Phase::Discovering || self.device.is_some() {
			debug!(target = "capsule.orchestrator", phase = %self.phase, "ignoring device list");
			return;
		}
		if error != LocatorFailReason::Ok {
			self.terminate(TerminationCause::DiscoveryFailed(error));
			return;
		}
		let Some(info) = devices.into_iter().next() else {
			self.terminate(TerminationCause::NoDevices);
			return;
		};
		let Some(locator) = &self.locator else {
			return;
		};

		info!(target = "capsule.orchestrator", id = %info.id, name = %info.name, description = %info.description, "device selected");
		match self.sdk.create_device(locator, &info.id) {
			Ok(handle) => {
				self.sdk.connect_device(&handle);
				self.report.device = Some(info.clone());
				self.device = Some(DeviceRef { info, handle });
				self.transition(Phase::Pairing);
			}
			Err(code) => self.terminate(TerminationCause::Sdk { call: "create_device", code }),
		}
	}

	fn on_device_connection(&mut self, state: DeviceConnectionState) {
		match (state, self.phase) {
			(_, Phase::Terminating | Phase::Idle) => {
				debug!(target = "capsule.orchestrator", ?state, "device state during teardown");
			}
			(DeviceConnectionState::Connected, Phase::Pairing) => {
				let (Some(client), Some(device)) = (&self.client, &self.device) else {
					return;
				};
				info!(target = "capsule.orchestrator", id = %device.info.id, channels = ?device.info.channels, "device connected");
				self.connected_at = Some(self.ticks);
				self.report.device_connected_at_ms = Some(self.ticks);
				self.sdk.verify_license(client, &self.config.license_key, &device.handle);
				self.transition(Phase::Verifying);
			}
			(DeviceConnectionState::Connected, phase) => {
				debug!(target = "capsule.orchestrator", %phase, "redundant device-connected event");
			}
			(DeviceConnectionState::UnsupportedConnection, Phase::Active) | (DeviceConnectionState::Disconnected, Phase::Active) => {
				warn!(target = "capsule.orchestrator", ?state, "device dropped during the session; waiting for the session to report");
			}
			(DeviceConnectionState::UnsupportedConnection, _) => self.terminate(TerminationCause::DeviceUnsupported),
			(DeviceConnectionState::Disconnected, _) => self.terminate(TerminationCause::DeviceDisconnected),
		}
	}

	fn on_license(&mut self, verified: bool, error: LicenseError) {
		if self.phase != Phase::Verifying {
			debug!(target = "capsule.orchestrator", phase = %self.phase, verified, "ignoring license result");
			return;
		}
		if verified {
			info!(target = "capsule.orchestrator", "license verified");
			self.transition(Phase::SessionStart);
		} else {
			let error = if error == LicenseError::Ok { LicenseError::InvalidOrExpiredKey } else { error };
			self.terminate(TerminationCause::LicenseRejected(error));
		}
	}

	fn on_session_started(&mut self, uuid: String) {
		if self.phase != Phase::SessionStart {
			debug!(target = "capsule.orchestrator", phase = %self.phase, "ignoring session-started event");
			return;
		}
		let Some(session) = self.session.as_mut() else {
			return;
		};
		info!(target = "capsule.orchestrator", %uuid, "session started");
		self.sdk.mark_activity(&session.handle, UserActivity::Activity1);
		self.report.session_uuid = Some(uuid.clone());
		session.uuid = Some(uuid);
		self.transition(Phase::Active);

		if let (Some(session), Some(device)) = (&self.session, &self.device) {
			self.pipeline.start(&mut self.sdk, &session.handle, &device.handle);
		}
	}

	async fn on_classifier(&mut self, event: ClassifierEvent) {
		if self.phase != Phase::Active {
			debug!(target = "capsule.orchestrator", phase = %self.phase, ?event, "classifier event outside an active session");
			return;
		}
		match self.pipeline.handle(&mut self.sdk, &event) {
			Some(PipelineOutput::Frame(frame)) => match self.sink.send_frame(frame).await {
				Delivery::Sent => self.report.frames_sent += 1,
				Delivery::Lost => self.report.frames_lost += 1,
			},
			Some(PipelineOutput::Shutdown(cause)) => {
				warn!(target = "capsule.orchestrator", %cause, "pipeline requested shutdown");
				self.pending.get_or_insert(cause);
				self.stop.request();
			}
			None => {}
		}
	}

	fn on_tick(&mut self) {
		self.log_firmware_once();

		if self.phase == Phase::SessionStart && self.session.is_none() {
			let settled = self.connected_at.is_some_and(|at| self.ticks.saturating_sub(at) >= millis(self.config.settle_delay));
			if settled {
				self.create_session();
			}
		}

		if self.session.is_none() && !self.phase.is_winding_down() && self.ticks >= millis(self.config.watchdog) {
			self.terminate(TerminationCause::Watchdog {
				secs: self.config.watchdog.as_secs(),
			});
		}

		if self.stop.is_requested() && !self.phase.is_winding_down() {
			let cause = self.pending.take().unwrap_or(TerminationCause::StopRequested);
			self.terminate(cause);
		}

		if self.phase == Phase::Terminating && self.ticks.saturating_sub(self.terminating_since) >= millis(self.config.disconnect_grace) {
			warn!(target = "capsule.orchestrator", "control plane never confirmed the disconnect; releasing the client");
			if let Some(client) = self.client.take() {
				self.sdk.destroy_client(client);
			}
			self.transition(Phase::Idle);
		}
	}

	fn log_firmware_once(&mut self) {
		if self.firmware_logged || self.connected_at.is_none() {
			return;
		}
		let Some(device) = &self.device else {
			return;
		};
		if let Some(version) = self.sdk.firmware_version(&device.handle) {
			info!(target = "capsule.orchestrator", firmware = %version, "device firmware");
			self.firmware_logged = true;
		}
	}

	fn create_session(&mut self) {
		let (Some(client), Some(device)) = (&self.client, &self.device) else {
			return;
		};
		match self.sdk.create_session(client, &device.handle, self.config.layout) {
			Ok(handle) => {
				info!(target = "capsule.orchestrator", layout = ?self.config.layout, tick_ms = self.ticks, "session created");
				self.sdk.start_session(&handle);
				self.report.session_created_at_ms = Some(self.ticks);
				self.session = Some(SessionRef { handle, uuid: None });
			}
			Err(code) => self.terminate(TerminationCause::Sdk { call: "create_session", code }),
		}
	}

	/// Enters teardown. Only the first cause of a run is kept.
	fn terminate(&mut self, cause: TerminationCause) {
		if self.phase.is_winding_down() {
			debug!(target = "capsule.orchestrator", %cause, "already terminating; cause ignored");
			return;
		}
		if cause.is_fatal() {
			error!(target = "capsule.orchestrator", %cause, phase = %self.phase, "terminating session");
		} else {
			info!(target = "capsule.orchestrator", %cause, phase = %self.phase, "terminating session");
		}
		self.cause.get_or_insert(cause);
		self.transition(Phase::Terminating);
		self.terminating_since = self.ticks;
		self.teardown();

		if let Some(client) = &self.client {
			self.sdk.disconnect(client);
			return;
		}
		self.transition(Phase::Idle);
	}

	/// Releases everything except the client. Each handle is taken before it
	/// is released, so repeated calls are no-ops.
	fn teardown(&mut self) {
		self.pipeline.stop(&mut self.sdk);
		if let Some(device) = self.device.take() {
			debug!(target = "capsule.orchestrator", id = %device.info.id, "releasing device");
			self.sdk.release_device(device.handle);
		}
		if let Some(session) = self.session.take() {
			debug!(target = "capsule.orchestrator", uuid = ?session.uuid, "destroying session");
			self.sdk.destroy_session(session.handle);
		}
		if let Some(locator) = self.locator.take() {
			self.sdk.destroy_locator(locator);
		}
	}

	fn on_disconnected(&mut self, reason: DisconnectReason) {
		if self.phase == Phase::Idle {
			return;
		}
		if self.phase != Phase::Terminating {
			warn!(target = "capsule.orchestrator", ?reason, phase = %self.phase, "control plane disconnected unexpectedly");
			self.cause.get_or_insert(TerminationCause::Disconnected(reason));
			self.transition(Phase::Terminating);
		}
		self.teardown();
		if let Some(client) = self.client.take() {
			self.sdk.destroy_client(client);
		}
		info!(target = "capsule.orchestrator", ?reason, "control plane disconnected");
		self.transition(Phase::Idle);
	}
}

#[cfg(test)]
mod tests;

//! Classifier pipeline bound to one session.
//!
//! [`ClassifierPipeline::start`] creates the configured classifiers in
//! [`ClassifierKind::CREATION_ORDER`]. A classifier that fails to come up is
//! recorded and skipped; the others keep running and its metrics are simply
//! never populated. Classifier events are turned into telemetry frames here,
//! and [`ClassifierPipeline::stop`] destroys every binding exactly once.

use capsule_protocol::{ClassifierKind, DeviceMode, Field, ProductivityParams, TelemetryFrame};
use capsule_runtime::{CalibratorHandle, CapsuleSdk, ClassifierEvent, ClassifierHandle, DeviceHandle, SdkResult, SessionHandle};
use tracing::{debug, error, info, warn};

use crate::error::TerminationCause;

/// Feedback rhythms registered once neuro-feedback is initialized.
pub const FEEDBACK_FUNCTIONS: [&str; 3] = ["alpha", "beta", "theta"];

/// What the orchestrator must do with a classifier event.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutput {
	/// Hand this frame to the telemetry sink.
	Frame(TelemetryFrame),
	/// Request an overall shutdown. Bindings stay up until the orchestrator tears down.
	Shutdown(TerminationCause),
}

struct Binding {
	kind: ClassifierKind,
	handle: ClassifierHandle,
}

/// Owns the classifier bindings of the active session.
pub struct ClassifierPipeline {
	enabled: Vec<ClassifierKind>,
	bindings: Vec<Binding>,
	calibrator: Option<CalibratorHandle>,
	failed: Vec<ClassifierKind>,
	started: bool,
}

impl Default for ClassifierPipeline {
	fn default() -> Self {
		Self::new(&ClassifierKind::CREATION_ORDER)
	}
}

impl ClassifierPipeline {
	/// Creates a pipeline that will bind `enabled`, in creation order regardless of slice order.
	pub fn new(enabled: &[ClassifierKind]) -> Self {
		Self {
			enabled: ClassifierKind::CREATION_ORDER.into_iter().filter(|k| enabled.contains(k)).collect(),
			bindings: Vec::new(),
			calibrator: None,
			failed: Vec::new(),
			started: false,
		}
	}

	pub fn is_started(&self) -> bool {
		self.started
	}

	/// Classifiers currently bound, in creation order.
	pub fn bound(&self) -> Vec<ClassifierKind> {
		self.bindings.iter().map(|b| b.kind).collect()
	}

	/// Classifiers that failed to come up during the last [`start`](Self::start).
	pub fn failed(&self) -> &[ClassifierKind] {
		&self.failed
	}

	fn handle_of(&self, kind: ClassifierKind) -> Option<&ClassifierHandle> {
		self.bindings.iter().find(|b| b.kind == kind).map(|b| &b.handle)
	}

	/// Binds every enabled classifier to `session` and switches `device` into
	/// the acquisition modes the successful bindings need.
	pub fn start<S: CapsuleSdk>(&mut self, sdk: &mut S, session: &SessionHandle, device: &DeviceHandle) {
		if self.started {
			warn!(target = "capsule.pipeline", "pipeline already started; ignoring");
			return;
		}
		self.started = true;
		self.failed.clear();

		for kind in self.enabled.clone() {
			match self.bind(sdk, session, kind) {
				Ok(handle) => {
					info!(target = "capsule.pipeline", classifier = %kind, "classifier bound");
					self.bindings.push(Binding { kind, handle });
				}
				Err(code) => {
					warn!(target = "capsule.pipeline", classifier = %kind, error = %code, "classifier unavailable; its metrics will be absent");
					self.failed.push(kind);
				}
			}
		}

		for mode in self.required_modes() {
			sdk.switch_mode(device, mode);
		}
	}

	fn bind<S: CapsuleSdk>(&mut self, sdk: &mut S, session: &SessionHandle, kind: ClassifierKind) -> SdkResult<ClassifierHandle> {
		if kind == ClassifierKind::NeuroFeedback {
			match sdk.calibrator(session) {
				Ok(calibrator) => self.calibrator = Some(calibrator),
				Err(code) => warn!(target = "capsule.pipeline", error = %code, "calibrator unavailable; peak frequency will be absent"),
			}
		}

		let handle = match kind {
			ClassifierKind::Productivity => {
				let params = ProductivityParams::default();
				debug!(target = "capsule.pipeline", ?params, "creating productivity classifier");
				sdk.create_productivity(session, &params)?
			}
			_ => sdk.create_classifier(session, kind)?,
		};
		if let Err(code) = sdk.initialize_classifier(&handle) {
			sdk.destroy_classifier(handle);
			return Err(code);
		}
		Ok(handle)
	}

	/// Signal first, then one streaming mode per sensor classifier.
	fn required_modes(&self) -> Vec<DeviceMode> {
		if self.bindings.is_empty() {
			return Vec::new();
		}
		let mut modes = vec![DeviceMode::Signal];
		if self.handle_of(ClassifierKind::Cardio).is_some() {
			modes.push(DeviceMode::StartPpg);
		}
		if self.handle_of(ClassifierKind::Motion).is_some() {
			modes.push(DeviceMode::StartMems);
		}
		modes
	}

	/// Reacts to one classifier event. Events arriving while stopped are dropped.
	pub fn handle<S: CapsuleSdk>(&mut self, sdk: &mut S, event: &ClassifierEvent) -> Option<PipelineOutput> {
		if !self.started {
			debug!(target = "capsule.pipeline", ?event, "classifier event without a running pipeline");
			return None;
		}

		match event {
			ClassifierEvent::NfbInitialized => {
				let nfb = self.handle_of(ClassifierKind::NeuroFeedback)?;
				let registered = FEEDBACK_FUNCTIONS
					.iter()
					.filter(|name| match sdk.add_feedback_function(nfb, name) {
						Ok(()) => true,
						Err(code) => {
							warn!(target = "capsule.pipeline", function = %name, error = %code, "feedback function rejected");
							false
						}
					})
					.count();
				info!(target = "capsule.pipeline", registered, "neuro-feedback initialized");
				None
			}
			ClassifierEvent::NfbUserState(state) => {
				debug!(target = "capsule.pipeline", feedback = ?state.feedback, "NFB user state");
				None
			}
			ClassifierEvent::NfbError(message) => {
				warn!(target = "capsule.pipeline", %message, "neuro-feedback error");
				None
			}
			ClassifierEvent::ProductivityValues(values) => {
				self.handle_of(ClassifierKind::Productivity)?;
				info!(
					target = "capsule.pipeline",
					fatigue = values.fatigue_score,
					gravity = values.gravity_score,
					concentration = values.concentration_score,
					relaxation = values.relaxation_score,
					accumulated_fatigue = values.accumulated_fatigue,
					fatigue_growth_rate = values.fatigue_growth_rate,
					"productivity values"
				);
				let frame = TelemetryFrame::new()
					.with(Field::Fatigue, values.fatigue_score)
					.with(Field::Gravity, values.gravity_score)
					.with(Field::Concentration, values.concentration_score)
					.with(Field::AccumulatedFatigue, values.accumulated_fatigue);
				Some(PipelineOutput::Frame(frame))
			}
			ClassifierEvent::ProductivityScore(score) => {
				info!(target = "capsule.pipeline", score, "productivity score");
				None
			}
			ClassifierEvent::ProductivityArtifacts => {
				debug!(target = "capsule.pipeline", "productivity artifacts reported");
				None
			}
			ClassifierEvent::ProductivityIndividualIndexes => {
				debug!(target = "capsule.pipeline", "productivity individual indexes received");
				None
			}
			ClassifierEvent::CardioIndexes(data) => {
				info!(
					target = "capsule.pipeline",
					artifacted = data.artifacted,
					kaplan = data.kaplan_index,
					heart_rate = data.heart_rate,
					stress = data.stress_index,
					"cardio indexes"
				);
				None
			}
			ClassifierEvent::Mems(samples) => {
				if let Some(first) = samples.first() {
					debug!(
						target = "capsule.pipeline",
						count = samples.len(),
						accel = ?(first.accelerometer.x, first.accelerometer.y, first.accelerometer.z),
						gyro = ?(first.gyroscope.x, first.gyroscope.y, first.gyroscope.z),
						timepoint = first.timepoint,
						"MEMS update"
					);
				}
				None
			}
			ClassifierEvent::CalibratorReady => {
				let calibrator = self.calibrator.as_ref()?;
				info!(target = "capsule.pipeline", "calibrator ready; close your eyes for 30 seconds");
				if let Err(code) = sdk.calibrate_quick(calibrator) {
					warn!(target = "capsule.pipeline", error = %code, "quick calibration could not start");
				}
				None
			}
			ClassifierEvent::CalibrationCompleted { individual_peak_frequency } => {
				info!(target = "capsule.pipeline", iapf = individual_peak_frequency, "individual calibration completed");
				Some(PipelineOutput::Frame(TelemetryFrame::new().with(Field::PeakFrequency, *individual_peak_frequency)))
			}
			ClassifierEvent::CalibrationFailed(reason) => {
				error!(target = "capsule.pipeline", %reason, "calibration failed");
				Some(PipelineOutput::Shutdown(TerminationCause::CalibrationFailed(*reason)))
			}
		}
	}

	/// Destroys every binding created by [`start`](Self::start). Idempotent.
	pub fn stop<S: CapsuleSdk>(&mut self, sdk: &mut S) {
		if !self.started {
			return;
		}
		for binding in self.bindings.drain(..) {
			debug!(target = "capsule.pipeline", classifier = %binding.kind, "destroying classifier");
			sdk.destroy_classifier(binding.handle);
		}
		self.calibrator = None;
		self.started = false;
	}
}

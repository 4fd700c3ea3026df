use std::time::Duration;

use capsule_protocol::{
	CalibrationFailReason, ChannelLayout, ClassifierKind, DeviceConnectionState, DisconnectReason, Field, FieldMask, LicenseError, LocatorFailReason,
	SdkError, SessionError, TelemetryFrame, UserActivity,
};
use capsule_runtime::{Delivery, FrameSink, SdkEvent};
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::*;
use crate::sim::{Command, SimScript, SimulatedCapsule, sim_device};

#[derive(Default)]
struct RecordingSink {
	frames: Vec<TelemetryFrame>,
	opened: u32,
	closed: u32,
	lose_all: bool,
}

impl FrameSink for RecordingSink {
	async fn open(&mut self) {
		self.opened += 1;
	}

	async fn send_frame(&mut self, frame: TelemetryFrame) -> Delivery {
		self.frames.push(frame);
		if self.lose_all { Delivery::Lost } else { Delivery::Sent }
	}

	async fn shutdown(&mut self) {
		self.closed += 1;
	}
}

/// Blocks on the first send for `stall`, as a link does while reconnecting,
/// and reports that frame lost.
struct StallingSink {
	stall: Duration,
	attempts: u32,
	stalled: Option<oneshot::Sender<Instant>>,
}

impl FrameSink for StallingSink {
	async fn open(&mut self) {}

	async fn send_frame(&mut self, _frame: TelemetryFrame) -> Delivery {
		self.attempts += 1;
		let Some(stalled) = self.stalled.take() else {
			return Delivery::Sent;
		};
		let _ = stalled.send(Instant::now());
		tokio::time::sleep(self.stall).await;
		Delivery::Lost
	}

	async fn shutdown(&mut self) {}
}

fn orchestrator(script: SimScript) -> Orchestrator<SimulatedCapsule, RecordingSink> {
	Orchestrator::new(OrchestratorConfig::default(), SimulatedCapsule::new(script), RecordingSink::default())
}

fn count(sdk: &SimulatedCapsule, pred: impl Fn(&Command) -> bool) -> usize {
	sdk.commands().filter(|c| pred(c)).count()
}

fn assert_clean<K: FrameSink>(orch: &Orchestrator<SimulatedCapsule, K>) {
	assert_eq!(orch.phase(), Phase::Idle);
	assert_eq!(orch.sdk().outstanding(), 0, "every handle must be released");
	assert!(orch.sdk().violations().is_empty(), "violations: {:?}", orch.sdk().violations());
}

#[tokio::test(start_paused = true)]
async fn full_session_streams_frames_until_the_session_stops() {
	let mut orch = orchestrator(SimScript {
		session_pumps: Some(200),
		..SimScript::default()
	});

	let report = orch.run().await.unwrap();

	assert_eq!(report.cause, TerminationCause::SessionStopped);
	assert!(report.is_success());
	assert_eq!(report.device.as_ref().map(|d| d.id.as_str()), Some("sim-0"));
	assert!(report.session_uuid.is_some());
	assert!(report.failed_classifiers.is_empty());

	let frames = &orch.sink().frames;
	let productivity = frames.iter().filter(|f| f.mask() == FieldMask::PRODUCTIVITY).count();
	let calibration: Vec<_> = frames.iter().filter(|f| f.mask() == FieldMask::CALIBRATION).collect();
	assert_eq!(productivity, 10);
	assert_eq!(calibration.len(), 1);
	assert_eq!(calibration[0].get(Field::PeakFrequency), Some(10.4));
	assert_eq!(report.frames_sent, frames.len() as u64);
	assert_eq!(report.frames_lost, 0);

	assert_eq!(orch.sink().opened, 1);
	assert_eq!(orch.sink().closed, 1);
	assert_clean(&orch);
}

#[tokio::test(start_paused = true)]
async fn commands_follow_the_lifecycle_order() {
	let mut orch = orchestrator(SimScript {
		session_pumps: Some(10),
		..SimScript::default()
	});
	orch.run().await.unwrap();

	let head: Vec<_> = orch.sdk().commands().take(9).cloned().collect();
	assert!(matches!(head[0], Command::Connect { .. }));
	assert!(matches!(head[1], Command::RequestDevices { search, .. } if search == Duration::from_secs(15)));
	assert_eq!(head[2], Command::CreateDevice("sim-0".to_string()));
	assert_eq!(head[3], Command::ConnectDevice);
	assert_eq!(head[4], Command::VerifyLicense(String::new()));
	assert_eq!(head[5], Command::CreateSession(ChannelLayout::Monopolar));
	assert_eq!(head[6], Command::StartSession);
	assert_eq!(head[7], Command::MarkActivity(UserActivity::Activity1));
	assert_eq!(head[8], Command::Calibrator);
}

#[tokio::test(start_paused = true)]
async fn session_is_created_only_after_the_settle_delay() {
	let mut orch = orchestrator(SimScript {
		session_pumps: Some(10),
		..SimScript::default()
	});

	let report = orch.run().await.unwrap();

	let connected = report.device_connected_at_ms.unwrap();
	let created = report.session_created_at_ms.unwrap();
	assert!(created >= connected + 2000, "session created at {created}ms, device connected at {connected}ms");
	assert!(created < connected + 2000 + 50, "session creation should not lag a full tick");
}

#[tokio::test(start_paused = true)]
async fn device_lost_during_settle_never_creates_a_session() {
	let mut orch = orchestrator(SimScript {
		drop_device_after: Some(10),
		..SimScript::default()
	});

	let report = orch.run().await.unwrap();

	assert_eq!(report.cause, TerminationCause::DeviceDisconnected);
	assert_eq!(count(orch.sdk(), |c| matches!(c, Command::CreateSession(_))), 0);
	assert_eq!(report.session_created_at_ms, None);
	assert_clean(&orch);
}

#[tokio::test(start_paused = true)]
async fn bluetooth_disabled_terminates_without_creating_a_device() {
	let mut orch = orchestrator(SimScript {
		discovery_error: LocatorFailReason::BluetoothDisabled,
		..SimScript::default()
	});

	let report = orch.run().await.unwrap();

	assert_eq!(report.cause, TerminationCause::DiscoveryFailed(LocatorFailReason::BluetoothDisabled));
	assert!(!report.is_success());
	assert_eq!(count(orch.sdk(), |c| matches!(c, Command::CreateDevice(_))), 0);
	assert_eq!(report.device, None);
	assert_clean(&orch);
}

#[tokio::test(start_paused = true)]
async fn empty_device_list_is_fatal() {
	let mut orch = orchestrator(SimScript {
		devices: Vec::new(),
		..SimScript::default()
	});

	let report = orch.run().await.unwrap();

	assert_eq!(report.cause, TerminationCause::NoDevices);
	assert_clean(&orch);
}

#[tokio::test(start_paused = true)]
async fn first_of_three_devices_is_chosen_and_released_once_when_unsupported() {
	let mut orch = orchestrator(SimScript {
		devices: vec![sim_device(0), sim_device(1), sim_device(2)],
		connection_state: DeviceConnectionState::UnsupportedConnection,
		..SimScript::default()
	});

	let report = orch.run().await.unwrap();

	assert_eq!(report.cause, TerminationCause::DeviceUnsupported);
	let created: Vec<_> = orch
		.sdk()
		.commands()
		.filter_map(|c| match c {
			Command::CreateDevice(id) => Some(id.as_str()),
			_ => None,
		})
		.collect();
	assert_eq!(created, vec!["sim-0"]);
	assert_eq!(count(orch.sdk(), |c| *c == Command::ReleaseDevice), 1);
	assert_clean(&orch);
}

#[tokio::test(start_paused = true)]
async fn rejected_license_is_fatal() {
	let mut orch = orchestrator(SimScript {
		license: Err(LicenseError::InvalidOrExpiredKey),
		..SimScript::default()
	});

	let report = orch.run().await.unwrap();

	assert_eq!(report.cause, TerminationCause::LicenseRejected(LicenseError::InvalidOrExpiredKey));
	assert_eq!(count(orch.sdk(), |c| matches!(c, Command::CreateSession(_))), 0);
	assert_clean(&orch);
}

#[tokio::test(start_paused = true)]
async fn session_error_is_fatal() {
	let mut orch = orchestrator(SimScript {
		session_start: Err(SessionError::FailedToStart),
		..SimScript::default()
	});

	let report = orch.run().await.unwrap();

	assert_eq!(report.cause, TerminationCause::SessionError(SessionError::FailedToStart));
	assert_eq!(count(orch.sdk(), |c| *c == Command::DestroySession), 1);
	assert_clean(&orch);
}

#[tokio::test(start_paused = true)]
async fn watchdog_fires_when_no_session_exists_in_time() {
	let mut orch = orchestrator(SimScript {
		connect_pumps: None,
		..SimScript::default()
	});

	let report = orch.run().await.unwrap();

	assert_eq!(report.cause, TerminationCause::Watchdog { secs: 100 });
	assert!(report.elapsed_ms >= 100_000);
	assert!(report.elapsed_ms < 100_000 + 1000);
	assert_clean(&orch);
}

#[tokio::test(start_paused = true)]
async fn stop_handle_ends_an_active_session() {
	let mut orch = orchestrator(SimScript::default());
	let stop = orch.stop_handle();
	tokio::spawn(async move {
		tokio::time::sleep(Duration::from_secs(10)).await;
		stop.request();
	});

	let report = orch.run().await.unwrap();

	assert_eq!(report.cause, TerminationCause::StopRequested);
	assert!(report.is_success());
	assert!((10_000..=10_100).contains(&report.elapsed_ms), "stopped at {}ms", report.elapsed_ms);
	assert!(report.frames_sent > 0);
	assert_clean(&orch);
}

#[tokio::test(start_paused = true)]
async fn calibration_failure_shuts_the_session_down() {
	let mut orch = orchestrator(SimScript {
		calibration: Err(CalibrationFailReason::PeakIsABorder),
		..SimScript::default()
	});

	let report = orch.run().await.unwrap();

	assert_eq!(report.cause, TerminationCause::CalibrationFailed(CalibrationFailReason::PeakIsABorder));
	assert!(orch.sink().frames.iter().all(|f| !f.mask().contains(Field::PeakFrequency)));
	assert_eq!(count(orch.sdk(), |c| matches!(c, Command::DestroyClassifier(_))), 4);
	assert_clean(&orch);
}

#[tokio::test(start_paused = true)]
async fn failed_classifier_degrades_output_only() {
	let mut orch = orchestrator(SimScript {
		failing_classifiers: vec![ClassifierKind::Productivity],
		session_pumps: Some(200),
		..SimScript::default()
	});

	let report = orch.run().await.unwrap();

	assert_eq!(report.cause, TerminationCause::SessionStopped);
	assert_eq!(report.failed_classifiers, vec![ClassifierKind::Productivity]);
	assert!(orch.sink().frames.iter().all(|f| f.mask() == FieldMask::CALIBRATION));
	assert_eq!(report.frames_sent, 1);
	assert_clean(&orch);
}

#[tokio::test(start_paused = true)]
async fn lost_frames_are_counted_not_retried() {
	let sink = RecordingSink {
		lose_all: true,
		..RecordingSink::default()
	};
	let script = SimScript {
		session_pumps: Some(100),
		..SimScript::default()
	};
	let mut orch = Orchestrator::new(OrchestratorConfig::default(), SimulatedCapsule::new(script), sink);

	let report = orch.run().await.unwrap();

	assert_eq!(report.frames_sent, 0);
	assert_eq!(report.frames_lost, orch.sink().frames.len() as u64);
	assert!(report.frames_lost > 0);
}

#[tokio::test(start_paused = true)]
async fn unexpected_disconnect_tears_down() {
	let mut orch = orchestrator(SimScript::default());
	orch.sdk_mut().inject(SdkEvent::Disconnected(DisconnectReason::FatalError));

	let report = orch.run().await.unwrap();

	assert_eq!(report.cause, TerminationCause::Disconnected(DisconnectReason::FatalError));
	assert_eq!(count(orch.sdk(), |c| matches!(c, Command::RequestDevices { .. })), 0);
	assert_eq!(count(orch.sdk(), |c| *c == Command::Disconnect), 0);
	assert_eq!(count(orch.sdk(), |c| *c == Command::DestroyClient), 1);
	assert_clean(&orch);
}

#[tokio::test(start_paused = true)]
async fn unanswered_disconnect_is_released_after_grace() {
	let mut orch = orchestrator(SimScript {
		answer_disconnect: false,
		session_pumps: Some(10),
		..SimScript::default()
	});

	let report = orch.run().await.unwrap();

	assert_eq!(report.cause, TerminationCause::SessionStopped);
	assert_eq!(count(orch.sdk(), |c| *c == Command::DestroyClient), 1);
	assert_clean(&orch);
}

#[tokio::test(start_paused = true)]
async fn bipolar_layout_is_used_when_configured() {
	let config = OrchestratorConfig {
		layout: ChannelLayout::Bipolar,
		license_key: "key-123".to_string(),
		..OrchestratorConfig::default()
	};
	let script = SimScript {
		session_pumps: Some(5),
		..SimScript::default()
	};
	let mut orch = Orchestrator::new(config, SimulatedCapsule::new(script), RecordingSink::default());

	orch.run().await.unwrap();

	assert_eq!(count(orch.sdk(), |c| *c == Command::CreateSession(ChannelLayout::Bipolar)), 1);
	assert_eq!(count(orch.sdk(), |c| *c == Command::VerifyLicense("key-123".to_string())), 1);
}

#[tokio::test(start_paused = true)]
async fn orchestrator_can_be_rearmed() {
	let mut orch = orchestrator(SimScript {
		session_pumps: Some(50),
		..SimScript::default()
	});

	let first = orch.run().await.unwrap();
	let second = orch.run().await.unwrap();

	assert_eq!(first.cause, TerminationCause::SessionStopped);
	assert_eq!(second.cause, TerminationCause::SessionStopped);
	assert_eq!(count(orch.sdk(), |c| matches!(c, Command::Connect { .. })), 2);
	assert_eq!(count(orch.sdk(), |c| *c == Command::DestroySession), 2);
	assert_clean(&orch);
}

#[tokio::test(start_paused = true)]
async fn stop_waits_for_a_blocked_send_to_return() {
	let (stalled_tx, stalled_rx) = oneshot::channel();
	let sink = StallingSink {
		stall: Duration::from_secs(5),
		attempts: 0,
		stalled: Some(stalled_tx),
	};
	let mut orch = Orchestrator::new(OrchestratorConfig::default(), SimulatedCapsule::new(SimScript::default()), sink);
	let stop = orch.stop_handle();
	let started = Instant::now();
	let requester = tokio::spawn(async move {
		let stalled_at = stalled_rx.await.unwrap();
		stop.request();
		stalled_at
	});

	let report = orch.run().await.unwrap();
	let stalled_at = requester.await.unwrap();

	assert_eq!(report.cause, TerminationCause::StopRequested);
	assert_eq!(orch.sink().attempts, 1);
	assert_eq!(report.frames_lost, 1);
	assert_eq!(report.frames_sent, 0);
	// The stop lands on the first tick after the send returns.
	let ticks_at_stall = (stalled_at - started).as_millis() as u64;
	assert_eq!(report.elapsed_ms, ticks_at_stall + 50);
	assert!(started.elapsed() >= Duration::from_millis(report.elapsed_ms) + Duration::from_secs(5));
	assert_clean(&orch);
}

#[tokio::test(start_paused = true)]
async fn frames_leave_in_delivery_order_within_a_pump() {
	// Calibration completes on the same pump as the second productivity update.
	let mut orch = orchestrator(SimScript {
		calibration_pumps: 37,
		session_pumps: Some(40),
		..SimScript::default()
	});

	let report = orch.run().await.unwrap();

	let masks: Vec<_> = orch.sink().frames.iter().map(|f| f.mask()).collect();
	assert_eq!(masks, vec![FieldMask::PRODUCTIVITY, FieldMask::CALIBRATION, FieldMask::PRODUCTIVITY]);
	assert_eq!(report.cause, TerminationCause::SessionStopped);
	assert_clean(&orch);
}

#[tokio::test(start_paused = true)]
async fn client_errors_and_resistances_do_not_end_the_session() {
	let mut orch = orchestrator(SimScript {
		session_pumps: Some(200),
		..SimScript::default()
	});
	orch.sdk_mut().inject_at(90, SdkEvent::Resistances(vec![("T3".to_string(), 12_000.0), ("O1".to_string(), 350_000.0)]));
	orch.sdk_mut().inject_at(100, SdkEvent::ClientError(SdkError::NotReceived));

	let report = orch.run().await.unwrap();

	assert_eq!(report.cause, TerminationCause::SessionStopped);
	assert_eq!(report.frames_sent, 11);
	assert!(orch.sdk().pumps() > 100);
	assert_clean(&orch);
}

#[tokio::test(start_paused = true)]
async fn firmware_is_read_once_after_pairing() {
	let mut orch = orchestrator(SimScript {
		session_pumps: Some(100),
		..SimScript::default()
	});
	orch.run().await.unwrap();
	assert_eq!(orch.sdk().firmware_reads(), 1);

	let mut silent = orchestrator(SimScript {
		session_pumps: Some(100),
		firmware: None,
		..SimScript::default()
	});
	silent.run().await.unwrap();
	assert!(silent.sdk().firmware_reads() > 1);
}

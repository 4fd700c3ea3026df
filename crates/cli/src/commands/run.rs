//! `capsule-bridge run`: one acquisition session streamed to the telemetry consumer.

use std::io::BufRead;
use std::process::ExitCode;

use capsule::sim::{SimScript, SimulatedCapsule};
use capsule::{Orchestrator, SessionReport, StopHandle};
use capsule_runtime::TelemetryLink;
use colored::Colorize;
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::config::{BridgeConfig, ConfigOverrides};
use crate::error::Result;

pub async fn execute(args: RunArgs) -> Result<ExitCode> {
	let config = BridgeConfig::load(args.config.as_deref(), &ConfigOverrides::from(&args))?;
	if config.write_csv {
		warn!(target = "capsule.bridge", "CSV output was requested; raw signal recording is not available in this build");
	}

	let link = TelemetryLink::tcp(config.link_config());
	let sdk = SimulatedCapsule::new(sim_script(&args, config.poll_ms));
	let mut orchestrator = Orchestrator::new(config.orchestrator_config(), sdk, link);

	watch_for_stop(orchestrator.stop_handle());
	eprintln!("{} streaming to {}:{}; type {} and press Enter to stop", "capsule-bridge".bold(), config.host, config.port, "q".cyan());
	info!(target = "capsule.bridge", bipolar = config.bipolar, host = %config.host, port = config.port, "starting run");

	let report = orchestrator.run().await?;

	for line in summary_lines(&report) {
		if report.is_success() {
			eprintln!("{}", line.green());
		} else {
			eprintln!("{}", line.red());
		}
	}
	if args.json {
		println!("{}", serde_json::to_string_pretty(&report)?);
	}

	Ok(if report.is_success() { ExitCode::SUCCESS } else { ExitCode::from(1) })
}

/// Simulated backend shaped by the `--sim-*` flags.
pub fn sim_script(args: &RunArgs, poll_ms: u64) -> SimScript {
	SimScript {
		failing_classifiers: args.sim_fail.iter().copied().map(Into::into).collect(),
		session_pumps: args.sim_duration_secs.map(|secs| (secs.saturating_mul(1000) / poll_ms.max(1)).max(1)),
		..SimScript::default()
	}
}

/// Requests a stop on `q` + Enter or Ctrl-C.
///
/// Stdin is read on a plain thread so a pending read never holds up runtime
/// shutdown.
fn watch_for_stop(stop: StopHandle) {
	let on_key = stop.clone();
	std::thread::spawn(move || {
		for line in std::io::stdin().lock().lines() {
			let Ok(line) = line else {
				break;
			};
			if line.trim().eq_ignore_ascii_case("q") {
				info!(target = "capsule.bridge", "stop requested from the keyboard");
				on_key.request();
				break;
			}
		}
	});

	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			info!(target = "capsule.bridge", "stop requested by Ctrl-C");
			stop.request();
		}
	});
}

pub fn summary_lines(report: &SessionReport) -> Vec<String> {
	let mut lines = Vec::new();
	if report.is_success() {
		lines.push(format!("session ended: {}", report.cause));
	} else {
		lines.push(format!("session failed: {}", report.cause));
	}
	if let Some(device) = &report.device {
		lines.push(format!("device: {} ({})", device.name, device.id));
	}
	if let Some(uuid) = &report.session_uuid {
		lines.push(format!("session: {uuid}"));
	}
	lines.push(format!("frames: {} sent, {} lost", report.frames_sent, report.frames_lost));
	if !report.failed_classifiers.is_empty() {
		let names: Vec<_> = report.failed_classifiers.iter().map(|k| k.name()).collect();
		lines.push(format!("unavailable classifiers: {}", names.join(", ")));
	}
	lines.push(format!("elapsed: {:.1}s", report.elapsed_ms as f64 / 1000.0));
	lines
}

#[cfg(test)]
mod tests {
	use capsule::TerminationCause;
	use capsule_protocol::{ClassifierKind, LocatorFailReason};

	use super::*;
	use crate::cli::CliClassifier;

	#[test]
	fn sim_flags_shape_the_script() {
		let args = RunArgs {
			sim_duration_secs: Some(30),
			sim_fail: vec![CliClassifier::Cardio],
			..RunArgs::default()
		};

		let script = sim_script(&args, 50);

		assert_eq!(script.session_pumps, Some(600));
		assert_eq!(script.failing_classifiers, vec![ClassifierKind::Cardio]);
	}

	#[test]
	fn huge_duration_saturates() {
		let args = RunArgs {
			sim_duration_secs: Some(u64::MAX),
			..RunArgs::default()
		};
		assert_eq!(sim_script(&args, 50).session_pumps, Some(u64::MAX / 50));
	}

	#[test]
	fn session_runs_until_stopped_without_a_duration() {
		assert_eq!(sim_script(&RunArgs::default(), 50).session_pumps, None);
	}

	#[test]
	fn summary_names_the_cause_and_counts() {
		let report = SessionReport {
			cause: TerminationCause::DiscoveryFailed(LocatorFailReason::BluetoothDisabled),
			frames_sent: 3,
			frames_lost: 1,
			failed_classifiers: vec![ClassifierKind::Motion],
			elapsed_ms: 2500,
			..SessionReport::default()
		};

		let lines = summary_lines(&report);

		assert_eq!(lines[0], "session failed: device discovery failed: Bluetooth adapter not found or disabled");
		assert!(lines.contains(&"frames: 3 sent, 1 lost".to_string()));
		assert!(lines.contains(&"unavailable classifiers: motion".to_string()));
		assert_eq!(lines.last().map(String::as_str), Some("elapsed: 2.5s"));
	}
}

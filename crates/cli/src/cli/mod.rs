
use std::path::PathBuf;

use capsule_protocol::ClassifierKind;
use clap::builder::Styles;
use clap::builder::styling::AnsiColor;
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Root CLI for the Capsule telemetry bridge.
#[derive(Parser, Debug)]
#[command(name = "capsule-bridge")]
#[command(about = "Capsule bridge - run an acquisition session and stream its metrics as telemetry frames")]
#[command(version)]
#[command(styles = cli_styles())]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Run one acquisition session and stream telemetry to the consumer
	Run(RunArgs),
	/// Listen for telemetry frames and print the fields each one carries
	Receive(ReceiveArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
	/// License key checked against the connected device
	#[arg(long, value_name = "KEY")]
	pub key: Option<String>,

	/// Create the session with the bipolar channel layout
	#[arg(long)]
	pub bipolar: bool,

	/// Request CSV output of the raw signals
	#[arg(long)]
	pub csv: bool,

	/// Telemetry consumer host
	#[arg(long, value_name = "HOST")]
	pub host: Option<String>,

	/// Telemetry consumer port
	#[arg(long, value_name = "PORT")]
	pub port: Option<u16>,

	/// JSON configuration file; flags take precedence over its values
	#[arg(short, long, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// Stop the simulated session by itself after this many seconds
	#[arg(long, value_name = "SECS")]
	pub sim_duration_secs: Option<u64>,

	/// Make the simulated backend fail to create this classifier (repeatable)
	#[arg(long = "sim-fail", value_enum, value_name = "CLASSIFIER")]
	pub sim_fail: Vec<CliClassifier>,

	/// Print the session report as JSON on stdout
	#[arg(long)]
	pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ReceiveArgs {
	/// Address to listen on
	#[arg(long, default_value = "127.0.0.1", value_name = "HOST")]
	pub host: String,

	#[arg(long, default_value_t = 5004, value_name = "PORT")]
	pub port: u16,

	/// Output format for received frames
	#[arg(short = 'f', long, value_enum, default_value = "text")]
	pub format: FrameFormat,

	/// Exit after the first connection closes
	#[arg(long)]
	pub once: bool,
}

/// Classifier kind (CLI wrapper for capsule_protocol::ClassifierKind)
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum CliClassifier {
	NeuroFeedback,
	Productivity,
	Cardio,
	Motion,
}

impl From<CliClassifier> for ClassifierKind {
	fn from(kind: CliClassifier) -> Self {
		match kind {
			CliClassifier::NeuroFeedback => ClassifierKind::NeuroFeedback,
			CliClassifier::Productivity => ClassifierKind::Productivity,
			CliClassifier::Cardio => ClassifierKind::Cardio,
			CliClassifier::Motion => ClassifierKind::Motion,
		}
	}
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum FrameFormat {
	/// One `name=value` line per frame
	#[default]
	Text,
	/// One JSON object per frame
	Json,
}

/// Help colors in cargo's palette.
fn cli_styles() -> Styles {
	Styles::styled()
		.header(AnsiColor::Green.on_default().bold())
		.usage(AnsiColor::Green.on_default().bold())
		.literal(AnsiColor::Cyan.on_default())
		.placeholder(AnsiColor::Cyan.on_default())
		.error(AnsiColor::Red.on_default().bold())
}

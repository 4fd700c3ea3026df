//! Capsule session orchestration.
//!
//! [`Orchestrator`] walks one acquisition session through connect, discovery,
//! pairing, license verification and session start, then hands classifier
//! output to a [`FrameSink`](capsule_runtime::FrameSink) as telemetry frames.
//! [`ClassifierPipeline`] owns the classifier bindings of the running session.
//! [`sim::SimulatedCapsule`] is an in-process backend for the
//! [`CapsuleSdk`](capsule_runtime::CapsuleSdk) seam.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod report;
pub mod sim;
pub mod stop;

pub use config::OrchestratorConfig;
pub use error::TerminationCause;
pub use orchestrator::{Orchestrator, Phase};
pub use pipeline::{ClassifierPipeline, FEEDBACK_FUNCTIONS, PipelineOutput};
pub use report::SessionReport;
pub use sim::{SimScript, SimulatedCapsule};
pub use stop::StopHandle;

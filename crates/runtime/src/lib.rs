//! Capsule runtime - SDK seam and telemetry transport
//!
//! This crate provides the infrastructure the session orchestrator sits on:
//!
//! - **SDK seam**: the [`CapsuleSdk`] trait, the control commands plus a pump
//!   that drains [`SdkEvent`]s, and the opaque handle types it hands out
//! - **Transport**: the [`Connector`] seam and its TCP implementation
//! - **Telemetry link**: [`TelemetryLink`], a single reconnecting connection
//!   with at-most-once frame delivery
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ capsule-core │  Orchestrator + classifier pipeline
//! └──────┬───────┘
//!        │ drives CapsuleSdk, feeds FrameSink
//! ┌──────▼──────────┐
//! │ capsule-runtime │  This crate
//! │  ┌───────────┐  │
//! │  │ sdk       │  │  Commands + pumped events
//! │  └───────────┘  │
//! │  ┌───────────┐  │
//! │  │ link      │  │  Reconnecting frame sender
//! │  └───────────┘  │
//! │  ┌───────────┐  │
//! │  │ transport │  │  TCP connector
//! │  └───────────┘  │
//! └─────────────────┘
//! ```

pub mod error;
pub mod handle;
pub mod link;
pub mod sdk;
pub mod transport;

pub use error::{Error, Result};
pub use handle::{CalibratorHandle, ClassifierHandle, ClientHandle, DeviceHandle, LocatorHandle, SessionHandle};
pub use link::{Delivery, FrameSink, LinkConfig, LinkState, LinkStats, TelemetryLink};
pub use sdk::{CapsuleSdk, ClassifierEvent, SdkEvent, SdkResult};
pub use transport::{Connector, Endpoint, TcpConnector};

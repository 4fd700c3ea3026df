//! Wire types for the Capsule telemetry bridge.
//!
//! Two groups of types live here:
//!
//! - [`frame`]: the fixed 24-byte telemetry record streamed to the downstream
//!   consumer, plus its encoder and decoder.
//! - [`types`]: plain value types exchanged with the Capsule SDK (device
//!   descriptors, state enums, classifier payloads).
//!
//! Nothing in this crate performs I/O.

pub mod frame;
pub mod types;

pub use frame::{FRAME_LEN, Field, FieldMask, FrameDecoder, FrameError, TelemetryFrame};
pub use types::{
	CalibrationFailReason, CardioData, ChannelLayout, ClassifierKind, DeviceConnectionState, DeviceInfo, DeviceMode, DeviceType, DisconnectReason,
	LicenseError, LocatorFailReason, MemsSample, NfbUserState, Point3d, ProductivityParams, ProductivityValues, SdkError, SessionError, UserActivity,
};

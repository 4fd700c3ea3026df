//! Opaque SDK handles.
//!
//! Handles are neither `Clone` nor `Copy`: releasing one moves it
//! back into the SDK, so a handle can be destroyed at most once and an owner
//! that stores it as `Option<_>` loses it the moment it is released.

macro_rules! opaque_handle {
	($(#[$meta:meta])* $name:ident) => {
		$(#[$meta])*
		#[derive(Debug, PartialEq, Eq, Hash)]
		pub struct $name(u64);

		impl $name {
			/// Wraps a raw SDK pointer or id. Only SDK implementations should call this.
			pub fn from_raw(raw: u64) -> Self {
				Self(raw)
			}

			pub fn raw(&self) -> u64 {
				self.0
			}
		}
	};
}

opaque_handle!(
	/// Control-plane connection to the Capsule service. One per process.
	ClientHandle
);
opaque_handle!(
	/// Device discovery context.
	LocatorHandle
);
opaque_handle!(
	/// A created (not necessarily connected) peripheral.
	DeviceHandle
);
opaque_handle!(
	/// Measurement session bound to one device.
	SessionHandle
);
opaque_handle!(
	/// One classifier instance bound to a session.
	ClassifierHandle
);
opaque_handle!(
	/// NFB calibrator shared by the session; owned by the session, never destroyed directly.
	CalibratorHandle
);

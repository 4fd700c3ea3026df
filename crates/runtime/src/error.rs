//! Error types for the Capsule runtime.

use capsule_protocol::SdkError;
use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Capsule runtime.
#[derive(Debug, Error)]
pub enum Error {
	/// An SDK call returned an error code.
	#[error("SDK call `{call}` failed: {source}")]
	Sdk {
		/// Name of the failing call (e.g. "create_session")
		call: &'static str,
		#[source]
		source: SdkError,
	},
}

impl Error {
	/// Wraps an SDK error code with the name of the call that produced it.
	pub fn sdk(call: &'static str, source: SdkError) -> Self {
		Error::Sdk { call, source }
	}
}

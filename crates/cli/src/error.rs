use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
	#[error("invalid configuration: {0}")]
	Config(String),

	#[error("cannot listen on {addr}")]
	Bind {
		addr: String,
		#[source]
		source: std::io::Error,
	},

	#[error(transparent)]
	Runtime(#[from] capsule_runtime::Error),

	#[error(transparent)]
	Io(#[from] std::io::Error),

	#[error(transparent)]
	Json(#[from] serde_json::Error),

	#[error(transparent)]
	Anyhow(#[from] anyhow::Error),
}

impl BridgeError {
	/// Process exit code for a setup failure. Runs that reach the session
	/// lifecycle report their own outcome instead.
	pub fn exit_code(&self) -> u8 {
		match self {
			BridgeError::Config(_) | BridgeError::Anyhow(_) => 2,
			_ => 1,
		}
	}
}

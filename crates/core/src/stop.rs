//! Cross-task stop request flag.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared stop flag observed by the orchestrator once per polling iteration.
///
/// Cloning is cheap; every clone sets and reads the same flag. Setting it
/// never interrupts work already in progress, including a blocking reconnect.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn request(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	pub fn is_requested(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}

	pub(crate) fn reset(&self) {
		self.0.store(false, Ordering::SeqCst);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn clones_share_the_flag() {
		let stop = StopHandle::new();
		let remote = stop.clone();
		assert!(!stop.is_requested());
		remote.request();
		assert!(stop.is_requested());
		stop.reset();
		assert!(!remote.is_requested());
	}
}

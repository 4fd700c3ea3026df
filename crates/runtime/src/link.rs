//! Reconnecting telemetry link.
//!
//! [`TelemetryLink`] owns exactly one outbound stream. Connecting retries
//! forever at a fixed interval and only returns once a stream is up. A failed
//! send drops the stream, reconnects the same way, and reports the frame as
//! [`Delivery::Lost`]; the frame is never resent.
//!
//! Both paths suspend the caller for as long as the consumer is unreachable.

use std::future::Future;
use std::io;
use std::time::Duration;

use capsule_protocol::{FRAME_LEN, TelemetryFrame};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::transport::{Connector, Endpoint, TcpConnector};

/// Fixed delay between connection attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Link configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
	pub endpoint: Endpoint,
	/// Delay between connection attempts. Does not grow.
	pub retry_interval: Duration,
}

impl Default for LinkConfig {
	fn default() -> Self {
		Self {
			endpoint: Endpoint::default(),
			retry_interval: DEFAULT_RETRY_INTERVAL,
		}
	}
}

/// Connection state of the link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
	Disconnected,
	Connecting,
	Connected,
	/// The last write failed; the stream has been dropped.
	Faulted,
}

/// What happened to one frame handed to [`TelemetryLink::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
	/// Every byte was written to an established stream.
	Sent,
	/// The write failed and the frame was discarded. The link has reconnected.
	Lost,
}

/// Counters kept across reconnects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
	pub frames_sent: u64,
	pub frames_lost: u64,
	pub connect_attempts: u64,
	/// Reconnects triggered by a failed send.
	pub reconnects: u64,
}

/// Destination for encoded telemetry.
///
/// The orchestrator only sees this seam, so a queued sender can replace the
/// inline link as long as it keeps at-most-once semantics.
pub trait FrameSink {
	/// Brings the sink up. May suspend until the consumer is reachable.
	fn open(&mut self) -> impl Future<Output = ()>;

	fn send_frame(&mut self, frame: TelemetryFrame) -> impl Future<Output = Delivery>;

	/// Releases the sink. Idempotent.
	fn shutdown(&mut self) -> impl Future<Output = ()>;
}

/// Single reconnecting connection to the telemetry consumer.
pub struct TelemetryLink<C: Connector = TcpConnector> {
	config: LinkConfig,
	connector: C,
	stream: Option<C::Stream>,
	state: LinkState,
	stats: LinkStats,
}

impl TelemetryLink<TcpConnector> {
	/// Creates a TCP link. Nothing is connected until [`connect`](Self::connect).
	pub fn tcp(config: LinkConfig) -> Self {
		Self::new(config, TcpConnector)
	}
}

impl<C: Connector> TelemetryLink<C> {
	pub fn new(config: LinkConfig, connector: C) -> Self {
		Self {
			config,
			connector,
			stream: None,
			state: LinkState::Disconnected,
			stats: LinkStats::default(),
		}
	}

	pub fn state(&self) -> LinkState {
		self.state
	}

	pub fn stats(&self) -> LinkStats {
		self.stats
	}

	pub fn endpoint(&self) -> &Endpoint {
		&self.config.endpoint
	}

	/// Connects, retrying forever. Returns immediately if already connected.
	pub async fn connect(&mut self) {
		if self.stream.is_some() {
			return;
		}
		self.establish().await;
	}

	/// Encodes and writes one frame.
	///
	/// On failure the stream is dropped and the link reconnects before this
	/// returns. The frame itself is not retried.
	pub async fn send(&mut self, frame: &TelemetryFrame) -> Delivery {
		let bytes = frame.encode();
		let result = match self.stream.as_mut() {
			Some(stream) => write_frame(stream, &bytes).await,
			None => Err(io::Error::new(io::ErrorKind::NotConnected, "telemetry link is not connected")),
		};

		match result {
			Ok(()) => {
				self.stats.frames_sent += 1;
				debug!(target = "capsule.link", bytes = FRAME_LEN, mask = frame.mask().bits(), "telemetry frame sent");
				Delivery::Sent
			}
			Err(err) => {
				warn!(target = "capsule.link", endpoint = %self.config.endpoint, error = %err, "telemetry send failed; reconnecting");
				self.state = LinkState::Faulted;
				self.drop_stream().await;
				self.stats.frames_lost += 1;
				self.stats.reconnects += 1;
				self.establish().await;
				Delivery::Lost
			}
		}
	}

	/// Releases the stream. Safe to call repeatedly.
	pub async fn close(&mut self) {
		if self.stream.is_some() {
			self.drop_stream().await;
			info!(target = "capsule.link", endpoint = %self.config.endpoint, "telemetry link closed");
		}
		self.state = LinkState::Disconnected;
	}

	async fn establish(&mut self) {
		loop {
			self.state = LinkState::Connecting;
			self.stats.connect_attempts += 1;
			match self.connector.connect(&self.config.endpoint).await {
				Ok(stream) => {
					self.stream = Some(stream);
					self.state = LinkState::Connected;
					info!(target = "capsule.link", endpoint = %self.config.endpoint, attempts = self.stats.connect_attempts, "telemetry link connected");
					return;
				}
				Err(err) => {
					warn!(
						target = "capsule.link",
						endpoint = %self.config.endpoint,
						error = %err,
						retry_in = ?self.config.retry_interval,
						"telemetry connect failed"
					);
					tokio::time::sleep(self.config.retry_interval).await;
				}
			}
		}
	}

	async fn drop_stream(&mut self) {
		if let Some(mut stream) = self.stream.take() {
			let _ = stream.shutdown().await;
		}
	}
}

impl<C: Connector> FrameSink for TelemetryLink<C> {
	async fn open(&mut self) {
		self.connect().await;
	}

	async fn send_frame(&mut self, frame: TelemetryFrame) -> Delivery {
		self.send(&frame).await
	}

	async fn shutdown(&mut self) {
		self.close().await;
	}
}

async fn write_frame<W: AsyncWrite + Unpin>(stream: &mut W, bytes: &[u8]) -> io::Result<()> {
	stream.write_all(bytes).await?;
	stream.flush().await
}

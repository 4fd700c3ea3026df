//! Transport seam for the telemetry link.
//!
//! [`Connector`] produces one write stream per successful connect. The link
//! never reads from the stream; the receiver does not acknowledge.

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::Pin;

use tokio::io::AsyncWrite;
use tokio::net::TcpStream;

/// Telemetry consumer address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
	pub host: String,
	pub port: u16,
}

impl Endpoint {
	pub fn new(host: impl Into<String>, port: u16) -> Self {
		Self { host: host.into(), port }
	}
}

impl Default for Endpoint {
	fn default() -> Self {
		Self::new("127.0.0.1", 5004)
	}
}

impl fmt::Display for Endpoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.host, self.port)
	}
}

/// Opens write streams to an [`Endpoint`].
pub trait Connector {
	type Stream: AsyncWrite + Unpin;

	/// Makes one connection attempt. Retrying is the caller's job.
	fn connect<'a>(&'a mut self, endpoint: &'a Endpoint) -> Pin<Box<dyn Future<Output = io::Result<Self::Stream>> + 'a>>;
}

/// Plain TCP connector.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

impl Connector for TcpConnector {
	type Stream = TcpStream;

	fn connect<'a>(&'a mut self, endpoint: &'a Endpoint) -> Pin<Box<dyn Future<Output = io::Result<TcpStream>> + 'a>> {
		Box::pin(async move {
			let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port)).await?;
			// One frame per write, sent immediately.
			stream.set_nodelay(true)?;
			Ok(stream)
		})
	}
}

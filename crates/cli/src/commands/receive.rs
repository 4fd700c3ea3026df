//! `capsule-bridge receive`: a minimal telemetry consumer.
//!
//! Frames carry no delimiter, so each connection is split into 24-byte
//! records as bytes arrive. A trailing partial record is dropped when the
//! producer goes away; the listener keeps accepting.

use std::io::{self, Write};
use std::process::ExitCode;

use capsule_protocol::{FrameDecoder, TelemetryFrame};
use serde_json::{Map, Value};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::cli::{FrameFormat, ReceiveArgs};
use crate::error::{BridgeError, Result};

pub async fn execute(args: ReceiveArgs) -> Result<ExitCode> {
	let addr = format!("{}:{}", args.host, args.port);
	let listener = TcpListener::bind(&addr).await.map_err(|source| BridgeError::Bind { addr: addr.clone(), source })?;
	info!(target = "capsule.receive", %addr, "listening for telemetry");

	loop {
		let (stream, peer) = listener.accept().await?;
		info!(target = "capsule.receive", %peer, "producer connected");
		let frames = serve(stream, args.format, &mut io::stdout().lock()).await?;
		info!(target = "capsule.receive", %peer, frames, "producer disconnected");
		if args.once {
			return Ok(ExitCode::SUCCESS);
		}
	}
}

/// Prints every whole frame read from `reader` and returns how many there were.
pub async fn serve<R, W>(mut reader: R, format: FrameFormat, out: &mut W) -> Result<u64>
where
	R: AsyncRead + Unpin,
	W: Write,
{
	let mut decoder = FrameDecoder::new();
	let mut chunk = [0u8; 4096];
	let mut frames = 0;
	loop {
		let read = match reader.read(&mut chunk).await {
			Ok(0) => break,
			Ok(read) => read,
			Err(err) => {
				warn!(target = "capsule.receive", error = %err, "connection read failed");
				break;
			}
		};
		decoder.extend(&chunk[..read]);
		while let Some(frame) = decoder.next_frame() {
			writeln!(out, "{}", render(&frame, format)?)?;
			frames += 1;
		}
		out.flush()?;
	}
	if decoder.pending() > 0 {
		debug!(target = "capsule.receive", bytes = decoder.pending(), "dropping partial record");
	}
	Ok(frames)
}

/// Formats the present fields of `frame`. Absent fields are omitted.
pub fn render(frame: &TelemetryFrame, format: FrameFormat) -> Result<String> {
	match format {
		FrameFormat::Text => {
			let fields: Vec<_> = frame.present().map(|(field, value)| format!("{}={value:.3}", field.name())).collect();
			if fields.is_empty() { Ok("(no fields)".to_string()) } else { Ok(fields.join(" ")) }
		}
		FrameFormat::Json => {
			let fields: Map<String, Value> = frame.present().map(|(field, value)| (field.name().to_string(), Value::from(f64::from(value)))).collect();
			Ok(serde_json::to_string(&Value::Object(fields))?)
		}
	}
}

//! Fixed-layout telemetry frame and its codec.
//!
//! A frame is always [`FRAME_LEN`] bytes:
//!
//! ```text
//! offset  size  field
//! 0       4     presence bitmask (u32, little-endian)
//! 4       4     fatigue score            (f32 LE)
//! 8       4     gravity score            (f32 LE)
//! 12      4     concentration score      (f32 LE)
//! 16      4     accumulated fatigue      (f32 LE)
//! 20      4     individual peak frequency (f32 LE)
//! ```
//!
//! Bit `i` of the mask marks slot `i` as valid. Every slot is written whether
//! or not its bit is set, so the encoding is purely positional.

use std::fmt;

use thiserror::Error;

/// Encoded size of every frame.
pub const FRAME_LEN: usize = 4 + 4 * Field::COUNT;

/// Errors produced while decoding a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
	/// Input shorter than one full frame.
	#[error("malformed frame: expected 24 bytes, got {len}")]
	Malformed { len: usize },
}

/// Named frame slots, in canonical wire order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
	Fatigue,
	Gravity,
	Concentration,
	AccumulatedFatigue,
	PeakFrequency,
}

impl Field {
	pub const COUNT: usize = 5;

	/// All fields in wire order.
	pub const ALL: [Field; Field::COUNT] = [
		Field::Fatigue,
		Field::Gravity,
		Field::Concentration,
		Field::AccumulatedFatigue,
		Field::PeakFrequency,
	];

	/// Zero-based slot index on the wire.
	pub const fn index(self) -> usize {
		self as usize
	}

	/// Presence bit for this field.
	pub const fn bit(self) -> u32 {
		1 << self.index()
	}

	/// Stable snake_case name used in receiver output.
	pub const fn name(self) -> &'static str {
		match self {
			Field::Fatigue => "fatigue_score",
			Field::Gravity => "gravity_score",
			Field::Concentration => "concentration_score",
			Field::AccumulatedFatigue => "accumulated_fatigue",
			Field::PeakFrequency => "individual_peak_frequency",
		}
	}
}

impl fmt::Display for Field {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// Presence bitmask over [`Field`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FieldMask(u32);

impl FieldMask {
	pub const EMPTY: FieldMask = FieldMask(0);

	/// Fields carried by a periodic productivity update.
	pub const PRODUCTIVITY: FieldMask = FieldMask(
		Field::Fatigue.bit() | Field::Gravity.bit() | Field::Concentration.bit() | Field::AccumulatedFatigue.bit(),
	);

	/// Field carried by a completed individual calibration.
	pub const CALIBRATION: FieldMask = FieldMask(Field::PeakFrequency.bit());

	pub const fn from_bits(bits: u32) -> Self {
		FieldMask(bits)
	}

	pub const fn bits(self) -> u32 {
		self.0
	}

	pub const fn contains(self, field: Field) -> bool {
		self.0 & field.bit() != 0
	}

	pub fn insert(&mut self, field: Field) {
		self.0 |= field.bit();
	}

	pub fn remove(&mut self, field: Field) {
		self.0 &= !field.bit();
	}

	pub const fn is_empty(self) -> bool {
		self.0 == 0
	}

	/// Present fields in wire order. Bits beyond the known slots are ignored.
	pub fn fields(self) -> impl Iterator<Item = Field> {
		Field::ALL.into_iter().filter(move |f| self.contains(*f))
	}
}

/// One telemetry record.
///
/// Slots whose presence bit is clear still hold a value (whatever was last
/// written there, zero by default); readers must go through [`get`](Self::get)
/// to respect the mask.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TelemetryFrame {
	mask: FieldMask,
	slots: [f32; Field::COUNT],
}

impl TelemetryFrame {
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets a field and marks it present.
	pub fn set(&mut self, field: Field, value: f32) {
		self.slots[field.index()] = value;
		self.mask.insert(field);
	}

	/// Builder form of [`set`](Self::set).
	pub fn with(mut self, field: Field, value: f32) -> Self {
		self.set(field, value);
		self
	}

	/// Clears the presence bit; the slot keeps its stale value.
	pub fn clear(&mut self, field: Field) {
		self.mask.remove(field);
	}

	/// Returns the field value only when its presence bit is set.
	pub fn get(&self, field: Field) -> Option<f32> {
		self.mask.contains(field).then(|| self.slots[field.index()])
	}

	pub fn mask(&self) -> FieldMask {
		self.mask
	}

	/// Present `(field, value)` pairs in wire order.
	pub fn present(&self) -> impl Iterator<Item = (Field, f32)> + '_ {
		self.mask.fields().map(|f| (f, self.slots[f.index()]))
	}

	/// Encodes into the fixed wire layout.
	pub fn encode(&self) -> [u8; FRAME_LEN] {
		let mut buf = [0u8; FRAME_LEN];
		buf[..4].copy_from_slice(&self.mask.bits().to_le_bytes());
		for (i, value) in self.slots.iter().enumerate() {
			let at = 4 + i * 4;
			buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
		}
		buf
	}

	/// Decodes the first [`FRAME_LEN`] bytes of `bytes`. Trailing bytes are ignored.
	pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
		if bytes.len() < FRAME_LEN {
			return Err(FrameError::Malformed { len: bytes.len() });
		}

		let mask = FieldMask::from_bits(u32::from_le_bytes(word(bytes, 0)));
		let mut slots = [0f32; Field::COUNT];
		for (i, slot) in slots.iter_mut().enumerate() {
			*slot = f32::from_le_bytes(word(bytes, 4 + i * 4));
		}
		Ok(Self { mask, slots })
	}
}

fn word(bytes: &[u8], at: usize) -> [u8; 4] {
	[bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]
}

/// Incremental decoder for a byte stream of back-to-back frames.
///
/// Bytes are buffered until a whole record is available. There is no resync:
/// if the stream lost a record boundary upstream, every following frame is
/// misaligned.
#[derive(Debug, Default)]
pub struct FrameDecoder {
	buf: Vec<u8>,
}

impl FrameDecoder {
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends received bytes.
	pub fn extend(&mut self, bytes: &[u8]) {
		self.buf.extend_from_slice(bytes);
	}

	/// Pops the next complete frame, if one is buffered.
	pub fn next_frame(&mut self) -> Option<TelemetryFrame> {
		if self.buf.len() < FRAME_LEN {
			return None;
		}
		let frame = TelemetryFrame::decode(&self.buf[..FRAME_LEN]).ok()?;
		self.buf.drain(..FRAME_LEN);
		Some(frame)
	}

	/// Bytes buffered toward an incomplete frame.
	pub fn pending(&self) -> usize {
		self.buf.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn productivity_frame() -> TelemetryFrame {
		TelemetryFrame::new()
			.with(Field::Fatigue, 0.25)
			.with(Field::Gravity, 1.5)
			.with(Field::Concentration, 73.0)
			.with(Field::AccumulatedFatigue, 12.125)
	}

	#[test]
	fn encoded_size_is_constant() {
		assert_eq!(FRAME_LEN, 24);
		assert_eq!(TelemetryFrame::new().encode().len(), 24);
		assert_eq!(productivity_frame().encode().len(), 24);
		assert_eq!(TelemetryFrame::new().with(Field::PeakFrequency, 10.2).encode().len(), 24);
	}

	#[test]
	fn layout_is_mask_then_slots_little_endian() {
		let frame = TelemetryFrame::new().with(Field::Gravity, 2.0).with(Field::PeakFrequency, -1.0);
		let bytes = frame.encode();

		assert_eq!(&bytes[0..4], &0b10010u32.to_le_bytes());
		assert_eq!(&bytes[4..8], &0f32.to_le_bytes());
		assert_eq!(&bytes[8..12], &2.0f32.to_le_bytes());
		assert_eq!(&bytes[20..24], &(-1.0f32).to_le_bytes());
	}

	#[test]
	fn decode_restores_present_fields_bit_for_bit() {
		let odd = f32::from_bits(0x7fc0_0001);
		let frame = productivity_frame().with(Field::PeakFrequency, odd);
		let decoded = TelemetryFrame::decode(&frame.encode()).unwrap();

		assert_eq!(decoded.mask(), frame.mask());
		for field in Field::ALL {
			let a = frame.get(field).map(f32::to_bits);
			let b = decoded.get(field).map(f32::to_bits);
			assert_eq!(a, b, "{field}");
		}
	}

	#[test]
	fn absent_slots_keep_stale_value_but_read_as_none() {
		let mut frame = productivity_frame();
		frame.clear(Field::Concentration);
		let decoded = TelemetryFrame::decode(&frame.encode()).unwrap();

		assert_eq!(decoded.get(Field::Concentration), None);
		assert_eq!(decoded.slots[Field::Concentration.index()], 73.0);
		assert_eq!(decoded.get(Field::Fatigue), Some(0.25));
	}

	#[test]
	fn productivity_and_calibration_masks() {
		assert_eq!(productivity_frame().mask(), FieldMask::PRODUCTIVITY);
		assert_eq!(FieldMask::PRODUCTIVITY.bits(), 0b01111);
		assert_eq!(FieldMask::CALIBRATION.bits(), 0b10000);
		assert!(!FieldMask::PRODUCTIVITY.contains(Field::PeakFrequency));
	}

	#[test]
	fn decode_rejects_short_input() {
		let bytes = productivity_frame().encode();
		assert_eq!(TelemetryFrame::decode(&bytes[..23]), Err(FrameError::Malformed { len: 23 }));
		assert_eq!(TelemetryFrame::decode(&[]), Err(FrameError::Malformed { len: 0 }));
	}

	#[test]
	fn unknown_mask_bits_are_ignored_by_accessors() {
		let mut bytes = TelemetryFrame::new().with(Field::Fatigue, 3.0).encode();
		bytes[0..4].copy_from_slice(&(0xffff_ffe1u32).to_le_bytes());
		let decoded = TelemetryFrame::decode(&bytes).unwrap();

		let present: Vec<_> = decoded.present().map(|(f, _)| f).collect();
		assert_eq!(present, vec![Field::Fatigue]);
	}

	#[test]
	fn stream_decoder_reassembles_split_records() {
		let a = productivity_frame().encode();
		let b = TelemetryFrame::new().with(Field::PeakFrequency, 9.75).encode();
		let mut stream = a.to_vec();
		stream.extend_from_slice(&b);

		let mut decoder = FrameDecoder::new();
		decoder.extend(&stream[..10]);
		assert!(decoder.next_frame().is_none());
		decoder.extend(&stream[10..30]);
		assert_eq!(decoder.next_frame().unwrap().get(Field::Concentration), Some(73.0));
		assert_eq!(decoder.pending(), 6);
		decoder.extend(&stream[30..]);
		assert_eq!(decoder.next_frame().unwrap().get(Field::PeakFrequency), Some(9.75));
		assert!(decoder.next_frame().is_none());
		assert_eq!(decoder.pending(), 0);
	}
}

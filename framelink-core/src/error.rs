use std::io;
use thiserror::Error;

/// Various packing, framing, and transport errors
#[derive(Error, Debug)]
pub enum Error {
	/// The buffer is smaller than the minimum deterministic size of its
	/// field layout.
	#[error("buffer too short: need at least {needed} bytes, have {actual}")]
	ShortBuffer { needed: usize, actual: usize },

	/// A length-prefixed blob declared a length that does not match the
	/// bytes actually remaining in the frame.
	#[error("declared blob length {declared} does not match remaining {actual} bytes")]
	LengthMismatch { declared: usize, actual: usize },

	/// A value required by the field layout was absent from the value map.
	#[error("missing value for field `{0}`")]
	MissingField(&'static str),

	/// A supplied value does not fit the declared field type or width.
	#[error("bad value for field `{field}`: {reason}")]
	BadField { field: &'static str, reason: String },

	/// No packet with this name exists in the protocol definition.
	#[error("unknown packet `{0}`")]
	UnknownPacket(String),

	/// A structurally complete frame was rejected by the packet factory.
	#[error("bad packet: {0}")]
	BadPacket(String),

	/// A named wait was requested while another response is already pending.
	#[error("another response is already pending")]
	Busy,

	/// The parser/generator has no attached stream to send through.
	#[error("no stream attached")]
	NoStream,

	/// The underlying byte transport failed.
	#[error("transport error: {0}")]
	Transport(String),

	#[error("i/o error")]
	Io(#[from] io::Error),
}

impl From<serialport::Error> for Error {
	fn from(e: serialport::Error) -> Self {
		Error::Transport(e.to_string())
	}
}

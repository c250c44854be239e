use std::time::Duration;

use crate::codec::ValueMap;
use crate::error::Error;
use crate::packet::{Direction, Packet};

/// Result of a packet boundary test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
	/// No packet in progress
	Idle,
	/// Possibly inside a packet; the start test may still reject
	Starting,
	/// Inside a packet
	InProgress,
	/// Packet boundary reached
	Complete,
}

/// Tests whether a buffer marks the start or end of a packet.
pub type BoundaryTest = fn(&[u8], Direction) -> ParseStatus;

/// Builds a packet from a completed frame buffer.
pub type PacketFromBuffer = fn(&[u8], Direction) -> Result<Packet, Error>;

/// Builds a packet from a name and argument map, ready for transmission.
pub type PacketFromNameAndArgs = fn(&str, ValueMap) -> Result<Packet, Error>;

/// An immutable bundle describing one stream protocol.
///
/// The parser/generator drives its framing state machine entirely through
/// this record: the byte sets and timeouts are data, the boundary tests and
/// packet factories are plain functions. A `None` boundary test selects the
/// default behaviour (any byte starts a packet; a packet completes on a
/// terminal byte if the terminal set is non-empty, otherwise on any byte).
#[derive(Debug, Clone, Copy)]
pub struct Protocol {
	/// How long a started packet may take to finish arriving.
	pub incoming_packet_timeout: Option<Duration>,
	/// How long a required response may take to arrive after a send.
	pub waiting_packet_timeout: Option<Duration>,
	/// Bytes that erase the previously buffered byte.
	pub backspace_bytes: &'static [u8],
	/// Bytes that end a packet under the default end test.
	pub terminal_bytes: &'static [u8],
	/// Trailing bytes stripped before the packet factory runs.
	pub trim_bytes: &'static [u8],
	pub start_test: Option<BoundaryTest>,
	pub end_test: Option<BoundaryTest>,
	pub packet_from_buffer: PacketFromBuffer,
	pub packet_from_name_and_args: PacketFromNameAndArgs,
}

impl Protocol {
	/// A protocol with default boundary behaviour, no timeouts, and no
	/// special byte sets.
	pub const fn new(
		packet_from_buffer: PacketFromBuffer,
		packet_from_name_and_args: PacketFromNameAndArgs,
	) -> Protocol {
		Protocol {
			incoming_packet_timeout: None,
			waiting_packet_timeout: None,
			backspace_bytes: &[],
			terminal_bytes: &[],
			trim_bytes: &[],
			start_test: None,
			end_test: None,
			packet_from_buffer,
			packet_from_name_and_args,
		}
	}

	pub fn test_packet_start(&self, buffer: &[u8], direction: Direction) -> ParseStatus {
		match self.start_test {
			Some(test) => test(buffer, direction),
			// default: any data is the beginning of a new packet
			None => ParseStatus::InProgress,
		}
	}

	pub fn test_packet_complete(&self, buffer: &[u8], direction: Direction) -> ParseStatus {
		if let Some(test) = self.end_test {
			return test(buffer, direction);
		}
		if !self.terminal_bytes.is_empty() {
			match buffer.last() {
				Some(last) if self.terminal_bytes.contains(last) => ParseStatus::Complete,
				_ => ParseStatus::InProgress,
			}
		} else {
			// no terminal condition, assume completion after any byte
			ParseStatus::Complete
		}
	}
}

/// Packet factory for protocols that cannot generate outgoing packets.
pub fn no_outgoing_packets(name: &str, _args: ValueMap) -> Result<Packet, Error> {
	Err(Error::UnknownPacket(name.to_string()))
}

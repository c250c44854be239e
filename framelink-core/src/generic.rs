//! Generic ready-made protocols: length-type-value, type-length-value, and
//! terminated text lines.
//!
//! These cover the common framings peripherals actually ship with, and double
//! as worked examples for defining protocols of your own.

use crate::codec::{Field, FieldType, ValueMap};
use crate::error::Error;
use crate::packet::{Direction, Packet, PacketDef};
use crate::protocol::{no_outgoing_packets, ParseStatus, Protocol};

static LTV_FIELDS: [Field; 3] = [
	Field::new("length", FieldType::U8),
	Field::new("type", FieldType::U8),
	Field::new("value", FieldType::BlobGreedy),
];
static LTV_PACKET: PacketDef = PacketDef::new("ltv_packet", &LTV_FIELDS);

static TLV_FIELDS: [Field; 3] = [
	Field::new("type", FieldType::U8),
	Field::new("length", FieldType::U8),
	Field::new("value", FieldType::BlobGreedy),
];
static TLV_PACKET: PacketDef = PacketDef::new("tlv_packet", &TLV_FIELDS);

static TEXT_FIELDS: [Field; 1] = [Field::new("text", FieldType::BlobGreedy)];
static TEXT_PACKET: PacketDef = PacketDef::new("text_packet", &TEXT_FIELDS);

fn ltv_end_test(buffer: &[u8], _direction: Direction) -> ParseStatus {
	// [length] [type] [v0, v1, ..., v<length-1>], length counts type + value
	if buffer.len() == buffer[0] as usize + 1 {
		ParseStatus::Complete
	} else {
		ParseStatus::InProgress
	}
}

fn ltv_from_buffer(buffer: &[u8], direction: Direction) -> Result<Packet, Error> {
	// a lone 0x00 satisfies the end test but carries no type byte
	if buffer.len() < 2 {
		return Err(Error::BadPacket(format!(
			"{}-byte frame has no room for length and type",
			buffer.len()
		)));
	}
	Packet::from_buffer(&LTV_PACKET, buffer, direction)
}

fn ltv_from_name_and_args(name: &str, args: ValueMap) -> Result<Packet, Error> {
	if name != LTV_PACKET.name {
		return Err(Error::UnknownPacket(name.to_string()));
	}
	Packet::from_payload(&LTV_PACKET, args, Direction::Tx)
}

/// Length-type-value framing: `L(1) T(1) V(L-1 bytes)`.
pub fn ltv() -> Protocol {
	let mut protocol = Protocol::new(ltv_from_buffer, ltv_from_name_and_args);
	protocol.end_test = Some(ltv_end_test);
	protocol
}

fn tlv_end_test(buffer: &[u8], _direction: Direction) -> ParseStatus {
	// [type] [length] [v0, v1, ..., v<length-1>], length counts value only
	if buffer.len() > 1 && buffer.len() == buffer[1] as usize + 2 {
		ParseStatus::Complete
	} else {
		ParseStatus::InProgress
	}
}

fn tlv_from_buffer(buffer: &[u8], direction: Direction) -> Result<Packet, Error> {
	Packet::from_buffer(&TLV_PACKET, buffer, direction)
}

fn tlv_from_name_and_args(name: &str, args: ValueMap) -> Result<Packet, Error> {
	if name != TLV_PACKET.name {
		return Err(Error::UnknownPacket(name.to_string()));
	}
	Packet::from_payload(&TLV_PACKET, args, Direction::Tx)
}

/// Type-length-value framing: `T(1) L(1) V(L bytes)`.
pub fn tlv() -> Protocol {
	let mut protocol = Protocol::new(tlv_from_buffer, tlv_from_name_and_args);
	protocol.end_test = Some(tlv_end_test);
	protocol
}

fn text_from_buffer(buffer: &[u8], direction: Direction) -> Result<Packet, Error> {
	Packet::from_buffer(&TEXT_PACKET, buffer, direction)
}

/// Line-oriented text framing: frames end at `0x0A`, a trailing `0x0D` is
/// stripped, and `0x08`/`0x7F` erase the previous byte as they arrive.
///
/// Receive-only; generating text packets is not supported.
pub fn text_line() -> Protocol {
	let mut protocol = Protocol::new(text_from_buffer, no_outgoing_packets);
	protocol.backspace_bytes = &[0x08, 0x7F];
	protocol.terminal_bytes = &[0x0A];
	protocol.trim_bytes = &[0x0A, 0x0D];
	protocol
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::codec::Value;

	#[test]
	fn test_ltv_end_test_boundaries() {
		let protocol = ltv();
		assert_eq!(
			protocol.test_packet_complete(&[0x06, 0x01], Direction::Rx),
			ParseStatus::InProgress
		);
		assert_eq!(
			protocol.test_packet_complete(
				&[0x06, 0x01, 0x48, 0x65, 0x6C, 0x6C, 0x6F],
				Direction::Rx
			),
			ParseStatus::Complete
		);
		// a zero length byte completes on its own
		assert_eq!(
			protocol.test_packet_complete(&[0x00], Direction::Rx),
			ParseStatus::Complete
		);
	}

	#[test]
	fn test_ltv_zero_length_frame_is_rejected() {
		match ltv_from_buffer(&[0x00], Direction::Rx) {
			Err(Error::BadPacket(_)) => {}
			other => panic!("expected BadPacket, got {:?}", other),
		}
	}

	#[test]
	fn test_ltv_packet_from_buffer() {
		let packet = ltv_from_buffer(
			&[0x06, 0x01, 0x48, 0x65, 0x6C, 0x6C, 0x6F],
			Direction::Rx,
		)
		.unwrap();
		assert_eq!(packet.name(), "ltv_packet");
		assert_eq!(packet.get("length"), Some(&Value::U8(6)));
		assert_eq!(packet.get("type"), Some(&Value::U8(1)));
		assert_eq!(packet.get("value"), Some(&Value::from(&b"Hello"[..])));
	}

	#[test]
	fn test_tlv_end_test_boundaries() {
		let protocol = tlv();
		// one byte is never enough, even if it reads as length zero
		assert_eq!(
			protocol.test_packet_complete(&[0x01], Direction::Rx),
			ParseStatus::InProgress
		);
		assert_eq!(
			protocol.test_packet_complete(&[0x01, 0x00], Direction::Rx),
			ParseStatus::Complete
		);
		assert_eq!(
			protocol.test_packet_complete(&[0x01, 0x05, 0x48, 0x65], Direction::Rx),
			ParseStatus::InProgress
		);
		assert_eq!(
			protocol.test_packet_complete(
				&[0x01, 0x05, 0x48, 0x65, 0x6C, 0x6C, 0x6F],
				Direction::Rx
			),
			ParseStatus::Complete
		);
	}

	#[test]
	fn test_tlv_generate_round_trip() {
		let mut args = ValueMap::new();
		args.insert("type", Value::U8(2));
		args.insert("length", Value::U8(5));
		args.insert("value", Value::from(&b"world"[..]));

		let packet = tlv_from_name_and_args("tlv_packet", args).unwrap();
		assert_eq!(packet.buffer, b"\x02\x05world");

		let reparsed = tlv_from_buffer(&packet.buffer, Direction::Rx).unwrap();
		assert_eq!(reparsed.payload, packet.payload);
	}

	#[test]
	fn test_tlv_unknown_packet_name() {
		match tlv_from_name_and_args("nonsense", ValueMap::new()) {
			Err(Error::UnknownPacket(_)) => {}
			other => panic!("expected UnknownPacket, got {:?}", other),
		}
	}

	#[test]
	fn test_text_line_byte_sets() {
		let protocol = text_line();
		assert_eq!(protocol.terminal_bytes, &[0x0A]);
		assert_eq!(protocol.backspace_bytes, &[0x08, 0x7F]);
		assert_eq!(protocol.trim_bytes, &[0x0A, 0x0D]);
		assert_eq!(
			protocol.test_packet_complete(b"hello", Direction::Rx),
			ParseStatus::InProgress
		);
		assert_eq!(
			protocol.test_packet_complete(b"hello\n", Direction::Rx),
			ParseStatus::Complete
		);
	}
}

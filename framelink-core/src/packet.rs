use std::fmt;

use crate::codec::{self, Field, Value, ValueMap};
use crate::error::Error;

/// Whether a packet was received from or is headed to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
	Rx,
	Tx,
}

/// The structural definition of one packet in a protocol vocabulary.
///
/// The payload field list is required; header and footer lists may be empty.
/// `response_required` names the packet expected back after this one is
/// transmitted, which arms the waiting-packet deadline on send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketDef {
	pub name: &'static str,
	pub header_fields: &'static [Field],
	pub payload_fields: &'static [Field],
	pub footer_fields: &'static [Field],
	pub response_required: Option<&'static str>,
}

impl PacketDef {
	/// A definition with payload fields only.
	pub const fn new(name: &'static str, payload_fields: &'static [Field]) -> PacketDef {
		PacketDef {
			name,
			header_fields: &[],
			payload_fields,
			footer_fields: &[],
			response_required: None,
		}
	}
}

/// One parsed or generated packet.
///
/// A packet is created either from a byte buffer (incoming data, the maps
/// are derived) or from value maps (outgoing data, the buffer is derived),
/// and is immutable afterwards.
#[derive(Debug, Clone)]
pub struct Packet {
	pub def: &'static PacketDef,
	pub header: ValueMap,
	pub payload: ValueMap,
	pub footer: ValueMap,
	pub buffer: Vec<u8>,
	pub direction: Direction,
}

impl Packet {
	/// Builds a packet by unpacking `buffer` under `def`.
	///
	/// The header is sliced off the front, the footer off the back, and the
	/// payload unpacked from whatever lies between.
	pub fn from_buffer(
		def: &'static PacketDef,
		buffer: &[u8],
		direction: Direction,
	) -> Result<Packet, Error> {
		let header_info = codec::packing_info(def.header_fields);
		let footer_info = codec::packing_info(def.footer_fields);
		let header_len = header_info.expected_length;
		let footer_len = footer_info.expected_length;

		if buffer.len() < header_len + footer_len {
			return Err(Error::ShortBuffer {
				needed: header_len + footer_len,
				actual: buffer.len(),
			});
		}

		let header = codec::unpack(&buffer[..header_len], def.header_fields, Some(header_info))?;
		let footer = codec::unpack(
			&buffer[buffer.len() - footer_len..],
			def.footer_fields,
			Some(footer_info),
		)?;
		let payload = codec::unpack(
			&buffer[header_len..buffer.len() - footer_len],
			def.payload_fields,
			None,
		)?;

		Ok(Packet {
			def,
			header,
			payload,
			footer,
			buffer: buffer.to_vec(),
			direction,
		})
	}

	/// Builds a packet by packing the supplied value maps under `def`.
	pub fn from_values(
		def: &'static PacketDef,
		header: ValueMap,
		payload: ValueMap,
		footer: ValueMap,
		direction: Direction,
	) -> Result<Packet, Error> {
		let mut buffer = codec::pack(&header, def.header_fields)?;
		buffer.extend(codec::pack(&payload, def.payload_fields)?);
		buffer.extend(codec::pack(&footer, def.footer_fields)?);

		Ok(Packet {
			def,
			header,
			payload,
			footer,
			buffer,
			direction,
		})
	}

	/// Builds a packet from payload values alone, for definitions without
	/// header or footer fields.
	pub fn from_payload(
		def: &'static PacketDef,
		payload: ValueMap,
		direction: Direction,
	) -> Result<Packet, Error> {
		Packet::from_values(def, ValueMap::new(), payload, ValueMap::new(), direction)
	}

	pub fn name(&self) -> &'static str {
		self.def.name
	}

	/// Convenience accessor for a payload value.
	pub fn get(&self, name: &str) -> Option<&Value> {
		self.payload.get(name)
	}
}

impl fmt::Display for Packet {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let dir = match self.direction {
			Direction::Rx => "rx",
			Direction::Tx => "tx",
		};
		write!(f, "{} ({}): {{ ", self.name(), dir)?;
		for (i, field) in self.def.payload_fields.iter().enumerate() {
			if i > 0 {
				write!(f, ", ")?;
			}
			match self.payload.get(field.name) {
				Some(value) => write!(f, "{}: {}", field.name, value)?,
				None => write!(f, "{}: ?", field.name)?,
			}
		}
		write!(f, " }}")
	}
}

//! Feeds a few TLV frames straight into a parser/generator and prints
//! whatever comes out, without any transport involved.

use anyhow::Result;
use framelink_core::{generic, Detached, ParserGenerator};

fn hex(buffer: &[u8]) -> String {
	buffer
		.iter()
		.map(|b| format!("{:02X}", b))
		.collect::<Vec<_>>()
		.join(" ")
}

fn main() -> Result<()> {
	env_logger::init();

	let mut pg: ParserGenerator<Detached> = ParserGenerator::new(generic::tlv());
	pg.on_rx_packet = Some(Box::new(|packet| {
		println!("RX: [{}] ({})", hex(&packet.buffer), packet);
	}));
	pg.on_rx_error = Some(Box::new(|e, buffer| {
		println!("ERROR: {} (raw data: [{}])", e, hex(buffer));
	}));

	// whole frames at once
	pg.parse(b"\x01\x05Hello");
	pg.parse(&[0x02, 0x05, 0x77, 0x6F, 0x72, 0x6C, 0x64]);

	// single bytes, the way a slow transport would deliver them
	for &byte in &[0x03, 0x03, 0x54, 0x4C, 0x56] {
		pg.parse_byte(byte);
	}
	for &byte in &[0x04, 0x04, 0x64, 0x65, 0x6D, 0x6F] {
		pg.parse_byte(byte);
	}

	Ok(())
}

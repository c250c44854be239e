//! This crate provides framed-packet communication with peripherals over
//! byte-oriented transports such as serial ports.
//!
//! Three layers stack bottom-up:
//!
//! * a **codec** that packs and unpacks typed field values to and from
//!   little-endian byte buffers ([`pack`], [`unpack`], [`Field`]);
//! * a **parser/generator** ([`ParserGenerator`]) that runs incoming bytes
//!   through a per-protocol framing state machine one byte at a time,
//!   hands complete [`Packet`]s to observer callbacks, detects incoming and
//!   response timeouts, and provides a synchronous send-then-wait
//!   rendezvous for command/response devices;
//! * a **manager** ([`serial::SerialManager`]) that watches for device
//!   connections and disconnections and attaches streams and
//!   parser/generators to them.
//!
//! A protocol is described by an immutable [`Protocol`] value: boundary
//! tests, backspace/terminal/trim byte sets, timeout defaults, and two
//! packet factories. The [`generic`] module ships ready-made TLV, LTV, and
//! text-line protocols, which also serve as templates for defining your
//! own.
//!
//! # Event loop
//!
//! Nothing here spawns threads or timers. The application must call
//! `process()` on its manager (or parser/generator) continuously; that is
//! where queued bytes are parsed and where deadlines are checked. The one
//! blocking call, [`ParserGenerator::wait_packet`], pumps `process()`
//! itself until its response arrives or times out.

mod clock;
mod codec;
mod error;
mod packet;
mod parser;
mod protocol;
mod stream;

pub mod generic;
pub mod serial;

pub use clock::{Clock, ManualClock, SystemClock};
pub use codec::{
	field_offset, pack, packing_info, unpack, Field, FieldType, PackingInfo, Value, ValueMap,
};
pub use error::Error;
pub use packet::{Direction, Packet, PacketDef};
pub use parser::ParserGenerator;
pub use protocol::{
	no_outgoing_packets, BoundaryTest, PacketFromBuffer, PacketFromNameAndArgs, ParseStatus,
	Protocol,
};
pub use stream::{Detached, Stream};

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::codec::ValueMap;
use crate::error::Error;
use crate::packet::{Direction, Packet};
use crate::protocol::{ParseStatus, Protocol};
use crate::stream::Stream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitState {
	Idle,
	Waiting,
	Satisfied,
	TimedOut,
}

/// Parser/generator for one stream speaking one protocol.
///
/// Incoming bytes are parsed one at a time against the protocol's boundary
/// tests; complete frames become [`Packet`]s and are handed to the
/// `on_rx_packet` observer. Outgoing packets are generated from a name and
/// argument map and written to the attached stream, optionally arming a
/// response deadline.
///
/// The host application must call [`process`](ParserGenerator::process)
/// continuously from its event loop: that is where queued bytes are parsed
/// and where the incoming- and waiting-packet deadlines are checked. No
/// timers run anywhere else.
pub struct ParserGenerator<S: Stream> {
	pub protocol: Protocol,

	/// How long a started packet may take to finish arriving. Seeded from
	/// the protocol; the application may override it per parser.
	pub incoming_packet_timeout: Option<Duration>,
	/// How long a required response may take to arrive after a send.
	/// Seeded from the protocol; the application may override it.
	pub waiting_packet_timeout: Option<Duration>,

	pub on_rx_packet: Option<Box<dyn FnMut(&Packet)>>,
	pub on_tx_packet: Option<Box<dyn FnMut(&Packet)>>,
	pub on_rx_error: Option<Box<dyn FnMut(&Error, &[u8])>>,
	pub on_incoming_packet_timeout: Option<Box<dyn FnMut(&[u8])>>,
	pub on_waiting_packet_timeout: Option<Box<dyn FnMut(&str)>>,

	stream: Option<S>,
	clock: Arc<dyn Clock>,

	rx_buffer: Vec<u8>,
	rx_queue: VecDeque<u8>,
	status: ParseStatus,
	incoming_t0: Option<Instant>,

	pending_packet: Option<&'static str>,
	waiting_t0: Option<Instant>,
	wait_state: WaitState,
	last_rx_packet: Option<Packet>,
	last_pending_packet: Option<Packet>,
}

impl<S: Stream> ParserGenerator<S> {
	/// A parser/generator with no attached stream, fed by hand through
	/// [`parse`](ParserGenerator::parse) or
	/// [`queue`](ParserGenerator::queue).
	pub fn new(protocol: Protocol) -> ParserGenerator<S> {
		ParserGenerator::with_clock(protocol, Arc::new(SystemClock))
	}

	pub fn with_stream(protocol: Protocol, stream: S) -> ParserGenerator<S> {
		let mut pg = ParserGenerator::new(protocol);
		pg.stream = Some(stream);
		pg
	}

	/// Substitutes the time source used for deadline checks.
	pub fn with_clock(protocol: Protocol, clock: Arc<dyn Clock>) -> ParserGenerator<S> {
		ParserGenerator {
			incoming_packet_timeout: protocol.incoming_packet_timeout,
			waiting_packet_timeout: protocol.waiting_packet_timeout,
			protocol,
			on_rx_packet: None,
			on_tx_packet: None,
			on_rx_error: None,
			on_incoming_packet_timeout: None,
			on_waiting_packet_timeout: None,
			stream: None,
			clock,
			rx_buffer: Vec::new(),
			rx_queue: VecDeque::new(),
			status: ParseStatus::Idle,
			incoming_t0: None,
			pending_packet: None,
			waiting_t0: None,
			wait_state: WaitState::Idle,
			last_rx_packet: None,
			last_pending_packet: None,
		}
	}

	pub fn attach_stream(&mut self, stream: S) {
		self.stream = Some(stream);
	}

	pub fn stream(&self) -> Option<&S> {
		self.stream.as_ref()
	}

	pub fn stream_mut(&mut self) -> Option<&mut S> {
		self.stream.as_mut()
	}

	pub fn status(&self) -> ParseStatus {
		self.status
	}

	pub fn rx_buffer(&self) -> &[u8] {
		&self.rx_buffer
	}

	/// Name of the response packet currently awaited, if any.
	pub fn pending_packet(&self) -> Option<&'static str> {
		self.pending_packet
	}

	pub fn last_rx_packet(&self) -> Option<&Packet> {
		self.last_rx_packet.as_ref()
	}

	/// Resets the framing state: buffer cleared, status idle, incoming
	/// deadline disarmed. The pending-response rendezvous is untouched.
	pub fn reset(&mut self) {
		self.rx_buffer.clear();
		self.status = ParseStatus::Idle;
		self.incoming_t0 = None;
	}

	/// Adds data to the receive queue for the next
	/// [`process`](ParserGenerator::process) call.
	pub fn queue(&mut self, data: &[u8]) {
		self.rx_queue.extend(data.iter().copied());
	}

	/// Parses a chunk of data immediately, byte by byte.
	pub fn parse(&mut self, data: &[u8]) {
		for &byte in data {
			self.parse_byte(byte);
		}
	}

	/// Runs one byte through the framing state machine, returning the
	/// packet it completed, if any.
	pub fn parse_byte(&mut self, byte: u8) -> Option<Packet> {
		// the byte may be removed again below if it is a backspace
		self.rx_buffer.push(byte);

		if self.status == ParseStatus::Idle {
			self.status = self.protocol.test_packet_start(&self.rx_buffer, Direction::Rx);

			if self.status != ParseStatus::Idle
				&& self.incoming_packet_timeout.is_some()
				&& self.incoming_t0.is_none()
			{
				self.incoming_t0 = Some(self.clock.now());
			}
		}

		if self.status != ParseStatus::Idle {
			if self.protocol.backspace_bytes.contains(&byte) {
				// erase the backspace itself and the byte before it
				self.rx_buffer.pop();
				self.rx_buffer.pop();
				if self.rx_buffer.is_empty() {
					self.status = ParseStatus::Idle;
				}
			} else {
				if self.status == ParseStatus::Starting {
					self.status =
						self.protocol.test_packet_start(&self.rx_buffer, Direction::Rx);
				}
				if self.status == ParseStatus::InProgress {
					self.status =
						self.protocol.test_packet_complete(&self.rx_buffer, Direction::Rx);
				}
			}

			if self.status == ParseStatus::Complete {
				return self.finish_packet();
			}
		}

		if self.status == ParseStatus::Idle {
			// junk data, or a backspace that emptied the buffer
			self.reset();
		}

		None
	}

	fn finish_packet(&mut self) -> Option<Packet> {
		// strip protocol trim bytes off the tail
		for &trim in self.protocol.trim_bytes {
			if self.rx_buffer.last() == Some(&trim) {
				self.rx_buffer.pop();
			}
		}

		// state is reset before dispatch so that an observer reacting to
		// this packet can immediately transmit through the same parser
		let buffer = std::mem::replace(&mut self.rx_buffer, Vec::new());
		self.reset();

		match (self.protocol.packet_from_buffer)(&buffer, Direction::Rx) {
			Ok(packet) => {
				debug!("rx packet {} ({} bytes)", packet.name(), packet.buffer.len());

				let mut matched_pending = false;
				if Some(packet.name()) == self.pending_packet {
					self.last_pending_packet = Some(packet.clone());
					self.pending_packet = None;
					self.waiting_t0 = None;
					matched_pending = true;
				}

				self.last_rx_packet = Some(packet.clone());
				if let Some(cb) = self.on_rx_packet.as_mut() {
					cb(&packet);
				}

				if matched_pending {
					self.wait_state = WaitState::Satisfied;
				}

				Some(packet)
			}
			Err(e) => {
				warn!("rx error: {}", e);
				if let Some(cb) = self.on_rx_error.as_mut() {
					cb(&e, &buffer);
				}
				None
			}
		}
	}

	/// Creates an outgoing packet from a name and argument map without
	/// sending it.
	pub fn generate(&self, name: &str, args: ValueMap) -> Result<Packet, Error> {
		(self.protocol.packet_from_name_and_args)(name, args)
	}

	/// Generates a packet and writes it to the attached stream.
	///
	/// If the packet's definition names a required response, the waiting
	/// deadline is armed after a successful write.
	pub fn send(&mut self, name: &str, args: ValueMap) -> Result<Packet, Error> {
		let packet = self.generate(name, args)?;

		if let Some(cb) = self.on_tx_packet.as_mut() {
			cb(&packet);
		}

		let stream = self.stream.as_mut().ok_or(Error::NoStream)?;
		stream.write(&packet.buffer)?;
		debug!("tx packet {} ({} bytes)", packet.name(), packet.buffer.len());

		if let Some(response) = packet.def.response_required {
			self.pending_packet = Some(response);
			self.waiting_t0 = Some(self.clock.now());
			self.wait_state = WaitState::Waiting;
		}

		Ok(packet)
	}

	/// Blocks until the pending response packet arrives or times out.
	///
	/// With a `name`, arms a new wait for that packet, failing with
	/// [`Error::Busy`] if another wait is already pending. Without one,
	/// waits for whatever the last send left pending, returning `None`
	/// immediately if nothing is.
	///
	/// Blocking means repeatedly running [`process`]: the stream is polled
	/// and deadlines are checked until the gate releases. Returns the
	/// matched packet, or `None` if the wait timed out or the stream went
	/// away.
	///
	/// [`process`]: ParserGenerator::process
	pub fn wait_packet(&mut self, name: Option<&'static str>) -> Result<Option<Packet>, Error> {
		if let Some(name) = name {
			if self.pending_packet.is_some() {
				return Err(Error::Busy);
			}
			self.pending_packet = Some(name);
			self.waiting_t0 = Some(self.clock.now());
			self.wait_state = WaitState::Waiting;
		} else if self.pending_packet.is_none() {
			return Ok(None);
		}

		loop {
			if let Err(e) = self.process() {
				self.pending_packet = None;
				self.waiting_t0 = None;
				self.wait_state = WaitState::Idle;
				return Err(e);
			}

			match self.wait_state {
				WaitState::Satisfied => {
					self.wait_state = WaitState::Idle;
					return Ok(self.last_pending_packet.take());
				}
				WaitState::TimedOut => {
					self.wait_state = WaitState::Idle;
					return Ok(None);
				}
				_ => {}
			}

			// a stream that is gone can never satisfy the wait
			let alive = self.stream.as_ref().map(Stream::is_open).unwrap_or(false);
			if !alive && self.rx_queue.is_empty() {
				self.pending_packet = None;
				self.waiting_t0 = None;
				self.wait_state = WaitState::Idle;
				return Ok(None);
			}
		}
	}

	/// [`send`] followed by [`wait_packet`] if the send succeeded.
	///
	/// [`send`]: ParserGenerator::send
	/// [`wait_packet`]: ParserGenerator::wait_packet
	pub fn send_and_wait(
		&mut self,
		name: &str,
		args: ValueMap,
	) -> Result<Option<Packet>, Error> {
		self.send(name, args)?;
		self.wait_packet(None)
	}

	/// Handles pending data and deadline checks.
	///
	/// Polls the attached stream for new bytes, drains the receive queue
	/// through the state machine, then checks the incoming- and
	/// waiting-packet deadlines. A transport read failure closes the
	/// stream, releases any waiter, and is returned to the caller.
	pub fn process(&mut self) -> Result<(), Error> {
		if let Some(stream) = self.stream.as_mut() {
			if stream.is_open() {
				match stream.poll_rx() {
					Ok(data) => {
						if !data.is_empty() {
							self.rx_queue.extend(data.iter().copied());
						}
					}
					Err(e) => {
						warn!("read failed on {}: {}", stream.label(), e);
						stream.close();
						if self.wait_state == WaitState::Waiting {
							self.wait_state = WaitState::TimedOut;
						}
						return Err(e);
					}
				}
			}
		}

		while let Some(byte) = self.rx_queue.pop_front() {
			self.parse_byte(byte);
		}

		self.check_deadlines();
		Ok(())
	}

	fn check_deadlines(&mut self) {
		let now = self.clock.now();

		if let (Some(timeout), Some(t0)) = (self.incoming_packet_timeout, self.incoming_t0) {
			if now.duration_since(t0) >= timeout {
				debug!(
					"incoming packet timed out with {} byte(s) buffered",
					self.rx_buffer.len()
				);
				if let Some(cb) = self.on_incoming_packet_timeout.as_mut() {
					cb(&self.rx_buffer);
				}
				self.reset();
			}
		}

		if let (Some(timeout), Some(t0)) = (self.waiting_packet_timeout, self.waiting_t0) {
			if now.duration_since(t0) >= timeout {
				if let Some(name) = self.pending_packet.take() {
					debug!("gave up waiting for {}", name);
					if let Some(cb) = self.on_waiting_packet_timeout.as_mut() {
						cb(name);
					}
				}
				self.waiting_t0 = None;
				self.wait_state = WaitState::TimedOut;
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::clock::ManualClock;
	use crate::codec::{Field, FieldType, Value};
	use crate::generic;
	use crate::packet::PacketDef;
	use crate::stream::Detached;
	use std::cell::RefCell;
	use std::rc::Rc;

	// --- test transport ------------------------------------------------

	/// Scripted transport double: every `poll_rx` pops one queued chunk,
	/// and writes can be looped back through a responder function.
	struct MockStream {
		open: bool,
		written: Vec<Vec<u8>>,
		rx_chunks: VecDeque<Vec<u8>>,
		fail_write: bool,
		fail_read: bool,
		responder: Option<fn(&[u8]) -> Vec<u8>>,
	}

	impl MockStream {
		fn new() -> MockStream {
			MockStream {
				open: true,
				written: Vec::new(),
				rx_chunks: VecDeque::new(),
				fail_write: false,
				fail_read: false,
				responder: None,
			}
		}
	}

	impl Stream for MockStream {
		fn open(&mut self) -> Result<bool, Error> {
			self.open = true;
			Ok(true)
		}

		fn close(&mut self) {
			self.open = false;
		}

		fn write(&mut self, data: &[u8]) -> Result<usize, Error> {
			if self.fail_write {
				return Err(Error::Transport("write refused".into()));
			}
			self.written.push(data.to_vec());
			if let Some(respond) = self.responder {
				let reply = respond(data);
				if !reply.is_empty() {
					self.rx_chunks.push_back(reply);
				}
			}
			Ok(data.len())
		}

		fn poll_rx(&mut self) -> Result<Vec<u8>, Error> {
			if self.fail_read {
				return Err(Error::Transport("read failed".into()));
			}
			Ok(self.rx_chunks.pop_front().unwrap_or_default())
		}

		fn is_open(&self) -> bool {
			self.open
		}

		fn label(&self) -> &str {
			"mock"
		}
	}

	// --- test protocol with a command/response pair --------------------

	static PING_FIELDS: [Field; 2] = [
		Field::new("kind", FieldType::U8),
		Field::new("seq", FieldType::U8),
	];
	static PING: PacketDef = PacketDef {
		name: "ping",
		header_fields: &[],
		payload_fields: &PING_FIELDS,
		footer_fields: &[],
		response_required: Some("pong"),
	};
	static PONG: PacketDef = PacketDef::new("pong", &PING_FIELDS);

	fn pp_end_test(buffer: &[u8], _direction: Direction) -> ParseStatus {
		if buffer.len() == 2 {
			ParseStatus::Complete
		} else {
			ParseStatus::InProgress
		}
	}

	fn pp_from_buffer(buffer: &[u8], direction: Direction) -> Result<Packet, Error> {
		match buffer.first() {
			Some(0x01) => Packet::from_buffer(&PING, buffer, direction),
			Some(0x02) => Packet::from_buffer(&PONG, buffer, direction),
			other => Err(Error::BadPacket(format!("unknown kind {:?}", other))),
		}
	}

	fn pp_from_name_and_args(name: &str, mut args: ValueMap) -> Result<Packet, Error> {
		let (def, kind) = match name {
			"ping" => (&PING, 0x01),
			"pong" => (&PONG, 0x02),
			_ => return Err(Error::UnknownPacket(name.to_string())),
		};
		args.insert("kind", Value::U8(kind));
		Packet::from_payload(def, args, Direction::Tx)
	}

	fn ping_pong() -> Protocol {
		let mut protocol = Protocol::new(pp_from_buffer, pp_from_name_and_args);
		protocol.end_test = Some(pp_end_test);
		protocol.waiting_packet_timeout = Some(Duration::from_millis(250));
		protocol
	}

	fn pong_responder(data: &[u8]) -> Vec<u8> {
		// loop any ping back as a pong with the same sequence number
		if data.first() == Some(&0x01) {
			vec![0x02, data[1]]
		} else {
			Vec::new()
		}
	}

	// --- helpers -------------------------------------------------------

	type PacketLog = Rc<RefCell<Vec<Packet>>>;

	fn collect_packets<S: Stream>(pg: &mut ParserGenerator<S>) -> PacketLog {
		let log: PacketLog = Rc::new(RefCell::new(Vec::new()));
		let sink = log.clone();
		pg.on_rx_packet = Some(Box::new(move |packet| {
			sink.borrow_mut().push(packet.clone());
		}));
		log
	}

	fn detached(protocol: Protocol) -> ParserGenerator<Detached> {
		ParserGenerator::new(protocol)
	}

	// --- framing scenarios ---------------------------------------------

	#[test]
	fn test_tlv_contiguous() {
		let mut pg = detached(generic::tlv());
		let log = collect_packets(&mut pg);

		pg.parse(&[0x01, 0x05, 0x48, 0x65, 0x6C, 0x6C, 0x6F]);

		let log = log.borrow();
		assert_eq!(log.len(), 1);
		assert_eq!(log[0].get("type"), Some(&Value::U8(1)));
		assert_eq!(log[0].get("length"), Some(&Value::U8(5)));
		assert_eq!(log[0].get("value"), Some(&Value::from(&b"Hello"[..])));
	}

	#[test]
	fn test_ltv_dribbled_byte_by_byte() {
		let mut pg = detached(generic::ltv());
		let log = collect_packets(&mut pg);

		for &byte in &[0x06, 0x01, 0x48, 0x65, 0x6C, 0x6C, 0x6F] {
			pg.parse_byte(byte);
		}

		let log = log.borrow();
		assert_eq!(log.len(), 1);
		assert_eq!(log[0].get("length"), Some(&Value::U8(6)));
		assert_eq!(log[0].get("type"), Some(&Value::U8(1)));
		assert_eq!(log[0].get("value"), Some(&Value::from(&b"Hello"[..])));
	}

	#[test]
	fn test_text_line_with_backspaces() {
		let mut pg = detached(generic::text_line());
		let log = collect_packets(&mut pg);

		pg.parse(&[
			0x54, 0x45, 0x53, 0x54, 0x20, 0x45, 0x52, 0x52, 0x08, 0x08, 0x08, 0x43, 0x4D,
			0x44, 0x0A,
		]);

		let log = log.borrow();
		assert_eq!(log.len(), 1);
		assert_eq!(log[0].get("text"), Some(&Value::from("TEST CMD")));
	}

	#[test]
	fn test_two_tlv_packets_in_order() {
		let mut pg = detached(generic::tlv());
		let log = collect_packets(&mut pg);

		pg.parse(&[0x02, 0x05, 0x77, 0x6F, 0x72, 0x6C, 0x64]);
		pg.parse(&[0x03, 0x03, 0x54, 0x4C, 0x56]);

		let log = log.borrow();
		assert_eq!(log.len(), 2);
		assert_eq!(log[0].get("type"), Some(&Value::U8(2)));
		assert_eq!(log[0].get("value"), Some(&Value::from(&b"world"[..])));
		assert_eq!(log[1].get("type"), Some(&Value::U8(3)));
		assert_eq!(log[1].get("value"), Some(&Value::from(&b"TLV"[..])));
	}

	#[test]
	fn test_ltv_zero_length_junk_recovery() {
		let mut pg = detached(generic::ltv());
		let log = collect_packets(&mut pg);
		let errors: Rc<RefCell<Vec<Vec<u8>>>> = Rc::new(RefCell::new(Vec::new()));
		let error_sink = errors.clone();
		pg.on_rx_error = Some(Box::new(move |_e, buffer| {
			error_sink.borrow_mut().push(buffer.to_vec());
		}));

		pg.parse(&[0x00, 0x06, 0x01, 0x48, 0x65, 0x6C, 0x6C, 0x6F]);

		// the lone 0x00 frame is rejected, then the real packet parses
		assert_eq!(errors.borrow().len(), 1);
		assert_eq!(errors.borrow()[0], vec![0x00]);
		let log = log.borrow();
		assert_eq!(log.len(), 1);
		assert_eq!(log[0].get("length"), Some(&Value::U8(6)));
		assert_eq!(log[0].get("value"), Some(&Value::from(&b"Hello"[..])));
	}

	#[test]
	fn test_chunked_and_dribbled_parses_agree() {
		let data = [
			0x02, 0x05, 0x77, 0x6F, 0x72, 0x6C, 0x64, 0x03, 0x03, 0x54, 0x4C, 0x56, 0x01,
			0x00,
		];

		let mut chunked = detached(generic::tlv());
		let chunked_log = collect_packets(&mut chunked);
		chunked.parse(&data);

		let mut dribbled = detached(generic::tlv());
		let dribbled_log = collect_packets(&mut dribbled);
		for &byte in &data {
			dribbled.parse_byte(byte);
		}

		let chunked_log = chunked_log.borrow();
		let dribbled_log = dribbled_log.borrow();
		assert_eq!(chunked_log.len(), 3);
		assert_eq!(chunked_log.len(), dribbled_log.len());
		for (a, b) in chunked_log.iter().zip(dribbled_log.iter()) {
			assert_eq!(a.buffer, b.buffer);
			assert_eq!(a.payload, b.payload);
		}
	}

	#[test]
	fn test_backspace_on_empty_buffer_discards() {
		let mut pg = detached(generic::text_line());
		let log = collect_packets(&mut pg);

		pg.parse_byte(0x08);
		assert_eq!(pg.status(), ParseStatus::Idle);
		assert!(pg.rx_buffer().is_empty());

		pg.parse(b"ok\n");
		assert_eq!(log.borrow().len(), 1);
		assert_eq!(log.borrow()[0].get("text"), Some(&Value::from("ok")));
	}

	#[test]
	fn test_backspace_erases_exactly_one_byte() {
		let mut pg = detached(generic::text_line());
		pg.parse(b"abc");
		assert_eq!(pg.rx_buffer(), b"abc");
		pg.parse_byte(0x7F);
		assert_eq!(pg.rx_buffer(), b"ab");
	}

	#[test]
	fn test_junk_never_starts_a_packet() {
		fn must_lead_with_55(buffer: &[u8], _direction: Direction) -> ParseStatus {
			if buffer[0] == 0x55 {
				ParseStatus::InProgress
			} else {
				ParseStatus::Idle
			}
		}
		let mut protocol = generic::tlv();
		protocol.start_test = Some(must_lead_with_55);

		let mut pg = detached(protocol);
		let log = collect_packets(&mut pg);

		pg.parse(&[0x00, 0x13, 0x37, 0xFF]);
		assert_eq!(log.borrow().len(), 0);
		assert_eq!(pg.status(), ParseStatus::Idle);
		assert!(pg.rx_buffer().is_empty());
	}

	#[test]
	fn test_queue_is_deferred_until_process() {
		let mut pg = detached(generic::tlv());
		let log = collect_packets(&mut pg);

		pg.queue(&[0x01, 0x02, 0x68, 0x69]);
		assert_eq!(log.borrow().len(), 0);

		pg.process().unwrap();
		assert_eq!(log.borrow().len(), 1);
	}

	// --- deadlines ------------------------------------------------------

	#[test]
	fn test_incoming_packet_timeout() {
		let clock = Arc::new(ManualClock::new());
		let mut protocol = generic::tlv();
		protocol.incoming_packet_timeout = Some(Duration::from_millis(100));
		let mut pg: ParserGenerator<Detached> =
			ParserGenerator::with_clock(protocol, clock.clone());

		let partials: Rc<RefCell<Vec<Vec<u8>>>> = Rc::new(RefCell::new(Vec::new()));
		let sink = partials.clone();
		pg.on_incoming_packet_timeout = Some(Box::new(move |buffer| {
			sink.borrow_mut().push(buffer.to_vec());
		}));

		// half a packet, then silence
		pg.parse(&[0x01, 0x05, 0x48]);
		assert_eq!(pg.status(), ParseStatus::InProgress);

		pg.process().unwrap();
		assert_eq!(partials.borrow().len(), 0);

		clock.advance(Duration::from_millis(100));
		pg.process().unwrap();
		assert_eq!(partials.borrow().len(), 1);
		assert_eq!(partials.borrow()[0], vec![0x01, 0x05, 0x48]);
		assert_eq!(pg.status(), ParseStatus::Idle);
		assert!(pg.rx_buffer().is_empty());

		// the deadline is disarmed by the reset
		clock.advance(Duration::from_millis(500));
		pg.process().unwrap();
		assert_eq!(partials.borrow().len(), 1);
	}

	#[test]
	fn test_waiting_packet_timeout_releases_wait() {
		let clock = Arc::new(ManualClock::new());
		let mut pg = ParserGenerator::with_clock(ping_pong(), clock.clone());
		pg.attach_stream(MockStream::new());

		let timeouts: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
		let sink = timeouts.clone();
		pg.on_waiting_packet_timeout = Some(Box::new(move |name| {
			sink.borrow_mut().push(name.to_string());
		}));

		let mut args = ValueMap::new();
		args.insert("seq", Value::U8(1));
		pg.send("ping", args).unwrap();
		assert_eq!(pg.pending_packet(), Some("pong"));

		// no reply ever arrives; step past the deadline mid-wait
		clock.advance(Duration::from_millis(250));
		let result = pg.wait_packet(None).unwrap();
		assert!(result.is_none());
		assert_eq!(pg.pending_packet(), None);
		assert_eq!(timeouts.borrow().as_slice(), ["pong".to_string()]);
	}

	// --- rendezvous -----------------------------------------------------

	#[test]
	fn test_send_and_wait_round_trip() {
		let mut stream = MockStream::new();
		stream.responder = Some(pong_responder);
		let mut pg = ParserGenerator::with_stream(ping_pong(), stream);

		let mut args = ValueMap::new();
		args.insert("seq", Value::U8(7));
		let response = pg.send_and_wait("ping", args).unwrap();

		let response = response.expect("pong should arrive");
		assert_eq!(response.name(), "pong");
		assert_eq!(response.get("seq"), Some(&Value::U8(7)));
		assert_eq!(pg.pending_packet(), None);
	}

	#[test]
	fn test_named_wait_while_pending_is_busy() {
		let mut pg = ParserGenerator::with_stream(ping_pong(), MockStream::new());

		let mut args = ValueMap::new();
		args.insert("seq", Value::U8(1));
		pg.send("ping", args).unwrap();

		match pg.wait_packet(Some("other")) {
			Err(Error::Busy) => {}
			other => panic!("expected Busy, got {:?}", other),
		}
	}

	#[test]
	fn test_wait_with_nothing_pending_returns_none() {
		let mut pg = ParserGenerator::with_stream(ping_pong(), MockStream::new());
		assert!(pg.wait_packet(None).unwrap().is_none());
	}

	#[test]
	fn test_closed_stream_releases_wait() {
		let mut stream = MockStream::new();
		stream.open = false;
		let mut pg = ParserGenerator::with_stream(ping_pong(), stream);

		// no deadline involved: the dead stream alone releases the gate
		pg.waiting_packet_timeout = None;
		let result = pg.wait_packet(Some("pong")).unwrap();
		assert!(result.is_none());
		assert_eq!(pg.pending_packet(), None);
	}

	// --- failure semantics ----------------------------------------------

	#[test]
	fn test_write_failure_arms_no_deadline() {
		let mut stream = MockStream::new();
		stream.fail_write = true;
		let mut pg = ParserGenerator::with_stream(ping_pong(), stream);

		let mut args = ValueMap::new();
		args.insert("seq", Value::U8(1));
		match pg.send("ping", args) {
			Err(Error::Transport(_)) => {}
			other => panic!("expected Transport, got {:?}", other),
		}
		assert_eq!(pg.pending_packet(), None);
	}

	#[test]
	fn test_read_failure_closes_stream() {
		let mut stream = MockStream::new();
		stream.fail_read = true;
		let mut pg = ParserGenerator::with_stream(ping_pong(), stream);

		match pg.process() {
			Err(Error::Transport(_)) => {}
			other => panic!("expected Transport, got {:?}", other),
		}
		assert!(!pg.stream().unwrap().is_open());
	}

	#[test]
	fn test_send_without_stream_fails() {
		let mut pg: ParserGenerator<Detached> = ParserGenerator::new(ping_pong());
		let mut args = ValueMap::new();
		args.insert("seq", Value::U8(1));
		match pg.send("ping", args) {
			Err(Error::NoStream) => {}
			other => panic!("expected NoStream, got {:?}", other),
		}
	}

	#[test]
	fn test_generate_missing_field() {
		let pg: ParserGenerator<Detached> = ParserGenerator::new(ping_pong());
		match pg.generate("ping", ValueMap::new()) {
			Err(Error::MissingField("seq")) => {}
			other => panic!("expected MissingField, got {:?}", other),
		}
	}

	#[test]
	fn test_reset_preserves_rendezvous() {
		let mut pg = ParserGenerator::with_stream(ping_pong(), MockStream::new());

		let mut args = ValueMap::new();
		args.insert("seq", Value::U8(1));
		pg.send("ping", args).unwrap();
		pg.parse(&[0x02]); // half a pong
		pg.reset();

		assert!(pg.rx_buffer().is_empty());
		assert_eq!(pg.pending_packet(), Some("pong"));
	}
}

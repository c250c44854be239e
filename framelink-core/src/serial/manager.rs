use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::Error;
use crate::parser::ParserGenerator;
use crate::protocol::Protocol;
use crate::serial::{SerialDevice, SerialStream};
use crate::stream::Stream;

/// Which newly discovered devices get a stream opened automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoOpen {
	/// Report connections only; the application opens streams itself.
	None,
	/// Open a stream for one device at a time; the next device gets one
	/// once the current stream is gone.
	Single,
	/// Open a stream for every device that appears.
	All,
}

/// Source of the current device set. The only transport-specific part of
/// the manager; replaceable for tests.
pub type Enumerator = fn() -> Result<Vec<SerialDevice>, Error>;

fn serial_ports() -> Result<Vec<SerialDevice>, Error> {
	let ports = serialport::available_ports()?;
	Ok(ports
		.into_iter()
		.map(|info| SerialDevice::new(info.port_name.clone(), Some(info)))
		.collect())
}

/// Watches the host's serial ports and coordinates devices, streams, and
/// parser/generators.
///
/// `process()` must be called from the application's event loop. On the
/// configured interval it diffs the enumerated port set against the known
/// devices, firing connect/disconnect callbacks; every call it drives the
/// parser/generator of each open stream.
pub struct SerialManager {
	/// How often to re-enumerate devices.
	pub check_interval: Duration,
	pub auto_open: AutoOpen,
	/// Baud rate for auto-opened streams.
	pub baud_rate: u32,
	/// Protocol attached to auto-opened streams.
	pub protocol: Protocol,
	/// Devices failing this predicate are ignored entirely.
	pub device_filter: Option<fn(&SerialDevice) -> bool>,
	pub enumerator: Enumerator,

	pub on_connect_device: Option<Box<dyn FnMut(&SerialDevice)>>,
	pub on_disconnect_device: Option<Box<dyn FnMut(&SerialDevice)>>,
	/// Invoked once per auto-opened stream so the application can install
	/// its packet and error observers on the new parser/generator.
	pub on_attach_stream: Option<Box<dyn FnMut(&mut ParserGenerator<SerialStream>)>>,

	devices: HashMap<String, SerialDevice>,
	streams: HashMap<String, ParserGenerator<SerialStream>>,
	// ids skipped for one enumeration cycle after a mid-read failure, since
	// the platform may briefly keep listing a port that is already gone
	recently_disconnected: Vec<String>,
	clock: Arc<dyn Clock>,
	last_check: Option<Instant>,
}

impl SerialManager {
	pub fn new(protocol: Protocol) -> SerialManager {
		SerialManager::with_clock(protocol, Arc::new(SystemClock))
	}

	pub fn with_clock(protocol: Protocol, clock: Arc<dyn Clock>) -> SerialManager {
		SerialManager {
			check_interval: Duration::from_secs(1),
			auto_open: AutoOpen::None,
			baud_rate: 9600,
			protocol,
			device_filter: None,
			enumerator: serial_ports,
			on_connect_device: None,
			on_disconnect_device: None,
			on_attach_stream: None,
			devices: HashMap::new(),
			streams: HashMap::new(),
			recently_disconnected: Vec::new(),
			clock,
			last_check: None,
		}
	}

	pub fn devices(&self) -> impl Iterator<Item = &SerialDevice> {
		self.devices.values()
	}

	/// The parser/generator attached to a device's stream, if one is open.
	pub fn parser(&mut self, id: &str) -> Option<&mut ParserGenerator<SerialStream>> {
		self.streams.get_mut(id)
	}

	/// Handles device watching and stream processing.
	pub fn process(&mut self) {
		let now = self.clock.now();
		let due = self
			.last_check
			.map(|t| now.duration_since(t) >= self.check_interval)
			.unwrap_or(true);
		if due {
			self.last_check = Some(now);
			self.check_devices();
		}

		self.drive_streams();
	}

	fn check_devices(&mut self) {
		let current = match (self.enumerator)() {
			Ok(devices) => devices,
			Err(e) => {
				warn!("device enumeration failed: {}", e);
				return;
			}
		};

		// assume every known device is gone until the enumeration shows it
		let mut missing: Vec<String> = self.devices.keys().cloned().collect();

		for device in current {
			if self.recently_disconnected.contains(&device.id) {
				continue;
			}
			missing.retain(|id| id != &device.id);

			if let Some(filter) = self.device_filter {
				if !filter(&device) {
					continue;
				}
			}

			if !self.devices.contains_key(&device.id) {
				info!("device connected: {}", device.id);
				let id = device.id.clone();
				self.devices.insert(id.clone(), device);
				if let Some(cb) = self.on_connect_device.as_mut() {
					cb(&self.devices[&id]);
				}
				if self.should_open() {
					self.open_stream(&id);
				}
			}
		}

		self.recently_disconnected.clear();

		for id in missing {
			self.drop_device(&id);
		}
	}

	fn should_open(&self) -> bool {
		match self.auto_open {
			AutoOpen::None => false,
			AutoOpen::Single => self.streams.is_empty(),
			AutoOpen::All => true,
		}
	}

	fn open_stream(&mut self, id: &str) {
		let mut stream = SerialStream::new(id, self.baud_rate);
		match stream.open() {
			Ok(_) => {
				let mut pg = ParserGenerator::with_stream(self.protocol, stream);
				if let Some(setup) = self.on_attach_stream.as_mut() {
					setup(&mut pg);
				}
				self.streams.insert(id.to_string(), pg);
			}
			// the stream's own on_open_error hook has already fired
			Err(e) => warn!("could not auto-open {}: {}", id, e),
		}
	}

	fn drive_streams(&mut self) {
		let mut dead: Vec<String> = Vec::new();
		for (id, pg) in self.streams.iter_mut() {
			if let Err(e) = pg.process() {
				warn!("stream {} failed: {}", id, e);
				dead.push(id.clone());
			}
		}

		for id in dead {
			// skip this id for one cycle in case the platform still lists it
			self.recently_disconnected.push(id.clone());
			self.drop_device(&id);
		}
	}

	fn drop_device(&mut self, id: &str) {
		if let Some(mut pg) = self.streams.remove(id) {
			if let Some(stream) = pg.stream_mut() {
				stream.close();
			}
			debug!("stream {} torn down", id);
		}
		if let Some(device) = self.devices.remove(id) {
			info!("device disconnected: {}", device.id);
			if let Some(cb) = self.on_disconnect_device.as_mut() {
				cb(&device);
			}
		}
	}
}

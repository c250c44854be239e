use std::io::{Read, Write};
use std::time::Duration;

use log::{debug, warn};
use serialport::SerialPort;

use crate::error::Error;
use crate::stream::Stream;

/// A bidirectional byte stream over one serial port.
///
/// Reads are non-blocking: `poll_rx` drains whatever the driver has buffered
/// and returns immediately. The optional hooks fire on lifecycle and data
/// events; all of them may be left unset.
pub struct SerialStream {
	port_name: String,
	baud_rate: u32,
	port: Option<Box<dyn SerialPort>>,

	pub on_open: Option<Box<dyn FnMut(&str)>>,
	pub on_close: Option<Box<dyn FnMut(&str)>>,
	pub on_open_error: Option<Box<dyn FnMut(&str, &Error)>>,
	pub on_rx_data: Option<Box<dyn FnMut(&[u8])>>,
	pub on_tx_data: Option<Box<dyn FnMut(&[u8])>>,
}

impl SerialStream {
	pub fn new(port_name: impl Into<String>, baud_rate: u32) -> SerialStream {
		SerialStream {
			port_name: port_name.into(),
			baud_rate,
			port: None,
			on_open: None,
			on_close: None,
			on_open_error: None,
			on_rx_data: None,
			on_tx_data: None,
		}
	}

	pub fn port_name(&self) -> &str {
		&self.port_name
	}
}

impl Stream for SerialStream {
	fn open(&mut self) -> Result<bool, Error> {
		if self.port.is_some() {
			return Ok(true);
		}

		match serialport::new(self.port_name.as_str(), self.baud_rate)
			.timeout(Duration::from_millis(10))
			.open()
		{
			Ok(port) => {
				debug!("opened {} at {} baud", self.port_name, self.baud_rate);
				self.port = Some(port);
				if let Some(cb) = self.on_open.as_mut() {
					cb(&self.port_name);
				}
				Ok(true)
			}
			Err(e) => {
				let e = Error::from(e);
				warn!("failed to open {}: {}", self.port_name, e);
				if let Some(cb) = self.on_open_error.as_mut() {
					cb(&self.port_name, &e);
				}
				Err(e)
			}
		}
	}

	fn close(&mut self) {
		if self.port.take().is_some() {
			debug!("closed {}", self.port_name);
			if let Some(cb) = self.on_close.as_mut() {
				cb(&self.port_name);
			}
		}
	}

	fn write(&mut self, data: &[u8]) -> Result<usize, Error> {
		if let Some(cb) = self.on_tx_data.as_mut() {
			cb(data);
		}
		let port_name = self.port_name.clone();
		let port = self
			.port
			.as_mut()
			.ok_or_else(|| Error::Transport(format!("{} is not open", port_name)))?;
		let count = port.write(data)?;
		Ok(count)
	}

	fn poll_rx(&mut self) -> Result<Vec<u8>, Error> {
		let port = match self.port.as_mut() {
			Some(port) => port,
			None => return Ok(Vec::new()),
		};

		let available = port.bytes_to_read()? as usize;
		if available == 0 {
			return Ok(Vec::new());
		}

		let mut data = vec![0u8; available];
		port.read_exact(&mut data)?;

		if let Some(cb) = self.on_rx_data.as_mut() {
			cb(&data);
		}
		Ok(data)
	}

	fn is_open(&self) -> bool {
		self.port.is_some()
	}

	fn label(&self) -> &str {
		&self.port_name
	}
}

use std::fmt;

use serialport::SerialPortInfo;

/// A peripheral visible through the host's serial subsystem.
///
/// The id is the platform port path (`/dev/ttyUSB0`, `COM3`, ...), which is
/// the key the manager diffs on between enumeration cycles.
#[derive(Debug, Clone)]
pub struct SerialDevice {
	pub id: String,
	/// Port metadata from enumeration, when available.
	pub info: Option<SerialPortInfo>,
}

impl SerialDevice {
	pub fn new(id: impl Into<String>, info: Option<SerialPortInfo>) -> SerialDevice {
		SerialDevice {
			id: id.into(),
			info,
		}
	}
}

impl fmt::Display for SerialDevice {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", self.id)
	}
}

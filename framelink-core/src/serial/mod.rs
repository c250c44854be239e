//! Serial-port transport: concrete device, stream, and manager types built
//! on the `serialport` crate.

mod device;
mod manager;
mod stream;

pub use device::SerialDevice;
pub use manager::{AutoOpen, SerialManager};
pub use stream::SerialStream;

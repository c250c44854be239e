//! Watches every serial port on the host and prints each text line a
//! connected device sends.

use std::thread;
use std::time::Duration;

use anyhow::Result;
use framelink_core::serial::{AutoOpen, SerialManager};
use framelink_core::{generic, Value};

fn main() -> Result<()> {
	env_logger::init();

	let mut manager = SerialManager::new(generic::text_line());
	manager.auto_open = AutoOpen::All;
	manager.baud_rate = 115_200;

	manager.on_connect_device = Some(Box::new(|device| {
		println!("connected: {}", device);
	}));
	manager.on_disconnect_device = Some(Box::new(|device| {
		println!("disconnected: {}", device);
	}));
	manager.on_attach_stream = Some(Box::new(|pg| {
		pg.on_rx_packet = Some(Box::new(|packet| {
			if let Some(text) = packet.get("text").and_then(Value::as_bytes) {
				println!("line: {}", String::from_utf8_lossy(text));
			}
		}));
		pg.on_rx_error = Some(Box::new(|e, _buffer| {
			println!("parse error: {}", e);
		}));
	}));

	println!("watching serial ports, ctrl-c to quit");
	loop {
		manager.process();
		thread::sleep(Duration::from_millis(10));
	}
}

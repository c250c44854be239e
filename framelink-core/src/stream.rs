use crate::error::Error;

/// The byte-transport contract a [`ParserGenerator`](crate::ParserGenerator)
/// consumes.
///
/// Implementations wrap a concrete driver (a serial port, a socket, a test
/// double) behind four operations. Nothing here blocks: `poll_rx` returns
/// whatever is available right now, and the owning parser/generator calls it
/// from its `process()` step.
pub trait Stream {
	/// Acquires the underlying transport. Idempotent; returns `true` if the
	/// stream is open afterwards.
	fn open(&mut self) -> Result<bool, Error>;

	/// Releases the underlying transport. Idempotent.
	fn close(&mut self);

	/// Sends outbound bytes synchronously, returning the count written.
	fn write(&mut self, data: &[u8]) -> Result<usize, Error>;

	/// Returns any bytes currently available without blocking; empty if
	/// none. An `Err` means the transport has died and the stream must be
	/// torn down.
	fn poll_rx(&mut self) -> Result<Vec<u8>, Error>;

	fn is_open(&self) -> bool;

	/// Short human-readable identity for log messages.
	fn label(&self) -> &str {
		"stream"
	}
}

/// Null stream for parser/generators that are fed by hand.
///
/// `parse()` and `queue()` work as usual; `send()` fails with
/// [`Error::NoStream`] via the write path.
#[derive(Debug, Default)]
pub struct Detached;

impl Stream for Detached {
	fn open(&mut self) -> Result<bool, Error> {
		Ok(false)
	}

	fn close(&mut self) {}

	fn write(&mut self, _data: &[u8]) -> Result<usize, Error> {
		Err(Error::NoStream)
	}

	fn poll_rx(&mut self) -> Result<Vec<u8>, Error> {
		Ok(Vec::new())
	}

	fn is_open(&self) -> bool {
		false
	}

	fn label(&self) -> &str {
		"detached"
	}
}

use std::sync::{Arc, Mutex};
use std::time::Duration;

// `available` must block no longer than the configured per-byte
// timeout.
pub trait InputStream: Send {
    fn set_timeout(&mut self, timeout: Duration);
    fn available(&mut self) -> bool;
    fn read(&mut self) -> Option<u8>;
}

// `write` returns false on a permanent failure.
pub trait OutputStream: Send {
    fn write(&mut self, byte: u8) -> bool;
}

// One physical device usually backs both directions, so the two halves
// are handed around behind shared ownership.
pub type SharedInput = Arc<Mutex<dyn InputStream>>;
pub type SharedOutput = Arc<Mutex<dyn OutputStream>>;

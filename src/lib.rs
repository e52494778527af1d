//! Host-side client for the RomiSerial protocol: framed request/response
//! envelopes over a serial link to a microcontroller.

pub mod client;
pub mod command;
pub mod crc8;
pub mod envelope;
pub mod error;
#[cfg(unix)]
pub mod serial;
pub mod stream;

pub use client::RomiSerialClient;
pub use command::{format_command, Arg, CommandError};
pub use crc8::Crc8;
pub use envelope::EnvelopeParser;
pub use error::ErrorCode;
pub use stream::{InputStream, OutputStream, SharedInput, SharedOutput};

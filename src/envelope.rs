use std::borrow::Cow;

use crate::crc8::Crc8;
use crate::error::ErrorCode;

// Longest command accepted from a caller; the firmware's cap.
pub const MAX_MESSAGE_LENGTH: usize = 58;

// Larger than the firmware will ever send; anything beyond this is a
// corrupt frame.
pub const MAX_PAYLOAD_LENGTH: usize = 255;

pub fn is_valid_opcode(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'?'
}

// `#<payload>:<id><crc>\r\n`, with every `:` in the payload replaced by
// `-`. The CRC covers all preceding bytes, the id digits included.
pub fn encode_request(command: &str, id: u8) -> String {
    let mut request = String::with_capacity(command.len() + 8);
    request.push('#');
    for c in command.chars() {
        request.push(if c == ':' { '-' } else { c });
    }
    request.push(':');
    request.push_str(&format!("{:02x}", id));
    let crc = Crc8::compute(request.as_bytes());
    request.push_str(&format!("{:02x}", crc));
    request.push_str("\r\n");
    request
}

fn hex_digit(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum State {
    Idle,
    Payload,
    QuotedString,
    EscapedChar,
    IdHi,
    IdLo,
    CrcHi,
    CrcLo,
    ExpectCr,
    ExpectLf,
}

// `process` returns true once per completed, CRC-checked envelope. A
// malformed byte latches the error code naming the violated rule and
// drops the machine back to idle, where anything up to the next `#` is
// discarded as line noise.
pub struct EnvelopeParser {
    state: State,
    payload: [u8; MAX_PAYLOAD_LENGTH],
    length: usize,
    id: u8,
    crc: Crc8,
    sent_crc: u8,
    error: ErrorCode,
}

impl EnvelopeParser {
    pub fn new() -> Self {
        EnvelopeParser {
            state: State::Idle,
            payload: [0; MAX_PAYLOAD_LENGTH],
            length: 0,
            id: 0,
            crc: Crc8::new(),
            sent_crc: 0,
            error: ErrorCode::NoError,
        }
    }

    pub fn message(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload[..self.length])
    }

    // The region holding the application-level array; for responses
    // that is the whole payload.
    pub fn message_content(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.payload[..self.length])
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    // Latched by the last `process` call, cleared by the next one.
    pub fn error(&self) -> ErrorCode {
        self.error
    }

    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.length = 0;
        self.id = 0;
        self.crc = Crc8::new();
        self.sent_crc = 0;
        self.error = ErrorCode::NoError;
    }

    pub fn process(&mut self, c: u8) -> bool {
        self.error = ErrorCode::NoError;
        match self.state {
            State::Idle => {
                if c == b'#' {
                    self.begin();
                }
                false
            }
            State::Payload => {
                match c {
                    b':' => {
                        if self.length == 0 {
                            self.abort(ErrorCode::EnvelopeMissingMetadata);
                        } else {
                            self.crc.update(c);
                            self.state = State::IdHi;
                        }
                    }
                    b'\r' | b'\n' => self.abort(ErrorCode::EnvelopeMissingMetadata),
                    b'"' => {
                        if self.append(c) {
                            self.state = State::QuotedString;
                        }
                    }
                    _ => {
                        self.append(c);
                    }
                }
                false
            }
            State::QuotedString => {
                match c {
                    b'"' => {
                        if self.append(c) {
                            self.state = State::Payload;
                        }
                    }
                    b'\\' => {
                        if self.append(c) {
                            self.state = State::EscapedChar;
                        }
                    }
                    b'\r' | b'\n' => self.abort(ErrorCode::EnvelopeMissingMetadata),
                    _ => {
                        self.append(c);
                    }
                }
                false
            }
            State::EscapedChar => {
                if self.append(c) {
                    self.state = State::QuotedString;
                }
                false
            }
            State::IdHi => {
                match hex_digit(c) {
                    Some(value) => {
                        self.id = value << 4;
                        self.crc.update(c);
                        self.state = State::IdLo;
                    }
                    None => self.abort(ErrorCode::EnvelopeInvalidId),
                }
                false
            }
            State::IdLo => {
                match hex_digit(c) {
                    Some(value) => {
                        self.id |= value;
                        self.crc.update(c);
                        self.state = State::CrcHi;
                    }
                    None => self.abort(ErrorCode::EnvelopeInvalidId),
                }
                false
            }
            State::CrcHi => {
                match hex_digit(c) {
                    Some(value) => {
                        self.sent_crc = value << 4;
                        self.state = State::CrcLo;
                    }
                    None => self.abort(ErrorCode::EnvelopeInvalidCrc),
                }
                false
            }
            State::CrcLo => {
                match hex_digit(c) {
                    Some(value) => {
                        self.sent_crc |= value;
                        if self.sent_crc == self.crc.value() {
                            self.state = State::ExpectCr;
                        } else {
                            self.abort(ErrorCode::EnvelopeCrcMismatch);
                        }
                    }
                    None => self.abort(ErrorCode::EnvelopeInvalidCrc),
                }
                false
            }
            State::ExpectCr => {
                if c == b'\r' {
                    self.state = State::ExpectLf;
                } else {
                    self.abort(ErrorCode::EnvelopeExpectedEnd);
                }
                false
            }
            State::ExpectLf => {
                if c == b'\n' {
                    self.state = State::Idle;
                    true
                } else {
                    self.abort(ErrorCode::EnvelopeExpectedEnd);
                    false
                }
            }
        }
    }

    fn begin(&mut self) {
        self.length = 0;
        self.id = 0;
        self.sent_crc = 0;
        self.crc = Crc8::new();
        self.crc.update(b'#');
        self.state = State::Payload;
    }

    // The payload buffer keeps its content on abort so the caller can
    // log the offending frame.
    fn append(&mut self, c: u8) -> bool {
        if self.length < MAX_PAYLOAD_LENGTH {
            self.payload[self.length] = c;
            self.length += 1;
            self.crc.update(c);
            true
        } else {
            self.abort(ErrorCode::EnvelopeTooLong);
            false
        }
    }

    fn abort(&mut self, error: ErrorCode) {
        self.error = error;
        self.state = State::Idle;
    }
}

impl Default for EnvelopeParser {
    fn default() -> Self {
        EnvelopeParser::new()
    }
}

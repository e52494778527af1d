#[cfg(unix)]
use std::sync::Arc;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use json::JsonValue;
use log::{debug, warn};

use crate::command::{format_command, Arg};
use crate::envelope::{encode_request, is_valid_opcode, EnvelopeParser, MAX_MESSAGE_LENGTH};
use crate::error::{error_message, is_envelope_error, ErrorCode};
#[cfg(unix)]
use crate::serial::{Serial, DEFAULT_BAUD_RATE};
use crate::stream::{SharedInput, SharedOutput};

// Reading the complete response may take up to this long; the per-byte
// poll window below only keeps the read loop from blocking.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(2);
const BYTE_POLL_TIMEOUT: Duration = Duration::from_millis(100);

const SEND_ATTEMPTS: usize = 3;
const RETRY_DELAY: Duration = Duration::from_millis(10);

// `send` serializes callers, so a client can be shared across threads;
// at most one transaction is in flight per link.
pub struct RomiSerialClient {
    state: Mutex<ClientState>,
}

struct ClientState {
    input: SharedInput,
    output: SharedOutput,
    parser: EnvelopeParser,
    id: u8,
    debug: bool,
    timeout: Duration,
    client_name: String,
}

impl RomiSerialClient {
    pub fn new(
        input: SharedInput,
        output: SharedOutput,
        start_id: u8,
        client_name: &str,
    ) -> RomiSerialClient {
        input.lock().unwrap().set_timeout(BYTE_POLL_TIMEOUT);
        RomiSerialClient {
            state: Mutex::new(ClientState {
                input,
                output,
                parser: EnvelopeParser::new(),
                id: start_id,
                debug: false,
                timeout: RESPONSE_TIMEOUT,
                client_name: client_name.to_string(),
            }),
        }
    }

    #[cfg(unix)]
    pub fn create(device: &str, client_name: &str) -> anyhow::Result<RomiSerialClient> {
        let serial = Arc::new(Mutex::new(Serial::open(device, DEFAULT_BAUD_RATE, false)?));
        let input: SharedInput = serial.clone();
        let output: SharedOutput = serial;
        Ok(RomiSerialClient::new(
            input,
            output,
            RomiSerialClient::any_id(),
            client_name,
        ))
    }

    pub fn any_id() -> u8 {
        rand::random()
    }

    // One request/response transaction. Protocol failures never panic
    // and never return `Err`; the result is always `[code, ...]` with a
    // message as second element when the code is non-zero.
    pub fn send(&self, command: &str) -> JsonValue {
        let mut state = self.state.lock().unwrap();
        match state.make_request(command) {
            Ok(request) => state.try_sending_request(&request),
            Err(code) => state.make_error(code),
        }
    }

    // Typed front end for send: formats `opcode[args...]` and runs the
    // transaction. Formatting violations come back the same way as any
    // other client error.
    pub fn execute(&self, opcode: char, args: &[Arg]) -> JsonValue {
        match format_command(opcode, args) {
            Ok(command) => self.send(&command),
            Err(err) => self.state.lock().unwrap().make_error(err.code()),
        }
    }

    pub fn id(&self) -> u8 {
        self.state.lock().unwrap().id
    }

    pub fn set_debug(&self, value: bool) {
        self.state.lock().unwrap().debug = value;
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.state.lock().unwrap().timeout = timeout;
    }

    pub fn error_message(code: i32) -> &'static str {
        error_message(code)
    }
}

impl ClientState {
    fn make_request(&mut self, command: &str) -> Result<String, ErrorCode> {
        if command.is_empty() {
            return Err(ErrorCode::EmptyRequest);
        }
        if command.len() > MAX_MESSAGE_LENGTH {
            return Err(ErrorCode::ClientTooLong);
        }
        if !is_valid_opcode(command.as_bytes()[0]) {
            return Err(ErrorCode::InvalidOpcode);
        }
        self.id = self.id.wrapping_add(1);
        Ok(encode_request(command, self.id))
    }

    fn try_sending_request(&mut self, request: &str) -> JsonValue {
        let mut response = self.make_default_response();

        if self.debug {
            debug!(
                "RomiSerialClient<{}>: sending request: {:?}",
                self.client_name, request
            );
        }

        for _ in 0..SEND_ATTEMPTS {
            if self.send_request(request) {
                response = self.read_response();

                // Envelope-layer errors mean the request got mangled in
                // transit; resend it. The firmware intercepts duplicates
                // by id and answers kDuplicate if the original arrived
                // after all.
                let code = response[0].as_i32().unwrap_or(0);
                if !is_envelope_error(code) {
                    break;
                }
                if self.debug {
                    debug!(
                        "RomiSerialClient<{}>: re-sending request: {:?}",
                        self.client_name, request
                    );
                }
            }
            thread::sleep(RETRY_DELAY);
        }

        response
    }

    fn send_request(&mut self, request: &str) -> bool {
        let mut output = self.output.lock().unwrap();
        request.bytes().all(|c| output.write(c))
    }

    fn read_response(&mut self) -> JsonValue {
        let mut response = self.make_default_response();
        let start = Instant::now();
        let mut has_response = false;

        while !has_response {
            if let Some(c) = self.read_one_char() {
                let mut has_message = self.parser.process(c);

                if has_message {
                    has_message = self.filter_log_message();
                }

                if has_message {
                    if self.debug {
                        debug!(
                            "RomiSerialClient<{}>: response: {}",
                            self.client_name,
                            self.parser.message()
                        );
                    }

                    response = self.parse_response();

                    if self.parser.id() == self.id {
                        has_response = true;
                    } else if response[0].as_i32().unwrap_or(0) != 0 {
                        // The firmware may report an error before it has
                        // parsed the request id, so error responses are
                        // accepted with a stale id.
                        has_response = true;
                    } else {
                        warn!(
                            "RomiSerialClient<{}>: ID mismatch: request({}) != response({}): '{}'",
                            self.client_name,
                            self.id,
                            self.parser.id(),
                            self.parser.message()
                        );
                        self.parser.reset();
                    }
                } else if self.parser.error() != ErrorCode::NoError {
                    warn!(
                        "RomiSerialClient<{}>: invalid response: '{}'",
                        self.client_name,
                        self.parser.message()
                    );
                    response = self.make_error(self.parser.error());
                    has_response = true;
                }
            }

            if start.elapsed() > self.timeout {
                response = self.make_error(ErrorCode::ConnectionTimeout);
                has_response = true;
            }
        }

        response
    }

    // The expiry of the per-byte poll window is ignored; only the whole
    // response deadline ends the transaction.
    fn read_one_char(&mut self) -> Option<u8> {
        let mut input = self.input.lock().unwrap();
        if input.available() {
            input.read()
        } else {
            None
        }
    }

    fn filter_log_message(&self) -> bool {
        let message = self.parser.message();
        if self.parser.length() > 1 && message.starts_with('!') {
            if self.parser.length() > 2 {
                debug!(
                    "RomiSerialClient<{}>: firmware says: '{}'",
                    self.client_name,
                    &message[1..]
                );
            }
            false
        } else {
            true
        }
    }

    fn parse_response(&self) -> JsonValue {
        if self.parser.length() <= 1 {
            warn!(
                "RomiSerialClient<{}>: invalid response: no values: '{}'",
                self.client_name,
                self.parser.message()
            );
            return self.make_error(ErrorCode::EmptyResponse);
        }

        match json::parse(&self.parser.message_content()) {
            Ok(JsonValue::Array(values)) if !values.is_empty() && values[0].is_number() => {
                let code = values[0].as_i32().unwrap_or(0);
                if code != 0 {
                    self.check_error_response(values)
                } else {
                    JsonValue::Array(values)
                }
            }
            Ok(_) => {
                warn!(
                    "RomiSerialClient<{}>: invalid response: '{}'",
                    self.client_name,
                    self.parser.message()
                );
                self.make_error(ErrorCode::InvalidResponse)
            }
            Err(_) => {
                warn!(
                    "RomiSerialClient<{}>: unparsable response: '{}'",
                    self.client_name,
                    self.parser.message()
                );
                self.make_error(ErrorCode::InvalidJson)
            }
        }
    }

    // An error response must be [code] or [code, message]; a missing
    // message is filled in from the static table.
    fn check_error_response(&self, mut values: Vec<JsonValue>) -> JsonValue {
        let code = values[0].as_i32().unwrap_or(0);

        if self.debug {
            debug!(
                "RomiSerialClient<{}>: firmware returned error {} ({})",
                self.client_name,
                code,
                error_message(code)
            );
        }

        match values.len() {
            1 => {
                values.push(error_message(code).into());
                JsonValue::Array(values)
            }
            2 if values[1].is_string() => JsonValue::Array(values),
            _ => {
                warn!(
                    "RomiSerialClient<{}>: error response with invalid arguments: '{}'",
                    self.client_name,
                    self.parser.message()
                );
                self.make_error(ErrorCode::InvalidErrorResponse)
            }
        }
    }

    fn make_default_response(&self) -> JsonValue {
        json::array![
            ErrorCode::ConnectionTimeout.code(),
            ErrorCode::ConnectionTimeout.message()
        ]
    }

    fn make_error(&self, code: ErrorCode) -> JsonValue {
        if self.debug {
            debug!(
                "RomiSerialClient<{}>: make_error: {} ({})",
                self.client_name,
                code.code(),
                code.message()
            );
        }
        json::array![code.code(), code.message()]
    }
}

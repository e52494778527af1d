use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use romiserial::crc8::Crc8;
use romiserial::stream::{InputStream, OutputStream, SharedInput, SharedOutput};
use romiserial::{Arg, RomiSerialClient};

fn frame(payload: &str, id: u8) -> String {
    let mut text = format!("#{}:{:02x}", payload, id);
    let crc = Crc8::compute(text.as_bytes());
    text.push_str(&format!("{:02x}\r\n", crc));
    text
}

// Replays a fixed byte sequence, then reports nothing available.
struct ScriptedInput {
    data: Vec<u8>,
    position: usize,
}

impl ScriptedInput {
    fn new(data: &str) -> ScriptedInput {
        ScriptedInput {
            data: data.as_bytes().to_vec(),
            position: 0,
        }
    }
}

impl InputStream for ScriptedInput {
    fn set_timeout(&mut self, _timeout: Duration) {}

    fn available(&mut self) -> bool {
        if self.position < self.data.len() {
            true
        } else {
            // Stand in for the per-byte poll window of a quiet link.
            thread::sleep(Duration::from_millis(1));
            false
        }
    }

    fn read(&mut self) -> Option<u8> {
        let byte = self.data.get(self.position).copied();
        self.position += 1;
        byte
    }
}

#[derive(Default)]
struct RecordingOutput {
    bytes: Vec<u8>,
}

impl OutputStream for RecordingOutput {
    fn write(&mut self, byte: u8) -> bool {
        self.bytes.push(byte);
        true
    }
}

#[derive(Default)]
struct FailingOutput {
    attempts: usize,
}

impl OutputStream for FailingOutput {
    fn write(&mut self, _byte: u8) -> bool {
        self.attempts += 1;
        false
    }
}

fn make_client(script: &str, start_id: u8) -> (RomiSerialClient, Arc<Mutex<RecordingOutput>>) {
    let input: SharedInput = Arc::new(Mutex::new(ScriptedInput::new(script)));
    let output = Arc::new(Mutex::new(RecordingOutput::default()));
    let shared_output: SharedOutput = output.clone();
    let client = RomiSerialClient::new(input, shared_output, start_id, "test");
    (client, output)
}

fn sent_text(output: &Arc<Mutex<RecordingOutput>>) -> String {
    String::from_utf8(output.lock().unwrap().bytes.clone()).unwrap()
}

fn transmissions(output: &Arc<Mutex<RecordingOutput>>) -> usize {
    output.lock().unwrap().bytes.iter().filter(|&&c| c == b'#').count()
}

#[test]
fn happy_path() {
    let (client, output) = make_client(&frame("[0]", 0x40), 0x3f);
    let response = client.send("A");
    assert_eq!(response.dump(), "[0]");
    assert!(sent_text(&output).starts_with("#A:40"));
    assert_eq!(transmissions(&output), 1);
}

#[test]
fn emits_reference_envelope() {
    let (client, output) = make_client(&frame("[0]", 0x00), 0xff);
    let response = client.send("e[0]");
    assert_eq!(response.dump(), "[0]");
    assert_eq!(sent_text(&output), "#e[0]:0092\r\n");
    assert_eq!(client.id(), 0x00);
}

#[test]
fn application_error_passes_through() {
    let (client, _) = make_client(&frame("[5,\"out of range\"]", 0x40), 0x3f);
    let response = client.send("A");
    assert_eq!(response.dump(), "[5,\"out of range\"]");
}

#[test]
fn application_error_without_message_gets_default() {
    let (client, _) = make_client(&frame("[9]", 0x40), 0x3f);
    let response = client.send("A");
    assert_eq!(response.dump(), "[9,\"Application error\"]");
}

#[test]
fn corrupted_envelope_is_retried() {
    // A frame whose payload was damaged after the CRC was computed,
    // followed by a clean one.
    let mut script = frame("[0]", 0x40).replacen("[0]", "[1]", 1);
    script.push_str(&frame("[0]", 0x40));

    let (client, output) = make_client(&script, 0x3f);
    let response = client.send("A");
    assert_eq!(response.dump(), "[0]");
    assert_eq!(transmissions(&output), 2);
}

#[test]
fn log_lines_are_filtered() {
    let mut script = frame("!boot ok", 0x40);
    script.push_str(&frame("[0]", 0x40));

    let (client, output) = make_client(&script, 0x3f);
    let response = client.send("A");
    assert_eq!(response.dump(), "[0]");
    assert_eq!(transmissions(&output), 1);
}

#[test]
fn mismatched_id_is_dropped() {
    let mut script = frame("[0]", 0xff);
    script.push_str(&frame("[0,123]", 0x41));

    let (client, _) = make_client(&script, 0x40);
    let response = client.send("A");
    assert_eq!(response.dump(), "[0,123]");
}

#[test]
fn stale_id_is_accepted_for_errors() {
    // The firmware reports kDuplicate before it has echoed the id.
    let (client, output) = make_client(&frame("[-15]", 0xff), 0x40);
    let response = client.send("A");
    assert_eq!(response.dump(), "[-15,\"Duplicate message\"]");
    assert_eq!(transmissions(&output), 1);
}

#[test]
fn silence_times_out() {
    let (client, output) = make_client("", 0x3f);
    client.set_timeout(Duration::from_millis(100));

    let start = Instant::now();
    let response = client.send("A");
    let elapsed = start.elapsed();

    assert_eq!(response.dump(), "[-23,\"The connection timed out\"]");
    assert_eq!(transmissions(&output), 1);
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_secs(1));
}

#[test]
fn unwritable_output_exhausts_attempts() {
    let input: SharedInput = Arc::new(Mutex::new(ScriptedInput::new("")));
    let output = Arc::new(Mutex::new(FailingOutput::default()));
    let shared_output: SharedOutput = output.clone();
    let client = RomiSerialClient::new(input, shared_output, 0x3f, "test");

    let response = client.send("A");
    assert_eq!(response.dump(), "[-23,\"The connection timed out\"]");
    assert_eq!(output.lock().unwrap().attempts, 3);
}

#[test]
fn execute_formats_and_sends() {
    let (client, output) = make_client(&frame("[0]", 0x40), 0x3f);
    let args = [Arg::from(1), Arg::from("x")];
    let response = client.execute('e', &args);
    assert_eq!(response.dump(), "[0]");
    assert!(sent_text(&output).starts_with("#e[1,\"x\"]:40"));
}

#[test]
fn execute_rejects_bad_commands_without_transmission() {
    let (client, output) = make_client("", 0x3f);

    assert_eq!(client.execute('%', &[])[0].as_i32(), Some(-14));
    let strings = [Arg::from("a"), Arg::from("b")];
    assert_eq!(client.execute('e', &strings)[0].as_i32(), Some(-13));
    let many: Vec<Arg> = (0..13).map(Arg::from).collect();
    assert_eq!(client.execute('e', &many)[0].as_i32(), Some(-9));
    assert!(output.lock().unwrap().bytes.is_empty());
}

#[test]
fn build_errors_are_reported_without_transmission() {
    let (client, output) = make_client("", 0x3f);

    assert_eq!(client.send("")[0].as_i32(), Some(-24));
    assert_eq!(client.send(&"x".repeat(59))[0].as_i32(), Some(-22));
    assert_eq!(client.send("!x")[0].as_i32(), Some(-14));
    assert!(output.lock().unwrap().bytes.is_empty());
}

#[test]
fn malformed_payloads_are_rejected() {
    let cases = [
        ("[\"x\"]", -27), // first element not a number
        ("[]", -27),      // no elements at all
        ("[0", -26),      // not JSON
        ("[5,7]", -28),   // error message not a string
        ("0", -25),       // no array
    ];
    for (payload, code) in cases {
        let (client, _) = make_client(&frame(payload, 0x40), 0x3f);
        let response = client.send("A");
        assert_eq!(response[0].as_i32(), Some(code), "payload {:?}", payload);
        assert!(response[1].is_string());
    }
}

#[test]
fn concurrent_sends_do_not_interleave() {
    let (client, output) = make_client("", 0x10);
    client.set_timeout(Duration::from_millis(50));
    let client = Arc::new(client);

    let a = {
        let client = client.clone();
        thread::spawn(move || {
            client.send("a");
        })
    };
    let b = {
        let client = client.clone();
        thread::spawn(move || {
            client.send("b");
        })
    };
    a.join().unwrap();
    b.join().unwrap();

    let sent = sent_text(&output);
    let frames: Vec<&str> = sent.split_terminator("\r\n").collect();
    assert_eq!(frames.len(), 2);
    for sent_frame in &frames {
        assert_eq!(sent_frame.len(), 7, "torn frame: {:?}", sent_frame);
        assert!(
            sent_frame.starts_with("#a:") || sent_frame.starts_with("#b:"),
            "torn frame: {:?}",
            sent_frame
        );
    }
    assert_ne!(frames[0][1..2], frames[1][1..2]);
}

use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, error, warn};
use nix::poll::{poll, PollFd, PollFlags};
use nix::sys::termios::{self, ControlFlags, FlushArg, SetArg, SpecialCharacterIndices};
use serialport::{DataBits, FlowControl, Parity, StopBits, TTYPort};

use crate::stream::{InputStream, OutputStream};

pub const DEFAULT_BAUD_RATE: u32 = 115200;

static STANDARD_BAUD_RATES: &[u32] = &[9600, 19200, 38400, 57600, 115200, 230400, 460800];

// Opening the port resets the microcontroller; give its bootloader time
// to hand the serial link back to the application.
const SETTLE_DELAY: Duration = Duration::from_secs(3);

// With `reset` set, HUPCL is enabled so that closing the port resets
// the board.
pub struct Serial {
    port: TTYPort,
    device: String,
    timeout_ms: i32,
}

impl Serial {
    pub fn open(device: &str, baudrate: u32, reset: bool) -> Result<Serial> {
        if !STANDARD_BAUD_RATES.contains(&baudrate) {
            warn!(
                "open_serial: unusual baudrate {} on {}; standard rates are {:?}. Trying anyway.",
                baudrate, device, STANDARD_BAUD_RATES
            );
        }

        let port = serialport::new(device, baudrate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open_native()
            .with_context(|| format!("failed to open serial device {}", device))?;

        // Leave the port alone until the board has finished resetting.
        thread::sleep(SETTLE_DELAY);

        configure_termios(&port, reset)
            .with_context(|| format!("failed to configure serial device {}", device))?;

        debug!("open_serial OK: {} @ {} baud", device, baudrate);
        Ok(Serial {
            port,
            device: device.to_string(),
            timeout_ms: 100,
        })
    }
}

fn configure_termios(port: &TTYPort, reset: bool) -> Result<()> {
    let fd = port.as_raw_fd();
    let mut tty = termios::tcgetattr(fd)?;

    tty.control_flags.insert(ControlFlags::CLOCAL | ControlFlags::CREAD);
    tty.control_flags.remove(ControlFlags::HUPCL);
    if reset {
        tty.control_flags.insert(ControlFlags::HUPCL);
    }

    // Blocking single-byte reads; timing is handled by poll().
    tty.control_chars[SpecialCharacterIndices::VMIN as usize] = 1;
    tty.control_chars[SpecialCharacterIndices::VTIME as usize] = 0;

    termios::tcflush(fd, FlushArg::TCIOFLUSH)?;
    termios::tcsetattr(fd, SetArg::TCSANOW, &tty)?;
    Ok(())
}

impl InputStream for Serial {
    fn set_timeout(&mut self, timeout: Duration) {
        self.timeout_ms = timeout.as_millis() as i32;
    }

    fn available(&mut self) -> bool {
        let mut fds = [PollFd::new(self.port.as_raw_fd(), PollFlags::POLLIN)];
        match poll(&mut fds, self.timeout_ms) {
            Ok(n) if n > 0 => fds[0]
                .revents()
                .map_or(false, |revents| revents.contains(PollFlags::POLLIN)),
            Ok(_) => false,
            Err(err) => {
                error!("poll failed on {}: {}", self.device, err);
                false
            }
        }
    }

    fn read(&mut self) -> Option<u8> {
        let mut byte = [0u8; 1];
        match self.port.read(&mut byte) {
            Ok(1) => Some(byte[0]),
            Ok(_) => None,
            Err(err) => {
                error!("read failed on {}: {}", self.device, err);
                None
            }
        }
    }
}

impl OutputStream for Serial {
    fn write(&mut self, byte: u8) -> bool {
        match self.port.write(&[byte]) {
            Ok(1) => true,
            Ok(_) => false,
            Err(err) => {
                error!("write failed on {}: {}", self.device, err);
                false
            }
        }
    }
}

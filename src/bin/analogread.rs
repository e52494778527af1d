use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use log::error;
use romiserial::RomiSerialClient;

/// Poll the firmware's analog input once a second.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Serial device of the firmware
    device: String,

    /// Enable debug output
    #[clap(long, short)]
    debug: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(if cli.debug {
        "debug"
    } else {
        "info"
    }))
    .format_timestamp(None)
    .format_target(false)
    .init();

    let client = RomiSerialClient::create(&cli.device, "analogread")?;
    client.set_debug(cli.debug);

    loop {
        let response = client.execute('A', &[]);
        if response[0].as_i32() == Some(0) {
            println!("Sensor value: {}", response[1]);
        } else {
            error!("analogread failed: {} ({})", response[0], response[1]);
        }
        thread::sleep(Duration::from_secs(1));
    }
}

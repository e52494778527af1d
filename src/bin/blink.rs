use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use romiserial::RomiSerialClient;

/// Blink the firmware's LED once a second.
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

    let client = RomiSerialClient::create(&cli.device, "blink")?;
    client.set_debug(cli.debug);

    loop {
        client.send("L[1]");
        thread::sleep(Duration::from_millis(1000));
        client.send("L[0]");
        thread::sleep(Duration::from_millis(1000));
    }
}

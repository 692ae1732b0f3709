//! Facts and show commands
//!
//! Connects to one device, prints its facts and runs a few show commands,
//! structuring the output with the built-in TextFSM templates.
//!
//! # Usage
//!
//! Explicit parameters:
//! ```bash
//! cargo run --example show_facts -- --platform cisco_ios_ssh --host 192.0.2.10 \
//!     --user ntc --password ntc123 "show version" "show ip interface brief"
//! ```
//!
//! From the host registry (`$NETAUTO_CONF` or `~/.netauto.toml`):
//! ```bash
//! cargo run --example show_facts -- --ntc-host csr1 "show version"
//! ```

use std::env;
use std::sync::Arc;

use netauto::ops::{self, ShowRequest};
use netauto::{ConnectionArgs, Device, DeviceSpec, OutputParser};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (args, commands) = parse_args();
    let spec = DeviceSpec::resolve(&args, None)?;
    println!("Connecting to {} ({})...", spec.label(), spec.platform);

    let parser = Arc::new(OutputParser::builtin().clone());
    let mut device = Device::new(spec).with_parser(parser);

    let facts = ops::facts(&mut device).await;
    println!("{}", serde_json::to_string_pretty(&facts)?);

    if !commands.is_empty() {
        let report = ops::show(&mut device, &ShowRequest::new(commands)).await;
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

/// Flags become connection arguments; everything else is a command.
fn parse_args() -> (ConnectionArgs, Vec<String>) {
    let mut args = ConnectionArgs::default();
    let mut commands = Vec::new();
    let mut argv = env::args().skip(1);

    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--platform" => args.platform = argv.next(),
            "--host" => args.host = argv.next(),
            "--port" => args.port = argv.next().and_then(|p| p.parse().ok()),
            "--user" => args.username = argv.next(),
            "--password" => args.password = argv.next(),
            "--secret" => args.secret = argv.next(),
            "--ntc-host" => args.ntc_host = argv.next(),
            "--help" => {
                println!(
                    "usage: show_facts [--platform P --host H --user U --password P] \
                     [--ntc-host NAME] [COMMAND...]"
                );
                std::process::exit(0);
            }
            _ => commands.push(arg),
        }
    }
    (args, commands)
}

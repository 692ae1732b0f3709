//! Offline TextFSM parsing
//!
//! Parses previously captured command output without touching a device.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example textfsm_parsing -- show_version.txt "show version" cisco_nxos
//! cargo run --example textfsm_parsing -- out.txt "show ip int brief" cisco_ios --index ./templates/index
//! ```

use std::env;
use std::path::{Path, PathBuf};

use netauto::OutputParser;
use netauto::ops;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut positional = Vec::new();
    let mut index = None;
    let mut argv = env::args().skip(1);
    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--index" => index = argv.next().map(PathBuf::from),
            _ => positional.push(arg),
        }
    }

    let [raw_file, command, platform] = positional.as_slice() else {
        eprintln!("usage: textfsm_parsing RAW_FILE COMMAND PLATFORM [--index PATH]");
        std::process::exit(1);
    };

    let loaded;
    let parser = match index {
        Some(path) => {
            loaded = OutputParser::load(&path)?;
            &loaded
        }
        None => OutputParser::builtin(),
    };

    let parsed = ops::parse_offline(parser, Path::new(raw_file), command, platform, None).await?;
    if parsed.is_raw() {
        eprintln!("No template matched '{command}' on {platform}, showing raw output");
    }
    println!("{}", serde_json::to_string_pretty(&parsed)?);
    Ok(())
}

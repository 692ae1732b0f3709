//! OS install
//!
//! Sets the boot image (or installs it, with `--reboot`) and waits for the
//! device to come back, printing the operation report.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example install_os -- --ntc-host n9k1 --image nxos.9.3.6.bin --reboot
//! cargo run --example install_os -- --ntc-host bigip1 --image BIGIP-13.1.0.iso --volume HD1.2
//! ```
//!
//! Add `--check` to only report whether anything would change.

use std::env;

use netauto::ops::{self, InstallOptions};
use netauto::{ConnectionArgs, Device, DeviceSpec, InstallRequest};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = ConnectionArgs::default();
    let mut image = None;
    let mut kickstart = None;
    let mut volume = None;
    let mut reboot = false;
    let mut options = InstallOptions::default();

    let mut argv = env::args().skip(1);
    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "--platform" => args.platform = argv.next(),
            "--host" => args.host = argv.next(),
            "--user" => args.username = argv.next(),
            "--password" => args.password = argv.next(),
            "--ntc-host" => args.ntc_host = argv.next(),
            "--image" => image = argv.next(),
            "--kickstart" => kickstart = argv.next(),
            "--volume" => volume = argv.next(),
            "--reboot" => reboot = true,
            "--check" => options.check_mode = true,
            other => eprintln!("Unknown argument: {other}"),
        }
    }

    let Some(image) = image else {
        eprintln!("Error: --image is required");
        std::process::exit(1);
    };
    let mut request = InstallRequest::new(image)
        .with_kickstart(kickstart.as_deref())
        .with_reboot(reboot);
    if let Some(volume) = volume {
        request = request.with_volume(volume);
    }

    let mut device = Device::new(DeviceSpec::resolve(&args, None)?);
    let report = ops::install_os(&mut device, &request, &options).await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

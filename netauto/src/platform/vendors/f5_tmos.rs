//! F5 BIG-IP (TMOS) over iControl REST.
//!
//! Commands run through the `util/bash` endpoint, so everything here is a
//! shell command line, usually a `tmsh` invocation. Software lives on
//! volumes (`HD1.1`, `HD1.2`); an install targets an inactive volume and a
//! reboot into that volume activates it.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use regex::Regex;
use tokio::time::{Instant, sleep};

use super::{
    capture, field, md5_or_missing, optional_output, parse_rows, tolerate_disconnect,
    uptime_string,
};
use crate::device::{BootState, Facts, InstallEffect, InstallRequest, RebootOptions};
use crate::error::{CommandError, ConnectionError, Error, Result};
use crate::parse::ParsedRow;
use crate::platform::{Platform, Vendor};
use crate::transport::Transport;

const SOFTWARE_STATUS: &str = "tmsh show sys software status";
const SHOW_VERSION: &str = "tmsh show sys version";
const INSTALL_POLL_INTERVAL: Duration = Duration::from_secs(10);
const INSTALL_TIMEOUT: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Copy, Default)]
pub struct F5Tmos;

/// ISO name of the software described by one status row.
fn image_name(row: &ParsedRow) -> String {
    let text = |name: &str| {
        row.get(name)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };
    format!(
        "{}-{}-{}.iso",
        text("product").replace('-', ""),
        text("version"),
        text("build")
    )
}

fn row_field<'r>(row: &'r ParsedRow, name: &str) -> &'r str {
    row.get(name).and_then(|v| v.as_str()).unwrap_or_default()
}

/// All first capture groups of `pattern` in `text`.
fn captures_all(pattern: &str, text: &str) -> Vec<String> {
    match Regex::new(pattern) {
        Ok(re) => re
            .captures_iter(text)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect(),
        Err(_) => Vec::new(),
    }
}

impl F5Tmos {
    async fn software_status(&self, transport: &mut dyn Transport) -> Result<Vec<ParsedRow>> {
        let output = transport.send_command(SOFTWARE_STATUS, None).await?;
        parse_rows(self.platform(), SOFTWARE_STATUS, &output)
    }

    /// Wait until the software on `volume` reports `complete`.
    async fn wait_for_volume(&self, transport: &mut dyn Transport, volume: &str) -> Result<()> {
        let deadline = Instant::now() + INSTALL_TIMEOUT;
        loop {
            let rows = self.software_status(transport).await?;
            let status = rows
                .iter()
                .find(|row| row_field(row, "volume") == volume)
                .map(|row| row_field(row, "status").to_string())
                .unwrap_or_default();
            debug!("volume {} status: {:?}", volume, status);

            if status == "complete" {
                return Ok(());
            }
            if status.contains("failed") {
                return Err(CommandError::Failed {
                    command: SOFTWARE_STATUS.into(),
                    message: format!("installation on {volume} {status}"),
                }
                .into());
            }
            if Instant::now() >= deadline {
                return Err(ConnectionError::Timeout(INSTALL_TIMEOUT).into());
            }
            sleep(INSTALL_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl Vendor for F5Tmos {
    fn platform(&self) -> Platform {
        Platform::F5TmosIcontrol
    }

    fn default_file_system(&self) -> &'static str {
        "/shared/images/"
    }

    async fn facts(&self, transport: &mut dyn Transport) -> Result<Facts> {
        let output = transport.send_command(SHOW_VERSION, None).await?;
        let rows = parse_rows(self.platform(), SHOW_VERSION, &output)?;

        let settings =
            optional_output(transport, "tmsh list sys global-settings hostname").await?;
        let fqdn = capture(r"(?m)^\s*hostname\s+(\S+)", &settings).unwrap_or_default();
        let hostname = fqdn.split('.').next().unwrap_or_default().to_string();

        let hardware = optional_output(transport, "tmsh show sys hardware").await?;
        let uptime = optional_output(transport, "cat /proc/uptime")
            .await?
            .split_whitespace()
            .next()
            .and_then(|secs| secs.parse::<f64>().ok())
            .map(|secs| secs as u64);

        let interfaces = optional_output(transport, "tmsh list net interface").await?;
        let vlans = optional_output(transport, "tmsh list net vlan").await?;

        Ok(Facts {
            hostname,
            fqdn,
            vendor: "f5".into(),
            model: capture(r"(?m)^\s*Name\s+(.+?)\s*$", &hardware).unwrap_or_default(),
            os_version: field(&rows, "version"),
            serial_number: capture(r"(?m)^\s*Chassis Serial\s+(\S+)", &hardware)
                .unwrap_or_default(),
            uptime,
            uptime_string: uptime.map(uptime_string).unwrap_or_default(),
            interfaces: captures_all(r"(?m)^net interface (\S+)", &interfaces),
            vlans: captures_all(r"(?m)^net vlan (\S+)", &vlans),
        })
    }

    async fn get_boot_options(&self, transport: &mut dyn Transport) -> Result<BootState> {
        let rows = self.software_status(transport).await?;
        let Some(active) = rows.iter().find(|row| row_field(row, "active") == "yes") else {
            return Err(CommandError::UnexpectedOutput {
                command: SOFTWARE_STATUS.into(),
                output: "no active volume".into(),
            }
            .into());
        };
        let state = BootState::new(image_name(active)).with_active_volume(row_field(active, "volume"));
        Ok(rows
            .iter()
            .filter(|row| row_field(row, "status") == "complete")
            .fold(state, |state, row| {
                state.with_volume_image(row_field(row, "volume"), image_name(row))
            }))
    }

    /// The image must be completely installed on the requested volume. A
    /// request that reboots also needs that volume to be the active one.
    fn is_installed(&self, current: &BootState, request: &InstallRequest) -> bool {
        let Some(volume) = request.volume.as_deref() else {
            return current.satisfies(&request.desired());
        };
        current.has_image_on(volume, &request.system_image)
            && (!request.reboot || current.active_volume.as_deref() == Some(volume))
    }

    async fn install_os(
        &self,
        transport: &mut dyn Transport,
        request: &InstallRequest,
    ) -> Result<InstallEffect> {
        let Some(volume) = request.volume.as_deref() else {
            return Err(Error::option("volume is required on f5_tmos_icontrol"));
        };

        let path = self.remote_path(self.default_file_system(), &request.system_image);
        let listing = transport
            .send_command(&format!("ls {}", self.default_file_system()), None)
            .await?;
        if !listing.lines().any(|line| line.trim() == request.system_image) {
            return Err(CommandError::Failed {
                command: format!("ls {}", self.default_file_system()),
                message: format!("{path} not found"),
            }
            .into());
        }

        let command = format!(
            "tmsh install sys software image {} volume {} create-volume",
            request.system_image, volume
        );
        transport.send_command(&command, None).await?;
        info!("installing {} on {}", request.system_image, volume);
        self.wait_for_volume(transport, volume).await?;
        Ok(InstallEffect::default())
    }

    async fn reboot(&self, transport: &mut dyn Transport, options: &RebootOptions) -> Result<()> {
        let command = match &options.volume {
            Some(volume) => format!("tmsh reboot volume {volume}"),
            None => "tmsh reboot".to_string(),
        };
        tolerate_disconnect(transport.send_command(&command, None).await)
    }

    async fn save_config(&self, transport: &mut dyn Transport, remote: Option<&str>) -> Result<bool> {
        let command = match remote {
            Some(name) => format!("tmsh save sys ucs {name}"),
            None => "tmsh save sys config".to_string(),
        };
        let output = transport.send_command(&command, None).await?;
        Ok(!output.contains("Error"))
    }

    async fn running_config(&self, transport: &mut dyn Transport) -> Result<String> {
        transport
            .send_command("tmsh show running-config", None)
            .await
    }

    async fn remote_md5(&self, transport: &mut dyn Transport, path: &str) -> Result<Option<String>> {
        md5_or_missing(transport.send_command(&format!("md5sum {path}"), None).await)
    }
}

//! Arista EOS over eAPI.
//!
//! eAPI runs every request from privileged mode and returns the CLI text
//! when asked for the `text` format, so the built-in templates apply.

use std::time::Duration;

use async_trait::async_trait;
use log::info;

use super::{
    capture, check_output, field, file_name, md5_or_missing, optional_column, optional_output,
    parse_rows, tolerate_disconnect, uptime_seconds, uptime_string,
};
use crate::device::{BootState, Facts, InstallEffect, InstallRequest, RebootOptions};
use crate::error::{CommandError, Result};
use crate::platform::{Platform, Vendor};
use crate::transport::Transport;

const SHOW_VERSION: &str = "show version";
const ERROR_MARKERS: &[&str] = &["% Error", "%Error", "% Invalid"];
const LONG_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, Default)]
pub struct AristaEos;

#[async_trait]
impl Vendor for AristaEos {
    fn platform(&self) -> Platform {
        Platform::AristaEosEapi
    }

    fn default_file_system(&self) -> &'static str {
        "flash:"
    }

    async fn facts(&self, transport: &mut dyn Transport) -> Result<Facts> {
        let output = transport.send_command(SHOW_VERSION, None).await?;
        let rows = parse_rows(self.platform(), SHOW_VERSION, &output)?;
        let uptime = uptime_seconds(&field(&rows, "uptime"));

        let names = optional_output(transport, "show hostname").await?;
        let hostname = capture(r"(?m)^Hostname:\s*(\S+)", &names).unwrap_or_default();
        let fqdn = capture(r"(?m)^FQDN:\s*(\S+)", &names).unwrap_or_else(|| hostname.clone());

        Ok(Facts {
            hostname,
            fqdn,
            vendor: "arista".into(),
            model: field(&rows, "model"),
            os_version: field(&rows, "image"),
            serial_number: field(&rows, "serial_number"),
            uptime,
            uptime_string: uptime.map(uptime_string).unwrap_or_default(),
            interfaces: optional_column(
                transport,
                self.platform(),
                "show interfaces description",
                "interface",
            )
            .await?,
            vlans: optional_column(transport, self.platform(), "show vlan", "vlan_id").await?,
        })
    }

    async fn get_boot_options(&self, transport: &mut dyn Transport) -> Result<BootState> {
        let output = transport.send_command("show boot-config", None).await?;
        match capture(r"(?mi)^software image:\s*(\S+)", &output) {
            Some(image) => Ok(BootState::new(file_name(&image))),
            None => Err(CommandError::UnexpectedOutput {
                command: "show boot-config".into(),
                output,
            }
            .into()),
        }
    }

    async fn set_boot_options(
        &self,
        transport: &mut dyn Transport,
        image: &str,
        _kickstart: Option<&str>,
    ) -> Result<()> {
        let fs = self.default_file_system();
        let listing = transport.send_command(&format!("dir {fs}"), None).await?;
        if !listing.contains(image) {
            return Err(CommandError::Failed {
                command: format!("dir {fs}"),
                message: format!("{image} not found on {fs}"),
            }
            .into());
        }

        self.configure(transport, &[format!("boot system {fs}{image}")])
            .await?;
        self.save_config(transport, None).await?;
        info!("boot image set to {}{}", fs, image);
        Ok(())
    }

    async fn install_os(
        &self,
        transport: &mut dyn Transport,
        request: &InstallRequest,
    ) -> Result<InstallEffect> {
        self.set_boot_options(transport, &request.system_image, None)
            .await?;
        if request.reboot {
            self.reboot(transport, &RebootOptions::confirmed()).await?;
        }
        Ok(InstallEffect {
            reboots: request.reboot,
            ..Default::default()
        })
    }

    async fn reboot(&self, transport: &mut dyn Transport, _options: &RebootOptions) -> Result<()> {
        tolerate_disconnect(transport.send_command("reload now", None).await)
    }

    async fn checkpoint(&self, transport: &mut dyn Transport, name: &str) -> Result<()> {
        let command = format!("copy running-config {}{}", self.default_file_system(), name);
        let output = transport.send_command(&command, Some(LONG_TIMEOUT)).await?;
        check_output(&command, output, ERROR_MARKERS).map(|_| ())
    }

    async fn rollback(&self, transport: &mut dyn Transport, name: &str) -> Result<()> {
        let command = format!("configure replace {}{}", self.default_file_system(), name);
        let output = transport.send_command(&command, Some(LONG_TIMEOUT)).await?;
        check_output(&command, output, ERROR_MARKERS).map(|_| ())
    }

    async fn save_config(&self, transport: &mut dyn Transport, remote: Option<&str>) -> Result<bool> {
        let command = match remote {
            Some(name) => format!("copy running-config {}{}", self.default_file_system(), name),
            None => "copy running-config startup-config".to_string(),
        };
        let output = transport.send_command(&command, Some(LONG_TIMEOUT)).await?;
        Ok(!ERROR_MARKERS.iter().any(|m| output.contains(m)))
    }

    async fn running_config(&self, transport: &mut dyn Transport) -> Result<String> {
        transport
            .send_command("show running-config", Some(LONG_TIMEOUT))
            .await
    }

    async fn remote_md5(&self, transport: &mut dyn Transport, path: &str) -> Result<Option<String>> {
        md5_or_missing(
            transport
                .send_command(&format!("verify /md5 {path}"), Some(LONG_TIMEOUT))
                .await,
        )
    }
}

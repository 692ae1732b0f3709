//! Cisco ASA firewalls over SSH.
//!
//! Same privilege ladder as IOS. Paths on the flash device need a `/`
//! after the file system (`disk0:/asa.bin`), and `/noconfirm` keeps copy
//! commands from prompting.

use std::time::Duration;

use async_trait::async_trait;
use log::info;

use super::{
    capture, check_output, field, file_name, level, md5_or_missing, optional_column,
    optional_output, parse_rows, tolerate_disconnect, uptime_seconds, uptime_string,
};
use crate::device::{BootState, Facts, InstallEffect, InstallRequest, RebootOptions};
use crate::error::{CommandError, Result};
use crate::platform::{Platform, PlatformDefinition, Vendor};
use crate::transport::Transport;

const SHOW_VERSION: &str = "show version";
const ERROR_MARKERS: &[&str] = &["ERROR:", "%Error"];
const LONG_TIMEOUT: Duration = Duration::from_secs(300);

/// Create the Cisco ASA platform definition.
pub fn definition() -> Result<PlatformDefinition> {
    let exec = level("exec", r"(?mi)^[\w.\-@()/: ]{1,63}>\s?$")?;
    let privilege_exec = level("privilege_exec", r"(?mi)^[\w.\-@()/: ]{1,63}#\s?$")?
        .with_parent("exec")
        .with_escalate("enable")
        .with_deescalate("disable")
        .with_auth(r"(?mi)^password:\s?$")
        .map_err(CommandError::InvalidPattern)?
        .with_not_contains("(config");
    let configuration = level(
        "configuration",
        r"(?mi)^[\w.\-@()/: ]{1,63}\(config[\w.\-@/:+]{0,63}\)#\s?$",
    )?
    .with_parent("privilege_exec")
    .with_escalate("configure terminal")
    .with_deescalate("end");

    Ok(PlatformDefinition::new("cisco_asa")
        .with_privilege(exec)
        .with_privilege(privilege_exec)
        .with_privilege(configuration)
        .with_default_privilege("privilege_exec")
        .with_failure_pattern("% Invalid input detected")
        .with_failure_pattern("% Incomplete command")
        .with_failure_pattern("ERROR: % ")
        .with_on_open_command("terminal pager 0"))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CiscoAsa;

#[async_trait]
impl Vendor for CiscoAsa {
    fn platform(&self) -> Platform {
        Platform::CiscoAsaSsh
    }

    fn default_file_system(&self) -> &'static str {
        "disk0:"
    }

    fn remote_path(&self, file_system: &str, file: &str) -> String {
        format!("{file_system}/{file}")
    }

    async fn facts(&self, transport: &mut dyn Transport) -> Result<Facts> {
        let output = transport.send_command(SHOW_VERSION, None).await?;
        let rows = parse_rows(self.platform(), SHOW_VERSION, &output)?;
        let hostname = field(&rows, "hostname");
        let uptime = uptime_seconds(&field(&rows, "uptime"));

        let domain = optional_output(transport, "show running-config domain-name").await?;
        let fqdn = match capture(r"(?m)^domain-name (\S+)", &domain) {
            Some(domain) => format!("{hostname}.{domain}"),
            None => hostname.clone(),
        };

        Ok(Facts {
            fqdn,
            vendor: "cisco".into(),
            model: field(&rows, "hardware"),
            os_version: field(&rows, "version"),
            serial_number: field(&rows, "serial"),
            uptime,
            uptime_string: uptime.map(uptime_string).unwrap_or_default(),
            interfaces: optional_column(
                transport,
                self.platform(),
                "show interface ip brief",
                "intf",
            )
            .await?,
            vlans: Vec::new(),
            hostname,
        })
    }

    async fn get_boot_options(&self, transport: &mut dyn Transport) -> Result<BootState> {
        let boot = optional_output(transport, "show running-config boot").await?;
        if let Some(image) = capture(r"(?m)^boot system (\S+)", &boot) {
            return Ok(BootState::new(file_name(&image)));
        }

        let version = transport.send_command(SHOW_VERSION, None).await?;
        let image = field(&parse_rows(self.platform(), SHOW_VERSION, &version)?, "image");
        if image.is_empty() {
            return Err(CommandError::UnexpectedOutput {
                command: SHOW_VERSION.into(),
                output: version,
            }
            .into());
        }
        Ok(BootState::new(file_name(&image)))
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

        let lines = vec![
            "clear configure boot system".to_string(),
            format!("boot system {}", self.remote_path(fs, image)),
        ];
        self.configure(transport, &lines).await?;
        self.save_config(transport, None).await?;
        info!("boot image set to {}", self.remote_path(fs, image));
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
        tolerate_disconnect(transport.send_command("reload noconfirm", None).await)
    }

    async fn checkpoint(&self, transport: &mut dyn Transport, name: &str) -> Result<()> {
        let path = self.remote_path(self.default_file_system(), name);
        let command = format!("copy /noconfirm running-config {path}");
        let output = transport.send_command(&command, Some(LONG_TIMEOUT)).await?;
        check_output(&command, output, ERROR_MARKERS).map(|_| ())
    }

    async fn rollback(&self, transport: &mut dyn Transport, name: &str) -> Result<()> {
        let path = self.remote_path(self.default_file_system(), name);
        let command = format!("copy /noconfirm {path} running-config");
        let output = transport.send_command(&command, Some(LONG_TIMEOUT)).await?;
        check_output(&command, output, ERROR_MARKERS).map(|_| ())
    }

    async fn save_config(&self, transport: &mut dyn Transport, remote: Option<&str>) -> Result<bool> {
        let command = match remote {
            Some(name) => format!(
                "copy /noconfirm running-config {}",
                self.remote_path(self.default_file_system(), name)
            ),
            None => "write memory".to_string(),
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

//! Cisco IOS and IOS-XE.
//!
//! Managed over SSH, or Telnet where SSH is unavailable. Privilege levels:
//! - `exec` - User EXEC mode with `>` prompt
//! - `privilege_exec` - Privileged EXEC mode with `#` prompt
//! - `configuration` - Configuration mode with `(config*)#` prompt
//!
//! # Prompt Examples
//!
//! ```text
//! csr1>                      # exec mode
//! csr1#                      # privilege_exec mode
//! csr1(config)#              # configuration mode
//! csr1(config-if)#           # config sub-mode (interface)
//! ```
//!
//! # Privilege Graph
//!
//! ```text
//! ┌──────┐  enable     ┌────────────────┐  configure terminal  ┌───────────────┐
//! │ exec ├──────────────► privilege_exec ├──────────────────────► configuration │
//! │  >   │   disable   │       #        │        end           │  (config*)#   │
//! └──────┘◄────────────┴────────────────┘◄─────────────────────┴───────────────┘
//! ```

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};

use super::{
    capture, check_output, field, file_name, level, md5_or_missing, optional_column,
    optional_output, parse_rows, run_dialog, tolerate_disconnect, uptime_seconds, uptime_string,
};
use crate::device::{BootState, Facts, InstallEffect, InstallRequest, RebootOptions};
use crate::error::{CommandError, Result};
use crate::platform::{Platform, PlatformDefinition, Vendor};
use crate::transport::Transport;

/// Any IOS prompt, used to end interactive dialogs.
const PROMPT: &str = r"(?m)^[\w.\-@()/: ]{1,63}[>#]\s?$";
const SAVE_QUESTION: &str = r"(?i)save\?\s*\[yes/no\]:?\s*$";
const CONFIRM: &str = r"(?i)\[confirm\]\s*$";
const DESTINATION: &str = r"(?i)destination filename \[[^\]]*\]\?\s*$";
const ERROR_MARKERS: &[&str] = &["%Error", "% Error", "Rollback aborted"];

const DIALOG_TIMEOUT: Duration = Duration::from_secs(30);
const LONG_TIMEOUT: Duration = Duration::from_secs(300);
const SHOW_VERSION: &str = "show version";

/// Create the Cisco IOS platform definition.
pub fn definition() -> Result<PlatformDefinition> {
    let exec = level("exec", r"(?mi)^[\w.\-@()/: ]{1,63}>\s?$")?;

    // not_contains "(config" keeps configuration prompts out of this level
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

    Ok(PlatformDefinition::new("cisco_ios")
        .with_privilege(exec)
        .with_privilege(privilege_exec)
        .with_privilege(configuration)
        .with_default_privilege("privilege_exec")
        .with_failure_pattern("% Ambiguous command")
        .with_failure_pattern("% Incomplete command")
        .with_failure_pattern("% Invalid input detected")
        .with_failure_pattern("% Unknown command")
        .with_on_open_command("terminal length 0")
        .with_on_open_command("terminal width 511"))
}

/// Cisco IOS vendor.
#[derive(Debug, Clone, Copy, Default)]
pub struct CiscoIos;

#[async_trait]
impl Vendor for CiscoIos {
    fn platform(&self) -> Platform {
        Platform::CiscoIosSsh
    }

    fn default_file_system(&self) -> &'static str {
        "flash:"
    }

    async fn facts(&self, transport: &mut dyn Transport) -> Result<Facts> {
        let output = transport.send_command(SHOW_VERSION, None).await?;
        let rows = parse_rows(self.platform(), SHOW_VERSION, &output)?;
        let hostname = field(&rows, "hostname");
        let uptime = uptime_seconds(&field(&rows, "uptime"));

        let domain = optional_output(transport, "show running-config | include ^ip domain").await?;
        let fqdn = match capture(r"(?m)^ip domain[ -]name (\S+)", &domain) {
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
                "show ip interface brief",
                "intf",
            )
            .await?,
            vlans: optional_column(transport, self.platform(), "show vlan brief", "vlan_id")
                .await?,
            hostname,
        })
    }

    async fn get_boot_options(&self, transport: &mut dyn Transport) -> Result<BootState> {
        let boot = optional_output(transport, "show running-config | include ^boot system").await?;
        if let Some(image) = capture(r"(?m)^boot\s+system\s+(?:flash\s+)?(\S+)", &boot) {
            return Ok(BootState::new(file_name(&image)));
        }

        let version = transport.send_command(SHOW_VERSION, None).await?;
        match capture(r#"(?i)system image file is "([^"]+)""#, &version) {
            Some(image) => Ok(BootState::new(file_name(&image))),
            None => Err(CommandError::UnexpectedOutput {
                command: SHOW_VERSION.into(),
                output: version,
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
        let file_system = self.default_file_system();
        let listing = transport
            .send_command(&format!("dir {file_system}"), None)
            .await?;
        if !listing.contains(image) {
            return Err(CommandError::Failed {
                command: format!("dir {file_system}"),
                message: format!("{image} not found on {file_system}"),
            }
            .into());
        }

        let lines = vec![
            "no boot system".to_string(),
            format!("boot system {file_system}{image}"),
        ];
        self.configure(transport, &lines).await?;
        self.save_config(transport, None).await?;

        let current = self.get_boot_options(transport).await?;
        if current.system_image != image {
            return Err(CommandError::UnexpectedOutput {
                command: lines[1].clone(),
                output: format!("boot image is still {}", current.system_image),
            }
            .into());
        }
        info!("boot image set to {}{}", file_system, image);
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

    async fn reboot(&self, transport: &mut dyn Transport, options: &RebootOptions) -> Result<()> {
        let command = match options.timer {
            Some(minutes) => format!("reload in {minutes}"),
            None => "reload".to_string(),
        };
        let answers = [(SAVE_QUESTION, "no"), (CONFIRM, "")];
        let result = run_dialog(transport, &command, PROMPT, &answers, DIALOG_TIMEOUT).await;
        match options.timer {
            // A scheduled reload returns to the prompt.
            Some(_) => result.map(|_| ()),
            None => tolerate_disconnect(result),
        }
    }

    async fn checkpoint(&self, transport: &mut dyn Transport, name: &str) -> Result<()> {
        let command = format!("copy running-config {}{}", self.default_file_system(), name);
        let answers = [(DESTINATION, ""), (CONFIRM, "")];
        let output = run_dialog(transport, &command, PROMPT, &answers, DIALOG_TIMEOUT).await?;
        check_output(&command, output, ERROR_MARKERS).map(|_| ())
    }

    async fn rollback(&self, transport: &mut dyn Transport, name: &str) -> Result<()> {
        let command = format!(
            "configure replace {}{} force",
            self.default_file_system(),
            name
        );
        let output = transport.send_command(&command, Some(LONG_TIMEOUT)).await?;
        check_output(&command, output, ERROR_MARKERS).map(|_| ())
    }

    async fn save_config(&self, transport: &mut dyn Transport, remote: Option<&str>) -> Result<bool> {
        let target = match remote {
            Some(name) => format!("{}{}", self.default_file_system(), name),
            None => "startup-config".to_string(),
        };
        let command = format!("copy running-config {target}");
        let answers = [(DESTINATION, ""), (CONFIRM, "")];
        let output = run_dialog(transport, &command, PROMPT, &answers, DIALOG_TIMEOUT).await?;
        debug!("{}: {}", command, output.trim());
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

//! Cisco AireOS wireless LAN controllers.
//!
//! The controller accepts the SSH login and then asks for credentials again
//! inside the shell. There is a single prompt, and `config ...` commands are
//! issued from it directly.
//!
//! ```text
//! (Cisco Controller) >
//! (wlc1) >
//! ```

use std::time::Duration;

use async_trait::async_trait;
use log::info;

use super::{
    capture, column, field, level, optional_output, parse_rows, run_dialog, tolerate_disconnect,
    uptime_seconds, uptime_string,
};
use crate::device::{BootState, Facts, InstallEffect, InstallRequest, RebootOptions};
use crate::error::{CommandError, Result};
use crate::platform::{Platform, PlatformDefinition, Vendor};
use crate::transport::Transport;

const PROMPT: &str = r"(?m)^\([\w .\-]{1,63}\)\s?>\s?$";
const SAVE_QUESTION: &str = r"(?i)save them now\?\s*\(y/n\)\s*$";
const RESET_QUESTION: &str = r"(?i)reset the system\?\s*\(y/n\)\s*$";
const CONFIRM_SAVE: &str = r"(?i)want to save\?\s*\(y/n\)\s*$";
const DIALOG_TIMEOUT: Duration = Duration::from_secs(60);

/// Create the Cisco AireOS platform definition.
pub fn definition() -> Result<PlatformDefinition> {
    Ok(PlatformDefinition::new("cisco_aireos")
        .with_privilege(level("exec", PROMPT)?)
        .with_default_privilege("exec")
        .with_configuration_privilege("exec")
        .with_failure_pattern("Incorrect usage")
        .with_failure_pattern("Incorrect input")
        .with_failure_pattern("Request failed")
        .with_on_open_command("config paging disable")
        .with_in_band_login())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CiscoAireos;

/// Primary and backup images from `show boot`, and which one boots by default.
#[derive(Debug, Default, PartialEq, Eq)]
struct BootImages {
    primary: Option<String>,
    backup: Option<String>,
    default: Option<String>,
}

fn parse_show_boot(output: &str) -> BootImages {
    let mut images = BootImages::default();
    for line in output.lines() {
        let Some(image) = capture(r"\.{2,}\s*(\S+)", line) else {
            continue;
        };
        let is_default = line.contains("(default)");
        if line.trim_start().starts_with("Primary") {
            images.primary = Some(image.clone());
        } else if line.trim_start().starts_with("Backup") {
            images.backup = Some(image.clone());
        } else {
            continue;
        }
        if is_default {
            images.default = Some(image);
        }
    }
    images
}

#[async_trait]
impl Vendor for CiscoAireos {
    fn platform(&self) -> Platform {
        Platform::CiscoAireosSsh
    }

    fn default_file_system(&self) -> &'static str {
        ""
    }

    async fn facts(&self, transport: &mut dyn Transport) -> Result<Facts> {
        let output = transport.send_command("show sysinfo", None).await?;
        let rows = parse_rows(self.platform(), "show sysinfo", &output)?;
        let hostname = field(&rows, "system_name");
        let uptime = uptime_seconds(&field(&rows, "system_up_time"));

        let inventory = optional_output(transport, "show inventory").await?;
        let interfaces = optional_output(transport, "show interface summary").await?;
        let interfaces = parse_rows(self.platform(), "show interface summary", &interfaces)
            .map(|rows| column(&rows, "interface_name"))
            .unwrap_or_default();

        Ok(Facts {
            fqdn: hostname.clone(),
            vendor: "cisco".into(),
            model: capture(r"PID:\s*([^,\s]+)", &inventory).unwrap_or_default(),
            os_version: field(&rows, "product_version"),
            serial_number: capture(r"SN:\s*(\S+)", &inventory).unwrap_or_default(),
            uptime,
            uptime_string: uptime.map(uptime_string).unwrap_or_default(),
            interfaces,
            vlans: Vec::new(),
            hostname,
        })
    }

    async fn get_boot_options(&self, transport: &mut dyn Transport) -> Result<BootState> {
        let output = transport.send_command("show boot", None).await?;
        match parse_show_boot(&output).default {
            Some(image) => Ok(BootState::new(image)),
            None => Err(CommandError::UnexpectedOutput {
                command: "show boot".into(),
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
        let images = parse_show_boot(&transport.send_command("show boot", None).await?);
        let slot = if images.primary.as_deref() == Some(image) {
            "primary"
        } else if images.backup.as_deref() == Some(image) {
            "backup"
        } else {
            return Err(CommandError::Failed {
                command: "show boot".into(),
                message: format!("{image} is neither the primary nor the backup image"),
            }
            .into());
        };

        self.configure(transport, &[format!("config boot {slot}")])
            .await?;
        self.save_config(transport, None).await?;
        info!("{} boot image {} selected", slot, image);
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
        let answers = [(SAVE_QUESTION, "n"), (RESET_QUESTION, "y")];
        tolerate_disconnect(
            run_dialog(transport, "reset system", PROMPT, &answers, DIALOG_TIMEOUT).await,
        )
    }

    async fn save_config(&self, transport: &mut dyn Transport, remote: Option<&str>) -> Result<bool> {
        if remote.is_some() {
            return Err(self.unsupported("save_config to a remote file"));
        }
        let output = run_dialog(
            transport,
            "save config",
            PROMPT,
            &[(CONFIRM_SAVE, "y")],
            DIALOG_TIMEOUT,
        )
        .await?;
        Ok(output.contains("Configuration Saved"))
    }

    async fn running_config(&self, transport: &mut dyn Transport) -> Result<String> {
        transport
            .send_command("show run-config commands", Some(Duration::from_secs(120)))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConnectionError, Error};
    use crate::testing::MockTransport;

    const SHOW_BOOT: &str = "\
Primary Boot Image............................... 8.5.110.0 (default) (active)
Backup Boot Image................................ 8.2.170.0
";

    const SHOW_SYSINFO: &str = "\
Manufacturer's Name.............................. Cisco Systems Inc.
Product Name..................................... Cisco Controller
Product Version.................................. 8.5.110.0
System Name...................................... wlc1
System Up Time................................... 3 days 2 hrs 10 mins 42 secs
";

    #[test]
    fn test_parse_show_boot() {
        assert_eq!(
            parse_show_boot(SHOW_BOOT),
            BootImages {
                primary: Some("8.5.110.0".into()),
                backup: Some("8.2.170.0".into()),
                default: Some("8.5.110.0".into()),
            }
        );
    }

    #[test]
    fn test_definition_has_in_band_login() {
        let definition = definition().unwrap();
        assert!(definition.in_band_login);
        assert_eq!(definition.configuration_privilege, "exec");
        assert!(
            definition
                .get_privilege("exec")
                .unwrap()
                .pattern
                .is_match(b"(Cisco Controller) >")
        );
    }

    #[tokio::test]
    async fn test_facts() {
        let (mut transport, _log) = MockTransport::new(|cmd| match cmd {
            "show sysinfo" => Ok(SHOW_SYSINFO.into()),
            "show inventory" => Ok("NAME: \"Chassis\"  , DESCR: \"Cisco 5520 Wireless Controller\"\n\
                PID: AIR-CT5520-K9,  VID: V01,  SN: FCH2130V0AB\n"
                .into()),
            "show interface summary" => Ok("\
Interface Name                   Port Vlan Id  IP Address      Type    Ap Mgr Guest
-------------------------------- ---- -------- --------------- ------- ------ -----
management                       1    untagged 10.1.1.10       Static  Yes    No
virtual                          N/A  N/A      192.0.2.1       Static  No     No
"
            .into()),
            _ => Ok(String::new()),
        });
        let facts = CiscoAireos.facts(&mut transport).await.unwrap();
        assert_eq!(facts.hostname, "wlc1");
        assert_eq!(facts.os_version, "8.5.110.0");
        assert_eq!(facts.model, "AIR-CT5520-K9");
        assert_eq!(facts.serial_number, "FCH2130V0AB");
        assert_eq!(facts.uptime, Some(3 * 86_400 + 2 * 3_600 + 10 * 60 + 42));
        assert_eq!(facts.interfaces, vec!["management", "virtual"]);
    }

    #[tokio::test]
    async fn test_set_boot_options_picks_backup_slot() {
        let (mut transport, log) = MockTransport::new(|input| match input {
            "show boot" => Ok(SHOW_BOOT.into()),
            "save config" => Ok("Are you sure you want to save? (y/n) ".into()),
            "y" => Ok("Configuration Saved!\n(Cisco Controller) >".into()),
            _ => Ok(String::new()),
        });
        CiscoAireos
            .set_boot_options(&mut transport, "8.2.170.0", None)
            .await
            .unwrap();
        assert_eq!(log.configs(), vec![vec!["config boot backup".to_string()]]);
        assert_eq!(log.interactive(), vec!["save config", "y"]);
    }

    #[tokio::test]
    async fn test_set_boot_options_unknown_image() {
        let (mut transport, log) = MockTransport::new(|_| Ok(SHOW_BOOT.into()));
        assert!(
            CiscoAireos
                .set_boot_options(&mut transport, "8.10.1.0", None)
                .await
                .is_err()
        );
        assert!(log.configs().is_empty());
    }

    #[tokio::test]
    async fn test_reset_system_dialog() {
        let (mut transport, log) = MockTransport::new(|input| match input {
            "reset system" => Ok("The system has unsaved changes.\nWould you like to save them now? (y/N) ".into()),
            "n" => Ok("Configuration Not Saved!\nAre you sure you would like to reset the system? (y/N) ".into()),
            _ => Err(ConnectionError::Disconnected.into()),
        });
        CiscoAireos
            .reboot(&mut transport, &RebootOptions::confirmed())
            .await
            .unwrap();
        assert_eq!(log.interactive(), vec!["reset system", "n", "y"]);
    }

    #[tokio::test]
    async fn test_remote_save_and_rollback_unsupported() {
        let (mut transport, _log) = MockTransport::new(|_| Ok(String::new()));
        assert!(matches!(
            CiscoAireos.save_config(&mut transport, Some("backup.cfg")).await,
            Err(Error::UnsupportedOperation { .. })
        ));
        assert!(matches!(
            CiscoAireos.rollback(&mut transport, "chk").await,
            Err(Error::UnsupportedOperation { .. })
        ));
    }
}

//! Cisco NX-OS over NX-API.
//!
//! Commands travel as `cli_show_ascii` requests, so every output here is the
//! same text the CLI would print. Reload-type commands drop the HTTP session
//! mid-request; those failures are expected.

use std::time::Duration;

use async_trait::async_trait;
use log::info;

use super::{
    capture, check_output, field, file_name, md5_or_missing, optional_column, parse_rows,
    tolerate_disconnect, uptime_seconds, uptime_string,
};
use crate::device::{BootState, Facts, InstallEffect, InstallRequest, RebootOptions};
use crate::error::{CommandError, Result};
use crate::platform::{Platform, Vendor};
use crate::transport::Transport;

const SHOW_VERSION: &str = "show version";
const ERROR_MARKERS: &[&str] = &["ERROR:", "Rollback failed", "% Invalid"];
const INSTALL_TIMEOUT: Duration = Duration::from_secs(1800);
const LONG_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, Default)]
pub struct CiscoNxos;

impl CiscoNxos {
    async fn ensure_present(&self, transport: &mut dyn Transport, image: &str) -> Result<()> {
        let command = format!("dir {}", self.default_file_system());
        let listing = transport.send_command(&command, None).await?;
        if listing.contains(image) {
            Ok(())
        } else {
            Err(CommandError::Failed {
                command,
                message: format!("{image} not found on {}", self.default_file_system()),
            }
            .into())
        }
    }
}

#[async_trait]
impl Vendor for CiscoNxos {
    fn platform(&self) -> Platform {
        Platform::CiscoNxosNxapi
    }

    fn default_file_system(&self) -> &'static str {
        "bootflash:"
    }

    async fn facts(&self, transport: &mut dyn Transport) -> Result<Facts> {
        let output = transport.send_command(SHOW_VERSION, None).await?;
        let rows = parse_rows(self.platform(), SHOW_VERSION, &output)?;
        let hostname = field(&rows, "hostname");
        let uptime = uptime_seconds(&field(&rows, "uptime"));

        Ok(Facts {
            fqdn: hostname.clone(),
            vendor: "cisco".into(),
            model: field(&rows, "platform"),
            os_version: field(&rows, "os"),
            serial_number: field(&rows, "serial"),
            uptime,
            uptime_string: uptime.map(uptime_string).unwrap_or_default(),
            interfaces: optional_column(
                transport,
                self.platform(),
                "show interface brief",
                "interface",
            )
            .await?,
            vlans: optional_column(transport, self.platform(), "show vlan brief", "vlan_id")
                .await?,
            hostname,
        })
    }

    async fn get_boot_options(&self, transport: &mut dyn Transport) -> Result<BootState> {
        let output = transport.send_command("show boot", None).await?;
        // The first block lists the current variables, the second those for the next reload.
        let system = capture(r"(?mi)^\s*(?:nxos|system) variable = (\S+)", &output);
        let kickstart = capture(r"(?mi)^\s*kickstart variable = (\S+)", &output);

        match system {
            Some(system) => Ok(BootState::new(file_name(&system))
                .with_kickstart(kickstart.as_deref().map(file_name))),
            None => {
                let version = transport.send_command(SHOW_VERSION, None).await?;
                let rows = parse_rows(self.platform(), SHOW_VERSION, &version)?;
                let image = field(&rows, "boot_image");
                if image.is_empty() {
                    return Err(CommandError::UnexpectedOutput {
                        command: "show boot".into(),
                        output,
                    }
                    .into());
                }
                Ok(BootState::new(file_name(&image)))
            }
        }
    }

    async fn set_boot_options(
        &self,
        transport: &mut dyn Transport,
        image: &str,
        kickstart: Option<&str>,
    ) -> Result<()> {
        let fs = self.default_file_system();
        self.ensure_present(transport, image).await?;
        let lines = match kickstart {
            Some(kickstart) => {
                self.ensure_present(transport, kickstart).await?;
                vec![
                    format!("boot kickstart {fs}{kickstart}"),
                    format!("boot system {fs}{image}"),
                ]
            }
            None => vec![format!("boot nxos {fs}{image}")],
        };
        self.configure(transport, &lines).await?;
        self.save_config(transport, None).await?;
        info!("boot variables set to {}", lines.join(", "));
        Ok(())
    }

    async fn install_os(
        &self,
        transport: &mut dyn Transport,
        request: &InstallRequest,
    ) -> Result<InstallEffect> {
        let fs = self.default_file_system();
        let command = match &request.kickstart_image {
            Some(kickstart) => format!(
                "install all system {fs}{} kickstart {fs}{kickstart}",
                request.system_image
            ),
            None => format!("install all nxos {fs}{}", request.system_image),
        };
        // install all reloads the switch as soon as the images are in place
        let result = transport
            .send_command(&format!("terminal dont-ask ; {command}"), Some(INSTALL_TIMEOUT))
            .await;
        tolerate_disconnect(result.and_then(|output| check_output(&command, output, ERROR_MARKERS)))?;
        Ok(InstallEffect {
            reboots: true,
            ..Default::default()
        })
    }

    async fn reboot(&self, transport: &mut dyn Transport, _options: &RebootOptions) -> Result<()> {
        tolerate_disconnect(
            transport
                .send_command("terminal dont-ask ; reload", None)
                .await,
        )
    }

    async fn checkpoint(&self, transport: &mut dyn Transport, name: &str) -> Result<()> {
        let command = format!("checkpoint file {}{}", self.default_file_system(), name);
        let output = transport.send_command(&command, Some(LONG_TIMEOUT)).await?;
        check_output(&command, output, ERROR_MARKERS).map(|_| ())
    }

    async fn rollback(&self, transport: &mut dyn Transport, name: &str) -> Result<()> {
        let command = format!(
            "rollback running-config file {}{}",
            self.default_file_system(),
            name
        );
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
                .send_command(&format!("show file {path} md5sum"), Some(LONG_TIMEOUT))
                .await,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectionError;
    use crate::testing::MockTransport;
    use crate::transport::TransportKind;

    const SHOW_VERSION_OUTPUT: &str = "\
Cisco Nexus Operating System (NX-OS) Software
Software
  BIOS: version
  NXOS: version 9.3(3)
  NXOS image file is: bootflash:///nxos.9.3.3.bin
  NXOS compile time:  12/22/2019 2:00:00 [12/22/2019 14:00:37]

Hardware
  cisco Nexus9000 C9300v Chassis
  Intel(R) Xeon(R) CPU E5-2680 v4 @ 2.40GHz with 8161056 kB of memory.
  Processor Board ID 9N3KD63KWT0

  Device name: n9k1
  bootflash:    4287040 kB
Kernel uptime is 12 day(s), 3 hour(s), 48 minute(s), 38 second(s)

Last reset
  Reason: Unknown
";

    const SHOW_INTERFACE_BRIEF: &str = "\
--------------------------------------------------------------------------------
Port   VRF          Status IP Address                              Speed    MTU
--------------------------------------------------------------------------------
mgmt0  --           up     10.0.0.71                               1000     1500
--------------------------------------------------------------------------------
Ethernet      VLAN    Type Mode   Status  Reason                   Speed     Port
Interface                                                                    Ch #
--------------------------------------------------------------------------------
Eth1/1        1       eth  access up      none                       1000(D) --
Eth1/2        1       eth  access down    Link not connected         auto(D) --
";

    fn http(
        handler: impl Fn(&str) -> Result<String> + Send + Sync + 'static,
    ) -> (MockTransport, crate::testing::CallLog) {
        let (transport, log) = MockTransport::new(handler);
        (transport.with_kind(TransportKind::Http), log)
    }

    #[tokio::test]
    async fn test_facts() {
        let (mut transport, _log) = http(|cmd| match cmd {
            "show version" => Ok(SHOW_VERSION_OUTPUT.into()),
            "show interface brief" => Ok(SHOW_INTERFACE_BRIEF.into()),
            _ => Ok(String::new()),
        });
        let facts = CiscoNxos.facts(&mut transport).await.unwrap();

        assert_eq!(facts.hostname, "n9k1");
        assert_eq!(facts.os_version, "9.3(3)");
        assert_eq!(facts.model, "Nexus9000 C9300v");
        assert_eq!(facts.serial_number, "9N3KD63KWT0");
        assert_eq!(facts.uptime, Some(12 * 86_400 + 3 * 3_600 + 48 * 60 + 38));
        assert_eq!(facts.interfaces, vec!["mgmt0", "Eth1/1", "Eth1/2"]);
    }

    #[tokio::test]
    async fn test_boot_options_with_and_without_kickstart() {
        let (mut transport, _log) = http(|_| {
            Ok("Current Boot Variables:\n\nsup-1\nNXOS variable = bootflash:/nxos.9.3.3.bin\n\
                Boot POAP Disabled\n\nBoot Variables on next reload:\n\nsup-1\n\
                NXOS variable = bootflash:/nxos.9.3.4.bin\n"
                .into())
        });
        let boot = CiscoNxos.get_boot_options(&mut transport).await.unwrap();
        assert_eq!(boot.system_image, "nxos.9.3.3.bin");
        assert_eq!(boot.kickstart_image, None);

        let (mut transport, _log) = http(|_| {
            Ok("sup-1\nkickstart variable = bootflash:/n7000-s2-kickstart.6.2.bin\n\
                system variable = bootflash:/n7000-s2-dk9.6.2.bin\n"
                .into())
        });
        let boot = CiscoNxos.get_boot_options(&mut transport).await.unwrap();
        assert_eq!(boot.system_image, "n7000-s2-dk9.6.2.bin");
        assert_eq!(
            boot.kickstart_image.as_deref(),
            Some("n7000-s2-kickstart.6.2.bin")
        );
    }

    #[tokio::test]
    async fn test_set_boot_options_kickstart_lines() {
        let (mut transport, log) = http(|cmd| match cmd {
            "dir bootflash:" => Ok("  123  n7k-kick.bin\n  456  n7k-sys.bin\n".into()),
            _ => Ok("Copy complete.\n".into()),
        });
        CiscoNxos
            .set_boot_options(&mut transport, "n7k-sys.bin", Some("n7k-kick.bin"))
            .await
            .unwrap();
        assert_eq!(
            log.configs(),
            vec![vec![
                "boot kickstart bootflash:n7k-kick.bin".to_string(),
                "boot system bootflash:n7k-sys.bin".to_string(),
            ]]
        );
        assert!(log.commands().contains(&"copy running-config startup-config".to_string()));
    }

    #[tokio::test]
    async fn test_install_tolerates_dropped_session() {
        let (mut transport, log) = http(|_| Err(ConnectionError::Disconnected.into()));
        let effect = CiscoNxos
            .install_os(&mut transport, &InstallRequest::new("nxos.9.3.3.bin").with_reboot(true))
            .await
            .unwrap();
        assert!(effect.reboots);
        assert_eq!(
            log.commands(),
            vec!["terminal dont-ask ; install all nxos bootflash:nxos.9.3.3.bin"]
        );
    }

    #[tokio::test]
    async fn test_rollback_failure_is_reported() {
        let (mut transport, _log) =
            http(|_| Ok("Rollback failed: patch could not be applied\n".into()));
        assert!(CiscoNxos.rollback(&mut transport, "chk1").await.is_err());
    }
}

//! Juniper JUNOS over SSH.
//!
//! Privilege levels:
//! - `exec` - Operational mode with `>` prompt
//! - `configuration` - Configuration mode with `#` prompt
//! - `shell` - Unix shell mode with `%` prompt
//!
//! # Prompt Examples
//!
//! ```text
//! user@router>              # exec mode
//! user@router#              # configuration mode
//! user@router%              # shell mode
//! {master:0}[edit]          # config mode with routing-engine indicator
//! ```
//!
//! # Privilege Graph
//!
//! ```text
//! ┌──────┐  configure   ┌───────────────┐
//! │ exec ├──────────────► configuration │
//! │  >   │    exit      │      #        │
//! └──┬───┘◄─────────────┴───────────────┘
//!    │
//!    │ start shell
//!    ▼
//! ┌──────┐
//! │shell │
//! │  %   │
//! └──────┘
//!    exit
//! ```
//!
//! Configuration changes only take effect on `commit`, which `configure`
//! appends to every batch.

use std::time::Duration;

use async_trait::async_trait;
use log::info;

use super::{
    capture, check_output, field, level, md5_or_missing, optional_column, optional_output,
    parse_rows, run_dialog, tolerate_disconnect, uptime_string,
};
use crate::device::{BootState, Facts, InstallEffect, InstallRequest, RebootOptions};
use crate::error::{CommandError, Result};
use crate::platform::{Platform, PlatformDefinition, Vendor};
use crate::transport::Transport;

const PROMPT: &str = r"(?m)^(?:\{[^}]+\})?[\w.\-@:]+[>#%]\s*$";
const REBOOT_QUESTION: &str = r"(?i)reboot the system \?\s*\[yes,no\]\s*(?:\(no\))?\s*$";
const ERROR_MARKERS: &[&str] = &["error:", "syntax error"];
const SHOW_VERSION: &str = "show version";
const INSTALL_TIMEOUT: Duration = Duration::from_secs(1800);
const DIALOG_TIMEOUT: Duration = Duration::from_secs(30);

/// Create the Juniper JUNOS platform definition.
pub fn definition() -> Result<PlatformDefinition> {
    // Matches: user@router>, {master:0}user@router>
    let exec = level("exec", r"(?:\{[^}]+\})?[\w.\-@]+>\s*$")?;

    // Matches: user@router#, {master:0}[edit]user@router#, [edit interfaces]user@router#
    let configuration = level(
        "configuration",
        r"(?:\{[^}]+\})?(?:\[edit[^\]]*\]\s*)?[\w.\-@]+#\s*$",
    )?
    .with_parent("exec")
    .with_escalate("configure")
    .with_deescalate("exit configuration-mode");

    // Matches: user@router%, root@router:RE:0%
    let shell = level("shell", r"[\w.\-@:]+%\s*$")?
        .with_parent("exec")
        .with_escalate("start shell")
        .with_deescalate("exit");

    Ok(PlatformDefinition::new("juniper_junos")
        .with_privilege(exec)
        .with_privilege(configuration)
        .with_privilege(shell)
        .with_default_privilege("exec")
        .with_failure_pattern("unknown command")
        .with_failure_pattern("syntax error")
        .with_failure_pattern("error:")
        .with_failure_pattern("missing argument")
        .with_on_open_command("set cli screen-length 0")
        .with_on_open_command("set cli screen-width 511"))
}

/// Seconds from `show system uptime`, e.g. `System booted: ... (3w2d 04:05 ago)`.
fn boot_uptime(output: &str) -> Option<u64> {
    let line = output.lines().find(|l| l.contains("System booted"))?;
    let span = capture(r"\(([^)]*)ago\)", line)?;
    let number = |pattern: &str| -> u64 {
        capture(pattern, &span)
            .and_then(|n| n.parse().ok())
            .unwrap_or(0)
    };
    let weeks = number(r"(\d+)w");
    let days = number(r"(\d+)d");
    let (hours, minutes, seconds) = match capture(r"(\d+:\d+(?::\d+)?)", &span) {
        Some(clock) => {
            let mut parts = clock.split(':').map(|p| p.parse::<u64>().unwrap_or(0));
            (
                parts.next().unwrap_or(0),
                parts.next().unwrap_or(0),
                parts.next().unwrap_or(0),
            )
        }
        None => (0, number(r"(\d+)\s*min"), number(r"(\d+)\s*sec")),
    };
    Some((weeks * 7 + days) * 86_400 + hours * 3_600 + minutes * 60 + seconds)
}

/// Whether `version` appears in the package name as a whole `-`-separated
/// token, e.g. `18.4R1.8` in `junos-vsrx-x86-64-18.4R1.8.tgz`.
fn package_carries_version(package: &str, version: &str) -> bool {
    if version.is_empty() {
        return false;
    }
    let name = package.rsplit('/').next().unwrap_or(package);
    let stem = name
        .strip_suffix(".tgz")
        .or_else(|| name.strip_suffix(".tar.gz"))
        .unwrap_or(name);
    stem.match_indices(version).any(|(start, _)| {
        let end = start + version.len();
        let before = stem[..start].chars().next_back();
        let after = stem[end..].chars().next();
        matches!(before, None | Some('-')) && matches!(after, None | Some('-'))
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JuniperJunos;

impl JuniperJunos {
    fn package_path(&self, image: &str) -> String {
        self.remote_path(self.default_file_system(), image)
    }
}

#[async_trait]
impl Vendor for JuniperJunos {
    fn platform(&self) -> Platform {
        Platform::JuniperJunos
    }

    fn default_file_system(&self) -> &'static str {
        "/var/tmp/"
    }

    async fn facts(&self, transport: &mut dyn Transport) -> Result<Facts> {
        let output = transport.send_command(SHOW_VERSION, None).await?;
        let rows = parse_rows(self.platform(), SHOW_VERSION, &output)?;
        let hostname = field(&rows, "hostname");

        let hardware = optional_output(transport, "show chassis hardware").await?;
        let uptime = boot_uptime(&optional_output(transport, "show system uptime").await?);

        Ok(Facts {
            fqdn: hostname.clone(),
            vendor: "juniper".into(),
            model: field(&rows, "model"),
            os_version: field(&rows, "version"),
            serial_number: capture(r"(?m)^Chassis\s+(\S+)", &hardware).unwrap_or_default(),
            uptime,
            uptime_string: uptime.map(uptime_string).unwrap_or_default(),
            interfaces: optional_column(
                transport,
                self.platform(),
                "show interfaces terse",
                "interface",
            )
            .await?,
            vlans: Vec::new(),
            hostname,
        })
    }

    async fn configure(&self, transport: &mut dyn Transport, lines: &[String]) -> Result<String> {
        let mut batch = lines.to_vec();
        batch.push("commit".to_string());
        let output = transport.send_config(&batch).await?;
        check_output("commit", output, ERROR_MARKERS)
    }

    async fn get_boot_options(&self, transport: &mut dyn Transport) -> Result<BootState> {
        let output = transport.send_command(SHOW_VERSION, None).await?;
        let version = field(&parse_rows(self.platform(), SHOW_VERSION, &output)?, "version");
        if version.is_empty() {
            return Err(CommandError::UnexpectedOutput {
                command: SHOW_VERSION.into(),
                output,
            }
            .into());
        }
        Ok(BootState::new(version))
    }

    /// JUNOS reports the running version, not a file name; the image is
    /// installed when its package name carries that version.
    fn is_installed(&self, current: &BootState, request: &InstallRequest) -> bool {
        package_carries_version(&request.system_image, &current.system_image)
    }

    fn stages_boot_image(&self) -> bool {
        true
    }

    /// Stage the package; it becomes active on the next reboot.
    async fn set_boot_options(
        &self,
        transport: &mut dyn Transport,
        image: &str,
        _kickstart: Option<&str>,
    ) -> Result<()> {
        let command = format!("request system software add {}", self.package_path(image));
        let output = transport
            .send_command(&command, Some(INSTALL_TIMEOUT))
            .await?;
        check_output(&command, output, ERROR_MARKERS)?;
        info!("staged {} for the next reboot", image);
        Ok(())
    }

    async fn install_os(
        &self,
        transport: &mut dyn Transport,
        request: &InstallRequest,
    ) -> Result<InstallEffect> {
        if !request.reboot {
            self.set_boot_options(transport, &request.system_image, None)
                .await?;
            return Ok(InstallEffect {
                reboots: false,
                staged: true,
            });
        }

        let command = format!(
            "request system software add {} reboot",
            self.package_path(&request.system_image)
        );
        let result = transport
            .send_command(&command, Some(INSTALL_TIMEOUT))
            .await
            .and_then(|output| check_output(&command, output, ERROR_MARKERS));
        tolerate_disconnect(result)?;
        Ok(InstallEffect {
            reboots: true,
            staged: false,
        })
    }

    async fn reboot(&self, transport: &mut dyn Transport, options: &RebootOptions) -> Result<()> {
        let command = match options.timer {
            Some(minutes) => format!("request system reboot in {minutes}"),
            None => "request system reboot".to_string(),
        };
        let result = run_dialog(
            transport,
            &command,
            PROMPT,
            &[(REBOOT_QUESTION, "yes")],
            DIALOG_TIMEOUT,
        )
        .await;
        match options.timer {
            Some(_) => result.map(|_| ()),
            None => tolerate_disconnect(result),
        }
    }

    async fn checkpoint(&self, transport: &mut dyn Transport, name: &str) -> Result<()> {
        let command = format!(
            "show configuration | save {}",
            self.remote_path(self.default_file_system(), name)
        );
        let output = transport.send_command(&command, None).await?;
        check_output(&command, output, ERROR_MARKERS).map(|_| ())
    }

    /// A numeric name selects one of the device's own rollback slots.
    async fn rollback(&self, transport: &mut dyn Transport, name: &str) -> Result<()> {
        let line = if !name.is_empty() && name.chars().all(|c| c.is_ascii_digit()) {
            format!("rollback {name}")
        } else {
            format!(
                "load override {}",
                self.remote_path(self.default_file_system(), name)
            )
        };
        self.configure(transport, &[line]).await.map(|_| ())
    }

    async fn save_config(&self, transport: &mut dyn Transport, remote: Option<&str>) -> Result<bool> {
        match remote {
            // The committed configuration is the startup configuration.
            None => self.configure(transport, &[]).await.map(|_| true),
            Some(name) => self.checkpoint(transport, name).await.map(|_| true),
        }
    }

    async fn running_config(&self, transport: &mut dyn Transport) -> Result<String> {
        transport.send_command("show configuration", None).await
    }

    async fn remote_md5(&self, transport: &mut dyn Transport, path: &str) -> Result<Option<String>> {
        md5_or_missing(
            transport
                .send_command(&format!("file checksum md5 {path}"), None)
                .await,
        )
    }
}

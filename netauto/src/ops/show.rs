//! Read-only operations: show commands, facts and offline parsing.

use std::path::{Path, PathBuf};

use log::debug;

use super::{Outcome, Report, finish, open};
use crate::device::{Device, Facts, ShowResults};
use crate::error::{Error, Result};
use crate::parse::{OutputParser, Parsed};

/// Commands to run, given inline or as a file with one command per line.
#[derive(Debug, Clone, Default)]
pub struct ShowRequest {
    pub commands: Vec<String>,
    pub commands_file: Option<PathBuf>,
}

impl ShowRequest {
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
            commands_file: None,
        }
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            commands: Vec::new(),
            commands_file: Some(path.into()),
        }
    }

    /// The commands to run, in order.
    pub async fn resolve(&self) -> Result<Vec<String>> {
        resolve_lines(&self.commands, self.commands_file.as_deref()).await
    }
}

/// Configuration lines, given inline or as a file with one line each.
#[derive(Debug, Clone, Default)]
pub struct ConfigRequest {
    pub commands: Vec<String>,
    pub commands_file: Option<PathBuf>,
}

impl ConfigRequest {
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
            commands_file: None,
        }
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            commands: Vec::new(),
            commands_file: Some(path.into()),
        }
    }

    /// The lines to apply, in order. An empty file is rejected.
    pub async fn resolve(&self) -> Result<Vec<String>> {
        let lines = resolve_lines(&self.commands, self.commands_file.as_deref()).await?;
        if lines.is_empty() {
            return Err(Error::option("no configuration lines given"));
        }
        Ok(lines)
    }
}

async fn resolve_lines(commands: &[String], file: Option<&Path>) -> Result<Vec<String>> {
    match (file, commands.is_empty()) {
        (Some(_), false) => Err(Error::option(
            "commands and commands_file are mutually exclusive",
        )),
        (None, true) => Err(Error::option("one of commands or commands_file is required")),
        (None, false) => Ok(commands.to_vec()),
        (Some(path), true) => Ok(read_commands(&tokio::fs::read_to_string(path).await?)),
    }
}

/// One command per line; trailing whitespace and blank lines are dropped.
fn read_commands(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Run show commands. Never reports a change.
pub async fn show(device: &mut Device, request: &ShowRequest) -> Report<ShowResults> {
    let commands = match request.resolve().await {
        Ok(commands) => commands,
        Err(e) => return Report::rejected(e),
    };
    let outcome = match open(device).await {
        Ok(()) => match device.show(&commands).await {
            Ok(results) => Outcome::success(false, results),
            Err(e) => Outcome::failed(e),
        },
        Err(outcome) => outcome,
    };
    finish(device, outcome).await
}

/// Gather device facts.
pub async fn facts(device: &mut Device) -> Report<Facts> {
    let outcome = match open(device).await {
        Ok(()) => match device.facts().await {
            Ok(facts) => Outcome::success(false, facts),
            Err(e) => Outcome::failed(e),
        },
        Err(outcome) => outcome,
    };
    finish(device, outcome).await
}

/// Apply configuration lines and return the device output.
pub async fn configure(device: &mut Device, request: &ConfigRequest) -> Report<String> {
    let lines = match request.resolve().await {
        Ok(lines) => lines,
        Err(e) => return Report::rejected(e),
    };
    debug!("applying {} configuration lines", lines.len());
    let outcome = match open(device).await {
        Ok(()) => match device.configure(&lines).await {
            Ok(output) => Outcome::success(true, output),
            Err(e) => Outcome::failed(e),
        },
        Err(outcome) => outcome,
    };
    finish(device, outcome).await
}

/// Parse saved command output without a device.
///
/// `platform` is a template index platform name such as `cisco_ios`. When
/// `local_file` is given the raw text is copied there as well.
pub async fn parse_offline(
    parser: &OutputParser,
    raw_file: &Path,
    command: &str,
    platform: &str,
    local_file: Option<&Path>,
) -> Result<Parsed> {
    let raw = tokio::fs::read_to_string(raw_file).await?;
    if let Some(local) = local_file {
        tokio::fs::write(local, &raw).await?;
    }
    debug!("parsing {} as '{}' on {}", raw_file.display(), command, platform);
    Ok(parser.parse(&raw, command, platform))
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use super::*;
    use crate::config::{ConnectionParams, DeviceSpec};
    use crate::device::ShowOutput;
    use crate::platform::Platform;
    use crate::testing::MockConnector;

    const INTF_BRIEF: &str = "\
Interface              IP-Address      OK? Method Status                Protocol
GigabitEthernet1       10.0.0.1        YES NVRAM  up                    up
Loopback0              1.1.1.1         YES manual up                    up
";

    #[test]
    fn test_read_commands() {
        assert_eq!(
            read_commands("show version  \n\nshow ip route\t\n"),
            vec!["show version", "show ip route"]
        );
    }

    #[tokio::test]
    async fn test_commands_and_file_are_exclusive() {
        let request = ShowRequest {
            commands: vec!["show version".into()],
            commands_file: Some("cmds.txt".into()),
        };
        assert!(matches!(
            request.resolve().await,
            Err(Error::UnsupportedOption { .. })
        ));
        assert!(ShowRequest::default().resolve().await.is_err());
    }

    #[tokio::test]
    async fn test_commands_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"show version\nshow clock \n").unwrap();
        let commands = ShowRequest::from_file(file.path()).resolve().await.unwrap();
        assert_eq!(commands, vec!["show version", "show clock"]);
    }

    #[tokio::test]
    async fn test_show_report() {
        let (connector, log) = MockConnector::new(|cmd| match cmd {
            "show ip interface brief" => Ok(INTF_BRIEF.into()),
            _ => Ok("*10:00:00.000 UTC Fri Oct 16 2026".into()),
        });
        let mut device = Device::new(DeviceSpec::new(
            Platform::CiscoIosSsh,
            ConnectionParams::new("csr1", "ntc", "ntc123"),
        ))
        .with_connector(Arc::new(connector))
        .with_parser(Arc::new(OutputParser::builtin().clone()));

        let report = show(
            &mut device,
            &ShowRequest::new(["show ip interface brief", "show clock"]),
        )
        .await;
        assert!(!report.changed());
        let results = report.detail().unwrap();
        assert!(matches!(
            &results["show ip interface brief"],
            ShowOutput::Structured(rows) if rows.len() == 2
        ));
        assert_eq!(
            log.commands(),
            vec!["show ip interface brief", "show clock"]
        );

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["show clock"], "*10:00:00.000 UTC Fri Oct 16 2026");
        assert_eq!(
            json["show ip interface brief"][1]["intf"],
            serde_json::json!("Loopback0")
        );
    }

    #[tokio::test]
    async fn test_configure_requires_lines() {
        let (connector, log) = MockConnector::new(|_| Ok(String::new()));
        let mut device = Device::new(DeviceSpec::new(
            Platform::CiscoIosSsh,
            ConnectionParams::new("csr1", "ntc", "ntc123"),
        ))
        .with_connector(Arc::new(connector));
        assert!(
            configure(&mut device, &ConfigRequest::default())
                .await
                .error()
                .is_some()
        );
        assert!(log.calls().is_empty());

        let report = configure(&mut device, &ConfigRequest::new(["interface Loopback1"])).await;
        assert!(report.changed());
        assert_eq!(log.configs(), vec![vec!["interface Loopback1".to_string()]]);
    }

    #[tokio::test]
    async fn test_configure_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"interface Loopback1\n description uplink \n\n").unwrap();
        let (connector, log) = MockConnector::new(|_| Ok(String::new()));
        let mut device = Device::new(DeviceSpec::new(
            Platform::CiscoIosSsh,
            ConnectionParams::new("csr1", "ntc", "ntc123"),
        ))
        .with_connector(Arc::new(connector));

        let report = configure(&mut device, &ConfigRequest::from_file(file.path())).await;
        assert!(report.changed());
        assert_eq!(
            log.configs(),
            vec![vec![
                "interface Loopback1".to_string(),
                " description uplink".to_string()
            ]]
        );
    }

    #[tokio::test]
    async fn test_configure_sources_are_exclusive() {
        let both = ConfigRequest {
            commands: vec!["interface Loopback1".into()],
            commands_file: Some("cfg.txt".into()),
        };
        assert!(matches!(
            both.resolve().await,
            Err(Error::UnsupportedOption { .. })
        ));

        let empty = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            ConfigRequest::from_file(empty.path()).resolve().await,
            Err(Error::UnsupportedOption { .. })
        ));

        let (connector, log) = MockConnector::new(|_| Ok(String::new()));
        let mut device = Device::new(DeviceSpec::new(
            Platform::CiscoIosSsh,
            ConnectionParams::new("csr1", "ntc", "ntc123"),
        ))
        .with_connector(Arc::new(connector));
        assert!(configure(&mut device, &both).await.error().is_some());
        assert!(log.calls().is_empty());
    }

    #[tokio::test]
    async fn test_parse_offline_copies_raw() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw.txt");
        let copy = dir.path().join("copy.txt");
        std::fs::write(&raw, INTF_BRIEF).unwrap();

        let parsed = parse_offline(
            OutputParser::builtin(),
            &raw,
            "show ip interface brief",
            "cisco_ios",
            Some(&copy),
        )
        .await
        .unwrap();
        assert_eq!(parsed.rows().map(|r| r.len()), Some(2));
        assert_eq!(std::fs::read_to_string(copy).unwrap(), INTF_BRIEF);
    }

    #[tokio::test]
    async fn test_parse_offline_without_template_is_raw() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"Cisco IOS XR Software").unwrap();
        let parsed = parse_offline(OutputParser::builtin(), file.path(), "show version", "cisco_xr", None)
            .await
            .unwrap();
        assert_eq!(parsed, Parsed::Raw("Cisco IOS XR Software".into()));
    }
}

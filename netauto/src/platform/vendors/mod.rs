//! Built-in vendor implementations.
//!
//! Each module holds one [`Vendor`] and, for CLI platforms, the prompt
//! definition used by SSH and Telnet sessions.

pub mod arista_eos;
pub mod cisco_aireos;
pub mod cisco_asa;
pub mod cisco_ios;
pub mod cisco_nxos;
pub mod f5_tmos;
pub mod juniper_junos;

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use regex::Regex;

use super::{Platform, PlatformDefinition, PrivilegeLevel, Vendor};
use crate::channel::InteractiveEvent;
use crate::error::{CommandError, ConnectionError, Error, Result};
use crate::parse::{OutputParser, ParsedRow};
use crate::transport::{Transport, TransportKind};

/// The built-in implementation for `platform`.
pub fn builtin(platform: Platform) -> Arc<dyn Vendor> {
    match platform {
        Platform::CiscoNxosNxapi => Arc::new(cisco_nxos::CiscoNxos),
        Platform::CiscoIosSsh => Arc::new(cisco_ios::CiscoIos),
        Platform::CiscoAsaSsh => Arc::new(cisco_asa::CiscoAsa),
        Platform::CiscoAireosSsh => Arc::new(cisco_aireos::CiscoAireos),
        Platform::AristaEosEapi => Arc::new(arista_eos::AristaEos),
        Platform::F5TmosIcontrol => Arc::new(f5_tmos::F5Tmos),
        Platform::JuniperJunos => Arc::new(juniper_junos::JuniperJunos),
    }
}

/// Prompt definition for a platform managed over an interactive CLI.
pub fn cli_definition(platform: Platform) -> Result<PlatformDefinition> {
    match platform {
        Platform::CiscoIosSsh => cisco_ios::definition(),
        Platform::CiscoAsaSsh => cisco_asa::definition(),
        Platform::CiscoAireosSsh => cisco_aireos::definition(),
        Platform::JuniperJunos => juniper_junos::definition(),
        Platform::CiscoNxosNxapi | Platform::AristaEosEapi | Platform::F5TmosIcontrol => {
            Err(ConnectionError::UnsupportedTransport {
                platform,
                transport: TransportKind::Ssh.to_string(),
            }
            .into())
        }
    }
}

/// Compile a privilege level, reporting a bad prompt pattern as a command error.
pub(crate) fn level(name: &str, pattern: &str) -> Result<PrivilegeLevel> {
    PrivilegeLevel::new(name, pattern).map_err(|e| CommandError::InvalidPattern(e).into())
}

/// Whether `error` is what a device going down for reload looks like.
fn is_reload_disconnect(error: &Error) -> bool {
    match error {
        Error::Connection(ConnectionError::Disconnected)
        | Error::Connection(ConnectionError::Timeout(_))
        | Error::Command(CommandError::PatternTimeout(_)) => true,
        #[cfg(feature = "ssh")]
        Error::Connection(ConnectionError::Ssh(_)) => true,
        #[cfg(feature = "http")]
        Error::Connection(ConnectionError::Http(_)) => true,
        _ => false,
    }
}

/// Accept a lost session as the outcome of a command that reloads the device.
pub(crate) fn tolerate_disconnect<T>(result: Result<T>) -> Result<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e) if is_reload_disconnect(&e) => {
            debug!("session dropped during reload: {}", e);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Parse `output` with the built-in template for `command`.
pub(crate) fn parse_rows(platform: Platform, command: &str, output: &str) -> Result<Vec<ParsedRow>> {
    Ok(OutputParser::builtin().try_parse(output, command, platform.template_name())?)
}

/// Text of `name` in the first row, or an empty string.
pub(crate) fn field(rows: &[ParsedRow], name: &str) -> String {
    rows.first()
        .and_then(|row| row.get(name))
        .and_then(|value| value.as_str())
        .unwrap_or_default()
        .to_string()
}

/// Non-empty texts of `name` across all rows.
pub(crate) fn column(rows: &[ParsedRow], name: &str) -> Vec<String> {
    rows.iter()
        .filter_map(|row| row.get(name).and_then(|v| v.as_str()))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

/// Output of `command`, or an empty string when the device rejects it.
pub(crate) async fn optional_output(transport: &mut dyn Transport, command: &str) -> Result<String> {
    match transport.send_command(command, None).await {
        Err(Error::Command(CommandError::Failed { .. })) => Ok(String::new()),
        other => other,
    }
}

/// Run `command` and collect one parsed column; empty when the device
/// rejects the command or the output has no records.
pub(crate) async fn optional_column(
    transport: &mut dyn Transport,
    platform: Platform,
    command: &str,
    name: &str,
) -> Result<Vec<String>> {
    let output = optional_output(transport, command).await?;
    Ok(parse_rows(platform, command, &output)
        .map(|rows| column(&rows, name))
        .unwrap_or_default())
}

/// First capture group of `pattern` in `text`.
pub(crate) fn capture(pattern: &str, text: &str) -> Option<String> {
    Regex::new(pattern)
        .ok()?
        .captures(text)?
        .get(1)
        .map(|m| m.as_str().trim().to_string())
}

/// Last component of a device path (`flash:/a/b.bin` -> `b.bin`).
pub(crate) fn file_name(path: &str) -> &str {
    path.rsplit(['/', ':'])
        .find(|part| !part.is_empty())
        .unwrap_or(path)
}

/// First MD5 digest printed in `output`, lower-cased.
pub(crate) fn md5_in(output: &str) -> Option<String> {
    capture(r"\b([0-9a-fA-F]{32})\b", output).map(|h| h.to_ascii_lowercase())
}

/// Digest from a checksum command, `None` when the device says the file is missing.
pub(crate) fn md5_or_missing(result: Result<String>) -> Result<Option<String>> {
    match result {
        Ok(output) => Ok(md5_in(&output)),
        Err(Error::Command(CommandError::Failed { .. })) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Fail with the device's message when `output` carries one of `markers`.
pub(crate) fn check_output(command: &str, output: String, markers: &[&str]) -> Result<String> {
    match output.lines().find(|line| markers.iter().any(|m| line.contains(m))) {
        Some(line) => Err(CommandError::Failed {
            command: command.to_string(),
            message: line.trim().to_string(),
        }
        .into()),
        None => Ok(output),
    }
}

/// Parse uptimes like `1 week, 2 days, 3 hours, 4 minutes` into seconds.
pub(crate) fn uptime_seconds(text: &str) -> Option<u64> {
    let re = Regex::new(r"(?i)(\d+)\s*(year|week|day|hour|hr|minute|min|second|sec)").ok()?;
    let mut total = 0u64;
    let mut found = false;
    for caps in re.captures_iter(text) {
        let count: u64 = caps[1].parse().unwrap_or(u64::MAX);
        let unit = match caps[2].to_ascii_lowercase().as_str() {
            "year" => 365 * 86_400,
            "week" => 7 * 86_400,
            "day" => 86_400,
            "hour" | "hr" => 3_600,
            "minute" | "min" => 60,
            _ => 1,
        };
        total = total.saturating_add(count.saturating_mul(unit));
        found = true;
    }
    found.then_some(total)
}

/// Format seconds as `DD:HH:MM:SS`.
pub(crate) fn uptime_string(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = seconds % 86_400 / 3_600;
    let minutes = seconds % 3_600 / 60;
    format!("{:02}:{:02}:{:02}:{:02}", days, hours, minutes, seconds % 60)
}

/// Upper bound of question/answer rounds in one dialog.
const MAX_DIALOG_ROUNDS: usize = 6;

/// Run `command`, answering the device's questions until `prompt` returns.
///
/// `answers` pairs a question pattern with the reply sent for it. Returns
/// everything the device printed.
pub(crate) async fn run_dialog(
    transport: &mut dyn Transport,
    command: &str,
    prompt: &str,
    answers: &[(&str, &str)],
    timeout: Duration,
) -> Result<String> {
    let questions = answers
        .iter()
        .map(|(question, reply)| {
            Regex::new(question)
                .map(|re| (re, *reply))
                .map_err(|e| CommandError::InvalidPattern(e).into())
        })
        .collect::<Result<Vec<_>>>()?;
    let pattern = std::iter::once(prompt)
        .chain(answers.iter().map(|(q, _)| *q))
        .map(|p| format!("(?:{p})"))
        .collect::<Vec<_>>()
        .join("|");

    let mut output = String::new();
    let mut input = command.to_string();
    for _ in 0..MAX_DIALOG_ROUNDS {
        let event = InteractiveEvent::new(input.as_str(), &pattern)?.with_timeout(timeout);
        let step = transport.send_interactive(&[event]).await?;
        output.push_str(&step);

        match questions.iter().find(|(re, _)| re.is_match(&step)) {
            Some((_, reply)) => {
                debug!("answering {:?} while running {:?}", reply, command);
                input = reply.to_string();
            }
            None => return Ok(output),
        }
    }
    Err(CommandError::UnexpectedOutput {
        command: command.to_string(),
        output,
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;

    #[test]
    fn test_uptime_parsing() {
        assert_eq!(
            uptime_seconds("1 week, 2 days, 3 hours, 4 minutes"),
            Some(9 * 86_400 + 3 * 3_600 + 4 * 60)
        );
        assert_eq!(
            uptime_seconds("10 day(s), 2 hour(s), 3 minute(s), 4 second(s)"),
            Some(10 * 86_400 + 2 * 3_600 + 3 * 60 + 4)
        );
        assert_eq!(uptime_seconds("3 days 2 hrs 10 mins 42 secs"), Some(3 * 86_400 + 7_200 + 642));
        assert_eq!(uptime_seconds("unknown"), None);
        assert_eq!(uptime_string(9 * 86_400 + 3 * 3_600 + 4 * 60 + 5), "09:03:04:05");
    }

    #[test]
    fn test_uptime_saturates() {
        assert_eq!(
            uptime_seconds("99999999999999999 years, 5 minutes"),
            Some(u64::MAX)
        );
        assert_eq!(
            uptime_seconds("184467440737095516150 seconds"),
            Some(u64::MAX)
        );
    }

    #[test]
    fn test_file_name_and_md5() {
        assert_eq!(file_name("bootflash:///nxos.9.3.3.bin"), "nxos.9.3.3.bin");
        assert_eq!(file_name("flash:c800.bin"), "c800.bin");
        assert_eq!(file_name("EOS.swi"), "EOS.swi");
        assert_eq!(
            md5_in("verify /md5 (flash:EOS.swi) = 9F2E4B1C0D3A5E6F7A8B9C0D1E2F3A4B"),
            Some("9f2e4b1c0d3a5e6f7a8b9c0d1e2f3a4b".to_string())
        );
        assert_eq!(md5_in("%Error opening flash:EOS.swi"), None);
    }

    #[test]
    fn test_check_output_reports_marker_line() {
        let err = check_output("copy", "Copy in progress\n%Error copying\n".into(), &["%Error"])
            .unwrap_err();
        assert!(err.to_string().contains("%Error copying"));
        assert!(check_output("copy", "[OK]".into(), &["%Error"]).is_ok());
    }

    #[test]
    fn test_tolerate_disconnect() {
        assert!(tolerate_disconnect::<()>(Err(ConnectionError::Disconnected.into())).is_ok());
        assert!(
            tolerate_disconnect::<()>(Err(
                CommandError::PatternTimeout(Duration::from_secs(1)).into()
            ))
            .is_ok()
        );
        assert!(
            tolerate_disconnect::<()>(Err(ConnectionError::AuthenticationFailed {
                user: "ntc".into()
            }
            .into()))
            .is_err()
        );
    }

    #[tokio::test]
    async fn test_dialog_answers_questions_until_prompt() {
        let (mut transport, log) = MockTransport::new(|input| {
            Ok(match input {
                "copy running-config startup-config" => "Destination filename [startup-config]? ".into(),
                "" => "Building configuration...\n[OK]\nrtr1#".into(),
                other => format!("unexpected {other}"),
            })
        });
        let output = run_dialog(
            &mut transport,
            "copy running-config startup-config",
            r"(?m)^\S+#\s?$",
            &[(r"\[startup-config\]\?\s*$", "")],
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert!(output.contains("[OK]"));
        assert_eq!(log.interactive(), vec!["copy running-config startup-config", ""]);
    }
}

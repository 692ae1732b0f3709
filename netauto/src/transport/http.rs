//! HTTP management API transport.
//!
//! Three APIs are spoken, all reduced to "run a command, get text back":
//! Arista eAPI (JSON-RPC `runCmds`), Cisco NX-API (`/ins`) and F5 iControl
//! REST (`/mgmt/tm/util/bash`).

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tokio::io::AsyncReadExt;

use super::{Transport, TransportKind};
use crate::config::{ConnectionParams, Scheme};
use crate::error::{CommandError, ConnectionError, Result};
use crate::platform::Platform;

/// Size of each iControl upload chunk.
const UPLOAD_CHUNK: u64 = 512 * 1024;

/// Management API spoken by a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFlavor {
    Eapi,
    Nxapi,
    Icontrol,
}

impl ApiFlavor {
    pub fn for_platform(platform: Platform) -> Option<Self> {
        match platform {
            Platform::AristaEosEapi => Some(ApiFlavor::Eapi),
            Platform::CiscoNxosNxapi => Some(ApiFlavor::Nxapi),
            Platform::F5TmosIcontrol => Some(ApiFlavor::Icontrol),
            _ => None,
        }
    }

    fn default_scheme(&self) -> Scheme {
        match self {
            ApiFlavor::Eapi | ApiFlavor::Nxapi => Scheme::Http,
            ApiFlavor::Icontrol => Scheme::Https,
        }
    }

    fn reachability_command(&self) -> &'static str {
        match self {
            ApiFlavor::Eapi | ApiFlavor::Nxapi => "show hostname",
            ApiFlavor::Icontrol => "tmsh show sys version",
        }
    }
}

/// Session with an HTTP management API.
pub struct HttpTransport {
    flavor: ApiFlavor,
    base_url: String,
    username: String,
    password: SecretString,
    secret: Option<SecretString>,
    timeout: Duration,
    verify_certs: bool,
    params: ConnectionParams,
    client: Option<Client>,
}

impl HttpTransport {
    pub fn new(platform: Platform, params: &ConnectionParams) -> Result<Self> {
        let flavor = ApiFlavor::for_platform(platform).ok_or_else(|| {
            ConnectionError::UnsupportedTransport {
                platform,
                transport: TransportKind::Http.to_string(),
            }
        })?;
        let scheme = params.scheme.unwrap_or(flavor.default_scheme());
        let port = params.port_or(scheme.default_port());

        Ok(Self {
            flavor,
            base_url: format!("{}://{}:{}", scheme.as_str(), params.host, port),
            username: params.username.clone(),
            password: params.password.clone(),
            secret: params.secret.clone(),
            timeout: params.timeout,
            verify_certs: params.verify_certs,
            params: params.clone(),
            client: None,
        })
    }

    pub fn flavor(&self) -> ApiFlavor {
        self.flavor
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn client(&self) -> Result<&Client> {
        self.client
            .as_ref()
            .ok_or_else(|| ConnectionError::NotConnected.into())
    }

    async fn post_json(&self, path: &str, body: &Value, timeout: Option<Duration>) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client()?
            .post(&url)
            .basic_auth(&self.username, Some(self.password.expose_secret()))
            .timeout(timeout.unwrap_or(self.timeout))
            .json(body)
            .send()
            .await
            .map_err(ConnectionError::Http)?;
        self.read_json(response).await
    }

    async fn read_json(&self, response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(ConnectionError::AuthenticationFailed {
                user: self.username.clone(),
            }
            .into());
        }
        let text = response.text().await.map_err(ConnectionError::Http)?;
        let value: Value = serde_json::from_str(&text).unwrap_or(Value::Null);

        // NX-API and iControl report command errors with a 4xx/5xx and a JSON body.
        if !status.is_success() && value.is_null() {
            return Err(ConnectionError::Api {
                status: status.as_u16(),
                message: text,
            }
            .into());
        }
        if !status.is_success() && self.flavor == ApiFlavor::Icontrol {
            return Err(ConnectionError::Api {
                status: status.as_u16(),
                message: value
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or(&text)
                    .to_string(),
            }
            .into());
        }
        Ok(value)
    }

    fn enable_command(&self) -> Value {
        match &self.secret {
            Some(secret) => json!({"cmd": "enable", "input": secret.expose_secret()}),
            None => json!("enable"),
        }
    }

    async fn eapi(&self, commands: &[&str], timeout: Option<Duration>) -> Result<Vec<String>> {
        let mut cmds = vec![self.enable_command()];
        cmds.extend(commands.iter().map(|c| json!(c)));
        let body = json!({
            "jsonrpc": "2.0",
            "method": "runCmds",
            "params": {"version": 1, "cmds": cmds, "format": "text"},
            "id": "netauto",
        });
        let value = self.post_json("/command-api", &body, timeout).await?;
        // Drop the output of the leading "enable".
        Ok(parse_eapi(&value, commands)?.into_iter().skip(1).collect())
    }

    async fn nxapi(&self, kind: &str, input: &str, timeout: Option<Duration>) -> Result<Vec<String>> {
        let body = json!({
            "ins_api": {
                "version": "1.0",
                "type": kind,
                "chunk": "0",
                "sid": "1",
                "input": input,
                "output_format": "json",
            }
        });
        let value = self.post_json("/ins", &body, timeout).await?;
        parse_nxapi(&value, input)
    }

    async fn bash(&self, command: &str, timeout: Option<Duration>) -> Result<String> {
        let body = json!({
            "command": "run",
            "utilCmdArgs": format!("-c {}", shell_quote(command)),
        });
        let value = self.post_json("/mgmt/tm/util/bash", &body, timeout).await?;
        Ok(value
            .get("commandResult")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim_end()
            .to_string())
    }

    async fn icontrol_upload(&self, local: &Path, remote_path: &str) -> Result<()> {
        let mut file = tokio::fs::File::open(local).await?;
        let total = file.metadata().await?.len();
        let name = remote_path.rsplit('/').next().unwrap_or(remote_path);
        let url = format!(
            "{}/mgmt/cm/autodeploy/software-image-uploads/{}",
            self.base_url, name
        );
        let client = self.client()?;

        let mut start = 0u64;
        loop {
            let end = (start + UPLOAD_CHUNK).min(total);
            let mut chunk = vec![0u8; (end - start) as usize];
            file.read_exact(&mut chunk).await?;
            let response = client
                .post(&url)
                .basic_auth(&self.username, Some(self.password.expose_secret()))
                .header("Content-Type", "application/octet-stream")
                .header("Content-Range", content_range(start, end, total))
                .body(chunk)
                .send()
                .await
                .map_err(ConnectionError::Http)?;
            self.read_json(response).await?;
            debug!("uploaded bytes {}-{} of {}", start, end, total);

            start = end;
            if start >= total {
                break;
            }
        }
        info!("uploaded {} ({} bytes)", name, total);
        Ok(())
    }

    #[cfg(feature = "ssh")]
    async fn scp_upload(&self, local: &Path, remote_path: &str) -> Result<()> {
        let config = super::config::SshConfig::for_file_transfer(&self.params);
        super::scp::upload_standalone(&config, local, remote_path).await
    }

    #[cfg(not(feature = "ssh"))]
    async fn scp_upload(&self, _local: &Path, _remote_path: &str) -> Result<()> {
        Err(crate::Error::DependencyMissing { component: "ssh" })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&mut self) -> Result<()> {
        if self.client.is_some() {
            return Ok(());
        }
        let client = Client::builder()
            .timeout(self.timeout)
            .danger_accept_invalid_certs(!self.verify_certs)
            .build()
            .map_err(ConnectionError::Http)?;
        self.client = Some(client);

        let check = self.flavor.reachability_command();
        if let Err(e) = self.send_command(check, None).await {
            self.client = None;
            return Err(e);
        }
        debug!("{:?} API reachable at {}", self.flavor, self.base_url);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.client = None;
        Ok(())
    }

    async fn send_command(&mut self, command: &str, timeout: Option<Duration>) -> Result<String> {
        match self.flavor {
            ApiFlavor::Eapi => Ok(self
                .eapi(&[command], timeout)
                .await?
                .into_iter()
                .next()
                .unwrap_or_default()),
            ApiFlavor::Nxapi => Ok(self
                .nxapi("cli_show_ascii", command, timeout)
                .await?
                .join("\n")),
            ApiFlavor::Icontrol => self.bash(command, timeout).await,
        }
    }

    async fn send_config(&mut self, lines: &[String]) -> Result<String> {
        match self.flavor {
            ApiFlavor::Eapi => {
                let mut commands = vec!["configure"];
                commands.extend(lines.iter().map(String::as_str));
                commands.push("end");
                let outputs = self.eapi(&commands, None).await?;
                Ok(join_nonempty(outputs))
            }
            ApiFlavor::Nxapi => {
                let outputs = self.nxapi("cli_conf", &lines.join(" ; "), None).await?;
                Ok(join_nonempty(outputs))
            }
            ApiFlavor::Icontrol => {
                let mut outputs = Vec::with_capacity(lines.len());
                for line in lines {
                    outputs.push(self.bash(line, None).await?);
                }
                Ok(join_nonempty(outputs))
            }
        }
    }

    async fn upload_file(&mut self, local: &Path, remote_path: &str) -> Result<()> {
        match self.flavor {
            ApiFlavor::Icontrol => self.icontrol_upload(local, remote_path).await,
            ApiFlavor::Eapi | ApiFlavor::Nxapi => self.scp_upload(local, remote_path).await,
        }
    }

    fn is_open(&self) -> bool {
        self.client.is_some()
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }
}

fn join_nonempty(outputs: Vec<String>) -> String {
    outputs
        .into_iter()
        .filter(|o| !o.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Extract per-command text output from an eAPI reply.
fn parse_eapi(value: &Value, commands: &[&str]) -> Result<Vec<String>> {
    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown eAPI error");
        // `data` holds one entry per command; the failing one carries "errors".
        let detail = error
            .get("data")
            .and_then(Value::as_array)
            .and_then(|data| {
                data.iter()
                    .filter_map(|d| d.get("errors"))
                    .filter_map(Value::as_array)
                    .flatten()
                    .filter_map(Value::as_str)
                    .next()
            })
            .unwrap_or(message);
        return Err(CommandError::Failed {
            command: commands.join("; "),
            message: detail.to_string(),
        }
        .into());
    }

    let results = value
        .get("result")
        .and_then(Value::as_array)
        .ok_or_else(|| CommandError::UnexpectedOutput {
            command: commands.join("; "),
            output: value.to_string(),
        })?;
    Ok(results
        .iter()
        .map(|r| {
            r.get("output")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .trim_end()
                .to_string()
        })
        .collect())
}

/// Extract per-command text bodies from an NX-API reply.
fn parse_nxapi(value: &Value, input: &str) -> Result<Vec<String>> {
    let output = value
        .pointer("/ins_api/outputs/output")
        .ok_or_else(|| CommandError::UnexpectedOutput {
            command: input.to_string(),
            output: value.to_string(),
        })?;
    let outputs = match output {
        Value::Array(items) => items.iter().collect::<Vec<_>>(),
        single => vec![single],
    };

    let mut bodies = Vec::with_capacity(outputs.len());
    for item in outputs {
        let code = item.get("code").and_then(Value::as_str).unwrap_or("200");
        if code != "200" {
            let message = item
                .get("clierror")
                .or_else(|| item.get("msg"))
                .and_then(Value::as_str)
                .unwrap_or("command failed");
            return Err(CommandError::Failed {
                command: item
                    .get("input")
                    .and_then(Value::as_str)
                    .unwrap_or(input)
                    .to_string(),
                message: message.trim().to_string(),
            }
            .into());
        }
        bodies.push(match item.get("body") {
            Some(Value::String(text)) => text.trim_end().to_string(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        });
    }
    Ok(bodies)
}

/// Quote `command` as a single POSIX shell word.
fn shell_quote(command: &str) -> String {
    format!("'{}'", command.replace('\'', r"'\''"))
}

fn content_range(start: u64, end: u64, total: u64) -> String {
    format!("{}-{}/{}", start, end.saturating_sub(1), total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_base_url_defaults() {
        let params = ConnectionParams::new("eos1", "ntc", "ntc123");
        let eos = HttpTransport::new(Platform::AristaEosEapi, &params).unwrap();
        assert_eq!(eos.base_url(), "http://eos1:80");

        let f5 = HttpTransport::new(Platform::F5TmosIcontrol, &params).unwrap();
        assert_eq!(f5.base_url(), "https://eos1:443");

        let params = params.with_scheme(Scheme::Https).with_port(8443);
        let nx = HttpTransport::new(Platform::CiscoNxosNxapi, &params).unwrap();
        assert_eq!(nx.base_url(), "https://eos1:8443");
        assert_eq!(nx.flavor(), ApiFlavor::Nxapi);
    }

    #[test]
    fn test_cli_platform_rejected() {
        let params = ConnectionParams::new("csr1", "ntc", "ntc123");
        assert!(HttpTransport::new(Platform::CiscoIosSsh, &params).is_err());
    }

    #[test]
    fn test_parse_eapi_success_and_error() {
        let ok = json!({"jsonrpc": "2.0", "id": "netauto", "result": [
            {"output": ""},
            {"output": "Hostname: eos1\nFQDN: eos1.lab\n"}
        ]});
        let outputs = parse_eapi(&ok, &["show hostname"]).unwrap();
        assert_eq!(outputs[1], "Hostname: eos1\nFQDN: eos1.lab");

        let err = json!({"jsonrpc": "2.0", "id": "netauto", "error": {
            "code": 1002,
            "message": "CLI command 2 of 2 'show bogus' failed: invalid command",
            "data": [{}, {"errors": ["Invalid input (at token 1: 'bogus')"]}]
        }});
        match parse_eapi(&err, &["show bogus"]).unwrap_err() {
            Error::Command(CommandError::Failed { message, .. }) => {
                assert_eq!(message, "Invalid input (at token 1: 'bogus')")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_nxapi_single_and_batch() {
        let single = json!({"ins_api": {"outputs": {"output": {
            "input": "show hostname", "msg": "Success", "code": "200", "body": "n9k1.lab \n"
        }}}});
        assert_eq!(parse_nxapi(&single, "show hostname").unwrap(), vec!["n9k1.lab"]);

        let batch = json!({"ins_api": {"outputs": {"output": [
            {"code": "200", "msg": "Success", "body": {}},
            {"code": "400", "msg": "CLI execution error", "clierror": "% Invalid command\n", "input": "bogus"}
        ]}}});
        match parse_nxapi(&batch, "interface e1/1 ; bogus").unwrap_err() {
            Error::Command(CommandError::Failed { command, message }) => {
                assert_eq!(command, "bogus");
                assert_eq!(message, "% Invalid command");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_shell_quote_and_content_range() {
        assert_eq!(shell_quote("tmsh show sys version"), "'tmsh show sys version'");
        assert_eq!(shell_quote("echo 'hi'"), r"'echo '\''hi'\'''");
        assert_eq!(content_range(0, 524288, 1000000), "0-524287/1000000");
    }

    #[tokio::test]
    async fn test_commands_require_open() {
        let params = ConnectionParams::new("eos1", "ntc", "ntc123");
        let mut eos = HttpTransport::new(Platform::AristaEosEapi, &params).unwrap();
        assert!(!eos.is_open());
        assert!(matches!(
            eos.send_command("show version", None).await.unwrap_err(),
            Error::Connection(ConnectionError::NotConnected)
        ));
    }
}

//! Transport layer: SSH, Telnet and HTTP management APIs behind one trait.
//!
//! Every session with a device goes through a [`Transport`]. Which one is
//! chosen depends on the platform and the caller's preference; the
//! [`Connector`] makes that choice and builds an unopened transport.

pub mod config;
#[cfg(feature = "http")]
mod http;
#[cfg(feature = "ssh")]
mod scp;
#[cfg(feature = "ssh")]
mod ssh;
#[cfg(feature = "telnet")]
mod telnet;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;

pub use config::{AuthMethod, HostKeyVerification, SshConfig};
#[cfg(feature = "http")]
pub use http::{ApiFlavor, HttpTransport};
#[cfg(feature = "ssh")]
pub use ssh::SshTransport;
#[cfg(feature = "telnet")]
pub use telnet::TelnetTransport;

use crate::channel::{InteractiveEvent, Response, SessionOptions};
use crate::config::{ConnectionParams, DeviceSpec};
use crate::error::{CommandError, ConfigError, Result};

/// Kind of management channel a transport speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Ssh,
    Telnet,
    Http,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Ssh => "ssh",
            TransportKind::Telnet => "telnet",
            TransportKind::Http => "http",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CLI transport requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionKind {
    Ssh,
    Telnet,
}

impl fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionKind::Ssh => "ssh",
            ConnectionKind::Telnet => "telnet",
        })
    }
}

impl FromStr for ConnectionKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ssh" => Ok(ConnectionKind::Ssh),
            "telnet" => Ok(ConnectionKind::Telnet),
            other => Err(ConfigError::Invalid {
                field: "connection",
                message: format!("expected ssh or telnet, got '{other}'"),
            }),
        }
    }
}

/// A session with one device.
///
/// Transports are created closed; `open` performs login and any prompt or
/// API negotiation. Command failures reported by the device surface as
/// [`CommandError::Failed`].
#[async_trait]
pub trait Transport: Send {
    async fn open(&mut self) -> Result<()>;

    /// Close the session. Closing a closed transport is a no-op.
    async fn close(&mut self) -> Result<()>;

    /// Run one command, returning its text output.
    async fn send_command(&mut self, command: &str, timeout: Option<Duration>) -> Result<String>;

    /// Apply configuration lines, returning the combined output.
    async fn send_config(&mut self, lines: &[String]) -> Result<String>;

    /// Run an interactive prompt/answer sequence.
    async fn send_interactive(&mut self, _events: &[InteractiveEvent]) -> Result<String> {
        Err(CommandError::NotSupported {
            transport: self.kind().as_str(),
            capability: "interactive commands",
        }
        .into())
    }

    /// Copy a local file to `remote_path` on the device.
    async fn upload_file(&mut self, _local: &Path, _remote_path: &str) -> Result<()> {
        Err(CommandError::NotSupported {
            transport: self.kind().as_str(),
            capability: "file upload",
        }
        .into())
    }

    fn is_open(&self) -> bool;

    fn kind(&self) -> TransportKind;
}

/// Builds unopened transports for devices.
pub trait Connector: Send + Sync {
    fn connect(&self, spec: &DeviceSpec) -> Result<Box<dyn Transport>>;
}

/// Connector choosing the transport from platform and caller preference.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConnector;

impl Connector for DefaultConnector {
    fn connect(&self, spec: &DeviceSpec) -> Result<Box<dyn Transport>> {
        let kind = spec.platform.transport_for(spec.params.connection)?;
        debug!("{}: using {} transport for {}", spec.label(), kind, spec.platform);
        match kind {
            TransportKind::Ssh => ssh_transport(spec),
            TransportKind::Telnet => telnet_transport(spec),
            TransportKind::Http => http_transport(spec),
        }
    }
}

#[cfg(feature = "ssh")]
fn ssh_transport(spec: &DeviceSpec) -> Result<Box<dyn Transport>> {
    let definition = crate::platform::vendors::cli_definition(spec.platform)?;
    let config = SshConfig::from_params(&spec.params, &definition);
    Ok(Box::new(SshTransport::new(
        config,
        definition,
        session_options(&spec.params),
    )))
}

#[cfg(not(feature = "ssh"))]
fn ssh_transport(_spec: &DeviceSpec) -> Result<Box<dyn Transport>> {
    Err(crate::Error::DependencyMissing { component: "ssh" })
}

#[cfg(feature = "telnet")]
fn telnet_transport(spec: &DeviceSpec) -> Result<Box<dyn Transport>> {
    let definition = crate::platform::vendors::cli_definition(spec.platform)?;
    Ok(Box::new(TelnetTransport::new(
        spec.params.host.clone(),
        spec.params.port_or(telnet::DEFAULT_PORT),
        definition,
        session_options(&spec.params),
    )))
}

#[cfg(not(feature = "telnet"))]
fn telnet_transport(_spec: &DeviceSpec) -> Result<Box<dyn Transport>> {
    Err(crate::Error::DependencyMissing { component: "telnet" })
}

#[cfg(feature = "http")]
fn http_transport(spec: &DeviceSpec) -> Result<Box<dyn Transport>> {
    Ok(Box::new(HttpTransport::new(spec.platform, &spec.params)?))
}

#[cfg(not(feature = "http"))]
fn http_transport(_spec: &DeviceSpec) -> Result<Box<dyn Transport>> {
    Err(crate::Error::DependencyMissing { component: "http" })
}

/// CLI session options derived from connection parameters.
pub(crate) fn session_options(params: &ConnectionParams) -> SessionOptions {
    SessionOptions {
        username: params.username.clone(),
        password: params.password.clone(),
        secret: params.secret.clone(),
        timeout: params.timeout,
        delay_factor: params.delay_factor,
    }
}

/// Turn a CLI response into text, or a command error when it failed.
pub(crate) fn response_text(response: Response) -> Result<String> {
    match response.failure_message {
        None => Ok(response.result),
        Some(_) => Err(CommandError::Failed {
            command: response.command,
            message: response.result,
        }
        .into()),
    }
}

/// Whether a TCP connection to `host:port` succeeds within `timeout`.
pub async fn is_reachable(host: &str, port: u16, timeout: Duration) -> bool {
    matches!(
        tokio::time::timeout(timeout, TcpStream::connect((host, port))).await,
        Ok(Ok(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionParams;
    use crate::error::Error;
    use crate::platform::Platform;

    #[test]
    fn test_connection_kind_parse() {
        assert_eq!("SSH".parse::<ConnectionKind>().unwrap(), ConnectionKind::Ssh);
        assert_eq!(
            "telnet".parse::<ConnectionKind>().unwrap(),
            ConnectionKind::Telnet
        );
        assert!("serial".parse::<ConnectionKind>().is_err());
    }

    #[test]
    fn test_connector_picks_transport_kind() {
        let connector = DefaultConnector;
        let ios = DeviceSpec::new(
            Platform::CiscoIosSsh,
            ConnectionParams::new("csr1", "ntc", "ntc123").with_connection(ConnectionKind::Telnet),
        );
        let eos = DeviceSpec::new(
            Platform::AristaEosEapi,
            ConnectionParams::new("eos1", "ntc", "ntc123"),
        );

        let telnet = connector.connect(&ios).unwrap();
        assert_eq!(telnet.kind(), TransportKind::Telnet);
        assert!(!telnet.is_open());

        let http = connector.connect(&eos).unwrap();
        assert_eq!(http.kind(), TransportKind::Http);
    }

    #[test]
    fn test_connector_rejects_telnet_for_asa() {
        let asa = DeviceSpec::new(
            Platform::CiscoAsaSsh,
            ConnectionParams::new("asa1", "ntc", "ntc123").with_connection(ConnectionKind::Telnet),
        );
        assert!(DefaultConnector.connect(&asa).is_err());
    }

    #[test]
    fn test_failed_response_becomes_error() {
        let response = Response {
            command: "show bogus".into(),
            result: "% Invalid input".into(),
            raw_result: String::new(),
            prompt: "rtr1#".into(),
            elapsed: Duration::ZERO,
            failure_message: Some("% Invalid input".into()),
        };
        assert!(matches!(
            response_text(response),
            Err(Error::Command(CommandError::Failed { .. }))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_port() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(is_reachable("127.0.0.1", port, Duration::from_secs(1)).await);
        drop(listener);
        assert!(!is_reachable("127.0.0.1", port, Duration::from_secs(1)).await);
    }
}

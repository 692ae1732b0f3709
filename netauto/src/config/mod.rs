//! Connection parameters and their resolution.
//!
//! Callers hand over loosely-typed [`ConnectionArgs`], optionally together
//! with a shared "provider" set and a named host from the
//! [`HostRegistry`]. [`DeviceSpec::resolve`] validates and merges them into
//! the strongly-typed [`ConnectionParams`] a device session needs.

mod registry;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

pub use registry::HostRegistry;

use crate::error::{ConfigError, Result};
use crate::platform::Platform;
use crate::transport::{ConnectionKind, HostKeyVerification};

/// Default per-operation timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// URL scheme for HTTP management APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

impl FromStr for Scheme {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            other => Err(ConfigError::Invalid {
                field: "transport",
                message: format!("expected http or https, got '{other}'"),
            }),
        }
    }
}

/// Connection arguments as supplied by a caller or a host registry entry.
///
/// Every field is optional; [`DeviceSpec::resolve`] decides which ones are
/// required.
#[derive(Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionArgs {
    pub platform: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub secret: Option<String>,
    /// `http` or `https` for API platforms.
    pub transport: Option<String>,
    /// `ssh` or `telnet` for CLI platforms.
    pub connection: Option<String>,
    /// Name of an entry in the host registry.
    pub ntc_host: Option<String>,
    /// Host registry file to look `ntc_host` up in.
    pub ntc_conf_file: Option<PathBuf>,
    /// Timeout in seconds.
    pub timeout: Option<u64>,
    pub delay_factor: Option<u32>,
    pub verify_certs: Option<bool>,
    pub key_file: Option<PathBuf>,
    pub host_key_verification: Option<HostKeyVerification>,
    pub known_hosts_path: Option<PathBuf>,
}

impl fmt::Debug for ConnectionArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionArgs")
            .field("platform", &self.platform)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "********"))
            .field("secret", &self.secret.as_ref().map(|_| "********"))
            .field("transport", &self.transport)
            .field("connection", &self.connection)
            .field("ntc_host", &self.ntc_host)
            .field("ntc_conf_file", &self.ntc_conf_file)
            .finish_non_exhaustive()
    }
}

/// Parameter pairs that cannot be combined.
const MUTUALLY_EXCLUSIVE: [(&str, &str); 7] = [
    ("host", "ntc_host"),
    ("ntc_host", "secret"),
    ("ntc_host", "transport"),
    ("ntc_host", "port"),
    ("ntc_conf_file", "secret"),
    ("ntc_conf_file", "transport"),
    ("ntc_conf_file", "port"),
];

impl ConnectionArgs {
    fn is_set(&self, field: &str) -> bool {
        match field {
            "host" => self.host.is_some(),
            "ntc_host" => self.ntc_host.is_some(),
            "ntc_conf_file" => self.ntc_conf_file.is_some(),
            "secret" => self.secret.is_some(),
            "transport" => self.transport.is_some(),
            "port" => self.port.is_some(),
            _ => false,
        }
    }

    /// Reject parameter combinations that cannot be honored together.
    pub fn check_exclusive(&self) -> Result<()> {
        for (first, second) in MUTUALLY_EXCLUSIVE {
            if self.is_set(first) && self.is_set(second) {
                return Err(ConfigError::MutuallyExclusive { first, second }.into());
            }
        }
        Ok(())
    }

    /// Fill unset fields from `provider`. Values already set here win.
    pub fn merged_with(&self, provider: &ConnectionArgs) -> ConnectionArgs {
        let local = self.clone();
        let p = provider.clone();
        ConnectionArgs {
            platform: local.platform.or(p.platform),
            host: local.host.or(p.host),
            port: local.port.or(p.port),
            username: local.username.or(p.username),
            password: local.password.or(p.password),
            secret: local.secret.or(p.secret),
            transport: local.transport.or(p.transport),
            connection: local.connection.or(p.connection),
            ntc_host: local.ntc_host.or(p.ntc_host),
            ntc_conf_file: local.ntc_conf_file.or(p.ntc_conf_file),
            timeout: local.timeout.or(p.timeout),
            delay_factor: local.delay_factor.or(p.delay_factor),
            verify_certs: local.verify_certs.or(p.verify_certs),
            key_file: local.key_file.or(p.key_file),
            host_key_verification: local.host_key_verification.or(p.host_key_verification),
            known_hosts_path: local.known_hosts_path.or(p.known_hosts_path),
        }
    }
}

/// Validated connection parameters for one device.
#[derive(Debug, Clone)]
pub struct ConnectionParams {
    pub host: String,
    /// Explicit port; the transport default applies when `None`.
    pub port: Option<u16>,
    pub username: String,
    pub password: SecretString,
    pub secret: Option<SecretString>,
    pub scheme: Option<Scheme>,
    pub connection: Option<ConnectionKind>,
    pub timeout: Duration,
    pub delay_factor: Option<u32>,
    pub verify_certs: bool,
    pub key_file: Option<PathBuf>,
    pub host_key_verification: HostKeyVerification,
    pub known_hosts_path: Option<PathBuf>,
}

impl ConnectionParams {
    pub fn new(host: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            username: username.into(),
            password: SecretString::from(password.into()),
            secret: None,
            scheme: None,
            connection: None,
            timeout: DEFAULT_TIMEOUT,
            delay_factor: None,
            verify_certs: false,
            key_file: None,
            host_key_verification: HostKeyVerification::default(),
            known_hosts_path: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(SecretString::from(secret.into()));
        self
    }

    pub fn with_scheme(mut self, scheme: Scheme) -> Self {
        self.scheme = Some(scheme);
        self
    }

    pub fn with_connection(mut self, connection: ConnectionKind) -> Self {
        self.connection = Some(connection);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_delay_factor(mut self, factor: u32) -> Self {
        self.delay_factor = Some(factor);
        self
    }

    /// Port to dial, falling back to `default`.
    pub fn port_or(&self, default: u16) -> u16 {
        self.port.unwrap_or(default)
    }
}

/// A fully resolved device: platform plus connection parameters.
#[derive(Debug, Clone)]
pub struct DeviceSpec {
    /// Registry name, when the device was resolved from one.
    pub name: Option<String>,
    pub platform: Platform,
    pub params: ConnectionParams,
}

impl DeviceSpec {
    pub fn new(platform: Platform, params: ConnectionParams) -> Self {
        Self {
            name: None,
            platform,
            params,
        }
    }

    /// Name used in logs and fleet results.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.params.host)
    }

    /// Resolve caller arguments into a device.
    ///
    /// `local` wins over `provider` field by field. When `ntc_host` is set
    /// the device comes from the host registry instead.
    pub fn resolve(local: &ConnectionArgs, provider: Option<&ConnectionArgs>) -> Result<DeviceSpec> {
        local.check_exclusive()?;
        if let Some(provider) = provider {
            provider.check_exclusive()?;
        }
        let merged = match provider {
            Some(provider) => local.merged_with(provider),
            None => local.clone(),
        };

        if let Some(name) = &merged.ntc_host {
            let path = match &merged.ntc_conf_file {
                Some(path) => path.clone(),
                None => HostRegistry::default_path().ok_or(ConfigError::Missing {
                    field: "ntc_conf_file",
                })?,
            };
            return HostRegistry::load(&path)?.get(name);
        }

        Self::from_args(&merged)
    }

    /// Build a device from explicit arguments.
    pub(crate) fn from_args(args: &ConnectionArgs) -> Result<DeviceSpec> {
        let platform: Platform = args
            .platform
            .as_deref()
            .ok_or(ConfigError::Missing { field: "platform" })?
            .parse()?;
        let host = args.host.clone().ok_or(ConfigError::Missing { field: "host" })?;
        let username = args
            .username
            .clone()
            .ok_or(ConfigError::Missing { field: "username" })?;
        let password = args
            .password
            .clone()
            .ok_or(ConfigError::Missing { field: "password" })?;

        let mut params = ConnectionParams::new(host, username, password);
        params.port = args.port;
        params.secret = args.secret.clone().map(SecretString::from);
        params.scheme = args.transport.as_deref().map(str::parse::<Scheme>).transpose()?;
        params.connection = args.connection.as_deref().map(str::parse::<ConnectionKind>).transpose()?;
        if let Some(secs) = args.timeout {
            params.timeout = Duration::from_secs(secs);
        }
        params.delay_factor = args.delay_factor;
        params.verify_certs = args.verify_certs.unwrap_or(false);
        params.key_file = args.key_file.clone();
        if let Some(mode) = &args.host_key_verification {
            params.host_key_verification = mode.clone();
        }
        params.known_hosts_path = args.known_hosts_path.clone();

        platform.transport_for(params.connection)?;
        Ok(DeviceSpec::new(platform, params))
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;
    use crate::error::{ConnectionError, Error};

    fn args(platform: &str, host: &str) -> ConnectionArgs {
        ConnectionArgs {
            platform: Some(platform.into()),
            host: Some(host.into()),
            username: Some("ntc".into()),
            password: Some("ntc123".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_explicit_arguments() {
        let mut local = args("cisco_nxos_nxapi", "n9k1");
        local.transport = Some("https".into());
        local.port = Some(8443);

        let spec = DeviceSpec::resolve(&local, None).unwrap();
        assert_eq!(spec.platform, Platform::CiscoNxosNxapi);
        assert_eq!(spec.params.host, "n9k1");
        assert_eq!(spec.params.port_or(443), 8443);
        assert_eq!(spec.params.scheme, Some(Scheme::Https));
        assert_eq!(spec.params.timeout, DEFAULT_TIMEOUT);
        assert_eq!(spec.label(), "n9k1");
    }

    #[test]
    fn test_local_overrides_provider() {
        let local = ConnectionArgs {
            host: Some("csr2".into()),
            ..Default::default()
        };
        let provider = args("cisco_ios_ssh", "csr1");

        let spec = DeviceSpec::resolve(&local, Some(&provider)).unwrap();
        assert_eq!(spec.params.host, "csr2");
        assert_eq!(spec.params.username, "ntc");
        assert_eq!(spec.params.password.expose_secret(), "ntc123");
    }

    #[test]
    fn test_mutually_exclusive_pairs() {
        let mut local = args("cisco_ios_ssh", "csr1");
        local.ntc_host = Some("csr1".into());
        let err = DeviceSpec::resolve(&local, None).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::MutuallyExclusive {
                first: "host",
                second: "ntc_host"
            })
        ));

        let local = ConnectionArgs {
            ntc_conf_file: Some("hosts.toml".into()),
            port: Some(22),
            ..Default::default()
        };
        assert!(DeviceSpec::resolve(&local, None).is_err());
    }

    #[test]
    fn test_missing_fields() {
        let mut local = args("cisco_ios_ssh", "csr1");
        local.password = None;
        let err = DeviceSpec::resolve(&local, None).unwrap_err();
        assert!(matches!(
            err,
            Error::Config(ConfigError::Missing { field: "password" })
        ));

        let mut local = args("cisco_ios_ssh", "csr1");
        local.platform = None;
        assert!(DeviceSpec::resolve(&local, None).is_err());
    }

    #[test]
    fn test_telnet_policy_applied_at_resolution() {
        let mut local = args("cisco_ios_ssh", "csr1");
        local.connection = Some("telnet".into());
        let spec = DeviceSpec::resolve(&local, None).unwrap();
        assert_eq!(spec.params.connection, Some(ConnectionKind::Telnet));

        let mut local = args("cisco_asa_ssh", "asa1");
        local.connection = Some("telnet".into());
        let err = DeviceSpec::resolve(&local, None).unwrap_err();
        assert!(matches!(
            err,
            Error::Connection(ConnectionError::UnsupportedTransport { .. })
        ));
    }

    #[test]
    fn test_bad_scheme_is_invalid() {
        let mut local = args("arista_eos_eapi", "eos1");
        local.transport = Some("ftp".into());
        assert!(matches!(
            DeviceSpec::resolve(&local, None).unwrap_err(),
            Error::Config(ConfigError::Invalid { field: "transport", .. })
        ));
    }

    #[test]
    fn test_debug_redacts_password() {
        let rendered = format!("{:?}", args("cisco_ios_ssh", "csr1"));
        assert!(!rendered.contains("ntc123"));
    }
}

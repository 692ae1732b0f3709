//! SSH connection configuration.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::config::ConnectionParams;
use crate::platform::PlatformDefinition;

/// Default SSH port.
pub const SSH_PORT: u16 = 22;

/// Host key verification mode, analogous to OpenSSH's `StrictHostKeyChecking`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyVerification {
    /// Reject unknown and changed keys.
    Strict,

    /// Learn unknown keys, reject changed ones.
    #[default]
    AcceptNew,

    /// Accept any key. Lab use only.
    Disabled,
}

/// Authentication method for SSH connections.
#[derive(Debug, Clone)]
pub enum AuthMethod {
    Password(SecretString),

    PrivateKey {
        path: PathBuf,
        passphrase: Option<SecretString>,
    },
}

/// SSH connection configuration.
#[derive(Debug, Clone)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: AuthMethod,
    pub timeout: Duration,
    pub terminal_width: u32,
    pub terminal_height: u32,
    pub host_key_verification: HostKeyVerification,
    pub known_hosts_path: Option<PathBuf>,
}

impl SshConfig {
    /// SSH settings for a CLI session on `params`.
    ///
    /// A key file takes precedence over the password.
    pub fn from_params(params: &ConnectionParams, definition: &PlatformDefinition) -> Self {
        let mut config = Self::for_file_transfer(params);
        config.port = params.port_or(SSH_PORT);
        config.terminal_width = definition.terminal_width;
        config.terminal_height = definition.terminal_height;
        config
    }

    /// SSH settings for a side channel to an API-managed device.
    ///
    /// Always dials port 22; the configured port belongs to the API.
    pub fn for_file_transfer(params: &ConnectionParams) -> Self {
        let auth = match &params.key_file {
            Some(path) => AuthMethod::PrivateKey {
                path: path.clone(),
                passphrase: None,
            },
            None => AuthMethod::Password(params.password.clone()),
        };
        Self {
            host: params.host.clone(),
            port: SSH_PORT,
            username: params.username.clone(),
            auth,
            timeout: params.timeout,
            terminal_width: 511,
            terminal_height: 24,
            host_key_verification: params.host_key_verification.clone(),
            known_hosts_path: params.known_hosts_path.clone(),
        }
    }
}

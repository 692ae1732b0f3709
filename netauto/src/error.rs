//! Error types for netauto.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::platform::Platform;

/// Main error type for netauto operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection-level errors (auth, reachability, transport mismatch)
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// Command execution errors
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    /// Template index or template definition errors
    #[error("Template error: {0}")]
    Template(#[from] TemplateError),

    /// Connection parameter resolution errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The vendor has no equivalent for the requested operation
    #[error("Operation '{operation}' is not supported on platform {platform}")]
    UnsupportedOperation {
        operation: &'static str,
        platform: Platform,
    },

    /// A precondition on the operation's options was violated
    #[error("Unsupported option: {message}")]
    UnsupportedOption { message: String },

    /// Checkpoint or rollback failed on the device
    #[error("Checkpoint/rollback failed: {message}")]
    CheckpointOrRollback { message: String },

    /// A transport was requested that this build does not include
    #[error("Missing dependency: {component} support is not compiled in")]
    DependencyMissing { component: &'static str },

    /// Local I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Shorthand for [`Error::UnsupportedOption`].
    pub(crate) fn option(message: impl Into<String>) -> Self {
        Error::UnsupportedOption {
            message: message.into(),
        }
    }

    /// Whether this error is a connection-level failure.
    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection(_))
    }
}

/// Connection errors (SSH, Telnet, HTTP API).
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// Failed to connect to host
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[cfg(feature = "ssh")]
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// HTTP client error
    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with an error status or an error payload
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// Host key changed since it was recorded
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// Host key unknown in strict mode
    #[error("Host key for {host}:{port} is not in known_hosts")]
    HostKeyUnknown { host: String, port: u16 },

    /// known_hosts could not be read or written
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// The platform cannot be reached over the requested transport
    #[error("Transport '{transport}' is not supported for platform {platform}")]
    UnsupportedTransport { platform: Platform, transport: String },

    /// Operation attempted before `open()`
    #[error("Not connected - call open() first")]
    NotConnected,

    /// Connection was closed unexpectedly
    #[error("Connection disconnected")]
    Disconnected,

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Command execution errors.
#[derive(Error, Debug)]
pub enum CommandError {
    /// The device reported an error for the command
    #[error("Command '{command}' failed: {message}")]
    Failed { command: String, message: String },

    /// Prompt or interactive pattern not seen in time
    #[error("Pattern not found within {0:?}")]
    PatternTimeout(Duration),

    /// Output could not be interpreted
    #[error("Unexpected output for '{command}': {output}")]
    UnexpectedOutput { command: String, output: String },

    /// Failed to acquire target privilege level
    #[error("Failed to acquire privilege level '{target}'")]
    PrivilegeAcquisitionFailed { target: String },

    /// Unknown privilege level detected
    #[error("Unknown privilege level from prompt: '{prompt}'")]
    UnknownPrivilege { prompt: String },

    /// No path found between privilege levels
    #[error("No path from privilege '{from}' to '{to}'")]
    NoPrivilegePath { from: String, to: String },

    /// Invalid regex pattern in an interactive event or prompt
    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// The transport cannot carry this kind of request
    #[error("{capability} is not available over {transport}")]
    NotSupported {
        transport: &'static str,
        capability: &'static str,
    },
}

/// Template index and TextFSM template errors.
#[derive(Error, Debug)]
pub enum TemplateError {
    /// File could not be read
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Syntax error in an index or template file
    #[error("Syntax error at line {line}: {message}")]
    Syntax { line: usize, message: String },

    /// Regex in a template failed to compile
    #[error("Invalid regex at line {line}: {source}")]
    Regex {
        line: usize,
        #[source]
        source: regex::Error,
    },

    /// Template raised an `Error` action while parsing
    #[error("Template rule raised error at input line {line}: {message}")]
    Raised { line: usize, message: String },

    /// No index record matched the command and platform
    #[error("No template for command '{command}' on platform '{platform}'")]
    NoTemplate { command: String, platform: String },
}

/// Connection parameter and host registry errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required parameter was not supplied
    #[error("{field} is required")]
    Missing { field: &'static str },

    /// Two parameters that cannot be combined were supplied
    #[error("parameters are mutually exclusive: {first}|{second}")]
    MutuallyExclusive {
        first: &'static str,
        second: &'static str,
    },

    /// Unknown platform identifier
    #[error("Unknown platform '{0}'")]
    UnknownPlatform(String),

    /// Named host missing from the registry
    #[error("Host '{name}' not found in {path}")]
    UnknownHost { name: String, path: PathBuf },

    /// Registry file could not be read
    #[error("Cannot read host registry {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Registry file is not valid TOML
    #[error("Invalid host registry {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A parameter value is malformed
    #[error("Invalid value for {field}: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

/// Result type alias using netauto's Error.
pub type Result<T> = std::result::Result<T, Error>;

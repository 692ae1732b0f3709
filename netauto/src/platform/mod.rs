//! Platform identifiers, CLI prompt definitions and vendor dispatch.
//!
//! A [`Platform`] selects two things: which transport a session uses and
//! which [`Vendor`] implementation translates the uniform operation set into
//! that vendor's commands. CLI platforms additionally carry a
//! [`PlatformDefinition`] describing prompts and privilege levels.

mod definition;
mod privilege_level;
mod registry;
pub mod vendors;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use definition::PlatformDefinition;
pub use privilege_level::PrivilegeLevel;
pub use registry::{VendorRegistry, vendor_for};

use crate::device::{BootState, Facts, InstallEffect, InstallRequest, RebootOptions};
use crate::error::{ConfigError, Error, Result};
use crate::transport::{ConnectionKind, Transport, TransportKind};

/// Vendor and management-plane identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "cisco_nxos_nxapi")]
    CiscoNxosNxapi,
    #[serde(rename = "cisco_ios_ssh")]
    CiscoIosSsh,
    #[serde(rename = "cisco_asa_ssh")]
    CiscoAsaSsh,
    #[serde(rename = "cisco_aireos_ssh")]
    CiscoAireosSsh,
    #[serde(rename = "arista_eos_eapi")]
    AristaEosEapi,
    #[serde(rename = "f5_tmos_icontrol")]
    F5TmosIcontrol,
    #[serde(rename = "juniper_junos_netconf", alias = "juniper_junos")]
    JuniperJunos,
}

impl Platform {
    /// Every supported platform, in declaration order.
    pub const ALL: [Platform; 7] = [
        Platform::CiscoNxosNxapi,
        Platform::CiscoIosSsh,
        Platform::CiscoAsaSsh,
        Platform::CiscoAireosSsh,
        Platform::AristaEosEapi,
        Platform::F5TmosIcontrol,
        Platform::JuniperJunos,
    ];

    /// Canonical identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::CiscoNxosNxapi => "cisco_nxos_nxapi",
            Platform::CiscoIosSsh => "cisco_ios_ssh",
            Platform::CiscoAsaSsh => "cisco_asa_ssh",
            Platform::CiscoAireosSsh => "cisco_aireos_ssh",
            Platform::AristaEosEapi => "arista_eos_eapi",
            Platform::F5TmosIcontrol => "f5_tmos_icontrol",
            Platform::JuniperJunos => "juniper_junos_netconf",
        }
    }

    /// Platform name as used in TextFSM template indexes (`cisco_ios`, ...).
    pub fn template_name(&self) -> &'static str {
        match self {
            Platform::CiscoNxosNxapi => "cisco_nxos",
            Platform::CiscoIosSsh => "cisco_ios",
            Platform::CiscoAsaSsh => "cisco_asa",
            Platform::CiscoAireosSsh => "cisco_wlc_ssh",
            Platform::AristaEosEapi => "arista_eos",
            Platform::F5TmosIcontrol => "f5_tmos",
            Platform::JuniperJunos => "juniper_junos",
        }
    }

    /// Transport used when the caller does not ask for a specific one.
    pub fn default_transport(&self) -> TransportKind {
        match self {
            Platform::CiscoNxosNxapi | Platform::AristaEosEapi | Platform::F5TmosIcontrol => {
                TransportKind::Http
            }
            Platform::CiscoIosSsh
            | Platform::CiscoAsaSsh
            | Platform::CiscoAireosSsh
            | Platform::JuniperJunos => TransportKind::Ssh,
        }
    }

    /// Resolve the transport for an optional caller preference.
    ///
    /// Telnet is only accepted for Cisco IOS; HTTP platforms accept no
    /// CLI preference at all.
    pub fn transport_for(&self, requested: Option<ConnectionKind>) -> Result<TransportKind> {
        let default = self.default_transport();
        match (requested, default) {
            (None, kind) => Ok(kind),
            (Some(ConnectionKind::Ssh), TransportKind::Ssh) => Ok(TransportKind::Ssh),
            (Some(ConnectionKind::Telnet), TransportKind::Ssh) if self.allows_telnet() => {
                Ok(TransportKind::Telnet)
            }
            (Some(requested), _) => Err(crate::error::ConnectionError::UnsupportedTransport {
                platform: *self,
                transport: requested.to_string(),
            }
            .into()),
        }
    }

    /// Only Cisco IOS may be managed over Telnet.
    pub fn allows_telnet(&self) -> bool {
        matches!(self, Platform::CiscoIosSsh)
    }

    /// Platforms whose vendor supports a scheduled (`timer`) reboot.
    pub fn supports_delayed_reboot(&self) -> bool {
        matches!(self, Platform::CiscoIosSsh | Platform::JuniperJunos)
    }

    /// Dual-partition platforms that need a target volume for install and reboot.
    pub fn requires_volume(&self) -> bool {
        matches!(self, Platform::F5TmosIcontrol)
    }

    /// Platforms without configuration checkpoints.
    pub fn supports_rollback(&self) -> bool {
        !matches!(self, Platform::CiscoAireosSsh | Platform::F5TmosIcontrol)
    }

    /// NX-OS installs immediately, so an install always implies a reboot.
    pub fn install_requires_reboot(&self) -> bool {
        matches!(self, Platform::CiscoNxosNxapi)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "cisco_nxos_nxapi" => Ok(Platform::CiscoNxosNxapi),
            "cisco_ios_ssh" | "cisco_ios" => Ok(Platform::CiscoIosSsh),
            "cisco_asa_ssh" => Ok(Platform::CiscoAsaSsh),
            "cisco_aireos_ssh" => Ok(Platform::CiscoAireosSsh),
            "arista_eos_eapi" => Ok(Platform::AristaEosEapi),
            "f5_tmos_icontrol" => Ok(Platform::F5TmosIcontrol),
            "juniper_junos_netconf" | "juniper_junos" => Ok(Platform::JuniperJunos),
            other => Err(ConfigError::UnknownPlatform(other.to_string())),
        }
    }
}

/// Vendor-specific implementation of the uniform device operations.
///
/// Implementations are stateless: every call receives the open transport of
/// the session it runs in. Operations a vendor has no equivalent for keep the
/// default body, which reports [`Error::UnsupportedOperation`].
#[async_trait]
pub trait Vendor: Send + Sync {
    /// Platform this implementation serves.
    fn platform(&self) -> Platform;

    /// File system prefix used when the caller does not name one.
    fn default_file_system(&self) -> &'static str;

    /// Build the remote path of `file` on `file_system`.
    fn remote_path(&self, file_system: &str, file: &str) -> String {
        format!("{file_system}{file}")
    }

    /// Gather basic device facts.
    async fn facts(&self, transport: &mut dyn Transport) -> Result<Facts>;

    /// Apply configuration lines.
    async fn configure(&self, transport: &mut dyn Transport, lines: &[String]) -> Result<String> {
        transport.send_config(lines).await
    }

    /// Read the current boot configuration. Never mutates.
    async fn get_boot_options(&self, transport: &mut dyn Transport) -> Result<BootState>;

    /// Whether `current` already runs what `request` asks for.
    fn is_installed(&self, current: &BootState, request: &InstallRequest) -> bool {
        current.satisfies(&request.desired())
    }

    /// Whether `set_boot_options` stages an image that only shows up in the
    /// boot state after the next boot.
    fn stages_boot_image(&self) -> bool {
        false
    }

    /// Set boot variables without rebooting.
    async fn set_boot_options(
        &self,
        _transport: &mut dyn Transport,
        _image: &str,
        _kickstart: Option<&str>,
    ) -> Result<()> {
        Err(self.unsupported("set_boot_options"))
    }

    /// Install an image. May reboot the device, reported through the effect.
    async fn install_os(
        &self,
        _transport: &mut dyn Transport,
        _request: &InstallRequest,
    ) -> Result<InstallEffect> {
        Err(self.unsupported("install_os"))
    }

    /// Issue the reboot. Options are validated before this is called.
    async fn reboot(&self, transport: &mut dyn Transport, options: &RebootOptions) -> Result<()>;

    /// Save the running configuration under `name` on the device.
    async fn checkpoint(&self, _transport: &mut dyn Transport, _name: &str) -> Result<()> {
        Err(self.unsupported("checkpoint"))
    }

    /// Replace the running configuration with the checkpoint `name`.
    async fn rollback(&self, _transport: &mut dyn Transport, _name: &str) -> Result<()> {
        Err(self.unsupported("rollback"))
    }

    /// Save the running configuration to startup, or to `remote` when given.
    ///
    /// Returns whether the device confirmed the save.
    async fn save_config(&self, transport: &mut dyn Transport, remote: Option<&str>)
    -> Result<bool>;

    /// Fetch the running configuration as text.
    async fn running_config(&self, transport: &mut dyn Transport) -> Result<String>;

    /// MD5 of a remote file, or `None` when it does not exist.
    async fn remote_md5(&self, _transport: &mut dyn Transport, _path: &str) -> Result<Option<String>> {
        Err(self.unsupported("file_copy"))
    }

    /// Push a local file to `remote_path`.
    async fn upload(
        &self,
        transport: &mut dyn Transport,
        local: &Path,
        remote_path: &str,
    ) -> Result<()> {
        transport.upload_file(local, remote_path).await
    }

    /// Build the error for an operation this vendor does not implement.
    fn unsupported(&self, operation: &'static str) -> Error {
        Error::UnsupportedOperation {
            operation,
            platform: self.platform(),
        }
    }
}

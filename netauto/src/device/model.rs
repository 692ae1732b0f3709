//! Data exchanged between the device facade, vendors and operations.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::parse::ParsedRow;
use crate::platform::Platform;

/// Current boot-image configuration of a device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootState {
    #[serde(rename = "sys")]
    pub system_image: String,

    /// `None` means no kickstart image is required.
    #[serde(rename = "kick", default, skip_serializing_if = "Option::is_none")]
    pub kickstart_image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_volume: Option<String>,

    /// Image fully installed on each volume, active or not.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub volumes: IndexMap<String, String>,
}

impl BootState {
    pub fn new(system_image: impl Into<String>) -> Self {
        Self {
            system_image: system_image.into(),
            ..Default::default()
        }
    }

    pub fn with_kickstart(mut self, kickstart: Option<&str>) -> Self {
        self.kickstart_image = normalize_image(kickstart);
        self
    }

    pub fn with_active_volume(mut self, volume: impl Into<String>) -> Self {
        self.active_volume = Some(volume.into());
        self
    }

    pub fn with_volume_image(mut self, volume: impl Into<String>, image: impl Into<String>) -> Self {
        self.volumes.insert(volume.into(), image.into());
        self
    }

    /// Whether `image` is completely installed on `volume`.
    pub fn has_image_on(&self, volume: &str, image: &str) -> bool {
        self.volumes.get(volume).is_some_and(|installed| installed == image)
    }

    /// Whether this state already fulfils `desired`.
    ///
    /// Kickstart and volume are only compared when `desired` names them.
    pub fn satisfies(&self, desired: &BootState) -> bool {
        if self.system_image != desired.system_image {
            return false;
        }
        if desired.kickstart_image.is_some() && self.kickstart_image != desired.kickstart_image {
            return false;
        }
        if desired.active_volume.is_some() && self.active_volume != desired.active_volume {
            return false;
        }
        true
    }
}

/// Canonical form of an optional image name: blank and `"null"` are `None`.
pub fn normalize_image(image: Option<&str>) -> Option<String> {
    image
        .map(str::trim)
        .filter(|i| !i.is_empty() && !i.eq_ignore_ascii_case("null"))
        .map(str::to_string)
}

/// What the caller wants installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRequest {
    pub system_image: String,
    pub kickstart_image: Option<String>,

    /// Target volume on dual-partition platforms.
    pub volume: Option<String>,

    /// Reboot to finish the installation.
    pub reboot: bool,
}

impl InstallRequest {
    pub fn new(system_image: impl Into<String>) -> Self {
        Self {
            system_image: system_image.into(),
            kickstart_image: None,
            volume: None,
            reboot: false,
        }
    }

    pub fn with_kickstart(mut self, kickstart: Option<&str>) -> Self {
        self.kickstart_image = normalize_image(kickstart);
        self
    }

    pub fn with_volume(mut self, volume: impl Into<String>) -> Self {
        self.volume = normalize_image(Some(&volume.into()));
        self
    }

    pub fn with_reboot(mut self, reboot: bool) -> Self {
        self.reboot = reboot;
        self
    }

    /// Check the request against what `platform` can do.
    pub fn validate(&self, platform: Platform) -> Result<()> {
        if platform.requires_volume() && self.volume.is_none() {
            return Err(Error::option(format!("volume is required on {platform}")));
        }
        if !platform.requires_volume() && self.volume.is_some() {
            return Err(Error::option(format!("volume is not supported on {platform}")));
        }
        if platform.install_requires_reboot() && !self.reboot {
            return Err(Error::option(format!(
                "installing on {platform} reloads the device, reboot must be set to true"
            )));
        }
        Ok(())
    }

    /// The boot state a successful install leaves behind.
    pub fn desired(&self) -> BootState {
        BootState {
            system_image: self.system_image.clone(),
            kickstart_image: self.kickstart_image.clone(),
            active_volume: self.volume.clone(),
            volumes: IndexMap::new(),
        }
    }
}

/// Side effects of a vendor install.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstallEffect {
    /// The device went down for a reload as part of the install.
    pub reboots: bool,

    /// The image only takes effect on the next boot, so the boot state read
    /// back now still shows the running image.
    pub staged: bool,
}

/// Reboot parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebootOptions {
    /// Must be `true`; nothing is sent otherwise.
    pub confirm: bool,

    /// Delay in minutes before the device reboots itself.
    pub timer: Option<u32>,

    /// Volume to boot from on dual-partition platforms.
    pub volume: Option<String>,
}

impl RebootOptions {
    pub fn confirmed() -> Self {
        Self {
            confirm: true,
            ..Default::default()
        }
    }

    pub fn with_timer(mut self, minutes: u32) -> Self {
        self.timer = Some(minutes);
        self
    }

    pub fn with_volume(mut self, volume: impl Into<String>) -> Self {
        self.volume = Some(volume.into());
        self
    }

    /// Refuse unconfirmed reboots and options `platform` has no use for.
    pub fn validate(&self, platform: Platform) -> Result<()> {
        if !self.confirm {
            return Err(Error::option(
                "confirm must be set to true for the reboot to be sent",
            ));
        }
        if self.timer.is_some() && !platform.supports_delayed_reboot() {
            return Err(Error::option(format!("timer is not supported on {platform}")));
        }
        if self.volume.is_some() && !platform.requires_volume() {
            return Err(Error::option(format!("volume is not supported on {platform}")));
        }
        Ok(())
    }
}

/// Basic facts about a device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facts {
    pub hostname: String,
    pub fqdn: String,
    pub vendor: String,
    pub model: String,
    pub os_version: String,
    pub serial_number: String,

    /// Uptime in seconds.
    pub uptime: Option<u64>,

    /// Uptime as `DD:HH:MM:SS`.
    pub uptime_string: String,

    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub vlans: Vec<String>,
}

/// Output of one show command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ShowOutput {
    Text(String),
    Structured(Vec<ParsedRow>),
}

impl ShowOutput {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ShowOutput::Text(text) => Some(text),
            ShowOutput::Structured(_) => None,
        }
    }
}

/// Ordered command to output mapping returned by `show`.
pub type ShowResults = IndexMap<String, ShowOutput>;

//! Vendor-dispatching device facade.
//!
//! A [`Device`] owns the session with one device and routes the uniform
//! operation set to the [`Vendor`] registered for its platform. The
//! transport is built lazily by a [`Connector`] on [`Device::open`].
//!
//! # Example
//!
//! ```rust,no_run
//! use netauto::config::{ConnectionParams, DeviceSpec};
//! use netauto::device::Device;
//! use netauto::platform::Platform;
//!
//! # async fn example() -> Result<(), netauto::Error> {
//! let spec = DeviceSpec::new(
//!     Platform::CiscoIosSsh,
//!     ConnectionParams::new("192.0.2.10", "ntc", "ntc123").with_secret("enable123"),
//! );
//! let mut device = Device::new(spec);
//! device.open().await?;
//!
//! let boot = device.boot_options().await?;
//! println!("booting {}", boot.system_image);
//!
//! device.close().await?;
//! # Ok(())
//! # }
//! ```

mod model;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};
use md5::{Digest, Md5};
use tokio::io::{AsyncReadExt, BufReader};

pub use model::{
    BootState, Facts, InstallEffect, InstallRequest, RebootOptions, ShowOutput, ShowResults,
    normalize_image,
};

use crate::config::DeviceSpec;
use crate::error::{CommandError, ConnectionError, Error, Result};
use crate::parse::{OutputParser, Parsed};
use crate::platform::{Platform, Vendor, vendor_for};
use crate::transport::{Connector, DefaultConnector, Transport};

/// A resolved file copy: local source, remote destination and local checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTransfer {
    pub local_file: PathBuf,
    pub remote_file: String,
    pub file_system: String,
    pub md5: String,
}

/// Session with one device.
pub struct Device {
    spec: DeviceSpec,
    vendor: Arc<dyn Vendor>,
    connector: Arc<dyn Connector>,
    parser: Option<Arc<OutputParser>>,

    /// Current transport (None before the first open and after close).
    transport: Option<Box<dyn Transport>>,

    /// Cleared when any transport of this device failed to close.
    atomic: bool,
}

impl Device {
    /// Create a device using the registered vendor and the default connector.
    pub fn new(spec: DeviceSpec) -> Self {
        Self {
            vendor: vendor_for(spec.platform),
            connector: Arc::new(DefaultConnector),
            parser: None,
            transport: None,
            atomic: true,
            spec,
        }
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_vendor(mut self, vendor: Arc<dyn Vendor>) -> Self {
        self.vendor = vendor;
        self
    }

    /// Structure `show` output with this parser when a template matches.
    pub fn with_parser(mut self, parser: Arc<OutputParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    pub fn spec(&self) -> &DeviceSpec {
        &self.spec
    }

    pub fn platform(&self) -> Platform {
        self.spec.platform
    }

    pub fn vendor(&self) -> &dyn Vendor {
        self.vendor.as_ref()
    }

    pub fn label(&self) -> &str {
        self.spec.label()
    }

    pub fn is_open(&self) -> bool {
        self.transport.as_ref().is_some_and(|t| t.is_open())
    }

    /// Open the session. Opening an open device is a no-op.
    pub async fn open(&mut self) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        if self.transport.is_none() {
            self.transport = Some(self.connector.connect(&self.spec)?);
        }
        let Some(transport) = self.transport.as_mut() else {
            return Err(ConnectionError::NotConnected.into());
        };
        info!(
            "{}: opening {} session ({})",
            self.spec.label(),
            transport.kind(),
            self.spec.platform
        );
        transport.open().await
    }

    /// Close the session. Closing a closed device is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut transport) = self.transport.take() {
            debug!("{}: closing {} session", self.spec.label(), transport.kind());
            transport.close().await?;
        }
        Ok(())
    }

    /// Close the session without failing.
    ///
    /// Returns whether every transport used since the last release closed
    /// cleanly.
    pub async fn release(&mut self) -> bool {
        self.discard().await;
        std::mem::replace(&mut self.atomic, true)
    }

    /// Close the current transport, recording a failure instead of raising it.
    async fn discard(&mut self) {
        if let Err(e) = self.close().await {
            warn!("{}: close failed: {}", self.spec.label(), e);
            self.atomic = false;
        }
    }

    /// Drop the current session and open a fresh one.
    ///
    /// Used after the device went down; the old session is discarded first.
    pub async fn reopen(&mut self) -> Result<()> {
        self.discard().await;
        self.open().await
    }

    fn session(&mut self) -> Result<(&dyn Vendor, &mut dyn Transport)> {
        let transport: &mut dyn Transport = self
            .transport
            .as_deref_mut()
            .filter(|t| t.is_open())
            .ok_or(ConnectionError::NotConnected)?;
        Ok((self.vendor.as_ref(), transport))
    }

    /// Run one command and return its raw output.
    pub async fn send_command(&mut self, command: &str) -> Result<String> {
        let (_, transport) = self.session()?;
        transport.send_command(command, None).await
    }

    /// Run show commands in order.
    ///
    /// Output is structured when a parser is attached and has a template for
    /// the command; otherwise it is returned as text.
    pub async fn show(&mut self, commands: &[String]) -> Result<ShowResults> {
        let parser = self.parser.clone();
        let platform = self.platform().template_name();
        let (_, transport) = self.session()?;

        let mut results = ShowResults::new();
        for command in commands {
            let raw = transport.send_command(command, None).await?;
            let output = match parser.as_deref().map(|p| p.parse(&raw, command, platform)) {
                Some(Parsed::Rows(rows)) => ShowOutput::Structured(rows),
                Some(Parsed::Raw(text)) => ShowOutput::Text(text),
                None => ShowOutput::Text(raw),
            };
            results.insert(command.clone(), output);
        }
        Ok(results)
    }

    /// Apply configuration lines.
    pub async fn configure(&mut self, lines: &[String]) -> Result<String> {
        let (vendor, transport) = self.session()?;
        vendor.configure(transport, lines).await
    }

    pub async fn facts(&mut self) -> Result<Facts> {
        let (vendor, transport) = self.session()?;
        vendor.facts(transport).await
    }

    /// Read the current boot configuration.
    pub async fn boot_options(&mut self) -> Result<BootState> {
        let (vendor, transport) = self.session()?;
        vendor.get_boot_options(transport).await
    }

    /// Set the boot image without rebooting. Returns whether anything changed.
    pub async fn set_boot_options(&mut self, image: &str, kickstart: Option<&str>) -> Result<bool> {
        let kickstart = normalize_image(kickstart);
        let desired = InstallRequest::new(image).with_kickstart(kickstart.as_deref());
        let current = self.boot_options().await?;
        if self.vendor.is_installed(&current, &desired) {
            debug!("{}: boot options already set to {}", self.label(), image);
            return Ok(false);
        }
        let (vendor, transport) = self.session()?;
        vendor
            .set_boot_options(transport, image, kickstart.as_deref())
            .await?;
        Ok(true)
    }

    /// Install an image unless it is already in place.
    ///
    /// Does not wait for a reload to finish; see [`crate::ops::install`]
    /// for the full install and verify cycle.
    pub async fn install_os(&mut self, request: &InstallRequest) -> Result<bool> {
        request.validate(self.platform())?;
        let current = self.boot_options().await?;
        if self.vendor.is_installed(&current, request) {
            return Ok(false);
        }
        self.apply_install(request).await?;
        Ok(true)
    }

    /// Run the install step for `request` without comparing first.
    ///
    /// Platforms that stage images into a volume, and requests that reboot,
    /// go through the vendor install; everything else only sets boot options.
    pub(crate) async fn apply_install(&mut self, request: &InstallRequest) -> Result<InstallEffect> {
        let label = self.label().to_string();
        let platform = self.platform();
        let (vendor, transport) = self.session()?;
        if request.reboot || platform.requires_volume() {
            info!("{}: installing {}", label, request.system_image);
            vendor.install_os(transport, request).await
        } else {
            info!("{}: setting boot image {}", label, request.system_image);
            vendor
                .set_boot_options(
                    transport,
                    &request.system_image,
                    request.kickstart_image.as_deref(),
                )
                .await?;
            Ok(InstallEffect {
                reboots: false,
                staged: vendor.stages_boot_image(),
            })
        }
    }

    /// Reboot the device.
    ///
    /// An immediate reboot ends the session, so the transport is closed
    /// right away. A scheduled reboot leaves it open.
    pub async fn reboot(&mut self, options: &RebootOptions) -> Result<()> {
        options.validate(self.platform())?;
        let (vendor, transport) = self.session()?;
        vendor.reboot(transport, options).await?;
        info!("{}: reboot sent", self.label());
        if options.timer.is_none() {
            self.discard().await;
        }
        Ok(())
    }

    /// Save the running configuration as checkpoint `name`.
    pub async fn checkpoint(&mut self, name: &str) -> Result<()> {
        let (vendor, transport) = self.session()?;
        vendor
            .checkpoint(transport, name)
            .await
            .map_err(checkpoint_error)
    }

    /// Replace the running configuration with checkpoint `name`.
    pub async fn rollback(&mut self, name: &str) -> Result<()> {
        let (vendor, transport) = self.session()?;
        vendor
            .rollback(transport, name)
            .await
            .map_err(checkpoint_error)
    }

    /// Save the running configuration to startup, or to `remote` on the device.
    pub async fn save_config(&mut self, remote: Option<&str>) -> Result<bool> {
        let (vendor, transport) = self.session()?;
        vendor.save_config(transport, remote).await
    }

    /// Write the running configuration to a local file.
    pub async fn backup_running_config(&mut self, local: &Path) -> Result<()> {
        let (vendor, transport) = self.session()?;
        let config = vendor.running_config(transport).await?;
        if let Some(parent) = local.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local, config).await?;
        info!("{}: running config saved to {}", self.label(), local.display());
        Ok(())
    }

    /// Resolve a file copy and checksum the local file.
    ///
    /// Needs no session; a missing local file fails here.
    pub async fn prepare_transfer(
        &self,
        local: &Path,
        remote_file: Option<&str>,
        file_system: Option<&str>,
    ) -> Result<FileTransfer> {
        let md5 = file_md5(local).await?;
        let remote_file = match remote_file {
            Some(name) => name.to_string(),
            None => local
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| Error::option(format!("{} has no file name", local.display())))?,
        };
        Ok(FileTransfer {
            local_file: local.to_path_buf(),
            remote_file,
            file_system: file_system
                .unwrap_or(self.vendor.default_file_system())
                .to_string(),
            md5,
        })
    }

    fn remote_path(&self, transfer: &FileTransfer) -> String {
        self.vendor
            .remote_path(&transfer.file_system, &transfer.remote_file)
    }

    /// Whether the remote copy is missing or differs from the local file.
    pub async fn needs_transfer(&mut self, transfer: &FileTransfer) -> Result<bool> {
        let path = self.remote_path(transfer);
        let (vendor, transport) = self.session()?;
        let remote = vendor.remote_md5(transport, &path).await?;
        debug!(
            "{}: {} remote md5 {:?}, local {}",
            self.label(),
            path,
            remote,
            transfer.md5
        );
        Ok(remote.as_deref() != Some(transfer.md5.as_str()))
    }

    /// Upload the file and confirm the remote checksum.
    pub async fn transfer(&mut self, transfer: &FileTransfer) -> Result<()> {
        let path = self.remote_path(transfer);
        let (vendor, transport) = self.session()?;
        vendor.upload(transport, &transfer.local_file, &path).await?;
        let remote = vendor.remote_md5(transport, &path).await?;
        if remote.as_deref() != Some(transfer.md5.as_str()) {
            return Err(CommandError::Failed {
                command: format!("copy {path}"),
                message: format!(
                    "md5 mismatch after transfer: expected {}, device reports {}",
                    transfer.md5,
                    remote.as_deref().unwrap_or("no file")
                ),
            }
            .into());
        }
        info!("{}: copied {} to {}", self.label(), transfer.local_file.display(), path);
        Ok(())
    }

    /// Copy a local file to the device unless an identical copy exists.
    ///
    /// Returns whether a transfer took place.
    pub async fn file_copy(
        &mut self,
        local: &Path,
        remote_file: Option<&str>,
        file_system: Option<&str>,
    ) -> Result<bool> {
        let transfer = self.prepare_transfer(local, remote_file, file_system).await?;
        if !self.needs_transfer(&transfer).await? {
            return Ok(false);
        }
        self.transfer(&transfer).await?;
        Ok(true)
    }
}

/// Hex MD5 of a local file, read in chunks.
async fn file_md5(path: &Path) -> Result<String> {
    let mut reader = BufReader::new(tokio::fs::File::open(path).await?);
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Device failures during checkpoint or rollback become
/// [`Error::CheckpointOrRollback`]; session and capability errors pass through.
fn checkpoint_error(error: Error) -> Error {
    match error {
        Error::Connection(_) | Error::UnsupportedOperation { .. } => error,
        other => Error::CheckpointOrRollback {
            message: other.to_string(),
        },
    }
}

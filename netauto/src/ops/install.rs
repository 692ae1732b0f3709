//! Install an OS image and verify the device boots it.
//!
//! The machine compares the current boot state first and stops there when
//! nothing needs to change (or in check mode). Otherwise it applies the
//! install, waits for the device to come back when the install reloads it,
//! and compares again. An image a vendor only stages for the next boot is
//! reported as installed without the second comparison.

use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;
use tokio::time::{Instant, sleep};

use super::{Outcome, Report, finish, open};
use crate::device::{BootState, Device, InstallRequest, RebootOptions};
use crate::error::Result;
use crate::platform::Platform;

/// Timing and mode of an install run.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Report what would change without touching the device.
    pub check_mode: bool,

    /// Wait between reconnection attempts after a reload.
    pub poll_interval: Duration,

    /// Give up waiting for the device after this long.
    pub timeout: Duration,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            check_mode: false,
            poll_interval: Duration::from_secs(10),
            timeout: Duration::from_secs(600),
        }
    }
}

impl InstallOptions {
    pub fn check_mode() -> Self {
        Self {
            check_mode: true,
            ..Default::default()
        }
    }
}

/// Boot state before and after the install.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub original_state: BootState,
    pub install_state: BootState,
}

/// Install `request` on `device`.
pub async fn install_os(
    device: &mut Device,
    request: &InstallRequest,
    options: &InstallOptions,
) -> Report<InstallReport> {
    if let Err(e) = request.validate(device.platform()) {
        return Report::rejected(e);
    }
    let outcome = match open(device).await {
        Ok(()) => Outcome::from_result(run(device, request, options).await),
        Err(outcome) => outcome,
    };
    finish(device, outcome).await
}

async fn run(
    device: &mut Device,
    request: &InstallRequest,
    options: &InstallOptions,
) -> Result<Outcome<InstallReport>> {
    let original = device.boot_options().await?;
    if device.vendor().is_installed(&original, request) {
        info!("{}: {} already installed", device.label(), request.system_image);
        return Ok(Outcome::success(
            false,
            InstallReport {
                install_state: original.clone(),
                original_state: original,
            },
        ));
    }
    if options.check_mode {
        return Ok(Outcome::success(
            true,
            InstallReport {
                original_state: original,
                install_state: request.desired(),
            },
        ));
    }

    let mut effect = device.apply_install(request).await?;
    if let Some(volume) = reboot_volume(device.platform(), request, &original) {
        info!("{}: rebooting into volume {}", device.label(), volume);
        if let Err(e) = device
            .reboot(&RebootOptions::confirmed().with_volume(volume))
            .await
        {
            return Ok(applied_failure(e, original, request));
        }
        effect.reboots = true;
    }

    if effect.staged && !effect.reboots {
        info!(
            "{}: {} staged, active after the next boot",
            device.label(),
            request.system_image
        );
        return Ok(Outcome::success(
            true,
            InstallReport {
                original_state: original,
                install_state: request.desired(),
            },
        ));
    }

    let current = if effect.reboots {
        match wait_for_boot_state(device, options).await {
            Some(state) => state,
            None => {
                return Ok(applied_failure(
                    format!("device did not come back within {:?}", options.timeout),
                    original,
                    request,
                ));
            }
        }
    } else {
        match device.boot_options().await {
            Ok(state) => state,
            Err(e) => return Ok(applied_failure(e, original, request)),
        }
    };

    let report = InstallReport {
        original_state: original,
        install_state: current,
    };
    if device.vendor().is_installed(&report.install_state, request) {
        info!("{}: {} installed", device.label(), request.system_image);
        Ok(Outcome::success(true, report))
    } else {
        warn!(
            "{}: boot state {:?} does not match {}",
            device.label(),
            report.install_state,
            request.system_image
        );
        Ok(Outcome::Failed {
            changed: true,
            reason: format!(
                "boot options did not change to {} after the install",
                request.system_image
            ),
            detail: Some(report),
        })
    }
}

/// Failure after the device was modified but before the new state was read.
fn applied_failure(
    reason: impl std::fmt::Display,
    original: BootState,
    request: &InstallRequest,
) -> Outcome<InstallReport> {
    Outcome::Failed {
        changed: true,
        reason: reason.to_string(),
        detail: Some(InstallReport {
            original_state: original,
            install_state: request.desired(),
        }),
    }
}

/// Volume a dual-partition device must reboot into to finish the install.
fn reboot_volume<'a>(
    platform: Platform,
    request: &'a InstallRequest,
    original: &BootState,
) -> Option<&'a str> {
    if !platform.requires_volume() || !request.reboot {
        return None;
    }
    let volume = request.volume.as_deref()?;
    (original.active_volume.as_deref() != Some(volume)).then_some(volume)
}

/// Reconnect until the boot state can be read again, or give up at the timeout.
async fn wait_for_boot_state(device: &mut Device, options: &InstallOptions) -> Option<BootState> {
    let deadline = Instant::now() + options.timeout;
    loop {
        sleep(options.poll_interval).await;
        match device.reopen().await {
            Ok(()) => match device.boot_options().await {
                Ok(state) => return Some(state),
                Err(e) => debug!("{}: boot options not readable yet: {}", device.label(), e),
            },
            Err(e) => debug!("{}: not reachable yet: {}", device.label(), e),
        }
        if Instant::now() >= deadline {
            return None;
        }
    }
}

//! Save the running configuration on the device and optionally locally.

use std::path::PathBuf;

use serde::Serialize;

use super::{Outcome, Report, finish, open};
use crate::device::Device;
use crate::error::Result;

const STARTUP_CONFIG: &str = "(Startup Config)";

#[derive(Debug, Clone, Default)]
pub struct SaveRequest {
    /// Save to this file on the device instead of the startup config.
    pub remote_file: Option<String>,

    /// Also write the running config to this local path.
    pub local_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveReport {
    pub remote_save_successful: bool,
    pub remote_file: String,
    pub local_file: Option<String>,
}

pub async fn save_config(device: &mut Device, request: &SaveRequest) -> Report<SaveReport> {
    let outcome = match open(device).await {
        Ok(()) => Outcome::from_result(run(device, request).await),
        Err(outcome) => outcome,
    };
    finish(device, outcome).await
}

async fn run(device: &mut Device, request: &SaveRequest) -> Result<Outcome<SaveReport>> {
    let saved = device.save_config(request.remote_file.as_deref()).await?;
    let mut changed = saved;
    if let Some(local) = &request.local_file {
        device.backup_running_config(local).await?;
        changed = true;
    }
    Ok(Outcome::success(
        changed,
        SaveReport {
            remote_save_successful: saved,
            remote_file: request
                .remote_file
                .clone()
                .unwrap_or_else(|| STARTUP_CONFIG.to_string()),
            local_file: request
                .local_file
                .as_ref()
                .map(|p| p.display().to_string()),
        },
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::{ConnectionParams, DeviceSpec};
    use crate::platform::Platform;
    use crate::testing::{CallLog, MockConnector};

    fn asa() -> (Device, CallLog) {
        let (connector, log) = MockConnector::new(|cmd| match cmd {
            "write memory" => Ok("Building configuration...\n[OK]\n".into()),
            "show running-config" => Ok("hostname asa1\n".into()),
            _ => Ok("%Error copying running-config\n".into()),
        });
        let device = Device::new(DeviceSpec::new(
            Platform::CiscoAsaSsh,
            ConnectionParams::new("asa1", "ntc", "ntc123"),
        ))
        .with_connector(Arc::new(connector));
        (device, log)
    }

    #[tokio::test]
    async fn test_save_to_startup() {
        let (mut device, log) = asa();
        let report = save_config(&mut device, &SaveRequest::default()).await;

        assert!(report.changed());
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            serde_json::json!({
                "changed": true,
                "atomic": true,
                "remote_save_successful": true,
                "remote_file": "(Startup Config)",
                "local_file": null
            })
        );
        assert_eq!(log.commands(), vec!["write memory"]);
    }

    #[tokio::test]
    async fn test_failed_remote_save_with_local_backup() {
        let (mut device, _log) = asa();
        let dir = tempfile::tempdir().unwrap();
        let local = dir.path().join("asa1.cfg");
        let request = SaveRequest {
            remote_file: Some("backup.cfg".into()),
            local_file: Some(local.clone()),
        };
        let report = save_config(&mut device, &request).await;

        let detail = report.detail().unwrap();
        assert!(!detail.remote_save_successful);
        assert_eq!(detail.remote_file, "backup.cfg");
        assert!(report.changed());
        assert_eq!(std::fs::read_to_string(local).unwrap(), "hostname asa1\n");
    }
}

//! Copy a local file to a device when the remote copy is missing or differs.

use std::path::PathBuf;

use serde::Serialize;

use super::{Outcome, Report, finish, open};
use crate::device::{Device, FileTransfer};

#[derive(Debug, Clone, Default)]
pub struct FileCopyRequest {
    pub local_file: PathBuf,

    /// Defaults to the local file name.
    pub remote_file: Option<String>,

    /// Defaults to the platform's file system.
    pub file_system: Option<String>,

    pub check_mode: bool,
}

impl FileCopyRequest {
    pub fn new(local_file: impl Into<PathBuf>) -> Self {
        Self {
            local_file: local_file.into(),
            ..Default::default()
        }
    }

    pub fn with_remote_file(mut self, remote_file: impl Into<String>) -> Self {
        self.remote_file = Some(remote_file.into());
        self
    }

    pub fn with_file_system(mut self, file_system: impl Into<String>) -> Self {
        self.file_system = Some(file_system.into());
        self
    }

    pub fn with_check_mode(mut self, check_mode: bool) -> Self {
        self.check_mode = check_mode;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileCopyReport {
    /// `"Sent"` or `"No Transfer"`.
    pub transfer_status: &'static str,
    pub local_file: String,
    pub remote_file: String,
    pub file_system: String,
    pub transferred: bool,
}

impl FileCopyReport {
    fn new(transfer: &FileTransfer, transferred: bool) -> Self {
        Self {
            transfer_status: if transferred { "Sent" } else { "No Transfer" },
            local_file: transfer.local_file.display().to_string(),
            remote_file: transfer.remote_file.clone(),
            file_system: transfer.file_system.clone(),
            transferred,
        }
    }
}

/// Copy `request.local_file` to the device.
///
/// The local file is checksummed before connecting, so a missing file never
/// opens a session.
pub async fn file_copy(device: &mut Device, request: &FileCopyRequest) -> Report<FileCopyReport> {
    let transfer = match device
        .prepare_transfer(
            &request.local_file,
            request.remote_file.as_deref(),
            request.file_system.as_deref(),
        )
        .await
    {
        Ok(transfer) => transfer,
        Err(e) => {
            return Report::rejected(format!(
                "local file {} not usable: {}",
                request.local_file.display(),
                e
            ));
        }
    };

    let outcome = match open(device).await {
        Ok(()) => match device.needs_transfer(&transfer).await {
            Ok(false) => Outcome::success(false, FileCopyReport::new(&transfer, false)),
            Ok(true) if request.check_mode => {
                Outcome::success(true, FileCopyReport::new(&transfer, false))
            }
            Ok(true) => match device.transfer(&transfer).await {
                Ok(()) => Outcome::success(true, FileCopyReport::new(&transfer, true)),
                Err(e) => Outcome::Failed {
                    changed: true,
                    reason: e.to_string(),
                    detail: Some(FileCopyReport::new(&transfer, false)),
                },
            },
            Err(e) => Outcome::failed(e),
        },
        Err(outcome) => outcome,
    };
    finish(device, outcome).await
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::config::{ConnectionParams, DeviceSpec};
    use crate::error::CommandError;
    use crate::platform::Platform;
    use crate::testing::{Call, CallLog, MockConnector};

    const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";

    /// IOS device holding `remote` (an md5) until an upload replaces it.
    fn ios(remote: Option<&'static str>) -> (Device, CallLog) {
        let uploaded = Arc::new(AtomicBool::new(false));
        let (connector, log) = MockConnector::new(move |cmd| {
            if cmd.starts_with("upload ") {
                uploaded.store(true, Ordering::SeqCst);
                return Ok(String::new());
            }
            let md5 = if uploaded.load(Ordering::SeqCst) {
                Some(HELLO_MD5)
            } else {
                remote
            };
            match (cmd.starts_with("verify /md5"), md5) {
                (true, Some(md5)) => Ok(format!("verify /md5 (flash:hello.txt) = {md5}\n")),
                (true, None) => Err(CommandError::Failed {
                    command: cmd.to_string(),
                    message: "%Error opening flash:hello.txt (No such file or directory)".into(),
                }
                .into()),
                _ => Ok(String::new()),
            }
        });
        let device = Device::new(DeviceSpec::new(
            Platform::CiscoIosSsh,
            ConnectionParams::new("csr1", "ntc", "ntc123"),
        ))
        .with_connector(Arc::new(connector));
        (device, log)
    }

    fn hello() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello").unwrap();
        file
    }

    fn uploads(log: &CallLog) -> Vec<String> {
        log.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Upload { remote, .. } => Some(remote),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_matching_checksum_skips_transfer() {
        let (mut device, log) = ios(Some(HELLO_MD5));
        let file = hello();
        let request = FileCopyRequest::new(file.path()).with_remote_file("hello.txt");
        let report = file_copy(&mut device, &request).await;

        assert!(report.is_success());
        assert!(!report.changed());
        let detail = report.detail().unwrap();
        assert!(!detail.transferred);
        assert_eq!(detail.transfer_status, "No Transfer");
        assert!(uploads(&log).is_empty());
    }

    #[tokio::test]
    async fn test_missing_remote_file_is_sent() {
        let (mut device, log) = ios(None);
        let file = hello();
        let request = FileCopyRequest::new(file.path()).with_remote_file("hello.txt");
        let report = file_copy(&mut device, &request).await;

        assert!(report.is_success(), "{:?}", report.error());
        assert!(report.changed());
        let detail = report.detail().unwrap();
        assert!(detail.transferred);
        assert_eq!(detail.transfer_status, "Sent");
        assert_eq!(detail.file_system, "flash:");
        assert_eq!(uploads(&log), vec!["flash:hello.txt"]);
    }

    #[tokio::test]
    async fn test_checksum_mismatch_is_sent() {
        let (mut device, log) = ios(Some("00000000000000000000000000000000"));
        let file = hello();
        let request = FileCopyRequest::new(file.path()).with_remote_file("hello.txt");
        let report = file_copy(&mut device, &request).await;

        assert!(report.changed());
        assert_eq!(uploads(&log).len(), 1);
    }

    #[tokio::test]
    async fn test_check_mode_does_not_transfer() {
        let (mut device, log) = ios(None);
        let file = hello();
        let request = FileCopyRequest::new(file.path())
            .with_remote_file("hello.txt")
            .with_check_mode(true);
        let report = file_copy(&mut device, &request).await;

        assert!(report.changed());
        assert_eq!(report.detail().unwrap().transfer_status, "No Transfer");
        assert!(uploads(&log).is_empty());
    }

    #[tokio::test]
    async fn test_missing_local_file_never_connects() {
        let (mut device, log) = ios(None);
        let report = file_copy(&mut device, &FileCopyRequest::new("/nonexistent/image.bin")).await;

        assert!(report.error().unwrap().contains("/nonexistent/image.bin"));
        assert!(log.calls().is_empty());
    }

    #[tokio::test]
    async fn test_remote_file_defaults_to_basename() {
        let (mut device, _log) = ios(Some(HELLO_MD5));
        let file = hello();
        let report = file_copy(&mut device, &FileCopyRequest::new(file.path())).await;

        let expected = file.path().file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(report.detail().unwrap().remote_file, expected);
    }
}

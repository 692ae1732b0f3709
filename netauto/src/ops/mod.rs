//! Caller-facing operations.
//!
//! Each operation runs one complete session against a [`Device`]: it checks
//! its preconditions, opens the transport, drives the device, and always
//! releases the transport before returning a [`Report`]. Errors do not
//! escape; they become [`Outcome::Failed`].
//!
//! Reports serialize to a flat JSON object:
//!
//! ```json
//! {"changed": true, "atomic": true, "install_state": {"sys": "nxos.9.3.6.bin"}}
//! ```

pub mod file_copy;
pub mod fleet;
pub mod install;
pub mod reboot;
pub mod rollback;
pub mod save;
pub mod show;

use std::fmt;

use serde::ser::{Error as _, SerializeMap};
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::device::Device;
use crate::error::Result;

pub use file_copy::{FileCopyReport, FileCopyRequest, file_copy};
pub use fleet::{DeviceResult, for_each_device, gather_facts};
pub use install::{InstallOptions, InstallReport, install_os};
pub use reboot::{PollPolicy, RebootReport, reboot};
pub use rollback::{RollbackReport, RollbackRequest, checkpoint_or_rollback};
pub use save::{SaveReport, SaveRequest, save_config};
pub use show::{ConfigRequest, ShowRequest, configure, facts, parse_offline, show};

/// How an operation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T> {
    Success {
        changed: bool,
        detail: T,
    },

    /// The operation failed. `changed` is set when the device was modified
    /// before the failure.
    Failed {
        changed: bool,
        reason: String,
        detail: Option<T>,
    },

    /// The device did not come back in time. Not an error.
    TimedOut { changed: bool, detail: T },
}

impl<T> Outcome<T> {
    pub fn success(changed: bool, detail: T) -> Self {
        Outcome::Success { changed, detail }
    }

    /// Failure before anything on the device changed.
    pub fn failed(reason: impl fmt::Display) -> Self {
        Outcome::Failed {
            changed: false,
            reason: reason.to_string(),
            detail: None,
        }
    }

    pub(crate) fn from_result(result: Result<Outcome<T>>) -> Self {
        result.unwrap_or_else(Outcome::failed)
    }

    pub fn changed(&self) -> bool {
        match self {
            Outcome::Success { changed, .. }
            | Outcome::Failed { changed, .. }
            | Outcome::TimedOut { changed, .. } => *changed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Outcome::Failed { reason, .. } => Some(reason),
            _ => None,
        }
    }

    pub fn detail(&self) -> Option<&T> {
        match self {
            Outcome::Success { detail, .. } | Outcome::TimedOut { detail, .. } => Some(detail),
            Outcome::Failed { detail, .. } => detail.as_ref(),
        }
    }
}

/// Outcome of an operation plus whether the session closed cleanly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report<T> {
    pub outcome: Outcome<T>,

    /// `false` when closing a transport failed. The outcome still stands.
    pub atomic: bool,
}

impl<T> Report<T> {
    /// Report for a request refused before any device interaction.
    pub fn rejected(reason: impl fmt::Display) -> Self {
        Report {
            outcome: Outcome::failed(reason),
            atomic: true,
        }
    }

    pub fn changed(&self) -> bool {
        self.outcome.changed()
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    pub fn error(&self) -> Option<&str> {
        self.outcome.error()
    }

    pub fn detail(&self) -> Option<&T> {
        self.outcome.detail()
    }
}

impl<T: Serialize> Serialize for Report<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let detail = match self.detail() {
            Some(detail) => serde_json::to_value(detail).map_err(S::Error::custom)?,
            None => Value::Null,
        };

        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("changed", &self.changed())?;
        map.serialize_entry("atomic", &self.atomic)?;
        if let Some(error) = self.error() {
            map.serialize_entry("error", error)?;
        }
        match detail {
            Value::Object(fields) => {
                for (key, value) in &fields {
                    map.serialize_entry(key, value)?;
                }
            }
            Value::Null => {}
            other => map.serialize_entry("result", &other)?,
        }
        map.end()
    }
}

/// Open `device`, returning the failure as an outcome.
pub(crate) async fn open<T>(device: &mut Device) -> std::result::Result<(), Outcome<T>> {
    device.open().await.map_err(Outcome::failed)
}

/// Release `device` and wrap `outcome` into a report.
pub(crate) async fn finish<T>(device: &mut Device, outcome: Outcome<T>) -> Report<T> {
    let atomic = device.release().await;
    Report { outcome, atomic }
}

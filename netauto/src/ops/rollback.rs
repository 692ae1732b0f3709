//! Create a configuration checkpoint or roll back to one.

use log::info;
use serde::Serialize;

use super::{Outcome, Report, finish, open};
use crate::device::Device;
use crate::error::{Error, Result};

/// Exactly one of the two fields must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackRequest {
    pub checkpoint_file: Option<String>,
    pub rollback_to: Option<String>,
}

enum Action<'a> {
    Checkpoint(&'a str),
    Rollback(&'a str),
}

impl RollbackRequest {
    pub fn checkpoint(name: impl Into<String>) -> Self {
        Self {
            checkpoint_file: Some(name.into()),
            rollback_to: None,
        }
    }

    pub fn rollback(name: impl Into<String>) -> Self {
        Self {
            checkpoint_file: None,
            rollback_to: Some(name.into()),
        }
    }

    fn action(&self) -> Result<Action<'_>> {
        match (self.checkpoint_file.as_deref(), self.rollback_to.as_deref()) {
            (Some(_), Some(_)) => Err(Error::option(
                "checkpoint_file and rollback_to are mutually exclusive",
            )),
            (Some(name), None) => Ok(Action::Checkpoint(name)),
            (None, Some(name)) => Ok(Action::Rollback(name)),
            (None, None) => Err(Error::option(
                "one of checkpoint_file or rollback_to is required",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RollbackReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollback_to: Option<String>,
}

/// Checkpoint or roll back, whichever `request` names.
pub async fn checkpoint_or_rollback(
    device: &mut Device,
    request: &RollbackRequest,
) -> Report<RollbackReport> {
    let action = match request.action() {
        Ok(action) => action,
        Err(e) => return Report::rejected(e),
    };
    let outcome = match open(device).await {
        Ok(()) => {
            let result = match action {
                Action::Checkpoint(name) => device.checkpoint(name).await,
                Action::Rollback(name) => device.rollback(name).await,
            };
            match result {
                Ok(()) => {
                    info!("{}: checkpoint/rollback done", device.label());
                    Outcome::success(
                        true,
                        RollbackReport {
                            checkpoint_file: request.checkpoint_file.clone(),
                            rollback_to: request.rollback_to.clone(),
                        },
                    )
                }
                Err(e) => Outcome::failed(e),
            }
        }
        Err(outcome) => outcome,
    };
    finish(device, outcome).await
}

//! Run one operation against many devices at once.

use std::future::Future;

use futures_util::future::join_all;
use serde::Serialize;

use super::Report;
use crate::device::{Device, Facts};

/// Result of an operation on one device of a fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceResult<T> {
    pub device: String,
    pub result: T,
}

/// Run `op` on every device concurrently.
///
/// Each device owns its own session; results come back in input order.
pub async fn for_each_device<I, F, Fut, T>(devices: I, op: F) -> Vec<DeviceResult<T>>
where
    I: IntoIterator<Item = Device>,
    F: Fn(Device) -> Fut,
    Fut: Future<Output = T>,
{
    join_all(devices.into_iter().map(|device| {
        let name = device.label().to_string();
        let run = op(device);
        async move {
            DeviceResult {
                device: name,
                result: run.await,
            }
        }
    }))
    .await
}

/// Gather facts from every device.
pub async fn gather_facts<I>(devices: I) -> Vec<DeviceResult<Report<Facts>>>
where
    I: IntoIterator<Item = Device>,
{
    for_each_device(devices, |mut device| async move {
        super::show::facts(&mut device).await
    })
    .await
}

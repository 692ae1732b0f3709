//! Reboot a device and wait for it to come back.

use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;
use tokio::time::{Instant, sleep};

use super::{Outcome, Report, finish, open};
use crate::device::{Device, RebootOptions};

/// When and how long to look for the device after the reboot.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// Wait before the first reconnection attempt.
    pub grace: Duration,

    /// Wait between attempts.
    pub interval: Duration,

    /// Total time allowed, counted from the reboot.
    pub timeout: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(10),
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(240),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RebootReport {
    pub rebooted: bool,
    pub reachable: bool,
}

/// Reboot `device`.
///
/// An immediate reboot is followed by reconnection attempts. A device that
/// stays down past the timeout ends in [`Outcome::TimedOut`]. A scheduled
/// reboot (`timer`) returns as soon as it is accepted.
pub async fn reboot(
    device: &mut Device,
    options: &RebootOptions,
    policy: &PollPolicy,
) -> Report<RebootReport> {
    if let Err(e) = options.validate(device.platform()) {
        return Report::rejected(e);
    }
    let outcome = match open(device).await {
        Ok(()) => match device.reboot(options).await {
            Ok(()) if options.timer.is_some() => Outcome::success(
                true,
                RebootReport {
                    rebooted: true,
                    reachable: true,
                },
            ),
            Ok(()) => {
                let reachable = wait_until_reachable(device, policy).await;
                let detail = RebootReport {
                    rebooted: true,
                    reachable,
                };
                if reachable {
                    Outcome::success(true, detail)
                } else {
                    warn!(
                        "{}: not reachable {:?} after the reboot",
                        device.label(),
                        policy.timeout
                    );
                    Outcome::TimedOut {
                        changed: true,
                        detail,
                    }
                }
            }
            Err(e) => Outcome::failed(e),
        },
        Err(outcome) => outcome,
    };
    finish(device, outcome).await
}

async fn wait_until_reachable(device: &mut Device, policy: &PollPolicy) -> bool {
    let deadline = Instant::now() + policy.timeout;
    sleep(policy.grace).await;
    loop {
        match device.reopen().await {
            Ok(()) => {
                info!("{}: reachable again", device.label());
                return true;
            }
            Err(e) => debug!("{}: not reachable yet: {}", device.label(), e),
        }
        if Instant::now() + policy.interval > deadline {
            return false;
        }
        sleep(policy.interval).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::config::{ConnectionParams, DeviceSpec};
    use crate::error::ConnectionError;
    use crate::platform::Platform;
    use crate::testing::{Call, CallLog, MockConnector};

    /// ASA that stays down for `down_for` connection attempts after reloading.
    fn asa(down_for: usize) -> (Device, CallLog) {
        let failures = Arc::new(AtomicUsize::new(0));
        let down = failures.clone();
        let (connector, log) = MockConnector::new(move |cmd| match cmd {
            "reload noconfirm" => {
                down.store(down_for, Ordering::SeqCst);
                Err(ConnectionError::Disconnected.into())
            }
            _ => Ok(String::new()),
        });
        let device = Device::new(DeviceSpec::new(
            Platform::CiscoAsaSsh,
            ConnectionParams::new("asa1", "ntc", "ntc123"),
        ))
        .with_connector(Arc::new(connector.with_open_failures(failures)));
        (device, log)
    }

    fn closes(log: &CallLog) -> usize {
        log.calls().iter().filter(|c| **c == Call::Close).count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_reboot_and_come_back() {
        let (mut device, log) = asa(2);
        let report = reboot(&mut device, &RebootOptions::confirmed(), &PollPolicy::default()).await;

        assert!(report.is_success());
        assert_eq!(
            report.detail(),
            Some(&RebootReport {
                rebooted: true,
                reachable: true
            })
        );
        assert_eq!(log.commands(), vec!["reload noconfirm"]);
        assert_eq!(log.opens(), 4);
        assert_eq!(closes(&log), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_is_reported_not_raised() {
        let (mut device, log) = asa(usize::MAX);
        let started = Instant::now();
        let report = reboot(&mut device, &RebootOptions::confirmed(), &PollPolicy::default()).await;

        assert!(matches!(report.outcome, Outcome::TimedOut { changed: true, .. }));
        assert_eq!(report.error(), None);
        assert_eq!(
            report.detail(),
            Some(&RebootReport {
                rebooted: true,
                reachable: false
            })
        );
        // attempts at 10s, 40s, ... 220s
        assert_eq!(log.opens(), 1 + 8);
        assert_eq!(closes(&log), log.opens());
        assert!(started.elapsed() <= Duration::from_secs(240));
    }

    #[tokio::test]
    async fn test_unconfirmed_reboot_never_connects() {
        let (mut device, log) = asa(0);
        let report = reboot(&mut device, &RebootOptions::default(), &PollPolicy::default()).await;
        assert!(!report.changed());
        assert!(report.error().unwrap().contains("confirm"));
        assert!(log.calls().is_empty());
    }

    #[tokio::test]
    async fn test_timer_rejected_where_unsupported() {
        let (mut device, log) = asa(0);
        let report = reboot(
            &mut device,
            &RebootOptions::confirmed().with_timer(5),
            &PollPolicy::default(),
        )
        .await;
        assert!(report.error().unwrap().contains("timer"));
        assert!(log.calls().is_empty());
    }

    #[tokio::test]
    async fn test_scheduled_reboot_does_not_poll() {
        let (connector, log) = MockConnector::new(|cmd| match cmd {
            "request system reboot in 5" => Ok("Reboot the system ? [yes,no] (no) ".into()),
            "yes" => Ok("Shutdown at Fri Oct 16 10:05:00 2026.\n".into()),
            _ => Ok(String::new()),
        });
        let mut device = Device::new(DeviceSpec::new(
            Platform::JuniperJunos,
            ConnectionParams::new("vsrx1", "ntc", "ntc123"),
        ))
        .with_connector(Arc::new(connector));

        let report = reboot(
            &mut device,
            &RebootOptions::confirmed().with_timer(5),
            &PollPolicy::default(),
        )
        .await;
        assert!(report.is_success(), "{:?}", report.error());
        assert_eq!(log.opens(), 1);
        assert_eq!(closes(&log), 1);
    }
}

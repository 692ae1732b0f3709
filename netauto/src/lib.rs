//! # netauto
//!
//! Async multi-vendor network device automation core.
//!
//! netauto talks to Cisco NX-OS, IOS, ASA and AireOS, Arista EOS, F5 TMOS and
//! Juniper Junos devices over SSH, Telnet or their HTTP management APIs, turns
//! CLI output into structured records with TextFSM templates, and runs the
//! install, reboot and rollback workflows with idempotence checks and
//! reachability polling.
//!
//! ## Features
//!
//! - Async SSH CLI sessions via russh, with enable-mode escalation and SCP
//! - NX-API, eAPI and iControl REST via reqwest
//! - Telnet CLI sessions for Cisco IOS
//! - Built-in TextFSM engine and template index (ntc-templates layout)
//! - One [`Vendor`](platform::Vendor) implementation per platform behind a
//!   uniform [`Device`](device::Device) facade
//! - Operations that always close their session and report
//!   `{changed, atomic, error?, ...}`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use netauto::config::{ConnectionParams, DeviceSpec};
//! use netauto::device::{Device, InstallRequest};
//! use netauto::ops::{self, InstallOptions};
//! use netauto::platform::Platform;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), netauto::Error> {
//!     let spec = DeviceSpec::new(
//!         Platform::CiscoNxosNxapi,
//!         ConnectionParams::new("192.168.1.1", "admin", "secret"),
//!     );
//!     let mut device = Device::new(spec);
//!
//!     let request = InstallRequest::new("nxos.9.3.6.bin").with_reboot(true);
//!     let report = ops::install_os(&mut device, &request, &InstallOptions::default()).await;
//!
//!     println!("{}", serde_json::to_string(&report).unwrap_or_default());
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod config;
pub mod device;
pub mod error;
pub mod ops;
pub mod parse;
pub mod platform;
pub mod transport;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use config::{ConnectionArgs, ConnectionParams, DeviceSpec, HostRegistry};
pub use device::{BootState, Device, Facts, InstallRequest, RebootOptions};
pub use error::{Error, Result};
pub use ops::{Outcome, Report};
pub use parse::{OutputParser, Parsed, ParsedRow};
pub use platform::{Platform, PlatformDefinition, PrivilegeLevel, Vendor};
pub use transport::{Connector, DefaultConnector, Transport};

//! Channel layer: prompt detection and CLI session handling.
//!
//! This is shared by every CLI transport. A transport only has to provide a
//! [`CliStream`]; the [`CliSession`] on top finds prompts, walks privilege
//! levels and normalizes output.

mod buffer;
mod interactive;
mod privilege;
mod response;
mod session;

pub use buffer::PatternBuffer;
pub use interactive::{InteractiveEvent, InteractiveResult, InteractiveStep};
pub use privilege::{PrivilegeManager, TransitionInfo};
pub use response::Response;
pub use session::{CliSession, CliStream, SessionOptions};

#[cfg(test)]
pub(crate) use session::tests::{ScriptedStream, options as test_session_options};

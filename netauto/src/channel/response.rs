//! Response type for CLI command execution.

use std::time::Duration;

/// Output of one CLI command.
#[derive(Debug, Clone)]
pub struct Response {
    pub command: String,

    /// Output with the command echo and trailing prompt removed.
    pub result: String,

    /// Output as received, ANSI sequences stripped.
    pub raw_result: String,

    /// Prompt that ended the output.
    pub prompt: String,

    pub elapsed: Duration,

    /// Failure pattern found in the output, if any.
    pub failure_message: Option<String>,
}

impl Response {
    pub fn is_success(&self) -> bool {
        self.failure_message.is_none()
    }
}

impl std::fmt::Display for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.result)
    }
}

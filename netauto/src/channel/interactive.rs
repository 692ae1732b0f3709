//! Interactive command sequences.
//!
//! Commands such as `reload` or `copy running-config flash:` stop and ask
//! for confirmation. An interactive sequence sends each input and waits for
//! a pattern before moving on to the next one.

use std::time::Duration;

use regex::bytes::Regex;

use crate::error::{CommandError, Result};

/// One step of an interactive sequence.
#[derive(Debug, Clone)]
pub struct InteractiveEvent {
    /// Text sent to the device, followed by a newline.
    pub input: String,

    /// Pattern awaited after sending; `None` waits for the device prompt.
    pub pattern: Option<Regex>,

    /// Mask the input in logs.
    pub hidden: bool,

    /// Per-step timeout override.
    pub timeout: Option<Duration>,
}

impl InteractiveEvent {
    /// Send `input`, then wait for `pattern`.
    pub fn new(input: impl Into<String>, pattern: &str) -> Result<Self> {
        Ok(Self {
            input: input.into(),
            pattern: Some(Regex::new(pattern).map_err(CommandError::InvalidPattern)?),
            hidden: false,
            timeout: None,
        })
    }

    /// Send `input`, then wait for the device prompt.
    pub fn until_prompt(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            pattern: None,
            hidden: false,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Input as it may appear in logs.
    pub fn loggable_input(&self) -> &str {
        if self.hidden { "********" } else { &self.input }
    }
}

/// Output collected from an interactive sequence.
#[derive(Debug, Clone, Default)]
pub struct InteractiveResult {
    pub steps: Vec<InteractiveStep>,
}

/// Output of a single interactive step.
#[derive(Debug, Clone)]
pub struct InteractiveStep {
    /// Input sent, masked when hidden.
    pub input: String,
    pub output: String,
}

impl InteractiveResult {
    /// All step outputs concatenated in order.
    pub fn full_output(&self) -> String {
        self.steps.iter().map(|s| s.output.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_pattern_is_an_error() {
        assert!(InteractiveEvent::new("reload", "[confirm").is_err());
    }

    #[test]
    fn test_hidden_input_is_masked() {
        let event = InteractiveEvent::until_prompt("s3cret").with_hidden();
        assert_eq!(event.loggable_input(), "********");
        assert!(event.pattern.is_none());
    }

    #[test]
    fn test_full_output_concatenates() {
        let result = InteractiveResult {
            steps: vec![
                InteractiveStep {
                    input: "reload".into(),
                    output: "Proceed with reload? [confirm]".into(),
                },
                InteractiveStep {
                    input: String::new(),
                    output: "\nrtr1#".into(),
                },
            ],
        };
        assert_eq!(result.full_output(), "Proceed with reload? [confirm]\nrtr1#");
    }
}

//! Prompt-identified privilege levels of a CLI session.

use regex::bytes::Regex;

/// One privilege level of a CLI device, identified by its prompt.
///
/// Levels form a tree through `previous_priv`; escalation and de-escalation
/// commands move the session along its edges.
#[derive(Debug, Clone)]
pub struct PrivilegeLevel {
    /// Level name (`exec`, `privilege_exec`, `configuration`, ...).
    pub name: String,

    /// Prompt pattern for this level.
    pub pattern: Regex,

    /// Parent level, `None` for the root.
    pub previous_priv: Option<String>,

    /// Command that enters this level from its parent.
    pub escalate_command: Option<String>,

    /// Command that leaves this level for its parent.
    pub deescalate_command: Option<String>,

    /// Prompt asking for the escalation secret, when one is required.
    pub escalate_prompt: Option<Regex>,

    /// Substrings that disqualify a prompt from this level.
    pub not_contains: Vec<String>,
}

impl PrivilegeLevel {
    /// Create a root level matching `pattern`.
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            pattern: Regex::new(pattern)?,
            previous_priv: None,
            escalate_command: None,
            deescalate_command: None,
            escalate_prompt: None,
            not_contains: vec![],
        })
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.previous_priv = Some(parent.into());
        self
    }

    pub fn with_escalate(mut self, command: impl Into<String>) -> Self {
        self.escalate_command = Some(command.into());
        self
    }

    pub fn with_deescalate(mut self, command: impl Into<String>) -> Self {
        self.deescalate_command = Some(command.into());
        self
    }

    /// Require a secret on escalation, answered when `prompt_pattern` appears.
    pub fn with_auth(mut self, prompt_pattern: &str) -> Result<Self, regex::Error> {
        self.escalate_prompt = Some(Regex::new(prompt_pattern)?);
        Ok(self)
    }

    pub fn with_not_contains(mut self, pattern: impl Into<String>) -> Self {
        self.not_contains.push(pattern.into());
        self
    }

    /// Whether `prompt` belongs to this level.
    pub fn matches(&self, prompt: &str) -> bool {
        if self.not_contains.iter().any(|nc| prompt.contains(nc)) {
            return false;
        }
        self.pattern.is_match(prompt.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_contains_disqualifies() {
        let level = PrivilegeLevel::new("privilege_exec", r"(?m)^\S+#\s?$")
            .unwrap()
            .with_not_contains("(config");
        assert!(level.matches("router#"));
        assert!(!level.matches("router(config)#"));
    }

    #[test]
    fn test_with_auth_rejects_bad_pattern() {
        let level = PrivilegeLevel::new("privilege_exec", r"#$").unwrap();
        assert!(level.with_auth("(unclosed").is_err());
    }
}

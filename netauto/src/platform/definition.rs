//! Prompt and privilege description of a CLI platform.

use indexmap::IndexMap;

use super::privilege_level::PrivilegeLevel;

/// Everything a CLI session needs to know about a vendor's shell.
#[derive(Debug, Clone)]
pub struct PlatformDefinition {
    /// Platform name, e.g. `cisco_ios`.
    pub name: String,

    /// Privilege levels, in prompt-matching order.
    pub privilege_levels: IndexMap<String, PrivilegeLevel>,

    /// Level the session settles in after login.
    pub default_privilege: String,

    /// Level used to apply configuration lines.
    pub configuration_privilege: String,

    /// Output substrings that mark a command as failed.
    pub failed_when_contains: Vec<String>,

    /// Commands run right after the session reaches its default level.
    pub on_open_commands: Vec<String>,

    /// Commands run before the session is closed.
    pub on_close_commands: Vec<String>,

    /// Whether the shell asks for credentials again after transport login.
    pub in_band_login: bool,

    pub terminal_width: u32,
    pub terminal_height: u32,
}

impl PlatformDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            privilege_levels: IndexMap::new(),
            default_privilege: String::new(),
            configuration_privilege: "configuration".to_string(),
            failed_when_contains: vec![],
            on_open_commands: vec![],
            on_close_commands: vec![],
            in_band_login: false,
            terminal_width: 511,
            terminal_height: 24,
        }
    }

    pub fn with_privilege(mut self, level: PrivilegeLevel) -> Self {
        self.privilege_levels.insert(level.name.clone(), level);
        self
    }

    pub fn with_default_privilege(mut self, name: impl Into<String>) -> Self {
        self.default_privilege = name.into();
        self
    }

    pub fn with_configuration_privilege(mut self, name: impl Into<String>) -> Self {
        self.configuration_privilege = name.into();
        self
    }

    pub fn with_failure_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.failed_when_contains.push(pattern.into());
        self
    }

    pub fn with_on_open_command(mut self, command: impl Into<String>) -> Self {
        self.on_open_commands.push(command.into());
        self
    }

    pub fn with_on_close_command(mut self, command: impl Into<String>) -> Self {
        self.on_close_commands.push(command.into());
        self
    }

    /// Mark the shell as prompting for `User:`/`Password:` after connect.
    pub fn with_in_band_login(mut self) -> Self {
        self.in_band_login = true;
        self
    }

    pub fn with_terminal_size(mut self, width: u32, height: u32) -> Self {
        self.terminal_width = width;
        self.terminal_height = height;
        self
    }

    pub fn get_privilege(&self, name: &str) -> Option<&PrivilegeLevel> {
        self.privilege_levels.get(name)
    }

    /// First output substring that marks `output` as failed.
    pub fn detect_failure(&self, output: &str) -> Option<&str> {
        self.failed_when_contains
            .iter()
            .find(|pattern| output.contains(pattern.as_str()))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_failure_detection() {
        let def = PlatformDefinition::new("test")
            .with_privilege(PrivilegeLevel::new("exec", r">\s?$").unwrap())
            .with_default_privilege("exec")
            .with_failure_pattern("% Invalid input");

        assert_eq!(def.default_privilege, "exec");
        assert!(def.get_privilege("exec").is_some());
        assert_eq!(
            def.detect_failure("          ^\n% Invalid input detected at '^' marker."),
            Some("% Invalid input")
        );
        assert_eq!(def.detect_failure("Interface  IP-Address"), None);
    }
}

//! Privilege level tracking and shortest-path navigation.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;
use regex::bytes::Regex;

use crate::error::{CommandError, Result};
use crate::platform::PrivilegeLevel;

/// Tracks the session's privilege level and plans moves between levels.
///
/// Levels and their parents form an undirected graph; moves follow the
/// shortest path through it.
#[derive(Debug)]
pub struct PrivilegeManager {
    levels: IndexMap<String, PrivilegeLevel>,
    graph: HashMap<String, HashSet<String>>,
    current: Option<String>,
}

/// How to cross one edge of the privilege graph.
#[derive(Debug, Clone)]
pub struct TransitionInfo {
    pub command: String,

    /// Secret prompt to answer, when the edge requires one.
    pub auth_prompt: Option<Regex>,
}

impl PrivilegeManager {
    pub fn new(levels: IndexMap<String, PrivilegeLevel>) -> Self {
        let mut graph: HashMap<String, HashSet<String>> = HashMap::new();
        for (name, level) in &levels {
            graph.entry(name.clone()).or_default();
            if let Some(parent) = &level.previous_priv {
                graph.entry(name.clone()).or_default().insert(parent.clone());
                graph.entry(parent.clone()).or_default().insert(name.clone());
            }
        }

        let current = levels
            .iter()
            .find(|(_, l)| l.previous_priv.is_none())
            .map(|(name, _)| name.clone());

        Self {
            levels,
            graph,
            current,
        }
    }

    /// Identify the level a prompt belongs to.
    pub fn determine_from_prompt(&self, prompt: &str) -> Result<&PrivilegeLevel> {
        self.levels
            .values()
            .find(|level| level.matches(prompt))
            .ok_or_else(|| {
                CommandError::UnknownPrivilege {
                    prompt: prompt.to_string(),
                }
                .into()
            })
    }

    /// Record the level matching `prompt`, returning its name.
    ///
    /// Unknown prompts leave the tracked level unchanged.
    pub fn observe_prompt(&mut self, prompt: &str) -> Option<String> {
        let name = self.determine_from_prompt(prompt).ok()?.name.clone();
        self.current = Some(name.clone());
        Some(name)
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.levels.contains_key(name)
    }

    /// Shortest list of levels from `from` to `to`, both ends included.
    pub fn find_path(&self, from: &str, to: &str) -> Result<Vec<String>> {
        if from == to {
            return Ok(vec![from.to_string()]);
        }

        let mut queue = VecDeque::from([from.to_string()]);
        let mut visited = HashSet::from([from.to_string()]);
        let mut parent: HashMap<String, String> = HashMap::new();

        while let Some(node) = queue.pop_front() {
            if node == to {
                let mut path = vec![to.to_string()];
                let mut cursor = to;
                while let Some(prev) = parent.get(cursor) {
                    path.push(prev.clone());
                    cursor = prev;
                }
                path.reverse();
                return Ok(path);
            }

            for neighbor in self.graph.get(&node).into_iter().flatten() {
                if visited.insert(neighbor.clone()) {
                    parent.insert(neighbor.clone(), node.clone());
                    queue.push_back(neighbor.clone());
                }
            }
        }

        Err(CommandError::NoPrivilegePath {
            from: from.to_string(),
            to: to.to_string(),
        }
        .into())
    }

    /// Transition between two adjacent levels.
    pub fn get_transition(&self, from: &str, to: &str) -> Option<TransitionInfo> {
        let from_level = self.levels.get(from)?;
        let to_level = self.levels.get(to)?;

        if to_level.previous_priv.as_deref() == Some(from) {
            return Some(TransitionInfo {
                command: to_level.escalate_command.clone()?,
                auth_prompt: to_level.escalate_prompt.clone(),
            });
        }

        if from_level.previous_priv.as_deref() == Some(to) {
            return Some(TransitionInfo {
                command: from_level.deescalate_command.clone()?,
                auth_prompt: None,
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ios_levels() -> IndexMap<String, PrivilegeLevel> {
        let exec = PrivilegeLevel::new("exec", r"(?m)^\S+>\s?$").unwrap();
        let privileged = PrivilegeLevel::new("privilege_exec", r"(?m)^\S+#\s?$")
            .unwrap()
            .with_parent("exec")
            .with_escalate("enable")
            .with_deescalate("disable")
            .with_auth(r"(?mi)^password:\s?$")
            .unwrap()
            .with_not_contains("(config");
        let configuration = PrivilegeLevel::new("configuration", r"(?m)^\S+\(config[^)]*\)#\s?$")
            .unwrap()
            .with_parent("privilege_exec")
            .with_escalate("configure terminal")
            .with_deescalate("end");

        [exec, privileged, configuration]
            .into_iter()
            .map(|l| (l.name.clone(), l))
            .collect()
    }

    #[test]
    fn test_determine_privilege() {
        let manager = PrivilegeManager::new(ios_levels());
        assert_eq!(manager.determine_from_prompt("rtr1>").unwrap().name, "exec");
        assert_eq!(
            manager.determine_from_prompt("rtr1#").unwrap().name,
            "privilege_exec"
        );
        assert_eq!(
            manager.determine_from_prompt("rtr1(config-if)#").unwrap().name,
            "configuration"
        );
        assert!(manager.determine_from_prompt("login:").is_err());
    }

    #[test]
    fn test_root_is_initial_and_observe_updates() {
        let mut manager = PrivilegeManager::new(ios_levels());
        assert_eq!(manager.current(), Some("exec"));
        assert_eq!(manager.observe_prompt("rtr1#").as_deref(), Some("privilege_exec"));
        assert_eq!(manager.current(), Some("privilege_exec"));
        assert_eq!(manager.observe_prompt("???"), None);
        assert_eq!(manager.current(), Some("privilege_exec"));
    }

    #[test]
    fn test_find_path_both_directions() {
        let manager = PrivilegeManager::new(ios_levels());
        assert_eq!(
            manager.find_path("exec", "configuration").unwrap(),
            vec!["exec", "privilege_exec", "configuration"]
        );
        assert_eq!(
            manager.find_path("configuration", "exec").unwrap(),
            vec!["configuration", "privilege_exec", "exec"]
        );
        assert!(manager.find_path("exec", "shell").is_err());
    }

    #[test]
    fn test_transitions() {
        let manager = PrivilegeManager::new(ios_levels());
        let up = manager.get_transition("exec", "privilege_exec").unwrap();
        assert_eq!(up.command, "enable");
        assert!(up.auth_prompt.is_some());

        let down = manager.get_transition("configuration", "privilege_exec").unwrap();
        assert_eq!(down.command, "end");
        assert!(down.auth_prompt.is_none());

        assert!(manager.get_transition("exec", "configuration").is_none());
    }
}

//! Script Agents
//!
//! Agents are script hooks declared on quests and tasks with keys such as
//! `agent:complete` or `agent:failure@party`. Each one guards a lifecycle
//! transition and may veto it.

use std::fmt;
use std::sync::Arc;

use super::runner::QUEST_NAMESPACES;

/// Scope used when a caller does not name one
pub const DEFAULT_SCOPE: &str = "self";

/// Lifecycle hook an agent is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentType {
    /// Before a quest is accepted, may veto
    QuestAccept,
    /// After a quest was accepted
    QuestAccepted,
    /// After an acceptance was vetoed by an accept agent
    QuestAcceptCancelled,
    QuestComplete,
    QuestFailure,
    QuestReset,
    TaskContinued,
    TaskCompleted,
    TaskReset,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::QuestAccept => "quest_accept",
            AgentType::QuestAccepted => "quest_accepted",
            AgentType::QuestAcceptCancelled => "quest_accept_cancelled",
            AgentType::QuestComplete => "quest_complete",
            AgentType::QuestFailure => "quest_failure",
            AgentType::QuestReset => "quest_reset",
            AgentType::TaskContinued => "task_continued",
            AgentType::TaskCompleted => "task_completed",
            AgentType::TaskReset => "task_reset",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "quest_accept" => Some(AgentType::QuestAccept),
            "quest_accepted" => Some(AgentType::QuestAccepted),
            "quest_accept_cancelled" => Some(AgentType::QuestAcceptCancelled),
            "quest_complete" => Some(AgentType::QuestComplete),
            "quest_failure" => Some(AgentType::QuestFailure),
            "quest_reset" => Some(AgentType::QuestReset),
            "task_continued" => Some(AgentType::TaskContinued),
            "task_completed" => Some(AgentType::TaskCompleted),
            "task_reset" => Some(AgentType::TaskReset),
            _ => None,
        }
    }

    /// Script namespaces available to agents of this type
    pub fn namespaces(&self) -> &'static [&'static str] {
        QUEST_NAMESPACES
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured script hook
#[derive(Debug, Clone)]
pub struct Agent {
    pub kind: AgentType,
    /// Script source handed to the executor
    pub action: Arc<str>,
    pub restrict: String,
}

impl Agent {
    /// Parse an agent from the part of its key after `agent:`.
    ///
    /// `body` has the form `<kind>[@<scope>]`; the kind is prefixed with
    /// `prefix` (`quest` or `task`) before lookup.
    pub fn parse(prefix: &str, body: &str, value: &toml::Value) -> Result<Self, String> {
        let mut parts = body.split('@').map(str::trim);
        let kind_name = parts.next().unwrap_or_default();
        let restrict = parts
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SCOPE)
            .to_string();

        let kind = AgentType::from_str(&format!("{}_{}", prefix, kind_name))
            .ok_or_else(|| format!("unknown agent type '{}_{}'", prefix, kind_name))?;
        let action = script_source(value)
            .ok_or_else(|| "agent action must be a string or a list of strings".to_string())?;

        Ok(Self {
            kind,
            action: action.into(),
            restrict,
        })
    }

    /// Whether this agent runs for the given caller scope.
    /// `*` and `all` match every scope.
    pub fn matches_scope(&self, scope: &str) -> bool {
        self.restrict == "*" || self.restrict == "all" || self.restrict == scope
    }

    /// Display label, e.g. `quest_complete @ self`
    pub fn label(&self) -> String {
        format!("{} @ {}", self.kind, self.restrict)
    }
}

/// Read a script from a config value: a string, or a list of lines
pub(crate) fn script_source(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Array(lines) => lines
            .iter()
            .map(|line| line.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .map(|lines| lines.join("\n")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_type_parsing() {
        assert_eq!(AgentType::from_str("quest_complete"), Some(AgentType::QuestComplete));
        assert_eq!(AgentType::from_str("TASK_RESET"), Some(AgentType::TaskReset));
        assert_eq!(AgentType::from_str("quest_continued"), None);
    }

    #[test]
    fn test_parse_key_body() {
        let value = toml::Value::String("return true".into());

        let agent = Agent::parse("quest", "complete", &value).unwrap();
        assert_eq!(agent.kind, AgentType::QuestComplete);
        assert_eq!(agent.restrict, "self");

        let agent = Agent::parse("task", " reset @ party ", &value).unwrap();
        assert_eq!(agent.kind, AgentType::TaskReset);
        assert_eq!(agent.restrict, "party");
        assert_eq!(agent.label(), "task_reset @ party");

        assert!(Agent::parse("quest", "dance", &value).is_err());
        assert!(Agent::parse("quest", "complete", &toml::Value::Integer(1)).is_err());
    }

    #[test]
    fn test_scope_matching() {
        let value = toml::Value::String(String::new());
        let scoped = Agent::parse("quest", "complete@party", &value).unwrap();
        assert!(scoped.matches_scope("party"));
        assert!(!scoped.matches_scope("self"));

        for wildcard in ["*", "all"] {
            let agent = Agent::parse("quest", &format!("complete@{}", wildcard), &value).unwrap();
            assert!(agent.matches_scope("self"));
            assert!(agent.matches_scope("party"));
        }
    }

    #[test]
    fn test_script_lines_joined() {
        let value: toml::Value = toml::Value::Array(vec![
            toml::Value::String("local x = 1".into()),
            toml::Value::String("return x == 1".into()),
        ]);
        assert_eq!(script_source(&value).unwrap(), "local x = 1\nreturn x == 1");
    }
}

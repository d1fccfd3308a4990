//! Quest Containers
//!
//! The shared part of quests and tasks: id, raw config, metadata, addons and
//! script agents. Containers are built once from config and never change.
//!
//! Config layout:
//!
//! ```toml
//! [meta.control]
//! repeat = 3
//!
//! "addon:stats" = true
//! "agent:complete" = "return quest.data_get('daily', 'kills') >= 10"
//! "agent:failure@party" = ["local x = 1", "return true"]
//! ```
//!
//! Unknown capabilities and malformed entries are logged and skipped so one
//! bad key never takes a whole quest down.

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tracing::{debug, error, warn};

use super::addon::Extension;
use super::agent::{Agent, AgentType};
use super::engine::QuestEngine;
use super::events::QuestEvent;
use super::instance::Quest;
use super::meta::Metadata;
use super::profile::PlayerProfile;
use super::registry::CapabilityRegistry;
use super::runner::{ScriptRequest, ScriptValue};

const AGENT_PREFIX: &str = "agent:";
const ADDON_PREFIX: &str = "addon:";

/// Whether a container is a quest template or one of its tasks
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    Template,
    Task { template_id: String },
}

impl ContainerKind {
    /// Prefix of agent type names declared on this kind of container
    pub fn agent_prefix(&self) -> &'static str {
        match self {
            ContainerKind::Template => "quest",
            ContainerKind::Task { .. } => "task",
        }
    }
}

/// Identity of a container, also handed to capability factories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerScope {
    pub kind: ContainerKind,
    pub id: String,
    /// `<quest id>` for templates, `<quest id>.<task id>` for tasks
    pub path: String,
}

impl ContainerScope {
    pub fn template(id: &str) -> Self {
        Self {
            kind: ContainerKind::Template,
            id: id.to_string(),
            path: id.to_string(),
        }
    }

    pub fn task(template_id: &str, id: &str) -> Self {
        Self {
            kind: ContainerKind::Task {
                template_id: template_id.to_string(),
            },
            id: id.to_string(),
            path: format!("{}.{}", template_id, id),
        }
    }

    /// Id of the quest this container belongs to
    pub fn node(&self) -> &str {
        match &self.kind {
            ContainerKind::Template => &self.id,
            ContainerKind::Task { template_id } => template_id,
        }
    }
}

#[derive(Debug)]
pub struct QuestContainer {
    scope: ContainerScope,
    config: toml::Table,
    metadata: HashMap<String, Arc<dyn Metadata>>,
    extensions: HashMap<String, Arc<dyn Extension>>,
    agents: Vec<Agent>,
}

impl QuestContainer {
    pub fn new(scope: ContainerScope, config: toml::Table, capabilities: &CapabilityRegistry) -> Self {
        let metadata = match config.get("meta") {
            Some(toml::Value::Table(section)) => section
                .iter()
                .filter_map(|(id, value)| match capabilities.create_metadata(id, value, &scope) {
                    Some(Ok(meta)) => Some((id.clone(), meta)),
                    Some(Err(e)) => {
                        warn!("Invalid {} meta on {}: {}", id, scope.path, e);
                        None
                    }
                    None => {
                        warn!("Unsupported meta '{}' on {}", id, scope.path);
                        None
                    }
                })
                .collect(),
            Some(_) => {
                warn!("meta section of {} is not a table", scope.path);
                HashMap::new()
            }
            None => HashMap::new(),
        };

        let extensions = config
            .iter()
            .filter_map(|(key, value)| Some((key.strip_prefix(ADDON_PREFIX)?.trim(), value)))
            .filter_map(|(id, value)| match capabilities.create_extension(id, value, &scope) {
                Some(Ok(addon)) => Some((id.to_string(), addon)),
                Some(Err(e)) => {
                    warn!("Invalid {} addon on {}: {}", id, scope.path, e);
                    None
                }
                None => {
                    warn!("Unsupported addon '{}' on {}", id, scope.path);
                    None
                }
            })
            .collect();

        let agents = config
            .iter()
            .filter_map(|(key, value)| Some((key.strip_prefix(AGENT_PREFIX)?, value)))
            .filter_map(|(body, value)| {
                match Agent::parse(scope.kind.agent_prefix(), body, value) {
                    Ok(agent) => Some(agent),
                    Err(e) => {
                        warn!("Skipping agent '{}' on {}: {}", body, scope.path, e);
                        None
                    }
                }
            })
            .collect();

        Self {
            scope,
            config,
            metadata,
            extensions,
            agents,
        }
    }

    pub fn id(&self) -> &str {
        &self.scope.id
    }

    pub fn path(&self) -> &str {
        &self.scope.path
    }

    pub fn kind(&self) -> &ContainerKind {
        &self.scope.kind
    }

    /// Id of the quest this container belongs to
    pub fn node(&self) -> &str {
        self.scope.node()
    }

    pub fn scope(&self) -> &ContainerScope {
        &self.scope
    }

    /// Raw config this container was built from
    pub fn config(&self) -> &toml::Table {
        &self.config
    }

    /// Typed access to a metadata capability
    pub fn metadata<T: Metadata>(&self, id: &str) -> Option<&T> {
        self.metadata.get(id)?.as_any().downcast_ref::<T>()
    }

    pub fn has_metadata(&self, id: &str) -> bool {
        self.metadata.contains_key(id)
    }

    pub fn metadata_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.metadata.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Typed access to an addon
    pub fn extension<T: Extension>(&self, id: &str) -> Option<&T> {
        self.extensions.get(id)?.as_any().downcast_ref::<T>()
    }

    pub fn has_extension(&self, id: &str) -> bool {
        self.extensions.contains_key(id)
    }

    pub fn addon_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.extensions.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Agents in declaration order
    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agent_labels(&self) -> Vec<String> {
        self.agents.iter().map(Agent::label).collect()
    }

    /// Agents of a type that run for a caller scope, in declaration order
    pub fn agents_of(&self, kind: AgentType, scope: &str) -> Vec<&Agent> {
        self.agents
            .iter()
            .filter(|agent| agent.kind == kind && agent.matches_scope(scope))
            .collect()
    }

    /// The player's active quest this container belongs to
    pub fn quest(&self, profile: &PlayerProfile) -> Option<Arc<Quest>> {
        profile.quest(self.node())
    }

    /// Run the agent chain for a lifecycle hook.
    ///
    /// Agents run one at a time in declaration order. The chain stops and
    /// resolves `false` at the first agent returning `false`, failing, or
    /// exceeding the configured timeout. A cancelled agent event also resolves
    /// `false` without running anything; an empty chain resolves `true`.
    pub async fn run_agents(
        self: &Arc<Self>,
        engine: &Arc<QuestEngine>,
        profile: &Arc<PlayerProfile>,
        kind: AgentType,
        scope: &str,
        reason: Option<&str>,
    ) -> bool {
        let event = QuestEvent::Agent {
            container: self,
            profile,
            agent: kind,
            scope,
        };
        if !engine.events().call(&event) {
            return false;
        }

        for (index, agent) in self.agents_of(kind, scope).into_iter().enumerate() {
            let request = ScriptRequest::new(
                format!("{}:{}[{}]", self.path(), kind, index),
                agent.action.clone(),
            )
            .namespaces(kind.namespaces())
            .engine(engine.clone())
            .profile(profile.clone())
            .container(self.clone())
            .variable("reason", ScriptValue::from(reason));

            match engine.evaluate(request).await {
                Ok(ScriptValue::Bool(false)) => {
                    debug!("Agent {} on {} vetoed for {}", agent.label(), self.path(), profile.name());
                    return false;
                }
                Ok(_) => {}
                Err(e) => {
                    error!(
                        "Agent {} on {} failed for {}: {}",
                        agent.label(),
                        self.path(),
                        profile.name(),
                        e
                    );
                    return false;
                }
            }
        }

        true
    }
}

impl PartialEq for QuestContainer {
    fn eq(&self, other: &Self) -> bool {
        self.scope.path == other.scope.path
    }
}

impl Eq for QuestContainer {}

impl Hash for QuestContainer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.scope.path.hash(state);
    }
}

impl fmt::Display for QuestContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.scope.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::addon::StatsAddon;
    use crate::quest::meta::{ControlMeta, TimeoutMeta};
    use crate::config::EngineConfig;
    use crate::quest::engine::QuestEngine;
    use crate::quest::events::{EventResult, QuestEvent};
    use crate::quest::testing::{ScriptedExecutor, engine_with, profile};

    fn build(scope: ContainerScope, src: &str) -> Arc<QuestContainer> {
        Arc::new(QuestContainer::new(
            scope,
            src.parse().unwrap(),
            &CapabilityRegistry::with_builtins(),
        ))
    }

    #[test]
    fn test_scope_paths() {
        let template = ContainerScope::template("hunt");
        assert_eq!(template.path, "hunt");
        assert_eq!(template.node(), "hunt");

        let task = ContainerScope::task("hunt", "kill_wolves");
        assert_eq!(task.path, "hunt.kill_wolves");
        assert_eq!(task.node(), "hunt");
        assert_eq!(task.kind.agent_prefix(), "task");
    }

    #[test]
    fn test_capabilities_resolved() {
        let container = build(
            ContainerScope::template("hunt"),
            r#"
"addon:stats" = true
"addon:unknown" = true
"agent:complete" = "return true"
"agent:failure@party" = "return false"
"agent:bogus" = "return true"

[meta]
control = { repeat = 3 }
timeout = "1h"
restart = 5
mystery = 1
"#,
        );

        assert_eq!(container.metadata_ids(), vec!["control", "timeout"]);
        assert_eq!(
            container.metadata::<ControlMeta>("control").and_then(|c| c.repeat),
            Some(3)
        );
        assert_eq!(
            container.metadata::<TimeoutMeta>("timeout").map(|t| t.duration_ms),
            Some(3_600_000)
        );
        // Wrong type for the id
        assert!(container.metadata::<TimeoutMeta>("control").is_none());

        assert_eq!(container.addon_ids(), vec!["stats"]);
        assert!(container.extension::<StatsAddon>("stats").is_some());

        assert_eq!(
            container.agent_labels(),
            vec!["quest_complete @ self", "quest_failure @ party"]
        );
        assert_eq!(container.agents_of(AgentType::QuestComplete, "self").len(), 1);
        assert!(container.agents_of(AgentType::QuestFailure, "self").is_empty());
    }

    #[test]
    fn test_identity_by_path() {
        let a = build(ContainerScope::template("hunt"), "name = \"a\"");
        let b = build(ContainerScope::template("hunt"), "name = \"b\"");
        let c = build(ContainerScope::task("hunt", "step"), "");
        assert_eq!(*a, *b);
        assert_ne!(*a, *c);
    }

    #[tokio::test]
    async fn test_run_agents_in_order_until_veto() {
        let executor = ScriptedExecutor::new();
        let engine = engine_with(executor.clone());
        let player = profile("alice");
        let container = build(
            ContainerScope::template("hunt"),
            r#"
"agent:complete" = "first:pass"
"agent:complete@*" = "second:false"
"agent:complete@all" = "third:true"
"#,
        );

        let passed = container
            .run_agents(&engine, &player, AgentType::QuestComplete, "self", Some("manual"))
            .await;
        assert!(!passed);
        assert_eq!(executor.calls(), vec!["first", "second"]);
        assert_eq!(executor.reasons(), vec![Some("manual".to_string()); 2]);
    }

    #[tokio::test]
    async fn test_run_agents_empty_chain_passes() {
        let executor = ScriptedExecutor::new();
        let engine = engine_with(executor.clone());
        let container = build(ContainerScope::template("hunt"), "\"agent:complete\" = \"x:false\"");

        assert!(
            container
                .run_agents(&engine, &profile("bob"), AgentType::QuestFailure, "self", None)
                .await
        );
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_run_agents_non_boolean_results_pass() {
        let executor = ScriptedExecutor::new();
        let engine = engine_with(executor.clone());
        let container = build(
            ContainerScope::template("hunt"),
            r#"
"agent:reset" = "a:nil"
"agent:reset@*" = "b:zero"
"agent:reset@all" = "c:text-false"
"#,
        );

        assert!(
            container
                .run_agents(&engine, &profile("carol"), AgentType::QuestReset, "self", None)
                .await
        );
        assert_eq!(executor.calls(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_run_agents_error_rejects() {
        let executor = ScriptedExecutor::new();
        let engine = engine_with(executor.clone());
        let container = build(
            ContainerScope::template("hunt"),
            r#"
"agent:reset" = "a:error"
"agent:reset@*" = "b:true"
"#,
        );

        assert!(
            !container
                .run_agents(&engine, &profile("dave"), AgentType::QuestReset, "self", None)
                .await
        );
        assert_eq!(executor.calls(), vec!["a"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_agents_timeout_rejects() {
        let executor = ScriptedExecutor::new();
        let engine = engine_with(executor.clone());
        let container = build(
            ContainerScope::template("hunt"),
            r#"
"agent:reset" = "slow:hang"
"agent:reset@*" = "after:true"
"#,
        );

        assert!(
            !container
                .run_agents(&engine, &profile("erin"), AgentType::QuestReset, "self", None)
                .await
        );
        assert_eq!(executor.calls(), vec!["slow"]);
    }

    #[tokio::test]
    async fn test_cancelled_agent_event_skips_chain() {
        let executor = ScriptedExecutor::new();
        let engine = QuestEngine::builder()
            .executor(executor.clone())
            .on_event(|event| match event {
                QuestEvent::Agent { scope: "party", .. } => EventResult::Cancel,
                _ => EventResult::Continue,
            })
            .build();
        let container = build(ContainerScope::template("hunt"), "\"agent:complete@*\" = \"a:true\"");
        let player = profile("frank");

        assert!(
            !container
                .run_agents(&engine, &player, AgentType::QuestComplete, "party", None)
                .await
        );
        assert!(executor.calls().is_empty());

        assert!(
            container
                .run_agents(&engine, &player, AgentType::QuestComplete, "self", None)
                .await
        );
        assert_eq!(executor.calls(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_run_agents_busy_lua_script_rejects() {
        let config = EngineConfig::from_toml_str("[agents]\ntimeout_ms = 100").unwrap();
        let engine = QuestEngine::builder().config(config).build();
        let container = build(
            ContainerScope::template("hunt"),
            r#"
"agent:complete" = "while true do end"
"agent:complete@*" = "return true"
"#,
        );

        let started = std::time::Instant::now();
        assert!(
            !container
                .run_agents(&engine, &profile("gina"), AgentType::QuestComplete, "self", None)
                .await
        );
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }
}

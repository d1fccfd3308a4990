//! Quest Templates and Tasks
//!
//! A template is the static definition of a quest; players accept it to get
//! a [`Quest`]. Tasks are the template's steps, each completed through its
//! objective. Both wrap a [`QuestContainer`].
//!
//! ```toml
//! [hunt]
//! name = "Wolf Hunt"
//! meta.control = { repeat = 3, cooldown = "1d" }
//! "agent:accept" = "return true"
//!
//! [hunt.task.wolves]
//! objective = "signature"
//! ```

use std::fmt;
use std::sync::{Arc, Weak};

use tracing::{info, warn};

use super::agent::{AgentType, DEFAULT_SCOPE};
use super::container::{ContainerScope, QuestContainer};
use super::data::current_time_millis;
use super::engine::QuestEngine;
use super::events::QuestEvent;
use super::instance::Quest;
use super::meta::{ControlMeta, DEFAULT_CONTROL, META_CONTROL, META_RESTART, META_TIMEOUT, RestartMeta, TimeoutMeta};
use super::objective::Objective;
use super::profile::PlayerProfile;
use super::registry::CapabilityRegistry;

/// Outcome of an acceptance attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptResult {
    /// Accepted, or for a check: would be accepted
    Accepted,
    AlreadyAccepted,
    RepeatLimitReached,
    CooldownActive,
    /// Vetoed by a listener
    Cancelled,
    /// Vetoed by an accept agent
    Rejected,
}

impl AcceptResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AcceptResult::Accepted)
    }
}

impl fmt::Display for AcceptResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AcceptResult::Accepted => "accepted",
            AcceptResult::AlreadyAccepted => "already_accepted",
            AcceptResult::RepeatLimitReached => "repeat_limit_reached",
            AcceptResult::CooldownActive => "cooldown_active",
            AcceptResult::Cancelled => "cancelled",
            AcceptResult::Rejected => "rejected",
        })
    }
}

#[derive(Debug)]
pub struct Template {
    container: Arc<QuestContainer>,
    /// In declaration order
    tasks: Vec<Arc<Task>>,
}

impl Template {
    /// Build a template and its tasks. Tasks come from the `task` table;
    /// tasks without a known objective are skipped.
    pub fn new(id: &str, config: toml::Table, capabilities: &CapabilityRegistry) -> Arc<Self> {
        let task_configs: Vec<(String, toml::Table)> = match config.get("task") {
            Some(toml::Value::Table(section)) => section
                .iter()
                .filter_map(|(task_id, value)| match value {
                    toml::Value::Table(task) => Some((task_id.clone(), task.clone())),
                    _ => {
                        warn!("Task {}.{} is not a table", id, task_id);
                        None
                    }
                })
                .collect(),
            Some(_) => {
                warn!("task section of {} is not a table", id);
                Vec::new()
            }
            None => Vec::new(),
        };

        Arc::new_cyclic(|template| {
            let tasks = task_configs
                .into_iter()
                .filter_map(|(task_id, task)| Task::new(id, &task_id, task, template.clone(), capabilities))
                .collect();

            Self {
                container: Arc::new(QuestContainer::new(ContainerScope::template(id), config, capabilities)),
                tasks,
            }
        })
    }

    pub fn id(&self) -> &str {
        self.container.id()
    }

    pub fn path(&self) -> &str {
        self.container.path()
    }

    pub fn container(&self) -> &Arc<QuestContainer> {
        &self.container
    }

    pub fn tasks(&self) -> &[Arc<Task>] {
        &self.tasks
    }

    pub fn task(&self, id: &str) -> Option<&Arc<Task>> {
        self.tasks.iter().find(|t| t.id() == id)
    }

    pub fn task_ids(&self) -> Vec<String> {
        self.tasks.iter().map(|t| t.id().to_string()).collect()
    }

    /// Control meta, unrestricted when none is configured
    pub fn control(&self) -> &ControlMeta {
        self.container
            .metadata::<ControlMeta>(META_CONTROL)
            .unwrap_or(&DEFAULT_CONTROL)
    }

    pub fn restart(&self) -> Option<&RestartMeta> {
        self.container.metadata::<RestartMeta>(META_RESTART)
    }

    pub fn timeout(&self) -> Option<&TimeoutMeta> {
        self.container.metadata::<TimeoutMeta>(META_TIMEOUT)
    }

    /// Whether a completing quest restarts instead
    pub async fn can_restart(&self, engine: &Arc<QuestEngine>, profile: &Arc<PlayerProfile>) -> bool {
        match self.restart() {
            Some(restart) => restart.can_restart(engine, profile, &self.container).await,
            None => false,
        }
    }

    /// Whether a quest started at `start_ms` has run out of time
    pub fn is_timeout(&self, start_ms: i64) -> bool {
        self.timeout()
            .is_some_and(|t| t.is_timeout(start_ms, current_time_millis()))
    }

    pub async fn run_agents(
        &self,
        engine: &Arc<QuestEngine>,
        profile: &Arc<PlayerProfile>,
        kind: AgentType,
        scope: &str,
        reason: Option<&str>,
    ) -> bool {
        self.container.run_agents(engine, profile, kind, scope, reason).await
    }

    fn precheck(&self, profile: &PlayerProfile) -> Option<AcceptResult> {
        if profile.quest(self.id()).is_some() {
            return Some(AcceptResult::AlreadyAccepted);
        }
        self.control().check(profile, self.id())
    }

    /// Check acceptance without accepting. Accept agents run with reason
    /// `check`; no events fire.
    pub async fn check_accept(&self, engine: &Arc<QuestEngine>, profile: &Arc<PlayerProfile>) -> AcceptResult {
        if let Some(rejection) = self.precheck(profile) {
            return rejection;
        }
        if !self
            .run_agents(engine, profile, AgentType::QuestAccept, DEFAULT_SCOPE, Some("check"))
            .await
        {
            return AcceptResult::Rejected;
        }
        AcceptResult::Accepted
    }

    /// Accept this quest for a player
    pub async fn accept_to(&self, engine: &Arc<QuestEngine>, profile: &Arc<PlayerProfile>) -> AcceptResult {
        if let Some(rejection) = self.precheck(profile) {
            return rejection;
        }

        if !engine.events().call(&QuestEvent::AcceptPre {
            template: self,
            profile,
        }) {
            return AcceptResult::Cancelled;
        }

        if !self
            .run_agents(engine, profile, AgentType::QuestAccept, DEFAULT_SCOPE, None)
            .await
        {
            self.run_agents(engine, profile, AgentType::QuestAcceptCancelled, DEFAULT_SCOPE, None)
                .await;
            return AcceptResult::Rejected;
        }

        // An agent may have accepted it meanwhile
        if profile.quest(self.id()).is_some() {
            return AcceptResult::AlreadyAccepted;
        }

        let quest = Quest::new(self.id(), profile, engine.clone());
        quest.set_new_quest(true);
        profile.register_quest(quest.clone());
        info!("Player {} accepted quest {}", profile.name(), self.id());

        self.run_agents(engine, profile, AgentType::QuestAccepted, DEFAULT_SCOPE, None)
            .await;
        engine.events().call(&QuestEvent::AcceptPost {
            quest: &quest,
            profile,
        });

        AcceptResult::Accepted
    }
}

pub struct Task {
    container: Arc<QuestContainer>,
    template: Weak<Template>,
    objective: Arc<dyn Objective>,
}

impl Task {
    fn new(
        template_id: &str,
        task_id: &str,
        config: toml::Table,
        template: Weak<Template>,
        capabilities: &CapabilityRegistry,
    ) -> Option<Arc<Self>> {
        let scope = ContainerScope::task(template_id, task_id);

        let objective = match config.get("objective").and_then(|v| v.as_str()) {
            Some(name) => match capabilities.objective(name) {
                Some(objective) => objective,
                None => {
                    warn!("Skipping task {}: unsupported objective '{}'", scope.path, name);
                    return None;
                }
            },
            None => {
                warn!("Skipping task {}: no objective", scope.path);
                return None;
            }
        };

        Some(Arc::new(Self {
            container: Arc::new(QuestContainer::new(scope, config, capabilities)),
            template,
            objective,
        }))
    }

    pub fn id(&self) -> &str {
        self.container.id()
    }

    pub fn path(&self) -> &str {
        self.container.path()
    }

    pub fn template_id(&self) -> &str {
        self.container.node()
    }

    /// The owning template, while it is alive
    pub fn template(&self) -> Option<Arc<Template>> {
        self.template.upgrade()
    }

    pub fn container(&self) -> &Arc<QuestContainer> {
        &self.container
    }

    pub fn objective(&self) -> &Arc<dyn Objective> {
        &self.objective
    }

    pub fn has_completed_signature(&self, profile: &PlayerProfile) -> bool {
        self.objective.has_completed_signature(profile, self)
    }

    pub fn set_completed_signature(&self, profile: &PlayerProfile, completed: bool) {
        self.objective.set_completed_signature(profile, self, completed);
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("path", &self.path())
            .field("objective", &self.objective.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::events::{EventResult, QuestNotification, NotificationKind};
    use crate::quest::meta::ControlTrigger;
    use crate::quest::testing::{ScriptedExecutor, engine_with, profile, table};

    #[test]
    fn test_tasks_built_in_order() {
        let template = Template::new(
            "hunt",
            table(
                r#"
[task.wolves]
objective = "signature"

[task.nothing]
name = "no objective"

[task.bears]
objective = "signature"
"#,
            ),
            &CapabilityRegistry::with_builtins(),
        );

        assert_eq!(template.task_ids(), vec!["wolves", "bears"]);
        let bears = template.task("bears").unwrap();
        assert_eq!(bears.path(), "hunt.bears");
        assert_eq!(bears.template_id(), "hunt");
        assert_eq!(bears.template().unwrap().id(), "hunt");
        assert_eq!(template.control(), &ControlMeta::unrestricted());
        assert!(template.restart().is_none());
        assert!(!template.is_timeout(0));
    }

    #[tokio::test]
    async fn test_accept_registers_new_quest() {
        let engine = engine_with(ScriptedExecutor::new());
        let template = engine.define_template("hunt", table("\"agent:accepted\" = \"after:pass\""));
        let player = profile("alice");
        let mut notifications = engine.events().subscribe();

        assert_eq!(template.accept_to(&engine, &player).await, AcceptResult::Accepted);
        let quest = player.quest("hunt").unwrap();
        assert!(quest.is_new_quest());
        assert!(quest.start_time().is_some());
        assert_eq!(
            notifications.try_recv().unwrap(),
            QuestNotification {
                player: player.unique_id(),
                quest_id: "hunt".into(),
                task_id: None,
                kind: NotificationKind::Accepted,
            }
        );

        assert_eq!(template.accept_to(&engine, &player).await, AcceptResult::AlreadyAccepted);
    }

    #[tokio::test]
    async fn test_accept_vetoed_by_agent() {
        let executor = ScriptedExecutor::new();
        let engine = engine_with(executor.clone());
        let template = engine.define_template(
            "hunt",
            table(
                r#"
"agent:accept" = "gate:false"
"agent:accept_cancelled" = "cancelled:pass"
"agent:accepted" = "accepted:pass"
"#,
            ),
        );
        let player = profile("bob");

        assert_eq!(template.accept_to(&engine, &player).await, AcceptResult::Rejected);
        assert!(player.quest("hunt").is_none());
        assert_eq!(executor.calls(), vec!["gate", "cancelled"]);
    }

    #[tokio::test]
    async fn test_accept_cancelled_by_listener() {
        let executor = ScriptedExecutor::new();
        let engine = crate::quest::engine::QuestEngine::builder()
            .executor(executor.clone())
            .on_event(|event| match event {
                QuestEvent::AcceptPre { .. } => EventResult::Cancel,
                _ => EventResult::Continue,
            })
            .build();
        let template = engine.define_template("hunt", table("\"agent:accept\" = \"gate:true\""));
        let player = profile("carol");

        assert_eq!(template.accept_to(&engine, &player).await, AcceptResult::Cancelled);
        assert!(player.quest("hunt").is_none());
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_check_accept_is_dry_run() {
        let executor = ScriptedExecutor::new();
        let engine = engine_with(executor.clone());
        let template = engine.define_template("hunt", table("\"agent:accept\" = \"gate:true\""));
        let player = profile("dave");

        assert_eq!(template.check_accept(&engine, &player).await, AcceptResult::Accepted);
        assert!(player.quest("hunt").is_none());
        assert_eq!(executor.reasons(), vec![Some("check".to_string())]);
    }

    #[tokio::test]
    async fn test_repeat_limit() {
        let engine = engine_with(ScriptedExecutor::new());
        let template = engine.define_template("hunt", table("meta.control = { repeat = 1 }"));
        let player = profile("erin");

        template.control().signature(&player, "hunt", ControlTrigger::Complete);
        assert_eq!(template.check_accept(&engine, &player).await, AcceptResult::RepeatLimitReached);
        assert_eq!(template.accept_to(&engine, &player).await, AcceptResult::RepeatLimitReached);
    }
}

//! Active Quests
//!
//! A [`Quest`] is one player's running instance of a template. Its state
//! lives in its data store; the template and tasks are looked up through
//! the engine on every call, so a removed template makes the quest invalid
//! instead of leaving it pointing at stale definitions.
//!
//! Transitions:
//!
//! - complete: restart check, all tasks signed, pre event, agents, commit
//! - failure: pre event, agents, commit
//! - reset: pre event, agents, objective resets, data cleared
//!
//! Task agents: `task_completed` guards signing in [`Quest::complete_quest`],
//! `task_reset` guards each objective reset, and `task_continued` runs for
//! every unsigned task when a completion check finds work left.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tracing::{debug, info};
use uuid::Uuid;

use super::agent::{AgentType, DEFAULT_SCOPE};
use super::data::{DataContainer, current_time_millis};
use super::engine::QuestEngine;
use super::events::QuestEvent;
use super::meta::ControlTrigger;
use super::profile::{PlayerProfile, completion_marker};
use super::template::{Task, Template};
use crate::error::QuestError;

/// Quest data key holding the start time in milliseconds
pub const START_KEY: &str = "start";

/// Outcome of a transition request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Completed,
    Failed,
    Reset,
    /// Dropped without completing or failing
    Stopped,
    /// Blocked by a listener or an agent
    Vetoed,
    /// Preconditions not met, nothing changed
    Unchanged,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Transition::Completed => "completed",
            Transition::Failed => "failed",
            Transition::Reset => "reset",
            Transition::Stopped => "stopped",
            Transition::Vetoed => "vetoed",
            Transition::Unchanged => "unchanged",
        })
    }
}

pub struct Quest {
    id: String,
    profile: Weak<PlayerProfile>,
    engine: Arc<QuestEngine>,
    data: DataContainer,
    new_quest: AtomicBool,
}

impl Quest {
    /// Start a quest for a player. Clears any earlier completion marker.
    pub fn new(id: &str, profile: &Arc<PlayerProfile>, engine: Arc<QuestEngine>) -> Arc<Self> {
        let data = DataContainer::new();
        data.set(START_KEY, current_time_millis());
        profile.data().remove(&completion_marker(id));

        Arc::new(Self {
            id: id.to_string(),
            profile: Arc::downgrade(profile),
            engine,
            data,
            new_quest: AtomicBool::new(false),
        })
    }

    /// Restore a quest from stored data, without touching profile markers
    pub fn restore(id: &str, profile: &Arc<PlayerProfile>, engine: Arc<QuestEngine>, data: DataContainer) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            profile: Arc::downgrade(profile),
            engine,
            data,
            new_quest: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn data(&self) -> &DataContainer {
        &self.data
    }

    pub fn profile(&self) -> Option<Arc<PlayerProfile>> {
        self.profile.upgrade()
    }

    pub fn is_owner(&self, player: Uuid) -> bool {
        self.profile().is_some_and(|p| p.unique_id() == player)
    }

    /// Whether the quest was accepted during this session
    pub fn is_new_quest(&self) -> bool {
        self.new_quest.load(Ordering::Relaxed)
    }

    pub(crate) fn set_new_quest(&self, new_quest: bool) {
        self.new_quest.store(new_quest, Ordering::Relaxed);
    }

    pub fn template(&self) -> Option<Arc<Template>> {
        self.engine.template(&self.id)
    }

    /// Whether the template still exists
    pub fn is_valid(&self) -> bool {
        self.template().is_some()
    }

    pub fn tasks(&self) -> Vec<Arc<Task>> {
        self.template()
            .map(|t| t.tasks().to_vec())
            .unwrap_or_default()
    }

    pub fn task(&self, id: &str) -> Option<Arc<Task>> {
        self.template()?.task(id).cloned()
    }

    /// Whether every task carries its completion signature
    pub fn is_completed(&self) -> bool {
        match (self.template(), self.profile()) {
            (Some(template), Some(profile)) => template
                .tasks()
                .iter()
                .all(|task| task.has_completed_signature(&profile)),
            _ => false,
        }
    }

    pub fn start_time(&self) -> Option<i64> {
        self.data.get(START_KEY).and_then(|v| v.as_i64())
    }

    pub fn is_timeout(&self) -> bool {
        match (self.template(), self.start_time()) {
            (Some(template), Some(start)) => template.is_timeout(start),
            _ => false,
        }
    }

    fn require_template(&self) -> Result<Arc<Template>, QuestError> {
        self.template()
            .ok_or_else(|| QuestError::TemplateMissing(self.id.clone()))
    }

    fn require_profile(&self) -> Result<Arc<PlayerProfile>, QuestError> {
        self.profile()
            .ok_or_else(|| QuestError::ProfileUnavailable(self.id.clone()))
    }

    /// Complete the quest if every task is signed. A template with a
    /// restart script that allows it is reset instead.
    pub async fn check_complete(&self) -> Result<Transition, QuestError> {
        let template = self.require_template()?;
        let profile = self.require_profile()?;

        if template.can_restart(&self.engine, &profile).await {
            debug!("Quest {} of {} restarts instead of completing", self.id, profile.name());
            return self.reset_quest().await;
        }

        let pending: Vec<&Arc<Task>> = template
            .tasks()
            .iter()
            .filter(|task| !task.has_completed_signature(&profile))
            .collect();
        if !pending.is_empty() {
            // Progress hooks only, their verdict is not a veto
            for task in pending {
                task.container()
                    .run_agents(&self.engine, &profile, AgentType::TaskContinued, DEFAULT_SCOPE, None)
                    .await;
            }
            return Ok(Transition::Unchanged);
        }

        if !self.engine.events().call(&QuestEvent::CompletePre {
            quest: self,
            profile: &profile,
        }) {
            return Ok(Transition::Vetoed);
        }

        if !template
            .run_agents(&self.engine, &profile, AgentType::QuestComplete, DEFAULT_SCOPE, None)
            .await
        {
            return Ok(Transition::Vetoed);
        }

        template
            .control()
            .signature(&profile, &self.id, ControlTrigger::Complete);
        profile.unregister_quest(&self.id);
        profile
            .data()
            .set(&completion_marker(&self.id), current_time_millis());

        self.engine.events().call(&QuestEvent::CompletePost {
            quest: self,
            profile: &profile,
        });
        info!("Player {} completed quest {}", profile.name(), self.id);
        Ok(Transition::Completed)
    }

    /// Sign every task its `task_completed` agents allow, then complete
    pub async fn complete_quest(&self) -> Result<Transition, QuestError> {
        let template = self.require_template()?;
        let profile = self.require_profile()?;

        for task in template.tasks() {
            if task.has_completed_signature(&profile) {
                continue;
            }
            if task
                .container()
                .run_agents(&self.engine, &profile, AgentType::TaskCompleted, DEFAULT_SCOPE, None)
                .await
            {
                task.set_completed_signature(&profile, true);
            } else {
                debug!("Task {} of {} left unsigned", task.path(), profile.name());
            }
        }
        self.check_complete().await
    }

    pub async fn failure_quest(&self) -> Result<Transition, QuestError> {
        let template = self.require_template()?;
        let profile = self.require_profile()?;

        if !self.engine.events().call(&QuestEvent::FailurePre {
            quest: self,
            profile: &profile,
        }) {
            return Ok(Transition::Vetoed);
        }

        if !template
            .run_agents(&self.engine, &profile, AgentType::QuestFailure, DEFAULT_SCOPE, None)
            .await
        {
            return Ok(Transition::Vetoed);
        }

        template
            .control()
            .signature(&profile, &self.id, ControlTrigger::Failure);
        profile.unregister_quest(&self.id);

        self.engine.events().call(&QuestEvent::FailurePost {
            quest: self,
            profile: &profile,
        });
        info!("Player {} failed quest {}", profile.name(), self.id);
        Ok(Transition::Failed)
    }

    /// Reset every objective and clear the quest data, start time included
    pub async fn reset_quest(&self) -> Result<Transition, QuestError> {
        let template = self.require_template()?;
        let profile = self.require_profile()?;

        if !self.engine.events().call(&QuestEvent::ResetPre {
            quest: self,
            profile: &profile,
        }) {
            return Ok(Transition::Vetoed);
        }

        if !template
            .run_agents(&self.engine, &profile, AgentType::QuestReset, DEFAULT_SCOPE, None)
            .await
        {
            return Ok(Transition::Vetoed);
        }

        for task in template.tasks() {
            let allowed = self.engine.events().call(&QuestEvent::ObjectiveResetPre {
                task,
                quest: self,
                profile: &profile,
            });
            if !allowed {
                continue;
            }
            if !task
                .container()
                .run_agents(&self.engine, &profile, AgentType::TaskReset, DEFAULT_SCOPE, None)
                .await
            {
                debug!("Objective reset of {} vetoed for {}", task.path(), profile.name());
                continue;
            }
            task.objective().on_reset(&profile, task, self);
            self.engine.events().call(&QuestEvent::ObjectiveResetPost {
                task,
                quest: self,
                profile: &profile,
            });
        }

        self.data.clear();

        self.engine.events().call(&QuestEvent::ResetPost {
            quest: self,
            profile: &profile,
        });
        info!("Player {} reset quest {}", profile.name(), self.id);
        Ok(Transition::Reset)
    }
}

impl fmt::Debug for Quest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Quest")
            .field("id", &self.id)
            .field("new_quest", &self.is_new_quest())
            .field("data", &self.data.snapshot())
            .finish()
    }
}

//! Task Objectives
//!
//! An objective decides when a task counts as done. Completion is recorded
//! as a signature in the owning quest's data under `<task path>.complete`.

use std::fmt;

use super::instance::Quest;
use super::profile::PlayerProfile;
use super::template::Task;

pub const OBJECTIVE_SIGNATURE: &str = "signature";

/// Quest data key holding a task's completion signature
pub fn completion_key(task: &Task) -> String {
    format!("{}.complete", task.path())
}

/// Completion strategy of a task
pub trait Objective: fmt::Debug + Send + Sync {
    /// Id used by `objective = "<name>"` in task configs
    fn name(&self) -> &str;

    fn has_completed_signature(&self, profile: &PlayerProfile, task: &Task) -> bool {
        profile
            .quest(task.template_id())
            .and_then(|quest| quest.data().get(&completion_key(task)))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// Mark or clear a task as completed. Does nothing when the player has
    /// not accepted the quest.
    fn set_completed_signature(&self, profile: &PlayerProfile, task: &Task, completed: bool) {
        if let Some(quest) = profile.quest(task.template_id()) {
            if completed {
                quest.data().set(&completion_key(task), true);
            } else {
                quest.data().remove(&completion_key(task));
            }
        }
    }

    /// Called once per task when its quest is reset
    fn on_reset(&self, _profile: &PlayerProfile, _task: &Task, _quest: &Quest) {}
}

/// Objective completed only by scripts or explicit completion
#[derive(Debug, Default)]
pub struct SignatureObjective;

impl Objective for SignatureObjective {
    fn name(&self) -> &str {
        OBJECTIVE_SIGNATURE
    }

    fn on_reset(&self, _profile: &PlayerProfile, task: &Task, quest: &Quest) {
        quest.data().remove(&completion_key(task));
    }
}

//! Player Profiles
//!
//! A profile owns a player's persistent data and the quests they have
//! accepted. Completion markers live in profile data as
//! `quest.complete.<quest id>` holding the completion time.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use uuid::Uuid;

use super::data::DataContainer;
use super::instance::Quest;

/// Profile data key marking a completed quest
pub fn completion_marker(quest_id: &str) -> String {
    format!("quest.complete.{}", quest_id)
}

pub struct PlayerProfile {
    unique_id: Uuid,
    name: String,
    data: DataContainer,
    quests: DashMap<String, Arc<Quest>>,
}

impl PlayerProfile {
    pub fn new(unique_id: Uuid, name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            unique_id,
            name: name.into(),
            data: DataContainer::new(),
            quests: DashMap::new(),
        })
    }

    pub fn unique_id(&self) -> Uuid {
        self.unique_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &DataContainer {
        &self.data
    }

    /// The active quest with this id
    pub fn quest(&self, quest_id: &str) -> Option<Arc<Quest>> {
        self.quests.get(quest_id).map(|q| q.value().clone())
    }

    /// Active quests ordered by id
    pub fn quests(&self) -> Vec<Arc<Quest>> {
        let mut quests: Vec<Arc<Quest>> = self.quests.iter().map(|q| q.value().clone()).collect();
        quests.sort_by(|a, b| a.id().cmp(b.id()));
        quests
    }

    pub fn quest_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.quests.iter().map(|q| q.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Register an active quest, returning the one it replaced
    pub fn register_quest(&self, quest: Arc<Quest>) -> Option<Arc<Quest>> {
        self.quests.insert(quest.id().to_string(), quest)
    }

    pub fn unregister_quest(&self, quest_id: &str) -> Option<Arc<Quest>> {
        self.quests.remove(quest_id).map(|(_, q)| q)
    }

    pub fn is_quest_completed(&self, quest_id: &str) -> bool {
        self.data.contains(&completion_marker(quest_id))
    }

    /// Millisecond timestamp of the last completion
    pub fn completion_time(&self, quest_id: &str) -> Option<i64> {
        self.data
            .get(&completion_marker(quest_id))
            .and_then(|v| v.as_i64())
    }
}

impl fmt::Debug for PlayerProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerProfile")
            .field("unique_id", &self.unique_id)
            .field("name", &self.name)
            .field("quests", &self.quest_ids())
            .finish()
    }
}

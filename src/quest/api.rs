//! Quest Lua API
//!
//! Operations scripts can perform on the player running them, exposed to Lua
//! as the `quest` table:
//!
//! ```lua
//! quest.ids()                         -- active quest ids
//! quest.data_get(id, key)             -- quest data value or nil
//! quest.data_set(id, key, value)      -- nil removes the key
//! quest.data_increase(id, key, n)
//! quest.data_keys(id)
//! quest.accept(id) / quest.check_accept(id)
//! quest.accepted(id) / quest.completed(id)
//! quest.complete(id) / quest.failure(id) / quest.reset(id) / quest.stop(id)
//! quest.tasks(id)
//! quest.hide_stats(id[, task]) / quest.refresh_stats(id[, task])
//! ```
//!
//! Operations on an unknown quest template return the string `"NULL"`.

use std::sync::Arc;

use mlua::{FromLua, IntoLua, Lua, Result as LuaResult, Table, Value};
use tracing::{info, warn};

use super::addon::{hide_stats, refresh_stats};
use super::container::QuestContainer;
use super::data::DataValue;
use super::engine::QuestEngine;
use super::instance::Transition;
use super::profile::PlayerProfile;
use super::template::AcceptResult;

/// Returned to scripts naming a template that does not exist
pub const MISSING_TEMPLATE: &str = "NULL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestAction {
    Complete,
    Failure,
    Reset,
    /// Drop the quest without any transition
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsAction {
    Hide,
    Refresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetMode {
    Overwrite,
    Increase,
}

/// Quest operations bound to one player
pub struct QuestApi {
    engine: Arc<QuestEngine>,
    profile: Arc<PlayerProfile>,
}

impl QuestApi {
    pub fn new(engine: Arc<QuestEngine>, profile: Arc<PlayerProfile>) -> Self {
        Self { engine, profile }
    }

    pub fn quest_ids(&self) -> Vec<String> {
        self.profile.quest_ids()
    }

    pub fn data(&self, quest_id: &str, key: &str) -> Option<DataValue> {
        self.profile.quest(quest_id)?.data().get(key)
    }

    /// Write quest data. `None` removes the key. Returns the stored value.
    pub fn set_data(
        &self,
        quest_id: &str,
        key: &str,
        value: Option<DataValue>,
        mode: SetMode,
    ) -> Option<DataValue> {
        let quest = self.profile.quest(quest_id)?;
        let Some(value) = value else {
            quest.data().remove(key);
            return None;
        };

        match mode {
            SetMode::Overwrite => {
                quest.data().set(key, value.clone());
                Some(value)
            }
            SetMode::Increase => match quest.data().increase(key, value) {
                Ok(stored) => Some(stored),
                Err(e) => {
                    warn!("Script increase on {} failed: {}", quest_id, e);
                    None
                }
            },
        }
    }

    pub fn data_keys(&self, quest_id: &str) -> Vec<String> {
        self.profile
            .quest(quest_id)
            .map(|q| q.data().keys())
            .unwrap_or_default()
    }

    /// Accept a quest, or only check whether it could be accepted.
    /// `None` when the template does not exist.
    pub async fn accept(&self, quest_id: &str, check_only: bool) -> Option<AcceptResult> {
        let template = self.engine.template(quest_id)?;
        let result = if check_only {
            template.check_accept(&self.engine, &self.profile).await
        } else {
            template.accept_to(&self.engine, &self.profile).await
        };
        Some(result)
    }

    pub fn accepted(&self, quest_id: &str) -> bool {
        self.profile.quest(quest_id).is_some()
    }

    pub fn completed(&self, quest_id: &str) -> bool {
        self.profile.is_quest_completed(quest_id)
    }

    /// Drive an active quest. `None` when the template does not exist.
    /// An inactive quest reports [`Transition::Unchanged`].
    pub async fn act(&self, quest_id: &str, action: QuestAction) -> Option<Transition> {
        self.engine.template(quest_id)?;
        let Some(quest) = self.profile.quest(quest_id) else {
            return Some(Transition::Unchanged);
        };

        let result = match action {
            QuestAction::Complete => quest.complete_quest().await,
            QuestAction::Failure => quest.failure_quest().await,
            QuestAction::Reset => quest.reset_quest().await,
            QuestAction::Stop => {
                self.profile.unregister_quest(quest_id);
                info!("Quest {} stopped for {}", quest_id, self.profile.name());
                Ok(Transition::Stopped)
            }
        };

        match result {
            Ok(transition) => Some(transition),
            Err(e) => {
                warn!("Script {:?} on quest {} failed: {}", action, quest_id, e);
                Some(Transition::Unchanged)
            }
        }
    }

    pub fn tasks(&self, quest_id: &str) -> Option<Vec<String>> {
        Some(self.engine.template(quest_id)?.task_ids())
    }

    /// Hide or refresh stats of an active quest. `task` selects a task id,
    /// `all` every task, and `None` the quest itself. Returns how many
    /// containers changed.
    pub fn stats(&self, quest_id: &str, task: Option<&str>, action: StatsAction) -> usize {
        if self.profile.quest(quest_id).is_none() {
            return 0;
        }
        let Some(template) = self.engine.template(quest_id) else {
            return 0;
        };

        let targets: Vec<&Arc<QuestContainer>> = match task {
            None => vec![template.container()],
            Some("all") => template.tasks().iter().map(|t| t.container()).collect(),
            Some(id) => template.task(id).map(|t| t.container()).into_iter().collect(),
        };

        targets
            .into_iter()
            .filter(|container| match action {
                StatsAction::Hide => hide_stats(container, &self.profile),
                StatsAction::Refresh => refresh_stats(container, &self.profile),
            })
            .count()
    }
}

impl IntoLua for DataValue {
    fn into_lua(self, lua: &Lua) -> LuaResult<Value> {
        match self {
            DataValue::Bool(b) => Ok(Value::Boolean(b)),
            DataValue::Int(i) => Ok(Value::Integer(i)),
            DataValue::Float(f) => Ok(Value::Number(f)),
            DataValue::Text(s) => lua.create_string(&s).map(Value::String),
        }
    }
}

impl FromLua for DataValue {
    fn from_lua(value: Value, _: &Lua) -> LuaResult<Self> {
        match value {
            Value::Boolean(b) => Ok(DataValue::Bool(b)),
            Value::Integer(i) => Ok(DataValue::Int(i)),
            Value::Number(n) => Ok(DataValue::Float(n)),
            Value::String(s) => Ok(DataValue::Text(s.to_string_lossy().to_string())),
            other => Err(mlua::Error::runtime(format!(
                "quest data cannot hold a {}",
                other.type_name()
            ))),
        }
    }
}

fn or_missing<T: ToString>(result: Option<T>) -> String {
    result
        .map(|r| r.to_string())
        .unwrap_or_else(|| MISSING_TEMPLATE.to_string())
}

/// Build the `quest` table for one evaluation
pub fn create_lua_module(lua: &Lua, api: Arc<QuestApi>) -> LuaResult<Table> {
    let module = lua.create_table()?;

    let a = api.clone();
    module.set("ids", lua.create_function(move |_, ()| Ok(a.quest_ids()))?)?;

    let a = api.clone();
    module.set(
        "data_get",
        lua.create_function(move |_, (quest, key): (String, String)| Ok(a.data(&quest, &key)))?,
    )?;

    let a = api.clone();
    module.set(
        "data_set",
        lua.create_function(move |_, (quest, key, value): (String, String, Option<DataValue>)| {
            Ok(a.set_data(&quest, &key, value, SetMode::Overwrite))
        })?,
    )?;

    let a = api.clone();
    module.set(
        "data_increase",
        lua.create_function(move |_, (quest, key, value): (String, String, DataValue)| {
            Ok(a.set_data(&quest, &key, Some(value), SetMode::Increase))
        })?,
    )?;

    let a = api.clone();
    module.set(
        "data_keys",
        lua.create_function(move |_, quest: String| Ok(a.data_keys(&quest)))?,
    )?;

    for (name, check_only) in [("accept", false), ("check_accept", true)] {
        let a = api.clone();
        module.set(
            name,
            lua.create_async_function(move |_, quest: String| {
                let a = a.clone();
                async move { Ok(or_missing(a.accept(&quest, check_only).await)) }
            })?,
        )?;
    }

    let a = api.clone();
    module.set(
        "accepted",
        lua.create_function(move |_, quest: String| Ok(a.accepted(&quest)))?,
    )?;

    let a = api.clone();
    module.set(
        "completed",
        lua.create_function(move |_, quest: String| Ok(a.completed(&quest)))?,
    )?;

    for (name, action) in [
        ("complete", QuestAction::Complete),
        ("failure", QuestAction::Failure),
        ("reset", QuestAction::Reset),
        ("stop", QuestAction::Stop),
    ] {
        let a = api.clone();
        module.set(
            name,
            lua.create_async_function(move |_, quest: String| {
                let a = a.clone();
                async move { Ok(or_missing(a.act(&quest, action).await)) }
            })?,
        )?;
    }

    let a = api.clone();
    module.set(
        "tasks",
        lua.create_function(move |lua, quest: String| match a.tasks(&quest) {
            Some(tasks) => tasks.into_lua(lua),
            None => MISSING_TEMPLATE.into_lua(lua),
        })?,
    )?;

    for (name, action) in [("hide_stats", StatsAction::Hide), ("refresh_stats", StatsAction::Refresh)] {
        let a = api.clone();
        module.set(
            name,
            lua.create_function(move |_, (quest, task): (String, Option<String>)| {
                Ok(a.stats(&quest, task.as_deref(), action))
            })?,
        )?;
    }

    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::addon::stats_hidden;
    use crate::quest::runner::{LuaExecutor, QUEST_NAMESPACES, ScriptExecutor, ScriptRequest, ScriptValue};
    use crate::quest::testing::{ScriptedExecutor, engine_with, profile, table};

    const HUNT: &str = r#"
"addon:stats" = true

[task.wolves]
objective = "signature"
"addon:stats" = true

[task.bears]
objective = "signature"
"#;

    #[tokio::test]
    async fn test_accept_and_act() {
        let engine = engine_with(ScriptedExecutor::new());
        engine.define_template("hunt", table(HUNT));
        let api = QuestApi::new(engine.clone(), profile("alice"));

        assert_eq!(api.accept("missing", false).await, None);
        assert_eq!(api.accept("hunt", true).await, Some(AcceptResult::Accepted));
        assert!(!api.accepted("hunt"));

        assert_eq!(api.accept("hunt", false).await, Some(AcceptResult::Accepted));
        assert!(api.accepted("hunt"));
        assert_eq!(api.accept("hunt", false).await, Some(AcceptResult::AlreadyAccepted));
        assert_eq!(api.tasks("hunt"), Some(vec!["wolves".to_string(), "bears".to_string()]));

        assert_eq!(api.act("hunt", QuestAction::Complete).await, Some(Transition::Completed));
        assert!(api.completed("hunt"));
        assert_eq!(api.act("hunt", QuestAction::Failure).await, Some(Transition::Unchanged));
        assert_eq!(api.act("missing", QuestAction::Reset).await, None);
    }

    #[tokio::test]
    async fn test_stop_drops_quest() {
        let engine = engine_with(ScriptedExecutor::new());
        engine.define_template("hunt", table(HUNT));
        let api = QuestApi::new(engine.clone(), profile("bob"));

        api.accept("hunt", false).await;
        assert_eq!(api.act("hunt", QuestAction::Stop).await, Some(Transition::Stopped));
        assert!(!api.accepted("hunt"));
        assert!(!api.completed("hunt"));
    }

    #[tokio::test]
    async fn test_data_access() {
        let engine = engine_with(ScriptedExecutor::new());
        engine.define_template("hunt", table(HUNT));
        let api = QuestApi::new(engine.clone(), profile("carol"));

        assert_eq!(api.set_data("hunt", "kills", Some(1.into()), SetMode::Overwrite), None);
        api.accept("hunt", false).await;

        api.set_data("hunt", "kills", Some("5".into()), SetMode::Overwrite);
        assert_eq!(
            api.set_data("hunt", "kills", Some(3.into()), SetMode::Increase),
            Some(DataValue::Text("8".into()))
        );
        assert!(api.data_keys("hunt").contains(&"kills".to_string()));

        api.set_data("hunt", "kills", None, SetMode::Overwrite);
        assert_eq!(api.data("hunt", "kills"), None);
    }

    #[tokio::test]
    async fn test_stats_targets() {
        let engine = engine_with(ScriptedExecutor::new());
        let template = engine.define_template("hunt", table(HUNT));
        let player = profile("dave");
        let api = QuestApi::new(engine.clone(), player.clone());

        assert_eq!(api.stats("hunt", None, StatsAction::Hide), 0);
        api.accept("hunt", false).await;

        assert_eq!(api.stats("hunt", None, StatsAction::Hide), 1);
        assert!(stats_hidden(template.container(), &player));

        // Only the wolves task carries the addon
        assert_eq!(api.stats("hunt", Some("all"), StatsAction::Hide), 1);
        assert_eq!(api.stats("hunt", Some("bears"), StatsAction::Hide), 0);
        assert_eq!(api.stats("hunt", Some("wolves"), StatsAction::Refresh), 1);
        let wolves = template.task("wolves").unwrap();
        assert!(!stats_hidden(wolves.container(), &player));
    }

    #[tokio::test]
    async fn test_lua_module() {
        let engine = crate::quest::engine::QuestEngine::builder()
            .executor(Arc::new(LuaExecutor::new()))
            .build();
        engine.define_template("hunt", table(HUNT));
        let player = profile("erin");
        let executor = LuaExecutor::new();

        let script = r#"
local results = {}
results[#results + 1] = quest.accept("nothing")
results[#results + 1] = quest.accept("hunt")
quest.data_set("hunt", "kills", "5")
results[#results + 1] = quest.data_increase("hunt", "kills", 3)
results[#results + 1] = tostring(quest.accepted("hunt"))
results[#results + 1] = tostring(#quest.tasks("hunt"))
results[#results + 1] = quest.complete("hunt")
results[#results + 1] = tostring(quest.completed("hunt"))
return table.concat(results, ",")
"#;
        let request = ScriptRequest::new("module", script)
            .namespaces(QUEST_NAMESPACES)
            .engine(engine.clone())
            .profile(player.clone());

        assert_eq!(
            executor.eval(request).await.unwrap(),
            ScriptValue::String("NULL,accepted,8,true,2,completed,true".into())
        );
    }
}

//! Test fixtures shared by the quest modules

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use uuid::Uuid;

use super::engine::QuestEngine;
use super::instance::Quest;
use super::profile::PlayerProfile;
use super::runner::{ScriptError, ScriptExecutor, ScriptRequest, ScriptValue};
use super::template::AcceptResult;

/// Executor that interprets sources of the form `label:result`.
///
/// Results: `true`, `false`, `zero`, `text-false`, `error`, `hang`; anything
/// else evaluates to nil. Labels are recorded in call order.
#[derive(Default)]
pub(crate) struct ScriptedExecutor {
    calls: Mutex<Vec<String>>,
    reasons: Mutex<Vec<Option<String>>>,
}

impl ScriptedExecutor {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn reasons(&self) -> Vec<Option<String>> {
        self.reasons.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScriptExecutor for ScriptedExecutor {
    async fn eval(&self, request: ScriptRequest) -> Result<ScriptValue, ScriptError> {
        let (label, result) = request
            .source
            .split_once(':')
            .unwrap_or((&*request.source, &*request.source));
        let reason = request.variables.iter().find_map(|(name, value)| match value {
            ScriptValue::String(s) if name == "reason" => Some(s.clone()),
            _ => None,
        });

        self.calls.lock().unwrap().push(label.to_string());
        self.reasons.lock().unwrap().push(reason);

        match result {
            "true" => Ok(ScriptValue::Bool(true)),
            "false" => Ok(ScriptValue::Bool(false)),
            "zero" => Ok(ScriptValue::Integer(0)),
            "text-false" => Ok(ScriptValue::String("false".into())),
            "error" => Err(ScriptError::Unavailable(format!("{} failed", label))),
            "hang" => std::future::pending().await,
            _ => Ok(ScriptValue::Nil),
        }
    }
}

pub(crate) fn engine_with(executor: Arc<ScriptedExecutor>) -> Arc<QuestEngine> {
    QuestEngine::builder().executor(executor).build()
}

pub(crate) fn table(src: &str) -> toml::Table {
    src.parse().unwrap()
}

pub(crate) fn profile(name: &str) -> Arc<PlayerProfile> {
    PlayerProfile::new(Uuid::new_v4(), name)
}

/// Accept a template and return the registered quest
pub(crate) async fn accepted(engine: &Arc<QuestEngine>, profile: &Arc<PlayerProfile>, id: &str) -> Arc<Quest> {
    let template = engine.template(id).unwrap();
    assert_eq!(template.accept_to(engine, profile).await, AcceptResult::Accepted);
    profile.quest(id).unwrap()
}

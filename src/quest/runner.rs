//! Quest Script Runner
//!
//! Agent and restart scripts are evaluated through the [`ScriptExecutor`]
//! trait. [`LuaExecutor`] is the builtin backend: each player gets a
//! sandboxed Lua state, and every evaluation runs in a fresh environment
//! table layered over that state's globals, so scripts cannot leak locals
//! into each other.
//!
//! Bindings available to a script:
//!
//! - request variables such as `reason`
//! - `@QuestContainer`: the container whose agent is running
//! - `position(area, world, x, y, z[, no_world])` with the `core` namespace
//! - the `quest` table with the `quest` namespace

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use mlua::{
    Function, HookTriggers, IntoLua, Lua, LuaSerdeExt, Result as LuaResult, Table, UserData, UserDataMethods,
    Value, VmState,
};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::api::{QuestApi, create_lua_module};
use super::container::QuestContainer;
use super::engine::QuestEngine;
use super::profile::PlayerProfile;
use crate::geometry::{Area, Position};

/// Name under which the running container is bound
pub const CONTAINER_BINDING: &str = "@QuestContainer";

/// Namespaces granted to quest scripts
pub const QUEST_NAMESPACES: &[&str] = &["core", "quest"];

/// Globals removed from every Lua state
const SANDBOXED_GLOBALS: &[&str] = &["os", "io", "loadfile", "dofile", "require"];

/// Instructions between deadline checks
const DEADLINE_CHECK_INTERVAL: u32 = 1000;

/// Result of a script evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Nil,
    Bool(bool),
    Integer(i64),
    Number(f64),
    String(String),
    /// A value with no plain representation, by type name
    Other(String),
}

impl ScriptValue {
    fn from_value(value: Value) -> Self {
        match value {
            Value::Nil => ScriptValue::Nil,
            Value::Boolean(b) => ScriptValue::Bool(b),
            Value::Integer(i) => ScriptValue::Integer(i),
            Value::Number(n) => ScriptValue::Number(n),
            Value::String(s) => ScriptValue::String(s.to_string_lossy().to_string()),
            other => ScriptValue::Other(other.type_name().to_string()),
        }
    }
}

impl From<bool> for ScriptValue {
    fn from(value: bool) -> Self {
        ScriptValue::Bool(value)
    }
}

impl From<&str> for ScriptValue {
    fn from(value: &str) -> Self {
        ScriptValue::String(value.to_string())
    }
}

impl From<Option<&str>> for ScriptValue {
    fn from(value: Option<&str>) -> Self {
        value.map(ScriptValue::from).unwrap_or(ScriptValue::Nil)
    }
}

impl IntoLua for ScriptValue {
    fn into_lua(self, lua: &Lua) -> LuaResult<Value> {
        match self {
            ScriptValue::Nil => Ok(Value::Nil),
            ScriptValue::Bool(b) => Ok(Value::Boolean(b)),
            ScriptValue::Integer(i) => Ok(Value::Integer(i)),
            ScriptValue::Number(n) => Ok(Value::Number(n)),
            ScriptValue::String(s) | ScriptValue::Other(s) => lua.create_string(&s).map(Value::String),
        }
    }
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Lua error: {0}")]
    Lua(#[from] mlua::Error),

    #[error("evaluation timed out after {0:?}")]
    Timeout(Duration),

    #[error("script backend unavailable: {0}")]
    Unavailable(String),
}

/// A script to evaluate together with its bindings
#[derive(Clone)]
pub struct ScriptRequest {
    /// Chunk name shown in error messages
    pub name: String,
    pub source: Arc<str>,
    pub namespaces: &'static [&'static str],
    pub engine: Option<Arc<QuestEngine>>,
    pub profile: Option<Arc<PlayerProfile>>,
    pub container: Option<Arc<QuestContainer>>,
    pub variables: Vec<(String, ScriptValue)>,
    /// Wall-clock limit enforced inside the backend
    pub timeout: Option<Duration>,
}

impl ScriptRequest {
    pub fn new(name: impl Into<String>, source: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            namespaces: &[],
            engine: None,
            profile: None,
            container: None,
            variables: Vec::new(),
            timeout: None,
        }
    }

    pub fn namespaces(mut self, namespaces: &'static [&'static str]) -> Self {
        self.namespaces = namespaces;
        self
    }

    pub fn engine(mut self, engine: Arc<QuestEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn profile(mut self, profile: Arc<PlayerProfile>) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn container(mut self, container: Arc<QuestContainer>) -> Self {
        self.container = Some(container);
        self
    }

    pub fn variable(mut self, name: &str, value: impl Into<ScriptValue>) -> Self {
        self.variables.push((name.to_string(), value.into()));
        self
    }

    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.namespaces.contains(&namespace)
    }
}

/// Evaluates quest scripts
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    async fn eval(&self, request: ScriptRequest) -> Result<ScriptValue, ScriptError>;

    /// Drop any state held for a player
    fn cleanup_player(&self, _player: Uuid) {}
}

/// Lua backend with one sandboxed state per player
#[derive(Default)]
pub struct LuaExecutor {
    /// `None` holds the state for scripts run without a player
    states: DashMap<Option<Uuid>, Arc<Lua>>,
}

impl LuaExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn state_for(&self, player: Option<Uuid>) -> LuaResult<Arc<Lua>> {
        if let Some(lua) = self.states.get(&player) {
            return Ok(lua.value().clone());
        }

        let lua = Arc::new(sandboxed_state()?);
        let lua = self.states.entry(player).or_insert(lua).value().clone();
        debug!("Created Lua state for {:?}", player);
        Ok(lua)
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }
}

#[async_trait]
impl ScriptExecutor for LuaExecutor {
    async fn eval(&self, request: ScriptRequest) -> Result<ScriptValue, ScriptError> {
        let player = request.profile.as_ref().map(|p| p.unique_id());
        let lua = self.state_for(player)?;
        let env = build_environment(&lua, &request)?;
        let thread = lua.create_thread(compile(&lua, &request, env)?)?;

        // The hook lives on this thread only and is dropped with it
        let deadline = request.timeout.map(|limit| (limit, Instant::now() + limit));
        if let Some((limit, at)) = deadline {
            thread.set_hook(
                HookTriggers::new().every_nth_instruction(DEADLINE_CHECK_INTERVAL),
                move |_, _| {
                    if Instant::now() >= at {
                        Err(mlua::Error::runtime(format!("script exceeded {:?}", limit)))
                    } else {
                        Ok(VmState::Continue)
                    }
                },
            );
        }

        let result: LuaResult<Value> = thread.into_async(()).await;
        match (result, deadline) {
            (Ok(value), _) => Ok(ScriptValue::from_value(value)),
            (Err(_), Some((limit, at))) if Instant::now() >= at => Err(ScriptError::Timeout(limit)),
            (Err(err), _) => Err(err.into()),
        }
    }

    fn cleanup_player(&self, player: Uuid) {
        if self.states.remove(&Some(player)).is_some() {
            debug!("Cleaned up Lua state for player {}", player);
        }
    }
}

/// Compile a source as an expression first, then as a statement block
fn compile(lua: &Lua, request: &ScriptRequest, env: Table) -> LuaResult<Function> {
    let expression = lua
        .load(format!("return {}", request.source))
        .set_name(request.name.clone())
        .set_environment(env.clone())
        .into_function();

    match expression {
        Ok(function) => Ok(function),
        Err(_) => lua
            .load(&*request.source)
            .set_name(request.name.clone())
            .set_environment(env)
            .into_function(),
    }
}

fn sandboxed_state() -> LuaResult<Lua> {
    let lua = Lua::new();
    let globals = lua.globals();
    for name in SANDBOXED_GLOBALS {
        globals.set(*name, Value::Nil)?;
    }
    Ok(lua)
}

fn build_environment(lua: &Lua, request: &ScriptRequest) -> LuaResult<Table> {
    let env = lua.create_table()?;
    let fallback = lua.create_table()?;
    fallback.set("__index", lua.globals())?;
    env.set_metatable(Some(fallback));

    for (name, value) in &request.variables {
        env.set(name.as_str(), value.clone())?;
    }

    if let Some(container) = &request.container {
        env.set(CONTAINER_BINDING, LuaContainer(container.clone()))?;
    }

    if request.has_namespace("core") {
        env.set("position", lua.create_function(position_condition)?)?;
    }

    if request.has_namespace("quest") {
        if let (Some(engine), Some(profile)) = (&request.engine, &request.profile) {
            let api = Arc::new(QuestApi::new(engine.clone(), profile.clone()));
            env.set("quest", create_lua_module(lua, api)?)?;
        }
    }

    Ok(env)
}

/// `position(area, world, x, y, z[, no_world])`
fn position_condition(
    _: &Lua,
    (area, world, x, y, z, no_world): (String, String, f64, f64, f64, Option<bool>),
) -> LuaResult<bool> {
    let area = Area::parse(&area, no_world.unwrap_or(false));
    Ok(area.contains(&Position::new(world, x, y, z)))
}

/// Read-only view of a container for scripts
struct LuaContainer(Arc<QuestContainer>);

impl UserData for LuaContainer {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("id", |_, this, ()| Ok(this.0.id().to_string()));
        methods.add_method("path", |_, this, ()| Ok(this.0.path().to_string()));
        methods.add_method("node", |_, this, ()| Ok(this.0.node().to_string()));
        methods.add_method("kind", |_, this, ()| {
            Ok(this.0.kind().agent_prefix().to_string())
        });
        methods.add_method("has_meta", |_, this, id: String| Ok(this.0.has_metadata(&id)));
        methods.add_method("has_addon", |_, this, id: String| Ok(this.0.has_extension(&id)));
        methods.add_method("config", |lua, this, key: String| match this.0.config().get(&key) {
            Some(value) => lua.to_value(value),
            None => Ok(Value::Nil),
        });
    }
}

//! Quest System Module
//!
//! Per-player quest lifecycle: templates defined in TOML, accepted into
//! active quests, and driven through completion, failure and reset. Script
//! agents (Lua by default) guard every transition and listeners can veto
//! them through lifecycle events.

pub mod addon;
pub mod agent;
pub mod api;
pub mod container;
pub mod data;
pub mod engine;
pub mod events;
pub mod instance;
pub mod meta;
pub mod objective;
pub mod profile;
pub mod registry;
pub mod runner;
pub mod template;

#[cfg(test)]
pub(crate) mod testing;

pub use addon::{Extension, StatsAddon};
pub use agent::{Agent, AgentType};
pub use api::{QuestAction, QuestApi, SetMode, StatsAction};
pub use container::{ContainerKind, ContainerScope, QuestContainer};
pub use data::{DataContainer, DataValue};
pub use engine::{QuestEngine, QuestEngineBuilder};
pub use events::{EventResult, NotificationKind, QuestEvent, QuestListener, QuestNotification};
pub use instance::{Quest, Transition};
pub use meta::{ControlMeta, Metadata, RestartMeta, TimeoutMeta};
pub use objective::{Objective, SignatureObjective};
pub use profile::PlayerProfile;
pub use registry::CapabilityRegistry;
pub use runner::{LuaExecutor, ScriptError, ScriptExecutor, ScriptRequest, ScriptValue};
pub use template::{AcceptResult, Task, Template};

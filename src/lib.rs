//! Quest lifecycle engine with scriptable agents and area predicates.

pub mod config;
pub mod error;
pub mod geometry;
pub mod quest;

pub use config::EngineConfig;
pub use error::QuestError;

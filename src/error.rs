//! Engine error types

use thiserror::Error;

use crate::quest::runner::ScriptError;

/// Errors surfaced by quest operations.
///
/// Vetoes are not errors: a transition blocked by a listener or an agent
/// resolves to `Ok(Transition::Vetoed)`. These variants signal that the
/// operation could not be attempted at all.
#[derive(Debug, Error)]
pub enum QuestError {
    /// The quest's template is no longer registered
    #[error("Quest template not found: {0}")]
    TemplateMissing(String),

    /// The profile owning the quest has been dropped
    #[error("Profile for quest '{0}' is no longer available")]
    ProfileUnavailable(String),

    /// A numeric merge was attempted on a non-numeric value
    #[error("Value '{value}' under key '{key}' is not numeric")]
    NotNumeric { key: String, value: String },

    /// Engine or template configuration could not be read
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Script error: {0}")]
    Script(#[from] ScriptError),
}

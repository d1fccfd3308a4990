//! Quest Metadata
//!
//! Metadata capabilities are declared in a container's `meta` section and
//! built by id through the [`CapabilityRegistry`](super::registry::CapabilityRegistry).
//! The builtin kinds drive the transition pipeline:
//!
//! - `control`: repeat limit, cooldown and completion/failure signatures
//! - `restart`: script deciding whether a quest restarts instead of completing
//! - `timeout`: how long a quest may stay active

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tracing::{error, warn};

use super::agent::script_source;
use super::container::QuestContainer;
use super::data::current_time_millis;
use super::engine::QuestEngine;
use super::profile::PlayerProfile;
use super::runner::{QUEST_NAMESPACES, ScriptRequest, ScriptValue};
use super::template::AcceptResult;

pub const META_CONTROL: &str = "control";
pub const META_RESTART: &str = "restart";
pub const META_TIMEOUT: &str = "timeout";

/// A metadata capability attached to a quest or task
pub trait Metadata: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// Parse a duration as whole seconds or `<n>[s|m|h|d]`, in milliseconds
pub(crate) fn parse_duration_ms(value: &toml::Value) -> Result<i64, String> {
    let seconds = match value {
        toml::Value::Integer(secs) => *secs,
        toml::Value::String(s) => {
            let s = s.trim();
            let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
            let (amount, unit) = s.split_at(split);
            let amount: i64 = amount
                .parse()
                .map_err(|_| format!("invalid duration '{}'", s))?;
            let scale = match unit.trim() {
                "" | "s" => 1,
                "m" => 60,
                "h" => 3_600,
                "d" => 86_400,
                other => return Err(format!("unknown duration unit '{}'", other)),
            };
            amount * scale
        }
        other => return Err(format!("expected a duration, found {}", other.type_str())),
    };

    if seconds < 0 {
        return Err("duration must not be negative".to_string());
    }
    Ok(seconds * 1_000)
}

/// Transition that fires a control signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlTrigger {
    Complete,
    Failure,
}

impl ControlTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlTrigger::Complete => "complete",
            ControlTrigger::Failure => "failure",
        }
    }
}

/// Acceptance limits and completion bookkeeping
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlMeta {
    /// Maximum number of completions
    pub repeat: Option<i64>,
    /// Minimum time between a completion and the next acceptance
    pub cooldown_ms: Option<i64>,
}

/// Control used by templates that declare none
pub static DEFAULT_CONTROL: ControlMeta = ControlMeta::unrestricted();

impl ControlMeta {
    pub const fn unrestricted() -> Self {
        Self {
            repeat: None,
            cooldown_ms: None,
        }
    }

    pub fn from_config(value: &toml::Value) -> Result<Self, String> {
        let table = value
            .as_table()
            .ok_or_else(|| "control meta must be a table".to_string())?;

        let repeat = match table.get("repeat") {
            Some(toml::Value::Integer(n)) if *n >= 0 => Some(*n),
            Some(other) => return Err(format!("invalid repeat value {}", other)),
            None => None,
        };
        let cooldown_ms = table.get("cooldown").map(parse_duration_ms).transpose()?;

        Ok(Self {
            repeat,
            cooldown_ms,
        })
    }

    fn key(quest_id: &str, trigger: ControlTrigger) -> String {
        format!("quest.control.{}.{}", quest_id, trigger.as_str())
    }

    /// Record that `trigger` fired for a quest
    pub fn signature(&self, profile: &PlayerProfile, quest_id: &str, trigger: ControlTrigger) {
        let key = Self::key(quest_id, trigger);
        if let Err(e) = profile.data().increase(&format!("{}.count", key), 1) {
            warn!("Failed to record {} signature for {}: {}", trigger.as_str(), quest_id, e);
        }
        profile
            .data()
            .set(&format!("{}.time", key), current_time_millis());
    }

    /// Number of times `trigger` fired for a quest
    pub fn count(&self, profile: &PlayerProfile, quest_id: &str, trigger: ControlTrigger) -> i64 {
        profile
            .data()
            .get(&format!("{}.count", Self::key(quest_id, trigger)))
            .and_then(|v| v.as_i64())
            .unwrap_or(0)
    }

    /// Why a profile may not accept the quest right now, if anything
    pub fn check(&self, profile: &PlayerProfile, quest_id: &str) -> Option<AcceptResult> {
        if let Some(limit) = self.repeat {
            if self.count(profile, quest_id, ControlTrigger::Complete) >= limit {
                return Some(AcceptResult::RepeatLimitReached);
            }
        }

        if let Some(cooldown) = self.cooldown_ms {
            let last = profile
                .data()
                .get(&format!("{}.time", Self::key(quest_id, ControlTrigger::Complete)))
                .and_then(|v| v.as_i64());
            if let Some(last) = last {
                if current_time_millis() - last < cooldown {
                    return Some(AcceptResult::CooldownActive);
                }
            }
        }

        None
    }
}

impl Metadata for ControlMeta {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Script deciding whether an active quest restarts instead of completing
#[derive(Debug, Clone)]
pub struct RestartMeta {
    pub script: Arc<str>,
}

impl RestartMeta {
    pub fn from_config(value: &toml::Value) -> Result<Self, String> {
        let script = script_source(value)
            .ok_or_else(|| "restart meta must be a script".to_string())?;
        Ok(Self {
            script: script.into(),
        })
    }

    /// Evaluate the restart script; only a literal `true` requests a restart
    pub async fn can_restart(
        &self,
        engine: &Arc<QuestEngine>,
        profile: &Arc<PlayerProfile>,
        container: &Arc<QuestContainer>,
    ) -> bool {
        let request = ScriptRequest::new(format!("{}:restart", container.path()), self.script.clone())
            .namespaces(QUEST_NAMESPACES)
            .engine(engine.clone())
            .profile(profile.clone())
            .container(container.clone());

        match engine.evaluate(request).await {
            Ok(value) => value == ScriptValue::Bool(true),
            Err(e) => {
                error!("Restart check for {} failed: {}", container.path(), e);
                false
            }
        }
    }
}

impl Metadata for RestartMeta {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Maximum active duration of a quest
#[derive(Debug, Clone, PartialEq)]
pub struct TimeoutMeta {
    pub duration_ms: i64,
}

impl TimeoutMeta {
    pub fn from_config(value: &toml::Value) -> Result<Self, String> {
        Ok(Self {
            duration_ms: parse_duration_ms(value)?,
        })
    }

    pub fn is_timeout(&self, start_ms: i64, now_ms: i64) -> bool {
        now_ms - start_ms >= self.duration_ms
    }
}

impl Metadata for TimeoutMeta {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn value(src: &str) -> toml::Value {
        let table: toml::Table = format!("v = {}", src).parse().unwrap();
        table["v"].clone()
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration_ms(&value("30")).unwrap(), 30_000);
        assert_eq!(parse_duration_ms(&value("\"45s\"")).unwrap(), 45_000);
        assert_eq!(parse_duration_ms(&value("\"2m\"")).unwrap(), 120_000);
        assert_eq!(parse_duration_ms(&value("\"1h\"")).unwrap(), 3_600_000);
        assert_eq!(parse_duration_ms(&value("\"1d\"")).unwrap(), 86_400_000);
        assert!(parse_duration_ms(&value("\"5w\"")).is_err());
        assert!(parse_duration_ms(&value("-1")).is_err());
        assert!(parse_duration_ms(&value("true")).is_err());
    }

    #[test]
    fn test_timeout() {
        let timeout = TimeoutMeta::from_config(&value("\"1m\"")).unwrap();
        assert!(!timeout.is_timeout(0, 59_999));
        assert!(timeout.is_timeout(0, 60_000));
    }

    #[test]
    fn test_control_repeat_limit() {
        let control = ControlMeta::from_config(&value("{ repeat = 2 }")).unwrap();
        let profile = PlayerProfile::new(Uuid::new_v4(), "tester");

        assert_eq!(control.check(&profile, "daily"), None);
        control.signature(&profile, "daily", ControlTrigger::Complete);
        assert_eq!(control.check(&profile, "daily"), None);
        control.signature(&profile, "daily", ControlTrigger::Complete);
        assert_eq!(control.check(&profile, "daily"), Some(AcceptResult::RepeatLimitReached));

        // Failures do not count towards the limit
        assert_eq!(control.count(&profile, "daily", ControlTrigger::Failure), 0);
    }

    #[test]
    fn test_control_cooldown() {
        let control = ControlMeta::from_config(&value("{ cooldown = \"1h\" }")).unwrap();
        let profile = PlayerProfile::new(Uuid::new_v4(), "tester");

        assert_eq!(control.check(&profile, "daily"), None);
        control.signature(&profile, "daily", ControlTrigger::Complete);
        assert_eq!(control.check(&profile, "daily"), Some(AcceptResult::CooldownActive));

        profile
            .data()
            .set("quest.control.daily.complete.time", current_time_millis() - 3_600_001);
        assert_eq!(control.check(&profile, "daily"), None);
    }

    #[test]
    fn test_default_control_is_unrestricted() {
        let profile = PlayerProfile::new(Uuid::new_v4(), "tester");
        DEFAULT_CONTROL.signature(&profile, "q", ControlTrigger::Complete);
        assert_eq!(DEFAULT_CONTROL.check(&profile, "q"), None);
        assert_eq!(DEFAULT_CONTROL.count(&profile, "q", ControlTrigger::Complete), 1);
    }

    #[test]
    fn test_invalid_control() {
        assert!(ControlMeta::from_config(&value("5")).is_err());
        assert!(ControlMeta::from_config(&value("{ repeat = \"x\" }")).is_err());
    }
}

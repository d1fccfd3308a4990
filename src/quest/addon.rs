//! Quest Addons
//!
//! Extensions are declared with `addon:<id>` keys on a quest or task. The
//! builtin `stats` addon tracks whether a container's progress display is
//! hidden for a player.

use std::any::Any;
use std::fmt;

use tracing::debug;

use super::container::QuestContainer;
use super::profile::PlayerProfile;

pub const ADDON_STATS: &str = "stats";

/// An extension capability attached to a quest or task
pub trait Extension: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// Progress display for a quest or task
#[derive(Debug, Clone, PartialEq)]
pub struct StatsAddon {
    /// Shown unless a player hid it
    pub visible: bool,
}

impl Default for StatsAddon {
    fn default() -> Self {
        Self { visible: true }
    }
}

impl StatsAddon {
    /// `addon:stats = true`, or a table with an optional `visible` flag
    pub fn from_config(value: &toml::Value) -> Result<Self, String> {
        match value {
            toml::Value::Boolean(_) => Ok(Self::default()),
            toml::Value::Table(table) => match table.get("visible") {
                None => Ok(Self::default()),
                Some(toml::Value::Boolean(visible)) => Ok(Self { visible: *visible }),
                Some(other) => Err(format!("invalid visible flag {}", other)),
            },
            other => Err(format!("stats addon expects a table, found {}", other.type_str())),
        }
    }

    fn key(container: &QuestContainer) -> String {
        format!("quest.stats.{}.hidden", container.path())
    }

    pub fn is_hidden(&self, profile: &PlayerProfile, container: &QuestContainer) -> bool {
        profile
            .data()
            .get(&Self::key(container))
            .and_then(|v| v.as_bool())
            .unwrap_or(!self.visible)
    }

    fn set_hidden(&self, profile: &PlayerProfile, container: &QuestContainer, hidden: bool) {
        profile.data().set(&Self::key(container), hidden);
        debug!(
            "Stats of {} {} for {}",
            container.path(),
            if hidden { "hidden" } else { "shown" },
            profile.name()
        );
    }
}

impl Extension for StatsAddon {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Hide a container's stats. Returns `false` when it has no stats addon.
pub fn hide_stats(container: &QuestContainer, profile: &PlayerProfile) -> bool {
    match container.extension::<StatsAddon>(ADDON_STATS) {
        Some(stats) => {
            stats.set_hidden(profile, container, true);
            true
        }
        None => false,
    }
}

/// Show a container's stats again. Returns `false` when it has no stats addon.
pub fn refresh_stats(container: &QuestContainer, profile: &PlayerProfile) -> bool {
    match container.extension::<StatsAddon>(ADDON_STATS) {
        Some(stats) => {
            stats.set_hidden(profile, container, false);
            true
        }
        None => false,
    }
}

pub fn stats_hidden(container: &QuestContainer, profile: &PlayerProfile) -> bool {
    container
        .extension::<StatsAddon>(ADDON_STATS)
        .is_some_and(|stats| stats.is_hidden(profile, container))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quest::container::ContainerScope;
    use crate::quest::registry::CapabilityRegistry;
    use uuid::Uuid;

    fn container(src: &str) -> QuestContainer {
        QuestContainer::new(
            ContainerScope::template("tour"),
            src.parse().unwrap(),
            &CapabilityRegistry::with_builtins(),
        )
    }

    #[test]
    fn test_hide_and_refresh() {
        let container = container("\"addon:stats\" = true");
        let profile = PlayerProfile::new(Uuid::new_v4(), "tester");

        assert!(!stats_hidden(&container, &profile));
        assert!(hide_stats(&container, &profile));
        assert!(stats_hidden(&container, &profile));
        assert!(refresh_stats(&container, &profile));
        assert!(!stats_hidden(&container, &profile));
    }

    #[test]
    fn test_initially_hidden() {
        let container = container("\"addon:stats\" = { visible = false }");
        let profile = PlayerProfile::new(Uuid::new_v4(), "tester");
        assert!(stats_hidden(&container, &profile));
    }

    #[test]
    fn test_without_addon() {
        let container = container("name = \"plain\"");
        let profile = PlayerProfile::new(Uuid::new_v4(), "tester");

        assert!(!hide_stats(&container, &profile));
        assert!(!stats_hidden(&container, &profile));
        assert!(profile.data().is_empty());
    }
}

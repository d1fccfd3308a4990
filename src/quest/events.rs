//! Quest Lifecycle Events
//!
//! Every transition announces itself twice: a cancellable "pre" event before
//! anything changes and an informational "post" event after the commit.
//! Listeners can veto pre events. Post events are additionally broadcast as
//! owned [`QuestNotification`]s for consumers that live outside the call
//! (achievements, UI refresh).

use std::fmt;
use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use super::agent::AgentType;
use super::container::QuestContainer;
use super::instance::Quest;
use super::profile::PlayerProfile;
use super::template::{Task, Template};

/// Events raised by the quest pipeline
pub enum QuestEvent<'a> {
    /// An agent chain is about to run
    Agent {
        container: &'a QuestContainer,
        profile: &'a PlayerProfile,
        agent: AgentType,
        scope: &'a str,
    },
    AcceptPre {
        template: &'a Template,
        profile: &'a PlayerProfile,
    },
    AcceptPost {
        quest: &'a Quest,
        profile: &'a PlayerProfile,
    },
    CompletePre {
        quest: &'a Quest,
        profile: &'a PlayerProfile,
    },
    CompletePost {
        quest: &'a Quest,
        profile: &'a PlayerProfile,
    },
    FailurePre {
        quest: &'a Quest,
        profile: &'a PlayerProfile,
    },
    FailurePost {
        quest: &'a Quest,
        profile: &'a PlayerProfile,
    },
    ResetPre {
        quest: &'a Quest,
        profile: &'a PlayerProfile,
    },
    ResetPost {
        quest: &'a Quest,
        profile: &'a PlayerProfile,
    },
    /// A task's objective is about to be reset
    ObjectiveResetPre {
        task: &'a Task,
        quest: &'a Quest,
        profile: &'a PlayerProfile,
    },
    ObjectiveResetPost {
        task: &'a Task,
        quest: &'a Quest,
        profile: &'a PlayerProfile,
    },
}

impl QuestEvent<'_> {
    /// Event name (for logging/debugging)
    pub fn name(&self) -> &'static str {
        match self {
            QuestEvent::Agent { .. } => "agent",
            QuestEvent::AcceptPre { .. } => "accept_pre",
            QuestEvent::AcceptPost { .. } => "accept_post",
            QuestEvent::CompletePre { .. } => "complete_pre",
            QuestEvent::CompletePost { .. } => "complete_post",
            QuestEvent::FailurePre { .. } => "failure_pre",
            QuestEvent::FailurePost { .. } => "failure_post",
            QuestEvent::ResetPre { .. } => "reset_pre",
            QuestEvent::ResetPost { .. } => "reset_post",
            QuestEvent::ObjectiveResetPre { .. } => "objective_reset_pre",
            QuestEvent::ObjectiveResetPost { .. } => "objective_reset_post",
        }
    }

    /// Whether listeners may veto this event
    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            QuestEvent::Agent { .. }
                | QuestEvent::AcceptPre { .. }
                | QuestEvent::CompletePre { .. }
                | QuestEvent::FailurePre { .. }
                | QuestEvent::ResetPre { .. }
                | QuestEvent::ObjectiveResetPre { .. }
        )
    }

    pub fn profile(&self) -> &PlayerProfile {
        match self {
            QuestEvent::Agent { profile, .. }
            | QuestEvent::AcceptPre { profile, .. }
            | QuestEvent::AcceptPost { profile, .. }
            | QuestEvent::CompletePre { profile, .. }
            | QuestEvent::CompletePost { profile, .. }
            | QuestEvent::FailurePre { profile, .. }
            | QuestEvent::FailurePost { profile, .. }
            | QuestEvent::ResetPre { profile, .. }
            | QuestEvent::ResetPost { profile, .. }
            | QuestEvent::ObjectiveResetPre { profile, .. }
            | QuestEvent::ObjectiveResetPost { profile, .. } => profile,
        }
    }

    /// Quest id this event concerns, if any
    pub fn quest_id(&self) -> Option<&str> {
        match self {
            QuestEvent::Agent { container, .. } => Some(container.node()),
            QuestEvent::AcceptPre { template, .. } => Some(template.id()),
            QuestEvent::AcceptPost { quest, .. }
            | QuestEvent::CompletePre { quest, .. }
            | QuestEvent::CompletePost { quest, .. }
            | QuestEvent::FailurePre { quest, .. }
            | QuestEvent::FailurePost { quest, .. }
            | QuestEvent::ResetPre { quest, .. }
            | QuestEvent::ResetPost { quest, .. }
            | QuestEvent::ObjectiveResetPre { quest, .. }
            | QuestEvent::ObjectiveResetPost { quest, .. } => Some(quest.id()),
        }
    }

    fn notification(&self) -> Option<QuestNotification> {
        let (kind, quest, task) = match self {
            QuestEvent::AcceptPost { quest, .. } => (NotificationKind::Accepted, *quest, None),
            QuestEvent::CompletePost { quest, .. } => (NotificationKind::Completed, *quest, None),
            QuestEvent::FailurePost { quest, .. } => (NotificationKind::Failed, *quest, None),
            QuestEvent::ResetPost { quest, .. } => (NotificationKind::Reset, *quest, None),
            QuestEvent::ObjectiveResetPost { task, quest, .. } => {
                (NotificationKind::ObjectiveReset, *quest, Some(task.id().to_string()))
            }
            _ => return None,
        };

        Some(QuestNotification {
            player: self.profile().unique_id(),
            quest_id: quest.id().to_string(),
            task_id: task,
            kind,
        })
    }
}

impl fmt::Debug for QuestEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuestEvent")
            .field("name", &self.name())
            .field("quest", &self.quest_id())
            .field("player", &self.profile().unique_id())
            .finish()
    }
}

/// Listener verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventResult {
    Continue,
    /// Veto the transition; ignored for post events
    Cancel,
}

/// Receives every quest event synchronously
pub trait QuestListener: Send + Sync {
    fn on_event(&self, event: &QuestEvent<'_>) -> EventResult;
}

/// Adapter for closure listeners
pub struct FnListener<F>(pub F);

impl<F> QuestListener for FnListener<F>
where
    F: Fn(&QuestEvent<'_>) -> EventResult + Send + Sync,
{
    fn on_event(&self, event: &QuestEvent<'_>) -> EventResult {
        (self.0)(event)
    }
}

/// Kind of a broadcast notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Accepted,
    Completed,
    Failed,
    Reset,
    ObjectiveReset,
}

/// Owned summary of a post event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestNotification {
    pub player: Uuid,
    pub quest_id: String,
    pub task_id: Option<String>,
    pub kind: NotificationKind,
}

/// Dispatches quest events to listeners and subscribers
pub struct EventBus {
    listeners: Vec<Arc<dyn QuestListener>>,
    sender: broadcast::Sender<QuestNotification>,
}

impl EventBus {
    pub fn new(listeners: Vec<Arc<dyn QuestListener>>, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { listeners, sender }
    }

    /// Deliver an event to every listener.
    ///
    /// Returns `false` when a cancellable event was vetoed. All listeners see
    /// the event even after one of them cancelled it.
    pub fn call(&self, event: &QuestEvent<'_>) -> bool {
        let mut cancelled = false;
        for listener in &self.listeners {
            if listener.on_event(event) == EventResult::Cancel {
                cancelled = true;
            }
        }

        if cancelled && event.is_cancellable() {
            debug!("Event {} for quest {:?} was cancelled", event.name(), event.quest_id());
            return false;
        }

        if let Some(notification) = event.notification() {
            // No subscribers is not an error
            let _ = self.sender.send(notification);
        }
        true
    }

    /// Subscribe to post-event notifications
    pub fn subscribe(&self) -> broadcast::Receiver<QuestNotification> {
        self.sender.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::quest::testing::{ScriptedExecutor, accepted, engine_with, profile, table};

    fn counting(seen: &Arc<AtomicUsize>, verdict: EventResult) -> Arc<dyn QuestListener> {
        let seen = seen.clone();
        Arc::new(FnListener(move |_: &QuestEvent<'_>| {
            seen.fetch_add(1, Ordering::SeqCst);
            verdict
        }))
    }

    #[test]
    fn test_cancel_still_reaches_every_listener() {
        let engine = engine_with(ScriptedExecutor::new());
        let template = engine.define_template("hunt", table(""));
        let player = profile("alice");
        let seen = Arc::new(AtomicUsize::new(0));
        let bus = EventBus::new(
            vec![
                counting(&seen, EventResult::Cancel),
                counting(&seen, EventResult::Continue),
                counting(&seen, EventResult::Continue),
            ],
            8,
        );
        let mut notifications = bus.subscribe();

        let event = QuestEvent::AcceptPre {
            template: &template,
            profile: &player,
        };
        assert!(event.is_cancellable());
        assert!(!bus.call(&event));
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert!(notifications.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_post_event_ignores_cancel() {
        let engine = engine_with(ScriptedExecutor::new());
        engine.define_template("hunt", table(""));
        let player = profile("bob");
        let quest = accepted(&engine, &player, "hunt").await;

        let seen = Arc::new(AtomicUsize::new(0));
        let bus = EventBus::new(vec![counting(&seen, EventResult::Cancel)], 8);
        let mut notifications = bus.subscribe();

        let event = QuestEvent::AcceptPost {
            quest: &quest,
            profile: &player,
        };
        assert!(!event.is_cancellable());
        assert!(bus.call(&event));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(
            notifications.try_recv().unwrap(),
            QuestNotification {
                player: player.unique_id(),
                quest_id: "hunt".to_string(),
                task_id: None,
                kind: NotificationKind::Accepted,
            }
        );
    }

    #[test]
    fn test_call_without_listeners_or_subscribers() {
        let engine = engine_with(ScriptedExecutor::new());
        let template = engine.define_template("hunt", table(""));
        let player = profile("carol");
        let bus = EventBus::new(Vec::new(), 0);

        assert_eq!(bus.listener_count(), 0);
        assert!(bus.call(&QuestEvent::AcceptPre {
            template: &template,
            profile: &player,
        }));
    }
}

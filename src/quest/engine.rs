//! Quest Engine
//!
//! Owns the template registry together with everything the lifecycle needs:
//! configuration, capability factories, the script executor and the event bus.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};

use super::events::{EventBus, EventResult, FnListener, QuestEvent, QuestListener};
use super::registry::CapabilityRegistry;
use super::runner::{LuaExecutor, ScriptError, ScriptExecutor, ScriptRequest, ScriptValue};
use super::template::Template;
use crate::config::EngineConfig;
use crate::error::QuestError;

pub struct QuestEngine {
    config: EngineConfig,
    capabilities: CapabilityRegistry,
    templates: DashMap<String, Arc<Template>>,
    executor: Arc<dyn ScriptExecutor>,
    events: EventBus,
}

impl QuestEngine {
    pub fn builder() -> QuestEngineBuilder {
        QuestEngineBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.capabilities
    }

    pub fn executor(&self) -> &Arc<dyn ScriptExecutor> {
        &self.executor
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn template(&self, id: &str) -> Option<Arc<Template>> {
        self.templates.get(id).map(|t| t.value().clone())
    }

    /// Registered template ids, sorted
    pub fn template_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.templates.iter().map(|t| t.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Register a template, returning the one it replaced
    pub fn register_template(&self, template: Arc<Template>) -> Option<Arc<Template>> {
        let previous = self.templates.insert(template.id().to_string(), template);
        if let Some(previous) = &previous {
            info!("Replaced quest template {}", previous.id());
        }
        previous
    }

    /// Build a template from config and register it
    pub fn define_template(&self, id: &str, config: toml::Table) -> Arc<Template> {
        let template = Template::new(id, config, &self.capabilities);
        self.register_template(template.clone());
        template
    }

    /// Unregister a template. Active quests of it become invalid.
    pub fn remove_template(&self, id: &str) -> Option<Arc<Template>> {
        self.templates.remove(id).map(|(_, t)| t)
    }

    /// Define every top-level table of a TOML document as a template
    pub fn load_templates(&self, source: &str) -> Result<usize, QuestError> {
        let document: toml::Table = source
            .parse()
            .map_err(|e| QuestError::Config(format!("Failed to parse quest templates: {}", e)))?;

        let mut loaded = 0;
        for (id, value) in document {
            match value {
                toml::Value::Table(config) => {
                    let template = self.define_template(&id, config);
                    info!(
                        "Loaded quest {} ({} tasks, {} agents)",
                        id,
                        template.tasks().len(),
                        template.container().agents().len()
                    );
                    loaded += 1;
                }
                other => warn!("Skipping quest {}: expected a table, found {}", id, other.type_str()),
            }
        }
        Ok(loaded)
    }

    /// Evaluate a script within the configured agent timeout
    pub async fn evaluate(&self, request: ScriptRequest) -> Result<ScriptValue, ScriptError> {
        match self.config.agent_timeout() {
            Some(limit) => tokio::time::timeout(limit, self.executor.eval(request.timeout(limit)))
                .await
                .map_err(|_| ScriptError::Timeout(limit))?,
            None => self.executor.eval(request).await,
        }
    }
}

impl fmt::Debug for QuestEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuestEngine")
            .field("templates", &self.template_ids())
            .field("capabilities", &self.capabilities)
            .field("listeners", &self.events.listener_count())
            .finish()
    }
}

pub struct QuestEngineBuilder {
    config: EngineConfig,
    capabilities: CapabilityRegistry,
    executor: Option<Arc<dyn ScriptExecutor>>,
    listeners: Vec<Arc<dyn QuestListener>>,
}

impl Default for QuestEngineBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            capabilities: CapabilityRegistry::with_builtins(),
            executor: None,
            listeners: Vec::new(),
        }
    }
}

impl QuestEngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn capabilities(mut self, capabilities: CapabilityRegistry) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Script backend, [`LuaExecutor`] when not set
    pub fn executor(mut self, executor: Arc<dyn ScriptExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn listener(mut self, listener: Arc<dyn QuestListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Register a closure listener
    pub fn on_event<F>(self, listener: F) -> Self
    where
        F: Fn(&QuestEvent<'_>) -> EventResult + Send + Sync + 'static,
    {
        self.listener(Arc::new(FnListener(listener)))
    }

    pub fn build(self) -> Arc<QuestEngine> {
        let events = EventBus::new(self.listeners, self.config.channel_capacity());
        Arc::new(QuestEngine {
            executor: self
                .executor
                .unwrap_or_else(|| Arc::new(LuaExecutor::new()) as Arc<dyn ScriptExecutor>),
            capabilities: self.capabilities,
            templates: DashMap::new(),
            events,
            config: self.config,
        })
    }
}

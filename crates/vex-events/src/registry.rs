//! Immutable topic → handler registry.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::handler::MessageHandler;

/// Errors raised while building a [`HandlerRegistry`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("a handler is already registered for topic {0}")]
    DuplicateTopic(String),

    #[error("topic name must not be empty")]
    EmptyTopic,
}

/// Maps each topic to exactly one handler. Built once at startup.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("topics", &self.topics())
            .finish()
    }
}

impl HandlerRegistry {
    #[must_use]
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::default()
    }

    /// The handler bound to `topic`, if any.
    #[must_use]
    pub fn get(&self, topic: &str) -> Option<&Arc<dyn MessageHandler>> {
        self.handlers.get(topic)
    }

    /// Registered topics, sorted.
    #[must_use]
    pub fn topics(&self) -> Vec<&str> {
        let mut topics: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        topics.sort_unstable();
        topics
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Builder for [`HandlerRegistry`].
#[derive(Default)]
pub struct HandlerRegistryBuilder {
    handlers: HashMap<String, Arc<dyn MessageHandler>>,
}

impl HandlerRegistryBuilder {
    /// Bind `handler` to `topic`. Binding a topic twice is an error.
    pub fn register(
        mut self,
        topic: impl Into<String>,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<Self, RegistryError> {
        let topic = topic.into();
        if topic.trim().is_empty() {
            return Err(RegistryError::EmptyTopic);
        }
        if self.handlers.contains_key(&topic) {
            return Err(RegistryError::DuplicateTopic(topic));
        }
        self.handlers.insert(topic, handler);
        Ok(self)
    }

    #[must_use]
    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            handlers: self.handlers,
        }
    }
}

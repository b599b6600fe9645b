use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use nyx_client::NyxClient;
use nyx_types::{NYX_CHECKER_TYPE, NyxError, Result};

use crate::checker::ConditionChecker;
use crate::nyx::NyxTriggerChecker;

/// Rebuilds one kind of checker from its persisted form.
///
/// Synchronous: rehydration only reads the persisted fields and never talks
/// to the service.
pub trait CheckerFactory: Send + Sync {
    fn checker_type(&self) -> &'static str;

    fn from_json(&self, value: &Value) -> Result<Arc<dyn ConditionChecker>>;
}

/// Factory for [`NyxTriggerChecker`], sharing one client across checkers.
#[derive(Debug, Clone)]
pub struct NyxCheckerFactory {
    client: Arc<NyxClient>,
}

impl NyxCheckerFactory {
    pub fn new(client: Arc<NyxClient>) -> Self {
        Self { client }
    }
}

impl CheckerFactory for NyxCheckerFactory {
    fn checker_type(&self) -> &'static str {
        NYX_CHECKER_TYPE
    }

    fn from_json(&self, value: &Value) -> Result<Arc<dyn ConditionChecker>> {
        let checker = NyxTriggerChecker::from_json(self.client.clone(), value)?;
        Ok(Arc::new(checker))
    }
}

/// Checker factories keyed by type tag.
#[derive(Default)]
pub struct CheckerRegistry {
    factories: DashMap<&'static str, Arc<dyn CheckerFactory>>,
}

impl CheckerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the Nyx checker already registered.
    pub fn with_nyx(client: Arc<NyxClient>) -> Self {
        let registry = Self::new();
        registry.register(Arc::new(NyxCheckerFactory::new(client)));
        registry
    }

    /// Register a factory, replacing any previous one for the same tag.
    pub fn register(&self, factory: Arc<dyn CheckerFactory>) {
        self.factories.insert(factory.checker_type(), factory);
    }

    pub fn contains(&self, checker_type: &str) -> bool {
        self.factories.contains_key(checker_type)
    }

    /// Rebuild a checker, dispatching on its `"type"` tag.
    pub fn from_json(&self, value: &Value) -> Result<Arc<dyn ConditionChecker>> {
        let checker_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| NyxError::Serialization("checker has no type tag".to_string()))?;
        let factory = self
            .factories
            .get(checker_type)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                NyxError::Serialization(format!("no checker registered for type {checker_type}"))
            })?;
        factory.from_json(value)
    }
}

impl std::fmt::Debug for CheckerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let types: Vec<&'static str> = self.factories.iter().map(|e| *e.key()).collect();
        f.debug_struct("CheckerRegistry")
            .field("types", &types)
            .finish()
    }
}

//! Shared application state created by the coordinator.
//!
//! Schemas declare parameter names with their default values; a
//! [`SharedState`] is one live instance of a schema. Replication to peers is
//! handled elsewhere.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

/// Parameter name -> default value.
pub type Schema = BTreeMap<String, Value>;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("schema '{0}' is already registered")]
    DuplicateSchema(String),

    #[error("schema '{0}' is not registered")]
    UnknownSchema(String),

    #[error("schema '{schema}' has no parameter '{param}'")]
    UnknownParam { schema: String, param: String },
}

/// Live instance of a schema.
#[derive(Debug, Clone)]
pub struct SharedState {
    id: Uuid,
    schema: String,
    values: Arc<RwLock<Map<String, Value>>>,
}

impl SharedState {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn schema_name(&self) -> &str {
        &self.schema
    }

    pub fn get(&self, param: &str) -> Option<Value> {
        self.values.read().get(param).cloned()
    }

    pub fn set(&self, param: &str, value: Value) -> Result<Value, StateError> {
        let mut values = self.values.write();
        match values.get_mut(param) {
            Some(slot) => Ok(std::mem::replace(slot, value)),
            None => Err(StateError::UnknownParam {
                schema: self.schema.clone(),
                param: param.to_string(),
            }),
        }
    }

    pub fn values(&self) -> Value {
        Value::Object(self.values.read().clone())
    }
}

#[derive(Debug, Default)]
pub struct StateManager {
    schemas: RwLock<HashMap<String, Schema>>,
    states: RwLock<HashMap<String, SharedState>>,
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_schema(&self, name: impl Into<String>, schema: Schema) -> Result<(), StateError> {
        let name = name.into();
        let mut schemas = self.schemas.write();
        if schemas.contains_key(&name) {
            return Err(StateError::DuplicateSchema(name));
        }
        schemas.insert(name, schema);
        Ok(())
    }

    /// Create a state from a schema's defaults. The latest state created per
    /// schema is the one [`get`](Self::get) returns.
    pub fn create(&self, schema: &str) -> Result<SharedState, StateError> {
        let defaults = self
            .schemas
            .read()
            .get(schema)
            .cloned()
            .ok_or_else(|| StateError::UnknownSchema(schema.to_string()))?;

        let state = SharedState {
            id: Uuid::new_v4(),
            schema: schema.to_string(),
            values: Arc::new(RwLock::new(defaults.into_iter().collect())),
        };
        self.states.write().insert(schema.to_string(), state.clone());
        log::debug!("[StateManager] Created state '{}' ({})", schema, state.id);
        Ok(state)
    }

    pub fn get(&self, schema: &str) -> Option<SharedState> {
        self.states.read().get(schema).cloned()
    }

    pub fn schema_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.schemas.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> Schema {
        BTreeMap::from([("volume".to_string(), json!(1.0)), ("mute".to_string(), json!(false))])
    }

    #[test]
    fn test_create_uses_defaults() {
        let manager = StateManager::new();
        manager.register_schema("globals", schema()).unwrap();
        let state = manager.create("globals").unwrap();
        assert_eq!(state.get("volume"), Some(json!(1.0)));
        assert_eq!(state.values(), json!({ "mute": false, "volume": 1.0 }));
        assert_eq!(manager.get("globals").unwrap().id(), state.id());
    }

    #[test]
    fn test_set_known_and_unknown_params() {
        let manager = StateManager::new();
        manager.register_schema("globals", schema()).unwrap();
        let state = manager.create("globals").unwrap();

        assert_eq!(state.set("mute", json!(true)).unwrap(), json!(false));
        assert_eq!(manager.get("globals").unwrap().get("mute"), Some(json!(true)));
        assert!(matches!(state.set("pitch", json!(2)), Err(StateError::UnknownParam { .. })));
    }

    #[test]
    fn test_schema_errors() {
        let manager = StateManager::new();
        manager.register_schema("globals", schema()).unwrap();
        assert!(matches!(
            manager.register_schema("globals", Schema::new()),
            Err(StateError::DuplicateSchema(_))
        ));
        assert!(matches!(manager.create("float"), Err(StateError::UnknownSchema(_))));
    }
}

//! Scenario store.
//!
//! Holds the scenario list in memory and writes it, together with the id
//! counter, to the key-value store after every mutation. Mutations run
//! against a copy of the state which only replaces the live state once
//! it has been persisted.

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use clickflow_core::error::ClickflowError;
use clickflow_core::types::{ActionId, MovementSpeed, ScenarioId, Timestamp};
use clickflow_storage::{keys, load_json, save_json, KeyValueStore};

use crate::error::{StoreError, ValidationError};
use crate::params::ActionParams;
use crate::types::{Action, ActionKind, Scenario};

/// Partial update of a scenario's editable settings.
#[derive(Debug, Clone, Default)]
pub struct ScenarioSettings {
    pub name: Option<String>,
    pub icon: Option<String>,
    pub description: Option<String>,
    pub repeat_count: Option<u32>,
    pub action_delay_ms: Option<u64>,
    pub movement_speed: Option<MovementSpeed>,
    pub loop_forever: Option<bool>,
    pub trigger_by_telegram: Option<bool>,
}

#[derive(Debug, Clone)]
struct StoreState {
    scenarios: Vec<Scenario>,
    next_id: u64,
}

/// Persisted, ordered collection of scenarios.
pub struct ScenarioStore {
    kv: Arc<dyn KeyValueStore>,
    state: Mutex<StoreState>,
    default_action_delay_ms: u64,
}

impl ScenarioStore {
    /// Load scenarios from `kv`, seeding one empty scenario when none exist.
    pub fn open(kv: Arc<dyn KeyValueStore>, default_action_delay_ms: u64) -> Result<Self, StoreError> {
        let mut scenarios: Vec<Scenario> = load_json(kv.as_ref(), keys::SCENARIOS)?.unwrap_or_default();
        for s in &mut scenarios {
            s.normalize();
        }
        let stored_next: u64 = load_json(kv.as_ref(), keys::SCENARIO_COUNTER)?.unwrap_or(1);
        let max_id = scenarios.iter().map(|s| s.id.0).max().unwrap_or(0);
        let next_id = stored_next.max(max_id + 1);
        if next_id != stored_next {
            warn!(stored_next, next_id, "Scenario counter behind stored ids, advancing");
        }

        let store = Self {
            kv,
            state: Mutex::new(StoreState { scenarios, next_id }),
            default_action_delay_ms,
        };

        if store.lock()?.scenarios.is_empty() {
            let seeded = store.create("New Scenario")?;
            info!(id = %seeded.id, "Seeded initial scenario");
        } else {
            info!(count = store.lock()?.scenarios.len(), "Scenarios loaded");
        }
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state
            .lock()
            .map_err(|e| StoreError::Storage(ClickflowError::Storage(format!("Lock poisoned: {}", e))))
    }

    /// Apply `f` to a copy of the state, persist it, then commit.
    fn mutate<T>(
        &self,
        f: impl FnOnce(&mut StoreState) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self.lock()?;
        let mut draft = guard.clone();
        let out = f(&mut draft)?;
        save_json(self.kv.as_ref(), keys::SCENARIOS, &draft.scenarios)?;
        save_json(self.kv.as_ref(), keys::SCENARIO_COUNTER, &draft.next_id)?;
        *guard = draft;
        Ok(out)
    }

    fn edit_scenario<T>(
        &self,
        id: ScenarioId,
        f: impl FnOnce(&mut Scenario) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.mutate(|state| {
            let scenario = state
                .scenarios
                .iter_mut()
                .find(|s| s.id == id)
                .ok_or(StoreError::ScenarioNotFound(id))?;
            let out = f(scenario)?;
            scenario.updated_at = Timestamp::now();
            Ok(out)
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn list(&self) -> Result<Vec<Scenario>, StoreError> {
        Ok(self.lock()?.scenarios.clone())
    }

    pub fn get(&self, id: ScenarioId) -> Result<Scenario, StoreError> {
        self.lock()?
            .scenarios
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or(StoreError::ScenarioNotFound(id))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|s| s.scenarios.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // =========================================================================
    // Scenario lifecycle
    // =========================================================================

    pub fn create(&self, name: &str) -> Result<Scenario, StoreError> {
        let delay = self.default_action_delay_ms;
        let created = self.mutate(|state| {
            let id = ScenarioId(state.next_id);
            state.next_id += 1;
            let mut scenario = Scenario::new(id, name.trim());
            scenario.action_delay_ms = delay;
            state.scenarios.push(scenario.clone());
            Ok(scenario)
        })?;
        info!(id = %created.id, name = %created.name, "Scenario created");
        Ok(created)
    }

    /// Copy a scenario under a new id, named "<name> (Copy)".
    pub fn duplicate(&self, id: ScenarioId) -> Result<Scenario, StoreError> {
        let copy = self.mutate(|state| {
            let source = state
                .scenarios
                .iter()
                .find(|s| s.id == id)
                .ok_or(StoreError::ScenarioNotFound(id))?;
            let mut copy = source.clone();
            copy.id = ScenarioId(state.next_id);
            copy.name = format!("{} (Copy)", source.name);
            copy.is_waiting_for_message = false;
            copy.updated_at = Timestamp::now();
            state.next_id += 1;
            state.scenarios.push(copy.clone());
            Ok(copy)
        })?;
        info!(source = %id, id = %copy.id, "Scenario duplicated");
        Ok(copy)
    }

    /// Delete a scenario. The last remaining scenario cannot be deleted.
    pub fn delete(&self, id: ScenarioId) -> Result<(), StoreError> {
        self.mutate(|state| {
            let index = state
                .scenarios
                .iter()
                .position(|s| s.id == id)
                .ok_or(StoreError::ScenarioNotFound(id))?;
            if state.scenarios.len() == 1 {
                return Err(StoreError::LastScenario);
            }
            state.scenarios.remove(index);
            Ok(())
        })?;
        info!(id = %id, "Scenario deleted");
        Ok(())
    }

    pub fn update_settings(
        &self,
        id: ScenarioId,
        settings: ScenarioSettings,
    ) -> Result<Scenario, StoreError> {
        self.edit_scenario(id, |s| {
            if let Some(name) = settings.name {
                let name = name.trim();
                if name.is_empty() {
                    return Err(ValidationError::missing("scenario.name").into());
                }
                s.name = name.to_string();
            }
            if let Some(icon) = settings.icon {
                s.icon = icon;
            }
            if let Some(description) = settings.description {
                s.description = description;
            }
            if let Some(count) = settings.repeat_count {
                if count == 0 {
                    return Err(ValidationError::TooSmall {
                        field: "scenario.repeatCount".into(),
                        min: 1,
                        value: 0,
                    }
                    .into());
                }
                s.repeat_count = count;
            }
            if let Some(delay) = settings.action_delay_ms {
                s.action_delay_ms = delay;
            }
            if let Some(speed) = settings.movement_speed {
                s.movement_speed = speed;
            }
            if let Some(enabled) = settings.loop_forever {
                s.set_loop_forever(enabled);
            }
            // Applied last so that the trigger wins when both are enabled.
            if let Some(enabled) = settings.trigger_by_telegram {
                s.set_trigger_by_telegram(enabled);
            }
            Ok(s.clone())
        })
    }

    /// Transient armed flag, mirrored from the engine. Not persisted.
    pub fn set_waiting(&self, id: ScenarioId, waiting: bool) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let scenario = state
            .scenarios
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(StoreError::ScenarioNotFound(id))?;
        scenario.is_waiting_for_message = waiting;
        Ok(())
    }

    // =========================================================================
    // Action editing
    // =========================================================================

    /// Append a validated action.
    pub fn add_action(
        &self,
        id: ScenarioId,
        kind: ActionKind,
        name: &str,
        parameters: Map<String, Value>,
    ) -> Result<Action, StoreError> {
        ActionParams::parse(kind, &parameters)?;
        let action = self.edit_scenario(id, |s| {
            let action = Action {
                id: s.next_action_id(),
                kind,
                name: name.to_string(),
                parameters,
            };
            s.actions.push(action.clone());
            Ok(action)
        })?;
        debug!(scenario = %id, action = %action.id, kind = %kind, "Action added");
        Ok(action)
    }

    /// Replace an action's name and parameters, keeping its kind.
    pub fn update_action(
        &self,
        id: ScenarioId,
        action_id: ActionId,
        name: &str,
        parameters: Map<String, Value>,
    ) -> Result<Action, StoreError> {
        self.edit_scenario(id, |s| {
            let action = s
                .actions
                .iter_mut()
                .find(|a| a.id == action_id)
                .ok_or(StoreError::ActionNotFound {
                    scenario: id,
                    action: action_id,
                })?;
            ActionParams::parse(action.kind, &parameters)?;
            action.name = name.to_string();
            action.parameters = parameters;
            Ok(action.clone())
        })
    }

    pub fn remove_action(&self, id: ScenarioId, action_id: ActionId) -> Result<(), StoreError> {
        self.edit_scenario(id, |s| {
            let index = s.action_index(action_id).ok_or(StoreError::ActionNotFound {
                scenario: id,
                action: action_id,
            })?;
            s.actions.remove(index);
            Ok(())
        })
    }

    /// Move the action at `from` so it ends up at index `to`.
    pub fn move_action(&self, id: ScenarioId, from: usize, to: usize) -> Result<(), StoreError> {
        self.edit_scenario(id, |s| {
            let len = s.actions.len();
            if from >= len {
                return Err(StoreError::IndexOutOfRange { index: from, len });
            }
            if to >= len {
                return Err(StoreError::IndexOutOfRange { index: to, len });
            }
            let action = s.actions.remove(from);
            s.actions.insert(to, action);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clickflow_storage::{Database, MemoryKvStore, SqliteKvStore};
    use serde_json::json;

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn open_memory() -> (Arc<MemoryKvStore>, ScenarioStore) {
        let kv = Arc::new(MemoryKvStore::new());
        let store = ScenarioStore::open(kv.clone(), 500).unwrap();
        (kv, store)
    }

    /// KV that fails every write after construction.
    struct ReadOnlyKv(MemoryKvStore);

    impl KeyValueStore for ReadOnlyKv {
        fn get(&self, key: &str) -> Result<Option<String>, ClickflowError> {
            self.0.get(key)
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), ClickflowError> {
            Err(ClickflowError::Storage("read-only".into()))
        }
        fn remove(&self, _key: &str) -> Result<(), ClickflowError> {
            Err(ClickflowError::Storage("read-only".into()))
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    #[test]
    fn test_open_seeds_one_scenario() {
        let (_kv, store) = open_memory();
        let list = store.list().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].id, ScenarioId(1));
        assert_eq!(list[0].name, "New Scenario");
    }

    #[test]
    fn test_create_allocates_increasing_ids() {
        let (_kv, store) = open_memory();
        let a = store.create("A").unwrap();
        let b = store.create("B").unwrap();
        assert_eq!(a.id, ScenarioId(2));
        assert_eq!(b.id, ScenarioId(3));
        assert_eq!(a.action_delay_ms, 500);
    }

    #[test]
    fn test_ids_not_reused_after_delete_and_reopen() {
        let kv: Arc<MemoryKvStore> = Arc::new(MemoryKvStore::new());
        {
            let store = ScenarioStore::open(kv.clone(), 500).unwrap();
            let b = store.create("B").unwrap();
            store.delete(b.id).unwrap();
        }
        let store = ScenarioStore::open(kv, 500).unwrap();
        let c = store.create("C").unwrap();
        assert_eq!(c.id, ScenarioId(3));
    }

    #[test]
    fn test_duplicate_deep_copies_actions() {
        let (_kv, store) = open_memory();
        let id = ScenarioId(1);
        store
            .add_action(id, ActionKind::KeyPress, "Enter", params(json!({"key": "enter"})))
            .unwrap();
        let copy = store.duplicate(id).unwrap();
        assert_eq!(copy.name, "New Scenario (Copy)");
        assert_ne!(copy.id, id);
        assert_eq!(copy.actions.len(), 1);

        store
            .update_action(copy.id, copy.actions[0].id, "Tab", params(json!({"key": "tab"})))
            .unwrap();
        let original = store.get(id).unwrap();
        assert_eq!(original.actions[0].parameters["key"], json!("enter"));
    }

    #[test]
    fn test_delete_last_scenario_rejected() {
        let (_kv, store) = open_memory();
        let err = store.delete(ScenarioId(1)).unwrap_err();
        assert!(matches!(err, StoreError::LastScenario));
        assert_eq!(store.len(), 1);

        let b = store.create("B").unwrap();
        store.delete(ScenarioId(1)).unwrap();
        assert_eq!(store.list().unwrap()[0].id, b.id);
    }

    #[test]
    fn test_delete_unknown() {
        let (_kv, store) = open_memory();
        assert!(matches!(
            store.delete(ScenarioId(99)),
            Err(StoreError::ScenarioNotFound(ScenarioId(99)))
        ));
    }

    // =========================================================================
    // Settings
    // =========================================================================

    #[test]
    fn test_update_settings_trigger_wins_over_loop() {
        let (_kv, store) = open_memory();
        let updated = store
            .update_settings(
                ScenarioId(1),
                ScenarioSettings {
                    loop_forever: Some(true),
                    trigger_by_telegram: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(updated.trigger_by_telegram);
        assert!(!updated.loop_forever);

        let updated = store
            .update_settings(
                ScenarioId(1),
                ScenarioSettings {
                    loop_forever: Some(true),
                    ..Default::default()
                },
            )
            .unwrap();
        assert!(updated.loop_forever);
        assert!(!updated.trigger_by_telegram);
    }

    #[test]
    fn test_update_settings_rejects_zero_repeat_and_blank_name() {
        let (_kv, store) = open_memory();
        let err = store
            .update_settings(
                ScenarioId(1),
                ScenarioSettings {
                    repeat_count: Some(0),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(ValidationError::TooSmall { .. })));

        let err = store
            .update_settings(
                ScenarioId(1),
                ScenarioSettings {
                    name: Some("  ".into()),
                    ..Default::default()
                },
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    // =========================================================================
    // Actions
    // =========================================================================

    #[test]
    fn test_add_action_validates() {
        let (_kv, store) = open_memory();
        let err = store
            .add_action(ScenarioId(1), ActionKind::WaitUntilPixelColor, "", params(json!({"x": 1, "y": 1, "colorHex": "red"})))
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(store.get(ScenarioId(1)).unwrap().actions.is_empty());
    }

    #[test]
    fn test_action_ids_unique_within_scenario() {
        let (_kv, store) = open_memory();
        let a = store
            .add_action(ScenarioId(1), ActionKind::Delay, "", Map::new())
            .unwrap();
        let b = store
            .add_action(ScenarioId(1), ActionKind::Delay, "", Map::new())
            .unwrap();
        store.remove_action(ScenarioId(1), a.id).unwrap();
        let c = store
            .add_action(ScenarioId(1), ActionKind::Delay, "", Map::new())
            .unwrap();
        assert_ne!(b.id, c.id);
    }

    #[test]
    fn test_move_action() {
        let (_kv, store) = open_memory();
        let id = ScenarioId(1);
        for key in ["a", "b", "c"] {
            store
                .add_action(id, ActionKind::KeyPress, key, params(json!({"key": key})))
                .unwrap();
        }
        store.move_action(id, 0, 2).unwrap();
        let names: Vec<String> = store
            .get(id)
            .unwrap()
            .actions
            .into_iter()
            .map(|a| a.name)
            .collect();
        assert_eq!(names, vec!["b", "c", "a"]);

        assert!(matches!(
            store.move_action(id, 3, 0),
            Err(StoreError::IndexOutOfRange { index: 3, len: 3 })
        ));
    }

    #[test]
    fn test_update_missing_action() {
        let (_kv, store) = open_memory();
        let err = store
            .update_action(ScenarioId(1), ActionId(5), "x", Map::new())
            .unwrap_err();
        assert!(matches!(err, StoreError::ActionNotFound { .. }));
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    #[test]
    fn test_every_mutation_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clickflow.db");
        {
            let kv = Arc::new(SqliteKvStore::new(Arc::new(Database::new(&path).unwrap())));
            let store = ScenarioStore::open(kv, 500).unwrap();
            store
                .add_action(ScenarioId(1), ActionKind::KeyPress, "Go", params(json!({"key": "f5"})))
                .unwrap();
            store.create("Second").unwrap();
        }
        let kv = Arc::new(SqliteKvStore::new(Arc::new(Database::new(&path).unwrap())));
        let store = ScenarioStore::open(kv, 500).unwrap();
        let list = store.list().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].actions[0].name, "Go");
        assert_eq!(list[1].name, "Second");
    }

    #[test]
    fn test_open_normalizes_conflicting_flags() {
        let kv = Arc::new(MemoryKvStore::new());
        kv.set(
            keys::SCENARIOS,
            r#"[{"id":4,"name":"T","loopForever":true,"triggerByTelegram":true}]"#,
        )
        .unwrap();
        let store = ScenarioStore::open(kv, 500).unwrap();
        let s = store.get(ScenarioId(4)).unwrap();
        assert!(s.trigger_by_telegram);
        assert!(!s.loop_forever);
        assert_eq!(store.create("next").unwrap().id, ScenarioId(5));
    }

    #[test]
    fn test_failed_write_leaves_state_untouched() {
        let inner = MemoryKvStore::new();
        inner
            .set(keys::SCENARIOS, r#"[{"id":1,"name":"Only"}]"#)
            .unwrap();
        let store = ScenarioStore::open(Arc::new(ReadOnlyKv(inner)), 500).unwrap();
        assert!(store.create("B").is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_set_waiting_is_transient() {
        let (kv, store) = open_memory();
        store.set_waiting(ScenarioId(1), true).unwrap();
        assert!(store.get(ScenarioId(1)).unwrap().is_waiting_for_message);
        let raw = kv.get(keys::SCENARIOS).unwrap().unwrap();
        assert!(!raw.contains("isWaitingForMessage"));
    }
}

//! Mutable state reachable by implementations, snapshots of it, and diffs
//!
//! A [`StateStore`] is the live state an implementation mutates through its
//! sandbox handle. It is a cheap-clone shared handle: the sandbox worker and
//! the orchestrator see the same data, so writes made before a timeout stay
//! visible afterwards. [`StateStore::capture`] produces an owned
//! [`CapturedState`] that later writes cannot affect.
//!
//! Implementations get a fenced view from [`StateStore::fenced`]. Once its
//! [`WriteFence`] is revoked, writes through that view are dropped, so a
//! worker that outlives its execution cannot touch the store.

use isl_core::value::{Value, ValueMap};
use parking_lot::{RwLock, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Records of one entity, keyed by id
pub type EntityTable = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SideEffectKind {
    Created,
    Updated,
    Deleted,
}

/// A mutation of an entity record observed during execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideEffect {
    pub kind: SideEffectKind,
    pub entity: String,
    pub id: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

/// Owned snapshot of all state at one point in time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapturedState {
    pub fields: ValueMap,
    pub entities: BTreeMap<String, EntityTable>,
    #[serde(default)]
    pub side_effects: Vec<SideEffect>,
}

/// Render a lookup key as a record id
pub fn key_to_id(key: &Value) -> Option<String> {
    match key {
        Value::String(s) => Some(s.clone()),
        Value::Integer(n) => Some(n.to_string()),
        Value::Uuid(id) => Some(id.to_string()),
        _ => None,
    }
}

fn matches_criteria(record: &Value, criteria: &ValueMap) -> bool {
    criteria
        .iter()
        .all(|(field, expected)| record.property(field) == *expected)
}

impl CapturedState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn with_record(mut self, entity: &str, id: impl Into<String>, record: Value) -> Self {
        self.entities
            .entry(entity.to_string())
            .or_default()
            .insert(id.into(), record);
        self
    }

    /// Records of `entity` selected by `key`: everything when there is no
    /// key, the record with that id for scalar keys, and records whose fields
    /// equal every entry for map keys.
    pub fn select(&self, entity: &str, key: Option<&Value>) -> Vec<&Value> {
        let Some(table) = self.entities.get(entity) else {
            return Vec::new();
        };
        match key {
            None => table.values().collect(),
            Some(Value::Map(criteria)) => table
                .values()
                .filter(|r| matches_criteria(r, criteria))
                .collect(),
            Some(key) => key_to_id(key)
                .and_then(|id| table.get(&id))
                .into_iter()
                .collect(),
        }
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    fields: ValueMap,
    entities: BTreeMap<String, EntityTable>,
    effects: Vec<SideEffect>,
}

/// Shared, mutable state handed to implementations under test
#[derive(Debug, Clone, Default)]
pub struct StateStore {
    inner: Arc<RwLock<StoreInner>>,
    /// Present on fenced views; set once the view lost write access
    revoked: Option<Arc<AtomicBool>>,
}

/// Revokes write access of a fenced [`StateStore`] view
#[derive(Debug)]
pub struct WriteFence {
    inner: Arc<RwLock<StoreInner>>,
    revoked: Arc<AtomicBool>,
}

impl WriteFence {
    /// Drop every later write made through the fenced view. Writes that
    /// already hold the lock finish before this returns.
    pub fn revoke(&self) {
        let _guard = self.inner.write();
        self.revoked.store(true, Ordering::Release);
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked.load(Ordering::Acquire)
    }
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a snapshot. Side effects are not carried over.
    pub fn from_state(state: &CapturedState) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.write();
            inner.fields = state.fields.clone();
            inner.entities = state.entities.clone();
        }
        store
    }

    /// A view sharing this store's data whose writes stop once the returned
    /// fence is revoked
    pub fn fenced(&self) -> (StateStore, WriteFence) {
        let revoked = Arc::new(AtomicBool::new(false));
        let view = StateStore {
            inner: self.inner.clone(),
            revoked: Some(revoked.clone()),
        };
        let fence = WriteFence {
            inner: self.inner.clone(),
            revoked,
        };
        (view, fence)
    }

    /// Write lock, or `None` when this view has been revoked
    fn write(&self) -> Option<RwLockWriteGuard<'_, StoreInner>> {
        let guard = self.inner.write();
        match &self.revoked {
            Some(revoked) if revoked.load(Ordering::Acquire) => {
                trace!("write through revoked store view dropped");
                None
            }
            _ => Some(guard),
        }
    }

    /// Declare an entity so that it is known even while it has no records
    pub fn declare_entity(&self, entity: &str) {
        if let Some(mut inner) = self.write() {
            inner.entities.entry(entity.to_string()).or_default();
        }
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        self.inner.read().fields.get(name).cloned()
    }

    pub fn set_field(&self, name: impl Into<String>, value: Value) {
        if let Some(mut inner) = self.write() {
            inner.fields.insert(name.into(), value);
        }
    }

    pub fn get(&self, entity: &str, id: &str) -> Option<Value> {
        self.inner
            .read()
            .entities
            .get(entity)
            .and_then(|t| t.get(id))
            .cloned()
    }

    /// Insert or replace a record, recording a created/updated side effect
    pub fn put(&self, entity: &str, id: impl Into<String>, record: Value) {
        self.insert_record(entity, id.into(), record);
    }

    fn insert_record(&self, entity: &str, id: String, record: Value) -> bool {
        let Some(mut inner) = self.write() else {
            return false;
        };
        let before = inner
            .entities
            .entry(entity.to_string())
            .or_default()
            .insert(id.clone(), record.clone());
        let kind = if before.is_some() {
            SideEffectKind::Updated
        } else {
            SideEffectKind::Created
        };
        inner.effects.push(SideEffect {
            kind,
            entity: entity.to_string(),
            id,
            before,
            after: Some(record),
        });
        true
    }

    /// Set one field of an existing record. Returns false if there is no
    /// such record or the write was dropped.
    pub fn update_field(&self, entity: &str, id: &str, field: &str, value: Value) -> bool {
        let Some(mut record) = self.get(entity, id) else {
            return false;
        };
        match &mut record {
            Value::Map(fields) => {
                fields.insert(field.to_string(), value);
            }
            _ => return false,
        }
        self.insert_record(entity, id.to_string(), record)
    }

    pub fn delete(&self, entity: &str, id: &str) -> Option<Value> {
        let mut inner = self.write()?;
        let removed = inner.entities.get_mut(entity).and_then(|t| t.remove(id));
        if let Some(before) = &removed {
            inner.effects.push(SideEffect {
                kind: SideEffectKind::Deleted,
                entity: entity.to_string(),
                id: id.to_string(),
                before: Some(before.clone()),
                after: None,
            });
        }
        removed
    }

    pub fn count(&self, entity: &str) -> usize {
        self.inner
            .read()
            .entities
            .get(entity)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Snapshot the current state including side effects recorded so far
    pub fn capture(&self) -> CapturedState {
        let inner = self.inner.read();
        CapturedState {
            fields: inner.fields.clone(),
            entities: inner.entities.clone(),
            side_effects: inner.effects.clone(),
        }
    }

    /// Remove and return the side-effect log
    pub fn take_effects(&self) -> Vec<SideEffect> {
        self.write()
            .map(|mut inner| std::mem::take(&mut inner.effects))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityChange {
    pub entity: String,
    pub id: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub name: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

/// Structural difference between two snapshots
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDiff {
    pub created: Vec<EntityChange>,
    pub updated: Vec<EntityChange>,
    pub deleted: Vec<EntityChange>,
    pub fields: Vec<FieldChange>,
}

impl StateDiff {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty()
            && self.updated.is_empty()
            && self.deleted.is_empty()
            && self.fields.is_empty()
    }

    pub fn change_count(&self) -> usize {
        self.created.len() + self.updated.len() + self.deleted.len() + self.fields.len()
    }
}

pub fn diff(before: &CapturedState, after: &CapturedState) -> StateDiff {
    let mut out = StateDiff::default();

    let names: BTreeSet<&String> = before.fields.keys().chain(after.fields.keys()).collect();
    for name in names {
        let (b, a) = (before.fields.get(name), after.fields.get(name));
        if b != a {
            out.fields.push(FieldChange {
                name: name.clone(),
                before: b.cloned(),
                after: a.cloned(),
            });
        }
    }

    let empty = EntityTable::new();
    let entities: BTreeSet<&String> = before.entities.keys().chain(after.entities.keys()).collect();
    for entity in entities {
        let old_table = before.entities.get(entity).unwrap_or(&empty);
        let new_table = after.entities.get(entity).unwrap_or(&empty);
        let ids: BTreeSet<&String> = old_table.keys().chain(new_table.keys()).collect();
        for id in ids {
            let change = |b: Option<&Value>, a: Option<&Value>| EntityChange {
                entity: entity.clone(),
                id: id.clone(),
                before: b.cloned(),
                after: a.cloned(),
            };
            match (old_table.get(id), new_table.get(id)) {
                (None, Some(a)) => out.created.push(change(None, Some(a))),
                (Some(b), None) => out.deleted.push(change(Some(b), None)),
                (Some(b), Some(a)) if b != a => out.updated.push(change(Some(b), Some(a))),
                _ => {}
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(balance: i64) -> Value {
        Value::record([("balance", Value::Integer(balance))])
    }

    #[test]
    fn test_capture_is_immune_to_later_writes() {
        let store = StateStore::new();
        store.put("Account", "a1", account(100));
        let snapshot = store.capture();
        store.update_field("Account", "a1", "balance", Value::Integer(70));

        assert_eq!(snapshot.select("Account", Some(&"a1".into()))[0], &account(100));
        assert_eq!(store.get("Account", "a1"), Some(account(70)));
    }

    #[test]
    fn test_side_effects_are_recorded() {
        let store = StateStore::new();
        store.put("Account", "a1", account(1));
        store.put("Account", "a1", account(2));
        store.delete("Account", "a1");
        store.delete("Account", "missing");

        let kinds: Vec<_> = store.take_effects().into_iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                SideEffectKind::Created,
                SideEffectKind::Updated,
                SideEffectKind::Deleted
            ]
        );
        assert!(store.take_effects().is_empty());
    }

    #[test]
    fn test_revoked_view_drops_writes() {
        let store = StateStore::new();
        let (view, fence) = store.fenced();
        view.set_field("balance", Value::Integer(1));
        view.put("Account", "a1", account(1));
        assert_eq!(store.field("balance"), Some(Value::Integer(1)));

        fence.revoke();
        assert!(fence.is_revoked());
        view.set_field("balance", Value::Integer(2));
        view.put("Account", "a2", account(2));
        assert_eq!(view.delete("Account", "a1"), None);
        assert!(!view.update_field("Account", "a1", "balance", Value::Integer(3)));
        view.declare_entity("Ledger");

        assert_eq!(store.field("balance"), Some(Value::Integer(1)));
        assert_eq!(store.get("Account", "a1"), Some(account(1)));
        assert_eq!(store.count("Account"), 1);
        assert_eq!(store.capture().entities.get("Ledger"), None);
        assert!(view.take_effects().is_empty());
        assert_eq!(store.take_effects().len(), 1);
        // The unfenced handle keeps full access
        store.set_field("balance", Value::Integer(4));
        assert_eq!(view.field("balance"), Some(Value::Integer(4)));
    }

    #[test]
    fn test_select_by_criteria() {
        let state = CapturedState::new()
            .with_record("User", "u1", Value::record([("email", "a@x".into())]))
            .with_record("User", "u2", Value::record([("email", "b@x".into())]));
        let criteria = Value::record([("email", Value::from("b@x"))]);
        assert_eq!(state.select("User", Some(&criteria)).len(), 1);
        assert_eq!(state.select("User", None).len(), 2);
        assert!(state.select("User", Some(&Value::Boolean(true))).is_empty());
        assert!(state.select("Missing", None).is_empty());
    }

    #[test]
    fn test_diff() {
        let before = CapturedState::new()
            .with_field("balance", Value::Integer(100))
            .with_record("Account", "a1", account(100))
            .with_record("Account", "a2", account(5));
        let after = CapturedState::new()
            .with_field("balance", Value::Integer(70))
            .with_record("Account", "a1", account(70))
            .with_record("Account", "a3", account(0));

        let d = diff(&before, &after);
        assert_eq!(d.created.len(), 1);
        assert_eq!(d.created[0].id, "a3");
        assert_eq!(d.updated.len(), 1);
        assert_eq!(d.deleted.len(), 1);
        assert_eq!(d.fields[0].name, "balance");
        assert_eq!(d.change_count(), 4);
        assert!(diff(&after, &after).is_empty());
    }
}

//! Artifact history with durable persistence and eviction under quota pressure.
//!
//! The [`ArtifactStore`] owns:
//!
//! - the history list, most-recent-first and unique by id;
//! - the active artifact, kept value-synchronized with its history entry
//!   whenever its body changes;
//! - a [`KvSlot`] receiving the serialized history on every change.
//!
//! When the serialized history does not fit in the slot, the store drops the
//! oldest entry (the end of the list) and tries again, down to a single
//! entry. The in-memory list always reflects what was actually persisted.

pub mod slot;

pub use slot::{FileSlot, KvSlot, MemorySlot};

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{SlotError, StoreError};
use crate::synthesis::ImagePayload;

/// Fallback name for artifacts with nothing better to go on.
pub const UNTITLED: &str = "Untitled artifact";

/// Maximum length of a name derived from a prompt.
const NAME_MAX_CHARS: usize = 40;

/// Generate a unique, opaque artifact identifier.
pub fn generate_artifact_id() -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    // Counter disambiguates calls within the same nanosecond.
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("art-{ts:x}-{count:04x}")
}

/// Derive a display name from a prompt: whitespace collapsed, truncated.
pub fn derive_name(prompt: &str) -> String {
    let collapsed = prompt.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return UNTITLED.to_string();
    }
    if collapsed.chars().count() <= NAME_MAX_CHARS {
        return collapsed;
    }
    let truncated: String = collapsed.chars().take(NAME_MAX_CHARS).collect();
    format!("{}...", truncated.trim_end())
}

/// A synthesized markup document and its provenance.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Artifact {
    pub id: String,
    pub name: String,
    /// The markup document. The only field mutated after creation.
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_image: Option<ImagePayload>,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    pub fn new(
        name: impl Into<String>,
        body: impl Into<String>,
        source_image: Option<ImagePayload>,
    ) -> Self {
        Self {
            id: generate_artifact_id(),
            name: name.into(),
            body: body.into(),
            source_image,
            created_at: Utc::now(),
        }
    }
}

/// What a successful [`ArtifactStore::persist`] had to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistReport {
    /// Ids evicted (oldest first) to make the history fit.
    pub evicted: Vec<String>,
    /// Size of the persisted snapshot in bytes.
    pub bytes: usize,
}

/// Owner of the artifact history and the active artifact.
pub struct ArtifactStore {
    slot: Box<dyn KvSlot>,
    history: Vec<Artifact>,
    active: Option<Artifact>,
}

impl ArtifactStore {
    /// Load the history from `slot`. Entries that fail to parse are dropped;
    /// an unreadable or corrupt slot yields an empty history.
    pub fn load(slot: Box<dyn KvSlot>) -> Self {
        let history = match slot.read() {
            Ok(Some(text)) => parse_history(&text),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!("Failed to read history slot, starting empty: {e}");
                Vec::new()
            }
        };
        debug!("Loaded {} artifact(s) from history", history.len());
        Self {
            slot,
            history,
            active: None,
        }
    }

    /// History entries, most recent first.
    pub fn history(&self) -> &[Artifact] {
        &self.history
    }

    pub fn active(&self) -> Option<&Artifact> {
        self.active.as_ref()
    }

    pub fn get(&self, id: &str) -> Option<&Artifact> {
        self.history.iter().find(|a| a.id == id)
    }

    /// Prepend `artifact` to history, make it active, and persist.
    ///
    /// The in-memory change is kept even if persisting fails.
    pub fn add(&mut self, artifact: Artifact) -> Result<PersistReport, StoreError> {
        info!("Adding artifact {} ({:?})", artifact.id, artifact.name);
        self.history.retain(|a| a.id != artifact.id);
        self.history.insert(0, artifact.clone());
        self.active = Some(artifact);
        self.persist()
    }

    /// Make the history entry `id` active. Returns `None` if it is unknown.
    pub fn set_active(&mut self, id: &str) -> Option<&Artifact> {
        let artifact = self.get(id)?.clone();
        self.active = Some(artifact);
        self.active.as_ref()
    }

    /// Replace the body of artifact `id` in history and, if it is the active
    /// one, in the active copy. Returns `Ok(false)` without doing anything
    /// when no artifact is active.
    pub fn update_body(&mut self, id: &str, body: &str) -> Result<bool, StoreError> {
        let Some(active) = self.active.as_mut() else {
            return Ok(false);
        };
        if active.id == id {
            active.body = body.to_string();
        }
        if let Some(entry) = self.history.iter_mut().find(|a| a.id == id) {
            entry.body = body.to_string();
        }
        self.persist()?;
        Ok(true)
    }

    /// Rename artifact `id`. Returns `Ok(false)` if it is not in history.
    pub fn rename(&mut self, id: &str, name: &str) -> Result<bool, StoreError> {
        let Some(entry) = self.history.iter_mut().find(|a| a.id == id) else {
            return Ok(false);
        };
        entry.name = name.to_string();
        if let Some(active) = self.active.as_mut().filter(|a| a.id == id) {
            active.name = name.to_string();
        }
        self.persist()?;
        Ok(true)
    }

    /// Delete artifact `id` from history. Clears the active artifact if it
    /// was the one removed.
    pub fn remove(&mut self, id: &str) -> Result<Option<Artifact>, StoreError> {
        let Some(pos) = self.history.iter().position(|a| a.id == id) else {
            return Ok(None);
        };
        let removed = self.history.remove(pos);
        if self.active.as_ref().is_some_and(|a| a.id == id) {
            self.active = None;
        }
        self.persist()?;
        Ok(Some(removed))
    }

    /// Delete every history entry and the active artifact.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        self.history.clear();
        self.active = None;
        self.persist().map(|_| ())
    }

    /// Drop the oldest history entry (the end of the list).
    pub fn evict_oldest(&mut self) -> Option<Artifact> {
        self.history.pop()
    }

    /// Serialize the full history into the slot, evicting oldest entries
    /// while it does not fit.
    ///
    /// Fails with [`StoreError::CapacityExhausted`] only when a single entry
    /// still does not fit. Evictions performed before the failure stay applied.
    pub fn persist(&mut self) -> Result<PersistReport, StoreError> {
        let mut report = PersistReport::default();
        loop {
            let json = serde_json::to_string(&self.history)?;
            match self.slot.write(&json) {
                Ok(()) => {
                    report.bytes = json.len();
                    if !report.evicted.is_empty() {
                        warn!(
                            "History over quota: evicted {} oldest artifact(s), {} remain",
                            report.evicted.len(),
                            self.history.len()
                        );
                    }
                    return Ok(report);
                }
                Err(e @ SlotError::QuotaExceeded { .. }) => {
                    if self.history.len() <= 1 {
                        warn!("History does not fit even with a single entry: {e}");
                        return Err(StoreError::CapacityExhausted(e));
                    }
                    if let Some(evicted) = self.evict_oldest() {
                        debug!("Evicting {} to fit quota ({e})", evicted.id);
                        report.evicted.push(evicted.id);
                    }
                }
                Err(e) => return Err(StoreError::Slot(e)),
            }
        }
    }
}

/// Parse a persisted history, keeping every entry that deserializes and
/// the first occurrence of each id.
fn parse_history(text: &str) -> Vec<Artifact> {
    let values: Vec<serde_json::Value> = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!("Persisted history is corrupt, starting empty: {e}");
            return Vec::new();
        }
    };

    let mut history: Vec<Artifact> = Vec::with_capacity(values.len());
    for value in values {
        match serde_json::from_value::<Artifact>(value) {
            Ok(artifact) if !history.iter().any(|a| a.id == artifact.id) => history.push(artifact),
            Ok(artifact) => debug!("Dropping duplicate history entry {}", artifact.id),
            Err(e) => debug!("Dropping unparseable history entry: {e}"),
        }
    }
    history
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(name: &str, body: &str) -> Artifact {
        Artifact::new(name, body, None)
    }

    fn store_with(slot: &MemorySlot) -> ArtifactStore {
        ArtifactStore::load(Box::new(slot.clone()))
    }

    #[test]
    fn add_prepends_activates_and_persists() {
        let slot = MemorySlot::new(None);
        let mut store = store_with(&slot);

        let a = artifact("a", "<p>a</p>");
        let b = artifact("b", "<p>b</p>");
        store.add(a.clone()).unwrap();
        store.add(b.clone()).unwrap();

        assert_eq!(store.history()[0].id, b.id);
        assert_eq!(store.history()[1].id, a.id);
        assert_eq!(store.active().unwrap().id, b.id);

        let persisted: Vec<Artifact> = serde_json::from_str(&slot.contents().unwrap()).unwrap();
        assert_eq!(persisted.len(), 2);
        assert_eq!(persisted[0].id, b.id);
    }

    #[test]
    fn re_adding_an_id_keeps_history_unique() {
        let slot = MemorySlot::new(None);
        let mut store = store_with(&slot);
        let a = artifact("a", "1");
        store.add(a.clone()).unwrap();
        store.add(artifact("b", "2")).unwrap();
        store.add(a.clone()).unwrap();

        assert_eq!(store.history().len(), 2);
        assert_eq!(store.history()[0].id, a.id);
    }

    #[test]
    fn update_body_syncs_active_and_history() {
        let slot = MemorySlot::new(None);
        let mut store = store_with(&slot);
        let a = artifact("a", "old");
        store.add(a.clone()).unwrap();

        assert!(store.update_body(&a.id, "new").unwrap());
        assert_eq!(store.active().unwrap().body, "new");
        assert_eq!(store.get(&a.id).unwrap().body, "new");
        assert!(slot.contents().unwrap().contains("new"));
    }

    #[test]
    fn update_body_without_active_is_a_noop() {
        let history = serde_json::to_string(&vec![artifact("a", "old")]).unwrap();
        let slot = MemorySlot::with_value(history, None);
        let mut store = store_with(&slot);
        let id = store.history()[0].id.clone();

        assert!(!store.update_body(&id, "new").unwrap());
        assert_eq!(store.get(&id).unwrap().body, "old");
    }

    #[test]
    fn load_drops_unparseable_entries() {
        let good = serde_json::to_value(artifact("ok", "<p/>")).unwrap();
        let text = serde_json::json!([good, {"name": "no id or body"}, 42]).to_string();
        let store = store_with(&MemorySlot::with_value(text, None));

        assert_eq!(store.history().len(), 1);
        assert_eq!(store.history()[0].name, "ok");
        assert!(store.active().is_none());
    }

    #[test]
    fn load_survives_corrupt_slot() {
        let store = store_with(&MemorySlot::with_value("{not json", None));
        assert!(store.history().is_empty());
    }

    #[test]
    fn overflow_evicts_oldest_first() {
        let slot = MemorySlot::new(None);
        let mut store = store_with(&slot);
        let oldest = artifact("oldest", &"x".repeat(100));
        let middle = artifact("middle", &"y".repeat(100));
        let newest = artifact("newest", &"z".repeat(100));
        for a in [&oldest, &middle, &newest] {
            store.add((*a).clone()).unwrap();
        }

        // Room for two entries but not three.
        let two = serde_json::to_string(&store.history()[..2]).unwrap().len();
        let mut store = ArtifactStore {
            slot: Box::new(MemorySlot::new(Some(two))),
            history: store.history().to_vec(),
            active: None,
        };

        let report = store.persist().unwrap();
        assert_eq!(report.evicted, vec![oldest.id.clone()]);
        let ids: Vec<&str> = store.history().iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec![newest.id.as_str(), middle.id.as_str()]);
    }

    #[test]
    fn single_oversized_entry_reports_failure() {
        let slot = MemorySlot::new(Some(64));
        let mut store = store_with(&slot);

        let err = store.add(artifact("big", &"b".repeat(1000))).unwrap_err();
        assert!(matches!(err, StoreError::CapacityExhausted(_)));
        // The add is kept in memory; nothing reached the slot.
        assert_eq!(store.history().len(), 1);
        assert!(slot.contents().is_none());
    }

    #[test]
    fn exhausting_quota_keeps_newest_and_leaves_slot_alone() {
        let oldest = artifact("oldest", &"x".repeat(300));
        let middle = artifact("middle", &"y".repeat(300));
        let newest = artifact("newest", &"z".repeat(300));
        let slot = MemorySlot::with_value("[]", Some(64));
        let mut store = ArtifactStore {
            slot: Box::new(slot.clone()),
            history: vec![newest.clone(), middle, oldest],
            active: None,
        };

        let err = store.persist().unwrap_err();
        assert!(matches!(err, StoreError::CapacityExhausted(_)));
        assert_eq!(store.history().len(), 1);
        assert_eq!(store.history()[0].id, newest.id);
        assert_eq!(slot.contents().as_deref(), Some("[]"));
    }

    #[test]
    fn eviction_keeps_active_copy() {
        let a = artifact("a", &"a".repeat(200));
        let b = artifact("b", &"b".repeat(200));
        let one = serde_json::to_string(&vec![&b]).unwrap().len();
        let mut store = ArtifactStore::load(Box::new(MemorySlot::new(Some(one))));

        store.history = vec![b.clone(), a.clone()];
        store.active = Some(a.clone());
        store.persist().unwrap();

        assert_eq!(store.history().len(), 1);
        assert_eq!(store.active().unwrap().id, a.id);
    }

    #[test]
    fn remove_clears_active() {
        let mut store = store_with(&MemorySlot::new(None));
        let a = artifact("a", "1");
        store.add(a.clone()).unwrap();
        assert!(store.remove(&a.id).unwrap().is_some());
        assert!(store.active().is_none());
        assert!(store.history().is_empty());
        assert!(store.remove("missing").unwrap().is_none());
    }

    #[test]
    fn rename_updates_entry_and_active() {
        let mut store = store_with(&MemorySlot::new(None));
        let a = artifact("a", "1");
        store.add(a.clone()).unwrap();
        assert!(store.rename(&a.id, "Dashboard").unwrap());
        assert_eq!(store.active().unwrap().name, "Dashboard");
        assert_eq!(store.history()[0].name, "Dashboard");
    }

    #[test]
    fn derive_name_collapses_and_truncates() {
        assert_eq!(derive_name("  a   pomodoro\ntimer "), "a pomodoro timer");
        assert_eq!(derive_name(""), UNTITLED);
        let long = derive_name(&"word ".repeat(30));
        assert!(long.ends_with("..."));
        assert!(long.chars().count() <= NAME_MAX_CHARS + 3);
    }

    #[test]
    fn ids_are_unique() {
        let a = generate_artifact_id();
        let b = generate_artifact_id();
        assert_ne!(a, b);
        assert!(a.starts_with("art-"));
    }
}

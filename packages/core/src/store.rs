//! In-memory ordered store of queue entries.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{EntryId, EntryStatus, QueueEntry, QueueError, SourceFile, StatusKind};

/// Counts of entries per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub done: u64,
    pub failed: u64,
}

impl QueueStats {
    pub fn total(&self) -> u64 {
        self.pending + self.processing + self.done + self.failed
    }

    /// Entries that reached `Done` or `Error`.
    pub fn terminal(&self) -> u64 {
        self.done + self.failed
    }

    /// Success rate as a percentage of terminal entries.
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.terminal();
        if total == 0 {
            None
        } else {
            Some((self.done as f64 / total as f64) * 100.0)
        }
    }
}

/// Ordered collection of entries. Insertion order is processing order.
///
/// The store does not know whether a run is in flight. Callers guard
/// removal of `Processing` entries with [`processing_id`](Self::processing_id).
#[derive(Debug, Clone, Default)]
pub struct FileQueueStore {
    entries: Vec<QueueEntry>,
}

impl FileQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one `Pending` entry per file, in the given order.
    pub fn add_files(&mut self, files: impl IntoIterator<Item = SourceFile>) -> Vec<EntryId> {
        let mut ids = Vec::new();
        for file in files {
            let mut entry = QueueEntry::new(file);
            while self.contains(entry.id) || ids.contains(&entry.id) {
                entry.id = EntryId::new();
            }
            ids.push(entry.id);
            self.entries.push(entry);
        }
        ids
    }

    /// Remove an entry. Absent ids are a no-op returning `None`.
    pub fn remove_file(&mut self, id: EntryId) -> Option<QueueEntry> {
        let index = self.position(id)?;
        Some(self.entries.remove(index))
    }

    /// Remove every entry, returning how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }

    /// First entry currently marked `Processing`, if any.
    pub fn processing_id(&self) -> Option<EntryId> {
        self.entries
            .iter()
            .find(|e| e.kind() == StatusKind::Processing)
            .map(|e| e.id)
    }

    /// Replace an entry's status in one step, returning the previous kind.
    ///
    /// Allowed: `Pending -> Processing`, `Processing -> Processing`
    /// (restart of a leftover), `Processing -> Done | Error`.
    pub fn update_status(
        &mut self,
        id: EntryId,
        status: EntryStatus,
    ) -> Result<StatusKind, QueueError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(QueueError::EntryNotFound(id))?;

        let from = entry.kind();
        let to = status.kind();
        let allowed = matches!(
            (from, to),
            (StatusKind::Pending, StatusKind::Processing)
                | (StatusKind::Processing, StatusKind::Processing)
                | (StatusKind::Processing, StatusKind::Done)
                | (StatusKind::Processing, StatusKind::Error)
        );
        if !allowed {
            return Err(QueueError::InvalidTransition { id, from, to });
        }

        entry.status = status;
        entry.updated_at = Utc::now();
        Ok(from)
    }

    pub fn get(&self, id: EntryId) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.position(id).is_some()
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids a batch run would process right now, in queue order.
    pub fn eligible_ids(&self) -> Vec<EntryId> {
        self.entries
            .iter()
            .filter(|e| e.kind().is_eligible())
            .map(|e| e.id)
            .collect()
    }

    pub fn done_entries(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter().filter(|e| e.kind() == StatusKind::Done)
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats::default();
        for entry in &self.entries {
            match entry.kind() {
                StatusKind::Pending => stats.pending += 1,
                StatusKind::Processing => stats.processing += 1,
                StatusKind::Done => stats.done += 1,
                StatusKind::Error => stats.failed += 1,
            }
        }
        stats
    }

    fn position(&self, id: EntryId) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResultPayload;

    fn file(name: &str, size: usize) -> SourceFile {
        SourceFile::new(name, vec![0u8; size])
    }

    fn processing() -> EntryStatus {
        EntryStatus::Processing {
            started_at: Utc::now(),
        }
    }

    fn done(name: &str) -> EntryStatus {
        let now = Utc::now();
        EntryStatus::Done {
            started_at: now,
            finished_at: now,
            result: ResultPayload::named(name, vec![1u8]),
        }
    }

    #[test]
    fn add_files_preserves_concatenated_order() {
        let mut store = FileQueueStore::new();
        store.add_files([file("a.png", 100), file("b.png", 200)]);
        store.add_files([file("c.png", 50)]);
        store.add_files(Vec::new());

        let names: Vec<&str> = store.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["a.png", "b.png", "c.png"]);
        assert!(store.entries().iter().all(|e| e.kind() == StatusKind::Pending));
        assert_eq!(store.entries()[1].size_bytes, 200);
    }

    #[test]
    fn ids_are_unique() {
        let mut store = FileQueueStore::new();
        let ids = store.add_files((0..200).map(|i| file(&format!("{i}.bin"), 1)));
        let mut sorted = ids.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), ids.len());
    }

    #[test]
    fn remove_is_noop_for_unknown_id() {
        let mut store = FileQueueStore::new();
        store.add_files([file("a.png", 1)]);
        assert_eq!(store.remove_file(EntryId::new()), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn processing_entries_are_reported_and_removable() {
        let mut store = FileQueueStore::new();
        let ids = store.add_files([file("a.png", 1), file("b.png", 1), file("c.png", 1)]);
        assert_eq!(store.processing_id(), None);

        store.update_status(ids[1], processing()).unwrap();
        assert_eq!(store.processing_id(), Some(ids[1]));

        let removed = store.remove_file(ids[1]).unwrap();
        assert_eq!(removed.name, "b.png");
        assert_eq!(store.processing_id(), None);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn clear_removes_every_entry() {
        let mut store = FileQueueStore::new();
        let ids = store.add_files([file("a.png", 1), file("b.png", 1), file("c.png", 1)]);
        store.update_status(ids[0], processing()).unwrap();
        store.update_status(ids[0], done("A.PNG")).unwrap();
        store.update_status(ids[1], processing()).unwrap();

        assert_eq!(store.clear(), 3);
        assert!(store.is_empty());
        assert_eq!(store.clear(), 0);
    }

    #[test]
    fn transitions_are_one_directional() {
        let mut store = FileQueueStore::new();
        let id = store.add_files([file("a.png", 1)])[0];

        let err = store.update_status(id, done("x")).unwrap_err();
        assert_eq!(
            err,
            QueueError::InvalidTransition {
                id,
                from: StatusKind::Pending,
                to: StatusKind::Done,
            }
        );

        assert_eq!(store.update_status(id, processing()), Ok(StatusKind::Pending));
        assert_eq!(store.update_status(id, processing()), Ok(StatusKind::Processing));
        assert_eq!(store.update_status(id, done("A")), Ok(StatusKind::Processing));

        assert!(store.update_status(id, processing()).is_err());
        assert!(store.update_status(id, EntryStatus::Pending).is_err());

        let unknown = EntryId::new();
        assert_eq!(
            store.update_status(unknown, processing()),
            Err(QueueError::EntryNotFound(unknown))
        );
    }

    #[test]
    fn eligible_ids_include_leftover_processing() {
        let mut store = FileQueueStore::new();
        let ids = store.add_files([file("a", 1), file("b", 1), file("c", 1)]);
        store.update_status(ids[0], processing()).unwrap();
        store.update_status(ids[0], done("A")).unwrap();
        store.update_status(ids[1], processing()).unwrap();

        assert_eq!(store.eligible_ids(), vec![ids[1], ids[2]]);

        let stats = store.stats();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.processing, 1);
        assert_eq!(stats.done, 1);
        assert_eq!(stats.total(), 3);
        assert_eq!(stats.success_rate(), Some(100.0));
        assert_eq!(store.done_entries().count(), 1);
    }
}

//! JSON-file record store: one file per dataset, fully rewritten on every upsert.
//!
//! The in-memory mapping is the source of truth while a run is in progress; the
//! file on disk always holds a complete snapshot as of the last successful
//! [`RecordStore::upsert`]. A file that cannot be parsed is moved aside to
//! `<name>.bak.<timestamp>` and the store starts empty.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;
use crate::models::Record;

/// What a store needs to know about the values it holds.
pub trait StoredRecord: Serialize + DeserializeOwned + Clone {
    fn identity(&self) -> &str;
    fn is_complete(&self) -> bool;
}

impl StoredRecord for Record {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn is_complete(&self) -> bool {
        Record::is_complete(self)
    }
}

/// Result of reading the backing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// No file yet; the store starts empty.
    Missing,
    /// The file parsed; this many distinct records were loaded.
    Loaded(usize),
    /// The file was unreadable and has been moved to `backup`.
    Recovered { backup: PathBuf, reason: String },
}

pub struct RecordStore<R: StoredRecord = Record> {
    path: PathBuf,
    records: Vec<R>,
    index: HashMap<String, usize>,
    last_load: LoadOutcome,
}

impl<R: StoredRecord> RecordStore<R> {
    /// Open the store backed by `path`, creating its directory if needed.
    ///
    /// A malformed file never fails the call; it is quarantined and the store
    /// starts empty. Errors are returned only when the directory cannot be
    /// created or the corrupt file cannot be moved aside.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut store = Self {
            path,
            records: Vec::new(),
            index: HashMap::new(),
            last_load: LoadOutcome::Missing,
        };
        store.load()?;
        Ok(store)
    }

    /// Re-read the backing file, replacing the in-memory mapping.
    pub fn load(&mut self) -> Result<&LoadOutcome> {
        self.records.clear();
        self.index.clear();

        self.last_load = if !self.path.exists() {
            LoadOutcome::Missing
        } else {
            match read_records::<R>(&self.path) {
                Ok(records) => {
                    for record in records {
                        self.insert(record);
                    }
                    tracing::info!(
                        path = %self.path.display(),
                        records = self.records.len(),
                        "loaded existing records"
                    );
                    LoadOutcome::Loaded(self.records.len())
                }
                Err(err) => {
                    let reason = err.to_string();
                    tracing::error!(
                        path = %self.path.display(),
                        error = %reason,
                        "failed to load existing records"
                    );
                    let backup = quarantine(&self.path)?;
                    tracing::info!(backup = %backup.display(), "created backup of unreadable store");
                    LoadOutcome::Recovered { backup, reason }
                }
            }
        };

        Ok(&self.last_load)
    }

    pub fn last_load(&self) -> &LoadOutcome {
        &self.last_load
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn has(&self, identity: &str) -> bool {
        self.index.contains_key(identity)
    }

    /// `true` only when a record exists under `identity` and is complete.
    pub fn is_complete(&self, identity: &str) -> bool {
        self.get(identity).is_some_and(StoredRecord::is_complete)
    }

    pub fn get(&self, identity: &str) -> Option<&R> {
        self.index.get(identity).map(|&i| &self.records[i])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in first-insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &R> {
        self.records.iter()
    }

    /// Records still worth re-processing.
    pub fn incomplete(&self) -> impl Iterator<Item = &R> {
        self.records.iter().filter(|r| !r.is_complete())
    }

    /// Insert or replace the record under its identity, then rewrite the whole
    /// file. When this returns `Ok`, the file on disk reflects the update; when
    /// it returns `Err`, the in-memory mapping is left as it was before the call.
    pub fn upsert(&mut self, record: R) -> Result<()> {
        let identity = record.identity().to_string();
        let previous = self.insert(record);
        if let Err(err) = self.save() {
            self.restore(&identity, previous);
            return Err(err);
        }
        Ok(())
    }

    /// Returns the record that was replaced, `None` for a new identity.
    fn insert(&mut self, record: R) -> Option<R> {
        match self.index.get(record.identity()) {
            Some(&i) => Some(std::mem::replace(&mut self.records[i], record)),
            None => {
                self.index
                    .insert(record.identity().to_string(), self.records.len());
                self.records.push(record);
                None
            }
        }
    }

    fn restore(&mut self, identity: &str, previous: Option<R>) {
        match previous {
            Some(old) => {
                if let Some(&i) = self.index.get(identity) {
                    self.records[i] = old;
                }
            }
            None => {
                if self.index.remove(identity).is_some() {
                    self.records.pop();
                }
            }
        }
    }

    /// Serialize to a sibling temp file, flush it to disk, then rename it over
    /// the dataset file.
    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_vec_pretty(&self.records)?;
        let tmp = sibling_with_suffix(&self.path, ".tmp");
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        if let Err(err) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }
        tracing::debug!(path = %self.path.display(), records = self.records.len(), "saved store");
        Ok(())
    }
}

impl RecordStore<Record> {
    /// Fill missing fields of the stored record (or start from `record` when
    /// none exists) and persist the result.
    pub fn merge_upsert(&mut self, record: Record) -> Result<Vec<&'static str>> {
        let (merged, changed) = match self.get(&record.identity) {
            Some(existing) => {
                let mut merged = existing.clone();
                let changed = merged.merge(record.into());
                (merged, changed)
            }
            None => (record, vec!["identity"]),
        };
        self.upsert(merged)?;
        Ok(changed)
    }

    /// Records carrying the given venue/journal tag.
    pub fn with_provenance<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Record> + 'a {
        self.records
            .iter()
            .filter(move |r| r.provenance.as_deref() == Some(tag))
    }
}

fn read_records<R: DeserializeOwned>(path: &Path) -> Result<Vec<R>> {
    let contents = fs::read(path)?;
    Ok(serde_json::from_slice(&contents)?)
}

/// Move an unreadable file to `<name>.bak.<YYYYmmdd_HHMMSS>`, adding a numeric
/// suffix if that name is taken.
fn quarantine(path: &Path) -> Result<PathBuf> {
    let stamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
    let base = sibling_with_suffix(path, &format!(".bak.{stamp}"));
    let mut backup = base.clone();
    let mut n = 1;
    while backup.exists() {
        backup = sibling_with_suffix(&base, &format!(".{n}"));
        n += 1;
    }
    fs::rename(path, &backup)?;
    Ok(backup)
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(identity: &str, title: &str) -> Record {
        Record::new(identity, title).with_authors(["Kaiming He", "Xiangyu Zhang"])
    }

    fn complete(identity: &str) -> Record {
        let mut r = record(identity, "Complete Paper");
        r.abstract_text = Some("An abstract.".to_string());
        r.primary_link = Some(format!("https://venue.org/{identity}"));
        r
    }

    fn backups_in(dir: &Path) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.to_string_lossy().contains(".bak."))
            .collect()
    }

    #[test]
    fn test_open_creates_directory() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("dataset").join("iros24.json");
        let store: RecordStore = RecordStore::open(&path).unwrap();
        assert!(path.parent().unwrap().is_dir());
        assert!(store.is_empty());
        assert_eq!(store.last_load(), &LoadOutcome::Missing);
        assert!(!path.exists());
    }

    #[test]
    fn test_upsert_persists_immediately() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cvpr25.json");
        let mut store: RecordStore = RecordStore::open(&path).unwrap();
        store.upsert(record("a", "Paper A")).unwrap();

        let reopened: RecordStore = RecordStore::open(&path).unwrap();
        assert_eq!(reopened.last_load(), &LoadOutcome::Loaded(1));
        assert_eq!(reopened.get("a").unwrap().title, "Paper A");
        assert!(!sibling_with_suffix(&path, ".tmp").exists());
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("acl25.json");
        let mut store: RecordStore = RecordStore::open(&path).unwrap();

        store.upsert(complete("x")).unwrap();
        let once = fs::read(&path).unwrap();
        store.upsert(complete("x")).unwrap();
        let twice = fs::read(&path).unwrap();

        assert_eq!(once, twice);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_identity_uniqueness() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("eccv24.json");
        let mut store: RecordStore = RecordStore::open(&path).unwrap();

        for (i, id) in ["a", "b", "a", "c", "b", "a"].iter().enumerate() {
            store.upsert(record(id, &format!("v{i}"))).unwrap();
        }

        assert_eq!(store.len(), 3);
        assert_eq!(store.get("a").unwrap().title, "v5");

        let ids: Vec<_> = store.iter().map(|r| r.identity.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let reopened: RecordStore = RecordStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 3);
    }

    #[test]
    fn test_is_complete_is_stricter_than_has() {
        let dir = TempDir::new().unwrap();
        let mut store: RecordStore = RecordStore::open(dir.path().join("s.json")).unwrap();
        store.upsert(record("partial", "P")).unwrap();
        store.upsert(complete("done")).unwrap();

        assert!(store.has("partial"));
        assert!(!store.is_complete("partial"));
        assert!(store.is_complete("done"));
        assert!(!store.has("missing"));
        assert!(!store.is_complete("missing"));

        let incomplete: Vec<_> = store.incomplete().map(|r| r.identity.clone()).collect();
        assert_eq!(incomplete, vec!["partial"]);
    }

    #[test]
    fn test_corrupt_file_is_backed_up_and_reset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nature21.json");
        let original = b"[{\"identity\": \"a\", \"title\": ".to_vec();
        fs::write(&path, &original).unwrap();

        let store: RecordStore = RecordStore::open(&path).unwrap();
        assert!(store.is_empty());
        assert!(!path.exists());

        let backups = backups_in(dir.path());
        assert_eq!(backups.len(), 1);
        assert_eq!(fs::read(&backups[0]).unwrap(), original);
        match store.last_load() {
            LoadOutcome::Recovered { backup, .. } => assert_eq!(backup, &backups[0]),
            other => panic!("unexpected load outcome: {other:?}"),
        }
    }

    #[test]
    fn test_wrong_shape_counts_as_corruption() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("quantum24.json");
        fs::write(&path, r#"{"not": "a list"}"#).unwrap();

        let mut store: RecordStore = RecordStore::open(&path).unwrap();
        assert!(store.is_empty());
        assert_eq!(backups_in(dir.path()).len(), 1);

        store.upsert(record("fresh", "Fresh start")).unwrap();
        let reopened: RecordStore = RecordStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn test_repeated_corruption_keeps_distinct_backups() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pharm.json");

        fs::write(&path, "garbage one").unwrap();
        let _first: RecordStore = RecordStore::open(&path).unwrap();
        fs::write(&path, "garbage two").unwrap();
        let _second: RecordStore = RecordStore::open(&path).unwrap();

        let mut contents: Vec<_> = backups_in(dir.path())
            .iter()
            .map(|p| fs::read_to_string(p).unwrap())
            .collect();
        contents.sort();
        assert_eq!(contents, vec!["garbage one", "garbage two"]);
    }

    #[test]
    fn test_duplicate_identities_in_file_collapse() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dup.json");
        let mut first = record("a", "old");
        first.provenance = Some("ICRA".to_string());
        let second = record("a", "new");
        fs::write(&path, serde_json::to_string(&vec![first, second]).unwrap()).unwrap();

        let store: RecordStore = RecordStore::open(&path).unwrap();
        assert_eq!(store.last_load(), &LoadOutcome::Loaded(1));
        assert_eq!(store.get("a").unwrap().title, "new");
    }

    #[test]
    fn test_merge_upsert_fills_missing_fields() {
        let dir = TempDir::new().unwrap();
        let mut store: RecordStore = RecordStore::open(dir.path().join("m.json")).unwrap();
        store.upsert(record("a", "Paper A")).unwrap();

        let mut update = Record::new("a", "Ignored Title");
        update.abstract_text = Some("Found later.".to_string());
        update.pdf_link = Some("https://arxiv.org/pdf/1512.03385".to_string());
        let changed = store.merge_upsert(update).unwrap();

        assert_eq!(changed, vec!["abstract_text", "pdf_link"]);
        let stored = store.get("a").unwrap();
        assert_eq!(stored.title, "Paper A");
        assert!(stored.is_complete());
    }

    #[test]
    fn test_with_provenance() {
        let dir = TempDir::new().unwrap();
        let mut store: RecordStore = RecordStore::open(dir.path().join("j.json")).unwrap();
        let mut a = record("a", "A");
        a.provenance = Some("Nature".to_string());
        let mut b = record("b", "B");
        b.provenance = Some("Science".to_string());
        store.upsert(a).unwrap();
        store.upsert(b).unwrap();

        let nature: Vec<_> = store.with_provenance("Nature").collect();
        assert_eq!(nature.len(), 1);
        assert_eq!(nature[0].identity, "a");
    }

    #[cfg(unix)]
    #[test]
    fn test_save_failure_propagates() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let sub = dir.path().join("ro");
        fs::create_dir_all(&sub).unwrap();
        let mut store: RecordStore = RecordStore::open(sub.join("s.json")).unwrap();

        fs::set_permissions(&sub, fs::Permissions::from_mode(0o500)).unwrap();
        let marker = sub.join("marker");
        let writable = File::create(&marker).is_ok();
        let result = store.upsert(record("a", "A"));
        fs::set_permissions(&sub, fs::Permissions::from_mode(0o700)).unwrap();

        // Running as root ignores directory permissions.
        if !writable {
            assert!(result.is_err());
        }
    }

    #[test]
    fn test_failed_upsert_leaves_memory_unchanged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("icra24.json");
        let mut store: RecordStore = RecordStore::open(&path).unwrap();
        store.upsert(record("a", "Paper A")).unwrap();

        // A non-empty directory in place of the dataset file makes the final
        // rename fail regardless of the user's privileges.
        fs::remove_file(&path).unwrap();
        fs::create_dir_all(path.join("occupied")).unwrap();

        assert!(store.upsert(complete("b")).is_err());
        assert!(!store.has("b"));
        assert!(!store.is_complete("b"));
        assert_eq!(store.len(), 1);

        assert!(store.upsert(complete("a")).is_err());
        assert!(!store.is_complete("a"));
        assert_eq!(store.get("a").unwrap().title, "Paper A");
        assert!(!sibling_with_suffix(&path, ".tmp").exists());
    }
}

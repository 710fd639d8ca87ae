use std::collections::HashMap;
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::StoreError;
use crate::log::{LinkJournal, LinkLog, LinkRecord, NullJournal};

/// Thread-safe key -> destination URL table backed by an append-only journal.
///
/// The table and the journal sit behind one `RwLock`: lookups share the read
/// side, while `set` holds the write side across the journal append and the
/// table update. A value is therefore never visible to readers before it has
/// been written to the journal, and a failed append leaves the table as it was.
///
/// A `LinkStore` only exists once loaded; `close` consumes it.
pub struct LinkStore {
    inner: RwLock<Inner>,
}

struct Inner {
    links: HashMap<String, String>,
    journal: Box<dyn LinkJournal>,
}

impl LinkStore {
    /// Read the links file at `path` into memory and keep it open for appends.
    ///
    /// Later lines for the same key replace earlier ones. Fails with
    /// `StoreError::Io` if the file cannot be opened or read, and with
    /// `StoreError::InvalidRecord` on the first line that is not `key,url`.
    /// On failure the file handle is released and no store is returned.
    pub fn load<P: AsRef<Path>>(path: P, sync: bool) -> Result<Self, StoreError> {
        let mut log = LinkLog::open(path, sync)?;

        let mut links = HashMap::new();
        let records = log.replay(|record| {
            links.insert(record.key, record.url);
        })?;

        tracing::info!(
            "Loaded {} link(s) from {} ({} record(s))",
            links.len(),
            log.path().display(),
            records
        );

        Ok(Self::with_journal(links, log))
    }

    /// A store with no backing file. Nothing survives the process.
    pub fn in_memory() -> Self {
        Self::with_journal(HashMap::new(), NullJournal)
    }

    pub(crate) fn with_journal(
        links: HashMap<String, String>,
        journal: impl LinkJournal + 'static,
    ) -> Self {
        Self {
            inner: RwLock::new(Inner {
                links,
                journal: Box::new(journal),
            }),
        }
    }

    /// Look up a key. Returns a clone of the destination URL if present.
    pub fn get(&self, key: &str) -> Option<String> {
        self.read().links.get(key).cloned()
    }

    /// Append `key,url` to the journal, then map `key` to `url` in memory.
    pub fn set(&self, key: impl Into<String>, url: impl Into<String>) -> Result<(), StoreError> {
        let record = LinkRecord::new(key, url);

        let mut inner = self.write();
        inner.journal.append(&record)?;
        tracing::debug!("Saved link '{}' -> {}", record.key, record.url);
        inner.links.insert(record.key, record.url);

        Ok(())
    }

    /// Number of distinct keys currently mapped.
    pub fn len(&self) -> usize {
        self.read().links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().links.is_empty()
    }

    /// Release the journal. Called once at shutdown.
    pub fn close(self) {
        let mut inner = self.inner.into_inner().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = inner.journal.close() {
            tracing::warn!("Failed to close links journal: {}", e);
        }
    }

    // The table is only touched after a successful append, so a panic while
    // the lock is held cannot leave it half-updated.
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io;
    use std::path::PathBuf;
    use std::sync::{mpsc, Arc};
    use std::thread;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    struct FailingJournal;

    impl LinkJournal for FailingJournal {
        fn append(&mut self, _record: &LinkRecord) -> Result<(), StoreError> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full").into())
        }
    }

    fn links_file(contents: &str) -> (TempDir, PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("links.csv");
        fs::write(&path, contents).unwrap();
        (dir, path)
    }

    fn lines_for(path: &Path, key: &str) -> usize {
        let prefix = format!("{key},");
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .filter(|l| l.starts_with(&prefix))
            .count()
    }

    #[test]
    fn empty_file_has_no_links() {
        let (_dir, path) = links_file("");
        let store = LinkStore::load(&path, true).unwrap();

        assert!(store.is_empty());
        assert_eq!(store.get("x"), None);
    }

    #[test]
    fn loads_existing_record() {
        let (_dir, path) = links_file("a,http://example.com");
        let store = LinkStore::load(&path, true).unwrap();

        assert_eq!(store.get("a").as_deref(), Some("http://example.com"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn set_is_visible_and_persisted() {
        let (_dir, path) = links_file("a,http://example.com");
        let store = LinkStore::load(&path, true).unwrap();

        store.set("b", "http://foo").unwrap();
        assert_eq!(store.get("b").as_deref(), Some("http://foo"));
        store.close();

        assert_eq!(lines_for(&path, "a"), 1);
        assert_eq!(lines_for(&path, "b"), 1);

        let reopened = LinkStore::load(&path, true).unwrap();
        assert_eq!(reopened.get("a").as_deref(), Some("http://example.com"));
        assert_eq!(reopened.get("b").as_deref(), Some("http://foo"));
    }

    #[test]
    fn repeated_set_keeps_history_on_disk() {
        let (_dir, path) = links_file("");
        let store = LinkStore::load(&path, true).unwrap();

        store.set("a", "http://bar").unwrap();
        store.set("a", "http://baz").unwrap();
        assert_eq!(store.get("a").as_deref(), Some("http://baz"));
        assert_eq!(store.len(), 1);
        store.close();

        assert_eq!(lines_for(&path, "a"), 2);
    }

    #[test]
    fn last_write_wins_after_restart() {
        let (_dir, path) = links_file("a,http://old\nb,http://b0\n");
        let writes = [
            ("a", "http://a1"),
            ("c", "http://c1"),
            ("b", "http://b1"),
            ("a", "http://a2"),
            ("c", "http://c2"),
            ("d", "http://d1"),
        ];

        let store = LinkStore::load(&path, false).unwrap();
        for (k, v) in writes {
            store.set(k, v).unwrap();
        }
        store.close();

        let mut expected = HashMap::new();
        for (k, v) in writes {
            expected.insert(k, v);
        }

        let store = LinkStore::load(&path, false).unwrap();
        assert_eq!(store.len(), expected.len());
        for (k, v) in expected {
            assert_eq!(store.get(k).as_deref(), Some(v), "key {k}");
        }
    }

    #[test]
    fn rejects_malformed_lines() {
        for contents in ["a,http://ok\nnocomma\n", "a,http://x,y"] {
            let (_dir, path) = links_file(contents);
            let err = LinkStore::load(&path, true).err().unwrap();
            assert!(
                matches!(err, StoreError::InvalidRecord { .. }),
                "{contents:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn loads_records_that_are_not_utf8() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("links.csv");
        fs::write(&path, b"a,http://x/caf\xe9").unwrap();

        let store = LinkStore::load(&path, true).unwrap();
        assert_eq!(store.get("a").as_deref(), Some("http://x/caf\u{FFFD}"));
    }

    #[test]
    fn load_can_be_retried_after_fixing_the_file() {
        let (_dir, path) = links_file("bad line");
        assert!(LinkStore::load(&path, true).is_err());

        fs::write(&path, "good,http://example.com").unwrap();
        let store = LinkStore::load(&path, true).unwrap();
        assert_eq!(store.get("good").as_deref(), Some("http://example.com"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = LinkStore::load(dir.path().join("nope.csv"), true).err().unwrap();
        assert!(matches!(err, StoreError::Io(_)));
    }

    #[test]
    fn failed_append_leaves_table_unchanged() {
        let mut links = HashMap::new();
        links.insert("a".to_owned(), "http://before".to_owned());
        let store = LinkStore::with_journal(links, FailingJournal);

        assert!(matches!(store.set("a", "http://after"), Err(StoreError::Io(_))));
        assert!(store.set("new", "http://never").is_err());

        assert_eq!(store.get("a").as_deref(), Some("http://before"));
        assert_eq!(store.get("new"), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn readers_do_not_block_each_other() {
        let store = Arc::new(LinkStore::in_memory());
        store.set("k", "http://v").unwrap();

        let _held = store.read();
        let (tx, rx) = mpsc::channel();
        let reader = Arc::clone(&store);
        thread::spawn(move || {
            let _ = tx.send(reader.get("k"));
        });

        let got = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(got.as_deref(), Some("http://v"));
    }

    #[test]
    fn concurrent_readers_only_see_written_values() {
        let store = LinkStore::in_memory();
        let keys = ["a", "b", "c"];

        thread::scope(|s| {
            for w in 0..4 {
                let store = &store;
                s.spawn(move || {
                    for i in 0..200 {
                        let key = keys[i % keys.len()];
                        store.set(key, format!("http://{key}/{w}/{i}")).unwrap();
                    }
                });
            }
            for _ in 0..4 {
                let store = &store;
                s.spawn(move || {
                    for i in 0..1000 {
                        let key = keys[i % keys.len()];
                        if let Some(url) = store.get(key) {
                            assert!(url.starts_with(&format!("http://{key}/")), "{url}");
                        }
                    }
                });
            }
        });

        assert_eq!(store.len(), keys.len());
    }
}

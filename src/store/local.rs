use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use super::exchange::ConversationExchange;

/// Durable per-user conversation files
///
/// Each user has one JSON array, newest first, capped at `capacity`. Files
/// are named by a SHA-256 of the user id, so every id maps to its own file
/// whatever characters it contains.
/// Writes go through a temp file and a rename so a crash never leaves a
/// half-written file behind.
pub struct LocalStore {
    dir: PathBuf,
    capacity: usize,
    // Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            dir: dir.into(),
            capacity: capacity.max(1),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn path_for(&self, user_id: &str) -> PathBuf {
        let digest = Sha256::digest(user_id.as_bytes());
        self.dir.join(format!("conversations_{:x}.json", digest))
    }

    /// Stored exchanges, newest first; missing or corrupt files read as empty
    pub fn load(&self, user_id: &str) -> Vec<ConversationExchange> {
        let mut records = self.read_file(user_id);
        records.retain(|r| r.user_id == user_id);
        records
    }

    fn read_file(&self, user_id: &str) -> Vec<ConversationExchange> {
        let path = self.path_for(user_id);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                return Vec::new();
            }
        };

        match serde_json::from_str(&text) {
            Ok(records) => records,
            Err(e) => {
                warn!("Ignoring corrupt conversation file {}: {}", path.display(), e);
                Vec::new()
            }
        }
    }

    /// Prepend one exchange
    pub fn save(&self, exchange: &ConversationExchange) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut records = self.load(&exchange.user_id);
        records.retain(|r| r.id != exchange.id);
        records.insert(0, exchange.clone());
        self.write(&exchange.user_id, &mut records)
    }

    /// Record the remote id for a locally stored exchange
    pub fn mark_remote(&self, user_id: &str, local_id: &str, remote_id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut records = self.load(user_id);
        let Some(record) = records.iter_mut().find(|r| r.id == local_id) else {
            return Ok(false);
        };
        record.remote_id = Some(remote_id.to_string());
        self.write(user_id, &mut records)?;
        Ok(true)
    }

    /// Merge remote records into the local file, skipping ones already present
    ///
    /// A remote record matches a local one by remote id, or by local id when
    /// the remote copy was written from this device.
    pub fn mirror(&self, user_id: &str, remote: &[ConversationExchange]) -> Result<usize> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut records = self.load(user_id);
        let known_remote: HashSet<String> =
            records.iter().filter_map(|r| r.remote_id.clone()).collect();

        let mut added = 0;
        for incoming in remote {
            let Some(remote_id) = &incoming.remote_id else {
                continue;
            };
            if incoming.user_id != user_id {
                continue;
            }
            if known_remote.contains(remote_id) {
                continue;
            }
            if let Some(existing) = records.iter_mut().find(|r| r.id == incoming.id) {
                existing.remote_id = Some(remote_id.clone());
                continue;
            }
            records.push(incoming.clone());
            added += 1;
        }

        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        self.write(user_id, &mut records)?;
        debug!("Mirrored {} remote exchanges for {}", added, user_id);
        Ok(added)
    }

    fn write(&self, user_id: &str, records: &mut Vec<ConversationExchange>) -> Result<()> {
        records.truncate(self.capacity);

        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;

        let path = self.path_for(user_id);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(records).context("Failed to serialize conversations")?;

        fs::write(&tmp, body).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Origin;

    fn exchange(user: &str, text: &str) -> ConversationExchange {
        ConversationExchange::new(user, text, "reply", "neutral", None)
    }

    #[test]
    fn test_save_prepends_and_caps() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path(), 100);

        for i in 0..105 {
            store.save(&exchange("u1", &format!("msg {}", i))).unwrap();
        }

        let records = store.load("u1");
        assert_eq!(records.len(), 100);
        assert_eq!(records[0].transcript, "msg 104");
        assert_eq!(records[99].transcript, "msg 5");
    }

    #[test]
    fn test_corrupt_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path(), 10);
        fs::write(store.path_for("u1"), "{not json").unwrap();

        assert!(store.load("u1").is_empty());

        // Writing over the corrupt file recovers it
        store.save(&exchange("u1", "hello")).unwrap();
        assert_eq!(store.load("u1").len(), 1);
    }

    #[test]
    fn test_users_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path(), 10);
        store.save(&exchange("alice", "a")).unwrap();
        store.save(&exchange("bob", "b")).unwrap();

        assert_eq!(store.load("alice")[0].transcript, "a");
        assert_eq!(store.load("bob")[0].transcript, "b");
        assert!(store.load("carol").is_empty());
    }

    #[test]
    fn test_ids_differing_by_punctuation_do_not_share_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path(), 10);
        store.save(&exchange("alice.smith", "my secret")).unwrap();

        assert!(store.load("alice_smith").is_empty());
        assert!(store.load("alice/smith").is_empty());
        assert_ne!(store.path_for("alice.smith"), store.path_for("alice_smith"));

        store.save(&exchange("alice_smith", "someone else")).unwrap();
        let records = store.load("alice.smith");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].transcript, "my secret");
    }

    #[test]
    fn test_load_ignores_records_of_other_users() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path(), 10);
        let stray = exchange("mallory", "not yours");
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(store.path_for("u1"), serde_json::to_vec(&vec![stray]).unwrap()).unwrap();

        assert!(store.load("u1").is_empty());
    }

    #[test]
    fn test_mark_remote_and_mirror_dedupe() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::new(dir.path(), 10);

        let local = exchange("u1", "first");
        store.save(&local).unwrap();
        assert!(store.mark_remote("u1", &local.id, "doc-1").unwrap());

        let mut same = local.clone();
        same.remote_id = Some("doc-1".to_string());
        same.origin = Origin::Remote;
        let mut other = exchange("u1", "from another device");
        other.remote_id = Some("doc-2".to_string());
        other.origin = Origin::Remote;

        let added = store.mirror("u1", &[same, other.clone()]).unwrap();
        assert_eq!(added, 1);

        // Mirroring again adds nothing
        assert_eq!(store.mirror("u1", &[other]).unwrap(), 0);
        assert_eq!(store.load("u1").len(), 2);
    }
}

//! Session Management
//!
//! Sessions (threads) keyed by an opaque string, their persistence, and the
//! per-key locks that serialize turns on the same session.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::message::{Conversation, Message};

/// Opaque session key (e.g. a user's e-mail)
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    /// Random key for anonymous sessions
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Session metadata
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Session title (auto-generated or user-set)
    pub title: Option<String>,

    /// Remote thread backing this session on a run-based service
    #[serde(default)]
    pub thread_id: Option<String>,

    /// Extra key-value metadata
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// A conversation thread
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub key: SessionKey,

    /// Conversation history
    pub conversation: Conversation,

    pub metadata: SessionMetadata,

    pub created_at: DateTime<Utc>,

    /// Last activity timestamp
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(key: SessionKey) -> Self {
        let now = Utc::now();
        Self {
            key,
            conversation: Conversation::new(),
            metadata: SessionMetadata::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create with system prompt
    pub fn with_system_prompt(key: SessionKey, system_prompt: impl Into<String>) -> Self {
        let mut session = Self::new(key);
        session.conversation = Conversation::with_system_prompt(system_prompt);
        session
    }

    /// Append a message
    pub fn push(&mut self, message: Message) {
        self.conversation.push(message);
    }

    /// Update the activity timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Get or generate title
    pub fn title(&self) -> String {
        self.metadata.title.clone().unwrap_or_else(|| {
            self.conversation
                .messages()
                .iter()
                .find(|m| m.role == crate::message::Role::User)
                .map(|m| {
                    let preview: String = m.content.chars().take(50).collect();
                    if m.content.chars().count() > 50 {
                        format!("{}...", preview)
                    } else {
                        preview
                    }
                })
                .unwrap_or_else(|| format!("Session {}", self.key))
        })
    }

    pub fn message_count(&self) -> usize {
        self.conversation.len()
    }
}

/// Durable store of sessions
pub trait ConversationStore: Send + Sync {
    /// Load a session by key
    fn load(&self, key: &SessionKey) -> Result<Option<Session>>;

    /// Insert or replace a session
    fn save(&self, session: &Session) -> Result<()>;

    /// Most recently updated sessions first
    fn list(&self, limit: usize) -> Result<Vec<Session>>;
}

fn poisoned<T>(_: PoisonError<T>) -> AgentError {
    AgentError::Persistence("session store lock poisoned".into())
}

fn most_recent<'a>(sessions: impl Iterator<Item = &'a Session>, limit: usize) -> Vec<Session> {
    let mut result: Vec<Session> = sessions.cloned().collect();
    result.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    result.truncate(limit);
    result
}

/// In-memory session store (for development/testing)
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionKey, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationStore for MemorySessionStore {
    fn load(&self, key: &SessionKey) -> Result<Option<Session>> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(sessions.get(key).cloned())
    }

    fn save(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        sessions.insert(session.key.clone(), session.clone());
        Ok(())
    }

    fn list(&self, limit: usize) -> Result<Vec<Session>> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(most_recent(sessions.values(), limit))
    }
}

/// Session store backed by a single JSON file (`key -> session`).
///
/// The file is read once on open; a missing or empty file is an empty
/// mapping. Every save rewrites the whole mapping to a temp file in the same
/// directory and renames it over the original.
pub struct FileSessionStore {
    path: PathBuf,
    sessions: RwLock<BTreeMap<SessionKey, Session>>,
}

impl FileSessionStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let sessions = Self::load_from_disk(&path)?;
        tracing::debug!(path = %path.display(), count = sessions.len(), "Session file loaded");

        Ok(Self {
            path,
            sessions: RwLock::new(sessions),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load_from_disk(path: &Path) -> Result<BTreeMap<SessionKey, Session>> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(AgentError::Persistence(format!(
                    "Failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content).map_err(|e| {
            AgentError::Persistence(format!("Corrupt session file {}: {}", path.display(), e))
        })
    }

    fn flush(&self, sessions: &BTreeMap<SessionKey, Session>) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(|e| {
            AgentError::Persistence(format!("Failed to create {}: {}", dir.display(), e))
        })?;

        let content = serde_json::to_string_pretty(sessions)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)
            .map_err(|e| AgentError::Persistence(format!("Failed to create temp file: {}", e)))?;
        std::io::Write::write_all(&mut tmp, content.as_bytes())
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| AgentError::Persistence(format!("Failed to write session file: {}", e)))?;
        tmp.persist(&self.path).map_err(|e| {
            AgentError::Persistence(format!("Failed to replace {}: {}", self.path.display(), e))
        })?;

        Ok(())
    }
}

impl ConversationStore for FileSessionStore {
    fn load(&self, key: &SessionKey) -> Result<Option<Session>> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(sessions.get(key).cloned())
    }

    fn save(&self, session: &Session) -> Result<()> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        let previous = sessions.insert(session.key.clone(), session.clone());

        if let Err(e) = self.flush(&sessions) {
            // keep the cache consistent with what is on disk
            match previous {
                Some(prev) => sessions.insert(session.key.clone(), prev),
                None => sessions.remove(&session.key),
            };
            return Err(e);
        }

        Ok(())
    }

    fn list(&self, limit: usize) -> Result<Vec<Session>> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        Ok(most_recent(sessions.values(), limit))
    }
}

const LOCK_PRUNE_THRESHOLD: usize = 1024;

/// One async mutex per session key.
///
/// Turns on the same key run one at a time; turns on different keys do not
/// contend.
#[derive(Clone, Default)]
pub struct SessionLocks {
    locks: Arc<Mutex<HashMap<SessionKey, Arc<tokio::sync::Mutex<()>>>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`
    pub async fn acquire(&self, key: &SessionKey) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            if locks.len() >= LOCK_PRUNE_THRESHOLD {
                locks.retain(|_, l| Arc::strong_count(l) > 1);
            }
            locks.entry(key.clone()).or_default().clone()
        };

        lock.lock_owned().await
    }

    /// Number of keys currently tracked
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_session_creation() {
        let session = Session::new(SessionKey::from("ada@example.com"));
        assert_eq!(session.message_count(), 0);
        assert_eq!(session.title(), "Session ada@example.com");
    }

    #[test]
    fn test_memory_store() {
        let store = MemorySessionStore::new();
        let session = Session::with_system_prompt(SessionKey::from("k1"), "be brief");
        let key = session.key.clone();

        store.save(&session).unwrap();

        let loaded = store.load(&key).unwrap();
        assert!(loaded.is_some());
        assert_eq!(loaded.unwrap().message_count(), 1);
        assert!(store.load(&SessionKey::from("other")).unwrap().is_none());
    }

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::open(dir.path().join("threads.json")).unwrap();

        assert!(store.list(10).unwrap().is_empty());
        assert!(store.load(&SessionKey::from("nobody")).unwrap().is_none());
    }

    #[test]
    fn test_file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("threads.json");

        {
            let store = FileSessionStore::open(&path).unwrap();
            let mut session = Session::new(SessionKey::from("ada@example.com"));
            session.metadata.thread_id = Some("thread_abc".into());
            session.push(Message::user("how much did I spend?"));
            store.save(&session).unwrap();
        }

        let reopened = FileSessionStore::open(&path).unwrap();
        let session = reopened.load(&SessionKey::from("ada@example.com")).unwrap().unwrap();
        assert_eq!(session.metadata.thread_id.as_deref(), Some("thread_abc"));
        assert_eq!(session.conversation.messages()[0].content, "how much did I spend?");

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(raw.get("ada@example.com").is_some());
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("threads.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = FileSessionStore::open(&path).err().unwrap();
        assert!(matches!(err, AgentError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_session_locks_serialize_same_key() {
        let locks = SessionLocks::new();
        let key = SessionKey::from("k");

        let guard = locks.acquire(&key).await;

        let contender = {
            let locks = locks.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let _g = locks.acquire(&key).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        // a different key is not blocked
        let _other = locks.acquire(&SessionKey::from("other")).await;

        drop(guard);
        contender.await.unwrap();
        assert_eq!(locks.len(), 2);
    }
}

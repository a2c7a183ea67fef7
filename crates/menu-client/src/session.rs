//! Persisted sign-in state.
//!
//! Nothing is read implicitly: the application calls [`SessionStore::rehydrate`]
//! once at startup, after which `get` serves the in-memory copy.

use crate::error::{ClientError, ClientResult};
use menu_proto::{Session, UserProfile};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Published on the client's watch channel whenever the session changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    SignedOut,
    SignedIn(UserProfile),
}

impl AuthState {
    pub fn from_session(session: Option<&Session>) -> Self {
        match session {
            Some(s) => AuthState::SignedIn(s.user.clone()),
            None => AuthState::SignedOut,
        }
    }
}

pub trait SessionStore: Send + Sync {
    fn get(&self) -> Option<Session>;

    fn set(&self, session: Session) -> ClientResult<()>;

    fn clear(&self) -> ClientResult<()>;

    /// Loads persisted state into memory and returns it.
    fn rehydrate(&self) -> ClientResult<Option<Session>>;

    fn token(&self) -> Option<String> {
        self.get().map(|s| s.token)
    }
}

#[derive(Debug, Default)]
pub struct MemorySessionStore {
    current: RwLock<Option<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: Session) -> Self {
        Self {
            current: RwLock::new(Some(session)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self) -> Option<Session> {
        self.current.read().clone()
    }

    fn set(&self, session: Session) -> ClientResult<()> {
        *self.current.write() = Some(session);
        Ok(())
    }

    fn clear(&self) -> ClientResult<()> {
        *self.current.write() = None;
        Ok(())
    }

    fn rehydrate(&self) -> ClientResult<Option<Session>> {
        Ok(self.get())
    }
}

/// JSON file holding `{token, user}`.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    current: RwLock<Option<Session>>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: RwLock::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self) -> Option<Session> {
        self.current.read().clone()
    }

    fn set(&self, session: Session) -> ClientResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ClientError::Session(e.to_string()))?;
        }
        let body =
            serde_json::to_vec_pretty(&session).map_err(|e| ClientError::Session(e.to_string()))?;
        std::fs::write(&self.path, body).map_err(|e| ClientError::Session(e.to_string()))?;
        debug!(path = %self.path.display(), user = %session.user.email, "Session saved");
        *self.current.write() = Some(session);
        Ok(())
    }

    fn clear(&self) -> ClientResult<()> {
        *self.current.write() = None;
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ClientError::Session(e.to_string())),
        }
    }

    fn rehydrate(&self) -> ClientResult<Option<Session>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                *self.current.write() = None;
                return Ok(None);
            }
            Err(e) => return Err(ClientError::Session(e.to_string())),
        };

        match serde_json::from_slice::<Session>(&bytes) {
            Ok(session) => {
                *self.current.write() = Some(session.clone());
                Ok(Some(session))
            }
            Err(e) => {
                // A corrupt file is treated like a signed-out state.
                warn!(path = %self.path.display(), error = %e, "Discarding unreadable session file");
                self.clear()?;
                Ok(None)
            }
        }
    }
}

//! Process-wide session: bearer token plus the signed-in user.
//!
//! SYSTEM CONTEXT
//! ==============
//! The REST client reads the token for every request and the realtime
//! connection reads the user id on every (re)connect, so both hold the same
//! `Arc<SessionStore>`. The store optionally mirrors itself to a JSON file so
//! a later process starts with the identity written by `login`.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::config::ClientConfig;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("session file {path} is not valid session json: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Account role; decides the landing view and the events a view follows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Customer,
    Agent,
    Admin,
}

impl Role {
    /// Dashboard path for the role.
    #[must_use]
    pub fn landing_path(self) -> &'static str {
        match self {
            Self::Customer => "/customer/dashboard",
            Self::Agent => "/agent/dashboard",
            Self::Admin => "/admin/dashboard",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: Option<String>,
    pub user: Option<SessionUser>,
}

pub struct SessionStore {
    inner: RwLock<Session>,
    file: Option<PathBuf>,
}

impl SessionStore {
    /// In-memory store, optionally persisted to `file` on change.
    #[must_use]
    pub fn new(session: Session, file: Option<PathBuf>) -> Self {
        Self {
            inner: RwLock::new(session),
            file,
        }
    }

    /// Open a store backed by `file`, reading any session already saved there.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the file exists but cannot be read or parsed.
    pub fn open(file: Option<PathBuf>) -> Result<Self, SessionError> {
        let session = match &file {
            Some(path) => read_session_file(path)?,
            None => Session::default(),
        };
        Ok(Self::new(session, file))
    }

    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .token
            .clone()
    }

    #[must_use]
    pub fn user(&self) -> Option<SessionUser> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .user
            .clone()
    }

    /// Id of the signed-in user, if any. Empty ids count as absent.
    #[must_use]
    pub fn user_id(&self) -> Option<String> {
        self.user().map(|u| u.id).filter(|id| !id.is_empty())
    }

    /// Replace the session and persist it.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] when the session file cannot be written.
    /// The in-memory session is updated regardless.
    pub fn set(&self, session: Session) -> Result<(), SessionError> {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = session.clone();
        match &self.file {
            Some(path) => write_session_file(path, &session),
            None => Ok(()),
        }
    }

    /// Forget the session and remove the persisted copy.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] when an existing session file cannot be removed.
    pub fn clear(&self) -> Result<(), SessionError> {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Session::default();
        let Some(path) = &self.file else {
            return Ok(());
        };
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SessionError::Io {
                path: path.clone(),
                source,
            }),
        }
    }
}

/// The process-wide session store, opened from [`ClientConfig::from_env`] on
/// first use. A corrupt session file is logged and treated as signed out.
pub fn store() -> Arc<SessionStore> {
    static STORE: OnceLock<Arc<SessionStore>> = OnceLock::new();
    STORE
        .get_or_init(|| {
            let file = ClientConfig::from_env().session_file;
            let store = SessionStore::open(file.clone()).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "ignoring unreadable session file");
                SessionStore::new(Session::default(), file)
            });
            Arc::new(store)
        })
        .clone()
}

fn read_session_file(path: &Path) -> Result<Session, SessionError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Session::default()),
        Err(source) => {
            return Err(SessionError::Io {
                path: path.to_owned(),
                source,
            });
        }
    };
    serde_json::from_str(&raw).map_err(|source| SessionError::Json {
        path: path.to_owned(),
        source,
    })
}

fn write_session_file(path: &Path, session: &Session) -> Result<(), SessionError> {
    let body = serde_json::to_vec_pretty(session).map_err(|source| SessionError::Json {
        path: path.to_owned(),
        source,
    })?;
    std::fs::write(path, body).map_err(|source| SessionError::Io {
        path: path.to_owned(),
        source,
    })
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

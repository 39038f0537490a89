//! Session - owner of the pipeline store
//!
//! The store is created once per editing session and handed to components by
//! reference. Touching it outside a started session is a wiring bug, so the
//! plain accessors panic instead of returning an empty store.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::store::PipelineStore;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session not started: pipeline store is not initialized")]
    NotStarted,

    #[error("Session already started: {0}")]
    AlreadyStarted(Uuid),
}

#[derive(Default)]
pub struct Session {
    active: Option<ActiveSession>,
}

struct ActiveSession {
    id: Uuid,
    started_at: DateTime<Utc>,
    store: PipelineStore,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, config: &EngineConfig) -> Result<Uuid, SessionError> {
        if let Some(active) = &self.active {
            return Err(SessionError::AlreadyStarted(active.id));
        }
        let id = Uuid::new_v4();
        self.active = Some(ActiveSession {
            id,
            started_at: Utc::now(),
            store: PipelineStore::new(config.reconcile_policy()),
        });
        tracing::info!(session = %id, "session started");
        Ok(id)
    }

    /// Tear down the store. Returns the ended session's id, if any.
    pub fn end(&mut self) -> Option<Uuid> {
        let ended = self.active.take()?;
        tracing::info!(
            session = %ended.id,
            entries = ended.store.entry_count(),
            "session ended"
        );
        Some(ended.id)
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn id(&self) -> Option<Uuid> {
        self.active.as_ref().map(|a| a.id)
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.active.as_ref().map(|a| a.started_at)
    }

    pub fn try_store(&self) -> Result<&PipelineStore, SessionError> {
        self.active.as_ref().map(|a| &a.store).ok_or(SessionError::NotStarted)
    }

    pub fn try_store_mut(&mut self) -> Result<&mut PipelineStore, SessionError> {
        self.active.as_mut().map(|a| &mut a.store).ok_or(SessionError::NotStarted)
    }

    /// # Panics
    /// If the session was never started.
    #[track_caller]
    pub fn store(&self) -> &PipelineStore {
        match self.try_store() {
            Ok(store) => store,
            Err(e) => panic!("{e}"),
        }
    }

    /// # Panics
    /// If the session was never started.
    #[track_caller]
    pub fn store_mut(&mut self) -> &mut PipelineStore {
        match self.try_store_mut() {
            Ok(store) => store,
            Err(e) => panic!("{e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{Artifact, SlotKey};

    #[test]
    fn test_start_write_end() {
        let mut session = Session::new();
        assert!(session.started_at().is_none());
        let before = Utc::now();
        let id = session.start(&EngineConfig::default()).unwrap();
        assert_eq!(session.id(), Some(id));
        assert!(session.started_at().is_some_and(|t| t >= before));

        session.store_mut().write(&SlotKey::new("a", "out"), &Artifact::default());
        assert_eq!(session.store().entry_count(), 1);

        assert_eq!(session.end(), Some(id));
        assert_eq!(session.try_store().err(), Some(SessionError::NotStarted));
        assert!(session.started_at().is_none());
    }

    #[test]
    fn test_double_start_rejected() {
        let mut session = Session::new();
        let id = session.start(&EngineConfig::default()).unwrap();
        assert_eq!(
            session.start(&EngineConfig::default()),
            Err(SessionError::AlreadyStarted(id))
        );
    }

    #[test]
    #[should_panic(expected = "Session not started")]
    fn test_store_access_without_session_aborts() {
        let session = Session::new();
        let _ = session.store().version();
    }
}

//! Live client set
//!
//! Shared by the `/stream` handler (which appends) and the broadcast loop
//! (which sweeps and removes in batches). The mutex guards membership only;
//! sweeps work on a snapshot.

use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::stream::session::ClientSession;

#[derive(Default)]
pub struct ClientSet {
    sessions: Mutex<Vec<Arc<ClientSession>>>,
}

impl ClientSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session, returning the new client count
    pub fn add(&self, session: Arc<ClientSession>) -> usize {
        let mut sessions = self.sessions.lock();
        sessions.push(session);
        sessions.len()
    }

    /// Sessions in registration order
    pub fn snapshot(&self) -> Vec<Arc<ClientSession>> {
        self.sessions.lock().clone()
    }

    /// Remove the given sessions and close them; returns how many were removed
    pub fn remove_all(&self, ids: &[Uuid]) -> usize {
        if ids.is_empty() {
            return 0;
        }

        let removed: Vec<Arc<ClientSession>> = {
            let mut sessions = self.sessions.lock();
            let (gone, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *sessions)
                .into_iter()
                .partition(|s| ids.contains(&s.id()));
            *sessions = kept;
            gone
        };

        for session in &removed {
            session.close();
        }
        removed.len()
    }

    /// Remove and close every session
    pub fn close_all(&self) -> usize {
        let drained = std::mem::take(&mut *self.sessions.lock());
        for session in &drained {
            session.close();
        }
        drained.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

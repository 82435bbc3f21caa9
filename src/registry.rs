//! The table of live sessions, keyed by session ID.
//!
//! The table itself sits behind a plain mutex that's never held across an await. When both a
//! session's lock and the table's lock are needed, the session's is taken first.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use rand::Rng;
use tokio::io::AsyncWrite;

use crate::session::{Delivery, JoinError, LegClosed, Session};

/// Session IDs are drawn from `0..SESSION_ID_SPACE`.
pub const SESSION_ID_SPACE: u16 = 10000;

/// Why a session couldn't be created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// The registry already holds as many sessions as it's allowed to.
    Full,
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "the session registry is full"),
        }
    }
}

/// A failed registry operation, handing back the connection it was given.
pub struct Rejected<E, W> {
    pub error: E,
    pub conn: W,
}

impl<E: fmt::Debug, W> fmt::Debug for Rejected<E, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected").field("error", &self.error).finish_non_exhaustive()
    }
}

pub struct SessionRegistry<W> {
    sessions: Mutex<HashMap<u16, Arc<Session<W>>>>,
    capacity: usize,
    write_timeout: Duration,
}

impl<W: AsyncWrite + Unpin + Send> SessionRegistry<W> {
    /// Creates an empty registry holding at most `capacity` sessions. The capacity can't exceed
    /// the amount of distinct session IDs.
    pub fn new(capacity: usize, write_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            capacity: capacity.min(SESSION_ID_SPACE as usize),
            write_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u16, Arc<Session<W>>>> {
        // Nothing panics while holding this lock in a way that leaves the map inconsistent.
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Creates a session with a fresh random ID, whose host writes to `host`.
    pub fn create(&self, host: W) -> Result<(Arc<Session<W>>, LegClosed), Rejected<RegistryError, W>> {
        let mut sessions = self.lock();

        if sessions.len() >= self.capacity {
            return Err(Rejected {
                error: RegistryError::Full,
                conn: host,
            });
        }

        let mut rng = rand::thread_rng();
        let id = loop {
            let id = rng.gen_range(0..SESSION_ID_SPACE);
            if !sessions.contains_key(&id) {
                break id;
            }
        };

        let (session, closed) = Session::new(id, host, self.write_timeout);
        let session = Arc::new(session);
        sessions.insert(id, Arc::clone(&session));
        Ok((session, closed))
    }

    pub fn exists(&self, id: u16) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn get(&self, id: u16) -> Option<Arc<Session<W>>> {
        self.lock().get(&id).cloned()
    }

    /// Attaches a target writing to `target` to the session `id`, greeting it with a join success
    /// response.
    pub async fn join(&self, id: u16, target: W) -> Result<(Arc<Session<W>>, Delivery, LegClosed), Rejected<JoinError, W>> {
        let session = match self.get(id) {
            Some(session) => session,
            None => {
                return Err(Rejected {
                    error: JoinError::NotFound,
                    conn: target,
                })
            }
        };

        match session.attach_target(target).await {
            Ok((delivery, closed)) => Ok((session, delivery, closed)),
            Err((error, conn)) => Err(Rejected { error, conn }),
        }
    }

    /// Removes the session `id`, if present.
    pub fn remove(&self, id: u16) -> Option<Arc<Session<W>>> {
        self.lock().remove(&id)
    }

    /// Removes `session` if both its legs have left. Returns whether this call removed it.
    ///
    /// Both legs may call this as they finish; only one of them removes the session.
    pub async fn cleanup(&self, session: &Arc<Session<W>>) -> bool {
        let legs = session.lock_legs().await;
        if !legs.is_empty() {
            return false;
        }

        let mut sessions = self.lock();
        match sessions.get(&session.id()) {
            Some(current) if Arc::ptr_eq(current, session) => {
                sessions.remove(&session.id());
                true
            }
            _ => false,
        }
    }
}

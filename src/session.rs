//! A session: the pairing of one host leg with at most one target leg.
//!
//! All changes to which legs are connected, and every write to a leg, happen while holding the
//! session's lock. This makes "mark this leg gone, then tell the peer if it's still there" a single
//! step, so a leg is never notified while it's being torn down itself. Writes are bounded by the
//! configured write timeout, so a stalled peer can't hold the lock forever.
//!
//! A leg whose write fails or times out may have been sent part of a frame, so it's taken out of
//! the session right away. Its [`LegClosed`] fires so its relay loop stops reading.

use std::{fmt, time::Duration};

use tokio::{
    io::AsyncWrite,
    sync::{oneshot, Mutex, MutexGuard},
};
use tracing::{debug, warn};
use tunnel_relay_proto::shared::{ResponseRef, Role};

use crate::utils::{shutdown_connection, write_response};

/// Resolves once a leg is no longer part of its session, whichever way it left.
pub type LegClosed = oneshot::Receiver<()>;

/// A connected leg. Dropping it resolves the leg's [`LegClosed`].
pub(crate) struct Leg<W> {
    writer: W,
    _closed: oneshot::Sender<()>,
}

impl<W> Leg<W> {
    fn new(writer: W) -> (Self, LegClosed) {
        let (sender, receiver) = oneshot::channel();
        let leg = Self {
            writer,
            _closed: sender,
        };
        (leg, receiver)
    }
}

/// The legs of a session. A leg is connected exactly when it's present.
pub(crate) struct Legs<W> {
    host: Option<Leg<W>>,
    target: Option<Leg<W>>,
}

impl<W> Legs<W> {
    fn slot_mut(&mut self, role: Role) -> &mut Option<Leg<W>> {
        match role {
            Role::Host => &mut self.host,
            Role::Target => &mut self.target,
        }
    }

    pub fn is_connected(&self, role: Role) -> bool {
        match role {
            Role::Host => self.host.is_some(),
            Role::Target => self.target.is_some(),
        }
    }

    /// Whether neither leg is connected, meaning the session is done with.
    pub fn is_empty(&self) -> bool {
        self.host.is_none() && self.target.is_none()
    }
}

/// Which legs of a session are connected at a given moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub host_connected: bool,
    pub target_connected: bool,
}

/// What happened to a frame handed to a session for delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// The frame was written to the receiving leg.
    Delivered,

    /// The receiving leg isn't connected, so the frame was dropped.
    Absent,

    /// Writing to the receiving leg failed or timed out, so that leg was taken out of the session.
    Failed,
}

/// What happened when a leg left its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// The leg had already left.
    AlreadyGone,

    /// The leg left and its peer wasn't connected, so nobody was told.
    Alone,

    /// The leg left and its peer was told so.
    PeerNotified,

    /// The leg left, but telling its peer failed.
    PeerUnreachable,
}

/// Why a target couldn't be attached to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinError {
    /// No session with the requested ID exists, or both its legs already left.
    NotFound,

    /// The session already has a target.
    AlreadyJoined,
}

impl fmt::Display for JoinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "no such session"),
            Self::AlreadyJoined => write!(f, "the session already has a target"),
        }
    }
}

pub struct Session<W> {
    id: u16,
    write_timeout: Duration,
    legs: Mutex<Legs<W>>,
}

impl<W> fmt::Debug for Session<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("id", &self.id).finish_non_exhaustive()
    }
}

impl<W: AsyncWrite + Unpin + Send> Session<W> {
    /// Creates a session whose only connected leg is the host writing to `host`.
    pub(crate) fn new(id: u16, host: W, write_timeout: Duration) -> (Self, LegClosed) {
        let (host, closed) = Leg::new(host);
        let session = Self {
            id,
            write_timeout,
            legs: Mutex::new(Legs {
                host: Some(host),
                target: None,
            }),
        };
        (session, closed)
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub(crate) async fn lock_legs(&self) -> MutexGuard<'_, Legs<W>> {
        self.legs.lock().await
    }

    pub async fn status(&self) -> SessionStatus {
        let legs = self.legs.lock().await;
        SessionStatus {
            host_connected: legs.is_connected(Role::Host),
            target_connected: legs.is_connected(Role::Target),
        }
    }

    pub async fn is_connected(&self, role: Role) -> bool {
        self.legs.lock().await.is_connected(role)
    }

    /// Writes `response` to the leg with role `to`, if it's connected.
    pub async fn send_to(&self, to: Role, response: ResponseRef<'_>) -> Delivery {
        let mut legs = self.legs.lock().await;
        self.write_to_leg(&mut legs, to, response).await
    }

    /// Forwards a frame sent by the leg with role `from` to its peer.
    pub async fn relay(&self, from: Role, response: ResponseRef<'_>) -> Delivery {
        self.send_to(from.peer(), response).await
    }

    async fn write_to_leg(&self, legs: &mut Legs<W>, to: Role, response: ResponseRef<'_>) -> Delivery {
        let leg = match legs.slot_mut(to) {
            Some(leg) => leg,
            None => return Delivery::Absent,
        };

        match write_response(&mut leg.writer, response, self.write_timeout).await {
            Ok(()) => Delivery::Delivered,
            Err(error) => {
                warn!(session_id = self.id, "Failed to write to {to}, dropping it from the session: {error}");
                self.evict(legs, to).await;
                Delivery::Failed
            }
        }
    }

    /// Takes out a leg whose stream may hold a partial frame, then tells its peer it left. A peer
    /// that can't be told is taken out too.
    async fn evict(&self, legs: &mut Legs<W>, role: Role) {
        let mut evicted = role;
        loop {
            if let Some(leg) = legs.slot_mut(evicted).take() {
                self.close_leg(leg, evicted).await;
            }

            let peer = match legs.slot_mut(evicted.peer()) {
                Some(peer) => peer,
                None => return,
            };

            let notification = ResponseRef::session_closed_by(evicted, self.id);
            match write_response(&mut peer.writer, notification, self.write_timeout).await {
                Ok(()) => return,
                Err(error) => {
                    debug!(session_id = self.id, "Failed to tell the {} that the {evicted} left: {error}", evicted.peer());
                    evicted = evicted.peer();
                }
            }
        }
    }

    async fn close_leg(&self, mut leg: Leg<W>, role: Role) {
        if let Err(error) = shutdown_connection(&mut leg.writer, self.write_timeout).await {
            debug!(session_id = self.id, "Failed to shut down {role} connection: {error}");
        }
    }

    /// Attaches a target to this session and greets it with a join success response.
    ///
    /// On failure, the target's writer is handed back untouched.
    pub(crate) async fn attach_target(&self, target: W) -> Result<(Delivery, LegClosed), (JoinError, W)> {
        let mut legs = self.legs.lock().await;

        if legs.is_empty() {
            return Err((JoinError::NotFound, target));
        }

        if legs.is_connected(Role::Target) {
            return Err((JoinError::AlreadyJoined, target));
        }

        let (target, closed) = Leg::new(target);
        *legs.slot_mut(Role::Target) = Some(target);
        let delivery = self.write_to_leg(&mut legs, Role::Target, ResponseRef::join_session_success(self.id)).await;
        Ok((delivery, closed))
    }

    /// Marks the leg with role `role` as gone, closes its connection and tells its peer, if still
    /// connected, that this leg left.
    pub async fn leave(&self, role: Role) -> Departure {
        let mut legs = self.legs.lock().await;

        let leg = match legs.slot_mut(role).take() {
            Some(leg) => leg,
            None => return Departure::AlreadyGone,
        };
        self.close_leg(leg, role).await;

        if !legs.is_connected(role.peer()) {
            return Departure::Alone;
        }

        match self.write_to_leg(&mut legs, role.peer(), ResponseRef::session_closed_by(role, self.id)).await {
            Delivery::Delivered => Departure::PeerNotified,
            _ => Departure::PeerUnreachable,
        }
    }
}

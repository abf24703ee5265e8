use tokio::sync::mpsc;
use uuid::Uuid;

use super::ServerEvent;

pub type SessionId = Uuid;

/// Identity bound to a session at handshake (§4.F). `None` identity means
/// anonymous — permitted for read-only public streams only.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    pub user_id: Option<String>,
}

impl SessionIdentity {
    pub fn anonymous() -> Self {
        Self { user_id: None }
    }

    pub fn authenticated(user_id: String) -> Self {
        Self {
            user_id: Some(user_id),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }
}

/// What the broker holds per session: just enough to deliver messages.
/// Bounded channel — a full channel means the session is a slow consumer
/// and gets dropped messages, not a blocked publisher (§4.F
/// "Back-pressure").
pub struct SessionHandle {
    pub id: SessionId,
    tx: mpsc::Sender<ServerEvent>,
}

impl SessionHandle {
    pub fn new(id: SessionId, tx: mpsc::Sender<ServerEvent>) -> Self {
        Self { id, tx }
    }

    pub fn try_send(&self, event: ServerEvent) -> bool {
        self.tx.try_send(event).is_ok()
    }
}

/// Per-connection state tracked by the WebSocket handler task (`ws.rs`),
/// distinct from the broker's bookkeeping copy. Holds the identity and the
/// rooms this connection has explicitly joined (beyond the automatic
/// `nearby-all` membership), so disconnect can tell the broker which rooms
/// to vacate without a reverse index scan on the hot path.
pub struct Session {
    pub id: SessionId,
    pub identity: SessionIdentity,
}

impl Session {
    pub fn new(identity: SessionIdentity) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity,
        }
    }
}

//! Connection capability.
//!
//! The hub talks to clients only through [`Conn`]. [`ChannelConn`] is the
//! implementation used by the WebSocket handler: it pushes frames into a
//! bounded queue drained by the socket writer task.

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::messages::EncodedEvent;

/// Unique identifier of one physical connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnId(Uuid);

impl ConnId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Reasons a frame could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConnError {
    #[error("Connection is closed")]
    Closed,

    #[error("Connection send queue is full")]
    Overflow,
}

/// A bidirectional channel to one client.
pub trait Conn: Send + Sync {
    fn id(&self) -> ConnId;

    /// Authenticated user owning the connection.
    fn user_id(&self) -> u64;

    /// Queue a frame without waiting.
    fn send(&self, event: EncodedEvent) -> Result<(), ConnError>;

    fn close(&self);

    fn is_closed(&self) -> bool;
}

/// [`Conn`] backed by a bounded channel.
///
/// A full queue closes the connection.
pub struct ChannelConn {
    id: ConnId,
    user_id: u64,
    tx: mpsc::Sender<EncodedEvent>,
    closed: CancellationToken,
}

impl ChannelConn {
    /// Create a connection and the receiver its writer task drains.
    pub fn new(user_id: u64, capacity: usize) -> (Arc<Self>, mpsc::Receiver<EncodedEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let conn = Arc::new(Self {
            id: ConnId::new(),
            user_id,
            tx,
            closed: CancellationToken::new(),
        });
        (conn, rx)
    }

    /// Token cancelled when the connection is closed.
    pub fn close_token(&self) -> CancellationToken {
        self.closed.clone()
    }
}

impl Conn for ChannelConn {
    fn id(&self) -> ConnId {
        self.id
    }

    fn user_id(&self) -> u64 {
        self.user_id
    }

    fn send(&self, event: EncodedEvent) -> Result<(), ConnError> {
        if self.closed.is_cancelled() {
            return Err(ConnError::Closed);
        }

        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(
                    conn_id = %self.id,
                    user_id = self.user_id,
                    "Send queue overflow, closing connection"
                );
                self.close();
                Err(ConnError::Overflow)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.close();
                Err(ConnError::Closed)
            }
        }
    }

    fn close(&self) {
        self.closed.cancel();
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

impl fmt::Debug for ChannelConn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelConn")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

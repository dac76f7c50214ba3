//! Outbound channel abstraction between the game core and the transport

use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::ws::protocol::ServerMsg;

/// Capability to push messages to one client
pub trait OutboundChannel: Send + Sync {
    /// Stable id of the underlying connection
    fn id(&self) -> Uuid;
    /// Fire-and-forget send. Returns false if the client is gone.
    fn send(&self, msg: ServerMsg) -> bool;
    fn is_open(&self) -> bool;
}

/// Cheap, cloneable reference to a client's outbound channel
#[derive(Clone)]
pub struct ConnectionHandle(Arc<dyn OutboundChannel>);

impl ConnectionHandle {
    pub fn new<C: OutboundChannel + 'static>(channel: C) -> Self {
        Self(Arc::new(channel))
    }

    pub fn id(&self) -> Uuid {
        self.0.id()
    }

    pub fn send(&self, msg: ServerMsg) -> bool {
        self.0.send(msg)
    }

    pub fn is_open(&self) -> bool {
        self.0.is_open()
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConnectionHandle").field(&self.id()).finish()
    }
}

/// WebSocket-backed channel: a writer task drains the receiver into the socket
pub struct ClientConnection {
    id: Uuid,
    tx: mpsc::UnboundedSender<ServerMsg>,
}

impl ClientConnection {
    pub fn new(id: Uuid) -> (Self, mpsc::UnboundedReceiver<ServerMsg>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id, tx }, rx)
    }
}

impl OutboundChannel for ClientConnection {
    fn id(&self) -> Uuid {
        self.id
    }

    fn send(&self, msg: ServerMsg) -> bool {
        self.tx.send(msg).is_ok()
    }

    fn is_open(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Test helper: a connection handle plus the receiving end of its channel
#[cfg(test)]
pub fn test_connection() -> (ConnectionHandle, mpsc::UnboundedReceiver<ServerMsg>) {
    let (conn, rx) = ClientConnection::new(Uuid::new_v4());
    (ConnectionHandle::new(conn), rx)
}

//! WebSocket transport: wire protocol, outbound channels and sessions

pub mod channel;
pub mod handler;
pub mod protocol;

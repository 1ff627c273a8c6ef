//! WebSocket transport for the presence protocol

pub mod handler;
pub mod protocol;

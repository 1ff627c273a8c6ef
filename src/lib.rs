//! Proximity Space - presence relay and client engine for a shared space
//!
//! The server half relays who is connected and where they stand:
//! - `presence`: roster ownership and fan-out of join/move/leave events
//! - `ws`: the WebSocket transport and wire protocol
//! - `http`: health check and router
//!
//! The client half turns those events into smooth motion and spatial audio:
//! - `client`: local prediction, remote interpolation, stereo mixing and
//!   peer-to-peer call lifecycle

pub mod app;
pub mod client;
pub mod config;
pub mod http;
pub mod presence;
pub mod util;
pub mod ws;

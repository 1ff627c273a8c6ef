//! Server-side presence: roster ownership and fan-out

pub mod broadcaster;
pub mod hub;
pub mod roster;

pub use broadcaster::{Outbox, PresenceBroadcaster};
pub use hub::{PresenceCommand, PresenceHandle, PresenceHub};
pub use roster::{Roster, DEFAULT_WORLD_LIMIT};

//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::presence::{PresenceHandle, PresenceHub};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub presence: PresenceHandle,
}

impl AppState {
    /// Build the state and the presence hub that must be spawned alongside it
    pub fn new(config: Config) -> (Self, PresenceHub) {
        let config = Arc::new(config);

        // The hub is the only owner of the roster
        let (hub, presence) = PresenceHub::new(config.world_limit);

        (Self { config, presence }, hub)
    }
}

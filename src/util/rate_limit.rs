//! Inbound flood protection for WebSocket frames

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;

/// Default position reports accepted per second per connection.
/// Well above the 40/s a throttled client produces.
pub const POS_RATE_LIMIT: u32 = 60;

/// Caps how many frames one connection may push per second.
///
/// Owned by the connection's reader loop. A quota of zero admits one frame
/// per second rather than none.
pub struct ConnectionRateLimiter {
    frames: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    per_second: NonZeroU32,
}

impl ConnectionRateLimiter {
    pub fn new(frames_per_second: u32) -> Self {
        let per_second = NonZeroU32::new(frames_per_second).unwrap_or(NonZeroU32::MIN);
        Self {
            frames: RateLimiter::direct(Quota::per_second(per_second)),
            per_second,
        }
    }

    /// Take one frame from the budget; false means drop the frame
    pub fn check_frame(&self) -> bool {
        self.frames.check().is_ok()
    }

    pub fn frames_per_second(&self) -> u32 {
        self.per_second.get()
    }
}

impl Default for ConnectionRateLimiter {
    fn default() -> Self {
        Self::new(POS_RATE_LIMIT)
    }
}

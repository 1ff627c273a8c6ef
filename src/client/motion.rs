//! Local prediction and remote interpolation

use crate::ws::protocol::Position;

/// Linear speed of the local avatar, world units per second
pub const MOVE_SPEED: f64 = 64.0;

/// Distance under which the local avatar snaps onto its goal
pub const SNAP_THRESHOLD: f64 = 1.0;

/// Fraction of the remaining gap a remote avatar closes per second
pub const INTERP_GAIN: f64 = 5.0;

/// Motion tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionConfig {
    pub move_speed: f64,
    pub snap_threshold: f64,
    pub interp_gain: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            move_speed: MOVE_SPEED,
            snap_threshold: SNAP_THRESHOLD,
            interp_gain: INTERP_GAIN,
        }
    }
}

/// Stateless motion rules
pub struct MotionSystem;

impl MotionSystem {
    /// Advance the local avatar toward `goal` at constant speed.
    ///
    /// Within `snap_threshold` of the goal the avatar lands exactly on it.
    /// A single step never carries the avatar past the goal.
    pub fn step_local(pos: Position, goal: Position, dt: f64, config: &MotionConfig) -> Position {
        let dist = pos.distance_to(goal);
        if dist <= config.snap_threshold {
            return goal;
        }

        let step = (config.move_speed * dt.max(0.0)).min(dist);
        let theta = (goal.y - pos.y).atan2(goal.x - pos.x);
        Position::new(pos.x + theta.cos() * step, pos.y + theta.sin() * step)
    }

    /// First-order smoothing of a remote avatar toward its network goal
    pub fn smooth_remote(pos: Position, goal: Position, dt: f64, config: &MotionConfig) -> Position {
        let k = (config.interp_gain * dt).clamp(0.0, 1.0);
        Position::new(pos.x + (goal.x - pos.x) * k, pos.y + (goal.y - pos.y) * k)
    }
}

/// The local participant
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SelfView {
    pub pos: Position,
    pub last_reported: Position,
}

impl SelfView {
    /// Move for one frame. With no goal the avatar holds still.
    pub fn advance(&mut self, goal: Option<Position>, dt: f64, config: &MotionConfig) {
        let goal = goal.unwrap_or(self.pos);
        self.pos = MotionSystem::step_local(self.pos, goal, dt, config);
    }

    /// True when `pos` differs on any axis from the last report
    pub fn report_due(&self) -> bool {
        self.pos != self.last_reported
    }

    pub fn mark_reported(&mut self) {
        self.last_reported = self.pos;
    }
}

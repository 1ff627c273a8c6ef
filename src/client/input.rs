//! Pointer input and canvas/world coordinate mapping

use crate::ws::protocol::Position;

/// Edge length of the square canvas, in pixels
pub const CANVAS_SIZE: f64 = 400.0;

/// Canvas pixels per world unit
pub const CANVAS_ZOOM: f64 = 2.0;

/// Maps between canvas pixels (origin top-left) and world units (origin centre)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub size: f64,
    pub zoom: f64,
}

impl Viewport {
    pub fn new(size: f64, zoom: f64) -> Self {
        Self { size, zoom }
    }

    pub fn to_world(&self, canvas_x: f64, canvas_y: f64) -> Position {
        let half = self.size / 2.0;
        Position::new((canvas_x - half) / self.zoom, (canvas_y - half) / self.zoom)
    }

    pub fn to_canvas(&self, pos: Position) -> (f64, f64) {
        let half = self.size / 2.0;
        (pos.x * self.zoom + half, pos.y * self.zoom + half)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(CANVAS_SIZE, CANVAS_ZOOM)
    }
}

/// Mouse/touch state in canvas pixels
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointerState {
    pub down: bool,
    pub x: f64,
    pub y: f64,
}

impl PointerState {
    pub fn press(&mut self, x: f64, y: f64) {
        self.down = true;
        self.x = x;
        self.y = y;
    }

    /// Track movement; does not change the pressed state
    pub fn moved(&mut self, x: f64, y: f64) {
        self.x = x;
        self.y = y;
    }

    /// Release or cancel
    pub fn release(&mut self) {
        self.down = false;
    }

    /// World-space goal while pressed
    pub fn goal(&self, viewport: &Viewport) -> Option<Position> {
        self.down.then(|| viewport.to_world(self.x, self.y))
    }
}

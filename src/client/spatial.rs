//! Distance/angle based stereo attenuation and the per-peer channel splitter

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::ws::protocol::Position;

/// Distance at or below which a peer plays at full volume
pub const AUDIO_NEAR: f64 = 25.0;

/// Distance at or beyond which a peer is inaudible
pub const AUDIO_CUTOFF: f64 = 150.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpatialConfig {
    pub near: f64,
    pub cutoff: f64,
}

impl Default for SpatialConfig {
    fn default() -> Self {
        Self {
            near: AUDIO_NEAR,
            cutoff: AUDIO_CUTOFF,
        }
    }
}

/// Per-ear gain in `[0, 1]`, in the sample format of the audio path
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoGain {
    pub left: f32,
    pub right: f32,
}

impl StereoGain {
    pub const SILENT: StereoGain = StereoGain {
        left: 0.0,
        right: 0.0,
    };
    pub const FULL: StereoGain = StereoGain {
        left: 1.0,
        right: 1.0,
    };
}

/// Stereo attenuation of a source as heard by a listener.
///
/// Full volume inside `near`, silence from `cutoff` on, and a linear falloff
/// in between, biased toward the ear on the source's side. The `sin²` term
/// keeps both ears live for a source straight ahead of or behind the listener.
pub fn spatial_mix(listener: Position, source: Position, config: &SpatialConfig) -> StereoGain {
    let dx = source.x - listener.x;
    let dy = source.y - listener.y;
    let d = dx.hypot(dy);

    if d <= config.near {
        return StereoGain::FULL;
    }
    if d >= config.cutoff {
        return StereoGain::SILENT;
    }

    let s = 1.0 - (d - config.near) / (config.cutoff - config.near);
    let theta = dy.atan2(dx);
    let (sin, cos) = theta.sin_cos();
    let sin2 = sin * sin;

    StereoGain {
        left: (((-cos).max(0.0).powi(2) + sin2) * s) as f32,
        right: ((cos.max(0.0).powi(2) + sin2) * s) as f32,
    }
}

/// Shared gain cell, written by the frame loop and read by the audio path
pub type GainHandle = Arc<RwLock<StereoGain>>;

/// Routes one remote stream to the left/right outputs with independent gains
#[derive(Debug)]
pub struct ChannelSplitter<S> {
    peer: Uuid,
    stream: Option<S>,
    gain: GainHandle,
}

impl<S> ChannelSplitter<S> {
    /// Wrap a remote stream. Gains start silent until the first frame.
    pub fn new(peer: Uuid, stream: S) -> Self {
        Self {
            peer,
            stream: Some(stream),
            gain: Arc::new(RwLock::new(StereoGain::SILENT)),
        }
    }

    pub fn peer(&self) -> Uuid {
        self.peer
    }

    pub fn set_gain(&self, gain: StereoGain) {
        if self.stream.is_some() {
            *self.gain.write() = gain;
        }
    }

    pub fn gain(&self) -> StereoGain {
        *self.gain.read()
    }

    /// Handle for the audio path; reads silence once the splitter is closed
    pub fn gain_handle(&self) -> GainHandle {
        self.gain.clone()
    }

    pub fn stream(&self) -> Option<&S> {
        self.stream.as_ref()
    }

    /// Mix a mono block into an interleaved stereo block using current gains.
    ///
    /// Processes `min(mono.len(), out.len() / 2)` frames and returns that count.
    pub fn pan_into(&self, mono: &[f32], out: &mut [f32]) -> usize {
        let gain = self.gain();
        let frames = mono.len().min(out.len() / 2);
        for (sample, pair) in mono.iter().zip(out.chunks_exact_mut(2)).take(frames) {
            pair[0] = sample * gain.left;
            pair[1] = sample * gain.right;
        }
        frames
    }

    /// Release the stream and silence the outputs. Idempotent.
    pub fn close(&mut self) -> Option<S> {
        let stream = self.stream.take();
        if stream.is_some() {
            *self.gain.write() = StereoGain::SILENT;
            debug!(peer_id = %self.peer, "Closed audio channel");
        }
        stream
    }

    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }
}

//! Client engine: local prediction, remote interpolation, spatial audio and
//! call lifecycle

pub mod calls;
pub mod input;
pub mod motion;
pub mod runtime;
pub mod session;
pub mod spatial;

pub use calls::{CallController, CallError, IncomingCall, PeerBroker, SilentBroker, SilentStream};
pub use input::{PointerState, Viewport};
pub use runtime::{ClientError, ClientRuntime};
pub use session::{ClientSession, PeerSummary, RemotePeerView};
pub use spatial::{spatial_mix, ChannelSplitter, SpatialConfig, StereoGain};

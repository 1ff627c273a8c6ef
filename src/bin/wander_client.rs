//! Headless participant that wanders the space
//!
//! Drives the full client engine against a running presence server:
//! - Presses random canvas points and holds them for a while
//! - Negotiates silent calls with every peer it meets

use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use proximity_space::client::input::CANVAS_SIZE;
use proximity_space::client::{ClientRuntime, PointerState, SilentBroker};
use proximity_space::config::ClientConfig;

/// Simulated negotiation time for silent calls
const CALL_LATENCY: Duration = Duration::from_millis(150);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = ClientConfig::from_env()?;
    init_tracing(&config.log_level);

    let seed = config.bot_seed.unwrap_or_else(rand::random);
    info!(url = %config.server_url, seed, "Starting wander client");

    let broker = SilentBroker::new(CALL_LATENCY);
    // The silent broker never receives offers; keep the sender so the channel stays open
    let (_incoming_tx, incoming_rx) = mpsc::unbounded_channel();
    let (pointer_tx, pointer_rx) = watch::channel(PointerState::default());

    let runtime = ClientRuntime::new(config, broker, incoming_rx, pointer_rx);

    tokio::select! {
        _ = runtime.run() => {}
        _ = wander(pointer_tx, ChaCha8Rng::seed_from_u64(seed)) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}

/// Alternate between holding the pointer on a random spot and resting
async fn wander(pointer: watch::Sender<PointerState>, mut rng: ChaCha8Rng) {
    loop {
        let x = rng.gen_range(0.0..CANVAS_SIZE);
        let y = rng.gen_range(0.0..CANVAS_SIZE);
        debug!(x, y, "Heading for canvas point");

        pointer.send_modify(|p| p.press(x, y));
        tokio::time::sleep(Duration::from_millis(rng.gen_range(500..3000))).await;

        pointer.send_modify(|p| p.release());
        tokio::time::sleep(Duration::from_millis(rng.gen_range(200..1500))).await;
    }
}

fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

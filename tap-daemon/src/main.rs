//! Tapper Sync Daemon
//!
//! Runs the sync engine headless against the simulated peripheral with a
//! pair of virtual followers, logging every engine event.
//!
//! ```text
//! tapsync                 # initial state from the settings file
//! tapsync --test-pattern  # broadcast the hardware test pattern instead
//! ```

mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tap_sim::{spawn_follower, SimTransport, VirtualFollower};
use tap_sync::{SyncContext, SyncEvent};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use settings::{FileSettings, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "tapsync=info,tap_protocol=info,tap_sync=info,tap_sim=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let test_pattern = std::env::args().any(|arg| arg == "--test-pattern");

    let path = Settings::default_path().unwrap_or_else(|| PathBuf::from("settings.json"));
    let settings = Settings::load_from(&path);
    info!("Starting tapsync (settings: {})", path.display());

    let transport = Arc::new(SimTransport::new());
    let provider = Arc::new(FileSettings::new(path, settings.clone()));
    let ctx = SyncContext::start(settings.sync.clone(), transport.clone(), provider)
        .context("failed to start sync engine")?;
    let mut events = ctx.subscribe();

    let mut followers = Vec::new();
    for follower in &settings.followers {
        let handle = spawn_follower(
            VirtualFollower::new(follower.link_id(), follower.role),
            transport.clone(),
            ctx.transport_sink(),
            follower.config.clone(),
        );
        handle.connect().await?;
        handle.heartbeat().await?;
        followers.push(handle);
    }

    if test_pattern {
        ctx.send_test_pattern().await?;
    } else if let Some(cached) = ctx.send_initial_state().await? {
        info!(
            "Restored speed {} and intensities {}/{}/{}/{}",
            cached.speed,
            cached.buzz_intensity,
            cached.light_intensity,
            cached.sound_intensity,
            cached.pressure_intensity
        );
    }
    let speed = ctx.store().get(tap_protocol::Channel::Speed);
    let period = ctx.set_speed(i32::from(speed)).await?;
    info!("Alternating every {:?}", period);

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(event) => log_event(&event),
                    Err(RecvError::Lagged(missed)) => warn!("Missed {} engine events", missed),
                    Err(RecvError::Closed) => break,
                }
            }

            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for ctrl-c")?;
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    match ctx.persist_settings() {
        Ok(saved) => debug!("Saved settings: {:?}", saved),
        Err(e) => warn!("Could not save settings: {}", e),
    }
    for follower in followers {
        follower.shutdown().await;
    }
    ctx.shutdown().await;

    info!("tapsync stopped");
    Ok(())
}

fn log_event(event: &SyncEvent) {
    match event {
        SyncEvent::SideChanged { .. } => {}
        SyncEvent::LowBattery { side, level } => warn!("{} follower battery low ({}%)", side, level),
        SyncEvent::HeartbeatMissing {
            role,
            missing: true,
        } => warn!("{} follower stopped sending heartbeats", role),
        SyncEvent::ReconnectionExhausted { link } => warn!("Gave up reconnecting {}", link),
        event if event.is_link_lifecycle() => info!("{:?}", event),
        event => debug!("{:?}", event),
    }
}

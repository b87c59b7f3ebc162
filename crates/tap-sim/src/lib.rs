//! Tapper Simulation Library
//!
//! This crate provides a simulation layer for exercising the sync engine
//! without a phone radio or wearables. It includes:
//!
//! - **SimTransport**: in-memory GATT peripheral with a push log and scripted failures
//! - **VirtualFollower**: simulated wearable with heartbeats and battery telemetry
//! - **MemorySettings**: settings storage that never touches disk
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tap_protocol::Side;
//! use tap_sim::{spawn_follower, FollowerConfig, MemorySettings, SimTransport, VirtualFollower};
//! use tap_sync::{LinkId, SyncConfig, SyncContext};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(SimTransport::new());
//! let ctx = SyncContext::start(
//!     SyncConfig::default(),
//!     transport.clone(),
//!     Arc::new(MemorySettings::new()),
//! )?;
//!
//! let left = spawn_follower(
//!     VirtualFollower::new(LinkId(1), Side::Left),
//!     transport.clone(),
//!     ctx.transport_sink(),
//!     FollowerConfig::default(),
//! );
//! left.connect().await?;
//! ctx.set_running(true).await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod follower;
pub mod settings;
pub mod transport;

pub use error::SimError;
pub use follower::{
    run_follower_task, spawn_follower, FollowerCommand, FollowerConfig, FollowerHandle,
    FollowerStateEvent, VirtualFollower,
};
pub use settings::MemorySettings;
pub use transport::{Notification, PushRecord, SimTransport};

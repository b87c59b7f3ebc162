//! Transport boundary
//!
//! The GATT peripheral stack (advertising, connection handling, encryption)
//! lives outside this crate. The engine only needs to publish the service,
//! push single-byte values, and be told about inbound writes and
//! subscription changes.
//!
//! Outbound pushes go through the [`Transport`] trait. Inbound traffic flows
//! the other way as [`TransportEvent`]s handed to a [`TransportSink`], which
//! forwards them to the sync actor.

use tap_protocol::{Channel, ServiceDefinition, WireId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::actor::SyncCommand;
use crate::error::{SyncError, TransportError};
use crate::state::LinkId;

/// Outbound half of a GATT peripheral
pub trait Transport: Send + Sync + 'static {
    /// Publish the service and its characteristics
    fn register_service(&self, service: &ServiceDefinition) -> Result<(), TransportError>;

    /// Queue a notification for `channel`
    ///
    /// With `target = None` the value goes to every subscribed link. A
    /// failure means the value was not queued; callers may retry.
    fn push(&self, channel: Channel, value: u8, target: Option<LinkId>)
        -> Result<(), TransportError>;
}

/// Something that happened on the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A central wrote a characteristic
    Write {
        /// Writer
        link: LinkId,
        /// Characteristic written
        wire_id: WireId,
        /// Raw payload
        payload: Vec<u8>,
    },

    /// A central subscribed to notifications
    Subscribed {
        /// Subscriber
        link: LinkId,
    },

    /// A central unsubscribed or dropped
    Unsubscribed {
        /// Former subscriber
        link: LinkId,
    },
}

impl TransportEvent {
    /// Link this event concerns
    pub fn link(&self) -> LinkId {
        match self {
            TransportEvent::Write { link, .. }
            | TransportEvent::Subscribed { link }
            | TransportEvent::Unsubscribed { link } => *link,
        }
    }
}

/// Handle a transport uses to deliver inbound events to the engine
///
/// Writes are acknowledged by the transport itself; delivering them here
/// never blocks the transport callback beyond channel back-pressure.
#[derive(Debug, Clone)]
pub struct TransportSink {
    tx: mpsc::Sender<SyncCommand>,
}

impl TransportSink {
    pub(crate) fn new(tx: mpsc::Sender<SyncCommand>) -> Self {
        Self { tx }
    }

    /// Deliver an event, waiting for queue space
    pub async fn deliver(&self, event: TransportEvent) -> Result<(), SyncError> {
        self.tx
            .send(SyncCommand::Transport(event))
            .await
            .map_err(|_| SyncError::ActorClosed)
    }

    /// Deliver an event from a synchronous callback
    ///
    /// When the queue is full the event comes back in [`SyncError::Busy`] so
    /// the caller can deliver it later.
    pub fn try_deliver(&self, event: TransportEvent) -> Result<(), SyncError> {
        self.tx
            .try_send(SyncCommand::Transport(event))
            .map_err(|e| match e {
                TrySendError::Full(SyncCommand::Transport(event)) => SyncError::Busy(event),
                TrySendError::Full(_) | TrySendError::Closed(_) => SyncError::ActorClosed,
            })
    }

    /// A central wrote `payload` to `wire_id`
    pub async fn on_write(
        &self,
        link: LinkId,
        wire_id: WireId,
        payload: Vec<u8>,
    ) -> Result<(), SyncError> {
        self.deliver(TransportEvent::Write {
            link,
            wire_id,
            payload,
        })
        .await
    }

    /// A central subscribed
    pub async fn on_subscribe(&self, link: LinkId) -> Result<(), SyncError> {
        self.deliver(TransportEvent::Subscribed { link }).await
    }

    /// A central unsubscribed
    pub async fn on_unsubscribe(&self, link: LinkId) -> Result<(), SyncError> {
        self.deliver(TransportEvent::Unsubscribed { link }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_deliver_full_queue_returns_event() {
        let (tx, mut rx) = mpsc::channel(1);
        let sink = TransportSink::new(tx);

        sink.try_deliver(TransportEvent::Subscribed { link: LinkId(1) }).unwrap();
        let result = sink.try_deliver(TransportEvent::Subscribed { link: LinkId(2) });
        match result {
            Err(SyncError::Busy(event)) => {
                assert_eq!(event, TransportEvent::Subscribed { link: LinkId(2) })
            }
            other => panic!("expected Busy, got {:?}", other),
        }

        // Space again once the actor drains the queue
        assert!(matches!(rx.try_recv(), Ok(SyncCommand::Transport(_))));
        sink.try_deliver(TransportEvent::Subscribed { link: LinkId(2) }).unwrap();
    }

    #[test]
    fn test_try_deliver_closed_queue_reports_actor_closed() {
        let (tx, rx) = mpsc::channel(4);
        let sink = TransportSink::new(tx);
        drop(rx);

        let result = sink.try_deliver(TransportEvent::Unsubscribed { link: LinkId(1) });
        assert!(matches!(result, Err(SyncError::ActorClosed)));
    }
}

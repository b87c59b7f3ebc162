//! In-memory GATT peripheral
//!
//! [`SimTransport`] stands in for the platform peripheral stack. It tracks
//! which links are subscribed, logs every push attempt with its virtual
//! timestamp, and can be scripted to fail pushes the way a full notification
//! queue does. Delivered values fan out to virtual followers over a broadcast
//! channel.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

use tap_protocol::{Channel, ServiceDefinition};
use tap_sync::{LinkId, Transport, TransportError};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

/// Notification buffer per follower
const NOTIFICATION_CAPACITY: usize = 512;

/// One push attempt as seen by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRecord {
    /// Virtual time of the attempt
    pub at: Instant,
    /// Channel pushed
    pub channel: Channel,
    /// Value pushed
    pub value: u8,
    /// Unicast target, `None` for broadcast
    pub target: Option<LinkId>,
    /// What the transport answered
    pub result: Result<(), TransportError>,
}

impl PushRecord {
    /// Check if the push was accepted
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// A value delivered to one subscribed link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notification {
    /// Receiving link
    pub link: LinkId,
    /// Channel notified
    pub channel: Channel,
    /// Value notified
    pub value: u8,
}

#[derive(Debug, Default)]
struct SimState {
    service: Option<ServiceDefinition>,
    subscribed: BTreeSet<LinkId>,
    log: Vec<PushRecord>,
    scripted: VecDeque<TransportError>,
    failing: Option<TransportError>,
    failing_links: HashMap<LinkId, TransportError>,
}

/// Simulated peripheral transport
#[derive(Debug)]
pub struct SimTransport {
    state: Mutex<SimState>,
    notifications: broadcast::Sender<Notification>,
}

impl SimTransport {
    /// Create a transport with no subscribers and no scripted failures
    pub fn new() -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            state: Mutex::new(SimState::default()),
            notifications,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark `link` as subscribed to notifications
    pub fn subscribe_link(&self, link: LinkId) {
        self.lock().subscribed.insert(link);
    }

    /// Mark `link` as gone
    pub fn unsubscribe_link(&self, link: LinkId) {
        self.lock().subscribed.remove(&link);
    }

    /// Currently subscribed links
    pub fn subscribed(&self) -> Vec<LinkId> {
        self.lock().subscribed.iter().copied().collect()
    }

    /// Fail the next `count` pushes with `error`
    pub fn fail_next(&self, count: usize, error: TransportError) {
        let mut state = self.lock();
        state
            .scripted
            .extend(std::iter::repeat(error).take(count));
    }

    /// Fail every push with `error`, or stop doing so with `None`
    pub fn fail_always(&self, error: Option<TransportError>) {
        self.lock().failing = error;
    }

    /// Fail unicast pushes to `link` with `error`, or stop with `None`
    ///
    /// Broadcast pushes silently skip a failing link.
    pub fn fail_link(&self, link: LinkId, error: Option<TransportError>) {
        let mut state = self.lock();
        match error {
            Some(error) => state.failing_links.insert(link, error),
            None => state.failing_links.remove(&link),
        };
    }

    /// Registered service, if any
    pub fn service(&self) -> Option<ServiceDefinition> {
        self.lock().service.clone()
    }

    /// Every push attempt so far
    pub fn pushes(&self) -> Vec<PushRecord> {
        self.lock().log.clone()
    }

    /// Accepted pushes only
    pub fn delivered(&self) -> Vec<PushRecord> {
        self.lock()
            .log
            .iter()
            .filter(|record| record.is_ok())
            .cloned()
            .collect()
    }

    /// Forget the push log
    pub fn clear_log(&self) {
        self.lock().log.clear();
    }

    /// Listen for delivered values
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.notifications.subscribe()
    }

    fn attempt(
        state: &mut SimState,
        target: Option<LinkId>,
    ) -> Result<Vec<LinkId>, TransportError> {
        if state.service.is_none() {
            return Err(TransportError::NotReady);
        }
        if let Some(error) = &state.failing {
            return Err(error.clone());
        }
        if let Some(error) = state.scripted.pop_front() {
            return Err(error);
        }

        match target {
            None => {
                if state.subscribed.is_empty() {
                    return Err(TransportError::NoSubscribers);
                }
                Ok(state
                    .subscribed
                    .iter()
                    .filter(|link| !state.failing_links.contains_key(link))
                    .copied()
                    .collect())
            }
            Some(link) => {
                if !state.subscribed.contains(&link) {
                    return Err(TransportError::LinkNotSubscribed(link));
                }
                if let Some(error) = state.failing_links.get(&link) {
                    return Err(error.clone());
                }
                Ok(vec![link])
            }
        }
    }
}

impl Default for SimTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SimTransport {
    fn register_service(&self, service: &ServiceDefinition) -> Result<(), TransportError> {
        debug!(
            "Simulated peripheral publishing {} characteristics",
            service.characteristics.len()
        );
        self.lock().service = Some(service.clone());
        Ok(())
    }

    fn push(
        &self,
        channel: Channel,
        value: u8,
        target: Option<LinkId>,
    ) -> Result<(), TransportError> {
        let mut state = self.lock();
        let result = Self::attempt(&mut state, target);

        state.log.push(PushRecord {
            at: Instant::now(),
            channel,
            value,
            target,
            result: result.as_ref().map(|_| ()).map_err(|e| e.clone()),
        });
        drop(state);

        let links = result?;
        for link in links {
            // No listening follower is fine
            let _ = self.notifications.send(Notification {
                link,
                channel,
                value,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready() -> SimTransport {
        let transport = SimTransport::new();
        transport
            .register_service(&ServiceDefinition::tapper())
            .unwrap();
        transport
    }

    #[test]
    fn test_push_before_registration_not_ready() {
        let transport = SimTransport::new();
        assert_eq!(
            transport.push(Channel::Speed, 25, None),
            Err(TransportError::NotReady)
        );
    }

    #[test]
    fn test_broadcast_needs_subscribers() {
        let transport = ready();
        assert_eq!(
            transport.push(Channel::Speed, 25, None),
            Err(TransportError::NoSubscribers)
        );
        transport.subscribe_link(LinkId(1));
        assert_eq!(transport.push(Channel::Speed, 25, None), Ok(()));
        assert_eq!(transport.pushes().len(), 2);
        assert_eq!(transport.delivered().len(), 1);
    }

    #[test]
    fn test_unicast_requires_subscription() {
        let transport = ready();
        transport.subscribe_link(LinkId(1));
        assert_eq!(
            transport.push(Channel::BuzzFlag, 1, Some(LinkId(2))),
            Err(TransportError::LinkNotSubscribed(LinkId(2)))
        );
        assert_eq!(transport.push(Channel::BuzzFlag, 1, Some(LinkId(1))), Ok(()));
    }

    #[test]
    fn test_scripted_failures_consumed_in_order() {
        let transport = ready();
        transport.subscribe_link(LinkId(1));
        transport.fail_next(2, TransportError::BufferFull);

        assert!(transport.push(Channel::Speed, 1, None).is_err());
        assert!(transport.push(Channel::Speed, 1, None).is_err());
        assert!(transport.push(Channel::Speed, 1, None).is_ok());
    }

    #[test]
    fn test_failing_link_skipped_by_broadcast() {
        let transport = ready();
        transport.subscribe_link(LinkId(1));
        transport.subscribe_link(LinkId(2));
        transport.fail_link(LinkId(2), Some(TransportError::BufferFull));
        let mut rx = transport.notifications();

        transport.push(Channel::LightFlag, 1, None).unwrap();
        assert_eq!(rx.try_recv().unwrap().link, LinkId(1));
        assert!(rx.try_recv().is_err());
        assert_eq!(
            transport.push(Channel::LightFlag, 1, Some(LinkId(2))),
            Err(TransportError::BufferFull)
        );

        transport.fail_link(LinkId(2), None);
        assert!(transport.push(Channel::LightFlag, 1, Some(LinkId(2))).is_ok());
    }
}

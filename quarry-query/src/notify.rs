//! Per-client registry of notification listeners.
//!
//! Drivers that receive server push notifications hand them to
//! [`ChannelRegistry::dispatch`]; every live [`Subscription`] listening on
//! that channel receives a copy. The registry belongs to one client and is
//! closed with it.
//!
//! ```rust
//! use quarry_query::notify::{ChannelRegistry, Notification};
//!
//! # tokio_test_block_on(async {
//! let registry = ChannelRegistry::new();
//! let mut sub = registry.subscribe(["orders"]).unwrap();
//!
//! registry.dispatch(Notification::new("orders", "42"));
//! assert_eq!(sub.recv().await.unwrap().payload, "42");
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::{QueryError, QueryResult};

/// A notification pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Channel the notification was sent on.
    pub channel: String,
    /// Payload text.
    pub payload: String,
}

impl Notification {
    /// Create a notification.
    pub fn new(channel: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            payload: payload.into(),
        }
    }
}

type Listener = (u64, mpsc::UnboundedSender<Notification>);

#[derive(Default)]
struct RegistryState {
    listeners: HashMap<String, Vec<Listener>>,
    next_id: u64,
    closed: bool,
}

impl RegistryState {
    fn remove(&mut self, id: u64, channels: &[String]) {
        for channel in channels {
            if let Some(list) = self.listeners.get_mut(channel) {
                list.retain(|(listener, _)| *listener != id);
                if list.is_empty() {
                    self.listeners.remove(channel);
                }
            }
        }
    }
}

/// Listener registry owned by one client.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl ChannelRegistry {
    /// Create an open registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen on one or more channels.
    pub fn subscribe<I, S>(&self, channels: I) -> QueryResult<Subscription>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut channels: Vec<String> = channels.into_iter().map(Into::into).collect();
        channels.sort();
        channels.dedup();
        if channels.is_empty() || channels.iter().any(|c| c.trim().is_empty()) {
            return Err(QueryError::invalid_value(
                "subscribe needs at least one non-empty channel name",
            ));
        }

        let mut state = self.state.lock();
        if state.closed {
            return Err(QueryError::registry_closed());
        }
        state.next_id += 1;
        let id = state.next_id;
        let (tx, rx) = mpsc::unbounded_channel();
        for channel in &channels {
            state
                .listeners
                .entry(channel.clone())
                .or_default()
                .push((id, tx.clone()));
        }
        drop(state);

        debug!(subscription = id, channels = ?channels, "Subscribed");
        Ok(Subscription {
            id,
            channels,
            rx,
            registry: Arc::downgrade(&self.state),
        })
    }

    /// Deliver a notification to every listener on its channel.
    ///
    /// Returns the number of subscriptions that received it.
    pub fn dispatch(&self, notification: Notification) -> usize {
        let mut state = self.state.lock();
        let Some(list) = state.listeners.get_mut(&notification.channel) else {
            trace!(channel = %notification.channel, "No listeners for notification");
            return 0;
        };

        list.retain(|(_, tx)| !tx.is_closed());
        let mut delivered = 0;
        for (_, tx) in list.iter() {
            if tx.send(notification.clone()).is_ok() {
                delivered += 1;
            }
        }
        if list.is_empty() {
            state.listeners.remove(&notification.channel);
        }
        delivered
    }

    /// Channels with at least one listener, sorted.
    pub fn channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.state.lock().listeners.keys().cloned().collect();
        channels.sort();
        channels
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Close the registry.
    ///
    /// Subscriptions still yield notifications already delivered, then end.
    /// Later subscribes fail.
    pub fn close(&self) {
        let mut state = self.state.lock();
        if !state.closed {
            state.closed = true;
            state.listeners.clear();
            debug!("Notification registry closed");
        }
    }
}

/// A stream of notifications for a set of channels.
///
/// Dropping the subscription unregisters it.
pub struct Subscription {
    id: u64,
    channels: Vec<String>,
    rx: mpsc::UnboundedReceiver<Notification>,
    registry: Weak<Mutex<RegistryState>>,
}

impl Subscription {
    /// Channels this subscription listens on.
    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// Wait for the next notification; `None` once the registry is closed
    /// and every delivered notification has been received.
    pub async fn recv(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }

    /// Take a delivered notification without waiting.
    pub fn try_recv(&mut self) -> Option<Notification> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = Notification;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Notification>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(state) = self.registry.upgrade() {
            state.lock().remove(self.id, &self.channels);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_dispatch_fans_out() {
        let registry = ChannelRegistry::new();
        let mut a = registry.subscribe(["jobs", "audit"]).unwrap();
        let mut b = registry.subscribe(["jobs"]).unwrap();

        assert_eq!(registry.dispatch(Notification::new("jobs", "1")), 2);
        assert_eq!(registry.dispatch(Notification::new("audit", "2")), 1);
        assert_eq!(registry.dispatch(Notification::new("other", "3")), 0);

        assert_eq!(a.recv().await.unwrap().payload, "1");
        assert_eq!(a.recv().await.unwrap().channel, "audit");
        assert_eq!(b.recv().await.unwrap().payload, "1");
        assert!(b.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_drop_unsubscribes() {
        let registry = ChannelRegistry::new();
        let sub = registry.subscribe(["jobs"]).unwrap();
        assert_eq!(registry.channels(), vec!["jobs".to_string()]);

        drop(sub);
        assert!(registry.channels().is_empty());
        assert_eq!(registry.dispatch(Notification::new("jobs", "x")), 0);
    }

    #[tokio::test]
    async fn test_close_drains_then_ends() {
        let registry = ChannelRegistry::new();
        let mut sub = registry.subscribe(["jobs"]).unwrap();
        registry.dispatch(Notification::new("jobs", "last"));

        registry.close();
        assert!(registry.is_closed());
        assert_eq!(sub.next().await.unwrap().payload, "last");
        assert!(sub.next().await.is_none());

        let err = registry.subscribe(["jobs"]).err().unwrap();
        assert_eq!(err.code, ErrorCode::RegistryClosed);
    }

    #[test]
    fn test_subscribe_validates_channels() {
        let registry = ChannelRegistry::new();
        assert!(registry.subscribe(Vec::<String>::new()).is_err());
        assert!(registry.subscribe([" "]).is_err());

        let sub = registry.subscribe(["b", "a", "b"]).unwrap();
        assert_eq!(sub.channels(), ["a".to_string(), "b".to_string()]);
    }
}

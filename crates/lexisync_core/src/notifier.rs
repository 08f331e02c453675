//! Per-channel fan-out of change hints.
//!
//! Publishing is fire-and-forget: nothing is persisted, a message sent to a
//! channel nobody listens on is dropped, and a subscriber only receives
//! messages published after it subscribed. Clients react to a hint by
//! pulling; they never trust the payload for record content.

use crate::config::NotifierConfig;
use futures_util::stream::{self, Stream};
use lexisync_protocol::{ChannelName, EntityKind};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, warn};

/// Routes change hints to channel subscribers.
pub struct ChangeNotifier {
    channels: Mutex<HashMap<ChannelName, broadcast::Sender<String>>>,
    capacity: usize,
    published: AtomicU64,
}

impl ChangeNotifier {
    /// Creates a notifier.
    pub fn new(config: NotifierConfig) -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
            capacity: config.channel_capacity.max(1),
            published: AtomicU64::new(0),
        }
    }

    /// Publishes `payload` on `channel`.
    ///
    /// Returns the number of subscribers the message was handed to.
    pub fn publish(&self, channel: &ChannelName, payload: impl Into<String>) -> usize {
        let channels = self.channels.lock();
        let delivered = match channels.get(channel) {
            Some(sender) => sender.send(payload.into()).unwrap_or(0),
            None => 0,
        };
        drop(channels);
        self.published.fetch_add(1, Ordering::Relaxed);
        debug!(channel = %channel, delivered, "published change hint");
        delivered
    }

    /// Announces that `kind` changed for `user_id`.
    ///
    /// Publishes the kind name on the user's `changed` channel and on the
    /// user's channel for that kind.
    pub fn notify_change(&self, user_id: &str, kind: EntityKind) -> usize {
        self.publish(&ChannelName::changed(user_id), kind.as_str())
            + self.publish(&ChannelName::for_user(kind, user_id), kind.as_str())
    }

    /// Subscribes to `channel`.
    ///
    /// Dropping the returned [`Subscription`] unsubscribes; the channel is
    /// forgotten once its last subscriber is gone.
    pub fn subscribe(self: &Arc<Self>, channel: ChannelName) -> Subscription {
        let receiver = {
            let mut channels = self.channels.lock();
            channels
                .entry(channel.clone())
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe()
        };
        debug!(channel = %channel, "subscribed");
        Subscription {
            channel,
            receiver: Some(receiver),
            notifier: Arc::clone(self),
        }
    }

    /// Number of live subscribers of `channel`.
    pub fn subscriber_count(&self, channel: &ChannelName) -> usize {
        self.channels
            .lock()
            .get(channel)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    /// Number of channels with at least one subscriber.
    pub fn channel_count(&self) -> usize {
        self.channels.lock().len()
    }

    /// Total number of publish calls.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    fn release(&self, channel: &ChannelName) {
        let mut channels = self.channels.lock();
        if channels
            .get(channel)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            channels.remove(channel);
            debug!(channel = %channel, "channel released");
        }
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(NotifierConfig::default())
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("channels", &self.channel_count())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// A live subscription to one channel.
pub struct Subscription {
    channel: ChannelName,
    // Only `None` while dropping.
    receiver: Option<broadcast::Receiver<String>>,
    notifier: Arc<ChangeNotifier>,
}

impl Subscription {
    /// The subscribed channel.
    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }

    /// Waits for the next message.
    ///
    /// A subscriber that falls behind the channel buffer skips the lost
    /// messages and continues with the oldest one still buffered.
    pub async fn recv(&mut self) -> Option<String> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(message) => return Some(message),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(channel = %self.channel, skipped, "subscriber lagged, skipping hints");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Returns the next buffered message without waiting.
    pub fn try_recv(&mut self) -> Option<String> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.try_recv() {
                Ok(message) => return Some(message),
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(channel = %self.channel, skipped, "subscriber lagged, skipping hints");
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return None,
            }
        }
    }

    /// Turns the subscription into a stream of messages.
    pub fn into_stream(self) -> impl Stream<Item = String> + Send {
        stream::unfold(self, |mut subscription| async move {
            subscription
                .recv()
                .await
                .map(|message| (message, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        drop(self.receiver.take());
        self.notifier.release(&self.channel);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .finish()
    }
}

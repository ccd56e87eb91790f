//! Open event-stream queues.
//!
//! Each subscriber owns an unbounded queue. A [`Subscription`] removes its
//! queue from the set when dropped, whatever ended the stream.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use meilisearch_mcp_core::JsonRpcResponse;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

type Message = Arc<JsonRpcResponse>;

#[derive(Clone, Default)]
pub struct SubscriberSet {
    inner: Arc<Mutex<HashMap<Uuid, UnboundedSender<Message>>>>,
}

impl std::fmt::Debug for SubscriberSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberSet")
            .field("subscribers", &self.len())
            .finish()
    }
}

impl SubscriberSet {
    pub fn subscribe(&self) -> Subscription {
        let id = Uuid::now_v7();
        let (sender, receiver) = mpsc::unbounded_channel();
        let total = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.insert(id, sender);
            inner.len()
        };
        tracing::info!(event = "sse_subscribed", subscriber = %id, total, "Event stream opened");
        Subscription {
            id,
            set: self.clone(),
            receiver,
        }
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueues `message` on every open queue and returns how many took
    /// it. A queue whose stream already ended is skipped.
    pub fn broadcast(&self, message: JsonRpcResponse) -> usize {
        let message = Arc::new(message);
        let senders: Vec<(Uuid, UnboundedSender<Message>)> = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, sender)| (*id, sender.clone()))
            .collect();

        let mut delivered = 0;
        for (id, sender) in senders {
            if sender.send(Arc::clone(&message)).is_ok() {
                delivered += 1;
            } else {
                tracing::debug!(event = "sse_broadcast_skipped", subscriber = %id, "Subscriber already gone");
            }
        }
        delivered
    }

    fn remove(&self, id: &Uuid) {
        let remaining = {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.remove(id);
            inner.len()
        };
        tracing::info!(event = "sse_unsubscribed", subscriber = %id, remaining, "Event stream closed");
    }
}

/// One subscriber's end of the queue.
pub struct Subscription {
    id: Uuid,
    set: SubscriberSet,
    receiver: UnboundedReceiver<Message>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.set.remove(&self.id);
    }
}

#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

//! Notification bus for the Sluice session.
//!
//! The bus provides a typed event enum, sequential identifiers, and replay of
//! recent events when subscribers reconnect. Internally it uses
//! `tokio::broadcast` with a bounded buffer; every subscriber observes events
//! in emission order, and when the channel overflows the oldest events are
//! dropped for the lagging subscriber only.

mod hash;
mod payloads;

pub use hash::{INFO_HASH_LEN, InfoHash, InfoHashParseError};
pub use payloads::{DEFAULT_REPLAY_CAPACITY, Event, EventEnvelope, EventId, TorrentState};

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::broadcast::{self, Receiver, Sender};

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    replay: Arc<Mutex<VecDeque<EventEnvelope>>>,
    next_id: Arc<AtomicU64>,
    replay_capacity: usize,
}

impl EventBus {
    /// Construct a new bus with the provided broadcast capacity.
    ///
    /// A capacity of zero is bumped to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            replay: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            next_id: Arc::new(AtomicU64::new(1)),
            replay_capacity: capacity,
        }
    }

    /// Construct a bus with the default in-memory buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Publish a new event to the bus, assigning it a sequential identifier.
    pub fn publish(&self, event: Event) -> EventId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };

        {
            let mut buffer = self.replay_buffer();
            if buffer.len() == self.replay_capacity {
                buffer.pop_front();
            }
            buffer.push_back(envelope.clone());
        }

        // No subscribers is not an error; the replay ring still records the event.
        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe to the bus, replaying any buffered events newer than `since_id`.
    #[must_use]
    pub fn subscribe(&self, since_id: Option<EventId>) -> EventStream {
        let receiver = self.sender.subscribe();
        let mut backlog = VecDeque::new();
        if let Some(since) = since_id {
            let buffer = self.replay_buffer();
            backlog.extend(buffer.iter().filter(|item| item.id > since).cloned());
        }
        let replayed_up_to = backlog.back().map(|item| item.id);
        EventStream {
            backlog,
            receiver,
            replayed_up_to,
        }
    }

    /// Returns the last assigned identifier, if any events have been published.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        self.replay_buffer().back().map(|event| event.id)
    }

    fn replay_buffer(&self) -> MutexGuard<'_, VecDeque<EventEnvelope>> {
        self.replay.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream wrapper that yields events either from the replay backlog or from the
/// live broadcast channel.
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    receiver: Receiver<EventEnvelope>,
    replayed_up_to: Option<EventId>,
}

impl EventStream {
    /// Receive the next event, respecting the replay backlog first.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }

        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.replayed_up_to.is_some_and(|last| event.id <= last) {
                        continue;
                    }
                    return Some(event);
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receive an event if one is immediately available.
    pub fn try_next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.replayed_up_to.is_some_and(|last| event.id <= last) {
                        continue;
                    }
                    return Some(event);
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => {}
                Err(_) => return None,
            }
        }
    }

    /// Drain every event that is immediately available.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(envelope) = self.try_next() {
            events.push(envelope.event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::task;
    use tokio::time::timeout;

    fn sample_event(index: u8) -> Event {
        Event::TorrentPaused {
            info_hash: InfoHash::new([index; INFO_HASH_LEN]),
        }
    }

    #[tokio::test]
    async fn sequential_ids_and_replay() {
        let bus = EventBus::with_capacity(16);

        let mut last_id = 0;
        for i in 0..5 {
            last_id = bus.publish(sample_event(i));
        }
        assert_eq!(last_id, 5);
        assert_eq!(bus.last_event_id(), Some(5));

        let mut stream = bus.subscribe(Some(2));
        let mut received = Vec::new();
        for _ in 0..3 {
            if let Some(event) = stream.next().await {
                received.push(event.id);
            }
        }
        assert_eq!(received, vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn subscribers_see_emission_order() {
        let bus = EventBus::with_capacity(64);
        let mut first = bus.subscribe(None);
        let mut second = bus.subscribe(None);

        for i in 0..10 {
            bus.publish(sample_event(i));
        }

        let first_ids: Vec<_> = first
            .drain()
            .into_iter()
            .filter_map(|event| event.info_hash())
            .collect();
        let second_ids: Vec<_> = second
            .drain()
            .into_iter()
            .filter_map(|event| event.info_hash())
            .collect();
        assert_eq!(first_ids.len(), 10);
        assert_eq!(first_ids, second_ids);
        assert_eq!(first_ids[0], InfoHash::new([0; INFO_HASH_LEN]));
    }

    #[tokio::test]
    async fn replay_does_not_duplicate_live_events() {
        let bus = EventBus::with_capacity(16);
        bus.publish(sample_event(1));
        let mut stream = bus.subscribe(Some(0));
        bus.publish(sample_event(2));

        let ids: Vec<_> = std::iter::from_fn(|| stream.try_next().map(|envelope| envelope.id))
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn publishers_do_not_stall_without_readers() {
        let bus = Arc::new(EventBus::with_capacity(8));
        let publisher = {
            let bus = Arc::clone(&bus);
            task::spawn(async move {
                for i in 0..200_u16 {
                    bus.publish(sample_event(u8::try_from(i % 200).unwrap_or_default()));
                }
            })
        };
        timeout(Duration::from_secs(1), publisher)
            .await
            .expect("publish timed out")
            .expect("publisher task panicked");
        assert_eq!(bus.last_event_id(), Some(200));
    }
}

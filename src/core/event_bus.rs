// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/quakewatch

//! Event hub: sequenced fan-out with replay on subscribe

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, info};

use super::event::{Envelope, Event};
use super::history::HistoryBuffer;
use crate::config::HubConfig;

/// Subscriber identifier
pub type SubscriberId = u64;

/// Per-subscriber bounded queue; full queues shed their oldest entry
struct Mailbox {
    queue: Mutex<VecDeque<Envelope>>,
    capacity: usize,
    notify: Notify,
    dropped: AtomicU64,
    closed: AtomicBool,
}

impl Mailbox {
    fn new(capacity: usize, backlog: Vec<Envelope>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::from(backlog)),
            capacity,
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns true when an older entry had to be dropped
    fn push(&self, envelope: Envelope) -> bool {
        let overflowed = {
            let mut queue = self.queue.lock();
            let overflowed = queue.len() >= self.capacity;
            if overflowed {
                queue.pop_front();
            }
            queue.push_back(envelope);
            overflowed
        };
        if overflowed {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        overflowed
    }

    fn pop(&self) -> Option<Envelope> {
        self.queue.lock().pop_front()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

struct HubInner {
    next_seq: u64,
    next_id: SubscriberId,
    subscribers: HashMap<SubscriberId, Arc<Mailbox>>,
}

struct HubShared {
    inner: Mutex<HubInner>,
    log: Arc<HistoryBuffer<Envelope>>,
    replay_len: usize,
    queue_capacity: usize,
    published: AtomicU64,
    dropped: AtomicU64,
}

impl HubShared {
    fn detach(&self, id: SubscriberId) -> bool {
        let removed = self.inner.lock().subscribers.remove(&id);
        match removed {
            Some(mailbox) => {
                mailbox.close();
                debug!("Subscriber {} detached", id);
                true
            }
            None => false,
        }
    }
}

/// Hub counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub subscribers: usize,
    pub published: u64,
    pub dropped: u64,
}

/// Central hub for pub/sub delivery of pipeline events.
///
/// Publishing stamps each event with a sequence number, appends log entries
/// to the operational log and pushes the envelope into every subscriber
/// queue, all under one lock. Subscribing snapshots the log tail under the
/// same lock, so a new subscriber sees the backlog followed by exactly the
/// events published after it.
#[derive(Clone)]
pub struct EventHub {
    shared: Arc<HubShared>,
}

impl EventHub {
    pub fn new(config: &HubConfig, log: Arc<HistoryBuffer<Envelope>>) -> Self {
        Self {
            shared: Arc::new(HubShared {
                inner: Mutex::new(HubInner {
                    next_seq: 0,
                    next_id: 0,
                    subscribers: HashMap::new(),
                }),
                log,
                replay_len: config.replay_len,
                queue_capacity: config.queue_capacity.max(1),
                published: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Deliver `event` to every current subscriber
    pub fn publish(&self, event: Event) -> Envelope {
        let shared = &self.shared;
        let mut inner = shared.inner.lock();

        let envelope = Envelope {
            seq: inner.next_seq,
            event: Arc::new(event),
        };
        inner.next_seq += 1;

        if envelope.event.is_log_entry() {
            shared.log.append(envelope.clone());
        }

        for (id, mailbox) in inner.subscribers.iter() {
            if mailbox.push(envelope.clone()) {
                shared.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Subscriber {} lagging, dropped oldest queued event", id);
            }
        }
        shared.published.fetch_add(1, Ordering::Relaxed);

        envelope
    }

    /// Attach a subscriber; its queue starts with the log tail
    pub fn subscribe(&self) -> Subscription {
        let shared = &self.shared;
        let mut inner = shared.inner.lock();

        let backlog = shared.log.latest(shared.replay_len);
        let replayed = backlog.len();
        let capacity = shared.queue_capacity.max(replayed);
        let mailbox = Arc::new(Mailbox::new(capacity, backlog));

        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.insert(id, mailbox.clone());

        info!("Subscriber {} attached ({} replayed)", id, replayed);
        Subscription {
            id,
            replayed,
            live_from: inner.next_seq,
            mailbox,
            hub: Arc::downgrade(shared),
        }
    }

    /// Detach a subscriber; returns false if it was not attached
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.shared.detach(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.shared.inner.lock().subscribers.len()
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            subscribers: self.subscriber_count(),
            published: self.shared.published.load(Ordering::Relaxed),
            dropped: self.shared.dropped.load(Ordering::Relaxed),
        }
    }

    /// The operational log backing replay
    pub fn log(&self) -> &Arc<HistoryBuffer<Envelope>> {
        &self.shared.log
    }
}

/// A live feed of envelopes, in publish order.
///
/// Dropping the subscription detaches it.
pub struct Subscription {
    id: SubscriberId,
    replayed: usize,
    live_from: u64,
    mailbox: Arc<Mailbox>,
    hub: Weak<HubShared>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Number of backlog envelopes queued at attach time
    pub fn replayed(&self) -> usize {
        self.replayed
    }

    /// Sequence number of the first live envelope; everything before it
    /// came from the backlog
    pub fn live_from(&self) -> u64 {
        self.live_from
    }

    /// Envelopes lost to queue overflow
    pub fn dropped(&self) -> u64 {
        self.mailbox.dropped.load(Ordering::Relaxed)
    }

    /// Next envelope; `None` once detached and drained
    pub async fn recv(&mut self) -> Option<Envelope> {
        loop {
            if let Some(envelope) = self.mailbox.pop() {
                return Some(envelope);
            }
            if self.mailbox.is_closed() {
                return None;
            }
            self.mailbox.notify.notified().await;
        }
    }

    /// Next envelope if one is already queued
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.mailbox.pop()
    }

    /// Everything currently queued
    pub fn drain(&mut self) -> Vec<Envelope> {
        self.mailbox.queue.lock().drain(..).collect()
    }

    pub fn is_detached(&self) -> bool {
        self.mailbox.is_closed()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shared) = self.hub.upgrade() {
            shared.detach(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::time::Duration;

    fn hub(replay_len: usize, queue_capacity: usize) -> EventHub {
        let log = Arc::new(HistoryBuffer::new(1000));
        EventHub::new(&HubConfig { replay_len, queue_capacity }, log)
    }

    fn line(n: usize) -> Event {
        Event::raw_line(Utc::now(), &format!("line {n}"))
    }

    #[test]
    fn test_publish_reaches_every_subscriber() {
        let hub = hub(10, 16);
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        hub.publish(Event::connection(Utc::now(), "WiFi", true));

        assert_eq!(a.drain().len(), 1);
        assert_eq!(b.drain().len(), 1);
        assert_eq!(hub.stats().published, 1);
    }

    #[test]
    fn test_replay_then_live_without_gap_or_duplicate() {
        let hub = hub(100, 1024);
        for n in 0..250 {
            hub.publish(line(n));
        }

        let mut late = hub.subscribe();
        assert_eq!(late.replayed(), 100);
        assert_eq!(late.live_from(), 250);
        for n in 250..260 {
            hub.publish(line(n));
        }

        let seqs: Vec<u64> = late.drain().iter().map(|e| e.seq).collect();
        let expected: Vec<u64> = (150..260).collect();
        assert_eq!(seqs, expected);
    }

    #[test]
    fn test_only_log_entries_are_replayed() {
        let hub = hub(100, 64);
        hub.publish(line(0));
        hub.publish(Event::connection(Utc::now(), "WiFi", true));
        hub.publish(Event::fault(Utc::now(), "port vanished"));

        let mut late = hub.subscribe();
        let kinds: Vec<&str> = late.drain().iter().map(|e| e.event.kind()).collect();
        assert_eq!(kinds, vec!["raw_line", "fault"]);
    }

    #[test]
    fn test_slow_subscriber_sheds_oldest() {
        let hub = hub(0, 4);
        let mut slow = hub.subscribe();
        let mut fast = hub.subscribe();

        for n in 0..10 {
            hub.publish(line(n));
            assert!(fast.try_recv().is_some());
        }

        let seqs: Vec<u64> = slow.drain().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![6, 7, 8, 9]);
        assert_eq!(slow.dropped(), 6);
        assert_eq!(fast.dropped(), 0);
        assert_eq!(hub.stats().dropped, 6);
    }

    #[test]
    fn test_unsubscribe_is_immediate() {
        let hub = hub(0, 16);
        let mut gone = hub.subscribe();
        let mut stays = hub.subscribe();

        hub.publish(line(0));
        assert!(hub.unsubscribe(gone.id()));
        assert!(!hub.unsubscribe(gone.id()));
        hub.publish(line(1));

        // Already queued delivery survives; nothing new arrives
        assert_eq!(gone.drain().len(), 1);
        assert!(gone.is_detached());
        assert_eq!(stays.drain().len(), 2);
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[test]
    fn test_drop_detaches() {
        let hub = hub(0, 16);
        {
            let _sub = hub.subscribe();
            assert_eq!(hub.subscriber_count(), 1);
        }
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_recv_wakes_on_publish() {
        let hub = hub(0, 16);
        let mut sub = hub.subscribe();

        let publisher = {
            let hub = hub.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                hub.publish(line(7));
            })
        };

        let envelope = tokio::time::timeout(Duration::from_secs(2), sub.recv())
            .await
            .expect("recv timed out")
            .expect("subscription open");
        assert_eq!(envelope.seq, 0);
        publisher.await.unwrap();
    }

    #[tokio::test]
    async fn test_recv_ends_after_detach() {
        let hub = hub(0, 16);
        let mut sub = hub.subscribe();
        hub.publish(line(0));
        hub.unsubscribe(sub.id());

        assert!(sub.recv().await.is_some());
        assert!(sub.recv().await.is_none());
    }
}

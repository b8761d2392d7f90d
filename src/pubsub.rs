// ===============================
// src/pubsub.rs
// ===============================
//
// Transport boundary: the core only subscribes and acks.
// MemoryPubsub is the in-process broker used by the replay harness/tests.
// Every message carries a broker-wide publish sequence number, so a
// subscriber of several topics can recover cross-topic publish order.
//
use ahash::AHashMap as HashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, MutexGuard,
};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error, PartialEq)]
pub enum PubsubError {
    #[error("topic {0} is closed")]
    Closed(String),
}

/// One delivery. Call `ack` only after its effect has been applied.
#[derive(Debug)]
pub struct Message {
    /// Publish order across all topics of the broker.
    pub seq: u64,
    pub payload: Vec<u8>,
    acks: Option<Arc<AtomicU64>>,
}

impl Message {
    pub fn new(seq: u64, payload: Vec<u8>) -> Self {
        Self { seq, payload, acks: None }
    }

    pub fn ack(self) {
        if let Some(acks) = self.acks {
            acks.fetch_add(1, Ordering::Relaxed);
        }
    }
}

pub trait Pubsub {
    /// Per-topic publish order is preserved for each subscriber and `seq`
    /// grows with publish order across topics. The stream ends when the
    /// topic is closed.
    fn subscribe(&self, topic: &str) -> Result<mpsc::UnboundedReceiver<Message>, PubsubError>;
}

#[derive(Debug, Default)]
struct Topic {
    subs: Vec<mpsc::UnboundedSender<Message>>,
    acks: Arc<AtomicU64>,
    closed: bool,
}

#[derive(Debug, Default)]
struct Topics {
    by_name: HashMap<String, Topic>,
    next_seq: u64,
}

#[derive(Debug, Default)]
pub struct MemoryPubsub {
    topics: Mutex<Topics>,
}

impl MemoryPubsub {
    pub fn new() -> Self {
        Self::default()
    }

    fn topics(&self) -> MutexGuard<'_, Topics> {
        // lock poisoning tidak membuat state topic jadi invalid
        self.topics.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fans `payload` out to every live subscriber, in subscription order.
    /// Sequence numbers are taken under the broker lock, so `seq` order is
    /// also send order.
    pub fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), PubsubError> {
        let mut topics = self.topics();
        topics.next_seq += 1;
        let seq = topics.next_seq;
        let t = topics.by_name.entry(topic.to_string()).or_default();
        if t.closed {
            return Err(PubsubError::Closed(topic.to_string()));
        }
        let acks = t.acks.clone();
        t.subs.retain(|tx| {
            tx.send(Message { seq, payload: payload.clone(), acks: Some(acks.clone()) })
                .is_ok()
        });
        Ok(())
    }

    /// Ends every subscriber stream on `topic`.
    pub fn close(&self, topic: &str) {
        let mut topics = self.topics();
        let t = topics.by_name.entry(topic.to_string()).or_default();
        t.closed = true;
        t.subs.clear();
    }

    pub fn acked(&self, topic: &str) -> u64 {
        self.topics()
            .by_name
            .get(topic)
            .map(|t| t.acks.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}

impl Pubsub for MemoryPubsub {
    fn subscribe(&self, topic: &str) -> Result<mpsc::UnboundedReceiver<Message>, PubsubError> {
        let mut topics = self.topics();
        let t = topics.by_name.entry(topic.to_string()).or_default();
        if t.closed {
            return Err(PubsubError::Closed(topic.to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        t.subs.push(tx);
        Ok(rx)
    }
}

impl<P: Pubsub + ?Sized> Pubsub for Arc<P> {
    fn subscribe(&self, topic: &str) -> Result<mpsc::UnboundedReceiver<Message>, PubsubError> {
        (**self).subscribe(topic)
    }
}

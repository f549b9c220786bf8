use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::broker::{
    AckCallback, BrokerError, Consumer, ConsumerRecord, Delivery, Producer, ProducerRecord,
};

/// A process-local broker backed by in-memory queues.
///
/// Records are partitioned by key hash, assigned per-partition offsets,
/// and handed to whichever subscribed consumer polls first. Acknowledgment
/// callbacks run synchronously inside [`Producer::send`], after the
/// internal lock is released, so a callback may send again.
///
/// [`close`](InMemoryBroker::close) stops new sends immediately; consumers
/// drain what was already queued and then see [`BrokerError::Closed`].
#[derive(Clone, Debug, Default)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<BrokerState>,
    records_available: Condvar,
}

#[derive(Debug)]
struct BrokerState {
    partitions: u32,
    topics: HashMap<String, TopicState>,
    closed: bool,
}

impl Default for BrokerState {
    fn default() -> Self {
        BrokerState {
            partitions: 1,
            topics: HashMap::new(),
            closed: false,
        }
    }
}

#[derive(Debug)]
struct TopicState {
    queue: VecDeque<ConsumerRecord>,
    next_offsets: Vec<i64>,
}

impl TopicState {
    fn new(partitions: u32) -> Self {
        TopicState {
            queue: VecDeque::new(),
            next_offsets: vec![0; partitions as usize],
        }
    }
}

impl BrokerState {
    fn take_batch(&mut self, topics: &[String], max_records: usize) -> Vec<ConsumerRecord> {
        let mut batch = Vec::new();
        for topic in topics {
            if batch.len() == max_records {
                break;
            }
            if let Some(topic_state) = self.topics.get_mut(topic) {
                while batch.len() < max_records {
                    match topic_state.queue.pop_front() {
                        Some(record) => batch.push(record),
                        None => break,
                    }
                }
            }
        }
        batch
    }
}

impl InMemoryBroker {
    /// A broker with a single partition per topic.
    pub fn new() -> Self {
        InMemoryBroker::default()
    }

    /// A broker with `partitions` partitions per topic, at least one.
    pub fn with_partitions(partitions: u32) -> Self {
        let broker = InMemoryBroker::default();
        if let Ok(mut state) = broker.shared.state.lock() {
            state.partitions = partitions.max(1);
        }
        broker
    }

    /// A consumer subscribed to `topics`.
    pub fn consumer<I>(&self, topics: I) -> InMemoryConsumer
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        InMemoryConsumer {
            shared: Arc::clone(&self.shared),
            topics: topics.into_iter().map(Into::into).collect(),
        }
    }

    /// Stop accepting sends and wake every blocked consumer.
    pub fn close(&self) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.closed = true;
        }
        self.shared.records_available.notify_all();
    }
}

fn partition_for(key: Option<&str>, partitions: u32) -> i32 {
    match key {
        Some(key) => {
            let mut hasher = DefaultHasher::new();
            key.hash(&mut hasher);
            (hasher.finish() % u64::from(partitions)) as i32
        }
        None => 0,
    }
}

impl Producer for InMemoryBroker {
    fn send(&self, record: ProducerRecord, on_ack: AckCallback) -> Result<(), BrokerError> {
        let ProducerRecord {
            topic,
            key,
            payload,
            headers,
        } = record;
        let delivery = {
            let mut state = self.shared.state.lock().map_err(|_| BrokerError::Closed)?;
            if state.closed {
                return Err(BrokerError::Closed);
            }
            let partitions = state.partitions;
            let partition = partition_for(key.as_deref(), partitions);
            let topic_state = state
                .topics
                .entry(topic.clone())
                .or_insert_with(|| TopicState::new(partitions));
            let offset = topic_state.next_offsets[partition as usize];
            topic_state.next_offsets[partition as usize] += 1;
            topic_state.queue.push_back(ConsumerRecord {
                topic: topic.clone(),
                partition,
                offset,
                key,
                payload,
                headers,
            });
            Delivery {
                topic,
                partition,
                offset,
            }
        };
        self.shared.records_available.notify_all();
        on_ack(Ok(delivery));
        Ok(())
    }
}

/// Consuming half of an [`InMemoryBroker`], created by
/// [`InMemoryBroker::consumer`].
#[derive(Debug)]
pub struct InMemoryConsumer {
    shared: Arc<Shared>,
    topics: Vec<String>,
}

impl Consumer for InMemoryConsumer {
    fn poll(
        &mut self,
        max_records: usize,
        timeout: Duration,
    ) -> Result<Vec<ConsumerRecord>, BrokerError> {
        let started = Instant::now();
        let mut state = self.shared.state.lock().map_err(|_| BrokerError::Closed)?;
        loop {
            let batch = state.take_batch(&self.topics, max_records);
            if !batch.is_empty() {
                return Ok(batch);
            }
            if state.closed {
                return Err(BrokerError::Closed);
            }
            let remaining = timeout
                .checked_sub(started.elapsed())
                .unwrap_or(Duration::ZERO);
            if remaining.is_zero() {
                return Ok(Vec::new());
            }
            let (guard, _) = self
                .shared
                .records_available
                .wait_timeout(state, remaining)
                .map_err(|_| BrokerError::Closed)?;
            state = guard;
        }
    }
}

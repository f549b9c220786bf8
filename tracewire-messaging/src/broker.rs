use std::fmt;

use bytes::Bytes;
use thiserror::Error;

use crate::headers::RecordHeaders;

/// A record on its way to a broker.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProducerRecord {
    /// Destination topic.
    pub topic: String,
    /// Optional partitioning key.
    pub key: Option<String>,
    /// Record payload.
    pub payload: Bytes,
    /// Record headers, including anything a propagator injected.
    pub headers: RecordHeaders,
}

impl ProducerRecord {
    /// A keyless record for `topic` with the given payload.
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        ProducerRecord {
            topic: topic.into(),
            key: None,
            payload: payload.into(),
            headers: RecordHeaders::new(),
        }
    }

    /// Set the partitioning key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }
}

/// A record delivered by a broker.
#[derive(Clone, Debug, PartialEq)]
pub struct ConsumerRecord {
    /// Topic the record was read from.
    pub topic: String,
    /// Partition the record was read from.
    pub partition: i32,
    /// Offset of the record within its partition.
    pub offset: i64,
    /// Optional partitioning key.
    pub key: Option<String>,
    /// Record payload.
    pub payload: Bytes,
    /// Record headers as stored by the broker.
    pub headers: RecordHeaders,
}

/// Where an acknowledged record landed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    /// Topic the record was written to.
    pub topic: String,
    /// Partition the record was written to.
    pub partition: i32,
    /// Offset assigned to the record.
    pub offset: i64,
}

/// Called once per sent record with the broker's verdict.
pub type AckCallback = Box<dyn FnOnce(Result<Delivery, BrokerError>) + Send>;

/// Errors surfaced by a broker.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BrokerError {
    /// The broker is closed and accepts no further work.
    #[error("broker is closed")]
    Closed,

    /// The broker rejected or lost a record.
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// The sending half of a broker client.
///
/// `send` hands the record to the broker and returns. The acknowledgment
/// arrives later through the callback, which is invoked exactly once, from
/// an arbitrary thread. When `send` itself returns `Err` the record was
/// never handed over and the callback will not be invoked.
pub trait Producer: fmt::Debug + Send + Sync {
    /// Queue a record for delivery.
    fn send(&self, record: ProducerRecord, on_ack: AckCallback) -> Result<(), BrokerError>;
}

/// The receiving half of a broker client.
///
/// `poll` blocks up to `timeout` and returns the records available, up to
/// `max_records` of them. An empty batch after a full timeout is normal.
/// `Err(BrokerError::Closed)` means no further records will ever arrive.
pub trait Consumer: fmt::Debug + Send {
    /// Wait for the next batch of records.
    fn poll(
        &mut self,
        max_records: usize,
        timeout: std::time::Duration,
    ) -> Result<Vec<ConsumerRecord>, BrokerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn producer_record_builder() {
        let record = ProducerRecord::new("orders", "payload").with_key("customer-7");

        assert_eq!(record.topic, "orders");
        assert_eq!(record.key.as_deref(), Some("customer-7"));
        assert_eq!(record.payload, Bytes::from("payload"));
        assert!(record.headers.is_empty());
    }

    #[test]
    fn broker_error_messages() {
        assert_eq!(BrokerError::Closed.to_string(), "broker is closed");
        assert_eq!(
            BrokerError::Delivery("leader unavailable".to_string()).to_string(),
            "delivery failed: leader unavailable"
        );
    }
}

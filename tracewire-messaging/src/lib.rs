//! Messaging bindings for tracewire.
//!
//! A message hop is two boundaries. On the way out, [`TracedProducer`]
//! starts a PRODUCER span, injects its context into the record's
//! [`RecordHeaders`], and ends the span when the broker acknowledges
//! delivery. On the way in, [`ConsumerLoop`] polls a [`Consumer`] on a
//! dedicated thread and processes each record under a CONSUMER span
//! parented on the context extracted from that record's headers. The
//! `traceparent` header entry is what ties the two sides into one trace.
//!
//! The broker itself stays external behind the [`Producer`] and
//! [`Consumer`] traits; [`InMemoryBroker`] implements both for tests and
//! examples.
//!
//! ```
//! use tracewire::trace::Tracer;
//! use tracewire_messaging::{
//!     ConsumerLoop, ConsumerRecord, InMemoryBroker, ProducerRecord, TracedProducer,
//! };
//!
//! let broker = InMemoryBroker::new();
//! let tracer = Tracer::builder().build();
//!
//! let producer = TracedProducer::builder(broker.clone(), tracer.clone())
//!     .with_system("inmemory")
//!     .build();
//! producer.send(ProducerRecord::new("orders", "hello"), |_outcome| {});
//!
//! let consumer_loop = ConsumerLoop::builder(broker.consumer(["orders"]), tracer)
//!     .with_system("inmemory")
//!     .start(|record: &ConsumerRecord| {
//!         println!("got {} bytes", record.payload.len());
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! broker.close();
//! consumer_loop.shutdown().unwrap();
//! ```

#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(test, deny(warnings))]

mod broker;
mod consumer;
mod headers;
mod memory;
mod producer;

pub use broker::{
    AckCallback, BrokerError, Consumer, ConsumerRecord, Delivery, Producer, ProducerRecord,
};
pub use consumer::{ConsumerLoop, ConsumerLoopBuilder, ConsumerLoopError, HandlerError, RecordHandler};
pub use headers::RecordHeaders;
pub use memory::{InMemoryBroker, InMemoryConsumer};
pub use producer::{TracedProducer, TracedProducerBuilder};

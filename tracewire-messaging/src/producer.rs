use std::sync::{Arc, Mutex};

use tracewire::propagation::{TextMapPropagator, TraceContextPropagator};
use tracewire::trace::{Span, SpanKind, Status, Tracer};
use tracewire::{conv, Context, KeyValue};

use crate::broker::{AckCallback, BrokerError, Delivery, Producer, ProducerRecord};

/// Wraps a [`Producer`] so every record leaves under a PRODUCER span.
///
/// The span is named `"<topic> send"`, parented on the calling context,
/// and its trace context is injected into the record's headers before the
/// record reaches the broker. Because delivery completes asynchronously,
/// the span stays open until the broker's acknowledgment arrives; on
/// success it is enriched with the partition and offset the broker
/// assigned, on failure it is marked with an error status.
///
/// [`send`](TracedProducer::send) itself returns nothing. Delivery
/// failures reach the caller through its acknowledgment callback and are
/// otherwise logged and dropped, so a scheduling loop driving the
/// producer keeps its cadence no matter what the broker does.
#[derive(Clone, Debug)]
pub struct TracedProducer {
    producer: Arc<dyn Producer>,
    tracer: Tracer,
    propagator: Arc<dyn TextMapPropagator + Send + Sync>,
    system: Option<String>,
    peer: Option<(String, u16)>,
}

impl TracedProducer {
    /// Start building a traced producer over `producer`.
    pub fn builder(producer: impl Producer + 'static, tracer: Tracer) -> TracedProducerBuilder {
        TracedProducerBuilder {
            producer: Arc::new(producer),
            tracer,
            propagator: Arc::new(TraceContextPropagator::new()),
            system: None,
            peer: None,
        }
    }

    /// Send `record` under a fresh PRODUCER span.
    ///
    /// `on_ack` is invoked exactly once with the broker's verdict, whether
    /// the record was rejected up front or acknowledged later.
    pub fn send(
        &self,
        mut record: ProducerRecord,
        on_ack: impl FnOnce(Result<Delivery, BrokerError>) + Send + 'static,
    ) {
        let mut span = self
            .tracer
            .start(format!("{} send", record.topic), SpanKind::Producer);
        if let Some(system) = &self.system {
            span.set_attribute(KeyValue::new(conv::MESSAGING_SYSTEM, system.clone()));
        }
        span.set_attribute(KeyValue::new(
            conv::MESSAGING_DESTINATION,
            record.topic.clone(),
        ));
        span.set_attribute(KeyValue::new(conv::MESSAGING_OPERATION, "send"));
        if let Some((name, port)) = &self.peer {
            span.set_attribute(KeyValue::new(conv::NET_PEER_NAME, name.clone()));
            span.set_attribute(KeyValue::new(conv::NET_PEER_PORT, i64::from(*port)));
        }

        let cx = Context::new().with_span_context(span.span_context().clone());
        self.propagator.inject_context(&cx, &mut record.headers);
        tracing::debug!(
            topic = %record.topic,
            trace_id = %span.span_context().trace_id(),
            "sending traced record"
        );

        let inflight = Arc::new(Mutex::new(Some(Inflight {
            topic: record.topic.clone(),
            span,
            on_ack: Box::new(on_ack),
        })));
        let ack_slot = Arc::clone(&inflight);
        let ack: AckCallback = Box::new(move |outcome| complete(&ack_slot, outcome));

        // A producer that errors out of send never invokes the callback,
        // so the failure is completed here instead.
        if let Err(error) = self.producer.send(record, ack) {
            complete(&inflight, Err(error));
        }
    }
}

struct Inflight {
    topic: String,
    span: Span,
    on_ack: Box<dyn FnOnce(Result<Delivery, BrokerError>) + Send>,
}

/// Settle an in-flight send: end its span and run the caller's callback.
///
/// The slot is emptied under the lock, so even a producer that both
/// invokes the callback and returns an error settles the send once.
fn complete(slot: &Mutex<Option<Inflight>>, outcome: Result<Delivery, BrokerError>) {
    let taken = slot.lock().ok().and_then(|mut inflight| inflight.take());
    if let Some(Inflight {
        topic,
        mut span,
        on_ack,
    }) = taken
    {
        match &outcome {
            Ok(delivery) => {
                span.set_attribute(KeyValue::new(
                    conv::MESSAGING_DESTINATION_PARTITION,
                    i64::from(delivery.partition),
                ));
                span.set_attribute(KeyValue::new(conv::MESSAGING_OFFSET, delivery.offset));
                span.set_status(Status::Ok);
            }
            Err(error) => {
                tracing::warn!(topic = %topic, %error, "record delivery failed");
                span.record_error(error);
                span.set_status(Status::error(error.to_string()));
            }
        }
        span.end();
        on_ack(outcome);
    }
}

/// Configures and builds a [`TracedProducer`].
#[derive(Debug)]
pub struct TracedProducerBuilder {
    producer: Arc<dyn Producer>,
    tracer: Tracer,
    propagator: Arc<dyn TextMapPropagator + Send + Sync>,
    system: Option<String>,
    peer: Option<(String, u16)>,
}

impl TracedProducerBuilder {
    /// Record `messaging.system` on every span, e.g. `"kafka"`.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Record the broker endpoint as `net.peer.name` and `net.peer.port`.
    pub fn with_peer(mut self, name: impl Into<String>, port: u16) -> Self {
        self.peer = Some((name.into(), port));
        self
    }

    /// Use `propagator` instead of the W3C trace context propagator.
    pub fn with_propagator(
        mut self,
        propagator: impl TextMapPropagator + Send + Sync + 'static,
    ) -> Self {
        self.propagator = Arc::new(propagator);
        self
    }

    /// Finish the builder.
    pub fn build(self) -> TracedProducer {
        TracedProducer {
            producer: self.producer,
            tracer: self.tracer,
            propagator: self.propagator,
            system: self.system,
            peer: self.peer,
        }
    }
}

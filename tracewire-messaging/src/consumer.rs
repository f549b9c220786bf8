use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracewire::propagation::{TextMapPropagator, TraceContextPropagator};
use tracewire::trace::{SpanKind, Status, Tracer};
use tracewire::{conv, Context, KeyValue};

use crate::broker::{BrokerError, Consumer, ConsumerRecord};

/// Errors a record handler may return. They mark the record's span and
/// the loop moves on to the next record.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Business logic invoked once per consumed record.
///
/// The handler runs inside the record's CONSUMER span scope, so spans it
/// starts become children of the record span. The record span itself
/// belongs to the loop; the handler must not end it.
pub trait RecordHandler: Send {
    /// Process one record.
    fn process(&mut self, record: &ConsumerRecord) -> Result<(), HandlerError>;
}

impl<F> RecordHandler for F
where
    F: FnMut(&ConsumerRecord) -> Result<(), HandlerError> + Send,
{
    fn process(&mut self, record: &ConsumerRecord) -> Result<(), HandlerError> {
        self(record)
    }
}

/// Errors from starting or stopping a [`ConsumerLoop`].
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConsumerLoopError {
    /// The worker thread could not be spawned.
    #[error("failed to spawn consumer thread: {0}")]
    Spawn(#[from] io::Error),
    /// [`shutdown`](ConsumerLoop::shutdown) was called twice.
    #[error("consumer loop is already shut down")]
    AlreadyShutdown,
    /// The worker thread panicked.
    #[error("consumer thread panicked")]
    Panicked,
}

/// The worker alternates between waiting on the consumer and working
/// through the batch it was handed. Cancellation is only looked at on the
/// way back into `Polling`, so a record being processed always finishes.
enum LoopState {
    Polling,
    Processing(Vec<ConsumerRecord>),
}

/// Drives a [`Consumer`] on a dedicated named thread, wrapping every
/// record in its own CONSUMER span.
///
/// For each record the loop extracts the sender's context from the record
/// headers (malformed or missing headers fall back to a fresh root), starts
/// a span named `"<topic> process"` parented on whatever was extracted, and
/// runs the handler inside that span's scope. A handler error marks the
/// span and is logged; the loop then continues with the next record, so one
/// bad record never stalls the subscription.
///
/// [`shutdown`] cancels the loop and waits for the worker thread to exit.
/// The cancellation flag is read between polls, never mid-record, so
/// shutdown latency is bounded by the poll timeout plus the batch in
/// flight. Dropping the handle cancels the loop without waiting.
///
/// [`shutdown`]: ConsumerLoop::shutdown
#[derive(Debug)]
pub struct ConsumerLoop {
    name: String,
    cancel: Arc<AtomicBool>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    is_shutdown: AtomicBool,
}

impl ConsumerLoop {
    /// Start building a loop over `consumer`.
    pub fn builder(consumer: impl Consumer + 'static, tracer: Tracer) -> ConsumerLoopBuilder {
        ConsumerLoopBuilder {
            consumer: Box::new(consumer),
            tracer,
            propagator: Arc::new(TraceContextPropagator::new()),
            system: None,
            name: "tracewire-consumer".to_string(),
            max_records: 64,
            poll_timeout: Duration::from_millis(100),
        }
    }

    /// The thread name this loop was started with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cancels the loop and waits for the worker thread to exit. A batch
    /// already being processed completes first.
    ///
    /// Returns `Ok` as well when the worker already stopped on its own
    /// because the consumer reported [`BrokerError::Closed`].
    pub fn shutdown(&self) -> Result<(), ConsumerLoopError> {
        if self.is_shutdown.swap(true, Ordering::Relaxed) {
            return Err(ConsumerLoopError::AlreadyShutdown);
        }

        self.cancel.store(true, Ordering::Relaxed);

        let handle = self
            .handle
            .lock()
            .map_err(|_| ConsumerLoopError::Panicked)?
            .take();
        if let Some(handle) = handle {
            handle.join().map_err(|_| ConsumerLoopError::Panicked)?;
        }
        Ok(())
    }
}

impl Drop for ConsumerLoop {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
    }
}

/// Configures and starts a [`ConsumerLoop`].
#[derive(Debug)]
pub struct ConsumerLoopBuilder {
    consumer: Box<dyn Consumer>,
    tracer: Tracer,
    propagator: Arc<dyn TextMapPropagator + Send + Sync>,
    system: Option<String>,
    name: String,
    max_records: usize,
    poll_timeout: Duration,
}

impl ConsumerLoopBuilder {
    /// Record `messaging.system` on every span, e.g. `"kafka"`.
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
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

    /// Thread name for the worker, e.g. `"orders.consumer"`.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Upper bound on records taken per poll.
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records;
        self
    }

    /// How long one poll may block. Cancellation is observed between
    /// polls, so this also bounds shutdown latency.
    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// Spawn the worker thread and start polling.
    pub fn start(
        self,
        handler: impl RecordHandler + 'static,
    ) -> Result<ConsumerLoop, ConsumerLoopError> {
        let cancel = Arc::new(AtomicBool::new(false));
        let mut worker = Worker {
            name: self.name.clone(),
            consumer: self.consumer,
            tracer: self.tracer,
            propagator: self.propagator,
            system: self.system,
            max_records: self.max_records,
            poll_timeout: self.poll_timeout,
            cancel: Arc::clone(&cancel),
            handler,
        };
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || worker.run())?;

        Ok(ConsumerLoop {
            name: self.name,
            cancel,
            handle: Mutex::new(Some(handle)),
            is_shutdown: AtomicBool::new(false),
        })
    }
}

struct Worker<H> {
    name: String,
    consumer: Box<dyn Consumer>,
    tracer: Tracer,
    propagator: Arc<dyn TextMapPropagator + Send + Sync>,
    system: Option<String>,
    max_records: usize,
    poll_timeout: Duration,
    cancel: Arc<AtomicBool>,
    handler: H,
}

impl<H: RecordHandler> Worker<H> {
    fn run(&mut self) {
        tracing::debug!(name = %self.name, "consumer loop started");
        let mut state = LoopState::Polling;
        loop {
            state = match state {
                LoopState::Polling => {
                    if self.cancel.load(Ordering::Relaxed) {
                        tracing::debug!(name = %self.name, "consumer loop cancelled");
                        return;
                    }
                    match self.consumer.poll(self.max_records, self.poll_timeout) {
                        Ok(batch) if batch.is_empty() => LoopState::Polling,
                        Ok(batch) => LoopState::Processing(batch),
                        Err(BrokerError::Closed) => {
                            tracing::debug!(name = %self.name, "consumer closed, stopping");
                            return;
                        }
                        Err(error) => {
                            tracing::warn!(name = %self.name, %error, "poll failed");
                            // Keeps a consumer that fails fast from
                            // spinning the loop.
                            thread::sleep(self.poll_timeout);
                            LoopState::Polling
                        }
                    }
                }
                LoopState::Processing(batch) => {
                    for record in batch {
                        self.process_record(record);
                    }
                    LoopState::Polling
                }
            };
        }
    }

    fn process_record(&mut self, record: ConsumerRecord) {
        let parent = self
            .propagator
            .extract_with_context(&Context::new(), &record.headers);
        let mut span = self.tracer.start_with_context(
            format!("{} process", record.topic),
            SpanKind::Consumer,
            &parent,
        );
        if let Some(system) = &self.system {
            span.set_attribute(KeyValue::new(conv::MESSAGING_SYSTEM, system.clone()));
        }
        span.set_attribute(KeyValue::new(
            conv::MESSAGING_DESTINATION,
            record.topic.clone(),
        ));
        span.set_attribute(KeyValue::new(conv::MESSAGING_OPERATION, "process"));
        span.set_attribute(KeyValue::new(
            conv::MESSAGING_DESTINATION_PARTITION,
            i64::from(record.partition),
        ));
        span.set_attribute(KeyValue::new(conv::MESSAGING_OFFSET, record.offset));

        let cx = parent.with_span_context(span.span_context().clone());
        let outcome = cx.in_scope(|| self.handler.process(&record));
        match outcome {
            Ok(()) => span.set_status(Status::Ok),
            Err(error) => {
                tracing::warn!(
                    topic = %record.topic,
                    partition = record.partition,
                    offset = record.offset,
                    %error,
                    "record handler failed"
                );
                span.record_error(error.as_ref());
                span.set_status(Status::error(error.to_string()));
            }
        }
        span.end();
    }
}

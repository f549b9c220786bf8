use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use crate::conv;
use crate::trace::SpanSink;
use crate::trace_context::{SpanContext, SpanId};
use crate::KeyValue;

/// The role a span plays in the unit of work it describes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpanKind {
    /// Outbound request to a remote service, e.g. an HTTP call.
    Client,
    /// Inbound request handled by this service.
    Server,
    /// A message handed to a broker for asynchronous delivery.
    Producer,
    /// A message received from a broker and processed here.
    Consumer,
    /// Work internal to the service, not crossing a boundary.
    Internal,
}

/// Outcome of the operation a span describes.
///
/// The variants are ordered so that a plain `>` comparison expresses the
/// upgrade rule: `Unset` can become anything, `Error` can become `Ok`, and
/// `Ok` is final. [`Span::set_status`] relies on this ordering.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd)]
pub enum Status {
    /// No status recorded.
    #[default]
    Unset,
    /// The operation failed.
    Error {
        /// Short description of why.
        description: Cow<'static, str>,
    },
    /// The operation completed successfully.
    Ok,
}

impl Status {
    /// An [`Error`](Status::Error) status with the given description.
    pub fn error(description: impl Into<Cow<'static, str>>) -> Self {
        Status::Error {
            description: description.into(),
        }
    }
}

/// A span that has ended, as delivered to a [`SpanSink`].
///
/// This is an inert record: nothing mutates it after the owning [`Span`]
/// ends, and the engine holds no reference to it once the sink returns.
#[derive(Clone, Debug, PartialEq)]
pub struct FinishedSpan {
    /// The identifiers and flags this span carried on the wire.
    pub span_context: SpanContext,
    /// Span id of the parent, or [`SpanId::INVALID`] for a root span.
    pub parent_span_id: SpanId,
    /// Operation name.
    pub name: Cow<'static, str>,
    /// The span's role.
    pub kind: SpanKind,
    /// When the span was started.
    pub start_time: SystemTime,
    /// When the span ended.
    pub end_time: SystemTime,
    /// Key-value attributes, at most one entry per key.
    pub attributes: Vec<KeyValue>,
    /// Final outcome.
    pub status: Status,
}

impl FinishedSpan {
    /// Whether this span was a root, i.e. had no parent.
    pub fn is_root(&self) -> bool {
        self.parent_span_id == SpanId::INVALID
    }
}

/// The mutable state of a live span. Taken out of the [`Span`] on end so a
/// second end finds nothing left to do.
pub(crate) struct SpanData {
    pub(crate) parent_span_id: SpanId,
    pub(crate) name: Cow<'static, str>,
    pub(crate) kind: SpanKind,
    pub(crate) start_time: SystemTime,
    pub(crate) end_time: SystemTime,
    pub(crate) attributes: Vec<KeyValue>,
    pub(crate) status: Status,
}

/// A single operation in flight.
///
/// A span is single-owner: it is handed to exactly one caller and never
/// stored in a [`Context`](crate::Context), so all mutators take `&mut self`
/// and no synchronization is involved. What does travel across threads and
/// boundaries is the span's [`SpanContext`], which stays readable even after
/// the span ends.
pub struct Span {
    span_context: SpanContext,
    data: Option<SpanData>,
    sink: Option<Arc<dyn SpanSink>>,
}

impl Span {
    pub(crate) fn new(
        span_context: SpanContext,
        data: SpanData,
        sink: Option<Arc<dyn SpanSink>>,
    ) -> Self {
        Span {
            span_context,
            data: Some(data),
            sink,
        }
    }

    /// The identifiers this span propagates to its children and to remote
    /// peers. Readable for the span's whole lifetime, ended or not.
    pub fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    /// Whether the span is still live. `false` once the span has ended.
    pub fn is_recording(&self) -> bool {
        self.data.is_some()
    }

    /// Operate on the mutable data, if the span has not ended yet.
    fn with_data<T>(&mut self, f: impl FnOnce(&mut SpanData) -> T) -> Option<T> {
        self.data.as_mut().map(f)
    }

    /// Sets an attribute, replacing any previous value recorded under the
    /// same key. No-op after the span has ended.
    pub fn set_attribute(&mut self, attribute: KeyValue) {
        self.with_data(|data| {
            match data.attributes.iter_mut().find(|kv| kv.key == attribute.key) {
                Some(existing) => existing.value = attribute.value,
                None => data.attributes.push(attribute),
            }
        });
    }

    /// Sets the status, honoring the upgrade order of [`Status`]: a status
    /// never goes backwards, so `Ok` cannot be overwritten by `Error` and
    /// nothing overwrites it back to `Unset`. No-op after the span has ended.
    pub fn set_status(&mut self, status: Status) {
        self.with_data(|data| {
            // The status ordering makes this a simple comparison.
            if status > data.status {
                data.status = status;
            }
        });
    }

    /// Records a failure as an `exception.message` attribute.
    ///
    /// This captures what went wrong; pair it with
    /// [`set_status`](Span::set_status) to mark the span failed.
    pub fn record_error(&mut self, err: &dyn Error) {
        self.set_attribute(KeyValue::new(conv::EXCEPTION_MESSAGE, err.to_string()));
    }

    /// Ends the span now. The first call delivers the span to the sink;
    /// subsequent calls do nothing.
    pub fn end(&mut self) {
        self.ensure_ended(None);
    }

    /// Ends the span at the given time instead of now.
    pub fn end_with_timestamp(&mut self, timestamp: SystemTime) {
        self.ensure_ended(Some(timestamp));
    }

    fn ensure_ended(&mut self, timestamp: Option<SystemTime>) {
        // Taking the data makes ending idempotent.
        let Some(mut data) = self.data.take() else {
            return;
        };

        match timestamp {
            Some(timestamp) => data.end_time = timestamp,
            // end_time is initialized to start_time, so an unchanged value
            // means no explicit timestamp was recorded.
            None if data.end_time == data.start_time => {
                data.end_time = SystemTime::now();
            }
            None => {}
        }

        if let Some(sink) = &self.sink {
            sink.on_end(FinishedSpan {
                span_context: self.span_context.clone(),
                parent_span_id: data.parent_span_id,
                name: data.name,
                kind: data.kind,
                start_time: data.start_time,
                end_time: data.end_time,
                attributes: data.attributes,
                status: data.status,
            });
        }
    }
}

impl Drop for Span {
    /// A span dropped without an explicit end still reaches the sink.
    fn drop(&mut self) {
        self.ensure_ended(None);
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Span");
        s.field("span_context", &self.span_context);
        match &self.data {
            Some(data) => s
                .field("name", &data.name)
                .field("kind", &data.kind)
                .field("status", &data.status),
            None => s.field("ended", &true),
        };
        s.finish()
    }
}

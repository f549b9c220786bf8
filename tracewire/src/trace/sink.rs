use std::fmt;

use crate::trace::FinishedSpan;

/// Receives every span at the moment it ends.
///
/// The engine calls [`on_end`](SpanSink::on_end) synchronously from whichever
/// thread ends the span, so implementations should hand the record off
/// quickly rather than block. A sink is shared by all clones of a
/// [`Tracer`](crate::trace::Tracer), hence `&self` and the thread-safety
/// bounds.
pub trait SpanSink: Send + Sync + fmt::Debug {
    /// Called once per span, after which the engine drops the record.
    fn on_end(&self, span: FinishedSpan);
}

/// A [`SpanSink`] that stores finished spans in memory.
///
/// Cloning is shallow: all clones view the same storage, so a test can hand
/// one clone to a tracer and query another.
///
/// # Example
///
/// ```
/// use tracewire::trace::{InMemorySpanSink, SpanKind, Tracer};
///
/// let sink = InMemorySpanSink::new();
/// let tracer = Tracer::builder().with_sink(sink.clone()).build();
///
/// tracer.start("lookup", SpanKind::Internal).end();
///
/// assert_eq!(sink.finished_spans().len(), 1);
/// ```
#[cfg(any(test, feature = "testing"))]
#[derive(Clone, Debug, Default)]
pub struct InMemorySpanSink {
    spans: std::sync::Arc<std::sync::Mutex<Vec<FinishedSpan>>>,
}

#[cfg(any(test, feature = "testing"))]
impl InMemorySpanSink {
    /// An empty sink.
    pub fn new() -> Self {
        InMemorySpanSink::default()
    }

    /// The spans recorded so far, in end order.
    pub fn finished_spans(&self) -> Vec<FinishedSpan> {
        self.spans
            .lock()
            .map(|spans| spans.clone())
            .unwrap_or_default()
    }

    /// Clears the recorded spans.
    pub fn reset(&self) {
        let _ = self.spans.lock().map(|mut spans| spans.clear());
    }
}

#[cfg(any(test, feature = "testing"))]
impl SpanSink for InMemorySpanSink {
    fn on_end(&self, span: FinishedSpan) {
        let _ = self.spans.lock().map(|mut spans| spans.push(span));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{SpanKind, Status};
    use crate::trace_context::{SpanContext, SpanId, TraceFlags, TraceId};
    use std::borrow::Cow;
    use std::time::SystemTime;

    fn finished_span(name: &'static str) -> FinishedSpan {
        let now = SystemTime::now();
        FinishedSpan {
            span_context: SpanContext::new(
                TraceId::from(1),
                SpanId::from(2),
                TraceFlags::SAMPLED,
                false,
            ),
            parent_span_id: SpanId::INVALID,
            name: Cow::Borrowed(name),
            kind: SpanKind::Internal,
            start_time: now,
            end_time: now,
            attributes: Vec::new(),
            status: Status::Unset,
        }
    }

    #[test]
    fn clones_share_storage() {
        let sink = InMemorySpanSink::new();
        let clone = sink.clone();
        sink.on_end(finished_span("first"));
        clone.on_end(finished_span("second"));

        let spans = sink.finished_spans();
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].name, "first");
        assert_eq!(spans[1].name, "second");
    }

    #[test]
    fn reset_clears_spans() {
        let sink = InMemorySpanSink::new();
        sink.on_end(finished_span("gone"));
        sink.reset();
        assert!(sink.finished_spans().is_empty());
    }
}

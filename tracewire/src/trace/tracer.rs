use std::borrow::Cow;
use std::sync::Arc;
use std::time::SystemTime;

use crate::context::Context;
use crate::trace::span::SpanData;
use crate::trace::{IdGenerator, RandomIdGenerator, Span, SpanKind, SpanSink, Status};
use crate::trace_context::{SpanContext, SpanId, TraceFlags};

/// Starts spans and decides how they parent.
///
/// A tracer is cheap to clone; clones share the id generator and sink. Build
/// one at startup and hand clones to each boundary wrapper:
///
/// ```
/// use tracewire::trace::{SpanKind, Tracer};
///
/// let tracer = Tracer::builder().build();
/// let mut span = tracer.start("render", SpanKind::Internal);
/// span.end();
/// ```
///
/// New spans parent on the calling thread's current [`Context`]: a valid
/// current span context yields a child in the same trace, anything else
/// yields a sampled root with a fresh trace id.
#[derive(Clone, Debug)]
pub struct Tracer {
    inner: Arc<TracerInner>,
}

#[derive(Debug)]
struct TracerInner {
    id_generator: Box<dyn IdGenerator>,
    sink: Option<Arc<dyn SpanSink>>,
}

impl Tracer {
    /// A builder with the default random id generator and no sink.
    pub fn builder() -> TracerBuilder {
        TracerBuilder::default()
    }

    /// Starts a span parented on the current context.
    pub fn start(&self, name: impl Into<Cow<'static, str>>, kind: SpanKind) -> Span {
        let name = name.into();
        Context::map_current(|cx| self.build_span(name, kind, cx.span_context()))
    }

    /// Starts a span parented on `parent` instead of the current context.
    ///
    /// Inbound wrappers use this with the context extracted from a carrier:
    /// an empty or invalid `parent` starts a fresh root, which is what makes
    /// malformed incoming headers harmless.
    pub fn start_with_context(
        &self,
        name: impl Into<Cow<'static, str>>,
        kind: SpanKind,
        parent: &Context,
    ) -> Span {
        self.build_span(name.into(), kind, parent.span_context())
    }

    /// Starts a span, runs `f` with the span current, then ends it.
    ///
    /// Spans started inside `f` become children of this one, on this thread.
    /// The span ends when `f` returns, or on unwind if `f` panics.
    pub fn in_span<T>(
        &self,
        name: impl Into<Cow<'static, str>>,
        kind: SpanKind,
        f: impl FnOnce(&mut Span) -> T,
    ) -> T {
        let mut span = self.start(name, kind);
        let cx = Context::current_with_span_context(span.span_context().clone());
        let guard = cx.attach();
        let value = f(&mut span);
        drop(guard);
        span.end();
        value
    }

    fn build_span(&self, name: Cow<'static, str>, kind: SpanKind, parent: Option<&SpanContext>) -> Span {
        let (trace_id, parent_span_id, trace_flags) = match parent.filter(|sc| sc.is_valid()) {
            Some(parent) => (parent.trace_id(), parent.span_id(), parent.trace_flags()),
            None => (
                self.inner.id_generator.new_trace_id(),
                SpanId::INVALID,
                TraceFlags::SAMPLED,
            ),
        };
        let span_context = SpanContext::new(
            trace_id,
            self.inner.id_generator.new_span_id(),
            trace_flags,
            false,
        );
        let start_time = SystemTime::now();

        Span::new(
            span_context,
            SpanData {
                parent_span_id,
                name,
                kind,
                start_time,
                end_time: start_time,
                attributes: Vec::new(),
                status: Status::Unset,
            },
            self.inner.sink.clone(),
        )
    }
}

/// Configures and builds a [`Tracer`].
#[derive(Debug)]
pub struct TracerBuilder {
    id_generator: Box<dyn IdGenerator>,
    sink: Option<Arc<dyn SpanSink>>,
}

impl Default for TracerBuilder {
    fn default() -> Self {
        TracerBuilder {
            id_generator: Box::new(RandomIdGenerator::default()),
            sink: None,
        }
    }
}

impl TracerBuilder {
    /// Replaces the [`RandomIdGenerator`] default.
    pub fn with_id_generator(mut self, id_generator: impl IdGenerator + 'static) -> Self {
        self.id_generator = Box::new(id_generator);
        self
    }

    /// Delivers every finished span to `sink`. Without a sink, spans still
    /// run their full lifecycle but the records go nowhere.
    pub fn with_sink(mut self, sink: impl SpanSink + 'static) -> Self {
        self.sink = Some(Arc::new(sink));
        self
    }

    /// Builds the tracer.
    pub fn build(self) -> Tracer {
        Tracer {
            inner: Arc::new(TracerInner {
                id_generator: self.id_generator,
                sink: self.sink,
            }),
        }
    }
}

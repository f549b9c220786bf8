//! The span lifecycle: spans, the tracer that starts them, identifier
//! generation, and the sink that receives finished spans.
//!
//! A [`Tracer`] is built once at startup and cloned into every boundary
//! wrapper. [`Tracer::start`] parents the new span on the calling thread's
//! current [`Context`](crate::Context); [`Tracer::start_with_context`] takes
//! an explicit parent instead, which is how inbound wrappers parent on an
//! extracted remote context. Ending is exactly-once: a second `end` call is a
//! no-op, and dropping an unended [`Span`] ends it.

mod id_generator;
mod sink;
mod span;
mod tracer;

pub use id_generator::{IdGenerator, RandomIdGenerator};
pub use sink::SpanSink;
pub use span::{FinishedSpan, Span, SpanKind, Status};
pub use tracer::{Tracer, TracerBuilder};

#[cfg(any(test, feature = "testing"))]
pub use id_generator::SequentialIdGenerator;
#[cfg(any(test, feature = "testing"))]
pub use sink::InMemorySpanSink;

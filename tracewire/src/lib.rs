//! # Tracewire
//!
//! Tracewire is a trace-context propagation and span-lifecycle engine. It
//! reconstructs one logical operation that crosses process and transport
//! boundaries (an HTTP call, a message hop through a broker) into a single
//! coherent trace: spans are started on each side of a boundary with the
//! correct parent, the identifying context travels inside the transport's
//! own key-value surface, and every span ends exactly once no matter how the
//! wrapped operation exits.
//!
//! This crate is the core. It provides:
//!
//! - [`Context`] and its thread-local stack, giving each execution unit its
//!   own "current" trace context with RAII scoping,
//! - the identifier types ([`TraceId`], [`SpanId`], [`TraceFlags`]) and the
//!   propagated triple [`SpanContext`],
//! - the [`trace`] module: [`Span`](trace::Span), [`Tracer`](trace::Tracer),
//!   id generation, and the finished-span sink seam,
//! - the [`propagation`] module: carrier traits plus the W3C `traceparent`
//!   codec,
//! - the [`schedule`] module: fixed-rate background workers with cooperative
//!   cancellation, used to drive periodic instrumented calls.
//!
//! Transport bindings live in companion crates: `tracewire-http` for HTTP
//! header carriers and the outbound client wrapper, `tracewire-messaging`
//! for broker record headers, the producer wrapper, and the consumer poll
//! loop.
//!
//! Nothing in this crate is process-global: a [`Tracer`](trace::Tracer) and a
//! propagator are constructed once at startup and handed to each boundary
//! wrapper.
//!
//! # Examples
//!
//! ```
//! use tracewire::trace::{SpanKind, Tracer};
//! use tracewire::Context;
//!
//! let tracer = Tracer::builder().build();
//!
//! // Root span: nothing is attached, so a fresh trace id is allocated.
//! let mut span = tracer.start("startup", SpanKind::Internal);
//! {
//!     let _guard = Context::current().with_span_context(span.span_context().clone()).attach();
//!     // Work done here sees the span's context as current and can start
//!     // correctly-parented children.
//! }
//! span.end();
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

mod common;
mod context;
mod trace_context;

pub mod conv;
pub mod propagation;
pub mod schedule;
pub mod trace;

pub use common::{Key, KeyValue, Value};
pub use context::{Context, ContextGuard};
pub use trace_context::{SpanContext, SpanId, TraceFlags, TraceId};

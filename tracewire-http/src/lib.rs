//! HTTP bindings for tracewire.
//!
//! [`HeaderInjector`] and [`HeaderExtractor`] expose an [`http::HeaderMap`]
//! through the tracewire carrier traits, letting any propagator read and
//! write real request headers. On top of them, [`TracedHttpClient`] wraps a
//! blocking [`HttpTransport`] so every outbound request carries the current
//! trace context and is described by a CLIENT span.
//!
//! Inbound handling needs no wrapper type: extract a context from the
//! request headers and start a SERVER span on it.
//!
//! ```
//! use tracewire::propagation::{TextMapPropagator, TraceContextPropagator};
//! use tracewire::trace::{SpanKind, Status, Tracer};
//! use tracewire_http::HeaderExtractor;
//!
//! fn handle(request: http::Request<bytes::Bytes>, tracer: &Tracer) {
//!     let propagator = TraceContextPropagator::new();
//!     let parent = propagator.extract(&HeaderExtractor(request.headers()));
//!     let mut span = tracer.start_with_context("handle request", SpanKind::Server, &parent);
//!     let _guard = parent.with_span_context(span.span_context().clone()).attach();
//!     // ... dispatch to the application ...
//!     span.set_status(Status::Ok);
//!     span.end();
//! }
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

use std::borrow::Cow;
use std::fmt::Debug;

#[doc(no_inline)]
pub use bytes::Bytes;
#[doc(no_inline)]
pub use http::{Request, Response};
use tracewire::propagation::{Extractor, Injector};

mod client;

pub use client::{TracedHttpClient, TracedHttpClientBuilder};

/// Injects carrier entries as headers of an HTTP request.
#[derive(Debug)]
pub struct HeaderInjector<'a>(pub &'a mut http::HeaderMap);

impl Injector for HeaderInjector<'_> {
    /// Writes the entry as a header. An invalid header name or value is
    /// dropped without error.
    fn set(&mut self, key: &str, value: String) {
        if let Ok(name) = http::header::HeaderName::from_bytes(key.as_bytes()) {
            if let Ok(val) = http::header::HeaderValue::from_str(&value) {
                self.0.insert(name, val);
            }
        }
    }
}

/// Reads the headers of an HTTP request as carrier entries.
#[derive(Debug)]
pub struct HeaderExtractor<'a>(pub &'a http::HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    /// Reads a header value. For a repeated header this is the first value;
    /// a value that is not valid ASCII reads as absent.
    fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        self.0
            .get(key)
            .and_then(|value| value.to_str().ok())
            .map(Cow::Borrowed)
    }

    /// Lists the header names present in the map.
    fn keys(&self) -> Vec<Cow<'_, str>> {
        self.0
            .keys()
            .map(|name| Cow::Borrowed(name.as_str()))
            .collect::<Vec<_>>()
    }
}

/// Errors produced by an [`HttpTransport`].
pub type HttpError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A minimal interface for sending a request and waiting for the response.
///
/// [`TracedHttpClient`] instruments whatever implements this, so
/// applications bring their own connection handling. The transport reports
/// `Err` only when no response was obtained at all; responses with failure
/// status codes come back as `Ok`.
pub trait HttpTransport: Debug + Send + Sync {
    /// Send the request and block until the response arrives.
    fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HttpError>;
}

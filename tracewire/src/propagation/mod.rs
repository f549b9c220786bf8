//! Carrying trace context across process boundaries.
//!
//! A propagator reads and writes context through a carrier, the key-value
//! view of whatever actually crosses the wire: HTTP headers, message record
//! headers, or a plain map. Carriers implement [`Injector`] on the outbound
//! side and [`Extractor`] on the inbound side; [`TextMapPropagator`] encodes
//! the context itself. The one wire format here is the W3C `traceparent`
//! header, implemented by [`TraceContextPropagator`].
//!
//! Extraction never fails: a missing or malformed carrier entry yields an
//! empty [`Context`], and the caller starts a fresh trace from it.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use crate::context::Context;

mod trace_context;

pub use trace_context::{TraceContextPropagator, TRACEPARENT_HEADER};

/// Writes string key-value pairs into a carrier.
pub trait Injector {
    /// Add a key and value to the carrier.
    fn set(&mut self, key: &str, value: String);
}

/// Reads string key-value pairs from a carrier.
pub trait Extractor {
    /// Get the value for a key, or `None` if it is absent. Carriers that
    /// admit repeated keys return the value written last.
    fn get(&self, key: &str) -> Option<Cow<'_, str>>;

    /// All keys present in the carrier, repeats included.
    fn keys(&self) -> Vec<Cow<'_, str>>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    /// Stores the entry under the lowercased key.
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    /// Looks the key up case-insensitively.
    fn get(&self, key: &str) -> Option<Cow<'_, str>> {
        self.get(&key.to_lowercase())
            .map(|v| Cow::Borrowed(v.as_str()))
    }

    /// Lists the stored keys.
    fn keys(&self) -> Vec<Cow<'_, str>> {
        self.keys()
            .map(|k| Cow::Borrowed(k.as_str()))
            .collect::<Vec<_>>()
    }
}

/// Encodes context into carriers and decodes it back out.
///
/// `inject` and `extract` are conveniences over the `_context` variants,
/// using the calling thread's current [`Context`].
pub trait TextMapPropagator: fmt::Debug {
    /// Encode the given context into the carrier.
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector);

    /// Encode the current context into the carrier.
    fn inject(&self, injector: &mut dyn Injector) {
        Context::map_current(|cx| self.inject_context(cx, injector))
    }

    /// Decode a context from the carrier, built on top of `cx`. Returns `cx`
    /// unchanged when the carrier holds nothing usable.
    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context;

    /// Decode a context from the carrier, built on top of the current
    /// context.
    fn extract(&self, extractor: &dyn Extractor) -> Context {
        Context::map_current(|cx| self.extract_with_context(cx, extractor))
    }

    /// The carrier keys this propagator reads and writes.
    fn fields(&self) -> &[&'static str];
}

use std::borrow::Cow;

use crate::context::Context;
use crate::propagation::{Extractor, Injector, TextMapPropagator};
use crate::trace_context::{SpanContext, SpanId, TraceFlags, TraceId};

const SUPPORTED_VERSION: u8 = 0;
const MAX_VERSION: u8 = 254;

/// The carrier key under which context travels, `traceparent`.
pub const TRACEPARENT_HEADER: &str = "traceparent";

const TRACE_CONTEXT_FIELDS: [&str; 1] = [TRACEPARENT_HEADER];

fn is_lower_hex(value: &str, width: usize) -> bool {
    value.len() == width && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Propagates `SpanContext`s in the [W3C TraceContext] format under the
/// `traceparent` header.
///
/// The header value has four dash-separated fields:
///
/// `traceparent: 00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01`
///
///    - version
///    - trace-id
///    - parent-id
///    - trace-flags
///
/// Injection writes version `00` and masks the flags down to the sampled
/// bit. Extraction demands fixed-width lowercase hex in all four fields and
/// accepts any version up to 254, requiring exactly four fields when the
/// version is `00` and tolerating extra fields otherwise.
/// A value that fails any check yields an unchanged context rather than an
/// error, so a peer sending garbage cannot break the receiving service.
///
/// [W3C TraceContext]: https://www.w3.org/TR/trace-context/
#[derive(Clone, Debug, Default)]
pub struct TraceContextPropagator {
    _private: (),
}

impl TraceContextPropagator {
    /// Returns a propagator for the `traceparent` header.
    pub fn new() -> Self {
        TraceContextPropagator { _private: () }
    }

    /// Extract a span context from a w3c trace-context header.
    fn extract_span_context(&self, extractor: &dyn Extractor) -> Result<SpanContext, ()> {
        let header_value = extractor
            .get(TRACEPARENT_HEADER)
            .unwrap_or(Cow::Borrowed(""));
        let header_value = header_value.trim();
        let parts = header_value.split_terminator('-').collect::<Vec<&str>>();
        if parts.len() < 4 {
            return Err(());
        }

        // Every field is fixed-width lowercase hex. The integer parses
        // below are laxer than the header grammar: they would take short,
        // uppercase, or sign-prefixed input.
        if !is_lower_hex(parts[0], 2)
            || !is_lower_hex(parts[1], 32)
            || !is_lower_hex(parts[2], 16)
            || !is_lower_hex(parts[3], 2)
        {
            return Err(());
        }

        // Version ff is reserved; version 00 admits no extra fields.
        let version = u8::from_str_radix(parts[0], 16).map_err(|_| ())?;
        if version > MAX_VERSION || version == 0 && parts.len() != 4 {
            return Err(());
        }

        let trace_id = TraceId::from_hex(parts[1]).map_err(|_| ())?;
        let span_id = SpanId::from_hex(parts[2]).map_err(|_| ())?;

        // Version 00 defines only the low two flag bits.
        let opts = u8::from_str_radix(parts[3], 16).map_err(|_| ())?;
        if version == 0 && opts > 2 {
            return Err(());
        }

        // Only the sampled bit survives extraction.
        let trace_flags = TraceFlags::new(opts) & TraceFlags::SAMPLED;

        let span_context = SpanContext::new(trace_id, span_id, trace_flags, true);
        if !span_context.is_valid() {
            return Err(());
        }

        Ok(span_context)
    }
}

impl TextMapPropagator for TraceContextPropagator {
    /// Encodes the values of the `SpanContext` and injects them into the
    /// `Injector`. An empty or invalid context writes nothing.
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        if let Some(span_context) = cx.span_context().filter(|sc| sc.is_valid()) {
            let header_value = format!(
                "{:02x}-{}-{}-{:02x}",
                SUPPORTED_VERSION,
                span_context.trace_id(),
                span_context.span_id(),
                span_context.trace_flags() & TraceFlags::SAMPLED
            );
            injector.set(TRACEPARENT_HEADER, header_value);
        }
    }

    /// Retrieves an encoded `SpanContext` using the `Extractor` and returns
    /// `cx` extended with it. If no `SpanContext` was retrieved or the
    /// retrieved one is invalid, `cx` is returned unchanged.
    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        self.extract_span_context(extractor)
            .map(|sc| cx.with_span_context(sc))
            .unwrap_or_else(|_| cx.clone())
    }

    fn fields(&self) -> &[&'static str] {
        &TRACE_CONTEXT_FIELDS
    }
}

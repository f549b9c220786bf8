use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::{Request, Response};
use tracewire::propagation::{TextMapPropagator, TraceContextPropagator};
use tracewire::trace::{SpanKind, Status, Tracer};
use tracewire::{conv, Context, KeyValue};

use crate::{HeaderInjector, HttpError, HttpTransport};

type DurationHook = Arc<dyn Fn(Duration) + Send + Sync>;

/// An HTTP client wrapper that traces every request it sends.
///
/// Each [`execute`](TracedHttpClient::execute) call starts a CLIENT span
/// parented on the calling thread's current context, injects the span's
/// context into the outgoing headers, and ends the span once the transport
/// returns. The response comes back untouched: a failure status code is
/// recorded on the span, not turned into an error.
///
/// Cloning is cheap and clones share the transport, tracer, and propagator.
#[derive(Clone)]
pub struct TracedHttpClient {
    transport: Arc<dyn HttpTransport>,
    tracer: Tracer,
    propagator: Arc<dyn TextMapPropagator + Send + Sync>,
    on_duration: Option<DurationHook>,
}

impl TracedHttpClient {
    /// A builder wrapping `transport`, with the W3C propagator and no
    /// duration hook.
    pub fn builder(
        transport: impl HttpTransport + 'static,
        tracer: Tracer,
    ) -> TracedHttpClientBuilder {
        TracedHttpClientBuilder {
            transport: Arc::new(transport),
            tracer,
            propagator: Arc::new(TraceContextPropagator::new()),
            on_duration: None,
        }
    }

    /// Sends `request` through the wrapped transport, tracing the attempt.
    ///
    /// The span records the request method and URL up front and the outcome
    /// after: the status code and [`Status::Ok`] on a response below 400, a
    /// [`Status::Error`] on 400 and above or when the transport fails. The
    /// span ends before this method returns, on every path.
    pub fn execute(&self, mut request: Request<Bytes>) -> Result<Response<Bytes>, HttpError> {
        let mut span = self
            .tracer
            .start(format!("HTTP {}", request.method()), SpanKind::Client);
        span.set_attribute(KeyValue::new(
            conv::HTTP_METHOD,
            request.method().as_str().to_string(),
        ));
        span.set_attribute(KeyValue::new(conv::HTTP_URL, request.uri().to_string()));
        if let Some(scheme) = request.uri().scheme_str() {
            span.set_attribute(KeyValue::new(conv::HTTP_SCHEME, scheme.to_string()));
        }
        if let Some(host) = request.uri().host() {
            span.set_attribute(KeyValue::new(conv::NET_PEER_NAME, host.to_string()));
        }
        if let Some(port) = request.uri().port_u16() {
            span.set_attribute(KeyValue::new(conv::NET_PEER_PORT, i64::from(port)));
        }

        let cx = Context::current_with_span_context(span.span_context().clone());
        self.propagator
            .inject_context(&cx, &mut HeaderInjector(request.headers_mut()));

        tracing::debug!(method = %request.method(), uri = %request.uri(), "sending traced request");

        let started = Instant::now();
        let result = cx.in_scope(|| self.transport.execute(request));
        let elapsed = started.elapsed();

        match &result {
            Ok(response) => {
                let status_code = response.status().as_u16();
                span.set_attribute(KeyValue::new(
                    conv::HTTP_STATUS_CODE,
                    i64::from(status_code),
                ));
                if status_code >= 400 {
                    span.set_status(Status::error(format!("HTTP status {status_code}")));
                } else {
                    span.set_status(Status::Ok);
                }
            }
            Err(error) => {
                span.record_error(error.as_ref());
                span.set_status(Status::error(error.to_string()));
            }
        }

        if let Some(on_duration) = &self.on_duration {
            on_duration(elapsed);
        }
        span.end();
        result
    }
}

impl fmt::Debug for TracedHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracedHttpClient")
            .field("transport", &self.transport)
            .field("propagator", &self.propagator)
            .field("has_duration_hook", &self.on_duration.is_some())
            .finish()
    }
}

/// Configures and builds a [`TracedHttpClient`].
pub struct TracedHttpClientBuilder {
    transport: Arc<dyn HttpTransport>,
    tracer: Tracer,
    propagator: Arc<dyn TextMapPropagator + Send + Sync>,
    on_duration: Option<DurationHook>,
}

impl TracedHttpClientBuilder {
    /// Replaces the W3C trace-context propagator default.
    pub fn with_propagator(
        mut self,
        propagator: impl TextMapPropagator + Send + Sync + 'static,
    ) -> Self {
        self.propagator = Arc::new(propagator);
        self
    }

    /// Calls `hook` with the transport round-trip time of every request,
    /// successful or not. Useful for feeding a latency metric without
    /// parsing spans.
    pub fn with_duration_hook(mut self, hook: impl Fn(Duration) + Send + Sync + 'static) -> Self {
        self.on_duration = Some(Arc::new(hook));
        self
    }

    /// Builds the client.
    pub fn build(self) -> TracedHttpClient {
        TracedHttpClient {
            transport: self.transport,
            tracer: self.tracer,
            propagator: self.propagator,
            on_duration: self.on_duration,
        }
    }
}

impl fmt::Debug for TracedHttpClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracedHttpClientBuilder")
            .field("transport", &self.transport)
            .field("propagator", &self.propagator)
            .field("has_duration_hook", &self.on_duration.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tracewire::trace::{FinishedSpan, InMemorySpanSink, SequentialIdGenerator};
    use tracewire::{SpanContext, SpanId, TraceFlags, TraceId, Value};

    #[derive(Clone, Copy, Debug)]
    enum Outcome {
        Status(u16),
        Error(&'static str),
    }

    #[derive(Clone, Debug, Default)]
    struct MockTransport {
        seen_headers: Arc<Mutex<Vec<http::HeaderMap>>>,
        seen_contexts: Arc<Mutex<Vec<Option<SpanContext>>>>,
        outcomes: Arc<Mutex<VecDeque<Outcome>>>,
    }

    impl HttpTransport for MockTransport {
        fn execute(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HttpError> {
            self.seen_headers
                .lock()
                .unwrap()
                .push(request.headers().clone());
            self.seen_contexts
                .lock()
                .unwrap()
                .push(Context::current().span_context().cloned());
            match self
                .outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Outcome::Status(200))
            {
                Outcome::Status(code) => {
                    Ok(Response::builder().status(code).body(Bytes::new()).unwrap())
                }
                Outcome::Error(message) => Err(message.into()),
            }
        }
    }

    fn client_with(outcomes: &[Outcome]) -> (TracedHttpClient, MockTransport, InMemorySpanSink) {
        let transport = MockTransport::default();
        transport.outcomes.lock().unwrap().extend(outcomes.iter().copied());
        let sink = InMemorySpanSink::new();
        let tracer = Tracer::builder()
            .with_id_generator(SequentialIdGenerator::new())
            .with_sink(sink.clone())
            .build();
        let client = TracedHttpClient::builder(transport.clone(), tracer).build();
        (client, transport, sink)
    }

    fn get_request(url: &str) -> Request<Bytes> {
        Request::builder()
            .method("GET")
            .uri(url)
            .body(Bytes::new())
            .unwrap()
    }

    fn attr<'a>(span: &'a FinishedSpan, key: &str) -> Option<&'a Value> {
        span.attributes
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| &kv.value)
    }

    fn sent_traceparent(transport: &MockTransport, index: usize) -> String {
        transport.seen_headers.lock().unwrap()[index]
            .get("traceparent")
            .expect("traceparent header should be injected")
            .to_str()
            .unwrap()
            .to_string()
    }

    #[test]
    fn injects_traceparent_of_the_client_span() {
        let (client, transport, sink) = client_with(&[Outcome::Status(200)]);

        client
            .execute(get_request("http://svc.local/orders"))
            .unwrap();

        let span = &sink.finished_spans()[0];
        let expected = format!(
            "00-{}-{}-01",
            span.span_context.trace_id(),
            span.span_context.span_id()
        );
        assert_eq!(sent_traceparent(&transport, 0), expected);
    }

    #[test]
    fn records_method_url_status_and_name() {
        let (client, _transport, sink) = client_with(&[Outcome::Status(200)]);

        let response = client
            .execute(get_request("http://svc.local:8080/orders?id=7"))
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);

        let span = &sink.finished_spans()[0];
        assert_eq!(span.name, "HTTP GET");
        assert_eq!(span.kind, SpanKind::Client);
        assert_eq!(span.status, Status::Ok);
        assert_eq!(
            attr(span, conv::HTTP_METHOD),
            Some(&Value::from("GET".to_string()))
        );
        assert_eq!(
            attr(span, conv::HTTP_URL),
            Some(&Value::from("http://svc.local:8080/orders?id=7".to_string()))
        );
        assert_eq!(
            attr(span, conv::HTTP_SCHEME),
            Some(&Value::from("http".to_string()))
        );
        assert_eq!(
            attr(span, conv::NET_PEER_NAME),
            Some(&Value::from("svc.local".to_string()))
        );
        assert_eq!(attr(span, conv::NET_PEER_PORT), Some(&Value::from(8080)));
        assert_eq!(attr(span, conv::HTTP_STATUS_CODE), Some(&Value::from(200)));
    }

    #[test]
    fn transport_runs_in_span_scope() {
        let (client, transport, sink) = client_with(&[Outcome::Status(200)]);

        assert!(Context::current().is_empty());
        client
            .execute(get_request("http://svc.local/orders"))
            .unwrap();
        assert!(Context::current().is_empty(), "scope ends with the call");

        let span = &sink.finished_spans()[0];
        assert_eq!(
            transport.seen_contexts.lock().unwrap()[0].as_ref(),
            Some(&span.span_context),
            "transport sees the client span as current"
        );
    }

    #[test]
    fn failure_status_marks_span_error() {
        let (client, _transport, sink) = client_with(&[Outcome::Status(500), Outcome::Status(404)]);

        let response = client.execute(get_request("http://svc.local/a")).unwrap();
        assert_eq!(response.status().as_u16(), 500, "response passes through");
        let response = client.execute(get_request("http://svc.local/b")).unwrap();
        assert_eq!(response.status().as_u16(), 404);

        let spans = sink.finished_spans();
        assert_eq!(spans[0].status, Status::error("HTTP status 500"));
        assert_eq!(attr(&spans[0], conv::HTTP_STATUS_CODE), Some(&Value::from(500)));
        assert_eq!(spans[1].status, Status::error("HTTP status 404"));
    }

    #[test]
    fn transport_error_marks_span_and_propagates() {
        let (client, _transport, sink) = client_with(&[Outcome::Error("connection refused")]);

        let result = client.execute(get_request("http://svc.local/orders"));
        assert!(result.is_err());

        let span = &sink.finished_spans()[0];
        assert_eq!(span.status, Status::error("connection refused"));
        assert_eq!(
            attr(span, conv::EXCEPTION_MESSAGE),
            Some(&Value::from("connection refused".to_string()))
        );
        assert!(attr(span, conv::HTTP_STATUS_CODE).is_none());
    }

    #[test]
    fn client_span_parents_on_current_context() {
        let (client, transport, sink) = client_with(&[Outcome::Status(200)]);

        let parent = SpanContext::new(
            TraceId::from(0xabcd),
            SpanId::from(0x1234),
            TraceFlags::SAMPLED,
            false,
        );
        Context::new().with_span_context(parent).in_scope(|| {
            client
                .execute(get_request("http://svc.local/orders"))
                .unwrap();
        });

        let span = &sink.finished_spans()[0];
        assert_eq!(span.span_context.trace_id(), TraceId::from(0xabcd));
        assert_eq!(span.parent_span_id, SpanId::from(0x1234));
        assert!(
            sent_traceparent(&transport, 0).contains("0000000000000000000000000000abcd"),
            "downstream sees the caller's trace id"
        );
    }

    #[test]
    fn requests_without_context_start_fresh_traces() {
        let (client, _transport, sink) = client_with(&[Outcome::Status(200), Outcome::Status(200)]);

        client.execute(get_request("http://svc.local/a")).unwrap();
        client.execute(get_request("http://svc.local/b")).unwrap();

        let spans = sink.finished_spans();
        assert!(spans[0].is_root());
        assert!(spans[1].is_root());
        assert_ne!(
            spans[0].span_context.trace_id(),
            spans[1].span_context.trace_id()
        );
    }

    #[test]
    fn duration_hook_fires_on_success_and_error() {
        let durations = Arc::new(Mutex::new(Vec::new()));
        let transport = MockTransport::default();
        transport
            .outcomes
            .lock()
            .unwrap()
            .extend([Outcome::Status(200), Outcome::Error("boom")]);
        let hook_durations = durations.clone();
        let client = TracedHttpClient::builder(transport, Tracer::builder().build())
            .with_duration_hook(move |elapsed| hook_durations.lock().unwrap().push(elapsed))
            .build();

        client.execute(get_request("http://svc.local/ok")).unwrap();
        let _ = client.execute(get_request("http://svc.local/down"));

        assert_eq!(durations.lock().unwrap().len(), 2);
    }
}

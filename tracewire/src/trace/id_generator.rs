use std::cell::RefCell;
use std::fmt;

use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::trace_context::{SpanId, TraceId};

/// Interface for generating the identifiers of new spans and traces.
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// Generate a new `TraceId`.
    fn new_trace_id(&self) -> TraceId;

    /// Generate a new `SpanId`.
    fn new_span_id(&self) -> SpanId;
}

/// Default [`IdGenerator`] producing random, nonzero identifiers.
#[derive(Clone, Debug, Default)]
pub struct RandomIdGenerator {
    _private: (),
}

impl IdGenerator for RandomIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        CURRENT_RNG.with(|rng| {
            let mut rng = rng.borrow_mut();
            loop {
                let id = rng.random::<u128>();
                if id != 0 {
                    return TraceId::from(id);
                }
            }
        })
    }

    fn new_span_id(&self) -> SpanId {
        CURRENT_RNG.with(|rng| {
            let mut rng = rng.borrow_mut();
            loop {
                let id = rng.random::<u64>();
                if id != 0 {
                    return SpanId::from(id);
                }
            }
        })
    }
}

thread_local! {
    /// Store random number generator for each thread
    static CURRENT_RNG: RefCell<SmallRng> = RefCell::new(SmallRng::from_os_rng());
}

/// [`IdGenerator`] handing out consecutive identifiers, for tests that need
/// predictable trace and span ids.
///
/// Trace ids and span ids are drawn from one shared counter starting at 1, so
/// clones of a generator never repeat an id.
#[cfg(any(test, feature = "testing"))]
#[derive(Clone, Debug, Default)]
pub struct SequentialIdGenerator {
    counter: std::sync::Arc<std::sync::atomic::AtomicU64>,
}

#[cfg(any(test, feature = "testing"))]
impl SequentialIdGenerator {
    /// A generator whose first id is 1.
    pub fn new() -> Self {
        SequentialIdGenerator::default()
    }

    fn next_id(&self) -> u64 {
        self.counter
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            + 1
    }
}

#[cfg(any(test, feature = "testing"))]
impl IdGenerator for SequentialIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        TraceId::from(self.next_id() as u128)
    }

    fn new_span_id(&self) -> SpanId {
        SpanId::from(self.next_id())
    }
}
